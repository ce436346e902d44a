//! Configuration tree access for the pattern compiler.
//!
//! The compiler does not care which document format a rollup configuration
//! is written in. It walks a tree of named elements through the
//! [`ConfigSource`] trait using dotted keys:
//!
//! ```text
//! graphite_rollup.pattern[1].retention[0].age
//! ```
//!
//! Repeated elements are addressed as `name`, `name[1]`, `name[2]`, ... and
//! [`ConfigSource::keys`] enumerates them in that form, in declaration order.
//!
//! [`JsonConfig`] is the bundled implementation. Objects are elements, arrays
//! are repeated elements, and integer values may be written either as JSON
//! numbers or as numeric strings:
//!
//! ```json
//! {
//!   "graphite_rollup": {
//!     "pattern": [
//!       { "regexp": "\\.max$", "function": "max" },
//!       { "regexp": "click_cost", "function": "any",
//!         "retention": [ { "age": 0, "precision": 5 }, { "age": 86400, "precision": 60 } ] }
//!     ],
//!     "default": {
//!       "function": "max",
//!       "retention": [ { "age": 0, "precision": 60 }, { "age": 3600, "precision": 300 } ]
//!     }
//!   }
//! }
//! ```

use std::fs;
use std::path::Path;

use serde_json::Value;

use crate::error::SourceError;

/// Read-only access to a tree of configuration elements.
///
/// Keys are dotted paths of element names; a segment may carry an `[index]`
/// suffix to select one of several repeated elements. An empty key refers to
/// the document root.
pub trait ConfigSource {
    /// Returns `true` if an element exists at `key`.
    fn has(&self, key: &str) -> bool;

    /// Lists the child keys of the element at `key`, in declaration order.
    ///
    /// Repeated children are listed once per occurrence as `name`,
    /// `name[1]`, `name[2]`, ... Returns an empty list if `key` does not
    /// name an element with children.
    fn keys(&self, key: &str) -> Vec<String>;

    /// Reads the element at `key` as a string.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::MissingKey`] if there is no such element and
    /// [`SourceError::InvalidValue`] if it has children instead of a value.
    fn get_string(&self, key: &str) -> Result<String, SourceError>;

    /// Reads the element at `key` as an unsigned 32-bit integer.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::MissingKey`] if there is no such element and
    /// [`SourceError::InvalidValue`] if it is not an integer in range.
    fn get_u32(&self, key: &str) -> Result<u32, SourceError>;

    /// Reads the element at `key` as a string, falling back to `default`
    /// when it is absent.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::InvalidValue`] if the element exists but is not
    /// a value.
    fn get_string_or(&self, key: &str, default: &str) -> Result<String, SourceError> {
        if self.has(key) {
            self.get_string(key)
        } else {
            Ok(default.to_string())
        }
    }
}

/// A [`ConfigSource`] backed by a JSON document.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonConfig {
    root: Value,
}

impl JsonConfig {
    /// Wraps an already parsed JSON value.
    pub fn new(root: Value) -> Self {
        Self { root }
    }

    /// Parses a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Parse`] if `text` is not valid JSON.
    pub fn from_json_str(text: &str) -> Result<Self, SourceError> {
        let root = serde_json::from_str(text).map_err(|source| SourceError::Parse { source })?;
        Ok(Self::new(root))
    }

    /// Reads and parses a JSON document from disk.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Read`] if the file cannot be read and
    /// [`SourceError::Parse`] if it is not valid JSON.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| SourceError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// Resolves a dotted key to the JSON value it names.
    fn lookup(&self, key: &str) -> Option<&Value> {
        if key.is_empty() {
            return Some(&self.root);
        }

        let mut current = &self.root;
        for segment in key.split('.') {
            let (name, index) = split_index(segment)?;
            let child = current.as_object()?.get(name)?;
            current = match child {
                Value::Array(items) => items.get(index.unwrap_or(0))?,
                _ if index.unwrap_or(0) == 0 => child,
                _ => return None,
            };
        }

        match current {
            Value::Null => None,
            value => Some(value),
        }
    }
}

impl ConfigSource for JsonConfig {
    fn has(&self, key: &str) -> bool {
        self.lookup(key).is_some()
    }

    fn keys(&self, key: &str) -> Vec<String> {
        let Some(Value::Object(children)) = self.lookup(key) else {
            return Vec::new();
        };

        let mut keys = Vec::with_capacity(children.len());
        for (name, value) in children {
            match value {
                Value::Array(items) => {
                    for i in 0..items.len() {
                        if i == 0 {
                            keys.push(name.clone());
                        } else {
                            keys.push(format!("{name}[{i}]"));
                        }
                    }
                }
                Value::Null => {}
                _ => keys.push(name.clone()),
            }
        }
        keys
    }

    fn get_string(&self, key: &str) -> Result<String, SourceError> {
        match self.lookup(key) {
            None => Err(SourceError::MissingKey {
                key: key.to_string(),
            }),
            Some(Value::String(s)) => Ok(s.clone()),
            Some(Value::Number(n)) => Ok(n.to_string()),
            Some(Value::Bool(b)) => Ok(b.to_string()),
            Some(_) => Err(SourceError::InvalidValue {
                key: key.to_string(),
                reason: "expected a value, found an element".to_string(),
            }),
        }
    }

    fn get_u32(&self, key: &str) -> Result<u32, SourceError> {
        let invalid = |reason: String| SourceError::InvalidValue {
            key: key.to_string(),
            reason,
        };

        match self.lookup(key) {
            None => Err(SourceError::MissingKey {
                key: key.to_string(),
            }),
            Some(Value::Number(n)) => n
                .as_u64()
                .and_then(|v| u32::try_from(v).ok())
                .ok_or_else(|| invalid(format!("{n} is not an unsigned 32-bit integer"))),
            Some(Value::String(s)) => s
                .trim()
                .parse::<u32>()
                .map_err(|e| invalid(format!("'{s}': {e}"))),
            Some(other) => Err(invalid(format!("expected an integer, found {other}"))),
        }
    }
}

/// Splits `name[3]` into `("name", Some(3))`.
fn split_index(segment: &str) -> Option<(&str, Option<usize>)> {
    match segment.split_once('[') {
        None => Some((segment, None)),
        Some((name, rest)) => {
            let index = rest.strip_suffix(']')?.parse().ok()?;
            Some((name, Some(index)))
        }
    }
}
