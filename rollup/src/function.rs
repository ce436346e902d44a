//! Aggregate function handles used by rollup patterns.
//!
//! The rule engine never evaluates aggregate functions. It only needs to
//! resolve the configured name to a handle, report the handle's name, and
//! refuse functions that need per-row arena memory, which the rollup merge
//! cannot give them. Those capabilities are the [`AggregateFunction`] and
//! [`FunctionResolver`] traits.
//!
//! [`BuiltinFunctions`] is a resolver over the usual rollup functions so a
//! configuration can be compiled without an external function registry.

use std::fmt;
use std::sync::Arc;

use crate::error::{ConfigError, FunctionError};

/// An opaque, resolved aggregate function.
pub trait AggregateFunction: fmt::Debug + Send + Sync {
    /// The function name including parameters, e.g. `quantile(0.95)`.
    fn name(&self) -> String;

    /// Whether the function's state lives in an arena allocator.
    fn allocates_arena_memory(&self) -> bool;
}

/// Resolves function names from configuration into handles.
pub trait FunctionResolver {
    /// Resolves `name` with its parenthesized parameters.
    ///
    /// # Errors
    ///
    /// Returns [`FunctionError`] if the name is unknown or the parameters do
    /// not fit the function.
    fn resolve(
        &self,
        name: &str,
        params: &[String],
    ) -> Result<Arc<dyn AggregateFunction>, FunctionError>;
}

/// Splits a configured function value into name and parameter literals.
///
/// Accepts `name` and `name(p1, p2, ...)`. Parameters are returned trimmed
/// and unparsed; interpreting them is up to the resolver.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidFunction`] for an empty name, unbalanced or
/// nested parentheses, trailing text after `)`, or an empty parameter.
///
/// # Examples
///
/// ```rust
/// use rollup::function::parse_function_spec;
///
/// let (name, params) = parse_function_spec("quantile(0.95)").unwrap();
/// assert_eq!(name, "quantile");
/// assert_eq!(params, vec!["0.95".to_string()]);
///
/// let (name, params) = parse_function_spec(" max ").unwrap();
/// assert_eq!(name, "max");
/// assert!(params.is_empty());
/// ```
pub fn parse_function_spec(value: &str) -> Result<(String, Vec<String>), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidFunction {
        value: value.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = value.trim();
    let (name, params) = match trimmed.split_once('(') {
        None => (trimmed, Vec::new()),
        Some((name, rest)) => {
            let inner = rest
                .strip_suffix(')')
                .ok_or_else(|| invalid("parameter list must end with ')'"))?;
            if inner.contains(['(', ')']) {
                return Err(invalid("nested parentheses are not supported"));
            }
            let params = if inner.trim().is_empty() {
                Vec::new()
            } else {
                inner
                    .split(',')
                    .map(|p| p.trim().to_string())
                    .collect::<Vec<_>>()
            };
            if params.iter().any(String::is_empty) {
                return Err(invalid("empty parameter"));
            }
            (name.trim_end(), params)
        }
    };

    if name.is_empty() {
        return Err(invalid("missing function name"));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(invalid("function name must be alphanumeric"));
    }

    Ok((name.to_string(), params))
}

/// Aggregate functions known to [`BuiltinFunctions`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BuiltinFunction {
    /// Arithmetic mean.
    Average,

    /// Sum of values.
    Sum,

    /// Minimum value.
    Min,

    /// Maximum value.
    Max,

    /// First value seen.
    Any,

    /// Last value seen.
    AnyLast,

    /// Number of values.
    Count,

    /// Approximate median.
    Median,

    /// Approximate quantile at the given level in `[0, 1]`.
    Quantile(f64),

    /// Collects all values into an array.
    GroupArray,

    /// Approximate count of distinct values.
    Uniq,

    /// Exact count of distinct values.
    UniqExact,

    /// Most frequent `n` values.
    TopK(u32),
}

impl BuiltinFunction {
    /// Looks up a builtin by name and parameter literals.
    ///
    /// # Errors
    ///
    /// Returns [`FunctionError::UnknownFunction`] for names outside the
    /// catalog and [`FunctionError::InvalidParameters`] when parameters are
    /// given to a function that takes none or are out of range.
    pub fn from_name(name: &str, params: &[String]) -> Result<Self, FunctionError> {
        let bad_params = |reason: String| FunctionError::InvalidParameters {
            name: name.to_string(),
            reason,
        };

        let function = match name {
            "avg" => Self::Average,
            "sum" => Self::Sum,
            "min" => Self::Min,
            "max" => Self::Max,
            "any" => Self::Any,
            "anyLast" => Self::AnyLast,
            "count" => Self::Count,
            "median" => Self::Median,
            "groupArray" => Self::GroupArray,
            "uniq" => Self::Uniq,
            "uniqExact" => Self::UniqExact,
            "quantile" => {
                let level = match params {
                    [] => 0.5,
                    [level] => level
                        .parse::<f64>()
                        .map_err(|e| bad_params(format!("level '{level}': {e}")))?,
                    _ => return Err(bad_params("expected a single level".to_string())),
                };
                if !(0.0..=1.0).contains(&level) {
                    return Err(bad_params(format!("level {level} is outside [0, 1]")));
                }
                return Ok(Self::Quantile(level));
            }
            "topK" => {
                let n = match params {
                    [] => 10,
                    [n] => n
                        .parse::<u32>()
                        .map_err(|e| bad_params(format!("count '{n}': {e}")))?,
                    _ => return Err(bad_params("expected a single count".to_string())),
                };
                if n == 0 {
                    return Err(bad_params("count must be > 0".to_string()));
                }
                return Ok(Self::TopK(n));
            }
            _ => {
                return Err(FunctionError::UnknownFunction {
                    name: name.to_string(),
                });
            }
        };

        if !params.is_empty() {
            return Err(bad_params(format!(
                "takes no parameters, got {}",
                params.len()
            )));
        }
        Ok(function)
    }
}

impl AggregateFunction for BuiltinFunction {
    fn name(&self) -> String {
        match self {
            Self::Average => "avg".to_string(),
            Self::Sum => "sum".to_string(),
            Self::Min => "min".to_string(),
            Self::Max => "max".to_string(),
            Self::Any => "any".to_string(),
            Self::AnyLast => "anyLast".to_string(),
            Self::Count => "count".to_string(),
            Self::Median => "median".to_string(),
            Self::Quantile(level) => format!("quantile({level})"),
            Self::GroupArray => "groupArray".to_string(),
            Self::Uniq => "uniq".to_string(),
            Self::UniqExact => "uniqExact".to_string(),
            Self::TopK(n) => format!("topK({n})"),
        }
    }

    fn allocates_arena_memory(&self) -> bool {
        matches!(
            self,
            Self::GroupArray | Self::Uniq | Self::UniqExact | Self::TopK(_)
        )
    }
}

/// [`FunctionResolver`] over the [`BuiltinFunction`] catalog.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinFunctions;

impl FunctionResolver for BuiltinFunctions {
    fn resolve(
        &self,
        name: &str,
        params: &[String],
    ) -> Result<Arc<dyn AggregateFunction>, FunctionError> {
        Ok(Arc::new(BuiltinFunction::from_name(name, params)?))
    }
}
