//! Compiled regular expressions for path and tag matching.

use std::fmt;

use regex::Regex;

use crate::error::ConfigError;

/// A compiled regular expression together with the text it was built from.
///
/// Matching is an unanchored search: a pattern matches if it matches any
/// substring, so anchors have to be written explicitly (`^retention\.`).
#[derive(Clone)]
pub struct PathRegex {
    regex: Regex,
}

impl PathRegex {
    /// Compiles `pattern`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidRegex`] if the pattern does not compile.
    pub fn new(pattern: &str) -> Result<Self, ConfigError> {
        let regex = Regex::new(pattern).map_err(|source| ConfigError::InvalidRegex {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(Self { regex })
    }

    /// Returns `true` if the expression matches anywhere in `text`.
    #[inline]
    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    /// The source text of the expression.
    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }
}

impl fmt::Debug for PathRegex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PathRegex").field(&self.as_str()).finish()
    }
}

impl PartialEq for PathRegex {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}
