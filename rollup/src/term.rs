//! Tag terms for `tagged_map` rules.
//!
//! A `tagged_map` rule is written as `;`-separated terms:
//!
//! ```text
//! cpu_load; env=prod; host=~^web[0-9]+$; dc!=test; role!=~^(db|cache)$
//! ```
//!
//! A term without an operator constrains the metric name, and `__name__` is
//! an alias for the `name` key. Each term is a [`TaggedTerm`]; together they
//! form a [`TagMap`] that a path matches when every term's key is present and
//! satisfied. Tags the rule does not mention are ignored.

use std::collections::HashMap;
use std::fmt;

use crate::error::ConfigError;
use crate::matcher::PathRegex;
use crate::path::NAME_TAG;

/// Comparison operator of a [`TaggedTerm`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TermOp {
    /// `=`: value equals.
    Eq,

    /// `!=`: value differs.
    Ne,

    /// `=~`: value matches a regular expression.
    Match,

    /// `!=~`: value does not match a regular expression.
    NotMatch,
}

impl TermOp {
    /// Parses an operator as written in a rule.
    pub fn from_operator(op: &str) -> Option<Self> {
        match op {
            "=" => Some(Self::Eq),
            "!=" => Some(Self::Ne),
            "=~" => Some(Self::Match),
            "!=~" => Some(Self::NotMatch),
            _ => None,
        }
    }

    /// The operator as written in a rule.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Match => "=~",
            Self::NotMatch => "!=~",
        }
    }

    /// Whether the term's value is a regular expression.
    pub fn is_regex(self) -> bool {
        matches!(self, Self::Match | Self::NotMatch)
    }
}

impl fmt::Display for TermOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One predicate on one tag value.
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedTerm {
    op: TermOp,
    value: String,
    regex: Option<PathRegex>,
}

impl TaggedTerm {
    /// Builds a term, compiling `value` as a regex for `=~` and `!=~`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidRegex`] if a regex term does not compile.
    pub fn new(op: TermOp, value: &str) -> Result<Self, ConfigError> {
        let regex = if op.is_regex() {
            Some(PathRegex::new(value)?)
        } else {
            None
        };
        Ok(Self {
            op,
            value: value.to_string(),
            regex,
        })
    }

    /// The comparison operator.
    pub fn op(&self) -> TermOp {
        self.op
    }

    /// The literal value or regex source.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Evaluates the term against one tag value.
    #[inline]
    pub fn evaluate(&self, tag_value: &str) -> bool {
        match (self.op, &self.regex) {
            (TermOp::Eq, _) => tag_value == self.value,
            (TermOp::Ne, _) => tag_value != self.value,
            (TermOp::Match, Some(re)) => re.is_match(tag_value),
            (TermOp::NotMatch, Some(re)) => !re.is_match(tag_value),
            // new() always compiles a regex for the regex operators.
            (TermOp::Match | TermOp::NotMatch, None) => false,
        }
    }
}

impl fmt::Display for TaggedTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.op, self.value)
    }
}

/// The full set of terms of a `tagged_map` rule, keyed by tag.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagMap {
    terms: HashMap<String, TaggedTerm>,
}

impl TagMap {
    /// Parses a `tagged_map` rule.
    ///
    /// Whitespace is removed and empty terms are skipped. If a key appears
    /// more than once, the last term for it wins.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownTermOperator`] for operators other than
    /// `=`, `=~`, `!=`, `!=~` and [`ConfigError::InvalidRegex`] for regex
    /// terms that do not compile.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use rollup::term::TagMap;
    ///
    /// let map = TagMap::parse("cpu; env = prod; host=~^web").unwrap();
    /// assert!(map.matches(&[("name", "cpu"), ("env", "prod"), ("host", "web1")]));
    /// assert!(!map.matches(&[("name", "cpu"), ("env", "test"), ("host", "web1")]));
    /// ```
    pub fn parse(source: &str) -> Result<Self, ConfigError> {
        let compact: String = source.chars().filter(|c| !c.is_whitespace()).collect();

        let mut terms = HashMap::new();
        for segment in compact.split(';').filter(|s| !s.is_empty()) {
            let (key, term) = parse_term(segment)?;
            terms.insert(key.to_string(), term);
        }
        Ok(Self { terms })
    }

    /// Checks a path's labels (including the `name` pseudo-tag) against the map.
    ///
    /// Every label whose key has a term is evaluated; one failing term fails
    /// the whole match. The match succeeds only if the number of satisfied
    /// labels equals the number of terms, so a missing key fails, and so
    /// does a key repeated in the path.
    pub fn matches(&self, labels: &[(&str, &str)]) -> bool {
        if labels.len() < self.terms.len() {
            return false;
        }

        let mut satisfied = 0usize;
        for (key, value) in labels {
            if let Some(term) = self.terms.get(*key) {
                if !term.evaluate(value) {
                    return false;
                }
                satisfied += 1;
            }
        }
        satisfied == self.terms.len()
    }

    /// Looks up the term for a key.
    pub fn get(&self, key: &str) -> Option<&TaggedTerm> {
        self.terms.get(key)
    }

    /// Number of terms.
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    /// Whether the map has no terms, in which case it matches every path.
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Iterates over `(key, term)` pairs sorted by key.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &TaggedTerm)> {
        let mut terms: Vec<_> = self.terms.iter().map(|(k, t)| (k.as_str(), t)).collect();
        terms.sort_by_key(|(k, _)| *k);
        terms.into_iter()
    }
}

/// Splits one `key<op>value` segment.
fn parse_term(segment: &str) -> Result<(&str, TaggedTerm), ConfigError> {
    let Some(op_start) = segment.find(['!', '=', '~']) else {
        return Ok((NAME_TAG, TaggedTerm::new(TermOp::Eq, segment)?));
    };

    let (key, rest) = segment.split_at(op_start);
    let op_len = rest
        .find(|c: char| !matches!(c, '!' | '=' | '~'))
        .unwrap_or(rest.len());
    let (op, value) = rest.split_at(op_len);

    let op = TermOp::from_operator(op).ok_or_else(|| ConfigError::UnknownTermOperator {
        operator: op.to_string(),
    })?;
    let key = if key == "__name__" { NAME_TAG } else { key };

    Ok((key, TaggedTerm::new(op, value)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evaluate_operators() {
        let eq = TaggedTerm::new(TermOp::Eq, "prod").unwrap();
        assert!(eq.evaluate("prod"));
        assert!(!eq.evaluate("production"));

        let ne = TaggedTerm::new(TermOp::Ne, "prod").unwrap();
        assert!(ne.evaluate("test"));
        assert!(!ne.evaluate("prod"));

        let re = TaggedTerm::new(TermOp::Match, "^web[0-9]+$").unwrap();
        assert!(re.evaluate("web12"));
        assert!(!re.evaluate("db1"));

        let not_re = TaggedTerm::new(TermOp::NotMatch, "^web").unwrap();
        assert!(not_re.evaluate("db1"));
        assert!(!not_re.evaluate("web1"));
    }

    #[test]
    fn test_parse_all_operators() {
        let map = TagMap::parse("cpu;a=1;b=~x+;c!=2;d!=~y").unwrap();
        assert_eq!(map.len(), 5);
        assert_eq!(map.get("name").unwrap().op(), TermOp::Eq);
        assert_eq!(map.get("name").unwrap().value(), "cpu");
        assert_eq!(map.get("a").unwrap().op(), TermOp::Eq);
        assert_eq!(map.get("b").unwrap().op(), TermOp::Match);
        assert_eq!(map.get("b").unwrap().value(), "x+");
        assert_eq!(map.get("c").unwrap().op(), TermOp::Ne);
        assert_eq!(map.get("d").unwrap().op(), TermOp::NotMatch);
        assert_eq!(map.get("d").unwrap().value(), "y");
    }

    #[test]
    fn test_parse_name_alias_and_whitespace() {
        let map = TagMap::parse(" __name__ = cpu ;\tenv = prod ; ").unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("name").unwrap().value(), "cpu");
        assert!(map.get("__name__").is_none());
    }

    #[test]
    fn test_parse_rejects_unknown_operator() {
        for source in ["env~prod", "env==prod", "env=!prod", "env!prod"] {
            assert!(
                matches!(
                    TagMap::parse(source),
                    Err(ConfigError::UnknownTermOperator { .. })
                ),
                "{source}"
            );
        }
    }

    #[test]
    fn test_parse_rejects_bad_regex() {
        assert!(matches!(
            TagMap::parse("host=~(web"),
            Err(ConfigError::InvalidRegex { .. })
        ));
    }

    #[test]
    fn test_matches_ignores_unlisted_tags() {
        let map = TagMap::parse("env=prod").unwrap();
        assert!(map.matches(&[("name", "cpu"), ("dc", "eu"), ("env", "prod")]));
        assert!(!map.matches(&[("name", "cpu"), ("dc", "eu"), ("env", "test")]));
    }

    #[test]
    fn test_matches_requires_every_key() {
        let map = TagMap::parse("env=prod;dc=eu").unwrap();
        assert!(!map.matches(&[("name", "cpu"), ("env", "prod"), ("host", "a")]));
        assert!(map.matches(&[("name", "cpu"), ("dc", "eu"), ("env", "prod")]));
    }

    #[test]
    fn test_matches_duplicate_path_tags() {
        let map = TagMap::parse("env=prod").unwrap();
        // A failing duplicate fails the match.
        assert!(!map.matches(&[("env", "prod"), ("env", "test")]));
        // Satisfied duplicates over-count.
        assert!(!map.matches(&[("env", "prod"), ("env", "prod")]));
    }

    #[test]
    fn test_empty_map_matches_everything() {
        let map = TagMap::parse(" ; ").unwrap();
        assert!(map.is_empty());
        assert!(map.matches(&[]));
        assert!(map.matches(&[("name", "cpu")]));
    }

    #[test]
    fn test_iter_sorted_by_key() {
        let map = TagMap::parse("z=1;a=2;m!=3").unwrap();
        let rendered: Vec<String> = map.iter().map(|(k, t)| format!("{k}{t}")).collect();
        assert_eq!(rendered, vec!["a=2", "m!=3", "z=1"]);
    }
}
