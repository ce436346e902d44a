//! Rule selection for metric paths.
//!
//! Given compiled [`Params`] and a path, [`select`] picks the pattern whose
//! retention schedule applies and the pattern whose aggregate function
//! applies. Both may come from one pattern or from two different ones.
//!
//! Candidates are scanned in precedence order:
//!
//! - A matching pattern that defines both halves wins outright.
//! - The first matching single-half pattern is remembered. Later patterns
//!   defining only the same half are skipped, and the first one defining
//!   the other half completes the rule.
//! - A default pattern fills in whatever the remembered pattern lacks. If
//!   nothing was remembered, it only applies when it defines both halves.
//!
//! Selection allocates only when tag-map rules exist and the path is
//! tagged. [`RollupRule`] borrows from the [`Params`] it was selected from.

use crate::params::Params;
use crate::path::{self, PathKind};
use crate::pattern::{Matcher, Pattern, PatternKind};

/// The patterns selected for one path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RollupRule<'a> {
    /// Both halves of the rule were found.
    Matched {
        /// Supplies the retention schedule.
        retention: &'a Pattern,

        /// Supplies the aggregate function.
        aggregation: &'a Pattern,
    },

    /// No pattern, or only one half of a rule, applies to the path.
    NoRuleMatched,
}

impl<'a> RollupRule<'a> {
    fn both(pattern: &'a Pattern) -> Self {
        Self::Matched {
            retention: pattern,
            aggregation: pattern,
        }
    }

    /// The pattern supplying retentions, if a rule matched.
    pub fn retention(&self) -> Option<&'a Pattern> {
        match *self {
            Self::Matched { retention, .. } => Some(retention),
            Self::NoRuleMatched => None,
        }
    }

    /// The pattern supplying the aggregate function, if a rule matched.
    pub fn aggregation(&self) -> Option<&'a Pattern> {
        match *self {
            Self::Matched { aggregation, .. } => Some(aggregation),
            Self::NoRuleMatched => None,
        }
    }

    /// Whether a rule matched.
    pub fn is_matched(&self) -> bool {
        matches!(self, Self::Matched { .. })
    }
}

/// The half-rule remembered while scanning.
#[derive(Debug, Clone, Copy)]
enum Partial<'a> {
    None,
    Retention(&'a Pattern),
    Aggregation(&'a Pattern),
}

/// Selects the rollup rule for `path`.
///
/// # Examples
///
/// ```rust
/// use rollup::config::JsonConfig;
/// use rollup::{compile, select};
///
/// let config = JsonConfig::from_json_str(r#"{
///     "graphite_rollup": {
///         "pattern": { "regexp": "^retention\\.", "retention": { "age": 0, "precision": 60 } },
///         "default": { "function": "max" }
///     }
/// }"#)?;
/// let params = compile(&config, "graphite_rollup")?;
///
/// let rule = select(&params, "retention.count");
/// assert_eq!(rule.retention().unwrap().regexp(), "^retention\\.");
/// assert!(rule.aggregation().unwrap().is_default());
///
/// // The default has no retentions, so it cannot complete a rule alone.
/// assert!(!select(&params, "other.count").is_matched());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn select<'a>(params: &'a Params, path: &str) -> RollupRule<'a> {
    if !params.is_typed() {
        return scan(params.patterns().iter(), path, &[]);
    }

    let plain = params.bucket(params.plain_indices());
    let tagged = params.bucket(params.tagged_indices());
    if !params.has_tag_map_patterns() {
        return if path::is_tagged(path) {
            scan(tagged, path, &[])
        } else {
            scan(plain, path, &[])
        };
    }

    match path::classify(path) {
        PathKind::Plain => scan(plain, path, &[]),
        PathKind::Tagged(tagged_path) => scan(tagged, path, tagged_path.labels()),
        PathKind::Malformed { name } => {
            tracing::trace!(path, name, "malformed tag list, matching tag maps against no tags");
            scan(tagged, path, &[])
        }
    }
}

impl Params {
    /// Selects the rollup rule for `path`. See [`select`].
    pub fn select(&self, path: &str) -> RollupRule<'_> {
        select(self, path)
    }
}

fn scan<'a>(
    candidates: impl Iterator<Item = &'a Pattern>,
    path: &str,
    labels: &[(&str, &str)],
) -> RollupRule<'a> {
    let mut first = Partial::None;

    for pattern in candidates {
        let matched = match pattern.matcher() {
            Matcher::Default => {
                match (first, pattern.kind()) {
                    (Partial::None, PatternKind::Both) => return RollupRule::both(pattern),
                    (Partial::Retention(retention), PatternKind::AggregationOnly | PatternKind::Both) => {
                        return RollupRule::Matched {
                            retention,
                            aggregation: pattern,
                        };
                    }
                    (Partial::Aggregation(aggregation), PatternKind::RetentionOnly | PatternKind::Both) => {
                        return RollupRule::Matched {
                            retention: pattern,
                            aggregation,
                        };
                    }
                    _ => {}
                }
                continue;
            }
            Matcher::Regex(regex) => regex.is_match(path),
            Matcher::TagMap(map) => map.matches(labels),
        };
        if !matched {
            continue;
        }

        match (first, pattern.kind()) {
            (_, PatternKind::Both) => return RollupRule::both(pattern),
            (Partial::None, PatternKind::RetentionOnly) => first = Partial::Retention(pattern),
            (Partial::None, PatternKind::AggregationOnly) => first = Partial::Aggregation(pattern),
            (Partial::Retention(retention), PatternKind::AggregationOnly) => {
                return RollupRule::Matched {
                    retention,
                    aggregation: pattern,
                };
            }
            (Partial::Aggregation(aggregation), PatternKind::RetentionOnly) => {
                return RollupRule::Matched {
                    retention: pattern,
                    aggregation,
                };
            }
            (Partial::Retention(_), PatternKind::RetentionOnly)
            | (Partial::Aggregation(_), PatternKind::AggregationOnly) => {}
        }
    }

    RollupRule::NoRuleMatched
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JsonConfig;
    use crate::params::compile;
    use serde_json::json;

    fn rules(value: serde_json::Value) -> Params {
        compile(&JsonConfig::new(json!({ "graphite_rollup": value })), "graphite_rollup").unwrap()
    }

    fn names(rule: RollupRule<'_>) -> Option<(String, String)> {
        let element = |p: &Pattern| p.element().trim_start_matches("graphite_rollup.").to_string();
        Some((element(rule.retention()?), element(rule.aggregation()?)))
    }

    fn pair(retention: &str, aggregation: &str) -> Option<(String, String)> {
        Some((retention.to_string(), aggregation.to_string()))
    }

    #[test]
    fn test_both_pattern_wins_outright() {
        let params = rules(json!({
            "pattern": [
                { "regexp": "\\.sum$", "function": "sum", "retention": { "age": 0, "precision": 10 } },
                { "regexp": "sum", "function": "max" }
            ],
            "default": { "function": "avg", "retention": { "age": 0, "precision": 60 } }
        }));
        assert_eq!(names(params.select("a.sum")), pair("pattern", "pattern"));
    }

    #[test]
    fn test_halves_combine_in_order() {
        let params = rules(json!({
            "pattern": [
                { "regexp": "^a", "retention": { "age": 0, "precision": 10 } },
                { "regexp": "^a", "retention": { "age": 0, "precision": 20 } },
                { "regexp": "^a", "function": "sum" }
            ]
        }));
        // The second retention-only pattern is skipped.
        assert_eq!(names(params.select("a.b")), pair("pattern", "pattern[2]"));

        let params = rules(json!({
            "pattern": [
                { "regexp": "^a", "function": "sum" },
                { "regexp": "^a", "retention": { "age": 0, "precision": 10 } }
            ]
        }));
        assert_eq!(names(params.select("a.b")), pair("pattern[1]", "pattern"));
    }

    #[test]
    fn test_default_completes_partial() {
        let params = rules(json!({
            "pattern": { "regexp": "^a", "function": "sum" },
            "default": { "function": "avg", "retention": { "age": 0, "precision": 60 } }
        }));
        assert_eq!(names(params.select("a.b")), pair("default", "pattern"));
        assert_eq!(names(params.select("b.c")), pair("default", "default"));
    }

    #[test]
    fn test_single_half_default_alone_never_matches() {
        let params = rules(json!({
            "pattern": { "regexp": "^a", "retention": { "age": 0, "precision": 60 } },
            "default": { "function": "avg" }
        }));
        assert_eq!(params.select("b.c"), RollupRule::NoRuleMatched);
        assert_eq!(names(params.select("a.b")), pair("pattern", "default"));
    }

    #[test]
    fn test_default_with_same_half_is_skipped() {
        let params = rules(json!({
            "pattern": { "regexp": "^a", "function": "sum" },
            "default": { "function": "avg" }
        }));
        assert!(!params.select("a.b").is_matched());
    }

    #[test]
    fn test_no_patterns_match() {
        let params = rules(json!({
            "pattern": { "regexp": "^a", "function": "sum", "retention": { "age": 0, "precision": 60 } }
        }));
        let rule = params.select("b");
        assert!(rule.retention().is_none());
        assert!(rule.aggregation().is_none());
    }

    #[test]
    fn test_typed_buckets_route_paths() {
        let params = rules(json!({
            "pattern": [
                { "rule_type": "plain", "regexp": "cpu", "function": "sum", "retention": { "age": 0, "precision": 1 } },
                { "rule_type": "tagged", "regexp": "cpu", "function": "max", "retention": { "age": 0, "precision": 2 } }
            ],
            "default": { "function": "avg", "retention": { "age": 0, "precision": 60 } }
        }));
        assert_eq!(names(params.select("cpu.load")), pair("pattern", "pattern"));
        assert_eq!(names(params.select("cpu?dc=eu")), pair("pattern[1]", "pattern[1]"));
        assert_eq!(names(params.select("mem?dc=eu")), pair("default", "default"));
    }

    #[test]
    fn test_tag_map_and_malformed_paths() {
        let params = rules(json!({
            "pattern": [
                { "rule_type": "tagged_map", "regexp": "env=prod", "function": "sum", "retention": { "age": 0, "precision": 1 } },
                { "rule_type": "tagged_map", "regexp": " ; ", "function": "max", "retention": { "age": 0, "precision": 2 } }
            ]
        }));
        assert_eq!(names(params.select("cpu?env=prod")), pair("pattern", "pattern"));
        assert_eq!(names(params.select("cpu?env=test")), pair("pattern[1]", "pattern[1]"));
        // No tags can be read, so only the empty map applies.
        assert_eq!(names(params.select("cpu?env")), pair("pattern[1]", "pattern[1]"));
        // Plain paths never see tag-map rules.
        assert!(!params.select("cpu.env").is_matched());
    }

    #[test]
    fn test_plain_paths_use_plain_bucket_alongside_tag_maps() {
        let params = rules(json!({
            "pattern": [
                { "rule_type": "tagged_map", "regexp": "env=prod", "function": "sum", "retention": { "age": 0, "precision": 1 } },
                { "rule_type": "plain", "regexp": "^cpu\\.", "function": "max", "retention": { "age": 0, "precision": 2 } },
                { "rule_type": "tagged", "regexp": "^cpu\\.", "function": "min", "retention": { "age": 0, "precision": 3 } }
            ],
            "default": { "function": "avg", "retention": { "age": 0, "precision": 60 } }
        }));
        assert_eq!(names(params.select("cpu.env")), pair("pattern[1]", "pattern[1]"));
        assert_eq!(names(params.select("mem.env")), pair("default", "default"));
        assert_eq!(names(params.select("cpu?env=prod")), pair("pattern", "pattern"));
    }

    #[test]
    fn test_pattern_without_regexp_applies_in_place() {
        let params = rules(json!({
            "pattern": [
                { "regexp": "^a", "function": "sum" },
                { "retention": { "age": 0, "precision": 10 } },
                { "regexp": "^a", "retention": { "age": 0, "precision": 20 } },
                { "regexp": "^b", "function": "max", "retention": { "age": 0, "precision": 30 } }
            ],
            "default": { "function": "avg", "retention": { "age": 0, "precision": 60 } }
        }));
        assert!(params.patterns()[1].is_default());
        // The regexp-less retention completes the rule before the later one.
        assert_eq!(names(params.select("a.b")), pair("pattern[1]", "pattern"));
        // Alone it cannot start a rule, so later patterns still apply.
        assert_eq!(names(params.select("b.c")), pair("pattern[3]", "pattern[3]"));
        assert_eq!(names(params.select("c.d")), pair("default", "default"));
    }
}
