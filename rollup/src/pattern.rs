//! Rollup patterns: the unit of rollup configuration.
//!
//! A [`Pattern`] says, for the metric paths it matches, which aggregate
//! function combines values whose timestamps round to the same bucket, and
//! which [`Retention`] steps decide the bucket size as data ages. A pattern
//! may define either half or both; the rule selector combines partial
//! patterns into a full [`RollupRule`](crate::RollupRule).
//!
//! # Rule kinds
//!
//! - [`RuleKind::All`] applies to every path.
//! - [`RuleKind::Plain`] applies to paths without tags.
//! - [`RuleKind::Tagged`] applies to tagged paths and matches them with a
//!   regular expression over the whole path string.
//! - [`RuleKind::TaggedMap`] applies to tagged paths and matches them with
//!   per-tag terms (see [`TagMap`]).
//!
//! # Tag order contract for `tagged` rules
//!
//! A `tagged` regexp containing `;` is a tag list rather than a regular
//! expression, e.g. `cpu; env=prod; dc=eu`. It is rewritten into one regex
//! that expects the listed tags in lexicographic key order, with any other
//! tags allowed in between. Stored tagged paths must therefore have their
//! tags sorted by key (`cpu?dc=eu&env=prod&host=a`); a path with the same
//! tags in another order does not match.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;

use crate::error::ConfigError;
use crate::function::AggregateFunction;
use crate::matcher::PathRegex;
use crate::term::TagMap;

/// One step of a retention schedule.
///
/// Data at least `age` seconds old has its timestamps rounded down to a
/// multiple of `precision` seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Retention {
    /// Minimal data age in seconds for this step to apply.
    pub age: u32,

    /// Rounding precision in seconds.
    pub precision: u32,
}

impl Retention {
    /// Creates a retention step.
    pub fn new(age: u32, precision: u32) -> Self {
        Self { age, precision }
    }

    /// Rounds `timestamp` down to this step's precision.
    ///
    /// A zero precision leaves the timestamp unchanged.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use rollup::Retention;
    ///
    /// assert_eq!(Retention::new(3600, 300).round_timestamp(1_000_123), 999_900);
    /// assert_eq!(Retention::new(0, 0).round_timestamp(17), 17);
    /// ```
    pub fn round_timestamp(&self, timestamp: u32) -> u32 {
        if self.precision == 0 {
            return timestamp;
        }
        timestamp / self.precision * self.precision
    }
}

impl fmt::Display for Retention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{ {}, {} }}", self.age, self.precision)
    }
}

/// Sorts retentions by age descending and checks that precision grows with age.
///
/// # Errors
///
/// Returns [`ConfigError::InconsistentRetentionOrdering`] if two steps have
/// the same age, or if an older step does not have a strictly coarser
/// precision than a younger one.
pub fn sort_retentions(mut retentions: Vec<Retention>) -> Result<Vec<Retention>, ConfigError> {
    retentions.sort_by(|a, b| b.age.cmp(&a.age));

    for window in retentions.windows(2) {
        let (older, younger) = (window[0], window[1]);
        if !(older.age > younger.age && older.precision > younger.precision) {
            return Err(ConfigError::InconsistentRetentionOrdering {
                first_age: older.age,
                first_precision: older.precision,
                second_age: younger.age,
                second_precision: younger.precision,
            });
        }
    }

    Ok(retentions)
}

/// Which paths a pattern is considered for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum RuleKind {
    /// Plain and tagged paths.
    #[default]
    All,

    /// Paths without tags.
    Plain,

    /// Tagged paths, matched by regex over the full path.
    Tagged,

    /// Tagged paths, matched by per-tag terms.
    TaggedMap,
}

impl RuleKind {
    /// The name used in configuration.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Plain => "plain",
            Self::Tagged => "tagged",
            Self::TaggedMap => "tagged_map",
        }
    }
}

impl FromStr for RuleKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(Self::All),
            "plain" => Ok(Self::Plain),
            "tagged" => Ok(Self::Tagged),
            "tagged_map" => Ok(Self::TaggedMap),
            _ => Err(ConfigError::InvalidRuleType {
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which half of a rollup rule a pattern defines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatternKind {
    /// Retentions only, no aggregate function.
    RetentionOnly,

    /// Aggregate function only, no retentions.
    AggregationOnly,

    /// Both an aggregate function and retentions.
    Both,
}

impl PatternKind {
    /// Derives the kind from which halves are present.
    ///
    /// Returns `None` when neither is.
    pub fn from_parts(has_function: bool, has_retentions: bool) -> Option<Self> {
        match (has_function, has_retentions) {
            (true, true) => Some(Self::Both),
            (true, false) => Some(Self::AggregationOnly),
            (false, true) => Some(Self::RetentionOnly),
            (false, false) => None,
        }
    }

    /// Whether the pattern can fill the retention slot.
    pub fn has_retention(self) -> bool {
        matches!(self, Self::RetentionOnly | Self::Both)
    }

    /// Whether the pattern can fill the aggregation slot.
    pub fn has_aggregation(self) -> bool {
        matches!(self, Self::AggregationOnly | Self::Both)
    }
}

/// How a pattern decides whether it applies to a path.
#[derive(Debug, Clone, PartialEq)]
pub enum Matcher {
    /// No regexp: the fallback pattern.
    Default,

    /// A regex over the full path string.
    Regex(PathRegex),

    /// Per-tag terms over a decomposed tagged path.
    TagMap(TagMap),
}

impl Matcher {
    /// Builds the matcher for a pattern's regexp.
    ///
    /// An absent regexp, or one that is empty once normalised, yields
    /// [`Matcher::Default`]. Returns the matcher together with the source
    /// text it was built from, after any rewriting.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the regexp or tag terms do not compile.
    pub fn build(rule_kind: RuleKind, regexp: Option<&str>) -> Result<(Self, String), ConfigError> {
        let source = regexp.unwrap_or_default();

        match rule_kind {
            RuleKind::TaggedMap => {
                let compact: String = source.chars().filter(|c| !c.is_whitespace()).collect();
                if compact.is_empty() {
                    return Ok((Self::Default, String::new()));
                }
                let map = TagMap::parse(&compact)?;
                Ok((Self::TagMap(map), compact))
            }
            RuleKind::Tagged => {
                let rewritten = build_tagged_regex(source)?;
                if rewritten.is_empty() {
                    return Ok((Self::Default, String::new()));
                }
                let regex = PathRegex::new(&rewritten)?;
                Ok((Self::Regex(regex), rewritten))
            }
            RuleKind::All | RuleKind::Plain => {
                if source.is_empty() {
                    return Ok((Self::Default, String::new()));
                }
                let regex = PathRegex::new(source)?;
                Ok((Self::Regex(regex), source.to_string()))
            }
        }
    }
}

/// Rewrites a `tagged` rule written as a tag list into a regex.
///
/// Sources without `;` are plain regexes and are returned with spaces
/// removed. Otherwise the source is a list of `key=value` terms, optionally
/// led by a bare metric name; a single tag is written with a trailing `;`.
///
/// # Errors
///
/// Returns [`ConfigError::EmptyTagSpec`] if the list names nothing.
///
/// # Examples
///
/// ```rust
/// use rollup::pattern::build_tagged_regex;
///
/// assert_eq!(
///     build_tagged_regex("cpu; env=prod; dc=eu").unwrap(),
///     r"cpu\?(.*&)?dc=eu&(.*&)?env=prod(&.*)?$"
/// );
/// assert_eq!(build_tagged_regex("env=prod;").unwrap(), r"[\?&]env=prod(&.*)?$");
/// assert_eq!(build_tagged_regex("cpu;").unwrap(), r"cpu\?");
/// ```
pub fn build_tagged_regex(source: &str) -> Result<String, ConfigError> {
    let compact: String = source.chars().filter(|c| *c != ' ').collect();
    if !compact.contains(';') {
        return Ok(compact);
    }

    let mut tags: Vec<&str> = compact.split(';').filter(|s| !s.is_empty()).collect();
    let Some(first) = tags.first().copied() else {
        return Err(ConfigError::EmptyTagSpec {
            source_text: source.to_string(),
        });
    };

    let mut regex = String::with_capacity(compact.len() * 2);
    if first.contains('=') {
        regex.push_str(r"[\?&]");
    } else {
        if tags.len() == 1 {
            return Ok(format!(r"{first}\?"));
        }
        regex.push_str(first);
        regex.push_str(r"\?(.*&)?");
        tags.remove(0);
    }

    tags.sort_unstable();
    regex.push_str(&tags.join("&(.*&)?"));
    regex.push_str("(&.*)?$");
    Ok(regex)
}

/// A compiled rollup pattern.
///
/// Patterns are built once by the compiler and never change afterwards.
/// Retentions are kept sorted by age descending.
#[derive(Debug, Clone)]
pub struct Pattern {
    element: String,
    rule_kind: RuleKind,
    matcher: Matcher,
    regexp: String,
    function: Option<Arc<dyn AggregateFunction>>,
    retentions: Vec<Retention>,
    kind: PatternKind,
}

impl Pattern {
    /// Compiles a pattern.
    ///
    /// # Arguments
    ///
    /// * `element` - Config key the pattern was read from, for diagnostics
    /// * `rule_kind` - Which paths the pattern is considered for
    /// * `regexp` - Path regexp or tag terms; `None` makes a default pattern
    /// * `function` - Resolved aggregate function, if any
    /// * `retentions` - Retention steps in any order
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingRuleBody`] if neither a function nor
    /// retentions are given, [`ConfigError::InconsistentRetentionOrdering`]
    /// if the retentions do not grow together, and regex errors from
    /// building the matcher.
    pub fn new(
        element: &str,
        rule_kind: RuleKind,
        regexp: Option<&str>,
        function: Option<Arc<dyn AggregateFunction>>,
        retentions: Vec<Retention>,
    ) -> Result<Self, ConfigError> {
        let kind = PatternKind::from_parts(function.is_some(), !retentions.is_empty()).ok_or_else(
            || ConfigError::MissingRuleBody {
                element: element.to_string(),
            },
        )?;
        let (matcher, regexp) = Matcher::build(rule_kind, regexp)?;
        let retentions = sort_retentions(retentions)?;

        Ok(Self {
            element: element.to_string(),
            rule_kind,
            matcher,
            regexp,
            function,
            retentions,
            kind,
        })
    }

    /// Config key the pattern was read from.
    pub fn element(&self) -> &str {
        &self.element
    }

    /// Which paths the pattern is considered for.
    pub fn rule_kind(&self) -> RuleKind {
        self.rule_kind
    }

    /// How the pattern matches paths.
    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    /// The regexp as compiled, after tag-list rewriting; empty for default patterns.
    pub fn regexp(&self) -> &str {
        &self.regexp
    }

    /// The aggregate function, if the pattern defines one.
    pub fn function(&self) -> Option<&Arc<dyn AggregateFunction>> {
        self.function.as_ref()
    }

    /// Name of the aggregate function, if any.
    pub fn function_name(&self) -> Option<String> {
        self.function.as_ref().map(|f| f.name())
    }

    /// Retention steps, oldest first.
    pub fn retentions(&self) -> &[Retention] {
        &self.retentions
    }

    /// Which half of a rule the pattern defines.
    pub fn kind(&self) -> PatternKind {
        self.kind
    }

    /// Whether this is a fallback pattern without a regexp.
    pub fn is_default(&self) -> bool {
        matches!(self.matcher, Matcher::Default)
    }

    /// The retention step that applies to data of the given age in seconds.
    ///
    /// Returns `None` if the pattern has no retentions or the data is
    /// younger than every step.
    pub fn retention_for_age(&self, age: u32) -> Option<&Retention> {
        self.retentions.iter().find(|r| r.age <= age)
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.regexp == other.regexp
            && self.rule_kind == other.rule_kind
            && self.function_name() == other.function_name()
            && self.retentions == other.retentions
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{ rule_type = {}", self.rule_kind)?;
        if !self.regexp.is_empty() {
            write!(f, ", regexp = '{}'", self.regexp)?;
        }
        if let Some(name) = self.function_name() {
            write!(f, ", function = {name}")?;
        }
        if self.retentions.is_empty() {
            f.write_str(" ")?;
        } else {
            f.write_str(",\n  retentions = {\n")?;
            for (i, retention) in self.retentions.iter().enumerate() {
                write!(f, "    {retention}")?;
                if i + 1 < self.retentions.len() {
                    f.write_str(",")?;
                }
                f.write_str("\n")?;
            }
            f.write_str("  }\n")?;
        }
        f.write_str("}")
    }
}
