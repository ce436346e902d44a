//! Compiling rollup configuration into [`Params`].
//!
//! # Configuration layout
//!
//! ```text
//! graphite_rollup
//! ├── path_column_name       (default "Path")
//! ├── time_column_name       (default "Time")
//! ├── value_column_name      (default "Value")
//! ├── version_column_name    (default "Timestamp")
//! ├── pattern                (repeated, in precedence order)
//! │   ├── rule_type          all | plain | tagged | tagged_map (default all)
//! │   ├── regexp
//! │   ├── function           name or name(params)
//! │   └── retention          (repeated)
//! │       ├── age
//! │       └── precision
//! └── default                (at most one, rule_type must be all)
//! ```
//!
//! Patterns keep their declaration order, which is their precedence order
//! during selection. The `default` pattern is always placed last, wherever
//! it appears in the document.

use crate::config::ConfigSource;
use crate::error::{ConfigError, Result};
use crate::function::{BuiltinFunctions, FunctionResolver, parse_function_spec};
use crate::pattern::{Pattern, Retention, RuleKind};

/// Element name rollup configuration is conventionally stored under.
pub const DEFAULT_CONFIG_ELEMENT: &str = "graphite_rollup";

/// Column names of the rollup table.
///
/// The rule engine does not use these; they are carried for the merge that
/// applies the selected rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Columns {
    /// Metric path column.
    pub path: String,

    /// Measurement time column.
    pub time: String,

    /// Measured value column.
    pub value: String,

    /// Row version column; for equal path and time the highest version wins.
    pub version: String,
}

impl Default for Columns {
    fn default() -> Self {
        Self {
            path: "Path".to_string(),
            time: "Time".to_string(),
            value: "Value".to_string(),
            version: "Timestamp".to_string(),
        }
    }
}

/// Compiled rollup rules.
///
/// Built once when a table is attached and read concurrently by every merge
/// afterwards. `Params` is immutable; all selection goes through `&self`.
#[derive(Debug, Clone)]
pub struct Params {
    config_name: String,
    columns: Columns,
    patterns: Vec<Pattern>,
    typed: bool,
    has_tag_map_patterns: bool,
    plain: Vec<usize>,
    tagged: Vec<usize>,
}

impl Params {
    /// Compiles the rollup configuration stored under `element`.
    ///
    /// # Arguments
    ///
    /// * `config` - The configuration document
    /// * `element` - Key of the rollup section, usually [`DEFAULT_CONFIG_ELEMENT`]
    /// * `resolver` - Resolves `function` values into aggregate functions
    ///
    /// # Errors
    ///
    /// Returns [`RollupError`](crate::RollupError) on the first problem
    /// found; no partially compiled rules are ever returned.
    pub fn from_config<C, R>(config: &C, element: &str, resolver: &R) -> Result<Self>
    where
        C: ConfigSource + ?Sized,
        R: FunctionResolver + ?Sized,
    {
        if !config.has(element) {
            return Err(ConfigError::MissingConfigSection {
                section: element.to_string(),
            }
            .into());
        }

        let column = |name: &str, default: &str| config.get_string_or(&format!("{element}.{name}"), default);
        let defaults = Columns::default();
        let columns = Columns {
            path: column("path_column_name", &defaults.path)?,
            time: column("time_column_name", &defaults.time)?,
            value: column("value_column_name", &defaults.value)?,
            version: column("version_column_name", &defaults.version)?,
        };

        let mut patterns = Vec::new();
        let mut has_default = false;
        for key in config.keys(element) {
            match key.as_str() {
                "default" => has_default = true,
                "path_column_name" | "time_column_name" | "value_column_name"
                | "version_column_name" => {}
                _ if is_element(&key, "pattern") => {
                    let pattern_key = format!("{element}.{key}");
                    patterns.push(read_pattern(config, &pattern_key, resolver, false)?);
                }
                _ => {
                    return Err(ConfigError::UnknownConfigKey {
                        key: format!("{element}.{key}"),
                    }
                    .into());
                }
            }
        }

        if has_default {
            let default_key = format!("{element}.default");
            patterns.push(read_pattern(config, &default_key, resolver, true)?);
        }

        let params = Self::from_patterns(element, columns, patterns);
        tracing::info!(
            config = element,
            patterns = params.patterns.len(),
            typed = params.typed,
            tag_maps = params.has_tag_map_patterns,
            "compiled rollup rules"
        );
        Ok(params)
    }

    /// Assembles compiled patterns, deriving the typed flags and buckets.
    ///
    /// `patterns` must be in precedence order with any default pattern last.
    pub fn from_patterns(config_name: &str, columns: Columns, patterns: Vec<Pattern>) -> Self {
        let typed = patterns.iter().any(|p| p.rule_kind() != RuleKind::All);
        let has_tag_map_patterns = patterns
            .iter()
            .any(|p| p.rule_kind() == RuleKind::TaggedMap);

        let mut plain = Vec::new();
        let mut tagged = Vec::new();
        for (i, pattern) in patterns.iter().enumerate() {
            match pattern.rule_kind() {
                RuleKind::All => {
                    if typed {
                        plain.push(i);
                        tagged.push(i);
                    }
                }
                RuleKind::Plain => plain.push(i),
                RuleKind::Tagged | RuleKind::TaggedMap => tagged.push(i),
            }
        }

        Self {
            config_name: config_name.to_string(),
            columns,
            patterns,
            typed,
            has_tag_map_patterns,
            plain,
            tagged,
        }
    }

    /// Name of the configuration element the rules were read from.
    pub fn config_name(&self) -> &str {
        &self.config_name
    }

    /// Table column names.
    pub fn columns(&self) -> &Columns {
        &self.columns
    }

    /// All patterns in precedence order.
    pub fn patterns(&self) -> &[Pattern] {
        &self.patterns
    }

    /// Whether any pattern is restricted to plain or tagged paths.
    pub fn is_typed(&self) -> bool {
        self.typed
    }

    /// Whether any pattern is a `tagged_map` rule.
    pub fn has_tag_map_patterns(&self) -> bool {
        self.has_tag_map_patterns
    }

    /// Patterns considered for plain paths when the rules are typed.
    pub fn plain_patterns(&self) -> impl Iterator<Item = &Pattern> {
        self.bucket(&self.plain)
    }

    /// Patterns considered for tagged paths when the rules are typed.
    pub fn tagged_patterns(&self) -> impl Iterator<Item = &Pattern> {
        self.bucket(&self.tagged)
    }

    pub(crate) fn bucket<'a>(&'a self, indices: &'a [usize]) -> impl Iterator<Item = &'a Pattern> {
        indices.iter().map(move |&i| &self.patterns[i])
    }

    pub(crate) fn plain_indices(&self) -> &[usize] {
        &self.plain
    }

    pub(crate) fn tagged_indices(&self) -> &[usize] {
        &self.tagged
    }
}

/// Compiles rollup configuration using the builtin function catalog.
///
/// # Errors
///
/// See [`Params::from_config`].
///
/// # Examples
///
/// ```rust
/// use rollup::config::JsonConfig;
/// use rollup::compile;
///
/// let config = JsonConfig::from_json_str(r#"{
///     "graphite_rollup": {
///         "pattern": { "regexp": "\\.max$", "function": "max" },
///         "default": { "function": "avg", "retention": { "age": 0, "precision": 60 } }
///     }
/// }"#)?;
///
/// let params = compile(&config, "graphite_rollup")?;
/// let rule = params.select("servers.web1.cpu.max");
/// assert_eq!(rule.aggregation().and_then(|p| p.function_name()).as_deref(), Some("max"));
/// assert!(rule.retention().unwrap().is_default());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn compile<C: ConfigSource + ?Sized>(config: &C, element: &str) -> Result<Params> {
    Params::from_config(config, element, &BuiltinFunctions)
}

/// Reads and compiles one `pattern` or `default` element.
fn read_pattern<C, R>(config: &C, key: &str, resolver: &R, is_default: bool) -> Result<Pattern>
where
    C: ConfigSource + ?Sized,
    R: FunctionResolver + ?Sized,
{
    let mut rule_kind = RuleKind::All;
    let mut regexp = None;
    let mut function = None;
    let mut retentions = Vec::new();

    for child in config.keys(key) {
        let child_key = format!("{key}.{child}");
        match child.as_str() {
            "regexp" => regexp = Some(config.get_string(&child_key)?),
            "rule_type" => rule_kind = config.get_string(&child_key)?.parse()?,
            "function" => {
                let value = config.get_string(&child_key)?;
                let (name, fn_params) = parse_function_spec(&value)?;
                let resolved = resolver.resolve(&name, &fn_params)?;
                if resolved.allocates_arena_memory() {
                    return Err(ConfigError::UnsupportedFunction {
                        name: resolved.name(),
                    }
                    .into());
                }
                function = Some(resolved);
            }
            _ if is_element(&child, "retention") => {
                retentions.push(Retention::new(
                    config.get_u32(&format!("{child_key}.age"))?,
                    config.get_u32(&format!("{child_key}.precision"))?,
                ));
            }
            _ => return Err(ConfigError::UnknownConfigKey { key: child_key }.into()),
        }
    }

    if function.is_none() && retentions.is_empty() {
        return Err(ConfigError::MissingRuleBody {
            element: key.to_string(),
        }
        .into());
    }

    if is_default && rule_kind != RuleKind::All {
        return Err(ConfigError::InvalidDefaultRuleType {
            rule_type: rule_kind.to_string(),
        }
        .into());
    }

    let pattern = Pattern::new(key, rule_kind, regexp.as_deref(), function, retentions)?;
    tracing::debug!(element = key, %pattern, "compiled rollup pattern");
    Ok(pattern)
}

/// Matches `name` and its repeated forms `name[1]`, `name[2]`, ...
fn is_element(key: &str, name: &str) -> bool {
    match key.strip_prefix(name) {
        Some("") => true,
        Some(rest) => rest
            .strip_prefix('[')
            .and_then(|r| r.strip_suffix(']'))
            .is_some_and(|index| !index.is_empty() && index.bytes().all(|b| b.is_ascii_digit())),
        None => false,
    }
}
