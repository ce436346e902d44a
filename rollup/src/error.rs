//! Error types for rollup rule compilation.
//!
//! Every error here is raised while compiling a configuration into
//! [`Params`](crate::Params). Rule selection itself never fails; a path that
//! matches nothing yields [`RollupRule::NoRuleMatched`](crate::RollupRule).

use std::path::PathBuf;

use thiserror::Error;

/// The main error type for all rollup operations.
///
/// A compile either produces a complete `Params` or one of these errors; no
/// partially built state is ever returned. None of these are retryable: the
/// configuration has to be fixed.
#[derive(Error, Debug)]
pub enum RollupError {
    /// The rollup configuration is invalid.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// The configuration document could not be read or a value could not be
    /// extracted from it.
    #[error("config source error: {0}")]
    Source(#[from] SourceError),

    /// The aggregate function resolver rejected a function.
    #[error("function error: {0}")]
    Function(#[from] FunctionError),
}

/// Errors in the content of a rollup configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration has no element with the requested name.
    #[error("no '{section}' element in configuration")]
    MissingConfigSection {
        /// The element that was looked up.
        section: String,
    },

    /// An element contains a key this engine does not understand.
    #[error("unknown element in config: {key}")]
    UnknownConfigKey {
        /// Fully qualified key of the unknown element.
        key: String,
    },

    /// A pattern declares neither an aggregate function nor retentions.
    #[error("at least one of an aggregate function or retention rules is mandatory for rollup pattern '{element}'")]
    MissingRuleBody {
        /// The offending pattern element.
        element: String,
    },

    /// The `default` element declares a rule type other than `all`.
    #[error("default must have rule_type all, got {rule_type}")]
    InvalidDefaultRuleType {
        /// The rule type that was declared.
        rule_type: String,
    },

    /// The `rule_type` value is not one of `all`, `plain`, `tagged`, `tagged_map`.
    #[error("invalid rule type: {value}")]
    InvalidRuleType {
        /// The rejected value.
        value: String,
    },

    /// The aggregate function needs arena allocation, which rollup merges cannot provide.
    #[error("aggregate function {name} isn't supported in rollup patterns")]
    UnsupportedFunction {
        /// Name of the rejected function.
        name: String,
    },

    /// The `function` value could not be split into a name and parameter list.
    #[error("invalid aggregate function '{value}': {reason}")]
    InvalidFunction {
        /// The configured value.
        value: String,
        /// What is wrong with it.
        reason: String,
    },

    /// Two retentions do not grow age and precision together.
    #[error("age and precision should only grow up: {first_age}:{first_precision} vs {second_age}:{second_precision}")]
    InconsistentRetentionOrdering {
        /// Age of the older retention.
        first_age: u32,
        /// Precision of the older retention.
        first_precision: u32,
        /// Age of the younger retention.
        second_age: u32,
        /// Precision of the younger retention.
        second_precision: u32,
    },

    /// A `tagged_map` term uses an operator other than `=`, `=~`, `!=`, `!=~`.
    #[error("unknown comparator in tagged map: {operator}")]
    UnknownTermOperator {
        /// The operator as written.
        operator: String,
    },

    /// A `tagged` regexp consists only of separators.
    #[error("tagged rule '{source_text}' does not name any tag")]
    EmptyTagSpec {
        /// The configured regexp text.
        source_text: String,
    },

    /// A regular expression failed to compile.
    #[error("invalid regexp '{pattern}': {source}")]
    InvalidRegex {
        /// The pattern text handed to the regex engine.
        pattern: String,
        /// The underlying regex error.
        #[source]
        source: regex::Error,
    },
}

/// Errors raised by a [`ConfigSource`](crate::config::ConfigSource).
#[derive(Error, Debug)]
pub enum SourceError {
    /// A required key is not present.
    #[error("missing config key '{key}'")]
    MissingKey {
        /// The key that was looked up.
        key: String,
    },

    /// A key is present but its value has the wrong shape.
    #[error("invalid value for config key '{key}': {reason}")]
    InvalidValue {
        /// The key that was looked up.
        key: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// The configuration file could not be read.
    #[error("failed to read config file '{}': {source}", path.display())]
    Read {
        /// The file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration document is not valid JSON.
    #[error("failed to parse config document: {source}")]
    Parse {
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

/// Errors raised by a [`FunctionResolver`](crate::function::FunctionResolver).
#[derive(Error, Debug)]
pub enum FunctionError {
    /// No aggregate function is registered under this name.
    #[error("unknown aggregate function {name}")]
    UnknownFunction {
        /// The requested name.
        name: String,
    },

    /// The function exists but the parameters do not fit it.
    #[error("invalid parameters for aggregate function {name}: {reason}")]
    InvalidParameters {
        /// The requested name.
        name: String,
        /// Why the parameters were rejected.
        reason: String,
    },
}

/// Type alias for `Result<T, RollupError>`.
pub type Result<T> = std::result::Result<T, RollupError>;
