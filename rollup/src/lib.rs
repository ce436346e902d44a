//! # rollup
//!
//! Graphite-style rollup rule engine.
//!
//! rollup compiles a declarative configuration of patterns into an immutable
//! rule set and selects, for any metric path, the retention schedule and the
//! aggregate function used when old data is thinned out. It is meant to be
//! embedded in storage engines that merge time-series rows in the background:
//! compile once when a table is attached, then select concurrently from every
//! merge.
//!
//! ## Key Properties
//!
//! - Precedence-ordered patterns; a rule may take its retentions and its
//!   aggregate function from two different patterns
//! - Plain (`a.b.c`) and tagged (`name?k=v&k2=v2`) paths, with rules that
//!   apply to either or both
//! - Per-tag matching with `=`, `!=`, `=~`, `!=~` for `tagged_map` rules
//! - Selection never fails and never mutates; compile errors are reported
//!   before any rule is used
//!
//! ## Quick Start
//!
//! ```rust
//! use rollup::config::JsonConfig;
//! use rollup::compile;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = JsonConfig::from_json_str(r#"{
//!     "graphite_rollup": {
//!         "pattern": [
//!             { "regexp": "\\.sum$", "function": "sum" },
//!             { "rule_type": "tagged_map", "regexp": "env=prod",
//!               "retention": [ { "age": 0, "precision": 10 }, { "age": 86400, "precision": 600 } ] }
//!         ],
//!         "default": {
//!             "function": "avg",
//!             "retention": [ { "age": 0, "precision": 60 }, { "age": 3600, "precision": 300 } ]
//!         }
//!     }
//! }"#)?;
//!
//! let params = compile(&config, "graphite_rollup")?;
//!
//! // Aggregation from the first pattern, retentions from the default.
//! let rule = params.select("requests.sum");
//! assert_eq!(rule.aggregation().and_then(|p| p.function_name()).as_deref(), Some("sum"));
//! assert!(rule.retention().is_some_and(|p| p.is_default()));
//!
//! // Retentions from the tag map, aggregation from the default.
//! let rule = params.select("cpu?env=prod&host=web1");
//! let retention = rule.retention().and_then(|p| p.retention_for_age(90_000));
//! assert_eq!(retention.map(|r| r.precision), Some(600));
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`Params`] - Compiled, immutable rule set; build with [`compile`]
//! - [`Pattern`] - One compiled pattern: matcher, function, retentions
//! - [`RollupRule`] - The retention and aggregation patterns chosen for a path
//! - [`ConfigSource`] - Read access to the configuration tree
//!
//! ## Modules
//!
//! - [`params`] - Configuration compiler and the compiled rule set
//! - [`select`](mod@select) - Rule selection for metric paths
//! - [`pattern`] - Patterns, retentions, rule kinds and tag-list rewriting
//! - [`term`] - Tag terms for `tagged_map` rules
//! - [`path`] - Plain/tagged path classification
//! - [`matcher`] - Compiled regular expressions
//! - [`function`] - Aggregate function resolution
//! - [`config`] - Configuration sources
//! - [`error`] - Error types

pub mod config;
pub mod error;
pub mod function;
pub mod matcher;
pub mod params;
pub mod path;
pub mod pattern;
pub mod select;
pub mod term;

// Re-export primary API types at crate root for convenience.
pub use config::{ConfigSource, JsonConfig};
pub use error::{ConfigError, Result, RollupError};
pub use params::{Columns, DEFAULT_CONFIG_ELEMENT, Params, compile};
pub use pattern::{Pattern, PatternKind, Retention, RuleKind};
pub use select::{RollupRule, select};
