//! Integration tests for compiling rollup configuration documents.

use std::io::Write;

use rollup::config::JsonConfig;
use rollup::error::SourceError;
use rollup::{ConfigError, PatternKind, Result, Retention, RollupError, RuleKind, compile};
use serde_json::json;
use tempfile::NamedTempFile;

fn compile_value(value: serde_json::Value) -> Result<rollup::Params> {
    compile(&JsonConfig::new(value), "graphite_rollup")
}

fn config_error(value: serde_json::Value) -> ConfigError {
    match compile_value(value) {
        Err(RollupError::Config(e)) => e,
        other => panic!("expected a config error, got {other:?}"),
    }
}

#[test]
fn test_compile_from_file() -> Result<()> {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{
          "graphite_rollup": {{
            "version_column_name": "Version",
            "pattern": [
              {{ "regexp": "click_cost", "function": "any",
                 "retention": [ {{ "age": "0", "precision": "5" }}, {{ "age": "86400", "precision": "60" }} ] }},
              {{ "rule_type": "tagged_map", "regexp": "env=prod", "function": "quantile(0.95)" }}
            ],
            "default": {{ "function": "max", "retention": {{ "age": 0, "precision": 60 }} }}
          }}
        }}"#
    )
    .unwrap();

    let config = JsonConfig::from_path(file.path())?;
    let params = compile(&config, "graphite_rollup")?;

    assert_eq!(params.patterns().len(), 3);
    assert_eq!(params.columns().version, "Version");
    assert_eq!(params.columns().path, "Path");

    let click = &params.patterns()[0];
    assert_eq!(click.kind(), PatternKind::Both);
    assert_eq!(click.retentions(), &[Retention::new(86400, 60), Retention::new(0, 5)]);

    let quantile = &params.patterns()[1];
    assert_eq!(quantile.rule_kind(), RuleKind::TaggedMap);
    assert_eq!(quantile.kind(), PatternKind::AggregationOnly);
    assert_eq!(quantile.function_name().as_deref(), Some("quantile(0.95)"));

    assert!(params.patterns()[2].is_default());
    Ok(())
}

#[test]
fn test_compile_missing_file() {
    let err = JsonConfig::from_path("/nonexistent/rollup.json").unwrap_err();
    assert!(matches!(err, SourceError::Read { .. }));
}

#[test]
fn test_compile_is_repeatable() -> Result<()> {
    let value = json!({
        "graphite_rollup": {
            "pattern": [
                { "regexp": "\\.sum$", "function": "sum" },
                { "rule_type": "tagged", "regexp": "cpu; env=prod", "retention": { "age": 0, "precision": 10 } }
            ],
            "default": { "function": "avg", "retention": { "age": 0, "precision": 60 } }
        }
    });

    let first = compile_value(value.clone())?;
    let second = compile_value(value)?;
    assert_eq!(first.patterns(), second.patterns());
    Ok(())
}

#[test]
fn test_inconsistent_retentions() {
    let err = config_error(json!({
        "graphite_rollup": {
            "default": {
                "function": "avg",
                "retention": [
                    { "age": 0, "precision": 3600 },
                    { "age": 3600, "precision": 60 }
                ]
            }
        }
    }));
    assert!(matches!(
        err,
        ConfigError::InconsistentRetentionOrdering {
            first_age: 3600,
            first_precision: 60,
            second_age: 0,
            second_precision: 3600,
        }
    ));

    // Age grows while precision shrinks.
    let err = config_error(json!({
        "graphite_rollup": {
            "pattern": {
                "regexp": "^a",
                "retention": [
                    { "age": 0, "precision": 60 },
                    { "age": 100, "precision": 30 }
                ]
            }
        }
    }));
    assert!(matches!(err, ConfigError::InconsistentRetentionOrdering { .. }));
}

#[test]
fn test_missing_rule_body() {
    let err = config_error(json!({
        "graphite_rollup": { "pattern": { "regexp": "^a" } }
    }));
    assert!(matches!(
        err,
        ConfigError::MissingRuleBody { ref element } if element == "graphite_rollup.pattern"
    ));
}

#[test]
fn test_unknown_config_key() {
    let err = config_error(json!({
        "graphite_rollup": {
            "pattern": { "regexp": "^a", "function": "sum" },
            "rollup": {}
        }
    }));
    assert!(matches!(err, ConfigError::UnknownConfigKey { .. }));
}

#[test]
fn test_unsupported_function() {
    for function in ["groupArray", "uniq", "uniqExact", "topK(5)"] {
        let err = config_error(json!({
            "graphite_rollup": { "pattern": { "regexp": "^a", "function": function } }
        }));
        assert!(
            matches!(err, ConfigError::UnsupportedFunction { .. }),
            "{function}: {err}"
        );
    }
}

#[test]
fn test_invalid_default_rule_type() {
    for rule_type in ["plain", "tagged", "tagged_map"] {
        let err = config_error(json!({
            "graphite_rollup": { "default": { "rule_type": rule_type, "function": "avg" } }
        }));
        assert!(
            matches!(err, ConfigError::InvalidDefaultRuleType { rule_type: ref got } if got == rule_type),
            "{rule_type}: {err}"
        );
    }
}

#[test]
fn test_unknown_term_operator() {
    let err = config_error(json!({
        "graphite_rollup": {
            "pattern": { "rule_type": "tagged_map", "regexp": "env==prod", "function": "sum" }
        }
    }));
    assert!(matches!(
        err,
        ConfigError::UnknownTermOperator { ref operator } if operator == "=="
    ));
}

#[test]
fn test_missing_config_section() {
    let err = config_error(json!({ "other_rollup": {} }));
    assert!(matches!(
        err,
        ConfigError::MissingConfigSection { ref section } if section == "graphite_rollup"
    ));
    assert!(err.to_string().contains("graphite_rollup"));
}

#[test]
fn test_empty_tag_spec() {
    let err = config_error(json!({
        "graphite_rollup": {
            "pattern": { "rule_type": "tagged", "regexp": " ; ; ", "function": "sum" }
        }
    }));
    assert!(matches!(err, ConfigError::EmptyTagSpec { .. }));
}
