//! CLI for the rollup rule engine.
//!
//! Provides commands for validating rollup configurations, resolving the
//! rules that apply to metric paths, and benchmarking rule selection.

use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{Parser, Subcommand, ValueEnum};
use rollup::{JsonConfig, Params, Pattern, RollupRule, compile};
use tracing_subscriber::EnvFilter;

/// rollup - Graphite-style rollup rule engine CLI.
#[derive(Parser)]
#[command(name = "rollup", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Compile a configuration and print its patterns.
    Check {
        /// Path to the JSON configuration document.
        config: PathBuf,

        /// Element holding the rollup rules.
        #[arg(long, default_value = rollup::DEFAULT_CONFIG_ELEMENT)]
        section: String,
    },

    /// Print the retention and aggregation patterns selected for paths.
    Select {
        /// Path to the JSON configuration document.
        config: PathBuf,

        /// Metric paths to resolve.
        #[arg(required = true)]
        paths: Vec<String>,

        /// Element holding the rollup rules.
        #[arg(long, default_value = rollup::DEFAULT_CONFIG_ELEMENT)]
        section: String,

        /// Output format.
        #[arg(long, default_value = "text")]
        format: OutputFormat,
    },

    /// Time rule selection over synthetic plain and tagged paths.
    Bench {
        /// Path to the JSON configuration document.
        config: PathBuf,

        /// Number of distinct paths to generate.
        #[arg(long, default_value = "100000")]
        paths: usize,

        /// Element holding the rollup rules.
        #[arg(long, default_value = rollup::DEFAULT_CONFIG_ELEMENT)]
        section: String,
    },
}

/// Output format for selection results.
#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Human-readable pattern listing.
    Text,
    /// JSON array of objects.
    Json,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Check { config, section } => cmd_check(&config, &section),
        Commands::Select {
            config,
            paths,
            section,
            format,
        } => cmd_select(&config, &section, &paths, &format),
        Commands::Bench {
            config,
            paths,
            section,
        } => cmd_bench(&config, &section, paths),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn load(config_path: &Path, section: &str) -> Result<Params, Box<dyn std::error::Error>> {
    let config = JsonConfig::from_path(config_path)?;
    let params = compile(&config, section)?;
    tracing::info!(
        config = %config_path.display(),
        section,
        patterns = params.patterns().len(),
        typed = params.is_typed(),
        "loaded rollup rules"
    );
    Ok(params)
}

/// Implements `rollup check <config>`.
fn cmd_check(config_path: &Path, section: &str) -> Result<(), Box<dyn std::error::Error>> {
    let params = load(config_path, section)?;

    println!("Config: {} ({section})", config_path.display());
    let columns = params.columns();
    println!(
        "Columns: path={}, time={}, value={}, version={}",
        columns.path, columns.time, columns.value, columns.version
    );
    println!();

    println!("Patterns: {}", params.patterns().len());
    for (i, pattern) in params.patterns().iter().enumerate() {
        println!("  {i}: {} ({:?})", pattern.element(), pattern.kind());
        for line in pattern.to_string().lines() {
            println!("     {line}");
        }
    }

    if params.is_typed() {
        println!();
        println!("Plain path rules:");
        for pattern in params.plain_patterns() {
            println!("  {}", pattern.element());
        }
        println!("Tagged path rules:");
        for pattern in params.tagged_patterns() {
            println!("  {}", pattern.element());
        }
    }

    Ok(())
}

/// Implements `rollup select <config> <path>...`.
fn cmd_select(
    config_path: &Path,
    section: &str,
    paths: &[String],
    format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let params = load(config_path, section)?;

    match format {
        OutputFormat::Text => {
            for path in paths {
                println!("{path}");
                let rule = params.select(path);
                tracing::debug!(path, matched = rule.is_matched(), "selected");
                match rule {
                    RollupRule::Matched {
                        retention,
                        aggregation,
                    } => {
                        println!("  retention:   {}", retention.element());
                        for r in retention.retentions() {
                            println!("    {r}");
                        }
                        println!(
                            "  aggregation: {} ({})",
                            aggregation.element(),
                            aggregation.function_name().unwrap_or_default()
                        );
                    }
                    RollupRule::NoRuleMatched => println!("  no rule matched"),
                }
            }
        }
        OutputFormat::Json => {
            let results: Vec<serde_json::Value> = paths
                .iter()
                .map(|path| {
                    let rule = params.select(path);
                    tracing::debug!(path, matched = rule.is_matched(), "selected");
                    serde_json::json!({
                        "path": path,
                        "matched": rule.is_matched(),
                        "retention": rule.retention().map(pattern_json),
                        "aggregation": rule.aggregation().map(pattern_json),
                    })
                })
                .collect();

            println!("{}", serde_json::to_string_pretty(&results)?);
        }
    }

    Ok(())
}

fn pattern_json(pattern: &Pattern) -> serde_json::Value {
    serde_json::json!({
        "element": pattern.element(),
        "rule_type": pattern.rule_kind().as_str(),
        "regexp": pattern.regexp(),
        "function": pattern.function_name(),
        "retentions": pattern.retentions(),
    })
}

/// Implements `rollup bench <config>`.
#[allow(clippy::cast_precision_loss)] // Benchmark stats are fine with f64 precision
fn cmd_bench(
    config_path: &Path,
    section: &str,
    path_count: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let params = load(config_path, section)?;
    if path_count == 0 {
        return Err("--paths must be greater than 0".into());
    }

    println!("rollup select benchmark");
    println!("  Patterns: {}", params.patterns().len());
    println!("  Paths: {path_count}");
    println!();

    let paths = synthetic_paths(path_count);

    let start = Instant::now();
    let mut matched = 0usize;
    for path in &paths {
        if params.select(path).is_matched() {
            matched += 1;
        }
    }
    let elapsed = start.elapsed();
    tracing::info!(paths = path_count, matched, ?elapsed, "benchmark finished");

    let ns_per_select = elapsed.as_nanos() as f64 / path_count as f64;
    let selects_per_sec = path_count as f64 / elapsed.as_secs_f64();

    println!("Results:");
    println!("  Matched: {matched}/{path_count}");
    println!("  Elapsed: {elapsed:.3?}");
    println!("  Avg latency: {ns_per_select:.1} ns/select");
    println!("  Throughput: {selects_per_sec:.0} selects/sec");

    Ok(())
}

/// Generates an even mix of plain and tagged paths.
fn synthetic_paths(count: usize) -> Vec<String> {
    const SUFFIXES: [&str; 6] = ["sum", "max", "min", "count", "p95", "avg"];
    const ENVS: [&str; 3] = ["prod", "staging", "test"];

    (0..count)
        .map(|i| {
            let suffix = SUFFIXES[i % SUFFIXES.len()];
            if i % 2 == 0 {
                format!("servers.host{}.cpu.{suffix}", i % 1000)
            } else {
                let env = ENVS[i % ENVS.len()];
                format!("cpu.{suffix}?env={env}&host=web{}", i % 1000)
            }
        })
        .collect()
}
