//! Graphex CLI
//!
//! Command-line front end for the render engine:
//! - Parse a target and print its canonical form
//! - Evaluate a target against a JSON fixture file
//! - List function descriptions
//! - Generate a default config file

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use graphex::config::{generate_default_config, Config};
use graphex::expr::{Evaluator, FunctionRegistry, StaticFetcher};
use graphex::parser::{parse, parse_interval};
use graphex::series::{consolidate_all, Series};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "graphex")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Graphite-compatible render expression engine")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: search the standard locations)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format (text, json)
    #[arg(short, long, default_value = "text", global = true)]
    pub format: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Parse a target and print its AST
    Parse {
        /// Render target, e.g. "sumSeries(servers.*.cpu)"
        target: String,
    },

    /// Evaluate a target against a fixture file
    Eval {
        /// Render target
        target: String,
        /// JSON array of series fixtures
        #[arg(short, long)]
        data: PathBuf,
        /// Window start: epoch seconds, "now" or a relative interval like "-1h"
        #[arg(long, default_value = "-1d", allow_hyphen_values = true)]
        from: String,
        /// Window end, same forms as --from
        #[arg(long, default_value = "now", allow_hyphen_values = true)]
        until: String,
        /// Downsample each result to at most this many points
        #[arg(long)]
        max_data_points: Option<usize>,
    },

    /// Show function descriptions as JSON
    Functions {
        /// Only this function
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// One series in JSON output, graphite render format
#[derive(Serialize)]
struct RenderedSeries<'a> {
    target: &'a str,
    tags: &'a BTreeMap<String, String>,
    datapoints: Vec<(Option<f64>, i64)>,
}

impl<'a> From<&'a Series> for RenderedSeries<'a> {
    fn from(s: &'a Series) -> Self {
        let datapoints = s
            .values
            .iter()
            .enumerate()
            .map(|(i, &v)| ((!v.is_nan()).then_some(v), s.timestamp(i)))
            .collect();
        Self {
            target: &s.name,
            tags: &s.tags,
            datapoints,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };
    init_logging(&config);

    match cli.command {
        Commands::Parse { target } => {
            let expr = parse(&target)?;
            if cli.format == "json" {
                let out = serde_json::json!({
                    "target": target,
                    "canonical": expr.to_string(),
                    "ast": format!("{:?}", expr),
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                println!("{:#?}", expr);
                println!("{}", expr);
            }
        }

        Commands::Eval {
            target,
            data,
            from,
            until,
            max_data_points,
        } => {
            let now = Utc::now().timestamp();
            let from = resolve_time(&from, now)?;
            let until = resolve_time(&until, now)?;
            anyhow::ensure!(from < until, "--from must be before --until");

            let engine = &config.engine;
            let fetcher = StaticFetcher::from_path_with_defaults(
                &data,
                &engine.default_consolidation_func,
                engine.default_x_files_factor,
            )
            .with_context(|| format!("loading fixtures from {}", data.display()))?;
            tracing::info!(series = fetcher.len(), path = %data.display(), "loaded fixtures");

            let eval = Evaluator::new(Arc::new(FunctionRegistry::with_builtins()), Arc::new(fetcher));
            let mut series = eval.execute(&target, from, until).await?;
            if let Some(mdp) = max_data_points.or(engine.max_data_points) {
                series = consolidate_all(&series, mdp, engine.nudge_start_time_on_aggregation);
            }

            print_series(&series, &cli.format)?;
        }

        Commands::Functions { name } => {
            let registry = FunctionRegistry::with_builtins();
            let json = match name {
                Some(name) => {
                    let desc = registry
                        .description(&name)
                        .with_context(|| format!("unknown function: {}", name))?;
                    serde_json::to_string_pretty(desc)?
                }
                None => {
                    let all: BTreeMap<&str, _> = registry
                        .descriptions()
                        .into_iter()
                        .map(|d| (d.name.as_str(), d))
                        .collect();
                    serde_json::to_string_pretty(&all)?
                }
            };
            println!("{}", json);
        }

        Commands::Config { output } => {
            let content = generate_default_config();
            match output {
                Some(path) => {
                    std::fs::write(&path, content)?;
                    println!("Config written to {}", path.display());
                }
                None => print!("{}", content),
            }
        }
    }

    Ok(())
}

/// Logs go to stderr so stdout stays machine-readable
fn init_logging(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| format!("graphex={}", config.logging.level)),
    );
    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

/// `now`, epoch seconds, or an interval relative to now
fn resolve_time(s: &str, now: i64) -> anyhow::Result<i64> {
    if s == "now" {
        return Ok(now);
    }
    if let Ok(ts) = s.parse::<i64>() {
        return Ok(ts);
    }
    let offset = parse_interval(s, -1).with_context(|| format!("invalid time: {}", s))?;
    Ok(now + offset)
}

fn print_series(series: &[Series], format: &str) -> anyhow::Result<()> {
    if format == "json" {
        let rendered: Vec<RenderedSeries> = series.iter().map(RenderedSeries::from).collect();
        println!("{}", serde_json::to_string_pretty(&rendered)?);
        return Ok(());
    }

    for s in series {
        println!("{}  start={} step={} points={}", s.name, s.start_time, s.step_time, s.len());
        for (i, v) in s.values.iter().enumerate() {
            if v.is_nan() {
                println!("  {}\tNone", s.timestamp(i));
            } else {
                println!("  {}\t{}", s.timestamp(i), v);
            }
        }
    }
    Ok(())
}
