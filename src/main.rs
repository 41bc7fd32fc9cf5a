// portal-throttle - Command Line Entry Point
//
// - Inspect the configured action table
// - Validate configuration files
// - Replay call sequences against a simulated clock

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use portal_throttle::config::Config;
use portal_throttle::metrics;
use portal_throttle::rate_limit::{ManualClock, RateLimiter};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, Level};
use tracing_subscriber::EnvFilter;

/// portal-throttle: token-bucket throttling for portal actions
#[derive(Parser, Debug)]
#[command(name = "portal-throttle")]
#[command(version)]
#[command(about = "Advisory token-bucket throttling for portal actions", long_about = None)]
struct Args {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to a TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print Prometheus metrics after the command completes
    #[arg(long, global = true)]
    metrics: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the configured action limits
    Actions,
    /// Load and validate the configuration, then print it as TOML
    CheckConfig,
    /// Replay calls for one key at the given times (milliseconds)
    Simulate {
        /// Use the limit and window of a configured action
        #[arg(long, conflicts_with_all = ["limit", "window_ms"])]
        action: Option<String>,

        /// Permits per window
        #[arg(long, requires = "window_ms")]
        limit: Option<u32>,

        /// Window length in milliseconds
        #[arg(long, requires = "limit")]
        window_ms: Option<u64>,

        /// Call times in milliseconds, comma separated (e.g. 0,0,0,0,1000)
        #[arg(long, value_delimiter = ',', num_args = 1.., required = true)]
        at: Vec<i64>,

        /// Rate limit key
        #[arg(long, default_value = "simulated")]
        key: String,

        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!("Config file not found: {}", path.display());
            }
            Config::load_from_path(path)?
        }
        None => Config::load()?,
    };

    init_tracing(&config, args.verbose)?;
    info!("portal-throttle v{} starting", env!("CARGO_PKG_VERSION"));

    match args.command {
        Commands::Actions => list_actions(&config),
        Commands::CheckConfig => {
            print!("{}", config.to_toml()?);
        }
        Commands::Simulate {
            action,
            limit,
            window_ms,
            at,
            key,
            json,
        } => {
            let (limit, window) = match (action, limit, window_ms) {
                (Some(name), _, _) => {
                    let entry = config.rate_limit.action(&name)?;
                    (entry.limit, entry.window())
                }
                (None, Some(limit), Some(window_ms)) => (limit, Duration::from_millis(window_ms)),
                _ => anyhow::bail!("simulate needs either --action or both --limit and --window-ms"),
            };
            simulate(&config, &key, limit, window, &at, json).await?;
        }
    }

    if args.metrics {
        print!("{}", metrics::gather_metrics()?);
    }

    Ok(())
}

fn init_tracing(config: &Config, verbose: bool) -> Result<()> {
    let level = if verbose {
        Level::DEBUG
    } else {
        config.log_level()?
    };

    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let result = match config.logging.format.to_lowercase().as_str() {
        "json" => builder.json().try_init(),
        "pretty" => builder.pretty().try_init(),
        _ => builder.compact().try_init(),
    };
    result.map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))
}

fn list_actions(config: &Config) {
    if config.rate_limit.actions.is_empty() {
        println!("No actions configured");
        return;
    }
    for (name, limit) in &config.rate_limit.actions {
        println!("{:<20} {:>6} per {}ms", name, limit.limit, limit.window_ms);
    }
}

async fn simulate(
    config: &Config,
    key: &str,
    limit: u32,
    window: Duration,
    at: &[i64],
    as_json: bool,
) -> Result<()> {
    let start = at.first().copied().unwrap_or(0);
    let clock = Arc::new(ManualClock::new(start));
    let limiter = RateLimiter::with_clock(config.rate_limit.clone(), Arc::clone(&clock));
    debug!(key, limit, window_ms = window.as_millis() as u64, "Simulating {} calls", at.len());

    let mut calls = Vec::with_capacity(at.len());
    for &t in at {
        clock.set(t);
        let decision = limiter.check_detailed(key, limit, window).await;
        if !as_json {
            let verdict = if decision.allowed { "allowed" } else { "denied" };
            println!("t={}ms {} remaining={}", t, verdict, decision.remaining);
        }
        calls.push(json!({
            "at_ms": t,
            "allowed": decision.allowed,
            "remaining": decision.remaining,
            "retry_after_ms": decision.retry_after.map(|d| d.as_millis() as u64),
        }));
    }

    let remaining = limiter.remaining_quota(key).await;
    if as_json {
        let output = json!({
            "key": key,
            "limit": limit,
            "window_ms": window.as_millis() as u64,
            "calls": calls,
            "remaining": remaining,
            "snapshot": limiter.snapshot().await,
        });
        let rendered =
            serde_json::to_string_pretty(&output).context("Failed to render simulation")?;
        println!("{}", rendered);
    } else {
        println!("remaining quota: {}", remaining);
    }

    Ok(())
}
