// Remedy Queue - Main Entry Point
//
// Command-line interface for the strategy-based queue gateway:
// - serve: run the admission gateway and metrics listener
// - check-config: validate a configuration file
// - simulate: push a burst of requests through a configured remedy

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use remedy_queue::clock::{Clock, SystemClock};
use remedy_queue::config::Config;
use remedy_queue::remedy::{OnRequest, StrategyBasedQueuePlugin};
use remedy_queue::{logging, metrics, server};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Remedy Queue: priority-aware admission queues for API traffic
#[derive(Parser, Debug)]
#[command(name = "remedy-queue")]
#[command(author = "Remedy Queue Contributors")]
#[command(version)]
#[command(about = "Strategy-based admission queues with Prometheus metrics", long_about = None)]
struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Path to the configuration file (default: ~/.config/remedy-queue/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the admission gateway
    Serve,
    /// Validate the configuration and print the configured remedies
    CheckConfig,
    /// Send a burst of requests through a remedy and report the outcome
    Simulate {
        /// Remedy to run
        #[arg(long)]
        remedy: String,

        /// Number of concurrent requests
        #[arg(long, default_value_t = 10)]
        requests: usize,

        /// Value for the remedy's prioritization header
        #[arg(long)]
        group: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load_from_path(path),
        None => Config::load(),
    }
    .context("Failed to load configuration")?;

    logging::init(&config.logging, args.verbose)?;

    info!("Remedy Queue v{} starting...", env!("CARGO_PKG_VERSION"));

    match args.command {
        Some(Commands::Serve) => {
            server::serve(config, Arc::new(SystemClock)).await?;
        }
        Some(Commands::CheckConfig) => {
            check_config(&config)?;
        }
        Some(Commands::Simulate {
            remedy,
            requests,
            group,
        }) => {
            simulate(&config, &remedy, requests, group).await?;
        }
        None => {
            info!("No command specified. Use \"remedy-queue --help\" for usage.");
        }
    }

    Ok(())
}

/// Print the validated configuration
fn check_config(config: &Config) -> Result<()> {
    config.validate()?;

    let remedies: Vec<_> = config
        .remedies
        .iter()
        .map(|remedy| {
            let queue = remedy.strategy_based_queue.as_ref().map(|queue| {
                json!({
                    "strategy": queue.strategy().to_string(),
                    "ttl_seconds": queue.ttl_seconds,
                    "response_status_code": queue.response_status_code,
                    "prioritized_by": queue
                        .prioritization
                        .as_ref()
                        .map(|p| p.group_by.header_name.clone()),
                })
            });
            json!({
                "name": remedy.name,
                "enabled": remedy.enabled,
                "strategy_based_queue": queue,
            })
        })
        .collect();

    let summary = json!({
        "valid": true,
        "server_port": config.server.port,
        "metrics": { "enabled": config.metrics.enabled, "port": config.metrics.port },
        "remedies": remedies,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

/// Run `requests` concurrent requests through `remedy_name`
async fn simulate(
    config: &Config,
    remedy_name: &str,
    requests: usize,
    group: Option<String>,
) -> Result<()> {
    let remedy = config
        .remedy(remedy_name)
        .with_context(|| format!("Remedy '{}' is not configured or disabled", remedy_name))?
        .clone();

    let mut headers = axum::http::HeaderMap::new();
    if let (Some(group), Some(prioritization)) = (
        group,
        remedy
            .strategy_based_queue
            .as_ref()
            .and_then(|queue| queue.prioritization.as_ref()),
    ) {
        let name = axum::http::HeaderName::from_bytes(prioritization.group_by.header_name.as_bytes())
            .context("Invalid prioritization header name")?;
        let value = axum::http::HeaderValue::from_str(&group).context("Invalid group value")?;
        headers.insert(name, value);
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let plugin = StrategyBasedQueuePlugin::new(clock);
    metrics::init(plugin.queues()).context("Failed to initialize metrics")?;

    info!(remedy = %remedy_name, requests, "Starting simulation");
    let started = Instant::now();

    let handles: Vec<_> = (0..requests)
        .map(|i| {
            let plugin = plugin.clone();
            let remedy = remedy.clone();
            let request = OnRequest::new(format!("sim-{}", i), headers.clone());
            tokio::spawn(async move { plugin.on_request(&request, &remedy).await })
        })
        .collect();

    let mut admitted = 0usize;
    let mut rejected = 0usize;
    let mut failed = 0usize;
    for handle in handles {
        match handle.await.context("Simulated request panicked")? {
            Ok(action) if action.is_no_op() => admitted += 1,
            Ok(_) => rejected += 1,
            Err(e) => {
                warn!("Simulated request failed: {}", e);
                failed += 1;
            }
        }
    }

    let summary = json!({
        "remedy": remedy_name,
        "requests": requests,
        "admitted": admitted,
        "rejected": rejected,
        "failed": failed,
        "elapsed_ms": started.elapsed().as_millis() as u64,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    println!("{}", metrics::gather_metrics()?);

    Ok(())
}
