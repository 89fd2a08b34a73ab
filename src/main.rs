//! Entry point: parses CLI arguments, loads configuration, runs discovery
//! once, then polls until interrupted.

mod capture;
mod config;
mod discovery;
mod engine;
mod errors;
mod gateway;
mod parsers;
mod process_runner;
mod script;
mod store;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use config::Config;
use engine::Engine;

/// Command-line surface for a single run of the polling engine.
#[derive(Debug, Parser)]
#[command(name = "bgwatch", about = "Polls Avaya G4xx branch media gateways and tracks their state")]
struct Args {
    /// Explicit gateway IP to poll, bypassing `netstat` enumeration. May be
    /// repeated.
    #[arg(long = "ip")]
    ip: Vec<String>,

    /// Restrict discovered candidates to this IP. May be repeated.
    #[arg(long = "filter")]
    filter: Vec<String>,

    /// Path to an env file to load in addition to `.env` in the working
    /// directory.
    #[arg(long = "config")]
    config: Option<String>,

    /// Overrides `LOG_FILTER`/`RUST_LOG` for this run.
    #[arg(long = "log-level")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if let Some(path) = &args.config {
        dotenvy::from_path(path).ok();
    }
    let mut config = Config::from_env()?;
    if let Some(level) = &args.log_level {
        config.log_filter = level.clone();
    }

    let filter = EnvFilter::try_new(&config.log_filter).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!(?args.ip, ?args.filter, "starting bgwatch");

    let engine = Engine::new(config);
    engine.apply_storage_maxlen();

    engine
        .discovery_start(&args.ip, &args.filter, |(ok, err, total)| {
            tracing::info!(ok, err, total, "discovery progress");
        })
        .await;

    engine.polling_start().await?;
    tracing::info!("polling started, press ctrl-c to stop");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested");
    engine.polling_stop().await;

    Ok(())
}
