//! # Integrator
//!
//! Entry point of the integration controller.
//!
//! ## Start-up
//!
//! 1. **Configuration** - file (optional) plus environment overrides
//! 2. **Wiring** - event bus, resource store, backends, handler registry
//! 3. **Seeding** - integrations from the seed file, if any
//! 4. **Controller** - subscription, startup scan and worker
//!
//! ## Shutdown
//!
//! Ctrl+C unsubscribes the controller, cancels pending follow-up checks and
//! gives in-flight work the configured shutdown timeout before aborting it.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![deny(clippy::expect_used)]

use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use integrator::cli::{Cli, Commands};
use integrator::{App, AppConfig, load_seeds};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    match Cli::parse().command {
        Commands::Run { config, seed } => run(config.as_deref(), seed.as_deref()).await,
        Commands::CheckConfig { config } => check_config(&config),
    }
}

/// Run the controller until Ctrl+C.
async fn run(config: Option<&Path>, seed: Option<&Path>) -> Result<()> {
    let start_time = Instant::now();
    info!("Integrator starting...");

    let config = AppConfig::load(config).context("Configuration could not be loaded")?;
    let app = App::new(config)?;

    if let Some(seed) = seed {
        let seeds = load_seeds(seed)?;
        let count = app.seed(seeds).await?;
        info!(count, "Integrations seeded");
    }

    let handle = app.start().await?;
    info!(
        "Integrator started in {:?}. Press Ctrl+C to stop.",
        start_time.elapsed()
    );

    wait_for_shutdown().await;

    info!("Stopping controller...");
    handle.stop().await;
    info!("Integrator stopped");
    Ok(())
}

/// Validate a config file and print the effective configuration.
fn check_config(path: &Path) -> Result<()> {
    let config = AppConfig::load(Some(path))?;
    println!("{}", config.to_toml()?);
    Ok(())
}

/// Initialize tracing subscriber with environment filter.
fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for shutdown signal (Ctrl+C).
async fn wait_for_shutdown() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, initiating graceful shutdown"),
        Err(err) => error!("Failed to listen for shutdown signal: {}", err),
    }
}
