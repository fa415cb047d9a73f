//! # netmeas - measurement client entry point
//!
//! ## Run sequence
//!
//! 1. **Configuration** - Load the TOML file, apply CLI overrides, validate
//! 2. **Primary** - Connect and run the ordered exchange
//! 3. **Secondary** - Once the interval is negotiated, connect and start heartbeats
//! 4. **Teardown** - Stop the heartbeat and close both connections
//!
//! The process exits non-zero when the primary exchange fails or Ctrl+C
//! interrupts the session.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![deny(clippy::expect_used)]

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use netmeas::cli::{Cli, Commands, SessionArgs};
use netmeas_session::{
    HeartbeatExit, Iperf3Meter, SessionConfig, SessionOrchestrator, TcpConnector,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { session } => {
            init_tracing();
            run_session(&session).await
        }
        Commands::Config { session } => print_config(&session),
    }
}

/// Initialize tracing subscriber with environment filter.
fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_config(args: &SessionArgs) -> Result<SessionConfig> {
    let config = args.load().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

async fn run_session(args: &SessionArgs) -> Result<()> {
    let start_time = Instant::now();
    let config = Arc::new(load_config(args)?);

    info!(
        client_id = config.client_id,
        primary = %config.primary,
        secondary = %config.secondary,
        "netmeas starting"
    );

    let orchestrator = SessionOrchestrator::new(
        Arc::clone(&config),
        TcpConnector::from_config(&config),
        Arc::new(Iperf3Meter::from_config(&config.measurement)),
    );

    let outcome = tokio::select! {
        outcome = orchestrator.run() => outcome,
        () = wait_for_shutdown() => bail!("Session interrupted"),
    };

    if let Some(heartbeat) = &outcome.heartbeat {
        match &heartbeat.exit {
            HeartbeatExit::Stopped => info!(sent = heartbeat.sent, "heartbeat stopped"),
            HeartbeatExit::Failed(err) => {
                warn!(sent = heartbeat.sent, error = %err, "heartbeat ended early");
            }
        }
    }

    let report = outcome.primary.context("Measurement session failed")?;
    info!(
        throughput_mbps = report.throughput_mbps,
        fallback = report.used_fallback,
        elapsed = ?start_time.elapsed(),
        "measurement session complete"
    );
    Ok(())
}

fn print_config(args: &SessionArgs) -> Result<()> {
    let config = load_config(args)?;
    let rendered = config
        .to_toml_string()
        .context("Failed to render configuration")?;
    print!("{rendered}");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C).
async fn wait_for_shutdown() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, abandoning session"),
        Err(err) => {
            error!("Failed to listen for shutdown signal: {}", err);
            std::future::pending::<()>().await;
        }
    }
}
