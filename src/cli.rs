//! CLI command definitions using clap.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use netmeas_session::{ConfigError, SessionConfig};

/// netmeas - network measurement client
#[derive(Parser, Debug)]
#[command(name = "netmeas")]
#[command(version)]
#[command(about = "Negotiate a measurement session, report link statistics and throughput")]
#[command(
    long_about = "netmeas connects to a primary server, negotiates a heartbeat interval, pushes client statistics, runs an iperf3 throughput measurement and reports the result, while a heartbeat loop keeps a secondary server informed."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one measurement session
    Run {
        #[command(flatten)]
        session: SessionArgs,
    },

    /// Print the effective configuration as TOML
    Config {
        #[command(flatten)]
        session: SessionArgs,
    },
}

/// Config file plus command-line overrides.
#[derive(Args, Debug, Clone, Default)]
pub struct SessionArgs {
    /// TOML config file (defaults apply when omitted)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Primary server host
    #[arg(long)]
    pub primary_host: Option<String>,

    /// Primary server port
    #[arg(long)]
    pub primary_port: Option<u16>,

    /// Secondary (heartbeat) server host
    #[arg(long)]
    pub secondary_host: Option<String>,

    /// Secondary (heartbeat) server port
    #[arg(long)]
    pub secondary_port: Option<u16>,

    /// Client identity sent in every message header
    #[arg(long)]
    pub client_id: Option<u32>,
}

impl SessionArgs {
    /// Load the config file (or defaults) and apply overrides.
    ///
    /// # Errors
    ///
    /// Returns error if the config file cannot be read or parsed.
    pub fn load(&self) -> Result<SessionConfig, ConfigError> {
        let config = match &self.config {
            Some(path) => SessionConfig::from_file(path)?,
            None => SessionConfig::default(),
        };
        Ok(self.apply(config))
    }

    /// Apply command-line overrides on top of `config`.
    #[must_use]
    pub fn apply(&self, mut config: SessionConfig) -> SessionConfig {
        if let Some(host) = &self.primary_host {
            config.primary.host.clone_from(host);
        }
        if let Some(port) = self.primary_port {
            config.primary.port = port;
        }
        if let Some(host) = &self.secondary_host {
            config.secondary.host.clone_from(host);
        }
        if let Some(port) = self.secondary_port {
            config.secondary.port = port;
        }
        if let Some(client_id) = self.client_id {
            config.client_id = client_id;
        }
        config
    }
}
