//! Session configuration.
//!
//! Loaded once (TOML file, then CLI overrides) and handed to the orchestrator
//! as an immutable `Arc<SessionConfig>`.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use std::path::Path;
use std::time::Duration;

use netmeas_wire::Participant;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Host and port of a server endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Participant record as written in the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantConfig {
    pub id: u32,
    pub name: String,
    pub email: String,
}

impl ParticipantConfig {
    pub fn new(id: u32, name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            email: email.into(),
        }
    }

    #[must_use]
    pub fn to_wire(&self) -> Participant {
        Participant::new(self.id, self.name.clone(), self.email.clone())
    }
}

/// External measurement tool settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasurementConfig {
    /// iperf3 executable (name on PATH or absolute path).
    #[serde(default = "default_binary")]
    pub binary: String,

    /// Extra time allowed beyond the requested measurement duration.
    #[serde(default = "default_grace_secs")]
    pub grace_secs: u64,

    /// iperf3 server host; defaults to the primary endpoint's host.
    #[serde(default)]
    pub target_host: Option<String>,
}

impl Default for MeasurementConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            grace_secs: default_grace_secs(),
            target_host: None,
        }
    }
}

/// Configuration for one measurement session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Client installation identity, sent in every header.
    #[serde(default)]
    pub client_id: u32,

    /// Hardware address reported in the statistics push.
    #[serde(default = "default_hardware_address")]
    pub hardware_address: String,

    /// Network address reported in the statistics push; defaults to the
    /// primary connection's local address.
    #[serde(default)]
    pub network_address: Option<String>,

    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Negotiation/report server.
    #[serde(default = "default_primary")]
    pub primary: Endpoint,

    /// Heartbeat server.
    #[serde(default = "default_secondary")]
    pub secondary: Endpoint,

    #[serde(default)]
    pub participants: Vec<ParticipantConfig>,

    #[serde(default)]
    pub measurement: MeasurementConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            client_id: 0,
            primary: default_primary(),
            secondary: default_secondary(),
            participants: Vec::new(),
            hardware_address: default_hardware_address(),
            network_address: None,
            read_timeout_secs: default_read_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            measurement: MeasurementConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Create a config with defaults for the given client identity.
    #[must_use]
    pub fn new(client_id: u32) -> Self {
        Self {
            client_id,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_primary(mut self, endpoint: Endpoint) -> Self {
        self.primary = endpoint;
        self
    }

    #[must_use]
    pub fn with_secondary(mut self, endpoint: Endpoint) -> Self {
        self.secondary = endpoint;
        self
    }

    #[must_use]
    pub fn with_participant(mut self, participant: ParticipantConfig) -> Self {
        self.participants.push(participant);
        self
    }

    #[must_use]
    pub fn with_hardware_address(mut self, address: impl Into<String>) -> Self {
        self.hardware_address = address.into();
        self
    }

    #[must_use]
    pub fn with_network_address(mut self, address: impl Into<String>) -> Self {
        self.network_address = Some(address.into());
        self
    }

    #[must_use]
    pub const fn with_read_timeout_secs(mut self, secs: u64) -> Self {
        self.read_timeout_secs = secs;
        self
    }

    #[must_use]
    pub fn with_measurement(mut self, measurement: MeasurementConfig) -> Self {
        self.measurement = measurement;
        self
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or is not valid TOML for this schema.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Render the configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::invalid(e.to_string()))
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns error if configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (label, endpoint) in [("primary", &self.primary), ("secondary", &self.secondary)] {
            if endpoint.host.trim().is_empty() {
                return Err(ConfigError::invalid(format!("{label} host must not be empty")));
            }
            if endpoint.port == 0 {
                return Err(ConfigError::invalid(format!("{label} port must be greater than 0")));
            }
        }

        if self.participants.is_empty() {
            return Err(ConfigError::invalid("at least one participant is required"));
        }

        if self.read_timeout_secs == 0 {
            return Err(ConfigError::invalid("read_timeout_secs must be greater than 0"));
        }

        if self.connect_timeout_secs == 0 {
            return Err(ConfigError::invalid(
                "connect_timeout_secs must be greater than 0",
            ));
        }

        if self.measurement.binary.trim().is_empty() {
            return Err(ConfigError::invalid("measurement binary must not be empty"));
        }

        Ok(())
    }

    #[must_use]
    pub const fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    #[must_use]
    pub const fn measurement_grace(&self) -> Duration {
        Duration::from_secs(self.measurement.grace_secs)
    }

    /// Host the measurement tool connects to.
    #[must_use]
    pub fn measurement_target(&self) -> &str {
        self.measurement
            .target_host
            .as_deref()
            .unwrap_or(&self.primary.host)
    }

    /// Participant records in wire form.
    #[must_use]
    pub fn wire_participants(&self) -> Vec<Participant> {
        self.participants.iter().map(ParticipantConfig::to_wire).collect()
    }
}

fn default_primary() -> Endpoint {
    Endpoint::new("127.0.0.1", 65432)
}

fn default_secondary() -> Endpoint {
    Endpoint::new("127.0.0.1", 54322)
}

fn default_hardware_address() -> String {
    "00:00:00:00:00:00".to_string()
}

const fn default_read_timeout_secs() -> u64 {
    30
}

const fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_binary() -> String {
    "iperf3".to_string()
}

const fn default_grace_secs() -> u64 {
    10
}
