//! Session error types.
//!
//! All errors are explicit and typed; which loop they terminate is decided by
//! the caller (see the orchestrator module).

use std::path::PathBuf;
use std::time::Duration;

use netmeas_wire::{MessageKind, TransportError, WireError};
use thiserror::Error;

/// Errors that end a primary exchange or a heartbeat loop.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Framing, transport or decode failure on the connection.
    #[error(transparent)]
    Wire(#[from] WireError),

    /// A well-formed envelope of the wrong kind arrived for the current step.
    #[error("expected {expected}, received {actual}")]
    UnexpectedVariant {
        expected: MessageKind,
        actual: MessageKind,
    },

    #[error("server negotiated an invalid heartbeat interval of {interval}s")]
    InvalidInterval { interval: u32 },

    #[error("invalid measurement parameters: {reason}")]
    InvalidMeasurementParameters { reason: String },

    /// The connection could not be established.
    #[error("failed to connect to {endpoint}: {reason}")]
    Connect { endpoint: String, reason: String },

    /// A spawned loop panicked or was aborted.
    #[error("session task failed: {reason}")]
    TaskFailed { reason: String },
}

impl SessionError {
    /// Create an unexpected variant error.
    #[must_use]
    pub const fn unexpected_variant(expected: MessageKind, actual: MessageKind) -> Self {
        Self::UnexpectedVariant { expected, actual }
    }

    /// Create a connect error.
    pub fn connect(endpoint: impl std::fmt::Display, reason: impl Into<String>) -> Self {
        Self::Connect {
            endpoint: endpoint.to_string(),
            reason: reason.into(),
        }
    }

    /// Create an invalid measurement parameters error.
    pub fn invalid_measurement_parameters(reason: impl Into<String>) -> Self {
        Self::InvalidMeasurementParameters {
            reason: reason.into(),
        }
    }

    /// Whether the error came from the byte stream (closed, I/O failure, timeout)
    /// or from establishing it.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Wire(WireError::Transport(_)) | Self::Connect { .. }
        )
    }
}

impl From<TransportError> for SessionError {
    fn from(err: TransportError) -> Self {
        Self::Wire(err.into())
    }
}

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;

/// External measurement tool failures. Always recovered by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MeasurementError {
    #[error("failed to start '{program}': {reason}")]
    Spawn { program: String, reason: String },

    #[error("'{program}' exited with {status}: {stderr}")]
    ExitStatus {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("measurement did not finish within {after:?}")]
    Timeout { after: Duration },

    #[error("could not parse measurement output: {reason}")]
    Parse { reason: String },
}

impl MeasurementError {
    /// Create a parse error.
    pub fn parse(reason: impl Into<String>) -> Self {
        Self::Parse {
            reason: reason.into(),
        }
    }
}

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config '{path}': {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("failed to parse config '{path}': {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("invalid config: {reason}")]
    Invalid { reason: String },
}

impl ConfigError {
    /// Create an invalid config error.
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::Invalid {
            reason: reason.into(),
        }
    }
}
