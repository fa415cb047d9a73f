//! Netmeas session - the primary exchange, heartbeat loop and orchestration
//!
//! A session connects to the primary server, negotiates a heartbeat interval,
//! pushes client statistics, runs a throughput measurement and reports it.
//! While the exchange runs, a heartbeat loop keeps the secondary server
//! informed that the client is alive.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use netmeas_session::{
//!     Iperf3Meter, ParticipantConfig, SessionConfig, SessionOrchestrator, TcpConnector,
//! };
//!
//! # #[tokio::main]
//! # async fn main() {
//! let config = Arc::new(
//!     SessionConfig::new(5).with_participant(ParticipantConfig::new(1, "Ada", "ada@example.com")),
//! );
//! let orchestrator = SessionOrchestrator::new(
//!     Arc::clone(&config),
//!     TcpConnector::from_config(&config),
//!     Arc::new(Iperf3Meter::from_config(&config.measurement)),
//! );
//!
//! let outcome = orchestrator.run().await;
//! println!("success: {}", outcome.is_success());
//! # }
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod config;
pub mod error;
pub mod handoff;
pub mod heartbeat;
pub mod measure;
pub mod orchestrator;
pub mod primary;

pub use config::{Endpoint, MeasurementConfig, ParticipantConfig, SessionConfig};
pub use error::{ConfigError, MeasurementError, Result, SessionError};
pub use handoff::{IntervalPublisher, IntervalSubscription, interval_channel};
pub use heartbeat::{HeartbeatExit, HeartbeatHandle, HeartbeatLoop, HeartbeatSummary};
pub use measure::{Iperf3Meter, ThroughputMeter, parse_iperf3_report};
pub use orchestrator::{Connection, Connector, SessionOrchestrator, SessionOutcome, TcpConnector};
pub use primary::{
    FALLBACK_THROUGHPUT_MBPS, MeasurementParams, PrimarySession, SessionFailure, SessionReport,
    SessionState,
};
