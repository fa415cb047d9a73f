#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

//! # netmeas
//!
//! Network measurement client. Negotiates a session with a primary server,
//! reports link statistics and throughput, and keeps a heartbeat running on a
//! secondary server.
//!
//! This library re-exports the workspace crates for convenience.

pub use netmeas_session;
pub use netmeas_wire;

pub mod cli;
