//! Netmeas wire - length-prefixed protobuf envelopes over byte streams
//!
//! This crate provides the framing and message layer shared by the primary
//! (negotiation/report) and secondary (heartbeat) channels.
//!
//! # Protocol
//!
//! Every message frame consists of:
//! - **Length prefix**: 4-byte big-endian u32 indicating payload size
//! - **Payload**: protobuf-encoded [`Envelope`]
//!
//! ```text
//! +--------+--------+--------+--------+--------------------------+
//! | Byte 0 | Byte 1 | Byte 2 | Byte 3 | Bytes 4..(4+N)           |
//! |--------+--------+--------+--------+--------------------------|
//! |          Length (big-endian u32)  |    Protobuf Envelope      |
//! |           N = payload size        |    (N bytes)              |
//! +--------+--------+--------+--------+--------------------------+
//! ```
//!
//! # Constraints
//!
//! - Maximum payload size: 1MB (1,048,576 bytes)
//! - Length prefix is big-endian byte order
//! - Empty payloads (length = 0) are rejected in both directions
//!
//! # Example
//!
//! ```rust
//! use netmeas_wire::{Envelope, FrameTransport};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let (client, server) = tokio::io::duplex(4096);
//! let mut client = FrameTransport::new(client);
//! let mut server = FrameTransport::new(server);
//!
//! client.send(&Envelope::measurement_request(5)).await?;
//! let received = server.recv().await?;
//! assert_eq!(received, Envelope::measurement_request(5));
//! # Ok(())
//! # }
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

mod envelope;
mod error;
mod frame;

pub use envelope::{
    ConnectionRequest, ConnectionResponse, Envelope, Header, Heartbeat, MeasurementAck,
    MeasurementReport, MeasurementRequest, MeasurementResponse, MessageKind, Participant,
    StatsReport, StatsRequest, StatsResponse, decode, encode,
};
pub use error::{DecodeError, ProtocolError, TransportError, WireError, WireResult};
pub use frame::FrameTransport;

/// Maximum allowed payload size in bytes (1MB)
pub const MAX_PAYLOAD_SIZE: usize = 1_048_576;

/// Length prefix size in bytes
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Maximum frame size (length prefix + max payload)
pub const MAX_FRAME_SIZE: usize = LENGTH_PREFIX_SIZE + MAX_PAYLOAD_SIZE;
