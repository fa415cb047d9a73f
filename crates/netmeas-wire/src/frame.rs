//! Frame transport for length-prefixed envelopes
//!
//! # Type Parameters
//! - `S`: byte stream (implements `tokio::io::AsyncRead + AsyncWrite`)
//!
//! # Ownership
//! - One transport per connection, owned by the loop driving it
//! - No internal locking; not meant for concurrent `send()`/`recv()`

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufStream};
use tracing::trace;

use crate::{
    Envelope, LENGTH_PREFIX_SIZE, MAX_PAYLOAD_SIZE, ProtocolError, TransportError, WireResult,
};

/// Transport layer for length-prefixed protobuf envelopes.
///
/// # Example
/// ```rust
/// use netmeas_wire::FrameTransport;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let (a, b) = tokio::io::duplex(1024);
/// let (mut client, mut server) = (FrameTransport::new(a), FrameTransport::new(b));
///
/// client.write_frame(b"hello world").await?;
/// assert_eq!(server.read_frame().await?, b"hello world");
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct FrameTransport<S> {
    stream: BufStream<S>,
    read_timeout: Option<Duration>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> FrameTransport<S> {
    /// Create a new transport over a connected stream.
    ///
    /// # Postconditions
    /// - Buffers are empty and ready for use
    /// - Reads block indefinitely until a read timeout is set
    pub fn new(stream: S) -> Self {
        Self {
            stream: BufStream::new(stream),
            read_timeout: None,
        }
    }

    /// Bound every `read_frame()`/`recv()` by `timeout`.
    #[must_use]
    pub const fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    /// Write one frame: 4-byte big-endian length, then the payload, then flush.
    ///
    /// # Errors
    /// - `ProtocolError::InvalidLength` if the payload is empty or larger than 1MB
    ///   (nothing is written)
    /// - `TransportError::WriteFailed` if the stream write or flush fails
    pub async fn write_frame(&mut self, payload: &[u8]) -> WireResult<()> {
        let length = checked_length(payload.len())?;

        self.stream
            .write_all(&length.to_be_bytes())
            .await
            .map_err(|e| TransportError::write_failed(&e))?;

        self.stream
            .write_all(payload)
            .await
            .map_err(|e| TransportError::write_failed(&e))?;

        self.stream
            .flush()
            .await
            .map_err(|e| TransportError::write_failed(&e))?;

        trace!(bytes = payload.len(), "frame written");
        Ok(())
    }

    /// Read exactly one frame and return its payload.
    ///
    /// # Errors
    /// - `TransportError::UnexpectedEof` if the stream ends mid-frame
    /// - `TransportError::ReadFailed` if the stream read fails
    /// - `TransportError::Timeout` if a read timeout is set and expires
    /// - `ProtocolError::InvalidLength` if the length prefix is 0 or exceeds 1MB
    pub async fn read_frame(&mut self) -> WireResult<Vec<u8>> {
        match self.read_timeout {
            Some(after) => tokio::time::timeout(after, self.read_frame_untimed())
                .await
                .map_err(|_| TransportError::timeout(after))?,
            None => self.read_frame_untimed().await,
        }
    }

    async fn read_frame_untimed(&mut self) -> WireResult<Vec<u8>> {
        let mut length_prefix_bytes = [0u8; LENGTH_PREFIX_SIZE];
        self.stream
            .read_exact(&mut length_prefix_bytes)
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::UnexpectedEof {
                    TransportError::unexpected_eof(0, LENGTH_PREFIX_SIZE)
                } else {
                    TransportError::read_failed(&e)
                }
            })?;

        let declared = u32::from_be_bytes(length_prefix_bytes);
        let payload_length = usize::try_from(declared).unwrap_or(usize::MAX);
        checked_length(payload_length)?;

        let mut payload = vec![0u8; payload_length];
        self.stream.read_exact(&mut payload).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                TransportError::unexpected_eof(
                    LENGTH_PREFIX_SIZE,
                    LENGTH_PREFIX_SIZE.saturating_add(payload_length),
                )
            } else {
                TransportError::read_failed(&e)
            }
        })?;

        trace!(bytes = payload_length, "frame read");
        Ok(payload)
    }

    /// Encode and send one envelope as a single frame.
    ///
    /// # Errors
    /// Same as [`Self::write_frame`].
    pub async fn send(&mut self, envelope: &Envelope) -> WireResult<()> {
        self.write_frame(&envelope.to_bytes()).await
    }

    /// Receive one frame and decode it as an envelope.
    ///
    /// # Errors
    /// Same as [`Self::read_frame`], plus `DecodeError` when the payload is not
    /// a known envelope.
    pub async fn recv(&mut self) -> WireResult<Envelope> {
        let payload = self.read_frame().await?;
        Ok(Envelope::from_bytes(&payload)?)
    }

    /// Flush and close the write side of the connection.
    ///
    /// # Errors
    /// `TransportError::WriteFailed` if the flush or shutdown fails.
    pub async fn shutdown(&mut self) -> WireResult<()> {
        self.stream
            .shutdown()
            .await
            .map_err(|e| TransportError::write_failed(&e).into())
    }
}

/// Validate a payload length against the frame bounds.
fn checked_length(length: usize) -> Result<u32, ProtocolError> {
    if length == 0 {
        return Err(ProtocolError::invalid_length(0, "zero-length payload"));
    }

    if length > MAX_PAYLOAD_SIZE {
        return Err(ProtocolError::invalid_length(
            length,
            format!("exceeds maximum of {MAX_PAYLOAD_SIZE} bytes"),
        ));
    }

    u32::try_from(length).map_err(|_| ProtocolError::invalid_length(length, "does not fit in u32"))
}
