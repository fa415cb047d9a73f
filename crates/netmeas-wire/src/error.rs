//! Wire layer errors
//!
//! Three families, each fatal at a different scope:
//! - [`TransportError`]: the byte stream itself failed (fatal to the connection)
//! - [`ProtocolError`]: a frame header is out of bounds (fatal to the connection)
//! - [`DecodeError`]: a frame payload is not a known envelope (fatal to the exchange step)

use std::io::ErrorKind as IoErrorKind;
use std::time::Duration;

use thiserror::Error;

use crate::MessageKind;

/// Byte-stream failures: closed connections, I/O errors and read timeouts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// End of stream reached before a complete frame.
    ///
    /// Caused by:
    /// - Remote peer closed the connection
    /// - Truncated message
    #[error("unexpected EOF: {bytes_read} bytes read, expected {expected_bytes}")]
    UnexpectedEof {
        /// Bytes successfully read before EOF
        bytes_read: usize,
        /// Expected bytes (from length prefix)
        expected_bytes: usize,
    },

    /// Write operation failed (broken pipe, reset, shutdown stream).
    #[error("write failed: {kind:?} (error code: {error_code:?})")]
    WriteFailed {
        /// OS error code
        error_code: Option<i32>,
        /// Error kind
        kind: IoErrorKind,
    },

    /// Read operation failed.
    #[error("read failed: {kind:?} (error code: {error_code:?})")]
    ReadFailed {
        /// OS error code
        error_code: Option<i32>,
        /// Error kind
        kind: IoErrorKind,
    },

    /// No complete frame arrived within the configured read timeout.
    #[error("read timed out after {after:?}")]
    Timeout {
        /// The timeout that expired
        after: Duration,
    },
}

impl TransportError {
    /// Create an `UnexpectedEof` error
    #[must_use]
    pub const fn unexpected_eof(bytes_read: usize, expected_bytes: usize) -> Self {
        Self::UnexpectedEof {
            bytes_read,
            expected_bytes,
        }
    }

    /// Create a `WriteFailed` error from `std::io::Error`
    #[must_use]
    pub fn write_failed(err: &std::io::Error) -> Self {
        Self::WriteFailed {
            error_code: err.raw_os_error(),
            kind: err.kind(),
        }
    }

    /// Create a `ReadFailed` error from `std::io::Error`
    #[must_use]
    pub fn read_failed(err: &std::io::Error) -> Self {
        Self::ReadFailed {
            error_code: err.raw_os_error(),
            kind: err.kind(),
        }
    }

    /// Create a `Timeout` error
    #[must_use]
    pub const fn timeout(after: Duration) -> Self {
        Self::Timeout { after }
    }
}

/// Frame-level protocol violations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Length prefix (or outgoing payload) has an invalid size.
    ///
    /// Caused by:
    /// - Length = 0 (invalid frame)
    /// - Length > 1MB (size limit violation)
    #[error("invalid frame length {length}: {reason}")]
    InvalidLength {
        /// Invalid length value
        length: usize,
        /// Reason why length is invalid
        reason: String,
    },
}

impl ProtocolError {
    /// Create an `InvalidLength` error
    pub fn invalid_length(length: usize, reason: impl Into<String>) -> Self {
        Self::InvalidLength {
            length,
            reason: reason.into(),
        }
    }
}

/// Payload bytes that do not decode to exactly one known envelope variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Protobuf decoding failed (corrupted payload, schema mismatch).
    #[error("malformed envelope ({payload_bytes} bytes): {cause}")]
    Malformed {
        /// Decoder error message
        cause: String,
        /// Size of the payload that failed to decode
        payload_bytes: usize,
    },

    /// The envelope carried no payload variant this client knows.
    #[error("envelope carries no recognized payload variant")]
    UnknownVariant,

    /// The payload variant had no header.
    #[error("{kind} payload is missing its header")]
    MissingHeader {
        /// Variant that arrived without a header
        kind: MessageKind,
    },

    /// The header kind is not a known message kind.
    #[error("unknown message kind {value} in {variant} header")]
    UnknownKind {
        /// Raw discriminant found in the header
        value: i32,
        /// Variant the header belongs to
        variant: MessageKind,
    },

    /// The header names a different kind than the payload variant.
    #[error("header kind {header} does not match {variant} payload")]
    KindMismatch {
        /// Kind declared in the header
        header: MessageKind,
        /// Actual payload variant
        variant: MessageKind,
    },
}

impl DecodeError {
    /// Create a `Malformed` error
    pub fn malformed(cause: impl Into<String>, payload_bytes: usize) -> Self {
        Self::Malformed {
            cause: cause.into(),
            payload_bytes,
        }
    }
}

/// Any failure of the wire layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl WireError {
    /// Whether the underlying connection is unusable after this error.
    #[must_use]
    pub const fn is_fatal_to_connection(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Protocol(_))
    }
}

/// Result type for wire operations
pub type WireResult<T> = Result<T, WireError>;
