//! Protobuf envelope shared with the measurement server.
//!
//! The schema is owned by the server's interface definition; field tags and
//! [`MessageKind`] discriminants here must match it exactly.
//!
//! # Message Flow
//!
//! **Primary channel** (ordered request/response):
//! - `ConnectionRequest` → `ConnectionResponse` (negotiated heartbeat interval)
//! - `StatsRequest` → `StatsResponse`, then a `StatsReport` push
//! - `MeasurementRequest` → `MeasurementResponse` (iperf3 port and duration)
//! - `MeasurementReport` → `MeasurementAck`
//!
//! **Secondary channel** (outbound only):
//! - `Heartbeat` every negotiated interval

use prost::Message;

use crate::DecodeError;

/// Message kind tag carried in every header.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum MessageKind {
    Unspecified = 0,
    Heartbeat = 1,
    ConnectionRequest = 2,
    ConnectionResponse = 3,
    StatsRequest = 4,
    StatsResponse = 5,
    StatsReport = 6,
    MeasurementRequest = 7,
    MeasurementResponse = 8,
    MeasurementReport = 9,
    MeasurementAck = 10,
}

impl MessageKind {
    /// Schema name of the kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Unspecified => "UNSPECIFIED",
            Self::Heartbeat => "HEARTBEAT",
            Self::ConnectionRequest => "CONNECTION_REQUEST",
            Self::ConnectionResponse => "CONNECTION_RESPONSE",
            Self::StatsRequest => "STATS_REQUEST",
            Self::StatsResponse => "STATS_RESPONSE",
            Self::StatsReport => "STATS_REPORT",
            Self::MeasurementRequest => "MEASUREMENT_REQUEST",
            Self::MeasurementResponse => "MEASUREMENT_RESPONSE",
            Self::MeasurementReport => "MEASUREMENT_REPORT",
            Self::MeasurementAck => "MEASUREMENT_ACK",
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Common header: sender identity and message kind.
#[derive(Clone, Copy, PartialEq, Eq, Message)]
pub struct Header {
    /// Client installation identity, constant for the process lifetime
    #[prost(uint32, tag = "1")]
    pub id: u32,

    #[prost(enumeration = "MessageKind", tag = "2")]
    pub kind: i32,
}

impl Header {
    #[must_use]
    pub fn new(id: u32, kind: MessageKind) -> Self {
        Self {
            id,
            kind: kind.into(),
        }
    }
}

/// Participant record sent during connection setup.
#[derive(Clone, PartialEq, Eq, Message)]
pub struct Participant {
    #[prost(uint32, tag = "1")]
    pub id: u32,

    #[prost(string, tag = "2")]
    pub name: String,

    #[prost(string, tag = "3")]
    pub email: String,
}

impl Participant {
    pub fn new(id: u32, name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            email: email.into(),
        }
    }
}

#[derive(Clone, PartialEq, Eq, Message)]
pub struct ConnectionRequest {
    #[prost(message, optional, tag = "1")]
    pub header: Option<Header>,

    #[prost(message, repeated, tag = "2")]
    pub participants: Vec<Participant>,
}

#[derive(Clone, PartialEq, Eq, Message)]
pub struct ConnectionResponse {
    #[prost(message, optional, tag = "1")]
    pub header: Option<Header>,

    /// Heartbeat interval in seconds
    #[prost(uint32, tag = "2")]
    pub interval: u32,
}

#[derive(Clone, PartialEq, Eq, Message)]
pub struct StatsRequest {
    #[prost(message, optional, tag = "1")]
    pub header: Option<Header>,

    #[prost(message, repeated, tag = "2")]
    pub participants: Vec<Participant>,
}

#[derive(Clone, PartialEq, Eq, Message)]
pub struct StatsResponse {
    #[prost(message, optional, tag = "1")]
    pub header: Option<Header>,

    /// Server-assigned capability/state code
    #[prost(uint32, tag = "2")]
    pub state: u32,
}

#[derive(Clone, PartialEq, Eq, Message)]
pub struct StatsReport {
    #[prost(message, optional, tag = "1")]
    pub header: Option<Header>,

    #[prost(string, tag = "2")]
    pub ip_address: String,

    #[prost(string, tag = "3")]
    pub mac_address: String,
}

#[derive(Clone, PartialEq, Eq, Message)]
pub struct MeasurementRequest {
    #[prost(message, optional, tag = "1")]
    pub header: Option<Header>,
}

#[derive(Clone, PartialEq, Eq, Message)]
pub struct MeasurementResponse {
    #[prost(message, optional, tag = "1")]
    pub header: Option<Header>,

    /// iperf3 server port
    #[prost(uint32, tag = "2")]
    pub port: u32,

    /// Measurement duration in seconds
    #[prost(uint32, tag = "3")]
    pub duration: u32,
}

#[derive(Clone, PartialEq, Message)]
pub struct MeasurementReport {
    #[prost(message, optional, tag = "1")]
    pub header: Option<Header>,

    /// Measured throughput in Mbps
    #[prost(double, tag = "2")]
    pub report: f64,
}

#[derive(Clone, PartialEq, Eq, Message)]
pub struct MeasurementAck {
    #[prost(message, optional, tag = "1")]
    pub header: Option<Header>,
}

#[derive(Clone, PartialEq, Eq, Message)]
pub struct Heartbeat {
    #[prost(message, optional, tag = "1")]
    pub header: Option<Header>,
}

/// Exactly one payload variant (protobuf `oneof`).
#[derive(Clone, PartialEq, prost::Oneof)]
pub enum Envelope {
    #[prost(message, tag = "1")]
    Heartbeat(Heartbeat),

    #[prost(message, tag = "2")]
    ConnectionRequest(ConnectionRequest),

    #[prost(message, tag = "3")]
    ConnectionResponse(ConnectionResponse),

    #[prost(message, tag = "4")]
    StatsRequest(StatsRequest),

    #[prost(message, tag = "5")]
    StatsResponse(StatsResponse),

    #[prost(message, tag = "6")]
    StatsReport(StatsReport),

    #[prost(message, tag = "7")]
    MeasurementRequest(MeasurementRequest),

    #[prost(message, tag = "8")]
    MeasurementResponse(MeasurementResponse),

    #[prost(message, tag = "9")]
    MeasurementReport(MeasurementReport),

    #[prost(message, tag = "10")]
    MeasurementAck(MeasurementAck),
}

/// Outer message on the wire. Unknown oneof tags are skipped by the decoder,
/// which leaves `payload` empty.
#[derive(Clone, PartialEq, Message)]
struct WireEnvelope {
    #[prost(oneof = "Envelope", tags = "1, 2, 3, 4, 5, 6, 7, 8, 9, 10")]
    payload: Option<Envelope>,
}

impl Envelope {
    pub fn heartbeat(sender_id: u32) -> Self {
        Self::Heartbeat(Heartbeat {
            header: Some(Header::new(sender_id, MessageKind::Heartbeat)),
        })
    }

    pub fn connection_request(sender_id: u32, participants: Vec<Participant>) -> Self {
        Self::ConnectionRequest(ConnectionRequest {
            header: Some(Header::new(sender_id, MessageKind::ConnectionRequest)),
            participants,
        })
    }

    pub fn connection_response(sender_id: u32, interval: u32) -> Self {
        Self::ConnectionResponse(ConnectionResponse {
            header: Some(Header::new(sender_id, MessageKind::ConnectionResponse)),
            interval,
        })
    }

    pub fn stats_request(sender_id: u32, participants: Vec<Participant>) -> Self {
        Self::StatsRequest(StatsRequest {
            header: Some(Header::new(sender_id, MessageKind::StatsRequest)),
            participants,
        })
    }

    pub fn stats_response(sender_id: u32, state: u32) -> Self {
        Self::StatsResponse(StatsResponse {
            header: Some(Header::new(sender_id, MessageKind::StatsResponse)),
            state,
        })
    }

    pub fn stats_report(
        sender_id: u32,
        ip_address: impl Into<String>,
        mac_address: impl Into<String>,
    ) -> Self {
        Self::StatsReport(StatsReport {
            header: Some(Header::new(sender_id, MessageKind::StatsReport)),
            ip_address: ip_address.into(),
            mac_address: mac_address.into(),
        })
    }

    pub fn measurement_request(sender_id: u32) -> Self {
        Self::MeasurementRequest(MeasurementRequest {
            header: Some(Header::new(sender_id, MessageKind::MeasurementRequest)),
        })
    }

    pub fn measurement_response(sender_id: u32, port: u32, duration: u32) -> Self {
        Self::MeasurementResponse(MeasurementResponse {
            header: Some(Header::new(sender_id, MessageKind::MeasurementResponse)),
            port,
            duration,
        })
    }

    pub fn measurement_report(sender_id: u32, report: f64) -> Self {
        Self::MeasurementReport(MeasurementReport {
            header: Some(Header::new(sender_id, MessageKind::MeasurementReport)),
            report,
        })
    }

    pub fn measurement_ack(sender_id: u32) -> Self {
        Self::MeasurementAck(MeasurementAck {
            header: Some(Header::new(sender_id, MessageKind::MeasurementAck)),
        })
    }

    /// Kind of the payload variant actually held (independent of the header).
    #[must_use]
    pub const fn kind(&self) -> MessageKind {
        match self {
            Self::Heartbeat(_) => MessageKind::Heartbeat,
            Self::ConnectionRequest(_) => MessageKind::ConnectionRequest,
            Self::ConnectionResponse(_) => MessageKind::ConnectionResponse,
            Self::StatsRequest(_) => MessageKind::StatsRequest,
            Self::StatsResponse(_) => MessageKind::StatsResponse,
            Self::StatsReport(_) => MessageKind::StatsReport,
            Self::MeasurementRequest(_) => MessageKind::MeasurementRequest,
            Self::MeasurementResponse(_) => MessageKind::MeasurementResponse,
            Self::MeasurementReport(_) => MessageKind::MeasurementReport,
            Self::MeasurementAck(_) => MessageKind::MeasurementAck,
        }
    }

    #[must_use]
    pub const fn header(&self) -> Option<&Header> {
        match self {
            Self::Heartbeat(m) => m.header.as_ref(),
            Self::ConnectionRequest(m) => m.header.as_ref(),
            Self::ConnectionResponse(m) => m.header.as_ref(),
            Self::StatsRequest(m) => m.header.as_ref(),
            Self::StatsResponse(m) => m.header.as_ref(),
            Self::StatsReport(m) => m.header.as_ref(),
            Self::MeasurementRequest(m) => m.header.as_ref(),
            Self::MeasurementResponse(m) => m.header.as_ref(),
            Self::MeasurementReport(m) => m.header.as_ref(),
            Self::MeasurementAck(m) => m.header.as_ref(),
        }
    }

    #[must_use]
    pub fn sender_id(&self) -> Option<u32> {
        self.header().map(|header| header.id)
    }

    /// Serialize to the protobuf wire form.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        WireEnvelope {
            payload: Some(self.clone()),
        }
        .encode_to_vec()
    }

    /// Parse one envelope from protobuf bytes.
    ///
    /// Any structurally valid variant is accepted; whether it is expected at
    /// this point of the exchange is the caller's decision.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] if the bytes are malformed, carry no known
    /// variant, or carry a header that contradicts the variant.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        let wire = WireEnvelope::decode(bytes)
            .map_err(|e| DecodeError::malformed(e.to_string(), bytes.len()))?;
        let envelope = wire.payload.ok_or(DecodeError::UnknownVariant)?;
        envelope.check_header()?;
        Ok(envelope)
    }

    fn check_header(&self) -> Result<(), DecodeError> {
        let variant = self.kind();
        let header = self
            .header()
            .ok_or(DecodeError::MissingHeader { kind: variant })?;

        match MessageKind::try_from(header.kind) {
            // Servers that never set the kind stay interoperable.
            Ok(MessageKind::Unspecified) => Ok(()),
            Ok(kind) if kind == variant => Ok(()),
            Ok(kind) => Err(DecodeError::KindMismatch {
                header: kind,
                variant,
            }),
            Err(_) => Err(DecodeError::UnknownKind {
                value: header.kind,
                variant,
            }),
        }
    }
}

/// Encode an envelope to its wire bytes.
#[must_use]
pub fn encode(envelope: &Envelope) -> Vec<u8> {
    envelope.to_bytes()
}

/// Decode wire bytes into an envelope.
///
/// # Errors
///
/// See [`Envelope::from_bytes`].
pub fn decode(bytes: &[u8]) -> Result<Envelope, DecodeError> {
    Envelope::from_bytes(bytes)
}
