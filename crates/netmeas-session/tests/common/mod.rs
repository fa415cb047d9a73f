//! Shared fixtures for session integration tests: a scripted server, a
//! stub throughput meter and an in-memory connector.

#![allow(dead_code)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use netmeas_session::{
    Connection, Connector, Endpoint, MeasurementError, ParticipantConfig, SessionConfig,
    SessionError, ThroughputMeter,
};
use netmeas_wire::{Envelope, FrameTransport, MessageKind};
use tokio::io::DuplexStream;

pub const DUPLEX_CAPACITY: usize = 64 * 1024;

/// Install a test-writer subscriber once per test binary.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("netmeas_session=debug")
        .try_init();
}

/// Config with one participant and a one second measurement grace.
pub fn test_config() -> SessionConfig {
    let mut config = SessionConfig::new(5)
        .with_participant(ParticipantConfig::new(2572, "Ada Lovelace", "ada@example.com"))
        .with_hardware_address("02:42:ac:11:00:02");
    config.measurement.grace_secs = 1;
    config
}

/// What the scripted server does after receiving a request.
#[derive(Debug, Clone)]
pub enum Reply {
    Send(Envelope),
    Silent,
    Close,
}

/// Replies of a well-behaved primary server.
pub fn happy_reply(envelope: &Envelope, interval: u32, port: u32, duration: u32) -> Reply {
    match envelope {
        Envelope::ConnectionRequest(_) => Reply::Send(Envelope::connection_response(0, interval)),
        Envelope::StatsRequest(_) => Reply::Send(Envelope::stats_response(0, 1)),
        Envelope::MeasurementRequest(_) => {
            Reply::Send(Envelope::measurement_response(0, port, duration))
        }
        Envelope::MeasurementReport(_) => Reply::Send(Envelope::measurement_ack(0)),
        _ => Reply::Silent,
    }
}

/// Well-behaved server, except that it answers a request of kind `at` with
/// a heartbeat.
pub fn wrong_reply_at(at: MessageKind) -> impl Fn(&Envelope) -> Reply + Send + 'static {
    move |envelope| {
        if envelope.kind() == at {
            Reply::Send(Envelope::heartbeat(0))
        } else {
            happy_reply(envelope, 7, 5201, 5)
        }
    }
}

/// Serve requests until the client closes, returning everything received.
pub async fn serve<F>(mut transport: FrameTransport<DuplexStream>, respond: F) -> Vec<Envelope>
where
    F: Fn(&Envelope) -> Reply,
{
    let mut received = Vec::new();

    while let Ok(envelope) = transport.recv().await {
        let reply = respond(&envelope);
        received.push(envelope);

        match reply {
            Reply::Send(response) => {
                if transport.send(&response).await.is_err() {
                    break;
                }
            }
            Reply::Silent => {}
            Reply::Close => break,
        }
    }

    received
}

/// Recorded call to the stub meter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeterCall {
    pub target: String,
    pub port: u16,
    pub duration: Duration,
}

/// Throughput meter returning a fixed result after an optional delay.
#[derive(Debug, Clone)]
pub struct StubMeter {
    result: Result<f64, MeasurementError>,
    delay: Duration,
    calls: Arc<Mutex<Vec<MeterCall>>>,
}

impl StubMeter {
    pub fn returning(mbps: f64) -> Self {
        Self {
            result: Ok(mbps),
            delay: Duration::ZERO,
            calls: Arc::default(),
        }
    }

    pub fn failing(error: MeasurementError) -> Self {
        Self {
            result: Err(error),
            delay: Duration::ZERO,
            calls: Arc::default(),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<MeterCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ThroughputMeter for StubMeter {
    async fn measure(
        &self,
        target: &str,
        port: u16,
        duration: Duration,
    ) -> Result<f64, MeasurementError> {
        self.calls.lock().unwrap().push(MeterCall {
            target: target.to_string(),
            port,
            duration,
        });
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.result.clone()
    }
}

/// Connector handing out pre-created duplex streams keyed by port.
///
/// Each port connects at most once; unknown ports are refused.
#[derive(Debug, Clone, Default)]
pub struct DuplexConnector {
    streams: Arc<Mutex<HashMap<u16, DuplexStream>>>,
    log: Arc<Mutex<Vec<u16>>>,
}

impl DuplexConnector {
    /// Register `port` and return the server end of its stream.
    pub fn listen(&self, port: u16) -> FrameTransport<DuplexStream> {
        self.listen_with_capacity(port, DUPLEX_CAPACITY)
    }

    /// Like [`Self::listen`], with a pipe that holds at most `capacity`
    /// unread bytes.
    pub fn listen_with_capacity(&self, port: u16, capacity: usize) -> FrameTransport<DuplexStream> {
        let (client, server) = tokio::io::duplex(capacity);
        self.streams.lock().unwrap().insert(port, client);
        FrameTransport::new(server)
    }

    /// Ports connected to so far, in order.
    pub fn connections(&self) -> Vec<u16> {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for DuplexConnector {
    type Stream = DuplexStream;

    async fn connect(&self, endpoint: &Endpoint) -> netmeas_session::Result<Connection<DuplexStream>> {
        self.log.lock().unwrap().push(endpoint.port);
        let stream = self
            .streams
            .lock()
            .unwrap()
            .remove(&endpoint.port)
            .ok_or_else(|| SessionError::connect(endpoint, "connection refused"))?;

        Ok(Connection {
            stream,
            local_addr: None,
        })
    }
}

/// Kinds of the given envelopes, in order.
pub fn kinds(envelopes: &[Envelope]) -> Vec<MessageKind> {
    envelopes.iter().map(Envelope::kind).collect()
}
