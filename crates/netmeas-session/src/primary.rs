//! Primary exchange state machine.
//!
//! Drives the strictly ordered request/response exchange on the primary
//! connection:
//!
//! ```text
//! Connecting → SendingConnReq → AwaitingConnResp → SendingStatsReq
//!   → AwaitingStatsResp → SendingStatsReport → SendingMeasureReq
//!   → AwaitingMeasureResp → RunningMeasurement → SendingMeasureReport
//!   → AwaitingAck → Closed
//! ```
//!
//! Any transport failure, decode failure or wrong response variant moves the
//! machine to `Failed` at the current step. Steps are never retried or skipped.
//! The negotiated heartbeat interval is published as soon as the connection
//! response has been validated.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use netmeas_wire::{Envelope, FrameTransport, MessageKind};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::error::{MeasurementError, Result, SessionError};
use crate::handoff::IntervalPublisher;
use crate::measure::ThroughputMeter;

/// Throughput reported when the measurement tool produced no figure.
pub const FALLBACK_THROUGHPUT_MBPS: f64 = 0.0;

/// Steps of the primary exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Connecting,
    SendingConnReq,
    AwaitingConnResp,
    SendingStatsReq,
    AwaitingStatsResp,
    SendingStatsReport,
    SendingMeasureReq,
    AwaitingMeasureResp,
    RunningMeasurement,
    SendingMeasureReport,
    AwaitingAck,
    Closed,
    Failed,
}

impl SessionState {
    /// Every state of a successful exchange, in order.
    pub const SUCCESS_PATH: [Self; 12] = [
        Self::Connecting,
        Self::SendingConnReq,
        Self::AwaitingConnResp,
        Self::SendingStatsReq,
        Self::AwaitingStatsResp,
        Self::SendingStatsReport,
        Self::SendingMeasureReq,
        Self::AwaitingMeasureResp,
        Self::RunningMeasurement,
        Self::SendingMeasureReport,
        Self::AwaitingAck,
        Self::Closed,
    ];

    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Failed)
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::SendingConnReq => "sending_conn_req",
            Self::AwaitingConnResp => "awaiting_conn_resp",
            Self::SendingStatsReq => "sending_stats_req",
            Self::AwaitingStatsResp => "awaiting_stats_resp",
            Self::SendingStatsReport => "sending_stats_report",
            Self::SendingMeasureReq => "sending_measure_req",
            Self::AwaitingMeasureResp => "awaiting_measure_resp",
            Self::RunningMeasurement => "running_measurement",
            Self::SendingMeasureReport => "sending_measure_report",
            Self::AwaitingAck => "awaiting_ack",
            Self::Closed => "closed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Measurement parameters assigned by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeasurementParams {
    pub port: u16,
    pub duration: Duration,
}

/// Result of an exchange that reached `Closed`.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionReport {
    /// States visited, ending in `Closed`.
    pub history: Vec<SessionState>,
    pub interval: Duration,
    pub stats_state: u32,
    pub measurement: MeasurementParams,
    /// Throughput sent in the measurement report, in Mbps.
    pub throughput_mbps: f64,
    /// Whether the throughput is the fallback sentinel.
    pub used_fallback: bool,
}

/// Result of an exchange that reached `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("primary session failed while {state}: {error}")]
pub struct SessionFailure {
    /// Step at which the exchange failed.
    pub state: SessionState,
    pub error: SessionError,
    /// States visited, ending in `Failed`.
    pub history: Vec<SessionState>,
}

impl SessionFailure {
    /// Failure before the exchange could start (connection not established).
    #[must_use]
    pub fn at_connect(error: SessionError) -> Self {
        Self {
            state: SessionState::Connecting,
            error,
            history: vec![SessionState::Connecting, SessionState::Failed],
        }
    }
}

/// One run of the primary exchange over an established connection.
pub struct PrimarySession {
    config: Arc<SessionConfig>,
    meter: Arc<dyn ThroughputMeter>,
    local_address: Option<IpAddr>,
    state: SessionState,
    history: Vec<SessionState>,
}

impl PrimarySession {
    pub fn new(config: Arc<SessionConfig>, meter: Arc<dyn ThroughputMeter>) -> Self {
        Self {
            config,
            meter,
            local_address: None,
            state: SessionState::Connecting,
            history: vec![SessionState::Connecting],
        }
    }

    /// Local address of the primary connection, reported in the statistics
    /// push unless the config overrides it.
    #[must_use]
    pub const fn with_local_address(mut self, address: IpAddr) -> Self {
        self.local_address = Some(address);
        self
    }

    /// Run the exchange to a terminal state.
    ///
    /// `publisher` receives the negotiated interval right after the
    /// connection response; it is dropped unpublished if the exchange fails
    /// earlier.
    ///
    /// # Errors
    ///
    /// Returns [`SessionFailure`] naming the step that failed.
    pub async fn run<S>(
        mut self,
        transport: &mut FrameTransport<S>,
        publisher: IntervalPublisher,
    ) -> std::result::Result<SessionReport, SessionFailure>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        match self.exchange(transport, publisher).await {
            Ok(report) => Ok(report),
            Err(error) => {
                let state = self.state;
                warn!(%state, %error, "primary session failed");
                self.enter(SessionState::Failed);
                Err(SessionFailure {
                    state,
                    error,
                    history: self.history,
                })
            }
        }
    }

    async fn exchange<S>(
        &mut self,
        transport: &mut FrameTransport<S>,
        publisher: IntervalPublisher,
    ) -> Result<SessionReport>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let id = self.config.client_id;

        self.enter(SessionState::SendingConnReq);
        send(
            transport,
            Envelope::connection_request(id, self.config.wire_participants()),
        )
        .await?;

        self.enter(SessionState::AwaitingConnResp);
        let interval = match receive(transport).await? {
            Envelope::ConnectionResponse(response) => negotiated_interval(response.interval)?,
            other => return Err(unexpected(MessageKind::ConnectionResponse, &other)),
        };
        if !publisher.publish(interval) {
            debug!("no heartbeat subscriber for negotiated interval");
        }
        info!(?interval, "connection accepted");

        self.enter(SessionState::SendingStatsReq);
        send(
            transport,
            Envelope::stats_request(id, self.config.wire_participants()),
        )
        .await?;

        self.enter(SessionState::AwaitingStatsResp);
        let stats_state = match receive(transport).await? {
            Envelope::StatsResponse(response) => response.state,
            other => return Err(unexpected(MessageKind::StatsResponse, &other)),
        };

        self.enter(SessionState::SendingStatsReport);
        send(
            transport,
            Envelope::stats_report(id, self.network_address(), self.config.hardware_address.clone()),
        )
        .await?;

        self.enter(SessionState::SendingMeasureReq);
        send(transport, Envelope::measurement_request(id)).await?;

        self.enter(SessionState::AwaitingMeasureResp);
        let measurement = match receive(transport).await? {
            Envelope::MeasurementResponse(response) => {
                measurement_params(response.port, response.duration)?
            }
            other => return Err(unexpected(MessageKind::MeasurementResponse, &other)),
        };

        self.enter(SessionState::RunningMeasurement);
        let (throughput_mbps, used_fallback) = match self.measure(measurement).await {
            Ok(mbps) => (mbps, false),
            Err(error) => {
                warn!(%error, "measurement failed, reporting fallback throughput");
                (FALLBACK_THROUGHPUT_MBPS, true)
            }
        };

        self.enter(SessionState::SendingMeasureReport);
        send(transport, Envelope::measurement_report(id, throughput_mbps)).await?;

        self.enter(SessionState::AwaitingAck);
        match receive(transport).await? {
            Envelope::MeasurementAck(_) => {}
            other => return Err(unexpected(MessageKind::MeasurementAck, &other)),
        }

        self.enter(SessionState::Closed);
        info!(throughput_mbps, used_fallback, "primary session closed");

        Ok(SessionReport {
            history: self.history.clone(),
            interval,
            stats_state,
            measurement,
            throughput_mbps,
            used_fallback,
        })
    }

    /// Run the external tool, bounded by the requested duration plus grace.
    async fn measure(
        &self,
        params: MeasurementParams,
    ) -> std::result::Result<f64, MeasurementError> {
        let limit = params.duration.saturating_add(self.config.measurement_grace());
        let target = self.config.measurement_target();

        tokio::time::timeout(
            limit,
            self.meter.measure(target, params.port, params.duration),
        )
        .await
        .map_err(|_| MeasurementError::Timeout { after: limit })?
    }

    fn network_address(&self) -> String {
        self.config
            .network_address
            .clone()
            .or_else(|| self.local_address.map(|address| address.to_string()))
            .unwrap_or_else(|| "0.0.0.0".to_string())
    }

    fn enter(&mut self, next: SessionState) {
        debug!(from = %self.state, to = %next, "primary transition");
        self.state = next;
        self.history.push(next);
    }
}

async fn send<S>(transport: &mut FrameTransport<S>, envelope: Envelope) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    transport.send(&envelope).await?;
    debug!(kind = %envelope.kind(), "sent");
    Ok(())
}

async fn receive<S>(transport: &mut FrameTransport<S>) -> Result<Envelope>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let envelope = transport.recv().await?;
    debug!(kind = %envelope.kind(), sender = ?envelope.sender_id(), "received");
    Ok(envelope)
}

fn unexpected(expected: MessageKind, actual: &Envelope) -> SessionError {
    SessionError::unexpected_variant(expected, actual.kind())
}

fn negotiated_interval(seconds: u32) -> Result<Duration> {
    if seconds == 0 {
        return Err(SessionError::InvalidInterval { interval: seconds });
    }
    Ok(Duration::from_secs(u64::from(seconds)))
}

fn measurement_params(port: u32, duration: u32) -> Result<MeasurementParams> {
    let port = u16::try_from(port)
        .ok()
        .filter(|port| *port != 0)
        .ok_or_else(|| {
            SessionError::invalid_measurement_parameters(format!("port {port} out of range"))
        })?;
    if duration == 0 {
        return Err(SessionError::invalid_measurement_parameters(
            "duration must be greater than 0",
        ));
    }

    Ok(MeasurementParams {
        port,
        duration: Duration::from_secs(u64::from(duration)),
    })
}
