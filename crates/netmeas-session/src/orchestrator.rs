//! Session orchestration.
//!
//! Opens the primary connection and runs the exchange in its own task. Once
//! the exchange publishes the negotiated interval, opens the secondary
//! connection and starts the heartbeat loop. When the exchange reaches a
//! terminal state the heartbeat is stopped and both connections are closed.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use netmeas_wire::FrameTransport;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::{Endpoint, SessionConfig};
use crate::error::{Result, SessionError};
use crate::handoff::interval_channel;
use crate::heartbeat::{HeartbeatLoop, HeartbeatSummary};
use crate::measure::ThroughputMeter;
use crate::primary::{PrimarySession, SessionFailure, SessionReport, SessionState};

/// Upper bound on flushing and shutting down one connection after a session.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// An established byte stream plus the local address it is bound to.
#[derive(Debug)]
pub struct Connection<S> {
    pub stream: S,
    pub local_addr: Option<SocketAddr>,
}

/// Opens byte streams to server endpoints.
#[async_trait]
pub trait Connector: Send + Sync {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Connect to `endpoint`.
    async fn connect(&self, endpoint: &Endpoint) -> Result<Connection<Self::Stream>>;
}

/// TCP connector bounded by the configured connect timeout.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    timeout: Duration,
}

impl TcpConnector {
    #[must_use]
    pub const fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    #[must_use]
    pub const fn from_config(config: &SessionConfig) -> Self {
        Self::new(config.connect_timeout())
    }
}

#[async_trait]
impl Connector for TcpConnector {
    type Stream = TcpStream;

    async fn connect(&self, endpoint: &Endpoint) -> Result<Connection<TcpStream>> {
        let address = (endpoint.host.as_str(), endpoint.port);
        let stream = tokio::time::timeout(self.timeout, TcpStream::connect(address))
            .await
            .map_err(|_| SessionError::connect(endpoint, format!("timed out after {:?}", self.timeout)))?
            .map_err(|e| SessionError::connect(endpoint, e.to_string()))?;

        if let Err(e) = stream.set_nodelay(true) {
            debug!(%endpoint, error = %e, "could not set TCP_NODELAY");
        }
        let local_addr = stream.local_addr().ok();

        Ok(Connection { stream, local_addr })
    }
}

/// Combined result of one session.
#[derive(Debug)]
pub struct SessionOutcome {
    pub primary: std::result::Result<SessionReport, SessionFailure>,
    /// `None` if the heartbeat loop never started.
    pub heartbeat: Option<HeartbeatSummary>,
}

impl SessionOutcome {
    /// Whether the primary exchange reached `Closed`.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.primary.is_ok()
    }
}

/// Runs one full session against the configured servers.
pub struct SessionOrchestrator<C: Connector> {
    config: Arc<SessionConfig>,
    connector: C,
    meter: Arc<dyn ThroughputMeter>,
}

impl<C: Connector> SessionOrchestrator<C> {
    pub fn new(config: Arc<SessionConfig>, connector: C, meter: Arc<dyn ThroughputMeter>) -> Self {
        Self {
            config,
            connector,
            meter,
        }
    }

    /// Run the session to completion.
    ///
    /// Never fails as a whole: primary failures are carried in
    /// [`SessionOutcome::primary`], heartbeat failures in
    /// [`SessionOutcome::heartbeat`].
    ///
    /// Dropping the returned future aborts the exchange and the heartbeat
    /// loop, which drops both connections.
    pub async fn run(&self) -> SessionOutcome {
        let primary_endpoint = &self.config.primary;
        info!(endpoint = %primary_endpoint, client_id = self.config.client_id, "connecting primary");

        let connection = match self.connector.connect(primary_endpoint).await {
            Ok(connection) => connection,
            Err(error) => {
                warn!(%error, "primary connection failed");
                return SessionOutcome {
                    primary: Err(SessionFailure::at_connect(error)),
                    heartbeat: None,
                };
            }
        };

        let mut session = PrimarySession::new(Arc::clone(&self.config), Arc::clone(&self.meter));
        if let Some(addr) = connection.local_addr {
            session = session.with_local_address(addr.ip());
        }

        let (publisher, subscription) = interval_channel();
        let mut transport =
            FrameTransport::new(connection.stream).with_read_timeout(self.config.read_timeout());
        let mut primary_task = JoinSet::new();
        primary_task.spawn(async move {
            let result = session.run(&mut transport, publisher).await;
            (result, transport)
        });

        let heartbeat = match subscription.wait().await {
            Some(interval) => {
                let endpoint = &self.config.secondary;
                info!(%endpoint, ?interval, "connecting secondary");
                match self.connector.connect(endpoint).await {
                    Ok(connection) => {
                        let transport = FrameTransport::new(connection.stream);
                        Some(HeartbeatLoop::new(interval, self.config.client_id).start(transport))
                    }
                    Err(error) => {
                        warn!(%error, "secondary connection failed, continuing without heartbeat");
                        None
                    }
                }
            }
            None => {
                debug!("primary ended before negotiating an interval");
                None
            }
        };

        let (primary, primary_transport) = match primary_task.join_next().await {
            Some(Ok((result, transport))) => (result, Some(transport)),
            Some(Err(e)) => (Err(task_failed(e.to_string())), None),
            None => (Err(task_failed("primary task missing".to_string())), None),
        };

        let heartbeat = match heartbeat {
            Some(handle) => {
                handle.stop();
                let (summary, transport) = handle.join().await;
                if let Some(mut transport) = transport {
                    close(&mut transport, "secondary").await;
                }
                Some(summary)
            }
            None => None,
        };

        if let Some(mut transport) = primary_transport {
            close(&mut transport, "primary").await;
        }

        match &primary {
            Ok(report) => info!(
                throughput_mbps = report.throughput_mbps,
                heartbeats = heartbeat.as_ref().map_or(0, |summary| summary.sent),
                "session complete"
            ),
            Err(failure) => warn!(state = %failure.state, error = %failure.error, "session failed"),
        }

        SessionOutcome { primary, heartbeat }
    }
}

fn task_failed(reason: String) -> SessionFailure {
    SessionFailure {
        state: SessionState::Failed,
        error: SessionError::TaskFailed { reason },
        history: Vec::new(),
    }
}

/// Flush and shut down `transport`, giving up after [`CLOSE_TIMEOUT`] when
/// the peer stops reading.
async fn close<S>(transport: &mut FrameTransport<S>, channel: &str)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match tokio::time::timeout(CLOSE_TIMEOUT, transport.shutdown()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!(channel, error = %e, "shutdown after session"),
        Err(_) => warn!(channel, timeout = ?CLOSE_TIMEOUT, "shutdown timed out, dropping connection"),
    }
}
