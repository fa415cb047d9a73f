//! Heartbeat loop on the secondary connection.
//!
//! Sends one heartbeat immediately, then another whenever at least the
//! negotiated interval has elapsed since the last successful send. The loop
//! ends on the first send failure or when stopped through its
//! [`HeartbeatHandle`].

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use std::time::Duration;

use netmeas_wire::{Envelope, FrameTransport};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::SessionError;

/// Why the heartbeat loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeartbeatExit {
    /// Stopped by its owner.
    Stopped,
    /// A send failed; no further heartbeats were attempted.
    Failed(SessionError),
}

/// Final state of a heartbeat loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatSummary {
    /// Heartbeats written successfully.
    pub sent: u64,
    pub exit: HeartbeatExit,
}

type LoopExit<S> = (HeartbeatExit, FrameTransport<S>, u64);

/// Configuration of one heartbeat loop.
#[derive(Debug, Clone, Copy)]
pub struct HeartbeatLoop {
    interval: Duration,
    sender_id: u32,
}

impl HeartbeatLoop {
    #[must_use]
    pub const fn new(interval: Duration, sender_id: u32) -> Self {
        Self {
            interval,
            sender_id,
        }
    }

    /// Spawn the loop on the current runtime. It owns `transport` until joined.
    ///
    /// Dropping the returned handle aborts the loop.
    pub fn start<S>(self, transport: FrameTransport<S>) -> HeartbeatHandle<S>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (stop_tx, stop_rx) = watch::channel(false);
        let mut task = JoinSet::new();
        task.spawn(self.run(transport, stop_rx));

        HeartbeatHandle { stop_tx, task }
    }

    async fn run<S>(
        self,
        mut transport: FrameTransport<S>,
        mut stop_rx: watch::Receiver<bool>,
    ) -> LoopExit<S>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        info!(interval = ?self.interval, "heartbeat loop started");
        let mut last_sent: Option<Instant> = None;
        let mut sent: u64 = 0;

        loop {
            if *stop_rx.borrow() {
                break;
            }

            let due = last_sent.is_none_or(|at| at.elapsed() >= self.interval);
            if due {
                let heartbeat = Envelope::heartbeat(self.sender_id);
                // A peer that stops reading must not block a stop request.
                let result = tokio::select! {
                    biased;
                    _ = stop_rx.changed() => break,
                    result = transport.send(&heartbeat) => result,
                };
                if let Err(e) = result {
                    let error = SessionError::from(e);
                    warn!(%error, sent, "heartbeat send failed");
                    return (HeartbeatExit::Failed(error), transport, sent);
                }
                last_sent = Some(Instant::now());
                sent += 1;
                debug!(count = sent, "heartbeat sent");
            }

            let deadline = last_sent.map_or_else(Instant::now, |at| at + self.interval);
            tokio::select! {
                biased;
                changed = stop_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                () = tokio::time::sleep_until(deadline) => {}
            }
        }

        info!(sent, "heartbeat loop stopped");
        (HeartbeatExit::Stopped, transport, sent)
    }
}

/// Owner's handle on a running heartbeat loop.
#[derive(Debug)]
pub struct HeartbeatHandle<S> {
    stop_tx: watch::Sender<bool>,
    task: JoinSet<LoopExit<S>>,
}

impl<S: 'static> HeartbeatHandle<S> {
    /// Ask the loop to stop. A send blocked on the peer is abandoned.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    /// Wait for the loop to exit, returning its summary and the transport.
    ///
    /// The transport is `None` only if the task panicked or was aborted.
    pub async fn join(mut self) -> (HeartbeatSummary, Option<FrameTransport<S>>) {
        match self.task.join_next().await {
            Some(Ok((exit, transport, sent))) => (HeartbeatSummary { sent, exit }, Some(transport)),
            Some(Err(e)) => (task_failed(e.to_string()), None),
            None => (task_failed("heartbeat task missing".to_string()), None),
        }
    }
}

fn task_failed(reason: String) -> HeartbeatSummary {
    HeartbeatSummary {
        sent: 0,
        exit: HeartbeatExit::Failed(SessionError::TaskFailed { reason }),
    }
}
