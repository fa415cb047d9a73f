//! Publish-once handoff of the negotiated heartbeat interval.
//!
//! The primary exchange owns the [`IntervalPublisher`]; publishing consumes
//! it, so the interval can be written at most once. The orchestrator waits on
//! the [`IntervalSubscription`] before starting the heartbeat loop.

use std::time::Duration;

use tokio::sync::oneshot;

/// Create a connected publisher/subscription pair.
#[must_use]
pub fn interval_channel() -> (IntervalPublisher, IntervalSubscription) {
    let (tx, rx) = oneshot::channel();
    (IntervalPublisher { tx }, IntervalSubscription { rx })
}

/// Write side of the handoff.
#[derive(Debug)]
pub struct IntervalPublisher {
    tx: oneshot::Sender<Duration>,
}

impl IntervalPublisher {
    /// Publish the interval. Returns `false` if nobody is waiting any more.
    pub fn publish(self, interval: Duration) -> bool {
        self.tx.send(interval).is_ok()
    }
}

/// Read side of the handoff.
#[derive(Debug)]
pub struct IntervalSubscription {
    rx: oneshot::Receiver<Duration>,
}

impl IntervalSubscription {
    /// Wait for the interval.
    ///
    /// Resolves to `None` when the publisher was dropped without publishing,
    /// i.e. the primary exchange ended before the connection response.
    pub async fn wait(self) -> Option<Duration> {
        self.rx.await.ok()
    }
}
