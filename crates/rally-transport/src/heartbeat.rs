//! Heartbeat sweeper.
//!
//! Every interval each connection is probed with a ping. A connection that
//! produced no inbound traffic since the previous sweep is closed instead,
//! which eventually runs the disconnect path for it.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::peers::{Outgoing, PeerTable};

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Connections sent a liveness probe.
    pub pinged: usize,
    /// Connections asked to terminate.
    pub closed: usize,
}

impl PeerTable {
    /// Probe every connection once.
    pub fn sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();

        for entry in self.peers.iter() {
            let was_alive = entry.alive.swap(false, Ordering::Relaxed);
            let item = if was_alive {
                report.pinged += 1;
                Outgoing::Ping
            } else {
                report.closed += 1;
                debug!(connection = %entry.key(), "Heartbeat missed, closing");
                Outgoing::Close
            };

            if entry.sender.send(item).is_err() {
                trace!(connection = %entry.key(), "Heartbeat to closed peer");
            }
        }

        report
    }
}

/// Run [`PeerTable::sweep`] on a fixed interval until the task is aborted.
pub fn spawn_sweeper(peers: Arc<PeerTable>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let report = peers.sweep();
            trace!(pinged = report.pinged, closed = report.closed, "Heartbeat sweep");
        }
    })
}
