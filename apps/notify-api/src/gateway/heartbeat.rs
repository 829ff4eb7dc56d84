//! Liveness sweep over the registry.
//!
//! Each sweep pings every registered connection whose liveness flag is set
//! and clears the flag; a pong sets it again. A connection still unflagged at
//! the next sweep is terminated and removed, so a dead peer is gone within
//! two sweeps.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use super::connection::Outbound;
use super::registry::ConnectionRegistry;

/// Outcome of one sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub pinged: usize,
    pub evicted: usize,
}

pub fn sweep(registry: &ConnectionRegistry) -> SweepReport {
    let mut report = SweepReport::default();

    for handle in registry.snapshot() {
        if !handle.take_alive() {
            tracing::debug!(
                conn_id = %handle.id,
                user_id = %handle.user_id,
                "heartbeat missed, evicting connection"
            );
            handle.terminate();
            registry.remove(&handle.user_id, &handle.id);
            report.evicted += 1;
            continue;
        }

        if handle.try_send(Outbound::Ping) {
            report.pinged += 1;
        }
    }

    report
}

/// Run [`sweep`] every `interval` until `shutdown` flips to `true`.
pub fn spawn(
    registry: std::sync::Arc<ConnectionRegistry>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await; // First tick fires immediately; skip it.

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = sweep(&registry);
                    if report.evicted > 0 {
                        tracing::info!(
                            evicted = report.evicted,
                            pinged = report.pinged,
                            "heartbeat sweep"
                        );
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::debug!("heartbeat task stopped");
    })
}
