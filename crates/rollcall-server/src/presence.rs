//! Terminal presence sweep.
//!
//! Terminals only ever poll, so "online" means "polled recently". A periodic
//! sweep flips silent terminals offline and reports commands that were
//! handed out but never confirmed.

use std::time::Duration;

use rollcall_core::db::unix_timestamp;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::queue::CommandQueue;
use crate::storage::{DatabaseError, RollcallDatabase};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub went_offline: u64,
    pub stale_commands: usize,
}

#[derive(Clone)]
pub struct PresenceMonitor {
    db: RollcallDatabase,
    queue: CommandQueue,
    offline_after_secs: i64,
    stale_command_secs: i64,
}

impl PresenceMonitor {
    pub const fn new(
        db: RollcallDatabase,
        queue: CommandQueue,
        offline_after_secs: i64,
        stale_command_secs: i64,
    ) -> Self {
        Self {
            db,
            queue,
            offline_after_secs,
            stale_command_secs,
        }
    }

    pub async fn sweep(&self) -> Result<SweepReport, DatabaseError> {
        let cutoff = unix_timestamp() - self.offline_after_secs;
        let went_offline = self.db.mark_silent_devices_offline(cutoff).await?;

        let stale_commands = match self.queue.stale(None, self.stale_command_secs).await {
            Ok(stale) => stale.len(),
            Err(e) => {
                warn!(error = %e, "Stale command lookup failed");
                0
            }
        };

        Ok(SweepReport {
            went_offline,
            stale_commands,
        })
    }

    pub fn spawn(self, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every.max(Duration::from_secs(1)));
            interval.tick().await; // Skip first immediate tick
            loop {
                interval.tick().await;
                match self.sweep().await {
                    Ok(report) if report.went_offline > 0 || report.stale_commands > 0 => {
                        info!(
                            went_offline = report.went_offline,
                            stale_commands = report.stale_commands,
                            "Presence sweep completed"
                        );
                    }
                    Err(e) => warn!(error = %e, "Presence sweep failed"),
                    _ => {}
                }
            }
        })
    }
}
