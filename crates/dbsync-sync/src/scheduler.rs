//! Periodic reconciliation
//!
//! [`PeriodicSync`] runs [`Reconciler::steady_cycle`] on a fixed interval
//! until its cancellation token fires. Cancellation is observed only while
//! waiting; a cycle in progress runs to completion.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::reconciler::Reconciler;

/// Timer-driven steady-state task
pub struct PeriodicSync {
    reconciler: Arc<Reconciler>,
    interval: Duration,
}

impl PeriodicSync {
    pub fn new(reconciler: Arc<Reconciler>, interval: Duration) -> Self {
        Self { reconciler, interval }
    }

    /// Run cycles until `cancel` fires; returns the number of completed cycles
    pub async fn run(self, cancel: CancellationToken) -> u64 {
        info!(interval_secs = self.interval.as_secs_f64(), "Periodic sync starting");
        let mut cycles = 0u64;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }

            match self.reconciler.steady_cycle().await {
                Ok(report) => {
                    info!(
                        cycle = cycles + 1,
                        downloaded = report.downloaded,
                        uploaded = report.uploaded,
                        deleted_local = report.deleted_local,
                        folders_created = report.folders_created,
                        conflicts = report.conflicts,
                        in_sync = report.in_sync,
                        remote_errors = report.remote_errors,
                        "Sync cycle complete"
                    );
                }
                Err(e) => {
                    error!(cycle = cycles + 1, error = %e, "Sync cycle aborted");
                }
            }
            cycles += 1;
        }

        info!(cycles, "Periodic sync stopped");
        cycles
    }
}
