//! Rebalance background worker.
//!
//! Periodically rebalances allocator capacity and redistributes the
//! configured workload across balancer workers.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, instrument};

use super::Coordinator;
use crate::balancer::DistributionMode;

pub struct RebalanceWorker {
    coordinator: Arc<Coordinator>,
    interval: Duration,
    workload: f64,
    mode: DistributionMode,
}

impl RebalanceWorker {
    pub fn new(
        coordinator: Arc<Coordinator>,
        interval: Duration,
        workload: f64,
        mode: DistributionMode,
    ) -> Self {
        Self {
            coordinator,
            interval,
            workload,
            mode,
        }
    }

    /// Run until shutdown is signaled.
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            workload = self.workload,
            mode = %self.mode,
            "Starting rebalance worker"
        );

        let mut interval = tokio::time::interval(self.interval);
        // First tick completes immediately.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.run_once().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Rebalance worker shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Run a single rebalance pass.
    pub async fn run_once(&self) {
        match self.coordinator.rebalance_once(self.workload, self.mode).await {
            Ok(report) => {
                debug!(
                    capacity_moves = report.capacity_moves.len(),
                    workers = report.shares.len(),
                    recommended_intensity = report.recommended_intensity,
                    "Rebalance pass complete"
                );
            }
            Err(e) => {
                error!(error = %e, "Rebalance pass failed");
            }
        }
    }
}
