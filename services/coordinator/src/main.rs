//! hetsched coordinator
//!
//! Loads a fleet, drains its task backlog across the registered devices,
//! and keeps rebalancing capacity and workload until interrupted.

use std::sync::Arc;

use anyhow::Result;
use hetsched_coordinator::{
    config::Config,
    fleet::Fleet,
    placement::{ExecutionOutcome, SimulatedBackend},
    Coordinator, RebalanceWorker,
};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    // Initialize tracing (prefer RUST_LOG, fallback to HETSCHED_LOG_LEVEL)
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting hetsched coordinator");
    info!(
        mode = %config.mode,
        rebalance_interval_secs = config.rebalance_interval.as_secs(),
        "Configuration loaded"
    );

    let backend = Arc::new(SimulatedBackend::new(config.execution_wait_cap));
    let coordinator = Arc::new(Coordinator::new(backend, &config));

    match &config.fleet_file {
        Some(path) => {
            let fleet = Fleet::load(path)?;
            let summary = fleet.apply(&coordinator).await?;
            info!(
                path = %path.display(),
                devices = summary.devices,
                tasks = summary.tasks.len(),
                "Fleet loaded"
            );
        }
        None => warn!("HETSCHED_FLEET_FILE not set, starting with an empty fleet"),
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Start rebalance worker in background
    let rebalance_worker = RebalanceWorker::new(
        coordinator.clone(),
        config.rebalance_interval,
        config.workload,
        config.mode,
    );
    let rebalance_handle = tokio::spawn({
        let shutdown_rx = shutdown_rx.clone();
        async move {
            rebalance_worker.run(shutdown_rx).await;
        }
    });

    // One drainer per device so every device can be busy at once
    let drainers = coordinator.placement().device_count().await.max(1);
    let mut drain_handles = Vec::with_capacity(drainers);
    for _ in 0..drainers {
        let coordinator = coordinator.clone();
        drain_handles.push(tokio::spawn(async move {
            loop {
                match coordinator.placement().execute_next().await {
                    Ok(Some(ExecutionOutcome::Completed(report))) => {
                        info!(
                            task_id = %report.task_id,
                            device_id = %report.device_id,
                            performance_score = report.performance_score,
                            "Task finished"
                        );
                    }
                    Ok(Some(outcome)) => {
                        warn!(task_id = %outcome.task_id(), "Task did not complete");
                    }
                    Ok(None) => break,
                    Err(e) => {
                        error!(error = %e, "Task execution failed");
                    }
                }
            }
        }));
    }
    for handle in drain_handles {
        if let Err(e) = handle.await {
            error!(error = %e, "Drain task panicked");
        }
    }

    let snapshot = coordinator.snapshot().await;
    info!(snapshot = %serde_json::to_string(&snapshot)?, "Backlog drained");

    // Wait for shutdown signal (Ctrl+C)
    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");

    let _ = shutdown_tx.send(true);
    if let Err(e) = rebalance_handle.await {
        error!(error = %e, "Rebalance worker panicked");
    }

    info!("hetsched coordinator stopped");
    Ok(())
}
