//! Execution backend interface and simulated implementation.
//!
//! The backend runs a task that the engine has already bound to a device.
//! The engine owns all bookkeeping; a backend only reports how long the
//! task ran or why it failed.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use super::{Device, Task};

/// Task execution interface.
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    /// Run `task` on `device`. `modeled` is the engine's estimate of the
    /// run time on this device. Returns the measured run time.
    async fn execute(&self, device: &Device, task: &Task, modeled: Duration) -> Result<Duration>;
}

/// Backend that waits a bounded time and reports the modeled duration.
pub struct SimulatedBackend {
    /// Longest real wait per task.
    max_wait: Duration,

    /// Whether every execution fails.
    fail: bool,
}

impl SimulatedBackend {
    /// Create a simulated backend that waits at most `max_wait` per task.
    pub fn new(max_wait: Duration) -> Self {
        Self {
            max_wait,
            fail: false,
        }
    }

    /// Create a backend that fails every execution.
    pub fn failing() -> Self {
        Self {
            max_wait: Duration::ZERO,
            fail: true,
        }
    }
}

impl Default for SimulatedBackend {
    fn default() -> Self {
        Self::new(Duration::from_millis(100))
    }
}

#[async_trait]
impl ExecutionBackend for SimulatedBackend {
    async fn execute(&self, device: &Device, task: &Task, modeled: Duration) -> Result<Duration> {
        if self.fail {
            anyhow::bail!("simulated backend configured to fail");
        }

        let wait = modeled.min(self.max_wait);
        debug!(
            task_id = %task.id,
            device_id = %device.id,
            modeled_ms = modeled.as_millis() as u64,
            wait_ms = wait.as_millis() as u64,
            "[SIM] Executing task"
        );

        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }

        Ok(modeled)
    }
}
