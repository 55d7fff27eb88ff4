//! Fleet descriptions.
//!
//! A fleet file is a JSON document listing devices, capacity resources,
//! balancer workers and an initial task backlog:
//!
//! ```json
//! {
//!   "devices": [{ "id": "dev_...", "class": "burst", "name": "a0", ... }],
//!   "resources": [{ "id": "res_...", "capacity": 100.0 }],
//!   "workers": [{ "id": "wrk_...", "class": "steady" }],
//!   "tasks": [{ "kind": "training", "priority": 8, ... }]
//! }
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use hetsched_id::{ResourceId, TaskId, WorkerId};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::class::ProcessorClass;
use crate::coordinator::Coordinator;
use crate::error::CoordinatorResult;
use crate::placement::{DeviceSpec, TaskSpec};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceEntry {
    pub id: ResourceId,
    pub capacity: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerEntry {
    pub id: WorkerId,
    pub class: ProcessorClass,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Fleet {
    #[serde(default)]
    pub devices: Vec<DeviceSpec>,
    #[serde(default)]
    pub resources: Vec<ResourceEntry>,
    #[serde(default)]
    pub workers: Vec<WorkerEntry>,
    #[serde(default)]
    pub tasks: Vec<TaskSpec>,
}

/// What [`Fleet::apply`] registered.
#[derive(Debug, Clone, Serialize)]
pub struct FleetSummary {
    pub devices: usize,
    pub resources: usize,
    pub workers: usize,
    pub tasks: Vec<TaskId>,
}

impl Fleet {
    /// Read and parse a fleet file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read fleet file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse fleet file {}", path.display()))
    }

    /// Register everything with `coordinator` and submit the task backlog.
    /// Stops at the first invalid entry.
    pub async fn apply(self, coordinator: &Coordinator) -> CoordinatorResult<FleetSummary> {
        let devices = self.devices.len();
        for spec in self.devices {
            coordinator.placement().register_device(spec).await?;
        }

        let resources = self.resources.len();
        {
            let mut allocator = coordinator.allocator().lock().await;
            for entry in self.resources {
                allocator.register_resource(entry.id, entry.capacity)?;
            }
        }

        let workers = self.workers.len();
        {
            let mut balancer = coordinator.balancer().lock().await;
            for entry in self.workers {
                balancer.register_worker(entry.id, entry.class);
            }
        }

        let mut tasks = Vec::with_capacity(self.tasks.len());
        for spec in self.tasks {
            tasks.push(coordinator.placement().submit_task(spec).await?);
        }

        info!(
            devices,
            resources,
            workers,
            tasks = tasks.len(),
            "Fleet applied"
        );
        Ok(FleetSummary {
            devices,
            resources,
            workers,
            tasks,
        })
    }
}
