//! Placement engine: device registry, task queue, and execution.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use hetsched_id::{DeviceId, TaskId};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use super::scoring::device_score;
use super::{
    Device, DeviceSpec, ExecutionBackend, PlacementError, PlacementResult, Task, TaskMetrics,
    TaskSpec, TaskStatus,
};
use crate::class::ProcessorClass;

/// Reference intensity for the cluster health score.
const IDEAL_INTENSITY: f64 = 6.5;

/// Temperature at which the thermal health term reaches zero.
const HEALTH_TEMPERATURE_CEILING: f64 = 90.0;

/// Utilization shed by a device when it finishes a task.
const RELEASE_UTILIZATION_DROP: f64 = 0.1;

/// Placement engine configuration.
#[derive(Debug, Clone)]
pub struct PlacementConfig {
    /// Devices hotter than this are penalized when scored.
    pub high_temperature_c: f64,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            high_temperature_c: 80.0,
        }
    }
}

/// Details of a completed execution.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReport {
    pub task_id: TaskId,
    pub device_id: DeviceId,
    pub class: ProcessorClass,
    pub duration_secs: f64,
    pub energy_kwh: f64,
    pub performance_score: f64,
}

/// Result of asking the engine to run a task.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Completed(ExecutionReport),
    NoSuitableDevice {
        task_id: TaskId,
    },
    Failed {
        task_id: TaskId,
        device_id: DeviceId,
        reason: String,
    },
}

impl ExecutionOutcome {
    pub fn task_id(&self) -> TaskId {
        match self {
            Self::Completed(report) => report.task_id,
            Self::NoSuitableDevice { task_id } | Self::Failed { task_id, .. } => *task_id,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

/// Aggregate cluster health.
#[derive(Debug, Clone, Serialize)]
pub struct ClusterHealth {
    /// 0-100.
    pub health_score: f64,
    pub avg_utilization: f64,
    pub avg_intensity: f64,
    pub avg_temperature: f64,
    /// Distinct classes present / 3.
    pub class_diversity: f64,
    pub device_count: usize,
    pub active_tasks: usize,
    pub completed_tasks: u64,
    pub failed_tasks: u64,
    /// Running mean of completed task performance scores.
    pub average_efficiency: f64,
}

/// Per-class device statistics.
#[derive(Debug, Clone, Serialize)]
pub struct ClassStats {
    pub device_count: usize,
    pub avg_utilization: f64,
    pub avg_temperature: f64,
    pub avg_intensity: f64,
    pub total_capacity_mb: u64,
    pub available_capacity_mb: u64,
}

#[derive(Default)]
struct EngineState {
    devices: HashMap<DeviceId, Device>,
    /// Registration order, used to break score ties.
    order: Vec<DeviceId>,
    tasks: HashMap<TaskId, Task>,
    queue: VecDeque<TaskId>,
    completed: u64,
    failed: u64,
    average_performance: f64,
}

impl EngineState {
    fn best_device(&self, task: &Task, high_temperature_c: f64) -> Option<DeviceId> {
        let mut best: Option<(DeviceId, f64)> = None;
        for id in &self.order {
            let Some(device) = self.devices.get(id) else {
                continue;
            };
            if !device.can_host(task.memory_required_mb) {
                continue;
            }
            let score = device_score(device, task, high_temperature_c);
            // Strictly greater keeps the earliest registered device on ties.
            if best.is_none_or(|(_, top)| score > top) {
                best = Some((*id, score));
            }
        }
        best.map(|(id, _)| id)
    }

    fn record_completion(&mut self, performance: f64) {
        self.completed += 1;
        self.average_performance +=
            (performance - self.average_performance) / self.completed as f64;
    }

    fn release(&mut self, device_id: &DeviceId, task_id: &TaskId, memory_mb: u64) {
        if let Some(device) = self.devices.get_mut(device_id) {
            if device.current_task == Some(*task_id) {
                device.is_available = true;
                device.current_task = None;
                device.available_capacity_mb =
                    (device.available_capacity_mb + memory_mb).min(device.total_capacity_mb);
                device.utilization = (device.utilization - RELEASE_UTILIZATION_DROP).max(0.0);
            }
        }
    }
}

/// A task bound to a device, ready to run outside the lock.
struct Binding {
    device: Device,
    task: Task,
}

/// Device registry and task placement.
pub struct PlacementEngine {
    state: RwLock<EngineState>,

    /// Backend that actually runs bound tasks.
    backend: Arc<dyn ExecutionBackend>,

    config: PlacementConfig,
}

impl PlacementEngine {
    /// Create an engine that runs tasks on `backend`.
    pub fn new(backend: Arc<dyn ExecutionBackend>, config: PlacementConfig) -> Self {
        Self {
            state: RwLock::new(EngineState::default()),
            backend,
            config,
        }
    }

    /// Register a device. Re-registering an idle id overwrites the device
    /// but keeps its original tie-break position; a bound device is
    /// rejected with [`PlacementError::DeviceBusy`].
    #[instrument(skip(self, spec), fields(device_id = %spec.id, class = %spec.class))]
    pub async fn register_device(&self, spec: DeviceSpec) -> PlacementResult<bool> {
        spec.validate()?;
        let device = Device::from_spec(spec);

        let mut state = self.state.write().await;
        let id = device.id;
        if let Some(existing) = state.devices.get(&id) {
            if existing.current_task.is_some() {
                warn!("Refusing to re-register a bound device");
                return Err(PlacementError::DeviceBusy(id));
            }
        }
        info!(
            name = %device.name,
            signature = device.signature,
            intensity = device.intensity,
            "Registered device"
        );
        if state.devices.insert(id, device).is_none() {
            state.order.push(id);
        }
        Ok(true)
    }

    /// Queue a task for execution.
    #[instrument(skip(self, spec), fields(kind = %spec.kind, priority = spec.priority))]
    pub async fn submit_task(&self, spec: TaskSpec) -> PlacementResult<TaskId> {
        spec.validate()?;
        let id = TaskId::new();
        let task = Task::from_spec(id, spec);

        let mut state = self.state.write().await;
        debug!(task_id = %id, signature = task.signature, "Task submitted");
        state.tasks.insert(id, task);
        state.queue.push_back(id);
        Ok(id)
    }

    /// Snapshot of a task.
    pub async fn task(&self, id: &TaskId) -> Option<Task> {
        self.state.read().await.tasks.get(id).cloned()
    }

    /// Snapshot of a device.
    pub async fn device(&self, id: &DeviceId) -> Option<Device> {
        self.state.read().await.devices.get(id).cloned()
    }

    /// Number of registered devices.
    pub async fn device_count(&self) -> usize {
        self.state.read().await.devices.len()
    }

    /// Number of task ids in the queue. Tasks run directly with
    /// [`execute_task`](Self::execute_task) keep their queue entry until
    /// [`execute_next`](Self::execute_next) reaches and skips it.
    pub async fn queue_len(&self) -> usize {
        self.state.read().await.queue.len()
    }

    /// Highest scoring available device for `task`, without binding it.
    pub async fn select_device(&self, task: &Task) -> Option<Device> {
        let state = self.state.read().await;
        let id = state.best_device(task, self.config.high_temperature_c)?;
        state.devices.get(&id).cloned()
    }

    /// Select a device for the task, bind it, run the task, and release
    /// the device.
    #[instrument(skip(self), fields(task_id = %id))]
    pub async fn execute_task(&self, id: TaskId) -> PlacementResult<ExecutionOutcome> {
        let Some(binding) = self.bind(id).await? else {
            return Ok(ExecutionOutcome::NoSuitableDevice { task_id: id });
        };
        let Binding { device, task } = binding;

        let modeled_secs = task.estimated_duration_secs
            * (1.0 - device.activity_rate * 0.2)
            * (1.0 + device.utilization * 0.1);
        let modeled = Duration::try_from_secs_f64(modeled_secs).unwrap_or(Duration::MAX);

        let result = self.backend.execute(&device, &task, modeled).await;

        let mut state = self.state.write().await;
        state.release(&device.id, &id, task.memory_required_mb);

        match result {
            Ok(actual) => {
                let actual_secs = actual.as_secs_f64();
                let power_draw = device.power_limit_watts * (0.5 + device.utilization * 0.5);
                let energy_kwh = power_draw / 1000.0 * (actual_secs / 3600.0);
                let performance_score =
                    task.estimated_duration_secs / actual_secs.max(0.001) * device.efficiency;

                if let Some(task) = state.tasks.get_mut(&id) {
                    task.mark_completed(TaskMetrics {
                        actual_duration_secs: actual_secs,
                        energy_kwh,
                        performance_score,
                    });
                }
                state.record_completion(performance_score);

                info!(
                    device_id = %device.id,
                    class = %device.class,
                    duration_secs = actual_secs,
                    performance_score,
                    "Task completed"
                );

                Ok(ExecutionOutcome::Completed(ExecutionReport {
                    task_id: id,
                    device_id: device.id,
                    class: device.class,
                    duration_secs: actual_secs,
                    energy_kwh,
                    performance_score,
                }))
            }
            Err(e) => {
                let reason = e.to_string();
                if let Some(task) = state.tasks.get_mut(&id) {
                    task.mark_failed(reason.clone());
                }
                state.failed += 1;

                warn!(device_id = %device.id, error = %reason, "Task execution failed");

                Ok(ExecutionOutcome::Failed {
                    task_id: id,
                    device_id: device.id,
                    reason,
                })
            }
        }
    }

    /// Bind the best device under the write lock. Returns `None` and marks
    /// the task failed when nothing can host it.
    async fn bind(&self, id: TaskId) -> PlacementResult<Option<Binding>> {
        let mut state = self.state.write().await;

        let task = state.tasks.get(&id).ok_or(PlacementError::UnknownTask(id))?;
        if task.status != TaskStatus::Pending {
            return Err(PlacementError::NotPending {
                task_id: id,
                status: task.status,
            });
        }

        let Some(device_id) = state.best_device(task, self.config.high_temperature_c) else {
            if let Some(task) = state.tasks.get_mut(&id) {
                task.mark_failed("no suitable device");
            }
            state.failed += 1;
            warn!("No suitable device for task");
            return Ok(None);
        };

        let Some(task) = state.tasks.get_mut(&id) else {
            return Err(PlacementError::UnknownTask(id));
        };
        task.mark_running(device_id);
        let task = task.clone();

        let Some(device) = state.devices.get_mut(&device_id) else {
            return Err(PlacementError::UnknownDevice(device_id));
        };
        device.is_available = false;
        device.current_task = Some(id);
        device.available_capacity_mb -= task.memory_required_mb;
        let device = device.clone();

        debug!(device_id = %device_id, class = %device.class, "Task bound to device");
        Ok(Some(Binding { device, task }))
    }

    /// Pop the next pending task from the queue and execute it.
    ///
    /// Queue entries for tasks that were already run directly are skipped.
    pub async fn execute_next(&self) -> PlacementResult<Option<ExecutionOutcome>> {
        loop {
            let next = {
                let mut state = self.state.write().await;
                let Some(id) = state.queue.pop_front() else {
                    return Ok(None);
                };
                let pending = state
                    .tasks
                    .get(&id)
                    .is_some_and(|t| t.status == TaskStatus::Pending);
                pending.then_some(id)
            };

            if let Some(id) = next {
                return self.execute_task(id).await.map(Some);
            }
        }
    }

    /// Record a device heartbeat.
    pub async fn report_telemetry(
        &self,
        id: &DeviceId,
        utilization: f64,
        temperature: f64,
    ) -> PlacementResult<()> {
        if !(0.0..=1.0).contains(&utilization) {
            return Err(PlacementError::InvalidTelemetry(format!(
                "utilization {utilization} outside 0-1"
            )));
        }
        if !temperature.is_finite() {
            return Err(PlacementError::InvalidTelemetry(
                "temperature must be finite".to_string(),
            ));
        }

        let mut state = self.state.write().await;
        let device = state
            .devices
            .get_mut(id)
            .ok_or(PlacementError::UnknownDevice(*id))?;
        device.utilization = utilization;
        device.temperature = temperature;
        device.last_telemetry_at = Utc::now();
        debug!(device_id = %id, utilization, temperature, "Telemetry recorded");
        Ok(())
    }

    /// Cluster health. `None` when no devices are registered.
    pub async fn health(&self) -> Option<ClusterHealth> {
        let state = self.state.read().await;
        if state.devices.is_empty() {
            return None;
        }

        let n = state.devices.len() as f64;
        let avg_utilization = state.devices.values().map(|d| d.utilization).sum::<f64>() / n;
        let avg_intensity = state.devices.values().map(|d| d.intensity).sum::<f64>() / n;
        let avg_temperature = state.devices.values().map(|d| d.temperature).sum::<f64>() / n;
        let class_diversity = ProcessorClass::diversity(state.devices.values().map(|d| d.class));

        let health_score = (1.0 - avg_utilization) * 30.0
            + (1.0 - (avg_intensity - IDEAL_INTENSITY).abs() / IDEAL_INTENSITY) * 20.0
            + ((HEALTH_TEMPERATURE_CEILING - avg_temperature) / HEALTH_TEMPERATURE_CEILING)
                .max(0.0)
                * 20.0
            + class_diversity * 30.0;

        Some(ClusterHealth {
            health_score,
            avg_utilization,
            avg_intensity,
            avg_temperature,
            class_diversity,
            device_count: state.devices.len(),
            active_tasks: state
                .tasks
                .values()
                .filter(|t| t.status == TaskStatus::Running)
                .count(),
            completed_tasks: state.completed,
            failed_tasks: state.failed,
            average_efficiency: state.average_performance,
        })
    }

    /// Device statistics grouped by class. Classes with no devices are
    /// omitted.
    pub async fn class_stats(&self) -> BTreeMap<ProcessorClass, ClassStats> {
        let state = self.state.read().await;
        let mut grouped: BTreeMap<ProcessorClass, Vec<&Device>> = BTreeMap::new();
        for device in state.devices.values() {
            grouped.entry(device.class).or_default().push(device);
        }

        grouped
            .into_iter()
            .map(|(class, devices)| {
                let n = devices.len() as f64;
                let stats = ClassStats {
                    device_count: devices.len(),
                    avg_utilization: devices.iter().map(|d| d.utilization).sum::<f64>() / n,
                    avg_temperature: devices.iter().map(|d| d.temperature).sum::<f64>() / n,
                    avg_intensity: devices.iter().map(|d| d.intensity).sum::<f64>() / n,
                    total_capacity_mb: devices.iter().map(|d| d.total_capacity_mb).sum(),
                    available_capacity_mb: devices.iter().map(|d| d.available_capacity_mb).sum(),
                };
                (class, stats)
            })
            .collect()
    }
}
