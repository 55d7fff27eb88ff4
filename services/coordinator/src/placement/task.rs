use chrono::{DateTime, Utc};
use hetsched_id::{DeviceId, TaskId};
use serde::{Deserialize, Serialize};

use super::{PlacementError, PlacementResult};
use crate::class::ProcessorClass;

/// Workload categories. Three of them have a class affinity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkloadKind {
    Training,
    Inference,
    Rendering,
    Compute,
    Encoding,
    Simulation,
    Mining,
}

impl WorkloadKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Training => "training",
            Self::Inference => "inference",
            Self::Rendering => "rendering",
            Self::Compute => "compute",
            Self::Encoding => "encoding",
            Self::Simulation => "simulation",
            Self::Mining => "mining",
        }
    }

    /// The class this workload runs best on, if any.
    pub fn affinity(&self) -> Option<ProcessorClass> {
        match self {
            Self::Training => Some(ProcessorClass::Burst),
            Self::Compute => Some(ProcessorClass::Steady),
            Self::Encoding => Some(ProcessorClass::Stable),
            _ => None,
        }
    }
}

impl std::fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task lifecycle: `Pending -> Running -> Completed | Failed`.
/// A task that finds no device goes straight from `Pending` to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Task description supplied at submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    pub kind: WorkloadKind,
    /// 1-10, 10 is most urgent.
    pub priority: u8,
    pub estimated_duration_secs: f64,
    pub memory_required_mb: u64,
    /// 0-1.
    #[serde(default)]
    pub compute_intensity: f64,
    #[serde(default)]
    pub preferred_class: Option<ProcessorClass>,
}

impl TaskSpec {
    pub fn validate(&self) -> PlacementResult<()> {
        if !(1..=10).contains(&self.priority) {
            return Err(PlacementError::InvalidTask(format!(
                "priority {} outside 1-10",
                self.priority
            )));
        }
        if !self.estimated_duration_secs.is_finite() || self.estimated_duration_secs < 0.0 {
            return Err(PlacementError::InvalidTask(
                "estimated duration must be a non-negative number".to_string(),
            ));
        }
        if self.memory_required_mb == 0 {
            return Err(PlacementError::InvalidTask(
                "memory requirement must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.compute_intensity) {
            return Err(PlacementError::InvalidTask(format!(
                "compute intensity {} outside 0-1",
                self.compute_intensity
            )));
        }
        Ok(())
    }
}

/// Measurements recorded when a task completes.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct TaskMetrics {
    pub actual_duration_secs: f64,
    pub energy_kwh: f64,
    pub performance_score: f64,
}

/// A submitted task. Retained after completion for statistics.
#[derive(Debug, Clone, Serialize)]
pub struct Task {
    pub id: TaskId,
    pub kind: WorkloadKind,
    pub priority: u8,
    pub estimated_duration_secs: f64,
    pub memory_required_mb: u64,
    pub compute_intensity: f64,
    pub preferred_class: Option<ProcessorClass>,
    pub signature: u8,
    pub status: TaskStatus,
    pub assigned_device: Option<DeviceId>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub metrics: Option<TaskMetrics>,
    pub failure_reason: Option<String>,
}

impl Task {
    pub(crate) fn from_spec(id: TaskId, spec: TaskSpec) -> Self {
        let signature = hetsched_signature::signature_of(&format!(
            "{}{}{}",
            spec.kind, spec.priority, spec.memory_required_mb
        ));

        Self {
            id,
            kind: spec.kind,
            priority: spec.priority,
            estimated_duration_secs: spec.estimated_duration_secs,
            memory_required_mb: spec.memory_required_mb,
            compute_intensity: spec.compute_intensity,
            preferred_class: spec.preferred_class,
            signature,
            status: TaskStatus::Pending,
            assigned_device: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            metrics: None,
            failure_reason: None,
        }
    }

    pub(crate) fn mark_running(&mut self, device_id: DeviceId) {
        self.status = TaskStatus::Running;
        self.assigned_device = Some(device_id);
        self.started_at = Some(Utc::now());
    }

    pub(crate) fn mark_completed(&mut self, metrics: TaskMetrics) {
        self.status = TaskStatus::Completed;
        self.completed_at = Some(Utc::now());
        self.metrics = Some(metrics);
    }

    pub(crate) fn mark_failed(&mut self, reason: impl Into<String>) {
        self.status = TaskStatus::Failed;
        self.completed_at = Some(Utc::now());
        self.failure_reason = Some(reason.into());
    }
}
