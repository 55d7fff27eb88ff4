//! Device registry and placement engine.
//!
//! The placement engine is responsible for:
//! - Registering classified devices with class presets and a signature
//! - Queueing submitted tasks in FIFO order
//! - Scoring available devices and binding the best one to a task
//! - Running the bound task through an [`ExecutionBackend`] and releasing
//!   the device afterwards
//!
//! Binding happens under the engine's write lock together with the
//! availability check, so a device is never bound to two tasks. Execution
//! itself runs outside the lock, so different devices work concurrently.

mod backend;
mod device;
mod engine;
mod scoring;
mod task;

pub use backend::{ExecutionBackend, SimulatedBackend};
pub use device::{Device, DeviceSpec};
pub use engine::{
    ClassStats, ClusterHealth, ExecutionOutcome, ExecutionReport, PlacementConfig,
    PlacementEngine,
};
pub use scoring::{affinity_score, device_score, ideal_intensity, intensity_compatibility};
pub use task::{Task, TaskMetrics, TaskSpec, TaskStatus, WorkloadKind};

use hetsched_id::{DeviceId, TaskId};

/// Result type for placement operations.
pub type PlacementResult<T> = Result<T, PlacementError>;

/// Errors returned by the placement engine.
///
/// "No suitable device" is not an error; see [`ExecutionOutcome`].
#[derive(Debug, thiserror::Error)]
pub enum PlacementError {
    #[error("invalid device: {0}")]
    InvalidDevice(String),

    #[error("invalid task: {0}")]
    InvalidTask(String),

    #[error("invalid telemetry: {0}")]
    InvalidTelemetry(String),

    #[error("unknown task: {0}")]
    UnknownTask(TaskId),

    #[error("unknown device: {0}")]
    UnknownDevice(DeviceId),

    #[error("device {0} is running a task")]
    DeviceBusy(DeviceId),

    #[error("task {task_id} is {status}, expected pending")]
    NotPending { task_id: TaskId, status: TaskStatus },
}
