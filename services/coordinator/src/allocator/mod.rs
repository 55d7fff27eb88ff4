//! Zoned capacity allocator.
//!
//! A single global intensity selects a zone, and the zone decides how much
//! of the pool one request may claim, how priorities are boosted, and how
//! much of every resource is held back as reserve. Granting capacity lowers
//! the intensity, releasing it raises the intensity again.
//!
//! Every resource keeps `capacity == allocated + reserved + available` with
//! no negative term after each operation.

mod resource;
mod zone;
mod zoned;

pub use resource::{CapacityResource, ResourceSnapshot};
pub use zone::{Zone, ZonePolicy};
pub use zoned::{
    AllocationOutcome, AllocationRequest, AllocatorConfig, AllocatorStats, IntensityTrend,
    ZonedCapacityAllocator, INTENSITY_MAX, INTENSITY_MIN,
};

use hetsched_id::{AllocationId, ResourceId};

/// Result type for allocator operations.
pub type AllocatorResult<T> = Result<T, AllocatorError>;

/// Errors returned by the allocator.
///
/// Running out of capacity is not an error; see [`AllocationOutcome`].
#[derive(Debug, thiserror::Error)]
pub enum AllocatorError {
    #[error("invalid capacity {0}: must be positive and finite")]
    InvalidCapacity(f64),

    #[error("intensity {0} outside 0-14")]
    InvalidIntensity(f64),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("unknown resource: {0}")]
    UnknownResource(ResourceId),

    #[error("resource already registered: {0}")]
    DuplicateResource(ResourceId),

    #[error("allocation already active: {0}")]
    DuplicateAllocation(AllocationId),
}
