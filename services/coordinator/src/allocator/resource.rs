use hetsched_id::ResourceId;
use serde::Serialize;

use super::Zone;

/// Default share of a new resource held in reserve.
const INITIAL_RESERVATION: f64 = 0.1;

/// Local intensity of a newly registered resource.
const INITIAL_LOCAL_INTENSITY: f64 = 7.0;

/// One capacity resource in the pool.
#[derive(Debug, Clone)]
pub struct CapacityResource {
    pub id: ResourceId,
    pub capacity: f64,
    pub allocated: f64,
    pub reserved: f64,
    pub available: f64,
    pub local_intensity: f64,
}

impl CapacityResource {
    pub(crate) fn new(id: ResourceId, capacity: f64) -> Self {
        Self {
            id,
            capacity,
            allocated: 0.0,
            reserved: capacity * INITIAL_RESERVATION,
            available: capacity * (1.0 - INITIAL_RESERVATION),
            local_intensity: INITIAL_LOCAL_INTENSITY,
        }
    }

    /// Fraction of capacity allocated.
    pub fn pressure(&self) -> f64 {
        self.allocated / self.capacity
    }

    /// Recompute reserve and available space for a new reservation share.
    /// The reserve never eats into allocated capacity.
    pub(crate) fn resplit(&mut self, reservation_fraction: f64) {
        let unallocated = (self.capacity - self.allocated).max(0.0);
        self.reserved = (self.capacity * reservation_fraction).min(unallocated);
        self.available = (unallocated - self.reserved).max(0.0);
    }

    /// Move `amount` from available to allocated.
    pub(crate) fn grant(&mut self, amount: f64) {
        self.allocated += amount;
        self.available = (self.available - amount).max(0.0);
    }

    /// Return up to `amount` of allocated capacity. Returns what was freed.
    pub(crate) fn release(&mut self, amount: f64) -> f64 {
        let freed = amount.min(self.allocated);
        self.allocated -= freed;
        self.available += freed;
        freed
    }

    pub fn snapshot(&self) -> ResourceSnapshot {
        ResourceSnapshot {
            id: self.id,
            capacity: self.capacity,
            allocated: self.allocated,
            reserved: self.reserved,
            available: self.available,
            pressure: self.pressure(),
            local_intensity: self.local_intensity,
            local_zone: Zone::from_intensity(self.local_intensity),
        }
    }
}

/// Serializable view of a resource.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceSnapshot {
    pub id: ResourceId,
    pub capacity: f64,
    pub allocated: f64,
    pub reserved: f64,
    pub available: f64,
    pub pressure: f64,
    pub local_intensity: f64,
    pub local_zone: Zone,
}
