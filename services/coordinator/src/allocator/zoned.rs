use std::collections::{BTreeMap, HashMap, VecDeque};

use hetsched_id::{AllocationId, ResourceId};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use super::{AllocatorError, AllocatorResult, CapacityResource, ResourceSnapshot, Zone};

pub const INTENSITY_MIN: f64 = 0.0;
pub const INTENSITY_MAX: f64 = 14.0;

/// Local intensity favoured when a request names no zone.
const PREFERRED_LOCAL_INTENSITY: f64 = 6.0;

/// Deviation from the global ratio that triggers a rebalance move.
const REBALANCE_THRESHOLD: f64 = 0.1;

const TREND_WINDOW: usize = 10;
const TREND_MIN_READINGS: usize = 5;
const TREND_SLOPE: f64 = 0.1;

/// Allocator construction parameters.
#[derive(Debug, Clone)]
pub struct AllocatorConfig {
    /// Global intensity before any update.
    pub initial_intensity: f64,
    /// Global intensity readings kept for trend analysis.
    pub history_limit: usize,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            initial_intensity: 7.0,
            history_limit: 100,
        }
    }
}

/// A request for pool capacity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationRequest {
    pub id: AllocationId,
    pub amount: f64,
    /// 1-10.
    pub priority: u8,
    pub expected_duration_secs: f64,
    #[serde(default)]
    pub preferred_zone: Option<Zone>,
    /// Critical requests bypass the per-request cap.
    #[serde(default)]
    pub critical: bool,
}

impl AllocationRequest {
    pub fn new(amount: f64, priority: u8) -> Self {
        Self {
            id: AllocationId::new(),
            amount,
            priority,
            expected_duration_secs: 0.0,
            preferred_zone: None,
            critical: false,
        }
    }

    pub fn with_preferred_zone(mut self, zone: Zone) -> Self {
        self.preferred_zone = Some(zone);
        self
    }

    pub fn critical(mut self) -> Self {
        self.critical = true;
        self
    }

    fn validate(&self) -> AllocatorResult<()> {
        if !self.amount.is_finite() || self.amount <= 0.0 {
            return Err(AllocatorError::InvalidRequest(format!(
                "amount {} must be positive and finite",
                self.amount
            )));
        }
        if !(1..=10).contains(&self.priority) {
            return Err(AllocatorError::InvalidRequest(format!(
                "priority {} outside 1-10",
                self.priority
            )));
        }
        if !self.expected_duration_secs.is_finite() || self.expected_duration_secs < 0.0 {
            return Err(AllocatorError::InvalidRequest(
                "expected duration must be a non-negative number".to_string(),
            ));
        }
        Ok(())
    }
}

/// Result of an allocation attempt.
#[derive(Debug, Clone, Serialize)]
pub struct AllocationOutcome {
    pub granted: bool,
    pub resource_id: Option<ResourceId>,
    pub amount: f64,
    /// Global zone at decision time.
    pub zone: Zone,
}

impl AllocationOutcome {
    fn denied(zone: Zone) -> Self {
        Self {
            granted: false,
            resource_id: None,
            amount: 0.0,
            zone,
        }
    }
}

/// Direction of recent global intensity readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IntensityTrend {
    Rising,
    Falling,
    Stable,
    InsufficientData,
}

/// Allocator statistics.
#[derive(Debug, Clone, Serialize)]
pub struct AllocatorStats {
    pub global_intensity: f64,
    pub zone: Zone,
    pub trend: IntensityTrend,
    pub total_capacity: f64,
    pub total_allocated: f64,
    pub total_reserved: f64,
    pub total_available: f64,
    pub allocation_ratio: f64,
    pub active_allocations: usize,
    pub resources: Vec<ResourceSnapshot>,
}

/// A live grant.
#[derive(Debug, Clone)]
struct Grant {
    request: AllocationRequest,
    resource_id: ResourceId,
    amount: f64,
}

/// Zone-driven capacity allocator.
pub struct ZonedCapacityAllocator {
    resources: HashMap<ResourceId, CapacityResource>,
    /// Registration order, used to break score ties.
    order: Vec<ResourceId>,
    grants: HashMap<AllocationId, Grant>,
    global_intensity: f64,
    history: VecDeque<f64>,
    history_limit: usize,
}

impl ZonedCapacityAllocator {
    pub fn new(config: AllocatorConfig) -> Self {
        Self {
            resources: HashMap::new(),
            order: Vec::new(),
            grants: HashMap::new(),
            global_intensity: config.initial_intensity.clamp(INTENSITY_MIN, INTENSITY_MAX),
            history: VecDeque::new(),
            history_limit: config.history_limit.max(1),
        }
    }

    pub fn global_intensity(&self) -> f64 {
        self.global_intensity
    }

    pub fn zone(&self) -> Zone {
        Zone::from_intensity(self.global_intensity)
    }

    /// Sum of registered capacities.
    pub fn pool_capacity(&self) -> f64 {
        self.resources.values().map(|r| r.capacity).sum()
    }

    pub fn resource(&self, id: &ResourceId) -> Option<&CapacityResource> {
        self.resources.get(id)
    }

    /// Register a resource with 10% held in reserve.
    #[instrument(skip(self), fields(resource_id = %id))]
    pub fn register_resource(&mut self, id: ResourceId, capacity: f64) -> AllocatorResult<()> {
        if !capacity.is_finite() || capacity <= 0.0 {
            return Err(AllocatorError::InvalidCapacity(capacity));
        }
        if self.resources.contains_key(&id) {
            return Err(AllocatorError::DuplicateResource(id));
        }

        self.resources.insert(id, CapacityResource::new(id, capacity));
        self.order.push(id);
        info!(capacity, "Registered capacity resource");
        Ok(())
    }

    /// Set a resource's local intensity, or the global intensity when
    /// `resource` is `None`. A global update re-splits every resource's
    /// reserve for the new zone.
    pub fn update_intensity(
        &mut self,
        value: f64,
        resource: Option<&ResourceId>,
    ) -> AllocatorResult<()> {
        if !(INTENSITY_MIN..=INTENSITY_MAX).contains(&value) {
            return Err(AllocatorError::InvalidIntensity(value));
        }

        match resource {
            Some(id) => {
                let r = self
                    .resources
                    .get_mut(id)
                    .ok_or(AllocatorError::UnknownResource(*id))?;
                r.local_intensity = value;
                debug!(resource_id = %id, intensity = value, "Local intensity updated");
            }
            None => {
                self.record_global(value);
                let fraction = self.zone().policy().reservation_fraction;
                for r in self.resources.values_mut() {
                    r.resplit(fraction);
                }
                info!(intensity = value, zone = %self.zone(), "Global intensity updated");
            }
        }
        Ok(())
    }

    fn record_global(&mut self, value: f64) {
        self.global_intensity = value.clamp(INTENSITY_MIN, INTENSITY_MAX);
        self.history.push_back(self.global_intensity);
        while self.history.len() > self.history_limit {
            self.history.pop_front();
        }
    }

    /// Try to grant capacity for `request`.
    #[instrument(skip(self, request), fields(allocation_id = %request.id, amount = request.amount))]
    pub fn allocate(&mut self, request: AllocationRequest) -> AllocatorResult<AllocationOutcome> {
        request.validate()?;
        if self.grants.contains_key(&request.id) {
            return Err(AllocatorError::DuplicateAllocation(request.id));
        }

        let zone = self.zone();
        let policy = zone.policy();
        let effective_priority =
            (i16::from(request.priority) + i16::from(policy.priority_boost)).clamp(1, 10);

        let pool = self.pool_capacity();
        let cap = if request.critical {
            request.amount
        } else {
            request.amount.min(pool * policy.max_fraction_per_request)
        };

        let mut best: Option<(ResourceId, f64)> = None;
        for id in &self.order {
            let Some(r) = self.resources.get(id) else {
                continue;
            };
            if r.available < cap {
                continue;
            }
            let score = score_resource(r, &request, effective_priority);
            if best.is_none_or(|(_, top)| score > top) {
                best = Some((*id, score));
            }
        }

        let Some((resource_id, _)) = best else {
            debug!(%zone, cap, "No resource can satisfy request");
            return Ok(AllocationOutcome::denied(zone));
        };

        if let Some(r) = self.resources.get_mut(&resource_id) {
            r.grant(cap);
        }
        self.grants.insert(
            request.id,
            Grant {
                request,
                resource_id,
                amount: cap,
            },
        );

        let nudged = self.global_intensity - cap / pool * 0.5;
        self.record_global(nudged);

        debug!(
            resource_id = %resource_id,
            granted = cap,
            %zone,
            intensity = self.global_intensity,
            "Capacity granted"
        );

        Ok(AllocationOutcome {
            granted: true,
            resource_id: Some(resource_id),
            amount: cap,
            zone,
        })
    }

    /// Release a grant. Returns `false` for unknown ids.
    pub fn deallocate(&mut self, id: &AllocationId) -> bool {
        let Some(grant) = self.grants.remove(id) else {
            return false;
        };

        let freed = self
            .resources
            .get_mut(&grant.resource_id)
            .map(|r| r.release(grant.amount))
            .unwrap_or(0.0);

        let pool = self.pool_capacity();
        if pool > 0.0 {
            let nudged = self.global_intensity + grant.amount / pool * 0.3;
            self.record_global(nudged);
        }

        debug!(
            allocation_id = %id,
            resource_id = %grant.resource_id,
            priority = grant.request.priority,
            freed,
            "Capacity released"
        );
        true
    }

    /// Pull every resource halfway toward the pool's allocation ratio.
    /// Returns the signed change in allocated capacity per moved resource.
    pub fn rebalance(&mut self) -> BTreeMap<ResourceId, f64> {
        let mut moves = BTreeMap::new();
        let pool = self.pool_capacity();
        if pool <= 0.0 {
            return moves;
        }

        let total_allocated: f64 = self.resources.values().map(|r| r.allocated).sum();
        let target_ratio = total_allocated / pool;

        for id in &self.order {
            let Some(r) = self.resources.get_mut(id) else {
                continue;
            };
            let difference = target_ratio - r.pressure();
            if difference.abs() <= REBALANCE_THRESHOLD {
                continue;
            }

            let adjustment = difference * r.capacity * 0.5;
            let delta = if adjustment > 0.0 {
                let amount = adjustment.min(r.available);
                r.allocated += amount;
                r.available -= amount;
                amount
            } else {
                -r.release(adjustment.abs())
            };
            moves.insert(*id, delta);
        }

        if !moves.is_empty() {
            info!(moved = moves.len(), target_ratio, "Rebalanced capacity");
        }
        moves
    }

    /// Least-squares slope of the most recent global readings.
    pub fn trend(&self) -> IntensityTrend {
        if self.history.len() < TREND_MIN_READINGS {
            return IntensityTrend::InsufficientData;
        }

        let recent: Vec<f64> = self
            .history
            .iter()
            .skip(self.history.len().saturating_sub(TREND_WINDOW))
            .copied()
            .collect();
        let n = recent.len() as f64;
        let mean_x = (n - 1.0) / 2.0;
        let mean_y = recent.iter().sum::<f64>() / n;

        let mut num = 0.0;
        let mut den = 0.0;
        for (i, y) in recent.iter().enumerate() {
            let dx = i as f64 - mean_x;
            num += dx * (y - mean_y);
            den += dx * dx;
        }
        let slope = if den > 0.0 { num / den } else { 0.0 };

        if slope > TREND_SLOPE {
            IntensityTrend::Rising
        } else if slope < -TREND_SLOPE {
            IntensityTrend::Falling
        } else {
            IntensityTrend::Stable
        }
    }

    pub fn stats(&self) -> AllocatorStats {
        let total_capacity = self.pool_capacity();
        let total_allocated = self.resources.values().map(|r| r.allocated).sum();
        let total_reserved = self.resources.values().map(|r| r.reserved).sum();
        let total_available = self.resources.values().map(|r| r.available).sum();

        AllocatorStats {
            global_intensity: self.global_intensity,
            zone: self.zone(),
            trend: self.trend(),
            total_capacity,
            total_allocated,
            total_reserved,
            total_available,
            allocation_ratio: if total_capacity > 0.0 {
                total_allocated / total_capacity
            } else {
                0.0
            },
            active_allocations: self.grants.len(),
            resources: self
                .order
                .iter()
                .filter_map(|id| self.resources.get(id))
                .map(CapacityResource::snapshot)
                .collect(),
        }
    }

    /// Global intensity suited to current load.
    pub fn recommended_intensity(&self) -> f64 {
        let n = self.resources.len().max(1) as f64;
        let avg_pressure = self.resources.values().map(|r| r.pressure()).sum::<f64>() / n;
        if avg_pressure > 0.8 {
            4.5
        } else if avg_pressure > 0.5 {
            5.5
        } else {
            6.5
        }
    }
}

impl Default for ZonedCapacityAllocator {
    fn default() -> Self {
        Self::new(AllocatorConfig::default())
    }
}

fn score_resource(r: &CapacityResource, request: &AllocationRequest, priority: i16) -> f64 {
    let mut score = r.available / r.capacity * 40.0;

    score += match request.preferred_zone {
        Some(zone) if zone == Zone::from_intensity(r.local_intensity) => 30.0,
        Some(_) => 15.0,
        None => {
            let diff = (r.local_intensity - PREFERRED_LOCAL_INTENSITY).abs();
            (30.0 * (1.0 - diff / 3.0)).max(0.0)
        }
    };

    score += (1.0 - r.pressure()) * 20.0;
    score += f64::from(priority) / 10.0 * 10.0;
    score
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allocator_at(intensity: f64) -> ZonedCapacityAllocator {
        ZonedCapacityAllocator::new(AllocatorConfig {
            initial_intensity: intensity,
            ..Default::default()
        })
    }

    fn assert_balanced(a: &ZonedCapacityAllocator) {
        for r in a.resources.values() {
            assert!(r.allocated >= 0.0 && r.reserved >= 0.0 && r.available >= 0.0);
            assert!((r.allocated + r.reserved + r.available - r.capacity).abs() < 1e-6);
        }
    }

    #[test]
    fn test_register_resource_validation() {
        let mut a = ZonedCapacityAllocator::default();
        let id = ResourceId::new();
        assert!(matches!(
            a.register_resource(id, 0.0),
            Err(AllocatorError::InvalidCapacity(_))
        ));
        assert!(matches!(
            a.register_resource(id, f64::INFINITY),
            Err(AllocatorError::InvalidCapacity(_))
        ));
        a.register_resource(id, 50.0).unwrap();
        assert!(matches!(
            a.register_resource(id, 50.0),
            Err(AllocatorError::DuplicateResource(_))
        ));
    }

    #[test]
    fn test_allocate_grants_and_nudges_intensity() {
        let mut a = allocator_at(5.0);
        let id = ResourceId::new();
        a.register_resource(id, 100.0).unwrap();

        let outcome = a.allocate(AllocationRequest::new(40.0, 5)).unwrap();
        assert!(outcome.granted);
        assert_eq!(outcome.resource_id, Some(id));
        assert_eq!(outcome.amount, 40.0);
        assert_eq!(outcome.zone, Zone::Active);

        let r = a.resource(&id).unwrap();
        assert_eq!(r.allocated, 40.0);
        assert_eq!(r.available, 50.0);
        assert!((a.global_intensity() - 4.8).abs() < 1e-9);
        assert_balanced(&a);
    }

    #[test]
    fn test_non_critical_requests_are_capped() {
        let mut a = allocator_at(3.0);
        a.register_resource(ResourceId::new(), 100.0).unwrap();

        // Critical zone caps at 40% of the pool.
        let outcome = a.allocate(AllocationRequest::new(80.0, 5)).unwrap();
        assert_eq!(outcome.amount, 40.0);
    }

    #[test]
    fn test_critical_requests_bypass_cap() {
        let mut a = allocator_at(3.0);
        a.register_resource(ResourceId::new(), 100.0).unwrap();

        let outcome = a.allocate(AllocationRequest::new(80.0, 5).critical()).unwrap();
        assert!(outcome.granted);
        assert_eq!(outcome.amount, 80.0);
    }

    #[test]
    fn test_denied_when_nothing_fits() {
        let mut a = ZonedCapacityAllocator::default();
        a.register_resource(ResourceId::new(), 10.0).unwrap();

        let outcome = a
            .allocate(AllocationRequest::new(50.0, 5).critical())
            .unwrap();
        assert!(!outcome.granted);
        assert_eq!(outcome.amount, 0.0);
        assert!(outcome.resource_id.is_none());
        assert_eq!(a.stats().active_allocations, 0);
    }

    #[test]
    fn test_allocate_rejects_invalid_and_duplicate() {
        let mut a = ZonedCapacityAllocator::default();
        a.register_resource(ResourceId::new(), 100.0).unwrap();

        assert!(a.allocate(AllocationRequest::new(0.0, 5)).is_err());
        assert!(a.allocate(AllocationRequest::new(f64::NAN, 5)).is_err());
        assert!(a.allocate(AllocationRequest::new(10.0, 0)).is_err());

        let request = AllocationRequest::new(10.0, 5);
        a.allocate(request.clone()).unwrap();
        assert!(matches!(
            a.allocate(request),
            Err(AllocatorError::DuplicateAllocation(_))
        ));
    }

    #[test]
    fn test_deallocate_returns_capacity() {
        let mut a = allocator_at(5.0);
        let id = ResourceId::new();
        a.register_resource(id, 100.0).unwrap();

        let request = AllocationRequest::new(40.0, 5);
        let allocation_id = request.id;
        a.allocate(request).unwrap();

        assert!(a.deallocate(&allocation_id));
        assert!(!a.deallocate(&allocation_id));
        assert!(!a.deallocate(&AllocationId::new()));

        let r = a.resource(&id).unwrap();
        assert_eq!(r.allocated, 0.0);
        assert_eq!(r.available, 90.0);
        // 5.0 - 0.2 + 0.12
        assert!((a.global_intensity() - 4.92).abs() < 1e-9);
        assert_balanced(&a);
    }

    #[test]
    fn test_update_intensity_global_resplits() {
        let mut a = ZonedCapacityAllocator::default();
        let id = ResourceId::new();
        a.register_resource(id, 100.0).unwrap();
        a.allocate(AllocationRequest::new(30.0, 5)).unwrap();

        a.update_intensity(3.0, None).unwrap();
        let r = a.resource(&id).unwrap();
        assert_eq!(r.reserved, 30.0);
        assert!((r.available - 40.0).abs() < 1e-9);
        assert_balanced(&a);
    }

    #[test]
    fn test_update_intensity_errors_do_not_mutate() {
        let mut a = ZonedCapacityAllocator::default();
        assert!(matches!(
            a.update_intensity(15.0, None),
            Err(AllocatorError::InvalidIntensity(_))
        ));
        assert!(matches!(
            a.update_intensity(5.0, Some(&ResourceId::new())),
            Err(AllocatorError::UnknownResource(_))
        ));
        assert_eq!(a.global_intensity(), 7.0);
        assert_eq!(a.trend(), IntensityTrend::InsufficientData);
    }

    #[test]
    fn test_preferred_zone_matches_local_intensity() {
        let mut a = ZonedCapacityAllocator::default();
        let first = ResourceId::new();
        let second = ResourceId::new();
        a.register_resource(first, 100.0).unwrap();
        a.register_resource(second, 100.0).unwrap();
        a.update_intensity(3.5, Some(&second)).unwrap();

        let outcome = a
            .allocate(AllocationRequest::new(10.0, 5).with_preferred_zone(Zone::Critical))
            .unwrap();
        assert_eq!(outcome.resource_id, Some(second));
    }

    #[test]
    fn test_ties_go_to_first_registered() {
        let mut a = ZonedCapacityAllocator::default();
        let first = ResourceId::new();
        a.register_resource(first, 100.0).unwrap();
        a.register_resource(ResourceId::new(), 100.0).unwrap();

        let outcome = a.allocate(AllocationRequest::new(10.0, 5)).unwrap();
        assert_eq!(outcome.resource_id, Some(first));
    }

    #[test]
    fn test_rebalance_moves_toward_pool_ratio() {
        let mut a = ZonedCapacityAllocator::default();
        let busy = ResourceId::new();
        let idle = ResourceId::new();
        a.register_resource(busy, 100.0).unwrap();
        a.register_resource(idle, 100.0).unwrap();
        a.allocate(AllocationRequest::new(80.0, 5).critical()).unwrap();

        // Pool ratio 0.4; busy at 0.8 sheds 20, idle at 0.0 takes 20.
        let moves = a.rebalance();
        assert!((moves[&busy] + 20.0).abs() < 1e-9);
        assert!((moves[&idle] - 20.0).abs() < 1e-9);
        assert_balanced(&a);

        // 0.6 and 0.2 are both still 0.2 away from 0.4.
        let moves = a.rebalance();
        assert_eq!(moves.len(), 2);
    }

    #[test]
    fn test_rebalance_empty_pool() {
        let mut a = ZonedCapacityAllocator::default();
        assert!(a.rebalance().is_empty());
    }

    #[test]
    fn test_trend_detection() {
        let mut a = ZonedCapacityAllocator::default();
        for v in [5.0, 5.5, 6.0, 6.5, 7.0] {
            a.update_intensity(v, None).unwrap();
        }
        assert_eq!(a.trend(), IntensityTrend::Rising);

        for v in [7.0, 6.0, 5.0, 4.0, 3.0, 2.0, 1.0, 0.5] {
            a.update_intensity(v, None).unwrap();
        }
        assert_eq!(a.trend(), IntensityTrend::Falling);

        for _ in 0..10 {
            a.update_intensity(6.0, None).unwrap();
        }
        assert_eq!(a.trend(), IntensityTrend::Stable);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut a = ZonedCapacityAllocator::new(AllocatorConfig {
            history_limit: 3,
            ..Default::default()
        });
        for _ in 0..10 {
            a.update_intensity(6.0, None).unwrap();
        }
        assert_eq!(a.history.len(), 3);
    }

    #[test]
    fn test_recommended_intensity() {
        let mut a = ZonedCapacityAllocator::default();
        let id = ResourceId::new();
        a.register_resource(id, 100.0).unwrap();
        assert_eq!(a.recommended_intensity(), 6.5);

        a.allocate(AllocationRequest::new(60.0, 5).critical()).unwrap();
        assert_eq!(a.recommended_intensity(), 5.5);

        a.allocate(AllocationRequest::new(25.0, 5).critical()).unwrap();
        assert_eq!(a.recommended_intensity(), 4.5);
    }

    #[test]
    fn test_stats_totals() {
        let mut a = allocator_at(5.0);
        a.register_resource(ResourceId::new(), 100.0).unwrap();
        a.register_resource(ResourceId::new(), 50.0).unwrap();
        a.allocate(AllocationRequest::new(30.0, 5)).unwrap();

        let stats = a.stats();
        assert_eq!(stats.total_capacity, 150.0);
        assert_eq!(stats.total_allocated, 30.0);
        assert!((stats.total_reserved - 15.0).abs() < 1e-9);
        assert!((stats.total_available - 105.0).abs() < 1e-9);
        assert!((stats.allocation_ratio - 0.2).abs() < 1e-9);
        assert_eq!(stats.resources.len(), 2);
        assert_eq!(stats.active_allocations, 1);
    }
}
