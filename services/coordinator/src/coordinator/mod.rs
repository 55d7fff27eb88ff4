//! Coordinator facade.
//!
//! Owns one instance of each scheduling component. The placement engine
//! locks internally; the allocator, balancer and optimizer each sit behind
//! their own mutex, so callers are serialized per component and never
//! across components.

mod worker;

pub use worker::RebalanceWorker;

use std::collections::BTreeMap;
use std::sync::Arc;

use hetsched_id::{ResourceId, TaskId, WorkerId};
use hetsched_signature::{OptimizerStats, SignatureOptimizer};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::allocator::{
    AllocationOutcome, AllocationRequest, AllocatorConfig, AllocatorStats, ZonedCapacityAllocator,
};
use crate::balancer::{DistributionMode, EcosystemStatus, WeightedLoadBalancer};
use crate::class::ProcessorClass;
use crate::config::Config;
use crate::error::CoordinatorResult;
use crate::placement::{
    ClassStats, ClusterHealth, ExecutionBackend, ExecutionOutcome, PlacementConfig,
    PlacementEngine,
};

/// Result of [`Coordinator::place_with_capacity`].
#[derive(Debug, Clone, Serialize)]
pub struct CapacityPlacement {
    pub allocation: AllocationOutcome,
    /// `None` when no capacity was granted and the task was left pending.
    pub execution: Option<ExecutionOutcome>,
}

/// One round of periodic rebalancing.
#[derive(Debug, Clone, Serialize)]
pub struct RebalanceReport {
    pub capacity_moves: BTreeMap<ResourceId, f64>,
    pub shares: BTreeMap<WorkerId, f64>,
    pub recommended_intensity: f64,
}

/// Point-in-time view of every component.
#[derive(Debug, Clone, Serialize)]
pub struct CoordinatorSnapshot {
    pub health: Option<ClusterHealth>,
    pub classes: BTreeMap<ProcessorClass, ClassStats>,
    pub allocator: AllocatorStats,
    pub balancer: EcosystemStatus,
    pub optimizer: OptimizerStats,
}

pub struct Coordinator {
    placement: PlacementEngine,
    allocator: Mutex<ZonedCapacityAllocator>,
    balancer: Mutex<WeightedLoadBalancer>,
    optimizer: Mutex<SignatureOptimizer>,
}

impl Coordinator {
    /// Build every component from `config`.
    pub fn new(backend: Arc<dyn ExecutionBackend>, config: &Config) -> Self {
        let placement = PlacementEngine::new(
            backend,
            PlacementConfig {
                high_temperature_c: config.high_temperature_c,
            },
        );
        let allocator = ZonedCapacityAllocator::new(AllocatorConfig {
            initial_intensity: config.allocator_initial_intensity,
            ..AllocatorConfig::default()
        });

        Self::from_parts(
            placement,
            allocator,
            WeightedLoadBalancer::new(),
            SignatureOptimizer::with_history_limit(config.optimizer_history),
        )
    }

    pub fn from_parts(
        placement: PlacementEngine,
        allocator: ZonedCapacityAllocator,
        balancer: WeightedLoadBalancer,
        optimizer: SignatureOptimizer,
    ) -> Self {
        Self {
            placement,
            allocator: Mutex::new(allocator),
            balancer: Mutex::new(balancer),
            optimizer: Mutex::new(optimizer),
        }
    }

    pub fn placement(&self) -> &PlacementEngine {
        &self.placement
    }

    pub fn allocator(&self) -> &Mutex<ZonedCapacityAllocator> {
        &self.allocator
    }

    pub fn balancer(&self) -> &Mutex<WeightedLoadBalancer> {
        &self.balancer
    }

    pub fn optimizer(&self) -> &Mutex<SignatureOptimizer> {
        &self.optimizer
    }

    /// Grant capacity for a task, then run it. The grant is held for the
    /// duration of the execution and released afterwards, including when
    /// placement fails or errors.
    #[instrument(skip(self, request), fields(task_id = %task_id, allocation_id = %request.id))]
    pub async fn place_with_capacity(
        &self,
        task_id: TaskId,
        request: AllocationRequest,
    ) -> CoordinatorResult<CapacityPlacement> {
        let allocation_id = request.id;
        let allocation = self.allocator.lock().await.allocate(request)?;
        if !allocation.granted {
            debug!(zone = %allocation.zone, "Capacity denied, task left pending");
            return Ok(CapacityPlacement {
                allocation,
                execution: None,
            });
        }

        let execution = self.placement.execute_task(task_id).await;
        self.allocator.lock().await.deallocate(&allocation_id);

        let execution = execution?;
        if !execution.is_completed() {
            warn!("Placement did not complete, capacity grant released");
        }
        Ok(CapacityPlacement {
            allocation,
            execution: Some(execution),
        })
    }

    /// Run one capacity rebalance and one workload distribution.
    pub async fn rebalance_once(
        &self,
        workload: f64,
        mode: DistributionMode,
    ) -> CoordinatorResult<RebalanceReport> {
        let (capacity_moves, recommended_intensity) = {
            let mut allocator = self.allocator.lock().await;
            (allocator.rebalance(), allocator.recommended_intensity())
        };
        let shares = self.balancer.lock().await.distribute(workload, mode)?;

        if !capacity_moves.is_empty() {
            info!(
                moved = capacity_moves.len(),
                recommended_intensity, "Capacity rebalanced"
            );
        }
        Ok(RebalanceReport {
            capacity_moves,
            shares,
            recommended_intensity,
        })
    }

    pub async fn snapshot(&self) -> CoordinatorSnapshot {
        CoordinatorSnapshot {
            health: self.placement.health().await,
            classes: self.placement.class_stats().await,
            allocator: self.allocator.lock().await.stats(),
            balancer: self.balancer.lock().await.ecosystem_status(),
            optimizer: self.optimizer.lock().await.stats(),
        }
    }
}
