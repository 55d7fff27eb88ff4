//! Property tests for allocator accounting and balancer phase progression.

use hetsched_coordinator::allocator::{AllocationRequest, Zone, ZonedCapacityAllocator};
use hetsched_coordinator::balancer::{DistributionMode, WeightedLoadBalancer};
use hetsched_coordinator::ProcessorClass;
use hetsched_id::{AllocationId, ResourceId, WorkerId};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Allocate {
        amount: f64,
        priority: u8,
        critical: bool,
        zone: Option<usize>,
    },
    Deallocate(usize),
    Rebalance,
    Global(f64),
    Local(usize, f64),
}

const ZONES: [Zone; 5] = [
    Zone::Critical,
    Zone::Active,
    Zone::Balanced,
    Zone::Neutral,
    Zone::Dormant,
];

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0.1f64..150.0, 1u8..=10, any::<bool>(), proptest::option::of(0usize..5)).prop_map(
            |(amount, priority, critical, zone)| Op::Allocate {
                amount,
                priority,
                critical,
                zone,
            }
        ),
        2 => (0usize..32).prop_map(Op::Deallocate),
        2 => Just(Op::Rebalance),
        1 => (0.0f64..=14.0).prop_map(Op::Global),
        1 => (0usize..4, 0.0f64..=14.0).prop_map(|(i, v)| Op::Local(i, v)),
    ]
}

fn assert_accounting(allocator: &ZonedCapacityAllocator) {
    for r in allocator.stats().resources {
        assert!(r.allocated >= 0.0, "negative allocated: {r:?}");
        assert!(r.reserved >= 0.0, "negative reserved: {r:?}");
        assert!(r.available >= 0.0, "negative available: {r:?}");
        let total = r.allocated + r.reserved + r.available;
        assert!(
            (total - r.capacity).abs() < 1e-6 * r.capacity.max(1.0),
            "accounting drift: {r:?}"
        );
    }
}

proptest! {
    #[test]
    fn test_capacity_accounting_holds(
        capacities in proptest::collection::vec(1.0f64..500.0, 1..4),
        ops in proptest::collection::vec(op(), 1..60),
    ) {
        let mut allocator = ZonedCapacityAllocator::default();
        let resource_ids: Vec<ResourceId> = capacities
            .iter()
            .map(|capacity| {
                let id = ResourceId::new();
                allocator.register_resource(id, *capacity).unwrap();
                id
            })
            .collect();
        let mut grants: Vec<AllocationId> = Vec::new();

        for op in ops {
            match op {
                Op::Allocate { amount, priority, critical, zone } => {
                    let mut request = AllocationRequest::new(amount, priority);
                    request.critical = critical;
                    request.preferred_zone = zone.map(|i| ZONES[i]);
                    let id = request.id;
                    let outcome = allocator.allocate(request).unwrap();
                    if outcome.granted {
                        prop_assert!(outcome.amount > 0.0);
                        prop_assert!(outcome.amount <= amount);
                        grants.push(id);
                    } else {
                        prop_assert_eq!(outcome.amount, 0.0);
                    }
                }
                Op::Deallocate(i) => {
                    if grants.is_empty() {
                        prop_assert!(!allocator.deallocate(&AllocationId::new()));
                    } else {
                        let id = grants.remove(i % grants.len());
                        prop_assert!(allocator.deallocate(&id));
                    }
                }
                Op::Rebalance => {
                    allocator.rebalance();
                }
                Op::Global(v) => allocator.update_intensity(v, None).unwrap(),
                Op::Local(i, v) => {
                    let id = resource_ids[i % resource_ids.len()];
                    allocator.update_intensity(v, Some(&id)).unwrap();
                }
            }
            assert_accounting(&allocator);
            let intensity = allocator.global_intensity();
            prop_assert!((0.0..=14.0).contains(&intensity));
        }

        prop_assert_eq!(allocator.stats().active_allocations, grants.len());
    }

    #[test]
    fn test_phase_never_regresses(
        classes in proptest::collection::vec(0usize..3, 1..6),
        rounds in proptest::collection::vec((0.0f64..10.0, 0usize..4), 1..80),
    ) {
        let modes = [
            DistributionMode::Balanced,
            DistributionMode::Speed,
            DistributionMode::Efficiency,
            DistributionMode::Endurance,
        ];
        let mut balancer = WeightedLoadBalancer::new();
        for class in classes {
            balancer.register_worker(WorkerId::new(), ProcessorClass::ALL[class]);
        }

        let mut previous = balancer.environment().phase;
        for (i, (total, mode)) in rounds.into_iter().enumerate() {
            let shares = balancer.distribute(total, modes[mode]).unwrap();
            let sum: f64 = shares.values().sum();
            prop_assert!((sum - total).abs() < 1e-9 * total.max(1.0));
            prop_assert!(shares.values().all(|s| *s >= 0.0));

            let env = balancer.environment();
            prop_assert!(env.phase >= previous);
            prop_assert_eq!(env.ticks, i as u64 + 1);
            prop_assert!((3.0..=8.0).contains(&env.intensity));
            prop_assert!((15.0..=40.0).contains(&env.temperature));
            previous = env.phase;
        }
    }
}
