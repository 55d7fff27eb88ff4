//! Weighted load balancer.
//!
//! Workers carry a class, an activity level, and a cooperation score. A
//! small environment (intensity, temperature, phase) shared by all workers
//! scales their weights and drifts with every distribution round.

mod environment;
mod weighted;
mod worker;

pub use environment::{Environment, Phase};
pub use weighted::{DistributionMode, EcosystemStatus, TuningReport, WeightedLoadBalancer};
pub use worker::Worker;

/// Result type for balancer operations.
pub type BalancerResult<T> = Result<T, BalancerError>;

#[derive(Debug, thiserror::Error)]
pub enum BalancerError {
    #[error("workload {0} must be a non-negative number")]
    InvalidWorkload(f64),

    #[error("unknown distribution mode: {0}")]
    UnknownMode(String),
}
