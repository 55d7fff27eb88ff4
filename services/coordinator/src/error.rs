//! Crate-level error type.

use crate::allocator::AllocatorError;
use crate::balancer::BalancerError;
use crate::placement::PlacementError;

/// Result type for coordinator operations.
pub type CoordinatorResult<T> = Result<T, CoordinatorError>;

/// Errors surfaced by the coordinator facade.
#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error(transparent)]
    Placement(#[from] PlacementError),

    #[error(transparent)]
    Allocator(#[from] AllocatorError),

    #[error(transparent)]
    Balancer(#[from] BalancerError),

    #[error(transparent)]
    Signature(#[from] hetsched_signature::SignatureError),

    #[error(transparent)]
    Id(#[from] hetsched_id::IdError),
}

impl CoordinatorError {
    /// Whether the error names an id the coordinator does not know.
    pub fn is_unknown_id(&self) -> bool {
        matches!(
            self,
            Self::Placement(PlacementError::UnknownTask(_) | PlacementError::UnknownDevice(_))
                | Self::Allocator(AllocatorError::UnknownResource(_))
        )
    }
}
