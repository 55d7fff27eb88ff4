//! Error types for optimizer input validation.

use thiserror::Error;

/// Errors returned for invalid optimizer input. Nothing is recorded in the
/// optimizer history when one of these is returned.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SignatureError {
    /// The requested target is not one of the attractor signatures.
    #[error("target signature must be 3, 6 or 9, got {0}")]
    InvalidTarget(u8),

    /// The lower bound exceeds the upper bound.
    #[error("invalid bounds: min {min} exceeds max {max}")]
    InvalidBounds { min: f64, max: f64 },

    /// A NaN or infinite input.
    #[error("non-finite {field}: {value}")]
    NonFinite { field: &'static str, value: f64 },
}
