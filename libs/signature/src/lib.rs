//! Digit signatures and attractor-seeking optimization.
//!
//! A *signature* is the digital root of a value scaled to three decimal
//! places, giving a coarse 0-9 equivalence class. Two signatures have a
//! *harmony* in `[0, 1]`, which the placement engine uses as a small
//! scoring bonus. The [`SignatureOptimizer`] perturbs a value until its
//! signature lands on a target from the attractor set `{3, 6, 9}`.
//!
//! # Invariants
//!
//! - Signatures are deterministic and always in `0..=9`
//! - Harmony is always in `[0.3, 1.0]`
//! - `optimize` performs at most [`MAX_ITERATIONS`] adjustment steps

mod digits;
mod error;
mod optimizer;

pub use digits::{
    harmony, is_attractor, nearest_attractor, ring_distance, signature, signature_of, ATTRACTORS,
    REFERENCE_SEQUENCE,
};
pub use error::SignatureError;
pub use optimizer::{
    BatchStrategy, OptimizationResult, OptimizationStep, OptimizerStats, SignatureOptimizer,
    DEFAULT_HISTORY_LIMIT, MAX_ITERATIONS, STATS_WINDOW,
};
