//! Bounded attractor-seeking optimizer with run history.

use std::collections::{BTreeMap, VecDeque};

use serde::Serialize;
use tracing::debug;

use crate::digits::{harmony, is_attractor, nearest_attractor, proximity_factor, signature};
use crate::error::SignatureError;

/// Upper bound on adjustment steps per run.
pub const MAX_ITERATIONS: usize = 100;

/// Number of most recent runs summarized by [`SignatureOptimizer::stats`].
pub const STATS_WINDOW: usize = 10;

/// Default number of runs retained in history.
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// Trace is sampled every this many iterations.
const TRACE_EVERY: usize = 10;

/// A sampled point on the optimization path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizationStep {
    pub iteration: usize,
    pub value: f64,
    pub signature: u8,
}

/// Outcome of a single `optimize` run.
#[derive(Debug, Clone, Serialize)]
pub struct OptimizationResult {
    pub original_value: f64,
    pub optimized_value: f64,
    pub signature: u8,
    pub target_signature: u8,
    /// Harmony between the final and target signatures.
    pub harmony: f64,
    /// `(optimized - original) / max(|original|, 0.001) * 100`.
    pub improvement_percent: f64,
    pub iterations: usize,
    pub converged: bool,
    pub trace: Vec<OptimizationStep>,
}

/// Summary over the most recent runs.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OptimizerStats {
    pub total_runs: u64,
    pub average_improvement: f64,
    pub average_harmony: f64,
    pub signature_distribution: BTreeMap<u8, usize>,
    pub fraction_in_attractor_set: f64,
}

/// How targets are assigned in [`SignatureOptimizer::optimize_batch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStrategy {
    /// Each value seeks its own nearest attractor.
    Individual,
    /// Targets cycle 3, 6, 9 by position.
    Cycled,
}

/// Attractor-seeking optimizer.
///
/// Holds only its run history; every call is otherwise pure.
#[derive(Debug)]
pub struct SignatureOptimizer {
    history: VecDeque<OptimizationResult>,
    history_limit: usize,
    total_runs: u64,
}

impl Default for SignatureOptimizer {
    fn default() -> Self {
        Self::new()
    }
}

impl SignatureOptimizer {
    /// Create an optimizer retaining [`DEFAULT_HISTORY_LIMIT`] runs.
    pub fn new() -> Self {
        Self::with_history_limit(DEFAULT_HISTORY_LIMIT)
    }

    /// Create an optimizer retaining at most `limit` runs (minimum 1).
    pub fn with_history_limit(limit: usize) -> Self {
        Self {
            history: VecDeque::new(),
            history_limit: limit.max(1),
            total_runs: 0,
        }
    }

    /// Recorded runs, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &OptimizationResult> {
        self.history.iter()
    }

    /// Nudge `value` until its signature equals `target`.
    ///
    /// Without a target the nearest attractor to the current signature is
    /// used. Running out of iterations is not an error: the last value is
    /// returned with whatever harmony it reached.
    pub fn optimize(
        &mut self,
        value: f64,
        target: Option<u8>,
        min: Option<f64>,
        max: Option<f64>,
    ) -> Result<OptimizationResult, SignatureError> {
        check_finite("value", value)?;
        if let Some(lo) = min {
            check_finite("min", lo)?;
        }
        if let Some(hi) = max {
            check_finite("max", hi)?;
        }
        if let (Some(lo), Some(hi)) = (min, max) {
            if lo > hi {
                return Err(SignatureError::InvalidBounds { min: lo, max: hi });
            }
        }

        let target = match target {
            Some(t) if is_attractor(t) => t,
            Some(t) => return Err(SignatureError::InvalidTarget(t)),
            None => nearest_attractor(signature(value)),
        };

        let mut current = value;
        let mut iterations = 0;
        let mut trace = vec![OptimizationStep {
            iteration: 0,
            value,
            signature: signature(value),
        }];

        while iterations < MAX_ITERATIONS {
            let sig = signature(current);
            if sig == target {
                break;
            }

            let mut next = current + adjustment(current, sig, target);
            if let Some(lo) = min {
                next = next.max(lo);
            }
            if let Some(hi) = max {
                next = next.min(hi);
            }
            current = next;
            iterations += 1;

            if iterations % TRACE_EVERY == 0 {
                trace.push(OptimizationStep {
                    iteration: iterations,
                    value: current,
                    signature: signature(current),
                });
            }
        }

        let final_signature = signature(current);
        if trace.last().map(|s| s.iteration) != Some(iterations) {
            trace.push(OptimizationStep {
                iteration: iterations,
                value: current,
                signature: final_signature,
            });
        }

        let result = OptimizationResult {
            original_value: value,
            optimized_value: current,
            signature: final_signature,
            target_signature: target,
            harmony: harmony(final_signature, target),
            improvement_percent: (current - value) / value.abs().max(0.001) * 100.0,
            iterations,
            converged: final_signature == target,
            trace,
        };

        debug!(
            original = value,
            optimized = current,
            target_signature = target,
            signature = final_signature,
            iterations,
            converged = result.converged,
            "Signature optimization finished"
        );

        self.record(result.clone());
        Ok(result)
    }

    /// Seek signature 9 (or 3 when already at 9) without decreasing the
    /// value and without more than doubling it.
    pub fn optimize_throughput(
        &mut self,
        throughput: f64,
    ) -> Result<OptimizationResult, SignatureError> {
        let target = if signature(throughput) == 9 { 3 } else { 9 };
        self.optimize(throughput, Some(target), Some(throughput), Some(throughput * 2.0))
    }

    /// Start from 80% of `latency` and seek signature 3, staying within
    /// `[latency / 2, latency]`.
    pub fn optimize_latency(&mut self, latency: f64) -> Result<OptimizationResult, SignatureError> {
        self.optimize(latency * 0.8, Some(3), Some(latency * 0.5), Some(latency))
    }

    /// Seek signature 6 within `[0.9x, 1.5x]`.
    pub fn optimize_efficiency(
        &mut self,
        tasks_per_watt: f64,
    ) -> Result<OptimizationResult, SignatureError> {
        self.optimize(
            tasks_per_watt,
            Some(6),
            Some(tasks_per_watt * 0.9),
            Some(tasks_per_watt * 1.5),
        )
    }

    /// Optimize several values. All values are validated before any run is
    /// recorded.
    pub fn optimize_batch(
        &mut self,
        values: &[f64],
        strategy: BatchStrategy,
    ) -> Result<Vec<OptimizationResult>, SignatureError> {
        for value in values {
            check_finite("value", *value)?;
        }

        values
            .iter()
            .enumerate()
            .map(|(i, value)| {
                let target = match strategy {
                    BatchStrategy::Individual => None,
                    BatchStrategy::Cycled => Some(crate::ATTRACTORS[i % 3]),
                };
                self.optimize(*value, target, None, None)
            })
            .collect()
    }

    /// Build a sequence where, in every block of nine, positions 3, 6 and 9
    /// are optimized toward signatures 3, 6 and 9 and the rest grow by 10%.
    pub fn attractor_sequence(
        &mut self,
        start: f64,
        len: usize,
    ) -> Result<Vec<f64>, SignatureError> {
        check_finite("start", start)?;

        let mut sequence = Vec::with_capacity(len);
        let mut current = start;
        for i in 0..len {
            let position = i % 9 + 1;
            if position % 3 == 0 {
                let target = crate::ATTRACTORS[position / 3 - 1];
                current = self.optimize(current, Some(target), None, None)?.optimized_value;
            } else {
                current *= 1.1;
            }
            sequence.push(current);
        }
        Ok(sequence)
    }

    /// Statistics over the most recent [`STATS_WINDOW`] runs.
    pub fn stats(&self) -> OptimizerStats {
        let recent: Vec<_> = self.history.iter().rev().take(STATS_WINDOW).collect();
        if recent.is_empty() {
            return OptimizerStats {
                total_runs: self.total_runs,
                ..OptimizerStats::default()
            };
        }

        let n = recent.len() as f64;
        let mut distribution = BTreeMap::new();
        for run in &recent {
            *distribution.entry(run.signature).or_insert(0) += 1;
        }

        OptimizerStats {
            total_runs: self.total_runs,
            average_improvement: recent.iter().map(|r| r.improvement_percent.abs()).sum::<f64>()
                / n,
            average_harmony: recent.iter().map(|r| r.harmony).sum::<f64>() / n,
            signature_distribution: distribution,
            fraction_in_attractor_set: recent.iter().filter(|r| is_attractor(r.signature)).count()
                as f64
                / n,
        }
    }

    fn record(&mut self, result: OptimizationResult) {
        self.total_runs += 1;
        self.history.push_back(result);
        while self.history.len() > self.history_limit {
            self.history.pop_front();
        }
    }
}

/// Step toward `target`: `value * 1% * signed ring distance * proximity`.
fn adjustment(value: f64, current: u8, target: u8) -> f64 {
    let mut distance = (i16::from(target) - i16::from(current)).rem_euclid(10);
    if distance > 5 {
        distance -= 10;
    }
    value * 0.01 * f64::from(distance) * proximity_factor(value)
}

fn check_finite(field: &'static str, value: f64) -> Result<(), SignatureError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(SignatureError::NonFinite { field, value })
    }
}
