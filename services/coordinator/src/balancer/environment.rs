use serde::Serialize;

use crate::class::ProcessorClass;

pub const INTENSITY_MIN: f64 = 3.0;
pub const INTENSITY_MAX: f64 = 8.0;
pub const TEMPERATURE_MIN: f64 = 15.0;
pub const TEMPERATURE_MAX: f64 = 40.0;

const OPTIMAL_TEMPERATURE: f64 = 25.0;

/// Intensity band in which workers cooperate more each tick.
const COOPERATIVE_BAND: (f64, f64) = (4.5, 6.5);

/// Intensity band with full throughput credit.
const THROUGHPUT_BAND: (f64, f64) = (4.5, 6.0);

/// Growth phase of a balancer. Only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Initial,
    Active,
    Mature,
}

impl Phase {
    fn for_ticks(ticks: u64) -> Self {
        match ticks {
            0..10 => Self::Initial,
            10..50 => Self::Active,
            _ => Self::Mature,
        }
    }
}

/// Environment owned by one balancer.
#[derive(Debug, Clone, Serialize)]
pub struct Environment {
    pub intensity: f64,
    pub temperature: f64,
    pub ticks: u64,
    pub phase: Phase,
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            intensity: 7.0,
            temperature: OPTIMAL_TEMPERATURE,
            ticks: 0,
            phase: Phase::Initial,
        }
    }
}

impl Environment {
    /// Advance one step given the average worker activity.
    pub(crate) fn tick(&mut self, avg_activity: f64) {
        self.intensity = (self.intensity - avg_activity * 0.1).clamp(INTENSITY_MIN, INTENSITY_MAX);
        self.temperature = (self.temperature + avg_activity * 0.5 - 0.3)
            .clamp(TEMPERATURE_MIN, TEMPERATURE_MAX);
        self.ticks += 1;
        self.phase = self.phase.max(Phase::for_ticks(self.ticks));
    }

    /// Whether the current intensity favours cooperation.
    pub fn is_cooperative(&self) -> bool {
        (COOPERATIVE_BAND.0..=COOPERATIVE_BAND.1).contains(&self.intensity)
    }

    /// Per-class performance at the current intensity, floored at 0.2.
    pub fn intensity_factor(&self, class: ProcessorClass) -> f64 {
        let (optimal, tolerance) = match class {
            ProcessorClass::Burst => (5.5, 1.0),
            ProcessorClass::Steady => (4.5, 1.0),
            ProcessorClass::Stable => (6.5, 1.5),
        };
        let diff = (self.intensity - optimal).abs();
        let factor = if diff <= tolerance {
            1.0 - diff / tolerance * 0.3
        } else {
            0.7 - ((diff - tolerance) * 0.1).min(0.5)
        };
        factor.max(0.2)
    }

    pub fn temperature_factor(&self) -> f64 {
        let diff = (self.temperature - OPTIMAL_TEMPERATURE).abs();
        if (20.0..=30.0).contains(&self.temperature) {
            1.0
        } else if (15.0..=35.0).contains(&self.temperature) {
            1.0 - diff / 15.0 * 0.3
        } else {
            (1.0 - diff / 20.0 * 0.6).max(0.4)
        }
    }

    /// Throughput credit for the current intensity.
    pub fn throughput_intensity_factor(&self) -> f64 {
        let (low, high) = THROUGHPUT_BAND;
        if (low..=high).contains(&self.intensity) {
            1.0
        } else {
            let diff = (self.intensity - low).abs().min((self.intensity - high).abs());
            (1.0 - diff * 0.2).max(0.3)
        }
    }
}
