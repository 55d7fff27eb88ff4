use hetsched_id::WorkerId;
use serde::Serialize;

use crate::class::ProcessorClass;

const INITIAL_COOPERATION: f64 = 0.8;
pub(crate) const COOPERATION_MIN: f64 = 0.3;
pub(crate) const COOPERATION_MAX: f64 = 1.0;

/// A balancer worker.
#[derive(Debug, Clone, Serialize)]
pub struct Worker {
    pub id: WorkerId,
    pub class: ProcessorClass,
    /// 0-1.
    pub activity: f64,
    /// Throughput preset.
    pub reproduction_rate: f64,
    /// 0.3-1.
    pub cooperation: f64,
    /// Load assigned by the last distribution.
    pub load: f64,
}

impl Worker {
    pub(crate) fn new(id: WorkerId, class: ProcessorClass) -> Self {
        let (activity, reproduction_rate) = match class {
            ProcessorClass::Burst => (0.9, 0.8),
            ProcessorClass::Steady => (0.6, 0.6),
            ProcessorClass::Stable => (0.4, 0.3),
        };
        Self {
            id,
            class,
            activity,
            reproduction_rate,
            cooperation: INITIAL_COOPERATION,
            load: 0.0,
        }
    }

    /// Nudge cooperation up or down by one step.
    pub(crate) fn adjust_cooperation(&mut self, favourable: bool) {
        self.cooperation = if favourable {
            (self.cooperation + 0.01).min(COOPERATION_MAX)
        } else {
            (self.cooperation - 0.01).max(COOPERATION_MIN)
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        let w = Worker::new(WorkerId::new(), ProcessorClass::Stable);
        assert_eq!(w.activity, 0.4);
        assert_eq!(w.reproduction_rate, 0.3);
        assert_eq!(w.cooperation, 0.8);
    }

    #[test]
    fn test_cooperation_bounds() {
        let mut w = Worker::new(WorkerId::new(), ProcessorClass::Burst);
        for _ in 0..100 {
            w.adjust_cooperation(true);
        }
        assert_eq!(w.cooperation, COOPERATION_MAX);
        for _ in 0..200 {
            w.adjust_cooperation(false);
        }
        assert_eq!(w.cooperation, COOPERATION_MIN);
    }
}
