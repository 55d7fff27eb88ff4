//! Processor classes shared by devices and balancer workers.

use serde::{Deserialize, Serialize};

/// Closed set of processor classes. Preset tables in the placement engine
/// and the load balancer are indexed by this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessorClass {
    /// Fast, power-hungry, high activity.
    Burst,
    /// Efficient, steady throughput.
    Steady,
    /// Supportive, long-running, low activity.
    Stable,
}

impl ProcessorClass {
    /// Every class, in declaration order.
    pub const ALL: [ProcessorClass; 3] = [Self::Burst, Self::Steady, Self::Stable];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Burst => "burst",
            Self::Steady => "steady",
            Self::Stable => "stable",
        }
    }

    /// Fraction of all classes present in `classes`, in `[0, 1]`.
    pub fn diversity<I>(classes: I) -> f64
    where
        I: IntoIterator<Item = ProcessorClass>,
    {
        let present: std::collections::BTreeSet<_> = classes.into_iter().collect();
        present.len() as f64 / Self::ALL.len() as f64
    }
}

impl std::fmt::Display for ProcessorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
