use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

use hetsched_id::WorkerId;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use super::{BalancerError, BalancerResult, Environment, Phase, Worker};
use crate::class::ProcessorClass;

/// Minimum mean cooperation for two workers to share load.
const SHARING_COOPERATION: f64 = 0.7;

/// A heavy worker only sheds load to a light one carrying less than
/// `1 / SHARING_RATIO` of its load.
const SHARING_RATIO: f64 = 1.5;

const SHARING_RATE: f64 = 0.1;

/// How distribution weights favour classes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributionMode {
    #[default]
    Balanced,
    Speed,
    Efficiency,
    Endurance,
}

impl DistributionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Balanced => "balanced",
            Self::Speed => "speed",
            Self::Efficiency => "efficiency",
            Self::Endurance => "endurance",
        }
    }

    fn multiplier(&self, class: ProcessorClass) -> f64 {
        match (self, class) {
            (Self::Speed, ProcessorClass::Burst) => 1.5,
            (Self::Speed, ProcessorClass::Steady) => 0.8,
            (Self::Efficiency, ProcessorClass::Steady) => 1.5,
            (Self::Efficiency, ProcessorClass::Burst) => 0.9,
            (Self::Endurance, ProcessorClass::Stable) => 1.8,
            (Self::Endurance, ProcessorClass::Burst) => 0.7,
            _ => 1.0,
        }
    }
}

impl std::fmt::Display for DistributionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DistributionMode {
    type Err = BalancerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "balanced" => Ok(Self::Balanced),
            "speed" => Ok(Self::Speed),
            "efficiency" => Ok(Self::Efficiency),
            "endurance" => Ok(Self::Endurance),
            other => Err(BalancerError::UnknownMode(other.to_string())),
        }
    }
}

/// Environment changes made by an optimization pass.
#[derive(Debug, Clone, Serialize)]
pub struct TuningReport {
    pub intensity_adjustment: f64,
    pub temperature_adjustment: f64,
    pub throughput_score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct EcosystemStatus {
    pub intensity: f64,
    pub temperature: f64,
    pub phase: Phase,
    pub ticks: u64,
    pub throughput_score: f64,
    pub workers: Vec<Worker>,
}

/// Distributes a workload across registered workers.
#[derive(Default)]
pub struct WeightedLoadBalancer {
    workers: HashMap<WorkerId, Worker>,
    /// Registration order.
    order: Vec<WorkerId>,
    environment: Environment,
}

impl WeightedLoadBalancer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn worker(&self, id: &WorkerId) -> Option<&Worker> {
        self.workers.get(id)
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Register a worker with its class presets. Re-registering resets the
    /// worker in place.
    pub fn register_worker(&mut self, id: WorkerId, class: ProcessorClass) {
        if self.workers.insert(id, Worker::new(id, class)).is_none() {
            self.order.push(id);
        }
        info!(worker_id = %id, %class, "Registered worker");
    }

    /// Split `total` across workers, then advance the environment one tick.
    #[instrument(skip(self), fields(workers = self.workers.len()))]
    pub fn distribute(
        &mut self,
        total: f64,
        mode: DistributionMode,
    ) -> BalancerResult<BTreeMap<WorkerId, f64>> {
        if !total.is_finite() || total < 0.0 {
            return Err(BalancerError::InvalidWorkload(total));
        }
        if self.workers.is_empty() {
            return Ok(BTreeMap::new());
        }

        let temperature_factor = self.environment.temperature_factor();
        let weights: Vec<(WorkerId, f64)> = self
            .ordered()
            .map(|w| {
                let weight = w.activity
                    * w.cooperation
                    * mode.multiplier(w.class)
                    * self.environment.intensity_factor(w.class)
                    * temperature_factor;
                (w.id, weight.max(0.0))
            })
            .collect();

        let total_weight: f64 = weights.iter().map(|(_, w)| w).sum();
        let loads: Vec<(WorkerId, f64)> = if total_weight > 0.0 {
            weights
                .into_iter()
                .map(|(id, w)| (id, w / total_weight * total))
                .collect()
        } else {
            weights.into_iter().map(|(id, _)| (id, 0.0)).collect()
        };

        let shares = self.smooth(loads);

        for (id, load) in &shares {
            if let Some(w) = self.workers.get_mut(id) {
                w.load = *load;
            }
        }
        self.tick();

        debug!(%mode, total, intensity = self.environment.intensity, "Distributed workload");
        Ok(shares.into_iter().collect())
    }

    /// Move load from the heaviest half of workers to cooperative workers in
    /// the lightest half. Transfers are computed from the unsmoothed loads.
    fn smooth(&self, loads: Vec<(WorkerId, f64)>) -> HashMap<WorkerId, f64> {
        let mut sorted = loads.clone();
        sorted.sort_by(|a, b| b.1.total_cmp(&a.1));
        let mut balanced: HashMap<WorkerId, f64> = loads.into_iter().collect();

        let (heavy, light) = sorted.split_at(sorted.len() / 2);
        for (heavy_id, heavy_load) in heavy {
            for (light_id, light_load) in light {
                let (Some(h), Some(l)) = (self.workers.get(heavy_id), self.workers.get(light_id))
                else {
                    continue;
                };
                let cooperation = (h.cooperation + l.cooperation) / 2.0;
                if cooperation <= SHARING_COOPERATION || *heavy_load <= light_load * SHARING_RATIO {
                    continue;
                }

                let remaining = balanced.get(heavy_id).copied().unwrap_or(0.0);
                let transfer = ((heavy_load - light_load) * SHARING_RATE * cooperation).min(remaining);
                *balanced.entry(*heavy_id).or_default() -= transfer;
                *balanced.entry(*light_id).or_default() += transfer;
            }
        }
        balanced
    }

    fn ordered(&self) -> impl Iterator<Item = &Worker> {
        self.order.iter().filter_map(|id| self.workers.get(id))
    }

    fn average_activity(&self) -> f64 {
        if self.workers.is_empty() {
            return 0.0;
        }
        self.workers.values().map(|w| w.activity).sum::<f64>() / self.workers.len() as f64
    }

    fn tick(&mut self) {
        let avg_activity = self.average_activity();
        self.environment.tick(avg_activity);
        let favourable = self.environment.is_cooperative();
        for w in self.workers.values_mut() {
            w.adjust_cooperation(favourable);
        }
    }

    /// Aggregate throughput estimate in `[0, 1]`. Zero with no workers.
    pub fn throughput_score(&self) -> f64 {
        if self.workers.is_empty() {
            return 0.0;
        }
        let diversity = ProcessorClass::diversity(self.workers.values().map(|w| w.class));
        self.average_activity() * 0.4
            + self.environment.throughput_intensity_factor() * 0.3
            + self.environment.temperature_factor() * 0.2
            + diversity * 0.1
    }

    /// Steer toward fast conditions and boost burst workers.
    pub fn optimize_for_throughput(&mut self) -> TuningReport {
        self.tune(5.0, 25.0, ProcessorClass::Burst)
    }

    /// Steer toward efficient conditions and boost steady workers.
    pub fn optimize_for_efficiency(&mut self) -> TuningReport {
        self.tune(4.8, 23.0, ProcessorClass::Steady)
    }

    fn tune(&mut self, intensity: f64, temperature: f64, boosted: ProcessorClass) -> TuningReport {
        let intensity_adjustment = (intensity - self.environment.intensity) * 0.2;
        let temperature_adjustment = (temperature - self.environment.temperature) * 0.3;
        self.environment.intensity += intensity_adjustment;
        self.environment.temperature += temperature_adjustment;

        for w in self.workers.values_mut().filter(|w| w.class == boosted) {
            w.activity = (w.activity + 0.1).min(1.0);
        }

        let report = TuningReport {
            intensity_adjustment,
            temperature_adjustment,
            throughput_score: self.throughput_score(),
        };
        debug!(
            %boosted,
            intensity = self.environment.intensity,
            temperature = self.environment.temperature,
            score = report.throughput_score,
            "Balancer tuned"
        );
        report
    }

    pub fn ecosystem_status(&self) -> EcosystemStatus {
        EcosystemStatus {
            intensity: self.environment.intensity,
            temperature: self.environment.temperature,
            phase: self.environment.phase,
            ticks: self.environment.ticks,
            throughput_score: self.throughput_score(),
            workers: self.ordered().cloned().collect(),
        }
    }

    /// Reset the environment. Workers and their loads are kept.
    pub fn reinitialize(&mut self) {
        self.environment = Environment::default();
        info!("Balancer environment reinitialized");
    }
}
