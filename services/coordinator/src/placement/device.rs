use chrono::{DateTime, Utc};
use hetsched_id::{DeviceId, TaskId};
use serde::{Deserialize, Serialize};

use super::{PlacementError, PlacementResult};
use crate::class::ProcessorClass;

/// Device description supplied at registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSpec {
    pub id: DeviceId,
    pub class: ProcessorClass,
    pub name: String,
    pub total_capacity_mb: u64,
    pub available_capacity_mb: u64,
    /// Current utilization, 0-1.
    #[serde(default)]
    pub utilization: f64,
    /// Degrees Celsius.
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    pub throughput_gflops: f64,
    pub power_limit_watts: f64,
}

fn default_temperature() -> f64 {
    40.0
}

impl DeviceSpec {
    /// Check ranges before anything is mutated.
    pub fn validate(&self) -> PlacementResult<()> {
        if self.total_capacity_mb == 0 {
            return Err(PlacementError::InvalidDevice(
                "total capacity must be positive".to_string(),
            ));
        }
        if self.available_capacity_mb > self.total_capacity_mb {
            return Err(PlacementError::InvalidDevice(format!(
                "available capacity {} exceeds total {}",
                self.available_capacity_mb, self.total_capacity_mb
            )));
        }
        if !(0.0..=1.0).contains(&self.utilization) {
            return Err(PlacementError::InvalidDevice(format!(
                "utilization {} outside 0-1",
                self.utilization
            )));
        }
        if !self.temperature.is_finite() {
            return Err(PlacementError::InvalidDevice(
                "temperature must be finite".to_string(),
            ));
        }
        if !self.throughput_gflops.is_finite() || self.throughput_gflops < 0.0 {
            return Err(PlacementError::InvalidDevice(
                "throughput must be a non-negative number".to_string(),
            ));
        }
        if !self.power_limit_watts.is_finite() || self.power_limit_watts < 0.0 {
            return Err(PlacementError::InvalidDevice(
                "power limit must be a non-negative number".to_string(),
            ));
        }
        Ok(())
    }
}

/// Intensity and activity defaults applied at registration.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ClassPreset {
    pub intensity: f64,
    pub activity_rate: f64,
}

pub(crate) fn preset(class: ProcessorClass) -> ClassPreset {
    match class {
        ProcessorClass::Burst => ClassPreset {
            intensity: 5.5,
            activity_rate: 0.9,
        },
        ProcessorClass::Steady => ClassPreset {
            intensity: 6.5,
            activity_rate: 0.7,
        },
        ProcessorClass::Stable => ClassPreset {
            intensity: 7.0,
            activity_rate: 0.5,
        },
    }
}

/// A registered device.
#[derive(Debug, Clone, Serialize)]
pub struct Device {
    pub id: DeviceId,
    pub class: ProcessorClass,
    pub name: String,
    pub total_capacity_mb: u64,
    pub available_capacity_mb: u64,
    pub utilization: f64,
    pub temperature: f64,
    /// 0-14; lower runs more aggressively.
    pub intensity: f64,
    /// 0-1.
    pub activity_rate: f64,
    pub throughput_gflops: f64,
    pub power_limit_watts: f64,
    /// Throughput per watt.
    pub efficiency: f64,
    pub signature: u8,
    pub is_available: bool,
    pub current_task: Option<TaskId>,
    pub last_telemetry_at: DateTime<Utc>,
}

impl Device {
    /// Build a device from a validated spec.
    pub(crate) fn from_spec(spec: DeviceSpec) -> Self {
        let preset = preset(spec.class);
        let signature = hetsched_signature::signature_of(&format!(
            "{}{}{}",
            spec.class, spec.name, spec.id
        ));

        Self {
            id: spec.id,
            class: spec.class,
            name: spec.name,
            total_capacity_mb: spec.total_capacity_mb,
            available_capacity_mb: spec.available_capacity_mb,
            utilization: spec.utilization,
            temperature: spec.temperature,
            intensity: preset.intensity,
            activity_rate: preset.activity_rate,
            throughput_gflops: spec.throughput_gflops,
            power_limit_watts: spec.power_limit_watts,
            efficiency: spec.throughput_gflops / spec.power_limit_watts.max(1.0),
            signature,
            is_available: true,
            current_task: None,
            last_telemetry_at: Utc::now(),
        }
    }

    /// Fraction of capacity currently free.
    pub fn free_ratio(&self) -> f64 {
        self.available_capacity_mb as f64 / self.total_capacity_mb.max(1) as f64
    }

    /// Available and large enough for `memory_mb`.
    pub fn can_host(&self, memory_mb: u64) -> bool {
        self.is_available && self.current_task.is_none() && self.available_capacity_mb >= memory_mb
    }
}
