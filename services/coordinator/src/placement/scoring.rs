//! Multi-factor device scoring.
//!
//! Weights (points out of 110 before the thermal penalty):
//! class 30, free capacity 25, idle 20, efficiency 15, intensity 10,
//! signature harmony 10.

use super::{Device, Task};
use crate::class::ProcessorClass;

const PREFERRED_CLASS_POINTS: f64 = 30.0;
const AFFINITY_POINTS: f64 = 25.0;
const BASELINE_AFFINITY_POINTS: f64 = 15.0;
const FREE_CAPACITY_WEIGHT: f64 = 25.0;
const IDLE_WEIGHT: f64 = 20.0;
const EFFICIENCY_WEIGHT: f64 = 15.0;
const INTENSITY_WEIGHT: f64 = 10.0;
const HARMONY_WEIGHT: f64 = 10.0;

/// Efficiency at or above this earns full efficiency credit.
const EFFICIENCY_CEILING: f64 = 10.0;

/// Intensity deviation at which compatibility reaches zero.
const INTENSITY_TOLERANCE: f64 = 3.0;

const THERMAL_PENALTY: f64 = 0.8;

/// Class points: full credit for the preferred class, otherwise the
/// workload affinity table.
pub fn affinity_score(task: &Task, class: ProcessorClass) -> f64 {
    if task.preferred_class == Some(class) {
        return PREFERRED_CLASS_POINTS;
    }
    match task.kind.affinity() {
        Some(affine) if affine == class => AFFINITY_POINTS,
        _ => BASELINE_AFFINITY_POINTS,
    }
}

/// Urgent tasks want aggressive (low-intensity) devices.
pub fn ideal_intensity(priority: u8) -> f64 {
    8.0 - f64::from(priority) / 10.0 * 3.0
}

/// 1.0 at the ideal intensity, decaying linearly to 0 at three units away.
pub fn intensity_compatibility(device_intensity: f64, priority: u8) -> f64 {
    let diff = (device_intensity - ideal_intensity(priority)).abs();
    (1.0 - diff / INTENSITY_TOLERANCE).max(0.0)
}

/// Suitability of `device` for `task`. Higher is better.
pub fn device_score(device: &Device, task: &Task, high_temperature_c: f64) -> f64 {
    let mut score = affinity_score(task, device.class);
    score += device.free_ratio() * FREE_CAPACITY_WEIGHT;
    score += (1.0 - device.utilization) * IDLE_WEIGHT;
    score += (device.efficiency / EFFICIENCY_CEILING).min(1.0) * EFFICIENCY_WEIGHT;
    score += intensity_compatibility(device.intensity, task.priority) * INTENSITY_WEIGHT;
    score += hetsched_signature::harmony(device.signature, task.signature) * HARMONY_WEIGHT;

    if device.temperature > high_temperature_c {
        score *= THERMAL_PENALTY;
    }
    score
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::placement::device::tests::spec as device_spec;
    use crate::placement::task::tests::spec as task_spec;
    use crate::placement::WorkloadKind;
    use hetsched_id::TaskId;
    use rstest::rstest;

    fn task(kind: WorkloadKind, priority: u8, preferred: Option<ProcessorClass>) -> Task {
        let mut spec = task_spec(kind, priority);
        spec.preferred_class = preferred;
        Task::from_spec(TaskId::new(), spec)
    }

    #[rstest]
    #[case(WorkloadKind::Inference, Some(ProcessorClass::Steady), ProcessorClass::Steady, 30.0)]
    #[case(WorkloadKind::Training, Some(ProcessorClass::Steady), ProcessorClass::Burst, 25.0)]
    #[case(WorkloadKind::Training, None, ProcessorClass::Burst, 25.0)]
    #[case(WorkloadKind::Compute, None, ProcessorClass::Steady, 25.0)]
    #[case(WorkloadKind::Encoding, None, ProcessorClass::Stable, 25.0)]
    #[case(WorkloadKind::Mining, None, ProcessorClass::Burst, 15.0)]
    #[case(WorkloadKind::Inference, Some(ProcessorClass::Stable), ProcessorClass::Burst, 15.0)]
    fn test_affinity_score(
        #[case] kind: WorkloadKind,
        #[case] preferred: Option<ProcessorClass>,
        #[case] class: ProcessorClass,
        #[case] expected: f64,
    ) {
        assert_eq!(affinity_score(&task(kind, 5, preferred), class), expected);
    }

    #[rstest]
    #[case(10, 5.0)]
    #[case(5, 6.5)]
    #[case(1, 7.7)]
    fn test_ideal_intensity(#[case] priority: u8, #[case] expected: f64) {
        assert!((ideal_intensity(priority) - expected).abs() < 1e-9);
    }

    #[test]
    fn test_intensity_compatibility_decays_to_zero() {
        assert!((intensity_compatibility(5.0, 10) - 1.0).abs() < 1e-9);
        assert!((intensity_compatibility(6.5, 10) - 0.5).abs() < 1e-9);
        assert_eq!(intensity_compatibility(8.0, 10), 0.0);
        assert_eq!(intensity_compatibility(12.0, 10), 0.0);
    }

    #[test]
    fn test_thermal_penalty() {
        let t = task(WorkloadKind::Compute, 5, None);
        let mut device = Device::from_spec(device_spec(ProcessorClass::Steady, "hot"));
        let cool = device_score(&device, &t, 80.0);
        device.temperature = 85.0;
        let hot = device_score(&device, &t, 80.0);
        assert!((hot - cool * 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_busier_device_scores_lower() {
        let t = task(WorkloadKind::Compute, 5, None);
        let mut device = Device::from_spec(device_spec(ProcessorClass::Steady, "a"));
        device.utilization = 0.0;
        let idle = device_score(&device, &t, 80.0);
        device.utilization = 1.0;
        let busy = device_score(&device, &t, 80.0);
        assert!((idle - busy - 20.0).abs() < 1e-9);
    }
}
