//! Concurrent execution against a shared placement engine.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use hetsched_coordinator::placement::{
    Device, DeviceSpec, ExecutionBackend, ExecutionOutcome, PlacementConfig, PlacementEngine,
    PlacementError, Task, TaskSpec, WorkloadKind,
};
use hetsched_coordinator::ProcessorClass;
use hetsched_id::{DeviceId, TaskId};

/// Backend that fails loudly if a device is ever running two tasks.
#[derive(Default)]
struct ExclusiveBackend {
    busy: Mutex<HashSet<DeviceId>>,
    overlaps: Mutex<Vec<DeviceId>>,
}

#[async_trait]
impl ExecutionBackend for ExclusiveBackend {
    async fn execute(
        &self,
        device: &Device,
        _task: &Task,
        modeled: Duration,
    ) -> anyhow::Result<Duration> {
        if !self.busy.lock().unwrap().insert(device.id) {
            self.overlaps.lock().unwrap().push(device.id);
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.busy.lock().unwrap().remove(&device.id);
        Ok(modeled)
    }
}

/// Backend that holds each run until the test lets it finish.
#[derive(Default)]
struct GatedBackend {
    started: tokio::sync::Notify,
    finish: tokio::sync::Notify,
}

#[async_trait]
impl ExecutionBackend for GatedBackend {
    async fn execute(
        &self,
        _device: &Device,
        _task: &Task,
        modeled: Duration,
    ) -> anyhow::Result<Duration> {
        self.started.notify_one();
        self.finish.notified().await;
        Ok(modeled)
    }
}

fn device(class: ProcessorClass, i: usize) -> DeviceSpec {
    DeviceSpec {
        id: DeviceId::new(),
        class,
        name: format!("accel-{i}"),
        total_capacity_mb: 16_384,
        available_capacity_mb: 16_384,
        utilization: 0.0,
        temperature: 50.0,
        throughput_gflops: 250.0,
        power_limit_watts: 300.0,
    }
}

fn task(priority: u8) -> TaskSpec {
    TaskSpec {
        kind: WorkloadKind::Rendering,
        priority,
        estimated_duration_secs: 1.0,
        memory_required_mb: 2_048,
        compute_intensity: 0.5,
        preferred_class: None,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_no_device_runs_two_tasks() {
    let backend = Arc::new(ExclusiveBackend::default());
    let engine = Arc::new(PlacementEngine::new(
        backend.clone(),
        PlacementConfig::default(),
    ));

    let classes = [
        ProcessorClass::Burst,
        ProcessorClass::Steady,
        ProcessorClass::Stable,
        ProcessorClass::Steady,
    ];
    let mut device_ids = Vec::new();
    for (i, class) in classes.into_iter().enumerate() {
        let spec = device(class, i);
        device_ids.push(spec.id);
        engine.register_device(spec).await.unwrap();
    }

    let mut task_ids: Vec<TaskId> = Vec::new();
    for i in 0..12 {
        task_ids.push(engine.submit_task(task(1 + (i % 10) as u8)).await.unwrap());
    }

    let handles: Vec<_> = task_ids
        .iter()
        .map(|id| {
            let engine = engine.clone();
            let id = *id;
            tokio::spawn(async move { engine.execute_task(id).await })
        })
        .collect();

    let mut completed = 0;
    let mut rejected = 0;
    let mut seen_devices = HashSet::new();
    for handle in handles {
        match handle.await.unwrap().unwrap() {
            ExecutionOutcome::Completed(report) => {
                completed += 1;
                seen_devices.insert(report.device_id);
            }
            ExecutionOutcome::NoSuitableDevice { .. } => rejected += 1,
            ExecutionOutcome::Failed { reason, .. } => panic!("unexpected failure: {reason}"),
        }
    }

    assert!(backend.overlaps.lock().unwrap().is_empty());
    assert_eq!(completed + rejected, 12);
    assert!(completed >= 1);
    assert!(seen_devices.len() <= device_ids.len());

    for id in &device_ids {
        let device = engine.device(id).await.unwrap();
        assert!(device.is_available);
        assert!(device.current_task.is_none());
        assert_eq!(device.available_capacity_mb, device.total_capacity_mb);
    }
    let health = engine.health().await.unwrap();
    assert_eq!(health.active_tasks, 0);
    assert_eq!(health.completed_tasks, completed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_drain_completes_backlog() {
    let backend = Arc::new(ExclusiveBackend::default());
    let engine = Arc::new(PlacementEngine::new(
        backend.clone(),
        PlacementConfig::default(),
    ));
    for (i, class) in ProcessorClass::ALL.into_iter().enumerate() {
        engine.register_device(device(class, i)).await.unwrap();
    }
    for i in 0..3 {
        engine.submit_task(task(5 + i)).await.unwrap();
    }

    let first = engine.clone();
    let second = engine.clone();
    let third = engine.clone();
    let (a, b, c) = tokio::join!(
        async move { first.execute_next().await },
        async move { second.execute_next().await },
        async move { third.execute_next().await },
    );

    for outcome in [a, b, c] {
        assert!(outcome.unwrap().unwrap().is_completed());
    }
    assert!(backend.overlaps.lock().unwrap().is_empty());
    assert!(engine.execute_next().await.unwrap().is_none());
    assert_eq!(engine.health().await.unwrap().completed_tasks, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_reregister_while_bound_is_rejected() {
    let backend = Arc::new(GatedBackend::default());
    let engine = Arc::new(PlacementEngine::new(
        backend.clone(),
        PlacementConfig::default(),
    ));
    let spec = device(ProcessorClass::Steady, 0);
    let device_id = spec.id;
    engine.register_device(spec.clone()).await.unwrap();

    let first = engine.submit_task(task(5)).await.unwrap();
    let second = engine.submit_task(task(5)).await.unwrap();

    let running = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.execute_task(first).await })
    };
    backend.started.notified().await;

    let bound = engine.device(&device_id).await.unwrap();
    assert!(!bound.is_available);
    assert_eq!(bound.current_task, Some(first));

    assert!(matches!(
        engine.register_device(spec).await,
        Err(PlacementError::DeviceBusy(id)) if id == device_id
    ));
    let still_bound = engine.device(&device_id).await.unwrap();
    assert_eq!(still_bound.current_task, Some(first));
    assert_eq!(
        still_bound.available_capacity_mb,
        still_bound.total_capacity_mb - 2_048
    );

    assert!(matches!(
        engine.execute_task(second).await.unwrap(),
        ExecutionOutcome::NoSuitableDevice { .. }
    ));

    backend.finish.notify_one();
    assert!(running.await.unwrap().unwrap().is_completed());

    let released = engine.device(&device_id).await.unwrap();
    assert!(released.is_available);
    assert!(released.current_task.is_none());
    assert_eq!(released.available_capacity_mb, released.total_capacity_mb);
}
