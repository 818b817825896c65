//! Shutdown behavior tests
//!
//! Covers both shutdown modes with a gated first task so the queue state at
//! the moment of shutdown is known:
//! - Drain runs everything that was accepted
//! - Abandon discards queued tasks and resolves their handles
//! - Abandon escalates an in-progress Drain
//! - Dropping an engine follows its configured mode
//! - Joining from inside a worker never lets a later join return early

use prometheus_task_engine::config::{EngineConfig, ShutdownMode};
use prometheus_task_engine::core::{Engine, Handle, SlotStatus, TaskError};
use prometheus_task_engine::util::init_tracing;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// One worker, whose first task blocks until the returned sender fires.
struct GatedEngine {
    engine: Engine,
    release: flume::Sender<()>,
    first: Handle<usize, String>,
}

fn gated_engine(config: EngineConfig) -> GatedEngine {
    init_tracing();
    let engine = Engine::with_config(config.with_worker_count(1)).expect("Failed to create engine");

    let (started_tx, started_rx) = flume::bounded::<()>(1);
    let (release_tx, release_rx) = flume::bounded::<()>(1);
    let first = engine
        .submit(move || {
            started_tx.send(()).map_err(|e| e.to_string())?;
            release_rx.recv().map_err(|e| e.to_string())?;
            Ok(0)
        })
        .expect("Failed to submit gate task");

    // The worker now holds the gate task; everything else stays queued
    started_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("Gate task never started");

    GatedEngine {
        engine,
        release: release_tx,
        first,
    }
}

fn submit_counted(engine: &Engine, runs: &Arc<AtomicUsize>, count: usize) -> Vec<Handle<usize, String>> {
    (1..=count)
        .map(|i| {
            let runs = Arc::clone(runs);
            engine
                .submit(move || {
                    runs.fetch_add(1, Ordering::SeqCst);
                    Ok(i)
                })
                .expect("Failed to submit")
        })
        .collect()
}

#[test]
fn test_drain_runs_every_accepted_task() {
    println!("\n=== test_drain_runs_every_accepted_task ===");

    let gated = gated_engine(EngineConfig::new());
    let runs = Arc::new(AtomicUsize::new(0));
    let handles = submit_counted(&gated.engine, &runs, 4);

    gated.engine.shutdown(ShutdownMode::Drain);
    assert!(gated.engine.submit(|| Ok::<_, String>(99)).is_err());

    gated.release.send(()).expect("Failed to release gate");
    gated.engine.join();

    assert_eq!(gated.first.get(), Ok(0));
    let values: Vec<usize> = handles
        .into_iter()
        .map(|h| h.get().expect("Drained task failed"))
        .collect();
    assert_eq!(values, vec![1, 2, 3, 4]);
    assert_eq!(runs.load(Ordering::SeqCst), 4);

    let stats = gated.engine.stats();
    println!("Stats: {:?}", stats);
    assert_eq!(stats.completed_tasks, 5);
    assert_eq!(stats.abandoned_tasks, 0);
    assert_eq!(stats.live_workers, 0);

    println!("=== test_drain_runs_every_accepted_task PASSED ===\n");
}

#[test]
fn test_abandon_resolves_queued_handles() {
    println!("\n=== test_abandon_resolves_queued_handles ===");

    let gated = gated_engine(EngineConfig::new());
    let runs = Arc::new(AtomicUsize::new(0));
    let handles = submit_counted(&gated.engine, &runs, 4);

    gated.engine.shutdown(ShutdownMode::Abandon);

    // Discarded before the in-flight task finishes
    for handle in &handles {
        assert_eq!(handle.status(), Some(SlotStatus::Failed));
    }

    gated.release.send(()).expect("Failed to release gate");
    gated.engine.join();

    assert_eq!(gated.first.get(), Ok(0), "In-flight task must finish");
    for handle in handles {
        assert_eq!(handle.get(), Err(TaskError::Abandoned));
    }
    assert_eq!(runs.load(Ordering::SeqCst), 0);

    let stats = gated.engine.stats();
    assert_eq!(stats.abandoned_tasks, 4);
    assert_eq!(stats.queued_tasks, 0);
    assert_eq!(stats.live_workers, 0);

    println!("=== test_abandon_resolves_queued_handles PASSED ===\n");
}

#[test]
fn test_abandon_escalates_drain() {
    println!("\n=== test_abandon_escalates_drain ===");

    let gated = gated_engine(EngineConfig::new());
    let runs = Arc::new(AtomicUsize::new(0));
    let handles = submit_counted(&gated.engine, &runs, 3);

    gated.engine.shutdown(ShutdownMode::Drain);
    gated.engine.shutdown(ShutdownMode::Abandon);
    // Going back to Drain changes nothing
    gated.engine.shutdown(ShutdownMode::Drain);

    gated.release.send(()).expect("Failed to release gate");
    gated.engine.join();

    assert_eq!(gated.first.get(), Ok(0));
    for handle in handles {
        assert_eq!(handle.get(), Err(TaskError::Abandoned));
    }
    assert_eq!(runs.load(Ordering::SeqCst), 0);

    println!("=== test_abandon_escalates_drain PASSED ===\n");
}

#[test]
fn test_shutdown_and_join_are_idempotent() {
    println!("\n=== test_shutdown_and_join_are_idempotent ===");

    init_tracing();
    let engine = Engine::new(3).expect("Failed to create engine");

    engine.shutdown_and_join(ShutdownMode::Drain);
    engine.shutdown_and_join(ShutdownMode::Drain);
    engine.shutdown_and_join(ShutdownMode::Abandon);
    engine.join();

    assert!(engine.is_closed());
    assert_eq!(engine.stats().live_workers, 0);

    println!("=== test_shutdown_and_join_are_idempotent PASSED ===\n");
}

#[test]
fn test_idle_engine_shuts_down_promptly() {
    println!("\n=== test_idle_engine_shuts_down_promptly ===");

    init_tracing();
    let engine = Engine::new(8).expect("Failed to create engine");

    let start = Instant::now();
    engine.shutdown_and_join(ShutdownMode::Drain);
    let elapsed = start.elapsed();

    println!("Shutdown of 8 idle workers took {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(500), "Idle workers were not woken");
    assert_eq!(engine.stats().live_workers, 0);

    println!("=== test_idle_engine_shuts_down_promptly PASSED ===\n");
}

#[test]
fn test_drop_drains_by_default() {
    println!("\n=== test_drop_drains_by_default ===");

    let gated = gated_engine(EngineConfig::new());
    let runs = Arc::new(AtomicUsize::new(0));
    let handles = submit_counted(&gated.engine, &runs, 3);

    gated.release.send(()).expect("Failed to release gate");
    drop(gated.engine);

    assert_eq!(gated.first.get(), Ok(0));
    for (i, handle) in handles.into_iter().enumerate() {
        assert_eq!(handle.get(), Ok(i + 1));
    }
    assert_eq!(runs.load(Ordering::SeqCst), 3);

    println!("=== test_drop_drains_by_default PASSED ===\n");
}

#[test]
fn test_drop_with_abandon_mode() {
    println!("\n=== test_drop_with_abandon_mode ===");

    let gated = gated_engine(EngineConfig::new().with_shutdown_mode(ShutdownMode::Abandon));
    let runs = Arc::new(AtomicUsize::new(0));
    let handles = submit_counted(&gated.engine, &runs, 3);

    // Drop blocks in join until the gate task returns
    let release = gated.release.clone();
    let releaser = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(20));
        release.send(()).expect("Failed to release gate");
    });
    drop(gated.engine);
    releaser.join().unwrap();

    assert_eq!(gated.first.get(), Ok(0));
    for handle in handles {
        assert_eq!(handle.get(), Err(TaskError::Abandoned));
    }
    assert_eq!(runs.load(Ordering::SeqCst), 0);

    println!("=== test_drop_with_abandon_mode PASSED ===\n");
}

#[test]
fn test_join_from_worker_then_join_from_caller() {
    println!("\n=== test_join_from_worker_then_join_from_caller ===");

    init_tracing();
    let engine = Arc::new(Engine::new(1).expect("Failed to create engine"));
    let (release_tx, release_rx) = flume::bounded::<()>(1);

    let inner = Arc::clone(&engine);
    let first = engine
        .submit(move || {
            release_rx.recv().map_err(|e| e.to_string())?;
            // Cannot wait for its own thread; returns once the others are gone
            inner.shutdown_and_join(ShutdownMode::Drain);
            Ok::<_, String>(())
        })
        .expect("Failed to submit");
    let second = engine
        .submit(|| {
            std::thread::sleep(Duration::from_millis(300));
            Ok::<_, String>(2)
        })
        .expect("Failed to submit");

    release_tx.send(()).expect("Failed to release gate");
    assert_eq!(first.get(), Ok(()));
    assert!(engine.is_closed());

    engine.join();
    let stats = engine.stats();
    println!("Stats after join: {:?}", stats);
    assert!(second.is_ready(), "join returned before the drained task ran");
    assert_eq!(stats.live_workers, 0);
    assert_eq!(second.get(), Ok(2));

    println!("=== test_join_from_worker_then_join_from_caller PASSED ===\n");
}

#[test]
fn test_engine_dropped_inside_task_still_drains() {
    println!("\n=== test_engine_dropped_inside_task_still_drains ===");

    init_tracing();
    let engine = Arc::new(Engine::new(2).expect("Failed to create engine"));
    let (release_tx, release_rx) = flume::bounded::<()>(1);

    let last_owner = Arc::clone(&engine);
    let first = engine
        .submit(move || {
            release_rx.recv().map_err(|e| e.to_string())?;
            drop(last_owner);
            Ok::<_, String>(0)
        })
        .expect("Failed to submit");
    let queued: Vec<Handle<usize, String>> = (1..=4)
        .map(|i| {
            engine
                .submit(move || {
                    std::thread::sleep(Duration::from_millis(10));
                    Ok(i)
                })
                .expect("Failed to submit")
        })
        .collect();

    // The task now holds the only reference; its drop runs on a worker
    drop(engine);
    release_tx.send(()).expect("Failed to release gate");

    assert_eq!(first.get(), Ok(0));
    for (i, handle) in queued.into_iter().enumerate() {
        assert_eq!(handle.get(), Ok(i + 1));
    }

    println!("=== test_engine_dropped_inside_task_still_drains PASSED ===\n");
}
