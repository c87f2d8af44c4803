//! Integration tests for taskqueue
//!
//! These tests drive the scheduler through its public API only.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use taskqueue::{Scheduler, SchedulerConfig, TaskError, TaskOptions};

fn scheduler(concurrency: usize) -> Scheduler {
    Scheduler::spawn(SchedulerConfig {
        concurrency,
        retry_delay_ms: 0,
        drain_poll_ms: 5,
        ..Default::default()
    })
    .expect("Failed to spawn scheduler")
}

// =============================================================================
// Ordering
// =============================================================================

#[tokio::test]
async fn test_admission_order_by_priority_then_fifo() {
    let scheduler = scheduler(2);
    let order = Arc::new(Mutex::new(Vec::new()));

    let handles: Vec<_> = [5, 1, 5]
        .into_iter()
        .enumerate()
        .map(|(i, priority)| {
            let order = Arc::clone(&order);
            scheduler.submit(
                move || {
                    order.lock().unwrap().push(i);
                    async move {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        eyre::Ok(i)
                    }
                },
                TaskOptions::new().priority(priority),
            )
        })
        .collect();

    tokio::time::sleep(Duration::from_millis(10)).await;
    let stats = scheduler.snapshot_stats().await.unwrap();
    assert_eq!(stats.active, 2, "task0 and task2 run together first");
    assert_eq!(stats.queued, 1);
    assert_eq!(*order.lock().unwrap(), vec![0, 2]);

    for handle in handles {
        handle.await.unwrap();
    }
    assert_eq!(*order.lock().unwrap(), vec![0, 2, 1]);
}

#[tokio::test]
async fn test_retry_requeued_before_fresh_queued_work() {
    let scheduler = scheduler(1);
    let order = Arc::new(Mutex::new(Vec::new()));
    let calls = Arc::new(AtomicU32::new(0));

    let flaky = {
        let order = Arc::clone(&order);
        let calls = Arc::clone(&calls);
        scheduler.submit(
            move || {
                order.lock().unwrap().push("flaky");
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    if n == 0 { Err(eyre::eyre!("first try")) } else { eyre::Ok(()) }
                }
            },
            TaskOptions::new().priority(0),
        )
    };

    // Admit the flaky task before queueing fresh work
    tokio::time::sleep(Duration::from_millis(5)).await;

    let fresh = {
        let order = Arc::clone(&order);
        scheduler.submit(
            move || {
                order.lock().unwrap().push("fresh");
                async { eyre::Ok(()) }
            },
            TaskOptions::new().priority(50),
        )
    };

    flaky.await.unwrap();
    fresh.await.unwrap();
    assert_eq!(*order.lock().unwrap(), vec!["flaky", "flaky", "fresh"]);
}

// =============================================================================
// Retries and timeouts
// =============================================================================

#[tokio::test]
async fn test_fails_twice_then_succeeds() {
    let scheduler = scheduler(1);
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);

    let mut handle = scheduler.submit(
        move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(eyre::eyre!("attempt {} failed", n))
                } else {
                    eyre::Ok("done")
                }
            }
        },
        TaskOptions::new().max_retries(3).retry_delay(Duration::ZERO),
    );

    assert_eq!((&mut handle).await.unwrap(), "done");
    assert_eq!(handle.executions(), 3);
    assert_eq!(handle.attempts(), 2);

    let stats = scheduler.snapshot_stats().await.unwrap();
    assert_eq!(stats.succeeded, 1);
    assert_eq!(stats.failed, 0);
}

#[tokio::test]
async fn test_timeout_is_terminal_when_predicate_rejects_it() {
    let scheduler = scheduler(1);
    let failures = Arc::new(AtomicU32::new(0));
    let seen = Arc::clone(&failures);
    scheduler.subscribe_error(move |err, _| {
        assert!(err.is_timeout());
        seen.fetch_add(1, Ordering::SeqCst);
    });

    let started = tokio::time::Instant::now();
    let handle = scheduler.submit(
        || futures::future::pending::<eyre::Result<()>>(),
        TaskOptions::new()
            .timeout(Duration::from_millis(50))
            .retry_if(|e| !e.is_timeout()),
    );

    let err = handle.await.unwrap_err();
    let elapsed = started.elapsed();
    assert!(matches!(err, TaskError::Timeout(d) if d == Duration::from_millis(50)));
    assert!(elapsed >= Duration::from_millis(50));
    assert!(elapsed < Duration::from_millis(1000));
    assert_eq!(failures.load(Ordering::SeqCst), 1);

    let stats = scheduler.snapshot_stats().await.unwrap();
    assert_eq!(stats.failed, 1);
    assert!(stats.is_idle());
}

#[tokio::test]
async fn test_timeout_is_retried_by_default() {
    let scheduler = scheduler(1);
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);

    let mut handle = scheduler.submit(
        move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    futures::future::pending::<()>().await;
                }
                eyre::Ok(n)
            }
        },
        TaskOptions::new().timeout(Duration::from_millis(30)),
    );

    assert_eq!((&mut handle).await.unwrap(), 1);
    assert_eq!(handle.attempts(), 1);
    assert_eq!(handle.executions(), 2);
}

// =============================================================================
// Cancellation
// =============================================================================

#[tokio::test]
async fn test_cancel_before_drain() {
    let scheduler = scheduler(1);
    let before = scheduler.snapshot_stats().await.unwrap();

    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);
    let handle = scheduler.submit(
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { eyre::Ok(()) }
        },
        TaskOptions::new(),
    );
    assert!(handle.cancel());

    assert!(matches!(handle.await, Err(TaskError::Cancelled)));
    scheduler.drain_and_wait().await.unwrap();

    let after = scheduler.snapshot_stats().await.unwrap();
    assert_eq!(after.queued, before.queued);
    assert_eq!(after.cancelled, 1);
    assert_eq!(after.total, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 0, "cancelled task never runs");
}

#[tokio::test]
async fn test_cancel_queued_behind_running_task() {
    let scheduler = scheduler(1);
    let blocker = scheduler.submit(
        || async {
            tokio::time::sleep(Duration::from_millis(30)).await;
            eyre::Ok(())
        },
        TaskOptions::new(),
    );
    let queued = scheduler.submit(|| async { eyre::Ok(()) }, TaskOptions::new());

    tokio::time::sleep(Duration::from_millis(5)).await;
    assert_eq!(scheduler.snapshot_stats().await.unwrap().queued, 1);

    assert!(queued.cancel());
    assert!(matches!(queued.await, Err(TaskError::Cancelled)));
    assert_eq!(scheduler.snapshot_stats().await.unwrap().queued, 0);

    blocker.await.unwrap();
}

#[tokio::test]
async fn test_late_failure_does_not_override_cancellation() {
    let scheduler = scheduler(1);
    let handle = scheduler.submit(
        || async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Err::<(), _>(eyre::eyre!("late failure"))
        },
        TaskOptions::new().max_retries(3),
    );
    let canceller = handle.canceller();

    // Let it start, then cancel while the operation is in flight
    tokio::time::sleep(Duration::from_millis(5)).await;
    assert!(canceller.cancel());

    assert!(matches!(handle.await, Err(TaskError::Cancelled)));
    scheduler.drain_and_wait().await.unwrap();

    let stats = scheduler.snapshot_stats().await.unwrap();
    assert_eq!(stats.cancelled, 1);
    assert_eq!(stats.failed, 0, "late failure is discarded, not counted");
    assert_eq!(stats.succeeded, 0);
}

#[tokio::test]
async fn test_cancel_after_settlement_is_noop() {
    let scheduler = scheduler(1);
    let mut handle = scheduler.submit(|| async { eyre::Ok(7) }, TaskOptions::new());

    assert_eq!((&mut handle).await.unwrap(), 7);
    assert!(!handle.cancel());
    assert!(!handle.is_cancelled());

    let stats = scheduler.snapshot_stats().await.unwrap();
    assert_eq!(stats.cancelled, 0);
    assert_eq!(stats.succeeded, 1);
}

// =============================================================================
// Observability
// =============================================================================

#[tokio::test]
async fn test_stats_and_drain_and_wait() {
    let scheduler = scheduler(4);
    for i in 0..10u32 {
        let _ = scheduler.submit(
            move || async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                if i % 3 == 0 { Err(eyre::eyre!("bad {}", i)) } else { eyre::Ok(i) }
            },
            TaskOptions::new().max_retries(0),
        );
    }

    scheduler.drain_and_wait().await.unwrap();
    let stats = scheduler.snapshot_stats().await.unwrap();

    assert_eq!(stats.total, 10);
    assert_eq!(stats.failed, 4);
    assert_eq!(stats.succeeded, 6);
    assert!(stats.peak_active <= 4);
    assert!(stats.is_idle());
}
