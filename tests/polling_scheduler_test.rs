//! Polling scheduler driven by a manual timer.

mod support;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

use sleeplog_resilience::config::{ErrorServiceConfig, PollingConfig};
use sleeplog_resilience::core::{
    ConnectivityMonitor, ErrorAggregator, ErrorKind, PollFailure, PollOptions, PollResult,
    PollingScheduler, Severity, TransportFailure,
};
use sleeplog_resilience::infra::InMemoryStore;
use sleeplog_resilience::runtime::{ManualTimer, TokioSpawner};

use support::{settle, spawner};

const SECOND: Duration = Duration::from_secs(1);

fn scheduler(timer: &Arc<ManualTimer>) -> PollingScheduler<TokioSpawner, ManualTimer> {
    PollingScheduler::new(PollingConfig::default(), spawner(), Arc::clone(timer))
        .unwrap()
        .with_clock(timer.clone())
}

fn counting(calls: &Arc<AtomicUsize>) -> impl Fn() -> futures::future::Ready<Result<(), PollFailure>> + Send + Sync + 'static {
    let calls = Arc::clone(calls);
    move || {
        calls.fetch_add(1, Ordering::SeqCst);
        futures::future::ready(Ok(()))
    }
}

async fn tick(timer: &ManualTimer, by: Duration) {
    timer.advance(by);
    settle().await;
}

#[tokio::test]
async fn test_invokes_once_per_interval() {
    let timer = Arc::new(ManualTimer::new(0));
    let scheduler = scheduler(&timer);
    let calls = Arc::new(AtomicUsize::new(0));
    let handle = scheduler.schedule(counting(&calls), PollOptions::every(SECOND));

    tick(&timer, Duration::from_millis(999)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    tick(&timer, Duration::from_millis(1)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    tick(&timer, SECOND).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let snapshot = handle.snapshot();
    assert_eq!(snapshot.last_result, Some(PollResult::Success));
    assert_eq!(snapshot.last_run_at, Some(2_000));
    assert_eq!(timer.pending(), 1);
}

#[tokio::test]
async fn test_cancel_with_pending_timer_prevents_every_invocation() {
    let timer = Arc::new(ManualTimer::new(0));
    let scheduler = scheduler(&timer);
    let calls = Arc::new(AtomicUsize::new(0));
    let handle = scheduler.schedule(counting(&calls), PollOptions::every(SECOND));
    assert_eq!(timer.pending(), 1);

    handle.cancel();
    handle.cancel();
    assert_eq!(timer.pending(), 0);
    tick(&timer, Duration::from_secs(60)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(!handle.force_update());
    assert!(handle.snapshot().cancelled);
}

#[tokio::test]
async fn test_cancel_after_timer_fired_but_before_invocation_runs() {
    let timer = Arc::new(ManualTimer::new(0));
    let scheduler = scheduler(&timer);
    let calls = Arc::new(AtomicUsize::new(0));
    let handle = scheduler.schedule(counting(&calls), PollOptions::every(SECOND));

    timer.advance(SECOND);
    handle.cancel();
    settle().await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(timer.pending(), 0);
}

#[tokio::test]
async fn test_dropping_handle_cancels() {
    let timer = Arc::new(ManualTimer::new(0));
    let scheduler = scheduler(&timer);
    let calls = Arc::new(AtomicUsize::new(0));
    drop(scheduler.schedule(counting(&calls), PollOptions::every(SECOND)));
    tick(&timer, Duration::from_secs(5)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(scheduler.active_count(), 0);
}

#[tokio::test]
async fn test_force_update_never_overlaps_in_flight_call() {
    let timer = Arc::new(ManualTimer::new(0));
    let scheduler = scheduler(&timer);
    let calls = Arc::new(AtomicUsize::new(0));
    let running = Arc::new(AtomicUsize::new(0));
    let max_running = Arc::new(AtomicUsize::new(0));
    let gate = Arc::new(Notify::new());

    let handle = scheduler.schedule(
        {
            let (calls, running, max_running, gate) = (
                Arc::clone(&calls),
                Arc::clone(&running),
                Arc::clone(&max_running),
                Arc::clone(&gate),
            );
            move || {
                let (calls, running, max_running, gate) = (
                    Arc::clone(&calls),
                    Arc::clone(&running),
                    Arc::clone(&max_running),
                    Arc::clone(&gate),
                );
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    max_running.fetch_max(now, Ordering::SeqCst);
                    gate.notified().await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                }
            }
        },
        PollOptions::every(SECOND),
    );

    assert!(handle.force_update());
    settle().await;
    assert!(handle.is_in_flight());
    assert!(!handle.force_update());
    tick(&timer, Duration::from_secs(3)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    gate.notify_one();
    settle().await;
    assert!(!handle.is_in_flight());
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // the interval restarts from completion
    tick(&timer, SECOND).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    gate.notify_one();
    settle().await;
    assert_eq!(max_running.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_offline_skips_invocation_and_resumes_on_reconnect() {
    let timer = Arc::new(ManualTimer::new(0));
    let monitor = Arc::new(ConnectivityMonitor::new(false));
    let scheduler = scheduler(&timer).with_connectivity(Arc::clone(&monitor));
    let calls = Arc::new(AtomicUsize::new(0));
    let _handle = scheduler.schedule(counting(&calls), PollOptions::every(SECOND));

    tick(&timer, SECOND).await;
    tick(&timer, SECOND).await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(timer.pending(), 1);

    monitor.handle_signal(true);
    tick(&timer, SECOND).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_failures_are_reported_and_polling_continues_with_backoff() {
    let timer = Arc::new(ManualTimer::new(0));
    let errors = Arc::new(
        ErrorAggregator::new(
            ErrorServiceConfig::default(),
            "sleeplog.error_log",
            Arc::new(InMemoryStore::new()),
        )
        .unwrap(),
    );
    let scheduler = scheduler(&timer).with_reporter(errors.clone());
    let calls = Arc::new(AtomicUsize::new(0));
    let failing = Arc::new(AtomicBool::new(true));

    let handle = scheduler.schedule(
        {
            let calls = Arc::clone(&calls);
            let failing = Arc::clone(&failing);
            move || {
                calls.fetch_add(1, Ordering::SeqCst);
                let fail = failing.load(Ordering::SeqCst);
                async move {
                    if fail {
                        Err(PollFailure::from(TransportFailure::from_status(503, "upstream down")))
                    } else {
                        Ok(())
                    }
                }
            }
        },
        PollOptions::every(SECOND).named("sessions"),
    );

    tick(&timer, SECOND).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let snapshot = handle.snapshot();
    assert_eq!(snapshot.last_result, Some(PollResult::Failure));
    assert_eq!(snapshot.consecutive_failures, 1);

    let stored = errors.stored_errors();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].kind, ErrorKind::Network);
    assert_eq!(stored[0].severity, Severity::Error);
    assert_eq!(stored[0].context["subscription"], "sessions");

    // one failure doubles the delay
    tick(&timer, SECOND).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    tick(&timer, SECOND).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    // two failures quadruple it
    failing.store(false, Ordering::SeqCst);
    tick(&timer, Duration::from_secs(3)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    tick(&timer, SECOND).await;
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(handle.snapshot().consecutive_failures, 0);

    tick(&timer, SECOND).await;
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(errors.stored_errors()[0].count, 2);
}

#[tokio::test]
async fn test_panicking_callback_is_reported_as_runtime_error() {
    let timer = Arc::new(ManualTimer::new(0));
    let errors = Arc::new(
        ErrorAggregator::new(
            ErrorServiceConfig::default(),
            "sleeplog.error_log",
            Arc::new(InMemoryStore::new()),
        )
        .unwrap(),
    );
    let scheduler = scheduler(&timer).with_reporter(errors.clone());
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = Arc::clone(&calls);
    let handle = scheduler.schedule(
        move || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            async move {
                if true {
                    panic!("chart data malformed");
                }
                Ok(())
            }
        },
        PollOptions::every(SECOND),
    );

    tick(&timer, SECOND).await;
    assert_eq!(handle.snapshot().last_result, Some(PollResult::Failure));
    let stored = errors.stored_errors();
    assert_eq!(stored[0].kind, ErrorKind::Runtime);
    assert!(stored[0].message.contains("chart data malformed"));

    tick(&timer, Duration::from_secs(2)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_runtime_failure_without_panic() {
    let timer = Arc::new(ManualTimer::new(0));
    let errors = Arc::new(
        ErrorAggregator::new(
            ErrorServiceConfig::default(),
            "sleeplog.error_log",
            Arc::new(InMemoryStore::new()),
        )
        .unwrap(),
    );
    let scheduler = scheduler(&timer).with_reporter(errors.clone());
    let handle = scheduler.schedule(
        || async { Err(PollFailure::Runtime("could not parse payload".into())) },
        PollOptions::every(SECOND).immediate(),
    );
    settle().await;
    assert_eq!(handle.snapshot().last_result, Some(PollResult::Failure));
    assert_eq!(errors.stored_errors()[0].message, "could not parse payload");
    assert_eq!(errors.stored_errors()[0].severity, Severity::Critical);
}

#[tokio::test]
async fn test_enable_disable_and_interval_changes() {
    let timer = Arc::new(ManualTimer::new(0));
    let scheduler = scheduler(&timer);
    let calls = Arc::new(AtomicUsize::new(0));
    let handle = scheduler.schedule(counting(&calls), PollOptions::every(SECOND).enabled(false));

    tick(&timer, Duration::from_secs(5)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(timer.pending(), 0);

    // force_update works while disabled but does not arm the timer
    assert!(handle.force_update());
    settle().await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(timer.pending(), 0);

    handle.set_enabled(true);
    tick(&timer, SECOND).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    handle.set_interval(Duration::from_secs(10));
    assert_eq!(handle.snapshot().interval_ms, 10_000);
    tick(&timer, Duration::from_secs(9)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    tick(&timer, SECOND).await;
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    handle.set_enabled(false);
    assert_eq!(timer.pending(), 0);
    tick(&timer, Duration::from_secs(30)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_interval_is_clamped_to_minimum() {
    let timer = Arc::new(ManualTimer::new(0));
    let scheduler = scheduler(&timer);
    let calls = Arc::new(AtomicUsize::new(0));
    let handle = scheduler.schedule(counting(&calls), PollOptions::every(Duration::from_millis(10)));
    assert_eq!(handle.snapshot().interval_ms, 1_000);
    tick(&timer, Duration::from_millis(500)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_cancel_all_stops_every_subscription() {
    let timer = Arc::new(ManualTimer::new(0));
    let scheduler = scheduler(&timer);
    let calls = Arc::new(AtomicUsize::new(0));
    let first = scheduler.schedule(counting(&calls), PollOptions::every(SECOND));
    let second = scheduler.schedule_default(counting(&calls));
    assert_eq!(scheduler.active_count(), 2);
    assert_ne!(first.id(), second.id());

    scheduler.cancel_all();
    assert_eq!(scheduler.active_count(), 0);
    tick(&timer, Duration::from_secs(120)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}
