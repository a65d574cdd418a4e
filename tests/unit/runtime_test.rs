//! Tests for runtime adapters

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sleeplog_resilience::core::{Spawn, Timer};
use sleeplog_resilience::runtime::tokio_spawner::TokioSpawner;
use sleeplog_resilience::runtime::{ManualTimer, TokioTimer};
use sleeplog_resilience::util::Clock;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_tokio_spawner_spawn() {
    let spawner = TokioSpawner::new(tokio::runtime::Handle::current());

    let (tx, rx) = tokio::sync::oneshot::channel();
    spawner.spawn(async move {
        tx.send(123).unwrap();
    });

    let result = rx.await.expect("oneshot result");
    assert_eq!(result, 123);
}

#[test]
fn test_tokio_spawner_requires_runtime() {
    assert!(TokioSpawner::try_current().is_err());
    assert!(TokioTimer::try_current().is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_tokio_timer_fires_on_multi_thread_runtime() {
    let timer = TokioTimer::try_current().unwrap();
    let (tx, rx) = tokio::sync::oneshot::channel();
    timer.after(
        Duration::from_millis(10),
        Box::new(move || {
            let _ = tx.send(());
        }),
    );
    tokio::time::timeout(Duration::from_secs(5), rx)
        .await
        .expect("timer fired")
        .unwrap();
}

#[test]
fn test_manual_timer_is_a_clock() {
    let timer = ManualTimer::new(50);
    assert_eq!(timer.now_ms(), 50);
    timer.advance(Duration::from_millis(25));
    assert_eq!(timer.now_ms(), 75);
    timer.set_now(10);
    assert_eq!(timer.now_ms(), 10);
}

#[test]
fn test_manual_timer_zero_delay_fires_on_next_advance() {
    let timer = ManualTimer::new(0);
    let hits = Arc::new(AtomicUsize::new(0));
    let hits_clone = Arc::clone(&hits);
    timer.after(
        Duration::ZERO,
        Box::new(move || {
            hits_clone.fetch_add(1, Ordering::SeqCst);
        }),
    );
    assert_eq!(hits.load(Ordering::SeqCst), 0);
    assert_eq!(timer.next_deadline(), Some(0));
    assert_eq!(timer.advance(Duration::ZERO), 1);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}
