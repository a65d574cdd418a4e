//! Tests for utility functions

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use sleeplog_resilience::core::KeyValueStore;
use sleeplog_resilience::infra::InMemoryStore;
use sleeplog_resilience::util::{init_tracing, load_or_default, new_id, now_ms, persist, ListenerSet};

#[test]
fn test_new_id_is_unique() {
    let a = new_id();
    let b = new_id();
    assert_ne!(a, b);
    assert_eq!(a.len(), 36);
}

#[test]
fn test_now_ms_is_after_2020() {
    assert!(now_ms() > 1_577_836_800_000);
}

#[test]
fn test_load_or_default_tolerates_missing_and_malformed() {
    let store = InMemoryStore::new();
    let missing: Vec<u32> = load_or_default(&store, "ns");
    assert!(missing.is_empty());

    store.set("ns", "not json").unwrap();
    let malformed: Vec<u32> = load_or_default(&store, "ns");
    assert!(malformed.is_empty());

    store.set_unavailable(Some("blocked"));
    let unavailable: Vec<u32> = load_or_default(&store, "ns");
    assert!(unavailable.is_empty());
}

#[test]
fn test_persist_then_load() {
    let store = InMemoryStore::new();
    persist(&store, "ns", &vec![3u32, 1, 2]).unwrap();
    let loaded: Vec<u32> = load_or_default(&store, "ns");
    assert_eq!(loaded, vec![3, 1, 2]);
}

#[test]
fn test_listener_may_unsubscribe_during_emit() {
    let set = ListenerSet::<u32>::new();
    let hits = Arc::new(AtomicUsize::new(0));
    let slot = Arc::new(parking_lot::Mutex::new(None));

    let hits_clone = Arc::clone(&hits);
    let slot_clone = Arc::clone(&slot);
    let sub = set.subscribe(Arc::new(move |_: &u32| {
        hits_clone.fetch_add(1, Ordering::SeqCst);
        if let Some(sub) = slot_clone.lock().take() {
            sleeplog_resilience::util::Subscription::unsubscribe(sub);
        }
    }));
    *slot.lock() = Some(sub);

    assert_eq!(set.emit(&1), 1);
    assert_eq!(set.emit(&2), 0);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert!(set.is_empty());
}

#[test]
fn test_init_tracing_installs_once() {
    init_tracing();
    assert!(!init_tracing());
    assert!(tracing::dispatcher::has_been_set());
}
