//! Tests for builder modules

use std::sync::Arc;

use sleeplog_resilience::builders::ResilienceCoreBuilder;
use sleeplog_resilience::config::ResilienceConfig;
use sleeplog_resilience::core::{
    HttpMethod, ResilienceError, Spawn, Transport, TransportFailure,
};
use sleeplog_resilience::runtime::ManualTimer;

#[derive(Clone)]
struct InlineSpawner;

impl Spawn for InlineSpawner {
    fn spawn<F>(&self, fut: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        futures::executor::block_on(fut);
    }
}

struct Unreachable;

#[async_trait::async_trait]
impl Transport for Unreachable {
    async fn perform(
        &self,
        _method: HttpMethod,
        _path: &str,
        _body: Option<&serde_json::Value>,
    ) -> Result<serde_json::Value, TransportFailure> {
        Err(TransportFailure::connectivity_loss("unreachable"))
    }
}

#[test]
fn test_builder_defaults_to_in_memory_store_and_assumed_online() {
    let core = ResilienceCoreBuilder::new(
        ResilienceConfig::default(),
        InlineSpawner,
        Arc::new(ManualTimer::default()),
    )
    .with_transport(Arc::new(Unreachable))
    .build()
    .unwrap();

    let status = core.status();
    assert!(status.online);
    assert_eq!(status.queue.total, 0);
    assert_eq!(status.errors.records, 0);
    assert!(core.hooks().is_none());
    assert!(!core.errors().is_initialized());
}

#[test]
fn test_builder_without_transport_fails() {
    let result = ResilienceCoreBuilder::new(
        ResilienceConfig::default(),
        InlineSpawner,
        Arc::new(ManualTimer::default()),
    )
    .build();
    match result {
        Err(ResilienceError::InvalidConfig(msg)) => assert!(msg.contains("transport")),
        _ => panic!("expected invalid config"),
    }
}

#[test]
fn test_builder_with_store_dir() {
    let dir = tempfile::tempdir().unwrap();
    let core = ResilienceCoreBuilder::new(
        ResilienceConfig::default(),
        InlineSpawner,
        Arc::new(ManualTimer::default()),
    )
    .with_transport(Arc::new(Unreachable))
    .with_store_dir(dir.path().join("state"))
    .unwrap()
    .initially_online(false)
    .build()
    .unwrap();

    core.queue()
        .enqueue(sleeplog_resilience::core::RequestDescriptor::new(HttpMethod::Put, "/api/profile"));
    assert!(dir.path().join("state").join("sleeplog.offline_queue.json").exists());
}

#[test]
fn test_inline_drain_keeps_request_on_connectivity_loss() {
    let core = ResilienceCoreBuilder::new(
        ResilienceConfig::default(),
        InlineSpawner,
        Arc::new(ManualTimer::default()),
    )
    .with_transport(Arc::new(Unreachable))
    .build()
    .unwrap();

    // online: enqueue attempts immediately and the failure leaves it pending
    core.queue()
        .enqueue(sleeplog_resilience::core::RequestDescriptor::new(HttpMethod::Post, "/api/a"));
    let entries = core.queue().entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].attempts, 0);
    assert_eq!(core.queue().status().pending, 1);
}
