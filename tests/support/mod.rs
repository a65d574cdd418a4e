//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::Notify;

use sleeplog_resilience::core::{HttpMethod, Transport, TransportFailure};
use sleeplog_resilience::runtime::TokioSpawner;

/// Transport answering from a script, then from a default outcome.
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Result<Value, TransportFailure>>>,
    default: Mutex<Result<Value, TransportFailure>>,
    calls: Mutex<Vec<String>>,
    gate: Mutex<Option<Arc<Notify>>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            default: Mutex::new(Ok(json!({ "ok": true }))),
            calls: Mutex::new(Vec::new()),
            gate: Mutex::new(None),
        })
    }

    pub fn push(&self, outcome: Result<Value, TransportFailure>) {
        self.script.lock().push_back(outcome);
    }

    pub fn set_default(&self, outcome: Result<Value, TransportFailure>) {
        *self.default.lock() = outcome;
    }

    /// Block every call until the returned gate is notified.
    pub fn gated(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock() = Some(Arc::clone(&gate));
        gate
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn perform(
        &self,
        method: HttpMethod,
        path: &str,
        _body: Option<&Value>,
    ) -> Result<Value, TransportFailure> {
        self.calls.lock().push(format!("{method} {path}"));
        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let scripted = self.script.lock().pop_front();
        scripted.unwrap_or_else(|| self.default.lock().clone())
    }
}

pub fn spawner() -> TokioSpawner {
    sleeplog_resilience::util::init_tracing();
    TokioSpawner::try_current().expect("tests run inside a tokio runtime")
}

/// Let spawned tasks on the current-thread runtime run to quiescence.
pub async fn settle() {
    for _ in 0..64 {
        tokio::task::yield_now().await;
    }
}
