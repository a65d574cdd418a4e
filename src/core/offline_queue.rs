//! Offline request queue.
//!
//! Mutating calls are written to storage before any network attempt, then
//! replayed one at a time in submission order. Drains are serialized by a
//! drain-in-progress flag: at most one request is in flight per queue.
//!
//! Replay outcomes per request:
//!
//! | Failure | Effect | Drain |
//! |---|---|---|
//! | success | removed | continues |
//! | connectivity loss | back to `pending` | stops |
//! | server rejected (4xx) | `failed-permanent`, reported | continues |
//! | server unavailable | `failed-retryable`, or `failed-permanent` at the retry ceiling | stops while retryable |
//!
//! Stopping on a retryable failure keeps the head of the queue in front of
//! later requests, so replay never reorders mutations.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use futures::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::QueueConfig;
use crate::core::connectivity::{ConnectivityEvent, ConnectivityMonitor};
use crate::core::error_service::{ErrorReport, ErrorReporter, Severity};
use crate::core::spawn::Spawn;
use crate::core::store::KeyValueStore;
use crate::core::transport::{FailureKind, HttpMethod, RequestDescriptor, Transport, TransportFailure};
use crate::core::ResilienceError;
use crate::util::{load_or_default, new_id, persist, Clock, RequestId, Subscription, SystemClock, TimestampMs};

/// Lifecycle state of a queued request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestStatus {
    /// Waiting for a drain.
    Pending,
    /// Currently being replayed.
    InFlight,
    /// Last replay failed; will be retried by the next drain.
    FailedRetryable,
    /// Excluded from automatic drains; needs manual retry or discard.
    FailedPermanent,
}

impl RequestStatus {
    /// Whether automatic drains pick this request up.
    #[must_use]
    pub const fn is_replayable(self) -> bool {
        matches!(self, Self::Pending | Self::FailedRetryable)
    }
}

/// A deferred mutating call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedRequest {
    /// Identifier assigned at enqueue time.
    pub id: RequestId,
    /// HTTP verb.
    pub method: HttpMethod,
    /// Request path.
    pub path: String,
    /// Optional JSON body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    /// Enqueue time; replay order.
    pub created_at: TimestampMs,
    /// Replay attempts so far.
    pub attempts: u32,
    /// Lifecycle state.
    pub status: RequestStatus,
    /// Message of the most recent failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl QueuedRequest {
    /// The call this entry replays.
    #[must_use]
    pub fn descriptor(&self) -> RequestDescriptor {
        RequestDescriptor {
            method: self.method,
            path: self.path.clone(),
            body: self.body.clone(),
        }
    }
}

/// Snapshot for queue badges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStatus {
    /// All entries.
    pub total: usize,
    /// Entries awaiting automatic replay (`pending`, `in-flight`, `failed-retryable`).
    pub pending: usize,
    /// Entries in `failed-permanent`.
    pub failed: usize,
}

/// Outcome counts of one [`OfflineQueue::drain`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrainResult {
    /// Requests replayed successfully and removed.
    pub succeeded: usize,
    /// Requests that failed and stay retryable.
    pub failed: usize,
    /// Requests moved to `failed-permanent`.
    pub permanently_failed: usize,
    /// Replayable requests left after the drain.
    pub remaining: usize,
}

impl DrainResult {
    fn absorb(&mut self, other: Self) {
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.permanently_failed += other.permanently_failed;
        self.remaining = other.remaining;
    }
}

enum Step {
    Succeeded,
    Retryable,
    Permanent(ErrorReport),
    Offline,
    Vanished,
}

#[derive(PartialEq, Eq)]
enum PassEnd {
    Exhausted,
    Interrupted,
}

struct DrainFlag<'a>(&'a AtomicBool);

impl Drop for DrainFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct QueueInner {
    config: QueueConfig,
    namespace: String,
    transport: Arc<dyn Transport>,
    store: Arc<dyn KeyValueStore>,
    connectivity: Arc<ConnectivityMonitor>,
    reporter: Mutex<Option<Arc<dyn ErrorReporter>>>,
    clock: Mutex<Arc<dyn Clock>>,
    entries: Mutex<Vec<QueuedRequest>>,
    draining: AtomicBool,
}

/// Durable FIFO of deferred mutations with serialized replay.
///
/// Cloning shares the same queue.
#[derive(Clone)]
pub struct OfflineQueue<S: Spawn> {
    inner: Arc<QueueInner>,
    spawner: S,
    attachment: Arc<Mutex<Option<Subscription>>>,
}

impl<S: Spawn> OfflineQueue<S> {
    /// Create a queue over `namespace`, restoring persisted entries.
    ///
    /// Entries persisted as `in-flight` were interrupted by a reload and are
    /// restored as `pending`; malformed storage yields an empty queue.
    pub fn new(
        config: QueueConfig,
        namespace: impl Into<String>,
        transport: Arc<dyn Transport>,
        store: Arc<dyn KeyValueStore>,
        connectivity: Arc<ConnectivityMonitor>,
        spawner: S,
    ) -> Result<Self, ResilienceError> {
        config.validate().map_err(ResilienceError::InvalidConfig)?;
        let namespace = namespace.into();
        let mut entries: Vec<QueuedRequest> = load_or_default(&*store, &namespace);
        let mut recovered = 0usize;
        for entry in &mut entries {
            if entry.status == RequestStatus::InFlight {
                entry.status = RequestStatus::Pending;
                recovered += 1;
            }
        }
        entries.sort_by_key(|e| e.created_at);
        if recovered > 0 {
            tracing::info!("restored {recovered} interrupted requests as pending");
            if let Err(e) = persist(&*store, &namespace, &entries) {
                tracing::warn!("failed to persist offline queue: {e}");
            }
        }
        tracing::debug!("offline queue `{namespace}` loaded with {} entries", entries.len());

        Ok(Self {
            inner: Arc::new(QueueInner {
                config,
                namespace,
                transport,
                store,
                connectivity,
                reporter: Mutex::new(None),
                clock: Mutex::new(Arc::new(SystemClock)),
                entries: Mutex::new(entries),
                draining: AtomicBool::new(false),
            }),
            spawner,
            attachment: Arc::new(Mutex::new(None)),
        })
    }

    /// Report permanent failures to an error reporter.
    #[must_use]
    pub fn with_reporter(self, reporter: Arc<dyn ErrorReporter>) -> Self {
        *self.inner.reporter.lock() = Some(reporter);
        self
    }

    /// Use a custom clock for `created_at` and staleness.
    #[must_use]
    pub fn with_clock(self, clock: Arc<dyn Clock>) -> Self {
        *self.inner.clock.lock() = clock;
        self
    }

    /// Persist a mutating call and return its id.
    ///
    /// Never fails: a storage failure is logged and the request is still
    /// kept in memory. When online, a drain is spawned to attempt it.
    pub fn enqueue(&self, request: RequestDescriptor) -> RequestId {
        if !request.method.is_mutating() {
            tracing::warn!("queueing non-mutating {} {}", request.method, request.path);
        }
        let entry = QueuedRequest {
            id: new_id(),
            method: request.method,
            path: request.path,
            body: request.body,
            created_at: self.inner.now(),
            attempts: 0,
            status: RequestStatus::Pending,
            last_error: None,
        };
        let id = entry.id.clone();
        {
            let mut entries = self.inner.entries.lock();
            tracing::info!("queued {} {} as {id}", entry.method, entry.path);
            entries.push(entry);
            self.inner.save(&entries);
        }
        if self.inner.connectivity.is_online() {
            self.spawn_drain();
        }
        id
    }

    /// Replay replayable requests in FIFO order, one at a time.
    ///
    /// A no-op returning zero counts while another drain is running or
    /// while offline.
    pub async fn drain(&self) -> DrainResult {
        Arc::clone(&self.inner).drain().await
    }

    /// Whether a drain is running.
    pub fn is_draining(&self) -> bool {
        self.inner.draining.load(Ordering::Acquire)
    }

    /// Counts for queue badges.
    pub fn status(&self) -> QueueStatus {
        let entries = self.inner.entries.lock();
        let mut status = QueueStatus {
            total: entries.len(),
            ..QueueStatus::default()
        };
        for entry in entries.iter() {
            if entry.status == RequestStatus::FailedPermanent {
                status.failed += 1;
            } else {
                status.pending += 1;
            }
        }
        status
    }

    /// All entries in replay order.
    pub fn entries(&self) -> Vec<QueuedRequest> {
        self.inner.entries.lock().clone()
    }

    /// Discard every entry. Explicit user action only.
    pub fn clear(&self) {
        let mut entries = self.inner.entries.lock();
        let dropped = entries.len();
        entries.clear();
        if let Err(e) = self.inner.store.remove(&self.inner.namespace) {
            tracing::warn!("failed to clear persisted offline queue: {e}");
        }
        tracing::info!("offline queue cleared ({dropped} entries discarded)");
    }

    /// Reset a failed request to `pending` with zero attempts.
    pub fn retry(&self, id: &str) -> Result<(), ResilienceError> {
        {
            let mut entries = self.inner.entries.lock();
            let entry = entries
                .iter_mut()
                .find(|e| e.id == id)
                .ok_or_else(|| ResilienceError::NotFound(id.to_string()))?;
            if entry.status == RequestStatus::InFlight {
                return Ok(());
            }
            entry.status = RequestStatus::Pending;
            entry.attempts = 0;
            entry.last_error = None;
            tracing::info!("request {id} reset for manual retry");
            self.inner.save(&entries);
        }
        if self.inner.connectivity.is_online() {
            self.spawn_drain();
        }
        Ok(())
    }

    /// Remove one request regardless of its state.
    pub fn discard(&self, id: &str) -> Result<QueuedRequest, ResilienceError> {
        let mut entries = self.inner.entries.lock();
        let pos = entries
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| ResilienceError::NotFound(id.to_string()))?;
        let removed = entries.remove(pos);
        self.inner.save(&entries);
        tracing::info!("request {id} discarded");
        Ok(removed)
    }

    /// Move replayable requests older than `max_age_ms` to `failed-permanent`.
    /// Returns the number of requests marked stale.
    pub fn prune_stale(&self, now_ms: TimestampMs) -> usize {
        let Some(max_age) = self.inner.config.max_age_ms else {
            return 0;
        };
        let reports: Vec<ErrorReport> = {
            let mut entries = self.inner.entries.lock();
            let reports: Vec<ErrorReport> = entries
                .iter_mut()
                .filter(|e| e.status.is_replayable() && now_ms.saturating_sub(e.created_at) > max_age)
                .map(|e| {
                    e.status = RequestStatus::FailedPermanent;
                    e.last_error = Some("stale: not replayed within max age".into());
                    ErrorReport::runtime(format!("queued {} {} expired before replay", e.method, e.path))
                        .with_severity(Severity::Warning)
                        .with_context("component", "offline-queue")
                        .with_context("request_id", e.id.clone())
                })
                .collect();
            if !reports.is_empty() {
                self.inner.save(&entries);
            }
            reports
        };
        let stale = reports.len();
        if stale > 0 {
            tracing::warn!("marked {stale} queued requests stale");
        }
        for report in reports {
            self.inner.report(report);
        }
        stale
    }

    /// Drain automatically on every offline→online transition. Idempotent.
    pub fn attach(&self) {
        let mut attachment = self.attachment.lock();
        if attachment.is_some() {
            return;
        }
        let weak: Weak<QueueInner> = Arc::downgrade(&self.inner);
        let spawner = self.spawner.clone();
        *attachment = Some(self.inner.connectivity.subscribe(Arc::new(
            move |event: &ConnectivityEvent| {
                if !event.online {
                    return;
                }
                if let Some(inner) = weak.upgrade() {
                    tracing::debug!("connectivity restored; spawning drain");
                    spawner.spawn(async move {
                        inner.drain().await;
                    });
                }
            },
        )));
    }

    /// Stop draining on reconnect.
    pub fn detach(&self) {
        if let Some(subscription) = self.attachment.lock().take() {
            subscription.unsubscribe();
        }
    }

    fn spawn_drain(&self) {
        let inner = Arc::clone(&self.inner);
        self.spawner.spawn(async move {
            inner.drain().await;
        });
    }
}

impl QueueInner {
    fn now(&self) -> TimestampMs {
        self.clock.lock().now_ms()
    }

    fn save(&self, entries: &[QueuedRequest]) {
        if let Err(e) = persist(&*self.store, &self.namespace, entries) {
            tracing::warn!("failed to persist offline queue: {e}");
        }
    }

    fn report(&self, report: ErrorReport) {
        let reporter = self.reporter.lock().clone();
        if let Some(reporter) = reporter {
            reporter.report(report);
        }
    }

    fn replayable_count(&self) -> usize {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.status.is_replayable())
            .count()
    }

    async fn drain(self: Arc<Self>) -> DrainResult {
        let mut total = DrainResult {
            remaining: self.replayable_count(),
            ..DrainResult::default()
        };
        loop {
            if !self.connectivity.is_online() {
                tracing::debug!("offline; drain skipped");
                return total;
            }
            if self
                .draining
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                tracing::debug!("drain already in progress");
                return total;
            }
            let (pass, end) = {
                let _flag = DrainFlag(&self.draining);
                self.drain_pass().await
            };
            total.absorb(pass);
            // Entries enqueued between the last lookup and the flag release
            // would otherwise wait for the next trigger.
            if end == PassEnd::Interrupted || total.remaining == 0 {
                break;
            }
        }
        tracing::info!(
            "drain finished: {} succeeded, {} failed, {} permanently failed, {} remaining",
            total.succeeded,
            total.failed,
            total.permanently_failed,
            total.remaining
        );
        total
    }

    async fn drain_pass(&self) -> (DrainResult, PassEnd) {
        let mut result = DrainResult::default();
        let end = loop {
            if !self.connectivity.is_online() {
                break PassEnd::Interrupted;
            }
            let next = {
                let mut entries = self.entries.lock();
                let next = entries.iter_mut().find(|e| e.status.is_replayable()).map(|e| {
                    e.status = RequestStatus::InFlight;
                    (e.id.clone(), e.descriptor())
                });
                if next.is_some() {
                    self.save(&entries);
                }
                next
            };
            let Some((id, request)) = next else {
                break PassEnd::Exhausted;
            };

            tracing::debug!("replaying {} {} ({id})", request.method, request.path);
            let outcome = std::panic::AssertUnwindSafe(self.transport.perform(
                request.method,
                &request.path,
                request.body.as_ref(),
            ))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(TransportFailure::timeout("transport panicked")));

            match self.settle(&id, &request, outcome) {
                Step::Succeeded => result.succeeded += 1,
                Step::Vanished => {}
                Step::Permanent(report) => {
                    result.permanently_failed += 1;
                    self.report(report);
                }
                Step::Retryable => {
                    result.failed += 1;
                    break PassEnd::Interrupted;
                }
                Step::Offline => break PassEnd::Interrupted,
            }
        };
        result.remaining = self.replayable_count();
        (result, end)
    }

    fn settle(
        &self,
        id: &str,
        request: &RequestDescriptor,
        outcome: Result<Value, TransportFailure>,
    ) -> Step {
        let mut entries = self.entries.lock();
        let Some(pos) = entries.iter().position(|e| e.id == id) else {
            tracing::debug!("request {id} removed while in flight");
            return Step::Vanished;
        };

        let failure = match outcome {
            Ok(_) => {
                entries.remove(pos);
                self.save(&entries);
                tracing::info!("replayed {} {} ({id})", request.method, request.path);
                return Step::Succeeded;
            }
            Err(failure) => failure,
        };

        let entry = &mut entries[pos];
        entry.last_error = Some(failure.message.clone());
        if !failure.is_connectivity_loss() {
            entry.attempts = entry.attempts.saturating_add(1);
        }
        let attempts = entry.attempts;
        let step = match failure.kind {
            FailureKind::ConnectivityLoss => {
                entry.status = RequestStatus::Pending;
                tracing::warn!("connectivity lost replaying {id}; drain stopped");
                Step::Offline
            }
            FailureKind::ServerRejected => {
                entry.status = RequestStatus::FailedPermanent;
                tracing::warn!("request {id} rejected by server: {failure}");
                Step::Permanent(self.failure_report(&failure, request, id, attempts))
            }
            FailureKind::ServerUnavailable if attempts >= self.config.max_attempts => {
                entry.status = RequestStatus::FailedPermanent;
                tracing::error!("request {id} failed {attempts} times; giving up");
                Step::Permanent(self.failure_report(&failure, request, id, attempts))
            }
            FailureKind::ServerUnavailable => {
                entry.status = RequestStatus::FailedRetryable;
                tracing::warn!(
                    "request {id} failed (attempt {attempts}/{}): {failure}",
                    self.config.max_attempts
                );
                Step::Retryable
            }
        };
        self.save(&entries);
        step
    }

    fn failure_report(
        &self,
        failure: &TransportFailure,
        request: &RequestDescriptor,
        id: &str,
        attempts: u32,
    ) -> ErrorReport {
        ErrorReport::network(failure, &request.path, request.method)
            .with_context("component", "offline-queue")
            .with_context("request_id", id)
            .with_context("attempts", attempts)
    }
}
