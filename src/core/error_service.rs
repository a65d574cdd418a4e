//! Error aggregation service.
//!
//! Every capture path (global hooks, explicit reports, queue and scheduler
//! failures) is normalized into a [`GlobalErrorRecord`]. Records are kept in a
//! bounded log with ring-buffer eviction; a report whose fingerprint matches a
//! record last seen within the coalescing window bumps that record's `count`
//! instead of appending. The log is persisted, then subscribers are notified
//! with the new or coalesced record.
//!
//! Capture never fails outward: storage errors and listener panics are logged
//! through `tracing` and swallowed.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ErrorServiceConfig;
use crate::core::hooks::{CaptureHooks, UncaughtError, UnhandledRejection};
use crate::core::store::KeyValueStore;
use crate::core::transport::{FailureKind, HttpMethod, TransportFailure};
use crate::core::ResilienceError;
use crate::util::{
    load_or_default, new_id, persist, Clock, Listener, ListenerSet, RecordId, Subscription,
    SystemClock, TimestampMs,
};

/// Longest the uncaught-error hook waits for the log lock.
const HOOK_LOCK_WAIT: Duration = Duration::from_millis(100);

/// Context keys that participate in the fingerprint, in order.
pub const FINGERPRINT_KEYS: [&str; 4] = ["component", "url", "method", "status"];

/// Free-form key/value context attached to a record.
pub type ErrorContext = BTreeMap<String, Value>;

/// Capture path that produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    /// Runtime exception.
    Runtime,
    /// Unhandled async rejection.
    PromiseRejection,
    /// Failed network call.
    Network,
}

impl ErrorKind {
    /// Stable textual form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Runtime => "runtime",
            Self::PromiseRejection => "promise-rejection",
            Self::Network => "network",
        }
    }
}

/// Severity of a record, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational.
    Info,
    /// Degraded but recoverable.
    Warning,
    /// Operation failed.
    Error,
    /// Application state may be corrupt.
    Critical,
}

impl Severity {
    /// Classify a capture. Pure function of the kind and, for network
    /// errors, the HTTP status or failure class.
    #[must_use]
    pub const fn classify(kind: ErrorKind, status: Option<u16>, failure: Option<FailureKind>) -> Self {
        match kind {
            ErrorKind::Runtime => Self::Critical,
            ErrorKind::PromiseRejection => Self::Error,
            ErrorKind::Network => match status {
                Some(400..=499) => Self::Warning,
                Some(500..=599) => Self::Error,
                Some(0) | None => match failure {
                    Some(FailureKind::ServerUnavailable) => Self::Error,
                    _ => Self::Warning,
                },
                Some(_) => Self::Info,
            },
        }
    }
}

/// One entry of the bounded error log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalErrorRecord {
    /// Record identifier.
    pub id: RecordId,
    /// Last time this error was seen.
    pub timestamp: TimestampMs,
    /// First time this error was seen.
    pub first_seen: TimestampMs,
    /// Capture path.
    #[serde(rename = "type")]
    pub kind: ErrorKind,
    /// Classified (or overridden) severity.
    pub severity: Severity,
    /// Error message.
    pub message: String,
    /// Free-form context.
    #[serde(default)]
    pub context: ErrorContext,
    /// Deduplication key.
    pub fingerprint: String,
    /// Number of coalesced occurrences.
    pub count: u32,
}

/// Normalized input of every capture path.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorReport {
    /// Capture path.
    pub kind: ErrorKind,
    /// Error message.
    pub message: String,
    /// HTTP status for network errors.
    pub status: Option<u16>,
    /// Failure class for network errors.
    pub failure: Option<FailureKind>,
    /// Explicit severity overriding classification.
    pub severity: Option<Severity>,
    /// Free-form context.
    pub context: ErrorContext,
}

impl ErrorReport {
    fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            failure: None,
            severity: None,
            context: ErrorContext::new(),
        }
    }

    /// A runtime exception.
    pub fn runtime(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Runtime, message)
    }

    /// An unhandled rejection.
    pub fn rejection(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::PromiseRejection, reason)
    }

    /// A failed network call.
    #[must_use]
    pub fn network(failure: &TransportFailure, url: &str, method: HttpMethod) -> Self {
        let mut report = Self::new(ErrorKind::Network, failure.message.clone())
            .with_context("url", url)
            .with_context("method", method.as_str());
        report.status = failure.status;
        report.failure = Some(failure.kind);
        if let Some(status) = failure.status {
            report = report.with_context("status", status);
        }
        report
    }

    /// Attach a context entry.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Merge a context map; existing keys are kept.
    #[must_use]
    pub fn with_context_map(mut self, context: ErrorContext) -> Self {
        for (key, value) in context {
            self.context.entry(key).or_insert(value);
        }
        self
    }

    /// Override the classified severity.
    #[must_use]
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    /// Effective severity.
    #[must_use]
    pub fn severity(&self) -> Severity {
        self.severity
            .unwrap_or_else(|| Severity::classify(self.kind, self.status, self.failure))
    }
}

/// Derive the deduplication key of a capture.
#[must_use]
pub fn fingerprint(kind: ErrorKind, message: &str, context: &ErrorContext) -> String {
    let mut key = format!("{}|{}", kind.as_str(), message.trim());
    for name in FINGERPRINT_KEYS {
        if let Some(value) = context.get(name) {
            key.push('|');
            key.push_str(name);
            key.push('=');
            match value {
                Value::String(s) => key.push_str(s),
                other => key.push_str(&other.to_string()),
            }
        }
    }
    key
}

/// Anything that accepts error reports. Implemented by [`ErrorAggregator`];
/// the queue and the scheduler depend on this seam only.
pub trait ErrorReporter: Send + Sync {
    /// Capture a report. Must not panic or block on I/O beyond the store.
    fn report(&self, report: ErrorReport);
}

/// Additional sink invoked after subscribers.
pub type ErrorSinkFn = Arc<dyn Fn(&GlobalErrorRecord) + Send + Sync>;

/// Partial runtime configuration update. `None` leaves a field untouched.
#[derive(Default, Clone)]
pub struct ErrorConfigUpdate {
    /// New ring-buffer capacity.
    pub max_stored_errors: Option<usize>,
    /// New coalescing window.
    pub coalesce_window_ms: Option<u64>,
    /// New user id; `Some(None)` clears it.
    pub user_id: Option<Option<String>>,
    /// New additional sink; `Some(None)` removes it.
    pub on_error: Option<Option<ErrorSinkFn>>,
}

impl fmt::Debug for ErrorConfigUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorConfigUpdate")
            .field("max_stored_errors", &self.max_stored_errors)
            .field("coalesce_window_ms", &self.coalesce_window_ms)
            .field("user_id", &self.user_id)
            .field("on_error", &self.on_error.as_ref().map(Option::is_some))
            .finish()
    }
}

/// Counts for dashboard badges.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorStats {
    /// Records in the log.
    pub records: usize,
    /// Occurrences including coalesced repeats.
    pub occurrences: u64,
    /// Records with severity `info`.
    pub info: usize,
    /// Records with severity `warning`.
    pub warning: usize,
    /// Records with severity `error`.
    pub error: usize,
    /// Records with severity `critical`.
    pub critical: usize,
}

/// Process-wide error log with capture hooks and subscriber broadcast.
///
/// Construct one explicitly and share it behind an [`Arc`]; tests create
/// isolated instances over an in-memory store.
pub struct ErrorAggregator {
    config: Mutex<ErrorServiceConfig>,
    sink: Mutex<Option<ErrorSinkFn>>,
    namespace: String,
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    log: Mutex<VecDeque<GlobalErrorRecord>>,
    listeners: Arc<ListenerSet<GlobalErrorRecord>>,
    hooks: Mutex<Vec<Subscription>>,
    initialized: AtomicBool,
}

impl ErrorAggregator {
    /// Create a service and load the persisted log from `namespace`.
    pub fn new(
        config: ErrorServiceConfig,
        namespace: impl Into<String>,
        store: Arc<dyn KeyValueStore>,
    ) -> Result<Self, ResilienceError> {
        config.validate().map_err(ResilienceError::InvalidConfig)?;
        let namespace = namespace.into();
        let mut log: VecDeque<GlobalErrorRecord> = load_or_default(&*store, &namespace);
        while log.len() > config.max_stored_errors {
            log.pop_front();
        }
        tracing::debug!("error log `{namespace}` loaded with {} records", log.len());
        Ok(Self {
            config: Mutex::new(config),
            sink: Mutex::new(None),
            namespace,
            store,
            clock: Arc::new(SystemClock),
            log: Mutex::new(log),
            listeners: ListenerSet::new(),
            hooks: Mutex::new(Vec::new()),
            initialized: AtomicBool::new(false),
        })
    }

    /// Use a custom clock for record timestamps and the coalescing window.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Install the global capture handlers. Returns `false` if already
    /// initialized; handlers are never installed twice.
    pub fn initialize(self: &Arc<Self>, hooks: &dyn CaptureHooks) -> bool {
        if self
            .initialized
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("error service already initialized");
            return false;
        }

        let (capture_uncaught, capture_rejections) = {
            let cfg = self.config.lock();
            (cfg.capture_uncaught, cfg.capture_rejections)
        };
        let mut registrations = self.hooks.lock();
        if capture_uncaught {
            let weak: Weak<Self> = Arc::downgrade(self);
            registrations.push(hooks.on_uncaught(Arc::new(move |e: &UncaughtError| {
                if let Some(service) = weak.upgrade() {
                    service.try_capture(uncaught_report(e), HOOK_LOCK_WAIT);
                }
            })));
        }
        if capture_rejections {
            let weak: Weak<Self> = Arc::downgrade(self);
            registrations.push(hooks.on_unhandled_rejection(Arc::new(
                move |r: &UnhandledRejection| {
                    if let Some(service) = weak.upgrade() {
                        service.capture(ErrorReport::rejection(r.reason.clone()));
                    }
                },
            )));
        }
        tracing::info!("error service initialized with {} hooks", registrations.len());
        true
    }

    /// Remove the global handlers and all subscribers. Idempotent.
    pub fn destroy(&self) {
        if !self.initialized.swap(false, Ordering::AcqRel) {
            return;
        }
        let registrations: Vec<Subscription> = self.hooks.lock().drain(..).collect();
        for registration in registrations {
            registration.unsubscribe();
        }
        self.listeners.clear();
        tracing::info!("error service destroyed");
    }

    /// Whether global handlers are installed.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Capture a normalized report and return the stored (possibly coalesced) record.
    pub fn capture(&self, report: ErrorReport) -> GlobalErrorRecord {
        let pending = self.prepare(report);
        let log = self.log.lock();
        self.commit(pending, log)
    }

    /// Like [`ErrorAggregator::capture`], but gives up after `wait` if the log
    /// is locked. Used by the uncaught-error hook, which can fire while this
    /// thread is already inside `capture` (a store that panics in `set`).
    pub fn try_capture(&self, report: ErrorReport, wait: Duration) -> Option<GlobalErrorRecord> {
        let pending = self.prepare(report);
        let Some(log) = self.log.try_lock_for(wait) else {
            tracing::error!("error log busy; dropping capture: {}", pending.message);
            return None;
        };
        Some(self.commit(pending, log))
    }

    fn prepare(&self, report: ErrorReport) -> PendingCapture {
        let (window, capacity, user_id) = {
            let cfg = self.config.lock();
            (cfg.coalesce_window_ms, cfg.max_stored_errors, cfg.user_id.clone())
        };
        let severity = report.severity();
        let mut context = report.context;
        if let Some(user_id) = user_id {
            context
                .entry("user_id".to_string())
                .or_insert(Value::String(user_id));
        }
        let fingerprint = fingerprint(report.kind, &report.message, &context);
        PendingCapture {
            now: self.clock.now_ms(),
            window,
            capacity,
            kind: report.kind,
            severity,
            message: report.message,
            context,
            fingerprint,
        }
    }

    fn commit(
        &self,
        pending: PendingCapture,
        mut log: MutexGuard<'_, VecDeque<GlobalErrorRecord>>,
    ) -> GlobalErrorRecord {
        let PendingCapture {
            now,
            window,
            capacity,
            kind,
            severity,
            message,
            context,
            fingerprint,
        } = pending;

        let existing = log.iter_mut().rev().find(|r| {
            window > 0 && r.fingerprint == fingerprint && now.saturating_sub(r.timestamp) <= window
        });
        let record = if let Some(existing) = existing {
            existing.count = existing.count.saturating_add(1);
            existing.timestamp = now;
            existing.severity = existing.severity.max(severity);
            existing.clone()
        } else {
            let record = GlobalErrorRecord {
                id: new_id(),
                timestamp: now,
                first_seen: now,
                kind,
                severity,
                message,
                context,
                fingerprint,
                count: 1,
            };
            log.push_back(record.clone());
            while log.len() > capacity {
                log.pop_front();
            }
            record
        };
        if let Err(e) = persist(&*self.store, &self.namespace, &*log) {
            tracing::warn!("failed to persist error log: {e}");
        }
        drop(log);

        tracing::debug!(
            "captured {} error (count {}): {}",
            record.kind.as_str(),
            record.count,
            record.message
        );
        self.listeners.emit(&record);
        let sink = self.sink.lock().clone();
        if let Some(sink) = sink {
            if catch_unwind(AssertUnwindSafe(|| (*sink)(&record))).is_err() {
                tracing::error!("error sink panicked");
            }
        }
        record
    }

    /// Report a runtime error explicitly.
    pub fn report_error(&self, error: impl fmt::Display, context: ErrorContext) -> GlobalErrorRecord {
        self.capture(ErrorReport::runtime(error.to_string()).with_context_map(context))
    }

    /// Report a failed network call explicitly. A missing status, or status
    /// `0` as reported by a failed browser fetch, means the request never
    /// reached the server.
    pub fn report_network_error(
        &self,
        error: impl fmt::Display,
        url: &str,
        method: HttpMethod,
        status: Option<u16>,
        context: ErrorContext,
    ) -> GlobalErrorRecord {
        let failure = match status {
            Some(0) | None => TransportFailure::connectivity_loss(error.to_string()),
            Some(status) => TransportFailure::from_status(status, error.to_string()),
        };
        self.capture(ErrorReport::network(&failure, url, method).with_context_map(context))
    }

    /// Subscribe to new and coalesced records.
    pub fn on_error(&self, listener: Listener<GlobalErrorRecord>) -> Subscription {
        self.listeners.subscribe(listener)
    }

    /// Snapshot of the log, oldest first.
    pub fn stored_errors(&self) -> Vec<GlobalErrorRecord> {
        self.log.lock().iter().cloned().collect()
    }

    /// The `limit` most recently seen records, newest first.
    pub fn recent_errors(&self, limit: usize) -> Vec<GlobalErrorRecord> {
        let mut records = self.stored_errors();
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        records.truncate(limit);
        records
    }

    /// Drop every record, in memory and in storage.
    pub fn clear_stored_errors(&self) {
        let mut log = self.log.lock();
        log.clear();
        if let Err(e) = self.store.remove(&self.namespace) {
            tracing::warn!("failed to clear persisted error log: {e}");
        }
        tracing::info!("error log cleared");
    }

    /// Apply a partial configuration update.
    pub fn update_config(&self, update: ErrorConfigUpdate) -> Result<(), ResilienceError> {
        let capacity = {
            let mut cfg = self.config.lock();
            let mut next = cfg.clone();
            if let Some(max) = update.max_stored_errors {
                next.max_stored_errors = max;
            }
            if let Some(window) = update.coalesce_window_ms {
                next.coalesce_window_ms = window;
            }
            if let Some(user_id) = update.user_id {
                next.user_id = user_id;
            }
            next.validate().map_err(ResilienceError::InvalidConfig)?;
            *cfg = next;
            cfg.max_stored_errors
        };
        if let Some(sink) = update.on_error {
            *self.sink.lock() = sink;
        }

        let mut log = self.log.lock();
        if log.len() > capacity {
            while log.len() > capacity {
                log.pop_front();
            }
            if let Err(e) = persist(&*self.store, &self.namespace, &*log) {
                tracing::warn!("failed to persist error log: {e}");
            }
        }
        Ok(())
    }

    /// Current configuration.
    pub fn config(&self) -> ErrorServiceConfig {
        self.config.lock().clone()
    }

    /// Counts by severity.
    pub fn stats(&self) -> ErrorStats {
        let log = self.log.lock();
        let mut stats = ErrorStats {
            records: log.len(),
            ..ErrorStats::default()
        };
        for record in log.iter() {
            stats.occurrences += u64::from(record.count);
            match record.severity {
                Severity::Info => stats.info += 1,
                Severity::Warning => stats.warning += 1,
                Severity::Error => stats.error += 1,
                Severity::Critical => stats.critical += 1,
            }
        }
        stats
    }
}

impl ErrorReporter for ErrorAggregator {
    fn report(&self, report: ErrorReport) {
        self.capture(report);
    }
}

impl Drop for ErrorAggregator {
    fn drop(&mut self) {
        self.destroy();
    }
}

struct PendingCapture {
    now: TimestampMs,
    window: u64,
    capacity: usize,
    kind: ErrorKind,
    severity: Severity,
    message: String,
    context: ErrorContext,
    fingerprint: String,
}

fn uncaught_report(e: &UncaughtError) -> ErrorReport {
    let mut report = ErrorReport::runtime(e.message.clone());
    if let Some(source) = &e.source {
        report = report.with_context("source", source.clone());
    }
    if let Some(line) = e.line {
        report = report.with_context("line", line);
    }
    if let Some(column) = e.column {
        report = report.with_context("column", column);
    }
    if let Some(stack) = &e.stack {
        report = report.with_context("stack", stack.clone());
    }
    report
}
