//! Polling scheduler for read-only views.
//!
//! Each subscription owns at most one armed timer. The next timer is armed
//! only after an invocation completes, so timer-driven invocations never
//! overlap; [`PollHandle::force_update`] is coalesced into a no-op while an
//! invocation is in flight. Cancelling bumps the subscription's generation and
//! disarms its timer, and every timer callback re-checks the generation under
//! the state lock, so no invocation starts after [`PollHandle::cancel`]
//! returns.
//!
//! While the connectivity monitor reports offline, due invocations are skipped
//! and the timer is re-armed, so polling resumes by itself on reconnect.

use std::collections::HashMap;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::PollingConfig;
use crate::core::connectivity::ConnectivityMonitor;
use crate::core::error_service::{ErrorReport, ErrorReporter};
use crate::core::spawn::{Spawn, Timer, TimerToken};
use crate::core::transport::{HttpMethod, TransportFailure};
use crate::core::ResilienceError;
use crate::util::{Clock, SubscriptionId, SystemClock, TimestampMs};

/// Future returned by a polling callback.
pub type PollFuture = Pin<Box<dyn Future<Output = Result<(), PollFailure>> + Send + 'static>>;

/// Polling callback.
pub type PollCallback = Arc<dyn Fn() -> PollFuture + Send + Sync>;

/// Failure of one polling invocation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PollFailure {
    /// The refresh call failed on the network.
    #[error("network failure: {0}")]
    Network(TransportFailure),
    /// The callback failed for any other reason, including a panic.
    #[error("runtime failure: {0}")]
    Runtime(String),
}

impl From<TransportFailure> for PollFailure {
    fn from(failure: TransportFailure) -> Self {
        Self::Network(failure)
    }
}

/// Outcome of the most recent invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PollResult {
    /// The callback resolved successfully.
    Success,
    /// The callback failed or panicked.
    Failure,
}

/// Options of one subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollOptions {
    /// Time between the end of one invocation and the start of the next.
    pub interval: Duration,
    /// Whether the timer runs.
    pub enabled: bool,
    /// Backoff ceiling after consecutive failures; `None` uses the scheduler default.
    pub max_backoff: Option<Duration>,
    /// Invoke once right away instead of waiting one interval.
    pub immediate: bool,
    /// Label used in logs and error context.
    pub name: Option<String>,
}

impl PollOptions {
    /// Enabled subscription with the given interval.
    #[must_use]
    pub const fn every(interval: Duration) -> Self {
        Self {
            interval,
            enabled: true,
            max_backoff: None,
            immediate: false,
            name: None,
        }
    }

    /// Set whether the timer starts enabled.
    #[must_use]
    pub const fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the backoff ceiling.
    #[must_use]
    pub const fn with_max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff = Some(max_backoff);
        self
    }

    /// Invoke once on schedule.
    #[must_use]
    pub const fn immediate(mut self) -> Self {
        self.immediate = true;
        self
    }

    /// Label the subscription.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Read-only view of a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollingSubscription {
    /// Subscription identifier.
    pub id: SubscriptionId,
    /// Optional label.
    pub name: Option<String>,
    /// Base interval in milliseconds.
    pub interval_ms: u64,
    /// Whether the timer runs.
    pub enabled: bool,
    /// Whether the subscription was cancelled.
    pub cancelled: bool,
    /// Completion time of the last invocation.
    pub last_run_at: Option<TimestampMs>,
    /// Result of the last invocation.
    pub last_result: Option<PollResult>,
    /// Failures since the last success.
    pub consecutive_failures: u32,
}

struct PollState {
    enabled: bool,
    cancelled: bool,
    interval: Duration,
    max_backoff: Option<Duration>,
    timer: Option<TimerToken>,
    generation: u64,
    in_flight: bool,
    last_run_at: Option<TimestampMs>,
    last_result: Option<PollResult>,
    consecutive_failures: u32,
}

impl PollState {
    fn next_delay(&self) -> Duration {
        match self.max_backoff {
            Some(max) if self.consecutive_failures > 0 => {
                let factor = 1u32 << self.consecutive_failures.min(16);
                self.interval.saturating_mul(factor).min(max.max(self.interval))
            }
            _ => self.interval,
        }
    }
}

struct PollEntry<S: Spawn, T: Timer> {
    id: SubscriptionId,
    name: Option<String>,
    callback: PollCallback,
    min_interval: Duration,
    state: Mutex<PollState>,
    spawner: S,
    timer: Arc<T>,
    connectivity: Option<Arc<ConnectivityMonitor>>,
    reporter: Option<Arc<dyn ErrorReporter>>,
    clock: Arc<dyn Clock>,
}

impl<S: Spawn, T: Timer> PollEntry<S, T> {
    fn label(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("poll-{}", self.id))
    }

    fn arm(self: &Arc<Self>, state: &mut PollState) {
        let generation = state.generation;
        let weak: Weak<Self> = Arc::downgrade(self);
        let token = self.timer.after(
            state.next_delay(),
            Box::new(move || {
                if let Some(entry) = weak.upgrade() {
                    entry.on_timer(generation);
                }
            }),
        );
        state.timer = Some(token);
    }

    fn disarm(&self, state: &mut PollState) {
        state.generation = state.generation.wrapping_add(1);
        if let Some(token) = state.timer.take() {
            self.timer.cancel(token);
        }
    }

    fn on_timer(self: &Arc<Self>, generation: u64) {
        let mut state = self.state.lock();
        if state.cancelled || !state.enabled || state.generation != generation || state.in_flight {
            return;
        }
        state.timer = None;
        if self.connectivity.as_ref().is_some_and(|c| !c.is_online()) {
            tracing::debug!("{}: offline, skipping scheduled refresh", self.label());
            self.arm(&mut state);
            return;
        }
        state.in_flight = true;
        drop(state);
        self.spawn_invocation();
    }

    fn spawn_invocation(self: &Arc<Self>) {
        let entry = Arc::clone(self);
        self.spawner.spawn(async move {
            entry.invoke().await;
        });
    }

    async fn invoke(self: Arc<Self>) {
        {
            let mut state = self.state.lock();
            if state.cancelled {
                state.in_flight = false;
                return;
            }
        }

        let outcome = match catch_unwind(AssertUnwindSafe(|| (*self.callback)())) {
            Ok(fut) => AssertUnwindSafe(fut)
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(PollFailure::Runtime(panic_message(panic.as_ref())))),
            Err(panic) => Err(PollFailure::Runtime(panic_message(panic.as_ref()))),
        };

        let now = self.clock.now_ms();
        {
            let mut state = self.state.lock();
            state.in_flight = false;
            state.last_run_at = Some(now);
            if outcome.is_ok() {
                state.last_result = Some(PollResult::Success);
                state.consecutive_failures = 0;
            } else {
                state.last_result = Some(PollResult::Failure);
                state.consecutive_failures = state.consecutive_failures.saturating_add(1);
            }
            if !state.cancelled && state.enabled && state.timer.is_none() {
                self.arm(&mut state);
            }
        }

        if let Err(failure) = outcome {
            tracing::warn!("{}: refresh failed: {failure}", self.label());
            self.report(failure);
        }
    }

    fn report(&self, failure: PollFailure) {
        let Some(reporter) = &self.reporter else {
            return;
        };
        let label = self.label();
        let report = match failure {
            PollFailure::Network(failure) => ErrorReport::network(&failure, &label, HttpMethod::Get),
            PollFailure::Runtime(message) => ErrorReport::runtime(message),
        }
        .with_context("component", "polling-scheduler")
        .with_context("subscription", label);
        reporter.report(report);
    }

    fn cancel(&self) {
        let mut state = self.state.lock();
        if state.cancelled {
            return;
        }
        state.cancelled = true;
        self.disarm(&mut state);
        tracing::debug!("{}: cancelled", self.label());
    }

    fn is_cancelled(&self) -> bool {
        self.state.lock().cancelled
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("polling callback panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("polling callback panicked: {s}")
    } else {
        "polling callback panicked".to_string()
    }
}

/// Handle of one subscription. Dropping it cancels the subscription.
#[must_use = "dropping a PollHandle cancels the subscription"]
pub struct PollHandle<S: Spawn, T: Timer> {
    entry: Arc<PollEntry<S, T>>,
}

impl<S: Spawn, T: Timer> PollHandle<S, T> {
    /// Subscription identifier.
    pub fn id(&self) -> SubscriptionId {
        self.entry.id
    }

    /// Invoke the callback now and restart the interval.
    ///
    /// Returns `false` without invoking when an invocation is already in
    /// flight or the subscription is cancelled.
    pub fn force_update(&self) -> bool {
        let mut state = self.entry.state.lock();
        if state.cancelled || state.in_flight {
            return false;
        }
        self.entry.disarm(&mut state);
        state.in_flight = true;
        drop(state);
        self.entry.spawn_invocation();
        true
    }

    /// Stop the subscription. Idempotent; no invocation starts after this returns.
    pub fn cancel(&self) {
        self.entry.cancel();
    }

    /// Start or stop the timer.
    pub fn set_enabled(&self, enabled: bool) {
        let mut state = self.entry.state.lock();
        if state.cancelled || state.enabled == enabled {
            return;
        }
        state.enabled = enabled;
        if enabled {
            if !state.in_flight && state.timer.is_none() {
                self.entry.arm(&mut state);
            }
        } else {
            self.entry.disarm(&mut state);
        }
    }

    /// Change the interval; an armed timer restarts with the new interval.
    pub fn set_interval(&self, interval: Duration) {
        let mut state = self.entry.state.lock();
        state.interval = interval.max(self.entry.min_interval);
        if state.timer.is_some() {
            self.entry.disarm(&mut state);
            self.entry.arm(&mut state);
        }
    }

    /// Whether an invocation is running.
    pub fn is_in_flight(&self) -> bool {
        self.entry.state.lock().in_flight
    }

    /// Current view of the subscription.
    pub fn snapshot(&self) -> PollingSubscription {
        let state = self.entry.state.lock();
        PollingSubscription {
            id: self.entry.id,
            name: self.entry.name.clone(),
            interval_ms: u64::try_from(state.interval.as_millis()).unwrap_or(u64::MAX),
            enabled: state.enabled,
            cancelled: state.cancelled,
            last_run_at: state.last_run_at,
            last_result: state.last_result,
            consecutive_failures: state.consecutive_failures,
        }
    }
}

impl<S: Spawn, T: Timer> Drop for PollHandle<S, T> {
    fn drop(&mut self) {
        self.entry.cancel();
    }
}

/// Creates and tracks polling subscriptions.
pub struct PollingScheduler<S: Spawn, T: Timer> {
    config: PollingConfig,
    spawner: S,
    timer: Arc<T>,
    connectivity: Option<Arc<ConnectivityMonitor>>,
    reporter: Option<Arc<dyn ErrorReporter>>,
    clock: Arc<dyn Clock>,
    next_id: AtomicU64,
    active: Mutex<HashMap<SubscriptionId, Weak<PollEntry<S, T>>>>,
}

impl<S: Spawn, T: Timer> PollingScheduler<S, T> {
    /// Create a scheduler.
    pub fn new(config: PollingConfig, spawner: S, timer: Arc<T>) -> Result<Self, ResilienceError> {
        config.validate().map_err(ResilienceError::InvalidConfig)?;
        Ok(Self {
            config,
            spawner,
            timer,
            connectivity: None,
            reporter: None,
            clock: Arc::new(SystemClock),
            next_id: AtomicU64::new(1),
            active: Mutex::new(HashMap::new()),
        })
    }

    /// Skip scheduled invocations while this monitor reports offline.
    #[must_use]
    pub fn with_connectivity(mut self, connectivity: Arc<ConnectivityMonitor>) -> Self {
        self.connectivity = Some(connectivity);
        self
    }

    /// Report failed invocations.
    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Use a custom clock for `last_run_at`.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Register a callback invoked every `options.interval`.
    ///
    /// The interval is clamped to the configured minimum.
    pub fn schedule<F, Fut>(&self, callback: F, options: PollOptions) -> PollHandle<S, T>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), PollFailure>> + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let callback: PollCallback = Arc::new(move || -> PollFuture { Box::pin(callback()) });
        let max_backoff = options
            .max_backoff
            .or_else(|| self.config.max_backoff_ms.map(Duration::from_millis));
        let entry = Arc::new(PollEntry {
            id,
            name: options.name,
            callback,
            min_interval: Duration::from_millis(self.config.min_interval_ms),
            state: Mutex::new(PollState {
                enabled: options.enabled,
                cancelled: false,
                interval: self.config.clamp_interval(options.interval),
                max_backoff,
                timer: None,
                generation: 0,
                in_flight: false,
                last_run_at: None,
                last_result: None,
                consecutive_failures: 0,
            }),
            spawner: self.spawner.clone(),
            timer: Arc::clone(&self.timer),
            connectivity: self.connectivity.clone(),
            reporter: self.reporter.clone(),
            clock: Arc::clone(&self.clock),
        });

        {
            let mut active = self.active.lock();
            active.retain(|_, weak| weak.upgrade().is_some_and(|e| !e.is_cancelled()));
            active.insert(id, Arc::downgrade(&entry));
        }

        let handle = PollHandle { entry };
        if options.immediate {
            handle.force_update();
        } else if options.enabled {
            let mut state = handle.entry.state.lock();
            handle.entry.arm(&mut state);
        }
        tracing::debug!("scheduled {} every {:?}", handle.entry.label(), options.interval);
        handle
    }

    /// Schedule with the configured default interval.
    pub fn schedule_default<F, Fut>(&self, callback: F) -> PollHandle<S, T>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), PollFailure>> + Send + 'static,
    {
        self.schedule(callback, PollOptions::every(self.config.default_interval()))
    }

    /// Cancel every live subscription.
    pub fn cancel_all(&self) {
        let entries: Vec<_> = self.active.lock().drain().map(|(_, weak)| weak).collect();
        for entry in entries.iter().filter_map(Weak::upgrade) {
            entry.cancel();
        }
    }

    /// Number of live, uncancelled subscriptions.
    pub fn active_count(&self) -> usize {
        self.active
            .lock()
            .values()
            .filter(|weak| weak.upgrade().is_some_and(|e| !e.is_cancelled()))
            .count()
    }
}
