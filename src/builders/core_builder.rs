//! Wires the four components around one store, one transport and one runtime.

use std::path::Path;
use std::sync::Arc;

use crate::config::ResilienceConfig;
use crate::core::{
    CaptureHooks, ConnectivityMonitor, ErrorAggregator, ErrorReporter, KeyValueStore, OfflineQueue,
    PollingScheduler, ProbeLoop, ReachabilityProbe, ResilienceError, Spawn, Timer, Transport,
};
use crate::infra::{FileStore, InMemoryStore};
use crate::runtime::CoreStatus;
use crate::util::{Clock, SystemClock};

/// Number of records included in [`CoreStatus::recent_errors`].
pub const STATUS_RECENT_ERRORS: usize = 10;

/// Builder for [`ResilienceCore`].
pub struct ResilienceCoreBuilder<S: Spawn, T: Timer> {
    config: ResilienceConfig,
    spawner: S,
    timer: Arc<T>,
    transport: Option<Arc<dyn Transport>>,
    store: Option<Arc<dyn KeyValueStore>>,
    hooks: Option<Arc<dyn CaptureHooks>>,
    probe: Option<Arc<dyn ReachabilityProbe>>,
    clock: Option<Arc<dyn Clock>>,
    initially_online: Option<bool>,
}

impl<S: Spawn, T: Timer> ResilienceCoreBuilder<S, T> {
    /// Start a builder on the given runtime seams.
    pub fn new(config: ResilienceConfig, spawner: S, timer: Arc<T>) -> Self {
        Self {
            config,
            spawner,
            timer,
            transport: None,
            store: None,
            hooks: None,
            probe: None,
            clock: None,
            initially_online: None,
        }
    }

    /// Transport used for queued replays. Required.
    #[must_use]
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Backing store; defaults to an [`InMemoryStore`].
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Persist to a [`FileStore`] rooted at `path`.
    pub fn with_store_dir(self, path: impl AsRef<Path>) -> Result<Self, ResilienceError> {
        let store = FileStore::new(path)?;
        Ok(self.with_store(Arc::new(store)))
    }

    /// Global capture hooks; without them the error service only records explicit reports.
    #[must_use]
    pub fn with_hooks(mut self, hooks: Arc<dyn CaptureHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    /// Reachability probe gating online transitions.
    #[must_use]
    pub fn with_probe(mut self, probe: Arc<dyn ReachabilityProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Clock shared by every component.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Host's current online signal; defaults to `connectivity.assume_online`.
    #[must_use]
    pub const fn initially_online(mut self, online: bool) -> Self {
        self.initially_online = Some(online);
        self
    }

    /// Validate configuration and wire the components.
    pub fn build(self) -> Result<ResilienceCore<S, T>, ResilienceError> {
        self.config
            .validate()
            .map_err(|e| ResilienceError::InvalidConfig(format!("config invalid: {e}")))?;
        let transport = self
            .transport
            .ok_or_else(|| ResilienceError::InvalidConfig("a transport is required".into()))?;
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryStore::new()));
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let online = self
            .initially_online
            .unwrap_or(self.config.connectivity.assume_online);

        let mut monitor = ConnectivityMonitor::new(online).with_clock(Arc::clone(&clock));
        let has_probe = self.probe.is_some();
        if let Some(probe) = self.probe {
            monitor = monitor.with_probe(probe);
        }
        let connectivity = Arc::new(monitor);

        let errors = Arc::new(
            ErrorAggregator::new(
                self.config.errors.clone(),
                self.config.error_namespace(),
                Arc::clone(&store),
            )?
            .with_clock(Arc::clone(&clock)),
        );
        if let Some(hooks) = &self.hooks {
            errors.initialize(hooks.as_ref());
        }
        let reporter: Arc<dyn ErrorReporter> = errors.clone();

        let queue = OfflineQueue::new(
            self.config.queue.clone(),
            self.config.queue_namespace(),
            transport,
            Arc::clone(&store),
            Arc::clone(&connectivity),
            self.spawner.clone(),
        )?
        .with_reporter(Arc::clone(&reporter))
        .with_clock(Arc::clone(&clock));
        queue.attach();

        let scheduler = PollingScheduler::new(
            self.config.polling.clone(),
            self.spawner.clone(),
            Arc::clone(&self.timer),
        )?
        .with_connectivity(Arc::clone(&connectivity))
        .with_reporter(reporter)
        .with_clock(clock);

        // A probe-gated monitor only goes online through the probe loop.
        let probe_loop = has_probe.then(|| {
            connectivity.start_probing(
                Arc::clone(&self.timer),
                self.spawner.clone(),
                self.config.connectivity.probe_interval(),
            )
        });

        tracing::info!(
            "resilience core ready (online: {online}, queued: {}, stored errors: {})",
            queue.status().total,
            errors.stats().records
        );

        Ok(ResilienceCore {
            config: self.config,
            connectivity,
            errors,
            queue,
            scheduler,
            hooks: self.hooks,
            probe_loop,
        })
    }
}

#[cfg(feature = "tokio-runtime")]
impl ResilienceCoreBuilder<crate::runtime::TokioSpawner, crate::runtime::TokioTimer> {
    /// Builder on the tokio runtime the caller is running in.
    pub fn tokio(config: ResilienceConfig) -> Result<Self, ResilienceError> {
        let spawner = crate::runtime::TokioSpawner::try_current()
            .map_err(|e| ResilienceError::InvalidConfig(format!("no tokio runtime: {e}")))?;
        let timer = crate::runtime::TokioTimer::new(spawner.handle().clone());
        Ok(Self::new(config, spawner, Arc::new(timer)))
    }
}

/// The wired resiliency core.
pub struct ResilienceCore<S: Spawn, T: Timer> {
    config: ResilienceConfig,
    connectivity: Arc<ConnectivityMonitor>,
    errors: Arc<ErrorAggregator>,
    queue: OfflineQueue<S>,
    scheduler: PollingScheduler<S, T>,
    hooks: Option<Arc<dyn CaptureHooks>>,
    probe_loop: Option<ProbeLoop>,
}

impl<S: Spawn, T: Timer> ResilienceCore<S, T> {
    /// Active configuration.
    pub const fn config(&self) -> &ResilienceConfig {
        &self.config
    }

    /// Connectivity monitor; feed host signals through it.
    pub const fn connectivity(&self) -> &Arc<ConnectivityMonitor> {
        &self.connectivity
    }

    /// Error aggregation service.
    pub const fn errors(&self) -> &Arc<ErrorAggregator> {
        &self.errors
    }

    /// Offline request queue.
    pub const fn queue(&self) -> &OfflineQueue<S> {
        &self.queue
    }

    /// Polling scheduler.
    pub const fn scheduler(&self) -> &PollingScheduler<S, T> {
        &self.scheduler
    }

    /// Capture hooks the error service was initialized with.
    pub fn hooks(&self) -> Option<&Arc<dyn CaptureHooks>> {
        self.hooks.as_ref()
    }

    /// Snapshot for dashboard badges.
    pub fn status(&self) -> CoreStatus {
        CoreStatus {
            online: self.connectivity.is_online(),
            queue: self.queue.status(),
            draining: self.queue.is_draining(),
            errors: self.errors.stats(),
            recent_errors: self.errors.recent_errors(STATUS_RECENT_ERRORS),
            active_polls: self.scheduler.active_count(),
        }
    }

    /// Stop probing and polling, detach the queue and remove the capture handlers.
    ///
    /// Persisted queue entries and error records are kept.
    pub fn shutdown(&mut self) {
        if let Some(probe_loop) = self.probe_loop.take() {
            probe_loop.cancel();
        }
        self.scheduler.cancel_all();
        self.queue.detach();
        self.errors.destroy();
        tracing::info!("resilience core shut down");
    }
}
