//! Connectivity monitor.
//!
//! Tracks the effective online/offline state from two inputs: the host's native
//! online/offline signal and an optional reachability probe. The native signal
//! going offline always takes effect; going online only takes effect directly
//! when no probe is configured. With a probe, the monitor stays offline until a
//! probe succeeds, which filters out captive portals and similar false
//! positives. Listeners are notified on transitions only, in the order the
//! transitions happened; a listener may feed a new signal re-entrantly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, ReentrantMutex};

use crate::core::spawn::{Spawn, Timer, TimerToken};
use crate::util::{Clock, Listener, ListenerSet, Subscription, SystemClock, TimestampMs};

/// A connectivity transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectivityEvent {
    /// New effective state.
    pub online: bool,
    /// When the transition happened.
    pub at_ms: TimestampMs,
}

/// Lightweight check that the network is actually usable.
///
/// Failures are expressed as `false`; a probe never errors.
#[async_trait]
pub trait ReachabilityProbe: Send + Sync + 'static {
    /// Return `true` if the backend is reachable.
    async fn probe(&self) -> bool;
}

/// Runtime observer of connectivity. Holds no persisted state.
pub struct ConnectivityMonitor {
    online: AtomicBool,
    signal_online: AtomicBool,
    probe: Option<Arc<dyn ReachabilityProbe>>,
    listeners: Arc<ListenerSet<ConnectivityEvent>>,
    transition: ReentrantMutex<()>,
    clock: Arc<dyn Clock>,
}

impl ConnectivityMonitor {
    /// Create a monitor seeded with the host's current signal.
    #[must_use]
    pub fn new(initially_online: bool) -> Self {
        Self {
            online: AtomicBool::new(initially_online),
            signal_online: AtomicBool::new(initially_online),
            probe: None,
            listeners: ListenerSet::new(),
            transition: ReentrantMutex::new(()),
            clock: Arc::new(SystemClock),
        }
    }

    /// Gate online transitions on a reachability probe.
    #[must_use]
    pub fn with_probe(mut self, probe: Arc<dyn ReachabilityProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Use a custom clock for event timestamps.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Current effective state.
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }

    /// Last value of the native signal, regardless of probing.
    pub fn signal_online(&self) -> bool {
        self.signal_online.load(Ordering::Acquire)
    }

    /// Subscribe to transitions.
    pub fn subscribe(&self, listener: Listener<ConnectivityEvent>) -> Subscription {
        self.listeners.subscribe(listener)
    }

    /// Feed the native online/offline signal.
    ///
    /// Returns `true` if the effective state changed. With a probe configured,
    /// an online signal only records intent; [`ConnectivityMonitor::check`]
    /// performs the transition once the probe succeeds.
    pub fn handle_signal(&self, online: bool) -> bool {
        self.signal_online.store(online, Ordering::Release);
        if !online {
            return self.set_state(false);
        }
        if self.probe.is_none() {
            return self.set_state(true);
        }
        tracing::debug!("online signal received; awaiting reachability probe");
        false
    }

    /// Run the probe once and apply its result. Returns the effective state.
    pub async fn check(&self) -> bool {
        let Some(probe) = self.probe.clone() else {
            return self.is_online();
        };
        if !self.signal_online() {
            return false;
        }
        if probe.probe().await {
            if self.signal_online() {
                self.set_state(true);
            }
        } else {
            tracing::debug!("reachability probe failed; staying offline");
        }
        self.is_online()
    }

    /// Periodically run [`ConnectivityMonitor::check`] while the native signal
    /// says online but the monitor is still offline.
    pub fn start_probing<S, T>(self: &Arc<Self>, timer: Arc<T>, spawner: S, interval: Duration) -> ProbeLoop
    where
        S: Spawn,
        T: Timer,
    {
        let state = Arc::new(ProbeLoopState {
            cancelled: AtomicBool::new(false),
            token: Mutex::new(None),
        });
        arm_probe(Arc::downgrade(self), timer.clone(), spawner, interval, Arc::clone(&state));
        ProbeLoop {
            state,
            cancel_timer: Box::new(move |token| {
                timer.cancel(token);
            }),
        }
    }

    fn set_state(&self, online: bool) -> bool {
        // Held through emission so concurrent transitions are delivered in swap order.
        let _guard = self.transition.lock();
        if self.online.swap(online, Ordering::AcqRel) == online {
            return false;
        }
        let event = ConnectivityEvent {
            online,
            at_ms: self.clock.now_ms(),
        };
        if online {
            tracing::info!("connectivity restored");
        } else {
            tracing::warn!("connectivity lost");
        }
        self.listeners.emit(&event);
        true
    }
}

struct ProbeLoopState {
    cancelled: AtomicBool,
    token: Mutex<Option<TimerToken>>,
}

fn arm_probe<S, T>(
    monitor: Weak<ConnectivityMonitor>,
    timer: Arc<T>,
    spawner: S,
    interval: Duration,
    state: Arc<ProbeLoopState>,
) where
    S: Spawn,
    T: Timer,
{
    let mut slot = state.token.lock();
    if state.cancelled.load(Ordering::Acquire) {
        return;
    }
    let fire_state = Arc::clone(&state);
    let fire_timer = Arc::clone(&timer);
    let token = timer.after(
        interval,
        Box::new(move || {
            if fire_state.cancelled.load(Ordering::Acquire) {
                return;
            }
            let Some(m) = monitor.upgrade() else {
                return;
            };
            let next_monitor = Arc::downgrade(&m);
            let next_spawner = spawner.clone();
            spawner.spawn(async move {
                if m.signal_online() && !m.is_online() {
                    m.check().await;
                }
                drop(m);
                arm_probe(next_monitor, fire_timer, next_spawner, interval, fire_state);
            });
        }),
    );
    *slot = Some(token);
}

/// Handle of a running probe loop; cancelling stops further probes.
pub struct ProbeLoop {
    state: Arc<ProbeLoopState>,
    cancel_timer: Box<dyn Fn(TimerToken) + Send + Sync>,
}

impl ProbeLoop {
    /// Stop probing. Idempotent.
    pub fn cancel(&self) {
        let mut slot = self.state.token.lock();
        self.state.cancelled.store(true, Ordering::Release);
        if let Some(token) = slot.take() {
            (self.cancel_timer)(token);
        }
    }
}

impl Drop for ProbeLoop {
    fn drop(&mut self) {
        self.cancel();
    }
}
