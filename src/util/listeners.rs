//! Listener registry shared by the connectivity monitor, the error service and
//! the capture-hook adapters.
//!
//! Emission takes a snapshot of the registered listeners and invokes them with
//! the lock released, so a listener may subscribe or unsubscribe re-entrantly.
//! A panicking listener is logged and skipped; it never unwinds into the emitter.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

/// Shared listener callback.
pub type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Ordered set of listeners for events of type `T`.
pub struct ListenerSet<T> {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(u64, Listener<T>)>>,
}

impl<T: 'static> ListenerSet<T> {
    /// Create an empty, shareable listener set.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicU64::new(1),
            listeners: Mutex::new(Vec::new()),
        })
    }

    /// Register a listener and return the handle that removes it.
    pub fn subscribe(self: &Arc<Self>, listener: Listener<T>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().push((id, listener));
        let weak: Weak<Self> = Arc::downgrade(self);
        Subscription::new(move || {
            if let Some(set) = weak.upgrade() {
                set.remove(id);
            }
        })
    }

    /// Invoke every listener registered at the time of the call.
    ///
    /// Returns the number of listeners that completed without panicking.
    pub fn emit(&self, event: &T) -> usize {
        let snapshot: Vec<Listener<T>> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();

        let mut delivered = 0;
        for listener in snapshot {
            match catch_unwind(AssertUnwindSafe(|| (*listener)(event))) {
                Ok(()) => delivered += 1,
                Err(_) => tracing::error!("listener panicked; continuing with remaining listeners"),
            }
        }
        delivered
    }

    /// Remove every listener.
    pub fn clear(&self) {
        self.listeners.lock().clear();
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Whether no listener is registered.
    pub fn is_empty(&self) -> bool {
        self.listeners.lock().is_empty()
    }

    fn remove(&self, id: u64) {
        self.listeners.lock().retain(|(existing, _)| *existing != id);
    }
}

/// Handle returned by every `subscribe`/`on_*` call.
///
/// Dropping the handle keeps the listener registered; call
/// [`Subscription::unsubscribe`] to remove it.
pub struct Subscription {
    remove: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// Build a subscription from its removal action.
    pub fn new(remove: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            remove: Some(Box::new(remove)),
        }
    }

    /// Remove the listener. Idempotent with respect to the owning set: the
    /// set may already be gone or cleared.
    pub fn unsubscribe(mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.remove.is_some())
            .finish()
    }
}
