//! Hooks raised explicitly by the host or by tests.

use std::sync::Arc;

use crate::core::{
    CaptureHooks, RejectionHandler, UncaughtError, UncaughtHandler, UnhandledRejection,
};
use crate::util::{ListenerSet, Subscription};

/// Capture hooks driven by explicit `raise_*` calls.
///
/// Bridges hosts that already observe global failures (a wasm `onerror`
/// closure, a supervisor catching task errors) into the error service.
pub struct ManualHooks {
    uncaught: Arc<ListenerSet<UncaughtError>>,
    rejections: Arc<ListenerSet<UnhandledRejection>>,
}

impl Default for ManualHooks {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualHooks {
    /// Create hooks with no handlers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            uncaught: ListenerSet::new(),
            rejections: ListenerSet::new(),
        }
    }

    /// Deliver an uncaught error to every handler. Returns the number notified.
    pub fn raise_uncaught(&self, error: &UncaughtError) -> usize {
        self.uncaught.emit(error)
    }

    /// Deliver an unhandled rejection to every handler. Returns the number notified.
    pub fn raise_rejection(&self, rejection: &UnhandledRejection) -> usize {
        self.rejections.emit(rejection)
    }

    /// Registered uncaught-error handlers.
    pub fn uncaught_handlers(&self) -> usize {
        self.uncaught.len()
    }

    /// Registered rejection handlers.
    pub fn rejection_handlers(&self) -> usize {
        self.rejections.len()
    }
}

impl CaptureHooks for ManualHooks {
    fn on_uncaught(&self, handler: UncaughtHandler) -> Subscription {
        self.uncaught.subscribe(handler)
    }

    fn on_unhandled_rejection(&self, handler: RejectionHandler) -> Subscription {
        self.rejections.subscribe(handler)
    }
}
