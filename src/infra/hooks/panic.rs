//! Capture hooks backed by the process panic hook.

use std::panic::{self, PanicHookInfo};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::{
    CaptureHooks, RejectionHandler, UncaughtError, UncaughtHandler, UnhandledRejection,
};
use crate::util::{ListenerSet, Subscription};

type PreviousHook = Arc<Box<dyn Fn(&PanicHookInfo<'_>) + Sync + Send + 'static>>;

/// Reports every panic as an uncaught error, then defers to the previous hook.
///
/// Panics later caught by a component (a polling callback, a transport) still
/// pass through the hook. Rejections have no native source and are raised with
/// [`PanicHooks::raise_rejection`], typically from a task supervisor.
///
/// Handlers run synchronously on the panicking thread, possibly while that
/// thread holds a lock. They must not block on locks the panicking code may
/// hold; the error service captures through
/// [`ErrorAggregator::try_capture`](crate::core::ErrorAggregator::try_capture)
/// for this reason.
pub struct PanicHooks {
    uncaught: Arc<ListenerSet<UncaughtError>>,
    rejections: Arc<ListenerSet<UnhandledRejection>>,
    previous: Mutex<Option<PreviousHook>>,
}

impl Default for PanicHooks {
    fn default() -> Self {
        Self::new()
    }
}

impl PanicHooks {
    /// Create hooks; nothing is installed until [`PanicHooks::install`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            uncaught: ListenerSet::new(),
            rejections: ListenerSet::new(),
            previous: Mutex::new(None),
        }
    }

    /// Chain onto the process panic hook. Returns `false` if already installed.
    pub fn install(&self) -> bool {
        let mut previous = self.previous.lock();
        if previous.is_some() {
            return false;
        }
        let prev: PreviousHook = Arc::new(panic::take_hook());
        let chained = Arc::clone(&prev);
        let uncaught = Arc::clone(&self.uncaught);
        panic::set_hook(Box::new(move |info| {
            uncaught.emit(&uncaught_from(info));
            (*chained)(info);
        }));
        *previous = Some(prev);
        true
    }

    /// Restore the hook that was active before [`PanicHooks::install`].
    pub fn uninstall(&self) {
        if let Some(prev) = self.previous.lock().take() {
            drop(panic::take_hook());
            panic::set_hook(Box::new(move |info| (*prev)(info)));
        }
    }

    /// Deliver an unhandled rejection to every handler.
    pub fn raise_rejection(&self, rejection: &UnhandledRejection) -> usize {
        self.rejections.emit(rejection)
    }
}

impl Drop for PanicHooks {
    fn drop(&mut self) {
        self.uninstall();
    }
}

impl CaptureHooks for PanicHooks {
    fn on_uncaught(&self, handler: UncaughtHandler) -> Subscription {
        self.uncaught.subscribe(handler)
    }

    fn on_unhandled_rejection(&self, handler: RejectionHandler) -> Subscription {
        self.rejections.subscribe(handler)
    }
}

fn uncaught_from(info: &PanicHookInfo<'_>) -> UncaughtError {
    let payload = info.payload();
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "panic with non-string payload".to_string());
    let mut error = UncaughtError::new(message);
    if let Some(location) = info.location() {
        error.source = Some(location.file().to_string());
        error.line = Some(location.line());
        error.column = Some(location.column());
    }
    error.stack = std::thread::current().name().map(|n| format!("thread '{n}'"));
    error
}
