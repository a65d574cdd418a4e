//! Runtime seams: task spawning and cancellable timers.

use std::future::Future;
use std::time::Duration;

/// Abstraction for spawning task execution on a runtime.
pub trait Spawn: Clone + Send + Sync + 'static {
    /// Spawn an async task that returns a future.
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static;
}

/// Callback fired by a [`Timer`].
pub type TimerCallback = Box<dyn FnOnce() + Send + 'static>;

/// Handle identifying one armed timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerToken(pub u64);

/// One-shot timer facility.
///
/// After [`Timer::cancel`] returns `true` the callback is guaranteed not to
/// run. Implementations must never invoke the callback synchronously from
/// inside [`Timer::after`].
pub trait Timer: Send + Sync + 'static {
    /// Run `callback` once after `delay`.
    fn after(&self, delay: Duration, callback: TimerCallback) -> TimerToken;
    /// Disarm a timer. Returns `false` if it already fired or was cancelled.
    fn cancel(&self, token: TimerToken) -> bool;
}
