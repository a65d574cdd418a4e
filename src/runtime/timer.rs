//! Tokio-backed timer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::AbortHandle;

use crate::core::{Timer, TimerCallback, TimerToken};

/// Timer that sleeps on a tokio task per armed callback.
///
/// An armed task removes its own token before firing, so a successful
/// [`Timer::cancel`] and a firing callback are mutually exclusive.
pub struct TokioTimer {
    handle: tokio::runtime::Handle,
    next: AtomicU64,
    armed: Arc<Mutex<HashMap<u64, AbortHandle>>>,
}

impl TokioTimer {
    /// Timer spawning on `handle`.
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self {
            handle,
            next: AtomicU64::new(1),
            armed: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Timer for the runtime the caller is running in.
    pub fn try_current() -> Result<Self, tokio::runtime::TryCurrentError> {
        tokio::runtime::Handle::try_current().map(Self::new)
    }

    /// Number of armed timers.
    pub fn pending(&self) -> usize {
        self.armed.lock().len()
    }
}

impl Timer for TokioTimer {
    fn after(&self, delay: Duration, callback: TimerCallback) -> TimerToken {
        let id = self.next.fetch_add(1, Ordering::Relaxed);
        let armed = Arc::clone(&self.armed);
        // Held across spawn so the task cannot look up its id before it is inserted.
        let mut map = self.armed.lock();
        let task = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            let owned = armed.lock().remove(&id).is_some();
            if owned {
                callback();
            }
        });
        map.insert(id, task.abort_handle());
        TimerToken(id)
    }

    fn cancel(&self, token: TimerToken) -> bool {
        let removed = self.armed.lock().remove(&token.0);
        removed.is_some_and(|handle| {
            handle.abort();
            true
        })
    }
}

impl Drop for TokioTimer {
    fn drop(&mut self) {
        for (_, handle) in self.armed.lock().drain() {
            handle.abort();
        }
    }
}
