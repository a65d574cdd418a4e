//! Deterministic timer and clock for tests and simulations.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use parking_lot::Mutex;

use crate::core::{Timer, TimerCallback, TimerToken};
use crate::util::{Clock, TimestampMs};

struct ManualState {
    now_ms: TimestampMs,
    seq: u64,
    queue: BTreeMap<(TimestampMs, u64), TimerCallback>,
    due: HashMap<u64, TimestampMs>,
}

/// Virtual clock whose timers fire only from [`ManualTimer::advance`].
///
/// Also implements [`Clock`], so record timestamps and timer deadlines share
/// one time source. Callbacks run outside the internal lock and may arm new
/// timers; those fire in the same `advance` call if they fall due.
pub struct ManualTimer {
    state: Mutex<ManualState>,
}

impl Default for ManualTimer {
    fn default() -> Self {
        Self::new(0)
    }
}

impl ManualTimer {
    /// Create a timer starting at `start_ms`.
    #[must_use]
    pub fn new(start_ms: TimestampMs) -> Self {
        Self {
            state: Mutex::new(ManualState {
                now_ms: start_ms,
                seq: 0,
                queue: BTreeMap::new(),
                due: HashMap::new(),
            }),
        }
    }

    /// Move time forward, firing due callbacks in deadline order. Returns the number fired.
    pub fn advance(&self, by: Duration) -> usize {
        let target = {
            let state = self.state.lock();
            state.now_ms.saturating_add(duration_ms(by))
        };
        let mut fired = 0;
        loop {
            let callback = {
                let mut state = self.state.lock();
                let next = state.queue.keys().next().copied();
                match next {
                    Some((due, seq)) if due <= target => {
                        state.due.remove(&seq);
                        state.now_ms = state.now_ms.max(due);
                        state.queue.remove(&(due, seq))
                    }
                    _ => {
                        state.now_ms = target;
                        None
                    }
                }
            };
            let Some(callback) = callback else {
                break;
            };
            callback();
            fired += 1;
        }
        fired
    }

    /// Set the clock without firing anything.
    pub fn set_now(&self, now_ms: TimestampMs) {
        self.state.lock().now_ms = now_ms;
    }

    /// Number of armed timers.
    pub fn pending(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Deadline of the earliest armed timer.
    pub fn next_deadline(&self) -> Option<TimestampMs> {
        self.state.lock().queue.keys().next().map(|(due, _)| *due)
    }
}

impl Timer for ManualTimer {
    fn after(&self, delay: Duration, callback: TimerCallback) -> TimerToken {
        let mut state = self.state.lock();
        state.seq += 1;
        let seq = state.seq;
        let due = state.now_ms.saturating_add(duration_ms(delay));
        state.queue.insert((due, seq), callback);
        state.due.insert(seq, due);
        TimerToken(seq)
    }

    fn cancel(&self, token: TimerToken) -> bool {
        let mut state = self.state.lock();
        match state.due.remove(&token.0) {
            Some(due) => state.queue.remove(&(due, token.0)).is_some(),
            None => false,
        }
    }
}

impl Clock for ManualTimer {
    fn now_ms(&self) -> TimestampMs {
        self.state.lock().now_ms
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counter(hits: &Arc<AtomicUsize>) -> TimerCallback {
        let hits = Arc::clone(hits);
        Box::new(move || {
            hits.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_fires_in_deadline_order_and_moves_clock() {
        let timer = ManualTimer::new(1_000);
        let order = Arc::new(Mutex::new(Vec::new()));
        for (delay, tag) in [(30, "c"), (10, "a"), (20, "b")] {
            let order = Arc::clone(&order);
            timer.after(Duration::from_millis(delay), Box::new(move || order.lock().push(tag)));
        }

        assert_eq!(timer.advance(Duration::from_millis(15)), 1);
        assert_eq!(timer.now_ms(), 1_015);
        assert_eq!(timer.advance(Duration::from_millis(100)), 2);
        assert_eq!(*order.lock(), vec!["a", "b", "c"]);
        assert_eq!(timer.now_ms(), 1_115);
    }

    #[test]
    fn test_cancel_prevents_firing() {
        let timer = ManualTimer::default();
        let hits = Arc::new(AtomicUsize::new(0));
        let token = timer.after(Duration::from_millis(5), counter(&hits));
        assert!(timer.cancel(token));
        assert!(!timer.cancel(token));
        assert_eq!(timer.advance(Duration::from_secs(1)), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_callback_may_rearm() {
        let timer = Arc::new(ManualTimer::default());
        let hits = Arc::new(AtomicUsize::new(0));
        let rearm_timer = Arc::clone(&timer);
        let rearm_hits = Arc::clone(&hits);
        timer.after(
            Duration::from_millis(10),
            Box::new(move || {
                rearm_hits.fetch_add(1, Ordering::SeqCst);
                rearm_timer.after(Duration::from_millis(10), counter(&rearm_hits));
            }),
        );
        assert_eq!(timer.advance(Duration::from_millis(25)), 2);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(timer.pending(), 0);
    }
}
