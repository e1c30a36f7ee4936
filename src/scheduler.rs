//! Debounce timer abstraction.
//!
//! The source relies on a host timer and a process-wide profiler; neither
//! fits a library meant to be embedded without opinions about its runtime.
//! Instead of a global spawner singleton (as in the async-spawner pattern
//! this crate's lineage otherwise follows), every [`crate::loader::TileLoader`]
//! takes its `Scheduler` by constructor injection, so a host can supply a
//! tokio-backed clock in production and a deterministic, manually-advanced
//! one in tests.

use std::time::Duration;

/// Opaque handle to an armed timer, returned by [`Scheduler::arm`].
pub type TimerHandle = u64;

/// A source of delayed callbacks. Implementors own how (or whether) time
/// actually passes.
pub trait Scheduler: Send + Sync {
    /// Arms a one-shot timer that invokes `callback` after `delay`.
    fn arm(&self, delay: Duration, callback: Box<dyn FnOnce() + Send>) -> TimerHandle;

    /// Cancels a previously armed timer. A no-op if it already fired or
    /// was already cancelled.
    fn cancel(&self, handle: TimerHandle);
}

#[cfg(feature = "tokio-runtime")]
pub mod tokio_scheduler {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::{Arc, Mutex};
    use std::collections::HashMap;

    /// Production [`Scheduler`] backed by `tokio::time::sleep` and
    /// `tokio::spawn`. Requires a running tokio runtime.
    ///
    /// `callback` fires on whatever tokio worker thread happens to pick up
    /// the spawned task, not necessarily the thread that called `arm` or
    /// `process_queue`. Nothing here marshals it onto a single "control"
    /// thread; callers on the [`crate::loader::TileLoader`] side are
    /// expected to be safe to invoke from any thread, which is why its
    /// locking always acquires `state` before `cache` and never holds both
    /// across an await or callback boundary.
    #[derive(Clone, Default)]
    pub struct TokioScheduler {
        next_id: Arc<AtomicU64>,
        cancelled: Arc<Mutex<HashMap<TimerHandle, bool>>>,
    }

    impl TokioScheduler {
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl Scheduler for TokioScheduler {
        fn arm(&self, delay: Duration, callback: Box<dyn FnOnce() + Send>) -> TimerHandle {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            self.cancelled.lock().unwrap().insert(id, false);
            let cancelled = self.cancelled.clone();

            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let mut guard = cancelled.lock().unwrap();
                let is_cancelled = guard.remove(&id).unwrap_or(false);
                drop(guard);
                if !is_cancelled {
                    callback();
                }
            });

            id
        }

        fn cancel(&self, handle: TimerHandle) {
            if let Some(flag) = self.cancelled.lock().unwrap().get_mut(&handle) {
                *flag = true;
            }
        }
    }
}

#[cfg(feature = "tokio-runtime")]
pub use tokio_scheduler::TokioScheduler;

/// Deterministic scheduler for tests: `arm` records the callback instead
/// of delaying it, and [`ManualScheduler::advance`] fires everything whose
/// delay has elapsed in virtual time.
#[derive(Default)]
pub struct ManualScheduler {
    inner: std::sync::Mutex<ManualInner>,
}

#[derive(Default)]
struct ManualInner {
    next_id: TimerHandle,
    pending: Vec<(TimerHandle, Duration, Option<Box<dyn FnOnce() + Send>>)>,
    now: Duration,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advances virtual time by `by` and fires every timer whose deadline
    /// has been reached, in the order they were armed.
    pub fn advance(&self, by: Duration) {
        let mut to_fire = Vec::new();
        {
            let mut inner = self.inner.lock().unwrap();
            inner.now += by;
            let now = inner.now;
            for entry in inner.pending.iter_mut() {
                if entry.1 <= now {
                    if let Some(cb) = entry.2.take() {
                        to_fire.push(cb);
                    }
                }
            }
            inner.pending.retain(|(_, _, cb)| cb.is_some());
        }
        for cb in to_fire {
            cb();
        }
    }
}

impl Scheduler for ManualScheduler {
    fn arm(&self, delay: Duration, callback: Box<dyn FnOnce() + Send>) -> TimerHandle {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_id;
        inner.next_id += 1;
        let deadline = inner.now + delay;
        inner.pending.push((id, deadline, Some(callback)));
        id
    }

    fn cancel(&self, handle: TimerHandle) {
        let mut inner = self.inner.lock().unwrap();
        inner.pending.retain(|(id, _, _)| *id != handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn manual_scheduler_fires_after_advance() {
        let scheduler = ManualScheduler::new();
        let fired = Arc::new(AtomicBool::new(false));
        let fired_clone = fired.clone();
        scheduler.arm(Duration::from_millis(50), Box::new(move || {
            fired_clone.store(true, Ordering::SeqCst);
        }));
        scheduler.advance(Duration::from_millis(49));
        assert!(!fired.load(Ordering::SeqCst));
        scheduler.advance(Duration::from_millis(1));
        assert!(fired.load(Ordering::SeqCst));
    }

    #[test]
    fn manual_scheduler_cancel_prevents_fire() {
        let scheduler = ManualScheduler::new();
        let fired = Arc::new(AtomicBool::new(false));
        let fired_clone = fired.clone();
        let handle = scheduler.arm(Duration::from_millis(50), Box::new(move || {
            fired_clone.store(true, Ordering::SeqCst);
        }));
        scheduler.cancel(handle);
        scheduler.advance(Duration::from_millis(100));
        assert!(!fired.load(Ordering::SeqCst));
    }
}
