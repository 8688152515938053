//! Local expiry timers, one per pending assignment.
//!
//! A timer and an explicit cancel race to remove the registry entry; the
//! loser does nothing. A fired timer therefore can't be aborted half-way
//! through its expiry, and a cancelled one never fires.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::AbortHandle;
use tracing::debug;

use crate::model::AssignmentId;

#[derive(Default)]
pub struct TimerRegistry {
    handles: Mutex<HashMap<AssignmentId, AbortHandle>>,
}

impl TimerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn handles(&self) -> MutexGuard<'_, HashMap<AssignmentId, AbortHandle>> {
        // A poisoned map is still a valid map.
        self.handles.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run `on_fire` after `delay` unless cancelled first. Replaces any
    /// timer already registered for `id`.
    pub fn schedule<F>(self: &Arc<Self>, id: AssignmentId, delay: Duration, on_fire: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let registry = Arc::clone(self);
        let mut handles = self.handles();
        // The entry is inserted before the lock is released, so the task
        // can't try to claim it before it exists.
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if registry.claim(id) {
                on_fire.await;
            }
        });
        if let Some(previous) = handles.insert(id, task.abort_handle()) {
            previous.abort();
        }
        debug!(assignment_id = %id, delay_secs = delay.as_secs(), "expiry timer scheduled");
    }

    /// Abort the timer for `id`. Returns false if none was pending, either
    /// because it never existed or because it already fired.
    pub fn cancel(&self, id: AssignmentId) -> bool {
        match self.handles().remove(&id) {
            Some(handle) => {
                handle.abort();
                debug!(assignment_id = %id, "expiry timer cancelled");
                true
            }
            None => false,
        }
    }

    /// Abort every timer.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<_> = self.handles().drain().collect();
        for (_, handle) in &drained {
            handle.abort();
        }
        drained.len()
    }

    pub fn is_scheduled(&self, id: AssignmentId) -> bool {
        self.handles().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.handles().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn claim(&self, id: AssignmentId) -> bool {
        self.handles().remove(&id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn fires_once_after_delay() {
        let timers = Arc::new(TimerRegistry::new());
        let fired = Arc::new(AtomicUsize::new(0));
        let id = AssignmentId::new();

        let f = Arc::clone(&fired);
        timers.schedule(id, Duration::from_secs(300), async move {
            f.fetch_add(1, Ordering::SeqCst);
        });
        assert!(timers.is_scheduled(id));

        tokio::time::sleep(Duration::from_secs(299)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!timers.is_scheduled(id));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_timer_never_fires() {
        let timers = Arc::new(TimerRegistry::new());
        let fired = Arc::new(AtomicUsize::new(0));
        let id = AssignmentId::new();

        let f = Arc::clone(&fired);
        timers.schedule(id, Duration::from_secs(60), async move {
            f.fetch_add(1, Ordering::SeqCst);
        });
        assert!(timers.cancel(id));
        assert!(!timers.cancel(id));

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(timers.is_empty());
    }
}
