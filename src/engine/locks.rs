//! Per-order async locks.
//!
//! Cascades and withdrawals for one order run one at a time within this
//! process. Entries are dropped when the last holder or waiter lets go.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::model::OrderId;

type Slot = Arc<AsyncMutex<()>>;

#[derive(Default)]
pub struct OrderLocks {
    slots: Mutex<HashMap<OrderId, Slot>>,
}

/// Held while an order is being worked on.
pub struct OrderGuard<'a> {
    locks: &'a OrderLocks,
    order_id: OrderId,
    slot: Slot,
    guard: Option<OwnedMutexGuard<()>>,
}

impl OrderLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<OrderId, Slot>> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub async fn lock(&self, order_id: OrderId) -> OrderGuard<'_> {
        let slot = Arc::clone(self.slots().entry(order_id).or_default());
        let guard = Arc::clone(&slot).lock_owned().await;
        OrderGuard {
            locks: self,
            order_id,
            slot,
            guard: Some(guard),
        }
    }

    /// Orders with a live lock entry.
    pub fn len(&self) -> usize {
        self.slots().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for OrderGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut slots = self.locks.slots();
        // Map plus this guard's clone: nobody else is waiting.
        if Arc::strong_count(&self.slot) == 2 {
            slots.remove(&self.order_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn entries_are_released() {
        let locks = OrderLocks::new();
        let id = OrderId::new();
        {
            let _g = locks.lock(id).await;
            assert_eq!(locks.len(), 1);
        }
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn second_locker_waits() {
        let locks = Arc::new(OrderLocks::new());
        let id = OrderId::new();
        let first = locks.lock(id).await;

        let l = Arc::clone(&locks);
        let waiter = tokio::spawn(async move {
            let _g = l.lock(id).await;
        });
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        drop(first);
        waiter.await.unwrap();
        assert!(locks.is_empty());
    }
}
