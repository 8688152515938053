//! Outbound offer notifications.
//!
//! Delivery is best-effort. The engine never waits on it and never
//! retries; a master who misses a push still sees the offer on next poll.

use async_trait::async_trait;
use tracing::info;

use crate::disclosure::AssignmentView;
use crate::model::UserId;

/// Pushes an offer to a master's devices.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Returns whether the payload was handed off.
    async fn notify(&self, master_user_id: UserId, payload: &AssignmentView) -> bool;
}

/// Writes offers to the log. For local runs without a push gateway.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, master_user_id: UserId, payload: &AssignmentView) -> bool {
        info!(
            user_id = %master_user_id,
            assignment_id = %payload.assignment_id(),
            restricted = payload.is_restricted(),
            "offer notification"
        );
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disclosure::filter;
    use crate::model::{Assignment, MasterId, Order};
    use chrono::{Duration, Utc};

    #[tokio::test]
    async fn log_notifier_always_hands_off() {
        let order = Order::new("kettle", "no power", "Client");
        let a = Assignment::pending(order.id, MasterId::new(), 1, Utc::now(), Duration::minutes(5));
        assert!(LogNotifier.notify(UserId::new(), &filter(&a, &order, false)).await);
    }
}
