//! Reconciliation sweep: expire overdue offers whose timers were lost.
//!
//! Timers live in process memory and die with it. The sweep finds pending
//! rows past their deadline and runs them through the same CAS and cascade
//! the timer would have, so running it while timers are live is harmless.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use tracing::{error, info, warn};

use super::lifecycle::{Dispatcher, Trigger};
use crate::error::Result;
use crate::model::OrderId;
use crate::telemetry::metrics;

impl Dispatcher {
    /// Expire every pending assignment overdue at `now` whose order is still
    /// `new`, then cascade each affected order once. Returns how many
    /// assignments this pass expired.
    ///
    /// Per-row and per-order failures are logged and the pass moves on;
    /// only failing to list overdue rows is an error.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<usize> {
        let overdue = self.store.list_overdue_pending(now).await?;
        let mut expired = 0;
        let mut orders: BTreeSet<OrderId> = BTreeSet::new();

        for assignment in overdue {
            match self.try_expire(assignment.id, Trigger::Sweep).await {
                Ok(Some(order_id)) => {
                    expired += 1;
                    orders.insert(order_id);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(assignment_id = %assignment.id, error = %e, "sweep could not expire offer");
                }
            }
        }

        for order_id in &orders {
            if let Err(e) = self.cascade(*order_id, "sweep").await {
                warn!(%order_id, error = %e, "sweep cascade failed, order left for next pass");
            }
        }

        if expired > 0 {
            metrics::sweep_expired().add(expired as u64, &[]);
            info!(expired, orders = orders.len(), "sweep expired overdue offers");
        }
        Ok(expired)
    }
}

/// Runs the sweep once at startup and then on an interval until shut down.
#[derive(Clone)]
pub struct SweepLoop {
    dispatcher: Dispatcher,
    interval: Duration,
    shutdown: Arc<Notify>,
}

impl SweepLoop {
    pub fn new(dispatcher: Dispatcher, interval: Duration) -> Self {
        Self {
            dispatcher,
            interval,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Signal the loop to stop after the current pass.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }

    pub async fn run(&self) -> Result<()> {
        info!(interval_secs = self.interval.as_secs(), "sweep loop started");
        self.pass().await;

        loop {
            tokio::select! {
                _ = self.shutdown.notified() => {
                    info!("sweep loop shutting down");
                    return Ok(());
                }
                _ = tokio::time::sleep(self.interval) => {
                    self.pass().await;
                }
            }
        }
    }

    async fn pass(&self) {
        if let Err(e) = self.dispatcher.sweep(Utc::now()).await {
            error!("sweep error: {e}");
        }
    }
}
