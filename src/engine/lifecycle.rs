//! Assignment lifecycle: offer, accept, reject, expire, cascade.
//!
//! Every status change is a compare-and-swap from `pending` on the stored
//! row, so the local timer, an explicit master action and the sweep can
//! race and only one of them acts. Every non-acceptance funnels into
//! [`Dispatcher::cascade`], which re-reads the order under a per-order lock
//! before offering it again.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use opentelemetry::KeyValue;
use tracing::{Instrument, debug, error, info, warn};

use super::locks::OrderLocks;
use super::timers::TimerRegistry;
use crate::config::DispatchConfig;
use crate::disclosure::{self, AssignmentView};
use crate::error::{Error, Result};
use crate::model::*;
use crate::notify::Notifier;
use crate::ranking::rank;
use crate::store::{CasResult, DispatchStore};
use crate::telemetry::dispatch::{
    record_outcome, record_transition, start_assignment_span, start_cascade_span,
};
use crate::telemetry::metrics;

/// What a cascade step did for an order.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// A new pending assignment was created.
    Offered(Assignment),
    /// Nobody eligible is left and the attempt threshold is not reached.
    /// The order stays `new`.
    NoCandidate { attempts: u32 },
    /// Nobody eligible is left at or past the attempt threshold. The
    /// order was cancelled.
    Exhausted { attempts: u32 },
    /// The order is not dispatchable right now.
    Skipped(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The order has left `new`.
    OrderNotNew(OrderStatus),
    /// An offer for the order is still open.
    AlreadyPending(AssignmentId),
}

impl DispatchOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            DispatchOutcome::Offered(_) => "offered",
            DispatchOutcome::NoCandidate { .. } => "no_candidate",
            DispatchOutcome::Exhausted { .. } => "exhausted",
            DispatchOutcome::Skipped(_) => "skipped",
        }
    }

    pub fn offered(&self) -> Option<&Assignment> {
        match self {
            DispatchOutcome::Offered(a) => Some(a),
            _ => None,
        }
    }
}

/// Which path moved an assignment out of `pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Trigger {
    Timer,
    Sweep,
    Master,
    Withdrawn,
    Manual,
}

impl Trigger {
    fn as_str(self) -> &'static str {
        match self {
            Trigger::Timer => "timer",
            Trigger::Sweep => "sweep",
            Trigger::Master => "master",
            Trigger::Withdrawn => "withdrawn",
            Trigger::Manual => "manual",
        }
    }
}

/// The dispatch engine. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct Dispatcher {
    pub(crate) store: Arc<dyn DispatchStore>,
    notifier: Arc<dyn Notifier>,
    config: DispatchConfig,
    timers: Arc<TimerRegistry>,
    locks: Arc<OrderLocks>,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn DispatchStore>,
        notifier: Arc<dyn Notifier>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            store,
            notifier,
            config,
            timers: Arc::new(TimerRegistry::new()),
            locks: Arc::new(OrderLocks::new()),
        }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Local expiry timers currently armed.
    pub fn timers(&self) -> &TimerRegistry {
        &self.timers
    }

    // -----------------------------------------------------------------------
    // Entry points
    // -----------------------------------------------------------------------

    /// Offer a freshly created order to its best candidate.
    ///
    /// Also the way to resume an order whose cascade failed part-way: it
    /// runs the same step every non-acceptance runs.
    pub async fn dispatch(&self, order_id: OrderId) -> Result<DispatchOutcome> {
        self.cascade(order_id, "dispatch").await
    }

    /// Persist a pending offer, arm its timer and notify the master.
    ///
    /// Fails without side effects if the row can't be written: no timer is
    /// armed and nothing is sent.
    pub async fn create_assignment(
        &self,
        order_id: OrderId,
        master_id: MasterId,
        attempt_number: u32,
    ) -> Result<Assignment> {
        let order = self.store.get_order(order_id).await?;
        let master = self.store.get_master(master_id).await?;
        self.offer(&order, &master, attempt_number).await
    }

    /// Master accepts. Fails with `InvalidTransition` unless pending.
    pub async fn accept(&self, id: AssignmentId) -> Result<Assignment> {
        let span = start_assignment_span(id, "accept");
        async {
            let now = Utc::now();
            self.transition(id, AssignmentStatus::Accepted, None, now, Trigger::Master)
                .await?;
            self.timers.cancel(id);

            let assignment = self.store.get_assignment(id).await?;
            let waited = (now - assignment.created_at).num_milliseconds() as f64 / 1000.0;
            metrics::acceptance_latency_secs().record(
                waited.max(0.0),
                &[KeyValue::new("attempt", assignment.attempt_number.to_string())],
            );
            info!(
                order_id = %assignment.order_id,
                master_id = %assignment.master_id,
                attempt = assignment.attempt_number,
                "offer accepted"
            );
            Ok(assignment)
        }
        .instrument(span)
        .await
    }

    /// Master declines. Fails with `InvalidTransition` unless pending;
    /// otherwise cascades to the next candidate.
    ///
    /// If the cascade fails, the rejection has already been stored and a
    /// retry of `reject` gets `InvalidTransition`. Resume the order with
    /// [`Dispatcher::dispatch`].
    pub async fn reject(&self, id: AssignmentId, reason: &str) -> Result<DispatchOutcome> {
        let span = start_assignment_span(id, "reject");
        async {
            let order_id = self
                .transition(
                    id,
                    AssignmentStatus::Rejected,
                    Some(reason),
                    Utc::now(),
                    Trigger::Master,
                )
                .await?;
            self.timers.cancel(id);
            info!(%order_id, reason, "offer rejected");
            self.cascade(order_id, "reject").await
        }
        .instrument(span)
        .await
    }

    /// Expire an offer and cascade.
    ///
    /// Idempotent: returns `Ok(None)` without side effects if the
    /// assignment already left `pending` by any path.
    ///
    /// An error from the cascade leaves the row expired and the order
    /// `new` with nothing pending, which the sweep does not revisit.
    /// Resume it with [`Dispatcher::dispatch`].
    pub async fn expire(&self, id: AssignmentId) -> Result<Option<DispatchOutcome>> {
        self.expire_via(id, Trigger::Manual).await
    }

    pub(crate) async fn expire_via(
        &self,
        id: AssignmentId,
        trigger: Trigger,
    ) -> Result<Option<DispatchOutcome>> {
        let span = start_assignment_span(id, "expire");
        async {
            let Some(order_id) = self.try_expire(id, trigger).await? else {
                return Ok(None);
            };
            self.cascade(order_id, trigger.as_str()).await.map(Some)
        }
        .instrument(span)
        .await
    }

    /// Withdraw every open offer for an order that was cancelled elsewhere.
    ///
    /// Timers are disarmed and pending rows marked expired. Nothing
    /// cascades. Returns how many offers were withdrawn.
    pub async fn cancel_all_pending(&self, order_id: OrderId) -> Result<usize> {
        let _guard = self.locks.lock(order_id).await;
        let now = Utc::now();
        let mut withdrawn = 0;

        for assignment in self.store.list_assignments_by_order(order_id).await? {
            if assignment.status != AssignmentStatus::Pending {
                continue;
            }
            self.timers.cancel(assignment.id);
            match self
                .transition(
                    assignment.id,
                    AssignmentStatus::Expired,
                    None,
                    now,
                    Trigger::Withdrawn,
                )
                .await
            {
                Ok(_) => withdrawn += 1,
                // Resolved concurrently; nothing left to withdraw.
                Err(Error::InvalidTransition { .. }) => {}
                Err(e) => return Err(e),
            }
        }

        info!(%order_id, withdrawn, "pending offers withdrawn");
        Ok(withdrawn)
    }

    /// An assignment shaped for its master. Pending offers are restricted
    /// unless `include_full_details` is set.
    pub async fn view(&self, id: AssignmentId, include_full_details: bool) -> Result<AssignmentView> {
        let assignment = self.store.get_assignment(id).await?;
        let order = self.store.get_order(assignment.order_id).await?;
        Ok(disclosure::filter(&assignment, &order, include_full_details))
    }

    /// Disarm every local timer. Pending rows stay pending; the sweep
    /// expires them on the next run.
    pub fn shutdown(&self) -> usize {
        let n = self.timers.cancel_all();
        info!(timers = n, "dispatcher timers disarmed");
        n
    }

    // -----------------------------------------------------------------------
    // Cascade
    // -----------------------------------------------------------------------

    /// Offer the order to the next unattempted candidate, or stop.
    ///
    /// Shared by dispatch, reject, timer expiry and the sweep. Holds the
    /// order's lock for its whole run and re-reads the order first, so a
    /// cancellation made before the lock is taken is always seen.
    pub(crate) async fn cascade(
        &self,
        order_id: OrderId,
        trigger: &'static str,
    ) -> Result<DispatchOutcome> {
        let span = start_cascade_span(order_id, trigger);
        let result = async {
            let _guard = self.locks.lock(order_id).await;
            self.cascade_locked(order_id).await
        }
        .instrument(span.clone())
        .await;

        match &result {
            Ok(outcome) => {
                record_outcome(&span, outcome.label());
                metrics::cascades().add(1, &[KeyValue::new("outcome", outcome.label())]);
            }
            Err(e) => {
                span.in_scope(|| error!(%order_id, error = %e, "cascade failed"));
            }
        }
        result
    }

    async fn cascade_locked(&self, order_id: OrderId) -> Result<DispatchOutcome> {
        let order = self.store.get_order(order_id).await?;
        if order.status != OrderStatus::New {
            debug!(status = %order.status, "order is not new, not dispatching");
            return Ok(DispatchOutcome::Skipped(SkipReason::OrderNotNew(order.status)));
        }

        let history = self.store.list_assignments_by_order(order_id).await?;
        if let Some(open) = history
            .iter()
            .find(|a| a.status == AssignmentStatus::Pending)
        {
            debug!(assignment_id = %open.id, "offer already open");
            return Ok(DispatchOutcome::Skipped(SkipReason::AlreadyPending(open.id)));
        }

        let attempts = history.iter().map(|a| a.attempt_number).max().unwrap_or(0);
        let offered: HashSet<MasterId> = history.iter().map(|a| a.master_id).collect();
        let now = Utc::now();
        let masters = self.store.list_masters_for_device(&order.device_type).await?;

        // The threshold only cancels once nobody is left to ask.
        let Some(best) = rank(&order, masters, &offered, now).into_iter().next() else {
            if attempts >= self.config.max_attempts {
                return self.exhaust(&order, attempts).await;
            }
            info!(
                attempts,
                device_type = %order.device_type,
                "no eligible master, dispatch stops"
            );
            return Ok(DispatchOutcome::NoCandidate { attempts });
        };

        debug!(
            master_id = %best.master.id,
            score = best.score.total,
            distance_m = best.score.distance_m,
            "best candidate"
        );
        let assignment = self.offer_at(&order, &best.master, attempts + 1, now).await?;
        Ok(DispatchOutcome::Offered(assignment))
    }

    async fn exhaust(&self, order: &Order, attempts: u32) -> Result<DispatchOutcome> {
        match self
            .store
            .cas_order_status(order.id, OrderStatus::New, OrderStatus::Cancelled)
            .await?
        {
            CasResult::Applied => {}
            CasResult::Mismatch { actual } => {
                return Ok(DispatchOutcome::Skipped(SkipReason::OrderNotNew(actual)));
            }
            CasResult::NotFound => return Err(Error::NotFound(format!("order {}", order.id))),
        }

        let note = OrderNote {
            order_id: order.id,
            status: OrderStatus::Cancelled,
            note: format!(
                "No master accepted the order after {attempts} attempts; cancelled automatically"
            ),
            created_at: Utc::now(),
        };
        self.store.append_order_note(&note).await?;
        metrics::orders_exhausted().add(1, &[]);
        warn!(attempts, "order cancelled after exhausting attempts");
        Ok(DispatchOutcome::Exhausted { attempts })
    }

    // -----------------------------------------------------------------------
    // Offer creation
    // -----------------------------------------------------------------------

    async fn offer(&self, order: &Order, master: &Master, attempt_number: u32) -> Result<Assignment> {
        self.offer_at(order, master, attempt_number, Utc::now()).await
    }

    async fn offer_at(
        &self,
        order: &Order,
        master: &Master,
        attempt_number: u32,
        now: DateTime<Utc>,
    ) -> Result<Assignment> {
        let window = self.config.acceptance_window(attempt_number);
        let assignment = Assignment::pending(order.id, master.id, attempt_number, now, window);

        self.store.insert_assignment(&assignment).await?;

        // Row is durable; the timer is local and infallible to arm.
        let delay = window.to_std().unwrap_or_default();
        self.timers
            .schedule(assignment.id, delay, self.clone().expire_on_timer(assignment.id));

        metrics::assignments_created()
            .add(1, &[KeyValue::new("attempt", attempt_number.to_string())]);
        info!(
            assignment_id = %assignment.id,
            order_id = %order.id,
            master_id = %master.id,
            attempt = attempt_number,
            expires_at = %assignment.expires_at,
            "offer created"
        );

        self.send_offer(master.user_id, disclosure::filter(&assignment, order, false));
        Ok(assignment)
    }

    /// Boxed so the timer future can name a type that itself leads back
    /// here through cascade.
    fn expire_on_timer(self, id: AssignmentId) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(async move {
            if let Err(e) = self.expire_via(id, Trigger::Timer).await {
                error!(assignment_id = %id, error = %e, "timer expiry failed");
            }
        })
    }

    /// Fire-and-forget push of a restricted offer.
    fn send_offer(&self, user_id: UserId, payload: AssignmentView) {
        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(async move {
            let delivered = notifier.notify(user_id, &payload).await;
            let result = if delivered { "delivered" } else { "undelivered" };
            metrics::notifications().add(1, &[KeyValue::new("result", result)]);
            if !delivered {
                warn!(
                    user_id = %user_id,
                    assignment_id = %payload.assignment_id(),
                    "offer notification not delivered"
                );
            }
        });
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    /// Expire a pending row. Returns its order if this call won the CAS.
    pub(crate) async fn try_expire(
        &self,
        id: AssignmentId,
        trigger: Trigger,
    ) -> Result<Option<OrderId>> {
        match self
            .transition(id, AssignmentStatus::Expired, None, Utc::now(), trigger)
            .await
        {
            Ok(order_id) => {
                if trigger != Trigger::Timer {
                    self.timers.cancel(id);
                }
                Ok(Some(order_id))
            }
            Err(Error::InvalidTransition { from, .. }) => {
                debug!(assignment_id = %id, status = %from, "already resolved, expire is a no-op");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// CAS `id` from pending to `to`. Returns the assignment's order.
    async fn transition(
        &self,
        id: AssignmentId,
        to: AssignmentStatus,
        reason: Option<&str>,
        at: DateTime<Utc>,
        trigger: Trigger,
    ) -> Result<OrderId> {
        let from = AssignmentStatus::Pending;
        match self.store.cas_assignment_status(id, to, reason, at).await? {
            CasResult::Applied => {}
            CasResult::Mismatch { actual } => {
                return Err(Error::InvalidTransition {
                    id,
                    from: actual,
                    to,
                });
            }
            CasResult::NotFound => return Err(Error::NotFound(format!("assignment {id}"))),
        }

        let span = tracing::Span::current();
        record_transition(&span, from.as_str(), to.as_str());
        metrics::assignment_transitions().add(
            1,
            &[
                KeyValue::new("from", from.as_str()),
                KeyValue::new("to", to.as_str()),
                KeyValue::new("path", trigger.as_str()),
            ],
        );

        Ok(self.store.get_assignment(id).await?.order_id)
    }
}
