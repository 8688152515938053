//! Span helpers for assignment lifecycle operations.

use tracing::Span;

use crate::model::{AssignmentId, OrderId};

/// Start a span for work on one order's dispatch.
///
/// `dispatch.outcome` is declared empty and filled via [`record_outcome`].
pub fn start_cascade_span(order_id: OrderId, trigger: &'static str) -> Span {
    tracing::info_span!(
        "dispatch.cascade",
        "order.id" = %order_id,
        "dispatch.trigger" = trigger,
        "dispatch.outcome" = tracing::field::Empty,
    )
}

/// Start a span for a status change on one assignment.
pub fn start_assignment_span(assignment_id: AssignmentId, operation: &'static str) -> Span {
    tracing::info_span!(
        "dispatch.assignment",
        "assignment.id" = %assignment_id,
        "assignment.operation" = operation,
    )
}

pub fn record_outcome(span: &Span, outcome: &str) {
    span.record("dispatch.outcome", outcome);
}

/// Emit a transition event scoped to `span`.
pub fn record_transition(span: &Span, from: &str, to: &str) {
    span.in_scope(|| {
        tracing::info!(from = from, to = to, "state_transition");
    });
}
