//! Metric instrument factories for repair-dispatch.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"repair-dispatch"` meter.

use opentelemetry::metrics::{Counter, Histogram, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("repair-dispatch")
}

/// Counter: assignments created.
/// Labels: `attempt` (attempt number as string).
pub fn assignments_created() -> Counter<u64> {
    meter()
        .u64_counter("dispatch.assignments.created")
        .with_description("Number of assignments offered to masters")
        .build()
}

/// Counter: assignment status transitions.
/// Labels: `from`, `to`, `path` ("timer" | "sweep" | "master" | "withdrawn" | "manual").
pub fn assignment_transitions() -> Counter<u64> {
    meter()
        .u64_counter("dispatch.assignments.transitions")
        .with_description("Number of assignment status transitions")
        .build()
}

/// Counter: cascade runs.
/// Labels: `outcome` ("offered" | "no_candidate" | "exhausted" | "skipped").
pub fn cascades() -> Counter<u64> {
    meter()
        .u64_counter("dispatch.cascades")
        .with_description("Number of cascade runs by outcome")
        .build()
}

/// Counter: assignments expired by the reconciliation sweep.
pub fn sweep_expired() -> Counter<u64> {
    meter()
        .u64_counter("dispatch.sweep.expired")
        .with_description("Assignments expired by the reconciliation sweep")
        .build()
}

/// Counter: offer notifications.
/// Labels: `result` ("delivered" | "undelivered").
pub fn notifications() -> Counter<u64> {
    meter()
        .u64_counter("dispatch.notifications")
        .with_description("Offer notifications by delivery result")
        .build()
}

/// Counter: orders cancelled after exhausting their attempts.
pub fn orders_exhausted() -> Counter<u64> {
    meter()
        .u64_counter("dispatch.orders.exhausted")
        .with_description("Orders cancelled after the attempt threshold")
        .build()
}

/// Histogram: seconds from offer to acceptance.
/// Labels: `attempt`.
pub fn acceptance_latency_secs() -> Histogram<f64> {
    meter()
        .f64_histogram("dispatch.acceptance.latency")
        .with_description("Time from offer creation to acceptance")
        .with_unit("s")
        .build()
}
