//! Integration tests for telemetry initialization and span helpers.

use repair_dispatch::model::{AssignmentId, OrderId};
use repair_dispatch::telemetry::dispatch::{
    record_outcome, record_transition, start_assignment_span, start_cascade_span,
};

#[test]
fn telemetry_initializes_without_endpoint() {
    let config = repair_dispatch::telemetry::TelemetryConfig {
        endpoint: None,
        service_name: "repair-dispatch-test".to_string(),
        log_level: "debug".to_string(),
    };
    // A subscriber may already be set by another test in this process.
    if let Ok(guard) = repair_dispatch::telemetry::init_telemetry(config) {
        assert!(!guard.is_exporting());
        guard.force_flush();
    }
}

#[test]
fn cascade_span_records_outcome() {
    let span = start_cascade_span(OrderId::new(), "reject");
    record_outcome(&span, "offered");
}

#[test]
fn assignment_span_records_transition() {
    let span = start_assignment_span(AssignmentId::new(), "accept");
    record_transition(&span, "pending", "accepted");
}

#[test]
fn instruments_are_usable_without_a_provider() {
    use opentelemetry::KeyValue;
    use repair_dispatch::telemetry::metrics;

    metrics::assignments_created().add(1, &[KeyValue::new("attempt", "1")]);
    metrics::cascades().add(1, &[KeyValue::new("outcome", "offered")]);
    metrics::acceptance_latency_secs().record(12.5, &[]);
}
