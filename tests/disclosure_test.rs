//! What a master sees of an offer before and after accepting it.

use chrono::{Duration, Utc};
use repair_dispatch::disclosure::{AssignmentView, filter};
use repair_dispatch::model::*;
use serde_json::Value;

/// Keys that identify the client or reveal pricing.
const PII_KEYS: &[&str] = &[
    "client_name",
    "client_phone",
    "client_email",
    "device_brand",
    "device_model",
    "preferred_arrival",
    "estimated_cost",
    "final_cost",
];

fn contains_key(value: &Value, key: &str) -> bool {
    match value {
        Value::Object(map) => map.iter().any(|(k, v)| k == key || contains_key(v, key)),
        Value::Array(items) => items.iter().any(|v| contains_key(v, key)),
        _ => false,
    }
}

fn full_order() -> Order {
    let mut order = Order::new("oven", "no heat", "Ivan Sidorov").at(55.0, 37.0);
    order.address = Some("Lenina 5, apt 12".to_string());
    order.device_brand = Some("Bosch".to_string());
    order.device_model = Some("HBG635".to_string());
    order.client_phone = Some("+7 999 123 45 67".to_string());
    order.client_email = Some("ivan@example.com".to_string());
    order.preferred_arrival = Some("after 18:00".to_string());
    order.estimated_cost = Some(3500.0);
    order.final_cost = Some(4100.0);
    order
}

fn pending_for(order: &Order) -> Assignment {
    Assignment::pending(order.id, MasterId::new(), 1, Utc::now(), Duration::minutes(5))
}

#[test]
fn pending_offer_carries_no_client_fields() {
    let order = full_order();
    let assignment = pending_for(&order);

    let view = filter(&assignment, &order, false);
    assert!(view.is_restricted());

    let json = serde_json::to_value(&view).unwrap();
    for key in PII_KEYS {
        assert!(!contains_key(&json, key), "restricted view leaked {key}: {json}");
    }
    let text = json.to_string();
    assert!(!text.contains("+7 999"));
    assert!(!text.contains("ivan@example.com"));

    assert_eq!(json["disclosure"], "restricted");
    assert_eq!(json["device_type"], "oven");
    assert_eq!(json["address"], "Lenina 5, apt 12");
    assert_eq!(json["problem_description"], "no heat");
}

#[test]
fn include_full_details_overrides_restriction() {
    let order = full_order();
    let assignment = pending_for(&order);

    let json = serde_json::to_value(filter(&assignment, &order, true)).unwrap();
    assert_eq!(json["disclosure"], "full");
    assert_eq!(json["order"]["client_phone"], "+7 999 123 45 67");
}

#[test]
fn resolved_assignments_are_shown_in_full() {
    let order = full_order();
    for status in [
        AssignmentStatus::Accepted,
        AssignmentStatus::Rejected,
        AssignmentStatus::Expired,
    ] {
        let mut assignment = pending_for(&order);
        assignment.status = status;
        match filter(&assignment, &order, false) {
            AssignmentView::Full(full) => {
                assert_eq!(full.order.client_email.as_deref(), Some("ivan@example.com"));
            }
            AssignmentView::Restricted(_) => panic!("{status} should not be restricted"),
        }
    }
}
