//! What a master may see of an offer.
//!
//! Before a master commits, an offer shows where and what, never who or
//! how much. The restricted view is its own type with no client, device
//! make or pricing fields, so nothing can leak through it by accident.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::{
    Assignment, AssignmentId, AssignmentStatus, GeoPoint, MasterId, Order, OrderId,
};

/// An assignment as shown to its master.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "disclosure", rename_all = "snake_case")]
pub enum AssignmentView {
    Restricted(RestrictedView),
    Full(FullView),
}

/// Pre-acceptance view. Every field here is safe to push to any master.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RestrictedView {
    pub assignment_id: AssignmentId,
    pub order_id: OrderId,
    pub master_id: MasterId,
    pub status: AssignmentStatus,
    pub attempt_number: u32,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub device_type: String,
    pub address: Option<String>,
    pub location: Option<GeoPoint>,
    pub problem_description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FullView {
    pub assignment: Assignment,
    pub order: Order,
}

impl AssignmentView {
    pub fn is_restricted(&self) -> bool {
        matches!(self, AssignmentView::Restricted(_))
    }

    pub fn assignment_id(&self) -> AssignmentId {
        match self {
            AssignmentView::Restricted(v) => v.assignment_id,
            AssignmentView::Full(v) => v.assignment.id,
        }
    }
}

/// Shape `assignment` (with its `order`) for display.
///
/// Pending offers are restricted unless `include_full_details` is set;
/// any other status returns the complete record.
pub fn filter(assignment: &Assignment, order: &Order, include_full_details: bool) -> AssignmentView {
    if assignment.status == AssignmentStatus::Pending && !include_full_details {
        AssignmentView::Restricted(RestrictedView {
            assignment_id: assignment.id,
            order_id: assignment.order_id,
            master_id: assignment.master_id,
            status: assignment.status,
            attempt_number: assignment.attempt_number,
            created_at: assignment.created_at,
            expires_at: assignment.expires_at,
            device_type: order.device_type.clone(),
            address: order.address.clone(),
            location: order.location,
            problem_description: order.problem_description.clone(),
        })
    } else {
        AssignmentView::Full(FullView {
            assignment: assignment.clone(),
            order: order.clone(),
        })
    }
}
