//! Assignments: a time-boxed offer of one order to one master.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::{AssignmentId, MasterId, OrderId};
use crate::error::{Error, Result};

/// An offer of an order to a master, open until `expires_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: AssignmentId,
    pub order_id: OrderId,
    pub master_id: MasterId,
    pub status: AssignmentStatus,

    /// 1-based position of this offer in the order's cascade.
    pub attempt_number: u32,

    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,

    /// When the assignment left `pending`, by any path.
    pub responded_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
}

impl Assignment {
    /// A pending offer created at `now`, open for `window`.
    pub fn pending(
        order_id: OrderId,
        master_id: MasterId,
        attempt_number: u32,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Self {
        Self {
            id: AssignmentId::new(),
            order_id,
            master_id,
            status: AssignmentStatus::Pending,
            attempt_number,
            created_at: now,
            expires_at: now + window,
            responded_at: None,
            rejection_reason: None,
        }
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == AssignmentStatus::Pending && self.expires_at < now
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    /// Offered, waiting on the master.
    Pending,
    /// Master took the order. Terminal.
    Accepted,
    /// Master declined. Terminal; cascades.
    Rejected,
    /// Window lapsed or the order was withdrawn. Terminal; cascades unless withdrawn.
    Expired,
}

impl AssignmentStatus {
    /// Only `pending` has outgoing edges.
    pub fn can_transition_to(self, to: AssignmentStatus) -> bool {
        use AssignmentStatus::*;
        matches!(
            (self, to),
            (Pending, Accepted) | (Pending, Rejected) | (Pending, Expired)
        )
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, AssignmentStatus::Pending)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AssignmentStatus::Pending => "pending",
            AssignmentStatus::Accepted => "accepted",
            AssignmentStatus::Rejected => "rejected",
            AssignmentStatus::Expired => "expired",
        }
    }
}

impl std::fmt::Display for AssignmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AssignmentStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(AssignmentStatus::Pending),
            "accepted" => Ok(AssignmentStatus::Accepted),
            "rejected" => Ok(AssignmentStatus::Rejected),
            "expired" => Ok(AssignmentStatus::Expired),
            _ => Err(Error::Other(format!("unknown assignment status: {s}"))),
        }
    }
}
