//! Persistence seam for the dispatch engine.
//!
//! Status changes go through compare-and-swap so that the expiry timer,
//! an explicit master action and the reconciliation sweep can race on the
//! same row and exactly one of them wins.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::model::*;

pub use memory::MemoryStore;

/// Result of a compare-and-swap on a status column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasResult<S> {
    Applied,
    NotFound,
    /// Current status didn't match the expected one.
    Mismatch {
        actual: S,
    },
}

impl<S> CasResult<S> {
    pub fn is_applied(&self) -> bool {
        matches!(self, CasResult::Applied)
    }
}

/// Orders, masters and assignments as the engine needs them.
///
/// Implementations must reject an assignment insert that would give an
/// order a second pending row, or offer an order to the same master twice,
/// with [`crate::error::Error::Conflict`].
#[async_trait]
pub trait DispatchStore: Send + Sync {
    // --- Orders ---

    async fn get_order(&self, id: OrderId) -> Result<Order>;

    /// Set an order's status if it is currently `from`.
    async fn cas_order_status(
        &self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<CasResult<OrderStatus>>;

    async fn append_order_note(&self, note: &OrderNote) -> Result<()>;

    // --- Masters ---

    async fn get_master(&self, id: MasterId) -> Result<Master>;

    /// Masters that list `device_type` among their specializations.
    /// Shift and availability are filtered by the caller.
    async fn list_masters_for_device(&self, device_type: &str) -> Result<Vec<Master>>;

    // --- Assignments ---

    async fn insert_assignment(&self, assignment: &Assignment) -> Result<()>;

    async fn get_assignment(&self, id: AssignmentId) -> Result<Assignment>;

    /// All assignments of an order, in attempt order.
    async fn list_assignments_by_order(&self, order_id: OrderId) -> Result<Vec<Assignment>>;

    /// Pending assignments with `expires_at < now` whose order is still `new`.
    async fn list_overdue_pending(&self, now: DateTime<Utc>) -> Result<Vec<Assignment>>;

    /// Move a pending assignment to `to`, stamping `responded_at = at`.
    async fn cas_assignment_status(
        &self,
        id: AssignmentId,
        to: AssignmentStatus,
        reason: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<CasResult<AssignmentStatus>>;
}
