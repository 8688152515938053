//! In-process store.
//!
//! No durability and no cross-process coordination. For tests and
//! embedding the engine without Postgres.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{CasResult, DispatchStore};
use crate::error::{Error, Result};
use crate::model::*;

#[derive(Default)]
struct Tables {
    orders: HashMap<OrderId, Order>,
    masters: HashMap<MasterId, Master>,
    assignments: HashMap<AssignmentId, Assignment>,
    notes: Vec<OrderNote>,
}

/// A [`DispatchStore`] held in a mutex.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| Error::Persistence("memory store lock poisoned".to_string()))
    }

    /// Insert or replace an order.
    pub fn put_order(&self, order: Order) -> Result<()> {
        self.tables()?.orders.insert(order.id, order);
        Ok(())
    }

    /// Insert or replace a master.
    pub fn put_master(&self, master: Master) -> Result<()> {
        self.tables()?.masters.insert(master.id, master);
        Ok(())
    }

    /// Set an order's status unconditionally, as order management would.
    pub fn set_order_status(&self, id: OrderId, status: OrderStatus) -> Result<()> {
        let mut tables = self.tables()?;
        let order = tables
            .orders
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("order {id}")))?;
        order.status = status;
        order.updated_at = Utc::now();
        Ok(())
    }

    pub fn order_notes(&self, id: OrderId) -> Result<Vec<OrderNote>> {
        Ok(self
            .tables()?
            .notes
            .iter()
            .filter(|n| n.order_id == id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl DispatchStore for MemoryStore {
    async fn get_order(&self, id: OrderId) -> Result<Order> {
        self.tables()?
            .orders
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("order {id}")))
    }

    async fn cas_order_status(
        &self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<CasResult<OrderStatus>> {
        let mut tables = self.tables()?;
        let Some(order) = tables.orders.get_mut(&id) else {
            return Ok(CasResult::NotFound);
        };
        if order.status != from {
            return Ok(CasResult::Mismatch {
                actual: order.status,
            });
        }
        order.status = to;
        order.updated_at = Utc::now();
        Ok(CasResult::Applied)
    }

    async fn append_order_note(&self, note: &OrderNote) -> Result<()> {
        let mut tables = self.tables()?;
        if !tables.orders.contains_key(&note.order_id) {
            return Err(Error::NotFound(format!("order {}", note.order_id)));
        }
        tables.notes.push(note.clone());
        Ok(())
    }

    async fn get_master(&self, id: MasterId) -> Result<Master> {
        self.tables()?
            .masters
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("master {id}")))
    }

    async fn list_masters_for_device(&self, device_type: &str) -> Result<Vec<Master>> {
        Ok(self
            .tables()?
            .masters
            .values()
            .filter(|m| m.specializes_in(device_type))
            .cloned()
            .collect())
    }

    async fn insert_assignment(&self, assignment: &Assignment) -> Result<()> {
        let mut tables = self.tables()?;
        if !tables.orders.contains_key(&assignment.order_id) {
            return Err(Error::NotFound(format!("order {}", assignment.order_id)));
        }
        if tables.assignments.contains_key(&assignment.id) {
            return Err(Error::Conflict(format!("assignment {} exists", assignment.id)));
        }
        for existing in tables
            .assignments
            .values()
            .filter(|a| a.order_id == assignment.order_id)
        {
            if existing.master_id == assignment.master_id {
                return Err(Error::Conflict(format!(
                    "order {} was already offered to master {}",
                    assignment.order_id, assignment.master_id
                )));
            }
            if existing.attempt_number >= assignment.attempt_number {
                return Err(Error::Conflict(format!(
                    "order {} already has attempt {}",
                    assignment.order_id, existing.attempt_number
                )));
            }
            if existing.status == AssignmentStatus::Pending
                && assignment.status == AssignmentStatus::Pending
            {
                return Err(Error::Conflict(format!(
                    "order {} already has pending assignment {}",
                    assignment.order_id, existing.id
                )));
            }
        }
        tables.assignments.insert(assignment.id, assignment.clone());
        Ok(())
    }

    async fn get_assignment(&self, id: AssignmentId) -> Result<Assignment> {
        self.tables()?
            .assignments
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("assignment {id}")))
    }

    async fn list_assignments_by_order(&self, order_id: OrderId) -> Result<Vec<Assignment>> {
        let mut found: Vec<Assignment> = self
            .tables()?
            .assignments
            .values()
            .filter(|a| a.order_id == order_id)
            .cloned()
            .collect();
        found.sort_by_key(|a| a.attempt_number);
        Ok(found)
    }

    async fn list_overdue_pending(&self, now: DateTime<Utc>) -> Result<Vec<Assignment>> {
        let tables = self.tables()?;
        let mut found: Vec<Assignment> = tables
            .assignments
            .values()
            .filter(|a| a.is_overdue(now))
            .filter(|a| {
                tables
                    .orders
                    .get(&a.order_id)
                    .is_some_and(|o| o.status == OrderStatus::New)
            })
            .cloned()
            .collect();
        found.sort_by_key(|a| a.expires_at);
        Ok(found)
    }

    async fn cas_assignment_status(
        &self,
        id: AssignmentId,
        to: AssignmentStatus,
        reason: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<CasResult<AssignmentStatus>> {
        let mut tables = self.tables()?;
        let Some(assignment) = tables.assignments.get_mut(&id) else {
            return Ok(CasResult::NotFound);
        };
        if !assignment.status.can_transition_to(to) {
            return Ok(CasResult::Mismatch {
                actual: assignment.status,
            });
        }
        assignment.status = to;
        assignment.responded_at = Some(at);
        assignment.rejection_reason = reason.map(str::to_string);
        Ok(CasResult::Applied)
    }
}
