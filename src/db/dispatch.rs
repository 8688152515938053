//! Postgres implementation of [`DispatchStore`].
//!
//! Status changes are conditional updates (`WHERE status = 'pending'`);
//! unique indexes on assignments back single-flight and no-repeat-master,
//! and violations surface as [`Error::Conflict`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::Db;
use crate::error::{Error, Result};
use crate::model::*;
use crate::store::{CasResult, DispatchStore};

const ASSIGNMENT_COLUMNS: &str = "id, order_id, master_id, status, attempt_number, created_at, expires_at, responded_at, rejection_reason";

const ORDER_COLUMNS: &str = "id, device_type, device_brand, device_model, problem_description, address, latitude, longitude, client_name, client_phone, client_email, preferred_arrival, estimated_cost, final_cost, urgency, status, created_at, updated_at";

const MASTER_COLUMNS: &str = "id, user_id, name, latitude, longitude, specializations, rating, completed_orders, active_orders, on_shift, availability, subscription";

/// Map unique-index violations to `Conflict`; everything else stays a
/// database error.
fn conflict_or_db(e: sqlx::Error, what: impl FnOnce() -> String) -> Error {
    match e.as_database_error() {
        Some(db) if db.is_unique_violation() => Error::Conflict(what()),
        _ => Error::Database(e),
    }
}

impl Db {
    /// Insert an order. Order intake belongs to order management; this is
    /// here for fixtures and tooling.
    pub async fn insert_order(&self, order: &Order) -> Result<()> {
        sqlx::query(
            "INSERT INTO orders (id, device_type, device_brand, device_model, problem_description, address, latitude, longitude, client_name, client_phone, client_email, preferred_arrival, estimated_cost, final_cost, urgency, status, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)",
        )
        .bind(order.id.0)
        .bind(&order.device_type)
        .bind(&order.device_brand)
        .bind(&order.device_model)
        .bind(&order.problem_description)
        .bind(&order.address)
        .bind(order.location.map(|p| p.latitude))
        .bind(order.location.map(|p| p.longitude))
        .bind(&order.client_name)
        .bind(&order.client_phone)
        .bind(&order.client_email)
        .bind(&order.preferred_arrival)
        .bind(order.estimated_cost)
        .bind(order.final_cost)
        .bind(order.urgency.to_string())
        .bind(order.status.as_str())
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Insert or replace a master and its promotions.
    pub async fn upsert_master(&self, master: &Master) -> Result<()> {
        let mut tx = self.pool().begin().await?;

        sqlx::query(
            "INSERT INTO masters (id, user_id, name, latitude, longitude, specializations, rating, completed_orders, active_orders, on_shift, availability, subscription)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
             ON CONFLICT (id) DO UPDATE SET
                user_id = EXCLUDED.user_id, name = EXCLUDED.name,
                latitude = EXCLUDED.latitude, longitude = EXCLUDED.longitude,
                specializations = EXCLUDED.specializations, rating = EXCLUDED.rating,
                completed_orders = EXCLUDED.completed_orders, active_orders = EXCLUDED.active_orders,
                on_shift = EXCLUDED.on_shift, availability = EXCLUDED.availability,
                subscription = EXCLUDED.subscription",
        )
        .bind(master.id.0)
        .bind(master.user_id.0)
        .bind(&master.name)
        .bind(master.location.map(|p| p.latitude))
        .bind(master.location.map(|p| p.longitude))
        .bind(&master.specializations)
        .bind(master.rating)
        .bind(i32::try_from(master.completed_orders).unwrap_or(i32::MAX))
        .bind(i32::try_from(master.active_orders).unwrap_or(i32::MAX))
        .bind(master.on_shift)
        .bind(master.availability.as_str())
        .bind(master.subscription.as_str())
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM master_promotions WHERE master_id = $1")
            .bind(master.id.0)
            .execute(&mut *tx)
            .await?;
        for promotion in &master.promotions {
            sqlx::query(
                "INSERT INTO master_promotions (master_id, kind, expires_at) VALUES ($1, $2, $3)",
            )
            .bind(master.id.0)
            .bind(promotion.kind.as_str())
            .bind(promotion.expires_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn order_notes(&self, order_id: OrderId) -> Result<Vec<OrderNote>> {
        let rows: Vec<(Uuid, String, String, DateTime<Utc>)> = sqlx::query_as(
            "SELECT order_id, status, note, created_at FROM order_status_history
             WHERE order_id = $1 ORDER BY created_at ASC, id ASC",
        )
        .bind(order_id.0)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter()
            .map(|(order_id, status, note, created_at)| {
                Ok(OrderNote {
                    order_id: OrderId(order_id),
                    status: status.parse()?,
                    note,
                    created_at,
                })
            })
            .collect()
    }

    async fn attach_promotions(&self, rows: Vec<MasterRow>) -> Result<Vec<Master>> {
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let promos: Vec<(Uuid, String, Option<DateTime<Utc>>)> = sqlx::query_as(
            "SELECT master_id, kind, expires_at FROM master_promotions WHERE master_id = ANY($1)",
        )
        .bind(&ids)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter()
            .map(|row| {
                let promotions = promos
                    .iter()
                    .filter(|(master_id, _, _)| *master_id == row.id)
                    .map(|(_, kind, expires_at)| {
                        Ok(Promotion {
                            kind: kind.parse()?,
                            expires_at: *expires_at,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                row.try_into_master(promotions)
            })
            .collect()
    }
}

#[async_trait]
impl DispatchStore for Db {
    async fn get_order(&self, id: OrderId) -> Result<Order> {
        let row: Option<OrderRow> =
            sqlx::query_as(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
                .bind(id.0)
                .fetch_optional(self.pool())
                .await?;

        row.ok_or_else(|| Error::NotFound(format!("order {id}")))?
            .try_into_order()
    }

    async fn cas_order_status(
        &self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<CasResult<OrderStatus>> {
        let rows_affected = sqlx::query(
            "UPDATE orders SET status = $1, updated_at = now() WHERE id = $2 AND status = $3",
        )
        .bind(to.as_str())
        .bind(id.0)
        .bind(from.as_str())
        .execute(self.pool())
        .await?
        .rows_affected();

        if rows_affected > 0 {
            return Ok(CasResult::Applied);
        }

        let current: Option<(String,)> = sqlx::query_as("SELECT status FROM orders WHERE id = $1")
            .bind(id.0)
            .fetch_optional(self.pool())
            .await?;
        match current {
            Some((status,)) => Ok(CasResult::Mismatch {
                actual: status.parse()?,
            }),
            None => Ok(CasResult::NotFound),
        }
    }

    async fn append_order_note(&self, note: &OrderNote) -> Result<()> {
        sqlx::query(
            "INSERT INTO order_status_history (order_id, status, note, created_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(note.order_id.0)
        .bind(note.status.as_str())
        .bind(&note.note)
        .bind(note.created_at)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn get_master(&self, id: MasterId) -> Result<Master> {
        let row: Option<MasterRow> =
            sqlx::query_as(&format!("SELECT {MASTER_COLUMNS} FROM masters WHERE id = $1"))
                .bind(id.0)
                .fetch_optional(self.pool())
                .await?;

        let row = row.ok_or_else(|| Error::NotFound(format!("master {id}")))?;
        self.attach_promotions(vec![row])
            .await?
            .pop()
            .ok_or_else(|| Error::NotFound(format!("master {id}")))
    }

    async fn list_masters_for_device(&self, device_type: &str) -> Result<Vec<Master>> {
        let rows: Vec<MasterRow> = sqlx::query_as(&format!(
            "SELECT {MASTER_COLUMNS} FROM masters WHERE $1 = ANY(specializations) ORDER BY id"
        ))
        .bind(device_type)
        .fetch_all(self.pool())
        .await?;

        self.attach_promotions(rows).await
    }

    async fn insert_assignment(&self, assignment: &Assignment) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO assignments ({ASSIGNMENT_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"
        ))
        .bind(assignment.id.0)
        .bind(assignment.order_id.0)
        .bind(assignment.master_id.0)
        .bind(assignment.status.as_str())
        .bind(i32::try_from(assignment.attempt_number).unwrap_or(i32::MAX))
        .bind(assignment.created_at)
        .bind(assignment.expires_at)
        .bind(assignment.responded_at)
        .bind(&assignment.rejection_reason)
        .execute(self.pool())
        .await
        .map_err(|e| {
            conflict_or_db(e, || {
                format!(
                    "order {} cannot take assignment {} (attempt {}, master {})",
                    assignment.order_id,
                    assignment.id,
                    assignment.attempt_number,
                    assignment.master_id
                )
            })
        })?;
        Ok(())
    }

    async fn get_assignment(&self, id: AssignmentId) -> Result<Assignment> {
        let row: Option<AssignmentRow> = sqlx::query_as(&format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM assignments WHERE id = $1"
        ))
        .bind(id.0)
        .fetch_optional(self.pool())
        .await?;

        row.ok_or_else(|| Error::NotFound(format!("assignment {id}")))?
            .try_into_assignment()
    }

    async fn list_assignments_by_order(&self, order_id: OrderId) -> Result<Vec<Assignment>> {
        let rows: Vec<AssignmentRow> = sqlx::query_as(&format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM assignments WHERE order_id = $1 ORDER BY attempt_number ASC"
        ))
        .bind(order_id.0)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter()
            .map(AssignmentRow::try_into_assignment)
            .collect()
    }

    async fn list_overdue_pending(&self, now: DateTime<Utc>) -> Result<Vec<Assignment>> {
        let rows: Vec<AssignmentRow> = sqlx::query_as(
            "SELECT a.id, a.order_id, a.master_id, a.status, a.attempt_number, a.created_at, a.expires_at, a.responded_at, a.rejection_reason
             FROM assignments a
             JOIN orders o ON o.id = a.order_id
             WHERE a.status = 'pending' AND a.expires_at < $1 AND o.status = 'new'
             ORDER BY a.expires_at ASC",
        )
        .bind(now)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter()
            .map(AssignmentRow::try_into_assignment)
            .collect()
    }

    async fn cas_assignment_status(
        &self,
        id: AssignmentId,
        to: AssignmentStatus,
        reason: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<CasResult<AssignmentStatus>> {
        if !AssignmentStatus::Pending.can_transition_to(to) {
            return Err(Error::Other(format!("{to} is not reachable from pending")));
        }

        let rows_affected = sqlx::query(
            "UPDATE assignments SET status = $1, responded_at = $2, rejection_reason = $3
             WHERE id = $4 AND status = 'pending'",
        )
        .bind(to.as_str())
        .bind(at)
        .bind(reason)
        .bind(id.0)
        .execute(self.pool())
        .await?
        .rows_affected();

        if rows_affected > 0 {
            return Ok(CasResult::Applied);
        }

        let current: Option<(String,)> =
            sqlx::query_as("SELECT status FROM assignments WHERE id = $1")
                .bind(id.0)
                .fetch_optional(self.pool())
                .await?;
        match current {
            Some((status,)) => Ok(CasResult::Mismatch {
                actual: status.parse()?,
            }),
            None => Ok(CasResult::NotFound),
        }
    }
}

fn point(latitude: Option<f64>, longitude: Option<f64>) -> Option<GeoPoint> {
    match (latitude, longitude) {
        (Some(latitude), Some(longitude)) => Some(GeoPoint {
            latitude,
            longitude,
        }),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    device_type: String,
    device_brand: Option<String>,
    device_model: Option<String>,
    problem_description: String,
    address: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    client_name: String,
    client_phone: Option<String>,
    client_email: Option<String>,
    preferred_arrival: Option<String>,
    estimated_cost: Option<f64>,
    final_cost: Option<f64>,
    urgency: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OrderRow {
    fn try_into_order(self) -> Result<Order> {
        Ok(Order {
            id: OrderId(self.id),
            device_type: self.device_type,
            device_brand: self.device_brand,
            device_model: self.device_model,
            problem_description: self.problem_description,
            address: self.address,
            location: point(self.latitude, self.longitude),
            client_name: self.client_name,
            client_phone: self.client_phone,
            client_email: self.client_email,
            preferred_arrival: self.preferred_arrival,
            estimated_cost: self.estimated_cost,
            final_cost: self.final_cost,
            urgency: self.urgency.parse()?,
            status: self.status.parse()?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct MasterRow {
    id: Uuid,
    user_id: Uuid,
    name: String,
    latitude: Option<f64>,
    longitude: Option<f64>,
    specializations: Vec<String>,
    rating: f64,
    completed_orders: i32,
    active_orders: i32,
    on_shift: bool,
    availability: String,
    subscription: String,
}

impl MasterRow {
    fn try_into_master(self, promotions: Vec<Promotion>) -> Result<Master> {
        Ok(Master {
            id: MasterId(self.id),
            user_id: UserId(self.user_id),
            name: self.name,
            location: point(self.latitude, self.longitude),
            specializations: self.specializations,
            rating: self.rating,
            completed_orders: self.completed_orders.max(0) as u32,
            active_orders: self.active_orders.max(0) as u32,
            on_shift: self.on_shift,
            availability: self.availability.parse()?,
            subscription: self.subscription.parse()?,
            promotions,
        })
    }
}

#[derive(sqlx::FromRow)]
struct AssignmentRow {
    id: Uuid,
    order_id: Uuid,
    master_id: Uuid,
    status: String,
    attempt_number: i32,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    responded_at: Option<DateTime<Utc>>,
    rejection_reason: Option<String>,
}

impl AssignmentRow {
    fn try_into_assignment(self) -> Result<Assignment> {
        Ok(Assignment {
            id: AssignmentId(self.id),
            order_id: OrderId(self.order_id),
            master_id: MasterId(self.master_id),
            status: self.status.parse()?,
            attempt_number: u32::try_from(self.attempt_number)
                .map_err(|_| Error::Other(format!("bad attempt number {}", self.attempt_number)))?,
            created_at: self.created_at,
            expires_at: self.expires_at,
            responded_at: self.responded_at,
            rejection_reason: self.rejection_reason,
        })
    }
}
