//! Offer notifications over Postgres `NOTIFY`.
//!
//! A push gateway listens on [`OFFER_CHANNEL`] and fans payloads out to the
//! master's devices.

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, warn};

use super::Db;
use crate::disclosure::AssignmentView;
use crate::model::UserId;
use crate::notify::Notifier;

pub const OFFER_CHANNEL: &str = "assignment_offer";

#[derive(Clone)]
pub struct PgNotifier {
    db: Db,
}

impl PgNotifier {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Notifier for PgNotifier {
    async fn notify(&self, master_user_id: UserId, payload: &AssignmentView) -> bool {
        let body = json!({
            "user_id": master_user_id,
            "offer": payload,
        });

        let result = sqlx::query("SELECT pg_notify($1, $2)")
            .bind(OFFER_CHANNEL)
            .bind(body.to_string())
            .execute(self.db.pool())
            .await;

        match result {
            Ok(_) => {
                debug!(user_id = %master_user_id, assignment_id = %payload.assignment_id(), "offer published");
                true
            }
            Err(e) => {
                warn!(user_id = %master_user_id, error = %e, "pg_notify failed");
                false
            }
        }
    }
}
