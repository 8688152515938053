//! Error types for repair-dispatch.

use thiserror::Error;

use crate::model::{AssignmentId, AssignmentStatus};

#[derive(Debug, Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    /// A transition was attempted on an assignment that is no longer pending.
    #[error("invalid transition for assignment {id}: {from} -> {to}")]
    InvalidTransition {
        id: AssignmentId,
        from: AssignmentStatus,
        to: AssignmentStatus,
    },

    /// A write would break single-flight or no-repeat-master for an order.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("persistence failure: {0}")]
    Persistence(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// True for storage-layer failures the caller may retry as a whole.
    pub fn is_persistence(&self) -> bool {
        matches!(self, Error::Database(_) | Error::Persistence(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
