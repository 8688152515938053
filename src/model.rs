//! Core data model.
//!
//! Orders are owned by order management, masters by the technician
//! directory. The engine reads both and owns only assignments.

pub mod assignment;
pub mod master;
pub mod order;

pub use assignment::{Assignment, AssignmentStatus};
pub use master::{Availability, Master, Promotion, PromotionKind, Subscription};
pub use order::{GeoPoint, Order, OrderNote, OrderStatus, Urgency};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

uuid_id!(
    /// Repair order identifier.
    OrderId
);
uuid_id!(
    /// Technician identifier.
    MasterId
);
uuid_id!(
    /// Account behind a master; the address notifications go to.
    UserId
);
uuid_id!(
    /// Offer identifier.
    AssignmentId
);
