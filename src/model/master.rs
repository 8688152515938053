//! Technicians ("masters") and the attributes ranking reads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{GeoPoint, MasterId, UserId};
use crate::error::{Error, Result};

/// A field technician. Read-only to the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Master {
    pub id: MasterId,
    pub user_id: UserId,
    pub name: String,
    pub location: Option<GeoPoint>,

    /// Device-type keys this master repairs.
    pub specializations: Vec<String>,

    /// Average client rating, nominally in [0, 5].
    pub rating: f64,
    pub completed_orders: u32,
    pub active_orders: u32,

    pub on_shift: bool,
    pub availability: Availability,
    pub subscription: Subscription,
    pub promotions: Vec<Promotion>,
}

impl Master {
    /// An on-shift, available basic-tier master with no history.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: MasterId::new(),
            user_id: UserId::new(),
            name: name.into(),
            location: None,
            specializations: Vec::new(),
            rating: 0.0,
            completed_orders: 0,
            active_orders: 0,
            on_shift: true,
            availability: Availability::Available,
            subscription: Subscription::Basic,
            promotions: Vec::new(),
        }
    }

    pub fn specializes_in(&self, device_type: &str) -> bool {
        self.specializations.iter().any(|s| s == device_type)
    }

    /// On shift and marked available.
    pub fn is_accepting_work(&self) -> bool {
        self.on_shift && self.availability == Availability::Available
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    Available,
    Busy,
    Offline,
}

impl Availability {
    pub fn as_str(self) -> &'static str {
        match self {
            Availability::Available => "available",
            Availability::Busy => "busy",
            Availability::Offline => "offline",
        }
    }
}

impl std::str::FromStr for Availability {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "available" => Ok(Availability::Available),
            "busy" => Ok(Availability::Busy),
            "offline" => Ok(Availability::Offline),
            _ => Err(Error::Other(format!("unknown availability: {s}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subscription {
    Basic,
    Premium,
}

impl Subscription {
    pub fn as_str(self) -> &'static str {
        match self {
            Subscription::Basic => "basic",
            Subscription::Premium => "premium",
        }
    }
}

impl std::str::FromStr for Subscription {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "basic" => Ok(Subscription::Basic),
            "premium" => Ok(Subscription::Premium),
            _ => Err(Error::Other(format!("unknown subscription: {s}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Promotions
// ---------------------------------------------------------------------------

/// A paid listing boost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Promotion {
    pub kind: PromotionKind,
    /// None means the promotion does not lapse.
    pub expires_at: Option<DateTime<Utc>>,
}

impl Promotion {
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromotionKind {
    TopListing,
    Highlighted,
    Featured,
}

impl PromotionKind {
    /// Score bonus contributed while active.
    pub fn bonus(self) -> f64 {
        match self {
            PromotionKind::TopListing => 0.05,
            PromotionKind::Highlighted => 0.03,
            PromotionKind::Featured => 0.07,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PromotionKind::TopListing => "top_listing",
            PromotionKind::Highlighted => "highlighted",
            PromotionKind::Featured => "featured",
        }
    }
}

impl std::str::FromStr for PromotionKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "top_listing" => Ok(PromotionKind::TopListing),
            "highlighted" => Ok(PromotionKind::Highlighted),
            "featured" => Ok(PromotionKind::Featured),
            _ => Err(Error::Other(format!("unknown promotion kind: {s}"))),
        }
    }
}
