//! Repair orders as the engine sees them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::OrderId;
use crate::error::{Error, Result};

/// A client's repair request.
///
/// Client contact, device make and pricing fields are carried so the full
/// record can be returned after acceptance; the disclosure filter keeps
/// them out of pending offers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,

    /// Device-type key matched against master specializations
    /// (e.g. "washing_machine").
    pub device_type: String,
    pub device_brand: Option<String>,
    pub device_model: Option<String>,
    pub problem_description: String,

    pub address: Option<String>,
    pub location: Option<GeoPoint>,

    pub client_name: String,
    pub client_phone: Option<String>,
    pub client_email: Option<String>,

    /// Free-form arrival window the client asked for ("after 18:00").
    pub preferred_arrival: Option<String>,
    pub estimated_cost: Option<f64>,
    pub final_cost: Option<f64>,

    pub urgency: Urgency,
    pub status: OrderStatus,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// A fresh order in `new` status. Optional fields start empty.
    pub fn new(
        device_type: impl Into<String>,
        problem_description: impl Into<String>,
        client_name: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: OrderId::new(),
            device_type: device_type.into(),
            device_brand: None,
            device_model: None,
            problem_description: problem_description.into(),
            address: None,
            location: None,
            client_name: client_name.into(),
            client_phone: None,
            client_email: None,
            preferred_arrival: None,
            estimated_cost: None,
            final_cost: None,
            urgency: Urgency::Planned,
            status: OrderStatus::New,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn at(mut self, latitude: f64, longitude: f64) -> Self {
        self.location = Some(GeoPoint {
            latitude,
            longitude,
        });
        self
    }
}

/// WGS84 coordinate pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    New,
    InProgress,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::New => "new",
            OrderStatus::InProgress => "in_progress",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "new" => Ok(OrderStatus::New),
            "in_progress" => Ok(OrderStatus::InProgress),
            "completed" => Ok(OrderStatus::Completed),
            "cancelled" => Ok(OrderStatus::Cancelled),
            _ => Err(Error::Other(format!("unknown order status: {s}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Planned,
    Urgent,
    Emergency,
}

impl std::fmt::Display for Urgency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Urgency::Planned => "planned",
            Urgency::Urgent => "urgent",
            Urgency::Emergency => "emergency",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Urgency {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "planned" => Ok(Urgency::Planned),
            "urgent" => Ok(Urgency::Urgent),
            "emergency" => Ok(Urgency::Emergency),
            _ => Err(Error::Other(format!("unknown urgency: {s}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

/// An entry in an order's status history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderNote {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub note: String,
    pub created_at: DateTime<Utc>,
}
