//! Shipment, customer, driver and vehicle rows shared by every FreightDesk crate.
//!
//! These are plain data types (`Serialize + Deserialize`). Transition rules
//! and payment eligibility live in `fd-lifecycle`; persistence lives in `fd-db`.

pub mod money;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use money::{paise_to_rupees, rupees_to_paise, MoneyError, Paise, PAISE_PER_RUPEE};

// ---------------------------------------------------------------------------
// ShipmentStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShipmentStatus {
    Pending,
    InTransit,
    Arrived,
    Delivered,
    Cancelled,
}

impl ShipmentStatus {
    pub const ALL: [ShipmentStatus; 5] = [
        ShipmentStatus::Pending,
        ShipmentStatus::InTransit,
        ShipmentStatus::Arrived,
        ShipmentStatus::Delivered,
        ShipmentStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ShipmentStatus::Pending => "pending",
            ShipmentStatus::InTransit => "in_transit",
            ShipmentStatus::Arrived => "arrived",
            ShipmentStatus::Delivered => "delivered",
            ShipmentStatus::Cancelled => "cancelled",
        }
    }

    /// `delivered` and `cancelled` admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ShipmentStatus::Delivered | ShipmentStatus::Cancelled)
    }
}

impl std::fmt::Display for ShipmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ShipmentStatus {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "pending" => Ok(ShipmentStatus::Pending),
            "in_transit" => Ok(ShipmentStatus::InTransit),
            "arrived" => Ok(ShipmentStatus::Arrived),
            "delivered" => Ok(ShipmentStatus::Delivered),
            "cancelled" => Ok(ShipmentStatus::Cancelled),
            other => Err(UnknownValue {
                kind: "shipment status",
                value: other.to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// PaymentStatus
// ---------------------------------------------------------------------------

/// Gateway payment progress. "Unset" is represented as `Option::None` on the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Initiated,
    Completed,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Initiated => "initiated",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "initiated" => Ok(PaymentStatus::Initiated),
            "completed" => Ok(PaymentStatus::Completed),
            "failed" => Ok(PaymentStatus::Failed),
            other => Err(UnknownValue {
                kind: "payment status",
                value: other.to_string(),
            }),
        }
    }
}

/// Returned when a stored enum column holds a value this build does not know.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownValue {
    pub kind: &'static str,
    pub value: String,
}

impl std::fmt::Display for UnknownValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid {}: {:?}", self.kind, self.value)
    }
}

impl std::error::Error for UnknownValue {}

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shipment {
    pub id: Uuid,
    pub shipment_number: String,
    pub status: ShipmentStatus,
    pub payment_status: Option<PaymentStatus>,
    pub otp_verified_at: Option<DateTime<Utc>>,
    /// Payable amount. `None` is treated as zero.
    pub revenue: Option<Paise>,
    /// Gateway transaction reference from the latest successful initiation.
    pub phonepe_order_id: Option<String>,
    pub start_location: String,
    pub destination: String,
    pub customer_id: Option<Uuid>,
    pub driver_id: Option<Uuid>,
    pub vehicle_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Shipment {
    pub fn payable_amount(&self) -> Paise {
        self.revenue.unwrap_or(Paise::ZERO)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: Uuid,
    pub name: String,
    pub phone_number: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Driver {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: Uuid,
    pub r#type: String,
    pub license_plate: Option<String>,
}

/// A shipment joined with its (read-only) relations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShipmentWithRelations {
    #[serde(flatten)]
    pub shipment: Shipment,
    pub customer: Option<Customer>,
    pub driver: Option<Driver>,
    pub vehicle: Option<Vehicle>,
}

impl ShipmentWithRelations {
    /// Customer phone as sent to the gateway; empty when no customer is linked.
    pub fn customer_phone(&self) -> &str {
        self.customer
            .as_ref()
            .map(|c| c.phone_number.as_str())
            .unwrap_or("")
    }
}
