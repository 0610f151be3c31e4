use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::lifecycle::tracking_code::TrackingCode;
use crate::models::courier::GeoPoint;
use crate::models::transition::StatusTransition;

/// Fixed delivery lifecycle. Forward-only through the first five values;
/// `Cancelled` is reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Preparing,
    OutForDelivery,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    /// The immediate successor in the happy path, if any.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Pending => Some(Self::Confirmed),
            Self::Confirmed => Some(Self::Preparing),
            Self::Preparing => Some(Self::OutForDelivery),
            Self::OutForDelivery => Some(Self::Delivered),
            Self::Delivered | Self::Cancelled => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled)
    }

    /// Zero-based position in the customer-facing step indicator.
    /// `Cancelled` sits outside the sequence.
    pub fn step_index(self) -> Option<usize> {
        match self {
            Self::Pending => Some(0),
            Self::Confirmed => Some(1),
            Self::Preparing => Some(2),
            Self::OutForDelivery => Some(3),
            Self::Delivered => Some(4),
            Self::Cancelled => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Preparing => "preparing",
            Self::OutForDelivery => "out_for_delivery",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }

    /// Display label, kept as an explicit mapping rather than derived from
    /// the wire form.
    pub fn label(self) -> &'static str {
        match self {
            Self::Pending => "Order placed",
            Self::Confirmed => "Confirmed",
            Self::Preparing => "Preparing",
            Self::OutForDelivery => "Out for delivery",
            Self::Delivered => "Delivered",
            Self::Cancelled => "Cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable snapshot of a catalog item at order time. Catalog price changes
/// after checkout never touch these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: Uuid,
    pub name: String,
    pub quantity: u32,
    pub unit_price_cents: u64,
}

impl LineItem {
    /// Quantity times unit price; `None` when the product would not fit in
    /// a `u64`. Prices arrive from the client, so this must not wrap.
    pub fn line_total_cents(&self) -> Option<u64> {
        self.unit_price_cents.checked_mul(u64::from(self.quantity))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryAddress {
    pub street: String,
    pub borough: String,
    pub location: Option<GeoPoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EtaEstimate {
    pub eta_minutes: u32,
    pub distance_miles: f64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub tracking_code: TrackingCode,
    pub status: OrderStatus,
    pub items: Vec<LineItem>,
    pub subtotal_cents: u64,
    pub delivery_fee_cents: u64,
    pub total_cents: u64,
    pub address: DeliveryAddress,
    pub courier_id: Option<Uuid>,
    pub eta: Option<EtaEstimate>,
    pub transitions: Vec<StatusTransition>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
