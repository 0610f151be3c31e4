use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::courier::GeoPoint;
use crate::models::order::OrderStatus;

/// One entry in an order's append-only transition log. Entries are written
/// together with the status change they record and are never edited; the only
/// removal path is the age-based retention purge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusTransition {
    pub status: OrderStatus,
    pub message: Option<String>,
    pub location: Option<GeoPoint>,
    pub created_at: DateTime<Utc>,
}

impl StatusTransition {
    pub fn new(status: OrderStatus, message: Option<String>, location: Option<GeoPoint>) -> Self {
        Self {
            status,
            message,
            location,
            created_at: Utc::now(),
        }
    }
}
