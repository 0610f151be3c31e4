use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

/// A delivery courier. `position` is the latest known coordinate pair and is
/// overwritten on every update; position history, where it matters, lives in
/// the transition log entries that carry coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Courier {
    pub id: Uuid,
    pub name: String,
    pub position: Option<GeoPoint>,
    pub updated_at: DateTime<Utc>,
}
