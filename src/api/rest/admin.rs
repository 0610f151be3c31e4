use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::routing::{delete, post};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

/// Maintenance actions outside the normal order lifecycle: hard deletion and
/// the age-based transition log purge.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/admin/orders/:id", delete(delete_order))
        .route("/admin/transitions/purge", post(purge_transitions))
}

#[derive(Deserialize)]
pub struct PurgeRequest {
    pub older_than_days: u32,
}

#[derive(Serialize)]
pub struct PurgeResponse {
    pub removed: usize,
}

async fn delete_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    let removed = state.orders.store().remove(id).ok_or(AppError::NotFound)?;
    info!(order_id = %removed.id, "order deleted by admin");
    Ok(Json(serde_json::json!({ "deleted": removed.id })))
}

async fn purge_transitions(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<PurgeRequest>,
) -> Result<Json<PurgeResponse>, AppError> {
    if payload.older_than_days == 0 {
        return Err(AppError::BadRequest(
            "older_than_days must be > 0".to_string(),
        ));
    }

    let cutoff = Utc::now() - Duration::days(i64::from(payload.older_than_days));
    let removed = state.orders.store().purge_transitions_before(cutoff);

    info!(removed, older_than_days = payload.older_than_days, "transition log purged");
    Ok(Json(PurgeResponse { removed }))
}
