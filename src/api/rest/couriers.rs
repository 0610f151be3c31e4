use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::routing::{patch, post};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::courier::{Courier, GeoPoint};
use crate::models::order::OrderStatus;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/couriers", post(create_courier).get(list_couriers))
        .route("/couriers/:id/position", patch(update_position))
}

#[derive(Deserialize)]
pub struct CreateCourierRequest {
    pub name: String,
    pub position: Option<GeoPoint>,
}

#[derive(Deserialize)]
pub struct UpdatePositionRequest {
    pub position: GeoPoint,
}

async fn create_courier(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateCourierRequest>,
) -> Result<Json<Courier>, AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }

    let courier = Courier {
        id: Uuid::new_v4(),
        name: payload.name,
        position: payload.position,
        updated_at: Utc::now(),
    };

    state.couriers.insert(courier.id, courier.clone());
    Ok(Json(courier))
}

async fn list_couriers(State(state): State<Arc<AppState>>) -> Json<Vec<Courier>> {
    let couriers = state
        .couriers
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    Json(couriers)
}

/// Overwrites the courier's last known position and refreshes ETAs for any
/// active deliveries they carry.
async fn update_position(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdatePositionRequest>,
) -> Result<Json<Courier>, AppError> {
    let updated = {
        let mut courier = state
            .couriers
            .get_mut(&id)
            .ok_or_else(|| AppError::BadRequest(format!("courier {id} not found")))?;

        courier.position = Some(payload.position);
        courier.updated_at = Utc::now();
        courier.clone()
    };

    let carrying = state
        .orders
        .store()
        .list_by_status(&[OrderStatus::OutForDelivery], usize::MAX);
    for order in carrying.iter().filter(|o| o.courier_id == Some(id)) {
        state.orders.refresh_eta(order);
    }

    Ok(Json(updated))
}
