use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::courier::GeoPoint;
use crate::models::order::{DeliveryAddress, LineItem, Order, OrderStatus};
use crate::state::AppState;
use crate::views::live_ops::DEFAULT_BATCH_LIMIT;
use crate::views::tracking::{TrackingSnapshot, TrackingView};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", post(create_order))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/advance", post(advance_order))
        .route("/orders/:id/cancel", post(cancel_order))
        .route("/orders/:id/courier", post(assign_courier))
        .route("/track/:code", get(track_order))
        .route("/ops/orders", get(list_ops_orders))
}

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub items: Vec<LineItem>,
    pub address: DeliveryAddress,
    pub payment_method: String,
}

#[derive(Deserialize)]
pub struct AdvanceRequest {
    pub status: OrderStatus,
    pub actor: Option<String>,
    pub message: Option<String>,
    pub location: Option<GeoPoint>,
}

#[derive(Deserialize)]
pub struct CancelRequest {
    pub reason: String,
    pub actor: Option<String>,
}

#[derive(Deserialize)]
pub struct AssignCourierRequest {
    pub courier_id: Uuid,
}

#[derive(Deserialize)]
pub struct OpsQuery {
    /// Comma-separated status list, e.g. `pending,confirmed`.
    pub status: Option<String>,
    pub limit: Option<usize>,
}

async fn create_order(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<Json<Order>, AppError> {
    let order = state
        .orders
        .create(payload.items, payload.address, payload.payment_method)?;
    Ok(Json(order))
}

async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    let order = state.orders.store().get(id).ok_or(AppError::NotFound)?;
    Ok(Json(order))
}

async fn advance_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AdvanceRequest>,
) -> Result<Json<Order>, AppError> {
    let actor = payload.actor.as_deref().unwrap_or("system");
    let order = state
        .orders
        .advance(id, payload.status, actor, payload.message, payload.location)?;
    Ok(Json(order))
}

async fn cancel_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CancelRequest>,
) -> Result<Json<Order>, AppError> {
    let actor = payload.actor.as_deref().unwrap_or("customer");
    let order = state.orders.cancel(id, &payload.reason, actor)?;
    Ok(Json(order))
}

async fn assign_courier(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AssignCourierRequest>,
) -> Result<Json<Order>, AppError> {
    let order = state.orders.assign_courier(id, payload.courier_id)?;
    Ok(Json(order))
}

/// Public tracking lookup by code; unauthenticated by design. Unknown codes
/// come back as a not-found snapshot with a 404.
async fn track_order(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Result<axum::response::Response, AppError> {
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    let view = TrackingView::open(state.orders.store().clone(), &state.feed, &code)?;
    let status = match view.snapshot() {
        TrackingSnapshot::NotFound => StatusCode::NOT_FOUND,
        TrackingSnapshot::Found { .. } => StatusCode::OK,
    };

    Ok((status, Json(view.snapshot().clone())).into_response())
}

/// Batch fetch for the operations dashboard. Defaults to all active
/// (non-terminal) statuses, capped at 100 rows.
async fn list_ops_orders(
    State(state): State<Arc<AppState>>,
    Query(query): Query<OpsQuery>,
) -> Result<Json<Vec<Order>>, AppError> {
    let statuses = match query.status.as_deref() {
        Some(raw) => parse_status_list(raw)?,
        None => vec![
            OrderStatus::Pending,
            OrderStatus::Confirmed,
            OrderStatus::Preparing,
            OrderStatus::OutForDelivery,
        ],
    };

    let limit = query.limit.unwrap_or(DEFAULT_BATCH_LIMIT).min(DEFAULT_BATCH_LIMIT);
    let orders = state.orders.store().list_by_status(&statuses, limit);
    Ok(Json(orders))
}

pub(crate) fn parse_status_list(raw: &str) -> Result<Vec<OrderStatus>, AppError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            serde_json::from_value(serde_json::Value::String(s.to_string()))
                .map_err(|_| AppError::BadRequest(format!("unknown status: {s}")))
        })
        .collect()
}
