use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::routing::post;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::order::{Order, OrderStatus};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/payments/events", post(payment_event))
}

/// Outcome reported by the payment processor. Payment logic itself lives on
/// their side; these events only drive the lifecycle.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentOutcome {
    Confirmed,
    Failed,
}

#[derive(Deserialize)]
pub struct PaymentEventRequest {
    pub order_id: Uuid,
    pub outcome: PaymentOutcome,
    pub reference: Option<String>,
}

async fn payment_event(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<PaymentEventRequest>,
) -> Result<Json<Order>, AppError> {
    let message = payload
        .reference
        .map(|r| format!("payment reference {r}"));

    let order = match payload.outcome {
        PaymentOutcome::Confirmed => state.orders.advance(
            payload.order_id,
            OrderStatus::Confirmed,
            "payment-processor",
            message,
            None,
        )?,
        PaymentOutcome::Failed => {
            state
                .orders
                .cancel(payload.order_id, "payment failed", "payment-processor")?
        }
    };

    Ok(Json(order))
}
