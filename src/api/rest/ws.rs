use std::collections::HashSet;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use futures::SinkExt;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::api::rest::orders::parse_status_list;
use crate::error::AppError;
use crate::lifecycle::tracking_code::TrackingCode;
use crate::notify::{EventFilter, FeedError};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct OpsWsQuery {
    pub status: Option<String>,
}

/// Push channel for one order's tracking page. The messages are refresh
/// signals; the page refetches `/track/:code` on each one.
pub async fn track_handler(
    ws: WebSocketUpgrade,
    Path(code): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let code = TrackingCode::parse(&code)?;
    let order = state
        .orders
        .store()
        .find_by_tracking_code(&code)
        .ok_or(AppError::NotFound)?;

    let filter = EventFilter::Order(order.id);
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, filter)))
}

/// Push channel for the operations dashboard; optionally narrowed to a
/// comma-separated status list.
pub async fn ops_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<OpsWsQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let filter = match query.status.as_deref() {
        Some(raw) => {
            let statuses = parse_status_list(raw)?;
            EventFilter::Statuses(HashSet::from_iter(statuses))
        }
        None => EventFilter::All,
    };

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, filter)))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, filter: EventFilter) {
    let (mut sender, mut receiver) = socket.split();
    let mut subscription = state.feed.subscribe(filter);

    info!("websocket client connected");

    let send_task = tokio::spawn(async move {
        loop {
            let signal = match subscription.recv().await {
                Ok(event) => json!({
                    "type": "order_updated",
                    "order_id": event.order_id,
                    "tracking_code": event.tracking_code,
                    "status": event.status,
                    "occurred_at": event.occurred_at,
                }),
                // The client cannot tell which events were dropped, so tell
                // it to refetch everything it watches.
                Err(FeedError::Lagged(skipped)) => {
                    warn!(skipped, "ws subscription lagged");
                    json!({ "type": "resync" })
                }
                Err(FeedError::Closed) => break,
            };

            let text = match serde_json::to_string(&signal) {
                Ok(text) => text,
                Err(err) => {
                    warn!(error = %err, "failed to serialize ws signal");
                    continue;
                }
            };

            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    let recv_task = tokio::spawn(async move {
        while let Some(Ok(_msg)) = receiver.next().await {}
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    info!("websocket client disconnected");
}
