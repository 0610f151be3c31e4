use std::sync::Arc;

use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::error::AppError;
use crate::lifecycle::service::OrderService;
use crate::lifecycle::tracking_code::TrackingCode;
use crate::models::order::{EtaEstimate, Order, OrderStatus};
use crate::notify::{EventFilter, FeedError, FeedSubscription, OrderFeed};
use crate::store::OrderStore;

/// What the customer tracking page renders.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TrackingSnapshot {
    /// Unknown code renders as a dedicated state, not an error.
    NotFound,
    Found {
        order_id: Uuid,
        tracking_code: TrackingCode,
        status: OrderStatus,
        status_label: &'static str,
        /// Position within the five-step indicator; absent when cancelled.
        step_index: Option<usize>,
        can_cancel: bool,
        eta: Option<EtaEstimate>,
    },
}

impl TrackingSnapshot {
    fn from_order(order: &Order) -> Self {
        Self::Found {
            order_id: order.id,
            tracking_code: order.tracking_code.clone(),
            status: order.status,
            status_label: order.status.label(),
            step_index: order.status.step_index(),
            can_cancel: order.status == OrderStatus::Pending,
            eta: order.eta.clone(),
        }
    }
}

/// Customer-facing view of one order. Owns its feed subscription; dropping
/// the view tears the subscription down. Events are treated as refresh
/// signals only — every render refetches the authoritative record.
pub struct TrackingView {
    store: Arc<dyn OrderStore>,
    subscription: Option<FeedSubscription>,
    order_id: Option<Uuid>,
    snapshot: TrackingSnapshot,
    /// Set once the feed closes; the caller should fall back to periodic
    /// `refresh` calls instead of waiting on events.
    polling_fallback: bool,
}

impl TrackingView {
    /// Opens the view for a raw customer-supplied code. Format errors bubble
    /// up; an unknown (but well-formed) code opens in the not-found state.
    pub fn open(
        store: Arc<dyn OrderStore>,
        feed: &OrderFeed,
        raw_code: &str,
    ) -> Result<Self, AppError> {
        let code = TrackingCode::parse(raw_code)?;

        let Some(resolved) = store.find_by_tracking_code(&code) else {
            return Ok(Self {
                store,
                subscription: None,
                order_id: None,
                snapshot: TrackingSnapshot::NotFound,
                polling_fallback: false,
            });
        };

        // Subscribe before the snapshot fetch: a transition landing during
        // open is then either covered by the refetch below or delivered as
        // an event, never lost in between.
        let subscription = feed.subscribe(EventFilter::Order(resolved.id));
        let order = store.get(resolved.id).unwrap_or(resolved);

        Ok(Self {
            store,
            subscription: Some(subscription),
            order_id: Some(order.id),
            snapshot: TrackingSnapshot::from_order(&order),
            polling_fallback: false,
        })
    }

    pub fn snapshot(&self) -> &TrackingSnapshot {
        &self.snapshot
    }

    pub fn is_polling_fallback(&self) -> bool {
        self.polling_fallback
    }

    /// Refetches the authoritative record and re-renders.
    pub fn refresh(&mut self) {
        if let Some(id) = self.order_id {
            self.snapshot = match self.store.get(id) {
                Some(order) => TrackingSnapshot::from_order(&order),
                None => TrackingSnapshot::NotFound,
            };
        }
    }

    /// Waits for the next change signal, then refetches. A lagged channel
    /// forces a refetch too; a closed channel flips the view into polling
    /// fallback rather than pretending nothing changed.
    pub async fn next_change(&mut self) -> Result<(), FeedError> {
        let Some(subscription) = self.subscription.as_mut() else {
            return Err(FeedError::Closed);
        };

        match subscription.recv().await {
            Ok(_) | Err(FeedError::Lagged(_)) => {
                self.refresh();
                Ok(())
            }
            Err(FeedError::Closed) => {
                warn!("tracking feed closed; degrading to polling");
                self.subscription = None;
                self.polling_fallback = true;
                self.refresh();
                Err(FeedError::Closed)
            }
        }
    }

    /// Cancels the order. Only offered while `pending`; the affordance
    /// disappears from the snapshot once the status moves on.
    pub fn cancel(&mut self, orders: &OrderService, reason: &str) -> Result<(), AppError> {
        let id = self.order_id.ok_or(AppError::NotFound)?;
        orders.cancel(id, reason, "customer")?;
        self.refresh();
        Ok(())
    }

    /// Explicit teardown, for call sites that want to close before drop.
    pub fn close(&mut self) {
        self.subscription = None;
    }
}
