use std::collections::HashSet;

use chrono::{DateTime, Utc};
use prometheus::IntGauge;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::lifecycle::tracking_code::TrackingCode;
use crate::models::order::OrderStatus;

/// Change notification for one order. The payload is a signal to refetch the
/// authoritative record, not a diff; subscribers must not treat it as
/// complete truth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderEvent {
    pub order_id: Uuid,
    pub tracking_code: TrackingCode,
    pub status: OrderStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Subscription granularity: one order, a status set, or everything.
#[derive(Debug, Clone)]
pub enum EventFilter {
    All,
    Order(Uuid),
    Statuses(HashSet<OrderStatus>),
}

impl EventFilter {
    pub fn matches(&self, event: &OrderEvent) -> bool {
        match self {
            Self::All => true,
            Self::Order(id) => event.order_id == *id,
            Self::Statuses(set) => set.contains(&event.status),
        }
    }
}

/// What a subscriber sees when the channel misbehaves. `Lagged` means events
/// were dropped and the subscriber must refetch; `Closed` means the feed is
/// gone and the subscriber must fall back to polling. Neither may be treated
/// as "no changes occurred".
#[derive(Debug, PartialEq, Eq)]
pub enum FeedError {
    Lagged(u64),
    Closed,
}

/// Fan-out point for order change events.
#[derive(Clone)]
pub struct OrderFeed {
    tx: broadcast::Sender<OrderEvent>,
    subscribers: IntGauge,
}

impl OrderFeed {
    pub fn new(buffer_size: usize, subscribers: IntGauge) -> Self {
        let (tx, _unused_rx) = broadcast::channel(buffer_size);
        Self { tx, subscribers }
    }

    /// Best-effort publish. A send with no live subscribers is not an error.
    pub fn publish(&self, event: OrderEvent) {
        let _ = self.tx.send(event);
    }

    /// Opens a subscription as an explicitly owned resource; dropping it is
    /// the teardown.
    pub fn subscribe(&self, filter: EventFilter) -> FeedSubscription {
        self.subscribers.inc();
        FeedSubscription {
            rx: self.tx.subscribe(),
            filter,
            subscribers: self.subscribers.clone(),
        }
    }
}

pub struct FeedSubscription {
    rx: broadcast::Receiver<OrderEvent>,
    filter: EventFilter,
    subscribers: IntGauge,
}

impl FeedSubscription {
    /// Waits for the next event matching this subscription's filter.
    pub async fn recv(&mut self) -> Result<OrderEvent, FeedError> {
        loop {
            match self.rx.recv().await {
                Ok(event) if self.filter.matches(&event) => return Ok(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    return Err(FeedError::Lagged(skipped));
                }
                Err(broadcast::error::RecvError::Closed) => return Err(FeedError::Closed),
            }
        }
    }
}

impl Drop for FeedSubscription {
    fn drop(&mut self) {
        self.subscribers.dec();
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use prometheus::IntGauge;
    use uuid::Uuid;

    use super::{EventFilter, FeedError, OrderEvent, OrderFeed};
    use crate::lifecycle::tracking_code::TrackingCode;
    use crate::models::order::OrderStatus;

    fn feed() -> OrderFeed {
        let gauge = IntGauge::new("test_subscribers", "subscribers").unwrap();
        OrderFeed::new(16, gauge)
    }

    fn event(order_id: Uuid, status: OrderStatus) -> OrderEvent {
        OrderEvent {
            order_id,
            tracking_code: TrackingCode::generate(),
            status,
            occurred_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn single_order_filter_skips_other_orders() {
        let feed = feed();
        let watched = Uuid::new_v4();
        let mut sub = feed.subscribe(EventFilter::Order(watched));

        feed.publish(event(Uuid::new_v4(), OrderStatus::Confirmed));
        feed.publish(event(watched, OrderStatus::Preparing));

        let got = sub.recv().await.unwrap();
        assert_eq!(got.order_id, watched);
        assert_eq!(got.status, OrderStatus::Preparing);
    }

    #[tokio::test]
    async fn status_filters_partition_events_at_the_boundary() {
        let feed = feed();
        let mut active_sub = feed.subscribe(EventFilter::Statuses(HashSet::from([
            OrderStatus::Pending,
            OrderStatus::Confirmed,
            OrderStatus::Preparing,
            OrderStatus::OutForDelivery,
        ])));
        let mut done_sub =
            feed.subscribe(EventFilter::Statuses(HashSet::from([OrderStatus::Delivered])));

        let order_id = Uuid::new_v4();
        feed.publish(event(order_id, OrderStatus::OutForDelivery));
        feed.publish(event(order_id, OrderStatus::Delivered));

        let active = active_sub.recv().await.unwrap();
        assert_eq!(active.status, OrderStatus::OutForDelivery);

        // The delivered event crossed out of the active filter and into the
        // done filter; each view sees only its own side.
        let done = done_sub.recv().await.unwrap();
        assert_eq!(done.status, OrderStatus::Delivered);
    }

    #[tokio::test]
    async fn closed_feed_is_reported_not_swallowed() {
        let feed = feed();
        let mut sub = feed.subscribe(EventFilter::All);
        drop(feed);

        assert!(matches!(sub.recv().await, Err(FeedError::Closed)));
    }

    #[tokio::test]
    async fn subscriber_gauge_tracks_open_subscriptions() {
        let gauge = IntGauge::new("gauge_tracking", "subscribers").unwrap();
        let feed = OrderFeed::new(16, gauge.clone());

        let a = feed.subscribe(EventFilter::All);
        let b = feed.subscribe(EventFilter::All);
        assert_eq!(gauge.get(), 2);

        drop(a);
        drop(b);
        assert_eq!(gauge.get(), 0);
    }
}
