use std::collections::HashSet;
use std::sync::Arc;

use tracing::warn;

use crate::models::order::{Order, OrderStatus};
use crate::notify::{EventFilter, FeedError, FeedSubscription, OrderFeed};
use crate::store::OrderStore;

/// Hard cap on the working set; dispatch never needs more than a page.
pub const DEFAULT_BATCH_LIMIT: usize = 100;

/// Dispatcher-facing view over all orders in a set of statuses. On every
/// matching change signal the whole set is refetched — at this data volume
/// that beats incremental patching. Orders with unassigned couriers or
/// missing ETAs are a normal part of the set, not an error.
pub struct LiveOpsView {
    store: Arc<dyn OrderStore>,
    subscription: Option<FeedSubscription>,
    statuses: Vec<OrderStatus>,
    limit: usize,
    orders: Vec<Order>,
    polling_fallback: bool,
}

impl LiveOpsView {
    pub fn open(
        store: Arc<dyn OrderStore>,
        feed: &OrderFeed,
        statuses: Vec<OrderStatus>,
        limit: usize,
    ) -> Self {
        let filter = EventFilter::Statuses(HashSet::from_iter(statuses.iter().copied()));
        let subscription = feed.subscribe(filter);
        let orders = store.list_by_status(&statuses, limit);

        Self {
            store,
            subscription: Some(subscription),
            statuses,
            limit,
            orders,
            polling_fallback: false,
        }
    }

    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    pub fn is_polling_fallback(&self) -> bool {
        self.polling_fallback
    }

    pub fn refresh(&mut self) {
        self.orders = self.store.list_by_status(&self.statuses, self.limit);
    }

    /// Waits for the next matching change, then refetches the full set.
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
                warn!("live ops feed closed; degrading to polling");
                self.subscription = None;
                self.polling_fallback = true;
                self.refresh();
                Err(FeedError::Closed)
            }
        }
    }

    pub fn close(&mut self) {
        self.subscription = None;
    }
}
