use std::sync::Arc;

use dashmap::DashMap;
use uuid::Uuid;

use crate::config::Config;
use crate::eta::{HaversineEstimator, RouteEstimator};
use crate::lifecycle::service::OrderService;
use crate::models::courier::Courier;
use crate::notify::OrderFeed;
use crate::observability::metrics::Metrics;
use crate::store::{MemoryStore, OrderStore};

pub struct AppState {
    pub orders: OrderService,
    pub couriers: Arc<DashMap<Uuid, Courier>>,
    pub feed: OrderFeed,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(config: &Config) -> Self {
        let store: Arc<dyn OrderStore> = Arc::new(MemoryStore::new());
        let estimator: Arc<dyn RouteEstimator> = Arc::new(HaversineEstimator::new(config.hub));
        Self::with_parts(config, store, estimator)
    }

    /// Wires the state from injected seams; tests swap in their own store or
    /// estimator here.
    pub fn with_parts(
        config: &Config,
        store: Arc<dyn OrderStore>,
        estimator: Arc<dyn RouteEstimator>,
    ) -> Self {
        let metrics = Metrics::new();
        let feed = OrderFeed::new(config.event_buffer_size, metrics.feed_subscribers.clone());
        let couriers = Arc::new(DashMap::new());

        let orders = OrderService::new(
            store,
            couriers.clone(),
            feed.clone(),
            metrics.clone(),
            estimator,
            config.delivery_fee_cents,
        );

        Self {
            orders,
            couriers,
            feed,
            metrics,
        }
    }
}
