use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::eta::RouteEstimator;
use crate::lifecycle::tracking_code::TrackingCode;
use crate::models::courier::{Courier, GeoPoint};
use crate::models::order::{DeliveryAddress, EtaEstimate, LineItem, Order, OrderStatus};
use crate::models::transition::StatusTransition;
use crate::notify::{OrderEvent, OrderFeed};
use crate::observability::metrics::Metrics;
use crate::store::OrderStore;

/// Canonical order lifecycle operations. Every successful status write goes
/// through here so the transition log, the change feed, and the metrics stay
/// in lockstep — mutating status without notifying subscribers is a contract
/// violation, not an optimization.
pub struct OrderService {
    store: Arc<dyn OrderStore>,
    couriers: Arc<DashMap<Uuid, Courier>>,
    feed: OrderFeed,
    metrics: Metrics,
    estimator: Arc<dyn RouteEstimator>,
    delivery_fee_cents: u64,
}

impl OrderService {
    pub fn new(
        store: Arc<dyn OrderStore>,
        couriers: Arc<DashMap<Uuid, Courier>>,
        feed: OrderFeed,
        metrics: Metrics,
        estimator: Arc<dyn RouteEstimator>,
        delivery_fee_cents: u64,
    ) -> Self {
        Self {
            store,
            couriers,
            feed,
            metrics,
            estimator,
            delivery_fee_cents,
        }
    }

    pub fn store(&self) -> &Arc<dyn OrderStore> {
        &self.store
    }

    pub fn feed(&self) -> &OrderFeed {
        &self.feed
    }

    /// Creates a `pending` order from validated line items. Totals are
    /// computed here from the item snapshots; client-submitted totals are
    /// never trusted.
    pub fn create(
        &self,
        items: Vec<LineItem>,
        address: DeliveryAddress,
        payment_method: String,
    ) -> Result<Order, AppError> {
        if items.is_empty() {
            return Err(AppError::BadRequest("order must contain items".to_string()));
        }
        if items.iter().any(|item| item.quantity == 0) {
            return Err(AppError::BadRequest(
                "line item quantity must be > 0".to_string(),
            ));
        }

        let subtotal_cents = items
            .iter()
            .try_fold(0u64, |acc, item| {
                item.line_total_cents()
                    .and_then(|line| acc.checked_add(line))
            })
            .ok_or_else(|| AppError::BadRequest("order total is out of range".to_string()))?;
        let total_cents = subtotal_cents
            .checked_add(self.delivery_fee_cents)
            .ok_or_else(|| AppError::BadRequest("order total is out of range".to_string()))?;
        let now = Utc::now();

        let order = Order {
            id: Uuid::new_v4(),
            tracking_code: TrackingCode::generate(),
            status: OrderStatus::Pending,
            items,
            subtotal_cents,
            delivery_fee_cents: self.delivery_fee_cents,
            total_cents,
            address,
            courier_id: None,
            eta: None,
            transitions: vec![StatusTransition::new(
                OrderStatus::Pending,
                Some("order placed".to_string()),
                None,
            )],
            created_at: now,
            updated_at: now,
        };

        self.store.insert(order.clone());
        self.metrics.orders_created_total.inc();
        self.publish(&order);

        info!(
            order_id = %order.id,
            tracking_code = %order.tracking_code,
            total_cents = order.total_cents,
            payment_method = %payment_method,
            "order created"
        );

        Ok(order)
    }

    /// Moves an order to the immediate next status. The store performs the
    /// validity check and the log append atomically.
    pub fn advance(
        &self,
        order_id: Uuid,
        target: OrderStatus,
        actor: &str,
        message: Option<String>,
        location: Option<GeoPoint>,
    ) -> Result<Order, AppError> {
        if target == OrderStatus::Cancelled {
            return Err(AppError::BadRequest(
                "use cancel to abort an order".to_string(),
            ));
        }

        let order = self
            .store
            .apply_transition(order_id, target, message, location)
            .inspect_err(|err| self.count_rejection(err))?;

        self.metrics
            .transitions_total
            .with_label_values(&[target.as_str()])
            .inc();
        self.publish(&order);

        info!(order_id = %order.id, status = target.as_str(), actor, "order advanced");

        if target == OrderStatus::OutForDelivery {
            self.refresh_eta(&order);
        }

        Ok(order)
    }

    /// Aborts a non-terminal order. A reason is required and lands in the
    /// transition log.
    pub fn cancel(&self, order_id: Uuid, reason: &str, actor: &str) -> Result<Order, AppError> {
        if reason.trim().is_empty() {
            return Err(AppError::BadRequest(
                "cancellation requires a reason".to_string(),
            ));
        }

        let order = self
            .store
            .apply_transition(
                order_id,
                OrderStatus::Cancelled,
                Some(reason.trim().to_string()),
                None,
            )
            .inspect_err(|err| self.count_rejection(err))?;

        self.metrics
            .transitions_total
            .with_label_values(&[OrderStatus::Cancelled.as_str()])
            .inc();
        self.publish(&order);

        info!(order_id = %order.id, reason, actor, "order cancelled");

        Ok(order)
    }

    /// Attaches a courier to an active order and refreshes the ETA from the
    /// courier's last known position.
    pub fn assign_courier(&self, order_id: Uuid, courier_id: Uuid) -> Result<Order, AppError> {
        if !self.couriers.contains_key(&courier_id) {
            return Err(AppError::BadRequest(format!(
                "courier {courier_id} not found"
            )));
        }

        let order = self.store.assign_courier(order_id, courier_id)?;
        self.publish(&order);

        info!(order_id = %order.id, courier_id = %courier_id, "courier assigned");

        self.refresh_eta(&order);
        Ok(order)
    }

    /// Best-effort ETA refresh. On estimator failure the last-known estimate
    /// stays in place and the failure is logged, never surfaced.
    pub fn refresh_eta(&self, order: &Order) {
        let Some(destination) = order.address.location else {
            return;
        };

        let courier_position = order
            .courier_id
            .and_then(|id| self.couriers.get(&id))
            .and_then(|courier| courier.position);

        match self.estimator.estimate(courier_position, destination) {
            Ok(estimate) => {
                let eta = EtaEstimate {
                    eta_minutes: estimate.minutes,
                    distance_miles: estimate.miles,
                    updated_at: Utc::now(),
                };
                if let Err(err) = self.store.set_eta(order.id, eta) {
                    warn!(order_id = %order.id, error = %err, "failed to persist eta");
                    return;
                }
                self.metrics
                    .eta_lookups_total
                    .with_label_values(&["success"])
                    .inc();
                self.publish_for(order.id);
            }
            Err(err) => {
                self.metrics
                    .eta_lookups_total
                    .with_label_values(&["error"])
                    .inc();
                warn!(order_id = %order.id, error = %err, "eta estimation failed; keeping last known");
            }
        }
    }

    fn count_rejection(&self, err: &AppError) {
        let reason = match err {
            AppError::InvalidTransition { .. } => "invalid_transition",
            AppError::TerminalState(_) => "terminal_state",
            AppError::NotFound => "not_found",
            _ => return,
        };
        self.metrics
            .rejected_transitions_total
            .with_label_values(&[reason])
            .inc();
    }

    fn publish(&self, order: &Order) {
        self.metrics.events_published_total.inc();
        self.feed.publish(OrderEvent {
            order_id: order.id,
            tracking_code: order.tracking_code.clone(),
            status: order.status,
            occurred_at: Utc::now(),
        });
    }

    fn publish_for(&self, order_id: Uuid) {
        if let Some(order) = self.store.get(order_id) {
            self.publish(&order);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use dashmap::DashMap;
    use uuid::Uuid;

    use super::OrderService;
    use crate::error::AppError;
    use crate::eta::{HaversineEstimator, RouteEstimate, RouteEstimator};
    use crate::models::courier::{Courier, GeoPoint};
    use crate::models::order::{DeliveryAddress, LineItem, OrderStatus};
    use crate::notify::OrderFeed;
    use crate::observability::metrics::Metrics;
    use crate::store::MemoryStore;

    const HUB: GeoPoint = GeoPoint {
        lat: 40.7128,
        lng: -74.0060,
    };

    struct FlakyEstimator {
        fail: AtomicBool,
        inner: HaversineEstimator,
    }

    impl RouteEstimator for FlakyEstimator {
        fn estimate(
            &self,
            courier: Option<GeoPoint>,
            destination: GeoPoint,
        ) -> Result<RouteEstimate, AppError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(AppError::EstimationUnavailable(
                    "routing service timed out".to_string(),
                ));
            }
            self.inner.estimate(courier, destination)
        }
    }

    fn service_with(estimator: Arc<dyn RouteEstimator>) -> OrderService {
        let metrics = Metrics::new();
        OrderService::new(
            Arc::new(MemoryStore::new()),
            Arc::new(DashMap::new()),
            OrderFeed::new(64, metrics.feed_subscribers.clone()),
            metrics,
            estimator,
            1000,
        )
    }

    fn service() -> OrderService {
        service_with(Arc::new(HaversineEstimator::new(HUB)))
    }

    fn two_items_totaling_4000() -> Vec<LineItem> {
        vec![
            LineItem {
                product_id: Uuid::new_v4(),
                name: "Sour Diesel 3.5g".to_string(),
                quantity: 1,
                unit_price_cents: 2500,
            },
            LineItem {
                product_id: Uuid::new_v4(),
                name: "Gummies 10pk".to_string(),
                quantity: 1,
                unit_price_cents: 1500,
            },
        ]
    }

    fn address() -> DeliveryAddress {
        DeliveryAddress {
            street: "123 Bedford Ave".to_string(),
            borough: "Brooklyn".to_string(),
            location: Some(GeoPoint {
                lat: 40.7081,
                lng: -73.9571,
            }),
        }
    }

    #[test]
    fn create_computes_totals_server_side() {
        let svc = service();
        let order = svc
            .create(two_items_totaling_4000(), address(), "card".to_string())
            .unwrap();

        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.subtotal_cents, 4000);
        assert_eq!(order.delivery_fee_cents, 1000);
        assert_eq!(order.total_cents, 5000);
        assert_eq!(order.transitions.len(), 1);
        assert_eq!(order.transitions[0].status, OrderStatus::Pending);
    }

    #[test]
    fn create_rejects_empty_and_zero_quantity_items() {
        let svc = service();
        assert!(matches!(
            svc.create(vec![], address(), "card".to_string()),
            Err(AppError::BadRequest(_))
        ));

        let zero_qty = vec![LineItem {
            product_id: Uuid::new_v4(),
            name: "Pre-roll".to_string(),
            quantity: 0,
            unit_price_cents: 900,
        }];
        assert!(matches!(
            svc.create(zero_qty, address(), "card".to_string()),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn create_rejects_totals_that_overflow() {
        let svc = service();

        let huge_line = vec![LineItem {
            product_id: Uuid::new_v4(),
            name: "bulk".to_string(),
            quantity: 2,
            unit_price_cents: u64::MAX,
        }];
        assert!(matches!(
            svc.create(huge_line, address(), "card".to_string()),
            Err(AppError::BadRequest(_))
        ));

        // Subtotal fits, but adding the delivery fee would wrap.
        let fee_overflow = vec![LineItem {
            product_id: Uuid::new_v4(),
            name: "bulk".to_string(),
            quantity: 1,
            unit_price_cents: u64::MAX,
        }];
        assert!(matches!(
            svc.create(fee_overflow, address(), "card".to_string()),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn full_lifecycle_leaves_five_chronological_transitions() {
        let svc = service();
        let order = svc
            .create(two_items_totaling_4000(), address(), "card".to_string())
            .unwrap();

        for target in [
            OrderStatus::Confirmed,
            OrderStatus::Preparing,
            OrderStatus::OutForDelivery,
            OrderStatus::Delivered,
        ] {
            svc.advance(order.id, target, "dispatch", None, None).unwrap();
        }

        let done = svc.store().get(order.id).unwrap();
        assert_eq!(done.status, OrderStatus::Delivered);
        assert_eq!(done.transitions.len(), 5);

        let statuses: Vec<OrderStatus> = done.transitions.iter().map(|t| t.status).collect();
        assert_eq!(
            statuses,
            vec![
                OrderStatus::Pending,
                OrderStatus::Confirmed,
                OrderStatus::Preparing,
                OrderStatus::OutForDelivery,
                OrderStatus::Delivered,
            ]
        );
        assert!(
            done.transitions
                .windows(2)
                .all(|pair| pair[0].created_at <= pair[1].created_at)
        );
    }

    #[test]
    fn cancel_then_advance_hits_terminal_state() {
        let svc = service();
        let order = svc
            .create(two_items_totaling_4000(), address(), "card".to_string())
            .unwrap();

        let cancelled = svc
            .cancel(order.id, "customer changed mind", "customer")
            .unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(cancelled.transitions.len(), 2);
        assert_eq!(
            cancelled.transitions[1].message.as_deref(),
            Some("customer changed mind")
        );

        let err = svc
            .advance(order.id, OrderStatus::Confirmed, "shop", None, None)
            .unwrap_err();
        assert!(matches!(err, AppError::TerminalState(OrderStatus::Cancelled)));
    }

    #[test]
    fn cancel_requires_a_reason() {
        let svc = service();
        let order = svc
            .create(two_items_totaling_4000(), address(), "card".to_string())
            .unwrap();

        assert!(matches!(
            svc.cancel(order.id, "   ", "customer"),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn advance_refuses_cancelled_as_target() {
        let svc = service();
        let order = svc
            .create(two_items_totaling_4000(), address(), "card".to_string())
            .unwrap();

        assert!(matches!(
            svc.advance(order.id, OrderStatus::Cancelled, "shop", None, None),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn assign_courier_requires_known_courier() {
        let svc = service();
        let order = svc
            .create(two_items_totaling_4000(), address(), "card".to_string())
            .unwrap();

        assert!(matches!(
            svc.assign_courier(order.id, Uuid::new_v4()),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn estimator_failure_retains_last_known_eta() {
        let estimator = Arc::new(FlakyEstimator {
            fail: AtomicBool::new(false),
            inner: HaversineEstimator::new(HUB),
        });

        let metrics = Metrics::new();
        let couriers = Arc::new(DashMap::new());
        let svc = OrderService::new(
            Arc::new(MemoryStore::new()),
            couriers.clone(),
            OrderFeed::new(64, metrics.feed_subscribers.clone()),
            metrics,
            estimator.clone(),
            1000,
        );

        let courier = Courier {
            id: Uuid::new_v4(),
            name: "Rosa".to_string(),
            position: Some(GeoPoint {
                lat: 40.7100,
                lng: -73.9600,
            }),
            updated_at: chrono::Utc::now(),
        };
        couriers.insert(courier.id, courier.clone());

        let order = svc
            .create(two_items_totaling_4000(), address(), "card".to_string())
            .unwrap();
        svc.assign_courier(order.id, courier.id).unwrap();

        let with_eta = svc.store().get(order.id).unwrap();
        let first_eta = with_eta.eta.clone().expect("assignment should set an eta");

        estimator.fail.store(true, Ordering::SeqCst);
        svc.refresh_eta(&with_eta);

        let after_failure = svc.store().get(order.id).unwrap();
        let kept = after_failure.eta.expect("failed refresh must not clear eta");
        assert_eq!(kept.updated_at, first_eta.updated_at);
        assert_eq!(kept.eta_minutes, first_eta.eta_minutes);
    }

    #[test]
    fn order_without_coordinates_gets_no_eta() {
        let svc = service();
        let no_geo = DeliveryAddress {
            street: "somewhere".to_string(),
            borough: "Queens".to_string(),
            location: None,
        };
        let order = svc
            .create(two_items_totaling_4000(), no_geo, "card".to_string())
            .unwrap();

        svc.refresh_eta(&order);
        assert!(svc.store().get(order.id).unwrap().eta.is_none());
    }
}
