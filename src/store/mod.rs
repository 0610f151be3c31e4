use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::AppError;
use crate::lifecycle::tracking_code::TrackingCode;
use crate::models::courier::GeoPoint;
use crate::models::order::{EtaEstimate, Order, OrderStatus};
use crate::models::transition::StatusTransition;

/// Storage seam for orders. Injected as `Arc<dyn OrderStore>` so lifecycle
/// logic and views are testable against any backing implementation.
pub trait OrderStore: Send + Sync {
    fn insert(&self, order: Order);

    fn get(&self, id: Uuid) -> Option<Order>;

    fn find_by_tracking_code(&self, code: &TrackingCode) -> Option<Order>;

    /// Orders whose status is in `statuses`, newest first, capped at `limit`.
    fn list_by_status(&self, statuses: &[OrderStatus], limit: usize) -> Vec<Order>;

    /// Validates `target` against the current status and, in the same atomic
    /// unit, writes the new status and appends the matching transition entry.
    /// The check must happen under the row lock so racing writers cannot
    /// bypass it.
    fn apply_transition(
        &self,
        id: Uuid,
        target: OrderStatus,
        message: Option<String>,
        location: Option<GeoPoint>,
    ) -> Result<Order, AppError>;

    fn assign_courier(&self, id: Uuid, courier_id: Uuid) -> Result<Order, AppError>;

    fn set_eta(&self, id: Uuid, eta: EtaEstimate) -> Result<Order, AppError>;

    /// Age-based retention purge: drops transition entries older than
    /// `cutoff` across all orders. Returns the number of entries removed.
    fn purge_transitions_before(&self, cutoff: DateTime<Utc>) -> usize;

    /// Administrative removal, outside the normal lifecycle.
    fn remove(&self, id: Uuid) -> Option<Order>;
}

/// In-memory store. The `DashMap` entry guard gives each mutation an atomic
/// read-modify-write, which is what lets `apply_transition` double as the
/// compare-and-swap on current status.
#[derive(Default)]
pub struct MemoryStore {
    orders: DashMap<Uuid, Order>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn check_transition(current: OrderStatus, target: OrderStatus) -> Result<(), AppError> {
    if current.is_terminal() {
        return Err(AppError::TerminalState(current));
    }

    let legal = target == OrderStatus::Cancelled || current.next() == Some(target);
    if !legal {
        return Err(AppError::InvalidTransition {
            from: current,
            to: target,
        });
    }

    Ok(())
}

impl OrderStore for MemoryStore {
    fn insert(&self, order: Order) {
        self.orders.insert(order.id, order);
    }

    fn get(&self, id: Uuid) -> Option<Order> {
        self.orders.get(&id).map(|entry| entry.value().clone())
    }

    fn find_by_tracking_code(&self, code: &TrackingCode) -> Option<Order> {
        self.orders
            .iter()
            .find(|entry| entry.value().tracking_code == *code)
            .map(|entry| entry.value().clone())
    }

    fn list_by_status(&self, statuses: &[OrderStatus], limit: usize) -> Vec<Order> {
        let mut matching: Vec<Order> = self
            .orders
            .iter()
            .filter(|entry| statuses.contains(&entry.value().status))
            .map(|entry| entry.value().clone())
            .collect();

        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matching.truncate(limit);
        matching
    }

    fn apply_transition(
        &self,
        id: Uuid,
        target: OrderStatus,
        message: Option<String>,
        location: Option<GeoPoint>,
    ) -> Result<Order, AppError> {
        let mut order = self.orders.get_mut(&id).ok_or(AppError::NotFound)?;

        check_transition(order.status, target)?;

        order.status = target;
        order.updated_at = Utc::now();
        order
            .transitions
            .push(StatusTransition::new(target, message, location));

        Ok(order.clone())
    }

    fn assign_courier(&self, id: Uuid, courier_id: Uuid) -> Result<Order, AppError> {
        let mut order = self.orders.get_mut(&id).ok_or(AppError::NotFound)?;

        if order.status.is_terminal() {
            return Err(AppError::TerminalState(order.status));
        }

        order.courier_id = Some(courier_id);
        order.updated_at = Utc::now();
        Ok(order.clone())
    }

    fn set_eta(&self, id: Uuid, eta: EtaEstimate) -> Result<Order, AppError> {
        let mut order = self.orders.get_mut(&id).ok_or(AppError::NotFound)?;

        order.eta = Some(eta);
        order.updated_at = Utc::now();
        Ok(order.clone())
    }

    fn purge_transitions_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut removed = 0;
        for mut entry in self.orders.iter_mut() {
            let before = entry.transitions.len();
            entry.transitions.retain(|t| t.created_at >= cutoff);
            removed += before - entry.transitions.len();
        }
        removed
    }

    fn remove(&self, id: Uuid) -> Option<Order> {
        self.orders.remove(&id).map(|(_, order)| order)
    }
}
