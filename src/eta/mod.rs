use std::sync::Arc;

use tokio::time::{Duration, sleep};
use tracing::{debug, info};

use crate::error::AppError;
use crate::geo::haversine_miles;
use crate::models::courier::GeoPoint;
use crate::models::order::OrderStatus;
use crate::state::AppState;

/// Typical courier speed through city traffic.
const COURIER_SPEED_MPH: f64 = 12.0;

/// Added to coarse estimates made before a courier position is known, to
/// cover acceptance and preparation.
const PREP_BUFFER_MINUTES: u32 = 20;

/// Upper bound on how many active orders one refresh pass touches.
const REFRESH_BATCH_LIMIT: usize = 500;

#[derive(Debug, Clone, Copy)]
pub struct RouteEstimate {
    pub minutes: u32,
    pub miles: f64,
}

/// Routing seam. The production implementation would call out to a routing
/// service; estimates are best-effort and a failure here never blocks order
/// progress.
pub trait RouteEstimator: Send + Sync {
    fn estimate(
        &self,
        courier: Option<GeoPoint>,
        destination: GeoPoint,
    ) -> Result<RouteEstimate, AppError>;
}

/// Great-circle fallback estimator. With a courier position it produces a
/// tight door-to-door estimate; without one it measures from the dispatch
/// hub and pads for preparation.
pub struct HaversineEstimator {
    hub: GeoPoint,
}

impl HaversineEstimator {
    pub fn new(hub: GeoPoint) -> Self {
        Self { hub }
    }

    fn travel_minutes(miles: f64) -> u32 {
        (miles / COURIER_SPEED_MPH * 60.0).ceil() as u32
    }
}

impl RouteEstimator for HaversineEstimator {
    fn estimate(
        &self,
        courier: Option<GeoPoint>,
        destination: GeoPoint,
    ) -> Result<RouteEstimate, AppError> {
        let estimate = match courier {
            Some(position) => {
                let miles = haversine_miles(&position, &destination);
                RouteEstimate {
                    minutes: Self::travel_minutes(miles),
                    miles,
                }
            }
            None => {
                let miles = haversine_miles(&self.hub, &destination);
                RouteEstimate {
                    minutes: Self::travel_minutes(miles) + PREP_BUFFER_MINUTES,
                    miles,
                }
            }
        };

        Ok(estimate)
    }
}

/// Periodically recomputes ETAs for orders that are out for delivery. One
/// bounded pass per tick; estimator failures leave the last-known estimate
/// in place.
pub async fn run_eta_refresher(state: Arc<AppState>, refresh_secs: u64) {
    info!(refresh_secs, "eta refresher started");

    loop {
        sleep(Duration::from_secs(refresh_secs)).await;

        let active = state
            .orders
            .store()
            .list_by_status(&[OrderStatus::OutForDelivery], REFRESH_BATCH_LIMIT);

        if active.is_empty() {
            continue;
        }

        debug!(count = active.len(), "refreshing etas for active deliveries");
        for order in &active {
            state.orders.refresh_eta(order);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{HaversineEstimator, PREP_BUFFER_MINUTES, RouteEstimator};
    use crate::models::courier::GeoPoint;

    const HUB: GeoPoint = GeoPoint {
        lat: 40.7128,
        lng: -74.0060,
    };

    const WILLIAMSBURG: GeoPoint = GeoPoint {
        lat: 40.7081,
        lng: -73.9571,
    };

    #[test]
    fn destination_only_yields_coarse_estimate() {
        let estimator = HaversineEstimator::new(HUB);
        let estimate = estimator.estimate(None, WILLIAMSBURG).unwrap();

        assert!(estimate.miles > 0.0);
        assert!(estimate.minutes >= PREP_BUFFER_MINUTES);
    }

    #[test]
    fn nearby_courier_tightens_the_estimate() {
        let estimator = HaversineEstimator::new(HUB);

        let coarse = estimator.estimate(None, WILLIAMSBURG).unwrap();

        let courier_next_door = GeoPoint {
            lat: 40.7085,
            lng: -73.9580,
        };
        let tight = estimator
            .estimate(Some(courier_next_door), WILLIAMSBURG)
            .unwrap();

        assert!(tight.minutes < coarse.minutes);
        assert!(tight.miles < coarse.miles);
    }

    #[test]
    fn courier_at_destination_estimates_zero_minutes() {
        let estimator = HaversineEstimator::new(HUB);
        let estimate = estimator
            .estimate(Some(WILLIAMSBURG), WILLIAMSBURG)
            .unwrap();

        assert_eq!(estimate.minutes, 0);
        assert!(estimate.miles < 1e-9);
    }
}
