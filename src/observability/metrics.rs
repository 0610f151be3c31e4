use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub orders_created_total: IntCounter,
    pub transitions_total: IntCounterVec,
    pub rejected_transitions_total: IntCounterVec,
    pub eta_lookups_total: IntCounterVec,
    pub events_published_total: IntCounter,
    pub feed_subscribers: IntGauge,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let orders_created_total =
            IntCounter::new("orders_created_total", "Total orders created")
                .expect("valid orders_created_total metric");

        let transitions_total = IntCounterVec::new(
            Opts::new("transitions_total", "Successful status transitions by status"),
            &["status"],
        )
        .expect("valid transitions_total metric");

        let rejected_transitions_total = IntCounterVec::new(
            Opts::new(
                "rejected_transitions_total",
                "Rejected status transitions by reason",
            ),
            &["reason"],
        )
        .expect("valid rejected_transitions_total metric");

        let eta_lookups_total = IntCounterVec::new(
            Opts::new("eta_lookups_total", "ETA estimator calls by outcome"),
            &["outcome"],
        )
        .expect("valid eta_lookups_total metric");

        let events_published_total = IntCounter::new(
            "events_published_total",
            "Order change events published to the feed",
        )
        .expect("valid events_published_total metric");

        let feed_subscribers =
            IntGauge::new("feed_subscribers", "Currently open feed subscriptions")
                .expect("valid feed_subscribers metric");

        registry
            .register(Box::new(orders_created_total.clone()))
            .expect("register orders_created_total");
        registry
            .register(Box::new(transitions_total.clone()))
            .expect("register transitions_total");
        registry
            .register(Box::new(rejected_transitions_total.clone()))
            .expect("register rejected_transitions_total");
        registry
            .register(Box::new(eta_lookups_total.clone()))
            .expect("register eta_lookups_total");
        registry
            .register(Box::new(events_published_total.clone()))
            .expect("register events_published_total");
        registry
            .register(Box::new(feed_subscribers.clone()))
            .expect("register feed_subscribers");

        Self {
            registry,
            orders_created_total,
            transitions_total,
            rejected_transitions_total,
            eta_lookups_total,
            events_published_total,
            feed_subscribers,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
