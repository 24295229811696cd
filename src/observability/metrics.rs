use prometheus::{
    Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub poll_cycles_total: IntCounterVec,
    pub orders_in_working_set: IntGauge,
    pub new_orders_total: IntCounter,
    pub transitions_total: IntCounterVec,
    pub feed_rows_dropped_total: IntCounter,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let poll_cycles_total = IntCounterVec::new(
            Opts::new("poll_cycles_total", "Feed poll cycles by outcome"),
            &["outcome"],
        )
        .expect("valid poll_cycles_total metric");

        let orders_in_working_set = IntGauge::new(
            "orders_in_working_set",
            "Orders in the current working set",
        )
        .expect("valid orders_in_working_set metric");

        let new_orders_total = IntCounter::new(
            "new_orders_total",
            "Orders that newly appeared in the feed",
        )
        .expect("valid new_orders_total metric");

        let transitions_total = IntCounterVec::new(
            Opts::new("transitions_total", "Lifecycle transitions by outcome"),
            &["transition", "outcome"],
        )
        .expect("valid transitions_total metric");

        let feed_rows_dropped_total = IntCounter::new(
            "feed_rows_dropped_total",
            "Malformed feed rows dropped during decode",
        )
        .expect("valid feed_rows_dropped_total metric");

        registry
            .register(Box::new(poll_cycles_total.clone()))
            .expect("register poll_cycles_total");
        registry
            .register(Box::new(orders_in_working_set.clone()))
            .expect("register orders_in_working_set");
        registry
            .register(Box::new(new_orders_total.clone()))
            .expect("register new_orders_total");
        registry
            .register(Box::new(transitions_total.clone()))
            .expect("register transitions_total");
        registry
            .register(Box::new(feed_rows_dropped_total.clone()))
            .expect("register feed_rows_dropped_total");

        Self {
            registry,
            poll_cycles_total,
            orders_in_working_set,
            new_orders_total,
            transitions_total,
            feed_rows_dropped_total,
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
