use prometheus::{Encoder, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub orders_in_queue: IntGauge,
    pub matches_total: IntCounterVec,
    pub match_latency_seconds: HistogramVec,
    pub offers_total: IntCounterVec,
    pub order_transitions_total: IntCounterVec,
    pub tracking_reports_total: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let orders_in_queue =
            IntGauge::new("orders_in_queue", "Orders waiting for a matching task")
                .expect("valid orders_in_queue metric");

        let matches_total = IntCounterVec::new(
            Opts::new("matches_total", "Finished matching attempts by outcome"),
            &["outcome"],
        )
        .expect("valid matches_total metric");

        let match_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "match_latency_seconds",
                "Time from entering matching to a match outcome in seconds",
            )
            .buckets(vec![0.1, 0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 120.0]),
            &["outcome"],
        )
        .expect("valid match_latency_seconds metric");

        let offers_total = IntCounterVec::new(
            Opts::new("offers_total", "Resolved offers by outcome"),
            &["outcome"],
        )
        .expect("valid offers_total metric");

        let order_transitions_total = IntCounterVec::new(
            Opts::new("order_transitions_total", "Applied order transitions by target status"),
            &["to"],
        )
        .expect("valid order_transitions_total metric");

        let tracking_reports_total = IntCounterVec::new(
            Opts::new("tracking_reports_total", "Position reports by outcome"),
            &["outcome"],
        )
        .expect("valid tracking_reports_total metric");

        registry
            .register(Box::new(orders_in_queue.clone()))
            .expect("register orders_in_queue");
        registry
            .register(Box::new(matches_total.clone()))
            .expect("register matches_total");
        registry
            .register(Box::new(match_latency_seconds.clone()))
            .expect("register match_latency_seconds");
        registry
            .register(Box::new(offers_total.clone()))
            .expect("register offers_total");
        registry
            .register(Box::new(order_transitions_total.clone()))
            .expect("register order_transitions_total");
        registry
            .register(Box::new(tracking_reports_total.clone()))
            .expect("register tracking_reports_total");

        Self {
            registry,
            orders_in_queue,
            matches_total,
            match_latency_seconds,
            offers_total,
            order_transitions_total,
            tracking_reports_total,
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
