use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounterVec, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub order_transitions_total: IntCounterVec,
    pub checklist_submissions_total: IntCounterVec,
    pub handoffs_total: IntCounterVec,
    pub distance_resolutions_total: IntCounterVec,
    pub distance_resolution_seconds: Histogram,
    pub reconciliation_corrections_total: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let order_transitions_total = IntCounterVec::new(
            Opts::new("order_transitions_total", "Committed order status transitions by event"),
            &["event"],
        )
        .expect("valid order_transitions_total metric");

        let checklist_submissions_total = IntCounterVec::new(
            Opts::new(
                "checklist_submissions_total",
                "Checklist submissions by protocol type and outcome",
            ),
            &["kind", "outcome"],
        )
        .expect("valid checklist_submissions_total metric");

        let handoffs_total = IntCounterVec::new(
            Opts::new("handoffs_total", "Handoff and shuttle actions"),
            &["action"],
        )
        .expect("valid handoffs_total metric");

        let distance_resolutions_total = IntCounterVec::new(
            Opts::new("distance_resolutions_total", "Distance lookups by outcome"),
            &["outcome"],
        )
        .expect("valid distance_resolutions_total metric");

        let distance_resolution_seconds = Histogram::with_opts(HistogramOpts::new(
            "distance_resolution_seconds",
            "Latency of distance lookups in seconds",
        ))
        .expect("valid distance_resolution_seconds metric");

        let reconciliation_corrections_total = IntCounterVec::new(
            Opts::new(
                "reconciliation_corrections_total",
                "Orders corrected by reconciliation, by reason",
            ),
            &["reason"],
        )
        .expect("valid reconciliation_corrections_total metric");

        registry
            .register(Box::new(order_transitions_total.clone()))
            .expect("register order_transitions_total");
        registry
            .register(Box::new(checklist_submissions_total.clone()))
            .expect("register checklist_submissions_total");
        registry
            .register(Box::new(handoffs_total.clone()))
            .expect("register handoffs_total");
        registry
            .register(Box::new(distance_resolutions_total.clone()))
            .expect("register distance_resolutions_total");
        registry
            .register(Box::new(distance_resolution_seconds.clone()))
            .expect("register distance_resolution_seconds");
        registry
            .register(Box::new(reconciliation_corrections_total.clone()))
            .expect("register reconciliation_corrections_total");

        Self {
            registry,
            order_transitions_total,
            checklist_submissions_total,
            handoffs_total,
            distance_resolutions_total,
            distance_resolution_seconds,
            reconciliation_corrections_total,
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
