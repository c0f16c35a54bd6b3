//! Prometheus metrics for the Waku message pipeline.
//!
//! All metrics follow the naming convention: `waku_<component>_<metric>_<unit>`
//!
//! ## Metric Types
//!
//! - **Counter**: Monotonically increasing value (e.g., envelopes_received_total)
//! - **Gauge**: Value that can go up or down (e.g., dispatch_queue_depth)
//! - **Histogram**: Distribution of values (e.g., store_query_duration_seconds)

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, Counter, CounterVec, Encoder, Gauge, GaugeVec, Histogram, Opts,
    Registry, TextEncoder,
};
use std::sync::Arc;

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // ENVELOPE PIPELINE METRICS (Subsystem 2)
    // =========================================================================

    /// Envelopes handed to the pipeline, by source
    pub static ref ENVELOPES_RECEIVED: CounterVec = CounterVec::new(
        Opts::new("waku_pipeline_envelopes_received_total", "Envelopes handed to the pipeline"),
        &["source"]  // source: relay/filter/store/send
    ).expect("metric creation failed");

    /// Envelope cache lookups
    pub static ref ENVELOPE_CACHE: CounterVec = CounterVec::new(
        Opts::new("waku_pipeline_envelope_cache_total", "Envelope cache lookups"),
        &["result"]  // result: new/duplicate/redispatch
    ).expect("metric creation failed");

    /// Payload size distribution
    pub static ref ENVELOPE_SIZE_BYTES: Histogram = Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "waku_pipeline_envelope_size_bytes",
            "Payload size of received envelopes"
        ).buckets(exponential_buckets(64.0, 4.0, 10).expect("bucket creation failed"))
    ).expect("metric creation failed");

    /// Envelopes that finished dispatch
    pub static ref ENVELOPES_DISPATCHED: CounterVec = CounterVec::new(
        Opts::new("waku_pipeline_envelopes_dispatched_total", "Envelopes dispatched to filters"),
        &["matched"]  // matched: true/false
    ).expect("metric creation failed");

    /// Envelopes that aged out of the cache undispatched
    pub static ref ENVELOPES_EXPIRED: Counter = Counter::new(
        "waku_pipeline_envelopes_expired_total",
        "Cached envelopes that expired without a matching filter"
    ).expect("metric creation failed");

    /// Rejected envelopes, by reason
    pub static ref ENVELOPE_VALIDATION_FAILURES: CounterVec = CounterVec::new(
        Opts::new("waku_pipeline_validation_failures_total", "Envelopes rejected by validation"),
        &["reason"]
    ).expect("metric creation failed");

    /// Items waiting in the dispatch queue
    pub static ref DISPATCH_QUEUE_DEPTH: Gauge = Gauge::new(
        "waku_pipeline_dispatch_queue_depth",
        "Envelopes waiting for a dispatch worker"
    ).expect("metric creation failed");

    // =========================================================================
    // FILTER METRICS (Subsystems 1, 3)
    // =========================================================================

    /// Installed filters
    pub static ref FILTERS_INSTALLED: Gauge = Gauge::new(
        "waku_filters_installed",
        "Number of installed message filters"
    ).expect("metric creation failed");

    /// Live filter subscriptions per filter
    pub static ref FILTER_SUBSCRIPTIONS_ACTIVE: GaugeVec = GaugeVec::new(
        Opts::new("waku_filter_subscriptions_active", "Active peer subscriptions per filter"),
        &["filter_id"]
    ).expect("metric creation failed");

    /// Peer operations issued by the health manager
    pub static ref FILTER_PEER_OPERATIONS: CounterVec = CounterVec::new(
        Opts::new("waku_filter_peer_operations_total", "Filter protocol operations"),
        &["operation", "outcome"]  // operation: subscribe/ping/unsubscribe, outcome: success/failure
    ).expect("metric creation failed");

    // =========================================================================
    // SEND / STORE METRICS (Subsystems 4, 5)
    // =========================================================================

    /// Outbound publishes
    pub static ref MESSAGES_SENT: CounterVec = CounterVec::new(
        Opts::new("waku_sender_messages_total", "Locally originated publishes"),
        &["transport", "outcome"]  // transport: relay/lightpush
    ).expect("metric creation failed");

    /// Store queries
    pub static ref STORE_QUERIES: CounterVec = CounterVec::new(
        Opts::new("waku_store_queries_total", "Historical store queries"),
        &["outcome"]
    ).expect("metric creation failed");

    /// Store query latency
    pub static ref STORE_QUERY_DURATION: Histogram = Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "waku_store_query_duration_seconds",
            "Time spent waiting on store peers"
        ).buckets(exponential_buckets(0.005, 2.0, 12).expect("bucket creation failed"))
    ).expect("metric creation failed");
}

/// Handle to the registry the pipeline metrics were registered with.
pub struct MetricsHandle {
    _registry: Arc<Registry>,
}

/// Register all metrics with the global registry.
///
/// Safe to call more than once; metrics already registered are skipped.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        // Pipeline
        Box::new(ENVELOPES_RECEIVED.clone()),
        Box::new(ENVELOPE_CACHE.clone()),
        Box::new(ENVELOPE_SIZE_BYTES.clone()),
        Box::new(ENVELOPES_DISPATCHED.clone()),
        Box::new(ENVELOPES_EXPIRED.clone()),
        Box::new(ENVELOPE_VALIDATION_FAILURES.clone()),
        Box::new(DISPATCH_QUEUE_DEPTH.clone()),
        // Filters
        Box::new(FILTERS_INSTALLED.clone()),
        Box::new(FILTER_SUBSCRIPTIONS_ACTIVE.clone()),
        Box::new(FILTER_PEER_OPERATIONS.clone()),
        // Send / store
        Box::new(MESSAGES_SENT.clone()),
        Box::new(STORE_QUERIES.clone()),
        Box::new(STORE_QUERY_DURATION.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }

    Ok(MetricsHandle {
        _registry: Arc::new(REGISTRY.clone()),
    })
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

/// Timer guard for automatic histogram observation.
pub struct HistogramTimer {
    histogram: Histogram,
    start: std::time::Instant,
}

impl HistogramTimer {
    /// Start a new timer for the given histogram.
    pub fn new(histogram: &Histogram) -> Self {
        Self {
            histogram: histogram.clone(),
            start: std::time::Instant::now(),
        }
    }
}

impl Drop for HistogramTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        self.histogram.observe(duration);
    }
}

/// Start timing for a histogram. Observation happens on drop.
#[macro_export]
macro_rules! time_histogram {
    ($histogram:expr) => {
        $crate::metrics::HistogramTimer::new(&$histogram)
    };
}
