//! Prometheus metrics for store operations
//!
//! Counters and histograms live in a crate-local registry so the text exposition
//! only carries this crate's series.

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};
use std::time::Instant;
use tracing::warn;

/// Global metrics registry
static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

static INSTANCE: Lazy<Option<Metrics>> = Lazy::new(|| match Metrics::register(&REGISTRY) {
    Ok(metrics) => Some(metrics),
    Err(e) => {
        warn!(error = %e, "metrics registration failed, metrics disabled");
        None
    }
});

/// Store operation metrics
pub struct Metrics {
    /// Completed operations by `op`, `collection` and `outcome`
    pub operations: IntCounterVec,
    /// Transport failures by `collection` and `kind`
    pub transport_errors: IntCounterVec,
    /// Operation latency in seconds by `op`
    pub operation_duration: HistogramVec,
}

impl Metrics {
    fn register(registry: &Registry) -> prometheus::Result<Self> {
        let operations = IntCounterVec::new(
            Opts::new("sheet_store_operations_total", "Store operations completed"),
            &["op", "collection", "outcome"],
        )?;
        let transport_errors = IntCounterVec::new(
            Opts::new(
                "sheet_store_transport_errors_total",
                "Store operations that failed in the transport",
            ),
            &["collection", "kind"],
        )?;
        let operation_duration = HistogramVec::new(
            HistogramOpts::new(
                "sheet_store_operation_duration_seconds",
                "Duration of store operations in seconds",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
            &["op"],
        )?;

        registry.register(Box::new(operations.clone()))?;
        registry.register(Box::new(transport_errors.clone()))?;
        registry.register(Box::new(operation_duration.clone()))?;

        Ok(Self {
            operations,
            transport_errors,
            operation_duration,
        })
    }

    /// Global instance; `None` if registration failed
    pub fn global() -> Option<&'static Metrics> {
        INSTANCE.as_ref()
    }
}

/// Timer for one store operation, recorded when finished
pub struct Timer {
    start: Instant,
    op: &'static str,
}

impl Timer {
    /// Start timing `op`
    pub fn start(op: &'static str) -> Self {
        Self {
            start: Instant::now(),
            op,
        }
    }

    /// Record duration and outcome for `collection`
    pub fn finish(self, collection: &str, outcome: &str) {
        if let Some(metrics) = Metrics::global() {
            metrics
                .operation_duration
                .with_label_values(&[self.op])
                .observe(self.start.elapsed().as_secs_f64());
            metrics
                .operations
                .with_label_values(&[self.op, collection, outcome])
                .inc();
        }
    }
}

/// Count a transport failure
pub fn record_transport_error(collection: &str, kind: &str) {
    if let Some(metrics) = Metrics::global() {
        metrics
            .transport_errors
            .with_label_values(&[collection, kind])
            .inc();
    }
}

/// Register the metrics at startup rather than on first use
pub fn init_registry() {
    let _ = Metrics::global();
}

/// Get the crate's Prometheus registry
pub fn registry() -> &'static Registry {
    &REGISTRY
}

/// All metrics in the Prometheus text exposition format
pub fn collect_metrics() -> String {
    let encoder = prometheus::TextEncoder::new();
    let metric_families = registry().gather();
    encoder.encode_to_string(&metric_families).unwrap_or_default()
}
