//! Prometheus metrics backend for the quorum aggregator.
//!
//! Implements [`quorum_metrics::MetricsRecorder`] using native Prometheus
//! counters, gauges, and histograms.
//!
//! # Usage
//!
//! Call [`install()`] once at startup before any metrics are recorded:
//! ```ignore
//! quorum_metrics_prometheus::install()?;
//! ```

use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_gauge_vec, register_histogram,
    register_histogram_vec, Counter, CounterVec, Gauge, Histogram, HistogramVec,
};
use quorum_metrics::MetricsRecorder;
use std::sync::OnceLock;

/// Errors from installing the Prometheus backend.
#[derive(Debug, Clone, thiserror::Error)]
pub enum MetricsError {
    #[error("Failed to register metrics: {0}")]
    Registration(String),

    #[error("Failed to encode metrics: {0}")]
    Encoding(String),
}

/// Domain-specific Prometheus metrics.
pub struct Metrics {
    // === Operator registry ===
    pub snapshot_cache_hits: Counter,
    pub snapshot_loads: Counter,
    pub snapshot_load_latency: Histogram,
    pub snapshot_load_failures: Counter,

    // === Aggregation ===
    pub tasks_initialized: Counter,
    pub active_tasks: Gauge,
    pub signatures_accepted: Counter,
    pub signatures_rejected: CounterVec,
    pub aggregations_completed: Counter,
    pub aggregation_latency: Histogram,
    pub aggregations_expired: Counter,

    // === Ingress ===
    pub task_responses_received: Counter,
    pub tasks_sampled_out: CounterVec,

    // === Attestation ===
    pub attestation_checks: CounterVec,
    pub attestation_check_latency: HistogramVec,

    // === Submission ===
    pub submissions: CounterVec,
    pub receipts: CounterVec,
    pub pending_receipts: Gauge,
}

impl Metrics {
    fn new() -> prometheus::Result<Self> {
        let latency_buckets = vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
        ];

        let build_info =
            register_gauge_vec!("quorum_build_info", "Aggregator build information", &["version"])?;
        build_info
            .with_label_values(&[env!("CARGO_PKG_VERSION")])
            .set(1.0);

        Ok(Self {
            // Operator registry
            snapshot_cache_hits: register_counter!(
                "quorum_snapshot_cache_hits_total",
                "Operator state snapshots served from cache"
            )?,
            snapshot_loads: register_counter!(
                "quorum_snapshot_loads_total",
                "Operator state snapshots loaded from the chain"
            )?,
            snapshot_load_latency: register_histogram!(
                "quorum_snapshot_load_latency_seconds",
                "Time to load an operator state snapshot",
                latency_buckets.clone()
            )?,
            snapshot_load_failures: register_counter!(
                "quorum_snapshot_load_failures_total",
                "Operator state snapshot loads that failed"
            )?,

            // Aggregation
            tasks_initialized: register_counter!(
                "quorum_tasks_initialized_total",
                "Tasks registered with the aggregation engine"
            )?,
            active_tasks: register_gauge!(
                "quorum_active_tasks",
                "Tasks currently collecting signatures"
            )?,
            signatures_accepted: register_counter!(
                "quorum_signatures_accepted_total",
                "Operator signatures folded into an aggregate"
            )?,
            signatures_rejected: register_counter_vec!(
                "quorum_signatures_rejected_total",
                "Operator signatures rejected, by reason",
                &["reason"]
            )?,
            aggregations_completed: register_counter!(
                "quorum_aggregations_completed_total",
                "Tasks that reached every quorum threshold"
            )?,
            aggregation_latency: register_histogram!(
                "quorum_aggregation_latency_seconds",
                "Time from task initialization to quorum",
                latency_buckets.clone()
            )?,
            aggregations_expired: register_counter!(
                "quorum_aggregations_expired_total",
                "Tasks that expired before reaching quorum"
            )?,

            // Ingress
            task_responses_received: register_counter!(
                "quorum_task_responses_received_total",
                "Signed task responses received over RPC"
            )?,
            tasks_sampled_out: register_counter_vec!(
                "quorum_tasks_sampled_out_total",
                "Tasks skipped by the sampling filter, by class",
                &["class"]
            )?,

            // Attestation
            attestation_checks: register_counter_vec!(
                "quorum_attestation_checks_total",
                "Liveness checks per attestation layer and result",
                &["layer", "result"]
            )?,
            attestation_check_latency: register_histogram_vec!(
                "quorum_attestation_check_latency_seconds",
                "Liveness check latency per attestation layer",
                &["layer"],
                latency_buckets
            )?,

            // Submission
            submissions: register_counter_vec!(
                "quorum_submissions_total",
                "Aggregated response submissions, by outcome",
                &["outcome"]
            )?,
            receipts: register_counter_vec!(
                "quorum_receipts_total",
                "Polled transaction receipts, by outcome",
                &["outcome"]
            )?,
            pending_receipts: register_gauge!(
                "quorum_pending_receipts",
                "Submitted transactions awaiting a receipt"
            )?,
        })
    }
}

/// Prometheus-backed metrics recorder.
pub struct PrometheusRecorder {
    metrics: Metrics,
}

impl MetricsRecorder for PrometheusRecorder {
    // ── Operator registry ────────────────────────────────────────────

    fn record_snapshot_cache_hit(&self) {
        self.metrics.snapshot_cache_hits.inc();
    }

    fn record_snapshot_loaded(&self, latency_secs: f64) {
        self.metrics.snapshot_loads.inc();
        self.metrics.snapshot_load_latency.observe(latency_secs);
    }

    fn record_snapshot_load_failure(&self) {
        self.metrics.snapshot_load_failures.inc();
    }

    // ── Aggregation ──────────────────────────────────────────────────

    fn record_task_initialized(&self) {
        self.metrics.tasks_initialized.inc();
    }

    fn set_active_tasks(&self, count: usize) {
        self.metrics.active_tasks.set(count as f64);
    }

    fn record_signature_accepted(&self) {
        self.metrics.signatures_accepted.inc();
    }

    fn record_signature_rejected(&self, reason: &str) {
        self.metrics
            .signatures_rejected
            .with_label_values(&[reason])
            .inc();
    }

    fn record_aggregation_completed(&self, latency_secs: f64) {
        self.metrics.aggregations_completed.inc();
        self.metrics.aggregation_latency.observe(latency_secs);
    }

    fn record_aggregation_expired(&self) {
        self.metrics.aggregations_expired.inc();
    }

    // ── Ingress ──────────────────────────────────────────────────────

    fn record_task_response_received(&self) {
        self.metrics.task_responses_received.inc();
    }

    fn record_task_sampled_out(&self, class: &str) {
        self.metrics
            .tasks_sampled_out
            .with_label_values(&[class])
            .inc();
    }

    // ── Attestation ──────────────────────────────────────────────────

    fn record_attestation_check(&self, layer: &str, success: bool, latency_secs: f64) {
        let result = if success { "ok" } else { "failed" };
        self.metrics
            .attestation_checks
            .with_label_values(&[layer, result])
            .inc();
        self.metrics
            .attestation_check_latency
            .with_label_values(&[layer])
            .observe(latency_secs);
    }

    // ── Submission ───────────────────────────────────────────────────

    fn record_submission(&self, outcome: &str) {
        self.metrics
            .submissions
            .with_label_values(&[outcome])
            .inc();
    }

    fn record_receipt(&self, outcome: &str) {
        self.metrics.receipts.with_label_values(&[outcome]).inc();
    }

    fn set_pending_receipts(&self, count: usize) {
        self.metrics.pending_receipts.set(count as f64);
    }
}

/// Install the Prometheus metrics recorder as the global backend.
///
/// Idempotent: only the first call creates and registers the Prometheus
/// metrics, later calls return the first call's result.
pub fn install() -> Result<(), MetricsError> {
    static INSTALLED: OnceLock<Result<(), MetricsError>> = OnceLock::new();
    INSTALLED
        .get_or_init(|| {
            let metrics = Metrics::new().map_err(|e| MetricsError::Registration(e.to_string()))?;
            quorum_metrics::set_global_recorder(Box::new(PrometheusRecorder { metrics }));
            Ok(())
        })
        .clone()
}

/// Gather and encode all registered Prometheus metrics as text format.
///
/// Returns `(content_type, encoded_body)` suitable for an HTTP response.
pub fn encode_metrics() -> Result<(String, Vec<u8>), MetricsError> {
    use prometheus::{Encoder, TextEncoder};
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let content_type = encoder.format_type().to_string();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| MetricsError::Encoding(e.to_string()))?;
    Ok((content_type, buffer))
}
