//! Metrics facade for the quorum aggregator.
//!
//! Provides a [`MetricsRecorder`] trait with domain-specific methods and default
//! no-op implementations. A global singleton recorder is accessed via [`recorder()`],
//! and convenience free functions delegate to it.
//!
//! # Usage
//!
//! Callers record metrics via free functions:
//! ```ignore
//! quorum_metrics::record_signature_accepted();
//! quorum_metrics::record_aggregation_completed(latency_secs);
//! ```
//!
//! At startup, install a backend:
//! ```ignore
//! quorum_metrics_prometheus::install()?;
//! ```
//!
//! Without an installed backend every call is a no-op, which is what unit
//! tests get.

use std::sync::OnceLock;

// ═══════════════════════════════════════════════════════════════════════
// Trait
// ═══════════════════════════════════════════════════════════════════════

/// Domain-specific metrics recording trait.
///
/// All methods have default no-op implementations so backends only need
/// to override the metrics they care about.
#[allow(unused_variables)]
pub trait MetricsRecorder: Send + Sync + 'static {
    // ── Operator registry ────────────────────────────────────────────

    /// Record an operator snapshot served from cache.
    fn record_snapshot_cache_hit(&self) {}

    /// Record an operator snapshot loaded from the chain.
    fn record_snapshot_loaded(&self, latency_secs: f64) {}

    /// Record a failed snapshot load.
    fn record_snapshot_load_failure(&self) {}

    // ── Aggregation ──────────────────────────────────────────────────

    /// Record a task registered with the engine.
    fn record_task_initialized(&self) {}

    /// Set the number of tasks currently aggregating.
    fn set_active_tasks(&self, count: usize) {}

    /// Record a signature folded into an aggregate.
    fn record_signature_accepted(&self) {}

    /// Record a rejected signature submission.
    fn record_signature_rejected(&self, reason: &str) {}

    /// Record a task whose quorum thresholds were met.
    fn record_aggregation_completed(&self, latency_secs: f64) {}

    /// Record a task that expired before reaching quorum.
    fn record_aggregation_expired(&self) {}

    // ── Ingress ──────────────────────────────────────────────────────

    /// Record a task response received over RPC.
    fn record_task_response_received(&self) {}

    /// Record a task skipped by the sampling filter.
    fn record_task_sampled_out(&self, class: &str) {}

    // ── Attestation ──────────────────────────────────────────────────

    /// Record a liveness check against one attestation layer.
    fn record_attestation_check(&self, layer: &str, success: bool, latency_secs: f64) {}

    // ── Submission ───────────────────────────────────────────────────

    /// Record a response submission attempt and its outcome.
    fn record_submission(&self, outcome: &str) {}

    /// Record a polled receipt outcome.
    fn record_receipt(&self, outcome: &str) {}

    /// Set the number of transactions awaiting a receipt.
    fn set_pending_receipts(&self, count: usize) {}
}

// ═══════════════════════════════════════════════════════════════════════
// Global recorder
// ═══════════════════════════════════════════════════════════════════════

struct NoopRecorder;
impl MetricsRecorder for NoopRecorder {}

static RECORDER: OnceLock<Box<dyn MetricsRecorder>> = OnceLock::new();

/// Install a global metrics recorder.
///
/// Can only be called once. Subsequent calls are silently ignored.
pub fn set_global_recorder(recorder: Box<dyn MetricsRecorder>) {
    let _ = RECORDER.set(recorder);
}

/// Get the global metrics recorder.
///
/// Returns a no-op recorder if none has been installed.
#[inline]
pub fn recorder() -> &'static dyn MetricsRecorder {
    RECORDER.get().map(|r| r.as_ref()).unwrap_or(&NoopRecorder)
}

// ═══════════════════════════════════════════════════════════════════════
// Convenience free functions
// ═══════════════════════════════════════════════════════════════════════

// ── Operator registry ────────────────────────────────────────────────

/// Record an operator snapshot served from cache.
#[inline]
pub fn record_snapshot_cache_hit() {
    recorder().record_snapshot_cache_hit();
}

/// Record an operator snapshot loaded from the chain.
#[inline]
pub fn record_snapshot_loaded(latency_secs: f64) {
    recorder().record_snapshot_loaded(latency_secs);
}

/// Record a failed snapshot load.
#[inline]
pub fn record_snapshot_load_failure() {
    recorder().record_snapshot_load_failure();
}

// ── Aggregation ──────────────────────────────────────────────────────

/// Record a task registered with the engine.
#[inline]
pub fn record_task_initialized() {
    recorder().record_task_initialized();
}

/// Set the number of tasks currently aggregating.
#[inline]
pub fn set_active_tasks(count: usize) {
    recorder().set_active_tasks(count);
}

/// Record a signature folded into an aggregate.
#[inline]
pub fn record_signature_accepted() {
    recorder().record_signature_accepted();
}

/// Record a rejected signature submission.
#[inline]
pub fn record_signature_rejected(reason: &str) {
    recorder().record_signature_rejected(reason);
}

/// Record a task whose quorum thresholds were met.
#[inline]
pub fn record_aggregation_completed(latency_secs: f64) {
    recorder().record_aggregation_completed(latency_secs);
}

/// Record a task that expired before reaching quorum.
#[inline]
pub fn record_aggregation_expired() {
    recorder().record_aggregation_expired();
}

// ── Ingress ──────────────────────────────────────────────────────────

/// Record a task response received over RPC.
#[inline]
pub fn record_task_response_received() {
    recorder().record_task_response_received();
}

/// Record a task skipped by the sampling filter.
#[inline]
pub fn record_task_sampled_out(class: &str) {
    recorder().record_task_sampled_out(class);
}

// ── Attestation ──────────────────────────────────────────────────────

/// Record a liveness check against one attestation layer.
#[inline]
pub fn record_attestation_check(layer: &str, success: bool, latency_secs: f64) {
    recorder().record_attestation_check(layer, success, latency_secs);
}

// ── Submission ───────────────────────────────────────────────────────

/// Record a response submission attempt and its outcome.
#[inline]
pub fn record_submission(outcome: &str) {
    recorder().record_submission(outcome);
}

/// Record a polled receipt outcome.
#[inline]
pub fn record_receipt(outcome: &str) {
    recorder().record_receipt(outcome);
}

/// Set the number of transactions awaiting a receipt.
#[inline]
pub fn set_pending_receipts(count: usize) {
    recorder().set_pending_receipts(count);
}
