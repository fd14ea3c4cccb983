//! HTTP request handlers for the RPC API.

use super::state::RpcState;
use super::types::*;
use crate::SubmitError;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use quorum_aggregation::AggregationError;
use quorum_attestation::AttestationError;
use quorum_types::SignedTaskResponse;

// ═══════════════════════════════════════════════════════════════════════════
// Health & Readiness Handlers
// ═══════════════════════════════════════════════════════════════════════════

/// Handler for `GET /health` - liveness probe.
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse::default())
}

/// Handler for `GET /ready` - readiness probe.
pub async fn ready_handler(State(state): State<RpcState>) -> impl IntoResponse {
    if state.is_ready() {
        (
            StatusCode::OK,
            Json(ReadyResponse {
                status: "ready".to_string(),
                ready: true,
            }),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadyResponse {
                status: "not_ready".to_string(),
                ready: false,
            }),
        )
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Metrics & Status Handlers
// ═══════════════════════════════════════════════════════════════════════════

/// Handler for `GET /metrics` - Prometheus metrics.
pub async fn metrics_handler() -> impl IntoResponse {
    match quorum_metrics_prometheus::encode_metrics() {
        Ok((content_type, buffer)) => {
            ([(axum::http::header::CONTENT_TYPE, content_type)], buffer).into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to encode metrics".to_string(),
            )
                .into_response()
        }
    }
}

/// Handler for `GET /api/v1/status` - aggregator status.
pub async fn status_handler(State(state): State<RpcState>) -> impl IntoResponse {
    let status = state.aggregator.status();

    Json(NodeStatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        active_tasks: status.active_tasks,
        pending_receipts: status.pending_receipts,
        cached_snapshots: status.cached_snapshots,
        attestation_layers: status.attestation_layers,
        dispatching: status.running,
    })
}

// ═══════════════════════════════════════════════════════════════════════════
// Task Response Handlers
// ═══════════════════════════════════════════════════════════════════════════

/// Handler for `POST /api/v1/task-responses` - submit a signed response.
///
/// Returns once the task has accepted or rejected the signature.
pub async fn submit_task_response_handler(
    State(state): State<RpcState>,
    Json(request): Json<SignedTaskResponse>,
) -> impl IntoResponse {
    match state.aggregator.submit_signed_response(request).await {
        Ok(outcome) => (
            StatusCode::OK,
            Json(TaskResponseAck {
                accepted: true,
                digest: outcome.digest,
                task_index: outcome.task_index,
                skipped: outcome.skipped,
            }),
        )
            .into_response(),
        Err(e) => {
            let status = submit_error_status(&e);
            if status.is_server_error() {
                tracing::warn!(error = %e, "Task response refused");
            } else {
                tracing::debug!(error = %e, "Task response rejected");
            }
            error_response(status, submit_error_kind(&e), e.to_string())
        }
    }
}

fn submit_error_status(error: &SubmitError) -> StatusCode {
    use AggregationError::*;
    match error {
        SubmitError::InvalidTask(_) => StatusCode::BAD_REQUEST,
        SubmitError::Aggregation(e) => match e {
            InvalidQuorumThresholds(_)
            | DigestMismatch { .. }
            | UnknownOperator(_)
            | SignatureVerification(_) => StatusCode::BAD_REQUEST,
            UnknownBlock(_)
            | Registry(_)
            | DuplicateTask(_)
            | UnknownTask(_)
            | TaskAlreadyCompleted(_)
            | InsufficientQuorum { .. } => StatusCode::CONFLICT,
            ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
        },
        SubmitError::TaskIndexExhausted => StatusCode::SERVICE_UNAVAILABLE,
    }
}

fn submit_error_kind(error: &SubmitError) -> &'static str {
    match error {
        SubmitError::InvalidTask(_) => "invalid_task",
        SubmitError::Aggregation(e) => e.kind(),
        SubmitError::TaskIndexExhausted => "index_exhausted",
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Attestation Handlers
// ═══════════════════════════════════════════════════════════════════════════

/// Handler for `POST /api/v1/attestation/verify`.
pub async fn verify_key_handler(
    State(state): State<RpcState>,
    Json(request): Json<VerifyKeyRequest>,
) -> impl IntoResponse {
    match state
        .aggregator
        .verify_key(request.x.to_bytes(), request.y.to_bytes())
        .await
    {
        Ok(verified) => (StatusCode::OK, Json(VerifyKeyResponse { verified })).into_response(),
        Err(e @ AttestationError::Layer { .. }) => {
            tracing::warn!(error = %e, "Attestation check failed");
            error_response(StatusCode::BAD_GATEWAY, "attestation_layer", e.to_string())
        }
        Err(e @ AttestationError::InvalidConfig(_)) => {
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "invalid_config", e.to_string())
        }
    }
}

fn error_response(status: StatusCode, kind: &str, error: String) -> axum::response::Response {
    (
        status,
        Json(ErrorResponse {
            error,
            kind: kind.to_string(),
        }),
    )
        .into_response()
}
