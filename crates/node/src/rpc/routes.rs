//! Route configuration for the RPC API.

use super::handlers::*;
use super::state::RpcState;
use axum::{
    routing::{get, post},
    Router,
};

/// Create the full router with all RPC routes.
pub fn create_router(state: RpcState) -> Router {
    Router::new()
        // Health & readiness probes (no prefix)
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        // Metrics (no prefix, for Prometheus scraping)
        .route("/metrics", get(metrics_handler))
        .nest("/api/v1", api_v1_routes())
        .with_state(state)
}

fn api_v1_routes() -> Router<RpcState> {
    Router::new()
        .route("/status", get(status_handler))
        .route("/task-responses", post(submit_task_response_handler))
        .route("/attestation/verify", post(verify_key_handler))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::{ErrorResponse, NodeStatusResponse, TaskResponseAck, VerifyKeyResponse};
    use crate::{Aggregator, AggregatorSettings, SamplingPolicy};
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use quorum_attestation::{AttestationVerifier, LivenessVerifier};
    use quorum_submission::{SimulatedChain, SubmissionConfig};
    use quorum_test_helpers::{fixtures, MockLivenessVerifier, MockOutcome, TestOperators};
    use quorum_types::{BlockNumber, SignedTaskResponse, TaskIndex};
    use serde::de::DeserializeOwned;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    fn create_test_state(ops: &TestOperators, layer: MockOutcome) -> RpcState {
        let settings = AggregatorSettings {
            min_wait: Duration::ZERO,
            time_to_expiry: Duration::from_secs(30),
            threshold: None,
            sampling: SamplingPolicy::disabled(),
            submission: SubmissionConfig::default(),
        };
        let layers: Vec<Arc<dyn LivenessVerifier>> =
            vec![Arc::new(MockLivenessVerifier::new("v1", layer))];
        let aggregator = Aggregator::new(
            settings,
            ops.registry_cache(),
            AttestationVerifier::new(layers),
            Arc::new(SimulatedChain::new(1)),
            CancellationToken::new(),
        );
        RpcState::new(Arc::new(aggregator))
    }

    fn post_json(uri: &str, body: &impl serde::Serialize) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(body).unwrap()))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn json_body<T: DeserializeOwned>(response: axum::response::Response) -> T {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_router_health() {
        let ops = TestOperators::new(&[50]);
        let app = create_router(create_test_state(&ops, MockOutcome::Pass));

        let response = app.oneshot(get_request("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_router_ready_follows_flag() {
        let ops = TestOperators::new(&[50]);
        let state = create_test_state(&ops, MockOutcome::Pass);
        let app = create_router(state.clone());

        let response = app.clone().oneshot(get_request("/ready")).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        state.ready.store(true, Ordering::SeqCst);
        let response = app.oneshot(get_request("/ready")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_router_status() {
        let ops = TestOperators::new(&[50]);
        let app = create_router(create_test_state(&ops, MockOutcome::Pass));

        let response = app.oneshot(get_request("/api/v1/status")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let status: NodeStatusResponse = json_body(response).await;
        assert_eq!(status.active_tasks, 0);
        assert_eq!(status.attestation_layers, vec!["v1".to_string()]);
    }

    #[tokio::test]
    async fn test_router_metrics() {
        let ops = TestOperators::new(&[50]);
        let app = create_router(create_test_state(&ops, MockOutcome::Pass));

        let response = app.oneshot(get_request("/metrics")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_submit_task_response_accepted() {
        let ops = TestOperators::new(&[50, 50]);
        let app = create_router(create_test_state(&ops, MockOutcome::Pass));
        let task = fixtures::task(2, 1, BlockNumber(10));

        let response = app
            .oneshot(post_json(
                "/api/v1/task-responses",
                &fixtures::signed_response(&ops, 0, &task),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let ack: TaskResponseAck = json_body(response).await;
        assert!(ack.accepted);
        assert!(!ack.skipped);
        assert_eq!(ack.digest, task.digest());
        assert_eq!(ack.task_index, Some(TaskIndex(0)));
    }

    #[tokio::test]
    async fn test_submit_invalid_signature_is_bad_request() {
        let ops = TestOperators::new(&[50, 50]);
        let app = create_router(create_test_state(&ops, MockOutcome::Pass));
        let task = fixtures::task(2, 1, BlockNumber(10));
        let response = SignedTaskResponse {
            signature: ops.sign(1, &task.digest()),
            ..fixtures::signed_response(&ops, 0, &task)
        };

        let response = app
            .oneshot(post_json("/api/v1/task-responses", &response))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let error: ErrorResponse = json_body(response).await;
        assert_eq!(error.kind, "invalid_signature");
    }

    #[tokio::test]
    async fn test_submit_unknown_block_is_conflict() {
        let ops = TestOperators::new(&[50]);
        let settings = AggregatorSettings {
            min_wait: Duration::ZERO,
            time_to_expiry: Duration::from_secs(30),
            threshold: None,
            sampling: SamplingPolicy::disabled(),
            submission: SubmissionConfig::default(),
        };
        let aggregator = Aggregator::new(
            settings,
            ops.registry_cache_from(BlockNumber(100)),
            AttestationVerifier::default(),
            Arc::new(SimulatedChain::new(1)),
            CancellationToken::new(),
        );
        let app = create_router(RpcState::new(Arc::new(aggregator)));
        let task = fixtures::task(2, 1, BlockNumber(10));

        let response = app
            .oneshot(post_json(
                "/api/v1/task-responses",
                &fixtures::signed_response(&ops, 0, &task),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_submit_during_shutdown_is_unavailable() {
        let ops = TestOperators::new(&[50]);
        let state = create_test_state(&ops, MockOutcome::Pass);
        state.aggregator.shutdown().await;
        let app = create_router(state);
        let task = fixtures::task(2, 1, BlockNumber(10));

        let response = app
            .oneshot(post_json(
                "/api/v1/task-responses",
                &fixtures::signed_response(&ops, 0, &task),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_submit_malformed_json_rejected() {
        let ops = TestOperators::new(&[50]);
        let app = create_router(create_test_state(&ops, MockOutcome::Pass));

        let response = app
            .oneshot(post_json(
                "/api/v1/task-responses",
                &serde_json::json!({ "task": 1 }),
            ))
            .await
            .unwrap();
        assert!(response.status().is_client_error());
    }

    #[tokio::test]
    async fn test_verify_key() {
        let ops = TestOperators::new(&[50]);
        let body = serde_json::json!({
            "x": format!("0x{}", "11".repeat(32)),
            "y": format!("0x{}", "22".repeat(32)),
        });

        let app = create_router(create_test_state(&ops, MockOutcome::Pass));
        let response = app
            .oneshot(post_json("/api/v1/attestation/verify", &body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let verified: VerifyKeyResponse = json_body(response).await;
        assert!(verified.verified);

        let app = create_router(create_test_state(&ops, MockOutcome::Fail));
        let response = app
            .oneshot(post_json("/api/v1/attestation/verify", &body))
            .await
            .unwrap();
        let verified: VerifyKeyResponse = json_body(response).await;
        assert!(!verified.verified);

        let app = create_router(create_test_state(&ops, MockOutcome::Error));
        let response = app
            .oneshot(post_json("/api/v1/attestation/verify", &body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
