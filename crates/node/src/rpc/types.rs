//! Request and response bodies.

use quorum_types::{Hash, TaskIndex};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadyResponse {
    pub status: String,
    pub ready: bool,
}

/// Body of `GET /api/v1/status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeStatusResponse {
    pub version: String,
    pub uptime_secs: u64,
    /// Tasks registered and not yet dispatched.
    pub active_tasks: usize,
    /// Submitted confirmations still awaiting a receipt.
    pub pending_receipts: usize,
    pub cached_snapshots: usize,
    pub attestation_layers: Vec<String>,
    pub dispatching: bool,
}

/// Body of a successful `POST /api/v1/task-responses`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResponseAck {
    pub accepted: bool,
    pub digest: Hash,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_index: Option<TaskIndex>,
    pub skipped: bool,
}

/// Body of `POST /api/v1/attestation/verify`. Coordinates are 32-byte hex.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyKeyRequest {
    pub x: Hash,
    pub y: Hash,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyKeyResponse {
    pub verified: bool,
}

/// Error body for every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    /// Machine-readable error class.
    pub kind: String,
}
