//! HTTP RPC server for the aggregator.
//!
//! # Health & Readiness
//!
//! - `GET /health` - Liveness probe (always 200 while the server runs)
//! - `GET /ready` - Readiness probe (200 once the dispatch loop runs, 503 otherwise)
//!
//! # Metrics & Observability
//!
//! - `GET /metrics` - Prometheus metrics in text format
//! - `GET /api/v1/status` - Active tasks, pending receipts, attestation layers
//!
//! # Task responses
//!
//! - `POST /api/v1/task-responses` - Submit an operator's signed task response
//!
//! Validation failures return 400, task-state conflicts 409 and requests
//! arriving during shutdown 503. Responses for tasks that already finished
//! are accepted.
//!
//! # Attestation
//!
//! - `POST /api/v1/attestation/verify` - Check a TEE-attested key `{x, y}`

mod handlers;
mod routes;
mod server;
mod state;
mod types;

pub use routes::create_router;
pub use server::{RpcServer, RpcServerConfig, RpcServerError, RpcServerHandle};
pub use state::RpcState;
pub use types::*;
