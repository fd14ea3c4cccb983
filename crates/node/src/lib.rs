//! Aggregator node.
//!
//! Wires the registry cache, aggregation engine, attestation verifier and
//! submission pipeline behind an [`Aggregator`], and exposes it over HTTP.
//!
//! # Architecture
//!
//! ```text
//! POST /api/v1/task-responses
//!        │
//!        ▼
//!   SamplingPolicy ──skip──► 200 {skipped: true}
//!        │
//!        ▼
//!   TaskRegistry ──new digest──► BlsAggregationService::reserve_task
//!        │                                   │
//!        ▼                                   ▼
//!   process_new_signature ───────────► per-task actor
//!                                            │ AggregationResult
//!                                            ▼
//!                                   Aggregator::run ──► SubmissionPipeline
//! ```

pub mod aggregator;
pub mod config;
pub mod rpc;
pub mod sampling;
pub mod task_registry;

pub use aggregator::{Aggregator, AggregatorSettings, AggregatorStatus, SubmitError, SubmitOutcome};
pub use config::{AggregatorConfig, ConfigError};
pub use sampling::SamplingPolicy;
pub use task_registry::{RegisterError, Registration, Task, TaskRegistry};
