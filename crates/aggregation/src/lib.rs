//! BLS signature aggregation engine.
//!
//! Each task is driven by its own tokio task that owns the task's state
//! exclusively. Signatures reach it over a channel, so signature processing
//! is totally ordered per task while tasks run fully in parallel.
//!
//! ```text
//! INITIALIZED ──► COLLECTING ──┬──► COMPLETED  (all quorums met, min wait elapsed)
//!                              └──► EXPIRED    (time to expiry elapsed)
//! ```
//!
//! Every task emits exactly one [`AggregationResult`] on the results channel
//! returned by [`BlsAggregationService::new`].

mod error;
mod result;
mod service;
mod tally;

pub use error::AggregationError;
pub use result::{AggregateAttestation, AggregationResult, AggregationStatus, NonSigner};
pub use service::{BlsAggregationService, TaskParams, TaskReservation, COMPLETED_CACHE_CAPACITY};
