//! Submission of aggregated task responses to the on-chain verifier.
//!
//! [`SubmissionPipeline`] turns a completed [`AggregationResult`] into a
//! [`NonSignerStakesAndSignature`] proof, sends the confirmation through a
//! [`ChainWriter`] and tracks the transaction until it is included or its
//! receipt deadline passes.
//!
//! [`AggregationResult`]: quorum_aggregation::AggregationResult

mod chain;
mod error;
mod pipeline;
mod proof;
mod simulated;

pub use chain::{ChainError, ChainWriter, Receipt, TxHash};
pub use error::SubmissionError;
pub use pipeline::{SubmissionConfig, SubmissionPipeline};
pub use proof::NonSignerStakesAndSignature;
pub use simulated::{Confirmation, SimulatedChain};
