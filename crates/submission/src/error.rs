use crate::ChainError;
use quorum_aggregation::AggregationError;
use quorum_types::TaskIndex;

/// Errors from [`SubmissionPipeline::submit`](crate::SubmissionPipeline::submit).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmissionError {
    #[error("task {task_index} not submitted: {source}")]
    Aggregation {
        task_index: TaskIndex,
        #[source]
        source: AggregationError,
    },

    #[error("completed task {0} has no aggregate attestation")]
    MissingAttestation(TaskIndex),

    #[error("confirmation transaction failed: {0}")]
    Chain(#[from] ChainError),
}
