use quorum_registry::RegistryError;
use quorum_types::{BlockNumber, Hash, OperatorId, TaskIndex};

/// Errors from the aggregation engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AggregationError {
    #[error("Operator state unavailable at block {0}")]
    UnknownBlock(BlockNumber),

    #[error("Operator registry error: {0}")]
    Registry(RegistryError),

    #[error("Task {0} already initialized")]
    DuplicateTask(TaskIndex),

    #[error("Invalid quorum thresholds: {0}")]
    InvalidQuorumThresholds(String),

    #[error("Task {0} not found")]
    UnknownTask(TaskIndex),

    #[error("Task {0} already completed")]
    TaskAlreadyCompleted(TaskIndex),

    #[error("Digest mismatch for task {task_index}: expected {expected}, got {actual}")]
    DigestMismatch {
        task_index: TaskIndex,
        expected: Hash,
        actual: Hash,
    },

    #[error("Operator {0} is not registered in the task's quorums")]
    UnknownOperator(OperatorId),

    #[error("Invalid signature from operator {0}")]
    SignatureVerification(OperatorId),

    #[error("Task {task_index} expired before reaching quorum")]
    InsufficientQuorum { task_index: TaskIndex },

    #[error("Aggregation service is shutting down")]
    ShuttingDown,
}

impl AggregationError {
    /// The signature arrived after its task completed. Callers treat this as
    /// success.
    pub fn is_already_completed(&self) -> bool {
        matches!(self, Self::TaskAlreadyCompleted(_))
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownBlock(_) => "unknown_block",
            Self::Registry(_) => "registry",
            Self::DuplicateTask(_) => "duplicate_task",
            Self::InvalidQuorumThresholds(_) => "invalid_thresholds",
            Self::UnknownTask(_) => "unknown_task",
            Self::TaskAlreadyCompleted(_) => "already_completed",
            Self::DigestMismatch { .. } => "digest_mismatch",
            Self::UnknownOperator(_) => "unknown_operator",
            Self::SignatureVerification(_) => "invalid_signature",
            Self::InsufficientQuorum { .. } => "insufficient_quorum",
            Self::ShuttingDown => "shutting_down",
        }
    }
}

impl From<RegistryError> for AggregationError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::UnknownBlock(block) => Self::UnknownBlock(block),
            other => Self::Registry(other),
        }
    }
}
