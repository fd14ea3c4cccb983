//! Task descriptors and signed task responses.

use crate::signing::task_response_digest;
use crate::{BlockNumber, BlsSignature, Hash, OperatorId, QuorumNumber, ThresholdPercentage};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Task identifier used by execution-class tasks (batch execution proofs).
pub const EXECUTION_TASK_IDENTIFIER: u64 = 1;

/// What operators attest to.
///
/// Produced by the upstream task source and carried verbatim in every
/// signed response for the task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    /// Task type identifier.
    pub identifier: u64,

    /// Free-form JSON metadata. May carry a `batch_id`.
    #[serde(default)]
    pub metadata: String,

    /// Opaque attested state (hex on the wire).
    #[serde(default, with = "crate::serde_hex")]
    pub state: Vec<u8>,

    /// Quorums whose operators must attest, ascending.
    pub quorum_numbers: Vec<QuorumNumber>,

    /// Requested stake thresholds, one per quorum.
    #[serde(default)]
    pub quorum_threshold_percentages: Vec<ThresholdPercentage>,

    /// Block at which operator state is evaluated.
    pub reference_block_number: BlockNumber,
}

impl TaskDescriptor {
    /// The digest operators sign; also the aggregation key.
    pub fn digest(&self) -> Hash {
        task_response_digest(
            self.identifier,
            self.reference_block_number,
            &self.quorum_numbers,
            self.metadata.as_bytes(),
            &self.state,
        )
    }

    /// Task class used for load-shedding decisions.
    pub fn class(&self) -> TaskClass {
        if self.identifier == EXECUTION_TASK_IDENTIFIER {
            TaskClass::Execution
        } else {
            TaskClass::Generation
        }
    }

    /// Parse the metadata JSON. Empty metadata parses as the default.
    pub fn parsed_metadata(&self) -> Result<TaskMetadata, TaskError> {
        if self.metadata.trim().is_empty() {
            return Ok(TaskMetadata::default());
        }
        serde_json::from_str(&self.metadata).map_err(|e| TaskError::InvalidMetadata(e.to_string()))
    }

    /// Structural checks that do not depend on chain state.
    pub fn validate(&self) -> Result<(), TaskError> {
        if self.quorum_numbers.is_empty() {
            return Err(TaskError::NoQuorums);
        }
        let unique: BTreeSet<_> = self.quorum_numbers.iter().collect();
        if unique.len() != self.quorum_numbers.len() {
            return Err(TaskError::DuplicateQuorum);
        }
        Ok(())
    }
}

/// Task classes with independent sampling divisors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskClass {
    /// Proof-generation tasks.
    Generation,
    /// Batch-execution tasks.
    Execution,
}

/// Known metadata fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TaskMetadata {
    /// Upstream batch number, 0 when absent.
    #[serde(default, alias = "BatchId", alias = "batchId")]
    pub batch_id: u64,
}

/// An operator's signature over a task, as submitted to the aggregator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTaskResponse {
    pub task: TaskDescriptor,
    pub operator_id: OperatorId,
    pub signature: BlsSignature,
}

/// Malformed task descriptors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    #[error("task has no quorums")]
    NoQuorums,

    #[error("task lists a quorum more than once")]
    DuplicateQuorum,

    #[error("invalid task metadata: {0}")]
    InvalidMetadata(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> TaskDescriptor {
        TaskDescriptor {
            identifier: 2,
            metadata: r#"{"batch_id": 42}"#.to_string(),
            state: vec![1, 2, 3],
            quorum_numbers: vec![QuorumNumber(0)],
            quorum_threshold_percentages: vec![67],
            reference_block_number: BlockNumber(100),
        }
    }

    #[test]
    fn test_digest_ignores_thresholds() {
        let a = descriptor();
        let mut b = descriptor();
        b.quorum_threshold_percentages = vec![100];
        assert_eq!(a.digest(), b.digest());

        b.state.push(4);
        assert_ne!(a.digest(), b.digest());
    }

    #[test]
    fn test_class_from_identifier() {
        let mut task = descriptor();
        assert_eq!(task.class(), TaskClass::Generation);
        task.identifier = EXECUTION_TASK_IDENTIFIER;
        assert_eq!(task.class(), TaskClass::Execution);
    }

    #[test]
    fn test_metadata_parsing() {
        let mut task = descriptor();
        assert_eq!(task.parsed_metadata().unwrap().batch_id, 42);

        task.metadata = r#"{"BatchId": 7, "Other": true}"#.to_string();
        assert_eq!(task.parsed_metadata().unwrap().batch_id, 7);

        task.metadata = String::new();
        assert_eq!(task.parsed_metadata().unwrap(), TaskMetadata::default());

        task.metadata = "not json".to_string();
        assert!(matches!(
            task.parsed_metadata(),
            Err(TaskError::InvalidMetadata(_))
        ));
    }

    #[test]
    fn test_validate() {
        let mut task = descriptor();
        assert!(task.validate().is_ok());

        task.quorum_numbers = vec![];
        assert_eq!(task.validate(), Err(TaskError::NoQuorums));

        task.quorum_numbers = vec![QuorumNumber(1), QuorumNumber(1)];
        assert_eq!(task.validate(), Err(TaskError::DuplicateQuorum));
    }

    #[test]
    fn test_signed_response_json_shape() {
        let json = serde_json::json!({
            "task": {
                "identifier": 1,
                "state": "0x0a0b",
                "quorum_numbers": [0, 1],
                "reference_block_number": 12
            },
            "operator_id": Hash::from_bytes(b"op").to_string(),
            "signature": crate::BlsKeyPair::from_seed(&[9; 32]).unwrap().sign(b"x").to_string(),
        });
        let parsed: SignedTaskResponse = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.task.state, vec![0x0a, 0x0b]);
        assert_eq!(parsed.task.quorum_numbers, vec![QuorumNumber(0), QuorumNumber(1)]);
        assert!(parsed.task.quorum_threshold_percentages.is_empty());
    }
}
