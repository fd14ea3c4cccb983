use crate::AggregationError;
use quorum_types::{BlockNumber, BlsPublicKey, BlsSignature, Hash, OperatorId, QuorumNumber, TaskIndex};
use std::time::Duration;

/// Terminal state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationStatus {
    Completed,
    Expired,
}

/// An operator registered in the task's quorums that did not sign.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonSigner {
    pub operator_id: OperatorId,
    pub public_key: BlsPublicKey,
    pub quorum_bitmap_index: u32,
}

/// Everything the on-chain verifier needs to check a completed task.
///
/// Per-quorum vectors follow the task's quorum order. Non-signers are
/// ordered by operator id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateAttestation {
    /// Sum of all signer signatures.
    pub signature: BlsSignature,
    /// Sum of all signer public keys.
    pub signers_apk: BlsPublicKey,
    /// Aggregate key of every operator in each quorum.
    pub quorum_apks: Vec<BlsPublicKey>,
    pub non_signers: Vec<NonSigner>,
    pub quorum_apk_indices: Vec<u32>,
    pub total_stake_indices: Vec<u32>,
    /// For each quorum, the stake index of every non-signer registered in it.
    pub non_signer_stake_indices: Vec<Vec<u32>>,
}

impl AggregateAttestation {
    pub fn non_signer_ids(&self) -> impl Iterator<Item = &OperatorId> {
        self.non_signers.iter().map(|n| &n.operator_id)
    }
}

/// The single outcome of a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregationResult {
    pub task_index: TaskIndex,
    pub task_digest: Hash,
    pub status: AggregationStatus,
    /// Set for expired tasks.
    pub error: Option<AggregationError>,
    pub reference_block: BlockNumber,
    pub quorum_numbers: Vec<QuorumNumber>,
    /// Signers ordered by operator id.
    pub signers: Vec<OperatorId>,
    /// Collected stake per quorum.
    pub signed_stake: Vec<u128>,
    /// Total registered stake per quorum.
    pub total_stake: Vec<u128>,
    /// Present when `status` is `Completed`.
    pub attestation: Option<AggregateAttestation>,
    /// Time from initialization to the terminal state.
    pub elapsed: Duration,
}

impl AggregationResult {
    pub fn is_completed(&self) -> bool {
        self.status == AggregationStatus::Completed
    }
}
