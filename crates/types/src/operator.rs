//! Operator state snapshots.
//!
//! A snapshot captures, for one reference block and one quorum set, every
//! registered operator with its key and per-quorum stake, plus the index
//! values the on-chain verifier needs to look up historical state. Historical
//! state never changes, so snapshots are immutable once built.

use crate::{BlockNumber, BlsPublicKey, CryptoError, OperatorId, QuorumNumber, Stake};
use std::collections::BTreeMap;

/// An operator as registered at a given block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorInfo {
    pub operator_id: OperatorId,

    /// G1 public key used to verify the operator's signatures.
    pub public_key: BlsPublicKey,

    /// Stake per quorum the operator is registered in.
    pub stakes: BTreeMap<QuorumNumber, Stake>,

    /// Index of the operator's quorum-bitmap update at the reference block.
    pub quorum_bitmap_index: u32,

    /// Index of the operator's stake update, per quorum.
    pub stake_indices: BTreeMap<QuorumNumber, u32>,
}

impl OperatorInfo {
    /// Stake in a quorum, if registered there.
    pub fn stake_in(&self, quorum: QuorumNumber) -> Option<Stake> {
        self.stakes.get(&quorum).copied()
    }
}

/// History indices for a quorum at the reference block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuorumIndices {
    /// Index of the quorum aggregate-key update.
    pub apk_index: u32,
    /// Index of the quorum total-stake update.
    pub total_stake_index: u32,
}

/// Per-quorum view of a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuorumState {
    pub quorum_number: QuorumNumber,

    /// Operator stakes in this quorum.
    pub operators: BTreeMap<OperatorId, Stake>,

    /// Sum of all operator stakes in this quorum.
    pub total_stake: u128,

    /// Sum of all operator keys in this quorum. `None` for an empty quorum.
    pub aggregate_public_key: Option<BlsPublicKey>,

    pub indices: QuorumIndices,
}

/// Immutable operator state at (block, quorum set).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorStateSnapshot {
    pub block_number: BlockNumber,
    pub quorum_numbers: Vec<QuorumNumber>,
    quorums: BTreeMap<QuorumNumber, QuorumState>,
    operators: BTreeMap<OperatorId, OperatorInfo>,
}

impl OperatorStateSnapshot {
    /// Build a snapshot restricted to `quorum_numbers`.
    ///
    /// Operators not registered in any of the requested quorums are dropped,
    /// and stakes in other quorums are ignored. Quorum totals and aggregate
    /// keys are derived from the remaining operators.
    pub fn new(
        block_number: BlockNumber,
        quorum_numbers: &[QuorumNumber],
        operators: impl IntoIterator<Item = OperatorInfo>,
        indices: &BTreeMap<QuorumNumber, QuorumIndices>,
    ) -> Result<Self, CryptoError> {
        let mut quorum_numbers = quorum_numbers.to_vec();
        quorum_numbers.sort();
        quorum_numbers.dedup();

        let mut kept = BTreeMap::new();
        for mut operator in operators {
            operator.stakes.retain(|q, _| quorum_numbers.contains(q));
            operator.stake_indices.retain(|q, _| quorum_numbers.contains(q));
            if !operator.stakes.is_empty() {
                kept.insert(operator.operator_id, operator);
            }
        }

        let mut quorums = BTreeMap::new();
        for &quorum in &quorum_numbers {
            let members: BTreeMap<OperatorId, Stake> = kept
                .values()
                .filter_map(|op: &OperatorInfo| op.stake_in(quorum).map(|s| (op.operator_id, s)))
                .collect();
            let total_stake = members.values().map(|&s| s as u128).sum();
            let keys: Vec<BlsPublicKey> = members.keys().map(|id| kept[id].public_key).collect();
            let aggregate_public_key = if keys.is_empty() {
                None
            } else {
                Some(BlsPublicKey::aggregate(&keys)?)
            };

            quorums.insert(
                quorum,
                QuorumState {
                    quorum_number: quorum,
                    operators: members,
                    total_stake,
                    aggregate_public_key,
                    indices: indices.get(&quorum).copied().unwrap_or_default(),
                },
            );
        }

        Ok(Self {
            block_number,
            quorum_numbers,
            quorums,
            operators: kept,
        })
    }

    /// Look up a quorum.
    pub fn quorum(&self, quorum: QuorumNumber) -> Option<&QuorumState> {
        self.quorums.get(&quorum)
    }

    /// All quorums, ascending.
    pub fn quorums(&self) -> impl Iterator<Item = &QuorumState> {
        self.quorums.values()
    }

    /// Look up an operator registered in at least one snapshot quorum.
    pub fn operator(&self, operator_id: &OperatorId) -> Option<&OperatorInfo> {
        self.operators.get(operator_id)
    }

    /// All operators registered in at least one snapshot quorum, by id.
    pub fn operators(&self) -> impl Iterator<Item = &OperatorInfo> {
        self.operators.values()
    }

    /// Number of distinct operators across the snapshot quorums.
    pub fn operator_count(&self) -> usize {
        self.operators.len()
    }
}
