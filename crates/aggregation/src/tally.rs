//! Per-task stake accounting.
//!
//! Owned by exactly one task actor; nothing here is shared.

use crate::result::{AggregateAttestation, NonSigner};
use crate::AggregationError;
use quorum_types::{
    BlsSignature, Hash, OperatorId, OperatorStateSnapshot, PublicKeyAccumulator, QuorumNumber,
    SignatureAccumulator, ThresholdPercentage,
};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Result of folding in a valid signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SignatureOutcome {
    Added,
    Duplicate,
}

pub(crate) struct QuorumTally {
    digest: Hash,
    snapshot: Arc<OperatorStateSnapshot>,
    quorum_numbers: Vec<QuorumNumber>,
    thresholds: Vec<ThresholdPercentage>,
    signed_stake: Vec<u128>,
    total_stake: Vec<u128>,
    signers: BTreeSet<OperatorId>,
    signature: SignatureAccumulator,
    signers_apk: PublicKeyAccumulator,
}

impl QuorumTally {
    pub(crate) fn new(
        digest: Hash,
        snapshot: Arc<OperatorStateSnapshot>,
        quorum_numbers: Vec<QuorumNumber>,
        thresholds: Vec<ThresholdPercentage>,
    ) -> Self {
        let total_stake = quorum_numbers
            .iter()
            .map(|&q| snapshot.quorum(q).map_or(0, |s| s.total_stake))
            .collect();
        Self {
            digest,
            snapshot,
            signed_stake: vec![0; quorum_numbers.len()],
            total_stake,
            quorum_numbers,
            thresholds,
            signers: BTreeSet::new(),
            signature: SignatureAccumulator::new(),
            signers_apk: PublicKeyAccumulator::new(),
        }
    }

    /// Validate and fold in one operator signature.
    ///
    /// On error the tally is unchanged.
    pub(crate) fn add_signature(
        &mut self,
        operator_id: OperatorId,
        signature: &BlsSignature,
    ) -> Result<SignatureOutcome, AggregationError> {
        let operator = self
            .snapshot
            .operator(&operator_id)
            .ok_or(AggregationError::UnknownOperator(operator_id))?;

        if !operator.public_key.verify(self.digest.as_bytes(), signature) {
            return Err(AggregationError::SignatureVerification(operator_id));
        }
        if self.signers.contains(&operator_id) {
            return Ok(SignatureOutcome::Duplicate);
        }

        // Both points were just decoded by `verify`, so neither add can fail
        // after the first succeeds.
        self.signature
            .add(signature)
            .map_err(|_| AggregationError::SignatureVerification(operator_id))?;
        self.signers_apk
            .add(&operator.public_key)
            .map_err(|_| AggregationError::SignatureVerification(operator_id))?;

        for (i, &quorum) in self.quorum_numbers.iter().enumerate() {
            if let Some(stake) = operator.stake_in(quorum) {
                self.signed_stake[i] += stake as u128;
            }
        }
        self.signers.insert(operator_id);
        Ok(SignatureOutcome::Added)
    }

    /// `collected * 100 >= threshold * total`, never for an empty quorum.
    fn quorum_met(&self, i: usize) -> bool {
        let total = self.total_stake[i];
        total > 0 && self.signed_stake[i] * 100 >= self.thresholds[i] as u128 * total
    }

    /// Whether every quorum has crossed its threshold.
    pub(crate) fn is_complete(&self) -> bool {
        (0..self.quorum_numbers.len()).all(|i| self.quorum_met(i))
    }

    pub(crate) fn signers(&self) -> Vec<OperatorId> {
        self.signers.iter().copied().collect()
    }

    pub(crate) fn signed_stake(&self) -> &[u128] {
        &self.signed_stake
    }

    pub(crate) fn total_stake(&self) -> &[u128] {
        &self.total_stake
    }

    /// Build the verifier inputs. `None` until at least one operator signed.
    pub(crate) fn attestation(&self) -> Option<AggregateAttestation> {
        let signature = self.signature.finish()?;
        let signers_apk = self.signers_apk.finish()?;

        let non_signers: Vec<NonSigner> = self
            .snapshot
            .operators()
            .filter(|op| !self.signers.contains(&op.operator_id))
            .map(|op| NonSigner {
                operator_id: op.operator_id,
                public_key: op.public_key,
                quorum_bitmap_index: op.quorum_bitmap_index,
            })
            .collect();

        let mut quorum_apks = Vec::with_capacity(self.quorum_numbers.len());
        let mut quorum_apk_indices = Vec::with_capacity(self.quorum_numbers.len());
        let mut total_stake_indices = Vec::with_capacity(self.quorum_numbers.len());
        let mut non_signer_stake_indices = Vec::with_capacity(self.quorum_numbers.len());
        for &quorum in &self.quorum_numbers {
            let state = self.snapshot.quorum(quorum)?;
            quorum_apks.push(state.aggregate_public_key?);
            quorum_apk_indices.push(state.indices.apk_index);
            total_stake_indices.push(state.indices.total_stake_index);
            non_signer_stake_indices.push(
                non_signers
                    .iter()
                    .filter_map(|n| self.snapshot.operator(&n.operator_id))
                    .filter(|op| op.stake_in(quorum).is_some())
                    .map(|op| op.stake_indices.get(&quorum).copied().unwrap_or_default())
                    .collect(),
            );
        }

        Some(AggregateAttestation {
            signature,
            signers_apk,
            quorum_apks,
            non_signers,
            quorum_apk_indices,
            total_stake_indices,
            non_signer_stake_indices,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quorum_test_helpers::TestOperators;
    use quorum_types::BlockNumber;

    fn tally(ops: &TestOperators, threshold: ThresholdPercentage) -> QuorumTally {
        let digest = Hash::from_bytes(b"task");
        let snapshot = Arc::new(ops.snapshot(BlockNumber(1), &[QuorumNumber(0)]));
        QuorumTally::new(digest, snapshot, vec![QuorumNumber(0)], vec![threshold])
    }

    #[test]
    fn test_threshold_boundary_is_inclusive() {
        let ops = TestOperators::new(&[67, 33]);
        let mut t = tally(&ops, 67);
        let digest = Hash::from_bytes(b"task");

        assert!(!t.is_complete());
        t.add_signature(ops.id(0), &ops.sign(0, &digest)).unwrap();
        assert!(t.is_complete());
    }

    #[test]
    fn test_duplicate_signature_not_double_counted() {
        let ops = TestOperators::new(&[50, 50]);
        let mut t = tally(&ops, 100);
        let digest = Hash::from_bytes(b"task");

        let sig = ops.sign(0, &digest);
        assert_eq!(t.add_signature(ops.id(0), &sig).unwrap(), SignatureOutcome::Added);
        assert_eq!(
            t.add_signature(ops.id(0), &sig).unwrap(),
            SignatureOutcome::Duplicate
        );
        assert_eq!(t.signed_stake(), &[50]);
    }

    #[test]
    fn test_invalid_signature_leaves_state_untouched() {
        let ops = TestOperators::new(&[50, 50]);
        let mut t = tally(&ops, 50);
        let wrong = ops.sign(1, &Hash::from_bytes(b"task"));

        let err = t.add_signature(ops.id(0), &wrong).unwrap_err();
        assert_eq!(err, AggregationError::SignatureVerification(ops.id(0)));
        assert_eq!(t.signed_stake(), &[0]);
        assert!(t.signers().is_empty());
        assert!(t.attestation().is_none());
    }

    #[test]
    fn test_unknown_operator_rejected() {
        let ops = TestOperators::new(&[50]);
        let mut t = tally(&ops, 50);
        let stranger = OperatorId::from_label(b"stranger");

        let err = t
            .add_signature(stranger, &ops.sign(0, &Hash::from_bytes(b"task")))
            .unwrap_err();
        assert_eq!(err, AggregationError::UnknownOperator(stranger));
    }

    #[test]
    fn test_zero_stake_quorum_never_met() {
        let ops = TestOperators::new(&[10]);
        let digest = Hash::from_bytes(b"task");
        let snapshot = Arc::new(ops.snapshot(BlockNumber(1), &[QuorumNumber(0), QuorumNumber(5)]));
        let mut t = QuorumTally::new(
            digest,
            snapshot,
            vec![QuorumNumber(0), QuorumNumber(5)],
            vec![0, 0],
        );
        t.add_signature(ops.id(0), &ops.sign(0, &digest)).unwrap();
        assert!(!t.is_complete());
    }

    #[test]
    fn test_attestation_lists_non_signers_by_id() {
        let ops = TestOperators::new(&[10, 20, 30, 40]);
        let mut t = tally(&ops, 10);
        let digest = Hash::from_bytes(b"task");
        t.add_signature(ops.id(2), &ops.sign(2, &digest)).unwrap();

        let attestation = t.attestation().unwrap();
        let ids: Vec<_> = attestation.non_signer_ids().copied().collect();
        let mut expected: Vec<(OperatorId, u32)> =
            [0, 1, 3].iter().map(|&i| (ops.id(i), i as u32)).collect();
        expected.sort();
        assert_eq!(ids, expected.iter().map(|e| e.0).collect::<Vec<_>>());
        assert_eq!(
            attestation.non_signer_stake_indices,
            vec![expected.iter().map(|e| e.1).collect::<Vec<_>>()]
        );
        assert_eq!(attestation.signers_apk, ops.public_key(2));
        assert_eq!(attestation.signature, ops.sign(2, &digest));
    }

    #[test]
    fn test_each_quorum_checked_against_its_own_threshold() {
        let ops = TestOperators::with_quorum_stakes(&[&[(0, 60), (1, 10)], &[(0, 40)], &[(1, 90)]]);
        let quorums = vec![QuorumNumber(0), QuorumNumber(1)];
        let snapshot = Arc::new(ops.snapshot(BlockNumber(1), &quorums));
        let digest = Hash::from_bytes(b"task");
        let mut t = QuorumTally::new(digest, snapshot, quorums, vec![50, 50]);

        t.add_signature(ops.id(0), &ops.sign(0, &digest)).unwrap();
        assert_eq!(t.signed_stake(), &[60, 10]);
        assert!(!t.is_complete());

        t.add_signature(ops.id(2), &ops.sign(2, &digest)).unwrap();
        assert_eq!(t.signed_stake(), &[60, 100]);
        assert!(t.is_complete());

        let attestation = t.attestation().unwrap();
        assert_eq!(attestation.non_signer_ids().copied().collect::<Vec<_>>(), vec![ops.id(1)]);
        assert_eq!(attestation.non_signer_stake_indices, vec![vec![1], vec![]]);
    }
}
