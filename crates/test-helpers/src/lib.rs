//! Test helpers for the quorum aggregator.
//!
//! Provides a deterministic operator committee with real BLS keys so tests
//! exercise actual signature verification, plus fixtures and mocks for the
//! collaborator traits.
//!
//! # Example
//!
//! ```rust
//! use quorum_test_helpers::TestOperators;
//! use quorum_types::Hash;
//!
//! // Three operators in quorum 0 with equal stake
//! let ops = TestOperators::new(&[34, 34, 34]);
//!
//! let digest = Hash::from_bytes(b"task");
//! let signature = ops.sign(0, &digest);
//! assert!(ops.public_key(0).verify(digest.as_bytes(), &signature));
//! ```

pub mod fixtures;
pub mod mocks;

pub use mocks::{MockLivenessVerifier, MockOutcome, ScriptedReader};

use quorum_registry::{OperatorRegistryCache, StaticOperatorRegistry};
use quorum_types::{
    BlockNumber, BlsKeyPair, BlsPublicKey, BlsSignature, Hash, OperatorId, OperatorInfo,
    OperatorStateSnapshot, QuorumNumber, Stake,
};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A committee of operators with deterministic BLS keys and fixed stakes.
pub struct TestOperators {
    keypairs: Vec<BlsKeyPair>,
    infos: Vec<OperatorInfo>,
}

impl std::fmt::Debug for TestOperators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestOperators")
            .field("size", &self.keypairs.len())
            .finish()
    }
}

impl TestOperators {
    /// Operators registered in quorum 0 only, one per stake.
    pub fn new(stakes: &[Stake]) -> Self {
        let per_operator: Vec<Vec<(u8, Stake)>> = stakes.iter().map(|&s| vec![(0, s)]).collect();
        let refs: Vec<&[(u8, Stake)]> = per_operator.iter().map(|v| v.as_slice()).collect();
        Self::with_quorum_stakes(&refs)
    }

    /// Operators with explicit `(quorum, stake)` registrations.
    ///
    /// Operator `i` gets stake index `i` in every quorum and quorum-bitmap
    /// index `i`, so proof index arrays are easy to assert on.
    pub fn with_quorum_stakes(stakes: &[&[(u8, Stake)]]) -> Self {
        let mut keypairs = Vec::with_capacity(stakes.len());
        let mut infos = Vec::with_capacity(stakes.len());

        for (i, registrations) in stakes.iter().enumerate() {
            let mut seed = [0u8; 32];
            seed[..8].copy_from_slice(&(i as u64).to_le_bytes());
            seed[8..16].copy_from_slice(&0x517cc1b727220a95u64.to_le_bytes());
            let keypair = match BlsKeyPair::from_seed(&seed) {
                Ok(kp) => kp,
                Err(e) => panic!("test seed rejected: {e}"),
            };

            infos.push(OperatorInfo {
                operator_id: OperatorId::from_label(format!("operator-{i}").as_bytes()),
                public_key: keypair.public_key(),
                stakes: registrations
                    .iter()
                    .map(|&(q, s)| (QuorumNumber(q), s))
                    .collect(),
                quorum_bitmap_index: i as u32,
                stake_indices: registrations
                    .iter()
                    .map(|&(q, _)| (QuorumNumber(q), i as u32))
                    .collect(),
            });
            keypairs.push(keypair);
        }

        Self { keypairs, infos }
    }

    pub fn len(&self) -> usize {
        self.keypairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypairs.is_empty()
    }

    pub fn keypair(&self, idx: usize) -> &BlsKeyPair {
        &self.keypairs[idx]
    }

    pub fn id(&self, idx: usize) -> OperatorId {
        self.infos[idx].operator_id
    }

    pub fn public_key(&self, idx: usize) -> BlsPublicKey {
        self.infos[idx].public_key
    }

    /// Operator `idx`'s signature over a task digest.
    pub fn sign(&self, idx: usize, digest: &Hash) -> BlsSignature {
        self.keypairs[idx].sign(digest.as_bytes())
    }

    pub fn infos(&self) -> Vec<OperatorInfo> {
        self.infos.clone()
    }

    /// Snapshot of the committee at `block`.
    pub fn snapshot(&self, block: BlockNumber, quorums: &[QuorumNumber]) -> OperatorStateSnapshot {
        match OperatorStateSnapshot::new(block, quorums, self.infos(), &BTreeMap::new()) {
            Ok(snapshot) => snapshot,
            Err(e) => panic!("failed to build test snapshot: {e}"),
        }
    }

    /// A static registry valid from `start_block`.
    pub fn registry(&self, start_block: BlockNumber) -> StaticOperatorRegistry {
        StaticOperatorRegistry::new(start_block, self.infos())
    }

    /// A registry cache valid for every block.
    pub fn registry_cache(&self) -> Arc<OperatorRegistryCache> {
        self.registry_cache_from(BlockNumber(0))
    }

    /// A registry cache that reports blocks before `start_block` as unknown.
    pub fn registry_cache_from(&self, start_block: BlockNumber) -> Arc<OperatorRegistryCache> {
        Arc::new(OperatorRegistryCache::new(
            Arc::new(self.registry(start_block)),
            64,
        ))
    }
}
