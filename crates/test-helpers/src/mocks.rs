//! Mock collaborators.

use async_trait::async_trait;
use quorum_attestation::{LayerError, LivenessVerifier};
use quorum_registry::{OperatorStateReader, RegistryError};
use quorum_types::{
    AttestationProof, BlockNumber, OperatorInfo, OperatorStateSnapshot, QuorumNumber,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// What a [`MockLivenessVerifier`] answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockOutcome {
    Pass,
    Fail,
    Error,
}

/// Liveness verifier with a fixed answer that counts its calls.
#[derive(Debug)]
pub struct MockLivenessVerifier {
    version: String,
    outcome: MockOutcome,
    calls: AtomicUsize,
}

impl MockLivenessVerifier {
    pub fn new(version: &str, outcome: MockOutcome) -> Self {
        Self {
            version: version.to_string(),
            outcome,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LivenessVerifier for MockLivenessVerifier {
    fn version(&self) -> &str {
        &self.version
    }

    async fn verify_liveness_proof(&self, _proof: &AttestationProof) -> Result<bool, LayerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.outcome {
            MockOutcome::Pass => Ok(true),
            MockOutcome::Fail => Ok(false),
            MockOutcome::Error => Err(LayerError::Transport("connection refused".to_string())),
        }
    }
}

/// Operator state reader with scripted unknown blocks and latency.
#[derive(Debug)]
pub struct ScriptedReader {
    operators: Vec<OperatorInfo>,
    unknown_blocks: BTreeSet<BlockNumber>,
    delay: Duration,
    calls: AtomicUsize,
}

impl ScriptedReader {
    pub fn new(operators: Vec<OperatorInfo>) -> Self {
        Self {
            operators,
            unknown_blocks: BTreeSet::new(),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    /// Report `block` as unavailable.
    pub fn with_unknown_block(mut self, block: BlockNumber) -> Self {
        self.unknown_blocks.insert(block);
        self
    }

    /// Sleep this long on every read.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OperatorStateReader for ScriptedReader {
    async fn operator_state_at(
        &self,
        block: BlockNumber,
        quorum_numbers: &[QuorumNumber],
    ) -> Result<OperatorStateSnapshot, RegistryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.unknown_blocks.contains(&block) {
            return Err(RegistryError::UnknownBlock(block));
        }
        Ok(OperatorStateSnapshot::new(
            block,
            quorum_numbers,
            self.operators.iter().cloned(),
            &BTreeMap::new(),
        )?)
    }
}
