use async_trait::async_trait;
use quorum_types::{BlockNumber, CryptoError, OperatorStateSnapshot, QuorumNumber};

/// Errors from resolving operator state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Operator state unavailable at block {0}")]
    UnknownBlock(BlockNumber),

    #[error("Chain read failed: {0}")]
    Read(String),

    #[error("Invalid operator state: {0}")]
    InvalidState(#[from] CryptoError),
}

/// Chain-read interface for historical operator state.
///
/// Implementations return the full snapshot for the requested quorums at
/// `block`. The block must already be final: snapshots are cached forever.
#[async_trait]
pub trait OperatorStateReader: Send + Sync {
    async fn operator_state_at(
        &self,
        block: BlockNumber,
        quorum_numbers: &[QuorumNumber],
    ) -> Result<OperatorStateSnapshot, RegistryError>;
}
