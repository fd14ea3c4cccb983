use crate::NonSignerStakesAndSignature;
use async_trait::async_trait;
use quorum_types::{Hash, TaskDescriptor};

/// Transaction hash.
pub type TxHash = Hash;

/// Inclusion receipt for a confirmation transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub tx_hash: TxHash,
    pub block_number: u64,
    pub gas_used: u64,
    /// Whether the transaction executed without reverting.
    pub success: bool,
}

/// Errors from the chain-write interface.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    #[error("transaction rejected: {0}")]
    Rejected(String),

    #[error("transport error: {0}")]
    Transport(String),
}

/// Chain-write interface to the task verifier contract.
#[async_trait]
pub trait ChainWriter: Send + Sync {
    /// Broadcast a confirmation of `task` carrying `proof`.
    async fn confirm_task(
        &self,
        task: &TaskDescriptor,
        proof: &NonSignerStakesAndSignature,
    ) -> Result<TxHash, ChainError>;

    /// `Ok(None)` while the transaction is not yet included.
    async fn transaction_receipt(&self, tx_hash: TxHash) -> Result<Option<Receipt>, ChainError>;
}
