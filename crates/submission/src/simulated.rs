//! In-memory chain for simulation mode.

use crate::{ChainError, ChainWriter, NonSignerStakesAndSignature, Receipt, TxHash};
use async_trait::async_trait;
use parking_lot::Mutex;
use quorum_types::{Hash, TaskDescriptor};
use std::collections::HashMap;
use tracing::info;

/// A confirmation recorded by [`SimulatedChain`].
#[derive(Debug, Clone)]
pub struct Confirmation {
    pub task_digest: Hash,
    pub tx_hash: TxHash,
    pub proof: NonSignerStakesAndSignature,
}

#[derive(Default)]
struct State {
    confirmations: Vec<Confirmation>,
    polls: HashMap<TxHash, u32>,
}

/// A [`ChainWriter`] that records confirmations and reports each one as
/// included on its `polls_until_receipt`-th receipt query.
pub struct SimulatedChain {
    polls_until_receipt: u32,
    state: Mutex<State>,
}

impl SimulatedChain {
    pub fn new(polls_until_receipt: u32) -> Self {
        Self {
            polls_until_receipt: polls_until_receipt.max(1),
            state: Mutex::new(State::default()),
        }
    }

    pub fn confirmations(&self) -> Vec<Confirmation> {
        self.state.lock().confirmations.clone()
    }

    /// Receipt queries seen for `tx_hash`.
    pub fn polls(&self, tx_hash: &TxHash) -> u32 {
        self.state.lock().polls.get(tx_hash).copied().unwrap_or(0)
    }
}

#[async_trait]
impl ChainWriter for SimulatedChain {
    async fn confirm_task(
        &self,
        task: &TaskDescriptor,
        proof: &NonSignerStakesAndSignature,
    ) -> Result<TxHash, ChainError> {
        let mut state = self.state.lock();
        let nonce = state.confirmations.len() as u64;
        let task_digest = task.digest();
        let tx_hash = Hash::from_parts(&[
            b"SIMULATED_TX",
            task_digest.as_bytes(),
            &nonce.to_le_bytes(),
        ]);
        info!(tx = %tx_hash, digest = %task_digest, "Simulated confirmation");

        state.confirmations.push(Confirmation {
            task_digest,
            tx_hash,
            proof: proof.clone(),
        });
        state.polls.insert(tx_hash, 0);
        Ok(tx_hash)
    }

    async fn transaction_receipt(&self, tx_hash: TxHash) -> Result<Option<Receipt>, ChainError> {
        let mut state = self.state.lock();
        let Some(polls) = state.polls.get_mut(&tx_hash) else {
            return Ok(None);
        };
        *polls += 1;
        if *polls < self.polls_until_receipt {
            return Ok(None);
        }

        let index = state
            .confirmations
            .iter()
            .position(|c| c.tx_hash == tx_hash)
            .unwrap_or_default();
        let non_signers = state.confirmations[index].proof.non_signer_pubkeys.len() as u64;
        Ok(Some(Receipt {
            tx_hash,
            block_number: index as u64 + 1,
            gas_used: 120_000 + 6_000 * non_signers,
            success: true,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quorum_test_helpers::{fixtures, TestOperators};
    use quorum_types::BlockNumber;

    fn proof(ops: &TestOperators) -> NonSignerStakesAndSignature {
        NonSignerStakesAndSignature {
            non_signer_quorum_bitmap_indices: vec![],
            non_signer_pubkeys: vec![],
            quorum_apks: vec![ops.public_key(0)],
            signers_apk: ops.public_key(0),
            sigma: ops.sign(0, &Hash::ZERO),
            quorum_apk_indices: vec![0],
            total_stake_indices: vec![0],
            non_signer_stake_indices: vec![vec![]],
        }
    }

    #[tokio::test]
    async fn test_receipt_after_configured_polls() {
        let ops = TestOperators::new(&[1]);
        let chain = SimulatedChain::new(3);
        let task = fixtures::task(2, 0, BlockNumber(1));
        let tx = chain.confirm_task(&task, &proof(&ops)).await.unwrap();

        assert!(chain.transaction_receipt(tx).await.unwrap().is_none());
        assert!(chain.transaction_receipt(tx).await.unwrap().is_none());
        let receipt = chain.transaction_receipt(tx).await.unwrap().unwrap();
        assert!(receipt.success);
        assert_eq!(receipt.tx_hash, tx);
        assert_eq!(chain.polls(&tx), 3);
    }

    #[tokio::test]
    async fn test_distinct_hashes_for_resubmission() {
        let ops = TestOperators::new(&[1]);
        let chain = SimulatedChain::new(1);
        let task = fixtures::task(2, 0, BlockNumber(1));

        let a = chain.confirm_task(&task, &proof(&ops)).await.unwrap();
        let b = chain.confirm_task(&task, &proof(&ops)).await.unwrap();
        assert_ne!(a, b);
        assert!(chain
            .transaction_receipt(Hash::from_bytes(b"unknown"))
            .await
            .unwrap()
            .is_none());
    }
}
