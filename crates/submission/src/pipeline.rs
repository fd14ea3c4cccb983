use crate::{ChainWriter, NonSignerStakesAndSignature, Receipt, SubmissionError, TxHash};
use quorum_aggregation::AggregationResult;
use quorum_types::{TaskDescriptor, TaskIndex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// Receipt polling settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmissionConfig {
    /// Pause between receipt queries (default: 3s).
    pub receipt_poll_interval: Duration,
    /// Give up on a receipt after this long (default: 300s).
    pub receipt_timeout: Duration,
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            receipt_poll_interval: Duration::from_secs(3),
            receipt_timeout: Duration::from_secs(300),
        }
    }
}

/// Submits completed aggregations and watches for their receipts.
///
/// Submission never retries. Receipt pollers run in the background and are
/// joined by [`shutdown`](Self::shutdown).
pub struct SubmissionPipeline {
    chain: Arc<dyn ChainWriter>,
    config: SubmissionConfig,
    pollers: TaskTracker,
    shutdown: CancellationToken,
    pending: Arc<AtomicUsize>,
}

impl SubmissionPipeline {
    pub fn new(
        chain: Arc<dyn ChainWriter>,
        config: SubmissionConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            chain,
            config,
            pollers: TaskTracker::new(),
            shutdown,
            pending: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Submit the confirmation for `task`.
    ///
    /// Results carrying an error (expired tasks) are refused without touching
    /// the chain. On success the transaction hash is returned and a receipt
    /// poller is started.
    pub async fn submit(
        &self,
        task: &TaskDescriptor,
        result: &AggregationResult,
    ) -> Result<TxHash, SubmissionError> {
        if let Some(source) = &result.error {
            quorum_metrics::record_submission("skipped");
            return Err(SubmissionError::Aggregation {
                task_index: result.task_index,
                source: source.clone(),
            });
        }
        let attestation = result
            .attestation
            .as_ref()
            .ok_or(SubmissionError::MissingAttestation(result.task_index))?;
        let proof = NonSignerStakesAndSignature::from(attestation);

        let tx_hash = match self.chain.confirm_task(task, &proof).await {
            Ok(tx_hash) => tx_hash,
            Err(e) => {
                quorum_metrics::record_submission("failed");
                return Err(e.into());
            }
        };
        quorum_metrics::record_submission("sent");
        info!(
            task_index = %result.task_index,
            digest = %result.task_digest,
            tx = %tx_hash,
            non_signers = proof.non_signer_pubkeys.len(),
            "Confirmation sent"
        );

        self.track_receipt(result.task_index, tx_hash);
        Ok(tx_hash)
    }

    fn track_receipt(&self, task_index: TaskIndex, tx_hash: TxHash) {
        let chain = self.chain.clone();
        let config = self.config;
        let shutdown = self.shutdown.clone();
        let pending = self.pending.clone();

        quorum_metrics::set_pending_receipts(pending.fetch_add(1, Ordering::SeqCst) + 1);
        self.pollers.spawn(async move {
            poll_receipt(chain.as_ref(), task_index, tx_hash, config, &shutdown).await;
            quorum_metrics::set_pending_receipts(pending.fetch_sub(1, Ordering::SeqCst) - 1);
        });
    }

    /// Transactions still awaiting a receipt.
    pub fn pending_receipts(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Cancel and join every receipt poller.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.pollers.close();
        self.pollers.wait().await;
    }
}

/// Poll until the receipt shows up, the deadline passes or shutdown.
///
/// Query errors count as "not yet".
async fn poll_receipt(
    chain: &dyn ChainWriter,
    task_index: TaskIndex,
    tx_hash: TxHash,
    config: SubmissionConfig,
    shutdown: &CancellationToken,
) -> Option<Receipt> {
    let deadline = Instant::now() + config.receipt_timeout;

    loop {
        let polled = tokio::select! {
            biased;
            _ = shutdown.cancelled() => return None,
            polled = tokio::time::timeout_at(deadline, chain.transaction_receipt(tx_hash)) => polled,
        };
        match polled {
            Ok(Ok(Some(receipt))) => {
                quorum_metrics::record_receipt(if receipt.success { "success" } else { "reverted" });
                if receipt.success {
                    info!(
                        %task_index,
                        tx = %tx_hash,
                        block = receipt.block_number,
                        gas_used = receipt.gas_used,
                        success = receipt.success,
                        "Confirmation included"
                    );
                } else {
                    error!(
                        %task_index,
                        tx = %tx_hash,
                        block = receipt.block_number,
                        gas_used = receipt.gas_used,
                        success = receipt.success,
                        "Confirmation reverted"
                    );
                }
                return Some(receipt);
            }
            Ok(Ok(None)) => {}
            Ok(Err(e)) => debug!(%task_index, tx = %tx_hash, error = %e, "Receipt query failed"),
            Err(_) => break,
        }

        tokio::select! {
            biased;
            _ = shutdown.cancelled() => return None,
            _ = tokio::time::sleep_until(deadline) => break,
            _ = tokio::time::sleep(config.receipt_poll_interval) => {}
        }
    }

    quorum_metrics::record_receipt("timeout");
    warn!(
        %task_index,
        tx = %tx_hash,
        timeout_secs = config.receipt_timeout.as_secs(),
        "No receipt before deadline"
    );
    None
}
