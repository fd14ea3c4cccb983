//! Task lifecycle: reservation, initialization, signature intake and the
//! per-task actor.

use crate::result::{AggregationResult, AggregationStatus};
use crate::tally::{QuorumTally, SignatureOutcome};
use crate::AggregationError;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use quick_cache::sync::Cache as QuickCache;
use quorum_registry::OperatorRegistryCache;
use quorum_types::{
    BlockNumber, BlsSignature, Hash, OperatorId, QuorumNumber, TaskIndex, ThresholdPercentage,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How many finished task indices are remembered to tell late signatures
/// apart from unknown tasks.
pub const COMPLETED_CACHE_CAPACITY: usize = 65_536;

/// Signatures buffered per task before submitters wait.
const SIGNATURE_QUEUE_DEPTH: usize = 1024;

/// Aggregation parameters for one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskParams {
    pub reference_block: BlockNumber,
    pub quorum_numbers: Vec<QuorumNumber>,
    pub threshold_percentages: Vec<ThresholdPercentage>,
    /// Earliest completion time, measured from initialization.
    pub min_wait: Duration,
    /// Hard deadline, measured from initialization.
    pub time_to_expiry: Duration,
}

impl TaskParams {
    fn validate(&self) -> Result<(), AggregationError> {
        if self.quorum_numbers.is_empty() {
            return Err(AggregationError::InvalidQuorumThresholds(
                "no quorums".to_string(),
            ));
        }
        if self.quorum_numbers.len() != self.threshold_percentages.len() {
            return Err(AggregationError::InvalidQuorumThresholds(format!(
                "{} quorums but {} thresholds",
                self.quorum_numbers.len(),
                self.threshold_percentages.len()
            )));
        }
        if let Some(t) = self.threshold_percentages.iter().find(|&&t| t > 100) {
            return Err(AggregationError::InvalidQuorumThresholds(format!(
                "threshold {t} exceeds 100"
            )));
        }
        let unique: BTreeSet<_> = self.quorum_numbers.iter().collect();
        if unique.len() != self.quorum_numbers.len() {
            return Err(AggregationError::InvalidQuorumThresholds(
                "duplicate quorum".to_string(),
            ));
        }
        Ok(())
    }
}

struct SignatureRequest {
    operator_id: OperatorId,
    signature: BlsSignature,
    reply: oneshot::Sender<Result<(), AggregationError>>,
}

/// Engine-side handle to a reserved or running task.
struct TaskSlot {
    digest: Hash,
    signatures: mpsc::Sender<SignatureRequest>,
}

struct Inner {
    registry: Arc<OperatorRegistryCache>,
    active: DashMap<TaskIndex, TaskSlot>,
    completed: QuickCache<TaskIndex, ()>,
    results: mpsc::UnboundedSender<AggregationResult>,
    shutdown: CancellationToken,
}

impl Inner {
    /// Error for a task that has no active slot.
    fn missing(&self, task_index: TaskIndex) -> AggregationError {
        if self.completed.get(&task_index).is_some() {
            AggregationError::TaskAlreadyCompleted(task_index)
        } else if self.shutdown.is_cancelled() {
            AggregationError::ShuttingDown
        } else {
            AggregationError::UnknownTask(task_index)
        }
    }

    fn release(&self, task_index: TaskIndex) {
        self.active.remove(&task_index);
        quorum_metrics::set_active_tasks(self.active.len());
    }
}

/// Stake-weighted BLS aggregation across concurrent tasks.
///
/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct BlsAggregationService {
    inner: Arc<Inner>,
}

impl BlsAggregationService {
    /// Create the service and the receiving end of its results channel.
    ///
    /// Cancelling `shutdown` stops every running task without emitting a
    /// result.
    pub fn new(
        registry: Arc<OperatorRegistryCache>,
        shutdown: CancellationToken,
    ) -> (Self, mpsc::UnboundedReceiver<AggregationResult>) {
        let (results, results_rx) = mpsc::unbounded_channel();
        let service = Self {
            inner: Arc::new(Inner {
                registry,
                active: DashMap::new(),
                completed: QuickCache::new(COMPLETED_CACHE_CAPACITY),
                results,
                shutdown,
            }),
        };
        (service, results_rx)
    }

    /// Claim `task_index` for `task_digest`.
    ///
    /// Synchronous so it can run inside a caller's critical section. From
    /// here on, signatures for the task are accepted and queued until the
    /// reservation is initialized. Dropping the reservation uninitialized
    /// releases the index.
    pub fn reserve_task(
        &self,
        task_index: TaskIndex,
        task_digest: Hash,
    ) -> Result<TaskReservation, AggregationError> {
        if self.inner.shutdown.is_cancelled() {
            return Err(AggregationError::ShuttingDown);
        }
        if self.inner.completed.get(&task_index).is_some() {
            return Err(AggregationError::DuplicateTask(task_index));
        }

        let (tx, rx) = mpsc::channel(SIGNATURE_QUEUE_DEPTH);
        match self.inner.active.entry(task_index) {
            Entry::Occupied(_) => return Err(AggregationError::DuplicateTask(task_index)),
            Entry::Vacant(v) => {
                v.insert(TaskSlot {
                    digest: task_digest,
                    signatures: tx,
                });
            }
        }
        quorum_metrics::set_active_tasks(self.inner.active.len());

        Ok(TaskReservation {
            inner: self.inner.clone(),
            task_index,
            task_digest,
            signatures: Some(rx),
        })
    }

    /// Reserve and initialize in one step.
    pub async fn initialize_new_task(
        &self,
        task_index: TaskIndex,
        task_digest: Hash,
        params: TaskParams,
    ) -> Result<(), AggregationError> {
        self.reserve_task(task_index, task_digest)?
            .initialize(params)
            .await
    }

    /// Submit one operator signature for a task.
    ///
    /// Returns once the task has accepted or rejected the signature. A
    /// repeated valid signature succeeds without changing the tally.
    pub async fn process_new_signature(
        &self,
        task_index: TaskIndex,
        task_digest: Hash,
        signature: BlsSignature,
        operator_id: OperatorId,
    ) -> Result<(), AggregationError> {
        let signatures = {
            let Some(slot) = self.inner.active.get(&task_index) else {
                return Err(self.inner.missing(task_index));
            };
            if slot.digest != task_digest {
                return Err(AggregationError::DigestMismatch {
                    task_index,
                    expected: slot.digest,
                    actual: task_digest,
                });
            }
            slot.signatures.clone()
        };

        let (reply, reply_rx) = oneshot::channel();
        let request = SignatureRequest {
            operator_id,
            signature,
            reply,
        };
        if signatures.send(request).await.is_err() {
            return Err(self.inner.missing(task_index));
        }
        // The actor drops queued requests when it finishes.
        reply_rx
            .await
            .unwrap_or_else(|_| Err(self.inner.missing(task_index)))
    }

    /// Number of reserved or running tasks.
    pub fn active_tasks(&self) -> usize {
        self.inner.active.len()
    }
}

/// A claimed task index awaiting its operator snapshot.
#[must_use = "dropping a reservation releases the task index"]
pub struct TaskReservation {
    inner: Arc<Inner>,
    task_index: TaskIndex,
    task_digest: Hash,
    signatures: Option<mpsc::Receiver<SignatureRequest>>,
}

impl TaskReservation {
    pub fn task_index(&self) -> TaskIndex {
        self.task_index
    }

    /// Load the operator snapshot and start collecting.
    ///
    /// On error the reservation is released.
    pub async fn initialize(mut self, params: TaskParams) -> Result<(), AggregationError> {
        params.validate()?;

        let snapshot = self
            .inner
            .registry
            .get_state_at_block(&params.quorum_numbers, params.reference_block)
            .await?;

        let Some(signatures) = self.signatures.take() else {
            return Err(AggregationError::DuplicateTask(self.task_index));
        };

        let tally = QuorumTally::new(
            self.task_digest,
            snapshot,
            params.quorum_numbers.clone(),
            params.threshold_percentages.clone(),
        );
        let actor = TaskActor {
            inner: self.inner.clone(),
            task_index: self.task_index,
            task_digest: self.task_digest,
            params,
            tally,
            started: Instant::now(),
        };

        info!(
            task_index = %self.task_index,
            digest = %self.task_digest,
            block = %actor.params.reference_block,
            quorums = ?actor.params.quorum_numbers,
            "Task initialized"
        );
        quorum_metrics::record_task_initialized();
        tokio::spawn(actor.run(signatures));
        Ok(())
    }
}

impl Drop for TaskReservation {
    fn drop(&mut self) {
        if self.signatures.is_some() {
            debug!(task_index = %self.task_index, "Releasing uninitialized task");
            self.inner.release(self.task_index);
        }
    }
}

struct TaskActor {
    inner: Arc<Inner>,
    task_index: TaskIndex,
    task_digest: Hash,
    params: TaskParams,
    tally: QuorumTally,
    started: Instant,
}

impl TaskActor {
    async fn run(mut self, mut signatures: mpsc::Receiver<SignatureRequest>) {
        let min_wait = tokio::time::sleep_until(self.started + self.params.min_wait);
        let expiry = tokio::time::sleep_until(self.started + self.params.time_to_expiry);
        tokio::pin!(min_wait, expiry);
        let mut min_wait_elapsed = false;
        let shutdown = self.inner.shutdown.clone();

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    debug!(task_index = %self.task_index, "Task stopped by shutdown");
                    self.inner.release(self.task_index);
                    return;
                }

                _ = &mut min_wait, if !min_wait_elapsed => {
                    min_wait_elapsed = true;
                    if self.tally.is_complete() {
                        self.finish(AggregationStatus::Completed);
                        return;
                    }
                }

                _ = &mut expiry => {
                    self.finish(AggregationStatus::Expired);
                    return;
                }

                Some(request) = signatures.recv() => {
                    let outcome = self.tally.add_signature(request.operator_id, &request.signature);
                    match &outcome {
                        Ok(SignatureOutcome::Added) => {
                            quorum_metrics::record_signature_accepted();
                            debug!(
                                task_index = %self.task_index,
                                operator = %request.operator_id,
                                signed_stake = ?self.tally.signed_stake(),
                                "Signature accepted"
                            );
                        }
                        Ok(SignatureOutcome::Duplicate) => {}
                        Err(e) => {
                            quorum_metrics::record_signature_rejected(e.kind());
                            warn!(
                                task_index = %self.task_index,
                                operator = %request.operator_id,
                                error = %e,
                                "Signature rejected"
                            );
                        }
                    }
                    let _ = request.reply.send(outcome.map(|_| ()));

                    if min_wait_elapsed && self.tally.is_complete() {
                        self.finish(AggregationStatus::Completed);
                        return;
                    }
                }
            }
        }
    }

    /// Mark the task finished and emit its result.
    ///
    /// The index enters the completed cache before it leaves the active map,
    /// so late submitters always see `TaskAlreadyCompleted`.
    fn finish(self, status: AggregationStatus) {
        let elapsed = self.started.elapsed();
        self.inner.completed.insert(self.task_index, ());
        self.inner.release(self.task_index);

        let (error, attestation) = match status {
            AggregationStatus::Completed => {
                quorum_metrics::record_aggregation_completed(elapsed.as_secs_f64());
                info!(
                    task_index = %self.task_index,
                    digest = %self.task_digest,
                    signers = self.tally.signers().len(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Quorum reached"
                );
                (None, self.tally.attestation())
            }
            AggregationStatus::Expired => {
                quorum_metrics::record_aggregation_expired();
                warn!(
                    task_index = %self.task_index,
                    digest = %self.task_digest,
                    signed_stake = ?self.tally.signed_stake(),
                    total_stake = ?self.tally.total_stake(),
                    "Task expired before reaching quorum"
                );
                (
                    Some(AggregationError::InsufficientQuorum {
                        task_index: self.task_index,
                    }),
                    None,
                )
            }
        };

        let result = AggregationResult {
            task_index: self.task_index,
            task_digest: self.task_digest,
            status,
            error,
            reference_block: self.params.reference_block,
            quorum_numbers: self.params.quorum_numbers,
            signers: self.tally.signers(),
            signed_stake: self.tally.signed_stake().to_vec(),
            total_stake: self.tally.total_stake().to_vec(),
            attestation,
            elapsed,
        };
        if self.inner.results.send(result).is_err() {
            warn!(task_index = %self.task_index, "Results channel closed, dropping result");
        }
    }
}
