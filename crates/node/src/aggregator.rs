//! Task intake and the result dispatch loop.

use crate::config::AggregatorConfig;
use crate::sampling::SamplingPolicy;
use crate::task_registry::{RegisterError, Registration, TaskRegistry};
use parking_lot::Mutex;
use quick_cache::sync::Cache as QuickCache;
use quorum_aggregation::{AggregationError, AggregationResult, BlsAggregationService, TaskParams};
use quorum_attestation::{AttestationError, AttestationVerifier};
use quorum_registry::OperatorRegistryCache;
use quorum_submission::{ChainWriter, SubmissionConfig, SubmissionPipeline};
use quorum_types::{
    Hash, SignedTaskResponse, TaskClass, TaskDescriptor, TaskError, TaskIndex,
    ThresholdPercentage,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Finished digests remembered so late responses do not reopen a task.
///
/// Once a digest is evicted, a response for it starts a fresh aggregation
/// under a new index. That window is accepted.
const FINISHED_DIGEST_CAPACITY: usize = 65_536;

/// Errors returned to the submitter of a signed task response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("Invalid task: {0}")]
    InvalidTask(#[from] TaskError),

    #[error(transparent)]
    Aggregation(#[from] AggregationError),

    #[error("Task index space exhausted")]
    TaskIndexExhausted,
}

/// Accepted (or sampled-out) task response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitOutcome {
    pub digest: Hash,
    /// `None` when the response was skipped.
    pub task_index: Option<TaskIndex>,
    pub skipped: bool,
}

/// Aggregation parameters applied to every task.
#[derive(Debug, Clone)]
pub struct AggregatorSettings {
    pub min_wait: Duration,
    pub time_to_expiry: Duration,
    /// Overrides the thresholds carried by each task.
    pub threshold: Option<ThresholdPercentage>,
    pub sampling: SamplingPolicy,
    pub submission: SubmissionConfig,
}

impl AggregatorSettings {
    pub fn from_config(config: &AggregatorConfig) -> Self {
        Self {
            min_wait: config.aggregation.min_wait(),
            time_to_expiry: config.aggregation.time_to_expiry(),
            threshold: config.aggregation.threshold,
            sampling: SamplingPolicy::from(&config.sampling),
            submission: config.submission.pipeline_config(),
        }
    }

    fn task_params(&self, task: &TaskDescriptor) -> TaskParams {
        let threshold_percentages = match self.threshold {
            Some(threshold) => vec![threshold; task.quorum_numbers.len()],
            None => task.quorum_threshold_percentages.clone(),
        };
        TaskParams {
            reference_block: task.reference_block_number,
            quorum_numbers: task.quorum_numbers.clone(),
            threshold_percentages,
            min_wait: self.min_wait,
            time_to_expiry: self.time_to_expiry,
        }
    }
}

/// Point-in-time counters for the status endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatorStatus {
    pub active_tasks: usize,
    pub pending_receipts: usize,
    pub cached_snapshots: usize,
    pub attestation_layers: Vec<String>,
    pub running: bool,
}

/// The aggregator node core.
///
/// Signed responses enter through [`submit_signed_response`]; completed and
/// expired aggregations leave through [`run`], which hands completed ones to
/// the submission pipeline.
///
/// [`submit_signed_response`]: Self::submit_signed_response
/// [`run`]: Self::run
pub struct Aggregator {
    settings: AggregatorSettings,
    registry: Arc<OperatorRegistryCache>,
    tasks: TaskRegistry,
    engine: BlsAggregationService,
    results: Mutex<Option<mpsc::UnboundedReceiver<AggregationResult>>>,
    finished: QuickCache<Hash, TaskIndex>,
    attestation: AttestationVerifier,
    submission: SubmissionPipeline,
    shutdown: CancellationToken,
    running: AtomicBool,
}

impl Aggregator {
    pub fn new(
        settings: AggregatorSettings,
        registry: Arc<OperatorRegistryCache>,
        attestation: AttestationVerifier,
        chain: Arc<dyn ChainWriter>,
        shutdown: CancellationToken,
    ) -> Self {
        let (engine, results) = BlsAggregationService::new(registry.clone(), shutdown.clone());
        let submission =
            SubmissionPipeline::new(chain, settings.submission, shutdown.child_token());
        Self {
            settings,
            registry,
            tasks: TaskRegistry::new(),
            engine,
            results: Mutex::new(Some(results)),
            finished: QuickCache::new(FINISHED_DIGEST_CAPACITY),
            attestation,
            submission,
            shutdown,
            running: AtomicBool::new(false),
        }
    }

    /// Accept one operator's signature over a task.
    ///
    /// The first response for a digest registers the task and starts its
    /// aggregation. Responses for tasks that already finished succeed
    /// without effect.
    #[instrument(skip_all, fields(operator = %response.operator_id))]
    pub async fn submit_signed_response(
        &self,
        response: SignedTaskResponse,
    ) -> Result<SubmitOutcome, SubmitError> {
        quorum_metrics::record_task_response_received();
        let SignedTaskResponse {
            task,
            operator_id,
            signature,
        } = response;
        task.validate()?;
        let digest = task.digest();

        if !self.settings.sampling.should_process(&task)? {
            let class = match task.class() {
                TaskClass::Generation => "generation",
                TaskClass::Execution => "execution",
            };
            quorum_metrics::record_task_sampled_out(class);
            debug!(%digest, class, "Task response sampled out");
            return Ok(SubmitOutcome {
                digest,
                task_index: None,
                skipped: true,
            });
        }

        let registration = self.tasks.register(digest, &task, |index| {
            if let Some(finished) = self.finished.get(&digest) {
                return Err(AggregationError::TaskAlreadyCompleted(finished));
            }
            self.engine.reserve_task(index, digest)
        });
        let task_index = match registration {
            Ok(Registration::Existing(existing)) => existing.index,
            Ok(Registration::New(new, reservation)) => {
                let params = self.settings.task_params(&task);
                if let Err(e) = reservation.initialize(params).await {
                    warn!(task_index = %new.index, %digest, error = %e, "Task initialization failed");
                    self.tasks.remove(&digest);
                    return Err(e.into());
                }
                new.index
            }
            Err(RegisterError::Reserve(e)) if e.is_already_completed() => {
                return Ok(self.already_completed(digest, e));
            }
            Err(RegisterError::Reserve(e)) => return Err(e.into()),
            Err(RegisterError::Exhausted) => {
                warn!(%digest, "Task index space exhausted");
                return Err(SubmitError::TaskIndexExhausted);
            }
        };

        match self
            .engine
            .process_new_signature(task_index, digest, signature, operator_id)
            .await
        {
            Ok(()) => {}
            Err(e) if e.is_already_completed() => {
                debug!(%task_index, %digest, "Signature for completed task");
            }
            Err(e) => return Err(e.into()),
        }

        Ok(SubmitOutcome {
            digest,
            task_index: Some(task_index),
            skipped: false,
        })
    }

    fn already_completed(&self, digest: Hash, error: AggregationError) -> SubmitOutcome {
        let task_index = match error {
            AggregationError::TaskAlreadyCompleted(index) => Some(index),
            _ => None,
        };
        debug!(%digest, ?task_index, "Response for finished task");
        SubmitOutcome {
            digest,
            task_index,
            skipped: false,
        }
    }

    /// Check a TEE-attested key against the attestation layers.
    pub async fn verify_key(&self, x: [u8; 32], y: [u8; 32]) -> Result<bool, AttestationError> {
        self.attestation.verify_key(x, y).await
    }

    /// Consume aggregation results until shutdown.
    ///
    /// Only one caller gets the results channel; later calls return
    /// immediately.
    pub async fn run(&self) {
        let Some(mut results) = self.results.lock().take() else {
            warn!("Dispatch loop already running");
            return;
        };
        self.running.store(true, Ordering::SeqCst);
        info!("Dispatch loop started");

        loop {
            let result = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                result = results.recv() => match result {
                    Some(result) => result,
                    None => break,
                },
            };
            self.dispatch(result).await;
        }

        self.running.store(false, Ordering::SeqCst);
        info!("Dispatch loop stopped");
    }

    async fn dispatch(&self, result: AggregationResult) {
        let digest = result.task_digest;
        self.finished.insert(digest, result.task_index);
        let Some(task) = self.tasks.remove(&digest) else {
            warn!(task_index = %result.task_index, %digest, "Result for unregistered task");
            return;
        };
        if task.index != result.task_index {
            warn!(
                registered = %task.index,
                reported = %result.task_index,
                %digest,
                "Task index mismatch"
            );
            return;
        }

        if !result.is_completed() {
            warn!(
                task_index = %task.index,
                %digest,
                signers = result.signers.len(),
                age_ms = task.created_at.elapsed().as_millis() as u64,
                "Task expired before reaching quorum"
            );
            return;
        }

        match self.submission.submit(&task.descriptor, &result).await {
            Ok(tx_hash) => {
                debug!(task_index = %task.index, tx = %tx_hash, "Task submitted");
            }
            Err(e) => {
                warn!(task_index = %task.index, %digest, error = %e, "Task submission failed");
            }
        }
    }

    /// Stop accepting work and wait for receipt pollers.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.submission.shutdown().await;
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub fn status(&self) -> AggregatorStatus {
        AggregatorStatus {
            active_tasks: self.tasks.len(),
            pending_receipts: self.submission.pending_receipts(),
            cached_snapshots: self.registry.len(),
            attestation_layers: self
                .attestation
                .versions()
                .into_iter()
                .map(str::to_string)
                .collect(),
            running: self.running.load(Ordering::SeqCst),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quorum_attestation::LivenessVerifier;
    use quorum_submission::SimulatedChain;
    use quorum_test_helpers::{fixtures, MockLivenessVerifier, MockOutcome, TestOperators};
    use quorum_types::{BlockNumber, QuorumNumber};

    struct Harness {
        ops: TestOperators,
        chain: Arc<SimulatedChain>,
        aggregator: Arc<Aggregator>,
    }

    fn settings() -> AggregatorSettings {
        AggregatorSettings {
            min_wait: Duration::ZERO,
            time_to_expiry: Duration::from_secs(30),
            threshold: None,
            sampling: SamplingPolicy::disabled(),
            submission: SubmissionConfig {
                receipt_poll_interval: Duration::from_millis(100),
                receipt_timeout: Duration::from_secs(5),
            },
        }
    }

    fn harness_with(stakes: &[u64], settings: AggregatorSettings, start: BlockNumber) -> Harness {
        let ops = TestOperators::new(stakes);
        let chain = Arc::new(SimulatedChain::new(1));
        let layers: Vec<Arc<dyn LivenessVerifier>> =
            vec![Arc::new(MockLivenessVerifier::new("v1", MockOutcome::Pass))];
        let aggregator = Arc::new(Aggregator::new(
            settings,
            ops.registry_cache_from(start),
            AttestationVerifier::new(layers),
            chain.clone(),
            CancellationToken::new(),
        ));
        Harness {
            ops,
            chain,
            aggregator,
        }
    }

    fn harness(stakes: &[u64]) -> Harness {
        harness_with(stakes, settings(), BlockNumber(0))
    }

    fn spawn_loop(aggregator: &Arc<Aggregator>) {
        let aggregator = aggregator.clone();
        tokio::spawn(async move { aggregator.run().await });
    }

    async fn wait_for_confirmations(chain: &SimulatedChain, n: usize) {
        tokio::time::timeout(Duration::from_secs(10), async {
            while chain.confirmations().len() < n {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_quorum_reached_and_submitted() {
        let h = harness(&[50, 50]);
        spawn_loop(&h.aggregator);
        let task = fixtures::task(2, 1, BlockNumber(10));

        let first = h
            .aggregator
            .submit_signed_response(fixtures::signed_response(&h.ops, 0, &task))
            .await
            .unwrap();
        assert_eq!(first.task_index, Some(TaskIndex(0)));
        assert!(!first.skipped);
        assert_eq!(h.aggregator.status().active_tasks, 1);

        let second = h
            .aggregator
            .submit_signed_response(fixtures::signed_response(&h.ops, 1, &task))
            .await
            .unwrap();
        assert_eq!(second.task_index, Some(TaskIndex(0)));

        wait_for_confirmations(&h.chain, 1).await;
        let confirmation = &h.chain.confirmations()[0];
        assert_eq!(confirmation.task_digest, task.digest());
        assert!(confirmation.proof.non_signer_pubkeys.is_empty());
        assert_eq!(h.aggregator.status().active_tasks, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_response_does_not_reopen_task() {
        let h = harness(&[100, 1]);
        spawn_loop(&h.aggregator);
        let task = fixtures::task(2, 1, BlockNumber(10));

        h.aggregator
            .submit_signed_response(fixtures::signed_response(&h.ops, 0, &task))
            .await
            .unwrap();
        wait_for_confirmations(&h.chain, 1).await;

        let late = h
            .aggregator
            .submit_signed_response(fixtures::signed_response(&h.ops, 1, &task))
            .await
            .unwrap();
        assert_eq!(late.task_index, Some(TaskIndex(0)));
        assert_eq!(h.aggregator.status().active_tasks, 0);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(h.chain.confirmations().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_threshold_override_and_expiry() {
        let mut settings = settings();
        settings.threshold = Some(100);
        let h = harness_with(&[50, 50], settings, BlockNumber(0));
        spawn_loop(&h.aggregator);
        let task = fixtures::task(2, 1, BlockNumber(10));

        h.aggregator
            .submit_signed_response(fixtures::signed_response(&h.ops, 0, &task))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert_eq!(h.aggregator.status().active_tasks, 1);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(h.aggregator.status().active_tasks, 0);
        assert!(h.chain.confirmations().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sampled_out_response_skipped() {
        let mut settings = settings();
        settings.sampling = SamplingPolicy::new(10, 10);
        let h = harness_with(&[50, 50], settings, BlockNumber(0));
        let task = fixtures::task(2, 3, BlockNumber(10));

        let outcome = h
            .aggregator
            .submit_signed_response(fixtures::signed_response(&h.ops, 0, &task))
            .await
            .unwrap();
        assert!(outcome.skipped);
        assert_eq!(outcome.task_index, None);
        assert_eq!(outcome.digest, task.digest());
        assert_eq!(h.aggregator.status().active_tasks, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_signature_rejected() {
        let h = harness(&[50, 50]);
        let task = fixtures::task(2, 1, BlockNumber(10));
        let mut response = fixtures::signed_response(&h.ops, 0, &task);
        response.signature = h.ops.sign(1, &task.digest());

        let err = h.aggregator.submit_signed_response(response).await.unwrap_err();
        assert_eq!(
            err,
            SubmitError::Aggregation(AggregationError::SignatureVerification(h.ops.id(0)))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_initialization_unregisters_task() {
        let h = harness_with(&[50, 50], settings(), BlockNumber(100));
        let task = fixtures::task(2, 1, BlockNumber(10));

        let err = h
            .aggregator
            .submit_signed_response(fixtures::signed_response(&h.ops, 0, &task))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            SubmitError::Aggregation(AggregationError::UnknownBlock(BlockNumber(10)))
        );
        assert_eq!(h.aggregator.status().active_tasks, 0);
        assert_eq!(h.aggregator.engine.active_tasks(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mismatched_thresholds_rejected() {
        let h = harness(&[50, 50]);
        let mut task = fixtures::task(2, 1, BlockNumber(10));
        task.quorum_numbers = vec![QuorumNumber(0), QuorumNumber(1)];

        let err = h
            .aggregator
            .submit_signed_response(fixtures::signed_response(&h.ops, 0, &task))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SubmitError::Aggregation(AggregationError::InvalidQuorumThresholds(_))
        ));
        assert_eq!(h.aggregator.status().active_tasks, 0);
    }

    #[tokio::test]
    async fn test_malformed_task_rejected() {
        let h = harness(&[50]);
        let mut task = fixtures::task(2, 1, BlockNumber(10));
        task.quorum_numbers.clear();

        let err = h
            .aggregator
            .submit_signed_response(fixtures::signed_response(&h.ops, 0, &task))
            .await
            .unwrap_err();
        assert_eq!(err, SubmitError::InvalidTask(TaskError::NoQuorums));
    }

    #[tokio::test]
    async fn test_verify_key_and_status() {
        let h = harness(&[50]);
        assert!(h.aggregator.verify_key([1; 32], [2; 32]).await.unwrap());

        let status = h.aggregator.status();
        assert_eq!(status.attestation_layers, vec!["v1".to_string()]);
        assert!(!status.running);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_loop() {
        let h = harness(&[50]);
        let aggregator = h.aggregator.clone();
        let handle = tokio::spawn(async move { aggregator.run().await });
        tokio::task::yield_now().await;

        h.aggregator.shutdown().await;
        handle.await.unwrap();
        assert!(h.aggregator.is_shutting_down());
        assert!(!h.aggregator.status().running);
    }
}
