//! Snapshot cache keyed by (block, quorum set).

use crate::{OperatorStateReader, RegistryError};
use quick_cache::sync::Cache as QuickCache;
use quorum_types::{BlockNumber, OperatorStateSnapshot, QuorumNumber};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Default number of snapshots kept.
pub const DEFAULT_CACHE_CAPACITY: usize = 1024;

type SnapshotKey = (BlockNumber, Vec<QuorumNumber>);

/// Memoizing front for an [`OperatorStateReader`].
///
/// Historical operator state never changes, so entries are never invalidated,
/// only evicted when the cache is full. Concurrent first requests for the same
/// key share one read; failed reads are not cached.
pub struct OperatorRegistryCache {
    reader: Arc<dyn OperatorStateReader>,
    cache: QuickCache<SnapshotKey, Arc<OperatorStateSnapshot>>,
}

impl OperatorRegistryCache {
    pub fn new(reader: Arc<dyn OperatorStateReader>, capacity: usize) -> Self {
        Self {
            reader,
            cache: QuickCache::new(capacity.max(1)),
        }
    }

    /// Snapshot of `quorum_numbers` at `block`, from cache or the reader.
    ///
    /// Quorum order does not matter: `[1, 0]` and `[0, 1]` share an entry.
    pub async fn get_state_at_block(
        &self,
        quorum_numbers: &[QuorumNumber],
        block: BlockNumber,
    ) -> Result<Arc<OperatorStateSnapshot>, RegistryError> {
        let mut quorums = quorum_numbers.to_vec();
        quorums.sort();
        quorums.dedup();
        let key = (block, quorums);

        if let Some(snapshot) = self.cache.get(&key) {
            quorum_metrics::record_snapshot_cache_hit();
            return Ok(snapshot);
        }

        self.cache
            .get_or_insert_async(&key, async {
                let start = Instant::now();
                match self.reader.operator_state_at(block, &key.1).await {
                    Ok(snapshot) => {
                        quorum_metrics::record_snapshot_loaded(start.elapsed().as_secs_f64());
                        debug!(
                            %block,
                            quorums = ?key.1,
                            operators = snapshot.operator_count(),
                            "Loaded operator state"
                        );
                        Ok(Arc::new(snapshot))
                    }
                    Err(e) => {
                        quorum_metrics::record_snapshot_load_failure();
                        warn!(%block, error = %e, "Failed to load operator state");
                        Err(e)
                    }
                }
            })
            .await
    }

    /// Number of cached snapshots.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use quorum_types::{BlsKeyPair, OperatorId, OperatorInfo};
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Reader that counts calls and can fail its first `fail_first` calls.
    struct CountingReader {
        calls: AtomicUsize,
        fail_first: usize,
    }

    impl CountingReader {
        fn new(fail_first: usize) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail_first,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl OperatorStateReader for CountingReader {
        async fn operator_state_at(
            &self,
            block: BlockNumber,
            quorum_numbers: &[QuorumNumber],
        ) -> Result<OperatorStateSnapshot, RegistryError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            if call < self.fail_first {
                return Err(RegistryError::Read("rpc unavailable".into()));
            }
            let kp = BlsKeyPair::from_seed(&[1; 32]).unwrap();
            let operator = OperatorInfo {
                operator_id: OperatorId::from_label(b"op"),
                public_key: kp.public_key(),
                stakes: quorum_numbers.iter().map(|&q| (q, 100)).collect(),
                quorum_bitmap_index: 0,
                stake_indices: BTreeMap::new(),
            };
            Ok(OperatorStateSnapshot::new(block, quorum_numbers, vec![operator], &BTreeMap::new())?)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_first_access_reads_once() {
        let reader = CountingReader::new(0);
        let cache = Arc::new(OperatorRegistryCache::new(reader.clone(), 16));

        let lookups = (0..8).map(|_| {
            let cache = cache.clone();
            async move {
                cache
                    .get_state_at_block(&[QuorumNumber(0)], BlockNumber(10))
                    .await
            }
        });
        let results = futures::future::join_all(lookups).await;

        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(reader.calls(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_quorum_order_shares_entry() {
        let reader = CountingReader::new(0);
        let cache = OperatorRegistryCache::new(reader.clone(), 16);

        let a = cache
            .get_state_at_block(&[QuorumNumber(1), QuorumNumber(0)], BlockNumber(10))
            .await
            .unwrap();
        let b = cache
            .get_state_at_block(&[QuorumNumber(0), QuorumNumber(1)], BlockNumber(10))
            .await
            .unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(reader.calls(), 1);

        cache
            .get_state_at_block(&[QuorumNumber(0)], BlockNumber(11))
            .await
            .unwrap();
        assert_eq!(reader.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_are_not_cached() {
        let reader = CountingReader::new(1);
        let cache = OperatorRegistryCache::new(reader.clone(), 16);

        let err = cache
            .get_state_at_block(&[QuorumNumber(0)], BlockNumber(10))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::Read(_)));
        assert!(cache.is_empty());

        let snapshot = cache
            .get_state_at_block(&[QuorumNumber(0)], BlockNumber(10))
            .await
            .unwrap();
        assert_eq!(snapshot.operator_count(), 1);
        assert_eq!(reader.calls(), 2);
    }
}
