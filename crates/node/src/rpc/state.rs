//! Shared state for RPC handlers.

use crate::Aggregator;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Shared state for RPC handlers.
#[derive(Clone)]
pub struct RpcState {
    pub aggregator: Arc<Aggregator>,
    /// Set once the node is wired up and dispatching results.
    pub ready: Arc<AtomicBool>,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl RpcState {
    pub fn new(aggregator: Arc<Aggregator>) -> Self {
        Self {
            aggregator,
            ready: Arc::new(AtomicBool::new(false)),
            start_time: Instant::now(),
        }
    }

    pub(crate) fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst) && !self.aggregator.is_shutting_down()
    }
}
