//! RPC server implementation.

use super::routes::create_router;
use super::state::RpcState;
use crate::Aggregator;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Errors from the RPC server.
#[derive(Debug, Error)]
pub enum RpcServerError {
    #[error("Failed to bind to address: {0}")]
    BindError(#[from] std::io::Error),
}

/// Configuration for the RPC server.
#[derive(Debug, Clone)]
pub struct RpcServerConfig {
    /// Address to listen on.
    pub listen_addr: SocketAddr,
}

impl Default for RpcServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
        }
    }
}

/// Handle for controlling a running RPC server.
pub struct RpcServerHandle {
    task: JoinHandle<()>,
    ready_flag: Arc<AtomicBool>,
    local_addr: SocketAddr,
}

impl RpcServerHandle {
    /// Mark the node as ready (for readiness probe).
    pub fn set_ready(&self, ready: bool) {
        self.ready_flag.store(ready, Ordering::SeqCst);
    }

    /// The bound address. Differs from the configured one for port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Abort the server.
    pub fn abort(&self) {
        self.task.abort();
    }

    /// Wait for the server to finish.
    pub async fn join(self) -> Result<(), tokio::task::JoinError> {
        self.task.await
    }
}

/// RPC server for the aggregator.
pub struct RpcServer {
    config: RpcServerConfig,
    state: RpcState,
}

impl RpcServer {
    pub fn new(config: RpcServerConfig, aggregator: Arc<Aggregator>) -> Self {
        Self {
            config,
            state: RpcState::new(aggregator),
        }
    }

    /// Bind and serve in the background until `shutdown` is cancelled.
    ///
    /// In-flight requests are drained before the server task ends.
    pub async fn start(self, shutdown: CancellationToken) -> Result<RpcServerHandle, RpcServerError> {
        let ready_flag = self.state.ready.clone();
        let router = create_router(self.state);

        let listener = tokio::net::TcpListener::bind(self.config.listen_addr).await?;
        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, "RPC server listening");

        let task = tokio::spawn(async move {
            let served = axum::serve(listener, router)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await;
            if let Err(e) = served {
                error!(error = ?e, "RPC server error");
            }
            info!("RPC server stopped");
        });

        Ok(RpcServerHandle {
            task,
            ready_flag,
            local_addr,
        })
    }
}
