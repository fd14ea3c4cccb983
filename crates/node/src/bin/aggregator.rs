//! Quorum aggregator node.
//!
//! # Usage
//!
//! ```bash
//! # Start with configuration file
//! quorum-aggregator --config aggregator.toml
//!
//! # Override the RPC address and confirm against the in-memory chain
//! quorum-aggregator --config aggregator.toml --listen-addr 127.0.0.1:9000 --simulation
//! ```
//!
//! See `AggregatorConfig` for the configuration file format.

use anyhow::{bail, Context, Result};
use clap::Parser;
use quorum_attestation::{AttestationVerifier, JsonRpcLivenessVerifier, LivenessVerifier};
use quorum_node::rpc::{RpcServer, RpcServerConfig};
use quorum_node::{Aggregator, AggregatorConfig, AggregatorSettings};
use quorum_registry::{OperatorRegistryCache, StaticOperatorRegistry};
use quorum_submission::{ChainWriter, SimulatedChain};
use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Quorum Aggregator
///
/// Collects operator BLS signatures over tasks and submits the aggregate
/// once every quorum reaches its stake threshold.
#[derive(Parser, Debug)]
#[command(name = "quorum-aggregator")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (TOML)
    #[arg(short, long)]
    config: PathBuf,

    /// RPC listen address (overrides config)
    #[arg(long)]
    listen_addr: Option<SocketAddr>,

    /// Log level filter (overrides RUST_LOG)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Path to log file (redirects all logs to this file)
    #[arg(long)]
    logfile: Option<PathBuf>,

    /// Confirm tasks against an in-memory chain
    #[arg(long)]
    simulation: bool,
}

/// Apply CLI overrides to the configuration.
fn apply_overrides(config: &mut AggregatorConfig, cli: &Cli) {
    if let Some(listen_addr) = cli.listen_addr {
        config.listen_addr = listen_addr;
    }

    if cli.simulation {
        config.simulation = true;
    }
}

/// Initialize the fmt subscriber, writing to `logfile` when given.
fn init_logging(cli: &Cli) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let builder = tracing_subscriber::fmt();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let Some(log_file) = &cli.logfile else {
        builder.with_env_filter(filter).init();
        return Ok(None);
    };

    if let Some(parent) = log_file.parent() {
        fs::create_dir_all(parent)?;
    }
    let file_name = log_file
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("Invalid log file name"))?
        .to_string_lossy()
        .to_string();
    let directory = log_file
        .parent()
        .unwrap_or(std::path::Path::new("."))
        .to_path_buf();

    let file_appender = tracing_appender::rolling::never(directory, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    builder
        .with_writer(non_blocking)
        .with_ansi(false) // Disable ANSI colors in file logs
        .with_target(true)
        .with_thread_ids(true)
        .with_env_filter(filter)
        .init();
    Ok(Some(guard))
}

fn attestation_layers(config: &AggregatorConfig) -> Result<AttestationVerifier> {
    let mut layers: Vec<Arc<dyn LivenessVerifier>> = Vec::new();
    for layer in &config.attestation_layers {
        let verifier = JsonRpcLivenessVerifier::new(&layer.version, &layer.address, &layer.rpc_url)
            .with_context(|| format!("Invalid attestation layer {}", layer.version))?;
        info!(
            version = %layer.version,
            address = verifier.address(),
            rpc_url = %layer.rpc_url,
            "Attestation layer configured"
        );
        layers.push(Arc::new(verifier));
    }
    if layers.is_empty() {
        warn!("No attestation layers configured, every key check will fail");
    }
    Ok(AttestationVerifier::new(layers))
}

fn chain_writer(config: &AggregatorConfig) -> Result<Arc<dyn ChainWriter>> {
    if !config.simulation {
        bail!(
            "No chain writer available: this build only confirms tasks in simulation mode \
             (set `simulation = true` or pass --simulation)"
        );
    }
    info!(
        polls_until_receipt = config.submission.simulated_receipt_polls,
        "Using simulated chain"
    );
    Ok(Arc::new(SimulatedChain::new(
        config.submission.simulated_receipt_polls,
    )))
}

/// Resolve when the process receives Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AggregatorConfig::load(&cli.config)
        .with_context(|| format!("Failed to load config: {}", cli.config.display()))?;
    apply_overrides(&mut config, &cli);
    config.validate().context("Invalid configuration after CLI overrides")?;

    let _log_guard = init_logging(&cli)?;
    info!("Quorum aggregator starting...");

    quorum_metrics_prometheus::install().context("Failed to install Prometheus metrics")?;

    let operators = config.operator_infos();
    info!(
        operators = operators.len(),
        start_block = %config.registry.start_block,
        cache_capacity = config.registry.cache_capacity,
        "Operator registry loaded"
    );
    let registry = Arc::new(OperatorRegistryCache::new(
        Arc::new(StaticOperatorRegistry::new(
            config.registry.start_block,
            operators,
        )),
        config.registry.cache_capacity,
    ));

    let attestation = attestation_layers(&config)?;
    let chain = chain_writer(&config)?;
    let settings = AggregatorSettings::from_config(&config);
    info!(
        time_to_expiry_secs = config.aggregation.time_to_expiry_secs,
        min_wait_secs = config.aggregation.min_wait_secs,
        threshold = ?config.aggregation.threshold,
        gen_task_sampling = config.sampling.gen_task_sampling,
        exec_task_sampling = config.sampling.exec_task_sampling,
        "Aggregation settings"
    );

    let shutdown = CancellationToken::new();
    let aggregator = Arc::new(Aggregator::new(
        settings,
        registry,
        attestation,
        chain,
        shutdown.clone(),
    ));

    let rpc_handle = RpcServer::new(
        RpcServerConfig {
            listen_addr: config.listen_addr,
        },
        aggregator.clone(),
    )
    .start(shutdown.clone())
    .await
    .context("Failed to start RPC server")?;

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Initiating graceful shutdown...");
        signal_token.cancel();
    });

    rpc_handle.set_ready(true);
    info!(addr = %rpc_handle.local_addr(), "Aggregator started, press Ctrl+C to stop");

    aggregator.run().await;

    rpc_handle.set_ready(false);
    aggregator.shutdown().await;
    if let Err(e) = rpc_handle.join().await {
        warn!(error = %e, "RPC server task failed");
    }

    info!("Aggregator shutdown complete");
    Ok(())
}
