//! Aggregator configuration.
//!
//! Loaded from TOML. Every field has a default except the operator table,
//! which is empty unless configured. Example:
//!
//! ```toml
//! listen_addr = "0.0.0.0:8080"
//! simulation = false
//!
//! [aggregation]
//! time_to_expiry_secs = 300
//! min_wait_secs = 10
//! threshold = 67
//!
//! [sampling]
//! sampling = 2000
//! exec_task_sampling = 1000
//!
//! [submission]
//! receipt_poll_interval_secs = 3
//! receipt_timeout_secs = 300
//!
//! [registry]
//! start_block = 0
//! cache_capacity = 1024
//!
//! [[registry.operators]]
//! operator_id = "0x…"
//! public_key = "0x…"
//! stakes = [{ quorum = 0, stake = 100 }]
//!
//! [[attestation_layers]]
//! version = "v1"
//! address = "0x…"
//! rpc_url = "https://…"
//! ```

use quorum_registry::DEFAULT_CACHE_CAPACITY;
use quorum_submission::SubmissionConfig;
use quorum_types::{
    BlockNumber, BlsPublicKey, OperatorId, OperatorInfo, QuorumNumber, Stake, ThresholdPercentage,
};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Sampling divisor used when none is configured.
pub const DEFAULT_SAMPLING: u64 = 2000;

/// Errors from loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level aggregator configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AggregatorConfig {
    /// RPC listen address.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Confirm tasks against an in-memory chain instead of a real one.
    #[serde(default)]
    pub simulation: bool,

    #[serde(default)]
    pub aggregation: AggregationConfig,

    #[serde(default)]
    pub sampling: SamplingConfig,

    #[serde(default)]
    pub submission: SubmissionSettings,

    #[serde(default)]
    pub registry: RegistryConfig,

    /// Attestation layers, consulted in order.
    #[serde(default)]
    pub attestation_layers: Vec<AttestationLayerConfig>,
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

/// Task timing and thresholds.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AggregationConfig {
    #[serde(default = "default_time_to_expiry_secs")]
    pub time_to_expiry_secs: u64,

    #[serde(default)]
    pub min_wait_secs: u64,

    /// Threshold applied to every quorum of every task. When unset, the
    /// thresholds carried by the task are used.
    #[serde(default)]
    pub threshold: Option<ThresholdPercentage>,
}

fn default_time_to_expiry_secs() -> u64 {
    300
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            time_to_expiry_secs: default_time_to_expiry_secs(),
            min_wait_secs: 0,
            threshold: None,
        }
    }
}

impl AggregationConfig {
    pub fn time_to_expiry(&self) -> Duration {
        Duration::from_secs(self.time_to_expiry_secs)
    }

    pub fn min_wait(&self) -> Duration {
        Duration::from_secs(self.min_wait_secs)
    }
}

/// Per-class batch sampling. Zero means "use `sampling`".
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SamplingConfig {
    #[serde(default)]
    pub sampling: u64,

    #[serde(default)]
    pub gen_task_sampling: u64,

    #[serde(default)]
    pub exec_task_sampling: u64,
}

impl SamplingConfig {
    /// Fill unset divisors.
    pub fn init(&mut self) {
        if self.sampling == 0 {
            self.sampling = DEFAULT_SAMPLING;
        }
        if self.gen_task_sampling == 0 {
            self.gen_task_sampling = self.sampling;
        }
        if self.exec_task_sampling == 0 {
            self.exec_task_sampling = self.sampling;
        }
    }
}

/// Receipt polling.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubmissionSettings {
    #[serde(default = "default_receipt_poll_interval_secs")]
    pub receipt_poll_interval_secs: u64,

    #[serde(default = "default_receipt_timeout_secs")]
    pub receipt_timeout_secs: u64,

    /// Receipt queries before a simulated confirmation is included.
    #[serde(default = "default_simulated_receipt_polls")]
    pub simulated_receipt_polls: u32,
}

fn default_receipt_poll_interval_secs() -> u64 {
    3
}

fn default_receipt_timeout_secs() -> u64 {
    300
}

fn default_simulated_receipt_polls() -> u32 {
    2
}

impl Default for SubmissionSettings {
    fn default() -> Self {
        Self {
            receipt_poll_interval_secs: default_receipt_poll_interval_secs(),
            receipt_timeout_secs: default_receipt_timeout_secs(),
            simulated_receipt_polls: default_simulated_receipt_polls(),
        }
    }
}

impl SubmissionSettings {
    pub fn pipeline_config(&self) -> SubmissionConfig {
        SubmissionConfig {
            receipt_poll_interval: Duration::from_secs(self.receipt_poll_interval_secs),
            receipt_timeout: Duration::from_secs(self.receipt_timeout_secs),
        }
    }
}

/// Operator registry source.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegistryConfig {
    /// First block the operator table is valid for.
    #[serde(default)]
    pub start_block: BlockNumber,

    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    #[serde(default)]
    pub operators: Vec<OperatorEntry>,
}

fn default_cache_capacity() -> usize {
    DEFAULT_CACHE_CAPACITY
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            start_block: BlockNumber(0),
            cache_capacity: default_cache_capacity(),
            operators: Vec::new(),
        }
    }
}

/// One operator in the static table.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OperatorEntry {
    pub operator_id: OperatorId,
    pub public_key: BlsPublicKey,
    #[serde(default)]
    pub stakes: Vec<QuorumStake>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QuorumStake {
    pub quorum: QuorumNumber,
    pub stake: Stake,
}

impl OperatorEntry {
    fn to_info(&self, index: u32) -> OperatorInfo {
        OperatorInfo {
            operator_id: self.operator_id,
            public_key: self.public_key,
            stakes: self.stakes.iter().map(|s| (s.quorum, s.stake)).collect(),
            quorum_bitmap_index: index,
            stake_indices: BTreeMap::new(),
        }
    }
}

/// An attestation layer reachable through JSON-RPC.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AttestationLayerConfig {
    pub version: String,
    pub address: String,
    pub rpc_url: String,
}

impl AggregatorConfig {
    /// Load, fill defaults and validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Self = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.init();
        config.validate()?;
        Ok(config)
    }

    /// Fill derived defaults.
    pub fn init(&mut self) {
        self.sampling.init();
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(threshold) = self.aggregation.threshold {
            if threshold > 100 {
                return Err(ConfigError::Invalid(format!(
                    "threshold {threshold} exceeds 100"
                )));
            }
        }
        if self.aggregation.time_to_expiry_secs == 0 {
            return Err(ConfigError::Invalid(
                "time_to_expiry_secs must be positive".to_string(),
            ));
        }
        if self.submission.receipt_poll_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "receipt_poll_interval_secs must be positive".to_string(),
            ));
        }

        let mut seen = BTreeSet::new();
        for operator in &self.registry.operators {
            if !seen.insert(operator.operator_id) {
                return Err(ConfigError::Invalid(format!(
                    "operator {} listed twice",
                    operator.operator_id
                )));
            }
        }

        let mut versions = BTreeSet::new();
        for layer in &self.attestation_layers {
            if !versions.insert(layer.version.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "attestation layer {} listed twice",
                    layer.version
                )));
            }
        }
        Ok(())
    }

    /// The static operator table, in configuration order.
    pub fn operator_infos(&self) -> Vec<OperatorInfo> {
        self.registry
            .operators
            .iter()
            .enumerate()
            .map(|(i, entry)| entry.to_info(i as u32))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quorum_types::BlsKeyPair;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let file = write_config("");
        let config = AggregatorConfig::load(file.path()).unwrap();

        assert_eq!(config.listen_addr, default_listen_addr());
        assert!(!config.simulation);
        assert_eq!(config.aggregation.time_to_expiry(), Duration::from_secs(300));
        assert_eq!(config.aggregation.min_wait(), Duration::ZERO);
        assert_eq!(config.aggregation.threshold, None);
        assert_eq!(config.sampling.gen_task_sampling, DEFAULT_SAMPLING);
        assert_eq!(config.sampling.exec_task_sampling, DEFAULT_SAMPLING);
        assert_eq!(
            config.submission.pipeline_config(),
            SubmissionConfig::default()
        );
        assert!(config.attestation_layers.is_empty());
    }

    #[test]
    fn test_full_config() {
        let key = BlsKeyPair::from_seed(&[7; 32]).unwrap().public_key();
        let id = OperatorId::from_label(b"op-1");
        let file = write_config(&format!(
            r#"
listen_addr = "127.0.0.1:9000"
simulation = true

[aggregation]
time_to_expiry_secs = 60
min_wait_secs = 5
threshold = 67

[sampling]
sampling = 10
exec_task_sampling = 4

[registry]
start_block = 100

[[registry.operators]]
operator_id = "{id}"
public_key = "{key}"
stakes = [{{ quorum = 0, stake = 100 }}, {{ quorum = 1, stake = 5 }}]

[[attestation_layers]]
version = "v1"
address = "0x00000000000000000000000000000000000000aa"
rpc_url = "http://localhost:8545"

[[attestation_layers]]
version = "v2"
address = "0x00000000000000000000000000000000000000bb"
rpc_url = "http://localhost:8546"
"#
        ));
        let config = AggregatorConfig::load(file.path()).unwrap();

        assert_eq!(config.listen_addr.port(), 9000);
        assert!(config.simulation);
        assert_eq!(config.aggregation.threshold, Some(67));
        assert_eq!(config.sampling.gen_task_sampling, 10);
        assert_eq!(config.sampling.exec_task_sampling, 4);
        assert_eq!(config.registry.start_block, BlockNumber(100));

        let infos = config.operator_infos();
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].operator_id, id);
        assert_eq!(infos[0].public_key, key);
        assert_eq!(infos[0].stake_in(QuorumNumber(1)), Some(5));

        let versions: Vec<_> = config
            .attestation_layers
            .iter()
            .map(|l| l.version.as_str())
            .collect();
        assert_eq!(versions, vec!["v1", "v2"]);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let file = write_config("[aggregation]\nthreshold = 101\n");
        assert!(matches!(
            AggregatorConfig::load(file.path()),
            Err(ConfigError::Invalid(_))
        ));

        let file = write_config("unknown_field = 1\n");
        assert!(matches!(
            AggregatorConfig::load(file.path()),
            Err(ConfigError::Parse { .. })
        ));

        let missing = Path::new("/nonexistent/aggregator.toml");
        assert!(matches!(
            AggregatorConfig::load(missing),
            Err(ConfigError::Read { .. })
        ));
    }
}
