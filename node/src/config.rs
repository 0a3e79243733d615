//! Chain configuration with TOML file support.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use dagchain_types::{NetworkId, NetworkParams};

use crate::logging::LogFormat;
use crate::ChainError;

/// Configuration of the admission engine.
///
/// Can be loaded from a TOML file via [`ChainConfig::from_toml_file`] or
/// built programmatically (e.g. for tests). Consensus parameters are not
/// configurable; [`ChainConfig::params`] selects them by network.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Which network's rules to enforce.
    #[serde(default = "default_network")]
    pub network: NetworkId,

    /// Data directory for ledger storage.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// LMDB map size in bytes.
    #[serde(default = "default_map_size")]
    pub map_size: usize,

    /// Maximum number of blocks held while their parents are missing.
    #[serde(default = "default_max_orphans")]
    pub max_orphans: usize,

    /// Age after which an orphan is dropped.
    #[serde(default = "default_orphan_ttl_secs")]
    pub orphan_ttl_secs: u64,

    /// Minimum spacing between two pruning passes.
    #[serde(default = "default_prune_interval_secs")]
    pub prune_interval_secs: u64,

    /// Capacity of each channel handed out by `subscribe_channel`.
    #[serde(default = "default_notification_queue_capacity")]
    pub notification_queue_capacity: usize,

    /// File holding the hash of an in-flight commit. A leftover file at
    /// startup means the previous run stopped mid-commit.
    #[serde(default)]
    pub shutdown_marker: Option<PathBuf>,

    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Whether to collect Prometheus metrics.
    #[serde(default)]
    pub enable_metrics: bool,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_network() -> NetworkId {
    NetworkId::Regtest
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./dagchain_data")
}

fn default_map_size() -> usize {
    1 << 30
}

fn default_max_orphans() -> usize {
    500
}

fn default_orphan_ttl_secs() -> u64 {
    60 * 60
}

fn default_prune_interval_secs() -> u64 {
    5 * 60
}

fn default_notification_queue_capacity() -> usize {
    1024
}

fn default_log_format() -> String {
    "human".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

// ── Impl ───────────────────────────────────────────────────────────────

impl ChainConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: &str) -> Result<Self, ChainError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ChainError::Config(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, ChainError> {
        let config: Self = toml::from_str(s).map_err(|e| ChainError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> Result<String, ChainError> {
        toml::to_string_pretty(self).map_err(|e| ChainError::Config(e.to_string()))
    }

    pub fn params(&self) -> NetworkParams {
        NetworkParams::for_network(self.network)
    }

    pub fn log_format(&self) -> Result<LogFormat, ChainError> {
        self.log_format.parse()
    }

    /// Install the global subscriber with the configured format and level.
    pub fn init_logging(&self) -> Result<(), ChainError> {
        crate::logging::init_logging(self.log_format()?, &self.log_level)
    }

    fn validate(&self) -> Result<(), ChainError> {
        if self.max_orphans == 0 {
            return Err(ChainError::Config("max_orphans must be positive".into()));
        }
        if self.notification_queue_capacity == 0 {
            return Err(ChainError::Config(
                "notification_queue_capacity must be positive".into(),
            ));
        }
        self.log_format()?;
        Ok(())
    }
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            network: default_network(),
            data_dir: default_data_dir(),
            map_size: default_map_size(),
            max_orphans: default_max_orphans(),
            orphan_ttl_secs: default_orphan_ttl_secs(),
            prune_interval_secs: default_prune_interval_secs(),
            notification_queue_capacity: default_notification_queue_capacity(),
            shutdown_marker: None,
            log_format: default_log_format(),
            log_level: default_log_level(),
            enable_metrics: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_toml() {
        let config = ChainConfig::default();
        let toml_str = config.to_toml_string().expect("should serialize");
        let parsed = ChainConfig::from_toml_str(&toml_str).expect("should parse");
        assert_eq!(parsed.max_orphans, config.max_orphans);
        assert_eq!(parsed.network, config.network);
    }

    #[test]
    fn minimal_toml_uses_defaults() {
        let config = ChainConfig::from_toml_str("").expect("empty toml should use defaults");
        assert_eq!(config.network, NetworkId::Regtest);
        assert_eq!(config.max_orphans, 500);
        assert_eq!(config.log_format, "human");
        assert!(config.shutdown_marker.is_none());
    }

    #[test]
    fn partial_toml_overrides() {
        let toml = r#"
            network = "testnet"
            max_orphans = 16
            shutdown_marker = "/tmp/dagchain.commit"
        "#;
        let config = ChainConfig::from_toml_str(toml).expect("should parse");
        assert_eq!(config.network, NetworkId::Testnet);
        assert_eq!(config.max_orphans, 16);
        assert_eq!(config.shutdown_marker, Some(PathBuf::from("/tmp/dagchain.commit")));
        assert_eq!(config.params().network, NetworkId::Testnet);
    }

    #[test]
    fn zero_orphan_capacity_is_rejected() {
        let err = ChainConfig::from_toml_str("max_orphans = 0").unwrap_err();
        assert!(matches!(err, ChainError::Config(_)));
    }

    #[test]
    fn unknown_log_format_is_rejected() {
        let err = ChainConfig::from_toml_str(r#"log_format = "xml""#).unwrap_err();
        assert!(matches!(err, ChainError::Config(_)));
    }

    #[test]
    fn missing_file_returns_config_error() {
        let result = ChainConfig::from_toml_file("/nonexistent/dagchain.toml");
        assert!(matches!(result, Err(ChainError::Config(_))));
    }
}
