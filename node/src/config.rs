//! Node configuration with TOML file support.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use meridian_consensus::ConsensusConfig;
use meridian_mempool::BatchPolicy;
use serde::{Deserialize, Serialize};

use crate::{LogFormat, NodeError};

// TOML integers are 64-bit; amounts widen to u128 when the node is built.

/// A validator seeded into the in-memory registry of a dev run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenesisValidator {
    pub id: String,
    pub stake: u64,
    #[serde(default = "default_participation")]
    pub participation: f64,
}

/// An opening balance credited to the in-memory ledger of a dev run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisAccount {
    pub address: String,
    pub balance: u64,
}

/// Configuration for a Meridian node.
///
/// Can be loaded from a TOML file via [`NodeConfig::from_toml_file`] or
/// built programmatically (e.g. for tests).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Maximum number of pooled transactions.
    #[serde(default = "default_pool_capacity")]
    pub pool_capacity: usize,

    /// Hard cap on transactions per sub-block.
    #[serde(default = "default_max_sub_block_size")]
    pub max_sub_block_size: usize,

    /// `"allow_partial"` or `"require_full"`.
    #[serde(default)]
    pub batch_policy: BatchPolicy,

    /// Sub-block size requested by each pipeline cycle.
    #[serde(default = "default_batch_size")]
    pub default_batch_size: usize,

    /// Reward split among validators per committed sub-block.
    #[serde(default = "default_reward_per_sub_block")]
    pub reward_per_sub_block: u64,

    #[serde(default = "default_true")]
    pub enforce_balances: bool,

    /// JSONL audit file. The audit log stays in memory when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_log_path: Option<PathBuf>,

    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Period of the assemble → commit loop.
    #[serde(default = "default_pipeline_interval_ms")]
    pub pipeline_interval_ms: u64,

    /// Whether to collect Prometheus metrics.
    #[serde(default)]
    pub enable_metrics: bool,

    #[serde(default)]
    pub consensus: ConsensusConfig,

    #[serde(default)]
    pub validators: Vec<GenesisValidator>,

    #[serde(default)]
    pub genesis_accounts: Vec<GenesisAccount>,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_pool_capacity() -> usize {
    meridian_mempool::DEFAULT_POOL_CAPACITY
}

fn default_max_sub_block_size() -> usize {
    256
}

fn default_batch_size() -> usize {
    64
}

fn default_reward_per_sub_block() -> u64 {
    1_000
}

fn default_true() -> bool {
    true
}

fn default_log_format() -> String {
    "human".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_pipeline_interval_ms() -> u64 {
    500
}

fn default_participation() -> f64 {
    1.0
}

// ── Impl ───────────────────────────────────────────────────────────────

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, NodeError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| NodeError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, NodeError> {
        toml::from_str(s).map_err(|e| NodeError::Config(e.to_string()))
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> Result<String, NodeError> {
        toml::to_string_pretty(self).map_err(|e| NodeError::Config(e.to_string()))
    }

    pub fn log_format(&self) -> Result<LogFormat, NodeError> {
        self.log_format.parse()
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), NodeError> {
        let zero = |name: &str| Err(NodeError::Config(format!("{name} must be at least 1")));
        if self.pool_capacity == 0 {
            return zero("pool_capacity");
        }
        if self.max_sub_block_size == 0 {
            return zero("max_sub_block_size");
        }
        if self.default_batch_size == 0 {
            return zero("default_batch_size");
        }
        if self.pipeline_interval_ms == 0 {
            return zero("pipeline_interval_ms");
        }
        self.log_format()?;
        self.consensus
            .validate()
            .map_err(|e| NodeError::Config(format!("[consensus] {e}")))?;

        let mut seen = HashSet::new();
        for v in &self.validators {
            if v.id.trim().is_empty() {
                return Err(NodeError::Config("validator id is empty".into()));
            }
            if !seen.insert(v.id.as_str()) {
                return Err(NodeError::Config(format!("validator {} listed twice", v.id)));
            }
            if !(0.0..=1.0).contains(&v.participation) {
                return Err(NodeError::Config(format!(
                    "validator {} participation {} not in [0, 1]",
                    v.id, v.participation
                )));
            }
        }
        Ok(())
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            pool_capacity: default_pool_capacity(),
            max_sub_block_size: default_max_sub_block_size(),
            batch_policy: BatchPolicy::default(),
            default_batch_size: default_batch_size(),
            reward_per_sub_block: default_reward_per_sub_block(),
            enforce_balances: default_true(),
            audit_log_path: None,
            log_format: default_log_format(),
            log_level: default_log_level(),
            pipeline_interval_ms: default_pipeline_interval_ms(),
            enable_metrics: false,
            consensus: ConsensusConfig::default(),
            validators: Vec::new(),
            genesis_accounts: Vec::new(),
        }
    }
}
