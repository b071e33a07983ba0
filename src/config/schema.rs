//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the core.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Root configuration for the orchestration core.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Ledger node connection settings.
    pub blockchain: BlockchainConfig,

    /// Secondary index (read-after-write) settings.
    pub index: IndexConfig,

    /// Secondary-factor verification settings.
    pub verification: VerificationConfig,

    /// Address prediction settings.
    pub prediction: PredictionConfig,

    /// Submission retry settings.
    pub submission: SubmissionConfig,

    /// Transaction tracking settings.
    pub tracker: TrackerConfig,

    /// Background reconciliation of stale records.
    pub reconciler: ReconcilerConfig,

    /// Off-chain record store settings.
    pub store: StoreConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Blockchain integration configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BlockchainConfig {
    /// JSON-RPC endpoint URL.
    pub rpc_url: String,

    /// Failover JSON-RPC endpoint URLs.
    pub failover_urls: Vec<String>,

    /// Chain ID (e.g., 1 for Ethereum mainnet, 31337 for local Anvil).
    pub chain_id: u64,

    /// RPC request timeout in seconds.
    pub rpc_timeout_secs: u64,
}

impl Default for BlockchainConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://localhost:8545".to_string(),
            failover_urls: Vec::new(),
            chain_id: 31337,
            rpc_timeout_secs: 10,
        }
    }
}

/// Secondary index configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Base URL of the indexer HTTP API.
    pub base_url: String,

    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:42069".to_string(),
            timeout_secs: 5,
        }
    }
}

/// Secondary-factor verification configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct VerificationConfig {
    /// Required number of digits in a PIN.
    pub pin_length: usize,

    /// TOTP time step in seconds.
    pub totp_step_secs: u64,

    /// Number of digits in a TOTP code.
    pub totp_digits: u32,

    /// Accepted clock drift, in steps, on either side of the current step.
    pub totp_skew_steps: u64,

    /// Lifetime of an issued challenge response in seconds.
    pub challenge_ttl_secs: u64,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            pin_length: 6,
            totp_step_secs: 30,
            totp_digits: 6,
            totp_skew_steps: 1,
            challenge_ttl_secs: 300,
        }
    }
}

/// Address prediction configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PredictionConfig {
    /// Deadline for a prediction that needs a node round trip, in seconds.
    pub timeout_secs: u64,

    /// Attempts made by the orchestrator when prediction is unavailable.
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,

    /// Keccak-256 of the factory's child init code, hex encoded.
    /// When set, addresses are derived locally via CREATE2 instead of
    /// asking the factory contract.
    pub init_code_hash: Option<String>,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            max_attempts: 3,
            base_delay_ms: 200,
            max_delay_ms: 2000,
            init_code_hash: None,
        }
    }
}

/// Submission retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SubmissionConfig {
    /// Attempts made while the node is unavailable.
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay_ms: 250,
            max_delay_ms: 4000,
        }
    }
}

/// Transaction tracking configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Budget from submission to a terminal state, in seconds.
    pub timeout_secs: u64,

    /// Interval between receipt/index polls in milliseconds.
    pub poll_interval_ms: u64,

    /// Per operation kind budget overrides (`create`, `freeze`, `grant_role`).
    pub timeout_overrides: HashMap<String, u64>,

    /// Capacity of the per-hash event broadcast buffer.
    pub event_buffer: usize,

    /// How long a settled hash keeps its history for late subscribers, in
    /// seconds.
    pub terminal_retention_secs: u64,
}

impl TrackerConfig {
    /// Tracking budget for an operation kind.
    pub fn budget_for(&self, kind: &str) -> Duration {
        let secs = self
            .timeout_overrides
            .get(kind)
            .copied()
            .unwrap_or(self.timeout_secs);
        Duration::from_secs(secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn terminal_retention(&self) -> Duration {
        Duration::from_secs(self.terminal_retention_secs)
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 180,
            poll_interval_ms: 2000,
            timeout_overrides: HashMap::new(),
            event_buffer: 16,
            terminal_retention_secs: 300,
        }
    }
}

/// Reconciler configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    /// Enable the background sweep.
    pub enabled: bool,

    /// Sweep interval in seconds.
    pub interval_secs: u64,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 60,
        }
    }
}

/// Off-chain store configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct StoreConfig {
    /// JSON file the in-memory store is loaded from and saved to.
    pub persistence_path: Option<String>,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
