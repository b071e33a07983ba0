//! Ledger and secondary-index boundaries.
//!
//! # Data Flow
//! ```text
//! submitter  ── submit(operation) ──▶ LedgerGateway ──▶ TxHash
//! tracker    ── receipt(hash) ──────▶ LedgerGateway ──▶ none | success | reverted
//! tracker    ── is_indexed(hash) ───▶ SecondaryIndex ─▶ bool
//! ```
//!
//! Implementations:
//! - `blockchain::RpcLedger` (alloy JSON-RPC) and `http_index::HttpIndex` (reqwest)
//! - `simulated` in-memory doubles for tests and the `simulate` CLI command

pub mod http_index;
pub mod simulated;

use alloy::primitives::TxHash;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::operation::Operation;
use crate::resilience::Retryable;

pub use http_index::HttpIndex;
pub use simulated::{SimulatedIndex, SimulatedLedger};

/// What the ledger says about a mined transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReceiptOutcome {
    Success { block_number: u64 },
    Reverted { reason: String },
}

/// Errors at the ledger boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// The node refused the transaction (permissions, validation, revert on
    /// estimation). Repeating it unchanged will fail again.
    #[error("node rejected transaction: {0}")]
    Rejected(String),

    /// Transport failure or timeout.
    #[error("node unavailable: {0}")]
    Unavailable(String),

    /// The broadcast may have reached the node before the connection gave
    /// out. Whether a transaction exists is unknown.
    #[error("broadcast outcome unknown: {0}")]
    Ambiguous(String),
}

impl Retryable for LedgerError {
    fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::Unavailable(_))
    }
}

/// Errors at the secondary index boundary. Always transient for the tracker.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IndexError {
    #[error("index unavailable: {0}")]
    Unavailable(String),

    #[error("unexpected index response: {0}")]
    BadResponse(String),
}

/// Ledger submission and receipt boundary.
#[async_trait]
pub trait LedgerGateway: Send + Sync {
    /// Hand the operation to the node. Exactly one submission per call.
    async fn submit(&self, operation: &Operation) -> Result<TxHash, LedgerError>;

    /// `None` while the transaction has not been mined.
    async fn receipt(&self, hash: TxHash) -> Result<Option<ReceiptOutcome>, LedgerError>;
}

/// Read-optimized index that lags the ledger.
#[async_trait]
pub trait SecondaryIndex: Send + Sync {
    async fn is_indexed(&self, hash: TxHash) -> Result<bool, IndexError>;
}
