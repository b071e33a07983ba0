//! Tracking status model.

use alloy::primitives::TxHash;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Position of a transaction in its lifecycle.
///
/// ```text
/// PendingMining ──▶ PendingIndexing ──▶ Confirmed
///       │                  │
///       ├──────────────────┴──▶ Failed
///       └──────────────────┴──▶ TimedOut
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    /// Accepted by the node, no receipt yet.
    PendingMining,
    /// Mined; waiting for the secondary index to catch up.
    PendingIndexing,
    Confirmed,
    Failed,
    /// The tracking budget ran out. Says nothing about the transaction.
    TimedOut,
}

impl TxStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, TxStatus::PendingMining | TxStatus::PendingIndexing)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_pending()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TxStatus::PendingMining => "pending_mining",
            TxStatus::PendingIndexing => "pending_indexing",
            TxStatus::Confirmed => "confirmed",
            TxStatus::Failed => "failed",
            TxStatus::TimedOut => "timed_out",
        }
    }

    /// Text suitable for showing to the user.
    pub fn user_message(&self) -> &'static str {
        match self {
            TxStatus::PendingMining => "Transaction submitted, waiting to be included in a block",
            TxStatus::PendingIndexing => "Transaction confirmed on-chain, updating records",
            TxStatus::Confirmed => "Transaction confirmed",
            TxStatus::Failed => "Transaction failed",
            TxStatus::TimedOut => {
                "Stopped tracking the transaction; it may still complete. Check again later"
            }
        }
    }
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a transaction's status stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub hash: TxHash,
    pub status: TxStatus,
    /// Unix milliseconds.
    pub timestamp: u64,
    pub failure_reason: Option<String>,
}

impl StatusEvent {
    pub(crate) fn now(hash: TxHash, status: TxStatus, failure_reason: Option<String>) -> Self {
        Self {
            hash,
            status,
            timestamp: unix_millis(),
            failure_reason,
        }
    }

    pub fn message(&self) -> &'static str {
        self.status.user_message()
    }
}

/// Point-in-time view of a tracked transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedTransaction {
    pub hash: TxHash,
    /// Unix seconds.
    pub submitted_at: u64,
    pub status: TxStatus,
    pub last_event: Option<StatusEvent>,
    pub failure_reason: Option<String>,
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
