//! Off-chain record model.

use alloy::primitives::{Address, TxHash};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::operation::{CanonicalParams, OperationFingerprint};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    /// Written before the ledger has confirmed anything.
    Provisional,
    Confirmed,
    /// The on-chain step did not succeed. Kept for audit and re-arming.
    Orphaned,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Provisional => "provisional",
            RecordStatus::Confirmed => "confirmed",
            RecordStatus::Orphaned => "orphaned",
        }
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the record describes: the inputs of the creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreationPayload {
    pub factory: Address,
    pub sender: Address,
    pub params: CanonicalParams,
}

/// Metadata about a resource, keyed by its predicted address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffchainRecord {
    pub key: Address,
    pub status: RecordStatus,
    pub payload: CreationPayload,
    pub fingerprint: OperationFingerprint,
    /// Incremented each time the record is re-armed.
    pub attempt: u32,
    pub attempt_id: Uuid,
    /// Hash of the current attempt's transaction, once submitted.
    pub tx_hash: Option<TxHash>,
    /// Unix seconds at which `tx_hash` was submitted.
    pub submitted_at: Option<u64>,
    pub failure_reason: Option<String>,
    pub created_at: u64,
    pub updated_at: u64,
}

/// Input to [`OffchainStore::upsert_provisional`].
///
/// [`OffchainStore::upsert_provisional`]: crate::store::OffchainStore::upsert_provisional
#[derive(Debug, Clone)]
pub struct ProvisionalRecord {
    pub key: Address,
    pub payload: CreationPayload,
    pub fingerprint: OperationFingerprint,
}

/// Result of an upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// First write for this key.
    Created(OffchainRecord),
    /// An orphaned record was turned back into a provisional one.
    Rearmed(OffchainRecord),
    /// Another attempt holds the key; nothing was written.
    InProgress(OffchainRecord),
    /// The resource already exists; nothing was written.
    AlreadyConfirmed(OffchainRecord),
}

/// Terminal outcome of an attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Finalization {
    Confirmed,
    Orphaned { reason: String },
}

impl Finalization {
    pub fn status(&self) -> RecordStatus {
        match self {
            Finalization::Confirmed => RecordStatus::Confirmed,
            Finalization::Orphaned { .. } => RecordStatus::Orphaned,
        }
    }
}

/// Result of a write scoped to one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Applied(OffchainRecord),
    /// The record already left the provisional state.
    Unchanged(OffchainRecord),
    /// A newer attempt owns the record; the write was ignored.
    Superseded(OffchainRecord),
}

impl Transition {
    pub fn record(&self) -> &OffchainRecord {
        match self {
            Transition::Applied(r) | Transition::Unchanged(r) | Transition::Superseded(r) => r,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, Transition::Applied(_))
    }
}
