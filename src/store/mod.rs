//! Off-chain metadata store.
//!
//! # Lifecycle of a record
//! ```text
//! upsert_provisional ──▶ Provisional ──attach_transaction──▶ Provisional(tx)
//!                              │                                  │
//!                              └──────────── finalize ────────────┴──▶ Confirmed | Orphaned
//! Orphaned ──upsert_provisional──▶ Provisional (attempt + 1)
//! ```
//!
//! # Design Decisions
//! - Writes are serialized per key
//! - Every attempt-scoped write names its attempt; stale attempts are ignored
//! - Confirmed is absorbing; records are never deleted

pub mod memory;
pub mod record;

use alloy::primitives::{Address, TxHash};
use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemoryStore;
pub use record::{
    CreationPayload, Finalization, OffchainRecord, ProvisionalRecord, RecordStatus, Transition,
    UpsertOutcome,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("no record for {0}")]
    NotFound(Address),

    #[error("record {key} conflicts with the request: {reason}")]
    Conflict { key: Address, reason: String },

    #[error("store I/O error: {0}")]
    Io(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Off-chain store boundary.
#[async_trait]
pub trait OffchainStore: Send + Sync {
    /// Insert a provisional record, or re-arm an orphaned one. Idempotent on
    /// key: a provisional or confirmed record is returned untouched.
    async fn upsert_provisional(&self, draft: ProvisionalRecord) -> StoreResult<UpsertOutcome>;

    /// Record the transaction hash of `attempt`.
    async fn attach_transaction(
        &self,
        key: Address,
        attempt: u32,
        tx_hash: TxHash,
        submitted_at: u64,
    ) -> StoreResult<Transition>;

    /// Move `attempt` out of the provisional state.
    async fn finalize(
        &self,
        key: Address,
        attempt: u32,
        outcome: Finalization,
    ) -> StoreResult<Transition>;

    async fn get(&self, key: Address) -> StoreResult<Option<OffchainRecord>>;

    /// All records, or only those with `status`.
    async fn list(&self, status: Option<RecordStatus>) -> StoreResult<Vec<OffchainRecord>>;

    /// Persist buffered state, if the store buffers anything.
    async fn flush(&self) -> StoreResult<()> {
        Ok(())
    }
}
