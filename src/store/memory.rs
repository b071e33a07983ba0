//! In-memory store with JSON file persistence.

use alloy::primitives::{Address, TxHash};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

use crate::observability::metrics;
use crate::store::record::{
    Finalization, OffchainRecord, ProvisionalRecord, RecordStatus, Transition, UpsertOutcome,
};
use crate::store::{OffchainStore, StoreError, StoreResult};
use crate::verification::challenge::unix_now;

/// DashMap-backed store. Entry locks serialize writes per key.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<DashMap<Address, OffchainRecord>>,
    persistence_path: Option<String>,
}

impl MemoryStore {
    pub fn new(persistence_path: Option<String>) -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            persistence_path,
        }
    }

    /// Load from file if it exists; later saves go to the same file.
    pub fn load_from_file(path: &str) -> StoreResult<Self> {
        let store = Self::new(Some(path.to_string()));
        if Path::new(path).exists() {
            let file = File::open(path).map_err(|e| StoreError::Io(e.to_string()))?;
            let records: Vec<OffchainRecord> = serde_json::from_reader(BufReader::new(file))
                .map_err(|e| StoreError::Io(e.to_string()))?;
            for record in records {
                store.inner.insert(record.key, record);
            }
            tracing::info!(records = store.inner.len(), path, "Loaded off-chain records");
        }
        Ok(store)
    }

    /// Write every record to the persistence file, if one is configured.
    pub fn save_to_file(&self) -> StoreResult<()> {
        let Some(path) = &self.persistence_path else {
            return Ok(());
        };
        let mut records: Vec<OffchainRecord> =
            self.inner.iter().map(|r| r.value().clone()).collect();
        records.sort_by_key(|r| (r.created_at, r.key));

        let file = File::create(path).map_err(|e| StoreError::Io(e.to_string()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &records)
            .map_err(|e| StoreError::Io(e.to_string()))?;
        tracing::debug!(records = records.len(), path = %path, "Saved off-chain records");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Apply `f` to the record of `attempt` if it is still provisional.
    fn with_attempt(
        &self,
        key: Address,
        attempt: u32,
        f: impl FnOnce(&mut OffchainRecord),
    ) -> StoreResult<Transition> {
        let mut record = self.inner.get_mut(&key).ok_or(StoreError::NotFound(key))?;
        if record.attempt != attempt {
            return Ok(Transition::Superseded(record.clone()));
        }
        if record.status != RecordStatus::Provisional {
            return Ok(Transition::Unchanged(record.clone()));
        }
        f(&mut record);
        record.updated_at = unix_now();
        Ok(Transition::Applied(record.clone()))
    }
}

#[async_trait]
impl OffchainStore for MemoryStore {
    async fn upsert_provisional(&self, draft: ProvisionalRecord) -> StoreResult<UpsertOutcome> {
        let now = unix_now();
        let outcome = match self.inner.entry(draft.key) {
            Entry::Vacant(slot) => {
                let record = OffchainRecord {
                    key: draft.key,
                    status: RecordStatus::Provisional,
                    payload: draft.payload,
                    fingerprint: draft.fingerprint,
                    attempt: 1,
                    attempt_id: Uuid::new_v4(),
                    tx_hash: None,
                    submitted_at: None,
                    failure_reason: None,
                    created_at: now,
                    updated_at: now,
                };
                slot.insert(record.clone());
                UpsertOutcome::Created(record)
            }
            Entry::Occupied(mut slot) => {
                let record = slot.get_mut();
                if record.fingerprint != draft.fingerprint {
                    return Err(StoreError::Conflict {
                        key: draft.key,
                        reason: format!(
                            "stored fingerprint {} differs from {}",
                            record.fingerprint, draft.fingerprint
                        ),
                    });
                }
                match record.status {
                    RecordStatus::Provisional => UpsertOutcome::InProgress(record.clone()),
                    RecordStatus::Confirmed => UpsertOutcome::AlreadyConfirmed(record.clone()),
                    RecordStatus::Orphaned => {
                        record.status = RecordStatus::Provisional;
                        record.attempt += 1;
                        record.attempt_id = Uuid::new_v4();
                        record.tx_hash = None;
                        record.submitted_at = None;
                        record.failure_reason = None;
                        record.updated_at = now;
                        UpsertOutcome::Rearmed(record.clone())
                    }
                }
            }
        };

        if let UpsertOutcome::Created(r) | UpsertOutcome::Rearmed(r) = &outcome {
            metrics::record_record_transition(RecordStatus::Provisional.as_str());
            tracing::info!(key = %r.key, attempt = r.attempt, "Provisional record written");
        }
        Ok(outcome)
    }

    async fn attach_transaction(
        &self,
        key: Address,
        attempt: u32,
        tx_hash: TxHash,
        submitted_at: u64,
    ) -> StoreResult<Transition> {
        self.with_attempt(key, attempt, |record| {
            record.tx_hash = Some(tx_hash);
            record.submitted_at = Some(submitted_at);
        })
    }

    async fn finalize(
        &self,
        key: Address,
        attempt: u32,
        outcome: Finalization,
    ) -> StoreResult<Transition> {
        let status = outcome.status();
        let transition = self.with_attempt(key, attempt, |record| {
            record.status = status;
            if let Finalization::Orphaned { reason } = outcome {
                record.failure_reason = Some(reason);
            }
        })?;

        match &transition {
            Transition::Applied(record) => {
                metrics::record_record_transition(status.as_str());
                tracing::info!(
                    key = %key,
                    attempt,
                    status = %record.status,
                    reason = record.failure_reason.as_deref().unwrap_or(""),
                    "Record finalized"
                );
            }
            Transition::Superseded(record) => {
                tracing::debug!(
                    key = %key,
                    attempt,
                    current_attempt = record.attempt,
                    "Ignoring update from superseded attempt"
                );
            }
            Transition::Unchanged(_) => {}
        }
        Ok(transition)
    }

    async fn get(&self, key: Address) -> StoreResult<Option<OffchainRecord>> {
        Ok(self.inner.get(&key).map(|r| r.value().clone()))
    }

    async fn list(&self, status: Option<RecordStatus>) -> StoreResult<Vec<OffchainRecord>> {
        Ok(self
            .inner
            .iter()
            .filter(|r| status.map_or(true, |s| r.status == s))
            .map(|r| r.value().clone())
            .collect())
    }

    async fn flush(&self) -> StoreResult<()> {
        self.save_to_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{CreationParams, OperationFingerprint};
    use crate::store::CreationPayload;
    use alloy::primitives::B256;

    fn draft(byte: u8) -> ProvisionalRecord {
        ProvisionalRecord {
            key: Address::repeat_byte(byte),
            payload: CreationPayload {
                factory: Address::repeat_byte(0xfa),
                sender: Address::repeat_byte(1),
                params: CreationParams::new().text("name", "Bond").canonicalize().unwrap(),
            },
            fingerprint: OperationFingerprint(B256::repeat_byte(byte)),
        }
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let store = MemoryStore::new(None);
        let first = store.upsert_provisional(draft(1)).await.unwrap();
        let second = store.upsert_provisional(draft(1)).await.unwrap();

        let UpsertOutcome::Created(created) = first else {
            panic!("expected a new record");
        };
        assert_eq!(second, UpsertOutcome::InProgress(created));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_upserts_create_once() {
        let store = MemoryStore::new(None);
        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.upsert_provisional(draft(7)).await.unwrap()
            }));
        }
        let mut created = 0;
        for handle in handles {
            if matches!(handle.await.unwrap(), UpsertOutcome::Created(_)) {
                created += 1;
            }
        }
        assert_eq!(created, 1);
    }

    #[tokio::test]
    async fn test_finalize_is_monotonic() {
        let store = MemoryStore::new(None);
        store.upsert_provisional(draft(1)).await.unwrap();
        let key = Address::repeat_byte(1);

        let applied = store.finalize(key, 1, Finalization::Confirmed).await.unwrap();
        assert!(applied.is_applied());

        let again = store
            .finalize(key, 1, Finalization::Orphaned { reason: "late".into() })
            .await
            .unwrap();
        assert!(matches!(again, Transition::Unchanged(_)));
        assert_eq!(
            store.get(key).await.unwrap().unwrap().status,
            RecordStatus::Confirmed
        );

        let outcome = store.upsert_provisional(draft(1)).await.unwrap();
        assert!(matches!(outcome, UpsertOutcome::AlreadyConfirmed(_)));
    }

    #[tokio::test]
    async fn test_rearm_supersedes_old_attempt() {
        let store = MemoryStore::new(None);
        store.upsert_provisional(draft(1)).await.unwrap();
        let key = Address::repeat_byte(1);
        store
            .attach_transaction(key, 1, TxHash::repeat_byte(0xaa), 100)
            .await
            .unwrap();
        store
            .finalize(key, 1, Finalization::Orphaned { reason: "reverted".into() })
            .await
            .unwrap();

        let UpsertOutcome::Rearmed(rearmed) = store.upsert_provisional(draft(1)).await.unwrap()
        else {
            panic!("expected re-arm");
        };
        assert_eq!(rearmed.attempt, 2);
        assert_eq!(rearmed.tx_hash, None);
        assert_eq!(rearmed.failure_reason, None);

        let stale = store.finalize(key, 1, Finalization::Confirmed).await.unwrap();
        assert!(matches!(stale, Transition::Superseded(_)));
        assert_eq!(
            store.get(key).await.unwrap().unwrap().status,
            RecordStatus::Provisional
        );
    }

    #[tokio::test]
    async fn test_fingerprint_conflict() {
        let store = MemoryStore::new(None);
        store.upsert_provisional(draft(1)).await.unwrap();
        let mut other = draft(1);
        other.fingerprint = OperationFingerprint(B256::repeat_byte(9));
        assert!(matches!(
            store.upsert_provisional(other).await,
            Err(StoreError::Conflict { .. })
        ));
    }

    #[tokio::test]
    async fn test_persistence() {
        let path = std::env::temp_dir().join(format!("issuance-store-{}.json", Uuid::new_v4()));
        let path = path.to_string_lossy().to_string();

        let store = MemoryStore::new(Some(path.clone()));
        store.upsert_provisional(draft(3)).await.unwrap();
        store.save_to_file().unwrap();

        let loaded = MemoryStore::load_from_file(&path).unwrap();
        let record = loaded.get(Address::repeat_byte(3)).await.unwrap().unwrap();
        assert_eq!(record.status, RecordStatus::Provisional);
        assert_eq!(
            loaded.list(Some(RecordStatus::Provisional)).await.unwrap().len(),
            1
        );

        std::fs::remove_file(&path).unwrap_or_default();
    }
}
