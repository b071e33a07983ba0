//! Reconciler sweeps over records left behind by interrupted flows.

use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;

use issuance_core::config::{ReconcilerConfig, TrackerConfig};
use issuance_core::ledger::{LedgerGateway, SimulatedIndex, SimulatedLedger};
use issuance_core::lifecycle::Shutdown;
use issuance_core::operation::Operation;
use issuance_core::orchestrator::{Reconciler, SweepReport};
use issuance_core::prediction::AddressPredictor;
use issuance_core::store::{
    CreationPayload, MemoryStore, OffchainRecord, OffchainStore, ProvisionalRecord, RecordStatus,
};
use issuance_core::tracking::{TransactionTracker, TxStatus};

mod common;
use common::{bond_params, unix_now, FACTORY, INIT_CODE_HASH, SENDER};

async fn provisional(store: &MemoryStore) -> (OffchainRecord, Operation) {
    let predicted = AddressPredictor::create2(INIT_CODE_HASH)
        .predict(FACTORY, SENDER, &bond_params())
        .await
        .unwrap();
    let operation = Operation::create(FACTORY, SENDER, predicted.params.clone());
    let outcome = store
        .upsert_provisional(ProvisionalRecord {
            key: predicted.address,
            payload: CreationPayload {
                factory: FACTORY,
                sender: SENDER,
                params: predicted.params,
            },
            fingerprint: operation.fingerprint(),
        })
        .await
        .unwrap();
    let record = match outcome {
        issuance_core::store::UpsertOutcome::Created(record) => record,
        other => panic!("unexpected upsert outcome {:?}", other),
    };
    (record, operation)
}

async fn settled(store: &MemoryStore, record: &OffchainRecord) -> OffchainRecord {
    for _ in 0..120 {
        let current = store.get(record.key).await.unwrap().unwrap();
        if current.status != RecordStatus::Provisional {
            return current;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
    panic!("record {} never settled", record.key);
}

#[tokio::test(start_paused = true)]
async fn test_resumes_submitted_attempt_after_restart() {
    let ledger = SimulatedLedger::with_auto_mine(1);
    let index = SimulatedIndex::with_auto_index(1);
    let store = MemoryStore::new(None);

    let (record, operation) = provisional(&store).await;
    let hash = ledger.submit(&operation).await.unwrap();
    store
        .attach_transaction(record.key, record.attempt, hash, unix_now())
        .await
        .unwrap();

    // Fresh tracker: nothing is following the hash.
    let tracker = TransactionTracker::new(
        Arc::new(ledger.clone()),
        Arc::new(index.clone()),
        TrackerConfig::default(),
    );
    let reconciler = Reconciler::new(
        Arc::new(store.clone()),
        tracker.clone(),
        ReconcilerConfig::default(),
    );

    let report = reconciler.sweep().await.unwrap();
    assert_eq!(report.resumed, 1);
    assert!(tracker.is_tracking(&hash));

    // Already followed; a second sweep leaves it alone.
    assert_eq!(reconciler.sweep().await.unwrap(), SweepReport::default());

    let done = settled(&store, &record).await;
    assert_eq!(done.status, RecordStatus::Confirmed);
    assert_eq!(done.tx_hash, Some(hash));
}

#[tokio::test(start_paused = true)]
async fn test_sweep_skips_recently_settled_hash() {
    let ledger = SimulatedLedger::with_auto_mine(1);
    let index = SimulatedIndex::with_auto_index(1);
    let store = MemoryStore::new(None);

    let (record, operation) = provisional(&store).await;
    let hash = ledger.submit(&operation).await.unwrap();
    store
        .attach_transaction(record.key, record.attempt, hash, unix_now())
        .await
        .unwrap();

    let tracker = TransactionTracker::new(
        Arc::new(ledger.clone()),
        Arc::new(index.clone()),
        TrackerConfig::default(),
    );
    let reconciler = Reconciler::new(
        Arc::new(store.clone()),
        tracker.clone(),
        ReconcilerConfig::default(),
    );

    // Tracker reached Confirmed but nothing has finalized the record yet.
    let statuses: Vec<_> = tracker
        .open(hash, "create")
        .into_stream()
        .map(|e| e.status)
        .collect()
        .await;
    assert_eq!(statuses.last(), Some(&TxStatus::Confirmed));
    let current = store.get(record.key).await.unwrap().unwrap();
    assert_eq!(current.status, RecordStatus::Provisional);

    let queries = ledger.receipt_queries();
    assert_eq!(reconciler.sweep().await.unwrap().resumed, 0);
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(ledger.receipt_queries(), queries);

    let replayed: Vec<_> = tracker
        .open(hash, "create")
        .into_stream()
        .map(|e| e.status)
        .collect()
        .await;
    assert_eq!(replayed, statuses);
    assert_eq!(
        replayed
            .iter()
            .filter(|s| **s == TxStatus::Confirmed)
            .count(),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn test_orphans_attempt_without_transaction() {
    let mut tracker_config = TrackerConfig::default();
    tracker_config
        .timeout_overrides
        .insert("create".to_string(), 0);
    let store = MemoryStore::new(None);
    let (record, _) = provisional(&store).await;

    let tracker = TransactionTracker::new(
        Arc::new(SimulatedLedger::new()),
        Arc::new(SimulatedIndex::new()),
        tracker_config,
    );
    let reconciler = Reconciler::new(
        Arc::new(store.clone()),
        tracker,
        ReconcilerConfig::default(),
    );

    let report = reconciler.sweep().await.unwrap();
    assert_eq!(report.orphaned, 1);
    assert_eq!(report.resumed, 0);

    let orphaned = store.get(record.key).await.unwrap().unwrap();
    assert_eq!(orphaned.status, RecordStatus::Orphaned);
    assert_eq!(
        orphaned.failure_reason.as_deref(),
        Some("no transaction was submitted")
    );

    assert_eq!(reconciler.sweep().await.unwrap().orphaned, 0);
}

#[tokio::test(start_paused = true)]
async fn test_fresh_attempt_without_transaction_is_left_alone() {
    let store = MemoryStore::new(None);
    let (record, _) = provisional(&store).await;
    let tracker = TransactionTracker::new(
        Arc::new(SimulatedLedger::new()),
        Arc::new(SimulatedIndex::new()),
        TrackerConfig::default(),
    );
    let reconciler = Reconciler::new(
        Arc::new(store.clone()),
        tracker,
        ReconcilerConfig::default(),
    );

    assert_eq!(reconciler.sweep().await.unwrap(), SweepReport::default());
    let current = store.get(record.key).await.unwrap().unwrap();
    assert_eq!(current.status, RecordStatus::Provisional);
}

#[tokio::test(start_paused = true)]
async fn test_run_stops_on_shutdown() {
    let store = MemoryStore::new(None);
    let tracker = TransactionTracker::new(
        Arc::new(SimulatedLedger::new()),
        Arc::new(SimulatedIndex::new()),
        TrackerConfig::default(),
    );
    let reconciler = Reconciler::new(Arc::new(store), tracker, ReconcilerConfig::default());

    let shutdown = Shutdown::new();
    let task = tokio::spawn(reconciler.run(shutdown.subscribe()));
    tokio::time::sleep(Duration::from_secs(125)).await;
    shutdown.trigger();

    tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .expect("reconciler did not stop")
        .unwrap();
}
