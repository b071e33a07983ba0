//! In-memory ledger and index.
//!
//! Both can progress on their own after a number of polls (`auto_*`), or be
//! driven step by step (`mine`, `revert`, `mark_indexed`).

use alloy::primitives::{keccak256, TxHash};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::ledger::{IndexError, LedgerError, LedgerGateway, ReceiptOutcome, SecondaryIndex};
use crate::operation::Operation;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Clone)]
struct SimulatedTx {
    operation: Operation,
    polls: u32,
    outcome: Option<ReceiptOutcome>,
}

#[derive(Default)]
struct LedgerState {
    txs: DashMap<TxHash, SimulatedTx>,
    queued_hashes: Mutex<VecDeque<TxHash>>,
    queued_failures: Mutex<VecDeque<LedgerError>>,
    submissions: AtomicU64,
    receipt_queries: AtomicU64,
    block_height: AtomicU64,
    auto_mine_after: Option<u32>,
}

/// Ledger double.
#[derive(Clone, Default)]
pub struct SimulatedLedger {
    state: Arc<LedgerState>,
}

impl SimulatedLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mine every transaction successfully once it has been polled `polls` times.
    pub fn with_auto_mine(polls: u32) -> Self {
        Self {
            state: Arc::new(LedgerState {
                auto_mine_after: Some(polls),
                ..Default::default()
            }),
        }
    }

    /// Hash to hand out for the next accepted submission.
    pub fn queue_hash(&self, hash: TxHash) {
        lock(&self.state.queued_hashes).push_back(hash);
    }

    /// Fail the next submission with `error`.
    pub fn fail_next(&self, error: LedgerError) {
        lock(&self.state.queued_failures).push_back(error);
    }

    pub fn mine(&self, hash: TxHash) {
        let block = self.state.block_height.fetch_add(1, Ordering::SeqCst) + 1;
        self.set_outcome(hash, ReceiptOutcome::Success { block_number: block });
    }

    pub fn revert(&self, hash: TxHash, reason: impl Into<String>) {
        self.set_outcome(
            hash,
            ReceiptOutcome::Reverted {
                reason: reason.into(),
            },
        );
    }

    fn set_outcome(&self, hash: TxHash, outcome: ReceiptOutcome) {
        if let Some(mut tx) = self.state.txs.get_mut(&hash) {
            tx.outcome = Some(outcome);
        }
    }

    /// Number of submissions that reached the node.
    pub fn submissions(&self) -> u64 {
        self.state.submissions.load(Ordering::SeqCst)
    }

    pub fn receipt_queries(&self) -> u64 {
        self.state.receipt_queries.load(Ordering::SeqCst)
    }

    pub fn submitted(&self, hash: &TxHash) -> Option<Operation> {
        self.state.txs.get(hash).map(|tx| tx.operation.clone())
    }
}

#[async_trait]
impl LedgerGateway for SimulatedLedger {
    async fn submit(&self, operation: &Operation) -> Result<TxHash, LedgerError> {
        if let Some(error) = lock(&self.state.queued_failures).pop_front() {
            return Err(error);
        }

        let n = self.state.submissions.fetch_add(1, Ordering::SeqCst);
        let hash = match lock(&self.state.queued_hashes).pop_front() {
            Some(hash) => hash,
            None => {
                let mut seed = operation.fingerprint().0.to_vec();
                seed.extend_from_slice(&n.to_be_bytes());
                keccak256(&seed)
            }
        };

        self.state.txs.insert(
            hash,
            SimulatedTx {
                operation: operation.clone(),
                polls: 0,
                outcome: None,
            },
        );
        tracing::debug!(tx_hash = %hash, kind = operation.kind_name(), "Simulated submission accepted");
        Ok(hash)
    }

    async fn receipt(&self, hash: TxHash) -> Result<Option<ReceiptOutcome>, LedgerError> {
        self.state.receipt_queries.fetch_add(1, Ordering::SeqCst);

        let auto_mine = {
            let Some(mut tx) = self.state.txs.get_mut(&hash) else {
                return Ok(None);
            };
            tx.polls += 1;
            if let Some(outcome) = &tx.outcome {
                return Ok(Some(outcome.clone()));
            }
            self.state
                .auto_mine_after
                .is_some_and(|after| tx.polls >= after)
        };

        if auto_mine {
            self.mine(hash);
            return Ok(self.state.txs.get(&hash).and_then(|tx| tx.outcome.clone()));
        }
        Ok(None)
    }
}

#[derive(Default)]
struct IndexState {
    indexed: DashMap<TxHash, bool>,
    polls: DashMap<TxHash, u32>,
    queued_failures: Mutex<VecDeque<IndexError>>,
    auto_index_after: Option<u32>,
}

/// Secondary index double.
#[derive(Clone, Default)]
pub struct SimulatedIndex {
    state: Arc<IndexState>,
}

impl SimulatedIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report a hash as indexed once it has been polled `polls` times.
    pub fn with_auto_index(polls: u32) -> Self {
        Self {
            state: Arc::new(IndexState {
                auto_index_after: Some(polls),
                ..Default::default()
            }),
        }
    }

    pub fn mark_indexed(&self, hash: TxHash) {
        self.state.indexed.insert(hash, true);
    }

    pub fn fail_next(&self, error: IndexError) {
        lock(&self.state.queued_failures).push_back(error);
    }

    pub fn polls(&self, hash: &TxHash) -> u32 {
        self.state.polls.get(hash).map(|p| *p).unwrap_or(0)
    }
}

#[async_trait]
impl SecondaryIndex for SimulatedIndex {
    async fn is_indexed(&self, hash: TxHash) -> Result<bool, IndexError> {
        if let Some(error) = lock(&self.state.queued_failures).pop_front() {
            return Err(error);
        }

        let polls = {
            let mut entry = self.state.polls.entry(hash).or_insert(0);
            *entry += 1;
            *entry
        };
        if self.state.indexed.get(&hash).is_some_and(|i| *i) {
            return Ok(true);
        }
        if self.state.auto_index_after.is_some_and(|after| polls >= after) {
            self.mark_indexed(hash);
            return Ok(true);
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::CreationParams;
    use alloy::primitives::Address;

    fn operation() -> Operation {
        let params = CreationParams::new().text("name", "Bond").canonicalize().unwrap();
        Operation::create(Address::repeat_byte(0xfa), Address::repeat_byte(1), params)
    }

    #[tokio::test]
    async fn test_manual_progress() {
        let ledger = SimulatedLedger::new();
        let hash = ledger.submit(&operation()).await.unwrap();
        assert_eq!(ledger.receipt(hash).await.unwrap(), None);

        ledger.mine(hash);
        assert!(matches!(
            ledger.receipt(hash).await.unwrap(),
            Some(ReceiptOutcome::Success { block_number: 1 })
        ));
    }

    #[tokio::test]
    async fn test_auto_mine_and_queued_hash() {
        let ledger = SimulatedLedger::with_auto_mine(2);
        let wanted = TxHash::repeat_byte(0xab);
        ledger.queue_hash(wanted);

        let hash = ledger.submit(&operation()).await.unwrap();
        assert_eq!(hash, wanted);
        assert_eq!(ledger.receipt(hash).await.unwrap(), None);
        assert!(ledger.receipt(hash).await.unwrap().is_some());
        assert_eq!(ledger.submitted(&hash), Some(operation()));
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let ledger = SimulatedLedger::new();
        ledger.fail_next(LedgerError::Unavailable("down".into()));
        assert!(ledger.submit(&operation()).await.is_err());
        assert!(ledger.submit(&operation()).await.is_ok());
        assert_eq!(ledger.submissions(), 1);
    }

    #[tokio::test]
    async fn test_auto_index() {
        let index = SimulatedIndex::with_auto_index(3);
        let hash = TxHash::repeat_byte(1);
        assert!(!index.is_indexed(hash).await.unwrap());
        assert!(!index.is_indexed(hash).await.unwrap());
        assert!(index.is_indexed(hash).await.unwrap());
        assert_eq!(index.polls(&hash), 3);
    }
}
