//! Per-hash tracking tasks.
//!
//! # Responsibilities
//! - Poll the ledger for a receipt, then the secondary index
//! - Publish ordered status events to any number of subscribers
//! - Stop at the first terminal status, on cancellation, or at the budget
//!
//! # Design Decisions
//! - One task per hash; opening an already tracked hash subscribes to it
//! - Events are appended to a history under the same lock used to
//!   subscribe, so a late subscriber sees every event exactly once
//! - Poll errors are transient: logged, then retried on the next tick
//! - A settled entry stays registered for `terminal_retention_secs`, so a
//!   late `open` or `resume` replays the final status instead of polling
//!   the hash again

use alloy::primitives::TxHash;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::TrackerConfig;
use crate::ledger::{LedgerGateway, ReceiptOutcome, SecondaryIndex};
use crate::observability::metrics;
use crate::tracking::stream::StatusStream;
use crate::tracking::types::{StatusEvent, TrackedTransaction, TxStatus};
use crate::verification::challenge::unix_now;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct TrackState {
    history: Vec<StatusEvent>,
    status: TxStatus,
    failure_reason: Option<String>,
}

struct TrackedEntry {
    hash: TxHash,
    submitted_at: u64,
    state: Mutex<TrackState>,
    events: broadcast::Sender<StatusEvent>,
    cancel: watch::Sender<bool>,
}

impl TrackedEntry {
    fn subscribe(&self) -> StatusStream {
        let state = lock(&self.state);
        StatusStream::new(self.hash, state.history.clone(), self.events.subscribe())
    }

    /// Append and publish. Returns false if a terminal event was already
    /// emitted, in which case nothing happens.
    fn emit(&self, status: TxStatus, failure_reason: Option<String>) -> bool {
        let mut state = lock(&self.state);
        if state.status.is_terminal() {
            return false;
        }
        let event = StatusEvent::now(self.hash, status, failure_reason.clone());
        state.status = status;
        state.failure_reason = failure_reason;
        state.history.push(event.clone());
        // No receivers is fine; history still holds the event.
        let _ = self.events.send(event);
        metrics::record_tracker_event(status.as_str());
        true
    }

    fn is_terminal(&self) -> bool {
        lock(&self.state).status.is_terminal()
    }

    fn snapshot(&self) -> TrackedTransaction {
        let state = lock(&self.state);
        TrackedTransaction {
            hash: self.hash,
            submitted_at: self.submitted_at,
            status: state.status,
            last_event: state.history.last().cloned(),
            failure_reason: state.failure_reason.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Mining,
    Indexing,
}

enum Observation {
    Pending,
    Mined { block_number: u64 },
    Reverted { reason: String },
    Indexed,
}

struct TrackerInner {
    ledger: Arc<dyn LedgerGateway>,
    index: Arc<dyn SecondaryIndex>,
    config: TrackerConfig,
    active: DashMap<TxHash, Arc<TrackedEntry>>,
}

/// Registry of live trackers.
#[derive(Clone)]
pub struct TransactionTracker {
    inner: Arc<TrackerInner>,
}

impl TransactionTracker {
    pub fn new(
        ledger: Arc<dyn LedgerGateway>,
        index: Arc<dyn SecondaryIndex>,
        config: TrackerConfig,
    ) -> Self {
        Self {
            inner: Arc::new(TrackerInner {
                ledger,
                index,
                config,
                active: DashMap::new(),
            }),
        }
    }

    /// Start tracking a freshly submitted hash, or join the existing tracker.
    pub fn open(&self, hash: TxHash, kind: &str) -> StatusStream {
        let budget = self.inner.config.budget_for(kind);
        self.open_with(hash, unix_now(), budget)
    }

    /// Track a hash submitted at `submitted_at` (unix seconds), e.g. after a
    /// restart. The budget still counts from the original submission.
    pub fn resume(&self, hash: TxHash, kind: &str, submitted_at: u64) -> StatusStream {
        let budget = self.inner.config.budget_for(kind);
        let elapsed = Duration::from_secs(unix_now().saturating_sub(submitted_at));
        self.open_with(hash, submitted_at, budget.saturating_sub(elapsed))
    }

    fn open_with(&self, hash: TxHash, submitted_at: u64, remaining: Duration) -> StatusStream {
        let entry = match self.inner.active.entry(hash) {
            Entry::Occupied(existing) => {
                tracing::debug!(
                    tx_hash = %hash,
                    settled = existing.get().is_terminal(),
                    "Joining existing tracker"
                );
                return existing.get().subscribe();
            }
            Entry::Vacant(slot) => {
                let (events, _) = broadcast::channel(self.inner.config.event_buffer.max(4));
                let (cancel, _) = watch::channel(false);
                let entry = Arc::new(TrackedEntry {
                    hash,
                    submitted_at,
                    state: Mutex::new(TrackState {
                        history: Vec::new(),
                        status: TxStatus::PendingMining,
                        failure_reason: None,
                    }),
                    events,
                    cancel,
                });
                entry.emit(TxStatus::PendingMining, None);
                slot.insert(entry.clone());
                entry
            }
        };

        let stream = entry.subscribe();
        let active = live_count(&self.inner.active);
        metrics::record_active_trackers(active);
        tracing::info!(
            tx_hash = %hash,
            budget_secs = remaining.as_secs(),
            active,
            "Tracking transaction"
        );

        let inner = self.inner.clone();
        tokio::spawn(async move {
            run(inner, entry, Instant::now() + remaining).await;
        });
        stream
    }

    /// Stop tracking `hash`. No terminal event is emitted and subscribers'
    /// streams end. Returns false if nothing was being polled.
    pub fn cancel(&self, hash: &TxHash) -> bool {
        match self.inner.active.get(hash) {
            Some(entry) if !entry.is_terminal() => {
                entry.cancel.send_replace(true);
                true
            }
            _ => false,
        }
    }

    /// Whether a poller is still running for `hash`.
    pub fn is_tracking(&self, hash: &TxHash) -> bool {
        self.inner
            .active
            .get(hash)
            .is_some_and(|entry| !entry.is_terminal())
    }

    /// Current view of `hash`, while it is polled or retained after settling.
    pub fn snapshot(&self, hash: &TxHash) -> Option<TrackedTransaction> {
        self.inner.active.get(hash).map(|entry| entry.snapshot())
    }

    /// Number of hashes still being polled.
    pub fn active_count(&self) -> usize {
        live_count(&self.inner.active)
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.inner.config
    }
}

async fn run(inner: Arc<TrackerInner>, entry: Arc<TrackedEntry>, deadline: Instant) {
    let hash = entry.hash;
    let started = Instant::now();
    let mut cancelled = entry.cancel.subscribe();
    let mut phase = Phase::Mining;

    let mut ticker = tokio::time::interval(inner.config.poll_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let expiry = tokio::time::sleep_until(deadline);
    tokio::pin!(expiry);

    loop {
        tokio::select! {
            biased;
            _ = cancelled.wait_for(|c| *c) => {
                tracing::info!(tx_hash = %hash, "Tracking cancelled");
                break;
            }
            observation = async {
                ticker.tick().await;
                observe(&inner, hash, phase).await
            } => {
                match observation {
                    Observation::Pending => {}
                    Observation::Mined { block_number } => {
                        tracing::info!(tx_hash = %hash, block_number, "Transaction mined, waiting for index");
                        entry.emit(TxStatus::PendingIndexing, None);
                        phase = Phase::Indexing;
                        ticker.reset_immediately();
                    }
                    Observation::Reverted { reason } => {
                        tracing::warn!(tx_hash = %hash, reason = %reason, "Transaction failed");
                        entry.emit(TxStatus::Failed, Some(reason));
                        break;
                    }
                    Observation::Indexed => {
                        tracing::info!(tx_hash = %hash, "Transaction confirmed and indexed");
                        entry.emit(TxStatus::Confirmed, None);
                        break;
                    }
                }
            }
            _ = &mut expiry => {
                let reason = format!(
                    "tracking stopped after {}s without a final status",
                    deadline.saturating_duration_since(started).as_secs()
                );
                tracing::warn!(tx_hash = %hash, phase = ?phase, "Tracking budget exhausted");
                entry.emit(TxStatus::TimedOut, Some(reason));
                break;
            }
        }
    }

    let settled = entry.is_terminal();
    if settled {
        metrics::record_tracking_duration(started.elapsed());
    }
    metrics::record_active_trackers(live_count(&inner.active));

    if settled {
        tokio::time::sleep(inner.config.terminal_retention()).await;
    }
    inner
        .active
        .remove_if(&hash, |_, current| Arc::ptr_eq(current, &entry));
}

fn live_count(active: &DashMap<TxHash, Arc<TrackedEntry>>) -> usize {
    active.iter().filter(|entry| !entry.is_terminal()).count()
}

async fn observe(inner: &TrackerInner, hash: TxHash, phase: Phase) -> Observation {
    match phase {
        Phase::Mining => match inner.ledger.receipt(hash).await {
            Ok(None) => Observation::Pending,
            Ok(Some(ReceiptOutcome::Success { block_number })) => {
                Observation::Mined { block_number }
            }
            Ok(Some(ReceiptOutcome::Reverted { reason })) => Observation::Reverted { reason },
            Err(e) => {
                tracing::warn!(tx_hash = %hash, error = %e, "Receipt query failed, retrying next poll");
                Observation::Pending
            }
        },
        Phase::Indexing => match inner.index.is_indexed(hash).await {
            Ok(true) => Observation::Indexed,
            Ok(false) => Observation::Pending,
            Err(e) => {
                tracing::warn!(tx_hash = %hash, error = %e, "Index query failed, retrying next poll");
                Observation::Pending
            }
        },
    }
}
