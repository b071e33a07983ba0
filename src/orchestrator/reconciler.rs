//! Background sweep over provisional records.
//!
//! # Responsibilities
//! - Resume tracking for submitted attempts nobody is tracking (restart,
//!   crashed caller)
//! - Orphan attempts that never got a transaction within the tracking budget
//! - Drop expired challenges and flush the store

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time;

use crate::config::ReconcilerConfig;
use crate::orchestrator::context::NoopSink;
use crate::orchestrator::create::settle;
use crate::store::{Finalization, OffchainStore, RecordStatus, StoreResult};
use crate::tracking::TransactionTracker;
use crate::verification::challenge::unix_now;
use crate::verification::ChallengeRegistry;

/// What one sweep did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub resumed: usize,
    pub orphaned: usize,
    pub purged_challenges: usize,
}

pub struct Reconciler {
    store: Arc<dyn OffchainStore>,
    tracker: TransactionTracker,
    config: ReconcilerConfig,
    challenges: Option<ChallengeRegistry>,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn OffchainStore>,
        tracker: TransactionTracker,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            store,
            tracker,
            config,
            challenges: None,
        }
    }

    /// Also purge expired challenges on every sweep.
    pub fn with_challenges(mut self, challenges: ChallengeRegistry) -> Self {
        self.challenges = Some(challenges);
        self
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        if !self.config.enabled {
            tracing::info!("Reconciler disabled");
            return;
        }

        tracing::info!(interval = self.config.interval_secs, "Reconciler starting");
        let mut ticker = time::interval(Duration::from_secs(self.config.interval_secs));

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.sweep().await {
                        Ok(report) if report != SweepReport::default() => {
                            tracing::info!(
                                resumed = report.resumed,
                                orphaned = report.orphaned,
                                purged_challenges = report.purged_challenges,
                                "Reconciler sweep"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => tracing::error!(error = %e, "Reconciler sweep failed"),
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Reconciler received shutdown signal, exiting loop");
                    break;
                }
            }
        }

        if let Err(e) = self.store.flush().await {
            tracing::error!(error = %e, "Failed to flush store on shutdown");
        }
    }

    /// One pass over the provisional records.
    pub async fn sweep(&self) -> StoreResult<SweepReport> {
        let mut report = SweepReport::default();
        let budget = self.tracker.config().budget_for("create").as_secs();
        let now = unix_now();

        for record in self.store.list(Some(RecordStatus::Provisional)).await? {
            match record.tx_hash {
                // Polled or recently settled hashes belong to a settle task
                // already.
                Some(hash) if self.tracker.snapshot(&hash).is_none() => {
                    let submitted_at = record.submitted_at.unwrap_or(record.updated_at);
                    tracing::info!(key = %record.key, tx_hash = %hash, "Resuming tracking");
                    let stream = self.tracker.resume(hash, "create", submitted_at);
                    tokio::spawn(settle(
                        self.store.clone(),
                        record.key,
                        record.attempt,
                        stream,
                        Arc::new(NoopSink),
                    ));
                    report.resumed += 1;
                }
                Some(_) => {}
                None if now.saturating_sub(record.updated_at) >= budget => {
                    let transition = self
                        .store
                        .finalize(
                            record.key,
                            record.attempt,
                            Finalization::Orphaned {
                                reason: "no transaction was submitted".to_string(),
                            },
                        )
                        .await?;
                    if transition.is_applied() {
                        report.orphaned += 1;
                    }
                }
                None => {}
            }
        }

        if let Some(challenges) = &self.challenges {
            report.purged_challenges = challenges.purge_expired();
        }
        self.store.flush().await?;
        Ok(report)
    }
}
