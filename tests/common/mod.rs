//! Shared wiring for the integration tests: every component backed by the
//! in-memory ledger, index and store.

use alloy::primitives::{address, b256, Address, B256};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;

use issuance_core::config::{TrackerConfig, VerificationConfig};
use issuance_core::ledger::{SimulatedIndex, SimulatedLedger};
use issuance_core::operation::CreationParams;
use issuance_core::orchestrator::{OperationContext, Orchestrator};
use issuance_core::prediction::AddressPredictor;
use issuance_core::resilience::RetryPolicy;
use issuance_core::store::MemoryStore;
use issuance_core::submission::TransactionSubmitter;
use issuance_core::tracking::{StatusEvent, TransactionTracker};
use issuance_core::verification::{EnrollmentStore, LocalVerificationIssuer};

pub const FACTORY: Address = address!("00000000000000000000000000000000000000fa");
pub const SENDER: Address = address!("0000000000000000000000000000000000000001");
pub const PIN: &str = "482915";
pub const INIT_CODE_HASH: B256 =
    b256!("1111111111111111111111111111111111111111111111111111111111111111");

pub struct Harness {
    pub orchestrator: Orchestrator,
    pub ledger: SimulatedLedger,
    pub index: SimulatedIndex,
    pub issuer: Arc<LocalVerificationIssuer>,
    pub store: MemoryStore,
    pub tracker: TransactionTracker,
}

impl Harness {
    /// Ledger and index are driven by the test.
    #[allow(dead_code)]
    pub fn manual() -> Self {
        Self::build(
            SimulatedLedger::new(),
            SimulatedIndex::new(),
            TrackerConfig::default(),
        )
    }

    /// Ledger mines and index catches up after two polls each.
    #[allow(dead_code)]
    pub fn auto() -> Self {
        Self::build(
            SimulatedLedger::with_auto_mine(2),
            SimulatedIndex::with_auto_index(2),
            TrackerConfig::default(),
        )
    }

    pub fn build(ledger: SimulatedLedger, index: SimulatedIndex, tracker: TrackerConfig) -> Self {
        let issuer = Arc::new(LocalVerificationIssuer::new(
            VerificationConfig::default(),
            EnrollmentStore::new(),
        ));
        issuer.enroll_pin(SENDER, PIN).unwrap();

        let submitter = TransactionSubmitter::new(Arc::new(ledger.clone()), issuer.challenges());
        let tracker = TransactionTracker::new(
            Arc::new(ledger.clone()),
            Arc::new(index.clone()),
            tracker,
        );
        let store = MemoryStore::new(None);
        let orchestrator = Orchestrator::new(
            AddressPredictor::create2(INIT_CODE_HASH),
            issuer.clone(),
            submitter,
            tracker.clone(),
            Arc::new(store.clone()),
        )
        .with_policies(RetryPolicy::new(3, 10, 100), RetryPolicy::new(3, 10, 100));

        Self {
            orchestrator,
            ledger,
            index,
            issuer,
            store,
            tracker,
        }
    }

    /// Context for [`SENDER`] whose events land in the returned receiver.
    pub fn context(&self) -> (OperationContext, mpsc::UnboundedReceiver<StatusEvent>) {
        let (sink, events) = mpsc::unbounded_channel();
        (OperationContext::new(SENDER).with_sink(Arc::new(sink)), events)
    }
}

pub fn bond_params() -> CreationParams {
    CreationParams::new()
        .text("name", "Municipal Bond 2031")
        .text("symbol", "MB31")
        .number("face_value", "1000")
        .flag("transferable", true)
}

/// Everything the receiver holds right now.
#[allow(dead_code)]
pub fn drain(events: &mut mpsc::UnboundedReceiver<StatusEvent>) -> Vec<StatusEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

#[allow(dead_code)]
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
