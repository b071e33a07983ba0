//! Transaction orchestration and verification core.
//!
//! Turns a user intent ("create a bond", "freeze a balance", "grant a role")
//! into a confirmed, indexed on-chain state change while keeping an
//! off-chain record store consistent with the ledger.

// Domain
pub mod operation;
pub mod orchestrator;
pub mod prediction;
pub mod submission;
pub mod tracking;
pub mod verification;

// Boundaries
pub mod blockchain;
pub mod ledger;
pub mod store;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::schema::OrchestratorConfig;
pub use lifecycle::Shutdown;
pub use orchestrator::{CreateError, OperationContext, Orchestrator, Reconciler, StatusSink};
