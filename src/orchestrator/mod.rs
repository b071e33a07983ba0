//! Orchestration of user intents into confirmed ledger state.
//!
//! # Data Flow
//! ```text
//! OperationContext + intent + Secret
//!     → create.rs (predict, authorize, provisional write, submit, track)
//!     → spawned settle task (StatusSink, confirmed | orphaned)
//! reconciler.rs (periodic)
//!     → resume untracked submitted attempts, orphan stale ones
//! ```
//!
//! The off-chain record is a saga: the provisional write is compensated by
//! the orphaned transition, never by deletion.

pub mod context;
pub mod create;
pub mod reconciler;

use alloy::primitives::{Address, TxHash};
use thiserror::Error;

use crate::prediction::PredictionError;
use crate::resilience::Retryable;
use crate::store::StoreError;
use crate::submission::SubmissionError;
use crate::verification::VerificationError;

pub use context::{NoopSink, OperationContext, StatusSink};
pub use create::{CreateAttempt, Orchestrator};
pub use reconciler::{Reconciler, SweepReport};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CreateError {
    #[error(transparent)]
    Prediction(#[from] PredictionError),

    #[error(transparent)]
    Verification(#[from] VerificationError),

    #[error(transparent)]
    Submission(#[from] SubmissionError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("creation of {key} is already in progress")]
    CreationInProgress { key: Address },

    #[error("{key} has already been created")]
    AlreadyConfirmed { key: Address },

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("tracking of {0} was cancelled before a final status")]
    TrackingCancelled(TxHash),

    #[error("settle task aborted: {0}")]
    Aborted(String),
}

impl Retryable for CreateError {
    fn is_retryable(&self) -> bool {
        match self {
            CreateError::Prediction(e) => e.is_retryable(),
            CreateError::Submission(e) => e.is_retryable(),
            CreateError::Verification(e) => e.is_retryable(),
            _ => false,
        }
    }
}
