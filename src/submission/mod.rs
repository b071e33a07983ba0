//! Transaction submission subsystem.
//!
//! # Data Flow
//! ```text
//! (Operation, ChallengeResponse)
//!     → challenge reservation (fingerprint + sender binding)
//!     → LedgerGateway::submit
//!     → TxHash | SubmissionError
//! ```

pub mod submitter;

use thiserror::Error;

use crate::resilience::Retryable;
use crate::verification::ChallengeRejection;

pub use submitter::TransactionSubmitter;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmissionError {
    #[error("challenge mismatch: {0}")]
    ChallengeMismatch(ChallengeRejection),

    #[error("node rejected the transaction: {0}")]
    NodeRejected(String),

    #[error("node unavailable: {0}")]
    NodeUnavailable(String),

    /// The send may have been broadcast. Resending could apply the
    /// operation twice.
    #[error("submission outcome unknown: {0}")]
    OutcomeUnknown(String),
}

impl SubmissionError {
    pub fn label(&self) -> &'static str {
        match self {
            SubmissionError::ChallengeMismatch(_) => "challenge_mismatch",
            SubmissionError::NodeRejected(_) => "rejected",
            SubmissionError::NodeUnavailable(_) => "unavailable",
            SubmissionError::OutcomeUnknown(_) => "outcome_unknown",
        }
    }
}

impl Retryable for SubmissionError {
    fn is_retryable(&self) -> bool {
        matches!(self, SubmissionError::NodeUnavailable(_))
    }
}
