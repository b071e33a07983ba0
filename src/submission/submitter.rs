//! Transaction submitter.
//!
//! # Responsibilities
//! - Check that the challenge response was issued for this exact operation
//! - Hand the operation to the ledger, once per call
//! - Settle the challenge: spent on success or rejection, released when the
//!   node could not be reached
//! - Never offer a retry after an ambiguous send, except for creations: a
//!   repeated creation reverts on the address the first one took

use alloy::primitives::TxHash;
use std::sync::Arc;

use crate::ledger::{LedgerError, LedgerGateway};
use crate::observability::metrics;
use crate::operation::{Operation, OperationKind};
use crate::submission::SubmissionError;
use crate::verification::{ChallengeRegistry, ChallengeResponse};

#[derive(Clone)]
pub struct TransactionSubmitter {
    ledger: Arc<dyn LedgerGateway>,
    challenges: ChallengeRegistry,
}

impl TransactionSubmitter {
    pub fn new(ledger: Arc<dyn LedgerGateway>, challenges: ChallengeRegistry) -> Self {
        Self { ledger, challenges }
    }

    /// Submit `operation` backed by `challenge`.
    pub async fn submit(
        &self,
        operation: &Operation,
        challenge: &ChallengeResponse,
    ) -> Result<TxHash, SubmissionError> {
        let fingerprint = operation.fingerprint();
        let reservation = match self.challenges.reserve(challenge, fingerprint, operation.sender) {
            Ok(reservation) => reservation,
            Err(rejection) => {
                metrics::record_submission("challenge_mismatch");
                tracing::warn!(
                    fingerprint = %fingerprint,
                    kind = operation.kind_name(),
                    reason = %rejection,
                    "Challenge rejected at submission"
                );
                return Err(SubmissionError::ChallengeMismatch(rejection));
            }
        };

        match self.ledger.submit(operation).await {
            Ok(hash) => {
                reservation.consume();
                metrics::record_submission("accepted");
                tracing::info!(
                    tx_hash = %hash,
                    fingerprint = %fingerprint,
                    kind = operation.kind_name(),
                    "Operation submitted"
                );
                Ok(hash)
            }
            Err(LedgerError::Rejected(reason)) => {
                reservation.consume();
                metrics::record_submission("rejected");
                tracing::warn!(
                    fingerprint = %fingerprint,
                    kind = operation.kind_name(),
                    reason = %reason,
                    "Node rejected operation"
                );
                Err(SubmissionError::NodeRejected(reason))
            }
            Err(LedgerError::Unavailable(reason)) => {
                // Reservation drops here; the challenge can back a retry.
                metrics::record_submission("unavailable");
                tracing::warn!(
                    fingerprint = %fingerprint,
                    kind = operation.kind_name(),
                    error = %reason,
                    "Node unavailable"
                );
                Err(SubmissionError::NodeUnavailable(reason))
            }
            Err(LedgerError::Ambiguous(reason))
                if matches!(operation.kind, OperationKind::Create { .. }) =>
            {
                metrics::record_submission("ambiguous");
                tracing::warn!(
                    fingerprint = %fingerprint,
                    kind = operation.kind_name(),
                    error = %reason,
                    "Broadcast outcome unknown, creation may be resent"
                );
                Err(SubmissionError::NodeUnavailable(reason))
            }
            Err(LedgerError::Ambiguous(reason)) => {
                reservation.consume();
                metrics::record_submission("ambiguous");
                tracing::warn!(
                    fingerprint = %fingerprint,
                    kind = operation.kind_name(),
                    error = %reason,
                    "Broadcast outcome unknown, not resending"
                );
                Err(SubmissionError::OutcomeUnknown(reason))
            }
        }
    }
}
