//! Two-phase create and single-step execution.
//!
//! # Data Flow
//! ```text
//! create(ctx, factory, params, secret)
//!     → predict (retry while unavailable)
//!     → early exit if the key is in flight or confirmed
//!     → authorize (fingerprint of factory, sender, canonical params)
//!     → upsert provisional record
//!     → submit (retry while node unavailable) → attach tx hash
//!     → open tracker → spawned settle task → confirmed | orphaned
//! ```
//!
//! # Design Decisions
//! - Verification happens before the provisional write, so a rejected
//!   secret leaves nothing behind
//! - After the write, every failure path orphans the attempt
//! - Settling runs in its own task; dropping the caller's future does not
//!   strand a provisional record

use alloy::primitives::{Address, TxHash};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::config::OrchestratorConfig;
use crate::operation::{CreationParams, Operation, OperationKind};
use crate::orchestrator::context::{OperationContext, StatusSink};
use crate::orchestrator::CreateError;
use crate::prediction::{AddressPredictor, PredictedAddress};
use crate::resilience::{retry_with_backoff, RetryPolicy};
use crate::store::{
    CreationPayload, Finalization, OffchainRecord, OffchainStore, ProvisionalRecord,
    RecordStatus, UpsertOutcome,
};
use crate::submission::TransactionSubmitter;
use crate::tracking::{StatusEvent, StatusStream, TransactionTracker, TxStatus};
use crate::verification::challenge::unix_now;
use crate::verification::{
    ChallengeResponse, Secret, VerificationIssuer, VerificationRequest,
};

/// A creation that reached the ledger and is being settled.
#[derive(Debug)]
pub struct CreateAttempt {
    pub predicted: PredictedAddress,
    pub tx_hash: TxHash,
    pub attempt: u32,
    settle: JoinHandle<Result<OffchainRecord, CreateError>>,
}

impl CreateAttempt {
    /// Wait for the record to leave the provisional state.
    pub async fn wait(self) -> Result<OffchainRecord, CreateError> {
        self.settle
            .await
            .map_err(|e| CreateError::Aborted(e.to_string()))?
    }
}

/// Coordinates predictor, issuer, submitter, tracker and store.
#[derive(Clone)]
pub struct Orchestrator {
    predictor: AddressPredictor,
    issuer: Arc<dyn VerificationIssuer>,
    submitter: TransactionSubmitter,
    tracker: TransactionTracker,
    store: Arc<dyn OffchainStore>,
    prediction_policy: RetryPolicy,
    submission_policy: RetryPolicy,
}

impl Orchestrator {
    pub fn new(
        predictor: AddressPredictor,
        issuer: Arc<dyn VerificationIssuer>,
        submitter: TransactionSubmitter,
        tracker: TransactionTracker,
        store: Arc<dyn OffchainStore>,
    ) -> Self {
        let defaults = OrchestratorConfig::default();
        Self {
            predictor,
            issuer,
            submitter,
            tracker,
            store,
            prediction_policy: RetryPolicy::new(
                defaults.prediction.max_attempts,
                defaults.prediction.base_delay_ms,
                defaults.prediction.max_delay_ms,
            ),
            submission_policy: RetryPolicy::new(
                defaults.submission.max_attempts,
                defaults.submission.base_delay_ms,
                defaults.submission.max_delay_ms,
            ),
        }
    }

    /// Take retry bounds from configuration.
    pub fn with_config(mut self, config: &OrchestratorConfig) -> Self {
        self.prediction_policy = RetryPolicy::new(
            config.prediction.max_attempts,
            config.prediction.base_delay_ms,
            config.prediction.max_delay_ms,
        );
        self.submission_policy = RetryPolicy::new(
            config.submission.max_attempts,
            config.submission.base_delay_ms,
            config.submission.max_delay_ms,
        );
        self
    }

    pub fn with_policies(mut self, prediction: RetryPolicy, submission: RetryPolicy) -> Self {
        self.prediction_policy = prediction;
        self.submission_policy = submission;
        self
    }

    pub fn tracker(&self) -> &TransactionTracker {
        &self.tracker
    }

    pub fn store(&self) -> Arc<dyn OffchainStore> {
        self.store.clone()
    }

    /// Create a resource and wait until its record is confirmed or orphaned.
    ///
    /// On-chain failure and timeout are not errors: the returned record is
    /// orphaned and carries the reason, which also went through the sink.
    pub async fn create(
        &self,
        ctx: &OperationContext,
        factory: Address,
        params: &CreationParams,
        secret: Secret,
    ) -> Result<OffchainRecord, CreateError> {
        self.begin_create(ctx, factory, params, secret)
            .await?
            .wait()
            .await
    }

    /// Run the create flow up to the point where the transaction is tracked.
    pub async fn begin_create(
        &self,
        ctx: &OperationContext,
        factory: Address,
        params: &CreationParams,
        secret: Secret,
    ) -> Result<CreateAttempt, CreateError> {
        let span = tracing::info_span!(
            "create",
            correlation_id = %ctx.correlation_id,
            subject = %ctx.subject
        );
        self.begin_create_inner(ctx, factory, params, secret)
            .instrument(span)
            .await
    }

    async fn begin_create_inner(
        &self,
        ctx: &OperationContext,
        factory: Address,
        params: &CreationParams,
        secret: Secret,
    ) -> Result<CreateAttempt, CreateError> {
        // 1. predict
        let canonical = params
            .canonicalize()
            .map_err(crate::prediction::PredictionError::from)?;
        let predicted = retry_with_backoff(self.prediction_policy, "predict_address", || {
            self.predictor
                .predict_canonical(factory, ctx.subject, canonical.clone())
        })
        .await?;
        let key = predicted.address;
        let operation = Operation::create(factory, ctx.subject, predicted.params.clone());
        let fingerprint = operation.fingerprint();

        // Fail before spending a secret if the key is taken.
        if let Some(existing) = self.store.get(key).await? {
            match existing.status {
                RecordStatus::Provisional => return Err(CreateError::CreationInProgress { key }),
                RecordStatus::Confirmed => return Err(CreateError::AlreadyConfirmed { key }),
                RecordStatus::Orphaned => {}
            }
        }

        // 2. authorize
        let challenge = self
            .issuer
            .authorize(VerificationRequest {
                subject: ctx.subject,
                secret,
                fingerprint,
            })
            .await?;

        // 3. provisional record
        let draft = ProvisionalRecord {
            key,
            payload: CreationPayload {
                factory,
                sender: ctx.subject,
                params: predicted.params.clone(),
            },
            fingerprint,
        };
        let record = match self.store.upsert_provisional(draft).await? {
            UpsertOutcome::Created(record) | UpsertOutcome::Rearmed(record) => record,
            UpsertOutcome::InProgress(_) => return Err(CreateError::CreationInProgress { key }),
            UpsertOutcome::AlreadyConfirmed(_) => {
                return Err(CreateError::AlreadyConfirmed { key })
            }
        };
        let attempt = record.attempt;

        // 4. submit
        let tx_hash = match self.submit(&operation, &challenge).await {
            Ok(hash) => hash,
            Err(e) => {
                self.store
                    .finalize(
                        key,
                        attempt,
                        Finalization::Orphaned {
                            reason: format!("submission failed: {}", e),
                        },
                    )
                    .await?;
                return Err(e);
            }
        };
        let attached = self
            .store
            .attach_transaction(key, attempt, tx_hash, unix_now())
            .await?;
        if !attached.is_applied() {
            // The transaction exists either way; keep following it for the
            // caller. Settling will leave the record as it now stands.
            let current = attached.record();
            tracing::warn!(
                key = %key,
                attempt,
                tx_hash = %tx_hash,
                status = %current.status,
                current_attempt = current.attempt,
                "Record left this attempt during submission"
            );
        }

        // 5. track, 6/7. settle
        let stream = self.tracker.open(tx_hash, operation.kind_name());
        let settle = tokio::spawn(
            settle(self.store.clone(), key, attempt, stream, ctx.sink()).in_current_span(),
        );

        tracing::info!(key = %key, tx_hash = %tx_hash, attempt, "Creation submitted");
        Ok(CreateAttempt {
            predicted,
            tx_hash,
            attempt,
            settle,
        })
    }

    /// Authorize, submit and track a non-create operation. Returns the
    /// terminal status event.
    pub async fn execute(
        &self,
        ctx: &OperationContext,
        operation: Operation,
        secret: Secret,
    ) -> Result<StatusEvent, CreateError> {
        let span = tracing::info_span!(
            "execute",
            correlation_id = %ctx.correlation_id,
            kind = operation.kind_name()
        );
        self.execute_inner(ctx, operation, secret)
            .instrument(span)
            .await
    }

    async fn execute_inner(
        &self,
        ctx: &OperationContext,
        operation: Operation,
        secret: Secret,
    ) -> Result<StatusEvent, CreateError> {
        if matches!(operation.kind, OperationKind::Create { .. }) {
            return Err(CreateError::InvalidOperation(
                "creations go through create()".to_string(),
            ));
        }
        if operation.sender != ctx.subject {
            return Err(CreateError::InvalidOperation(format!(
                "operation sender {} is not the acting subject {}",
                operation.sender, ctx.subject
            )));
        }

        let challenge = self
            .issuer
            .authorize(VerificationRequest {
                subject: ctx.subject,
                secret,
                fingerprint: operation.fingerprint(),
            })
            .await?;
        let tx_hash = self.submit(&operation, &challenge).await?;
        tracing::info!(tx_hash = %tx_hash, "Operation submitted");

        let mut stream = self.tracker.open(tx_hash, operation.kind_name());
        let sink = ctx.sink();
        while let Some(event) = stream.next().await {
            sink.on_status(&event);
            if event.status.is_terminal() {
                return Ok(event);
            }
        }
        Err(CreateError::TrackingCancelled(tx_hash))
    }

    async fn submit(
        &self,
        operation: &Operation,
        challenge: &ChallengeResponse,
    ) -> Result<TxHash, CreateError> {
        let hash = retry_with_backoff(self.submission_policy, "submit_operation", || {
            self.submitter.submit(operation, challenge)
        })
        .await?;
        Ok(hash)
    }
}

/// Forward tracker events to `sink` and settle the record of `attempt`.
pub(crate) async fn settle(
    store: Arc<dyn OffchainStore>,
    key: Address,
    attempt: u32,
    mut stream: StatusStream,
    sink: Arc<dyn StatusSink>,
) -> Result<OffchainRecord, CreateError> {
    let mut terminal = None;
    while let Some(event) = stream.next().await {
        sink.on_status(&event);
        if event.status.is_terminal() {
            terminal = Some(event);
            break;
        }
    }

    let outcome = match terminal {
        Some(event) if event.status == TxStatus::Confirmed => Finalization::Confirmed,
        Some(event) => Finalization::Orphaned {
            reason: event
                .failure_reason
                .unwrap_or_else(|| event.status.user_message().to_string()),
        },
        None => Finalization::Orphaned {
            reason: "tracking cancelled".to_string(),
        },
    };
    let transition = store.finalize(key, attempt, outcome).await?;
    Ok(transition.record().clone())
}
