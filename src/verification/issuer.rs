//! Verification issuer: secret in, operation-bound challenge out.
//!
//! # Responsibilities
//! - Check the secret's format for its kind
//! - Verify it against the subject's enrollment
//! - Enforce single use (backup codes) and replay protection (TOTP)
//! - Issue a short-lived challenge bound to the operation fingerprint

use alloy::primitives::Address;
use async_trait::async_trait;
use std::time::Duration;

use crate::config::VerificationConfig;
use crate::observability::metrics;
use crate::verification::challenge::{unix_now, ChallengeRegistry};
use crate::verification::enrollment::{normalize_backup_code, EnrollmentStore};
use crate::verification::totp::{Totp, TotpRejection};
use crate::verification::types::{
    ChallengeResponse, SecretKind, VerificationError, VerificationRequest, VerificationResult,
};

/// Verification boundary.
#[async_trait]
pub trait VerificationIssuer: Send + Sync {
    /// Exchange a secret for a challenge bound to `request.fingerprint`.
    async fn authorize(&self, request: VerificationRequest) -> VerificationResult<ChallengeResponse>;
}

/// Issuer backed by an in-process enrollment store.
#[derive(Clone)]
pub struct LocalVerificationIssuer {
    config: VerificationConfig,
    totp: Totp,
    enrollments: EnrollmentStore,
    challenges: ChallengeRegistry,
}

impl LocalVerificationIssuer {
    pub fn new(config: VerificationConfig, enrollments: EnrollmentStore) -> Self {
        let challenges = ChallengeRegistry::new(Duration::from_secs(config.challenge_ttl_secs));
        Self {
            totp: Totp::from_config(&config),
            config,
            enrollments,
            challenges,
        }
    }

    /// Registry the submitter redeems challenges against.
    pub fn challenges(&self) -> ChallengeRegistry {
        self.challenges.clone()
    }

    pub fn enrollments(&self) -> &EnrollmentStore {
        &self.enrollments
    }

    /// Enroll a PIN after checking it has the configured shape.
    pub fn enroll_pin(&self, subject: Address, pin: &str) -> VerificationResult<()> {
        self.check_format(SecretKind::Pin, pin)?;
        self.enrollments.enroll_pin(subject, pin)
    }

    fn check_format(&self, kind: SecretKind, material: &str) -> VerificationResult<()> {
        let malformed = |reason: String| VerificationError::MalformedSecret { kind, reason };
        match kind {
            SecretKind::Pin => {
                if material.len() != self.config.pin_length
                    || !material.chars().all(|c| c.is_ascii_digit())
                {
                    return Err(malformed(format!("expected {} digits", self.config.pin_length)));
                }
            }
            SecretKind::Totp => {
                let digits = self.config.totp_digits as usize;
                if material.len() != digits || !material.chars().all(|c| c.is_ascii_digit()) {
                    return Err(malformed(format!("expected {} digits", digits)));
                }
            }
            SecretKind::BackupCode => {
                let normalized = normalize_backup_code(material);
                if !(8..=16).contains(&normalized.len())
                    || !normalized.chars().all(|c| c.is_ascii_alphanumeric())
                {
                    return Err(malformed("expected 8-16 letters or digits".to_string()));
                }
            }
        }
        Ok(())
    }

    fn verify_secret(&self, request: &VerificationRequest, now: u64) -> VerificationResult<()> {
        let kind = request.secret.kind;
        let material = request.secret.material.expose().trim();
        self.check_format(kind, material)?;

        let not_enrolled = || VerificationError::NotEnrolled {
            subject: request.subject,
            kind,
        };
        let totp = self.totp;

        self.enrollments
            .with_enrollment(&request.subject, |enrollment| {
                if !enrollment.has(kind) {
                    return Err(not_enrolled());
                }
                match kind {
                    SecretKind::Pin => {
                        if enrollment.check_pin(material) {
                            Ok(())
                        } else {
                            Err(VerificationError::InvalidSecret)
                        }
                    }
                    SecretKind::Totp => {
                        let Some(state) = enrollment.totp.as_mut() else {
                            return Err(not_enrolled());
                        };
                        match totp.verify(&state.secret, material, now, state.last_used_step) {
                            Ok(step) => {
                                state.last_used_step = Some(step);
                                Ok(())
                            }
                            Err(TotpRejection::Expired) => Err(VerificationError::SecretExpired),
                            Err(TotpRejection::Replayed) => Err(VerificationError::SecretAlreadyUsed),
                            Err(TotpRejection::Invalid) => Err(VerificationError::InvalidSecret),
                        }
                    }
                    SecretKind::BackupCode => {
                        if enrollment.take_backup_code(material) {
                            Ok(())
                        } else {
                            // Used codes are removed, so reuse and a typo
                            // look the same from here.
                            Err(VerificationError::SecretAlreadyUsed)
                        }
                    }
                }
            })
            .unwrap_or_else(|| Err(not_enrolled()))
    }

    pub(crate) fn authorize_at(
        &self,
        request: VerificationRequest,
        now: u64,
    ) -> VerificationResult<ChallengeResponse> {
        let kind = request.secret.kind;
        match self.verify_secret(&request, now) {
            Ok(()) => {
                let response = self
                    .challenges
                    .issue_at(request.subject, request.fingerprint, now);
                metrics::record_verification(kind.as_str(), "issued");
                tracing::info!(
                    subject = %request.subject,
                    kind = %kind,
                    fingerprint = %request.fingerprint,
                    expires_at = response.expires_at,
                    "Challenge issued"
                );
                Ok(response)
            }
            Err(e) => {
                metrics::record_verification(kind.as_str(), e.label());
                tracing::warn!(
                    subject = %request.subject,
                    kind = %kind,
                    reason = e.label(),
                    "Verification rejected"
                );
                Err(e)
            }
        }
    }
}

#[async_trait]
impl VerificationIssuer for LocalVerificationIssuer {
    async fn authorize(&self, request: VerificationRequest) -> VerificationResult<ChallengeResponse> {
        self.authorize_at(request, unix_now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::OperationFingerprint;
    use crate::verification::types::Secret;
    use alloy::primitives::B256;

    const TOTP_SECRET: &[u8] = b"an-issuer-totp-shared-secret-000";

    fn issuer() -> LocalVerificationIssuer {
        LocalVerificationIssuer::new(VerificationConfig::default(), EnrollmentStore::new())
    }

    fn request(subject: Address, secret: Secret) -> VerificationRequest {
        VerificationRequest {
            subject,
            secret,
            fingerprint: OperationFingerprint(B256::repeat_byte(0x42)),
        }
    }

    #[tokio::test]
    async fn test_pin_issues_bound_challenge() {
        let issuer = issuer();
        let subject = Address::repeat_byte(1);
        issuer.enroll_pin(subject, "123456").unwrap();

        let response = issuer.authorize(request(subject, Secret::pin("123456"))).await.unwrap();
        assert_eq!(response.fingerprint, OperationFingerprint(B256::repeat_byte(0x42)));
        assert_eq!(response.subject, subject);
        assert_eq!(issuer.challenges().len(), 1);
    }

    #[tokio::test]
    async fn test_pin_errors() {
        let issuer = issuer();
        let subject = Address::repeat_byte(1);

        let err = issuer.authorize(request(subject, Secret::pin("123456"))).await.unwrap_err();
        assert!(matches!(err, VerificationError::NotEnrolled { .. }));

        issuer.enroll_pin(subject, "123456").unwrap();
        let err = issuer.authorize(request(subject, Secret::pin("12345"))).await.unwrap_err();
        assert!(matches!(err, VerificationError::MalformedSecret { .. }));

        let err = issuer.authorize(request(subject, Secret::pin("999999"))).await.unwrap_err();
        assert_eq!(err, VerificationError::InvalidSecret);
        assert!(issuer.challenges().is_empty());
    }

    #[test]
    fn test_enroll_pin_checks_format() {
        let issuer = issuer();
        assert!(issuer.enroll_pin(Address::ZERO, "12ab56").is_err());
    }

    #[test]
    fn test_totp_replay_and_expiry() {
        let issuer = issuer();
        let subject = Address::repeat_byte(2);
        issuer.enrollments().enroll_totp(subject, TOTP_SECRET.to_vec());
        let now = 1_700_000_000;
        let totp = Totp::from_config(&VerificationConfig::default());

        let code = totp.code_at(TOTP_SECRET, now);
        assert!(issuer.authorize_at(request(subject, Secret::totp(code.clone())), now).is_ok());

        let err = issuer.authorize_at(request(subject, Secret::totp(code)), now).unwrap_err();
        assert_eq!(err, VerificationError::SecretAlreadyUsed);

        let stale = totp.code_at(TOTP_SECRET, now - 240);
        let window: Vec<String> = [now - 30, now, now + 30]
            .iter()
            .map(|t| totp.code_at(TOTP_SECRET, *t))
            .collect();
        if !window.contains(&stale) {
            let err = issuer.authorize_at(request(subject, Secret::totp(stale)), now).unwrap_err();
            assert_eq!(err, VerificationError::SecretExpired);
        }
    }

    #[tokio::test]
    async fn test_backup_code_single_use() {
        let issuer = issuer();
        let subject = Address::repeat_byte(3);
        issuer
            .enrollments()
            .enroll_backup_codes(subject, ["K7QF-29XM", "P3LD-81ZA"]);

        assert!(issuer
            .authorize(request(subject, Secret::backup_code("k7qf-29xm")))
            .await
            .is_ok());
        let err = issuer
            .authorize(request(subject, Secret::backup_code("K7QF-29XM")))
            .await
            .unwrap_err();
        assert_eq!(err, VerificationError::SecretAlreadyUsed);
        assert_eq!(issuer.enrollments().remaining_backup_codes(&subject), 1);
    }

    #[tokio::test]
    async fn test_last_backup_code_reuse_is_already_used() {
        let issuer = issuer();
        let subject = Address::repeat_byte(3);
        issuer.enrollments().enroll_backup_codes(subject, ["K7QF-29XM"]);

        assert!(issuer
            .authorize(request(subject, Secret::backup_code("K7QF-29XM")))
            .await
            .is_ok());
        assert_eq!(issuer.enrollments().remaining_backup_codes(&subject), 0);

        let err = issuer
            .authorize(request(subject, Secret::backup_code("K7QF-29XM")))
            .await
            .unwrap_err();
        assert_eq!(err, VerificationError::SecretAlreadyUsed);
    }
}
