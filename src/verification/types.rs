//! Verification request/response types and error definitions.

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::operation::OperationFingerprint;
use crate::resilience::Retryable;

/// Kind of secondary-factor secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretKind {
    Pin,
    Totp,
    BackupCode,
}

impl SecretKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecretKind::Pin => "pin",
            SecretKind::Totp => "totp",
            SecretKind::BackupCode => "backup_code",
        }
    }
}

impl fmt::Display for SecretKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Secret typed by the user. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretMaterial(String);

impl SecretMaterial {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretMaterial(<redacted>)")
    }
}

/// A secret plus the kind it claims to be.
#[derive(Debug, Clone)]
pub struct Secret {
    pub kind: SecretKind,
    pub material: SecretMaterial,
}

impl Secret {
    pub fn pin(value: impl Into<String>) -> Self {
        Self {
            kind: SecretKind::Pin,
            material: SecretMaterial::new(value),
        }
    }

    pub fn totp(value: impl Into<String>) -> Self {
        Self {
            kind: SecretKind::Totp,
            material: SecretMaterial::new(value),
        }
    }

    pub fn backup_code(value: impl Into<String>) -> Self {
        Self {
            kind: SecretKind::BackupCode,
            material: SecretMaterial::new(value),
        }
    }
}

/// One authorization attempt. Consumed by value so it cannot be reused.
#[derive(Debug, Clone)]
pub struct VerificationRequest {
    pub subject: Address,
    pub secret: Secret,
    pub fingerprint: OperationFingerprint,
}

/// Opaque challenge token.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChallengeToken(pub String);

impl fmt::Debug for ChallengeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // First 8 hex chars are enough to correlate logs.
        let prefix: String = self.0.chars().take(8).collect();
        write!(f, "ChallengeToken({}…)", prefix)
    }
}

/// Proof that a subject supplied a valid secret for one operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeResponse {
    pub token: ChallengeToken,
    pub subject: Address,
    pub fingerprint: OperationFingerprint,
    /// Unix seconds.
    pub expires_at: u64,
}

/// Errors returned by the verification issuer.
///
/// All of them end the attempt; a new secret must come from the user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerificationError {
    #[error("invalid secret")]
    InvalidSecret,

    #[error("secret does not match the {kind} format: {reason}")]
    MalformedSecret { kind: SecretKind, reason: String },

    #[error("one-time code has expired")]
    SecretExpired,

    #[error("secret has already been used")]
    SecretAlreadyUsed,

    #[error("no {kind} configured for {subject}")]
    NotEnrolled { subject: Address, kind: SecretKind },

    #[error("verification service unavailable: {0}")]
    Unavailable(String),
}

impl VerificationError {
    pub fn label(&self) -> &'static str {
        match self {
            VerificationError::InvalidSecret => "invalid",
            VerificationError::MalformedSecret { .. } => "malformed",
            VerificationError::SecretExpired => "expired",
            VerificationError::SecretAlreadyUsed => "already_used",
            VerificationError::NotEnrolled { .. } => "not_enrolled",
            VerificationError::Unavailable(_) => "unavailable",
        }
    }
}

impl Retryable for VerificationError {
    fn is_retryable(&self) -> bool {
        false
    }
}

pub type VerificationResult<T> = Result<T, VerificationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_is_redacted() {
        let secret = Secret::pin("123456");
        let printed = format!("{:?}", secret);
        assert!(!printed.contains("123456"));
        assert!(printed.contains("redacted"));
    }

    #[test]
    fn test_token_debug_is_truncated() {
        let token = ChallengeToken("deadbeefcafebabe0011".into());
        assert_eq!(format!("{:?}", token), "ChallengeToken(deadbeef…)");
    }

    #[test]
    fn test_error_display() {
        let err = VerificationError::NotEnrolled {
            subject: Address::ZERO,
            kind: SecretKind::Totp,
        };
        assert!(err.to_string().contains("no totp configured"));
        assert!(!err.is_retryable());
    }
}
