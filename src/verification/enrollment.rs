//! Per-subject secondary-factor enrollment.
//!
//! # Security
//! - PINs are stored as HMAC-SHA256 digests keyed by a random per-subject salt
//! - Backup codes are stored as SHA-256 digests and removed on use
//! - TOTP secrets are held in memory only and never logged

use alloy::primitives::Address;
use dashmap::DashMap;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::verification::types::{SecretKind, VerificationError, VerificationResult};

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone)]
struct PinDigest {
    salt: [u8; 16],
    digest: Vec<u8>,
}

#[derive(Clone)]
pub(crate) struct TotpEnrollment {
    pub(crate) secret: Vec<u8>,
    /// Replay guard: last step a code was accepted for.
    pub(crate) last_used_step: Option<u64>,
}

#[derive(Clone, Default)]
pub(crate) struct Enrollment {
    pin: Option<PinDigest>,
    pub(crate) totp: Option<TotpEnrollment>,
    /// `None` until codes are enrolled; stays `Some` once they are all spent.
    backup_codes: Option<Vec<[u8; 32]>>,
}

impl Enrollment {
    pub(crate) fn has(&self, kind: SecretKind) -> bool {
        match kind {
            SecretKind::Pin => self.pin.is_some(),
            SecretKind::Totp => self.totp.is_some(),
            SecretKind::BackupCode => self.backup_codes.is_some(),
        }
    }

    pub(crate) fn check_pin(&self, pin: &str) -> bool {
        let Some(stored) = &self.pin else {
            return false;
        };
        match HmacSha256::new_from_slice(&stored.salt) {
            Ok(mut mac) => {
                mac.update(pin.as_bytes());
                mac.verify_slice(&stored.digest).is_ok()
            }
            Err(_) => false,
        }
    }

    /// Remove `code` if present. Returns whether it was.
    pub(crate) fn take_backup_code(&mut self, code: &str) -> bool {
        let Some(codes) = self.backup_codes.as_mut() else {
            return false;
        };
        let digest = backup_digest(code);
        match codes.iter().position(|c| *c == digest) {
            Some(idx) => {
                codes.swap_remove(idx);
                true
            }
            None => false,
        }
    }
}

/// Normalize a backup code: drop separators and whitespace, uppercase.
pub fn normalize_backup_code(code: &str) -> String {
    code.chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

fn backup_digest(code: &str) -> [u8; 32] {
    Sha256::digest(normalize_backup_code(code).as_bytes()).into()
}

/// Thread-safe enrollment registry keyed by subject wallet.
#[derive(Clone, Default)]
pub struct EnrollmentStore {
    inner: Arc<DashMap<Address, Enrollment>>,
}

impl EnrollmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set or replace the subject's PIN. Format is checked by the caller.
    pub fn enroll_pin(&self, subject: Address, pin: &str) -> VerificationResult<()> {
        let mut salt = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut salt);
        let mut mac = HmacSha256::new_from_slice(&salt)
            .map_err(|e| VerificationError::Unavailable(e.to_string()))?;
        mac.update(pin.as_bytes());
        let digest = mac.finalize().into_bytes().to_vec();

        self.inner.entry(subject).or_default().pin = Some(PinDigest { salt, digest });
        tracing::info!(subject = %subject, "PIN enrolled");
        Ok(())
    }

    /// Set or replace the subject's TOTP shared secret.
    pub fn enroll_totp(&self, subject: Address, secret: Vec<u8>) {
        self.inner.entry(subject).or_default().totp = Some(TotpEnrollment {
            secret,
            last_used_step: None,
        });
        tracing::info!(subject = %subject, "TOTP enrolled");
    }

    /// Replace the subject's backup codes.
    pub fn enroll_backup_codes<I, S>(&self, subject: Address, codes: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let digests: Vec<[u8; 32]> = codes.into_iter().map(|c| backup_digest(c.as_ref())).collect();
        let count = digests.len();
        self.inner.entry(subject).or_default().backup_codes = Some(digests);
        tracing::info!(subject = %subject, count, "Backup codes enrolled");
    }

    pub fn remaining_backup_codes(&self, subject: &Address) -> usize {
        self.inner
            .get(subject)
            .and_then(|e| e.backup_codes.as_ref().map(Vec::len))
            .unwrap_or(0)
    }

    /// Run `f` with exclusive access to the subject's enrollment.
    ///
    /// The shard lock serializes concurrent attempts for the same subject,
    /// which is what makes backup codes and the TOTP replay guard single-use.
    pub(crate) fn with_enrollment<T>(
        &self,
        subject: &Address,
        f: impl FnOnce(&mut Enrollment) -> T,
    ) -> Option<T> {
        self.inner.get_mut(subject).map(|mut e| f(e.value_mut()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pin_roundtrip() {
        let store = EnrollmentStore::new();
        let subject = Address::repeat_byte(7);
        store.enroll_pin(subject, "123456").unwrap();

        assert_eq!(store.with_enrollment(&subject, |e| e.check_pin("123456")), Some(true));
        assert_eq!(store.with_enrollment(&subject, |e| e.check_pin("654321")), Some(false));
        assert_eq!(store.with_enrollment(&Address::ZERO, |e| e.check_pin("123456")), None);
    }

    #[test]
    fn test_backup_codes_single_use() {
        let store = EnrollmentStore::new();
        let subject = Address::repeat_byte(7);
        store.enroll_backup_codes(subject, ["ABCD-1234", "EFGH-5678"]);
        assert_eq!(store.remaining_backup_codes(&subject), 2);

        assert_eq!(store.with_enrollment(&subject, |e| e.take_backup_code("abcd 1234")), Some(true));
        assert_eq!(store.with_enrollment(&subject, |e| e.take_backup_code("ABCD-1234")), Some(false));
        assert_eq!(store.remaining_backup_codes(&subject), 1);
    }

    #[test]
    fn test_has_kind() {
        let store = EnrollmentStore::new();
        let subject = Address::repeat_byte(7);
        store.enroll_totp(subject, b"secret".to_vec());
        assert_eq!(store.with_enrollment(&subject, |e| e.has(SecretKind::Totp)), Some(true));
        assert_eq!(store.with_enrollment(&subject, |e| e.has(SecretKind::Pin)), Some(false));
    }

    #[test]
    fn test_spent_backup_codes_stay_enrolled() {
        let store = EnrollmentStore::new();
        let subject = Address::repeat_byte(7);
        assert_eq!(store.with_enrollment(&subject, |e| e.has(SecretKind::BackupCode)), None);

        store.enroll_backup_codes(subject, ["ABCD-1234"]);
        assert_eq!(store.with_enrollment(&subject, |e| e.take_backup_code("ABCD-1234")), Some(true));
        assert_eq!(store.remaining_backup_codes(&subject), 0);
        assert_eq!(store.with_enrollment(&subject, |e| e.has(SecretKind::BackupCode)), Some(true));
    }
}
