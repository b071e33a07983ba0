//! Registry of issued challenge responses.
//!
//! # Lifecycle
//! ```text
//! issue() → Issued
//! reserve() → Reserved (one submission in flight)
//!     → consume() → Consumed (kept until expiry so replays are recognised)
//!     → drop without consume → back to Issued
//! purge_expired() removes entries past their expiry
//! ```

use alloy::hex;
use alloy::primitives::Address;
use dashmap::DashMap;
use rand::RngCore;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

use crate::operation::OperationFingerprint;
use crate::verification::types::{ChallengeResponse, ChallengeToken};

/// Why a challenge could not back a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ChallengeRejection {
    #[error("challenge was issued for a different operation")]
    WrongOperation,

    #[error("challenge has expired")]
    Expired,

    #[error("challenge has already been used")]
    AlreadyUsed,

    #[error("challenge is being used by another submission")]
    InUse,

    #[error("challenge is unknown")]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChallengeState {
    Issued,
    Reserved,
    Consumed,
}

#[derive(Debug, Clone)]
struct IssuedChallenge {
    subject: Address,
    fingerprint: OperationFingerprint,
    expires_at: u64,
    state: ChallengeState,
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Shared between the issuer (writes) and the submitter (redeems).
#[derive(Clone)]
pub struct ChallengeRegistry {
    inner: Arc<DashMap<ChallengeToken, IssuedChallenge>>,
    ttl: Duration,
}

impl ChallengeRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            ttl,
        }
    }

    pub fn issue(&self, subject: Address, fingerprint: OperationFingerprint) -> ChallengeResponse {
        self.issue_at(subject, fingerprint, unix_now())
    }

    pub(crate) fn issue_at(
        &self,
        subject: Address,
        fingerprint: OperationFingerprint,
        now: u64,
    ) -> ChallengeResponse {
        let mut raw = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut raw);
        let token = ChallengeToken(hex::encode(raw));
        let expires_at = now + self.ttl.as_secs();

        self.inner.insert(
            token.clone(),
            IssuedChallenge {
                subject,
                fingerprint,
                expires_at,
                state: ChallengeState::Issued,
            },
        );

        ChallengeResponse {
            token,
            subject,
            fingerprint,
            expires_at,
        }
    }

    /// Reserve the challenge for one submission of the operation with
    /// `fingerprint` sent by `sender`.
    ///
    /// The stored binding is authoritative; the fingerprint carried inside
    /// the response is not trusted.
    pub fn reserve(
        &self,
        response: &ChallengeResponse,
        fingerprint: OperationFingerprint,
        sender: Address,
    ) -> Result<ChallengeReservation, ChallengeRejection> {
        self.reserve_at(response, fingerprint, sender, unix_now())
    }

    pub(crate) fn reserve_at(
        &self,
        response: &ChallengeResponse,
        fingerprint: OperationFingerprint,
        sender: Address,
        now: u64,
    ) -> Result<ChallengeReservation, ChallengeRejection> {
        let mut entry = self
            .inner
            .get_mut(&response.token)
            .ok_or(ChallengeRejection::Unknown)?;

        if entry.fingerprint != fingerprint || entry.subject != sender {
            return Err(ChallengeRejection::WrongOperation);
        }
        match entry.state {
            ChallengeState::Consumed => return Err(ChallengeRejection::AlreadyUsed),
            ChallengeState::Reserved => return Err(ChallengeRejection::InUse),
            ChallengeState::Issued => {}
        }
        if now >= entry.expires_at {
            return Err(ChallengeRejection::Expired);
        }

        entry.state = ChallengeState::Reserved;
        Ok(ChallengeReservation {
            registry: self.inner.clone(),
            token: response.token.clone(),
            consumed: false,
        })
    }

    /// Drop entries whose expiry has passed. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(unix_now())
    }

    pub(crate) fn purge_expired_at(&self, now: u64) -> usize {
        // Counted inside retain: issue() may insert while shards are swept.
        let mut purged = 0;
        self.inner.retain(|_, c| {
            let keep = c.expires_at > now || c.state == ChallengeState::Reserved;
            if !keep {
                purged += 1;
            }
            keep
        });
        purged
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// RAII reservation of a challenge. Dropping it without [`consume`]
/// returns the challenge to the issued state.
///
/// [`consume`]: ChallengeReservation::consume
#[derive(Debug)]
pub struct ChallengeReservation {
    registry: Arc<DashMap<ChallengeToken, IssuedChallenge>>,
    token: ChallengeToken,
    consumed: bool,
}

impl ChallengeReservation {
    /// Mark the challenge as spent.
    pub fn consume(mut self) {
        if let Some(mut entry) = self.registry.get_mut(&self.token) {
            entry.state = ChallengeState::Consumed;
        }
        self.consumed = true;
    }
}

impl Drop for ChallengeReservation {
    fn drop(&mut self) {
        if self.consumed {
            return;
        }
        if let Some(mut entry) = self.registry.get_mut(&self.token) {
            if entry.state == ChallengeState::Reserved {
                entry.state = ChallengeState::Issued;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::B256;

    fn fp(byte: u8) -> OperationFingerprint {
        OperationFingerprint(B256::repeat_byte(byte))
    }

    const NOW: u64 = 1_700_000_000;

    #[test]
    fn test_fingerprint_binding() {
        let registry = ChallengeRegistry::new(Duration::from_secs(300));
        let subject = Address::repeat_byte(1);
        let response = registry.issue_at(subject, fp(0xa), NOW);

        let err = registry.reserve_at(&response, fp(0xb), subject, NOW).unwrap_err();
        assert_eq!(err, ChallengeRejection::WrongOperation);

        // The mismatch did not burn the challenge.
        assert!(registry.reserve_at(&response, fp(0xa), subject, NOW).is_ok());
    }

    #[test]
    fn test_single_use() {
        let registry = ChallengeRegistry::new(Duration::from_secs(300));
        let subject = Address::repeat_byte(1);
        let response = registry.issue_at(subject, fp(0xa), NOW);

        registry.reserve_at(&response, fp(0xa), subject, NOW).unwrap().consume();
        let err = registry.reserve_at(&response, fp(0xa), subject, NOW).unwrap_err();
        assert_eq!(err, ChallengeRejection::AlreadyUsed);
    }

    #[test]
    fn test_reservation_released_on_drop() {
        let registry = ChallengeRegistry::new(Duration::from_secs(300));
        let subject = Address::repeat_byte(1);
        let response = registry.issue_at(subject, fp(0xa), NOW);

        let held = registry.reserve_at(&response, fp(0xa), subject, NOW).unwrap();
        assert_eq!(
            registry.reserve_at(&response, fp(0xa), subject, NOW).unwrap_err(),
            ChallengeRejection::InUse
        );
        drop(held);
        assert!(registry.reserve_at(&response, fp(0xa), subject, NOW).is_ok());
    }

    #[test]
    fn test_expiry_and_purge() {
        let registry = ChallengeRegistry::new(Duration::from_secs(300));
        let subject = Address::repeat_byte(1);
        let response = registry.issue_at(subject, fp(0xa), NOW);

        let err = registry.reserve_at(&response, fp(0xa), subject, NOW + 300).unwrap_err();
        assert_eq!(err, ChallengeRejection::Expired);

        assert_eq!(registry.purge_expired_at(NOW + 299), 0);
        assert_eq!(registry.purge_expired_at(NOW + 301), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_wrong_sender() {
        let registry = ChallengeRegistry::new(Duration::from_secs(300));
        let response = registry.issue_at(Address::repeat_byte(1), fp(0xa), NOW);
        let err = registry
            .reserve_at(&response, fp(0xa), Address::repeat_byte(2), NOW)
            .unwrap_err();
        assert_eq!(err, ChallengeRejection::WrongOperation);
    }

    #[test]
    fn test_purge_while_issuing() {
        let registry = ChallengeRegistry::new(Duration::from_secs(300));
        let issued_per_thread = 500;

        let purged: usize = std::thread::scope(|scope| {
            for t in 0..4u8 {
                let registry = registry.clone();
                scope.spawn(move || {
                    for _ in 0..issued_per_thread {
                        registry.issue_at(Address::repeat_byte(t + 1), fp(t), 0);
                    }
                });
            }
            let sweeper = scope.spawn(|| {
                (0..200)
                    .map(|_| registry.purge_expired_at(NOW))
                    .sum::<usize>()
            });
            sweeper.join().unwrap()
        });

        let leftover = registry.purge_expired_at(NOW);
        assert_eq!(purged + leftover, 4 * issued_per_thread);
        assert!(registry.is_empty());
    }
}
