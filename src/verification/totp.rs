//! Time-based one-time codes (RFC 6238 with HMAC-SHA256).

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::config::VerificationConfig;

type HmacSha256 = Hmac<Sha256>;

/// How many steps behind the skew window a code is still recognised as
/// "expired" rather than "invalid".
const EXPIRED_LOOKBACK_STEPS: u64 = 10;

/// Why a code was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TotpRejection {
    Invalid,
    Expired,
    Replayed,
}

/// TOTP parameters.
#[derive(Debug, Clone, Copy)]
pub struct Totp {
    pub step_secs: u64,
    pub digits: u32,
    pub skew_steps: u64,
}

impl Totp {
    pub fn from_config(config: &VerificationConfig) -> Self {
        Self {
            step_secs: config.totp_step_secs,
            digits: config.totp_digits,
            skew_steps: config.totp_skew_steps,
        }
    }

    pub fn step_at(&self, unix_secs: u64) -> u64 {
        unix_secs / self.step_secs
    }

    /// Zero-padded code for `step`.
    pub fn code_for_step(&self, secret: &[u8], step: u64) -> String {
        let mut mac = match HmacSha256::new_from_slice(secret) {
            Ok(mac) => mac,
            // HMAC accepts keys of any length
            Err(_) => return String::new(),
        };
        mac.update(&step.to_be_bytes());
        let digest = mac.finalize().into_bytes();

        let offset = (digest[digest.len() - 1] & 0x0f) as usize;
        let binary = ((u32::from(digest[offset]) & 0x7f) << 24)
            | (u32::from(digest[offset + 1]) << 16)
            | (u32::from(digest[offset + 2]) << 8)
            | u32::from(digest[offset + 3]);
        let code = binary % 10u32.pow(self.digits);
        format!("{:0width$}", code, width = self.digits as usize)
    }

    pub fn code_at(&self, secret: &[u8], unix_secs: u64) -> String {
        self.code_for_step(secret, self.step_at(unix_secs))
    }

    /// Check `code` at time `now`. Returns the matched step on success.
    ///
    /// `last_used_step` is the replay guard: a step at or before it is
    /// refused even if the code is otherwise valid.
    pub fn verify(
        &self,
        secret: &[u8],
        code: &str,
        now: u64,
        last_used_step: Option<u64>,
    ) -> Result<u64, TotpRejection> {
        let current = self.step_at(now);
        let window_start = current.saturating_sub(self.skew_steps);
        let window_end = current + self.skew_steps;

        for step in window_start..=window_end {
            if self.code_for_step(secret, step) == code {
                if last_used_step.is_some_and(|last| step <= last) {
                    return Err(TotpRejection::Replayed);
                }
                return Ok(step);
            }
        }

        let lookback_start = window_start.saturating_sub(EXPIRED_LOOKBACK_STEPS);
        for step in lookback_start..window_start {
            if self.code_for_step(secret, step) == code {
                return Err(TotpRejection::Expired);
            }
        }

        Err(TotpRejection::Invalid)
    }
}
