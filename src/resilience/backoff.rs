//! Delay between retry attempts.

use rand::Rng;
use std::time::Duration;

use crate::resilience::retries::RetryPolicy;

impl RetryPolicy {
    /// Delay to wait after failed attempt number `attempt` (1-based).
    ///
    /// Doubles from `base_delay_ms`, capped at `max_delay_ms`, plus up to 10%
    /// jitter so that callers failing together do not retry together.
    pub fn backoff(&self, attempt: u32) -> Duration {
        if attempt == 0 || self.base_delay_ms == 0 {
            return Duration::ZERO;
        }

        let factor = 1u64.checked_shl(attempt - 1).unwrap_or(u64::MAX);
        let capped = self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms);

        let spread = capped / 10;
        let jitter = match spread {
            0 => 0,
            n => rand::thread_rng().gen_range(0..n),
        };
        Duration::from_millis(capped + jitter)
    }
}
