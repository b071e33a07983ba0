//! Timeout enforcement.
//!
//! Wraps external calls in a Tokio deadline. The elapsed case is a distinct
//! error so callers can map it to their own "unavailable" variant.

use std::future::Future;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("deadline of {0:?} elapsed")]
pub struct DeadlineElapsed(pub Duration);

/// Await `fut`, giving up after `deadline`.
pub async fn with_deadline<F>(deadline: Duration, fut: F) -> Result<F::Output, DeadlineElapsed>
where
    F: Future,
{
    tokio::time::timeout(deadline, fut)
        .await
        .map_err(|_| DeadlineElapsed(deadline))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_deadline_elapsed() {
        let result = with_deadline(Duration::from_secs(10), async {
            tokio::time::sleep(Duration::from_secs(11)).await;
        })
        .await;
        assert_eq!(result.unwrap_err(), DeadlineElapsed(Duration::from_secs(10)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_completes_in_time() {
        let result = with_deadline(Duration::from_secs(10), async { 7 }).await;
        assert_eq!(result.unwrap(), 7);
    }
}
