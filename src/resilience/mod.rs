//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to an external boundary (node, indexer, verifier):
//!     → timeouts.rs (enforce deadline)
//!     → On failure: retries.rs (check if retryable, retry with backoff)
//!     → backoff.rs (exponential delay with jitter)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - Only errors that declare themselves retryable are retried
//! - Attempt counts are bounded by configuration

pub mod backoff;
pub mod retries;
pub mod timeouts;

pub use retries::{retry_with_backoff, RetryPolicy, Retryable};
pub use timeouts::{with_deadline, DeadlineElapsed};
