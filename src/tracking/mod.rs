//! Transaction tracking subsystem.
//!
//! # Data Flow
//! ```text
//! TxHash from the submitter
//!     → tracker.rs (one polling task per hash)
//!         → LedgerGateway::receipt until mined or reverted
//!         → SecondaryIndex::is_indexed until the index catches up
//!     → StatusEvent broadcast + history
//!     → stream.rs (replay, then live, ends after terminal)
//! ```

pub mod stream;
pub mod tracker;
pub mod types;

pub use stream::StatusStream;
pub use tracker::TransactionTracker;
pub use types::{StatusEvent, TrackedTransaction, TxStatus};
