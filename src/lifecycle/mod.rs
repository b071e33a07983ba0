//! Lifecycle management subsystem.
//!
//! Long-running tasks (reconciler sweep, tracker tasks spawned by the CLI)
//! subscribe to a broadcast shutdown signal and exit their loops when it
//! fires.

pub mod shutdown;

pub use shutdown::Shutdown;
