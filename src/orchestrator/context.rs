//! Per-call context and status delivery.

use alloy::primitives::Address;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::tracking::StatusEvent;

/// Receives the ordered status events of an operation.
pub trait StatusSink: Send + Sync {
    fn on_status(&self, event: &StatusEvent);
}

impl StatusSink for mpsc::UnboundedSender<StatusEvent> {
    fn on_status(&self, event: &StatusEvent) {
        // A closed receiver means the caller stopped listening.
        let _ = self.send(event.clone());
    }
}

/// Drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl StatusSink for NoopSink {
    fn on_status(&self, _event: &StatusEvent) {}
}

/// Who is acting, and how to reach them with progress.
#[derive(Clone)]
pub struct OperationContext {
    /// Wallet that signs and sends the operation.
    pub subject: Address,
    pub correlation_id: Uuid,
    sink: Arc<dyn StatusSink>,
}

impl OperationContext {
    pub fn new(subject: Address) -> Self {
        Self {
            subject,
            correlation_id: Uuid::new_v4(),
            sink: Arc::new(NoopSink),
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn StatusSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn sink(&self) -> Arc<dyn StatusSink> {
        self.sink.clone()
    }
}

impl fmt::Debug for OperationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationContext")
            .field("subject", &self.subject)
            .field("correlation_id", &self.correlation_id)
            .finish()
    }
}
