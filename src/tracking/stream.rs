//! Caller-facing status stream.

use alloy::primitives::TxHash;
use futures_util::Stream;
use std::collections::VecDeque;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use crate::tracking::types::StatusEvent;

/// Ordered status events for one hash.
///
/// Starts with every event emitted before the subscription, then follows
/// live. Ends after a terminal event, or without one if tracking was
/// cancelled.
#[derive(Debug)]
pub struct StatusStream {
    hash: TxHash,
    replay: VecDeque<StatusEvent>,
    live: broadcast::Receiver<StatusEvent>,
    finished: bool,
}

impl StatusStream {
    pub(crate) fn new(
        hash: TxHash,
        history: Vec<StatusEvent>,
        live: broadcast::Receiver<StatusEvent>,
    ) -> Self {
        Self {
            hash,
            replay: history.into(),
            live,
            finished: false,
        }
    }

    pub fn hash(&self) -> TxHash {
        self.hash
    }

    /// Next event, or `None` once the stream has ended. Cancel safe.
    pub async fn next(&mut self) -> Option<StatusEvent> {
        if self.finished {
            return None;
        }

        let event = match self.replay.pop_front() {
            Some(event) => event,
            None => loop {
                match self.live.recv().await {
                    Ok(event) => break event,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(tx_hash = %self.hash, skipped, "Status subscriber lagged");
                    }
                    Err(RecvError::Closed) => {
                        self.finished = true;
                        return None;
                    }
                }
            },
        };

        if event.status.is_terminal() {
            self.finished = true;
        }
        Some(event)
    }

    /// Drain the stream and return the terminal event, if there is one.
    pub async fn wait_terminal(mut self) -> Option<StatusEvent> {
        while let Some(event) = self.next().await {
            if event.status.is_terminal() {
                return Some(event);
            }
        }
        None
    }

    /// Adapt into a `futures_util::Stream`.
    pub fn into_stream(self) -> impl Stream<Item = StatusEvent> {
        futures_util::stream::unfold(self, |mut stream| async move {
            stream.next().await.map(|event| (event, stream))
        })
    }
}
