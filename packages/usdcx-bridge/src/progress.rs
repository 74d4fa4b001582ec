//! Progress channel
//!
//! The orchestrator pushes one [`ProgressEvent`] per state transition into an
//! unbounded tokio channel. Delivery is ordered and lossless while the receiver
//! is alive; a dropped receiver never stalls or fails the bridge run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

use crate::types::BridgeState;

/// A single state transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub operation_id: String,
    pub state: BridgeState,
    /// Free text for display, not meant to be parsed
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Producer half, owned by the orchestrator for the length of a run
#[derive(Debug, Clone)]
pub struct ProgressSender {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

/// Consumer half, owned by the caller
#[derive(Debug)]
pub struct ProgressReceiver {
    rx: mpsc::UnboundedReceiver<ProgressEvent>,
}

/// Create a connected sender/receiver pair
pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ProgressSender { tx }, ProgressReceiver { rx })
}

impl ProgressSender {
    /// A sender whose events go nowhere
    pub fn discard() -> Self {
        progress_channel().0
    }

    /// Publish an event; ignored if the receiver is gone
    pub fn emit(&self, event: ProgressEvent) {
        if self.tx.send(event).is_err() {
            debug!("Progress receiver dropped, event discarded");
        }
    }
}

impl ProgressReceiver {
    /// Wait for the next event; `None` once the run has finished and the sender is dropped
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        self.rx.recv().await
    }

    /// Take every event that is already buffered, without waiting
    pub fn drain(&mut self) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }
}
