//! Outbound notifications: queued, bounded, best-effort.
//!
//! Requests enqueue with `try_send` and never wait on delivery; a full queue
//! drops the notification with a warning instead of blocking the caller.
//! A single worker task drains the queue, and shutdown closes the channel so
//! the worker can finish whatever is still buffered.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::errors::Result;

/// Everything the platform sends out of band.  Amounts are in major units;
/// this is the notification boundary.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    BackingReceipt {
        email: String,
        project_title: String,
        amount: f64,
        backing_id: i64,
    },
    RefundIssued {
        email: String,
        project_title: String,
        amount: f64,
        backing_id: i64,
    },
    ProjectReviewed {
        email: String,
        project_title: String,
        status: String,
        feedback: String,
    },
}

/// Delivery backend.  Production wires this to the external dispatcher;
/// the default implementation just logs.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, note: &Notification) -> Result<()>;
}

/// Sink that records deliveries in the application log.
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn deliver(&self, note: &Notification) -> Result<()> {
        info!("notification: {}", serde_json::to_string(note)?);
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────
// Queue + worker
// ─────────────────────────────────────────────────────────

/// Cheap handle for enqueueing notifications.
#[derive(Clone)]
pub struct Notifier {
    tx: mpsc::Sender<Notification>,
}

impl Notifier {
    /// Enqueue without blocking.  Returns false when the queue was full and
    /// the notification was dropped.
    pub fn send(&self, note: Notification) -> bool {
        match self.tx.try_send(note) {
            Ok(()) => true,
            Err(e) => {
                warn!("notification dropped: {e}");
                false
            }
        }
    }
}

/// Start the delivery worker.  The returned handle completes once every
/// [`Notifier`] clone has been dropped and the queue has drained.
pub fn spawn(sink: Arc<dyn NotificationSink>, queue_size: usize) -> (Notifier, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel(queue_size);

    let handle = tokio::spawn(async move {
        while let Some(note) = rx.recv().await {
            if let Err(e) = sink.deliver(&note).await {
                error!("notification delivery failed: {e}");
            }
        }
        info!("notification queue drained");
    });

    (Notifier { tx }, handle)
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
