//! Work-queue boundary.
//!
//! One outbound message per job admitted to run. The hand-off is
//! fire-and-forget: no acknowledgment is awaited, and execution progress is
//! observed only by reading the job's persisted state later.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::types::WorkflowId;

/// Messages submitted to the external work queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum QueueMessage {
    /// Request to execute one job of one workflow.
    JobExecute {
        workflow_id: WorkflowId,
        job_name: String,
        /// Queue the message is routed to; the configured namespace unless
        /// the job type overrides it
        queue: String,
        /// Whether the broker should redeliver on worker failure
        retry: bool,
    },
}

/// Enqueue boundary to the external work queue.
#[async_trait::async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, message: QueueMessage) -> anyhow::Result<()>;
}

/// In-process [`Dispatcher`] over an unbounded channel. The receiving half is
/// consumed by a local worker pool; used by tests and single-process
/// deployments.
pub struct ChannelDispatcher {
    tx: mpsc::UnboundedSender<QueueMessage>,
}

impl ChannelDispatcher {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<QueueMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait::async_trait]
impl Dispatcher for ChannelDispatcher {
    async fn dispatch(&self, message: QueueMessage) -> anyhow::Result<()> {
        self.tx
            .send(message)
            .map_err(|_| anyhow::anyhow!("queue receiver dropped"))
    }
}
