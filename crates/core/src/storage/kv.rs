//! Key-value store abstraction.
//!
//! Every store operation is a short, independently-consistent call on a
//! single key; there are no cross-key transactions. `put_if_absent` is the
//! one atomicity primitive the scheduling protocol relies on (collision-free
//! identifier allocation at first persist).

use anyhow::Result;
use bytes::Bytes;
use std::time::Duration;

use crate::types::WorkflowId;

/// Prefix under which all workflow-level records live.
pub const WORKFLOW_SCAN_PREFIX: &str = "workflow:";

/// Key of a workflow-level record.
pub fn workflow_key(id: &WorkflowId) -> String {
    format!("workflow:{id}")
}

/// Key of a single job record.
pub fn job_key(workflow_id: &WorkflowId, name: &str) -> String {
    format!("job:{workflow_id}:{name}")
}

/// Prefix matching every job record of one workflow.
pub fn job_scan_prefix(workflow_id: &WorkflowId) -> String {
    format!("job:{workflow_id}:")
}

/// Shared key-value store the repository persists records into.
#[async_trait::async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Bytes>>;

    async fn put(&self, key: &str, value: Bytes) -> Result<()>;

    /// Atomic conditional insert. Returns true when the key was vacant and
    /// the value was written; false leaves the existing value untouched.
    async fn put_if_absent(&self, key: &str, value: Bytes) -> Result<bool>;

    async fn delete(&self, key: &str) -> Result<()>;

    async fn exists(&self, key: &str) -> Result<bool>;

    /// List all live keys starting with `prefix`.
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>>;

    /// Schedule the record for expiry. Advisory garbage collection: an
    /// expired record simply becomes unreadable, nothing is notified.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<()>;
}
