//! Error types surfaced at the orchestrator boundary.

use crate::types::WorkflowId;

/// Result type for orchestrator operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by repository and workflow operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No stored workflow under the given id, or the type name does not
    /// resolve to a registered factory. Never retried internally.
    #[error("workflow not found: {0}")]
    WorkflowNotFound(String),

    /// A scheduling operation addressed a job name the graph does not contain.
    #[error("job {name} not found in workflow {workflow_id}")]
    JobNotFound {
        workflow_id: WorkflowId,
        name: String,
    },

    /// The job graph failed validation (cycle, dangling or ambiguous edge).
    #[error("invalid workflow graph: {0}")]
    InvalidGraph(String),

    /// A registered factory failed while building its workflow.
    #[error("workflow factory failed")]
    Factory(#[source] anyhow::Error),

    /// Store operation failed. Propagated as-is; retry policy is the caller's.
    #[error("store operation failed")]
    Store(#[source] anyhow::Error),

    /// Queue dispatch failed. Propagated as-is; retry policy is the caller's.
    #[error("queue dispatch failed")]
    Queue(#[source] anyhow::Error),

    /// Record (de)serialization error.
    #[error("record serialization failed")]
    Serialization(#[from] serde_json::Error),
}

/// Failure classes a worker reports for a job it was executing.
///
/// These never cross between jobs; they are recorded on the failing job via
/// [`crate::job::Job::record_failure`] and observed by dependents through
/// persisted state alone.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// Hard failure.
    #[error("job failed: {0}")]
    Failed(String),

    /// Recoverable failure; recorded with the soft flag set. A soft-failed
    /// dependency still blocks its dependents.
    #[error("job failed softly: {0}")]
    SoftFail(String),

    /// A timed/looping job ran past its configured retry window.
    #[error("looping job exceeded its retry window")]
    LoopFail,
}
