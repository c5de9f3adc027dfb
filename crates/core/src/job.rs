//! Per-node job lifecycle.
//!
//! A job's state is derived entirely from its four nullable timestamps, not
//! from a status enum: `Pending` (all null) -> `Enqueued` -> `Started` ->
//! `Finished`, where finished splits into succeeded (`failed_at` null) and
//! failed (`failed_at` set, `soft_fail` distinguishing recoverable failures).
//! This keeps the record trivially serializable and makes re-enqueuing a
//! plain field reset. Two invariants are maintained by the transition
//! methods rather than the type system: at most one of {running, finished}
//! holds at a time, and a failed job is always also finished.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::JobError;
use crate::types::{QueueOptions, WorkflowId};

/// Timed-retry window carried in `params.loop_opts`.
#[derive(Debug, Clone, Deserialize)]
pub struct LoopOpts {
    /// Unix timestamp (seconds) after which the job counts as expired
    pub end_time: i64,
}

/// A single DAG node: identity, dependency edges and the timestamp-driven
/// state machine. Jobs know nothing about storage or queueing; edges are
/// recorded symmetrically by the workflow graph builder, never here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub name: String,
    pub klass: String,
    #[serde(default)]
    pub incoming: Vec<String>,
    #[serde(default)]
    pub outgoing: Vec<String>,
    #[serde(default)]
    pub params: serde_json::Value,
    pub workflow_id: WorkflowId,
    #[serde(default)]
    pub enqueued_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub failed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub soft_fail: Option<bool>,
    #[serde(default)]
    pub output_payload: Option<serde_json::Value>,

    /// Restored from the registry by the job's type name, not persisted.
    #[serde(skip)]
    pub queue_opts: QueueOptions,
}

impl Job {
    pub fn new(
        workflow_id: WorkflowId,
        klass: impl Into<String>,
        name: impl Into<String>,
        params: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            klass: klass.into(),
            incoming: Vec::new(),
            outgoing: Vec::new(),
            params,
            workflow_id,
            enqueued_at: None,
            started_at: None,
            finished_at: None,
            failed_at: None,
            soft_fail: None,
            output_payload: None,
            queue_opts: QueueOptions::default(),
        }
    }

    /// Record the job's result data. Called by the worker on success.
    pub fn output(&mut self, data: serde_json::Value) {
        self.output_payload = Some(data);
    }

    /// Admit the job to the queue. Re-enqueuing always resets the downstream
    /// timestamps; this is what makes restart/retry a plain field reset.
    pub fn enqueue(&mut self) {
        self.enqueued_at = Some(Utc::now());
        self.started_at = None;
        self.finished_at = None;
        self.failed_at = None;
        self.soft_fail = None;
    }

    /// Mark execution as begun. No precondition is checked here; the queue's
    /// delivery semantics bound concurrent starts, not this method.
    pub fn start(&mut self) {
        self.started_at = Some(Utc::now());
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Record a failure. Sets both `finished_at` and `failed_at`, keeping the
    /// failed-implies-finished invariant.
    pub fn fail(&mut self, soft: bool) {
        let now = Utc::now();
        self.finished_at = Some(now);
        self.failed_at = Some(now);
        self.soft_fail = Some(soft);
    }

    /// Reset all lifecycle state without marking the job enqueued. Used when
    /// rebuilding a subtree before re-running it, so stale completion state
    /// cannot skew readiness checks on descendants.
    pub fn clear(&mut self) {
        self.enqueued_at = None;
        self.started_at = None;
        self.finished_at = None;
        self.failed_at = None;
        self.soft_fail = None;
    }

    /// Map a worker-reported failure onto persisted state.
    pub fn record_failure(&mut self, error: &JobError) {
        match error {
            JobError::SoftFail(_) => self.fail(true),
            JobError::Failed(_) | JobError::LoopFail => self.fail(false),
        }
    }

    pub fn is_enqueued(&self) -> bool {
        self.enqueued_at.is_some()
    }

    pub fn is_started(&self) -> bool {
        self.started_at.is_some()
    }

    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }

    pub fn is_failed(&self) -> bool {
        self.failed_at.is_some()
    }

    pub fn is_running(&self) -> bool {
        self.is_started() && !self.is_finished()
    }

    pub fn failed_softly(&self) -> bool {
        self.is_failed() && self.soft_fail.unwrap_or(false)
    }

    pub fn succeeded(&self) -> bool {
        self.is_finished() && !self.is_failed()
    }

    /// Whether the job may be admitted to run, given freshly loaded snapshots
    /// of every dependency named in `incoming`. The caller (the repository)
    /// is responsible for fetching current records; a dependency that is
    /// missing from the store must be treated as not ready before calling.
    pub fn ready_to_start(&self, parents: &[Job]) -> bool {
        !self.is_running()
            && !self.is_enqueued()
            && !self.is_finished()
            && !self.is_failed()
            && parents.iter().all(|parent| parent.succeeded())
    }

    pub fn has_no_dependencies(&self) -> bool {
        self.incoming.is_empty()
    }

    pub fn loop_opts(&self) -> Option<LoopOpts> {
        serde_json::from_value(self.params.get("loop_opts")?.clone()).ok()
    }

    /// True only when `loop_opts.end_time` exists and has passed. Bounds
    /// timed-retry/looping jobs; jobs without a window never expire.
    pub fn is_expired(&self) -> bool {
        match self.loop_opts() {
            Some(opts) => Utc::now().timestamp() > opts.end_time,
            None => false,
        }
    }

    /// Whether the queue is configured not to redeliver this job type.
    pub fn no_retries(&self) -> bool {
        !self.queue_opts.retry
    }
}
