//! Workflow DAG container.
//!
//! Holds the full node set plus graph-level metadata and answers structural
//! queries (initial jobs, subtree closure). It never decides what to
//! enqueue; that is the repository's job.

use chrono::{DateTime, Utc};
use petgraph::graph::DiGraph;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::job::Job;
use crate::types::{QueueOptions, WorkflowId};

/// Options for one node added through the graph builder.
#[derive(Debug, Clone, Default)]
pub struct JobSpec {
    /// Opaque configuration handed to the job's business logic
    pub params: serde_json::Value,
    /// Queue delivery settings for this job
    pub queue_opts: QueueOptions,
    /// Dependencies, each an exact job name or a unique job type name
    pub after: Vec<String>,
}

/// Durable form of the workflow-level record (`workflow:<id>`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRecord {
    pub id: WorkflowId,
    pub klass: String,
    #[serde(default)]
    pub arguments: Vec<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub stopped: bool,
}

/// A DAG of jobs with identity, creation time and the stopped flag.
#[derive(Debug, Clone)]
pub struct Workflow {
    id: WorkflowId,
    pub klass: String,
    pub arguments: Vec<serde_json::Value>,
    created_at: DateTime<Utc>,
    stopped: bool,
    persisted: bool,
    jobs: HashMap<String, Job>,
}

impl Workflow {
    pub fn new(klass: impl Into<String>) -> Self {
        Self {
            id: WorkflowId::new(),
            klass: klass.into(),
            arguments: Vec::new(),
            created_at: Utc::now(),
            stopped: false,
            persisted: false,
            jobs: HashMap::new(),
        }
    }

    pub fn id(&self) -> WorkflowId {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// True once a save round-trip has completed. Transient, never durable.
    pub fn is_persisted(&self) -> bool {
        self.persisted
    }

    pub fn mark_as_started(&mut self) {
        self.stopped = false;
    }

    pub fn mark_as_stopped(&mut self) {
        self.stopped = true;
    }

    pub fn mark_as_persisted(&mut self) {
        self.persisted = true;
    }

    /// Re-assign the workflow id, keeping every job's back-reference in sync.
    /// Used on first-persist id collisions.
    pub(crate) fn assign_id(&mut self, id: WorkflowId) {
        self.id = id;
        for job in self.jobs.values_mut() {
            job.workflow_id = id;
        }
    }

    pub fn jobs(&self) -> impl Iterator<Item = &Job> {
        self.jobs.values()
    }

    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    /// Exact lookup by job name.
    pub fn find_job(&self, name: &str) -> Option<&Job> {
        self.jobs.get(name)
    }

    pub fn find_job_mut(&mut self, name: &str) -> Option<&mut Job> {
        self.jobs.get_mut(name)
    }

    /// All nodes with no unmet dependency; the first wave to enqueue.
    pub fn initial_jobs(&self) -> Vec<&Job> {
        let mut jobs: Vec<&Job> = self
            .jobs
            .values()
            .filter(|job| job.has_no_dependencies())
            .collect();
        jobs.sort_by(|a, b| a.name.cmp(&b.name));
        jobs
    }

    /// Add a node, generating its `<TypeName>-<uuid>` name and recording a
    /// symmetric edge to each dependency listed in `spec.after`.
    pub fn add_job(&mut self, klass: &str, spec: JobSpec) -> Result<String> {
        let name = format!("{}-{}", klass, Uuid::new_v4());

        let mut dependencies = Vec::with_capacity(spec.after.len());
        for key in &spec.after {
            dependencies.push(self.resolve_job_name(key)?);
        }

        let mut job = Job::new(self.id, klass, name.clone(), spec.params);
        job.queue_opts = spec.queue_opts;
        job.incoming = dependencies.clone();
        self.jobs.insert(name.clone(), job);

        for dependency in dependencies {
            if let Some(parent) = self.jobs.get_mut(&dependency) {
                parent.outgoing.push(name.clone());
            }
        }

        Ok(name)
    }

    /// Record one dependency edge between two existing nodes, symmetrically.
    pub fn connect(&mut self, from: &str, to: &str) -> Result<()> {
        if !self.jobs.contains_key(from) {
            return Err(self.job_not_found(from));
        }
        if !self.jobs.contains_key(to) {
            return Err(self.job_not_found(to));
        }

        if let Some(parent) = self.jobs.get_mut(from) {
            if !parent.outgoing.iter().any(|name| name == to) {
                parent.outgoing.push(to.to_string());
            }
        }
        if let Some(child) = self.jobs.get_mut(to) {
            if !child.incoming.iter().any(|name| name == from) {
                child.incoming.push(from.to_string());
            }
        }
        Ok(())
    }

    /// Verify the node set forms a DAG: every edge endpoint exists and no
    /// cycle is reachable. Run before the first persist.
    pub fn validate(&self) -> Result<()> {
        let mut graph = DiGraph::<&str, ()>::new();
        let mut indices = HashMap::new();

        for name in self.jobs.keys() {
            let index = graph.add_node(name.as_str());
            indices.insert(name.as_str(), index);
        }

        for job in self.jobs.values() {
            for target in &job.outgoing {
                let target_index = indices.get(target.as_str()).ok_or_else(|| {
                    Error::InvalidGraph(format!(
                        "job {} points at unknown job {}",
                        job.name, target
                    ))
                })?;
                graph.add_edge(indices[job.name.as_str()], *target_index, ());
            }
            for source in &job.incoming {
                if !self.jobs.contains_key(source) {
                    return Err(Error::InvalidGraph(format!(
                        "job {} depends on unknown job {}",
                        job.name, source
                    )));
                }
            }
        }

        if petgraph::algo::is_cyclic_directed(&graph) {
            return Err(Error::InvalidGraph(
                "workflow contains circular dependencies".to_string(),
            ));
        }

        Ok(())
    }

    /// Reset every job transitively reachable via `outgoing` from the given
    /// node, leaving the node itself untouched. Stale completion state on a
    /// descendant would otherwise let `ready_to_start` pass falsely, or
    /// block re-scheduling, after a subtree restart.
    pub fn clear_job_children(&mut self, name: &str) -> Result<()> {
        let start = self.jobs.get(name).ok_or_else(|| self.job_not_found(name))?;

        let mut reachable = HashSet::new();
        let mut queue: VecDeque<String> = start.outgoing.iter().cloned().collect();
        while let Some(current) = queue.pop_front() {
            if !reachable.insert(current.clone()) {
                continue;
            }
            if let Some(job) = self.jobs.get(&current) {
                queue.extend(job.outgoing.iter().cloned());
            }
        }

        for descendant in reachable {
            if let Some(job) = self.jobs.get_mut(&descendant) {
                job.clear();
            }
        }
        Ok(())
    }

    /// Durable form of the workflow-level record.
    pub fn record(&self) -> WorkflowRecord {
        WorkflowRecord {
            id: self.id,
            klass: self.klass.clone(),
            arguments: self.arguments.clone(),
            created_at: self.created_at,
            stopped: self.stopped,
        }
    }

    /// Overwrite this freshly built workflow with state loaded from the
    /// store: the durable metadata and the reconstructed job set.
    pub(crate) fn hydrate(&mut self, record: &WorkflowRecord, jobs: Vec<Job>) {
        self.id = record.id;
        self.created_at = record.created_at;
        self.stopped = record.stopped;
        self.jobs = jobs.into_iter().map(|job| (job.name.clone(), job)).collect();
        self.persisted = true;
    }

    /// Resolve a dependency key: an exact job name, or a job type name that
    /// matches exactly one node.
    fn resolve_job_name(&self, key: &str) -> Result<String> {
        if self.jobs.contains_key(key) {
            return Ok(key.to_string());
        }

        let mut matches = self.jobs.values().filter(|job| job.klass == key);
        match (matches.next(), matches.next()) {
            (Some(job), None) => Ok(job.name.clone()),
            (Some(_), Some(_)) => Err(Error::InvalidGraph(format!(
                "dependency {key} is ambiguous: more than one job of that type"
            ))),
            (None, _) => Err(Error::InvalidGraph(format!(
                "dependency {key} does not match any job"
            ))),
        }
    }

    fn job_not_found(&self, name: &str) -> Error {
        Error::JobNotFound {
            workflow_id: self.id,
            name: name.to_string(),
        }
    }
}
