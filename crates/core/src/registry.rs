//! Type registry.
//!
//! Workflow and job types are looked up by string name. Instead of dynamic
//! class resolution, an explicit registry maps each name to its constructor,
//! populated at process start; a name with no entry surfaces as
//! [`Error::WorkflowNotFound`].

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::types::QueueOptions;
use crate::workflow::Workflow;

/// Builds a concrete workflow graph from its stored constructor arguments.
pub trait WorkflowFactory: Send + Sync {
    fn build(&self, arguments: &[serde_json::Value]) -> anyhow::Result<Workflow>;
}

impl<F> WorkflowFactory for F
where
    F: Fn(&[serde_json::Value]) -> anyhow::Result<Workflow> + Send + Sync,
{
    fn build(&self, arguments: &[serde_json::Value]) -> anyhow::Result<Workflow> {
        self(arguments)
    }
}

/// Name-to-constructor registry for workflow types, plus per-job-type queue
/// settings.
#[derive(Clone, Default)]
pub struct Registry {
    workflows: HashMap<String, Arc<dyn WorkflowFactory>>,
    job_types: HashMap<String, QueueOptions>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_workflow(
        &mut self,
        name: impl Into<String>,
        factory: impl WorkflowFactory + 'static,
    ) {
        self.workflows.insert(name.into(), Arc::new(factory));
    }

    /// Record queue delivery settings for a job type. Unregistered types get
    /// [`QueueOptions::default`] (no retries, namespace queue).
    pub fn register_job(&mut self, name: impl Into<String>, opts: QueueOptions) {
        self.job_types.insert(name.into(), opts);
    }

    pub fn queue_options(&self, klass: &str) -> QueueOptions {
        self.job_types.get(klass).cloned().unwrap_or_default()
    }

    /// Resolve and run the factory for a workflow type. The built graph is
    /// normalized to carry the registered name and the given arguments.
    pub fn build_workflow(
        &self,
        name: &str,
        arguments: &[serde_json::Value],
    ) -> Result<Workflow> {
        let factory = self
            .workflows
            .get(name)
            .ok_or_else(|| Error::WorkflowNotFound(name.to_string()))?;

        let mut workflow = factory.build(arguments).map_err(Error::Factory)?;
        workflow.klass = name.to_string();
        workflow.arguments = arguments.to_vec();
        Ok(workflow)
    }
}
