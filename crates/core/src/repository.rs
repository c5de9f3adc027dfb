//! Persistence + scheduling client.
//!
//! The repository is the only component that talks to the store and the
//! queue. There is no central scheduler holding graph state in memory
//! between steps: multiple worker processes act as independent repository
//! clients against one shared store and one shared queue, and every
//! scheduling decision is re-derived from freshly loaded records.

use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::config::Configuration;
use crate::error::{Error, Result};
use crate::job::Job;
use crate::queue::{Dispatcher, QueueMessage};
use crate::registry::Registry;
use crate::storage::{job_key, job_scan_prefix, workflow_key, KvStore, WORKFLOW_SCAN_PREFIX};
use crate::types::WorkflowId;
use crate::workflow::{Workflow, WorkflowRecord};

pub struct Repository {
    store: Arc<dyn KvStore>,
    dispatcher: Arc<dyn Dispatcher>,
    registry: Registry,
    config: Configuration,
}

impl Repository {
    pub fn new(
        store: Arc<dyn KvStore>,
        dispatcher: Arc<dyn Dispatcher>,
        registry: Registry,
        config: Configuration,
    ) -> Self {
        Self {
            store,
            dispatcher,
            registry,
            config,
        }
    }

    /// Build a fresh in-memory workflow of the given registered type. Not
    /// yet persisted; the allocated id is claimed durably on first persist.
    pub async fn create_workflow(
        &self,
        name: &str,
        arguments: Vec<serde_json::Value>,
    ) -> Result<Workflow> {
        let mut workflow = self.registry.build_workflow(name, &arguments)?;
        let id = self.next_free_workflow_id().await?;
        workflow.assign_id(id);
        tracing::debug!("Built workflow {} of type {}", id, name);
        Ok(workflow)
    }

    /// Mark the workflow started, persist it, then admit the first wave:
    /// either every dependency-free job or the explicitly named subset.
    pub async fn start_workflow(
        &self,
        workflow: &mut Workflow,
        job_names: &[&str],
    ) -> Result<()> {
        workflow.validate()?;
        workflow.mark_as_started();
        self.persist_workflow(workflow).await?;

        let names: Vec<String> = if job_names.is_empty() {
            workflow
                .initial_jobs()
                .iter()
                .map(|job| job.name.clone())
                .collect()
        } else {
            job_names.iter().map(|name| name.to_string()).collect()
        };

        let workflow_id = workflow.id();
        tracing::info!("Starting workflow {}: enqueuing {} job(s)", workflow_id, names.len());
        for name in &names {
            let job = workflow
                .find_job_mut(name)
                .ok_or_else(|| Error::JobNotFound {
                    workflow_id,
                    name: name.clone(),
                })?;
            self.enqueue_job(workflow_id, job).await?;
        }
        Ok(())
    }

    /// Set the stopped flag and persist it. Advisory: already-dispatched
    /// work is not recalled; callers observe the flag before enqueuing
    /// further waves.
    pub async fn stop_workflow(&self, id: WorkflowId) -> Result<()> {
        let mut workflow = self.find_workflow(id).await?;
        workflow.mark_as_stopped();
        tracing::info!("Stopping workflow {}", id);
        self.persist_workflow(&mut workflow).await
    }

    /// The single admission point: record the enqueue durably, then hand the
    /// job to the queue. The persist-before-dispatch order means a crash in
    /// between leaves a recoverable enqueued-but-never-run record, while a
    /// crash before the persist cannot leave a phantom running job.
    pub async fn enqueue_job(&self, workflow_id: WorkflowId, job: &mut Job) -> Result<()> {
        job.enqueue();
        self.persist_job(workflow_id, job).await?;
        self.dispatch_job(workflow_id, job).await
    }

    /// Replay a subtree: re-enqueue the named job and reset every transitive
    /// descendant, leaving ancestors and unrelated branches untouched.
    pub async fn restart_workflow(&self, workflow_id: WorkflowId, job_name: &str) -> Result<()> {
        let mut workflow = self.find_workflow(workflow_id).await?;
        workflow.mark_as_started();

        {
            let job = workflow
                .find_job_mut(job_name)
                .ok_or_else(|| Error::JobNotFound {
                    workflow_id,
                    name: job_name.to_string(),
                })?;
            job.enqueue();
        }
        workflow.clear_job_children(job_name)?;
        self.persist_workflow(&mut workflow).await?;

        let job = workflow
            .find_job(job_name)
            .ok_or_else(|| Error::JobNotFound {
                workflow_id,
                name: job_name.to_string(),
            })?;
        tracing::info!("Restarting workflow {} from job {}", workflow_id, job.name);
        self.dispatch_job(workflow_id, job).await
    }

    /// Write the workflow record, then every job record, then mark the
    /// workflow persisted. Not atomic across records: a crash partway
    /// leaves a workflow record whose job set does not yet match durable
    /// job records.
    pub async fn persist_workflow(&self, workflow: &mut Workflow) -> Result<()> {
        if workflow.is_persisted() {
            let encoded = serde_json::to_vec(&workflow.record())?;
            self.store
                .put(&workflow_key(&workflow.id()), Bytes::from(encoded))
                .await
                .map_err(Error::Store)?;
        } else {
            // First persist claims the id with an atomic conditional insert;
            // a lost race means a concurrent client allocated the same id,
            // so regenerate and try again.
            loop {
                let encoded = serde_json::to_vec(&workflow.record())?;
                let won = self
                    .store
                    .put_if_absent(&workflow_key(&workflow.id()), Bytes::from(encoded))
                    .await
                    .map_err(Error::Store)?;
                if won {
                    break;
                }
                tracing::warn!("Workflow id {} already taken, regenerating", workflow.id());
                workflow.assign_id(WorkflowId::new());
            }
        }

        let workflow_id = workflow.id();
        for job in workflow.jobs() {
            self.persist_job(workflow_id, job).await?;
        }
        workflow.mark_as_persisted();
        Ok(())
    }

    pub async fn persist_job(&self, workflow_id: WorkflowId, job: &Job) -> Result<()> {
        let encoded = serde_json::to_vec(job)?;
        tracing::debug!("Persisting job {} of workflow {}", job.name, workflow_id);
        self.store
            .put(&job_key(&workflow_id, &job.name), Bytes::from(encoded))
            .await
            .map_err(Error::Store)
    }

    /// Load the workflow record and every job record in its namespace, then
    /// rebuild the concrete workflow through its registered factory.
    pub async fn find_workflow(&self, id: WorkflowId) -> Result<Workflow> {
        let data = self
            .store
            .get(&workflow_key(&id))
            .await
            .map_err(Error::Store)?
            .ok_or_else(|| Error::WorkflowNotFound(id.to_string()))?;
        let record: WorkflowRecord = serde_json::from_slice(&data)?;

        let keys = self
            .store
            .scan_prefix(&job_scan_prefix(&id))
            .await
            .map_err(Error::Store)?;
        let mut jobs = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(bytes) = self.store.get(&key).await.map_err(Error::Store)? {
                let mut job: Job = serde_json::from_slice(&bytes)?;
                job.queue_opts = self.registry.queue_options(&job.klass);
                jobs.push(job);
            }
        }

        let mut workflow = self.registry.build_workflow(&record.klass, &record.arguments)?;
        workflow.hydrate(&record, jobs);
        Ok(workflow)
    }

    /// Look up one job record: by exact name, or for a bare type name by
    /// prefix against the `<TypeName>-<uuid>` convention.
    pub async fn find_job(&self, workflow_id: WorkflowId, job_id: &str) -> Result<Option<Job>> {
        let data = match self
            .store
            .get(&job_key(&workflow_id, job_id))
            .await
            .map_err(Error::Store)?
        {
            Some(bytes) => Some(bytes),
            None if !job_id.contains('-') => {
                let prefix = format!("{}{}-", job_scan_prefix(&workflow_id), job_id);
                let keys = self
                    .store
                    .scan_prefix(&prefix)
                    .await
                    .map_err(Error::Store)?;
                match keys.first() {
                    Some(key) => self.store.get(key).await.map_err(Error::Store)?,
                    None => None,
                }
            }
            None => None,
        };

        match data {
            Some(bytes) => {
                let mut job: Job = serde_json::from_slice(&bytes)?;
                job.queue_opts = self.registry.queue_options(&job.klass);
                Ok(Some(job))
            }
            None => Ok(None),
        }
    }

    /// Evaluate the job's readiness against freshly loaded dependency
    /// records. A dependency with no store record means not ready.
    pub async fn job_ready_to_start(&self, workflow_id: WorkflowId, job: &Job) -> Result<bool> {
        let mut parents = Vec::with_capacity(job.incoming.len());
        for name in &job.incoming {
            match self.find_job(workflow_id, name).await? {
                Some(parent) => parents.push(parent),
                None => return Ok(false),
            }
        }
        Ok(job.ready_to_start(&parents))
    }

    /// Delete the workflow record, then cascade to every job record.
    pub async fn destroy_workflow(&self, workflow: &Workflow) -> Result<()> {
        tracing::info!("Destroying workflow {}", workflow.id());
        self.store
            .delete(&workflow_key(&workflow.id()))
            .await
            .map_err(Error::Store)?;
        for job in workflow.jobs() {
            self.destroy_job(workflow.id(), job).await?;
        }
        Ok(())
    }

    pub async fn destroy_job(&self, workflow_id: WorkflowId, job: &Job) -> Result<()> {
        self.store
            .delete(&job_key(&workflow_id, &job.name))
            .await
            .map_err(Error::Store)
    }

    /// Schedule the workflow record and every job record for expiry. With no
    /// explicit ttl and none configured this is a no-op; expiry is garbage
    /// collection, not a correctness mechanism.
    pub async fn expire_workflow(&self, workflow: &Workflow, ttl: Option<Duration>) -> Result<()> {
        let Some(ttl) = ttl.or_else(|| self.config.ttl_duration()) else {
            tracing::debug!("No ttl configured, skipping expiry for workflow {}", workflow.id());
            return Ok(());
        };
        self.store
            .expire(&workflow_key(&workflow.id()), ttl)
            .await
            .map_err(Error::Store)?;
        for job in workflow.jobs() {
            self.expire_job(workflow.id(), job, Some(ttl)).await?;
        }
        Ok(())
    }

    pub async fn expire_job(
        &self,
        workflow_id: WorkflowId,
        job: &Job,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let Some(ttl) = ttl.or_else(|| self.config.ttl_duration()) else {
            return Ok(());
        };
        self.store
            .expire(&job_key(&workflow_id, &job.name), ttl)
            .await
            .map_err(Error::Store)
    }

    /// Enumerate stored workflows, newest first.
    pub async fn all_workflows(
        &self,
        limit: Option<usize>,
        offset: usize,
    ) -> Result<Vec<Workflow>> {
        let keys = self
            .store
            .scan_prefix(WORKFLOW_SCAN_PREFIX)
            .await
            .map_err(Error::Store)?;
        let mut records = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(bytes) = self.store.get(&key).await.map_err(Error::Store)? {
                let record: WorkflowRecord = serde_json::from_slice(&bytes)?;
                records.push(record);
            }
        }
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let limit = limit.unwrap_or(records.len());
        let mut workflows = Vec::new();
        for record in records.into_iter().skip(offset).take(limit) {
            workflows.push(self.find_workflow(record.id).await?);
        }
        Ok(workflows)
    }

    pub async fn all_workflows_size(&self) -> Result<usize> {
        let keys = self
            .store
            .scan_prefix(WORKFLOW_SCAN_PREFIX)
            .await
            .map_err(Error::Store)?;
        Ok(keys.len())
    }

    /// Allocate a workflow id no current record uses. The remaining
    /// check-then-act window is closed at first persist, which claims the
    /// key with `put_if_absent`.
    pub async fn next_free_workflow_id(&self) -> Result<WorkflowId> {
        loop {
            let id = WorkflowId::new();
            let taken = self
                .store
                .exists(&workflow_key(&id))
                .await
                .map_err(Error::Store)?;
            if !taken {
                return Ok(id);
            }
        }
    }

    /// Allocate a `<TypeName>-<uuid>` job name unused within the workflow's
    /// namespace.
    pub async fn next_free_job_id(
        &self,
        workflow_id: WorkflowId,
        klass: &str,
    ) -> Result<String> {
        loop {
            let name = format!("{}-{}", klass, Uuid::new_v4());
            let taken = self
                .store
                .exists(&job_key(&workflow_id, &name))
                .await
                .map_err(Error::Store)?;
            if !taken {
                return Ok(name);
            }
        }
    }

    async fn dispatch_job(&self, workflow_id: WorkflowId, job: &Job) -> Result<()> {
        let queue = job
            .queue_opts
            .queue
            .clone()
            .unwrap_or_else(|| self.config.namespace.clone());
        tracing::info!("Dispatching job {} of workflow {} to queue {}", job.name, workflow_id, queue);
        self.dispatcher
            .dispatch(QueueMessage::JobExecute {
                workflow_id,
                job_name: job.name.clone(),
                queue,
                retry: job.queue_opts.retry,
            })
            .await
            .map_err(Error::Queue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::ChannelDispatcher;
    use crate::storage::MemoryKvStore;
    use crate::workflow::JobSpec;
    use std::collections::HashSet;
    use tokio::sync::mpsc;

    // Fetch -> Transform -> Publish
    fn pipeline_workflow(_args: &[serde_json::Value]) -> anyhow::Result<Workflow> {
        let mut workflow = Workflow::new("PipelineWorkflow");
        let fetch = workflow.add_job("Fetch", JobSpec::default())?;
        let transform = workflow.add_job(
            "Transform",
            JobSpec {
                after: vec![fetch],
                ..Default::default()
            },
        )?;
        workflow.add_job(
            "Publish",
            JobSpec {
                after: vec![transform],
                ..Default::default()
            },
        )?;
        Ok(workflow)
    }

    fn pipeline_registry() -> Registry {
        let mut registry = Registry::new();
        registry.register_workflow("PipelineWorkflow", pipeline_workflow);
        registry
    }

    fn test_repository() -> (
        Repository,
        Arc<MemoryKvStore>,
        mpsc::UnboundedReceiver<QueueMessage>,
    ) {
        let (dispatcher, rx) = ChannelDispatcher::new();
        let store = Arc::new(MemoryKvStore::new());
        let repository = Repository::new(
            store.clone(),
            Arc::new(dispatcher),
            pipeline_registry(),
            Configuration::default(),
        );
        (repository, store, rx)
    }

    async fn started_pipeline(repository: &Repository) -> Workflow {
        let mut workflow = repository
            .create_workflow("PipelineWorkflow", vec![])
            .await
            .unwrap();
        repository.start_workflow(&mut workflow, &[]).await.unwrap();
        workflow
    }

    #[tokio::test]
    async fn create_workflow_rejects_unknown_types() {
        let (repository, _store, _rx) = test_repository();
        let result = repository.create_workflow("NoSuchWorkflow", vec![]).await;
        assert!(matches!(result, Err(Error::WorkflowNotFound(_))));
    }

    #[tokio::test]
    async fn start_workflow_enqueues_only_initial_jobs() {
        let (repository, _store, mut rx) = test_repository();
        let workflow = started_pipeline(&repository).await;

        let QueueMessage::JobExecute { job_name, queue, .. } = rx.try_recv().unwrap();
        assert!(job_name.starts_with("Fetch-"));
        assert_eq!(queue, "gantry");
        assert!(rx.try_recv().is_err());

        let fetch = repository
            .find_job(workflow.id(), "Fetch")
            .await
            .unwrap()
            .unwrap();
        assert!(fetch.is_enqueued());

        let transform = repository
            .find_job(workflow.id(), "Transform")
            .await
            .unwrap()
            .unwrap();
        assert!(!transform.is_enqueued());
    }

    #[tokio::test]
    async fn start_workflow_accepts_an_explicit_subset() {
        let (repository, _store, mut rx) = test_repository();
        let mut workflow = repository
            .create_workflow("PipelineWorkflow", vec![])
            .await
            .unwrap();
        let transform_name = workflow
            .jobs()
            .find(|job| job.klass == "Transform")
            .unwrap()
            .name
            .clone();

        repository
            .start_workflow(&mut workflow, &[transform_name.as_str()])
            .await
            .unwrap();

        let QueueMessage::JobExecute { job_name, .. } = rx.try_recv().unwrap();
        assert_eq!(job_name, transform_name);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn readiness_follows_dependency_outcomes() {
        let (repository, _store, _rx) = test_repository();
        let workflow = started_pipeline(&repository).await;
        let workflow_id = workflow.id();

        let transform = repository
            .find_job(workflow_id, "Transform")
            .await
            .unwrap()
            .unwrap();
        assert!(!repository
            .job_ready_to_start(workflow_id, &transform)
            .await
            .unwrap());

        let mut fetch = repository
            .find_job(workflow_id, "Fetch")
            .await
            .unwrap()
            .unwrap();
        fetch.start();
        fetch.finish();
        repository.persist_job(workflow_id, &fetch).await.unwrap();
        assert!(repository
            .job_ready_to_start(workflow_id, &transform)
            .await
            .unwrap());

        fetch.clear();
        fetch.fail(false);
        repository.persist_job(workflow_id, &fetch).await.unwrap();
        assert!(!repository
            .job_ready_to_start(workflow_id, &transform)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn readiness_is_false_when_a_dependency_record_is_missing() {
        let (repository, _store, _rx) = test_repository();
        let workflow = started_pipeline(&repository).await;
        let workflow_id = workflow.id();

        let fetch = repository
            .find_job(workflow_id, "Fetch")
            .await
            .unwrap()
            .unwrap();
        repository.destroy_job(workflow_id, &fetch).await.unwrap();

        let transform = repository
            .find_job(workflow_id, "Transform")
            .await
            .unwrap()
            .unwrap();
        assert!(!repository
            .job_ready_to_start(workflow_id, &transform)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn find_workflow_round_trips_the_graph() {
        let (repository, _store, _rx) = test_repository();
        let workflow = started_pipeline(&repository).await;

        let loaded = repository.find_workflow(workflow.id()).await.unwrap();

        assert_eq!(loaded.id(), workflow.id());
        assert_eq!(loaded.klass, workflow.klass);
        assert_eq!(loaded.created_at(), workflow.created_at());
        assert_eq!(loaded.is_stopped(), workflow.is_stopped());
        assert!(loaded.is_persisted());

        let mut original: Vec<&str> = workflow.jobs().map(|job| job.name.as_str()).collect();
        let mut reloaded: Vec<&str> = loaded.jobs().map(|job| job.name.as_str()).collect();
        original.sort();
        reloaded.sort();
        assert_eq!(original, reloaded);

        for job in workflow.jobs() {
            let loaded_job = loaded.find_job(&job.name).unwrap();
            assert_eq!(loaded_job.incoming, job.incoming);
            assert_eq!(loaded_job.outgoing, job.outgoing);
            assert_eq!(loaded_job.enqueued_at, job.enqueued_at);
        }
    }

    #[tokio::test]
    async fn find_workflow_fails_for_unknown_ids() {
        let (repository, _store, _rx) = test_repository();
        let result = repository.find_workflow(WorkflowId::new()).await;
        assert!(matches!(result, Err(Error::WorkflowNotFound(_))));
    }

    #[tokio::test]
    async fn find_job_resolves_bare_type_names_by_prefix() {
        let (repository, _store, _rx) = test_repository();
        let workflow = started_pipeline(&repository).await;

        let by_type = repository
            .find_job(workflow.id(), "Fetch")
            .await
            .unwrap()
            .unwrap();
        assert!(by_type.name.starts_with("Fetch-"));

        let by_name = repository
            .find_job(workflow.id(), &by_type.name)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_name.name, by_type.name);

        let missing = repository
            .find_job(workflow.id(), "NoSuchJob")
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn next_free_ids_are_distinct() {
        let (repository, _store, _rx) = test_repository();

        let mut workflow_ids = HashSet::new();
        for _ in 0..5 {
            workflow_ids.insert(repository.next_free_workflow_id().await.unwrap());
        }
        assert_eq!(workflow_ids.len(), 5);

        let workflow_id = WorkflowId::new();
        let mut job_ids = HashSet::new();
        for _ in 0..5 {
            let name = repository
                .next_free_job_id(workflow_id, "Fetch")
                .await
                .unwrap();
            assert!(name.starts_with("Fetch-"));
            job_ids.insert(name);
        }
        assert_eq!(job_ids.len(), 5);
    }

    #[tokio::test]
    async fn first_persist_regenerates_a_taken_id() {
        let (repository, store, _rx) = test_repository();
        let mut workflow = repository
            .create_workflow("PipelineWorkflow", vec![])
            .await
            .unwrap();
        let original_id = workflow.id();

        // Another client claims the allocated id between the probe and the
        // first persist.
        store
            .put(&workflow_key(&original_id), Bytes::from("{}"))
            .await
            .unwrap();

        repository.persist_workflow(&mut workflow).await.unwrap();

        assert_ne!(workflow.id(), original_id);
        for job in workflow.jobs() {
            assert_eq!(job.workflow_id, workflow.id());
        }
        repository.find_workflow(workflow.id()).await.unwrap();
    }

    #[tokio::test]
    async fn restart_clears_descendants_and_re_enqueues_the_named_job() {
        let (repository, _store, mut rx) = test_repository();
        let workflow = started_pipeline(&repository).await;
        let workflow_id = workflow.id();
        rx.try_recv().unwrap();

        // Drive the whole pipeline to completion.
        let mut loaded = repository.find_workflow(workflow_id).await.unwrap();
        let names: Vec<String> = loaded.jobs().map(|job| job.name.clone()).collect();
        for name in &names {
            let job = loaded.find_job_mut(name).unwrap();
            job.start();
            job.finish();
        }
        repository.persist_workflow(&mut loaded).await.unwrap();

        let transform_name = repository
            .find_job(workflow_id, "Transform")
            .await
            .unwrap()
            .unwrap()
            .name;
        repository
            .restart_workflow(workflow_id, &transform_name)
            .await
            .unwrap();

        let QueueMessage::JobExecute { job_name, .. } = rx.try_recv().unwrap();
        assert_eq!(job_name, transform_name);

        let transform = repository
            .find_job(workflow_id, "Transform")
            .await
            .unwrap()
            .unwrap();
        assert!(transform.is_enqueued());
        assert!(!transform.is_finished());

        // Publish is downstream of Transform: fully reset.
        let publish = repository
            .find_job(workflow_id, "Publish")
            .await
            .unwrap()
            .unwrap();
        assert!(publish.enqueued_at.is_none());
        assert!(publish.started_at.is_none());
        assert!(publish.finished_at.is_none());
        assert!(publish.failed_at.is_none());

        // Fetch is upstream: untouched.
        let fetch = repository
            .find_job(workflow_id, "Fetch")
            .await
            .unwrap()
            .unwrap();
        assert!(fetch.is_finished());
    }

    #[tokio::test]
    async fn restart_rejects_unknown_job_names() {
        let (repository, _store, _rx) = test_repository();
        let workflow = started_pipeline(&repository).await;

        let result = repository
            .restart_workflow(workflow.id(), "Missing-1")
            .await;
        assert!(matches!(result, Err(Error::JobNotFound { .. })));
    }

    #[tokio::test]
    async fn stop_workflow_sets_the_stopped_flag() {
        let (repository, _store, _rx) = test_repository();
        let workflow = started_pipeline(&repository).await;

        repository.stop_workflow(workflow.id()).await.unwrap();

        let loaded = repository.find_workflow(workflow.id()).await.unwrap();
        assert!(loaded.is_stopped());
    }

    #[tokio::test]
    async fn destroy_workflow_cascades_to_every_record() {
        let (repository, store, _rx) = test_repository();
        let workflow = started_pipeline(&repository).await;
        let workflow_id = workflow.id();

        repository.destroy_workflow(&workflow).await.unwrap();

        let result = repository.find_workflow(workflow_id).await;
        assert!(matches!(result, Err(Error::WorkflowNotFound(_))));
        let leftover = store
            .scan_prefix(&job_scan_prefix(&workflow_id))
            .await
            .unwrap();
        assert!(leftover.is_empty());
    }

    #[tokio::test]
    async fn expire_workflow_uses_the_configured_ttl() {
        let (dispatcher, _rx) = ChannelDispatcher::new();
        let store = Arc::new(MemoryKvStore::new());
        let repository = Repository::new(
            store.clone(),
            Arc::new(dispatcher),
            pipeline_registry(),
            Configuration {
                ttl: Some(0),
                ..Default::default()
            },
        );

        let workflow = started_pipeline(&repository).await;
        repository.expire_workflow(&workflow, None).await.unwrap();

        let result = repository.find_workflow(workflow.id()).await;
        assert!(matches!(result, Err(Error::WorkflowNotFound(_))));
        let leftover = store
            .scan_prefix(&job_scan_prefix(&workflow.id()))
            .await
            .unwrap();
        assert!(leftover.is_empty());
    }

    #[tokio::test]
    async fn all_workflows_orders_newest_first_and_paginates() {
        let (repository, _store, _rx) = test_repository();

        let first = started_pipeline(&repository).await;
        let second = started_pipeline(&repository).await;
        let third = started_pipeline(&repository).await;

        assert_eq!(repository.all_workflows_size().await.unwrap(), 3);

        let all = repository.all_workflows(None, 0).await.unwrap();
        let ids: Vec<WorkflowId> = all.iter().map(|workflow| workflow.id()).collect();
        assert_eq!(ids, vec![third.id(), second.id(), first.id()]);

        let page = repository.all_workflows(Some(1), 1).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id(), second.id());
    }
}
