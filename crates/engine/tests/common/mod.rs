//! Shared harness for engine integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Semaphore;
use uuid::Uuid;

use taskflow_engine::config::EngineConfig;
use taskflow_engine::definition::{parse_definition_yaml, Definition, DefinitionStatus};
use taskflow_engine::directory::{Directory, StaticDirectory};
use taskflow_engine::engine::{Instance, InstanceData, Task};
use taskflow_engine::notify::{Notifier, NotifyError, TaskAssignment};
use taskflow_engine::store::{ChangeSet, InMemoryStore, TaskFilter, WorkflowStore};
use taskflow_engine::{EngineError, EngineResult, WorkflowEngine};

pub const PURCHASE: &str = include_str!("../fixtures/purchase_request.yaml");
pub const CONTRACT: &str = include_str!("../fixtures/contract_review.yaml");

pub fn data(value: Value) -> InstanceData {
    value.as_object().cloned().unwrap_or_default()
}

pub fn definition(yaml: &str) -> Definition {
    parse_definition_yaml(yaml).unwrap()
}

pub fn directory() -> StaticDirectory {
    StaticDirectory::new()
        .with_role("reviewer", ["rita", "rob"])
        .with_role("clerk", ["carl"])
}

/// Notifier that remembers every assignment.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<TaskAssignment>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<TaskAssignment> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_task_assigned(&self, assignment: &TaskAssignment) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(assignment.clone());
        Ok(())
    }
}

/// Notifier that always fails, or never answers.
pub enum BrokenNotifier {
    Failing,
    Hanging,
}

#[async_trait]
impl Notifier for BrokenNotifier {
    async fn notify_task_assigned(&self, _assignment: &TaskAssignment) -> Result<(), NotifyError> {
        match self {
            BrokenNotifier::Failing => Err(NotifyError::Publish("broker down".to_string())),
            BrokenNotifier::Hanging => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            }
        }
    }
}

/// Directory whose role checks for `gated` principals wait for a permit.
pub struct GatedDirectory {
    inner: StaticDirectory,
    gated: String,
    pub gate: Semaphore,
}

impl GatedDirectory {
    pub fn new(inner: StaticDirectory, gated: &str) -> Self {
        Self {
            inner,
            gated: gated.to_string(),
            gate: Semaphore::new(0),
        }
    }
}

#[async_trait]
impl Directory for GatedDirectory {
    async fn find_principals_by_role(&self, role: &str) -> EngineResult<Vec<String>> {
        self.inner.find_principals_by_role(role).await
    }

    async fn principal_has_role(&self, principal: &str, role: &str) -> EngineResult<bool> {
        if principal == self.gated {
            let _permit = self
                .gate
                .acquire()
                .await
                .map_err(|e| EngineError::DependencyUnavailable(e.to_string()))?;
        }
        self.inner.principal_has_role(principal, role).await
    }
}

/// Store wrapper whose commits can be made to fail or stall.
#[derive(Default)]
pub struct FlakyStore {
    pub inner: InMemoryStore,
    pub fail_commits: AtomicBool,
    pub stall_commits: AtomicBool,
}

#[async_trait]
impl WorkflowStore for FlakyStore {
    async fn save_definition(&self, definition: &Definition) -> EngineResult<()> {
        self.inner.save_definition(definition).await
    }

    async fn load_definition(&self, id: Uuid) -> EngineResult<Option<Definition>> {
        self.inner.load_definition(id).await
    }

    async fn find_definition(&self, name: &str, version: &str) -> EngineResult<Option<Definition>> {
        self.inner.find_definition(name, version).await
    }

    async fn transition_definition_status(
        &self,
        id: Uuid,
        from: DefinitionStatus,
        to: DefinitionStatus,
    ) -> EngineResult<bool> {
        self.inner.transition_definition_status(id, from, to).await
    }

    async fn save_instance(&self, instance: &Instance) -> EngineResult<()> {
        self.inner.save_instance(instance).await
    }

    async fn load_instance(&self, id: Uuid) -> EngineResult<Option<Instance>> {
        self.inner.load_instance(id).await
    }

    async fn save_task(&self, task: &Task) -> EngineResult<()> {
        self.inner.save_task(task).await
    }

    async fn load_task(&self, id: Uuid) -> EngineResult<Option<Task>> {
        self.inner.load_task(id).await
    }

    async fn list_pending_tasks_for_instance(&self, instance_id: Uuid) -> EngineResult<Vec<Task>> {
        self.inner.list_pending_tasks_for_instance(instance_id).await
    }

    async fn list_tasks_for_instance(&self, instance_id: Uuid) -> EngineResult<Vec<Task>> {
        self.inner.list_tasks_for_instance(instance_id).await
    }

    async fn list_tasks_for_assignee(
        &self,
        principal: &str,
        filter: &TaskFilter,
    ) -> EngineResult<Vec<Task>> {
        self.inner.list_tasks_for_assignee(principal, filter).await
    }

    async fn commit(&self, changes: &ChangeSet) -> EngineResult<()> {
        if self.stall_commits.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(EngineError::DependencyUnavailable("disk full".to_string()));
        }
        self.inner.commit(changes).await
    }
}

/// Engine over an in-memory store with the test directory.
pub struct Harness {
    pub engine: WorkflowEngine,
    pub store: Arc<InMemoryStore>,
    pub notifier: Arc<RecordingNotifier>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_directory(Arc::new(directory()))
    }

    pub fn with_directory(directory: Arc<dyn Directory>) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let engine = WorkflowEngine::new(
            store.clone(),
            directory,
            notifier.clone(),
            &EngineConfig::default(),
        );
        Self {
            engine,
            store,
            notifier,
        }
    }

    /// Define and activate `yaml`, returning the definition ID.
    pub async fn deploy(&self, yaml: &str) -> Uuid {
        let id = self.engine.define_workflow(definition(yaml)).await.unwrap();
        self.engine.activate_workflow(id).await.unwrap();
        id
    }

    pub async fn pending(&self, instance_id: Uuid) -> Vec<Task> {
        self.engine
            .get_instance_status(instance_id)
            .await
            .unwrap()
            .pending_tasks
    }

    pub async fn pending_step(&self, instance_id: Uuid, step: &str) -> Task {
        self.pending(instance_id)
            .await
            .into_iter()
            .find(|t| t.step_id == step)
            .unwrap_or_else(|| panic!("no pending task for step '{}'", step))
    }
}

/// Deploy `yaml` on an arbitrary engine.
pub async fn deploy(engine: &WorkflowEngine, yaml: &str) -> Uuid {
    let id = engine.define_workflow(definition(yaml)).await.unwrap();
    engine.activate_workflow(id).await.unwrap();
    id
}
