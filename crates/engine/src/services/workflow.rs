//! Workflow engine facade.
//!
//! Validates inputs, delegates to the instance manager, commits the
//! resulting change sets and sends assignment notifications once the
//! instance lock has been released.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::definition::{validate, Definition, DefinitionStatus, ValidationReport};
use crate::directory::Directory;
use crate::engine::{
    Instance, InstanceData, InstanceManager, InstanceStatus, InstanceStatusView, Task, TaskStore,
};
use crate::error::{EngineError, EngineResult};
use crate::notify::{Notifier, NotifyError, TaskAssignment};
use crate::result_ext::{OptionResultExt, ResultExt};
use crate::store::{bounded, ChangeSet, TaskFilter, WorkflowStore};

use super::locks::InstanceLocks;

/// Outcome of a task completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskCompletion {
    pub instance_id: Uuid,
    pub instance_status: InstanceStatus,
    /// Tasks created by the transitions that fired.
    pub created_tasks: Vec<Task>,
}

/// Public entry point of the engine.
#[derive(Clone)]
pub struct WorkflowEngine {
    store: Arc<dyn WorkflowStore>,
    tasks: TaskStore,
    notifier: Arc<dyn Notifier>,
    manager: InstanceManager,
    locks: InstanceLocks,
    persistence_timeout: Duration,
    notification_timeout: Duration,
}

impl WorkflowEngine {
    pub fn new(
        store: Arc<dyn WorkflowStore>,
        directory: Arc<dyn Directory>,
        notifier: Arc<dyn Notifier>,
        config: &EngineConfig,
    ) -> Self {
        let persistence_timeout = config.persistence_timeout();
        Self {
            tasks: TaskStore::new(store.clone(), persistence_timeout),
            manager: InstanceManager::new(directory, persistence_timeout),
            store,
            notifier,
            locks: InstanceLocks::new(),
            persistence_timeout,
            notification_timeout: config.notification_timeout(),
        }
    }

    /// Check a definition without storing it.
    pub fn validate_definition(&self, definition: &Definition) -> ValidationReport {
        validate(definition)
    }

    /// Store a new definition as a draft and return its ID.
    ///
    /// Fails with `ValidationFailed` on any structural error and with
    /// `InvalidState` if the name and version are already taken.
    pub async fn define_workflow(&self, mut definition: Definition) -> EngineResult<Uuid> {
        let report = validate(&definition);
        if !report.is_ok() {
            warn!(
                definition = %definition.name,
                version = %definition.version,
                errors = report.errors.len(),
                "Definition rejected"
            );
            return Err(EngineError::ValidationFailed(report));
        }
        for issue in &report.warnings {
            warn!(definition = %definition.name, warning = %issue, "Definition warning");
        }

        let existing = bounded(
            self.persistence_timeout,
            self.store.find_definition(&definition.name, &definition.version),
        )
        .await?;
        if existing.is_some() {
            return Err(EngineError::InvalidState(format!(
                "definition '{}' version {} already exists",
                definition.name, definition.version
            )));
        }
        if bounded(self.persistence_timeout, self.store.load_definition(definition.id))
            .await?
            .is_some()
        {
            return Err(EngineError::InvalidState(format!(
                "definition id '{}' already exists",
                definition.id
            )));
        }

        definition.status = DefinitionStatus::Draft;
        definition.created_at = Some(Utc::now());
        bounded(self.persistence_timeout, self.store.save_definition(&definition)).await?;

        info!(
            definition_id = %definition.id,
            definition = %definition.name,
            version = %definition.version,
            "Definition stored"
        );
        Ok(definition.id)
    }

    /// Flip a draft definition to active.
    ///
    /// Guarded by a compare-and-set on the stored status: of two racing
    /// activations exactly one succeeds, the other gets `InvalidState`.
    pub async fn activate_workflow(&self, definition_id: Uuid) -> EngineResult<()> {
        let definition = self.get_definition(definition_id).await?;
        if definition.is_active() {
            return Err(EngineError::InvalidState(format!(
                "definition '{}' is already active",
                definition_id
            )));
        }

        let report = validate(&definition);
        if !report.is_ok() {
            return Err(EngineError::ValidationFailed(report));
        }

        let switched = bounded(
            self.persistence_timeout,
            self.store.transition_definition_status(
                definition_id,
                DefinitionStatus::Draft,
                DefinitionStatus::Active,
            ),
        )
        .await?;
        if !switched {
            return Err(EngineError::InvalidState(format!(
                "definition '{}' was activated concurrently",
                definition_id
            )));
        }

        info!(
            definition_id = %definition_id,
            definition = %definition.name,
            version = %definition.version,
            "Definition activated"
        );
        Ok(())
    }

    pub async fn get_definition(&self, definition_id: Uuid) -> EngineResult<Definition> {
        bounded(self.persistence_timeout, self.store.load_definition(definition_id))
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("definition '{}' not found", definition_id)))
    }

    /// Start an instance of an active definition and return its ID.
    pub async fn start_instance(
        &self,
        definition_id: Uuid,
        data: InstanceData,
        started_by: &str,
    ) -> EngineResult<Uuid> {
        if started_by.trim().is_empty() {
            return Err(EngineError::Forbidden(
                "an instance must be started by a principal".to_string(),
            ));
        }

        let definition = self.get_definition(definition_id).await?;
        let changes = self
            .manager
            .start(&definition, data, started_by, Utc::now())
            .await?;
        bounded(self.persistence_timeout, self.store.commit(&changes)).await?;

        let instance_id = changes.instance.id;
        self.notify_created(&changes).await;
        Ok(instance_id)
    }

    /// Complete a pending task and advance its instance.
    ///
    /// Completions of tasks of the same instance are serialized; on any
    /// failure nothing is written.
    pub async fn complete_task(
        &self,
        task_id: Uuid,
        data: InstanceData,
        principal: &str,
    ) -> EngineResult<TaskCompletion> {
        let instance_id = self.tasks.get(task_id).await?.instance_id;

        let guard = self.locks.acquire(instance_id).await;
        let result = self.complete_locked(task_id, data, principal).await;
        drop(guard);

        let changes = match result {
            Ok(changes) => changes,
            Err(err) => {
                self.locks.release(instance_id);
                debug!(task_id = %task_id, principal = %principal, error = %err, "Task completion rejected");
                return Err(err);
            }
        };

        if changes.instance.is_completed() {
            self.locks.release(instance_id);
        }

        self.notify_created(&changes).await;

        let ChangeSet { instance, tasks } = changes;
        Ok(TaskCompletion {
            instance_id: instance.id,
            instance_status: instance.status,
            created_tasks: tasks.into_iter().filter(Task::is_pending).collect(),
        })
    }

    async fn complete_locked(
        &self,
        task_id: Uuid,
        data: InstanceData,
        principal: &str,
    ) -> EngineResult<ChangeSet> {
        // Re-read under the lock; a concurrent caller may have completed it.
        let task = self.tasks.get(task_id).await?;
        let instance = self.load_instance(task.instance_id).await?;
        let definition = self.get_definition(instance.definition_id).await?;
        let pending = self.tasks.pending_for_instance(instance.id).await?;

        let changes = self
            .manager
            .complete_task(
                &definition,
                instance,
                task,
                &pending,
                data,
                principal,
                Utc::now(),
            )
            .await?;
        bounded(self.persistence_timeout, self.store.commit(&changes)).await?;
        Ok(changes)
    }

    /// Instance record with its tasks split by status.
    pub async fn get_instance_status(&self, instance_id: Uuid) -> EngineResult<InstanceStatusView> {
        let instance = self.load_instance(instance_id).await?;
        let (pending_tasks, completed_tasks) = self
            .tasks
            .for_instance(instance_id)
            .await?
            .into_iter()
            .partition(Task::is_pending);

        Ok(InstanceStatusView {
            instance,
            pending_tasks,
            completed_tasks,
        })
    }

    /// Instances where `principal` has at least one pending task, in the
    /// order their first such task was created.
    pub async fn list_instances_for_assignee(&self, principal: &str) -> EngineResult<Vec<Instance>> {
        let pending = self.tasks.for_assignee(principal, &TaskFilter::pending()).await?;

        let mut ids: Vec<Uuid> = Vec::new();
        for task in &pending {
            if !ids.contains(&task.instance_id) {
                ids.push(task.instance_id);
            }
        }

        let mut instances = Vec::with_capacity(ids.len());
        for id in ids {
            instances.push(self.load_instance(id).await?);
        }
        Ok(instances)
    }

    pub async fn list_tasks_for_assignee(
        &self,
        principal: &str,
        filter: &TaskFilter,
    ) -> EngineResult<Vec<Task>> {
        self.tasks.for_assignee(principal, filter).await
    }

    async fn load_instance(&self, instance_id: Uuid) -> EngineResult<Instance> {
        bounded(self.persistence_timeout, self.store.load_instance(instance_id))
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("instance '{}' not found", instance_id)))
    }

    /// Notify the assignee of every task created by `changes`. Deliveries
    /// run concurrently, so the batch takes at most one notification timeout.
    /// Failures are logged and never reach the caller.
    async fn notify_created(&self, changes: &ChangeSet) {
        let deliveries = changes.created_tasks().filter_map(|task| {
            TaskAssignment::for_task(task)
                .log_none(format!("task '{}' is unassigned, nobody to notify", task.id))
                .map(|assignment| self.deliver(assignment))
        });
        join_all(deliveries).await;
    }

    async fn deliver(&self, assignment: TaskAssignment) {
        let delivery = tokio::time::timeout(
            self.notification_timeout,
            self.notifier.notify_task_assigned(&assignment),
        )
        .await
        .unwrap_or_else(|_| {
            Err(NotifyError::Timeout(
                self.notification_timeout.as_millis() as u64,
            ))
        });

        let _ = delivery.log_warn(format!(
            "notify '{}' of task '{}' in instance '{}'",
            assignment.principal, assignment.task_id, assignment.instance_id
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{Step, StepKind, Transition};
    use crate::directory::StaticDirectory;
    use crate::notify::LogNotifier;
    use crate::store::InMemoryStore;

    fn engine() -> WorkflowEngine {
        WorkflowEngine::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(StaticDirectory::new()),
            Arc::new(LogNotifier),
            &EngineConfig::default(),
        )
    }

    fn two_steps() -> Definition {
        Definition::new(
            "leave",
            "1.0.0",
            "request",
            vec![
                Step::new("request", StepKind::Task).with_transition(Transition::to("done")),
                Step::new("done", StepKind::End),
            ],
        )
    }

    #[tokio::test]
    async fn test_define_stores_draft_and_rejects_duplicates() {
        let engine = engine();
        let mut def = two_steps();
        def.status = DefinitionStatus::Active;

        let id = engine.define_workflow(def).await.unwrap();
        let stored = engine.get_definition(id).await.unwrap();
        assert_eq!(stored.status, DefinitionStatus::Draft);
        assert!(stored.created_at.is_some());

        let err = engine.define_workflow(two_steps()).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_define_rejects_invalid_definition() {
        let engine = engine();
        let mut def = two_steps();
        def.steps[0].transitions.push(Transition::to("nowhere"));

        assert!(!engine.validate_definition(&def).is_ok());
        let err = engine.define_workflow(def).await.unwrap_err();
        assert!(matches!(err, EngineError::ValidationFailed(_)));
    }

    #[tokio::test]
    async fn test_start_requires_principal_and_active_definition() {
        let engine = engine();
        let id = engine.define_workflow(two_steps()).await.unwrap();

        let err = engine.start_instance(id, InstanceData::new(), "alice").await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidState(_)));

        engine.activate_workflow(id).await.unwrap();
        let err = engine.start_instance(id, InstanceData::new(), " ").await.unwrap_err();
        assert!(matches!(err, EngineError::Forbidden(_)));

        let err = engine.activate_workflow(id).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_complete_last_task_releases_lock() {
        let engine = engine();
        let id = engine.define_workflow(two_steps()).await.unwrap();
        engine.activate_workflow(id).await.unwrap();

        let instance_id = engine.start_instance(id, InstanceData::new(), "alice").await.unwrap();
        let status = engine.get_instance_status(instance_id).await.unwrap();
        let task_id = status.pending_tasks[0].id;

        let completion = engine.complete_task(task_id, InstanceData::new(), "alice").await.unwrap();
        assert_eq!(completion.instance_status, InstanceStatus::Completed);
        assert!(completion.created_tasks.is_empty());
        assert!(engine.locks.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_ids_are_not_found() {
        let engine = engine();
        assert!(matches!(
            engine.get_instance_status(Uuid::new_v4()).await,
            Err(EngineError::NotFound(_))
        ));
        assert!(matches!(
            engine.complete_task(Uuid::new_v4(), InstanceData::new(), "alice").await,
            Err(EngineError::NotFound(_))
        ));
        assert!(matches!(
            engine.activate_workflow(Uuid::new_v4()).await,
            Err(EngineError::NotFound(_))
        ));
    }
}
