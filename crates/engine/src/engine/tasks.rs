//! Task store adapter.
//!
//! Thin wrapper over the persistence collaborator for task records: bounds
//! every call with the persistence timeout and turns missing records into
//! `NotFound`.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::store::{bounded, TaskFilter, WorkflowStore};

use super::state::Task;

/// Task record access for the engine.
#[derive(Clone)]
pub struct TaskStore {
    store: Arc<dyn WorkflowStore>,
    timeout: Duration,
}

impl TaskStore {
    pub fn new(store: Arc<dyn WorkflowStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Load a task, failing with `NotFound` if it does not exist.
    pub async fn get(&self, id: Uuid) -> EngineResult<Task> {
        bounded(self.timeout, self.store.load_task(id))
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("task '{}' not found", id)))
    }

    pub async fn pending_for_instance(&self, instance_id: Uuid) -> EngineResult<Vec<Task>> {
        bounded(
            self.timeout,
            self.store.list_pending_tasks_for_instance(instance_id),
        )
        .await
    }

    pub async fn for_instance(&self, instance_id: Uuid) -> EngineResult<Vec<Task>> {
        bounded(self.timeout, self.store.list_tasks_for_instance(instance_id)).await
    }

    pub async fn for_assignee(&self, principal: &str, filter: &TaskFilter) -> EngineResult<Vec<Task>> {
        bounded(
            self.timeout,
            self.store.list_tasks_for_assignee(principal, filter),
        )
        .await
    }
}
