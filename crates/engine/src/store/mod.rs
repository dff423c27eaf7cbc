//! Persistence collaborator.
//!
//! The engine talks to storage only through [`WorkflowStore`]. Every state
//! change produced by one engine operation is handed over as a single
//! [`ChangeSet`], which implementations must apply atomically.

pub mod memory;
pub mod postgres;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::definition::{Definition, DefinitionStatus};
use crate::engine::state::{Instance, Task, TaskStatus};
use crate::error::EngineResult;

pub use memory::InMemoryStore;
pub use postgres::PgStore;

/// Filter for task listings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub instance_id: Option<Uuid>,
    pub limit: Option<usize>,
}

impl TaskFilter {
    pub fn pending() -> Self {
        Self {
            status: Some(TaskStatus::Pending),
            ..Default::default()
        }
    }

    /// Whether `task` passes the status and instance constraints.
    pub fn matches(&self, task: &Task) -> bool {
        self.status.map_or(true, |s| task.status == s)
            && self.instance_id.map_or(true, |id| task.instance_id == id)
    }
}

/// Writes produced by one engine operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeSet {
    /// New state of the affected instance.
    pub instance: Instance,
    /// Created or updated tasks, in creation order.
    pub tasks: Vec<Task>,
}

impl ChangeSet {
    /// Pending tasks contained in this change set.
    pub fn created_tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter().filter(|t| t.is_pending())
    }
}

/// Storage for definitions, instances and tasks.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    async fn save_definition(&self, definition: &Definition) -> EngineResult<()>;

    async fn load_definition(&self, id: Uuid) -> EngineResult<Option<Definition>>;

    async fn find_definition(&self, name: &str, version: &str) -> EngineResult<Option<Definition>>;

    /// Compare-and-set on a definition's status. Returns `false` when the
    /// stored status was not `from`.
    async fn transition_definition_status(
        &self,
        id: Uuid,
        from: DefinitionStatus,
        to: DefinitionStatus,
    ) -> EngineResult<bool>;

    async fn save_instance(&self, instance: &Instance) -> EngineResult<()>;

    async fn load_instance(&self, id: Uuid) -> EngineResult<Option<Instance>>;

    async fn save_task(&self, task: &Task) -> EngineResult<()>;

    async fn load_task(&self, id: Uuid) -> EngineResult<Option<Task>>;

    async fn list_pending_tasks_for_instance(&self, instance_id: Uuid) -> EngineResult<Vec<Task>>;

    async fn list_tasks_for_instance(&self, instance_id: Uuid) -> EngineResult<Vec<Task>>;

    async fn list_tasks_for_assignee(
        &self,
        principal: &str,
        filter: &TaskFilter,
    ) -> EngineResult<Vec<Task>>;

    /// Persist the instance and every task of `changes` as one unit.
    async fn commit(&self, changes: &ChangeSet) -> EngineResult<()>;
}

/// Run a store call, failing with `DependencyUnavailable` after `timeout`.
pub(crate) async fn bounded<T, F>(timeout: Duration, call: F) -> EngineResult<T>
where
    F: Future<Output = EngineResult<T>>,
{
    tokio::time::timeout(timeout, call).await?
}
