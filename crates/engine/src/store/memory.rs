//! In-memory store.
//!
//! Keeps everything behind a single `RwLock`, so a commit is trivially
//! atomic. Tasks are listed in insertion order.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::definition::{Definition, DefinitionStatus};
use crate::engine::state::{Instance, Task};
use crate::error::EngineResult;

use super::{ChangeSet, TaskFilter, WorkflowStore};

#[derive(Debug, Default)]
struct Tables {
    definitions: HashMap<Uuid, Definition>,
    instances: HashMap<Uuid, Instance>,
    tasks: HashMap<Uuid, Task>,
    task_order: Vec<Uuid>,
}

impl Tables {
    fn put_task(&mut self, task: &Task) {
        if self.tasks.insert(task.id, task.clone()).is_none() {
            self.task_order.push(task.id);
        }
    }

    fn ordered_tasks<'a>(&'a self, filter: impl Fn(&Task) -> bool + 'a) -> impl Iterator<Item = &'a Task> + 'a {
        self.task_order
            .iter()
            .filter_map(|id| self.tasks.get(id))
            .filter(move |t| filter(*t))
    }
}

/// Store keeping all records in process memory.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored tasks.
    pub async fn task_count(&self) -> usize {
        self.tables.read().await.tasks.len()
    }
}

#[async_trait]
impl WorkflowStore for InMemoryStore {
    async fn save_definition(&self, definition: &Definition) -> EngineResult<()> {
        let mut tables = self.tables.write().await;
        tables.definitions.insert(definition.id, definition.clone());
        Ok(())
    }

    async fn load_definition(&self, id: Uuid) -> EngineResult<Option<Definition>> {
        Ok(self.tables.read().await.definitions.get(&id).cloned())
    }

    async fn find_definition(&self, name: &str, version: &str) -> EngineResult<Option<Definition>> {
        let tables = self.tables.read().await;
        Ok(tables
            .definitions
            .values()
            .find(|d| d.name == name && d.version == version)
            .cloned())
    }

    async fn transition_definition_status(
        &self,
        id: Uuid,
        from: DefinitionStatus,
        to: DefinitionStatus,
    ) -> EngineResult<bool> {
        let mut tables = self.tables.write().await;
        match tables.definitions.get_mut(&id) {
            Some(def) if def.status == from => {
                def.status = to;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn save_instance(&self, instance: &Instance) -> EngineResult<()> {
        let mut tables = self.tables.write().await;
        tables.instances.insert(instance.id, instance.clone());
        Ok(())
    }

    async fn load_instance(&self, id: Uuid) -> EngineResult<Option<Instance>> {
        Ok(self.tables.read().await.instances.get(&id).cloned())
    }

    async fn save_task(&self, task: &Task) -> EngineResult<()> {
        self.tables.write().await.put_task(task);
        Ok(())
    }

    async fn load_task(&self, id: Uuid) -> EngineResult<Option<Task>> {
        Ok(self.tables.read().await.tasks.get(&id).cloned())
    }

    async fn list_pending_tasks_for_instance(&self, instance_id: Uuid) -> EngineResult<Vec<Task>> {
        let tables = self.tables.read().await;
        Ok(tables
            .ordered_tasks(|t| t.instance_id == instance_id && t.is_pending())
            .cloned()
            .collect())
    }

    async fn list_tasks_for_instance(&self, instance_id: Uuid) -> EngineResult<Vec<Task>> {
        let tables = self.tables.read().await;
        Ok(tables
            .ordered_tasks(|t| t.instance_id == instance_id)
            .cloned()
            .collect())
    }

    async fn list_tasks_for_assignee(
        &self,
        principal: &str,
        filter: &TaskFilter,
    ) -> EngineResult<Vec<Task>> {
        let tables = self.tables.read().await;
        let matching = tables
            .ordered_tasks(|t| t.assignee.as_deref() == Some(principal) && filter.matches(t))
            .cloned();

        Ok(match filter.limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        })
    }

    async fn commit(&self, changes: &ChangeSet) -> EngineResult<()> {
        let mut tables = self.tables.write().await;
        tables
            .instances
            .insert(changes.instance.id, changes.instance.clone());
        for task in &changes.tasks {
            tables.put_task(task);
        }
        Ok(())
    }
}
