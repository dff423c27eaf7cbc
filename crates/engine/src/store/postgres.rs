//! PostgreSQL store.
//!
//! Definitions, instances and tasks live in the `taskflow` schema. A
//! [`ChangeSet`] is written inside one transaction.

use async_trait::async_trait;
use uuid::Uuid;

use crate::db::models::into_tasks;
use crate::db::{ensure_schema, queries, DbPool};
use crate::definition::{Definition, DefinitionStatus};
use crate::engine::state::{Instance, Task, TaskStatus};
use crate::error::EngineResult;

use super::{ChangeSet, TaskFilter, WorkflowStore};

/// Store backed by a PostgreSQL pool.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Create the tables if needed.
    pub async fn ensure_schema(&self) -> EngineResult<()> {
        ensure_schema(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl WorkflowStore for PgStore {
    async fn save_definition(&self, definition: &Definition) -> EngineResult<()> {
        queries::upsert_definition(&self.pool, definition).await?;
        Ok(())
    }

    async fn load_definition(&self, id: Uuid) -> EngineResult<Option<Definition>> {
        queries::get_definition(&self.pool, id)
            .await?
            .map(|row| row.into_definition())
            .transpose()
    }

    async fn find_definition(&self, name: &str, version: &str) -> EngineResult<Option<Definition>> {
        queries::get_definition_by_name_version(&self.pool, name, version)
            .await?
            .map(|row| row.into_definition())
            .transpose()
    }

    async fn transition_definition_status(
        &self,
        id: Uuid,
        from: DefinitionStatus,
        to: DefinitionStatus,
    ) -> EngineResult<bool> {
        let changed =
            queries::update_definition_status(&self.pool, id, from.as_str(), to.as_str()).await?;
        Ok(changed == 1)
    }

    async fn save_instance(&self, instance: &Instance) -> EngineResult<()> {
        queries::upsert_instance(&self.pool, instance).await?;
        Ok(())
    }

    async fn load_instance(&self, id: Uuid) -> EngineResult<Option<Instance>> {
        queries::get_instance(&self.pool, id)
            .await?
            .map(|row| row.into_instance())
            .transpose()
    }

    async fn save_task(&self, task: &Task) -> EngineResult<()> {
        queries::upsert_task(&self.pool, task).await?;
        Ok(())
    }

    async fn load_task(&self, id: Uuid) -> EngineResult<Option<Task>> {
        queries::get_task(&self.pool, id)
            .await?
            .map(|row| row.into_task())
            .transpose()
    }

    async fn list_pending_tasks_for_instance(&self, instance_id: Uuid) -> EngineResult<Vec<Task>> {
        let rows = queries::list_tasks_for_instance(
            &self.pool,
            instance_id,
            Some(TaskStatus::Pending.as_str()),
        )
        .await?;
        into_tasks(rows)
    }

    async fn list_tasks_for_instance(&self, instance_id: Uuid) -> EngineResult<Vec<Task>> {
        let rows = queries::list_tasks_for_instance(&self.pool, instance_id, None).await?;
        into_tasks(rows)
    }

    async fn list_tasks_for_assignee(
        &self,
        principal: &str,
        filter: &TaskFilter,
    ) -> EngineResult<Vec<Task>> {
        let rows = queries::list_tasks_for_assignee(
            &self.pool,
            principal,
            filter.status.map(|s| s.as_str()),
            filter.instance_id,
            filter.limit.map(|l| l as i64),
        )
        .await?;
        into_tasks(rows)
    }

    async fn commit(&self, changes: &ChangeSet) -> EngineResult<()> {
        let mut tx = self.pool.begin().await?;

        queries::upsert_instance(&mut *tx, &changes.instance).await?;
        for task in &changes.tasks {
            queries::upsert_task(&mut *tx, task).await?;
        }

        tx.commit().await?;

        tracing::debug!(
            instance_id = %changes.instance.id,
            tasks = changes.tasks.len(),
            "Committed change set"
        );
        Ok(())
    }
}
