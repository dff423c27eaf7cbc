//! Database row models.
//!
//! Rows mirror the `taskflow` schema; enum columns are stored as text and
//! open data as JSONB.

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use crate::definition::Definition;
use crate::engine::state::{Instance, InstanceData, Task};
use crate::error::{EngineError, EngineResult};

fn corrupt(what: &str, id: Uuid, reason: String) -> EngineError {
    EngineError::DependencyUnavailable(format!("stored {} '{}' is invalid: {}", what, id, reason))
}

/// Row of `taskflow.definition`.
#[derive(Debug, Clone, FromRow)]
pub struct DefinitionRow {
    pub id: Uuid,
    pub name: String,
    pub version: String,
    pub status: String,
    pub body: Json<Definition>,
    pub created_at: DateTime<Utc>,
}

impl DefinitionRow {
    /// Convert to the domain type; the status column wins over the body.
    pub fn into_definition(self) -> EngineResult<Definition> {
        let mut definition = self.body.0;
        definition.id = self.id;
        definition.status = self
            .status
            .parse()
            .map_err(|e| corrupt("definition", self.id, e))?;
        definition.created_at = Some(self.created_at);
        Ok(definition)
    }
}

/// Row of `taskflow.instance`.
#[derive(Debug, Clone, FromRow)]
pub struct InstanceRow {
    pub id: Uuid,
    pub definition_id: Uuid,
    pub definition_version: String,
    pub status: String,
    pub data: Json<InstanceData>,
    pub pending_steps: Json<Vec<String>>,
    pub started_by: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl InstanceRow {
    pub fn into_instance(self) -> EngineResult<Instance> {
        Ok(Instance {
            status: self
                .status
                .parse()
                .map_err(|e| corrupt("instance", self.id, e))?,
            id: self.id,
            definition_id: self.definition_id,
            definition_version: self.definition_version,
            data: self.data.0,
            pending_steps: self.pending_steps.0,
            started_by: self.started_by,
            started_at: self.started_at,
            completed_at: self.completed_at,
        })
    }
}

/// Row of `taskflow.task`.
#[derive(Debug, Clone, FromRow)]
pub struct TaskRow {
    pub id: Uuid,
    pub instance_id: Uuid,
    pub step_id: String,
    pub status: String,
    pub assignee: Option<String>,
    pub assigned_role: Option<String>,
    pub priority: String,
    pub due_at: Option<DateTime<Utc>>,
    pub data: Json<InstanceData>,
    pub completed_by: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl TaskRow {
    pub fn into_task(self) -> EngineResult<Task> {
        Ok(Task {
            status: self.status.parse().map_err(|e| corrupt("task", self.id, e))?,
            priority: self
                .priority
                .parse()
                .map_err(|e| corrupt("task", self.id, e))?,
            id: self.id,
            instance_id: self.instance_id,
            step_id: self.step_id,
            assignee: self.assignee,
            assigned_role: self.assigned_role,
            due_at: self.due_at,
            data: self.data.0,
            completed_by: self.completed_by,
            completed_at: self.completed_at,
            created_at: self.created_at,
        })
    }
}

/// Convert a batch of task rows.
pub fn into_tasks(rows: Vec<TaskRow>) -> EngineResult<Vec<Task>> {
    rows.into_iter().map(TaskRow::into_task).collect()
}
