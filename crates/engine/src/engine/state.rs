//! Instance and task state.
//!
//! Instances and tasks are plain records; the instance manager is the only
//! component that moves them between statuses.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::definition::{Definition, TaskPriority};

/// Open key/value data carried by an instance.
pub type InstanceData = serde_json::Map<String, serde_json::Value>;

/// Instance-level status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    /// At least one task may still be pending.
    Running,
    /// No pending task remains. Terminal.
    Completed,
}

impl InstanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstanceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            other => Err(format!("unknown instance status '{}'", other)),
        }
    }
}

/// Task-level status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Completed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            other => Err(format!("unknown task status '{}'", other)),
        }
    }
}

/// A running or completed process instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub id: Uuid,
    pub definition_id: Uuid,
    pub definition_version: String,
    pub status: InstanceStatus,
    pub data: InstanceData,
    /// Step identifiers with a pending task, one entry per task.
    pub pending_steps: Vec<String>,
    pub started_by: String,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Instance {
    /// Create a running instance of `definition`.
    pub fn new(
        definition: &Definition,
        data: InstanceData,
        started_by: &str,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            definition_id: definition.id,
            definition_version: definition.version.clone(),
            status: InstanceStatus::Running,
            data,
            pending_steps: Vec::new(),
            started_by: started_by.to_string(),
            started_at,
            completed_at: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == InstanceStatus::Completed
    }
}

/// A unit of work for one step of one instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub instance_id: Uuid,
    pub step_id: String,
    pub status: TaskStatus,
    /// Principal owning the task; `None` means unassigned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    /// Role whose holders may complete the task.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_role: Option<String>,
    pub priority: TaskPriority,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_at: Option<DateTime<Utc>>,
    /// Data supplied on completion.
    #[serde(default)]
    pub data: InstanceData,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn is_pending(&self) -> bool {
        self.status == TaskStatus::Pending
    }
}

/// Read-only projection returned by status queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceStatusView {
    pub instance: Instance,
    pub pending_tasks: Vec<Task>,
    pub completed_tasks: Vec<Task>,
}
