//! Task assignment notifications.
//!
//! Notification delivery is best-effort: the engine logs failures and never
//! lets them affect the outcome of the operation that created the task.

pub mod nats;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::definition::TaskPriority;
use crate::engine::state::Task;

pub use nats::NatsNotifier;

/// Errors that can occur while delivering a notification.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Notification connection error: {0}")]
    Connection(String),

    #[error("Notification publish error: {0}")]
    Publish(String),

    #[error("Notification timed out after {0} ms")]
    Timeout(u64),
}

/// Payload describing a newly assigned task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskAssignment {
    pub task_id: Uuid,
    pub instance_id: Uuid,
    pub step_id: String,
    pub principal: String,
    pub priority: TaskPriority,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_at: Option<DateTime<Utc>>,
}

impl TaskAssignment {
    /// Build the payload for `task`; unassigned tasks have no target.
    pub fn for_task(task: &Task) -> Option<Self> {
        let principal = task.assignee.clone()?;
        Some(Self {
            task_id: task.id,
            instance_id: task.instance_id,
            step_id: task.step_id.clone(),
            principal,
            priority: task.priority,
            due_at: task.due_at,
        })
    }
}

/// Notification collaborator.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_task_assigned(&self, assignment: &TaskAssignment) -> Result<(), NotifyError>;
}

/// Notifier that only writes a log line.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify_task_assigned(&self, assignment: &TaskAssignment) -> Result<(), NotifyError> {
        tracing::info!(
            principal = %assignment.principal,
            instance_id = %assignment.instance_id,
            task_id = %assignment.task_id,
            step = %assignment.step_id,
            "Task assigned"
        );
        Ok(())
    }
}
