//! NATS task assignment publisher.
//!
//! Publishes one JSON message per assigned task to a JetStream subject.
//! Inbox services subscribe and deliver the human-facing notification.

use async_nats::jetstream::{self, Context};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{Notifier, NotifyError, TaskAssignment};

/// Default NATS subject for task assignment notifications.
pub const DEFAULT_SUBJECT: &str = "taskflow.tasks.assigned";

/// Default JetStream stream name.
pub const DEFAULT_STREAM: &str = "taskflow_tasks";

/// Message published for every assigned task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskAssignedNotification {
    #[serde(flatten)]
    pub assignment: TaskAssignment,

    /// Event name, for subscribers sharing the stream.
    pub event: String,
}

impl From<&TaskAssignment> for TaskAssignedNotification {
    fn from(assignment: &TaskAssignment) -> Self {
        Self {
            assignment: assignment.clone(),
            event: "task.assigned".to_string(),
        }
    }
}

/// NATS JetStream notifier.
#[derive(Clone)]
pub struct NatsNotifier {
    js: Context,
    subject: String,
}

impl NatsNotifier {
    /// Connect to `url` and make sure the stream exists.
    pub async fn connect(
        url: &str,
        subject: Option<&str>,
        stream_name: Option<&str>,
    ) -> Result<Self, NotifyError> {
        let client = async_nats::connect(url)
            .await
            .map_err(|e| NotifyError::Connection(e.to_string()))?;

        let subject = subject.unwrap_or(DEFAULT_SUBJECT).to_string();
        let stream = stream_name.unwrap_or(DEFAULT_STREAM);

        let js = jetstream::new(client);
        Self::ensure_stream(&js, stream, &subject).await?;

        tracing::info!(url = %url, subject = %subject, "NATS notifier connected");
        Ok(Self { js, subject })
    }

    async fn ensure_stream(js: &Context, stream: &str, subject: &str) -> Result<(), NotifyError> {
        match js.get_stream(stream).await {
            Ok(_) => {
                tracing::debug!(stream = %stream, "Using existing NATS stream");
                Ok(())
            }
            Err(_) => {
                let config = jetstream::stream::Config {
                    name: stream.to_string(),
                    subjects: vec![subject.to_string()],
                    max_age: std::time::Duration::from_secs(7 * 24 * 3600),
                    storage: jetstream::stream::StorageType::File,
                    ..Default::default()
                };

                js.create_stream(config)
                    .await
                    .map_err(|e| NotifyError::Connection(e.to_string()))?;

                tracing::info!(stream = %stream, subject = %subject, "Created NATS stream");
                Ok(())
            }
        }
    }
}

#[async_trait]
impl Notifier for NatsNotifier {
    async fn notify_task_assigned(&self, assignment: &TaskAssignment) -> Result<(), NotifyError> {
        let notification = TaskAssignedNotification::from(assignment);
        let payload = serde_json::to_vec(&notification)
            .map_err(|e| NotifyError::Publish(format!("Serialization error: {}", e)))?;

        self.js
            .publish(self.subject.clone(), payload.into())
            .await
            .map_err(|e| NotifyError::Publish(e.to_string()))?
            .await
            .map_err(|e| NotifyError::Publish(e.to_string()))?;

        tracing::debug!(
            task_id = %assignment.task_id,
            instance_id = %assignment.instance_id,
            principal = %assignment.principal,
            "Published task assignment"
        );

        Ok(())
    }
}
