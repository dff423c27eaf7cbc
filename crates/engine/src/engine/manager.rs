//! Instance manager - the state machine core.
//!
//! Computes the writes for starting an instance and for completing a task.
//! The manager never touches storage: it receives loaded records and returns
//! a [`ChangeSet`] which the caller commits as one unit. Callers must hold
//! the instance's exclusive section while the change set is computed and
//! committed.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::definition::{Definition, Step, StepKind};
use crate::directory::Directory;
use crate::error::{EngineError, EngineResult};
use crate::store::ChangeSet;

use super::assignee::AssigneeResolver;
use super::evaluator::ConditionEvaluator;
use super::state::{Instance, InstanceData, InstanceStatus, Task, TaskStatus};

/// Instance state machine.
#[derive(Clone)]
pub struct InstanceManager {
    evaluator: ConditionEvaluator,
    resolver: AssigneeResolver,
    directory: Arc<dyn Directory>,
    timeout: Duration,
}

impl InstanceManager {
    /// Create a manager resolving roles through `directory`, with every
    /// directory call bounded by `timeout`.
    pub fn new(directory: Arc<dyn Directory>, timeout: Duration) -> Self {
        Self {
            evaluator: ConditionEvaluator::new(),
            resolver: AssigneeResolver::new(directory.clone(), timeout),
            directory,
            timeout,
        }
    }

    /// Start an instance of an active definition.
    ///
    /// Creates the running instance and exactly one pending task for the
    /// designated start step.
    pub async fn start(
        &self,
        definition: &Definition,
        data: InstanceData,
        started_by: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<ChangeSet> {
        if !definition.is_active() {
            return Err(EngineError::InvalidState(format!(
                "definition '{}' version {} is {}, not active",
                definition.name, definition.version, definition.status
            )));
        }

        let start = definition.start_step().ok_or_else(|| {
            EngineError::InvalidState(format!(
                "start step '{}' missing from definition '{}'",
                definition.start, definition.name
            ))
        })?;

        let mut instance = Instance::new(definition, data, started_by, now);
        let task = self.create_task(&instance, start, started_by, now).await?;
        instance.pending_steps = vec![task.step_id.clone()];

        info!(
            instance_id = %instance.id,
            definition = %definition.name,
            version = %definition.version,
            step = %start.id,
            principal = %started_by,
            "Instance started"
        );

        Ok(ChangeSet {
            instance,
            tasks: vec![task],
        })
    }

    /// Check that `principal` may complete `task`.
    ///
    /// Allowed when the principal is the assignee, when the directory
    /// confirms the principal holds the task's role, or when the task has
    /// neither assignee nor role.
    pub async fn authorize(&self, task: &Task, principal: &str) -> EngineResult<()> {
        if task.assignee.as_deref() == Some(principal) {
            return Ok(());
        }

        if let Some(role) = &task.assigned_role {
            let has_role = tokio::time::timeout(
                self.timeout,
                self.directory.principal_has_role(principal, role),
            )
            .await??;
            if has_role {
                return Ok(());
            }
        } else if task.assignee.is_none() {
            return Ok(());
        }

        Err(EngineError::Forbidden(format!(
            "principal '{}' may not complete task '{}'",
            principal, task.id
        )))
    }

    /// Complete `task` and advance the instance.
    ///
    /// `pending` must hold the instance's pending tasks as currently stored
    /// (it may include `task` itself). The returned change set contains the
    /// completed task followed by every newly created task.
    #[allow(clippy::too_many_arguments)]
    pub async fn complete_task(
        &self,
        definition: &Definition,
        mut instance: Instance,
        mut task: Task,
        pending: &[Task],
        completion_data: InstanceData,
        principal: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<ChangeSet> {
        if !task.is_pending() {
            return Err(EngineError::InvalidState(format!(
                "task '{}' is already {}",
                task.id, task.status
            )));
        }

        if instance.is_completed() {
            return Err(EngineError::InvalidState(format!(
                "instance '{}' is already completed",
                instance.id
            )));
        }

        if task.instance_id != instance.id || instance.definition_id != definition.id {
            return Err(EngineError::InvalidState(format!(
                "task '{}' does not belong to instance '{}'",
                task.id, instance.id
            )));
        }

        self.authorize(&task, principal).await?;

        let step = definition.step(&task.step_id).ok_or_else(|| {
            EngineError::InvalidState(format!(
                "step '{}' missing from definition '{}'",
                task.step_id, definition.name
            ))
        })?;

        task.status = TaskStatus::Completed;
        task.completed_by = Some(principal.to_string());
        task.completed_at = Some(now);
        for (key, value) in &completion_data {
            instance.data.insert(key.clone(), value.clone());
        }
        task.data = completion_data;

        info!(
            instance_id = %instance.id,
            task_id = %task.id,
            step = %task.step_id,
            principal = %principal,
            "Task completed"
        );

        let created = self
            .resolve_transitions(definition, step, &instance, principal, now)
            .await?;

        instance.pending_steps = pending
            .iter()
            .filter(|t| t.id != task.id && t.is_pending())
            .chain(created.iter())
            .map(|t| t.step_id.clone())
            .collect();

        if instance.pending_steps.is_empty() {
            instance.status = InstanceStatus::Completed;
            instance.completed_at = Some(now);
            info!(instance_id = %instance.id, "Instance completed");
        }

        let mut tasks = Vec::with_capacity(created.len() + 1);
        tasks.push(task);
        tasks.extend(created);

        Ok(ChangeSet { instance, tasks })
    }

    /// Create tasks for every step reached from `from`.
    ///
    /// Transitions are evaluated against the instance's current data in
    /// declared order. End targets stop the branch, gateway targets are
    /// routed through immediately, anything else gets a pending task.
    async fn resolve_transitions(
        &self,
        definition: &Definition,
        from: &Step,
        instance: &Instance,
        principal: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<Vec<Task>> {
        let mut created = Vec::new();
        // Each entry carries the gateways already routed on its own path.
        let mut frontier: VecDeque<(&Step, HashSet<&str>)> =
            VecDeque::from([(from, HashSet::new())]);

        while let Some((current, path)) = frontier.pop_front() {
            for transition in self.evaluator.evaluate_next(current, &instance.data) {
                let target = definition.step(&transition.to).ok_or_else(|| {
                    EngineError::InvalidState(format!(
                        "transition from '{}' targets unknown step '{}'",
                        current.id, transition.to
                    ))
                })?;

                debug!(
                    instance_id = %instance.id,
                    from = %current.id,
                    to = %target.id,
                    "Transition fired"
                );

                match target.kind {
                    StepKind::End => {
                        debug!(instance_id = %instance.id, step = %target.id, "Branch reached end");
                    }
                    StepKind::Gateway => {
                        if path.contains(target.id.as_str()) {
                            warn!(
                                instance_id = %instance.id,
                                step = %target.id,
                                "Gateway cycle on this branch, skipping"
                            );
                        } else {
                            let mut branch = path.clone();
                            branch.insert(target.id.as_str());
                            frontier.push_back((target, branch));
                        }
                    }
                    _ => {
                        created.push(self.create_task(instance, target, principal, now).await?);
                    }
                }
            }
        }

        Ok(created)
    }

    async fn create_task(
        &self,
        instance: &Instance,
        step: &Step,
        principal: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<Task> {
        let assignment = self
            .resolver
            .resolve(step.assign.as_ref(), &instance.data, principal)
            .await?;

        let due_at = step
            .due_in_seconds
            .and_then(|secs| i64::try_from(secs).ok())
            .and_then(TimeDelta::try_seconds)
            .and_then(|delta| now.checked_add_signed(delta));

        debug!(
            instance_id = %instance.id,
            step = %step.id,
            name = %step.display_name(),
            assignee = ?assignment.principal,
            role = ?assignment.role,
            "Task created"
        );

        Ok(Task {
            id: Uuid::new_v4(),
            instance_id: instance.id,
            step_id: step.id.clone(),
            status: TaskStatus::Pending,
            assignee: assignment.principal,
            assigned_role: assignment.role,
            priority: step.priority,
            due_at,
            data: InstanceData::new(),
            completed_by: None,
            completed_at: None,
            created_at: now,
        })
    }
}
