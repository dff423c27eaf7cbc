//! SQL queries over the `taskflow` schema.
//!
//! Every function takes an executor so the same query runs against the pool
//! or inside a transaction.

use chrono::Utc;
use sqlx::types::Json;
use sqlx::PgExecutor;
use uuid::Uuid;

use crate::db::models::{DefinitionRow, InstanceRow, TaskRow};
use crate::definition::Definition;
use crate::engine::state::{Instance, Task};

const TASK_COLUMNS: &str = "id, instance_id, step_id, status, assignee, assigned_role, priority, \
                            due_at, data, completed_by, completed_at, created_at";

/// Insert or replace a definition.
pub async fn upsert_definition(
    executor: impl PgExecutor<'_>,
    definition: &Definition,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO taskflow.definition (id, name, version, status, body, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (id) DO UPDATE
        SET name = EXCLUDED.name,
            version = EXCLUDED.version,
            status = EXCLUDED.status,
            body = EXCLUDED.body
        "#,
    )
    .bind(definition.id)
    .bind(&definition.name)
    .bind(&definition.version)
    .bind(definition.status.as_str())
    .bind(Json(definition))
    .bind(definition.created_at.unwrap_or_else(Utc::now))
    .execute(executor)
    .await?;

    Ok(())
}

/// Get a definition by ID.
pub async fn get_definition(
    executor: impl PgExecutor<'_>,
    id: Uuid,
) -> Result<Option<DefinitionRow>, sqlx::Error> {
    sqlx::query_as::<_, DefinitionRow>(
        r#"
        SELECT id, name, version, status, body, created_at
        FROM taskflow.definition
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(executor)
    .await
}

/// Get a definition by name and version.
pub async fn get_definition_by_name_version(
    executor: impl PgExecutor<'_>,
    name: &str,
    version: &str,
) -> Result<Option<DefinitionRow>, sqlx::Error> {
    sqlx::query_as::<_, DefinitionRow>(
        r#"
        SELECT id, name, version, status, body, created_at
        FROM taskflow.definition
        WHERE name = $1 AND version = $2
        "#,
    )
    .bind(name)
    .bind(version)
    .fetch_optional(executor)
    .await
}

/// Move a definition from `from` to `to`. Returns the number of rows changed,
/// which is zero when the stored status was not `from`.
pub async fn update_definition_status(
    executor: impl PgExecutor<'_>,
    id: Uuid,
    from: &str,
    to: &str,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE taskflow.definition
        SET status = $3
        WHERE id = $1 AND status = $2
        "#,
    )
    .bind(id)
    .bind(from)
    .bind(to)
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}

pub async fn upsert_instance(
    executor: impl PgExecutor<'_>,
    instance: &Instance,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO taskflow.instance
            (id, definition_id, definition_version, status, data, pending_steps,
             started_by, started_at, completed_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        ON CONFLICT (id) DO UPDATE
        SET status = EXCLUDED.status,
            data = EXCLUDED.data,
            pending_steps = EXCLUDED.pending_steps,
            completed_at = EXCLUDED.completed_at
        "#,
    )
    .bind(instance.id)
    .bind(instance.definition_id)
    .bind(&instance.definition_version)
    .bind(instance.status.as_str())
    .bind(Json(&instance.data))
    .bind(Json(&instance.pending_steps))
    .bind(&instance.started_by)
    .bind(instance.started_at)
    .bind(instance.completed_at)
    .execute(executor)
    .await?;

    Ok(())
}

pub async fn get_instance(
    executor: impl PgExecutor<'_>,
    id: Uuid,
) -> Result<Option<InstanceRow>, sqlx::Error> {
    sqlx::query_as::<_, InstanceRow>(
        r#"
        SELECT id, definition_id, definition_version, status, data, pending_steps,
               started_by, started_at, completed_at
        FROM taskflow.instance
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(executor)
    .await
}

/// Insert a task, or update the mutable columns of an existing one.
pub async fn upsert_task(executor: impl PgExecutor<'_>, task: &Task) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO taskflow.task
            (id, instance_id, step_id, status, assignee, assigned_role, priority,
             due_at, data, completed_by, completed_at, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        ON CONFLICT (id) DO UPDATE
        SET status = EXCLUDED.status,
            data = EXCLUDED.data,
            completed_by = EXCLUDED.completed_by,
            completed_at = EXCLUDED.completed_at
        "#,
    )
    .bind(task.id)
    .bind(task.instance_id)
    .bind(&task.step_id)
    .bind(task.status.as_str())
    .bind(&task.assignee)
    .bind(&task.assigned_role)
    .bind(task.priority.as_str())
    .bind(task.due_at)
    .bind(Json(&task.data))
    .bind(&task.completed_by)
    .bind(task.completed_at)
    .bind(task.created_at)
    .execute(executor)
    .await?;

    Ok(())
}

pub async fn get_task(
    executor: impl PgExecutor<'_>,
    id: Uuid,
) -> Result<Option<TaskRow>, sqlx::Error> {
    let sql = format!("SELECT {} FROM taskflow.task WHERE id = $1", TASK_COLUMNS);
    sqlx::query_as::<_, TaskRow>(&sql)
        .bind(id)
        .fetch_optional(executor)
        .await
}

/// Tasks of an instance in creation order, optionally restricted to a status.
pub async fn list_tasks_for_instance(
    executor: impl PgExecutor<'_>,
    instance_id: Uuid,
    status: Option<&str>,
) -> Result<Vec<TaskRow>, sqlx::Error> {
    let sql = format!(
        "SELECT {} FROM taskflow.task \
         WHERE instance_id = $1 AND ($2::text IS NULL OR status = $2) \
         ORDER BY seq",
        TASK_COLUMNS
    );
    sqlx::query_as::<_, TaskRow>(&sql)
        .bind(instance_id)
        .bind(status)
        .fetch_all(executor)
        .await
}

/// Tasks assigned to `assignee` in creation order.
pub async fn list_tasks_for_assignee(
    executor: impl PgExecutor<'_>,
    assignee: &str,
    status: Option<&str>,
    instance_id: Option<Uuid>,
    limit: Option<i64>,
) -> Result<Vec<TaskRow>, sqlx::Error> {
    let sql = format!(
        "SELECT {} FROM taskflow.task \
         WHERE assignee = $1 \
           AND ($2::text IS NULL OR status = $2) \
           AND ($3::uuid IS NULL OR instance_id = $3) \
         ORDER BY seq \
         LIMIT $4",
        TASK_COLUMNS
    );
    sqlx::query_as::<_, TaskRow>(&sql)
        .bind(assignee)
        .bind(status)
        .bind(instance_id)
        .bind(limit)
        .fetch_all(executor)
        .await
}
