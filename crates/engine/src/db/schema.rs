//! Schema bootstrap.

use super::DbPool;

/// DDL statements, applied in order. Every statement is idempotent.
const SCHEMA: &[&str] = &[
    "CREATE SCHEMA IF NOT EXISTS taskflow",
    r#"
    CREATE TABLE IF NOT EXISTS taskflow.definition (
        id          UUID PRIMARY KEY,
        name        TEXT NOT NULL,
        version     TEXT NOT NULL,
        status      TEXT NOT NULL,
        body        JSONB NOT NULL,
        created_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
        UNIQUE (name, version)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS taskflow.instance (
        id                  UUID PRIMARY KEY,
        definition_id       UUID NOT NULL REFERENCES taskflow.definition (id),
        definition_version  TEXT NOT NULL,
        status              TEXT NOT NULL,
        data                JSONB NOT NULL,
        pending_steps       JSONB NOT NULL,
        started_by          TEXT NOT NULL,
        started_at          TIMESTAMPTZ NOT NULL,
        completed_at        TIMESTAMPTZ
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS taskflow.task (
        seq            BIGSERIAL,
        id             UUID PRIMARY KEY,
        instance_id    UUID NOT NULL REFERENCES taskflow.instance (id),
        step_id        TEXT NOT NULL,
        status         TEXT NOT NULL,
        assignee       TEXT,
        assigned_role  TEXT,
        priority       TEXT NOT NULL,
        due_at         TIMESTAMPTZ,
        data           JSONB NOT NULL,
        completed_by   TEXT,
        completed_at   TIMESTAMPTZ,
        created_at     TIMESTAMPTZ NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS task_instance_status_idx ON taskflow.task (instance_id, status)",
    "CREATE INDEX IF NOT EXISTS task_assignee_status_idx ON taskflow.task (assignee, status)",
];

/// Create the schema and tables if they do not exist.
pub async fn ensure_schema(pool: &DbPool) -> Result<(), sqlx::Error> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    tracing::info!("Database schema ready");
    Ok(())
}
