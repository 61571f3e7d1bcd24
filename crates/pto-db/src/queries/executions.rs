//! Database query functions for `task_list_execution_runs` and
//! `execution_override_log`.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{ExecutionOverrideLog, ExecutionRun, OverrideType, RunStatus};

/// Start a new execution run (session) for a list, numbered one past the
/// highest existing run for that list.
pub async fn start_run(pool: &PgPool, task_list_id: Uuid) -> Result<ExecutionRun> {
    let run = sqlx::query_as::<_, ExecutionRun>(
        "INSERT INTO task_list_execution_runs (task_list_id, run_number) \
         VALUES ($1, COALESCE((SELECT MAX(run_number) + 1 FROM task_list_execution_runs \
            WHERE task_list_id = $1), 1)) \
         RETURNING *",
    )
    .bind(task_list_id)
    .fetch_one(pool)
    .await
    .context("failed to start execution run")?;

    Ok(run)
}

/// Close a run with a terminal status.
pub async fn close_run(pool: &PgPool, run_id: Uuid, status: RunStatus) -> Result<()> {
    sqlx::query(
        "UPDATE task_list_execution_runs SET status = $1, completed_at = now() WHERE id = $2",
    )
    .bind(status)
    .bind(run_id)
    .execute(pool)
    .await
    .context("failed to close execution run")?;

    Ok(())
}

/// Fetch a run by id.
pub async fn get_run(pool: &PgPool, run_id: Uuid) -> Result<Option<ExecutionRun>> {
    let row = sqlx::query_as::<_, ExecutionRun>(
        "SELECT * FROM task_list_execution_runs WHERE id = $1",
    )
    .bind(run_id)
    .fetch_optional(pool)
    .await
    .context("failed to fetch execution run")?;

    Ok(row)
}

/// Record an `allowIncomplete` admission override (audit-logged per the
/// Readiness consumer contract, SPEC_FULL.md S6).
pub async fn record_override(
    pool: &PgPool,
    task_list_id: Uuid,
    incomplete_count: i32,
) -> Result<ExecutionOverrideLog> {
    let row = sqlx::query_as::<_, ExecutionOverrideLog>(
        "INSERT INTO execution_override_log (task_list_id, incomplete_count, override_type) \
         VALUES ($1, $2, $3) \
         RETURNING *",
    )
    .bind(task_list_id)
    .bind(incomplete_count)
    .bind(OverrideType::AllowIncomplete)
    .fetch_one(pool)
    .await
    .context("failed to record execution override")?;

    Ok(row)
}

/// All overrides recorded for a list, newest first (audit trail).
pub async fn list_overrides_for_list(
    pool: &PgPool,
    task_list_id: Uuid,
) -> Result<Vec<ExecutionOverrideLog>> {
    let rows = sqlx::query_as::<_, ExecutionOverrideLog>(
        "SELECT * FROM execution_override_log WHERE task_list_id = $1 ORDER BY created_at DESC",
    )
    .bind(task_list_id)
    .fetch_all(pool)
    .await
    .context("failed to list execution overrides")?;

    Ok(rows)
}
