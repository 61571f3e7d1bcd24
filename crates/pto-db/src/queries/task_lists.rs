//! Database query functions for the `task_lists` table.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{TaskList, TaskListStatus};

/// Insert a new task list. Returns the inserted row with server-generated
/// defaults (id, status=draft, created_at, updated_at).
pub async fn insert_task_list(
    pool: &PgPool,
    name: &str,
    project_id: Option<Uuid>,
) -> Result<TaskList> {
    let list = sqlx::query_as::<_, TaskList>(
        "INSERT INTO task_lists (name, project_id) VALUES ($1, $2) RETURNING *",
    )
    .bind(name)
    .bind(project_id)
    .fetch_one(pool)
    .await
    .context("failed to insert task list")?;

    Ok(list)
}

/// Fetch a task list by its ID.
pub async fn get_task_list(pool: &PgPool, id: Uuid) -> Result<Option<TaskList>> {
    let list = sqlx::query_as::<_, TaskList>("SELECT * FROM task_lists WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch task list")?;

    Ok(list)
}

/// List all task lists, newest first. Callers needing the freshest state
/// (e.g. a `list status` command) should call this rather than caching.
pub async fn list_task_lists(pool: &PgPool) -> Result<Vec<TaskList>> {
    let lists =
        sqlx::query_as::<_, TaskList>("SELECT * FROM task_lists ORDER BY created_at DESC")
            .fetch_all(pool)
            .await
            .context("failed to list task lists")?;

    Ok(lists)
}

/// Update a task list's status.
pub async fn update_task_list_status(
    pool: &PgPool,
    id: Uuid,
    status: TaskListStatus,
) -> Result<()> {
    let result = sqlx::query(
        "UPDATE task_lists SET status = $1, updated_at = now() WHERE id = $2",
    )
    .bind(status)
    .bind(id)
    .execute(pool)
    .await
    .context("failed to update task list status")?;

    if result.rows_affected() == 0 {
        anyhow::bail!("task list {id} not found");
    }

    Ok(())
}

/// Recompute and persist `total_tasks`/`completed_tasks`/`failed_tasks`
/// from the current state of the list's member tasks.
///
/// Keeps the data-model invariant "totals always equal counts derived
/// from member tasks" (spec.md S3) true after any task status change.
pub async fn refresh_task_list_counts(pool: &PgPool, id: Uuid) -> Result<()> {
    sqlx::query(
        "UPDATE task_lists SET \
            total_tasks = (SELECT COUNT(*) FROM tasks WHERE task_list_id = $1), \
            completed_tasks = (SELECT COUNT(*) FROM tasks WHERE task_list_id = $1 AND status = 'complete'), \
            failed_tasks = (SELECT COUNT(*) FROM tasks WHERE task_list_id = $1 AND status = 'failed'), \
            updated_at = now() \
         WHERE id = $1",
    )
    .bind(id)
    .execute(pool)
    .await
    .context("failed to refresh task list counts")?;

    Ok(())
}
