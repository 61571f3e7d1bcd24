//! Database query functions for the `tasks` table.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{EffortBucket, Priority, Task, TaskStatus};

/// Parameters for inserting a new task.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub display_id: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub priority: Priority,
    pub effort: EffortBucket,
    pub phase: Option<String>,
    pub position: i32,
    pub task_list_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
}

/// Insert a new task. Returns the inserted row with server-generated
/// defaults (id, status=pending, created_at, updated_at, attempt_count=0).
pub async fn insert_task(pool: &PgPool, new: &NewTask) -> Result<Task> {
    let task = sqlx::query_as::<_, Task>(
        "INSERT INTO tasks \
            (display_id, title, description, category, priority, effort, phase, \
             position, task_list_id, project_id) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
         RETURNING *",
    )
    .bind(&new.display_id)
    .bind(&new.title)
    .bind(&new.description)
    .bind(&new.category)
    .bind(new.priority)
    .bind(new.effort)
    .bind(&new.phase)
    .bind(new.position)
    .bind(new.task_list_id)
    .bind(new.project_id)
    .fetch_one(pool)
    .await
    .context("failed to insert task")?;

    Ok(task)
}

/// Fetch a task by its ID.
pub async fn get_task(pool: &PgPool, id: Uuid) -> Result<Option<Task>> {
    let task = sqlx::query_as::<_, Task>("SELECT * FROM tasks WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch task")?;

    Ok(task)
}

/// List all tasks in a list, ordered by position then id (the deterministic
/// tie-break order the Parallelism Calculator relies on, spec.md S4.D).
pub async fn list_tasks_for_list(pool: &PgPool, task_list_id: Uuid) -> Result<Vec<Task>> {
    let tasks = sqlx::query_as::<_, Task>(
        "SELECT * FROM tasks WHERE task_list_id = $1 ORDER BY position, id",
    )
    .bind(task_list_id)
    .fetch_all(pool)
    .await
    .context("failed to list tasks for task list")?;

    Ok(tasks)
}

/// List tasks eligible for scheduling analysis: `status IN (pending, evaluating)`.
pub async fn list_eligible_tasks(pool: &PgPool, task_list_id: Uuid) -> Result<Vec<Task>> {
    let tasks = sqlx::query_as::<_, Task>(
        "SELECT * FROM tasks \
         WHERE task_list_id = $1 AND status IN ('pending', 'evaluating') \
         ORDER BY position, id",
    )
    .bind(task_list_id)
    .fetch_all(pool)
    .await
    .context("failed to list eligible tasks")?;

    Ok(tasks)
}

/// Unconditionally set a task's status (used by the orchestrator's state
/// machine; callers are expected to have already validated the transition).
pub async fn set_status(pool: &PgPool, id: Uuid, status: TaskStatus) -> Result<()> {
    let result = sqlx::query("UPDATE tasks SET status = $1, updated_at = now() WHERE id = $2")
        .bind(status)
        .bind(id)
        .execute(pool)
        .await
        .context("failed to update task status")?;

    if result.rows_affected() == 0 {
        anyhow::bail!("task {id} not found");
    }

    Ok(())
}

/// Optimistic-locking transition: only succeeds if the task is currently in
/// `expected`. Returns the updated row, or `None` if the precondition failed
/// (task not found, or not in the expected status).
pub async fn transition_status(
    pool: &PgPool,
    id: Uuid,
    expected: TaskStatus,
    next: TaskStatus,
) -> Result<Option<Task>> {
    let (set_started, set_completed) = match next {
        TaskStatus::Running => (true, false),
        TaskStatus::Complete | TaskStatus::Failed | TaskStatus::Cancelled => (false, true),
        _ => (false, false),
    };

    let task = sqlx::query_as::<_, Task>(
        "UPDATE tasks SET \
            status = $1, \
            updated_at = now(), \
            started_at = CASE WHEN $2 THEN now() ELSE started_at END, \
            completed_at = CASE WHEN $3 THEN now() ELSE completed_at END \
         WHERE id = $4 AND status = $5 \
         RETURNING *",
    )
    .bind(next)
    .bind(set_started)
    .bind(set_completed)
    .bind(id)
    .bind(expected)
    .fetch_optional(pool)
    .await
    .context("failed to transition task status")?;

    Ok(task)
}

/// Reset a failed task to `pending` and increment its attempt counter, as
/// part of a retryable-failure transition (spec.md S4.G:
/// `running -> pending (attempt counter incremented)`).
pub async fn retry_to_pending(pool: &PgPool, id: Uuid) -> Result<Option<Task>> {
    let task = sqlx::query_as::<_, Task>(
        "UPDATE tasks SET \
            status = 'pending', \
            attempt_count = attempt_count + 1, \
            updated_at = now() \
         WHERE id = $1 AND status IN ('running', 'failed') \
         RETURNING *",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("failed to retry task")?;

    Ok(task)
}

/// Tasks in a list with no incomplete `depends_on` target and status =
/// `pending`. This is the "ready to assign" query the execution loop uses
/// each time it looks for work within the current wave.
pub async fn list_ready_tasks(pool: &PgPool, task_list_id: Uuid) -> Result<Vec<Task>> {
    let tasks = sqlx::query_as::<_, Task>(
        "SELECT t.* FROM tasks t \
         WHERE t.task_list_id = $1 \
           AND t.status = 'pending' \
           AND NOT EXISTS ( \
               SELECT 1 FROM task_relationships r \
               JOIN tasks dep ON dep.id = r.target_task_id \
               WHERE r.source_task_id = t.id \
                 AND r.relationship_type = 'depends_on' \
                 AND dep.status <> 'complete' \
           ) \
         ORDER BY t.position, t.id",
    )
    .bind(task_list_id)
    .fetch_all(pool)
    .await
    .context("failed to list ready tasks")?;

    Ok(tasks)
}

/// Per-status task counts for a list, used for progress reporting.
pub async fn count_by_status(pool: &PgPool, task_list_id: Uuid) -> Result<Vec<(TaskStatus, i64)>> {
    let rows: Vec<(TaskStatus, i64)> = sqlx::query_as(
        "SELECT status, COUNT(*) FROM tasks WHERE task_list_id = $1 GROUP BY status",
    )
    .bind(task_list_id)
    .fetch_all(pool)
    .await
    .context("failed to count tasks by status")?;

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_task_builds_with_expected_fields() {
        let new = NewTask {
            display_id: "T1".into(),
            title: "Add widget".into(),
            description: "desc".into(),
            category: "frontend".into(),
            priority: Priority::P2,
            effort: EffortBucket::Small,
            phase: None,
            position: 0,
            task_list_id: None,
            project_id: None,
        };
        assert_eq!(new.display_id, "T1");
        assert_eq!(new.priority, Priority::P2);
    }
}
