//! Database query functions for the `task_file_impacts` table.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{FileImpact, FileOperation, Provenance};

/// Parameters for recording a claimed file impact.
#[derive(Debug, Clone)]
pub struct NewFileImpact {
    pub task_id: Uuid,
    pub file_path: String,
    pub operation: FileOperation,
    pub confidence: f32,
    pub source: Provenance,
}

/// Insert a file impact. Multiple impacts per `(task, path)` are permitted
/// only if operations differ (spec.md S3); a duplicate `(task, path, op)`
/// triple is silently ignored.
pub async fn insert_impact(pool: &PgPool, new: &NewFileImpact) -> Result<FileImpact> {
    let impact = sqlx::query_as::<_, FileImpact>(
        "INSERT INTO task_file_impacts (task_id, file_path, operation, confidence, source) \
         VALUES ($1, $2, $3, $4, $5) \
         ON CONFLICT (task_id, file_path, operation) DO UPDATE SET \
            confidence = EXCLUDED.confidence, source = EXCLUDED.source \
         RETURNING *",
    )
    .bind(new.task_id)
    .bind(&new.file_path)
    .bind(new.operation)
    .bind(new.confidence)
    .bind(new.source)
    .fetch_one(pool)
    .await
    .context("failed to insert file impact")?;

    Ok(impact)
}

/// All impacts declared by a single task (its footprint).
pub async fn list_impacts_for_task(pool: &PgPool, task_id: Uuid) -> Result<Vec<FileImpact>> {
    let rows = sqlx::query_as::<_, FileImpact>(
        "SELECT * FROM task_file_impacts WHERE task_id = $1 ORDER BY file_path",
    )
    .bind(task_id)
    .fetch_all(pool)
    .await
    .context("failed to list impacts for task")?;

    Ok(rows)
}

/// All impacts for every task in a list, for batched pairwise-conflict
/// analysis (avoids one query per task per pair).
pub async fn list_impacts_for_list(pool: &PgPool, task_list_id: Uuid) -> Result<Vec<FileImpact>> {
    let rows = sqlx::query_as::<_, FileImpact>(
        "SELECT i.* FROM task_file_impacts i \
         JOIN tasks t ON t.id = i.task_id \
         WHERE t.task_list_id = $1",
    )
    .bind(task_list_id)
    .fetch_all(pool)
    .await
    .context("failed to list impacts for task list")?;

    Ok(rows)
}

/// Delete all impacts for a task (used when a task's footprint is replaced
/// wholesale rather than incrementally amended).
pub async fn delete_impacts_for_task(pool: &PgPool, task_id: Uuid) -> Result<()> {
    sqlx::query("DELETE FROM task_file_impacts WHERE task_id = $1")
        .bind(task_id)
        .execute(pool)
        .await
        .context("failed to delete impacts for task")?;

    Ok(())
}
