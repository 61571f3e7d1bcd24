//! Database query functions for the `task_acceptance_criteria` table.
//!
//! Supplemental table (SPEC_FULL.md S6) backing the Readiness Evaluator's
//! `testable`/`clearCompletion` rules.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::AcceptanceCriterion;

/// Insert a single acceptance criterion.
pub async fn insert_criterion(pool: &PgPool, task_id: Uuid, text: &str) -> Result<AcceptanceCriterion> {
    let row = sqlx::query_as::<_, AcceptanceCriterion>(
        "INSERT INTO task_acceptance_criteria (task_id, text) VALUES ($1, $2) RETURNING *",
    )
    .bind(task_id)
    .bind(text)
    .fetch_one(pool)
    .await
    .context("failed to insert acceptance criterion")?;

    Ok(row)
}

/// All acceptance criteria for a task.
pub async fn list_for_task(pool: &PgPool, task_id: Uuid) -> Result<Vec<AcceptanceCriterion>> {
    let rows = sqlx::query_as::<_, AcceptanceCriterion>(
        "SELECT * FROM task_acceptance_criteria WHERE task_id = $1 ORDER BY created_at",
    )
    .bind(task_id)
    .fetch_all(pool)
    .await
    .context("failed to list acceptance criteria")?;

    Ok(rows)
}

/// Replace a task's acceptance criteria wholesale.
pub async fn replace_for_task(pool: &PgPool, task_id: Uuid, texts: &[String]) -> Result<()> {
    let mut tx = pool.begin().await.context("failed to start transaction")?;

    sqlx::query("DELETE FROM task_acceptance_criteria WHERE task_id = $1")
        .bind(task_id)
        .execute(&mut *tx)
        .await
        .context("failed to clear acceptance criteria")?;

    for text in texts {
        sqlx::query("INSERT INTO task_acceptance_criteria (task_id, text) VALUES ($1, $2)")
            .bind(task_id)
            .bind(text)
            .execute(&mut *tx)
            .await
            .context("failed to insert acceptance criterion")?;
    }

    tx.commit().await.context("failed to commit acceptance criteria replace")?;
    Ok(())
}
