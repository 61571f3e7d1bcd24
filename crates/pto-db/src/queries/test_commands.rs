//! Database query functions for the `task_test_commands` table.
//!
//! Supplemental table (SPEC_FULL.md S6) backing the Readiness Evaluator's
//! `testable` rule.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::TestCommand;

/// Insert a single test command.
pub async fn insert_command(pool: &PgPool, task_id: Uuid, command: &str) -> Result<TestCommand> {
    let row = sqlx::query_as::<_, TestCommand>(
        "INSERT INTO task_test_commands (task_id, command) VALUES ($1, $2) RETURNING *",
    )
    .bind(task_id)
    .bind(command)
    .fetch_one(pool)
    .await
    .context("failed to insert test command")?;

    Ok(row)
}

/// All test commands for a task.
pub async fn list_for_task(pool: &PgPool, task_id: Uuid) -> Result<Vec<TestCommand>> {
    let rows = sqlx::query_as::<_, TestCommand>(
        "SELECT * FROM task_test_commands WHERE task_id = $1 ORDER BY created_at",
    )
    .bind(task_id)
    .fetch_all(pool)
    .await
    .context("failed to list test commands")?;

    Ok(rows)
}

/// Replace a task's test commands wholesale.
pub async fn replace_for_task(pool: &PgPool, task_id: Uuid, commands: &[String]) -> Result<()> {
    let mut tx = pool.begin().await.context("failed to start transaction")?;

    sqlx::query("DELETE FROM task_test_commands WHERE task_id = $1")
        .bind(task_id)
        .execute(&mut *tx)
        .await
        .context("failed to clear test commands")?;

    for command in commands {
        sqlx::query("INSERT INTO task_test_commands (task_id, command) VALUES ($1, $2)")
            .bind(task_id)
            .bind(command)
            .execute(&mut *tx)
            .await
            .context("failed to insert test command")?;
    }

    tx.commit().await.context("failed to commit test command replace")?;
    Ok(())
}
