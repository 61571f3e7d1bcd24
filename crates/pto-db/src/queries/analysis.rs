//! Database query functions for the `parallelism_analysis` table.
//!
//! Callers are expected to pass `task_a_id < task_b_id` (the storage
//! invariant giving each unordered pair one canonical row); `pto-core`'s
//! pairwise-analysis pass is responsible for ordering the pair before it
//! ever reaches this module.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{ConflictType, ParallelismAnalysisRow};

/// Upsert the live (non-invalidated) analysis row for a pair. If a live row
/// already exists it is overwritten in place; this is the common path for
/// (re)computing a verdict, not for the invalidate-then-recompute dance
/// (see [`invalidate_for_task`]).
///
/// Implemented as retire-then-insert inside a transaction rather than a
/// single `ON CONFLICT` upsert, because the live-row uniqueness constraint
/// is a partial index (`WHERE invalidated_at IS NULL`) and this keeps the
/// retire-and-replace durability boundary explicit in code.
pub async fn upsert_analysis(
    pool: &PgPool,
    task_a_id: Uuid,
    task_b_id: Uuid,
    can_parallel: bool,
    conflict_type: ConflictType,
    conflict_details: serde_json::Value,
) -> Result<ParallelismAnalysisRow> {
    let mut tx = pool.begin().await.context("failed to start transaction")?;

    sqlx::query(
        "UPDATE parallelism_analysis SET invalidated_at = now() \
         WHERE task_a_id = $1 AND task_b_id = $2 AND invalidated_at IS NULL",
    )
    .bind(task_a_id)
    .bind(task_b_id)
    .execute(&mut *tx)
    .await
    .context("failed to retire prior analysis row")?;

    let row = sqlx::query_as::<_, ParallelismAnalysisRow>(
        "INSERT INTO parallelism_analysis \
            (task_a_id, task_b_id, can_parallel, conflict_type, conflict_details, analyzed_at) \
         VALUES ($1, $2, $3, $4, $5, now()) \
         RETURNING *",
    )
    .bind(task_a_id)
    .bind(task_b_id)
    .bind(can_parallel)
    .bind(conflict_type)
    .bind(conflict_details)
    .fetch_one(&mut *tx)
    .await
    .context("failed to insert parallelism analysis")?;

    tx.commit().await.context("failed to commit parallelism analysis upsert")?;
    Ok(row)
}

/// Fetch the live (non-invalidated) analysis row for a pair, if any.
pub async fn get_live_analysis(
    pool: &PgPool,
    task_a_id: Uuid,
    task_b_id: Uuid,
) -> Result<Option<ParallelismAnalysisRow>> {
    let row = sqlx::query_as::<_, ParallelismAnalysisRow>(
        "SELECT * FROM parallelism_analysis \
         WHERE task_a_id = $1 AND task_b_id = $2 AND invalidated_at IS NULL",
    )
    .bind(task_a_id)
    .bind(task_b_id)
    .fetch_optional(pool)
    .await
    .context("failed to fetch parallelism analysis")?;

    Ok(row)
}

/// All live analyses among tasks in a list, for bulk wave construction.
pub async fn list_live_analyses_for_list(
    pool: &PgPool,
    task_list_id: Uuid,
) -> Result<Vec<ParallelismAnalysisRow>> {
    let rows = sqlx::query_as::<_, ParallelismAnalysisRow>(
        "SELECT a.* FROM parallelism_analysis a \
         JOIN tasks ta ON ta.id = a.task_a_id \
         JOIN tasks tb ON tb.id = a.task_b_id \
         WHERE a.invalidated_at IS NULL \
           AND ta.task_list_id = $1 AND tb.task_list_id = $1",
    )
    .bind(task_list_id)
    .fetch_all(pool)
    .await
    .context("failed to list live parallelism analyses")?;

    Ok(rows)
}

/// Mark every live analysis row touching a given task as invalidated.
/// Required "happens-before" wave recomputation (SPEC_FULL.md S5): any
/// mutation that triggers invalidation must complete before the next wave
/// fetch.
pub async fn invalidate_for_task(pool: &PgPool, task_id: Uuid) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE parallelism_analysis SET invalidated_at = now() \
         WHERE invalidated_at IS NULL AND (task_a_id = $1 OR task_b_id = $1)",
    )
    .bind(task_id)
    .execute(pool)
    .await
    .context("failed to invalidate analyses for task")?;

    Ok(result.rows_affected())
}

/// Most recent `invalidated_at` set for any row touching a task, used by
/// tests asserting the invalidation-happened invariant.
pub async fn latest_invalidated_at(pool: &PgPool, task_id: Uuid) -> Result<Option<DateTime<Utc>>> {
    let value: Option<DateTime<Utc>> = sqlx::query_scalar(
        "SELECT MAX(invalidated_at) FROM parallelism_analysis \
         WHERE task_a_id = $1 OR task_b_id = $1",
    )
    .bind(task_id)
    .fetch_one(pool)
    .await
    .context("failed to fetch latest invalidation timestamp")?;

    Ok(value)
}
