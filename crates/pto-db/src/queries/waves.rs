//! Database query functions for `execution_waves` and
//! `wave_task_assignments`.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{ExecutionWave, WaveStatus};

/// Persist a freshly computed wave and its task membership in one
/// transaction (the durability boundary SPEC_FULL.md S4.A calls out for
/// wave creation).
pub async fn insert_wave(
    pool: &PgPool,
    task_list_id: Uuid,
    wave_number: i32,
    max_parallelism: i32,
    member_task_ids: &[Uuid],
) -> Result<ExecutionWave> {
    let mut tx = pool.begin().await.context("failed to start transaction")?;

    let wave = sqlx::query_as::<_, ExecutionWave>(
        "INSERT INTO execution_waves \
            (task_list_id, wave_number, task_count, max_parallelism) \
         VALUES ($1, $2, $3, $4) \
         RETURNING *",
    )
    .bind(task_list_id)
    .bind(wave_number)
    .bind(member_task_ids.len() as i32)
    .bind(max_parallelism)
    .fetch_one(&mut *tx)
    .await
    .context("failed to insert execution wave")?;

    for (position, task_id) in member_task_ids.iter().enumerate() {
        sqlx::query(
            "INSERT INTO wave_task_assignments (wave_id, task_id, position) VALUES ($1, $2, $3)",
        )
        .bind(wave.id)
        .bind(task_id)
        .bind(position as i32)
        .execute(&mut *tx)
        .await
        .context("failed to insert wave task assignment")?;
    }

    tx.commit().await.context("failed to commit wave insert")?;
    Ok(wave)
}

/// All waves for a list, in wave-number order.
pub async fn list_waves_for_list(pool: &PgPool, task_list_id: Uuid) -> Result<Vec<ExecutionWave>> {
    let rows = sqlx::query_as::<_, ExecutionWave>(
        "SELECT * FROM execution_waves WHERE task_list_id = $1 ORDER BY wave_number",
    )
    .bind(task_list_id)
    .fetch_all(pool)
    .await
    .context("failed to list execution waves")?;

    Ok(rows)
}

/// Task ids assigned to a wave, in position order.
pub async fn list_wave_members(pool: &PgPool, wave_id: Uuid) -> Result<Vec<Uuid>> {
    let rows: Vec<(Uuid,)> = sqlx::query_as(
        "SELECT task_id FROM wave_task_assignments WHERE wave_id = $1 ORDER BY position",
    )
    .bind(wave_id)
    .fetch_all(pool)
    .await
    .context("failed to list wave members")?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// Delete all previously computed waves for a list (used before
/// recomputation, since waves are a materialization owned by the
/// Parallelism Calculator, not primary data).
pub async fn delete_waves_for_list(pool: &PgPool, task_list_id: Uuid) -> Result<()> {
    sqlx::query("DELETE FROM execution_waves WHERE task_list_id = $1")
        .bind(task_list_id)
        .execute(pool)
        .await
        .context("failed to delete execution waves")?;

    Ok(())
}

/// Mark a wave active, recording its start time.
pub async fn mark_wave_active(pool: &PgPool, wave_id: Uuid) -> Result<()> {
    sqlx::query(
        "UPDATE execution_waves SET status = $1, started_at = now() WHERE id = $2",
    )
    .bind(WaveStatus::Active)
    .bind(wave_id)
    .execute(pool)
    .await
    .context("failed to mark wave active")?;

    Ok(())
}

/// Close a wave, recording completion counts and whether it closed with any
/// failures (the caller decides list-failure policy from the return value).
pub async fn close_wave(
    pool: &PgPool,
    wave_id: Uuid,
    completed_count: i32,
    failed_count: i32,
    actual_parallelism: i32,
) -> Result<()> {
    let status = if failed_count > 0 {
        WaveStatus::Failed
    } else {
        WaveStatus::Complete
    };

    sqlx::query(
        "UPDATE execution_waves SET \
            status = $1, completed_count = $2, failed_count = $3, \
            actual_parallelism = $4, completed_at = now() \
         WHERE id = $5",
    )
    .bind(status)
    .bind(completed_count)
    .bind(failed_count)
    .bind(actual_parallelism)
    .bind(wave_id)
    .execute(pool)
    .await
    .context("failed to close wave")?;

    Ok(())
}
