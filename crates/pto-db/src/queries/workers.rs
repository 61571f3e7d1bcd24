//! Database query functions for `build_agent_instances`.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{BuildAgentInstance, WorkerStatus};

/// Register a new worker (build agent instance) for a session, idle.
pub async fn insert_worker(pool: &PgPool, session_id: Uuid) -> Result<BuildAgentInstance> {
    let row = sqlx::query_as::<_, BuildAgentInstance>(
        "INSERT INTO build_agent_instances (session_id) VALUES ($1) RETURNING *",
    )
    .bind(session_id)
    .fetch_one(pool)
    .await
    .context("failed to insert build agent instance")?;

    Ok(row)
}

/// All workers for a session.
pub async fn list_workers_for_session(
    pool: &PgPool,
    session_id: Uuid,
) -> Result<Vec<BuildAgentInstance>> {
    let rows = sqlx::query_as::<_, BuildAgentInstance>(
        "SELECT * FROM build_agent_instances WHERE session_id = $1",
    )
    .bind(session_id)
    .fetch_all(pool)
    .await
    .context("failed to list workers for session")?;

    Ok(rows)
}

/// Assign a worker to a task, transitioning it to `working`.
pub async fn assign_task(pool: &PgPool, worker_id: Uuid, task_id: Uuid) -> Result<()> {
    sqlx::query(
        "UPDATE build_agent_instances SET \
            status = $1, current_task_id = $2, last_heartbeat = now(), \
            progress_percent = 0 \
         WHERE id = $3",
    )
    .bind(WorkerStatus::Working)
    .bind(task_id)
    .bind(worker_id)
    .execute(pool)
    .await
    .context("failed to assign task to worker")?;

    Ok(())
}

/// Release a worker back to idle (on task completion or failure).
pub async fn release_to_idle(pool: &PgPool, worker_id: Uuid) -> Result<()> {
    sqlx::query(
        "UPDATE build_agent_instances SET \
            status = $1, current_task_id = NULL, progress_percent = NULL \
         WHERE id = $2",
    )
    .bind(WorkerStatus::Idle)
    .bind(worker_id)
    .execute(pool)
    .await
    .context("failed to release worker to idle")?;

    Ok(())
}

/// Record a heartbeat: refresh the timestamp and progress/metrics.
pub async fn record_heartbeat(
    pool: &PgPool,
    worker_id: Uuid,
    progress_percent: Option<f32>,
    cpu_percent: Option<f32>,
    memory_mb: Option<f32>,
) -> Result<()> {
    sqlx::query(
        "UPDATE build_agent_instances SET \
            last_heartbeat = now(), progress_percent = $1, cpu_percent = $2, memory_mb = $3 \
         WHERE id = $4",
    )
    .bind(progress_percent)
    .bind(cpu_percent)
    .bind(memory_mb)
    .bind(worker_id)
    .execute(pool)
    .await
    .context("failed to record worker heartbeat")?;

    Ok(())
}

/// Transition a worker to `error` (used when it stalls) or `terminated`
/// (used when a session tears down).
pub async fn set_status(pool: &PgPool, worker_id: Uuid, status: WorkerStatus) -> Result<()> {
    sqlx::query("UPDATE build_agent_instances SET status = $1 WHERE id = $2")
        .bind(status)
        .bind(worker_id)
        .execute(pool)
        .await
        .context("failed to set worker status")?;

    Ok(())
}

/// Workers whose last heartbeat predates the given cutoff and are still
/// `working` — the stall-detection query the orchestrator's heartbeat
/// timer polls (spec.md S4.G).
pub async fn list_stalled(
    pool: &PgPool,
    session_id: Uuid,
    cutoff: DateTime<Utc>,
) -> Result<Vec<BuildAgentInstance>> {
    let rows = sqlx::query_as::<_, BuildAgentInstance>(
        "SELECT * FROM build_agent_instances \
         WHERE session_id = $1 AND status = 'working' AND last_heartbeat < $2",
    )
    .bind(session_id)
    .bind(cutoff)
    .fetch_all(pool)
    .await
    .context("failed to list stalled workers")?;

    Ok(rows)
}
