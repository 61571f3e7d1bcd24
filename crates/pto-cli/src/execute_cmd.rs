//! `pto execute`: admit a task list for execution and drive its waves to
//! completion against a pool of `shell` workers. Also homes the
//! `pause`/`resume`/`cancel` administrative commands.

use anyhow::{Context, Result};
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use pto_core::orchestrator::{self, OrchestratorConfig};
use pto_core::worker::WorkerRegistry;
use pto_db::models::{RunStatus, TaskStatus};

use crate::worker::ShellWorkerFactory;

/// Run a task list's execution loop. Mirrors this corpus's own dispatch
/// command: wire ctrl-c to a cancellation token (first signal cancels
/// cooperatively, second force-exits), drive the run, print the terminal
/// status.
pub async fn run_execute(
    pool: &PgPool,
    list_id_str: &str,
    allow_incomplete: bool,
    concurrency: Option<usize>,
    worker_kind: &str,
    config: &OrchestratorConfig,
) -> Result<()> {
    let list_id =
        Uuid::parse_str(list_id_str).with_context(|| format!("invalid list id: {list_id_str}"))?;

    let mut registry = WorkerRegistry::new();
    registry.register(ShellWorkerFactory);

    let session = orchestrator::start_execution(pool, list_id, concurrency, allow_incomplete, config)
        .await?;

    println!(
        "Executing list {list_id}: {} wave(s) admitted, worker kind '{worker_kind}'",
        session.waves.len()
    );

    let mut events_rx = session.subscribe();
    let event_task = tokio::spawn(async move {
        while let Ok(event) = events_rx.recv().await {
            println!("  event: {event:?}");
        }
    });

    let cancel = CancellationToken::new();
    let cancel_for_signal = cancel.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        eprintln!("\nShutting down gracefully (press Ctrl+C again to force)...");
        cancel_for_signal.cancel();
        tokio::signal::ctrl_c().await.ok();
        eprintln!("\nForce exit.");
        std::process::exit(130);
    });

    let status =
        orchestrator::run_to_completion(pool, &session, &registry, worker_kind, config, cancel)
            .await?;

    event_task.abort();

    match status {
        RunStatus::Complete => println!("\nExecution complete: all waves finished."),
        RunStatus::Failed => {
            println!("\nExecution failed: a wave had terminal task failures.");
            std::process::exit(1);
        }
        RunStatus::Cancelled => {
            println!("\nExecution cancelled.");
            std::process::exit(130);
        }
        RunStatus::Running => unreachable!("run_to_completion always returns a terminal status"),
    }

    Ok(())
}

pub async fn run_pause(pool: &PgPool, list_id_str: &str) -> Result<()> {
    let list_id =
        Uuid::parse_str(list_id_str).with_context(|| format!("invalid list id: {list_id_str}"))?;
    orchestrator::pause_execution(pool, list_id).await?;
    println!("Paused list {list_id}: no further tasks will be assigned.");
    Ok(())
}

pub async fn run_resume(pool: &PgPool, list_id_str: &str) -> Result<()> {
    let list_id =
        Uuid::parse_str(list_id_str).with_context(|| format!("invalid list id: {list_id_str}"))?;
    orchestrator::resume_execution(pool, list_id).await?;
    println!("Resumed list {list_id}.");
    Ok(())
}

/// `pto cancel <list-id>`: administrative cancellation of persisted state
/// for a list with no live `execute` process attached to it (spec.md S4
/// "Cancellation and pause": "terminates workers, transitions running
/// tasks to cancelled, and closes the session"). Cooperative in-process
/// cancellation of an *active* `execute` invocation instead goes through
/// that invocation's own ctrl-c handling and `CancellationToken`; this
/// command recovers a list whose `execute` process is no longer running.
pub async fn run_cancel(pool: &PgPool, list_id_str: &str) -> Result<()> {
    let list_id =
        Uuid::parse_str(list_id_str).with_context(|| format!("invalid list id: {list_id_str}"))?;

    pto_db::queries::task_lists::get_task_list(pool, list_id)
        .await?
        .with_context(|| format!("task list {list_id} not found"))?;

    let tasks = pto_db::queries::tasks::list_tasks_for_list(pool, list_id).await?;
    let mut cancelled = 0;
    for task in tasks.into_iter().filter(|t| t.status == TaskStatus::Running) {
        pto_db::queries::tasks::set_status(pool, task.id, TaskStatus::Cancelled).await?;
        cancelled += 1;
    }

    pto_db::queries::task_lists::update_task_list_status(
        pool,
        list_id,
        pto_db::models::TaskListStatus::Paused,
    )
    .await?;
    pto_db::queries::task_lists::refresh_task_list_counts(pool, list_id).await?;

    println!("Cancelled list {list_id}: {cancelled} running task(s) marked cancelled.");
    Ok(())
}
