//! Worker Orchestrator (component G, spec.md S4.G): owns a session per
//! executing task list. Admission (`start_execution`) checks readiness and
//! requests waves; the execution loop then drives those waves to
//! completion against a pool of external workers.
//!
//! Structured the way this corpus structures its own orchestrator: a
//! `Semaphore`-bounded concurrency cap, an `mpsc` completion-event channel
//! feeding a single serialized control loop (`tokio::select!` over the
//! event channel, a heartbeat-timeout interval tick, and a cancellation
//! token) — the orchestrator process is the only mutator of
//! `running_tasks`/`idle_permits`/`active_wave`; everything else
//! communicates through the channel.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use pto_db::models::{RunStatus, TaskListStatus, TaskStatus};
use sqlx::PgPool;
use tokio::sync::{broadcast, mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::PtoError;
use crate::events::{OrchestratorEvent, EVENT_CHANNEL_CAPACITY};
use crate::parallelism::{self, AnalyzeOptions, ListAnalysis, Wave};
use crate::readiness::{self, IncompleteTask, ListReadinessSummary, ReadinessInput};
use crate::worker::{TaskContext, Worker, WorkerEvent, WorkerRegistry};

/// Tunables for one orchestrator session (SPEC_FULL.md S10 defaults).
#[derive(Debug, Clone, Copy)]
pub struct OrchestratorConfig {
    /// A worker whose last heartbeat predates this age is deemed stalled.
    pub heartbeat_timeout: Duration,
    /// Maximum retries for a retryable failure before a task is terminal.
    pub retry_max: u32,
    /// Default concurrency cap, overridable per `start_execution` call.
    pub concurrency_cap: usize,
    /// Grace window for cooperative cancellation before force-kill.
    pub cancel_grace: Duration,
    /// Confidence threshold passed through to the Conflict Detector.
    pub significance_threshold: f32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            heartbeat_timeout: Duration::from_secs(5 * 60),
            retry_max: 2,
            concurrency_cap: 4,
            cancel_grace: Duration::from_secs(30),
            significance_threshold: crate::conflict::DEFAULT_SIGNIFICANCE_THRESHOLD,
        }
    }
}

/// An admitted execution session: the run row, the waves it will execute,
/// and the broadcast sender other subscribers (CLI, tests) can tap.
pub struct ExecutionSession {
    pub run_id: Uuid,
    pub task_list_id: Uuid,
    pub waves: Vec<Wave>,
    pub events_tx: broadcast::Sender<OrchestratorEvent>,
}

impl ExecutionSession {
    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.events_tx.subscribe()
    }
}

fn emit(tx: &broadcast::Sender<OrchestratorEvent>, event: OrchestratorEvent) {
    event.log();
    let _ = tx.send(event);
}

/// Gather readiness inputs for every eligible task in a list and evaluate
/// the bulk readiness verdict (spec.md S4.F "Per list" aggregate).
pub async fn evaluate_list_readiness(
    pool: &PgPool,
    list_id: Uuid,
) -> Result<ListReadinessSummary, PtoError> {
    let tasks = pto_db::queries::tasks::list_eligible_tasks(pool, list_id).await?;

    let mut scores = Vec::with_capacity(tasks.len());
    for task in &tasks {
        let impacts = pto_db::queries::impacts::list_impacts_for_task(pool, task.id).await?;
        let criteria = pto_db::queries::acceptance_criteria::list_for_task(pool, task.id).await?;
        let test_commands = pto_db::queries::test_commands::list_for_task(pool, task.id).await?;
        let depends_on = pto_db::queries::relationships::direct_dependencies(pool, task.id).await?;

        let input = ReadinessInput {
            task_id: task.id,
            display_id: task.display_id.clone(),
            category: task.category.clone(),
            title: task.title.clone(),
            description: task.description.clone(),
            effort: task.effort,
            file_impact_count: impacts.len(),
            acceptance_criteria: criteria.into_iter().map(|c| c.text).collect(),
            test_command_count: test_commands.len(),
            depends_on_count: depends_on.len(),
        };
        scores.push(readiness::evaluate(&input));
    }

    Ok(readiness::summarize(scores))
}

/// Admission contract (spec.md S4.G "Admission (startExecution)"):
/// 1. Consult readiness; reject with `ExecutionBlocked` unless
///    `allow_incomplete`.
/// 2. If overridden, audit-log the override.
/// 3. Request waves from the Parallelism Calculator.
/// 4. Start a session, mark the list `running`, emit `wave:started` for
///    the first wave.
pub async fn start_execution(
    pool: &PgPool,
    list_id: Uuid,
    concurrency_cap: Option<usize>,
    allow_incomplete: bool,
    config: &OrchestratorConfig,
) -> Result<ExecutionSession, PtoError> {
    let _ = concurrency_cap; // reserved for per-call override; session pool sizes off config.concurrency_cap

    let summary = evaluate_list_readiness(pool, list_id).await?;
    if summary.not_ready > 0 && !allow_incomplete {
        let display_ids: HashMap<Uuid, String> = pto_db::queries::tasks::list_eligible_tasks(pool, list_id)
            .await?
            .into_iter()
            .map(|t| (t.id, t.display_id))
            .collect();
        let incomplete_tasks: Vec<IncompleteTask> =
            readiness::incomplete_tasks(&summary.scores.values().cloned().collect::<Vec<_>>(), &display_ids);
        return Err(PtoError::ExecutionBlocked {
            threshold: readiness::READY_THRESHOLD as u8,
            incomplete_tasks,
        });
    }

    if summary.not_ready > 0 && allow_incomplete {
        pto_db::queries::executions::record_override(pool, list_id, summary.not_ready as i32).await?;
    }

    let analysis: ListAnalysis = parallelism::analyze_list(
        pool,
        list_id,
        AnalyzeOptions { force_reanalyze: false, significance_threshold: config.significance_threshold },
    )
    .await?;

    pto_db::queries::waves::delete_waves_for_list(pool, list_id).await?;
    for wave in &analysis.waves {
        pto_db::queries::waves::insert_wave(pool, list_id, wave.wave_number, analysis.max_parallelism, &wave.members)
            .await?;
    }

    let run = pto_db::queries::executions::start_run(pool, list_id).await?;
    pto_db::queries::task_lists::update_task_list_status(pool, list_id, TaskListStatus::Running).await?;

    let (events_tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
    if let Some(first) = analysis.waves.first() {
        emit(
            &events_tx,
            OrchestratorEvent::WaveStarted {
                execution_id: run.id,
                wave_number: first.wave_number,
                task_count: first.members.len() as i32,
            },
        );
    }

    Ok(ExecutionSession { run_id: run.id, task_list_id: list_id, waves: analysis.waves, events_tx })
}

/// Internal signal fed into the control loop's single channel — the
/// orchestrator's sole source of state-mutating input besides the
/// heartbeat-timeout tick and the cancellation token.
enum Signal {
    Worker { worker_id: Uuid, task_id: Uuid, event: WorkerEvent },
}

/// Drive a started session's waves to completion. Returns the run's
/// terminal status. This is the execution loop of spec.md S4.G: within a
/// wave, dispatch in position order up to the concurrency cap; wait for
/// worker events; retry retryable failures up to `config.retry_max`;
/// advance once a wave's tasks are all terminal.
pub async fn run_to_completion(
    pool: &PgPool,
    session: &ExecutionSession,
    registry: &WorkerRegistry,
    worker_kind: &str,
    config: &OrchestratorConfig,
    cancel: CancellationToken,
) -> Result<RunStatus, PtoError> {
    let mut list_failed = false;

    for wave in &session.waves {
        if cancel.is_cancelled() {
            break;
        }

        let wave_row_id = wave_row_id(pool, session.task_list_id, wave.wave_number).await?;
        pto_db::queries::waves::mark_wave_active(pool, wave_row_id).await?;

        let wave_failed = run_wave(pool, session, wave, registry, worker_kind, config, &cancel).await?;
        let completed_in_wave = wave.members.len() as i32 - wave_failed;

        pto_db::queries::waves::close_wave(
            pool,
            wave_row_id,
            completed_in_wave.max(0),
            wave_failed,
            wave.members.len() as i32,
        )
        .await?;

        emit(
            &session.events_tx,
            OrchestratorEvent::WaveCompleted {
                execution_id: session.run_id,
                wave_number: wave.wave_number,
                completed: completed_in_wave.max(0),
                failed: wave_failed,
            },
        );

        if wave_failed > 0 {
            list_failed = true;
            break;
        }
    }

    let status = if cancel.is_cancelled() {
        RunStatus::Cancelled
    } else if list_failed {
        RunStatus::Failed
    } else {
        RunStatus::Complete
    };

    pto_db::queries::executions::close_run(pool, session.run_id, status).await?;
    pto_db::queries::task_lists::update_task_list_status(
        pool,
        session.task_list_id,
        match status {
            RunStatus::Complete => TaskListStatus::Complete,
            RunStatus::Failed => TaskListStatus::Failed,
            RunStatus::Cancelled => TaskListStatus::Paused,
            RunStatus::Running => TaskListStatus::Running,
        },
    )
    .await?;
    pto_db::queries::task_lists::refresh_task_list_counts(pool, session.task_list_id).await?;

    Ok(status)
}

async fn wave_row_id(pool: &PgPool, list_id: Uuid, wave_number: i32) -> Result<Uuid, PtoError> {
    let waves = pto_db::queries::waves::list_waves_for_list(pool, list_id).await?;
    waves
        .into_iter()
        .find(|w| w.wave_number == wave_number)
        .map(|w| w.id)
        .ok_or_else(|| PtoError::ConfigError {
            message: format!("wave {wave_number} not found for list {list_id}"),
        })
}

/// Run a single wave to completion; returns the number of tasks that ended
/// terminally `failed`.
async fn run_wave(
    pool: &PgPool,
    session: &ExecutionSession,
    wave: &Wave,
    registry: &WorkerRegistry,
    worker_kind: &str,
    config: &OrchestratorConfig,
    cancel: &CancellationToken,
) -> Result<i32, PtoError> {
    let semaphore = Arc::new(Semaphore::new(config.concurrency_cap.max(1)));
    let (tx, mut rx) = mpsc::channel::<Signal>(config.concurrency_cap.max(1) * 4);
    let mut heartbeat_tick = tokio::time::interval(config.heartbeat_timeout / 4);

    let mut pending: Vec<Uuid> = wave.members.clone();
    let mut running: HashMap<Uuid, Uuid> = HashMap::new(); // task_id -> worker_id
    let mut workers: HashMap<Uuid, Box<dyn Worker>> = HashMap::new();
    let mut permits: HashMap<Uuid, tokio::sync::OwnedSemaphorePermit> = HashMap::new(); // task_id -> held permit
    let mut attempts: HashMap<Uuid, u32> = HashMap::new();
    let mut failed_count = 0i32;

    loop {
        while !pending.is_empty() {
            let Ok(permit) = semaphore.clone().try_acquire_owned() else { break };
            let task_id = pending.remove(0);
            let Some(task) = pto_db::queries::tasks::get_task(pool, task_id).await? else { continue };

            let Some(mut w) = registry.spawn(worker_kind) else {
                return Err(PtoError::ConfigError { message: format!("no worker factory registered for '{worker_kind}'") });
            };

            pto_db::queries::tasks::transition_status(pool, task_id, TaskStatus::Pending, TaskStatus::Running)
                .await?;

            let criteria = pto_db::queries::acceptance_criteria::list_for_task(pool, task_id).await?;
            let test_commands = pto_db::queries::test_commands::list_for_task(pool, task_id).await?;
            let ctx = TaskContext {
                task_id,
                display_id: task.display_id.clone(),
                title: task.title.clone(),
                description: task.description.clone(),
                acceptance_criteria: criteria.into_iter().map(|c| c.text).collect(),
                test_commands: test_commands.into_iter().map(|c| c.command).collect(),
                working_dir: std::env::temp_dir(),
                env_vars: HashMap::new(),
                attempt: *attempts.entry(task_id).or_insert(1),
            };

            let worker_row = pto_db::queries::workers::insert_worker(pool, session.run_id).await?;
            pto_db::queries::workers::assign_task(pool, worker_row.id, task_id).await?;

            w.dispatch(&ctx).await.map_err(|e| PtoError::WorkerFailure {
                worker_id: worker_row.id,
                task_id,
                reason: e.to_string(),
            })?;

            emit(
                &session.events_tx,
                OrchestratorEvent::TaskStarted { task_id, worker_id: worker_row.id, wave_number: wave.wave_number },
            );

            let mut stream = w.events();
            let tx_clone = tx.clone();
            let worker_id = worker_row.id;
            tokio::spawn(async move {
                while let Some(event) = stream.next().await {
                    if tx_clone.send(Signal::Worker { worker_id, task_id, event }).await.is_err() {
                        break;
                    }
                }
            });

            running.insert(task_id, worker_row.id);
            workers.insert(worker_row.id, w);
            permits.insert(task_id, permit);
        }

        if running.is_empty() {
            break;
        }

        tokio::select! {
            _ = cancel.cancelled() => {
                for (task_id, worker_id) in running.drain() {
                    if let Some(w) = workers.remove(&worker_id) {
                        let _ = tokio::time::timeout(config.cancel_grace, w.cancel()).await;
                        let _ = w.kill().await;
                    }
                    permits.remove(&task_id);
                    pto_db::queries::tasks::set_status(pool, task_id, TaskStatus::Cancelled).await?;
                    pto_db::queries::workers::set_status(pool, worker_id, pto_db::models::WorkerStatus::Terminated).await?;
                }
                break;
            }
            _ = heartbeat_tick.tick() => {
                let cutoff = chrono::Utc::now() - chrono::Duration::from_std(config.heartbeat_timeout).unwrap_or_default();
                for stalled in pto_db::queries::workers::list_stalled(pool, session.run_id, cutoff).await? {
                    let Some(task_id) = stalled.current_task_id else { continue };
                    running.remove(&task_id);
                    workers.remove(&stalled.id);
                    permits.remove(&task_id);
                    pto_db::queries::tasks::set_status(pool, task_id, TaskStatus::Blocked).await?;
                    pto_db::queries::workers::set_status(pool, stalled.id, pto_db::models::WorkerStatus::Error).await?;
                    emit(
                        &session.events_tx,
                        OrchestratorEvent::WorkerStalled {
                            worker_id: stalled.id,
                            task_id,
                            last_heartbeat_at: stalled.last_heartbeat,
                        },
                    );
                    if *attempts.get(&task_id).unwrap_or(&1) <= config.retry_max {
                        pto_db::queries::tasks::retry_to_pending(pool, task_id).await?;
                        pending.push(task_id);
                    } else {
                        pto_db::queries::tasks::set_status(pool, task_id, TaskStatus::Failed).await?;
                        failed_count += 1;
                    }
                }
            }
            signal = rx.recv() => {
                let Some(Signal::Worker { worker_id, task_id, event }) = signal else { break };
                match event {
                    WorkerEvent::Heartbeat { progress_percent, cpu_percent, memory_mb } => {
                        pto_db::queries::workers::record_heartbeat(pool, worker_id, progress_percent, cpu_percent, memory_mb).await?;
                        emit(
                            &session.events_tx,
                            OrchestratorEvent::WorkerHeartbeat {
                                worker_id,
                                task_id: Some(task_id),
                                progress: progress_percent,
                                age_seconds: 0.0,
                            },
                        );
                    }
                    WorkerEvent::Completed => {
                        running.remove(&task_id);
                        workers.remove(&worker_id);
                        permits.remove(&task_id);
                        pto_db::queries::tasks::transition_status(pool, task_id, TaskStatus::Running, TaskStatus::Complete).await?;
                        pto_db::queries::workers::release_to_idle(pool, worker_id).await?;
                        emit(&session.events_tx, OrchestratorEvent::TaskCompleted { task_id, duration_ms: 0 });
                    }
                    WorkerEvent::Failed { retryable, reason } => {
                        running.remove(&task_id);
                        workers.remove(&worker_id);
                        permits.remove(&task_id);
                        pto_db::queries::workers::release_to_idle(pool, worker_id).await?;
                        let attempt = *attempts.get(&task_id).unwrap_or(&1);
                        emit(&session.events_tx, OrchestratorEvent::TaskFailed { task_id, reason: reason.clone(), attempt: attempt as i32 });

                        if retryable && attempt <= config.retry_max {
                            pto_db::queries::tasks::retry_to_pending(pool, task_id).await?;
                            attempts.insert(task_id, attempt + 1);
                            pending.push(task_id);
                        } else {
                            pto_db::queries::tasks::set_status(pool, task_id, TaskStatus::Failed).await?;
                            failed_count += 1;
                        }
                    }
                }
            }
        }
    }

    Ok(failed_count)
}

/// `pauseExecution`: halts further task assignment without touching
/// already-running tasks (spec.md S4.G).
pub async fn pause_execution(pool: &PgPool, list_id: Uuid) -> Result<(), PtoError> {
    pto_db::queries::task_lists::update_task_list_status(pool, list_id, TaskListStatus::Paused).await?;
    Ok(())
}

/// `resume`: moves a paused list back to `running`.
pub async fn resume_execution(pool: &PgPool, list_id: Uuid) -> Result<(), PtoError> {
    pto_db::queries::task_lists::update_task_list_status(pool, list_id, TaskListStatus::Running).await?;
    Ok(())
}

/// Conflict-resolution step gets its own module ([`crate::resolver`]);
/// this just wires the graph/dependency auto-resolution recorded there
/// into the orchestrator's own event stream when invoked mid-session.
pub fn record_auto_resolution(tx: &broadcast::Sender<OrchestratorEvent>, task_a_id: Uuid, task_b_id: Uuid, source: Uuid, target: Uuid) {
    emit(tx, OrchestratorEvent::ConflictAutoResolved { task_a_id, task_b_id, source, target });
}
