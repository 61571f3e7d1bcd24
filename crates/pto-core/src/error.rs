//! Domain error taxonomy (spec.md S7): one variant per error kind, carrying
//! the structured payload the spec names. Analysis-layer variants
//! (`ValidationError`, `CycleWouldForm`, `CycleOrDeadlock`, `ExecutionBlocked`)
//! are returned to callers and never retried silently; worker-layer variants
//! (`WorkerStalled`, `WorkerFailure`) are retried per policy by the
//! orchestrator before surfacing; `StoreError` wraps the underlying `sqlx`
//! failure and is never swallowed.

use thiserror::Error;
use uuid::Uuid;

use crate::graph::TaskRef;
use crate::readiness::IncompleteTask;

/// The crate's single typed error enum. Call sites not returning this
/// directly use `anyhow::Result` with `.context()`, per this corpus's dual
/// anyhow/thiserror convention: `thiserror` at boundaries callers pattern
/// match on, `anyhow` everywhere else.
#[derive(Debug, Error)]
pub enum PtoError {
    /// Input violated a precondition (missing title, out-of-range
    /// confidence, malformed edge).
    #[error("validation error: {message}")]
    ValidationError { message: String },

    /// `safeAddDependency` detected a prospective cycle; no write occurred.
    #[error("adding dependency {source} -> {target} would form a cycle: {}", format_cycle(.cycle))]
    CycleWouldForm {
        source: Uuid,
        target: Uuid,
        cycle: Vec<TaskRef>,
    },

    /// Wave construction could not make progress: the `depends_on` graph
    /// restricted to the remaining tasks contains a cycle.
    #[error("cannot schedule {} remaining task(s): cycle or deadlock", remaining.len())]
    CycleOrDeadlock { remaining: Vec<Uuid> },

    /// Readiness gate failed and no override was given.
    #[error("execution blocked: {} task(s) below readiness threshold {threshold}", incomplete_tasks.len())]
    ExecutionBlocked {
        threshold: u8,
        incomplete_tasks: Vec<IncompleteTask>,
    },

    /// Heartbeat timeout exceeded for a worker.
    #[error("worker {worker_id} stalled on task {task_id}")]
    WorkerStalled { worker_id: Uuid, task_id: Uuid },

    /// Worker reported a terminal failure.
    #[error("worker {worker_id} reported terminal failure on task {task_id}: {reason}")]
    WorkerFailure {
        worker_id: Uuid,
        task_id: Uuid,
        reason: String,
    },

    /// Persistence I/O failed. `pto-db`'s query layer wraps the underlying
    /// `sqlx` error with `anyhow::Context`; logged at the point first
    /// observed, then rethrown; never swallowed.
    #[error("store error: {0}")]
    StoreError(#[from] anyhow::Error),

    /// Invariant violated that indicates a programmer bug (e.g. a
    /// parallelism-analysis pair stored with `a > b`).
    #[error("config error: {message}")]
    ConfigError { message: String },
}

fn format_cycle(cycle: &[TaskRef]) -> String {
    cycle
        .iter()
        .map(|t| t.display_id.clone())
        .collect::<Vec<_>>()
        .join(" -> ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_would_form_formats_path() {
        let err = PtoError::CycleWouldForm {
            source: Uuid::nil(),
            target: Uuid::nil(),
            cycle: vec![
                TaskRef { id: Uuid::nil(), display_id: "C".into() },
                TaskRef { id: Uuid::nil(), display_id: "A".into() },
                TaskRef { id: Uuid::nil(), display_id: "B".into() },
            ],
        };
        assert!(err.to_string().contains("C -> A -> B"));
    }

    #[test]
    fn execution_blocked_counts_incomplete() {
        let err = PtoError::ExecutionBlocked {
            threshold: 70,
            incomplete_tasks: vec![IncompleteTask {
                task_id: Uuid::nil(),
                display_id: "T3".into(),
                readiness: 42.0,
                missing_items: vec!["acceptance criteria missing".into()],
            }],
        };
        assert!(err.to_string().contains('1'));
        assert!(err.to_string().contains("70"));
    }
}
