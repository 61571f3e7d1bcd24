//! The `Worker` trait: the adapter interface to an external build-agent
//! process (spec.md S4.G, "Worker contract").
//!
//! Generalizes the teacher's `Harness` trait (`harness::trait_def`) from a
//! single coding-agent adapter to the PTO's worker-pool contract: a worker
//! is handed one task at a time, must heartbeat at least every
//! `T_heartbeat` seconds, and must end in exactly one of `complete` or
//! `fail`. Object-safe so it can be stored as `Box<dyn Worker>` in
//! [`WorkerRegistry`], the same way the teacher stored `Box<dyn Harness>`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Everything a worker needs to execute one task: identity, instructions,
/// and the project-tree location it should operate in.
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub task_id: Uuid,
    pub display_id: String,
    pub title: String,
    pub description: String,
    pub acceptance_criteria: Vec<String>,
    pub test_commands: Vec<String>,
    pub working_dir: PathBuf,
    pub env_vars: HashMap<String, String>,
    pub attempt: i32,
}

/// An event a worker reports about its currently-dispatched task.
/// Mirrors spec.md S4.G's worker-event vocabulary
/// (`complete`/`fail`/`heartbeat`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WorkerEvent {
    /// Progress/liveness signal. Must arrive at least every `T_heartbeat`
    /// seconds or the orchestrator deems the worker stalled.
    Heartbeat {
        progress_percent: Option<f32>,
        cpu_percent: Option<f32>,
        memory_mb: Option<f32>,
    },
    /// Terminal success.
    Completed,
    /// Terminal or retryable failure.
    Failed { retryable: bool, reason: String },
}

/// Adapter interface for an external build-agent process.
///
/// # Object Safety
///
/// Every method returns a concrete type or a boxed trait object, so
/// `Box<dyn Worker>` can live in [`WorkerRegistry`] and in the
/// orchestrator's worker pool.
#[async_trait]
pub trait Worker: Send + Sync {
    /// Human-readable name for this worker kind (e.g. "claude-code",
    /// "codex-cli", "in-process-simulator").
    fn name(&self) -> &str;

    /// Dispatch a task to this worker. Returns once the worker has
    /// accepted the task and begun work; does not block until completion
    /// ("worker dispatch is non-blocking from the orchestrator's
    /// perspective", spec.md S5).
    async fn dispatch(&self, task: &TaskContext) -> anyhow::Result<()>;

    /// Stream of events for the task most recently dispatched to this
    /// worker. Yields until the worker emits `Completed` or `Failed`, at
    /// which point the stream ends.
    fn events(&self) -> Pin<Box<dyn Stream<Item = WorkerEvent> + Send>>;

    /// Ask the worker to stop its current task. Cooperative: the worker
    /// has `T_grace` seconds to exit cleanly (spec.md S4.G) before the
    /// orchestrator force-terminates it via [`Worker::kill`].
    async fn cancel(&self) -> anyhow::Result<()>;

    /// Force-terminate the worker process outright, used after a stall or
    /// an expired cancellation grace window.
    async fn kill(&self) -> anyhow::Result<()>;

    /// Whether the worker process is still alive.
    async fn is_running(&self) -> bool;
}

/// A collection of registered worker-kind adapters, keyed by name, mirroring
/// the teacher's `HarnessRegistry`. The orchestrator looks up the adapter
/// for a session's configured worker kind and spawns fresh instances from
/// it per worker slot.
#[derive(Default)]
pub struct WorkerRegistry {
    factories: HashMap<String, Box<dyn WorkerFactory>>,
}

/// Constructs fresh `Worker` instances of one kind. Separate from `Worker`
/// itself because the orchestrator needs a new process per concurrent
/// worker slot, not one shared adapter instance.
pub trait WorkerFactory: Send + Sync {
    fn kind(&self) -> &str;
    fn spawn(&self) -> Box<dyn Worker>;
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a worker factory. If a factory with the same name is
    /// already registered, it is replaced and the old one is returned.
    pub fn register(&mut self, factory: impl WorkerFactory + 'static) -> Option<Box<dyn WorkerFactory>> {
        let name = factory.kind().to_string();
        self.factories.insert(name, Box::new(factory))
    }

    /// Spawn a fresh worker of the given kind.
    pub fn spawn(&self, kind: &str) -> Option<Box<dyn Worker>> {
        self.factories.get(kind).map(|f| f.spawn())
    }

    pub fn list(&self) -> Vec<&str> {
        self.factories.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl std::fmt::Debug for WorkerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerRegistry")
            .field("kinds", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

// Compile-time assertion: Worker must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn Worker) {}
};

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Mutex;

    /// A worker that completes immediately, for exercising the
    /// orchestrator's happy path without a real subprocess.
    struct NoopWorker {
        running: Mutex<bool>,
    }

    impl Default for NoopWorker {
        fn default() -> Self {
            Self { running: Mutex::new(false) }
        }
    }

    #[async_trait]
    impl Worker for NoopWorker {
        fn name(&self) -> &str {
            "noop"
        }

        async fn dispatch(&self, _task: &TaskContext) -> anyhow::Result<()> {
            *self.running.lock().await = true;
            Ok(())
        }

        fn events(&self) -> Pin<Box<dyn Stream<Item = WorkerEvent> + Send>> {
            Box::pin(futures::stream::once(async { WorkerEvent::Completed }))
        }

        async fn cancel(&self) -> anyhow::Result<()> {
            Ok(())
        }

        async fn kill(&self) -> anyhow::Result<()> {
            *self.running.lock().await = false;
            Ok(())
        }

        async fn is_running(&self) -> bool {
            *self.running.lock().await
        }
    }

    struct NoopFactory;
    impl WorkerFactory for NoopFactory {
        fn kind(&self) -> &str {
            "noop"
        }
        fn spawn(&self) -> Box<dyn Worker> {
            Box::new(NoopWorker::default())
        }
    }

    #[test]
    fn worker_is_object_safe() {
        let worker: Box<dyn Worker> = Box::new(NoopWorker::default());
        assert_eq!(worker.name(), "noop");
    }

    #[tokio::test]
    async fn dispatch_then_events_reaches_completed() {
        use futures::StreamExt;

        let worker = NoopWorker::default();
        let ctx = TaskContext {
            task_id: Uuid::new_v4(),
            display_id: "T1".into(),
            title: "t".into(),
            description: "d".into(),
            acceptance_criteria: vec![],
            test_commands: vec![],
            working_dir: PathBuf::from("/tmp"),
            env_vars: HashMap::new(),
            attempt: 1,
        };

        worker.dispatch(&ctx).await.unwrap();
        assert!(worker.is_running().await);

        let events: Vec<WorkerEvent> = worker.events().collect().await;
        assert_eq!(events, vec![WorkerEvent::Completed]);
    }

    #[test]
    fn registry_spawns_fresh_instances_per_call() {
        let mut registry = WorkerRegistry::new();
        registry.register(NoopFactory);
        assert_eq!(registry.len(), 1);
        let a = registry.spawn("noop");
        let b = registry.spawn("noop");
        assert!(a.is_some());
        assert!(b.is_some());
        assert!(registry.spawn("missing").is_none());
    }
}
