//! `shell` worker kind: drives a task's declared test commands as local
//! subprocesses.
//!
//! Generalizes the teacher's `ClaudeCodeAdapter` (a subprocess-driving
//! coding-agent harness) minus the agent-specific transcript/token bits:
//! a `shell` worker runs each of the task's test commands in sequence
//! inside `working_dir`, heartbeats once per command, and reports
//! `Completed` if every command exits zero or `Failed { retryable: true }`
//! otherwise (a flaky test command is worth one retry; a missing test
//! command is not grounds for failure — spec.md S4.G only requires a
//! worker to end in exactly one of complete/fail).

use std::pin::Pin;
use std::process::Stdio;

use std::sync::Mutex;

use async_trait::async_trait;
use futures::Stream;
use pto_core::worker::{TaskContext, Worker, WorkerEvent, WorkerFactory};
use tokio::process::Command;

/// Runs a task's test commands as local shell subprocesses. Stateless
/// across tasks, per the `Worker` contract; `dispatch` stores the task's
/// commands and working directory for the subsequent `events()` call to
/// drive.
#[derive(Default)]
pub struct ShellWorker {
    running: Mutex<bool>,
    dispatched: Mutex<Option<TaskContext>>,
}

#[async_trait]
impl Worker for ShellWorker {
    fn name(&self) -> &str {
        "shell"
    }

    async fn dispatch(&self, task: &TaskContext) -> anyhow::Result<()> {
        *self.running.lock().unwrap() = true;
        *self.dispatched.lock().unwrap() = Some(task.clone());
        Ok(())
    }

    fn events(&self) -> Pin<Box<dyn Stream<Item = WorkerEvent> + Send>> {
        let task = self.dispatched.lock().unwrap().clone();
        Box::pin(async_stream::stream! {
            let Some(task) = task else {
                yield WorkerEvent::Failed { retryable: false, reason: "no task dispatched".into() };
                return;
            };

            if task.test_commands.is_empty() {
                yield WorkerEvent::Heartbeat { progress_percent: Some(100.0), cpu_percent: None, memory_mb: None };
                yield WorkerEvent::Completed;
                return;
            }

            let total = task.test_commands.len();
            for (i, command) in task.test_commands.iter().enumerate() {
                yield WorkerEvent::Heartbeat {
                    progress_percent: Some((i as f32 / total as f32) * 100.0),
                    cpu_percent: None,
                    memory_mb: None,
                };

                let status = Command::new("sh")
                    .arg("-c")
                    .arg(command)
                    .current_dir(&task.working_dir)
                    .envs(&task.env_vars)
                    .stdin(Stdio::null())
                    .status()
                    .await;

                match status {
                    Ok(status) if status.success() => continue,
                    Ok(status) => {
                        yield WorkerEvent::Failed {
                            retryable: true,
                            reason: format!("command '{command}' exited with {status}"),
                        };
                        return;
                    }
                    Err(e) => {
                        yield WorkerEvent::Failed {
                            retryable: true,
                            reason: format!("command '{command}' failed to spawn: {e}"),
                        };
                        return;
                    }
                }
            }

            yield WorkerEvent::Heartbeat { progress_percent: Some(100.0), cpu_percent: None, memory_mb: None };
            yield WorkerEvent::Completed;
        })
    }

    async fn cancel(&self) -> anyhow::Result<()> {
        *self.running.lock().unwrap() = false;
        Ok(())
    }

    async fn kill(&self) -> anyhow::Result<()> {
        *self.running.lock().unwrap() = false;
        Ok(())
    }

    async fn is_running(&self) -> bool {
        *self.running.lock().unwrap()
    }
}

pub struct ShellWorkerFactory;

impl WorkerFactory for ShellWorkerFactory {
    fn kind(&self) -> &str {
        "shell"
    }

    fn spawn(&self) -> Box<dyn Worker> {
        Box::new(ShellWorker::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use uuid::Uuid;

    fn ctx(test_commands: Vec<String>) -> TaskContext {
        TaskContext {
            task_id: Uuid::new_v4(),
            display_id: "T1".into(),
            title: "t".into(),
            description: "d".into(),
            acceptance_criteria: vec![],
            test_commands,
            working_dir: std::env::temp_dir(),
            env_vars: HashMap::new(),
            attempt: 1,
        }
    }

    #[tokio::test]
    async fn completes_when_all_commands_succeed() {
        let worker = ShellWorker::default();
        worker.dispatch(&ctx(vec!["true".into()])).await.unwrap();
        let events: Vec<WorkerEvent> = worker.events().collect().await;
        assert!(matches!(events.last(), Some(WorkerEvent::Completed)));
    }

    #[tokio::test]
    async fn fails_retryably_when_a_command_exits_nonzero() {
        let worker = ShellWorker::default();
        worker.dispatch(&ctx(vec!["false".into()])).await.unwrap();
        let events: Vec<WorkerEvent> = worker.events().collect().await;
        assert!(matches!(
            events.last(),
            Some(WorkerEvent::Failed { retryable: true, .. })
        ));
    }

    #[tokio::test]
    async fn completes_with_no_test_commands() {
        let worker = ShellWorker::default();
        worker.dispatch(&ctx(vec![])).await.unwrap();
        let events: Vec<WorkerEvent> = worker.events().collect().await;
        assert_eq!(events, vec![
            WorkerEvent::Heartbeat { progress_percent: Some(100.0), cpu_percent: None, memory_mb: None },
            WorkerEvent::Completed,
        ]);
    }

    #[test]
    fn factory_kind_is_shell() {
        assert_eq!(ShellWorkerFactory.kind(), "shell");
    }
}
