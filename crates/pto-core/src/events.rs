//! The orchestrator's event vocabulary (spec.md S6): ten named events,
//! broadcast on a `tokio::sync::broadcast` channel so a CLI subcommand or
//! test harness can subscribe without the orchestrator knowing about its
//! consumers, and mirrored into `tracing::info!` at the same call sites.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Capacity of the broadcast channel each session opens. Generous enough
/// that a slow subscriber (e.g. a CLI tailing output) falling behind by a
/// full wave's worth of heartbeats doesn't lose events under normal load.
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OrchestratorEvent {
    #[serde(rename = "wave:started")]
    WaveStarted { execution_id: Uuid, wave_number: i32, task_count: i32 },

    #[serde(rename = "wave:completed")]
    WaveCompleted { execution_id: Uuid, wave_number: i32, completed: i32, failed: i32 },

    #[serde(rename = "task:started")]
    TaskStarted { task_id: Uuid, worker_id: Uuid, wave_number: i32 },

    #[serde(rename = "task:completed")]
    TaskCompleted { task_id: Uuid, duration_ms: i64 },

    #[serde(rename = "task:failed")]
    TaskFailed { task_id: Uuid, reason: String, attempt: i32 },

    #[serde(rename = "worker:heartbeat")]
    WorkerHeartbeat {
        worker_id: Uuid,
        task_id: Option<Uuid>,
        progress: Option<f32>,
        age_seconds: f64,
    },

    #[serde(rename = "worker:stalled")]
    WorkerStalled { worker_id: Uuid, task_id: Uuid, last_heartbeat_at: DateTime<Utc> },

    #[serde(rename = "execution:blocked")]
    ExecutionBlocked { task_list_id: Uuid, incomplete_count: usize, threshold: u8 },

    #[serde(rename = "conflict:detected")]
    ConflictDetected { task_a_id: Uuid, task_b_id: Uuid, conflict_type: String },

    #[serde(rename = "conflict:auto-resolved")]
    ConflictAutoResolved { task_a_id: Uuid, task_b_id: Uuid, source: Uuid, target: Uuid },
}

impl OrchestratorEvent {
    /// Mirror this event into the structured log at the call site, per
    /// SPEC_FULL.md S6's "both machine-subscribable and human-greppable"
    /// requirement.
    pub fn log(&self) {
        tracing::info!(event = ?self, "orchestrator event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_tagged_type_field() {
        let event = OrchestratorEvent::WaveStarted {
            execution_id: Uuid::nil(),
            wave_number: 1,
            task_count: 3,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "wave:started");
        assert_eq!(json["wave_number"], 1);
    }
}
