//! Row structs and enums mapping onto the PTO schema.
//!
//! Follows the project's enum idiom throughout: `Display` + `FromStr` +
//! a dedicated parse-error type + `sqlx::Type` + `serde`, so every
//! enum round-trips through Postgres `text` columns and JSON alike.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $($variant:ident => $text:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
        #[sqlx(type_name = "text", rename_all = "snake_case")]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let s = match self {
                    $(Self::$variant => $text),+
                };
                f.write_str(s)
            }
        }

        impl FromStr for $name {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant)),+,
                    other => Err(ParseEnumError {
                        kind: stringify!($name),
                        value: other.to_owned(),
                    }),
                }
            }
        }
    };
}

/// Error returned when parsing an invalid enum string from storage.
#[derive(Debug, Clone)]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: {:?}", self.kind, self.value)
    }
}

impl std::error::Error for ParseEnumError {}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

string_enum! {
    /// Lifecycle status of a task (spec.md S3, S4.G).
    TaskStatus {
        Pending => "pending",
        Evaluating => "evaluating",
        Running => "running",
        Complete => "complete",
        Failed => "failed",
        Blocked => "blocked",
        Skipped => "skipped",
        Cancelled => "cancelled",
    }
}

impl TaskStatus {
    /// Terminal states per spec.md S4.G: complete, failed, cancelled, skipped.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Complete | Self::Failed | Self::Cancelled | Self::Skipped
        )
    }
}

string_enum! {
    /// Lifecycle status of a task list.
    TaskListStatus {
        Draft => "draft",
        Ready => "ready",
        Running => "running",
        Paused => "paused",
        Complete => "complete",
        Failed => "failed",
    }
}

string_enum! {
    /// File operation claimed by a task against a path.
    FileOperation {
        Create => "create",
        Update => "update",
        Delete => "delete",
        Read => "read",
    }
}

string_enum! {
    /// Classification of a pairwise parallelism verdict.
    ConflictType {
        None => "none",
        Dependency => "dependency",
        FileConflict => "file_conflict",
    }
}

string_enum! {
    /// Directed relationship type between two tasks. Only `DependsOn`
    /// affects scheduling; the rest are informational per spec.md S3.
    RelationshipType {
        DependsOn => "depends_on",
        Blocks => "blocks",
        ParentOf => "parent_of",
        ChildOf => "child_of",
        RelatedTo => "related_to",
        DuplicateOf => "duplicate_of",
        Supersedes => "supersedes",
        Implements => "implements",
        ConflictsWith => "conflicts_with",
        Enables => "enables",
        InspiredBy => "inspired_by",
        Tests => "tests",
    }
}

string_enum! {
    /// Status of a build-agent (worker) instance.
    WorkerStatus {
        Idle => "idle",
        Working => "working",
        Blocked => "blocked",
        Error => "error",
        Terminated => "terminated",
    }
}

string_enum! {
    /// Task priority, P1 (highest) through P4 (lowest).
    Priority {
        P1 => "p1",
        P2 => "p2",
        P3 => "p3",
        P4 => "p4",
    }
}

impl Priority {
    /// Ordinal used by the edge-removal scoring heuristic (spec.md S4.C):
    /// P1 contributes 0, P4 contributes 3.
    pub fn removal_score_component(self) -> u32 {
        match self {
            Self::P1 => 0,
            Self::P2 => 1,
            Self::P3 => 2,
            Self::P4 => 3,
        }
    }
}

string_enum! {
    /// Coarse effort estimate for a task.
    EffortBucket {
        Trivial => "trivial",
        Small => "small",
        Medium => "medium",
        Large => "large",
        Epic => "epic",
    }
}

impl EffortBucket {
    /// Whether this bucket counts as "time bounded" per the readiness
    /// rule `timeBounded` (spec.md S4.F): trivial/small/medium pass.
    pub fn is_time_bounded(self) -> bool {
        matches!(self, Self::Trivial | Self::Small | Self::Medium)
    }
}

string_enum! {
    /// Provenance of a claimed file impact.
    Provenance {
        AiInferred => "ai-inferred",
        User => "user",
        ActualAfterRun => "actual-after-run",
    }
}

string_enum! {
    /// Status of a single execution wave.
    WaveStatus {
        Pending => "pending",
        Active => "active",
        Complete => "complete",
        Failed => "failed",
    }
}

string_enum! {
    /// Status of a task-list execution run.
    RunStatus {
        Running => "running",
        Complete => "complete",
        Failed => "failed",
        Cancelled => "cancelled",
    }
}

string_enum! {
    /// Kind of admission override recorded in the audit log.
    OverrideType {
        AllowIncomplete => "allow_incomplete",
    }
}

// ---------------------------------------------------------------------------
// Row structs
// ---------------------------------------------------------------------------

/// `task_lists` row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TaskList {
    pub id: Uuid,
    pub name: String,
    pub project_id: Option<Uuid>,
    pub status: TaskListStatus,
    pub total_tasks: i32,
    pub completed_tasks: i32,
    pub failed_tasks: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// `tasks` row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Task {
    pub id: Uuid,
    pub display_id: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub status: TaskStatus,
    pub priority: Priority,
    pub effort: EffortBucket,
    pub phase: Option<String>,
    pub position: i32,
    pub task_list_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub attempt_count: i32,
}

/// `task_relationships` row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TaskRelationship {
    pub id: Uuid,
    pub source_task_id: Uuid,
    pub target_task_id: Uuid,
    pub relationship_type: RelationshipType,
    /// Distinguishes human-declared `depends_on` edges from ones the
    /// Conflict Resolver inserted automatically (spec.md S9: "the dual
    /// role of depends_on ... should be preserved on the relationship
    /// row too").
    pub auto_resolved: bool,
    pub created_at: DateTime<Utc>,
}

/// `task_file_impacts` row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FileImpact {
    pub id: Uuid,
    pub task_id: Uuid,
    pub file_path: String,
    pub operation: FileOperation,
    pub confidence: f32,
    pub source: Provenance,
    pub created_at: DateTime<Utc>,
}

/// `task_acceptance_criteria` row (supplemental table, SPEC_FULL.md S6).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AcceptanceCriterion {
    pub id: Uuid,
    pub task_id: Uuid,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// `task_test_commands` row (supplemental table, SPEC_FULL.md S6).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TestCommand {
    pub id: Uuid,
    pub task_id: Uuid,
    pub command: String,
    pub created_at: DateTime<Utc>,
}

/// `parallelism_analysis` row. `task_a_id < task_b_id` is the storage
/// invariant giving each unordered pair one canonical row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ParallelismAnalysisRow {
    pub id: Uuid,
    pub task_a_id: Uuid,
    pub task_b_id: Uuid,
    pub can_parallel: bool,
    pub conflict_type: ConflictType,
    pub conflict_details: serde_json::Value,
    pub analyzed_at: DateTime<Utc>,
    pub invalidated_at: Option<DateTime<Utc>>,
}

/// `execution_waves` row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ExecutionWave {
    pub id: Uuid,
    pub task_list_id: Uuid,
    pub wave_number: i32,
    pub status: WaveStatus,
    pub task_count: i32,
    pub completed_count: i32,
    pub failed_count: i32,
    pub max_parallelism: i32,
    pub actual_parallelism: i32,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// `wave_task_assignments` row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WaveTaskAssignment {
    pub wave_id: Uuid,
    pub task_id: Uuid,
    pub position: i32,
}

/// `task_list_execution_runs` row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ExecutionRun {
    pub id: Uuid,
    pub task_list_id: Uuid,
    pub run_number: i32,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// `build_agent_instances` row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BuildAgentInstance {
    pub id: Uuid,
    pub session_id: Uuid,
    pub status: WorkerStatus,
    pub current_task_id: Option<Uuid>,
    pub last_heartbeat: DateTime<Utc>,
    pub progress_percent: Option<f32>,
    pub cpu_percent: Option<f32>,
    pub memory_mb: Option<f32>,
}

/// `execution_override_log` row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ExecutionOverrideLog {
    pub id: Uuid,
    pub task_list_id: Uuid,
    pub incomplete_count: i32,
    pub override_type: OverrideType,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_status_round_trips() {
        for (variant, text) in [
            (TaskStatus::Pending, "pending"),
            (TaskStatus::Evaluating, "evaluating"),
            (TaskStatus::Running, "running"),
            (TaskStatus::Complete, "complete"),
            (TaskStatus::Failed, "failed"),
            (TaskStatus::Blocked, "blocked"),
            (TaskStatus::Skipped, "skipped"),
            (TaskStatus::Cancelled, "cancelled"),
        ] {
            assert_eq!(variant.to_string(), text);
            assert_eq!(TaskStatus::from_str(text).unwrap(), variant);
        }
    }

    #[test]
    fn task_status_terminal_states() {
        assert!(TaskStatus::Complete.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
        assert!(TaskStatus::Skipped.is_terminal());
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
        assert!(!TaskStatus::Blocked.is_terminal());
    }

    #[test]
    fn priority_parses_unknown_as_error() {
        let err = Priority::from_str("p5").unwrap_err();
        assert!(err.to_string().contains("p5"));
    }

    #[test]
    fn priority_removal_score_component_orders_p1_lowest() {
        assert_eq!(Priority::P1.removal_score_component(), 0);
        assert_eq!(Priority::P4.removal_score_component(), 3);
    }

    #[test]
    fn effort_bucket_time_bounded() {
        assert!(EffortBucket::Trivial.is_time_bounded());
        assert!(EffortBucket::Medium.is_time_bounded());
        assert!(!EffortBucket::Large.is_time_bounded());
        assert!(!EffortBucket::Epic.is_time_bounded());
    }

    #[test]
    fn relationship_type_round_trips_depends_on() {
        assert_eq!(RelationshipType::DependsOn.to_string(), "depends_on");
        assert_eq!(
            RelationshipType::from_str("depends_on").unwrap(),
            RelationshipType::DependsOn
        );
    }
}
