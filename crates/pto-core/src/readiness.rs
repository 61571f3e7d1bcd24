//! Readiness Evaluator (component F, spec.md S4.F): scores a task against
//! six independent rules summing to an overall `[0, 100]` composite and
//! decides whether it is fit for execution.
//!
//! Pure function of the task's own fields plus its impacts, acceptance
//! criteria, test commands, and `depends_on` count — no further I/O, so
//! `evaluate` takes an owned-ish view (`ReadinessInput`) rather than a
//! database handle. The cache sits one layer up (`ReadinessCache`) because
//! invalidation is keyed by task id and driven by the mutation contract
//! (spec.md S5), not by this module's own logic.

use std::collections::HashMap;
use std::sync::Arc;

use pto_db::models::EffortBucket;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Threshold above or at which a task counts as ready (spec.md S4.F).
pub const READY_THRESHOLD: f32 = 70.0;

/// Maximum file-impact count for the `boundedFiles` rule.
const MAX_BOUNDED_FILES: usize = 5;

/// Maximum `depends_on` count for the `independent` rule.
const MAX_INDEPENDENT_DEPS: usize = 3;

const WEIGHT_SINGLE_CONCERN: f32 = 15.0;
const WEIGHT_BOUNDED_FILES: f32 = 20.0;
const WEIGHT_TIME_BOUNDED: f32 = 10.0;
const WEIGHT_TESTABLE: f32 = 20.0;
const WEIGHT_INDEPENDENT: f32 = 15.0;
const WEIGHT_CLEAR_COMPLETION: f32 = 20.0;

/// Everything the evaluator needs about one task, gathered by the caller
/// from the Store Gateway (`pto_db::queries`) before calling [`evaluate`].
#[derive(Debug, Clone)]
pub struct ReadinessInput {
    pub task_id: Uuid,
    pub display_id: String,
    pub category: String,
    pub title: String,
    pub description: String,
    pub effort: EffortBucket,
    pub file_impact_count: usize,
    pub acceptance_criteria: Vec<String>,
    pub test_command_count: usize,
    pub depends_on_count: usize,
}

/// Per-rule scores plus the overall composite and readiness verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadinessScore {
    pub task_id: Uuid,
    pub single_concern: f32,
    pub bounded_files: f32,
    pub time_bounded: f32,
    pub testable: f32,
    pub independent: f32,
    pub clear_completion: f32,
    pub overall: f32,
    pub is_ready: bool,
    pub missing_items: Vec<String>,
}

/// A single task that failed the readiness gate, as surfaced on
/// [`crate::error::PtoError::ExecutionBlocked`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncompleteTask {
    pub task_id: Uuid,
    pub display_id: String,
    pub readiness: f32,
    pub missing_items: Vec<String>,
}

/// Score a single task against all six rules (spec.md S4.F table).
pub fn evaluate(input: &ReadinessInput) -> ReadinessScore {
    let mut missing_items = Vec::new();

    let single_concern_ok = !has_multi_concern_language(&input.title, &input.description);
    if !single_concern_ok {
        missing_items.push("description covers more than one concern".to_string());
    }

    let bounded_files_ok =
        input.file_impact_count <= MAX_BOUNDED_FILES && !has_unbounded_language(&input.description);
    if !bounded_files_ok {
        missing_items.push(format!(
            "file impact count {} exceeds {MAX_BOUNDED_FILES} or description implies unbounded scope",
            input.file_impact_count
        ));
    }

    let time_bounded_ok = input.effort.is_time_bounded();
    if !time_bounded_ok {
        missing_items.push(format!("effort bucket '{}' too large", input.effort));
    }

    let has_criteria = !input.acceptance_criteria.is_empty();
    let has_tests = input.test_command_count > 0;
    let testable_ok = has_criteria && has_tests;
    if !has_criteria {
        missing_items.push("acceptance criteria missing".to_string());
    }
    if !has_tests {
        missing_items.push("test command missing".to_string());
    }

    let independent_ok =
        !has_sequencing_language(&input.description) && input.depends_on_count <= MAX_INDEPENDENT_DEPS;
    if !independent_ok {
        missing_items.push("description implies sequencing or has too many dependencies".to_string());
    }

    let criteria_verifiable = has_criteria
        && input
            .acceptance_criteria
            .iter()
            .all(|c| is_verifiable_phrased(c));
    if has_criteria && !criteria_verifiable {
        missing_items.push("acceptance criteria are not verifiable-phrased".to_string());
    }

    let single_concern = if single_concern_ok { WEIGHT_SINGLE_CONCERN } else { 0.0 };
    let bounded_files = if bounded_files_ok { WEIGHT_BOUNDED_FILES } else { 0.0 };
    let time_bounded = if time_bounded_ok { WEIGHT_TIME_BOUNDED } else { 0.0 };
    let testable = if testable_ok { WEIGHT_TESTABLE } else { 0.0 };
    let independent = if independent_ok { WEIGHT_INDEPENDENT } else { 0.0 };
    let clear_completion = if criteria_verifiable { WEIGHT_CLEAR_COMPLETION } else { 0.0 };

    let overall = single_concern + bounded_files + time_bounded + testable + independent + clear_completion;

    ReadinessScore {
        task_id: input.task_id,
        single_concern,
        bounded_files,
        time_bounded,
        testable,
        independent,
        clear_completion,
        overall,
        is_ready: overall >= READY_THRESHOLD,
        missing_items,
    }
}

fn has_multi_concern_language(title: &str, description: &str) -> bool {
    let haystack = format!("{title} {description}").to_lowercase();
    [" and also ", " as well as ", " plus fix ", " in addition to "]
        .iter()
        .any(|needle| haystack.contains(needle))
}

fn has_unbounded_language(description: &str) -> bool {
    let lower = description.to_lowercase();
    ["wildcard", " all ", " many ", "everywhere", "throughout the codebase"]
        .iter()
        .any(|needle| lower.contains(needle))
}

fn has_sequencing_language(description: &str) -> bool {
    description.to_lowercase().contains("and then")
}

fn is_verifiable_phrased(criterion: &str) -> bool {
    let lower = criterion.trim().to_lowercase();
    if lower.is_empty() {
        return false;
    }
    const VERIFIABLE_STARTS: &[&str] = &[
        "returns", "raises", "renders", "rejects", "accepts", "responds",
        "produces", "passes", "fails", "the", "given", "when", "status",
    ];
    VERIFIABLE_STARTS.iter().any(|s| lower.starts_with(s))
}

/// Invalidation-aware cache of readiness scores, keyed by task id
/// (spec.md S5 mutation contract). Guarded by an `RwLock` so bulk reads
/// (list aggregation) and single-task invalidations don't serialize on a
/// mutex the way the teacher's `Mutex`-guarded state did.
#[derive(Debug, Default, Clone)]
pub struct ReadinessCache {
    inner: Arc<RwLock<HashMap<Uuid, ReadinessScore>>>,
}

impl ReadinessCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached score, recomputing and storing it via `compute`
    /// if absent.
    pub async fn get_or_evaluate(&self, task_id: Uuid, input: &ReadinessInput) -> ReadinessScore {
        if let Some(score) = self.inner.read().await.get(&task_id).cloned() {
            return score;
        }
        let score = evaluate(input);
        self.inner.write().await.insert(task_id, score.clone());
        score
    }

    /// Drop the cached score for a task, per the mutation contract: any
    /// write touching its description, impacts, relationships, acceptance
    /// criteria, or test commands invalidates it (spec.md S5).
    pub async fn invalidate(&self, task_id: Uuid) {
        self.inner.write().await.remove(&task_id);
    }

    pub async fn invalidate_all(&self) {
        self.inner.write().await.clear();
    }
}

/// Aggregate scores across a list: totals plus the per-task map, as the
/// bulk readiness API returns (spec.md S3's "Per list" aggregate).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListReadinessSummary {
    pub total: usize,
    pub ready: usize,
    pub not_ready: usize,
    pub scores: HashMap<Uuid, ReadinessScore>,
}

pub fn summarize(scores: Vec<ReadinessScore>) -> ListReadinessSummary {
    let total = scores.len();
    let ready = scores.iter().filter(|s| s.is_ready).count();
    ListReadinessSummary {
        total,
        ready,
        not_ready: total - ready,
        scores: scores.into_iter().map(|s| (s.task_id, s)).collect(),
    }
}

/// Collect the tasks failing the gate into the shape `ExecutionBlocked`
/// carries (spec.md S4.E step 1).
pub fn incomplete_tasks(
    scores: &[ReadinessScore],
    display_ids: &HashMap<Uuid, String>,
) -> Vec<IncompleteTask> {
    scores
        .iter()
        .filter(|s| !s.is_ready)
        .map(|s| IncompleteTask {
            task_id: s.task_id,
            display_id: display_ids.get(&s.task_id).cloned().unwrap_or_default(),
            readiness: s.overall,
            missing_items: s.missing_items.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fully_ready_input() -> ReadinessInput {
        ReadinessInput {
            task_id: Uuid::new_v4(),
            display_id: "T1".into(),
            category: "backend".into(),
            title: "Add rate limiter middleware".into(),
            description: "Wrap the handler with a token-bucket limiter.".into(),
            effort: EffortBucket::Small,
            file_impact_count: 2,
            acceptance_criteria: vec!["Returns 429 once the bucket is empty".into()],
            test_command_count: 1,
            depends_on_count: 0,
        }
    }

    #[test]
    fn fully_ready_task_scores_100() {
        let score = evaluate(&fully_ready_input());
        assert_eq!(score.overall, 100.0);
        assert!(score.is_ready);
        assert!(score.missing_items.is_empty());
    }

    #[test]
    fn missing_acceptance_criteria_drops_two_rules() {
        let mut input = fully_ready_input();
        input.acceptance_criteria.clear();
        let score = evaluate(&input);
        // testable (20) and clearCompletion (20) both fail: 100 - 40 = 60.
        assert_eq!(score.overall, 60.0);
        assert!(!score.is_ready);
        assert!(score.missing_items.iter().any(|m| m.contains("acceptance criteria missing")));
    }

    #[test]
    fn epic_effort_fails_time_bounded_only() {
        let mut input = fully_ready_input();
        input.effort = EffortBucket::Epic;
        let score = evaluate(&input);
        assert_eq!(score.overall, 90.0);
        assert!(score.is_ready);
        assert!(score.missing_items.iter().any(|m| m.contains("epic")));
    }

    #[test]
    fn scenario_5_execution_blocked_task_is_below_threshold() {
        let mut input = fully_ready_input();
        input.acceptance_criteria.clear();
        input.test_command_count = 0;
        input.effort = EffortBucket::Epic;
        let score = evaluate(&input);
        // 100 - 20 (testable) - 20 (clearCompletion) - 10 (timeBounded) = 50.
        assert_eq!(score.overall, 50.0);
        assert!(!score.is_ready);
    }

    #[test]
    fn readiness_monotonic_under_added_acceptance_criterion() {
        let mut input = fully_ready_input();
        input.acceptance_criteria.clear();
        let before = evaluate(&input).overall;
        input.acceptance_criteria.push("Returns the expected payload".into());
        let after = evaluate(&input).overall;
        assert!(after >= before);
    }

    #[tokio::test]
    async fn cache_invalidation_forces_recompute() {
        let cache = ReadinessCache::new();
        let input = fully_ready_input();
        let first = cache.get_or_evaluate(input.task_id, &input).await;
        assert_eq!(first.overall, 100.0);

        cache.invalidate(input.task_id).await;

        let mut degraded = input.clone();
        degraded.acceptance_criteria.clear();
        let second = cache.get_or_evaluate(degraded.task_id, &degraded).await;
        assert_eq!(second.overall, 60.0);
    }
}
