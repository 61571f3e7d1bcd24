//! Parallelism Calculator (component D, spec.md S4.D): the densest
//! component. Given a task-list id, produces `{waves, analyses}` such that
//! running waves in order, with each wave's members concurrent, respects
//! both the `depends_on` graph and the file-footprint conflict set.
//!
//! Split into a pure half (`pairwise_verdict`, `build_waves`) that takes
//! plain slices and is unit-testable without Postgres, and a thin
//! persistence half (`analyze_list`) that loads from and writes through
//! `pto_db::queries`.

use std::collections::{HashMap, HashSet};

use pto_db::models::{ConflictType, FileImpact};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::conflict::{self, DEFAULT_SIGNIFICANCE_THRESHOLD};
use crate::error::PtoError;

/// The minimal task view wave construction needs: identity, declared
/// ordering, and its `depends_on` set restricted to the list being waved.
#[derive(Debug, Clone)]
pub struct TaskNode {
    pub id: Uuid,
    pub position: i32,
    pub depends_on: HashSet<Uuid>,
}

/// Direction of a `dependency`-classified pairwise verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DependencyDirection {
    AToB,
    BToA,
}

/// Pairwise `can-run-parallel` verdict for one unordered task pair,
/// canonically ordered `task_a_id < task_b_id` to match the storage
/// invariant on `parallelism_analysis`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairwiseVerdict {
    pub task_a_id: Uuid,
    pub task_b_id: Uuid,
    pub can_parallel: bool,
    pub conflict_type: ConflictType,
    pub details: serde_json::Value,
}

/// Compute the verdict for one pair. `depends_edge` is `Some(direction)` if
/// a `depends_on` edge exists between them in either direction; dependency
/// dominates file conflict in classification when both are present
/// (spec.md S4.D edge cases).
pub fn pairwise_verdict(
    task_a_id: Uuid,
    task_b_id: Uuid,
    depends_edge: Option<DependencyDirection>,
    impacts_a: &[FileImpact],
    impacts_b: &[FileImpact],
    significance_threshold: f32,
) -> PairwiseVerdict {
    let (task_a_id, task_b_id, depends_edge) = if task_a_id <= task_b_id {
        (task_a_id, task_b_id, depends_edge)
    } else {
        let flipped = depends_edge.map(|d| match d {
            DependencyDirection::AToB => DependencyDirection::BToA,
            DependencyDirection::BToA => DependencyDirection::AToB,
        });
        (task_b_id, task_a_id, flipped)
    };

    if let Some(direction) = depends_edge {
        return PairwiseVerdict {
            task_a_id,
            task_b_id,
            can_parallel: false,
            conflict_type: ConflictType::Dependency,
            details: serde_json::json!({ "direction": direction }),
        };
    }

    let report = conflict::detect_conflicts(impacts_a, impacts_b, significance_threshold);
    if report.has_significant_conflict() {
        return PairwiseVerdict {
            task_a_id,
            task_b_id,
            can_parallel: false,
            conflict_type: ConflictType::FileConflict,
            details: serde_json::json!({ "files": report.significant }),
        };
    }

    PairwiseVerdict {
        task_a_id,
        task_b_id,
        can_parallel: true,
        conflict_type: ConflictType::None,
        details: serde_json::Value::Null,
    }
}

/// One emitted wave: a batch of task ids safe to run concurrently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wave {
    pub wave_number: i32,
    pub members: Vec<Uuid>,
}

fn can_parallel(a: Uuid, b: Uuid, verdicts: &HashMap<(Uuid, Uuid), bool>) -> bool {
    let key = if a <= b { (a, b) } else { (b, a) };
    verdicts.get(&key).copied().unwrap_or(true)
}

/// Build execution waves per the greedy algorithm in spec.md S4.D: at each
/// step, admit the highest-position eligible tasks whose `depends_on` sets
/// are fully satisfied and that are pairwise parallel-safe with everything
/// already selected into the current wave.
///
/// `verdicts` maps canonically-ordered pairs to `can_parallel`; pairs not
/// present default to `true` (no conflict was ever detected between them).
pub fn build_waves(
    tasks: &[TaskNode],
    verdicts: &HashMap<(Uuid, Uuid), bool>,
) -> Result<Vec<Wave>, PtoError> {
    if tasks.is_empty() {
        return Ok(Vec::new());
    }

    let all_ids: HashSet<Uuid> = tasks.iter().map(|t| t.id).collect();
    let by_id: HashMap<Uuid, &TaskNode> = tasks.iter().map(|t| (t.id, t)).collect();
    // Stable ordering key: (position, id) for determinism (spec.md S4.D).
    let order_key = |id: &Uuid| (by_id[id].position, *id);

    let mut assigned: HashSet<Uuid> = HashSet::new();
    let mut waves = Vec::new();
    let mut wave_number = 0;

    while assigned.len() < all_ids.len() {
        wave_number += 1;

        let mut candidates: Vec<Uuid> = all_ids
            .iter()
            .filter(|id| !assigned.contains(*id))
            .filter(|id| by_id[id].depends_on.iter().all(|d| assigned.contains(d)))
            .copied()
            .collect();
        candidates.sort_by_key(|id| order_key(id));

        let mut selected: Vec<Uuid> = Vec::new();
        for t in candidates {
            if selected.iter().all(|&s| can_parallel(t, s, verdicts)) {
                selected.push(t);
            }
        }

        if selected.is_empty() {
            let mut remaining: Vec<Uuid> = all_ids.difference(&assigned).copied().collect();
            remaining.sort();
            return Err(PtoError::CycleOrDeadlock { remaining });
        }

        for id in &selected {
            assigned.insert(*id);
        }
        waves.push(Wave {
            wave_number,
            members: selected,
        });
    }

    Ok(waves)
}

pub fn max_parallelism(waves: &[Wave]) -> i32 {
    waves.iter().map(|w| w.members.len() as i32).max().unwrap_or(0)
}

/// Result of a full list analysis: the cached-or-recomputed pairwise
/// verdicts plus the waves built from them.
#[derive(Debug, Clone)]
pub struct ListAnalysis {
    pub verdicts: Vec<PairwiseVerdict>,
    pub waves: Vec<Wave>,
    pub max_parallelism: i32,
}

/// Options controlling an `analyze_list` call.
#[derive(Debug, Clone, Copy)]
pub struct AnalyzeOptions {
    pub force_reanalyze: bool,
    pub significance_threshold: f32,
}

impl Default for AnalyzeOptions {
    fn default() -> Self {
        Self {
            force_reanalyze: false,
            significance_threshold: DEFAULT_SIGNIFICANCE_THRESHOLD,
        }
    }
}

/// Analyze a task list end to end: load eligible tasks and their
/// relationships/impacts, recompute any invalidated pairwise verdicts
/// (bypassing the cache entirely when `force_reanalyze` is set), persist
/// the results, and build waves from them.
///
/// Chunks pairwise work in batches of [`REANALYZE_CHUNK_SIZE`] pairs,
/// yielding to the executor between chunks so a large list's O(n^2)
/// analysis doesn't starve the orchestrator's event loop (SPEC_FULL.md S5).
pub const REANALYZE_CHUNK_SIZE: usize = 64;

pub async fn analyze_list(
    pool: &PgPool,
    list_id: Uuid,
    opts: AnalyzeOptions,
) -> Result<ListAnalysis, PtoError> {
    let tasks = pto_db::queries::tasks::list_eligible_tasks(pool, list_id).await?;
    let edges = pto_db::queries::relationships::list_depends_on_edges(pool, list_id).await?;
    let all_impacts = pto_db::queries::impacts::list_impacts_for_list(pool, list_id).await?;
    let mut impacts_by_task: HashMap<Uuid, Vec<FileImpact>> = HashMap::new();
    for impact in all_impacts {
        impacts_by_task.entry(impact.task_id).or_default().push(impact);
    }

    let mut depends_on: HashMap<Uuid, HashSet<Uuid>> = HashMap::new();
    let mut edge_direction: HashMap<(Uuid, Uuid), DependencyDirection> = HashMap::new();
    for (source, target) in &edges {
        depends_on.entry(*source).or_default().insert(*target);
        let key = if source <= target { (*source, *target) } else { (*target, *source) };
        let direction = if source <= target {
            DependencyDirection::AToB
        } else {
            DependencyDirection::BToA
        };
        edge_direction.insert(key, direction);
    }

    let nodes: Vec<TaskNode> = tasks
        .iter()
        .map(|t| TaskNode {
            id: t.id,
            position: t.position,
            depends_on: depends_on.get(&t.id).cloned().unwrap_or_default(),
        })
        .collect();

    let mut pairs = Vec::new();
    for i in 0..nodes.len() {
        for j in (i + 1)..nodes.len() {
            pairs.push((nodes[i].id, nodes[j].id));
        }
    }

    let mut verdicts: HashMap<(Uuid, Uuid), PairwiseVerdict> = HashMap::new();
    if !opts.force_reanalyze {
        for row in pto_db::queries::analysis::list_live_analyses_for_list(pool, list_id).await? {
            verdicts.insert(
                (row.task_a_id, row.task_b_id),
                PairwiseVerdict {
                    task_a_id: row.task_a_id,
                    task_b_id: row.task_b_id,
                    can_parallel: row.can_parallel,
                    conflict_type: row.conflict_type,
                    details: row.conflict_details,
                },
            );
        }
    }

    let empty: Vec<FileImpact> = Vec::new();
    let mut to_persist = Vec::new();
    for (idx, chunk) in pairs.chunks(REANALYZE_CHUNK_SIZE).enumerate() {
        for &(a, b) in chunk {
            let key = if a <= b { (a, b) } else { (b, a) };
            if verdicts.contains_key(&key) {
                continue;
            }
            let direction = edge_direction.get(&key).copied();
            let impacts_a = impacts_by_task.get(&a).unwrap_or(&empty);
            let impacts_b = impacts_by_task.get(&b).unwrap_or(&empty);
            let verdict = pairwise_verdict(a, b, direction, impacts_a, impacts_b, opts.significance_threshold);
            to_persist.push(verdict.clone());
            verdicts.insert(key, verdict);
        }
        if idx > 0 {
            tokio::task::yield_now().await;
        }
    }

    for verdict in &to_persist {
        pto_db::queries::analysis::upsert_analysis(
            pool,
            verdict.task_a_id,
            verdict.task_b_id,
            verdict.can_parallel,
            verdict.conflict_type,
            verdict.details.clone(),
        )
        .await?;
    }

    let verdict_map: HashMap<(Uuid, Uuid), bool> =
        verdicts.iter().map(|(k, v)| (*k, v.can_parallel)).collect();

    let waves = build_waves(&nodes, &verdict_map)?;
    let max_parallelism = max_parallelism(&waves);

    Ok(ListAnalysis {
        verdicts: verdicts.into_values().collect(),
        waves,
        max_parallelism,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pto_db::models::Provenance;

    fn node(id: Uuid, position: i32, depends_on: &[Uuid]) -> TaskNode {
        TaskNode { id, position, depends_on: depends_on.iter().copied().collect() }
    }

    fn uid(n: u128) -> Uuid {
        Uuid::from_u128(n)
    }

    #[test]
    fn empty_list_produces_no_waves() {
        let waves = build_waves(&[], &HashMap::new()).unwrap();
        assert!(waves.is_empty());
    }

    #[test]
    fn single_task_is_one_wave() {
        let t = uid(1);
        let waves = build_waves(&[node(t, 0, &[])], &HashMap::new()).unwrap();
        assert_eq!(waves.len(), 1);
        assert_eq!(waves[0].members, vec![t]);
    }

    #[test]
    fn linear_chain_produces_one_wave_per_task() {
        let a = uid(1);
        let b = uid(2);
        let c = uid(3);
        let nodes = vec![node(a, 0, &[]), node(b, 1, &[a]), node(c, 2, &[b])];
        let waves = build_waves(&nodes, &HashMap::new()).unwrap();
        assert_eq!(waves.len(), 3);
        assert_eq!(waves[0].members, vec![a]);
        assert_eq!(waves[1].members, vec![b]);
        assert_eq!(waves[2].members, vec![c]);
    }

    #[test]
    fn independent_tasks_batch_into_one_wave() {
        let a = uid(1);
        let b = uid(2);
        let c = uid(3);
        let nodes = vec![node(a, 0, &[]), node(b, 1, &[]), node(c, 2, &[])];
        let waves = build_waves(&nodes, &HashMap::new()).unwrap();
        assert_eq!(waves.len(), 1);
        assert_eq!(waves[0].members.len(), 3);
        assert_eq!(max_parallelism(&waves), 3);
    }

    #[test]
    fn file_conflict_pair_splits_across_waves_by_position() {
        let a = uid(1);
        let b = uid(2);
        let nodes = vec![node(a, 0, &[]), node(b, 1, &[])];
        let mut verdicts = HashMap::new();
        verdicts.insert((a, b), false);
        let waves = build_waves(&nodes, &verdicts).unwrap();
        assert_eq!(waves.len(), 2);
        assert_eq!(waves[0].members, vec![a]);
        assert_eq!(waves[1].members, vec![b]);
    }

    #[test]
    fn dependency_cycle_surfaces_cycle_or_deadlock() {
        let a = uid(1);
        let b = uid(2);
        // a depends on b, b depends on a: no eligible candidate ever appears.
        let nodes = vec![node(a, 0, &[b]), node(b, 1, &[a])];
        let err = build_waves(&nodes, &HashMap::new()).unwrap_err();
        match err {
            PtoError::CycleOrDeadlock { remaining } => assert_eq!(remaining.len(), 2),
            other => panic!("expected CycleOrDeadlock, got {other:?}"),
        }
    }

    #[test]
    fn pairwise_verdict_is_canonically_ordered() {
        let a = uid(2);
        let b = uid(1);
        let verdict = pairwise_verdict(a, b, None, &[], &[], DEFAULT_SIGNIFICANCE_THRESHOLD);
        assert!(verdict.task_a_id < verdict.task_b_id);
        assert_eq!(verdict.conflict_type, ConflictType::None);
        assert!(verdict.can_parallel);
    }

    #[test]
    fn dependency_dominates_file_conflict_in_classification() {
        let a = uid(1);
        let b = uid(2);
        let impact = |op| pto_db::models::FileImpact {
            id: Uuid::new_v4(),
            task_id: a,
            file_path: "x.rs".into(),
            operation: op,
            confidence: 1.0,
            source: Provenance::User,
            created_at: chrono::Utc::now(),
        };
        let impacts_a = vec![impact(pto_db::models::FileOperation::Update)];
        let impacts_b = vec![impact(pto_db::models::FileOperation::Update)];
        let verdict = pairwise_verdict(
            a,
            b,
            Some(DependencyDirection::AToB),
            &impacts_a,
            &impacts_b,
            DEFAULT_SIGNIFICANCE_THRESHOLD,
        );
        assert_eq!(verdict.conflict_type, ConflictType::Dependency);
        assert!(!verdict.can_parallel);
    }
}
