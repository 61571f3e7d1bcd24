//! Conflict Resolver (component E, spec.md S4.E): auto-repairs detected
//! file conflicts by inserting `depends_on` edges, then asks the
//! Parallelism Calculator to re-derive waves.
//!
//! For each `file_conflict` pair `(a, b)`: skip if a dependency edge
//! already exists between them in either direction; otherwise the later
//! task (by position) is made to depend on the earlier one, after
//! confirming via the Graph Analyzer that doing so introduces no cycle.

use pto_db::models::{ConflictType, RelationshipType};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::PtoError;
use crate::graph::DependencyGraph;
use crate::parallelism::{self, AnalyzeOptions, ListAnalysis};

/// Outcome of attempting to resolve one conflicting pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolutionOutcome {
    DependencyAdded,
    AlreadyResolved,
    Skipped,
}

/// One pair's resolution result, as returned to the caller for reporting
/// (spec.md S4.E: "structured list of `{pair, outcome, direction?}`").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionResult {
    pub task_a_id: Uuid,
    pub task_b_id: Uuid,
    pub outcome: ResolutionOutcome,
    /// `(source, target)` of the inserted `depends_on` edge, present only
    /// when `outcome == DependencyAdded`.
    pub direction: Option<(Uuid, Uuid)>,
    pub reason: Option<String>,
}

/// The minimal per-task context the resolver needs: id and declared
/// ordinal position within the list.
#[derive(Debug, Clone, Copy)]
pub struct TaskPosition {
    pub id: Uuid,
    pub position: i32,
}

/// Resolve every `file_conflict`-classified pair in `conflicting_pairs`
/// against `positions`, using `graph` (built from the list's current
/// `depends_on` edges, *before* any of this call's insertions) to reject
/// edges that would form a cycle.
///
/// Returns one [`ResolutionResult`] per input pair. Does not itself
/// re-derive waves; call [`resolve_and_rebuild`] for the full
/// resolve-then-rebuild flow spec.md S4.E describes.
pub async fn resolve_conflicts(
    pool: &PgPool,
    conflicting_pairs: &[(Uuid, Uuid)],
    positions: &std::collections::HashMap<Uuid, TaskPosition>,
    graph: &DependencyGraph,
) -> Result<Vec<ResolutionResult>, PtoError> {
    let mut results = Vec::with_capacity(conflicting_pairs.len());

    for &(a, b) in conflicting_pairs {
        if pto_db::queries::relationships::depends_on_edge_exists_either_direction(pool, a, b).await? {
            results.push(ResolutionResult {
                task_a_id: a,
                task_b_id: b,
                outcome: ResolutionOutcome::AlreadyResolved,
                direction: None,
                reason: None,
            });
            continue;
        }

        let Some(&pos_a) = positions.get(&a) else { continue };
        let Some(&pos_b) = positions.get(&b) else { continue };

        // Source = the later-position task, target = the earlier one:
        // "the later task depends on the earlier task's work" (spec.md S4.E).
        let (source, target) = if pos_a.position >= pos_b.position {
            (pos_a.id, pos_b.id)
        } else {
            (pos_b.id, pos_a.id)
        };

        if graph.would_cycle(source, target) {
            results.push(ResolutionResult {
                task_a_id: a,
                task_b_id: b,
                outcome: ResolutionOutcome::Skipped,
                direction: None,
                reason: Some("cycle-risk".to_string()),
            });
            continue;
        }

        pto_db::queries::relationships::insert_relationship(
            pool,
            source,
            target,
            RelationshipType::DependsOn,
            true,
        )
        .await?;

        let (a_id, b_id) = if a <= b { (a, b) } else { (b, a) };
        pto_db::queries::analysis::upsert_analysis(
            pool,
            a_id,
            b_id,
            false,
            ConflictType::Dependency,
            serde_json::json!({
                "direction": { "source": source, "target": target },
                "autoResolved": true,
            }),
        )
        .await?;

        results.push(ResolutionResult {
            task_a_id: a,
            task_b_id: b,
            outcome: ResolutionOutcome::DependencyAdded,
            direction: Some((source, target)),
            reason: None,
        });
    }

    Ok(results)
}

/// Full flow: resolve every file-conflict pair currently on record for a
/// list, then re-derive waves from the Parallelism Calculator.
pub async fn resolve_and_rebuild(
    pool: &PgPool,
    list_id: Uuid,
) -> Result<(Vec<ResolutionResult>, ListAnalysis), PtoError> {
    let tasks = pto_db::queries::tasks::list_eligible_tasks(pool, list_id).await?;
    let positions: std::collections::HashMap<Uuid, TaskPosition> = tasks
        .iter()
        .map(|t| (t.id, TaskPosition { id: t.id, position: t.position }))
        .collect();

    let edges = pto_db::queries::relationships::list_depends_on_edges(pool, list_id).await?;
    let graph = DependencyGraph::from_edges(edges);

    let live_analyses = pto_db::queries::analysis::list_live_analyses_for_list(pool, list_id).await?;
    let conflicting_pairs: Vec<(Uuid, Uuid)> = live_analyses
        .iter()
        .filter(|row| row.conflict_type == ConflictType::FileConflict)
        .map(|row| (row.task_a_id, row.task_b_id))
        .collect();

    let results = resolve_conflicts(pool, &conflicting_pairs, &positions, &graph).await?;

    let analysis = parallelism::analyze_list(pool, list_id, AnalyzeOptions::default()).await?;

    Ok((results, analysis))
}
