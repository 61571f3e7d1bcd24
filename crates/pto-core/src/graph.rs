//! Graph Analyzer (component C, spec.md S4.C): builds an in-memory
//! adjacency view of the `depends_on` subgraph for a task list and answers
//! cycle-probe, cycle-enumeration, near-cycle, edge-removal-recommendation,
//! and transitive-reachability queries over it.
//!
//! The adjacency view is loaded once per analyzer call (via
//! `queries::relationships::list_depends_on_edges`) rather than re-queried
//! per edge, keeping CPU-bound graph traversal out of the hot query path
//! (SPEC_FULL.md S4.C).

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use pto_db::models::Priority;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Depth bound for the cycle probe, preventing pathological graphs from
/// stalling `would_cycle` (spec.md S4.C).
pub const CYCLE_PROBE_DEPTH_LIMIT: usize = 20;

/// A minimal reference to a task, used wherever a cycle path or
/// human-readable recommendation needs to name a task without carrying its
/// full row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRef {
    pub id: Uuid,
    pub display_id: String,
}

/// The subset of a task's attributes the edge-removal heuristic needs.
#[derive(Debug, Clone)]
pub struct TaskMeta {
    pub id: Uuid,
    pub display_id: String,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
}

/// An edge in the `depends_on` subgraph: `source` depends on `target`
/// (source must run after target).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Edge {
    pub source: Uuid,
    pub target: Uuid,
}

/// A recommendation to remove a specific edge to break a detected cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct RemovalRecommendation {
    pub edge: Edge,
    pub score: i64,
    pub reason: String,
}

/// In-memory view of a `depends_on` subgraph, built once per analysis call.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// source -> targets (what source depends on)
    forward: HashMap<Uuid, Vec<Uuid>>,
    nodes: HashSet<Uuid>,
}

impl DependencyGraph {
    /// Build a graph from the raw `(source, target)` edge list.
    pub fn from_edges(edges: impl IntoIterator<Item = (Uuid, Uuid)>) -> Self {
        let mut forward: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        let mut nodes = HashSet::new();
        for (source, target) in edges {
            nodes.insert(source);
            nodes.insert(target);
            forward.entry(source).or_default().push(target);
        }
        Self { forward, nodes }
    }

    pub fn edges(&self) -> impl Iterator<Item = Edge> + '_ {
        self.forward.iter().flat_map(|(&source, targets)| {
            targets.iter().map(move |&target| Edge { source, target })
        })
    }

    fn targets_of(&self, node: Uuid) -> &[Uuid] {
        self.forward.get(&node).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether `from` can reach `to` via directed edges, bounded to
    /// [`CYCLE_PROBE_DEPTH_LIMIT`] hops.
    fn reaches(&self, from: Uuid, to: Uuid, depth_limit: usize) -> bool {
        if from == to {
            return true;
        }
        let mut visited = HashSet::new();
        let mut frontier = vec![from];
        visited.insert(from);
        for _ in 0..depth_limit {
            if frontier.is_empty() {
                break;
            }
            let mut next = Vec::new();
            for node in frontier {
                for &t in self.targets_of(node) {
                    if t == to {
                        return true;
                    }
                    if visited.insert(t) {
                        next.push(t);
                    }
                }
            }
            frontier = next;
        }
        false
    }

    /// Would adding `source -> target` create a cycle? True iff `target`
    /// already transitively reaches `source` (spec.md S4.C).
    pub fn would_cycle(&self, source: Uuid, target: Uuid) -> bool {
        self.reaches(target, source, CYCLE_PROBE_DEPTH_LIMIT)
    }

    /// The full candidate cycle that would form if `source -> target` were
    /// added: the existing path `target -> ... -> source` plus the new
    /// edge, rotated to start at `source`, e.g. `[C, A, B]` for edges
    /// `A->B, B->C` and prospective `C->A`.
    pub fn candidate_cycle(&self, source: Uuid, target: Uuid) -> Option<Vec<Uuid>> {
        let path = self.shortest_path(target, source)?;
        let idx = path.iter().position(|&id| id == source)?;
        let mut rotated = path[idx..].to_vec();
        rotated.extend_from_slice(&path[..idx]);
        Some(rotated)
    }

    fn shortest_path(&self, from: Uuid, to: Uuid) -> Option<Vec<Uuid>> {
        if from == to {
            return Some(vec![from]);
        }
        let mut visited = HashSet::new();
        let mut queue = std::collections::VecDeque::new();
        let mut parent: HashMap<Uuid, Uuid> = HashMap::new();
        visited.insert(from);
        queue.push_back(from);
        while let Some(node) = queue.pop_front() {
            for &t in self.targets_of(node) {
                if visited.insert(t) {
                    parent.insert(t, node);
                    if t == to {
                        let mut path = vec![to];
                        let mut cur = to;
                        while let Some(&p) = parent.get(&cur) {
                            path.push(p);
                            cur = p;
                            if cur == from {
                                break;
                            }
                        }
                        path.reverse();
                        return Some(path);
                    }
                    queue.push_back(t);
                }
            }
        }
        None
    }

    /// Enumerate all simple cycles in the graph, deduplicated by
    /// canonicalizing each cycle as the rotation starting at its
    /// lexicographically smallest member (by id string).
    pub fn enumerate_cycles(&self) -> Vec<Vec<Uuid>> {
        let mut found: HashSet<Vec<Uuid>> = HashSet::new();
        let nodes: Vec<Uuid> = self.nodes.iter().copied().collect();

        for &start in &nodes {
            let mut stack = vec![(start, vec![start])];
            while let Some((node, path)) = stack.pop() {
                if path.len() > self.nodes.len() {
                    continue;
                }
                for &next in self.targets_of(node) {
                    if next == start && path.len() > 1 {
                        found.insert(canonicalize_cycle(&path));
                    } else if !path.contains(&next) {
                        let mut extended = path.clone();
                        extended.push(next);
                        stack.push((next, extended));
                    }
                }
            }
        }

        found.into_iter().collect()
    }

    /// Tasks that would close a cycle with `task_id` within `max_extra_edges`
    /// (1 or 2) additional `depends_on` edges from `task_id`.
    pub fn near_cycle_candidates(&self, task_id: Uuid, max_extra_edges: usize) -> Vec<Uuid> {
        let mut result = Vec::new();
        for &other in &self.nodes {
            if other == task_id {
                continue;
            }
            // A cycle closes if `other` already reaches `task_id`: adding
            // task_id -> other would need other to reach task_id within
            // max_extra_edges of the *new* edge, i.e. other reaches task_id
            // in at most max_extra_edges - 1 further hops beyond the direct
            // probe. We approximate by checking reachability bounded to
            // max_extra_edges hops, which is the conservative interpretation
            // used for a 1-2 edge warning horizon.
            if self.reaches(other, task_id, max_extra_edges) {
                result.push(other);
            }
        }
        result
    }

    /// Direct dependencies, direct blockees, and transitive (non-direct)
    /// dependencies of a task, as three disjoint sets (spec.md S4.C).
    pub fn transitive_breakdown(&self, task_id: Uuid) -> TransitiveBreakdown {
        let direct_dependencies: HashSet<Uuid> = self.targets_of(task_id).iter().copied().collect();

        let direct_blockees: HashSet<Uuid> = self
            .forward
            .iter()
            .filter(|(_, targets)| targets.contains(&task_id))
            .map(|(&source, _)| source)
            .collect();

        let mut all_reachable = HashSet::new();
        let mut frontier: Vec<Uuid> = direct_dependencies.iter().copied().collect();
        while let Some(node) = frontier.pop() {
            for &t in self.targets_of(node) {
                if t != task_id && all_reachable.insert(t) {
                    frontier.push(t);
                }
            }
        }
        let transitive_only: HashSet<Uuid> = all_reachable
            .difference(&direct_dependencies)
            .copied()
            .collect();

        TransitiveBreakdown {
            direct_dependencies: direct_dependencies.into_iter().collect(),
            direct_blockees: direct_blockees.into_iter().collect(),
            transitive_dependencies: transitive_only.into_iter().collect(),
        }
    }

    /// Score each edge of a detected cycle for removal and return the
    /// highest-scoring recommendation (spec.md S4.C): +2 for a
    /// newer-sourced edge, +0..3 for lower source priority, +1 if the
    /// source has other outgoing dependencies.
    pub fn recommend_removal(
        &self,
        cycle: &[Uuid],
        metas: &HashMap<Uuid, TaskMeta>,
    ) -> Option<RemovalRecommendation> {
        if cycle.len() < 2 {
            return None;
        }
        let mut best: Option<RemovalRecommendation> = None;
        for i in 0..cycle.len() {
            let source = cycle[i];
            let target = cycle[(i + 1) % cycle.len()];
            let Some(source_meta) = metas.get(&source) else {
                continue;
            };
            let Some(target_meta) = metas.get(&target) else {
                continue;
            };

            let mut score: i64 = 0;
            // Prefer edges sourced from newer tasks.
            let is_newer = metas
                .values()
                .all(|m| source_meta.created_at >= m.created_at)
                || metas
                    .get(&target)
                    .is_some_and(|t| source_meta.created_at > t.created_at);
            if is_newer {
                score += 2;
            }
            score += source_meta.priority.removal_score_component() as i64;
            let other_outgoing = self
                .targets_of(source)
                .iter()
                .any(|&t| t != target);
            if other_outgoing {
                score += 1;
            }

            let reason = format!(
                "{} -> {} scored {score} (priority {}, {}newer, {}other outgoing deps)",
                source_meta.display_id,
                target_meta.display_id,
                source_meta.priority,
                if is_newer { "" } else { "not " },
                if other_outgoing { "has " } else { "no " },
            );

            let candidate = RemovalRecommendation {
                edge: Edge { source, target },
                score,
                reason,
            };
            if best.as_ref().is_none_or(|b| candidate.score > b.score) {
                best = Some(candidate);
            }
        }
        best
    }
}

/// Disjoint-set breakdown of a task's reachability in the dependency graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransitiveBreakdown {
    pub direct_dependencies: Vec<Uuid>,
    pub direct_blockees: Vec<Uuid>,
    pub transitive_dependencies: Vec<Uuid>,
}

fn canonicalize_cycle(path: &[Uuid]) -> Vec<Uuid> {
    let min_idx = path
        .iter()
        .enumerate()
        .min_by_key(|(_, id)| id.to_string())
        .map(|(i, _)| i)
        .unwrap_or(0);
    let mut rotated = path[min_idx..].to_vec();
    rotated.extend_from_slice(&path[..min_idx]);
    rotated
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uid(n: u128) -> Uuid {
        Uuid::from_u128(n)
    }

    #[test]
    fn no_cycle_when_graph_is_a_dag() {
        let g = DependencyGraph::from_edges([(uid(1), uid(2)), (uid(2), uid(3))]);
        assert!(g.would_cycle(uid(3), uid(1)));
        assert!(!g.would_cycle(uid(1), uid(3)));
    }

    #[test]
    fn candidate_cycle_reports_full_path() {
        // A -> B, B -> C; prospective C -> A.
        let a = uid(1);
        let b = uid(2);
        let c = uid(3);
        let g = DependencyGraph::from_edges([(a, b), (b, c)]);
        assert!(g.would_cycle(c, a));
        let cycle = g.candidate_cycle(c, a).unwrap();
        assert_eq!(cycle, vec![c, a, b]);
    }

    #[test]
    fn enumerate_cycles_dedups_rotations() {
        let a = uid(1);
        let b = uid(2);
        let c = uid(3);
        let g = DependencyGraph::from_edges([(a, b), (b, c), (c, a)]);
        let cycles = g.enumerate_cycles();
        assert_eq!(cycles.len(), 1);
    }

    #[test]
    fn transitive_breakdown_separates_direct_and_transitive() {
        // T depends on A; A depends on B. T's direct deps = {A}; transitive
        // (non-direct) = {B}.
        let t = uid(1);
        let a = uid(2);
        let b = uid(3);
        let g = DependencyGraph::from_edges([(t, a), (a, b)]);
        let breakdown = g.transitive_breakdown(t);
        assert_eq!(breakdown.direct_dependencies, vec![a]);
        assert_eq!(breakdown.transitive_dependencies, vec![b]);
        assert!(breakdown.direct_blockees.is_empty());
    }

    #[test]
    fn recommend_removal_prefers_lower_priority_newer_source() {
        use chrono::TimeZone;
        let a = uid(1);
        let b = uid(2);
        let c = uid(3);
        let g = DependencyGraph::from_edges([(a, b), (b, c), (c, a)]);

        let mut metas = HashMap::new();
        let old = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let new = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        metas.insert(a, TaskMeta { id: a, display_id: "A".into(), priority: Priority::P1, created_at: old });
        metas.insert(b, TaskMeta { id: b, display_id: "B".into(), priority: Priority::P1, created_at: old });
        metas.insert(c, TaskMeta { id: c, display_id: "C".into(), priority: Priority::P4, created_at: new });

        let cycle = vec![a, b, c];
        let rec = g.recommend_removal(&cycle, &metas).unwrap();
        // C->A: newer (+2) + P4 priority (+3) + no other outgoing (c only -> a) = 5
        assert_eq!(rec.edge, Edge { source: c, target: a });
    }
}
