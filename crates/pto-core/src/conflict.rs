//! Conflict Detector (component B, spec.md S4.B): a pure, stateless
//! function of two tasks' file-impact sets. No I/O, no database — this
//! module takes `&[FileImpact]` slices in and returns conflict verdicts out,
//! so it is trivially unit-testable without a running Postgres.

use pto_db::models::FileImpact;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The significance threshold below which a conflict is reported for
/// display but does not block scheduling (spec.md S4.B). Configurable per
/// SPEC_FULL.md S9's Open Question decision; `0.6` is the shipped default.
pub const DEFAULT_SIGNIFICANCE_THRESHOLD: f32 = 0.6;

/// One file-level conflict between two tasks' impacts on the same path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileConflictEntry {
    pub path: String,
    pub op_a: pto_db::models::FileOperation,
    pub op_b: pto_db::models::FileOperation,
    pub confidence_a: f32,
    pub confidence_b: f32,
}

/// The overall verdict for a pair of tasks' footprints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConflictReport {
    /// Conflicts at or above the significance threshold (block scheduling).
    pub significant: Vec<FileConflictEntry>,
    /// Conflicts below the threshold (display-only, from speculative
    /// AI-inferred impacts).
    pub speculative: Vec<FileConflictEntry>,
    /// Weighted severity in `[0, 1]`, computed over `significant` only.
    pub severity: f32,
}

impl ConflictReport {
    pub fn has_significant_conflict(&self) -> bool {
        !self.significant.is_empty()
    }
}

/// Classify a single pair of operations on a shared path per the 4x4
/// operation matrix (spec.md S4.B). Returns `None` for `no_conflict`.
fn classify(a: pto_db::models::FileOperation, b: pto_db::models::FileOperation) -> Option<&'static str> {
    use pto_db::models::FileOperation::*;
    match (a, b) {
        (Read, Read) | (Read, Create) | (Create, Read) | (Create, Update) | (Update, Create)
        | (Read, Update) | (Update, Read) => None,
        (Read, Delete) | (Delete, Read) => Some("read_delete"),
        (Create, Create) => Some("create_create"),
        (Create, Delete) | (Delete, Create) => Some("create_delete"),
        (Update, Update) | (Update, Delete) | (Delete, Update) | (Delete, Delete) => Some("write_write"),
    }
}

fn severity_weight(kind: &str) -> f32 {
    match kind {
        "create_create" => 1.00,
        "create_delete" => 0.95,
        "write_write" => 0.90,
        "read_delete" => 0.70,
        _ => 0.0,
    }
}

/// Detect conflicts between two tasks' footprints. `significance_threshold`
/// is the minimum of the two impacts' confidences required for a conflict
/// to count as significant (spec.md S4.B: "both impacts have confidence >=
/// 0.6").
pub fn detect_conflicts(
    impacts_a: &[FileImpact],
    impacts_b: &[FileImpact],
    significance_threshold: f32,
) -> ConflictReport {
    let mut significant = Vec::new();
    let mut speculative = Vec::new();

    for a in impacts_a {
        for b in impacts_b {
            if a.file_path != b.file_path {
                continue;
            }
            let Some(kind) = classify(a.operation, b.operation) else {
                continue;
            };
            let entry = FileConflictEntry {
                path: a.file_path.clone(),
                op_a: a.operation,
                op_b: b.operation,
                confidence_a: a.confidence,
                confidence_b: b.confidence,
            };
            let min_confidence = a.confidence.min(b.confidence);
            if min_confidence >= significance_threshold {
                significant.push((kind, entry));
            } else {
                speculative.push(entry);
            }
        }
    }

    let severity = severity(&significant);
    ConflictReport {
        significant: significant.into_iter().map(|(_, e)| e).collect(),
        speculative,
        severity,
    }
}

fn severity(conflicts: &[(&'static str, FileConflictEntry)]) -> f32 {
    if conflicts.is_empty() {
        return 0.0;
    }
    let sum: f32 = conflicts
        .iter()
        .map(|(kind, entry)| severity_weight(kind) * entry.confidence_a.min(entry.confidence_b))
        .sum();
    (sum / conflicts.len() as f32).min(1.0)
}

/// Convenience wrapper pairing a task id with its footprint, used by the
/// Parallelism Calculator to batch conflict detection across a whole list
/// without re-querying impacts per pair.
#[derive(Debug, Clone)]
pub struct TaskFootprint {
    pub task_id: Uuid,
    pub impacts: Vec<FileImpact>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pto_db::models::{FileOperation, Provenance};

    fn impact(path: &str, op: FileOperation, confidence: f32) -> FileImpact {
        FileImpact {
            id: Uuid::new_v4(),
            task_id: Uuid::new_v4(),
            file_path: path.to_string(),
            operation: op,
            confidence,
            source: Provenance::User,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn disjoint_paths_no_conflict() {
        let a = vec![impact("x.ts", FileOperation::Update, 1.0)];
        let b = vec![impact("y.ts", FileOperation::Update, 1.0)];
        let report = detect_conflicts(&a, &b, DEFAULT_SIGNIFICANCE_THRESHOLD);
        assert!(!report.has_significant_conflict());
    }

    #[test]
    fn two_reads_no_conflict() {
        let a = vec![impact("x.ts", FileOperation::Read, 1.0)];
        let b = vec![impact("x.ts", FileOperation::Read, 1.0)];
        let report = detect_conflicts(&a, &b, DEFAULT_SIGNIFICANCE_THRESHOLD);
        assert!(report.significant.is_empty());
    }

    #[test]
    fn create_create_is_significant_at_full_confidence() {
        let a = vec![impact("x.ts", FileOperation::Create, 1.0)];
        let b = vec![impact("x.ts", FileOperation::Create, 1.0)];
        let report = detect_conflicts(&a, &b, DEFAULT_SIGNIFICANCE_THRESHOLD);
        assert_eq!(report.significant.len(), 1);
        assert!((report.severity - 1.0).abs() < 1e-6);
    }

    #[test]
    fn low_confidence_conflict_is_speculative_only() {
        let a = vec![impact("x.ts", FileOperation::Update, 0.3)];
        let b = vec![impact("x.ts", FileOperation::Update, 0.9)];
        let report = detect_conflicts(&a, &b, DEFAULT_SIGNIFICANCE_THRESHOLD);
        assert!(report.significant.is_empty());
        assert_eq!(report.speculative.len(), 1);
    }

    #[test]
    fn write_write_severity_scaled_by_min_confidence() {
        let a = vec![impact("x.ts", FileOperation::Update, 0.8)];
        let b = vec![impact("x.ts", FileOperation::Delete, 0.6)];
        let report = detect_conflicts(&a, &b, DEFAULT_SIGNIFICANCE_THRESHOLD);
        assert_eq!(report.significant.len(), 1);
        assert!((report.severity - (0.90 * 0.6)).abs() < 1e-6);
    }

    #[test]
    fn read_create_no_conflict_but_create_create_does() {
        let a = vec![
            impact("x.ts", FileOperation::Read, 1.0),
            impact("y.ts", FileOperation::Create, 1.0),
        ];
        let b = vec![
            impact("x.ts", FileOperation::Create, 1.0),
            impact("y.ts", FileOperation::Create, 1.0),
        ];
        let report = detect_conflicts(&a, &b, DEFAULT_SIGNIFICANCE_THRESHOLD);
        assert_eq!(report.significant.len(), 1);
        assert_eq!(report.significant[0].path, "y.ts");
    }

    #[test]
    fn multiple_conflicts_average_severity() {
        let a = vec![
            impact("x.ts", FileOperation::Create, 1.0), // create_create: 1.00
            impact("y.ts", FileOperation::Read, 1.0),    // read_delete: 0.70
        ];
        let b = vec![
            impact("x.ts", FileOperation::Create, 1.0),
            impact("y.ts", FileOperation::Delete, 1.0),
        ];
        let report = detect_conflicts(&a, &b, DEFAULT_SIGNIFICANCE_THRESHOLD);
        assert_eq!(report.significant.len(), 2);
        assert!((report.severity - 0.85).abs() < 1e-6);
    }
}
