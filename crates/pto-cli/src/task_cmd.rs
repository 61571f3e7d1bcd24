//! `pto task add`: register a task (plus its footprint, acceptance
//! criteria, test commands, and `depends_on` edges) against a task list.

use std::str::FromStr;

use anyhow::{Context, Result, bail};
use sqlx::PgPool;
use uuid::Uuid;

use pto_db::models::{EffortBucket, FileOperation, Priority, Provenance, RelationshipType};
use pto_db::queries::acceptance_criteria;
use pto_db::queries::impacts::{self, NewFileImpact};
use pto_db::queries::relationships;
use pto_db::queries::tasks::{self, NewTask};
use pto_db::queries::test_commands;

/// Arguments for `pto task add`, already parsed out of the CLI's own
/// `clap` struct so this module stays testable without `clap` in scope.
pub struct AddTaskArgs {
    pub list_id: String,
    pub display_id: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub priority: String,
    pub effort: String,
    pub phase: Option<String>,
    pub position: i32,
    /// `path:operation[:confidence]`, e.g. `src/lib.rs:update:0.9`.
    pub impacts: Vec<String>,
    pub criteria: Vec<String>,
    pub test_commands: Vec<String>,
    /// IDs of tasks this one depends on.
    pub depends_on: Vec<String>,
}

pub async fn run_add(pool: &PgPool, args: AddTaskArgs) -> Result<()> {
    let list_id = Uuid::parse_str(&args.list_id)
        .with_context(|| format!("invalid list id: {}", args.list_id))?;
    let priority = Priority::from_str(&args.priority)
        .with_context(|| format!("invalid priority: {}", args.priority))?;
    let effort = EffortBucket::from_str(&args.effort)
        .with_context(|| format!("invalid effort bucket: {}", args.effort))?;

    let new_task = NewTask {
        display_id: args.display_id.clone(),
        title: args.title,
        description: args.description,
        category: args.category,
        priority,
        effort,
        phase: args.phase,
        position: args.position,
        task_list_id: Some(list_id),
        project_id: None,
    };

    let task = tasks::insert_task(pool, &new_task).await?;
    println!("Created task: {} ({})", task.display_id, task.id);

    for impact_spec in &args.impacts {
        let new_impact = parse_impact(task.id, impact_spec)?;
        impacts::insert_impact(pool, &new_impact).await?;
    }
    if !args.impacts.is_empty() {
        println!("  {} file impact(s) recorded", args.impacts.len());
    }

    if !args.criteria.is_empty() {
        for criterion in &args.criteria {
            acceptance_criteria::insert_criterion(pool, task.id, criterion).await?;
        }
        println!("  {} acceptance criterion/criteria recorded", args.criteria.len());
    }

    if !args.test_commands.is_empty() {
        for command in &args.test_commands {
            test_commands::insert_command(pool, task.id, command).await?;
        }
        println!("  {} test command(s) recorded", args.test_commands.len());
    }

    for dep_str in &args.depends_on {
        let dep_id =
            Uuid::parse_str(dep_str).with_context(|| format!("invalid dependency id: {dep_str}"))?;
        relationships::insert_relationship(pool, task.id, dep_id, RelationshipType::DependsOn, false)
            .await?;
    }
    if !args.depends_on.is_empty() {
        println!("  depends on {} task(s)", args.depends_on.len());
    }

    pto_db::queries::task_lists::refresh_task_list_counts(pool, list_id).await?;

    Ok(())
}

fn parse_impact(task_id: Uuid, spec: &str) -> Result<NewFileImpact> {
    let mut parts = spec.splitn(3, ':');
    let file_path = parts
        .next()
        .filter(|s| !s.is_empty())
        .with_context(|| format!("malformed impact spec '{spec}': missing path"))?
        .to_string();
    let operation_str = parts
        .next()
        .with_context(|| format!("malformed impact spec '{spec}': expected path:operation"))?;
    let operation = FileOperation::from_str(operation_str)
        .with_context(|| format!("invalid file operation in '{spec}'"))?;
    let confidence = match parts.next() {
        Some(c) => c
            .parse::<f32>()
            .with_context(|| format!("invalid confidence in '{spec}'"))?,
        None => 1.0,
    };
    if !(0.0..=1.0).contains(&confidence) {
        bail!("confidence in '{spec}' must be between 0.0 and 1.0");
    }

    Ok(NewFileImpact {
        task_id,
        file_path,
        operation,
        confidence,
        source: Provenance::User,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_impact_defaults_confidence_to_one() {
        let impact = parse_impact(Uuid::nil(), "src/lib.rs:update").unwrap();
        assert_eq!(impact.file_path, "src/lib.rs");
        assert_eq!(impact.operation, FileOperation::Update);
        assert_eq!(impact.confidence, 1.0);
    }

    #[test]
    fn parse_impact_reads_explicit_confidence() {
        let impact = parse_impact(Uuid::nil(), "src/lib.rs:create:0.5").unwrap();
        assert_eq!(impact.confidence, 0.5);
    }

    #[test]
    fn parse_impact_rejects_out_of_range_confidence() {
        assert!(parse_impact(Uuid::nil(), "src/lib.rs:create:1.5").is_err());
    }

    #[test]
    fn parse_impact_rejects_unknown_operation() {
        assert!(parse_impact(Uuid::nil(), "src/lib.rs:rename").is_err());
    }
}
