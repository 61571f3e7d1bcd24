//! `pto resolve-conflicts <list-id>`: auto-repair detected file conflicts
//! by inserting `depends_on` edges, then re-derive waves.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use pto_core::resolver::{self, ResolutionOutcome};

pub async fn run(pool: &PgPool, list_id_str: &str) -> Result<()> {
    let list_id =
        Uuid::parse_str(list_id_str).with_context(|| format!("invalid list id: {list_id_str}"))?;

    let (results, analysis) = resolver::resolve_and_rebuild(pool, list_id).await?;

    let added = results
        .iter()
        .filter(|r| r.outcome == ResolutionOutcome::DependencyAdded)
        .count();
    let already = results
        .iter()
        .filter(|r| r.outcome == ResolutionOutcome::AlreadyResolved)
        .count();
    let skipped = results
        .iter()
        .filter(|r| r.outcome == ResolutionOutcome::Skipped)
        .count();

    println!(
        "Resolved {added} conflicting pair(s) ({already} already resolved, {skipped} skipped)"
    );
    for result in &results {
        if let Some((source, target)) = result.direction {
            println!("  {source} -> depends_on -> {target}");
        } else if let Some(reason) = &result.reason {
            println!("  {} / {}: skipped ({reason})", result.task_a_id, result.task_b_id);
        }
    }

    println!();
    println!(
        "Rebuilt {} wave(s), max parallelism {}",
        analysis.waves.len(),
        analysis.max_parallelism
    );

    Ok(())
}
