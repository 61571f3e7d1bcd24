//! `pto readiness <list-id>`: score every eligible task in a list against
//! the six readiness rules (spec.md S4.F) and report the gate verdict.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use pto_core::orchestrator::evaluate_list_readiness;
use pto_db::queries::tasks as task_db;

pub async fn run(pool: &PgPool, list_id_str: &str) -> Result<()> {
    let list_id =
        Uuid::parse_str(list_id_str).with_context(|| format!("invalid list id: {list_id_str}"))?;

    let summary = evaluate_list_readiness(pool, list_id).await?;
    let display_ids: std::collections::HashMap<Uuid, String> =
        task_db::list_tasks_for_list(pool, list_id)
            .await?
            .into_iter()
            .map(|t| (t.id, t.display_id))
            .collect();

    println!(
        "Readiness: {}/{} ready ({} not ready)",
        summary.ready, summary.total, summary.not_ready
    );
    println!();

    let mut scores: Vec<_> = summary.scores.values().collect();
    scores.sort_by(|a, b| a.overall.partial_cmp(&b.overall).unwrap());

    for score in scores {
        let display_id = display_ids.get(&score.task_id).cloned().unwrap_or_default();
        let verdict = if score.is_ready { "ready" } else { "not ready" };
        println!("  {display_id:<12} {:>5.1}  {verdict}", score.overall);
        for missing in &score.missing_items {
            println!("      - {missing}");
        }
    }

    Ok(())
}
