//! `pto list` commands: create task lists and inspect their progress.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use pto_db::queries::tasks as task_db;
use pto_db::queries::task_lists as list_db;

/// `pto list create <name>`.
pub async fn run_create(pool: &PgPool, name: &str) -> Result<()> {
    let list = list_db::insert_task_list(pool, name, None).await?;
    println!("Created task list: {} ({})", list.name, list.id);
    Ok(())
}

/// `pto list show <list-id>`: per-task listing for one list.
pub async fn run_show(pool: &PgPool, list_id_str: &str) -> Result<()> {
    let list_id =
        Uuid::parse_str(list_id_str).with_context(|| format!("invalid list id: {list_id_str}"))?;

    let list = list_db::get_task_list(pool, list_id)
        .await?
        .with_context(|| format!("task list {list_id} not found"))?;

    println!("Task list: {} ({})", list.name, list.id);
    println!("Status: {}", list.status);
    println!(
        "Progress: {}/{} complete, {} failed",
        list.completed_tasks, list.total_tasks, list.failed_tasks
    );
    println!();

    let tasks = task_db::list_tasks_for_list(pool, list_id).await?;
    println!("Tasks:");
    for task in &tasks {
        let status_icon = match task.status.to_string().as_str() {
            "pending" => ".",
            "evaluating" => "?",
            "running" => "*",
            "complete" => "+",
            "failed" => "!",
            "blocked" => "#",
            "skipped" => "-",
            "cancelled" => "x",
            _ => " ",
        };
        println!(
            "  [{}] {} {} (attempt {}, {}, {})",
            status_icon, task.display_id, task.title, task.attempt_count, task.priority, task.status
        );
    }

    Ok(())
}

/// `pto list status [list-id]`.
///
/// When `list_id_str` is `Some`, shows detailed status for that list (the
/// same view as `show`). When `None`, lists every task list with a
/// progress summary.
pub async fn run_status(pool: &PgPool, list_id_str: Option<&str>) -> Result<()> {
    match list_id_str {
        Some(id) => run_show(pool, id).await,
        None => run_fleet_status(pool).await,
    }
}

async fn run_fleet_status(pool: &PgPool) -> Result<()> {
    let lists = list_db::list_task_lists(pool).await?;

    if lists.is_empty() {
        println!("No task lists found.");
        return Ok(());
    }

    println!(
        "{:<38} {:<30} {:<10} {:>10}",
        "ID", "NAME", "STATUS", "PROGRESS"
    );
    println!("{}", "-".repeat(92));

    for list in &lists {
        let progress_str = if list.total_tasks > 0 {
            format!("{}/{}", list.completed_tasks, list.total_tasks)
        } else {
            "0/0".to_string()
        };
        let name_display = if list.name.len() > 28 {
            format!("{}...", &list.name[..25])
        } else {
            list.name.clone()
        };
        println!(
            "{:<38} {:<30} {:<10} {:>10}",
            list.id, name_display, list.status, progress_str
        );
    }

    Ok(())
}
