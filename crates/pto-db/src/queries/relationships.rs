//! Database query functions for the `task_relationships` table.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{RelationshipType, TaskRelationship};

/// Insert a relationship edge. Idempotent: a duplicate
/// `(source, target, type)` triple is silently ignored, matching this
/// corpus's dependency-insertion idiom.
pub async fn insert_relationship(
    pool: &PgPool,
    source_task_id: Uuid,
    target_task_id: Uuid,
    relationship_type: RelationshipType,
    auto_resolved: bool,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO task_relationships (source_task_id, target_task_id, relationship_type, auto_resolved) \
         VALUES ($1, $2, $3, $4) \
         ON CONFLICT (source_task_id, target_task_id, relationship_type) DO NOTHING",
    )
    .bind(source_task_id)
    .bind(target_task_id)
    .bind(relationship_type)
    .bind(auto_resolved)
    .execute(pool)
    .await
    .context("failed to insert task relationship")?;

    Ok(())
}

/// All `depends_on` edges among tasks in a list, as `(source, target)`
/// pairs restricted to that list's membership.
pub async fn list_depends_on_edges(pool: &PgPool, task_list_id: Uuid) -> Result<Vec<(Uuid, Uuid)>> {
    let rows: Vec<(Uuid, Uuid)> = sqlx::query_as(
        "SELECT r.source_task_id, r.target_task_id \
         FROM task_relationships r \
         JOIN tasks s ON s.id = r.source_task_id \
         JOIN tasks t ON t.id = r.target_task_id \
         WHERE r.relationship_type = 'depends_on' \
           AND s.task_list_id = $1 AND t.task_list_id = $1",
    )
    .bind(task_list_id)
    .fetch_all(pool)
    .await
    .context("failed to list depends_on edges")?;

    Ok(rows)
}

/// Whether a `depends_on` edge already exists in either direction between
/// two tasks.
pub async fn depends_on_edge_exists_either_direction(
    pool: &PgPool,
    a: Uuid,
    b: Uuid,
) -> Result<bool> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS ( \
            SELECT 1 FROM task_relationships \
            WHERE relationship_type = 'depends_on' \
              AND ((source_task_id = $1 AND target_task_id = $2) \
                OR (source_task_id = $2 AND target_task_id = $1)) \
         )",
    )
    .bind(a)
    .bind(b)
    .fetch_one(pool)
    .await
    .context("failed to check for existing dependency edge")?;

    Ok(exists)
}

/// Direct `depends_on` targets of a task (what it depends on).
pub async fn direct_dependencies(pool: &PgPool, task_id: Uuid) -> Result<Vec<Uuid>> {
    let rows: Vec<(Uuid,)> = sqlx::query_as(
        "SELECT target_task_id FROM task_relationships \
         WHERE source_task_id = $1 AND relationship_type = 'depends_on'",
    )
    .bind(task_id)
    .fetch_all(pool)
    .await
    .context("failed to fetch direct dependencies")?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// Direct blockees of a task (tasks that depend on it).
pub async fn direct_blockees(pool: &PgPool, task_id: Uuid) -> Result<Vec<Uuid>> {
    let rows: Vec<(Uuid,)> = sqlx::query_as(
        "SELECT source_task_id FROM task_relationships \
         WHERE target_task_id = $1 AND relationship_type = 'depends_on'",
    )
    .bind(task_id)
    .fetch_all(pool)
    .await
    .context("failed to fetch direct blockees")?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// All relationships (of any type) for a list, for full-graph building.
pub async fn list_all_relationships_for_list(
    pool: &PgPool,
    task_list_id: Uuid,
) -> Result<Vec<TaskRelationship>> {
    let rows = sqlx::query_as::<_, TaskRelationship>(
        "SELECT r.* FROM task_relationships r \
         JOIN tasks s ON s.id = r.source_task_id \
         WHERE s.task_list_id = $1",
    )
    .bind(task_list_id)
    .fetch_all(pool)
    .await
    .context("failed to list relationships for task list")?;

    Ok(rows)
}
