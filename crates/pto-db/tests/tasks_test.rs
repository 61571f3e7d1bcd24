//! Integration tests for task CRUD, status transitions, and the
//! dependency/footprint tables that hang off a task (relationships, file
//! impacts, acceptance criteria, test commands).
//!
//! Each test creates a unique temporary database inside a shared containerized
//! PostgreSQL instance (via testcontainers), runs migrations, and drops it on
//! completion so tests are fully isolated.

use pto_db::models::{EffortBucket, FileOperation, Priority, Provenance, RelationshipType, TaskStatus};
use pto_db::queries::impacts::{self, NewFileImpact};
use pto_db::queries::tasks::{self, NewTask};
use pto_db::queries::{acceptance_criteria, relationships, test_commands};
use pto_test_utils::{create_test_db, drop_test_db};
use uuid::Uuid;

fn sample_task(display_id: &str, position: i32) -> NewTask {
    NewTask {
        display_id: display_id.into(),
        title: format!("Task {display_id}"),
        description: "does a thing".into(),
        category: "backend".into(),
        priority: Priority::P2,
        effort: EffortBucket::Small,
        phase: None,
        position,
        task_list_id: None,
        project_id: None,
    }
}

#[tokio::test]
async fn insert_and_get_task() {
    let (pool, db_name) = create_test_db().await;

    let task = tasks::insert_task(&pool, &sample_task("T1", 0))
        .await
        .expect("insert_task should succeed");

    assert_eq!(task.status, TaskStatus::Pending);
    assert_eq!(task.attempt_count, 0);
    assert!(task.started_at.is_none());

    let fetched = tasks::get_task(&pool, task.id)
        .await
        .expect("get_task should succeed")
        .expect("task should exist");
    assert_eq!(fetched.display_id, "T1");

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn list_tasks_for_list_orders_by_position_then_id() {
    let (pool, db_name) = create_test_db().await;

    let list = pto_db::queries::task_lists::insert_task_list(&pool, "l", None)
        .await
        .expect("insert_task_list should succeed");

    let mut a = sample_task("T-last", 2);
    a.task_list_id = Some(list.id);
    let mut b = sample_task("T-first", 0);
    b.task_list_id = Some(list.id);

    tasks::insert_task(&pool, &a).await.expect("insert should succeed");
    tasks::insert_task(&pool, &b).await.expect("insert should succeed");

    let ordered = tasks::list_tasks_for_list(&pool, list.id)
        .await
        .expect("list_tasks_for_list should succeed");

    assert_eq!(ordered.len(), 2);
    assert_eq!(ordered[0].display_id, "T-first");
    assert_eq!(ordered[1].display_id, "T-last");

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn transition_status_fails_precondition_when_status_does_not_match() {
    let (pool, db_name) = create_test_db().await;

    let task = tasks::insert_task(&pool, &sample_task("T1", 0))
        .await
        .expect("insert_task should succeed");

    // Task is pending, not running -- a transition expecting "running" must
    // no-op rather than silently advancing the state.
    let result = tasks::transition_status(&pool, task.id, TaskStatus::Running, TaskStatus::Complete)
        .await
        .expect("transition_status should not error");
    assert!(result.is_none());

    let result = tasks::transition_status(&pool, task.id, TaskStatus::Pending, TaskStatus::Running)
        .await
        .expect("transition_status should not error")
        .expect("precondition matched, transition should apply");
    assert_eq!(result.status, TaskStatus::Running);
    assert!(result.started_at.is_some());

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn retry_to_pending_increments_attempt_count() {
    let (pool, db_name) = create_test_db().await;

    let task = tasks::insert_task(&pool, &sample_task("T1", 0))
        .await
        .expect("insert_task should succeed");

    tasks::transition_status(&pool, task.id, TaskStatus::Pending, TaskStatus::Running)
        .await
        .expect("transition should succeed");
    tasks::transition_status(&pool, task.id, TaskStatus::Running, TaskStatus::Failed)
        .await
        .expect("transition should succeed");

    let retried = tasks::retry_to_pending(&pool, task.id)
        .await
        .expect("retry_to_pending should succeed")
        .expect("task was in failed status, retry should apply");

    assert_eq!(retried.status, TaskStatus::Pending);
    assert_eq!(retried.attempt_count, 1);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn list_ready_tasks_excludes_tasks_with_incomplete_dependencies() {
    let (pool, db_name) = create_test_db().await;

    let list = pto_db::queries::task_lists::insert_task_list(&pool, "l", None)
        .await
        .expect("insert_task_list should succeed");

    let mut upstream = sample_task("UP", 0);
    upstream.task_list_id = Some(list.id);
    let upstream = tasks::insert_task(&pool, &upstream).await.expect("insert should succeed");

    let mut downstream = sample_task("DOWN", 1);
    downstream.task_list_id = Some(list.id);
    let downstream = tasks::insert_task(&pool, &downstream).await.expect("insert should succeed");

    relationships::insert_relationship(
        &pool,
        downstream.id,
        upstream.id,
        RelationshipType::DependsOn,
        false,
    )
    .await
    .expect("insert_relationship should succeed");

    let ready = tasks::list_ready_tasks(&pool, list.id)
        .await
        .expect("list_ready_tasks should succeed");
    let ready_ids: Vec<Uuid> = ready.iter().map(|t| t.id).collect();
    assert!(ready_ids.contains(&upstream.id));
    assert!(!ready_ids.contains(&downstream.id));

    tasks::set_status(&pool, upstream.id, TaskStatus::Complete)
        .await
        .expect("set_status should succeed");

    let ready = tasks::list_ready_tasks(&pool, list.id)
        .await
        .expect("list_ready_tasks should succeed");
    let ready_ids: Vec<Uuid> = ready.iter().map(|t| t.id).collect();
    assert!(ready_ids.contains(&downstream.id));

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn file_impacts_upsert_on_conflict() {
    let (pool, db_name) = create_test_db().await;

    let task = tasks::insert_task(&pool, &sample_task("T1", 0))
        .await
        .expect("insert_task should succeed");

    impacts::insert_impact(
        &pool,
        &NewFileImpact {
            task_id: task.id,
            file_path: "src/lib.rs".into(),
            operation: FileOperation::Update,
            confidence: 0.5,
            source: Provenance::AiInferred,
        },
    )
    .await
    .expect("insert_impact should succeed");

    // Same (task, path, operation) key -- should update confidence in place
    // rather than create a second row.
    impacts::insert_impact(
        &pool,
        &NewFileImpact {
            task_id: task.id,
            file_path: "src/lib.rs".into(),
            operation: FileOperation::Update,
            confidence: 0.9,
            source: Provenance::User,
        },
    )
    .await
    .expect("insert_impact should succeed");

    let impacts = impacts::list_impacts_for_task(&pool, task.id)
        .await
        .expect("list_impacts_for_task should succeed");
    assert_eq!(impacts.len(), 1);
    assert_eq!(impacts[0].confidence, 0.9);
    assert_eq!(impacts[0].source, Provenance::User);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn acceptance_criteria_and_test_commands_round_trip() {
    let (pool, db_name) = create_test_db().await;

    let task = tasks::insert_task(&pool, &sample_task("T1", 0))
        .await
        .expect("insert_task should succeed");

    acceptance_criteria::insert_criterion(&pool, task.id, "returns 200 on success")
        .await
        .expect("insert_criterion should succeed");
    acceptance_criteria::insert_criterion(&pool, task.id, "logs a warning on retry")
        .await
        .expect("insert_criterion should succeed");

    let criteria = acceptance_criteria::list_for_task(&pool, task.id)
        .await
        .expect("list_for_task should succeed");
    assert_eq!(criteria.len(), 2);

    test_commands::insert_command(&pool, task.id, "cargo test -p pto-core")
        .await
        .expect("insert_command should succeed");

    let commands = test_commands::list_for_task(&pool, task.id)
        .await
        .expect("list_for_task should succeed");
    assert_eq!(commands.len(), 1);
    assert_eq!(commands[0].command, "cargo test -p pto-core");

    pool.close().await;
    drop_test_db(&db_name).await;
}
