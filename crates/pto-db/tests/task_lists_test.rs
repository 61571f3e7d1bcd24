//! Integration tests for task list CRUD and progress-count maintenance.
//!
//! Each test creates a unique temporary database inside a shared containerized
//! PostgreSQL instance (via testcontainers), runs migrations, and drops it on
//! completion so tests are fully isolated.

use pto_db::models::{EffortBucket, Priority, TaskListStatus, TaskStatus};
use pto_db::queries::{task_lists, tasks};
use pto_test_utils::create_test_db;
use uuid::Uuid;

#[tokio::test]
async fn insert_and_get_task_list() {
    let (pool, db_name) = create_test_db().await;

    let list = task_lists::insert_task_list(&pool, "release-42", None)
        .await
        .expect("insert_task_list should succeed");

    assert_eq!(list.name, "release-42");
    assert_eq!(list.status, TaskListStatus::Draft);
    assert_eq!(list.total_tasks, 0);
    assert_eq!(list.completed_tasks, 0);
    assert_eq!(list.failed_tasks, 0);

    let fetched = task_lists::get_task_list(&pool, list.id)
        .await
        .expect("get_task_list should succeed")
        .expect("task list should exist");

    assert_eq!(fetched.id, list.id);
    assert_eq!(fetched.name, "release-42");

    pool.close().await;
    pto_test_utils::drop_test_db(&db_name).await;
}

#[tokio::test]
async fn get_task_list_returns_none_for_missing_id() {
    let (pool, db_name) = create_test_db().await;

    let result = task_lists::get_task_list(&pool, Uuid::new_v4())
        .await
        .expect("get_task_list should not error");

    assert!(result.is_none());

    pool.close().await;
    pto_test_utils::drop_test_db(&db_name).await;
}

#[tokio::test]
async fn list_task_lists_returns_all() {
    let (pool, db_name) = create_test_db().await;

    task_lists::insert_task_list(&pool, "list-a", None)
        .await
        .expect("insert_task_list should succeed");
    task_lists::insert_task_list(&pool, "list-b", None)
        .await
        .expect("insert_task_list should succeed");

    let lists = task_lists::list_task_lists(&pool)
        .await
        .expect("list_task_lists should succeed");

    assert_eq!(lists.len(), 2);
    let names: Vec<&str> = lists.iter().map(|l| l.name.as_str()).collect();
    assert!(names.contains(&"list-a"));
    assert!(names.contains(&"list-b"));

    pool.close().await;
    pto_test_utils::drop_test_db(&db_name).await;
}

#[tokio::test]
async fn update_task_list_status_persists() {
    let (pool, db_name) = create_test_db().await;

    let list = task_lists::insert_task_list(&pool, "list-a", None)
        .await
        .expect("insert_task_list should succeed");

    task_lists::update_task_list_status(&pool, list.id, TaskListStatus::Running)
        .await
        .expect("update_task_list_status should succeed");

    let fetched = task_lists::get_task_list(&pool, list.id)
        .await
        .expect("get_task_list should succeed")
        .expect("task list should exist");

    assert_eq!(fetched.status, TaskListStatus::Running);

    pool.close().await;
    pto_test_utils::drop_test_db(&db_name).await;
}

#[tokio::test]
async fn refresh_task_list_counts_reflects_task_statuses() {
    let (pool, db_name) = create_test_db().await;

    let list = task_lists::insert_task_list(&pool, "list-a", None)
        .await
        .expect("insert_task_list should succeed");

    let mut ids = Vec::new();
    for i in 0..3 {
        let task = tasks::insert_task(
            &pool,
            &tasks::NewTask {
                display_id: format!("T{i}"),
                title: format!("task {i}"),
                description: String::new(),
                category: "general".into(),
                priority: Priority::P3,
                effort: EffortBucket::Small,
                phase: None,
                position: i,
                task_list_id: Some(list.id),
                project_id: None,
            },
        )
        .await
        .expect("insert_task should succeed");
        ids.push(task.id);
    }

    tasks::set_status(&pool, ids[0], TaskStatus::Complete)
        .await
        .expect("set_status should succeed");
    tasks::set_status(&pool, ids[1], TaskStatus::Failed)
        .await
        .expect("set_status should succeed");

    task_lists::refresh_task_list_counts(&pool, list.id)
        .await
        .expect("refresh_task_list_counts should succeed");

    let fetched = task_lists::get_task_list(&pool, list.id)
        .await
        .expect("get_task_list should succeed")
        .expect("task list should exist");

    assert_eq!(fetched.total_tasks, 3);
    assert_eq!(fetched.completed_tasks, 1);
    assert_eq!(fetched.failed_tasks, 1);

    pool.close().await;
    pto_test_utils::drop_test_db(&db_name).await;
}
