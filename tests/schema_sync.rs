mod common;

use std::sync::Arc;

use common::{RecordingDatabase, TestResult, collections, init_tracing, with_timeout};
use vertexsync::db::{Database, DbError};
use vertexsync::engine::{SchemaSynchronizer, SyncOptions};
use vertexsync::errors::VertexsyncError;

fn synchronizer(db: &Arc<RecordingDatabase>, pairs: &[(&str, &str)], options: SyncOptions) -> SchemaSynchronizer {
    SchemaSynchronizer::new(db.clone(), collections(pairs).into(), options)
}

fn with_index(id: &str) -> SyncOptions {
    SyncOptions {
        create_custom_index: true,
        id_property: id.to_string(),
    }
}

#[tokio::test]
async fn creates_missing_class_without_touching_indexes() -> TestResult {
    init_tracing();
    let db = RecordingDatabase::memory("app");

    let map = with_timeout(synchronizer(&db, &[("user", "Users")], SyncOptions::default()).sync()).await?;

    let users = map.get("user").expect("user mapped");
    assert_eq!(users.name, "Users");
    assert_eq!(users.superclass.as_deref(), Some("V"));
    assert_eq!(map.len(), 1);

    assert_eq!(db.journal(), vec!["list_classes:", "create_class:Users"]);
    assert_eq!(db.count_op("get_index"), 0);
    assert_eq!(db.count_op("create_index"), 0);
    assert_eq!(db.count_op("list_properties"), 0);
    Ok(())
}

#[tokio::test]
async fn existing_class_is_not_created_again() -> TestResult {
    let db = RecordingDatabase::memory("app");
    let existing = db.create_class("Users", "V").await?;
    db.clear();

    let map = synchronizer(&db, &[("user", "Users")], SyncOptions::default())
        .sync()
        .await?;

    assert_eq!(db.count_op("create_class"), 0);
    assert_eq!(map.get("user"), Some(&existing));
    Ok(())
}

#[tokio::test]
async fn custom_index_creates_property_then_index_once() -> TestResult {
    init_tracing();
    let db = RecordingDatabase::memory("app");

    synchronizer(&db, &[("user", "Users")], with_index("id"))
        .sync()
        .await?;

    assert_eq!(
        db.journal(),
        vec![
            "get_class:V",
            "list_properties:V",
            "create_property:V.id",
            "get_index:V.id",
            "create_index:V.id",
            "list_classes:",
            "create_class:Users",
        ]
    );
    Ok(())
}

#[tokio::test]
async fn found_index_is_not_recreated() -> TestResult {
    let db = RecordingDatabase::memory("app");
    let sync = synchronizer(&db, &[("user", "Users")], with_index("id"));

    sync.sync().await?;
    db.clear();
    sync.sync().await?;

    assert_eq!(db.count("get_index", "V.id"), 1);
    assert_eq!(db.count_op("create_index"), 0);
    assert_eq!(db.count_op("create_property"), 0);
    Ok(())
}

#[tokio::test]
async fn second_sync_is_identical_and_creates_nothing() -> TestResult {
    let db = RecordingDatabase::memory("app");
    let pairs = [("user", "Users"), ("order", "Orders"), ("item", "Items")];
    let sync = synchronizer(&db, &pairs, with_index("uuid"));

    let first = sync.sync().await?;
    db.clear();
    let second = sync.sync().await?;

    assert_eq!(first, second);
    assert_eq!(db.count_op("create_class"), 0);
    assert_eq!(db.count_op("create_property"), 0);
    assert_eq!(db.count_op("create_index"), 0);
    Ok(())
}

#[tokio::test]
async fn missing_classes_are_created_in_declaration_order() -> TestResult {
    let db = RecordingDatabase::memory("app");
    db.create_class("Orders", "V").await?;
    db.clear();

    let pairs = [("user", "Users"), ("order", "Orders"), ("item", "Items")];
    let map = synchronizer(&db, &pairs, SyncOptions::default()).sync().await?;

    let created: Vec<String> = db
        .calls()
        .into_iter()
        .filter(|c| c.op == "create_class")
        .map(|c| c.target)
        .collect();
    assert_eq!(created, vec!["Users", "Items"]);
    assert_eq!(map.len(), 3);
    Ok(())
}

#[tokio::test]
async fn missing_classes_are_never_created_concurrently() -> TestResult {
    let db = RecordingDatabase::memory("app");
    let pairs = [
        ("user", "Users"),
        ("order", "Orders"),
        ("item", "Items"),
        ("invoice", "Invoices"),
    ];

    let map = with_timeout(synchronizer(&db, &pairs, SyncOptions::default()).sync()).await?;

    assert_eq!(map.len(), 4);
    assert_eq!(db.count_op("create_class"), 4);
    assert_eq!(db.peak_concurrent_creates(), 1);
    Ok(())
}

#[tokio::test]
async fn failed_class_creation_names_task_and_class() {
    init_tracing();
    let db = RecordingDatabase::memory("app");
    db.fail_on("create_class", "Orders", DbError::Backend("disk full".to_string()));

    let err = synchronizer(&db, &[("user", "Users"), ("order", "Orders")], SyncOptions::default())
        .sync()
        .await
        .unwrap_err();

    match err {
        VertexsyncError::SchemaSyncFailed { task, cause } => {
            assert_eq!(task, "registerClasses");
            let cause = format!("{cause:#}");
            assert!(cause.contains("creating class 'Orders'"), "cause: {cause}");
            assert!(cause.contains("disk full"), "cause: {cause}");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn index_lookup_errors_other_than_not_found_propagate() {
    let db = RecordingDatabase::memory("app");
    db.fail_on("get_index", "V.id", DbError::Backend("timeout".to_string()));

    let err = synchronizer(&db, &[("user", "Users")], with_index("id"))
        .sync()
        .await
        .unwrap_err();

    assert!(matches!(err, VertexsyncError::SchemaSyncFailed { ref task, .. } if task == "ensureIndex"));
    assert_eq!(db.count_op("create_index"), 0);
    assert_eq!(db.count_op("list_classes"), 0);
}
