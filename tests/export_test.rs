//! Integration tests for the JSON, SQLite and CSV exports.

mod common;

use std::sync::Arc;

use common::{day, topic, user, MockForum};
use discourse_collector::collector::{CacheStore, CollectItems, Collector, Scope};
use discourse_collector::export::{
    CsvExporter, ExportData, ExportItems, Exporter, JsonExporter, SqliteExporter,
};
use discourse_collector::runner::{run_once, CyclePlan};
use tempfile::TempDir;

fn forum() -> MockForum {
    let mut forum = MockForum::new();
    let mut t = topic(1, 5, "alice");
    t.posts.push(common::post(101, "bob", 2));
    forum.add_topic("general", 0, t);
    forum.add_topic("general", 0, topic(2, 4, "bob"));
    forum.users.insert("alice".into(), user(1, "alice"));
    forum.users.insert("bob".into(), user(2, "bob"));
    forum.add_revision_chain(100, 3);
    forum
}

async fn collected_data(items: ExportItems) -> ExportData {
    let forum = Arc::new(forum());
    let collector = Collector::new(forum, Arc::new(CacheStore::new()));
    let outcome = collector
        .collect(
            &Scope::Categories(vec!["general".to_string()]),
            CollectItems::default(),
        )
        .await
        .unwrap();
    ExportData::from_snapshot(&outcome.snapshot, items)
}

async fn count(exporter: &SqliteExporter, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(exporter.pool())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_snapshot_flattens_to_rows() {
    let data = collected_data(ExportItems::default()).await;

    assert_eq!(data.posts.len(), 3);
    assert_eq!(data.posts.iter().filter(|p| p.is_initial_post).count(), 2);
    assert!(data.posts.iter().all(|p| p.category_slug == "general"));
    assert_eq!(data.edits.len(), 2);
    assert!(data.edits.iter().all(|e| e.topic_id == 1));
    assert_eq!(data.users.len(), 2);
}

#[tokio::test]
async fn test_sqlite_export_is_idempotent() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("nested").join("export.sqlite");
    let exporter = SqliteExporter::open(&db_path)
        .await
        .expect("Failed to open export database");

    let data = collected_data(ExportItems::default()).await;
    let first = exporter.export(&data).await.unwrap();
    let second = exporter.export(&data).await.unwrap();

    assert_eq!(first.rows_written, 7);
    assert_eq!(first.rows_failed, 0);
    assert_eq!(second.rows_failed, 0);
    assert_eq!(count(&exporter, "comments").await, 3);
    assert_eq!(count(&exporter, "edits").await, 2);
    assert_eq!(count(&exporter, "users").await, 2);
}

#[tokio::test]
async fn test_sqlite_export_updates_edited_posts() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let exporter = SqliteExporter::open(&temp_dir.path().join("export.sqlite"))
        .await
        .unwrap();

    let mut data = collected_data(ExportItems::default()).await;
    exporter.export(&data).await.unwrap();

    data.posts[0].update_time = Some(day(20));
    exporter.export(&data).await.unwrap();

    let update_time: Option<chrono::DateTime<chrono::Utc>> =
        sqlx::query_scalar("SELECT update_time FROM comments WHERE post_id = ?")
            .bind(data.posts[0].post_id as i64)
            .fetch_one(exporter.pool())
            .await
            .unwrap();
    assert_eq!(update_time, Some(day(20)));
    assert_eq!(count(&exporter, "comments").await, 3);
}

#[tokio::test]
async fn test_sqlite_export_follows_moved_topic() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let exporter = SqliteExporter::open(&temp_dir.path().join("export.sqlite"))
        .await
        .unwrap();

    let mut data = collected_data(ExportItems::default()).await;
    exporter.export(&data).await.unwrap();

    for post in &mut data.posts {
        post.category_slug = "support".to_string();
    }
    exporter.export(&data).await.unwrap();

    let slugs: Vec<String> = sqlx::query_scalar("SELECT DISTINCT category_slug FROM comments")
        .fetch_all(exporter.pool())
        .await
        .unwrap();
    assert_eq!(slugs, vec!["support".to_string()]);
    assert_eq!(count(&exporter, "comments").await, 3);
}

#[tokio::test]
async fn test_sqlite_export_respects_items() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let exporter = SqliteExporter::open(&temp_dir.path().join("export.sqlite"))
        .await
        .unwrap();

    let data = collected_data(ExportItems {
        posts: false,
        edits: true,
        users: false,
    })
    .await;
    exporter.export(&data).await.unwrap();

    assert_eq!(count(&exporter, "comments").await, 0);
    assert_eq!(count(&exporter, "users").await, 0);
    assert_eq!(count(&exporter, "edits").await, 2);
}

#[tokio::test]
async fn test_json_export_to_file() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let path = temp_dir.path().join("out").join("export.json");
    let exporter = JsonExporter::new(Some(path.clone()));

    let data = collected_data(ExportItems::default()).await;
    let stats = exporter.export(&data).await.unwrap();

    let written = std::fs::read_to_string(&path).unwrap();
    assert!(written.ends_with('\n'));
    let parsed: ExportData = serde_json::from_str(&written).unwrap();
    assert_eq!(parsed, data);
    assert_eq!(stats.rows_written, 7);
}

#[tokio::test]
async fn test_json_export_omits_disabled_items() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let path = temp_dir.path().join("export.json");
    let exporter = JsonExporter::new(Some(path.clone()));

    let data = collected_data(ExportItems {
        posts: false,
        edits: false,
        users: true,
    })
    .await;
    exporter.export(&data).await.unwrap();

    let value: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert!(value.get("posts").is_none());
    assert!(value.get("edits").is_none());
    assert_eq!(value["users"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_run_once_repeats_identically() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let path = temp_dir.path().join("export.json");
    let exporter = Exporter::Json(JsonExporter::new(Some(path.clone())));

    let forum = Arc::new(forum());
    let collector = Collector::new(forum.clone(), Arc::new(CacheStore::new()));
    let plan = CyclePlan {
        scope: Scope::Categories(vec!["general".to_string()]),
        collect: CollectItems::default(),
        export: ExportItems::default(),
    };

    run_once(&collector, &exporter, &plan).await.unwrap();
    let first = std::fs::read(&path).unwrap();

    forum.clear_calls();
    run_once(&collector, &exporter, &plan).await.unwrap();
    let second = std::fs::read(&path).unwrap();

    assert_eq!(first, second);
    assert_eq!(forum.topic_fetches(), 0);
}

#[tokio::test]
async fn test_csv_export_writes_one_file_per_kind() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let folder = temp_dir.path().join("out");
    let exporter = CsvExporter::new(folder.clone());

    let data = collected_data(ExportItems::default()).await;
    let stats = exporter.export(&data).await.unwrap();
    assert_eq!(stats.rows_written, 7);

    let comments = std::fs::read_to_string(folder.join("topic_comments.csv")).unwrap();
    let mut lines = comments.lines();
    assert_eq!(
        lines.next(),
        Some(
            "Category Slug,Topic ID,Post ID,Creation Time,Last Update Time,\
             Creator Username,Is the topic's main post"
        )
    );
    assert_eq!(lines.count(), 3);

    let edits = std::fs::read_to_string(folder.join("topic_edits.csv")).unwrap();
    assert!(edits.starts_with("Topic ID,Edit Number,Creation Time,Editor Username\n"));
    assert_eq!(edits.lines().count(), 3);

    let users = std::fs::read_to_string(folder.join("users.csv")).unwrap();
    assert!(users.starts_with("User ID,Username,Name,Primary Group Name\n"));
    assert!(users.contains("\n1,alice,"));
    assert_eq!(users.lines().count(), 3);

    // A second export replaces the files rather than appending
    exporter.export(&data).await.unwrap();
    let again = std::fs::read_to_string(folder.join("topic_comments.csv")).unwrap();
    assert_eq!(again, comments);
}

#[tokio::test]
async fn test_csv_export_skips_disabled_items() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let exporter = CsvExporter::new(temp_dir.path().to_path_buf());

    let data = collected_data(ExportItems {
        posts: false,
        edits: false,
        users: true,
    })
    .await;
    let stats = exporter.export(&data).await.unwrap();

    assert_eq!(stats.rows_written, 2);
    assert!(temp_dir.path().join("users.csv").exists());
    assert!(!temp_dir.path().join("topic_comments.csv").exists());
    assert!(!temp_dir.path().join("topic_edits.csv").exists());
}

#[tokio::test]
async fn test_empty_cycle_keeps_previous_export() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let path = temp_dir.path().join("export.json");
    std::fs::write(&path, "previous").unwrap();
    let exporter = Exporter::Json(JsonExporter::new(Some(path.clone())));

    let collector = Collector::new(Arc::new(MockForum::new()), Arc::new(CacheStore::new()));
    let plan = CyclePlan {
        scope: Scope::Categories(vec!["general".to_string()]),
        collect: CollectItems::default(),
        export: ExportItems::default(),
    };

    let stats = run_once(&collector, &exporter, &plan).await.unwrap();
    assert_eq!(stats.rows_written, 0);
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "previous");
}
