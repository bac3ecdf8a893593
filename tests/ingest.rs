//! Store-backed integration tests for the ingestion pipeline
//!
//! All tests run against an in-memory single-connection SQLite pool.

use std::path::PathBuf;

use sqlx::Acquire;

use logmart::db::Database;
use logmart::error::IngestError;
use logmart::ingest::{self, resolve, DimCache, DimValue, FileSource};

async fn test_db() -> Database {
    let db = Database::connect_in_memory().await.unwrap();
    db.run_migrations().await.unwrap();
    db
}

fn temp_log(name: &str, contents: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("logmart-test-{}-{}", std::process::id(), name));
    std::fs::write(&path, contents).unwrap();
    path
}

async fn count(db: &Database, table: &str) -> i64 {
    let sql = format!("SELECT COUNT(*) FROM {table}");
    let row: (i64,) = sqlx::query_as(&sql).fetch_one(db.pool()).await.unwrap();
    row.0
}

const SCENARIO_LINE: &str = r#"127.0.0.1 - - [10/Oct/2023:13:55:36 +0000] "GET /api/v1/users HTTP/1.1" 200 2326 "-" "Mozilla/5.0" 45"#;

#[tokio::test]
async fn round_trip_file_of_k_lines_yields_k_joinable_facts() {
    let db = test_db().await;
    let contents = [
        SCENARIO_LINE,
        r#"10.0.0.5 - - [2023-10-10 14:00:00 +0000] "POST /login HTTP/2.0" 302 512 "https://example.com/" "curl/8.0" 12"#,
        r#"127.0.0.1 - - [10/Oct/2023:14:05:00 +0000] "GET /api/v1/users HTTP/1.1" 200 100 "https://example.com/" "Mozilla/5.0" 7"#,
    ]
    .join("\n");
    let path = temp_log("roundtrip.log", &contents);

    let report = ingest::ingest_file(&db, &path, FileSource::Local, 1000)
        .await
        .unwrap();
    assert_eq!(report.lines_processed, 3);

    assert_eq!(count(&db, "log_entries").await, 3);
    // Shared natural keys were deduplicated
    assert_eq!(count(&db, "dim_ip").await, 2);
    assert_eq!(count(&db, "dim_user_agent").await, 2);
    assert_eq!(count(&db, "dim_referrer").await, 1);
    assert_eq!(count(&db, "dim_request_type").await, 2);
    assert_eq!(count(&db, "dim_time").await, 3);

    // Every fact joins to exactly one row per dimension
    let rows = db.fetch_export_rows().await.unwrap();
    assert_eq!(rows.len(), 3);

    let first = &rows[0];
    assert_eq!(first.ip_address, "127.0.0.1");
    assert_eq!(first.request_type, "GET");
    assert_eq!(first.api_path, "/api/v1/users");
    assert_eq!(first.protocol, "HTTP/1.1");
    assert_eq!(first.status_code, 200);
    assert_eq!(first.bytes_sent, 2326);
    assert_eq!(first.referrer_url, None);
    assert_eq!(first.response_time, 45);
    assert_eq!(first.timestamp_utc, "2023-10-10 13:55:36");
    assert_eq!(
        (first.year, first.month, first.day),
        (2023, 10, 10)
    );
    assert_eq!(
        (first.hour, first.minute, first.second),
        (13, 55, 36)
    );
    // 2023-10-10 was a Tuesday (0 = Monday)
    assert_eq!(first.weekday, 1);

    assert_eq!(rows[1].referrer_url.as_deref(), Some("https://example.com/"));

    std::fs::remove_file(&path).ok();
}

#[tokio::test]
async fn chunked_ingestion_flushes_every_batch_and_the_remainder() {
    let db = test_db().await;
    let contents = (0..5)
        .map(|i| {
            format!(
                r#"10.0.0.{i} - - [2023-10-10 13:55:0{i} +0000] "GET /page/{i} HTTP/1.1" 200 10 "-" "curl/8.0" 1"#
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    let path = temp_log("chunked.log", &contents);

    // batch size 2 forces two full flushes plus a remainder flush
    let report = ingest::ingest_file(&db, &path, FileSource::Local, 2)
        .await
        .unwrap();
    assert_eq!(report.lines_processed, 5);
    assert_eq!(count(&db, "log_entries").await, 5);

    std::fs::remove_file(&path).ok();
}

#[tokio::test]
async fn malformed_lines_are_skipped_not_fatal() {
    let db = test_db().await;
    let contents = format!(
        "{SCENARIO_LINE}\nthis line matches no grammar at all\n{SCENARIO_LINE}\n"
    );
    let path = temp_log("malformed.log", &contents);

    let report = ingest::ingest_file(&db, &path, FileSource::Local, 1000)
        .await
        .unwrap();
    assert_eq!(report.lines_processed, 2);
    assert_eq!(count(&db, "log_entries").await, 2);

    std::fs::remove_file(&path).ok();
}

#[tokio::test]
async fn dash_counters_store_zero_and_null_referrer_fk() {
    let db = test_db().await;
    let line = r#"127.0.0.1 - - [10/Oct/2023:13:55:36 +0000] "GET / HTTP/1.1" 404 - "-" "Mozilla/5.0" -"#;
    let path = temp_log("boundary.log", line);

    ingest::ingest_file(&db, &path, FileSource::Local, 1000)
        .await
        .unwrap();

    let row: (i64, i64, Option<i64>) =
        sqlx::query_as("SELECT bytes_sent, response_time, referrer_id FROM log_entries")
            .fetch_one(db.pool())
            .await
            .unwrap();
    assert_eq!(row, (0, 0, None));
    assert_eq!(count(&db, "dim_referrer").await, 0);

    std::fs::remove_file(&path).ok();
}

#[tokio::test]
async fn missing_file_is_a_reported_error() {
    let db = test_db().await;
    let path = std::env::temp_dir().join("logmart-test-definitely-missing.log");

    let err = ingest::ingest_file(&db, &path, FileSource::Local, 1000)
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::FileNotFound(_)));
}

#[tokio::test]
async fn uploaded_file_is_deleted_after_processing() {
    let db = test_db().await;
    let path = temp_log("uploaded.log", SCENARIO_LINE);

    ingest::ingest_file(&db, &path, FileSource::Uploaded, 1000)
        .await
        .unwrap();

    assert!(!path.exists());
    assert_eq!(count(&db, "log_entries").await, 1);
}

#[tokio::test]
async fn local_file_is_kept_after_processing() {
    let db = test_db().await;
    let path = temp_log("kept.log", SCENARIO_LINE);

    ingest::ingest_file(&db, &path, FileSource::Local, 1000)
        .await
        .unwrap();

    assert!(path.exists());
    std::fs::remove_file(&path).ok();
}

#[tokio::test]
async fn resolving_twice_in_one_cache_scope_is_idempotent() {
    let db = test_db().await;
    let mut cache = DimCache::new();
    let mut conn = db.pool().acquire().await.unwrap();
    let mut tx = conn.begin().await.unwrap();

    let columns = [("ip_address", DimValue::Text("192.0.2.1".to_string()))];
    let first = resolve(&mut tx, &mut cache, "dim_ip", &columns).await.unwrap();
    let second = resolve(&mut tx, &mut cache, "dim_ip", &columns).await.unwrap();
    tx.commit().await.unwrap();
    drop(conn);

    assert_eq!(first, second);
    assert_eq!(count(&db, "dim_ip").await, 1);
}

#[tokio::test]
async fn independent_cache_scopes_share_the_stored_row() {
    let db = test_db().await;
    let columns = [("ip_address", DimValue::Text("192.0.2.2".to_string()))];

    let mut ids = Vec::new();
    for _ in 0..2 {
        let mut cache = DimCache::new();
        let mut conn = db.pool().acquire().await.unwrap();
        let mut tx = conn.begin().await.unwrap();
        ids.push(resolve(&mut tx, &mut cache, "dim_ip", &columns).await.unwrap());
        tx.commit().await.unwrap();
    }

    assert_eq!(ids[0], ids[1]);
    assert_eq!(count(&db, "dim_ip").await, 1);
}

#[tokio::test]
async fn concurrent_first_time_resolutions_yield_one_row() {
    let db = test_db().await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let db = db.clone();
        handles.push(tokio::spawn(async move {
            let mut cache = DimCache::new();
            let mut conn = db.pool().acquire().await.unwrap();
            let mut tx = conn.begin().await.unwrap();
            let id = resolve(
                &mut tx,
                &mut cache,
                "dim_ip",
                &[("ip_address", DimValue::Text("198.51.100.7".to_string()))],
            )
            .await
            .unwrap();
            tx.commit().await.unwrap();
            id
        }));
    }

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap());
    }

    assert!(ids.windows(2).all(|pair| pair[0] == pair[1]));
    assert_eq!(count(&db, "dim_ip").await, 1);
}

#[tokio::test]
async fn nullable_referrer_resolves_to_none_without_store_access() {
    let db = test_db().await;
    let mut cache = DimCache::new();
    let mut conn = db.pool().acquire().await.unwrap();
    let mut tx = conn.begin().await.unwrap();

    let id = ingest::resolve_nullable(&mut tx, &mut cache, "dim_referrer", "referrer_url", None)
        .await
        .unwrap();
    tx.commit().await.unwrap();
    drop(conn);

    assert_eq!(id, None);
    assert!(cache.is_empty());
    assert_eq!(count(&db, "dim_referrer").await, 0);
}
