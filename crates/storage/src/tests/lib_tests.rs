use super::*;

#[tokio::test]
async fn health_check_succeeds_for_live_pool() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage.health_check().await.expect("health check");
}

#[tokio::test]
async fn missing_fragment_loads_as_none() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let loaded = storage.load_fragment("default").await.expect("load");
    assert!(loaded.is_none());
}

#[tokio::test]
async fn saves_and_overwrites_fragment() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage
        .save_fragment("default", &ObjectId::new("0xfirst"))
        .await
        .expect("save first");
    storage
        .save_fragment("default", &ObjectId::new("0xsecond"))
        .await
        .expect("save second");

    let loaded = storage
        .load_fragment("default")
        .await
        .expect("load")
        .expect("fragment");
    assert_eq!(loaded.session_key, "default");
    assert_eq!(loaded.object_id, ObjectId::new("0xsecond"));
}

#[tokio::test]
async fn fragments_are_scoped_by_session_key() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage
        .save_fragment("alice", &ObjectId::new("0xa"))
        .await
        .expect("save alice");
    storage
        .save_fragment("bob", &ObjectId::new("0xb"))
        .await
        .expect("save bob");

    assert!(storage.clear_fragment("alice").await.expect("clear alice"));
    assert!(storage.load_fragment("alice").await.expect("load").is_none());
    assert_eq!(
        storage
            .load_fragment("bob")
            .await
            .expect("load")
            .expect("bob fragment")
            .object_id,
        ObjectId::new("0xb")
    );
}

#[tokio::test]
async fn clearing_twice_is_harmless() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage
        .save_fragment("default", &ObjectId::new("0xabc"))
        .await
        .expect("save");

    assert!(storage.clear_fragment("default").await.expect("first clear"));
    assert!(!storage.clear_fragment("default").await.expect("second clear"));
}

#[tokio::test]
async fn blank_fragment_rows_are_ignored() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    sqlx::query("INSERT INTO session_fragments (session_key, fragment) VALUES ('default', '#')")
        .execute(storage.pool())
        .await
        .expect("insert blank");

    assert!(storage.load_fragment("default").await.expect("load").is_none());
}

#[tokio::test]
async fn fragment_survives_reopening_file_database() {
    let temp = tempfile::tempdir().expect("tempdir");
    let db_path = temp.path().join("nested").join("session.db");
    let database_url = format!("sqlite://{}", db_path.to_string_lossy().replace('\\', "/"));

    let storage = Storage::new(&database_url).await.expect("db");
    storage
        .save_fragment("default", &ObjectId::new("0xpersisted"))
        .await
        .expect("save");
    storage.pool().close().await;
    drop(storage);

    assert!(db_path.exists(), "database file should exist: {}", db_path.display());

    let reopened = Storage::new(&database_url).await.expect("reopen");
    let loaded = reopened
        .load_fragment("default")
        .await
        .expect("load")
        .expect("fragment");
    assert_eq!(loaded.object_id, ObjectId::new("0xpersisted"));
}

#[test]
fn parses_both_timestamp_formats() {
    let rfc = parse_sqlite_timestamp("2026-01-02T03:04:05+00:00").expect("rfc3339");
    let sqlite_default = parse_sqlite_timestamp("2026-01-02 03:04:05").expect("sqlite default");
    assert_eq!(rfc, sqlite_default);
}

#[test]
fn memory_urls_have_no_filesystem_path() {
    assert!(sqlite_path("sqlite::memory:").is_none());
    assert_eq!(
        sqlite_path("sqlite://./data/calc.db?mode=rwc"),
        Some(PathBuf::from("./data/calc.db"))
    );
}
