//! Unit tests for the SmartMarks database layer (connection + migrations).

use smartmarks::database::migrations::{get_schema_version, CURRENT_SCHEMA_VERSION};
use smartmarks::database::Database;

#[test]
fn test_open_in_memory_succeeds() {
    let db = Database::open_in_memory();
    assert!(db.is_ok(), "open_in_memory should succeed");
}

#[test]
fn test_migrations_create_all_tables() {
    let db = Database::open_in_memory().expect("open_in_memory failed");
    let conn = db.connection().expect("connection");

    for table in ["bookmarks", "bookmark_folders", "kv_store", "schema_version"] {
        let exists: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name=?1",
                [table],
                |row| row.get(0),
            )
            .unwrap_or(false);
        assert!(exists, "Table '{}' should exist after migrations", table);
    }
}

#[test]
fn test_schema_version_is_current() {
    let db = Database::open_in_memory().unwrap();
    let conn = db.connection().unwrap();
    assert_eq!(get_schema_version(&conn), CURRENT_SCHEMA_VERSION);
}

/// The v2 migration adds the enrichment columns to `bookmarks`.
#[test]
fn test_bookmarks_have_description_and_keywords() {
    let db = Database::open_in_memory().unwrap();
    let conn = db.connection().unwrap();
    let mut stmt = conn.prepare("PRAGMA table_info(bookmarks)").unwrap();
    let columns: Vec<String> = stmt
        .query_map([], |row| row.get::<_, String>(1))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert!(columns.contains(&"description".to_string()));
    assert!(columns.contains(&"keywords".to_string()));
}

/// Reopening a file database must not re-run or duplicate migrations.
#[test]
fn test_reopen_file_database_keeps_data() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("smartmarks.db");

    {
        let db = Database::open(&path).unwrap();
        let conn = db.connection().unwrap();
        conn.execute(
            "INSERT INTO kv_store (key, value, updated_at) VALUES ('k', 'v', 0)",
            [],
        )
        .unwrap();
    }

    let db = Database::open(&path).unwrap();
    let conn = db.connection().unwrap();
    let value: String = conn
        .query_row("SELECT value FROM kv_store WHERE key = 'k'", [], |row| row.get(0))
        .unwrap();
    assert_eq!(value, "v");

    let versions: i32 = conn
        .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
        .unwrap();
    assert_eq!(versions, CURRENT_SCHEMA_VERSION);
}
