//! Unit tests for the SmartMark database layer (connection + migrations).

use smartmark::database::migrations::{get_schema_version, run_all, CURRENT_SCHEMA_VERSION};
use smartmark::database::Database;
use tempfile::TempDir;

#[test]
fn test_open_in_memory_succeeds() {
    let db = Database::open_in_memory();
    assert!(db.is_ok(), "open_in_memory should succeed");
}

#[test]
fn test_migrations_create_all_tables() {
    let db = Database::open_in_memory().expect("open_in_memory failed");
    let conn = db.connection();

    for table in &["users", "auth_tokens", "bookmarks", "client_session", "schema_version"] {
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
    assert_eq!(get_schema_version(db.connection()), CURRENT_SCHEMA_VERSION);
}

#[test]
fn test_migrations_are_idempotent() {
    let db = Database::open_in_memory().unwrap();
    run_all(db.connection()).expect("second run should succeed");

    let rows: i64 = db
        .connection()
        .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
        .unwrap();
    assert_eq!(rows, CURRENT_SCHEMA_VERSION as i64);
}

/// Bookmark ids are unique; two rows with the same id must be refused.
#[test]
fn test_bookmark_id_is_unique() {
    let db = Database::open_in_memory().unwrap();
    let conn = db.connection();
    conn.execute("INSERT INTO users (id, email, created_at) VALUES ('u1', 'a@x.test', 0)", [])
        .unwrap();
    let insert = "INSERT INTO bookmarks (id, user_id, title, url, created_at) VALUES ('b1', 'u1', 'T', 'https://x.test', 0)";
    conn.execute(insert, []).unwrap();
    assert!(conn.execute(insert, []).is_err());
}

/// Rows must reference an existing user.
#[test]
fn test_bookmark_requires_existing_user() {
    let db = Database::open_in_memory().unwrap();
    let result = db.connection().execute(
        "INSERT INTO bookmarks (id, user_id, title, url, created_at) VALUES ('b1', 'ghost', 'T', 'https://x.test', 0)",
        [],
    );
    assert!(result.is_err(), "foreign key on user_id should be enforced");
}

#[test]
fn test_data_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("smartmark.db");
    {
        let db = Database::open(&path).unwrap();
        db.connection()
            .execute("INSERT INTO users (id, email, created_at) VALUES ('u1', 'a@x.test', 0)", [])
            .unwrap();
    }

    let db = Database::open(&path).unwrap();
    let email: String = db
        .connection()
        .query_row("SELECT email FROM users WHERE id = 'u1'", [], |row| row.get(0))
        .unwrap();
    assert_eq!(email, "a@x.test");
}
