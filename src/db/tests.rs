use super::init::{migrate, open_db};
use super::preferences::PreferenceRepository;
use anyhow::Result;
use rusqlite::Connection;

fn setup_test_db() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    migrate(&conn)?;
    Ok(conn)
}

fn rows_for_user(conn: &Connection, user_id: &str) -> Result<i64> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM preferences WHERE user_id = ?1",
        [user_id],
        |row| row.get(0),
    )?)
}

#[test]
fn test_migrate_creates_table() {
    let conn = Connection::open_in_memory().unwrap();
    migrate(&conn).unwrap();

    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='preferences'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(count, 1);
}

#[test]
fn test_migrate_is_idempotent() {
    let conn = setup_test_db().unwrap();
    migrate(&conn).unwrap();
}

#[test]
fn test_get_missing_key() {
    let conn = setup_test_db().unwrap();
    let value = PreferenceRepository::get(&conn, "history_last_visit_nobody").unwrap();
    assert!(value.is_none());
}

#[test]
fn test_upsert_and_get() {
    let conn = setup_test_db().unwrap();

    PreferenceRepository::upsert(
        &conn,
        "history_last_visit_alice",
        "alice",
        "history_last_visit",
        1_700_000_000_000,
    )
    .unwrap();
    assert_eq!(
        PreferenceRepository::get(&conn, "history_last_visit_alice").unwrap(),
        Some(1_700_000_000_000)
    );

    // Overwrite keeps a single row
    PreferenceRepository::upsert(
        &conn,
        "history_last_visit_alice",
        "alice",
        "history_last_visit",
        1_700_000_500_000,
    )
    .unwrap();
    assert_eq!(
        PreferenceRepository::get(&conn, "history_last_visit_alice").unwrap(),
        Some(1_700_000_500_000)
    );
    assert_eq!(rows_for_user(&conn, "alice").unwrap(), 1);
}

#[test]
fn test_users_do_not_share_rows() {
    let conn = setup_test_db().unwrap();

    PreferenceRepository::upsert(&conn, "history_last_visit_a", "a", "history_last_visit", 10)
        .unwrap();
    PreferenceRepository::upsert(&conn, "history_last_visit_b", "b", "history_last_visit", 20)
        .unwrap();

    assert_eq!(PreferenceRepository::get(&conn, "history_last_visit_a").unwrap(), Some(10));
    assert_eq!(PreferenceRepository::get(&conn, "history_last_visit_b").unwrap(), Some(20));
    assert_eq!(rows_for_user(&conn, "a").unwrap(), 1);
}

#[test]
fn test_delete() {
    let conn = setup_test_db().unwrap();
    PreferenceRepository::upsert(&conn, "history_last_visit_a", "a", "history_last_visit", 10)
        .unwrap();

    assert!(PreferenceRepository::delete(&conn, "history_last_visit_a").unwrap());
    assert!(!PreferenceRepository::delete(&conn, "history_last_visit_a").unwrap());
    assert!(PreferenceRepository::get(&conn, "history_last_visit_a").unwrap().is_none());
}

#[test]
fn test_open_db_persists_to_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("maki.db");

    {
        let conn = open_db(&path).unwrap();
        PreferenceRepository::upsert(&conn, "history_last_visit_a", "a", "history_last_visit", 42)
            .unwrap();
    }

    let conn = open_db(&path).unwrap();
    assert_eq!(PreferenceRepository::get(&conn, "history_last_visit_a").unwrap(), Some(42));
}
