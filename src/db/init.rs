use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::Path;

pub fn init_db() -> Result<Connection> {
    let db_path = crate::global::db_file()?;
    open_db(&db_path)
}

pub fn open_db(db_path: &Path) -> Result<Connection> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }

    let conn = Connection::open(db_path).context("Failed to open database connection")?;

    migrate(&conn)?;

    Ok(conn)
}

pub fn migrate(conn: &Connection) -> Result<()> {
    // One row per namespaced key, e.g. `history_last_visit_<user id>`.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS preferences (
            storage_key TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            name TEXT NOT NULL,
            value INTEGER NOT NULL,
            updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )
    .context("Failed to create preferences table")?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_preferences_user_id ON preferences(user_id)",
        [],
    )
    .context("Failed to create index on user_id")?;

    Ok(())
}
