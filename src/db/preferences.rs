//! Per-user preference persistence.
//!
//! Raw SQL with rusqlite against the `preferences` table. Keys are already
//! namespaced by the caller; `user_id` and `name` are stored alongside so
//! rows can be inspected or cleared per user.

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};

/// Repository for integer-valued preferences.
pub struct PreferenceRepository;

impl PreferenceRepository {
    /// Read the value stored under `storage_key`.
    pub fn get(conn: &Connection, storage_key: &str) -> Result<Option<i64>> {
        conn.query_row(
            "SELECT value FROM preferences WHERE storage_key = ?1",
            params![storage_key],
            |row| row.get(0),
        )
        .optional()
        .context("Failed to read preference")
    }

    /// Insert or replace the value stored under `storage_key`.
    pub fn upsert(
        conn: &Connection,
        storage_key: &str,
        user_id: &str,
        name: &str,
        value: i64,
    ) -> Result<()> {
        conn.execute(
            "INSERT INTO preferences (storage_key, user_id, name, value) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(storage_key) DO UPDATE SET value = excluded.value, \
             updated_at = CURRENT_TIMESTAMP",
            params![storage_key, user_id, name, value],
        )
        .context("Failed to write preference")?;
        Ok(())
    }

    /// Delete a single key. Returns true when a row was removed.
    pub fn delete(conn: &Connection, storage_key: &str) -> Result<bool> {
        let deleted = conn
            .execute(
                "DELETE FROM preferences WHERE storage_key = ?1",
                params![storage_key],
            )
            .context("Failed to delete preference")?;
        Ok(deleted > 0)
    }
}
