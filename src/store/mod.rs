//! Durable per-user timestamp storage.
//!
//! Every value is scoped to a user id, so switching accounts on the same
//! machine never reads or overwrites another user's state.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;

use crate::db::{self, PreferenceRepository};

/// Key under which the last visit to the conversation history is stored.
pub const HISTORY_LAST_VISIT: &str = "history_last_visit";

/// Identity of an authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Namespaced key as persisted, e.g. `history_last_visit_user_123`.
pub fn storage_key(user: &UserId, name: &str) -> String {
    format!("{}_{}", name, user)
}

/// Typed get/set of epoch-millisecond timestamps per user.
#[async_trait]
pub trait TimestampStore: Send + Sync {
    async fn get(&self, user: &UserId, name: &str) -> Result<Option<i64>>;

    async fn set(&self, user: &UserId, name: &str, value: i64) -> Result<()>;

    /// Returns true when a value existed.
    async fn remove(&self, user: &UserId, name: &str) -> Result<bool>;
}

/// SQLite-backed store living in the application data directory.
pub struct SqliteTimestampStore {
    conn: Mutex<Connection>,
}

impl SqliteTimestampStore {
    /// Open the default database under the data directory.
    pub fn open_default() -> Result<Self> {
        Ok(Self::from_connection(db::init_db()?))
    }

    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::from_connection(db::open_db(path)?))
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        db::migrate(&conn)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| anyhow!("Timestamp store lock poisoned"))?;
        f(&conn)
    }
}

#[async_trait]
impl TimestampStore for SqliteTimestampStore {
    async fn get(&self, user: &UserId, name: &str) -> Result<Option<i64>> {
        let key = storage_key(user, name);
        self.with_conn(|conn| PreferenceRepository::get(conn, &key))
    }

    async fn set(&self, user: &UserId, name: &str, value: i64) -> Result<()> {
        let key = storage_key(user, name);
        debug!("Persisting {} = {}", key, value);
        self.with_conn(|conn| PreferenceRepository::upsert(conn, &key, user.as_str(), name, value))
    }

    async fn remove(&self, user: &UserId, name: &str) -> Result<bool> {
        let key = storage_key(user, name);
        self.with_conn(|conn| PreferenceRepository::delete(conn, &key))
    }
}

/// Process-local store, used when the database cannot be opened.
#[derive(Default)]
pub struct MemoryTimestampStore {
    values: Mutex<HashMap<String, i64>>,
}

impl MemoryTimestampStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_values<T>(&self, f: impl FnOnce(&mut HashMap<String, i64>) -> T) -> Result<T> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| anyhow!("Timestamp store lock poisoned"))?;
        Ok(f(&mut values))
    }
}

#[async_trait]
impl TimestampStore for MemoryTimestampStore {
    async fn get(&self, user: &UserId, name: &str) -> Result<Option<i64>> {
        let key = storage_key(user, name);
        self.with_values(|values| values.get(&key).copied())
    }

    async fn set(&self, user: &UserId, name: &str, value: i64) -> Result<()> {
        let key = storage_key(user, name);
        self.with_values(|values| {
            values.insert(key, value);
        })
    }

    async fn remove(&self, user: &UserId, name: &str) -> Result<bool> {
        let key = storage_key(user, name);
        self.with_values(|values| values.remove(&key).is_some())
    }
}
