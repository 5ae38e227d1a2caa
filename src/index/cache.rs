//! SQLite-backed memo store for expensive index queries
//!
//! Entries are keyed by (function, generation, argument fingerprint). Bumping a
//! function's generation makes its old entries unreachable; they are deleted by
//! [`MemoCache::prune_generations`] without touching other functions.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

#[cfg(test)]
use mockall::automock;
use rusqlite::Connection;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::index::error::CacheError;

/// Schema migrations
/// Each version contains a list of SQL statements to execute
const MIGRATIONS: &[&[&str]] = &[
    // v1: lookup of entries by age
    &["CREATE INDEX IF NOT EXISTS idx_memo_stored_at ON memo(stored_at)"],
];

/// Identity of one memoized call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoKey {
    pub function: String,
    pub generation: u32,
    pub fingerprint: String,
}

impl MemoKey {
    /// Build a key whose fingerprint is the SHA-256 of the JSON-encoded arguments
    pub fn new<A: Serialize + ?Sized>(
        function: &str,
        generation: u32,
        args: &A,
    ) -> Result<Self, CacheError> {
        let encoded = serde_json::to_vec(args)?;
        let fingerprint = hex::encode(Sha256::digest(&encoded));
        Ok(Self {
            function: function.to_string(),
            generation,
            fingerprint,
        })
    }
}

/// Trait for storing and retrieving memoized values
#[cfg_attr(test, automock)]
pub trait MemoStore: Send + Sync + 'static {
    /// Get the serialized value stored for a key
    fn get(&self, key: &MemoKey) -> Result<Option<String>, CacheError>;

    /// Store a serialized value, replacing any previous one
    fn put(&self, key: &MemoKey, value: &str) -> Result<(), CacheError>;

    /// Delete entries of `function` written under any other generation
    fn prune_generations(&self, function: &str, current: u32) -> Result<usize, CacheError>;
}

pub struct MemoCache {
    conn: Mutex<Connection>,
}

impl MemoCache {
    pub fn new(db_path: &Path) -> Result<Self, CacheError> {
        info!("Initializing memo cache at {:?}", db_path);

        let conn = Connection::open(db_path)?;

        // Enable WAL mode for better concurrency
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        let cache = Self {
            conn: Mutex::new(conn),
        };

        cache.create_schema()?;
        debug!("Memo cache ready");

        Ok(cache)
    }

    /// Writers hold the connection lock for the whole statement or transaction
    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>, CacheError> {
        self.conn.lock().map_err(|_| CacheError::LockPoisoned)
    }

    fn create_schema(&self) -> Result<(), CacheError> {
        let conn = self.lock_conn()?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS memo (
                function TEXT NOT NULL,
                generation INTEGER NOT NULL,
                fingerprint TEXT NOT NULL,
                value TEXT NOT NULL,
                stored_at INTEGER NOT NULL,
                PRIMARY KEY (function, generation, fingerprint)
            )
            "#,
            [],
        )?;

        Self::apply_migrations(&conn)?;
        Ok(())
    }

    /// Apply pending migrations based on user_version pragma
    fn apply_migrations(conn: &Connection) -> Result<(), CacheError> {
        let current_version: i32 =
            conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

        for (i, statements) in MIGRATIONS.iter().enumerate() {
            let version = (i + 1) as i32;
            if version > current_version {
                for sql in *statements {
                    conn.execute(sql, [])?;
                }
                debug!("Applied migration v{}", version);
            }
        }

        let target_version = MIGRATIONS.len() as i32;
        if target_version > current_version {
            conn.pragma_update(None, "user_version", target_version)?;
        }

        Ok(())
    }

    /// Number of entries stored for a function across all generations
    pub fn entry_count(&self, function: &str) -> Result<usize, CacheError> {
        let conn = self.lock_conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM memo WHERE function = ?1",
            [function],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

impl MemoStore for MemoCache {
    fn get(&self, key: &MemoKey) -> Result<Option<String>, CacheError> {
        let conn = self.lock_conn()?;
        let result = conn.query_row(
            r#"
            SELECT value FROM memo
            WHERE function = ?1 AND generation = ?2 AND fingerprint = ?3
            "#,
            (&key.function, key.generation, &key.fingerprint),
            |row| row.get(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn put(&self, key: &MemoKey, value: &str) -> Result<(), CacheError> {
        let now = chrono::Utc::now().timestamp_millis();
        let conn = self.lock_conn()?;

        conn.execute(
            r#"
            INSERT INTO memo (function, generation, fingerprint, value, stored_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(function, generation, fingerprint)
            DO UPDATE SET value = excluded.value, stored_at = excluded.stored_at
            "#,
            (&key.function, key.generation, &key.fingerprint, value, now),
        )?;

        Ok(())
    }

    fn prune_generations(&self, function: &str, current: u32) -> Result<usize, CacheError> {
        let conn = self.lock_conn()?;
        let deleted = conn.execute(
            "DELETE FROM memo WHERE function = ?1 AND generation != ?2",
            (function, current),
        )?;

        if deleted > 0 {
            info!(
                "Pruned {} stale entries of {} (current generation {})",
                deleted, function, current
            );
        }
        Ok(deleted)
    }
}
