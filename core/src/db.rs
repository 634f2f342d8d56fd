use std::path::Path;

use anyhow::{Context, Result};
use chrono::Local;
use rusqlite::{Connection, OptionalExtension, params};

use crate::error::StoreError;

/// Browser local storage gives an origin about 5 MiB. The local store keeps
/// the same budget by default.
pub const DEFAULT_QUOTA_BYTES: usize = 5 * 1024 * 1024;

/// Key/value text store backing the local fallback backend.
///
/// Every collection lives under one key as a whole JSON document. Writes that
/// would push the total stored size past the quota fail with
/// [`StoreError::QuotaExceeded`].
pub struct Database {
    conn: Connection,
    quota: Option<usize>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let db = Database {
            conn,
            quota: Some(DEFAULT_QUOTA_BYTES),
        };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database {
            conn,
            quota: Some(DEFAULT_QUOTA_BYTES),
        };
        db.migrate()?;
        Ok(db)
    }

    /// Replace the size budget. `None` disables the check.
    #[must_use]
    pub fn with_quota(mut self, quota: Option<usize>) -> Self {
        self.quota = quota;
        self
    }

    #[must_use]
    pub fn quota(&self) -> Option<usize> {
        self.quota
    }

    fn migrate(&self) -> Result<()> {
        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS kv_store (
                    key TEXT PRIMARY KEY NOT NULL,
                    value TEXT NOT NULL,
                    updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
                );

                PRAGMA user_version = 1;",
            )?;
        }

        Ok(())
    }

    pub fn kv_get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM kv_store WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn kv_set(&self, key: &str, value: &str) -> Result<()> {
        if let Some(quota) = self.quota {
            let others: i64 = self.conn.query_row(
                "SELECT COALESCE(SUM(LENGTH(CAST(key AS BLOB)) + LENGTH(CAST(value AS BLOB))), 0)
                 FROM kv_store WHERE key != ?1",
                params![key],
                |row| row.get(0),
            )?;
            let needed = usize::try_from(others).unwrap_or(0) + key.len() + value.len();
            if needed > quota {
                return Err(StoreError::QuotaExceeded {
                    key: key.to_string(),
                    needed,
                    quota,
                }
                .into());
            }
        }

        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO kv_store (key, value, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, now],
        )?;
        Ok(())
    }
}
