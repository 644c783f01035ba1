// crates/tenant-gate-store-sqlite/src/cache.rs
// ============================================================================
// Module: SQLite Cache Store
// Description: CacheStore backed by the cache_entries table.
// Purpose: Keep decision cache entries across process restarts.
// Dependencies: tenant-gate-core, rusqlite, tokio
// ============================================================================

//! ## Overview
//! Entries carry an absolute `expires_at`; reads delete expired rows and
//! report a miss, matching the in-memory backend.

use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::params;
use tenant_gate_core::CacheEntry;
use tenant_gate_core::CacheError;
use tenant_gate_core::CacheStore;
use tenant_gate_core::Clock;
use tenant_gate_core::Timestamp;

use crate::store::SqliteStoreConfig;
use crate::store::SqliteStoreError;
use crate::store::db_error;
use crate::store::open_store_connection;
use crate::store::run_blocking;

/// `SQLite`-backed TTL cache.
#[derive(Clone)]
pub struct SqliteCacheStore {
    /// Shared connection guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
    /// Clock used for expiry.
    clock: Arc<dyn Clock>,
}

impl SqliteCacheStore {
    /// Opens (or creates) the cache database.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened.
    pub fn new(config: &SqliteStoreConfig, clock: Arc<dyn Clock>) -> Result<Self, SqliteStoreError> {
        let connection = open_store_connection(config)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
            clock,
        })
    }

    /// Deletes every expired entry; returns the count removed.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the delete fails.
    pub async fn purge_expired(&self) -> Result<u64, SqliteStoreError> {
        let now = self.clock.now().as_unix_millis();
        run_blocking(Arc::clone(&self.connection), move |conn| {
            let changes = conn
                .execute("DELETE FROM cache_entries WHERE expires_at <= ?1", params![now])
                .map_err(db_error)?;
            Ok(u64::try_from(changes).unwrap_or(u64::MAX))
        })
        .await
    }
}

impl From<SqliteStoreError> for CacheError {
    fn from(error: SqliteStoreError) -> Self {
        Self::Backend(error.to_string())
    }
}

#[async_trait]
impl CacheStore for SqliteCacheStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let key = key.to_string();
        let now = self.clock.now().as_unix_millis();
        let entry = run_blocking(Arc::clone(&self.connection), move |conn| {
            let row: Option<(String, i64, i64)> = conn
                .query_row(
                    "SELECT data, cached_at, expires_at FROM cache_entries WHERE key = ?1",
                    params![key],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .optional()
                .map_err(db_error)?;
            match row {
                Some((data, cached_at, expires_at)) if expires_at > now => Ok(Some(CacheEntry {
                    data,
                    cached_at: Timestamp::from_unix_millis(cached_at),
                })),
                Some(_) => {
                    conn.execute("DELETE FROM cache_entries WHERE key = ?1", params![key])
                        .map_err(db_error)?;
                    Ok(None)
                }
                None => Ok(None),
            }
        })
        .await?;
        Ok(entry)
    }

    async fn set(&self, key: &str, entry: CacheEntry, ttl_seconds: u64) -> Result<(), CacheError> {
        let key = key.to_string();
        let ttl = i64::try_from(ttl_seconds).unwrap_or(i64::MAX);
        let expires_at = self.clock.now().plus_seconds(ttl).as_unix_millis();
        run_blocking(Arc::clone(&self.connection), move |conn| {
            conn.execute(
                "INSERT INTO cache_entries (key, data, cached_at, expires_at) VALUES (?1, ?2, ?3, \
                 ?4) ON CONFLICT(key) DO UPDATE SET data = excluded.data, cached_at = \
                 excluded.cached_at, expires_at = excluded.expires_at",
                params![key, entry.data, entry.cached_at.as_unix_millis(), expires_at],
            )
            .map_err(db_error)?;
            Ok(())
        })
        .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let key = key.to_string();
        run_blocking(Arc::clone(&self.connection), move |conn| {
            conn.execute("DELETE FROM cache_entries WHERE key = ?1", params![key]).map_err(db_error)?;
            Ok(())
        })
        .await?;
        Ok(())
    }

    async fn delete_by_prefix(&self, prefix: &str) -> Result<u64, CacheError> {
        let prefix = prefix.to_string();
        let removed = run_blocking(Arc::clone(&self.connection), move |conn| {
            // substr comparison avoids LIKE wildcard escaping.
            let changes = conn
                .execute(
                    "DELETE FROM cache_entries WHERE substr(key, 1, length(?1)) = ?1",
                    params![prefix],
                )
                .map_err(db_error)?;
            Ok(u64::try_from(changes).unwrap_or(u64::MAX))
        })
        .await?;
        Ok(removed)
    }
}
