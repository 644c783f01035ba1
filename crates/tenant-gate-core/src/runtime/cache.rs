// crates/tenant-gate-core/src/runtime/cache.rs
// ============================================================================
// Module: Tenant Gate Cache Layer
// Description: TTL key-value cache backend and read-through wrapper.
// Purpose: Serve cached values, and stale values when the primary fails.
// Dependencies: async-trait, serde, serde_json, tracing, crate::interfaces
// ============================================================================

//! ## Overview
//! [`ReadThroughCache`] wraps any [`CacheStore`]. Entries are written with a
//! backend TTL of `ttl + stale_grace` so they outlive their freshness window:
//! a fresh read re-validates `cached_at + ttl > now` itself, and an entry past
//! that point is only served as a degraded fallback after the primary source
//! fails.
//!
//! ## Invariants
//! - Cache backend failures never fail a read; they count as misses.
//! - Only [`CacheSource::StaleFallback`] reads are marked degraded here.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use tracing::warn;

use crate::core::Clock;
use crate::core::Timestamp;
use crate::interfaces::CacheEntry;
use crate::interfaces::CacheError;
use crate::interfaces::CacheStore;

// ============================================================================
// SECTION: In-Memory Backend
// ============================================================================

/// Cache entry with its backend expiry.
#[derive(Debug, Clone)]
struct StoredEntry {
    /// Cached value.
    entry: CacheEntry,
    /// Time the backend stops returning the entry.
    expires_at: Timestamp,
}

/// In-memory TTL cache; expired entries are evicted on read.
#[derive(Clone)]
pub struct InMemoryCacheStore {
    /// Entries by key.
    entries: Arc<Mutex<HashMap<String, StoredEntry>>>,
    /// Clock used for expiry.
    clock: Arc<dyn Clock>,
    /// When set, every call fails with [`CacheError::Backend`].
    unavailable: Arc<AtomicBool>,
}

impl InMemoryCacheStore {
    /// Creates an empty cache driven by `clock`.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            clock,
            unavailable: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Toggles backend unavailability.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Returns the number of retained entries, expired or not.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] when the backend is unavailable.
    pub fn len(&self) -> Result<usize, CacheError> {
        Ok(self.entries()?.len())
    }

    /// Returns true when no entries are retained.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] when the backend is unavailable.
    pub fn is_empty(&self) -> Result<bool, CacheError> {
        Ok(self.entries()?.is_empty())
    }

    /// Locks the entry map, honoring fault injection.
    fn entries(&self) -> Result<MutexGuard<'_, HashMap<String, StoredEntry>>, CacheError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CacheError::Backend("cache unavailable".to_string()));
        }
        self.entries.lock().map_err(|_| CacheError::Backend("mutex poisoned".to_string()))
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let now = self.clock.now();
        let mut entries = self.entries()?;
        match entries.get(key) {
            Some(stored) if stored.expires_at > now => Ok(Some(stored.entry.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, entry: CacheEntry, ttl_seconds: u64) -> Result<(), CacheError> {
        let ttl = i64::try_from(ttl_seconds).unwrap_or(i64::MAX);
        let expires_at = self.clock.now().plus_seconds(ttl);
        self.entries()?.insert(
            key.to_string(),
            StoredEntry {
                entry,
                expires_at,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries()?.remove(key);
        Ok(())
    }

    async fn delete_by_prefix(&self, prefix: &str) -> Result<u64, CacheError> {
        let mut entries = self.entries()?;
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        Ok(u64::try_from(before - entries.len()).unwrap_or(u64::MAX))
    }
}

// ============================================================================
// SECTION: Read-Through Cache
// ============================================================================

/// Where a cached read was served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
    /// Fresh cache entry.
    CacheHit,
    /// Freshly fetched from the primary source.
    Primary,
    /// Retained entry served after the primary failed.
    StaleFallback,
}

/// Value returned by the read-through cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRead<T> {
    /// Returned value.
    pub value: T,
    /// True when the value was served because the primary failed.
    pub degraded: bool,
    /// Where the value came from.
    pub source: CacheSource,
}

/// Read-through cache over a [`CacheStore`].
#[derive(Clone)]
pub struct ReadThroughCache {
    /// Cache backend.
    backend: Arc<dyn CacheStore>,
    /// Clock used for freshness checks.
    clock: Arc<dyn Clock>,
    /// Freshness window in seconds.
    ttl_seconds: u64,
    /// Extra retention past freshness for stale fallback.
    stale_grace_seconds: u64,
}

impl ReadThroughCache {
    /// Creates a read-through cache.
    #[must_use]
    pub fn new(
        backend: Arc<dyn CacheStore>,
        clock: Arc<dyn Clock>,
        ttl_seconds: u64,
        stale_grace_seconds: u64,
    ) -> Self {
        Self {
            backend,
            clock,
            ttl_seconds,
            stale_grace_seconds,
        }
    }

    /// Returns the freshness window in seconds.
    #[must_use]
    pub const fn ttl_seconds(&self) -> u64 {
        self.ttl_seconds
    }

    /// Returns a fresh entry for `key`, if any.
    pub async fn lookup_fresh<T: DeserializeOwned>(&self, key: &str) -> Option<CacheRead<T>> {
        let entry = self.read_entry(key).await?;
        let ttl = i64::try_from(self.ttl_seconds).unwrap_or(i64::MAX);
        if entry.cached_at.plus_seconds(ttl) <= self.clock.now() {
            return None;
        }
        let value = decode_entry(key, &entry)?;
        Some(CacheRead {
            value,
            degraded: false,
            source: CacheSource::CacheHit,
        })
    }

    /// Returns any retained entry for `key` as a degraded fallback.
    pub async fn lookup_stale<T: DeserializeOwned>(&self, key: &str) -> Option<CacheRead<T>> {
        let entry = self.read_entry(key).await?;
        let value = decode_entry(key, &entry)?;
        Some(CacheRead {
            value,
            degraded: true,
            source: CacheSource::StaleFallback,
        })
    }

    /// Stores `value` under `key`; failures are logged and ignored.
    pub async fn store<T: Serialize>(&self, key: &str, value: &T) {
        let data = match serde_json::to_string(value) {
            Ok(data) => data,
            Err(err) => {
                warn!(key, error = %err, "cache value serialization failed");
                return;
            }
        };
        let entry = CacheEntry {
            data,
            cached_at: self.clock.now(),
        };
        let retention = self.ttl_seconds.saturating_add(self.stale_grace_seconds);
        if let Err(err) = self.backend.set(key, entry, retention).await {
            warn!(key, error = %err, "cache write failed");
        }
    }

    /// Serves a fresh entry, else fetches from the primary and caches it,
    /// else falls back to a retained entry.
    ///
    /// # Errors
    ///
    /// Returns the primary error when the fetch fails and nothing is retained.
    pub async fn get_or_fetch<T, E, F, Fut>(&self, key: &str, fetch: F) -> Result<CacheRead<T>, E>
    where
        T: Serialize + DeserializeOwned,
        E: std::fmt::Display,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(hit) = self.lookup_fresh(key).await {
            return Ok(hit);
        }
        match fetch().await {
            Ok(value) => {
                self.store(key, &value).await;
                Ok(CacheRead {
                    value,
                    degraded: false,
                    source: CacheSource::Primary,
                })
            }
            Err(err) => {
                if let Some(stale) = self.lookup_stale(key).await {
                    warn!(key, error = %err, "primary fetch failed; serving stale cache entry");
                    return Ok(stale);
                }
                Err(err)
            }
        }
    }

    /// Drops one key; failures are logged.
    pub async fn invalidate(&self, key: &str) {
        if let Err(err) = self.backend.delete(key).await {
            warn!(key, error = %err, "cache delete failed");
        }
    }

    /// Drops every key with `prefix`; returns the count removed (0 on failure).
    pub async fn invalidate_prefix(&self, prefix: &str) -> u64 {
        match self.backend.delete_by_prefix(prefix).await {
            Ok(removed) => {
                debug!(prefix, removed, "cache prefix invalidated");
                removed
            }
            Err(err) => {
                warn!(prefix, error = %err, "cache prefix delete failed");
                0
            }
        }
    }

    /// Reads a raw entry, mapping backend failures to a miss.
    async fn read_entry(&self, key: &str) -> Option<CacheEntry> {
        match self.backend.get(key).await {
            Ok(entry) => entry,
            Err(err) => {
                warn!(key, error = %err, "cache read failed; treating as miss");
                None
            }
        }
    }
}

/// Decodes a cached payload, treating malformed data as a miss.
fn decode_entry<T: DeserializeOwned>(key: &str, entry: &CacheEntry) -> Option<T> {
    match serde_json::from_str(&entry.data) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(key, error = %err, "cached value failed to decode; treating as miss");
            None
        }
    }
}
