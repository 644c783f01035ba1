// crates/tenant-gate-store-sqlite/src/lib.rs
// ============================================================================
// Module: Tenant Gate SQLite Store
// Description: SQLite-backed control plane store and cache backend.
// Purpose: Persist tenancy, billing, usage, flags, and overrides durably.
// Dependencies: tenant-gate-core, rusqlite, serde, serde_json, tokio
// ============================================================================

//! ## Overview
//! [`SqliteStore`] implements every repository contract from
//! `tenant-gate-core`; [`SqliteCacheStore`] implements the cache contract
//! over a `cache_entries` table in the same schema.

pub mod cache;
pub mod store;

pub use cache::SqliteCacheStore;
pub use store::DEFAULT_BUSY_TIMEOUT_MS;
pub use store::SCHEMA_VERSION;
pub use store::SqliteStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteStoreMode;
pub use store::SqliteSyncMode;
