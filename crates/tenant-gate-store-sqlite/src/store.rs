// crates/tenant-gate-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Control Plane Store
// Description: Durable ControlPlaneStore backed by SQLite WAL.
// Purpose: Persist tenancy, billing, usage, flag, and override rows.
// Dependencies: tenant-gate-core, rusqlite, serde, serde_json, tokio, tracing
// ============================================================================

//! ## Overview
//! [`SqliteStore`] implements every repository contract of
//! `tenant-gate-core` over one schema-versioned `SQLite` database. The
//! connection is serialized through a mutex and every call runs on the
//! blocking pool so the async executor is never stalled.
//!
//! JSON-encoded columns (API key scopes, flag targeting lists, override
//! values) are encoded and decoded only by the boundary functions at the
//! bottom of this module. Rows that fail to decode surface as
//! [`SqliteStoreError::Corrupt`]; the store never substitutes defaults.
//!
//! ## Invariants
//! - `usage_events.idempotency_key` is unique; a duplicate insert reports
//!   [`InsertOutcome::Conflict`] and leaves the ledger untouched.
//! - `api_keys.key_hash`, `tenants.name`, `subscriptions.tenant_id`, and
//!   `feature_flags.name` are unique.
//! - All SQL is parameterized.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::Connection;
use rusqlite::ErrorCode;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::Row;
use rusqlite::params;
use serde::Deserialize;
use tenant_gate_core::AdminOverride;
use tenant_gate_core::ApiKey;
use tenant_gate_core::ApiKeyId;
use tenant_gate_core::ApiKeyRepository;
use tenant_gate_core::ApiKeyStatus;
use tenant_gate_core::FeatureFlag;
use tenant_gate_core::FeatureFlagId;
use tenant_gate_core::FeatureFlagRepository;
use tenant_gate_core::IdempotencyKey;
use tenant_gate_core::InsertOutcome;
use tenant_gate_core::MembershipRepository;
use tenant_gate_core::OverrideEffect;
use tenant_gate_core::OverrideId;
use tenant_gate_core::OverrideRepository;
use tenant_gate_core::QuotaPeriod;
use tenant_gate_core::Role;
use tenant_gate_core::ServiceName;
use tenant_gate_core::Session;
use tenant_gate_core::SessionId;
use tenant_gate_core::SessionRepository;
use tenant_gate_core::StoreError;
use tenant_gate_core::Subscription;
use tenant_gate_core::SubscriptionId;
use tenant_gate_core::SubscriptionItem;
use tenant_gate_core::SubscriptionRepository;
use tenant_gate_core::SubscriptionStatus;
use tenant_gate_core::Tenant;
use tenant_gate_core::TenantId;
use tenant_gate_core::TenantRepository;
use tenant_gate_core::TenantUser;
use tenant_gate_core::Tier;
use tenant_gate_core::Timestamp;
use tenant_gate_core::UsageEvent;
use tenant_gate_core::UsageEventId;
use tenant_gate_core::UsagePeriod;
use tenant_gate_core::UsageRepository;
use tenant_gate_core::UsageScope;
use tenant_gate_core::UsageSummary;
use tenant_gate_core::UserId;
use thiserror::Error;
use tracing::info;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store.
pub const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;

/// Table definitions for schema version 1.
const SCHEMA_V1: &str = "
CREATE TABLE IF NOT EXISTS tenants (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    global_quota_limit INTEGER
);
CREATE TABLE IF NOT EXISTS tenant_users (
    tenant_id TEXT NOT NULL,
    user_id TEXT NOT NULL,
    role TEXT NOT NULL,
    PRIMARY KEY (tenant_id, user_id)
);
CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    tenant_id TEXT NOT NULL,
    service TEXT NOT NULL,
    expires_at INTEGER NOT NULL,
    revoked_at INTEGER
);
CREATE TABLE IF NOT EXISTS api_keys (
    id TEXT PRIMARY KEY,
    tenant_id TEXT NOT NULL,
    key_hash TEXT NOT NULL UNIQUE,
    key_prefix TEXT NOT NULL,
    scopes_json TEXT NOT NULL,
    quota_limit INTEGER,
    quota_period TEXT NOT NULL,
    status TEXT NOT NULL,
    expires_at INTEGER
);
CREATE TABLE IF NOT EXISTS subscriptions (
    id TEXT PRIMARY KEY,
    tenant_id TEXT NOT NULL UNIQUE,
    tier TEXT NOT NULL,
    status TEXT NOT NULL,
    current_period_end INTEGER
);
CREATE TABLE IF NOT EXISTS subscription_items (
    subscription_id TEXT NOT NULL,
    service TEXT NOT NULL,
    enabled INTEGER NOT NULL,
    PRIMARY KEY (subscription_id, service)
);
CREATE TABLE IF NOT EXISTS usage_events (
    id TEXT PRIMARY KEY,
    tenant_id TEXT NOT NULL,
    api_key_id TEXT,
    user_id TEXT,
    service TEXT NOT NULL,
    action TEXT NOT NULL,
    quantity INTEGER NOT NULL,
    period TEXT NOT NULL,
    idempotency_key TEXT NOT NULL UNIQUE,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_usage_events_tenant ON usage_events (tenant_id, created_at);
CREATE INDEX IF NOT EXISTS idx_usage_events_api_key ON usage_events (api_key_id, created_at);
CREATE TABLE IF NOT EXISTS feature_flags (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    description TEXT,
    enabled_tiers_json TEXT NOT NULL,
    enabled_tenants_json TEXT NOT NULL,
    rollout_percentage INTEGER NOT NULL,
    active INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS admin_overrides (
    id TEXT PRIMARY KEY,
    tenant_id TEXT NOT NULL,
    override_type TEXT NOT NULL,
    value_json TEXT NOT NULL,
    reason TEXT,
    expires_at INTEGER
);
CREATE INDEX IF NOT EXISTS idx_admin_overrides_tenant ON admin_overrides (tenant_id);
CREATE TABLE IF NOT EXISTS cache_entries (
    key TEXT PRIMARY KEY,
    data TEXT NOT NULL,
    cached_at INTEGER NOT NULL,
    expires_at INTEGER NOT NULL
);
";

/// Column list shared by API key queries.
const API_KEY_COLUMNS: &str = "id, tenant_id, key_hash, key_prefix, scopes_json, quota_limit, \
                               quota_period, status, expires_at";
/// Column list shared by usage event queries.
const USAGE_COLUMNS: &str = "id, tenant_id, api_key_id, user_id, service, action, quantity, \
                             period, idempotency_key, created_at";
/// Column list shared by override queries.
const OVERRIDE_COLUMNS: &str = "id, tenant_id, override_type, value_json, reason, expires_at";

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `journal_mode` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl SqliteStoreMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `synchronous` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` control plane store.
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory).
/// - `busy_timeout_ms` is interpreted as milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl SqliteStoreConfig {
    /// Creates a config for `path` with default pragmas.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }

    /// Validates path safety limits without touching the database.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Invalid`] for empty, overlong, or
    /// directory paths.
    pub fn validate(&self) -> Result<(), SqliteStoreError> {
        validate_store_path(&self.path)
    }
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
///
/// # Invariants
/// - Error messages avoid embedding secrets or raw payloads.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Stored row failed to decode.
    #[error("sqlite store corruption: {0}")]
    Corrupt(String),
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid input or constraint violation.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) => Self::Io(message),
            SqliteStoreError::Db(message) => Self::Store(message),
            SqliteStoreError::Corrupt(message) => Self::Corrupt(message),
            SqliteStoreError::VersionMismatch(message) => {
                Self::Store(format!("schema version mismatch: {message}"))
            }
            SqliteStoreError::Invalid(message) => Self::Invalid(message),
        }
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed control plane store.
///
/// # Invariants
/// - `SQLite` connection access is serialized through a mutex.
/// - Connection work runs on the blocking thread pool.
#[derive(Clone)]
pub struct SqliteStore {
    /// Store configuration.
    config: SqliteStoreConfig,
    /// Shared connection guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Opens (or creates) the store and verifies its schema version.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the path is invalid, the database
    /// cannot be opened, or the schema version is unsupported.
    pub fn new(config: SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        let connection = open_store_connection(&config)?;
        info!(path = %config.path.display(), "sqlite control plane store opened");
        Ok(Self {
            config,
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Returns the store configuration.
    #[must_use]
    pub const fn config(&self) -> &SqliteStoreConfig {
        &self.config
    }

    /// Runs `op` against the connection on the blocking pool.
    async fn run<T, F>(&self, op: F) -> Result<T, SqliteStoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, SqliteStoreError> + Send + 'static,
    {
        run_blocking(Arc::clone(&self.connection), op).await
    }
}

/// Runs `op` against a shared connection on the blocking pool.
pub(crate) async fn run_blocking<T, F>(
    connection: Arc<Mutex<Connection>>,
    op: F,
) -> Result<T, SqliteStoreError>
where
    T: Send + 'static,
    F: FnOnce(&mut Connection) -> Result<T, SqliteStoreError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut guard =
            connection.lock().map_err(|_| SqliteStoreError::Db("mutex poisoned".to_string()))?;
        op(&mut guard)
    })
    .await
    .map_err(|err| SqliteStoreError::Io(format!("sqlite task join failed: {err}")))?
}

// ============================================================================
// SECTION: Repositories
// ============================================================================

#[async_trait]
impl TenantRepository for SqliteStore {
    async fn get_tenant(&self, tenant_id: &TenantId) -> Result<Option<Tenant>, StoreError> {
        let id = tenant_id.to_string();
        let tenant = self
            .run(move |conn| {
                let row = conn
                    .query_row(
                        "SELECT id, name, global_quota_limit FROM tenants WHERE id = ?1",
                        params![id],
                        |row| {
                            Ok((
                                row.get::<_, String>(0)?,
                                row.get::<_, String>(1)?,
                                row.get::<_, Option<i64>>(2)?,
                            ))
                        },
                    )
                    .optional()
                    .map_err(db_error)?;
                row.map(|(id, name, limit)| decode_tenant(id, name, limit)).transpose()
            })
            .await?;
        Ok(tenant)
    }

    async fn upsert_tenant(&self, tenant: &Tenant) -> Result<(), StoreError> {
        let tenant = tenant.clone();
        self.run(move |conn| {
            let limit = tenant.global_quota_limit.map(|value| encode_u64(value, "global_quota_limit")).transpose()?;
            conn.execute(
                "INSERT INTO tenants (id, name, global_quota_limit) VALUES (?1, ?2, ?3) ON \
                 CONFLICT(id) DO UPDATE SET name = excluded.name, global_quota_limit = \
                 excluded.global_quota_limit",
                params![tenant.id.as_str(), tenant.name, limit],
            )
            .map_err(db_error)?;
            Ok(())
        })
        .await?;
        Ok(())
    }
}

#[async_trait]
impl MembershipRepository for SqliteStore {
    async fn get_membership(
        &self,
        tenant_id: &TenantId,
        user_id: &UserId,
    ) -> Result<Option<TenantUser>, StoreError> {
        let tenant = tenant_id.to_string();
        let user = user_id.to_string();
        let membership = self
            .run(move |conn| {
                let role: Option<String> = conn
                    .query_row(
                        "SELECT role FROM tenant_users WHERE tenant_id = ?1 AND user_id = ?2",
                        params![tenant, user],
                        |row| row.get(0),
                    )
                    .optional()
                    .map_err(db_error)?;
                role.map(|role| {
                    decode_role(&role).map(|role| TenantUser {
                        tenant_id: TenantId::new(tenant),
                        user_id: UserId::new(user),
                        role,
                    })
                })
                .transpose()
            })
            .await?;
        Ok(membership)
    }

    async fn upsert_membership(&self, membership: &TenantUser) -> Result<(), StoreError> {
        let membership = membership.clone();
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO tenant_users (tenant_id, user_id, role) VALUES (?1, ?2, ?3) ON \
                 CONFLICT(tenant_id, user_id) DO UPDATE SET role = excluded.role",
                params![
                    membership.tenant_id.as_str(),
                    membership.user_id.as_str(),
                    membership.role.as_str()
                ],
            )
            .map_err(db_error)?;
            Ok(())
        })
        .await?;
        Ok(())
    }

    async fn delete_membership(
        &self,
        tenant_id: &TenantId,
        user_id: &UserId,
    ) -> Result<bool, StoreError> {
        let tenant = tenant_id.to_string();
        let user = user_id.to_string();
        let deleted = self
            .run(move |conn| {
                let changes = conn
                    .execute(
                        "DELETE FROM tenant_users WHERE tenant_id = ?1 AND user_id = ?2",
                        params![tenant, user],
                    )
                    .map_err(db_error)?;
                Ok(changes > 0)
            })
            .await?;
        Ok(deleted)
    }

    async fn count_tenant_owners(&self, tenant_id: &TenantId) -> Result<u64, StoreError> {
        let tenant = tenant_id.to_string();
        let count = self
            .run(move |conn| {
                let count: i64 = conn
                    .query_row(
                        "SELECT COUNT(*) FROM tenant_users WHERE tenant_id = ?1 AND role = ?2",
                        params![tenant, Role::Owner.as_str()],
                        |row| row.get(0),
                    )
                    .map_err(db_error)?;
                decode_u64(count, "owner count")
            })
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl SessionRepository for SqliteStore {
    async fn get_session(&self, session_id: &SessionId) -> Result<Option<Session>, StoreError> {
        let id = session_id.to_string();
        let session = self
            .run(move |conn| {
                conn.query_row(
                    "SELECT id, user_id, tenant_id, service, expires_at, revoked_at FROM sessions \
                     WHERE id = ?1",
                    params![id],
                    |row| {
                        Ok(Session {
                            id: SessionId::new(row.get::<_, String>(0)?),
                            user_id: UserId::new(row.get::<_, String>(1)?),
                            tenant_id: TenantId::new(row.get::<_, String>(2)?),
                            service: ServiceName::new(row.get::<_, String>(3)?),
                            expires_at: Timestamp::from_unix_millis(row.get(4)?),
                            revoked_at: row.get::<_, Option<i64>>(5)?.map(Timestamp::from_unix_millis),
                        })
                    },
                )
                .optional()
                .map_err(db_error)
            })
            .await?;
        Ok(session)
    }

    async fn upsert_session(&self, session: &Session) -> Result<(), StoreError> {
        let session = session.clone();
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO sessions (id, user_id, tenant_id, service, expires_at, revoked_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6) ON CONFLICT(id) DO UPDATE SET user_id = \
                 excluded.user_id, tenant_id = excluded.tenant_id, service = excluded.service, \
                 expires_at = excluded.expires_at, revoked_at = excluded.revoked_at",
                params![
                    session.id.as_str(),
                    session.user_id.as_str(),
                    session.tenant_id.as_str(),
                    session.service.as_str(),
                    session.expires_at.as_unix_millis(),
                    session.revoked_at.map(Timestamp::as_unix_millis),
                ],
            )
            .map_err(db_error)?;
            Ok(())
        })
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ApiKeyRepository for SqliteStore {
    async fn get_api_key(&self, api_key_id: &ApiKeyId) -> Result<Option<ApiKey>, StoreError> {
        let id = api_key_id.to_string();
        let key = self
            .run(move |conn| {
                let sql = format!("SELECT {API_KEY_COLUMNS} FROM api_keys WHERE id = ?1");
                let row = conn.query_row(&sql, params![id], read_api_key_row).optional().map_err(db_error)?;
                row.map(decode_api_key).transpose()
            })
            .await?;
        Ok(key)
    }

    async fn find_api_key_by_hash(&self, key_hash: &str) -> Result<Option<ApiKey>, StoreError> {
        let hash = key_hash.to_string();
        let key = self
            .run(move |conn| {
                let sql = format!("SELECT {API_KEY_COLUMNS} FROM api_keys WHERE key_hash = ?1");
                let row =
                    conn.query_row(&sql, params![hash], read_api_key_row).optional().map_err(db_error)?;
                row.map(decode_api_key).transpose()
            })
            .await?;
        Ok(key)
    }

    async fn insert_api_key(&self, api_key: &ApiKey) -> Result<(), StoreError> {
        let key = api_key.clone();
        self.run(move |conn| {
            let scopes = encode_json(&key.scopes, "scopes")?;
            let limit = key.quota_limit.map(|value| encode_u64(value, "quota_limit")).transpose()?;
            conn.execute(
                "INSERT INTO api_keys (id, tenant_id, key_hash, key_prefix, scopes_json, \
                 quota_limit, quota_period, status, expires_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, \
                 ?7, ?8, ?9)",
                params![
                    key.id.as_str(),
                    key.tenant_id.as_str(),
                    key.key_hash,
                    key.key_prefix,
                    scopes,
                    limit,
                    key.quota_period.as_str(),
                    key.status.as_str(),
                    key.expires_at.map(Timestamp::as_unix_millis),
                ],
            )
            .map_err(db_error)?;
            Ok(())
        })
        .await?;
        Ok(())
    }

    async fn revoke_api_key(&self, api_key_id: &ApiKeyId) -> Result<bool, StoreError> {
        let id = api_key_id.to_string();
        let revoked = self
            .run(move |conn| {
                let changes = conn
                    .execute(
                        "UPDATE api_keys SET status = ?1 WHERE id = ?2",
                        params![ApiKeyStatus::Revoked.as_str(), id],
                    )
                    .map_err(db_error)?;
                Ok(changes > 0)
            })
            .await?;
        Ok(revoked)
    }
}

#[async_trait]
impl SubscriptionRepository for SqliteStore {
    async fn get_subscription_for_tenant(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Option<Subscription>, StoreError> {
        let tenant = tenant_id.to_string();
        let subscription = self
            .run(move |conn| {
                let row = conn
                    .query_row(
                        "SELECT id, tenant_id, tier, status, current_period_end FROM \
                         subscriptions WHERE tenant_id = ?1",
                        params![tenant],
                        |row| {
                            Ok((
                                row.get::<_, String>(0)?,
                                row.get::<_, String>(1)?,
                                row.get::<_, String>(2)?,
                                row.get::<_, String>(3)?,
                                row.get::<_, Option<i64>>(4)?,
                            ))
                        },
                    )
                    .optional()
                    .map_err(db_error)?;
                row.map(decode_subscription).transpose()
            })
            .await?;
        Ok(subscription)
    }

    async fn upsert_subscription(&self, subscription: &Subscription) -> Result<(), StoreError> {
        let subscription = subscription.clone();
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO subscriptions (id, tenant_id, tier, status, current_period_end) \
                 VALUES (?1, ?2, ?3, ?4, ?5) ON CONFLICT(tenant_id) DO UPDATE SET id = \
                 excluded.id, tier = excluded.tier, status = excluded.status, \
                 current_period_end = excluded.current_period_end",
                params![
                    subscription.id.as_str(),
                    subscription.tenant_id.as_str(),
                    subscription.tier.as_str(),
                    subscription.status.as_str(),
                    subscription.current_period_end.map(Timestamp::as_unix_millis),
                ],
            )
            .map_err(db_error)?;
            Ok(())
        })
        .await?;
        Ok(())
    }

    async fn get_subscription_item(
        &self,
        subscription_id: &SubscriptionId,
        service: &ServiceName,
    ) -> Result<Option<SubscriptionItem>, StoreError> {
        let subscription = subscription_id.to_string();
        let service = service.to_string();
        let item = self
            .run(move |conn| {
                let enabled: Option<bool> = conn
                    .query_row(
                        "SELECT enabled FROM subscription_items WHERE subscription_id = ?1 AND \
                         service = ?2",
                        params![subscription, service],
                        |row| row.get(0),
                    )
                    .optional()
                    .map_err(db_error)?;
                Ok(enabled.map(|enabled| SubscriptionItem {
                    subscription_id: SubscriptionId::new(subscription),
                    service: ServiceName::new(service),
                    enabled,
                }))
            })
            .await?;
        Ok(item)
    }

    async fn upsert_subscription_item(&self, item: &SubscriptionItem) -> Result<(), StoreError> {
        let item = item.clone();
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO subscription_items (subscription_id, service, enabled) VALUES (?1, \
                 ?2, ?3) ON CONFLICT(subscription_id, service) DO UPDATE SET enabled = \
                 excluded.enabled",
                params![item.subscription_id.as_str(), item.service.as_str(), item.enabled],
            )
            .map_err(db_error)?;
            Ok(())
        })
        .await?;
        Ok(())
    }
}

#[async_trait]
impl UsageRepository for SqliteStore {
    async fn find_usage_by_idempotency_key(
        &self,
        key: &IdempotencyKey,
    ) -> Result<Option<UsageEvent>, StoreError> {
        let key = key.to_string();
        let event = self
            .run(move |conn| {
                let sql = format!("SELECT {USAGE_COLUMNS} FROM usage_events WHERE idempotency_key = ?1");
                let row = conn.query_row(&sql, params![key], read_usage_row).optional().map_err(db_error)?;
                row.map(decode_usage_event).transpose()
            })
            .await?;
        Ok(event)
    }

    async fn insert_usage_event(&self, event: &UsageEvent) -> Result<InsertOutcome, StoreError> {
        let event = event.clone();
        let outcome = self
            .run(move |conn| {
                let quantity = encode_u64(event.quantity, "quantity")?;
                let changes = conn
                    .execute(
                        "INSERT INTO usage_events (id, tenant_id, api_key_id, user_id, service, \
                         action, quantity, period, idempotency_key, created_at) VALUES (?1, ?2, \
                         ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10) ON CONFLICT(idempotency_key) DO NOTHING",
                        params![
                            event.id.as_str(),
                            event.tenant_id.as_str(),
                            event.api_key_id.as_ref().map(ApiKeyId::as_str),
                            event.user_id.as_ref().map(UserId::as_str),
                            event.service.as_str(),
                            event.action,
                            quantity,
                            event.period.label(),
                            event.idempotency_key.as_str(),
                            event.created_at.as_unix_millis(),
                        ],
                    )
                    .map_err(db_error)?;
                Ok(if changes == 0 { InsertOutcome::Conflict } else { InsertOutcome::Inserted })
            })
            .await?;
        Ok(outcome)
    }

    async fn sum_usage(
        &self,
        scope: &UsageScope,
        period: &UsagePeriod,
    ) -> Result<UsageSummary, StoreError> {
        let (start, end) = period.bounds().map_err(|err| StoreError::Invalid(err.to_string()))?;
        let (sql, scope_value) = match scope {
            UsageScope::Tenant(tenant_id) => (
                "SELECT COALESCE(SUM(quantity), 0), COUNT(*) FROM usage_events WHERE tenant_id = \
                 ?1 AND created_at >= ?2 AND created_at < ?3",
                tenant_id.to_string(),
            ),
            UsageScope::ApiKey(api_key_id) => (
                "SELECT COALESCE(SUM(quantity), 0), COUNT(*) FROM usage_events WHERE api_key_id \
                 = ?1 AND created_at >= ?2 AND created_at < ?3",
                api_key_id.to_string(),
            ),
        };
        let summary = self
            .run(move |conn| {
                let (total, count): (i64, i64) = conn
                    .query_row(
                        sql,
                        params![scope_value, start.as_unix_millis(), end.as_unix_millis()],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )
                    .map_err(db_error)?;
                Ok(UsageSummary {
                    total: decode_u64(total, "usage total")?,
                    count: decode_u64(count, "usage count")?,
                })
            })
            .await?;
        Ok(summary)
    }
}

#[async_trait]
impl FeatureFlagRepository for SqliteStore {
    async fn get_feature_flag(&self, name: &str) -> Result<Option<FeatureFlag>, StoreError> {
        let name = name.to_string();
        let flag = self
            .run(move |conn| {
                let row = conn
                    .query_row(
                        "SELECT id, name, description, enabled_tiers_json, enabled_tenants_json, \
                         rollout_percentage, active FROM feature_flags WHERE name = ?1",
                        params![name],
                        |row| {
                            Ok(FlagRow {
                                id: row.get(0)?,
                                name: row.get(1)?,
                                description: row.get(2)?,
                                enabled_tiers_json: row.get(3)?,
                                enabled_tenants_json: row.get(4)?,
                                rollout_percentage: row.get(5)?,
                                active: row.get(6)?,
                            })
                        },
                    )
                    .optional()
                    .map_err(db_error)?;
                row.map(decode_feature_flag).transpose()
            })
            .await?;
        Ok(flag)
    }

    async fn upsert_feature_flag(&self, flag: &FeatureFlag) -> Result<(), StoreError> {
        let flag = flag.clone();
        self.run(move |conn| {
            let tiers = encode_json(&flag.enabled_tiers, "enabled_tiers")?;
            let tenants = encode_json(&flag.enabled_tenants, "enabled_tenants")?;
            conn.execute(
                "INSERT INTO feature_flags (id, name, description, enabled_tiers_json, \
                 enabled_tenants_json, rollout_percentage, active) VALUES (?1, ?2, ?3, ?4, ?5, \
                 ?6, ?7) ON CONFLICT(name) DO UPDATE SET id = excluded.id, description = \
                 excluded.description, enabled_tiers_json = excluded.enabled_tiers_json, \
                 enabled_tenants_json = excluded.enabled_tenants_json, rollout_percentage = \
                 excluded.rollout_percentage, active = excluded.active",
                params![
                    flag.id.as_str(),
                    flag.name,
                    flag.description,
                    tiers,
                    tenants,
                    i64::from(flag.rollout_percentage),
                    flag.active,
                ],
            )
            .map_err(db_error)?;
            Ok(())
        })
        .await?;
        Ok(())
    }
}

#[async_trait]
impl OverrideRepository for SqliteStore {
    async fn list_active_overrides(
        &self,
        tenant_id: &TenantId,
        now: Timestamp,
    ) -> Result<Vec<AdminOverride>, StoreError> {
        let tenant = tenant_id.to_string();
        let overrides = self
            .run(move |conn| {
                let sql = format!(
                    "SELECT {OVERRIDE_COLUMNS} FROM admin_overrides WHERE tenant_id = ?1 AND \
                     (expires_at IS NULL OR expires_at > ?2) ORDER BY rowid"
                );
                let mut stmt = conn.prepare(&sql).map_err(db_error)?;
                let rows = stmt
                    .query_map(params![tenant, now.as_unix_millis()], read_override_row)
                    .map_err(db_error)?
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(db_error)?;
                rows.into_iter().map(decode_override).collect()
            })
            .await?;
        Ok(overrides)
    }

    async fn insert_override(&self, admin_override: &AdminOverride) -> Result<(), StoreError> {
        let row = admin_override.clone();
        self.run(move |conn| {
            let value = encode_override_value(&row.effect)?;
            conn.execute(
                "INSERT INTO admin_overrides (id, tenant_id, override_type, value_json, reason, \
                 expires_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    row.id.as_str(),
                    row.tenant_id.as_str(),
                    row.effect.kind(),
                    value,
                    row.reason,
                    row.expires_at.map(Timestamp::as_unix_millis),
                ],
            )
            .map_err(db_error)?;
            Ok(())
        })
        .await?;
        Ok(())
    }

    async fn delete_expired_overrides(&self, now: Timestamp) -> Result<u64, StoreError> {
        let removed = self
            .run(move |conn| {
                let changes = conn
                    .execute(
                        "DELETE FROM admin_overrides WHERE expires_at IS NOT NULL AND expires_at \
                         <= ?1",
                        params![now.as_unix_millis()],
                    )
                    .map_err(db_error)?;
                Ok(u64::try_from(changes).unwrap_or(u64::MAX))
            })
            .await?;
        Ok(removed)
    }
}

// ============================================================================
// SECTION: Connection Helpers
// ============================================================================

/// Validates the path, opens the database, and initializes the schema.
pub(crate) fn open_store_connection(
    config: &SqliteStoreConfig,
) -> Result<Connection, SqliteStoreError> {
    validate_store_path(&config.path)?;
    ensure_parent_dir(&config.path)?;
    let mut connection = open_connection(config)?;
    initialize_schema(&mut connection)?;
    Ok(connection)
}

/// Ensures the parent directory for the store exists.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    let Some(parent) = path.parent() else {
        return Err(SqliteStoreError::Io("store path missing parent directory".to_string()));
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))
}

/// Validates store paths for safety limits.
fn validate_store_path(path: &Path) -> Result<(), SqliteStoreError> {
    if path.as_os_str().is_empty() {
        return Err(SqliteStoreError::Invalid("store path must not be empty".to_string()));
    }
    let path_string = path.display().to_string();
    if path_string.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteStoreError::Invalid("store path exceeds length limit".to_string()));
    }
    for component in path.components() {
        let name = component.as_os_str().to_string_lossy();
        if name.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(SqliteStoreError::Invalid(
                "store path contains an overlong component".to_string(),
            ));
        }
    }
    if path.is_dir() {
        return Err(SqliteStoreError::Invalid(
            "store path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

/// Opens an `SQLite` connection with secure defaults.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags)
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    apply_pragmas(&connection, config)?;
    Ok(connection)
}

/// Applies `SQLite` pragmas required for durability.
fn apply_pragmas(
    connection: &Connection,
    config: &SqliteStoreConfig,
) -> Result<(), SqliteStoreError> {
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .busy_timeout(Duration::from_millis(config.busy_timeout_ms))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    Ok(())
}

/// Initializes the `SQLite` schema or validates the existing version.
fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection.transaction().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
                .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
            tx.execute_batch(SCHEMA_V1).map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(value) => {
            return Err(SqliteStoreError::VersionMismatch(format!(
                "unsupported schema version: {value}"
            )));
        }
    }
    tx.commit().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    Ok(())
}

/// Maps a `SQLite` error, classifying constraint violations as invalid input.
pub(crate) fn db_error(err: rusqlite::Error) -> SqliteStoreError {
    match &err {
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == ErrorCode::ConstraintViolation =>
        {
            SqliteStoreError::Invalid(format!("constraint violation: {err}"))
        }
        _ => SqliteStoreError::Db(err.to_string()),
    }
}

// ============================================================================
// SECTION: Row Boundary
// ============================================================================

/// Raw `subscriptions` row: id, tenant, tier, status, period end.
type SubscriptionRow = (String, String, String, String, Option<i64>);

/// Raw `api_keys` row.
struct ApiKeyRow {
    /// Key identifier.
    id: String,
    /// Owning tenant.
    tenant_id: String,
    /// SHA-256 hex digest.
    key_hash: String,
    /// Display prefix.
    key_prefix: String,
    /// JSON array of scopes.
    scopes_json: String,
    /// Key-level limit.
    quota_limit: Option<i64>,
    /// Quota period label.
    quota_period: String,
    /// Status label.
    status: String,
    /// Expiry millis.
    expires_at: Option<i64>,
}

/// Raw `usage_events` row.
struct UsageRow {
    /// Event identifier.
    id: String,
    /// Tenant identifier.
    tenant_id: String,
    /// API key identifier.
    api_key_id: Option<String>,
    /// User identifier.
    user_id: Option<String>,
    /// Service name.
    service: String,
    /// Action name.
    action: String,
    /// Units consumed.
    quantity: i64,
    /// Period label.
    period: String,
    /// Idempotency key.
    idempotency_key: String,
    /// Creation millis.
    created_at: i64,
}

/// Raw `feature_flags` row.
struct FlagRow {
    /// Flag identifier.
    id: String,
    /// Flag name.
    name: String,
    /// Description.
    description: Option<String>,
    /// JSON array of tiers.
    enabled_tiers_json: String,
    /// JSON array of tenant ids.
    enabled_tenants_json: String,
    /// Rollout percentage.
    rollout_percentage: i64,
    /// Active flag.
    active: bool,
}

/// Raw `admin_overrides` row.
struct OverrideRow {
    /// Override identifier.
    id: String,
    /// Tenant identifier.
    tenant_id: String,
    /// Effect type label.
    override_type: String,
    /// JSON-encoded effect value.
    value_json: String,
    /// Operator reason.
    reason: Option<String>,
    /// Expiry millis.
    expires_at: Option<i64>,
}

/// Reads an [`ApiKeyRow`] in [`API_KEY_COLUMNS`] order.
fn read_api_key_row(row: &Row<'_>) -> rusqlite::Result<ApiKeyRow> {
    Ok(ApiKeyRow {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        key_hash: row.get(2)?,
        key_prefix: row.get(3)?,
        scopes_json: row.get(4)?,
        quota_limit: row.get(5)?,
        quota_period: row.get(6)?,
        status: row.get(7)?,
        expires_at: row.get(8)?,
    })
}

/// Reads a [`UsageRow`] in [`USAGE_COLUMNS`] order.
fn read_usage_row(row: &Row<'_>) -> rusqlite::Result<UsageRow> {
    Ok(UsageRow {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        api_key_id: row.get(2)?,
        user_id: row.get(3)?,
        service: row.get(4)?,
        action: row.get(5)?,
        quantity: row.get(6)?,
        period: row.get(7)?,
        idempotency_key: row.get(8)?,
        created_at: row.get(9)?,
    })
}

/// Reads an [`OverrideRow`] in [`OVERRIDE_COLUMNS`] order.
fn read_override_row(row: &Row<'_>) -> rusqlite::Result<OverrideRow> {
    Ok(OverrideRow {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        override_type: row.get(2)?,
        value_json: row.get(3)?,
        reason: row.get(4)?,
        expires_at: row.get(5)?,
    })
}

/// Decodes a tenant row.
fn decode_tenant(id: String, name: String, limit: Option<i64>) -> Result<Tenant, SqliteStoreError> {
    Ok(Tenant {
        id: TenantId::new(id),
        name,
        global_quota_limit: limit.map(|value| decode_u64(value, "global_quota_limit")).transpose()?,
    })
}

/// Decodes a subscription row.
fn decode_subscription(row: SubscriptionRow) -> Result<Subscription, SqliteStoreError> {
    let (id, tenant_id, tier, status, period_end) = row;
    let status = SubscriptionStatus::parse(&status)
        .ok_or_else(|| SqliteStoreError::Corrupt(format!("unknown subscription status: {status}")))?;
    Ok(Subscription {
        id: SubscriptionId::new(id),
        tenant_id: TenantId::new(tenant_id),
        tier: decode_tier(&tier)?,
        status,
        current_period_end: period_end.map(Timestamp::from_unix_millis),
    })
}

/// Decodes an API key row.
fn decode_api_key(row: ApiKeyRow) -> Result<ApiKey, SqliteStoreError> {
    let scopes: Vec<String> = decode_json(&row.scopes_json, "scopes")?;
    let quota_period = QuotaPeriod::parse(&row.quota_period)
        .map_err(|err| SqliteStoreError::Corrupt(format!("api key quota period: {err}")))?;
    let status = ApiKeyStatus::parse(&row.status)
        .ok_or_else(|| SqliteStoreError::Corrupt(format!("unknown api key status: {}", row.status)))?;
    Ok(ApiKey {
        id: ApiKeyId::new(row.id),
        tenant_id: TenantId::new(row.tenant_id),
        key_hash: row.key_hash,
        key_prefix: row.key_prefix,
        scopes,
        quota_limit: row.quota_limit.map(|value| decode_u64(value, "quota_limit")).transpose()?,
        quota_period,
        status,
        expires_at: row.expires_at.map(Timestamp::from_unix_millis),
    })
}

/// Decodes a usage event row.
fn decode_usage_event(row: UsageRow) -> Result<UsageEvent, SqliteStoreError> {
    let period = UsagePeriod::parse(&row.period)
        .map_err(|err| SqliteStoreError::Corrupt(format!("usage period: {err}")))?;
    Ok(UsageEvent {
        id: UsageEventId::new(row.id),
        tenant_id: TenantId::new(row.tenant_id),
        api_key_id: row.api_key_id.map(ApiKeyId::new),
        user_id: row.user_id.map(UserId::new),
        service: ServiceName::new(row.service),
        action: row.action,
        quantity: decode_u64(row.quantity, "quantity")?,
        period,
        idempotency_key: IdempotencyKey::new(row.idempotency_key),
        created_at: Timestamp::from_unix_millis(row.created_at),
    })
}

/// Decodes a feature flag row.
fn decode_feature_flag(row: FlagRow) -> Result<FeatureFlag, SqliteStoreError> {
    let rollout_percentage = u8::try_from(row.rollout_percentage).map_err(|_| {
        SqliteStoreError::Corrupt(format!("rollout percentage out of range: {}", row.rollout_percentage))
    })?;
    Ok(FeatureFlag {
        id: FeatureFlagId::new(row.id),
        name: row.name,
        description: row.description,
        enabled_tiers: decode_json(&row.enabled_tiers_json, "enabled_tiers")?,
        enabled_tenants: decode_json(&row.enabled_tenants_json, "enabled_tenants")?,
        rollout_percentage,
        active: row.active,
    })
}

/// Decodes an override row.
fn decode_override(row: OverrideRow) -> Result<AdminOverride, SqliteStoreError> {
    Ok(AdminOverride {
        id: OverrideId::new(row.id),
        tenant_id: TenantId::new(row.tenant_id),
        effect: decode_override_effect(&row.override_type, &row.value_json)?,
        reason: row.reason,
        expires_at: row.expires_at.map(Timestamp::from_unix_millis),
    })
}

/// Encodes an override effect's value as JSON.
fn encode_override_value(effect: &OverrideEffect) -> Result<String, SqliteStoreError> {
    let encoded = match effect {
        OverrideEffect::QuotaBoost(boost) => serde_json::to_string(boost),
        OverrideEffect::TierUpgrade(tier) => serde_json::to_string(tier),
        OverrideEffect::FeatureGrant(feature) => serde_json::to_string(feature),
    };
    encoded.map_err(|err| SqliteStoreError::Invalid(format!("override value: {err}")))
}

/// Decodes an override effect from its type label and JSON value.
fn decode_override_effect(kind: &str, value_json: &str) -> Result<OverrideEffect, SqliteStoreError> {
    match kind {
        "quota_boost" => decode_json(value_json, "quota_boost").map(OverrideEffect::QuotaBoost),
        "tier_upgrade" => decode_json::<Tier>(value_json, "tier_upgrade").map(OverrideEffect::TierUpgrade),
        "feature_grant" => decode_json(value_json, "feature_grant").map(OverrideEffect::FeatureGrant),
        other => Err(SqliteStoreError::Corrupt(format!("unknown override type: {other}"))),
    }
}

/// Decodes a role label.
fn decode_role(label: &str) -> Result<Role, SqliteStoreError> {
    Role::parse(label).ok_or_else(|| SqliteStoreError::Corrupt(format!("unknown role: {label}")))
}

/// Decodes a tier label.
fn decode_tier(label: &str) -> Result<Tier, SqliteStoreError> {
    Tier::parse(label).ok_or_else(|| SqliteStoreError::Corrupt(format!("unknown tier: {label}")))
}

/// Encodes a JSON column.
fn encode_json<T: serde::Serialize>(value: &T, field: &str) -> Result<String, SqliteStoreError> {
    serde_json::to_string(value).map_err(|err| SqliteStoreError::Invalid(format!("{field}: {err}")))
}

/// Decodes a JSON column.
fn decode_json<T: serde::de::DeserializeOwned>(
    raw: &str,
    field: &str,
) -> Result<T, SqliteStoreError> {
    serde_json::from_str(raw).map_err(|err| SqliteStoreError::Corrupt(format!("{field}: {err}")))
}

/// Converts an unsigned value into an `INTEGER` column.
fn encode_u64(value: u64, field: &str) -> Result<i64, SqliteStoreError> {
    i64::try_from(value).map_err(|_| SqliteStoreError::Invalid(format!("{field} exceeds i64 range")))
}

/// Converts an `INTEGER` column into an unsigned value.
fn decode_u64(value: i64, field: &str) -> Result<u64, SqliteStoreError> {
    u64::try_from(value).map_err(|_| SqliteStoreError::Corrupt(format!("{field} is negative")))
}
