// crates/tenant-gate-core/src/interfaces/mod.rs
// ============================================================================
// Module: Tenant Gate Interfaces
// Description: Backend-agnostic contracts for the relational store and cache.
// Purpose: Define the collaborator surfaces consumed by the decision engines.
// Dependencies: async-trait, serde, thiserror, crate::core
// ============================================================================

//! ## Overview
//! Engines never talk to a database or cache directly. They hold
//! `Arc<dyn ControlPlaneStore>` and `Arc<dyn CacheStore>` handles whose
//! implementations live in `runtime` (in-memory) and in the SQLite store
//! crate. Every method is a suspension point; implementations must not block
//! the async executor.
//!
//! Implementations must fail closed: unreadable or malformed rows surface as
//! [`StoreError::Corrupt`], never as a default value.

// ============================================================================
// SECTION: Imports
// ============================================================================

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::AdminOverride;
use crate::core::ApiKey;
use crate::core::ApiKeyId;
use crate::core::FeatureFlag;
use crate::core::IdempotencyKey;
use crate::core::ServiceName;
use crate::core::Session;
use crate::core::SessionId;
use crate::core::Subscription;
use crate::core::SubscriptionId;
use crate::core::SubscriptionItem;
use crate::core::Tenant;
use crate::core::TenantId;
use crate::core::TenantUser;
use crate::core::Timestamp;
use crate::core::UsageEvent;
use crate::core::UsagePeriod;
use crate::core::UserId;

// ============================================================================
// SECTION: Store Errors
// ============================================================================

/// Relational store errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Store I/O error.
    #[error("control plane store io error: {0}")]
    Io(String),
    /// Stored data is corrupted or fails decoding.
    #[error("control plane store corruption: {0}")]
    Corrupt(String),
    /// Caller supplied invalid data.
    #[error("control plane store invalid data: {0}")]
    Invalid(String),
    /// Store reported an error.
    #[error("control plane store error: {0}")]
    Store(String),
}

// ============================================================================
// SECTION: Repository Contracts
// ============================================================================

/// Tenant records.
#[async_trait]
pub trait TenantRepository: Send + Sync {
    /// Loads a tenant by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails.
    async fn get_tenant(&self, tenant_id: &TenantId) -> Result<Option<Tenant>, StoreError>;

    /// Inserts or replaces a tenant.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails or the name is taken.
    async fn upsert_tenant(&self, tenant: &Tenant) -> Result<(), StoreError>;
}

/// Tenant membership records.
#[async_trait]
pub trait MembershipRepository: Send + Sync {
    /// Loads the membership row for a (tenant, user) pair.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails.
    async fn get_membership(
        &self,
        tenant_id: &TenantId,
        user_id: &UserId,
    ) -> Result<Option<TenantUser>, StoreError>;

    /// Inserts or replaces a membership row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    async fn upsert_membership(&self, membership: &TenantUser) -> Result<(), StoreError>;

    /// Deletes a membership row, returning whether one existed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the delete fails.
    async fn delete_membership(
        &self,
        tenant_id: &TenantId,
        user_id: &UserId,
    ) -> Result<bool, StoreError>;

    /// Counts members holding the owner role.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the count fails.
    async fn count_tenant_owners(&self, tenant_id: &TenantId) -> Result<u64, StoreError>;
}

/// Login sessions.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Loads a session by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails.
    async fn get_session(&self, session_id: &SessionId) -> Result<Option<Session>, StoreError>;

    /// Inserts or replaces a session.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    async fn upsert_session(&self, session: &Session) -> Result<(), StoreError>;
}

/// API key records.
#[async_trait]
pub trait ApiKeyRepository: Send + Sync {
    /// Loads an API key by record id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails.
    async fn get_api_key(&self, api_key_id: &ApiKeyId) -> Result<Option<ApiKey>, StoreError>;

    /// Loads an API key by the SHA-256 hex digest of its secret.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails.
    async fn find_api_key_by_hash(&self, key_hash: &str) -> Result<Option<ApiKey>, StoreError>;

    /// Inserts a new API key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Invalid`] when the id or hash already exists.
    async fn insert_api_key(&self, api_key: &ApiKey) -> Result<(), StoreError>;

    /// Marks a key revoked, returning whether it existed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the update fails.
    async fn revoke_api_key(&self, api_key_id: &ApiKeyId) -> Result<bool, StoreError>;
}

/// Subscriptions and per-service enablement.
#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    /// Loads the tenant's subscription.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails.
    async fn get_subscription_for_tenant(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Option<Subscription>, StoreError>;

    /// Inserts or replaces the tenant's subscription.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    async fn upsert_subscription(&self, subscription: &Subscription) -> Result<(), StoreError>;

    /// Loads the enablement row for a service.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails.
    async fn get_subscription_item(
        &self,
        subscription_id: &SubscriptionId,
        service: &ServiceName,
    ) -> Result<Option<SubscriptionItem>, StoreError>;

    /// Inserts or replaces a service enablement row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    async fn upsert_subscription_item(&self, item: &SubscriptionItem) -> Result<(), StoreError>;
}

/// Outcome of a conditional insert keyed by a unique column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsertOutcome {
    /// Row was written.
    Inserted,
    /// A row with the same unique key already existed; nothing was written.
    Conflict,
}

/// Scope a usage sum is computed over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UsageScope {
    /// Every event billed to the tenant.
    Tenant(TenantId),
    /// Events made with one API key.
    ApiKey(ApiKeyId),
}

/// Aggregate usage over a period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageSummary {
    /// Sum of event quantities.
    pub total: u64,
    /// Number of events.
    pub count: u64,
}

/// Append-only usage ledger.
#[async_trait]
pub trait UsageRepository: Send + Sync {
    /// Loads the event recorded under an idempotency key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails.
    async fn find_usage_by_idempotency_key(
        &self,
        key: &IdempotencyKey,
    ) -> Result<Option<UsageEvent>, StoreError>;

    /// Inserts an event unless its idempotency key already exists.
    ///
    /// Concurrent inserts with the same key must yield exactly one
    /// [`InsertOutcome::Inserted`]; the rest report [`InsertOutcome::Conflict`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    async fn insert_usage_event(&self, event: &UsageEvent) -> Result<InsertOutcome, StoreError>;

    /// Sums events in `scope` created within `period`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the aggregate fails.
    async fn sum_usage(
        &self,
        scope: &UsageScope,
        period: &UsagePeriod,
    ) -> Result<UsageSummary, StoreError>;
}

/// Feature flag definitions.
#[async_trait]
pub trait FeatureFlagRepository: Send + Sync {
    /// Loads a flag by unique name.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails.
    async fn get_feature_flag(&self, name: &str) -> Result<Option<FeatureFlag>, StoreError>;

    /// Inserts or replaces a flag keyed by name.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    async fn upsert_feature_flag(&self, flag: &FeatureFlag) -> Result<(), StoreError>;
}

/// Admin overrides.
#[async_trait]
pub trait OverrideRepository: Send + Sync {
    /// Lists overrides for a tenant that have not expired at `now`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails.
    async fn list_active_overrides(
        &self,
        tenant_id: &TenantId,
        now: Timestamp,
    ) -> Result<Vec<AdminOverride>, StoreError>;

    /// Inserts an override.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    async fn insert_override(&self, admin_override: &AdminOverride) -> Result<(), StoreError>;

    /// Deletes overrides that expired at or before `now`; returns the count.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the delete fails.
    async fn delete_expired_overrides(&self, now: Timestamp) -> Result<u64, StoreError>;
}

/// Union of every repository contract the engines consume.
pub trait ControlPlaneStore:
    TenantRepository
    + MembershipRepository
    + SessionRepository
    + ApiKeyRepository
    + SubscriptionRepository
    + UsageRepository
    + FeatureFlagRepository
    + OverrideRepository
{
}

impl<T> ControlPlaneStore for T where
    T: TenantRepository
        + MembershipRepository
        + SessionRepository
        + ApiKeyRepository
        + SubscriptionRepository
        + UsageRepository
        + FeatureFlagRepository
        + OverrideRepository
{
}

// ============================================================================
// SECTION: Cache Contract
// ============================================================================

/// Cache backend errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// Backend is unavailable or failed.
    #[error("cache backend error: {0}")]
    Backend(String),
}

/// Cached value with its write time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Serialized JSON payload.
    pub data: String,
    /// Time the value was cached.
    pub cached_at: Timestamp,
}

/// Key-value cache with per-entry TTL.
///
/// `delete_by_prefix` is best-effort; eventually consistent backends may
/// keep serving deleted keys for a short window.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Reads a live entry.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] when the backend fails.
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError>;

    /// Writes an entry that the backend retains for `ttl_seconds`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] when the backend fails.
    async fn set(&self, key: &str, entry: CacheEntry, ttl_seconds: u64) -> Result<(), CacheError>;

    /// Deletes a key.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] when the backend fails.
    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Deletes every key starting with `prefix`; returns the count removed.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] when the backend fails.
    async fn delete_by_prefix(&self, prefix: &str) -> Result<u64, CacheError>;
}
