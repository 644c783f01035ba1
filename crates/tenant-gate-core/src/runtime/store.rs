// crates/tenant-gate-core/src/runtime/store.rs
// ============================================================================
// Module: Tenant Gate In-Memory Store
// Description: In-memory implementation of every repository contract.
// Purpose: Back tests and ephemeral deployments without a database.
// Dependencies: async-trait, crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! [`InMemoryStore`] keeps each table in a `BTreeMap` behind one mutex so
//! multi-row invariants (tenant name uniqueness, the idempotency-key index)
//! are enforced atomically. Fault injection flips the store into an
//! unavailable state so fail-closed and degraded paths are testable.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use async_trait::async_trait;

use crate::core::AdminOverride;
use crate::core::ApiKey;
use crate::core::ApiKeyId;
use crate::core::ApiKeyStatus;
use crate::core::FeatureFlag;
use crate::core::IdempotencyKey;
use crate::core::Role;
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
use crate::interfaces::ApiKeyRepository;
use crate::interfaces::FeatureFlagRepository;
use crate::interfaces::InsertOutcome;
use crate::interfaces::MembershipRepository;
use crate::interfaces::OverrideRepository;
use crate::interfaces::SessionRepository;
use crate::interfaces::StoreError;
use crate::interfaces::SubscriptionRepository;
use crate::interfaces::TenantRepository;
use crate::interfaces::UsageRepository;
use crate::interfaces::UsageScope;
use crate::interfaces::UsageSummary;

// ============================================================================
// SECTION: Tables
// ============================================================================

/// Table contents guarded by the store mutex.
#[derive(Debug, Default)]
struct Tables {
    /// Tenants by id.
    tenants: BTreeMap<TenantId, Tenant>,
    /// Memberships by (tenant, user).
    memberships: BTreeMap<(TenantId, UserId), TenantUser>,
    /// Sessions by id.
    sessions: BTreeMap<SessionId, Session>,
    /// API keys by id.
    api_keys: BTreeMap<ApiKeyId, ApiKey>,
    /// Subscriptions by tenant.
    subscriptions: BTreeMap<TenantId, Subscription>,
    /// Service enablement by (subscription, service).
    subscription_items: BTreeMap<(SubscriptionId, ServiceName), SubscriptionItem>,
    /// Usage ledger keyed by idempotency key.
    usage_events: BTreeMap<IdempotencyKey, UsageEvent>,
    /// Feature flags by name.
    feature_flags: BTreeMap<String, FeatureFlag>,
    /// Overrides in insertion order.
    overrides: Vec<AdminOverride>,
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// In-memory control plane store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    /// Shared tables.
    tables: Arc<Mutex<Tables>>,
    /// When set, every call fails with [`StoreError::Io`].
    unavailable: Arc<AtomicBool>,
    /// When set, override reads fail with [`StoreError::Io`].
    overrides_unavailable: Arc<AtomicBool>,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggles whole-store unavailability.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Toggles unavailability of the override table only.
    pub fn set_overrides_unavailable(&self, unavailable: bool) {
        self.overrides_unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Returns the number of usage events recorded.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store is unavailable.
    pub fn usage_event_count(&self) -> Result<usize, StoreError> {
        Ok(self.tables()?.usage_events.len())
    }

    /// Locks the tables, honoring fault injection.
    fn tables(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Io("store unavailable".to_string()));
        }
        self.tables.lock().map_err(|_| StoreError::Store("mutex poisoned".to_string()))
    }

    /// Locks the tables for override access.
    fn override_tables(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        if self.overrides_unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Io("override table unavailable".to_string()));
        }
        self.tables()
    }
}

// ============================================================================
// SECTION: Repository Implementations
// ============================================================================

#[async_trait]
impl TenantRepository for InMemoryStore {
    async fn get_tenant(&self, tenant_id: &TenantId) -> Result<Option<Tenant>, StoreError> {
        Ok(self.tables()?.tenants.get(tenant_id).cloned())
    }

    async fn upsert_tenant(&self, tenant: &Tenant) -> Result<(), StoreError> {
        let mut tables = self.tables()?;
        let name_taken = tables
            .tenants
            .values()
            .any(|existing| existing.name == tenant.name && existing.id != tenant.id);
        if name_taken {
            return Err(StoreError::Invalid(format!("tenant name taken: {}", tenant.name)));
        }
        tables.tenants.insert(tenant.id.clone(), tenant.clone());
        Ok(())
    }
}

#[async_trait]
impl MembershipRepository for InMemoryStore {
    async fn get_membership(
        &self,
        tenant_id: &TenantId,
        user_id: &UserId,
    ) -> Result<Option<TenantUser>, StoreError> {
        let key = (tenant_id.clone(), user_id.clone());
        Ok(self.tables()?.memberships.get(&key).cloned())
    }

    async fn upsert_membership(&self, membership: &TenantUser) -> Result<(), StoreError> {
        let key = (membership.tenant_id.clone(), membership.user_id.clone());
        self.tables()?.memberships.insert(key, membership.clone());
        Ok(())
    }

    async fn delete_membership(
        &self,
        tenant_id: &TenantId,
        user_id: &UserId,
    ) -> Result<bool, StoreError> {
        let key = (tenant_id.clone(), user_id.clone());
        Ok(self.tables()?.memberships.remove(&key).is_some())
    }

    async fn count_tenant_owners(&self, tenant_id: &TenantId) -> Result<u64, StoreError> {
        let tables = self.tables()?;
        let count = tables
            .memberships
            .values()
            .filter(|row| &row.tenant_id == tenant_id && row.role == Role::Owner)
            .count();
        Ok(u64::try_from(count).unwrap_or(u64::MAX))
    }
}

#[async_trait]
impl SessionRepository for InMemoryStore {
    async fn get_session(&self, session_id: &SessionId) -> Result<Option<Session>, StoreError> {
        Ok(self.tables()?.sessions.get(session_id).cloned())
    }

    async fn upsert_session(&self, session: &Session) -> Result<(), StoreError> {
        self.tables()?.sessions.insert(session.id.clone(), session.clone());
        Ok(())
    }
}

#[async_trait]
impl ApiKeyRepository for InMemoryStore {
    async fn get_api_key(&self, api_key_id: &ApiKeyId) -> Result<Option<ApiKey>, StoreError> {
        Ok(self.tables()?.api_keys.get(api_key_id).cloned())
    }

    async fn find_api_key_by_hash(&self, key_hash: &str) -> Result<Option<ApiKey>, StoreError> {
        let tables = self.tables()?;
        Ok(tables.api_keys.values().find(|key| key.key_hash == key_hash).cloned())
    }

    async fn insert_api_key(&self, api_key: &ApiKey) -> Result<(), StoreError> {
        let mut tables = self.tables()?;
        if tables.api_keys.contains_key(&api_key.id) {
            return Err(StoreError::Invalid(format!("api key exists: {}", api_key.id)));
        }
        if tables.api_keys.values().any(|key| key.key_hash == api_key.key_hash) {
            return Err(StoreError::Invalid("api key hash collision".to_string()));
        }
        tables.api_keys.insert(api_key.id.clone(), api_key.clone());
        Ok(())
    }

    async fn revoke_api_key(&self, api_key_id: &ApiKeyId) -> Result<bool, StoreError> {
        let mut tables = self.tables()?;
        let Some(key) = tables.api_keys.get_mut(api_key_id) else {
            return Ok(false);
        };
        key.status = ApiKeyStatus::Revoked;
        Ok(true)
    }
}

#[async_trait]
impl SubscriptionRepository for InMemoryStore {
    async fn get_subscription_for_tenant(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Option<Subscription>, StoreError> {
        Ok(self.tables()?.subscriptions.get(tenant_id).cloned())
    }

    async fn upsert_subscription(&self, subscription: &Subscription) -> Result<(), StoreError> {
        self.tables()?.subscriptions.insert(subscription.tenant_id.clone(), subscription.clone());
        Ok(())
    }

    async fn get_subscription_item(
        &self,
        subscription_id: &SubscriptionId,
        service: &ServiceName,
    ) -> Result<Option<SubscriptionItem>, StoreError> {
        let key = (subscription_id.clone(), service.clone());
        Ok(self.tables()?.subscription_items.get(&key).cloned())
    }

    async fn upsert_subscription_item(&self, item: &SubscriptionItem) -> Result<(), StoreError> {
        let key = (item.subscription_id.clone(), item.service.clone());
        self.tables()?.subscription_items.insert(key, item.clone());
        Ok(())
    }
}

#[async_trait]
impl UsageRepository for InMemoryStore {
    async fn find_usage_by_idempotency_key(
        &self,
        key: &IdempotencyKey,
    ) -> Result<Option<UsageEvent>, StoreError> {
        Ok(self.tables()?.usage_events.get(key).cloned())
    }

    async fn insert_usage_event(&self, event: &UsageEvent) -> Result<InsertOutcome, StoreError> {
        let mut tables = self.tables()?;
        if tables.usage_events.contains_key(&event.idempotency_key) {
            return Ok(InsertOutcome::Conflict);
        }
        tables.usage_events.insert(event.idempotency_key.clone(), event.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn sum_usage(
        &self,
        scope: &UsageScope,
        period: &UsagePeriod,
    ) -> Result<UsageSummary, StoreError> {
        let (start, end) = period.bounds().map_err(|err| StoreError::Invalid(err.to_string()))?;
        let tables = self.tables()?;
        let mut summary = UsageSummary::default();
        for event in tables.usage_events.values() {
            let in_scope = match scope {
                UsageScope::Tenant(tenant_id) => &event.tenant_id == tenant_id,
                UsageScope::ApiKey(api_key_id) => event.api_key_id.as_ref() == Some(api_key_id),
            };
            if in_scope && event.created_at >= start && event.created_at < end {
                summary.total = summary.total.saturating_add(event.quantity);
                summary.count = summary.count.saturating_add(1);
            }
        }
        Ok(summary)
    }
}

#[async_trait]
impl FeatureFlagRepository for InMemoryStore {
    async fn get_feature_flag(&self, name: &str) -> Result<Option<FeatureFlag>, StoreError> {
        Ok(self.tables()?.feature_flags.get(name).cloned())
    }

    async fn upsert_feature_flag(&self, flag: &FeatureFlag) -> Result<(), StoreError> {
        self.tables()?.feature_flags.insert(flag.name.clone(), flag.clone());
        Ok(())
    }
}

#[async_trait]
impl OverrideRepository for InMemoryStore {
    async fn list_active_overrides(
        &self,
        tenant_id: &TenantId,
        now: Timestamp,
    ) -> Result<Vec<AdminOverride>, StoreError> {
        let tables = self.override_tables()?;
        Ok(tables
            .overrides
            .iter()
            .filter(|row| &row.tenant_id == tenant_id && row.is_active(now))
            .cloned()
            .collect())
    }

    async fn insert_override(&self, admin_override: &AdminOverride) -> Result<(), StoreError> {
        let mut tables = self.override_tables()?;
        if tables.overrides.iter().any(|row| row.id == admin_override.id) {
            return Err(StoreError::Invalid(format!("override exists: {}", admin_override.id)));
        }
        tables.overrides.push(admin_override.clone());
        Ok(())
    }

    async fn delete_expired_overrides(&self, now: Timestamp) -> Result<u64, StoreError> {
        let mut tables = self.override_tables()?;
        let before = tables.overrides.len();
        tables.overrides.retain(|row| row.is_active(now));
        let removed = before - tables.overrides.len();
        Ok(u64::try_from(removed).unwrap_or(u64::MAX))
    }
}
