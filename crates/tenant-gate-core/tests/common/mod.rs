// crates/tenant-gate-core/tests/common/mod.rs
// ============================================================================
// Module: Core Test Fixtures
// Description: Shared fixture builders for tenant-gate-core integration tests.
// Purpose: Seed an in-memory control plane with a ready-to-authorize tenant.
// Dependencies: tenant-gate-core
// ============================================================================

#![allow(dead_code, reason = "Shared helpers are reused across multiple test suites.")]
#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    reason = "Test-only fixtures may panic on setup failure."
)]

use std::sync::Arc;

use tenant_gate_core::ApiKey;
use tenant_gate_core::ApiKeyId;
use tenant_gate_core::ApiKeyRepository;
use tenant_gate_core::ApiKeyStatus;
use tenant_gate_core::AuthorizationEngine;
use tenant_gate_core::AuthorizationSettings;
use tenant_gate_core::CacheStore;
use tenant_gate_core::Clock;
use tenant_gate_core::ControlPlaneStore;
use tenant_gate_core::InMemoryCacheStore;
use tenant_gate_core::InMemoryStore;
use tenant_gate_core::ManualClock;
use tenant_gate_core::MembershipRepository;
use tenant_gate_core::QuotaPeriod;
use tenant_gate_core::ReadThroughCache;
use tenant_gate_core::Role;
use tenant_gate_core::ServiceName;
use tenant_gate_core::Session;
use tenant_gate_core::SessionId;
use tenant_gate_core::SessionRepository;
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
use tenant_gate_core::UserId;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// 2026-03-15T12:00:00Z.
pub const START_MILLIS: i64 = 1_773_576_000_000;
/// Tenant seeded by [`Fixture::standard`].
pub const TENANT: &str = "tenant_abc";
/// Owner seeded by [`Fixture::standard`].
pub const OWNER: &str = "user_owner";
/// Member seeded by [`Fixture::standard`].
pub const MEMBER: &str = "user_member";
/// Session for [`MEMBER`] seeded by [`Fixture::standard`].
pub const MEMBER_SESSION: &str = "sess_member";
/// Subscription seeded by [`Fixture::standard`].
pub const SUBSCRIPTION: &str = "sub_abc";
/// Service enabled by [`Fixture::standard`].
pub const SERVICE: &str = "reports";

// ============================================================================
// SECTION: Fixture
// ============================================================================

/// In-memory control plane with a manual clock.
pub struct Fixture {
    /// Store handle with fault injection.
    pub store: InMemoryStore,
    /// Cache backend with fault injection.
    pub cache_backend: InMemoryCacheStore,
    /// Manual clock shared by every engine.
    pub clock: Arc<ManualClock>,
}

impl Fixture {
    /// Creates an empty fixture.
    pub fn empty() -> Self {
        let clock = Arc::new(ManualClock::new(Timestamp::from_unix_millis(START_MILLIS)));
        let dyn_clock: Arc<dyn Clock> = clock.clone();
        Self {
            store: InMemoryStore::new(),
            cache_backend: InMemoryCacheStore::new(dyn_clock),
            clock,
        }
    }

    /// Creates a fixture with one free-tier tenant ready to authorize
    /// [`MEMBER`] against [`SERVICE`].
    pub async fn standard() -> Self {
        let fixture = Self::empty();
        fixture.tenant(TENANT, None).await;
        fixture.member(TENANT, OWNER, Role::Owner).await;
        fixture.member(TENANT, MEMBER, Role::Member).await;
        fixture.session(MEMBER_SESSION, MEMBER, TENANT, SERVICE, 3_600).await;
        fixture.subscription(TENANT, SUBSCRIPTION, Tier::Free, SubscriptionStatus::Active).await;
        fixture.service(SUBSCRIPTION, SERVICE, true).await;
        fixture
    }

    /// Returns the current fixture time.
    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Returns the store as a trait object.
    pub fn dyn_store(&self) -> Arc<dyn ControlPlaneStore> {
        Arc::new(self.store.clone())
    }

    /// Returns the clock as a trait object.
    pub fn dyn_clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    /// Returns a decision cache with a 60 s TTL and 300 s grace.
    pub fn decision_cache(&self) -> ReadThroughCache {
        let backend: Arc<dyn CacheStore> = Arc::new(self.cache_backend.clone());
        ReadThroughCache::new(backend, self.dyn_clock(), 60, 300)
    }

    /// Returns an engine without a decision cache.
    pub fn engine(&self) -> AuthorizationEngine {
        AuthorizationEngine::new(
            self.dyn_store(),
            self.dyn_clock(),
            None,
            AuthorizationSettings::default(),
        )
    }

    /// Returns an engine with the decision cache enabled.
    pub fn cached_engine(&self) -> AuthorizationEngine {
        AuthorizationEngine::new(
            self.dyn_store(),
            self.dyn_clock(),
            Some(self.decision_cache()),
            AuthorizationSettings::default(),
        )
    }

    /// Seeds a tenant.
    pub async fn tenant(&self, id: &str, global_quota_limit: Option<u64>) {
        self.store
            .upsert_tenant(&Tenant {
                id: TenantId::new(id),
                name: format!("{id} inc"),
                global_quota_limit,
            })
            .await
            .expect("seed tenant");
    }

    /// Seeds a membership.
    pub async fn member(&self, tenant: &str, user: &str, role: Role) {
        self.store
            .upsert_membership(&TenantUser {
                tenant_id: TenantId::new(tenant),
                user_id: UserId::new(user),
                role,
            })
            .await
            .expect("seed membership");
    }

    /// Seeds a session expiring `ttl_seconds` from now.
    pub async fn session(&self, id: &str, user: &str, tenant: &str, service: &str, ttl_seconds: i64) {
        self.store
            .upsert_session(&Session {
                id: SessionId::new(id),
                user_id: UserId::new(user),
                tenant_id: TenantId::new(tenant),
                service: ServiceName::new(service),
                expires_at: self.now().plus_seconds(ttl_seconds),
                revoked_at: None,
            })
            .await
            .expect("seed session");
    }

    /// Seeds a subscription.
    pub async fn subscription(&self, tenant: &str, id: &str, tier: Tier, status: SubscriptionStatus) {
        self.store
            .upsert_subscription(&Subscription {
                id: SubscriptionId::new(id),
                tenant_id: TenantId::new(tenant),
                tier,
                status,
                current_period_end: None,
            })
            .await
            .expect("seed subscription");
    }

    /// Seeds a service enablement row.
    pub async fn service(&self, subscription: &str, service: &str, enabled: bool) {
        self.store
            .upsert_subscription_item(&SubscriptionItem {
                subscription_id: SubscriptionId::new(subscription),
                service: ServiceName::new(service),
                enabled,
            })
            .await
            .expect("seed service");
    }

    /// Seeds an active API key with a hash derived from its id.
    pub async fn api_key(
        &self,
        id: &str,
        tenant: &str,
        scopes: &[&str],
        quota_limit: Option<u64>,
        quota_period: QuotaPeriod,
    ) {
        self.store
            .insert_api_key(&ApiKey {
                id: ApiKeyId::new(id),
                tenant_id: TenantId::new(tenant),
                key_hash: format!("hash-{id}"),
                key_prefix: "tg_test".to_string(),
                scopes: scopes.iter().map(|scope| (*scope).to_string()).collect(),
                quota_limit,
                quota_period,
                status: ApiKeyStatus::Active,
                expires_at: None,
            })
            .await
            .expect("seed api key");
    }
}
