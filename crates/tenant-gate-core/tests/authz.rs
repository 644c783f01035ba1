// crates/tenant-gate-core/tests/authz.rs
// ============================================================================
// Module: Authorization Engine Tests
// Description: End-to-end tests for the authorization decision pipeline.
// Purpose: Validate stage order, reasons, metadata, and decision caching.
// Dependencies: tenant-gate-core, tokio
// ============================================================================

//! ## Overview
//! Each test seeds an in-memory control plane, runs one or more requests,
//! and asserts both the decision and the `checks` map so short-circuiting
//! is observable.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    reason = "Test-only assertions and helpers are permitted."
)]

mod common;

use common::Fixture;
use common::MEMBER;
use common::MEMBER_SESSION;
use common::OWNER;
use common::SERVICE;
use common::SUBSCRIPTION;
use common::TENANT;
use tenant_gate_core::AdminOverride;
use tenant_gate_core::ApiKeyId;
use tenant_gate_core::ApiKeyRepository;
use tenant_gate_core::AuthorizationRequest;
use tenant_gate_core::CheckName;
use tenant_gate_core::CheckStatus;
use tenant_gate_core::DecisionReason;
use tenant_gate_core::FeatureFlag;
use tenant_gate_core::FeatureFlagId;
use tenant_gate_core::FeatureFlagRepository;
use tenant_gate_core::OverrideEffect;
use tenant_gate_core::OverrideId;
use tenant_gate_core::OverrideRepository;
use tenant_gate_core::Principal;
use tenant_gate_core::QuotaLevel;
use tenant_gate_core::QuotaPeriod;
use tenant_gate_core::Role;
use tenant_gate_core::ServiceName;
use tenant_gate_core::SessionId;
use tenant_gate_core::SubscriptionStatus;
use tenant_gate_core::TenantId;
use tenant_gate_core::Tier;
use tenant_gate_core::UserId;
use tenant_gate_core::tenant_cache_prefix;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn user_request(user: &str, session: Option<&str>) -> AuthorizationRequest {
    AuthorizationRequest::new(
        TenantId::new(TENANT),
        Principal::User {
            user_id: UserId::new(user),
            session_id: session.map(SessionId::new),
        },
        ServiceName::new(SERVICE),
        "read",
    )
}

fn member_request() -> AuthorizationRequest {
    user_request(MEMBER, Some(MEMBER_SESSION))
}

fn key_request(key: &str) -> AuthorizationRequest {
    AuthorizationRequest::new(
        TenantId::new(TENANT),
        Principal::ApiKey {
            api_key_id: ApiKeyId::new(key),
        },
        ServiceName::new(SERVICE),
        "read",
    )
}

async fn grant(fixture: &Fixture, id: &str, effect: OverrideEffect) {
    fixture
        .store
        .insert_override(&AdminOverride {
            id: OverrideId::new(id),
            tenant_id: TenantId::new(TENANT),
            effect,
            reason: Some("support ticket".to_string()),
            expires_at: None,
        })
        .await
        .expect("override");
}

// ============================================================================
// SECTION: Happy Path
// ============================================================================

#[tokio::test]
async fn valid_member_on_free_tier_is_allowed() {
    let fixture = Fixture::standard().await;
    let decision = fixture.engine().authorize(&member_request()).await;

    assert!(decision.allowed);
    assert_eq!(decision.reason, DecisionReason::Allowed);
    assert!(!decision.metadata.degraded);
    assert_eq!(decision.metadata.role, Some(Role::Member));
    assert_eq!(decision.metadata.tier, Some(Tier::Free));
    assert_eq!(decision.metadata.quota.as_ref().map(|quota| quota.level), Some(QuotaLevel::Unlimited));
    let meta = &decision.metadata;
    assert_eq!(meta.check(CheckName::Session), CheckStatus::Passed);
    assert_eq!(meta.check(CheckName::ApiKey), CheckStatus::Skipped);
    assert_eq!(meta.check(CheckName::Membership), CheckStatus::Passed);
    assert_eq!(meta.check(CheckName::Subscription), CheckStatus::Passed);
    assert_eq!(meta.check(CheckName::Service), CheckStatus::Passed);
    assert_eq!(meta.check(CheckName::Feature), CheckStatus::Skipped);
    assert_eq!(meta.check(CheckName::Quota), CheckStatus::Passed);
    assert_eq!(meta.check(CheckName::Rbac), CheckStatus::Skipped);
}

#[tokio::test]
async fn request_without_session_skips_session_stage() {
    let fixture = Fixture::standard().await;
    let decision = fixture.engine().authorize(&user_request(OWNER, None)).await;
    assert!(decision.allowed);
    assert_eq!(decision.metadata.check(CheckName::Session), CheckStatus::Skipped);
}

// ============================================================================
// SECTION: Session And Membership
// ============================================================================

#[tokio::test]
async fn missing_session_denies_before_later_stages() {
    let fixture = Fixture::standard().await;
    let decision = fixture.engine().authorize(&user_request(MEMBER, Some("sess_missing"))).await;

    assert!(!decision.allowed);
    assert_eq!(decision.reason, DecisionReason::SessionInvalid);
    assert_eq!(decision.message, "session is invalid or expired");
    let meta = &decision.metadata;
    assert_eq!(meta.check(CheckName::Session), CheckStatus::Failed);
    for later in [
        CheckName::Membership,
        CheckName::Overrides,
        CheckName::Subscription,
        CheckName::Service,
        CheckName::Feature,
        CheckName::Quota,
        CheckName::Rbac,
    ] {
        assert_eq!(meta.check(later), CheckStatus::NotRun, "{later:?}");
    }
    assert!(meta.quota.is_none());
}

#[tokio::test]
async fn expired_session_is_invalid() {
    let fixture = Fixture::standard().await;
    fixture.clock.advance_seconds(3_601);
    let decision = fixture.engine().authorize(&member_request()).await;
    assert_eq!(decision.reason, DecisionReason::SessionInvalid);
}

#[tokio::test]
async fn session_of_another_user_is_invalid() {
    let fixture = Fixture::standard().await;
    let decision = fixture.engine().authorize(&user_request(OWNER, Some(MEMBER_SESSION))).await;
    assert_eq!(decision.reason, DecisionReason::SessionInvalid);
}

#[tokio::test]
async fn session_bound_to_other_service_is_invalid_but_wildcard_is_not() {
    let fixture = Fixture::standard().await;
    fixture.session("sess_billing", MEMBER, TENANT, "billing", 600).await;
    fixture.session("sess_any", MEMBER, TENANT, "*", 600).await;
    let engine = fixture.engine();

    let bound = engine.authorize(&user_request(MEMBER, Some("sess_billing"))).await;
    assert_eq!(bound.reason, DecisionReason::SessionInvalid);
    let wildcard = engine.authorize(&user_request(MEMBER, Some("sess_any"))).await;
    assert!(wildcard.allowed);
}

#[tokio::test]
async fn session_for_other_tenant_is_invalid() {
    let fixture = Fixture::standard().await;
    fixture.session("sess_elsewhere", MEMBER, "tenant_xyz", SERVICE, 600).await;
    let decision = fixture.engine().authorize(&user_request(MEMBER, Some("sess_elsewhere"))).await;
    assert_eq!(decision.reason, DecisionReason::SessionInvalid);
}

#[tokio::test]
async fn non_member_is_denied() {
    let fixture = Fixture::standard().await;
    let decision = fixture.engine().authorize(&user_request("user_stranger", None)).await;
    assert_eq!(decision.reason, DecisionReason::NotAMember);
    assert_eq!(decision.message, "user is not a member of this tenant");
    assert_eq!(decision.metadata.check(CheckName::Subscription), CheckStatus::NotRun);
}

// ============================================================================
// SECTION: Subscription And Service
// ============================================================================

#[tokio::test]
async fn missing_and_inactive_subscriptions_deny() {
    let fixture = Fixture::standard().await;
    fixture.tenant("tenant_nosub", None).await;
    fixture.member("tenant_nosub", MEMBER, Role::Member).await;
    let mut request = user_request(MEMBER, None);
    request.tenant_id = TenantId::new("tenant_nosub");
    let engine = fixture.engine();
    assert_eq!(engine.authorize(&request).await.reason, DecisionReason::SubscriptionMissing);

    fixture.subscription(TENANT, SUBSCRIPTION, Tier::Pro, SubscriptionStatus::Canceled).await;
    let decision = engine.authorize(&member_request()).await;
    assert_eq!(decision.reason, DecisionReason::SubscriptionInactive);
}

#[tokio::test]
async fn missing_or_disabled_service_row_denies() {
    let fixture = Fixture::standard().await;
    let engine = fixture.engine();
    let mut request = member_request();
    fixture.session("sess_any", MEMBER, TENANT, "*", 600).await;
    request.principal = Principal::User {
        user_id: UserId::new(MEMBER),
        session_id: Some(SessionId::new("sess_any")),
    };
    request.service = ServiceName::new("analytics");
    assert_eq!(engine.authorize(&request).await.reason, DecisionReason::ServiceDisabled);

    fixture.service(SUBSCRIPTION, "analytics", false).await;
    assert_eq!(engine.authorize(&request).await.reason, DecisionReason::ServiceDisabled);
}

#[tokio::test]
async fn tier_upgrade_override_only_raises_tier() {
    let fixture = Fixture::standard().await;
    fixture.subscription(TENANT, SUBSCRIPTION, Tier::Pro, SubscriptionStatus::Active).await;
    grant(&fixture, "down", OverrideEffect::TierUpgrade(Tier::Free)).await;
    let engine = fixture.engine();
    assert_eq!(engine.authorize(&member_request()).await.metadata.tier, Some(Tier::Pro));

    grant(&fixture, "up", OverrideEffect::TierUpgrade(Tier::Enterprise)).await;
    assert_eq!(engine.authorize(&member_request()).await.metadata.tier, Some(Tier::Enterprise));
}

// ============================================================================
// SECTION: Feature, Quota, Role
// ============================================================================

#[tokio::test]
async fn required_feature_uses_grants_then_flags() {
    let fixture = Fixture::standard().await;
    fixture
        .store
        .upsert_feature_flag(&FeatureFlag {
            id: FeatureFlagId::new("flag_sso"),
            name: "sso".to_string(),
            description: None,
            enabled_tiers: vec![Tier::Enterprise],
            enabled_tenants: Vec::new(),
            rollout_percentage: 0,
            active: true,
        })
        .await
        .expect("flag");
    let engine = fixture.engine();
    let request = member_request().with_required_feature("sso");

    let denied = engine.authorize(&request).await;
    assert_eq!(denied.reason, DecisionReason::FeatureDisabled);
    assert_eq!(denied.metadata.check(CheckName::Quota), CheckStatus::NotRun);

    grant(&fixture, "tier", OverrideEffect::TierUpgrade(Tier::Enterprise)).await;
    assert!(engine.authorize(&request).await.allowed);

    let granted = member_request().with_required_feature("audit_log");
    assert_eq!(engine.authorize(&granted).await.reason, DecisionReason::FeatureDisabled);
    grant(&fixture, "grant", OverrideEffect::FeatureGrant("audit_log".to_string())).await;
    assert!(engine.authorize(&granted).await.allowed);
}

#[tokio::test]
async fn quota_denial_and_boost() {
    let fixture = Fixture::standard().await;
    fixture.tenant(TENANT, Some(10)).await;
    let engine = fixture.engine();
    let request = member_request().with_quantity(10);

    let denied = engine.authorize(&request).await;
    assert_eq!(denied.reason, DecisionReason::QuotaExceeded);
    assert_eq!(denied.metadata.check(CheckName::Rbac), CheckStatus::NotRun);
    let quota = denied.metadata.quota.expect("quota");
    assert_eq!(quota.level, QuotaLevel::Tenant);
    assert_eq!(quota.effective_limit, Some(9));

    grant(&fixture, "boost", OverrideEffect::QuotaBoost(5)).await;
    let boosted = engine.authorize(&request).await;
    assert!(boosted.allowed);
    let quota = boosted.metadata.quota.expect("quota");
    assert_eq!(quota.limit, Some(15));
    assert_eq!(quota.used, Some(0));
}

#[tokio::test]
async fn role_requirement_compares_ranks() {
    let fixture = Fixture::standard().await;
    fixture.member(TENANT, "user_admin", Role::Admin).await;
    let engine = fixture.engine();

    let member = engine.authorize(&member_request().with_required_role(Role::Admin)).await;
    assert_eq!(member.reason, DecisionReason::InsufficientRole);
    assert_eq!(member.metadata.check(CheckName::Rbac), CheckStatus::Failed);

    let admin = user_request("user_admin", None).with_required_role(Role::Admin);
    assert!(engine.authorize(&admin).await.allowed);
    let owner = user_request(OWNER, None).with_required_role(Role::Admin);
    assert!(engine.authorize(&owner).await.allowed);
    let owner_only = user_request("user_admin", None).with_required_role(Role::Owner);
    assert_eq!(engine.authorize(&owner_only).await.reason, DecisionReason::InsufficientRole);
}

// ============================================================================
// SECTION: API Key Principals
// ============================================================================

#[tokio::test]
async fn api_key_principal_replaces_session_and_membership() {
    let fixture = Fixture::standard().await;
    fixture.api_key("key_scoped", TENANT, &[SERVICE], None, QuotaPeriod::Month).await;
    let decision = fixture.engine().authorize(&key_request("key_scoped")).await;

    assert!(decision.allowed);
    assert_eq!(decision.metadata.role, Some(Role::Member));
    assert_eq!(decision.metadata.check(CheckName::ApiKey), CheckStatus::Passed);
    assert_eq!(decision.metadata.check(CheckName::Session), CheckStatus::Skipped);
    assert_eq!(decision.metadata.check(CheckName::Membership), CheckStatus::Skipped);
}

#[tokio::test]
async fn api_key_failures_deny() {
    let fixture = Fixture::standard().await;
    fixture.api_key("key_other_scope", TENANT, &["billing"], None, QuotaPeriod::Month).await;
    fixture.api_key("key_wild", TENANT, &["*"], None, QuotaPeriod::Month).await;
    fixture.api_key("key_foreign", "tenant_xyz", &[], None, QuotaPeriod::Month).await;
    fixture.api_key("key_revoked", TENANT, &[], None, QuotaPeriod::Month).await;
    fixture.store.revoke_api_key(&ApiKeyId::new("key_revoked")).await.expect("revoke");
    let engine = fixture.engine();

    assert_eq!(engine.authorize(&key_request("key_other_scope")).await.reason, DecisionReason::ApiKeyScope);
    assert!(engine.authorize(&key_request("key_wild")).await.allowed);
    assert_eq!(engine.authorize(&key_request("key_foreign")).await.reason, DecisionReason::ApiKeyInvalid);
    assert_eq!(engine.authorize(&key_request("key_revoked")).await.reason, DecisionReason::ApiKeyInvalid);
    assert_eq!(engine.authorize(&key_request("key_missing")).await.reason, DecisionReason::ApiKeyInvalid);
}

#[tokio::test]
async fn api_key_quota_is_enforced_at_key_level() {
    let fixture = Fixture::standard().await;
    fixture.api_key("key_small", TENANT, &[], Some(1), QuotaPeriod::Day).await;
    let decision = fixture.engine().authorize(&key_request("key_small")).await;
    assert_eq!(decision.reason, DecisionReason::QuotaExceeded);
    assert_eq!(decision.metadata.quota.map(|quota| quota.level), Some(QuotaLevel::ApiKey));
}

// ============================================================================
// SECTION: Failure Handling
// ============================================================================

#[tokio::test]
async fn store_outage_fails_closed() {
    let fixture = Fixture::standard().await;
    fixture.store.set_unavailable(true);
    let decision = fixture.engine().authorize(&member_request()).await;
    assert!(!decision.allowed);
    assert_eq!(decision.reason, DecisionReason::InternalError);
    assert_eq!(decision.message, "internal authorization error");
}

#[tokio::test]
async fn override_outage_does_not_abort_pipeline() {
    let fixture = Fixture::standard().await;
    fixture.store.set_overrides_unavailable(true);
    let decision = fixture.engine().authorize(&member_request()).await;
    assert!(decision.allowed);
    assert_eq!(decision.metadata.check(CheckName::Overrides), CheckStatus::Skipped);
    assert_eq!(decision.metadata.overrides.map(|parsed| parsed.is_empty()), Some(true));
}

// ============================================================================
// SECTION: Decision Cache
// ============================================================================

#[tokio::test]
async fn cache_hit_is_marked_degraded() {
    let fixture = Fixture::standard().await;
    let engine = fixture.cached_engine();
    let first = engine.authorize(&member_request()).await;
    assert!(!first.metadata.degraded);

    let second = engine.authorize(&member_request()).await;
    assert!(second.allowed);
    assert!(second.metadata.degraded);
    assert_eq!(second.metadata.evaluated_at, first.metadata.evaluated_at);
}

#[tokio::test]
async fn cache_entries_expire_after_ttl() {
    let fixture = Fixture::standard().await;
    let engine = fixture.cached_engine();
    engine.authorize(&member_request()).await;
    fixture.clock.advance_seconds(61);
    let fresh = engine.authorize(&member_request()).await;
    assert!(!fresh.metadata.degraded);
    assert_eq!(fresh.metadata.evaluated_at, fixture.now());
}

#[tokio::test]
async fn requirements_do_not_alias_in_cache() {
    let fixture = Fixture::standard().await;
    let engine = fixture.cached_engine();
    assert!(engine.authorize(&member_request()).await.allowed);
    let stricter = member_request().with_required_role(Role::Owner);
    assert_eq!(engine.authorize(&stricter).await.reason, DecisionReason::InsufficientRole);
}

#[test]
fn cache_keys_keep_segments_apart() {
    let request = |service: &str, action: &str| {
        AuthorizationRequest::new(
            TenantId::new(TENANT),
            Principal::User {
                user_id: UserId::new("u"),
                session_id: None,
            },
            ServiceName::new(service),
            action,
        )
    };
    assert_ne!(request("s:x", "y").cache_key(), request("s", "x:y").cache_key());
    assert_ne!(request("s", "y").cache_key(), request("s", "y").with_resource("*").cache_key());

    let slash_user = AuthorizationRequest::new(
        TenantId::new(TENANT),
        Principal::User {
            user_id: UserId::new("u/s"),
            session_id: None,
        },
        ServiceName::new(SERVICE),
        "read",
    );
    let user_with_session = AuthorizationRequest::new(
        TenantId::new(TENANT),
        Principal::User {
            user_id: UserId::new("u"),
            session_id: Some(SessionId::new("s")),
        },
        ServiceName::new(SERVICE),
        "read",
    );
    assert_ne!(slash_user.cache_key(), user_with_session.cache_key());

    let key = request("s", "y").cache_key();
    assert!(key.starts_with(&tenant_cache_prefix(&TenantId::new(TENANT))));
    let nested = AuthorizationRequest::new(
        TenantId::new(format!("{TENANT}:x")),
        Principal::User {
            user_id: UserId::new("u"),
            session_id: None,
        },
        ServiceName::new("s"),
        "y",
    );
    assert!(!nested.cache_key().starts_with(&tenant_cache_prefix(&TenantId::new(TENANT))));
}

#[tokio::test]
async fn separator_characters_do_not_share_cached_decisions() {
    let fixture = Fixture::standard().await;
    fixture.service(SUBSCRIPTION, "s:x", true).await;
    let engine = fixture.cached_engine();
    let request = |service: &str, action: &str| {
        AuthorizationRequest::new(
            TenantId::new(TENANT),
            Principal::User {
                user_id: UserId::new(MEMBER),
                session_id: None,
            },
            ServiceName::new(service),
            action,
        )
    };

    assert!(engine.authorize(&request("s:x", "y")).await.allowed);
    let other = engine.authorize(&request("s", "x:y")).await;
    assert_eq!(other.reason, DecisionReason::ServiceDisabled);
    assert!(!other.metadata.degraded);
}

#[tokio::test]
async fn stale_decision_is_served_when_store_fails() {
    let fixture = Fixture::standard().await;
    let engine = fixture.cached_engine();
    engine.authorize(&member_request()).await;
    fixture.clock.advance_seconds(120);
    fixture.store.set_unavailable(true);

    let decision = engine.authorize(&member_request()).await;
    assert!(decision.allowed);
    assert!(decision.metadata.degraded);
}

#[tokio::test]
async fn stale_decision_is_dropped_after_grace() {
    let fixture = Fixture::standard().await;
    let engine = fixture.cached_engine();
    assert!(engine.authorize(&member_request()).await.allowed);
    fixture.clock.advance_seconds(60 + 300 + 1);
    fixture.store.set_unavailable(true);

    let decision = engine.authorize(&member_request()).await;
    assert!(!decision.allowed);
    assert_eq!(decision.reason, DecisionReason::InternalError);
}

#[tokio::test]
async fn internal_errors_are_not_cached() {
    let fixture = Fixture::standard().await;
    let engine = fixture.cached_engine();
    fixture.store.set_unavailable(true);
    assert_eq!(engine.authorize(&member_request()).await.reason, DecisionReason::InternalError);
    fixture.store.set_unavailable(false);

    let recovered = engine.authorize(&member_request()).await;
    assert!(recovered.allowed);
    assert!(!recovered.metadata.degraded);
}

#[tokio::test]
async fn cache_outage_falls_back_to_pipeline() {
    let fixture = Fixture::standard().await;
    let engine = fixture.cached_engine();
    fixture.cache_backend.set_unavailable(true);
    let decision = engine.authorize(&member_request()).await;
    assert!(decision.allowed);
    assert!(!decision.metadata.degraded);
}

#[tokio::test]
async fn invalidate_tenant_drops_cached_decisions() {
    let fixture = Fixture::standard().await;
    let engine = fixture.cached_engine();
    engine.authorize(&member_request()).await;
    engine.authorize(&user_request(OWNER, None)).await;

    assert_eq!(engine.invalidate_tenant(&TenantId::new(TENANT)).await, 2);
    let decision = engine.authorize(&member_request()).await;
    assert!(!decision.metadata.degraded);
}

#[tokio::test]
async fn denials_are_cached_too() {
    let fixture = Fixture::standard().await;
    let engine = fixture.cached_engine();
    let request = user_request("user_stranger", None);
    assert_eq!(engine.authorize(&request).await.reason, DecisionReason::NotAMember);
    fixture.member(TENANT, "user_stranger", Role::Member).await;

    let cached = engine.authorize(&request).await;
    assert_eq!(cached.reason, DecisionReason::NotAMember);
    assert!(cached.metadata.degraded);
}
