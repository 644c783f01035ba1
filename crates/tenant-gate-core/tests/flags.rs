// crates/tenant-gate-core/tests/flags.rs
// ============================================================================
// Module: Feature Flag Tests
// Description: Tests for flag evaluation order and tier resolution.
// Purpose: Validate tenant, tier, and rollout targeting.
// Dependencies: tenant-gate-core, tokio
// ============================================================================

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    reason = "Test-only assertions and helpers are permitted."
)]

mod common;

use common::Fixture;
use common::SUBSCRIPTION;
use common::TENANT;
use tenant_gate_core::FeatureFlag;
use tenant_gate_core::FeatureFlagEngine;
use tenant_gate_core::FeatureFlagId;
use tenant_gate_core::FeatureFlagRepository;
use tenant_gate_core::SubscriptionStatus;
use tenant_gate_core::TenantId;
use tenant_gate_core::Tier;
use tenant_gate_core::evaluate_flag;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn flag(name: &str) -> FeatureFlag {
    FeatureFlag {
        id: FeatureFlagId::new(format!("flag_{name}")),
        name: name.to_string(),
        description: None,
        enabled_tiers: Vec::new(),
        enabled_tenants: Vec::new(),
        rollout_percentage: 0,
        active: true,
    }
}

// ============================================================================
// SECTION: Pure Evaluation
// ============================================================================

#[test]
fn tier_targeting_enables_listed_tiers_only() {
    let mut paid = flag("reports_v2");
    paid.enabled_tiers = vec![Tier::Pro, Tier::Enterprise];
    let tenant = TenantId::new(TENANT);
    assert!(evaluate_flag(&paid, &tenant, Some(Tier::Pro)));
    assert!(evaluate_flag(&paid, &tenant, Some(Tier::Enterprise)));
    assert!(!evaluate_flag(&paid, &tenant, Some(Tier::Free)));
    assert!(!evaluate_flag(&paid, &tenant, None));
}

#[test]
fn inactive_flag_wins_over_every_target() {
    let mut off = flag("beta");
    off.active = false;
    off.enabled_tenants = vec![TenantId::new(TENANT)];
    off.enabled_tiers = vec![Tier::Free];
    off.rollout_percentage = 100;
    assert!(!evaluate_flag(&off, &TenantId::new(TENANT), Some(Tier::Free)));
}

#[test]
fn listed_tenant_is_enabled_regardless_of_tier() {
    let mut targeted = flag("beta");
    targeted.enabled_tenants = vec![TenantId::new(TENANT)];
    targeted.enabled_tiers = vec![Tier::Enterprise];
    assert!(evaluate_flag(&targeted, &TenantId::new(TENANT), Some(Tier::Free)));
    assert!(!evaluate_flag(&targeted, &TenantId::new("tenant_other"), Some(Tier::Free)));
}

#[test]
fn rollout_uses_the_tenant_bucket() {
    // tenant_abc:beta lands in bucket 81.
    let tenant = TenantId::new(TENANT);
    let mut rollout = flag("beta");
    rollout.rollout_percentage = 82;
    assert!(evaluate_flag(&rollout, &tenant, None));
    rollout.rollout_percentage = 81;
    assert!(!evaluate_flag(&rollout, &tenant, None));
    rollout.rollout_percentage = 100;
    assert!(evaluate_flag(&rollout, &tenant, None));
    rollout.rollout_percentage = 0;
    assert!(!evaluate_flag(&rollout, &tenant, None));
}

#[test]
fn rollout_is_stable_across_calls() {
    let mut rollout = flag("new_dashboard");
    rollout.rollout_percentage = 50;
    let tenant = TenantId::new(TENANT);
    let first = evaluate_flag(&rollout, &tenant, None);
    for _ in 0..10 {
        assert_eq!(evaluate_flag(&rollout, &tenant, None), first);
    }
}

// ============================================================================
// SECTION: Engine
// ============================================================================

#[tokio::test]
async fn missing_flag_is_disabled() {
    let fixture = Fixture::standard().await;
    let engine = FeatureFlagEngine::new(fixture.dyn_store());
    let enabled = engine.feature_enabled("nope", &TenantId::new(TENANT), None).await.expect("eval");
    assert!(!enabled);
}

#[tokio::test]
async fn tier_is_resolved_from_active_subscription() {
    let fixture = Fixture::standard().await;
    fixture.subscription(TENANT, SUBSCRIPTION, Tier::Pro, SubscriptionStatus::Active).await;
    let mut paid = flag("reports_v2");
    paid.enabled_tiers = vec![Tier::Pro];
    fixture.store.upsert_feature_flag(&paid).await.expect("flag");
    let engine = FeatureFlagEngine::new(fixture.dyn_store());
    let tenant = TenantId::new(TENANT);

    assert!(engine.feature_enabled("reports_v2", &tenant, None).await.expect("eval"));
    assert!(!engine.feature_enabled("reports_v2", &tenant, Some(Tier::Free)).await.expect("eval"));

    fixture.subscription(TENANT, SUBSCRIPTION, Tier::Pro, SubscriptionStatus::PastDue).await;
    assert!(!engine.feature_enabled("reports_v2", &tenant, None).await.expect("eval"));
}

#[tokio::test]
async fn batch_evaluation_reports_every_flag() {
    let fixture = Fixture::standard().await;
    let mut paid = flag("paid");
    paid.enabled_tiers = vec![Tier::Free];
    let mut targeted = flag("targeted");
    targeted.enabled_tenants = vec![TenantId::new(TENANT)];
    fixture.store.upsert_feature_flag(&paid).await.expect("flag");
    fixture.store.upsert_feature_flag(&targeted).await.expect("flag");
    let engine = FeatureFlagEngine::new(fixture.dyn_store());

    let names = vec!["paid".to_string(), "targeted".to_string(), "missing".to_string()];
    let results = engine.features_enabled(&names, &TenantId::new(TENANT), None).await.expect("eval");
    assert_eq!(results.len(), 3);
    assert_eq!(results.get("paid"), Some(&true));
    assert_eq!(results.get("targeted"), Some(&true));
    assert_eq!(results.get("missing"), Some(&false));
}

#[tokio::test]
async fn store_failure_surfaces_as_error() {
    let fixture = Fixture::standard().await;
    fixture.store.set_unavailable(true);
    let engine = FeatureFlagEngine::new(fixture.dyn_store());
    assert!(engine.feature_enabled("beta", &TenantId::new(TENANT), None).await.is_err());
}
