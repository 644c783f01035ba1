// crates/tenant-gate-core/tests/overrides.rs
// ============================================================================
// Module: Override Engine Tests
// Description: Tests for override folding, expiry, boosts, and cleanup.
// Purpose: Validate how admin overrides merge into one effect.
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
use common::TENANT;
use tenant_gate_core::AdminOverride;
use tenant_gate_core::OverrideEffect;
use tenant_gate_core::OverrideEngine;
use tenant_gate_core::OverrideId;
use tenant_gate_core::OverrideRepository;
use tenant_gate_core::QuotaCheck;
use tenant_gate_core::QuotaLevel;
use tenant_gate_core::TenantId;
use tenant_gate_core::Tier;
use tenant_gate_core::Timestamp;
use tenant_gate_core::apply_quota_boost;
use tenant_gate_core::fold_overrides;
use tenant_gate_core::runtime::quota::evaluate_quota;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn row(id: &str, effect: OverrideEffect, expires_at: Option<Timestamp>) -> AdminOverride {
    AdminOverride {
        id: OverrideId::new(id),
        tenant_id: TenantId::new(TENANT),
        effect,
        reason: None,
        expires_at,
    }
}

// ============================================================================
// SECTION: Folding
// ============================================================================

#[test]
fn fold_sums_boosts_keeps_highest_tier_and_dedupes_grants() {
    let now = Timestamp::from_unix_millis(1_000);
    let rows = vec![
        row("o1", OverrideEffect::QuotaBoost(500), None),
        row("o2", OverrideEffect::QuotaBoost(-200), None),
        row("o3", OverrideEffect::TierUpgrade(Tier::Enterprise), None),
        row("o4", OverrideEffect::TierUpgrade(Tier::Pro), None),
        row("o5", OverrideEffect::FeatureGrant("sso".to_string()), None),
        row("o6", OverrideEffect::FeatureGrant("sso".to_string()), None),
        row("o7", OverrideEffect::FeatureGrant("audit".to_string()), None),
    ];
    let parsed = fold_overrides(&rows, now);
    assert_eq!(parsed.quota_boost, 300);
    assert_eq!(parsed.tier_upgrade, Some(Tier::Enterprise));
    assert_eq!(parsed.feature_grants.len(), 2);
    assert!(parsed.grants_feature("sso"));
}

#[test]
fn expired_overrides_are_ignored() {
    let now = Timestamp::from_unix_millis(10_000);
    let rows = vec![
        row("past", OverrideEffect::QuotaBoost(50), Some(Timestamp::from_unix_millis(10_000))),
        row("future", OverrideEffect::QuotaBoost(7), Some(Timestamp::from_unix_millis(10_001))),
    ];
    assert_eq!(fold_overrides(&rows, now).quota_boost, 7);
    assert!(fold_overrides(&[], now).is_empty());
}

// ============================================================================
// SECTION: Quota Boost
// ============================================================================

#[test]
fn boost_recomputes_from_the_boosted_limit() {
    let observed = evaluate_quota(QuotaLevel::Tenant, 100, 99, 1, 99);
    assert!(!observed.allowed);
    let boosted = apply_quota_boost(&observed, 100, 1, 99);
    assert_eq!(boosted.limit, Some(200));
    assert_eq!(boosted.effective_limit, Some(198));
    assert_eq!(boosted.used, Some(99));
    assert_eq!(boosted.remaining, 98);
    assert!(boosted.allowed);
}

#[test]
fn negative_boost_clamps_limit_at_zero() {
    let observed = evaluate_quota(QuotaLevel::ApiKey, 10, 0, 1, 99);
    let boosted = apply_quota_boost(&observed, -50, 1, 99);
    assert_eq!(boosted.limit, Some(0));
    assert!(!boosted.allowed);
}

#[test]
fn unlimited_results_ignore_boosts() {
    let unlimited = QuotaCheck::unlimited();
    assert_eq!(apply_quota_boost(&unlimited, -1_000, 5, 99), unlimited);
}

// ============================================================================
// SECTION: Engine
// ============================================================================

#[tokio::test]
async fn engine_reads_active_overrides_and_cleans_up_explicitly() {
    let fixture = Fixture::standard().await;
    let soon = fixture.now().plus_seconds(60);
    fixture
        .store
        .insert_override(&row("short", OverrideEffect::QuotaBoost(10), Some(soon)))
        .await
        .expect("insert");
    fixture
        .store
        .insert_override(&row("forever", OverrideEffect::FeatureGrant("sso".into()), None))
        .await
        .expect("insert");
    let engine = OverrideEngine::new(fixture.dyn_store(), fixture.dyn_clock());
    let tenant = TenantId::new(TENANT);

    assert_eq!(engine.parsed_overrides(&tenant).await.expect("parsed").quota_boost, 10);
    fixture.clock.advance_seconds(120);
    assert_eq!(engine.parsed_overrides(&tenant).await.expect("parsed").quota_boost, 0);

    // Expired rows are still stored until cleanup runs.
    let removed = engine.cleanup_expired().await.expect("cleanup");
    assert_eq!(removed, 1);
    assert_eq!(engine.cleanup_expired().await.expect("cleanup"), 0);
    assert_eq!(engine.active_overrides(&tenant).await.expect("active").len(), 1);
}
