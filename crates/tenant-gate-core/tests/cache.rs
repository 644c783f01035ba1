// crates/tenant-gate-core/tests/cache.rs
// ============================================================================
// Module: Read-Through Cache Tests
// Description: Tests for freshness, retention, and stale fallback.
// Purpose: Validate that cache failures never fail reads.
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
use tenant_gate_core::CacheSource;
use tenant_gate_core::CacheStore;

#[tokio::test]
async fn get_or_fetch_caches_primary_values() {
    let fixture = Fixture::empty();
    let cache = fixture.decision_cache();

    let first = cache.get_or_fetch("k", || async { Ok::<_, String>(7_u32) }).await.expect("fetch");
    assert_eq!(first.source, CacheSource::Primary);
    assert!(!first.degraded);

    let second =
        cache.get_or_fetch("k", || async { Err::<u32, _>("not called".to_string()) }).await.expect("hit");
    assert_eq!(second.value, 7);
    assert_eq!(second.source, CacheSource::CacheHit);
    assert!(!second.degraded);
}

#[tokio::test]
async fn stale_entry_is_served_only_when_primary_fails() {
    let fixture = Fixture::empty();
    let cache = fixture.decision_cache();
    cache.store("k", &1_u32).await;
    fixture.clock.advance_seconds(61);
    assert!(cache.lookup_fresh::<u32>("k").await.is_none());

    let refreshed = cache.get_or_fetch("k", || async { Ok::<_, String>(2_u32) }).await.expect("fetch");
    assert_eq!(refreshed.value, 2);
    assert_eq!(refreshed.source, CacheSource::Primary);

    fixture.clock.advance_seconds(61);
    let stale = cache
        .get_or_fetch("k", || async { Err::<u32, _>("primary down".to_string()) })
        .await
        .expect("stale");
    assert_eq!(stale.value, 2);
    assert!(stale.degraded);
    assert_eq!(stale.source, CacheSource::StaleFallback);
}

#[tokio::test]
async fn entries_past_the_grace_window_are_gone() {
    let fixture = Fixture::empty();
    let cache = fixture.decision_cache();
    cache.store("k", &1_u32).await;
    fixture.clock.advance_seconds(360);

    let result = cache.get_or_fetch("k", || async { Err::<u32, _>("primary down".to_string()) }).await;
    assert_eq!(result.expect_err("no fallback"), "primary down");
    assert!(fixture.cache_backend.is_empty().expect("len"));
}

#[tokio::test]
async fn backend_outage_is_a_miss_not_an_error() {
    let fixture = Fixture::empty();
    let cache = fixture.decision_cache();
    cache.store("k", &1_u32).await;
    fixture.cache_backend.set_unavailable(true);

    assert!(cache.lookup_fresh::<u32>("k").await.is_none());
    let read = cache.get_or_fetch("k", || async { Ok::<_, String>(9_u32) }).await.expect("fetch");
    assert_eq!(read.value, 9);
    assert_eq!(cache.invalidate_prefix("k").await, 0);
}

#[tokio::test]
async fn malformed_payload_is_a_miss() {
    let fixture = Fixture::empty();
    let cache = fixture.decision_cache();
    cache.store("k", &"text").await;
    assert!(cache.lookup_fresh::<u32>("k").await.is_none());
}

#[tokio::test]
async fn prefix_invalidation_only_touches_matching_keys() {
    let fixture = Fixture::empty();
    let cache = fixture.decision_cache();
    cache.store("authz:tenant_a:1", &1_u32).await;
    cache.store("authz:tenant_a:2", &2_u32).await;
    cache.store("authz:tenant_ab:1", &3_u32).await;

    assert_eq!(cache.invalidate_prefix("authz:tenant_a:").await, 2);
    assert!(cache.lookup_fresh::<u32>("authz:tenant_ab:1").await.is_some());
    cache.invalidate("authz:tenant_ab:1").await;
    assert_eq!(fixture.cache_backend.len().expect("len"), 0);
    assert!(fixture.cache_backend.get("authz:tenant_ab:1").await.expect("get").is_none());
}
