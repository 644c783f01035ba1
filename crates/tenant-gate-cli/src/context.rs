// crates/tenant-gate-cli/src/context.rs
// ============================================================================
// Module: Control Plane Context
// Description: Engine assembly over the configured store and cache.
// Purpose: Build every engine the CLI commands call from one config.
// Dependencies: tenant-gate-config, tenant-gate-core, tenant-gate-store-sqlite
// ============================================================================

//! ## Overview
//! The store is always `SQLite`; the decision cache backend follows
//! `[cache]`. Membership and API key services share the decision cache so
//! their writes invalidate cached decisions.

use std::sync::Arc;

use tenant_gate_config::TenantGateConfig;
use tenant_gate_core::ApiKeyIssuer;
use tenant_gate_core::AuthorizationEngine;
use tenant_gate_core::CacheStore;
use tenant_gate_core::Clock;
use tenant_gate_core::ControlPlaneStore;
use tenant_gate_core::FeatureFlagEngine;
use tenant_gate_core::InMemoryCacheStore;
use tenant_gate_core::MembershipService;
use tenant_gate_core::OverrideEngine;
use tenant_gate_core::QuotaEngine;
use tenant_gate_core::ReadThroughCache;
use tenant_gate_store_sqlite::SqliteCacheStore;
use tenant_gate_store_sqlite::SqliteStore;
use tenant_gate_store_sqlite::SqliteStoreError;
use thiserror::Error;
use tracing::debug;

/// Errors raised while assembling the control plane.
#[derive(Debug, Error)]
pub enum ControlPlaneError {
    /// Control plane store could not be opened.
    #[error("failed to open store: {0}")]
    Store(SqliteStoreError),
    /// Cache database could not be opened.
    #[error("failed to open cache: {0}")]
    Cache(SqliteStoreError),
}

/// Engines wired over one store, clock, and decision cache.
#[derive(Clone)]
pub struct ControlPlane {
    /// Relational store.
    store: Arc<SqliteStore>,
    /// Time source shared by every engine.
    clock: Arc<dyn Clock>,
    /// Decision cache shared by every engine.
    cache: ReadThroughCache,
    /// Authorization pipeline (owns quota, flag, and override engines).
    authorization: AuthorizationEngine,
    /// Membership service.
    membership: MembershipService,
    /// API key issuer.
    api_keys: ApiKeyIssuer,
}

impl ControlPlane {
    /// Opens the store and cache described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ControlPlaneError`] when either database cannot be opened.
    pub fn open(config: &TenantGateConfig, clock: Arc<dyn Clock>) -> Result<Self, ControlPlaneError> {
        let store = Arc::new(SqliteStore::new(config.store.clone()).map_err(ControlPlaneError::Store)?);
        let backend: Arc<dyn CacheStore> = match config.cache_store_config() {
            Some(cache_config) => Arc::new(
                SqliteCacheStore::new(&cache_config, Arc::clone(&clock))
                    .map_err(ControlPlaneError::Cache)?,
            ),
            None => Arc::new(InMemoryCacheStore::new(Arc::clone(&clock))),
        };
        debug!(
            persistent = config.cache_store_config().is_some(),
            "decision cache backend selected"
        );
        let cache = ReadThroughCache::new(
            backend,
            Arc::clone(&clock),
            config.decision_cache.ttl_seconds,
            config.decision_cache.stale_grace_seconds,
        );
        let shared: Arc<dyn ControlPlaneStore> = Arc::<SqliteStore>::clone(&store);
        let authorization = AuthorizationEngine::new(
            Arc::clone(&shared),
            Arc::clone(&clock),
            Some(cache.clone()),
            config.authorization_settings(),
        );
        let membership = MembershipService::new(Arc::clone(&shared), Some(cache.clone()));
        let api_keys = ApiKeyIssuer::new(shared, Arc::clone(&clock), Some(cache.clone()));
        Ok(Self {
            store,
            clock,
            cache,
            authorization,
            membership,
            api_keys,
        })
    }

    /// Returns the `SQLite` store.
    #[must_use]
    pub const fn store(&self) -> &Arc<SqliteStore> {
        &self.store
    }

    /// Returns the clock.
    #[must_use]
    pub const fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Returns the decision cache.
    #[must_use]
    pub const fn cache(&self) -> &ReadThroughCache {
        &self.cache
    }

    /// Returns the authorization engine.
    #[must_use]
    pub const fn authorization(&self) -> &AuthorizationEngine {
        &self.authorization
    }

    /// Returns the quota engine.
    #[must_use]
    pub const fn quota(&self) -> &QuotaEngine {
        self.authorization.quota()
    }

    /// Returns the feature flag engine.
    #[must_use]
    pub const fn flags(&self) -> &FeatureFlagEngine {
        self.authorization.flags()
    }

    /// Returns the override engine.
    #[must_use]
    pub const fn overrides(&self) -> &OverrideEngine {
        self.authorization.overrides()
    }

    /// Returns the membership service.
    #[must_use]
    pub const fn membership(&self) -> &MembershipService {
        &self.membership
    }

    /// Returns the API key issuer.
    #[must_use]
    pub const fn api_keys(&self) -> &ApiKeyIssuer {
        &self.api_keys
    }
}
