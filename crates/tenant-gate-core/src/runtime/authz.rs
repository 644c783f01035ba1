// crates/tenant-gate-core/src/runtime/authz.rs
// ============================================================================
// Module: Tenant Gate Authorization Engine
// Description: Ordered, short-circuiting authorization decision pipeline.
// Purpose: Turn a principal and action context into an explained decision.
// Dependencies: thiserror, tracing, crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! Stages run in a fixed order and the first denial wins:
//! session or API key, membership, overrides, subscription, service,
//! feature, quota, role. Every stage is recorded in the decision's `checks`
//! map; stages after a denial stay `not_run`.
//!
//! ## Invariants
//! - The engine fails closed: store and quota errors become an
//!   `internal_error` deny, never a propagated error.
//! - Internal-error decisions are never cached.
//! - Decisions served from the decision cache are marked degraded.
//!
//! Security posture: authorization is a trust boundary; override fetch is the
//! only stage allowed to fail open (it contributes nothing when unavailable).

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::core::AuthorizationDecision;
use crate::core::AuthorizationRequest;
use crate::core::CheckName;
use crate::core::CheckStatus;
use crate::core::Clock;
use crate::core::DecisionMetadata;
use crate::core::DecisionReason;
use crate::core::ParsedOverrides;
use crate::core::Principal;
use crate::core::Role;
use crate::core::TenantId;
use crate::core::tenant_cache_prefix;
use crate::interfaces::ControlPlaneStore;
use crate::interfaces::StoreError;
use crate::runtime::cache::ReadThroughCache;
use crate::runtime::flags::FeatureFlagEngine;
use crate::runtime::overrides::OverrideEngine;
use crate::runtime::overrides::apply_quota_boost;
use crate::runtime::quota::QuotaEngine;
use crate::runtime::quota::QuotaError;
use crate::runtime::quota::QuotaSettings;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default decision cache freshness window.
pub const DEFAULT_DECISION_TTL_SECONDS: u64 = 60;
/// Default retention past freshness for stale fallback.
pub const DEFAULT_STALE_GRACE_SECONDS: u64 = 30;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Authorization engine settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthorizationSettings {
    /// Whether decisions are read from and written to the cache.
    pub cache_decisions: bool,
    /// Quota settings shared with the embedded quota engine.
    pub quota: QuotaSettings,
}

impl Default for AuthorizationSettings {
    fn default() -> Self {
        Self {
            cache_decisions: true,
            quota: QuotaSettings::default(),
        }
    }
}

/// Infrastructure failure inside the pipeline.
#[derive(Debug, Error)]
enum PipelineError {
    /// Store read failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Quota evaluation failed.
    #[error(transparent)]
    Quota(#[from] QuotaError),
}

// ============================================================================
// SECTION: Engine
// ============================================================================

/// Authorization decision pipeline.
#[derive(Clone)]
pub struct AuthorizationEngine {
    /// Relational store.
    store: Arc<dyn ControlPlaneStore>,
    /// Time source.
    clock: Arc<dyn Clock>,
    /// Quota engine.
    quota: QuotaEngine,
    /// Feature flag engine.
    flags: FeatureFlagEngine,
    /// Override engine.
    overrides: OverrideEngine,
    /// Decision cache.
    cache: Option<ReadThroughCache>,
    /// Engine settings.
    settings: AuthorizationSettings,
}

impl AuthorizationEngine {
    /// Creates an engine and its embedded quota, flag, and override engines.
    #[must_use]
    pub fn new(
        store: Arc<dyn ControlPlaneStore>,
        clock: Arc<dyn Clock>,
        cache: Option<ReadThroughCache>,
        settings: AuthorizationSettings,
    ) -> Self {
        let quota = QuotaEngine::new(Arc::clone(&store), Arc::clone(&clock), settings.quota);
        let flags = FeatureFlagEngine::new(Arc::clone(&store));
        let overrides = OverrideEngine::new(Arc::clone(&store), Arc::clone(&clock));
        Self {
            store,
            clock,
            quota,
            flags,
            overrides,
            cache,
            settings,
        }
    }

    /// Returns the embedded quota engine.
    #[must_use]
    pub const fn quota(&self) -> &QuotaEngine {
        &self.quota
    }

    /// Returns the embedded feature flag engine.
    #[must_use]
    pub const fn flags(&self) -> &FeatureFlagEngine {
        &self.flags
    }

    /// Returns the embedded override engine.
    #[must_use]
    pub const fn overrides(&self) -> &OverrideEngine {
        &self.overrides
    }

    /// Returns the decision cache, when caching is enabled.
    #[must_use]
    pub fn decision_cache(&self) -> Option<&ReadThroughCache> {
        self.cache.as_ref().filter(|_| self.settings.cache_decisions)
    }

    /// Authorizes a request. Never fails: infrastructure errors produce an
    /// `internal_error` deny (or a retained cached decision, degraded).
    pub async fn authorize(&self, request: &AuthorizationRequest) -> AuthorizationDecision {
        let key = request.cache_key();
        if let Some(cache) = self.decision_cache()
            && let Some(hit) = cache.lookup_fresh::<AuthorizationDecision>(&key).await
        {
            let mut decision = hit.value;
            decision.metadata.degraded = true;
            debug!(
                tenant_id = %request.tenant_id,
                allowed = decision.allowed,
                reason = decision.reason.code(),
                "authorization served from decision cache"
            );
            return decision;
        }

        let mut metadata = DecisionMetadata::new(self.clock.now());
        let decision = match self.evaluate(request, &mut metadata).await {
            Ok(DecisionReason::Allowed) => AuthorizationDecision::allow(metadata),
            Ok(reason) => AuthorizationDecision::deny(reason, metadata),
            Err(err) => {
                error!(
                    tenant_id = %request.tenant_id,
                    service = %request.service,
                    error = %err,
                    "authorization pipeline failed"
                );
                if let Some(cache) = self.decision_cache()
                    && let Some(stale) = cache.lookup_stale::<AuthorizationDecision>(&key).await
                {
                    warn!(
                        tenant_id = %request.tenant_id,
                        "serving stale cached decision after pipeline failure"
                    );
                    let mut decision = stale.value;
                    decision.metadata.degraded = true;
                    return decision;
                }
                return AuthorizationDecision::deny(DecisionReason::InternalError, metadata);
            }
        };

        if decision.allowed {
            debug!(tenant_id = %request.tenant_id, service = %request.service, "authorization allowed");
        } else {
            info!(
                tenant_id = %request.tenant_id,
                service = %request.service,
                reason = decision.reason.code(),
                "authorization denied"
            );
        }
        if let Some(cache) = self.decision_cache() {
            cache.store(&key, &decision).await;
        }
        decision
    }

    /// Drops every cached decision for a tenant; returns the count removed.
    pub async fn invalidate_tenant(&self, tenant_id: &TenantId) -> u64 {
        match &self.cache {
            Some(cache) => cache.invalidate_prefix(&tenant_cache_prefix(tenant_id)).await,
            None => 0,
        }
    }

    /// Runs the pipeline, recording stage outcomes into `meta`.
    ///
    /// Returns the decision reason; [`DecisionReason::Allowed`] when every
    /// stage passed.
    async fn evaluate(
        &self,
        request: &AuthorizationRequest,
        meta: &mut DecisionMetadata,
    ) -> Result<DecisionReason, PipelineError> {
        let now = meta.evaluated_at;
        let tenant_id = &request.tenant_id;

        let role = match &request.principal {
            Principal::User {
                user_id,
                session_id,
            } => {
                mark(meta, CheckName::ApiKey, CheckStatus::Skipped);
                if let Some(session_id) = session_id {
                    let session = self.store.get_session(session_id).await?;
                    let valid = session.is_some_and(|session| {
                        session.is_live(now)
                            && &session.user_id == user_id
                            && &session.tenant_id == tenant_id
                            && session.covers_service(&request.service)
                    });
                    if !valid {
                        return Ok(fail(meta, CheckName::Session, DecisionReason::SessionInvalid));
                    }
                    mark(meta, CheckName::Session, CheckStatus::Passed);
                } else {
                    mark(meta, CheckName::Session, CheckStatus::Skipped);
                }
                let Some(membership) = self.store.get_membership(tenant_id, user_id).await? else {
                    return Ok(fail(meta, CheckName::Membership, DecisionReason::NotAMember));
                };
                mark(meta, CheckName::Membership, CheckStatus::Passed);
                membership.role
            }
            Principal::ApiKey {
                api_key_id,
            } => {
                mark(meta, CheckName::Session, CheckStatus::Skipped);
                let key = self.store.get_api_key(api_key_id).await?;
                let Some(key) = key.filter(|key| &key.tenant_id == tenant_id && key.is_usable(now))
                else {
                    return Ok(fail(meta, CheckName::ApiKey, DecisionReason::ApiKeyInvalid));
                };
                if !key.allows_service(&request.service) {
                    return Ok(fail(meta, CheckName::ApiKey, DecisionReason::ApiKeyScope));
                }
                mark(meta, CheckName::ApiKey, CheckStatus::Passed);
                mark(meta, CheckName::Membership, CheckStatus::Skipped);
                Role::Member
            }
        };
        meta.role = Some(role);

        let overrides = match self.overrides.parsed_overrides(tenant_id).await {
            Ok(parsed) => {
                mark(meta, CheckName::Overrides, CheckStatus::Passed);
                parsed
            }
            Err(err) => {
                warn!(tenant_id = %tenant_id, error = %err, "override fetch failed; continuing without overrides");
                mark(meta, CheckName::Overrides, CheckStatus::Skipped);
                ParsedOverrides::default()
            }
        };
        meta.overrides = Some(overrides.clone());

        let Some(subscription) = self.store.get_subscription_for_tenant(tenant_id).await? else {
            return Ok(fail(meta, CheckName::Subscription, DecisionReason::SubscriptionMissing));
        };
        if !subscription.is_active() {
            return Ok(fail(meta, CheckName::Subscription, DecisionReason::SubscriptionInactive));
        }
        let tier = match overrides.tier_upgrade {
            Some(upgrade) if upgrade.rank() > subscription.tier.rank() => upgrade,
            _ => subscription.tier,
        };
        meta.tier = Some(tier);
        mark(meta, CheckName::Subscription, CheckStatus::Passed);

        let item = self.store.get_subscription_item(&subscription.id, &request.service).await?;
        if !item.is_some_and(|item| item.enabled) {
            return Ok(fail(meta, CheckName::Service, DecisionReason::ServiceDisabled));
        }
        mark(meta, CheckName::Service, CheckStatus::Passed);

        if let Some(feature) = &request.required_feature {
            let enabled = overrides.grants_feature(feature)
                || self.flags.feature_enabled(feature, tenant_id, Some(tier)).await?;
            if !enabled {
                return Ok(fail(meta, CheckName::Feature, DecisionReason::FeatureDisabled));
            }
            mark(meta, CheckName::Feature, CheckStatus::Passed);
        } else {
            mark(meta, CheckName::Feature, CheckStatus::Skipped);
        }

        let api_key_id = match &request.principal {
            Principal::ApiKey {
                api_key_id,
            } => Some(api_key_id),
            Principal::User {
                ..
            } => None,
        };
        let observed = self.quota.check_quota(tenant_id, request.quantity, api_key_id).await?;
        let quota = apply_quota_boost(
            &observed,
            overrides.quota_boost,
            request.quantity,
            self.settings.quota.safety_buffer_percent,
        );
        let quota_allowed = quota.allowed;
        meta.quota = Some(quota);
        if !quota_allowed {
            return Ok(fail(meta, CheckName::Quota, DecisionReason::QuotaExceeded));
        }
        mark(meta, CheckName::Quota, CheckStatus::Passed);

        if let Some(required) = request.required_role {
            if !role.satisfies(required) {
                return Ok(fail(meta, CheckName::Rbac, DecisionReason::InsufficientRole));
            }
            mark(meta, CheckName::Rbac, CheckStatus::Passed);
        } else {
            mark(meta, CheckName::Rbac, CheckStatus::Skipped);
        }

        Ok(DecisionReason::Allowed)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Records a stage outcome.
fn mark(meta: &mut DecisionMetadata, name: CheckName, status: CheckStatus) {
    meta.checks.insert(name, status);
}

/// Records a failed stage and returns its reason.
fn fail(meta: &mut DecisionMetadata, name: CheckName, reason: DecisionReason) -> DecisionReason {
    mark(meta, name, CheckStatus::Failed);
    reason
}
