// crates/tenant-gate-core/src/runtime/flags.rs
// ============================================================================
// Module: Tenant Gate Feature Flag Engine
// Description: Tenant, tier, and percentage-rollout flag evaluation.
// Purpose: Decide whether a named feature is enabled for a tenant.
// Dependencies: tracing, crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! Evaluation order, first match wins: inactive flags are off; explicitly
//! listed tenants are on; a tenant whose tier is listed is on; otherwise the
//! deterministic rollout bucket decides. Unknown flags are off.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::core::FeatureFlag;
use crate::core::MAX_ROLLOUT_PERCENTAGE;
use crate::core::TenantId;
use crate::core::Tier;
use crate::core::rollout_bucket;
use crate::interfaces::ControlPlaneStore;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: Evaluation
// ============================================================================

/// Evaluates a loaded flag for a tenant with an already resolved tier.
#[must_use]
pub fn evaluate_flag(flag: &FeatureFlag, tenant_id: &TenantId, tier: Option<Tier>) -> bool {
    if !flag.active {
        return false;
    }
    if flag.enabled_tenants.contains(tenant_id) {
        return true;
    }
    if let Some(tier) = tier
        && flag.enabled_tiers.contains(&tier)
    {
        return true;
    }
    rollout_enabled(flag, tenant_id)
}

/// Returns true when the tenant's rollout bucket falls under the percentage.
fn rollout_enabled(flag: &FeatureFlag, tenant_id: &TenantId) -> bool {
    match flag.rollout_percentage {
        0 => false,
        pct if pct >= MAX_ROLLOUT_PERCENTAGE => true,
        pct => rollout_bucket(tenant_id, &flag.name) < pct,
    }
}

/// Returns true when evaluating `flag` needs the tenant's tier.
fn needs_tier(flag: &FeatureFlag, tenant_id: &TenantId) -> bool {
    flag.active && !flag.enabled_tiers.is_empty() && !flag.enabled_tenants.contains(tenant_id)
}

// ============================================================================
// SECTION: Engine
// ============================================================================

/// Feature flag evaluation against the store.
#[derive(Clone)]
pub struct FeatureFlagEngine {
    /// Relational store.
    store: Arc<dyn ControlPlaneStore>,
}

impl FeatureFlagEngine {
    /// Creates a flag engine.
    #[must_use]
    pub fn new(store: Arc<dyn ControlPlaneStore>) -> Self {
        Self {
            store,
        }
    }

    /// Returns the tier of the tenant's active subscription, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails.
    pub async fn resolve_tier(&self, tenant_id: &TenantId) -> Result<Option<Tier>, StoreError> {
        let subscription = self.store.get_subscription_for_tenant(tenant_id).await?;
        Ok(subscription.filter(|sub| sub.is_active()).map(|sub| sub.tier))
    }

    /// Evaluates one flag. A missing flag is disabled.
    ///
    /// When `tier` is `None` and the flag targets tiers, the tier is looked
    /// up from the tenant's active subscription.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when a lookup fails.
    pub async fn feature_enabled(
        &self,
        flag_name: &str,
        tenant_id: &TenantId,
        tier: Option<Tier>,
    ) -> Result<bool, StoreError> {
        let Some(flag) = self.store.get_feature_flag(flag_name).await? else {
            debug!(flag = flag_name, "feature flag not found; treating as disabled");
            return Ok(false);
        };
        let tier = match tier {
            Some(tier) => Some(tier),
            None if needs_tier(&flag, tenant_id) => self.resolve_tier(tenant_id).await?,
            None => None,
        };
        Ok(evaluate_flag(&flag, tenant_id, tier))
    }

    /// Evaluates several flags, resolving the tier at most once.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when a lookup fails.
    pub async fn features_enabled(
        &self,
        flag_names: &[String],
        tenant_id: &TenantId,
        tier: Option<Tier>,
    ) -> Result<BTreeMap<String, bool>, StoreError> {
        let mut resolved: Option<Option<Tier>> = tier.map(Some);
        let mut results = BTreeMap::new();
        for name in flag_names {
            let Some(flag) = self.store.get_feature_flag(name).await? else {
                results.insert(name.clone(), false);
                continue;
            };
            let effective_tier = match resolved {
                Some(tier) => tier,
                None if needs_tier(&flag, tenant_id) => {
                    let tier = self.resolve_tier(tenant_id).await?;
                    resolved = Some(tier);
                    tier
                }
                None => None,
            };
            results.insert(name.clone(), evaluate_flag(&flag, tenant_id, effective_tier));
        }
        Ok(results)
    }
}
