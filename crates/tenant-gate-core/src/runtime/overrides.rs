// crates/tenant-gate-core/src/runtime/overrides.rs
// ============================================================================
// Module: Tenant Gate Override Engine
// Description: Folds active admin overrides into one per-tenant effect.
// Purpose: Resolve quota boosts, tier upgrades, and feature grants.
// Dependencies: tracing, crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! Overrides are read fresh on every call; expiry is decided by comparing
//! `expires_at` to the injected clock. Reads never delete rows; expired
//! overrides linger until [`OverrideEngine::cleanup_expired`] runs.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use tracing::info;

use crate::core::AdminOverride;
use crate::core::Clock;
use crate::core::OverrideEffect;
use crate::core::ParsedOverrides;
use crate::core::QuotaCheck;
use crate::core::QuotaLevel;
use crate::core::TenantId;
use crate::core::Timestamp;
use crate::interfaces::ControlPlaneStore;
use crate::interfaces::StoreError;
use crate::runtime::quota::evaluate_quota;

// ============================================================================
// SECTION: Folding
// ============================================================================

/// Folds every override active at `now` into one effect.
///
/// Boosts are summed (and may be negative), the highest-ranked tier upgrade
/// wins, and feature grants are deduplicated.
#[must_use]
pub fn fold_overrides(overrides: &[AdminOverride], now: Timestamp) -> ParsedOverrides {
    let mut parsed = ParsedOverrides::default();
    for row in overrides.iter().filter(|row| row.is_active(now)) {
        match &row.effect {
            OverrideEffect::QuotaBoost(boost) => {
                parsed.quota_boost = parsed.quota_boost.saturating_add(*boost);
            }
            OverrideEffect::TierUpgrade(tier) => {
                if parsed.tier_upgrade.is_none_or(|current| tier.rank() > current.rank()) {
                    parsed.tier_upgrade = Some(*tier);
                }
            }
            OverrideEffect::FeatureGrant(feature) => {
                parsed.feature_grants.insert(feature.clone());
            }
        }
    }
    parsed
}

/// Re-evaluates a quota result with `boost` added to its limit.
///
/// The observed `used` count is preserved; the boosted limit clamps at zero.
/// Unlimited results and zero boosts are returned unchanged.
#[must_use]
pub fn apply_quota_boost(
    check: &QuotaCheck,
    boost: i64,
    quantity: u64,
    safety_buffer_percent: u8,
) -> QuotaCheck {
    let (Some(limit), Some(used)) = (check.limit, check.used) else {
        return check.clone();
    };
    if boost == 0 || check.level == QuotaLevel::Unlimited {
        return check.clone();
    }
    let boosted = i128::from(limit) + i128::from(boost);
    let boosted = u64::try_from(boosted.max(0)).unwrap_or(u64::MAX);
    evaluate_quota(check.level, boosted, used, quantity, safety_buffer_percent)
}

// ============================================================================
// SECTION: Engine
// ============================================================================

/// Override resolution against the store.
#[derive(Clone)]
pub struct OverrideEngine {
    /// Relational store.
    store: Arc<dyn ControlPlaneStore>,
    /// Time source for expiry.
    clock: Arc<dyn Clock>,
}

impl OverrideEngine {
    /// Creates an override engine.
    #[must_use]
    pub fn new(store: Arc<dyn ControlPlaneStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
        }
    }

    /// Lists the tenant's overrides that are active now.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails.
    pub async fn active_overrides(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Vec<AdminOverride>, StoreError> {
        self.store.list_active_overrides(tenant_id, self.clock.now()).await
    }

    /// Returns the tenant's active overrides folded into one effect.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails.
    pub async fn parsed_overrides(&self, tenant_id: &TenantId) -> Result<ParsedOverrides, StoreError> {
        let now = self.clock.now();
        let rows = self.store.list_active_overrides(tenant_id, now).await?;
        Ok(fold_overrides(&rows, now))
    }

    /// Deletes overrides that have expired; returns the number removed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the delete fails.
    pub async fn cleanup_expired(&self) -> Result<u64, StoreError> {
        let removed = self.store.delete_expired_overrides(self.clock.now()).await?;
        info!(removed, "expired overrides cleaned up");
        Ok(removed)
    }
}
