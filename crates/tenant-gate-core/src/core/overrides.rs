// crates/tenant-gate-core/src/core/overrides.rs
// ============================================================================
// Module: Tenant Gate Admin Overrides
// Description: Admin-granted exceptions to quota, tier, and feature rules.
// Purpose: Define override records and their folded per-tenant form.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Overrides may expire. Expiry is computed at read time against "now";
//! expired rows stay stored until an explicit cleanup removes them.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;

use crate::core::billing::Tier;
use crate::core::identifiers::OverrideId;
use crate::core::identifiers::TenantId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Effect carried by an override.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum OverrideEffect {
    /// Adds units to the applicable quota limit.
    QuotaBoost(i64),
    /// Raises the effective tier.
    TierUpgrade(Tier),
    /// Grants a named feature.
    FeatureGrant(String),
}

impl OverrideEffect {
    /// Returns the stable type label.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::QuotaBoost(_) => "quota_boost",
            Self::TierUpgrade(_) => "tier_upgrade",
            Self::FeatureGrant(_) => "feature_grant",
        }
    }
}

/// Admin override row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminOverride {
    /// Override identifier.
    pub id: OverrideId,
    /// Tenant the override applies to.
    pub tenant_id: TenantId,
    /// Override effect.
    pub effect: OverrideEffect,
    /// Operator-supplied reason.
    #[serde(default)]
    pub reason: Option<String>,
    /// Expiry time; `None` never expires.
    #[serde(default)]
    pub expires_at: Option<Timestamp>,
}

impl AdminOverride {
    /// Returns true when the override has not expired at `now`.
    #[must_use]
    pub fn is_active(&self, now: Timestamp) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// All active overrides for a tenant folded into one effect.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedOverrides {
    /// Sum of quota boosts; may be negative.
    pub quota_boost: i64,
    /// Highest-ranked tier upgrade.
    pub tier_upgrade: Option<Tier>,
    /// Deduplicated feature grants.
    pub feature_grants: BTreeSet<String>,
}

impl ParsedOverrides {
    /// Returns true when no override contributes anything.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.quota_boost == 0 && self.tier_upgrade.is_none() && self.feature_grants.is_empty()
    }

    /// Returns true when `feature` was granted.
    #[must_use]
    pub fn grants_feature(&self, feature: &str) -> bool {
        self.feature_grants.contains(feature)
    }
}
