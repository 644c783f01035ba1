// crates/tenant-gate-core/src/core/flags.rs
// ============================================================================
// Module: Tenant Gate Feature Flags
// Description: Feature flag definitions.
// Purpose: Define the flag record evaluated by the feature flag engine.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A flag enables a feature for explicit tenants, for tiers, or for a
//! deterministic percentage of tenants.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::billing::Tier;
use crate::core::identifiers::FeatureFlagId;
use crate::core::identifiers::TenantId;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Maximum rollout percentage.
pub const MAX_ROLLOUT_PERCENTAGE: u8 = 100;

/// Feature flag definition.
///
/// # Invariants
/// - `name` is unique.
/// - `rollout_percentage` is within `0..=100`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureFlag {
    /// Flag identifier.
    pub id: FeatureFlagId,
    /// Unique flag name.
    pub name: String,
    /// Optional description for operators.
    #[serde(default)]
    pub description: Option<String>,
    /// Tiers the flag is enabled for.
    #[serde(default)]
    pub enabled_tiers: Vec<Tier>,
    /// Tenants the flag is explicitly enabled for.
    #[serde(default)]
    pub enabled_tenants: Vec<TenantId>,
    /// Percentage of tenants enabled by hash bucket.
    #[serde(default)]
    pub rollout_percentage: u8,
    /// Whether the flag is evaluated at all.
    pub active: bool,
}
