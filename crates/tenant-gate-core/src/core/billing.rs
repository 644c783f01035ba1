// crates/tenant-gate-core/src/core/billing.rs
// ============================================================================
// Module: Tenant Gate Billing Model
// Description: Subscriptions, tiers, and per-service enablement.
// Purpose: Define the billing state the subscription and service checks read.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Each tenant carries one subscription with a tier and a status. Services
//! are enabled per subscription through [`SubscriptionItem`] rows; a missing
//! row means the service is disabled.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::ServiceName;
use crate::core::identifiers::SubscriptionId;
use crate::core::identifiers::TenantId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Tier
// ============================================================================

/// Subscription tier, ordered by rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Free tier.
    Free,
    /// Paid professional tier.
    Pro,
    /// Enterprise tier.
    Enterprise,
}

impl Tier {
    /// Numeric rank (free=0 < pro=1 < enterprise=2).
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Free => 0,
            Self::Pro => 1,
            Self::Enterprise => 2,
        }
    }

    /// Returns the stable label for the tier.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Pro => "pro",
            Self::Enterprise => "enterprise",
        }
    }

    /// Parses a tier label.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "free" => Some(Self::Free),
            "pro" => Some(Self::Pro),
            "enterprise" => Some(Self::Enterprise),
            _ => None,
        }
    }
}

// ============================================================================
// SECTION: Subscription
// ============================================================================

/// Subscription billing status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Paid and current.
    Active,
    /// Canceled by the tenant.
    Canceled,
    /// Payment overdue.
    PastDue,
}

impl SubscriptionStatus {
    /// Returns the stable label for the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Canceled => "canceled",
            Self::PastDue => "past_due",
        }
    }

    /// Parses a status label.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "active" => Some(Self::Active),
            "canceled" => Some(Self::Canceled),
            "past_due" => Some(Self::PastDue),
            _ => None,
        }
    }
}

/// Tenant subscription.
///
/// # Invariants
/// - At most one subscription exists per tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    /// Subscription identifier.
    pub id: SubscriptionId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Billing tier.
    pub tier: Tier,
    /// Billing status.
    pub status: SubscriptionStatus,
    /// End of the current billing period.
    pub current_period_end: Option<Timestamp>,
}

impl Subscription {
    /// Returns true when the subscription status is active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == SubscriptionStatus::Active
    }
}

/// Per-service enablement row for a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionItem {
    /// Owning subscription.
    pub subscription_id: SubscriptionId,
    /// Service name.
    pub service: ServiceName,
    /// Whether the service is enabled.
    pub enabled: bool,
}
