// crates/tenant-gate-core/src/core/usage.rs
// ============================================================================
// Module: Tenant Gate Usage Model
// Description: Usage ledger events and quota evaluation results.
// Purpose: Define the append-only ledger row and the quota check outcome.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! [`UsageEvent`] rows are append-only and keyed by a globally unique
//! idempotency key. [`QuotaCheck`] reports a quota evaluation; its
//! `remaining` value is signed so an overage stays visible after a write.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::ApiKeyId;
use crate::core::identifiers::IdempotencyKey;
use crate::core::identifiers::ServiceName;
use crate::core::identifiers::TenantId;
use crate::core::identifiers::UsageEventId;
use crate::core::identifiers::UserId;
use crate::core::period::UsagePeriod;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Usage Events
// ============================================================================

/// Append-only usage ledger entry.
///
/// # Invariants
/// - `idempotency_key` is globally unique.
/// - Events are never mutated or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageEvent {
    /// Event identifier.
    pub id: UsageEventId,
    /// Tenant the usage is billed to.
    pub tenant_id: TenantId,
    /// API key the usage was made with, if any.
    pub api_key_id: Option<ApiKeyId>,
    /// User the usage was made by, if any.
    pub user_id: Option<UserId>,
    /// Service consumed.
    pub service: ServiceName,
    /// Action performed.
    pub action: String,
    /// Units consumed.
    pub quantity: u64,
    /// Calendar month the event was recorded in.
    pub period: UsagePeriod,
    /// Caller-supplied deduplication key.
    pub idempotency_key: IdempotencyKey,
    /// Recording time.
    pub created_at: Timestamp,
}

// ============================================================================
// SECTION: Quota Results
// ============================================================================

/// Level a quota decision was made at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaLevel {
    /// API key ceiling was authoritative.
    ApiKey,
    /// Tenant-wide ceiling applied.
    Tenant,
    /// No ceiling applies.
    Unlimited,
}

impl QuotaLevel {
    /// Returns the stable label for the level.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ApiKey => "api_key",
            Self::Tenant => "tenant",
            Self::Unlimited => "unlimited",
        }
    }
}

/// Result of a quota evaluation.
///
/// # Invariants
/// - `remaining = effective_limit - used - quantity`, unclamped.
/// - For [`QuotaLevel::Unlimited`], `remaining` is `i64::MAX` and the limit
///   fields are `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaCheck {
    /// Whether the requested quantity fits under the effective limit.
    pub allowed: bool,
    /// Units left after the requested quantity; negative on overage.
    pub remaining: i64,
    /// Level the decision was made at.
    pub level: QuotaLevel,
    /// Configured ceiling.
    pub limit: Option<u64>,
    /// Ceiling after the safety buffer.
    pub effective_limit: Option<u64>,
    /// Units already consumed in the window.
    pub used: Option<u64>,
}

impl QuotaCheck {
    /// Returns an unlimited, allowed result.
    #[must_use]
    pub const fn unlimited() -> Self {
        Self {
            allowed: true,
            remaining: i64::MAX,
            level: QuotaLevel::Unlimited,
            limit: None,
            effective_limit: None,
            used: None,
        }
    }

    /// Returns `remaining` clamped at zero for display.
    #[must_use]
    pub fn display_remaining(&self) -> u64 {
        u64::try_from(self.remaining.max(0)).unwrap_or(0)
    }
}
