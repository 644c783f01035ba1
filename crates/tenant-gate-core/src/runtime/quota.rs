// crates/tenant-gate-core/src/runtime/quota.rs
// ============================================================================
// Module: Tenant Gate Quota Engine
// Description: Idempotent usage recording and two-level quota enforcement.
// Purpose: Meter usage and decide whether a quantity fits under its ceiling.
// Dependencies: thiserror, tracing, crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! Quota is resolved at the API-key level when the key carries its own
//! ceiling, else at the tenant level. Effective limits apply a safety buffer
//! (99% by default) so concurrent admissions between check and write stay
//! under the hard ceiling.
//!
//! [`QuotaEngine::check_and_record_usage`] is optimistic: check, record, then
//! re-check with quantity zero. When the re-check shows the ledger went over
//! the effective limit, the request is flagged not allowed but the recorded
//! event stands. The ledger is never rolled back.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::core::ApiKeyId;
use crate::core::Clock;
use crate::core::IdempotencyKey;
use crate::core::PeriodError;
use crate::core::QuotaCheck;
use crate::core::QuotaLevel;
use crate::core::ServiceName;
use crate::core::TenantId;
use crate::core::UsageEvent;
use crate::core::UsageEventId;
use crate::core::UsagePeriod;
use crate::core::UserId;
use crate::core::generate_id;
use crate::interfaces::ControlPlaneStore;
use crate::interfaces::InsertOutcome;
use crate::interfaces::StoreError;
use crate::interfaces::UsageScope;
use crate::interfaces::UsageSummary;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default safety buffer applied to quota limits.
pub const DEFAULT_SAFETY_BUFFER_PERCENT: u8 = 99;
/// Message returned when the pre-write check denies.
pub const QUOTA_EXCEEDED_MESSAGE: &str = "Quota exceeded";
/// Message returned when concurrent writes pushed usage over the limit.
pub const QUOTA_RACE_MESSAGE: &str = "Quota exceeded due to concurrent requests";
/// Prefix for generated usage event ids.
const USAGE_EVENT_ID_PREFIX: &str = "use";

// ============================================================================
// SECTION: Types
// ============================================================================

/// Quota engine settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaSettings {
    /// Percentage of the configured limit that may be consumed (1-100).
    pub safety_buffer_percent: u8,
}

impl Default for QuotaSettings {
    fn default() -> Self {
        Self {
            safety_buffer_percent: DEFAULT_SAFETY_BUFFER_PERCENT,
        }
    }
}

/// Quota engine errors.
#[derive(Debug, Error)]
pub enum QuotaError {
    /// Tenant does not exist.
    #[error("tenant not found: {0}")]
    TenantNotFound(TenantId),
    /// Caller input was rejected.
    #[error("invalid usage input: {0}")]
    InvalidInput(String),
    /// Period could not be computed.
    #[error(transparent)]
    Period(#[from] PeriodError),
    /// Store failure; never swallowed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Usage recording request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordUsageInput {
    /// Tenant billed for the usage.
    pub tenant_id: TenantId,
    /// Service consumed.
    pub service: ServiceName,
    /// Action performed.
    pub action: String,
    /// Units consumed.
    pub quantity: u64,
    /// API key the usage was made with.
    #[serde(default)]
    pub api_key_id: Option<ApiKeyId>,
    /// User the usage was made by.
    #[serde(default)]
    pub user_id: Option<UserId>,
    /// Deduplication key; retries must reuse it.
    pub idempotency_key: IdempotencyKey,
}

/// Result of [`QuotaEngine::check_and_record_usage`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageOutcome {
    /// Whether the caller may fulfil the action.
    pub allowed: bool,
    /// Quota state the decision was based on.
    pub quota: QuotaCheck,
    /// Recorded event, when the pre-check passed.
    pub event: Option<UsageEvent>,
    /// Denial message.
    pub message: Option<String>,
}

// ============================================================================
// SECTION: Quota Math
// ============================================================================

/// Applies the safety buffer: `floor(limit * percent / 100)`.
#[must_use]
pub fn effective_limit(limit: u64, safety_buffer_percent: u8) -> u64 {
    let scaled = u128::from(limit) * u128::from(safety_buffer_percent) / 100;
    u64::try_from(scaled).unwrap_or(u64::MAX)
}

/// Evaluates `used + quantity` against the buffered `limit`.
#[must_use]
pub fn evaluate_quota(
    level: QuotaLevel,
    limit: u64,
    used: u64,
    quantity: u64,
    safety_buffer_percent: u8,
) -> QuotaCheck {
    let effective = effective_limit(limit, safety_buffer_percent);
    let remaining = i128::from(effective) - i128::from(used) - i128::from(quantity);
    let remaining = i64::try_from(remaining)
        .unwrap_or(if remaining < 0 { i64::MIN } else { i64::MAX });
    QuotaCheck {
        allowed: remaining >= 0,
        remaining,
        level,
        limit: Some(limit),
        effective_limit: Some(effective),
        used: Some(used),
    }
}

// ============================================================================
// SECTION: Engine
// ============================================================================

/// Usage metering and quota enforcement.
#[derive(Clone)]
pub struct QuotaEngine {
    /// Relational store.
    store: Arc<dyn ControlPlaneStore>,
    /// Time source for periods and event timestamps.
    clock: Arc<dyn Clock>,
    /// Buffer settings.
    settings: QuotaSettings,
}

impl QuotaEngine {
    /// Creates a quota engine.
    #[must_use]
    pub fn new(
        store: Arc<dyn ControlPlaneStore>,
        clock: Arc<dyn Clock>,
        settings: QuotaSettings,
    ) -> Self {
        Self {
            store,
            clock,
            settings,
        }
    }

    /// Returns the engine settings.
    #[must_use]
    pub const fn settings(&self) -> QuotaSettings {
        self.settings
    }

    /// Records usage once per idempotency key.
    ///
    /// A replay returns the stored event unchanged. When a concurrent writer
    /// wins the insert race, the winner's row is re-read and returned.
    ///
    /// # Errors
    ///
    /// Returns [`QuotaError`] when the key is empty or the store fails.
    pub async fn record_usage(&self, input: &RecordUsageInput) -> Result<UsageEvent, QuotaError> {
        if input.idempotency_key.as_str().trim().is_empty() {
            return Err(QuotaError::InvalidInput("idempotency key is empty".to_string()));
        }
        if let Some(existing) =
            self.store.find_usage_by_idempotency_key(&input.idempotency_key).await?
        {
            debug!(
                tenant_id = %input.tenant_id,
                idempotency_key = %input.idempotency_key,
                "usage replay returned existing event"
            );
            return Ok(existing);
        }
        let now = self.clock.now();
        let event = UsageEvent {
            id: UsageEventId::new(generate_id(USAGE_EVENT_ID_PREFIX, now)),
            tenant_id: input.tenant_id.clone(),
            api_key_id: input.api_key_id.clone(),
            user_id: input.user_id.clone(),
            service: input.service.clone(),
            action: input.action.clone(),
            quantity: input.quantity,
            period: UsagePeriod::current_month(now)?,
            idempotency_key: input.idempotency_key.clone(),
            created_at: now,
        };
        match self.store.insert_usage_event(&event).await? {
            InsertOutcome::Inserted => {
                debug!(
                    tenant_id = %event.tenant_id,
                    event_id = %event.id,
                    quantity = event.quantity,
                    "usage recorded"
                );
                Ok(event)
            }
            InsertOutcome::Conflict => self
                .store
                .find_usage_by_idempotency_key(&input.idempotency_key)
                .await?
                .ok_or_else(|| {
                    QuotaError::Store(StoreError::Corrupt(format!(
                        "idempotency conflict without stored event: {}",
                        input.idempotency_key
                    )))
                }),
        }
    }

    /// Sums tenant usage for `period` (default: the current UTC month).
    ///
    /// # Errors
    ///
    /// Returns [`QuotaError`] when the store fails.
    pub async fn get_usage(
        &self,
        tenant_id: &TenantId,
        period: Option<UsagePeriod>,
    ) -> Result<UsageSummary, QuotaError> {
        let period = match period {
            Some(period) => period,
            None => UsagePeriod::current_month(self.clock.now())?,
        };
        let scope = UsageScope::Tenant(tenant_id.clone());
        Ok(self.store.sum_usage(&scope, &period).await?)
    }

    /// Checks whether `quantity` more units fit under the applicable ceiling.
    ///
    /// An API key with its own limit is authoritative; otherwise the tenant's
    /// global limit applies, and a tenant without one is unlimited.
    ///
    /// # Errors
    ///
    /// Returns [`QuotaError::TenantNotFound`] for unknown tenants and
    /// [`QuotaError::Store`] on store failure.
    pub async fn check_quota(
        &self,
        tenant_id: &TenantId,
        quantity: u64,
        api_key_id: Option<&ApiKeyId>,
    ) -> Result<QuotaCheck, QuotaError> {
        let now = self.clock.now();
        if let Some(api_key_id) = api_key_id
            && let Some(key) = self.store.get_api_key(api_key_id).await?
            && &key.tenant_id == tenant_id
            && let Some(limit) = key.quota_limit
        {
            let period = UsagePeriod::current(key.quota_period, now)?;
            let used = self.store.sum_usage(&UsageScope::ApiKey(key.id.clone()), &period).await?;
            return Ok(evaluate_quota(
                QuotaLevel::ApiKey,
                limit,
                used.total,
                quantity,
                self.settings.safety_buffer_percent,
            ));
        }
        let tenant = self
            .store
            .get_tenant(tenant_id)
            .await?
            .ok_or_else(|| QuotaError::TenantNotFound(tenant_id.clone()))?;
        let Some(limit) = tenant.global_quota_limit else {
            return Ok(QuotaCheck::unlimited());
        };
        let period = UsagePeriod::current_month(now)?;
        let used = self.store.sum_usage(&UsageScope::Tenant(tenant_id.clone()), &period).await?;
        Ok(evaluate_quota(
            QuotaLevel::Tenant,
            limit,
            used.total,
            quantity,
            self.settings.safety_buffer_percent,
        ))
    }

    /// Checks quota, records usage, then re-checks for concurrent overage.
    ///
    /// # Errors
    ///
    /// Returns [`QuotaError`] when any read or the write fails. A denied
    /// request is not an error.
    pub async fn check_and_record_usage(
        &self,
        input: &RecordUsageInput,
    ) -> Result<UsageOutcome, QuotaError> {
        let api_key_id = input.api_key_id.as_ref();
        let precheck = self.check_quota(&input.tenant_id, input.quantity, api_key_id).await?;
        if !precheck.allowed {
            info!(
                tenant_id = %input.tenant_id,
                level = precheck.level.as_str(),
                remaining = precheck.remaining,
                "usage denied by quota"
            );
            return Ok(UsageOutcome {
                allowed: false,
                quota: precheck,
                event: None,
                message: Some(QUOTA_EXCEEDED_MESSAGE.to_string()),
            });
        }
        let event = self.record_usage(input).await?;
        let recheck = self.check_quota(&input.tenant_id, 0, api_key_id).await?;
        if recheck.remaining < 0 {
            warn!(
                tenant_id = %input.tenant_id,
                event_id = %event.id,
                remaining = recheck.remaining,
                "usage recorded past quota by concurrent requests"
            );
            return Ok(UsageOutcome {
                allowed: false,
                quota: recheck,
                event: Some(event),
                message: Some(QUOTA_RACE_MESSAGE.to_string()),
            });
        }
        Ok(UsageOutcome {
            allowed: true,
            quota: recheck,
            event: Some(event),
            message: None,
        })
    }
}
