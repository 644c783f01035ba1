// crates/tenant-gate-core/src/core/decision.rs
// ============================================================================
// Module: Tenant Gate Authorization Decisions
// Description: Authorization requests, principals, and decision records.
// Purpose: Define the input and output shapes of the decision pipeline.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! An [`AuthorizationRequest`] names a principal, a tenant, and the action
//! being attempted. The pipeline answers with an [`AuthorizationDecision`]
//! whose [`DecisionReason`] is a closed set of stable codes so callers can
//! branch on cause, plus metadata describing which checks ran.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::core::billing::Tier;
use crate::core::identifiers::ApiKeyId;
use crate::core::identifiers::ServiceName;
use crate::core::identifiers::SessionId;
use crate::core::identifiers::TenantId;
use crate::core::identifiers::UserId;
use crate::core::overrides::ParsedOverrides;
use crate::core::tenancy::Role;
use crate::core::time::Timestamp;
use crate::core::usage::QuotaCheck;

// ============================================================================
// SECTION: Requests
// ============================================================================

/// Caller identity presented to the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Principal {
    /// Interactive user, optionally with a login session.
    User {
        /// User identifier.
        user_id: UserId,
        /// Session presented with the request.
        #[serde(default)]
        session_id: Option<SessionId>,
    },
    /// API key caller.
    ApiKey {
        /// API key record identifier.
        api_key_id: ApiKeyId,
    },
}

impl Principal {
    /// Returns the principal segment used in decision cache keys.
    #[must_use]
    pub fn cache_segment(&self) -> String {
        match self {
            Self::User {
                user_id,
                session_id,
            } => format!(
                "user/{}/{}",
                key_segment(user_id.as_str()),
                optional_segment(session_id.as_ref().map(SessionId::as_str))
            ),
            Self::ApiKey {
                api_key_id,
            } => format!("key/{}", key_segment(api_key_id.as_str())),
        }
    }
}

/// Default quantity for requests that omit one.
const fn default_quantity() -> u64 {
    1
}

/// Authorization request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationRequest {
    /// Tenant the action is attempted in.
    pub tenant_id: TenantId,
    /// Caller identity.
    pub principal: Principal,
    /// Target service.
    pub service: ServiceName,
    /// Action being performed.
    pub action: String,
    /// Optional resource identifier.
    #[serde(default)]
    pub resource: Option<String>,
    /// Feature that must be enabled.
    #[serde(default)]
    pub required_feature: Option<String>,
    /// Minimum role required.
    #[serde(default)]
    pub required_role: Option<Role>,
    /// Units of quota the action consumes.
    #[serde(default = "default_quantity")]
    pub quantity: u64,
}

impl AuthorizationRequest {
    /// Creates a request with no requirements and a quantity of one.
    #[must_use]
    pub fn new(
        tenant_id: TenantId,
        principal: Principal,
        service: ServiceName,
        action: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id,
            principal,
            service,
            action: action.into(),
            resource: None,
            required_feature: None,
            required_role: None,
            quantity: default_quantity(),
        }
    }

    /// Sets the target resource.
    #[must_use]
    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    /// Requires a feature to be enabled.
    #[must_use]
    pub fn with_required_feature(mut self, feature: impl Into<String>) -> Self {
        self.required_feature = Some(feature.into());
        self
    }

    /// Requires a minimum role.
    #[must_use]
    pub const fn with_required_role(mut self, role: Role) -> Self {
        self.required_role = Some(role);
        self
    }

    /// Sets the quota quantity.
    #[must_use]
    pub const fn with_quantity(mut self, quantity: u64) -> Self {
        self.quantity = quantity;
        self
    }

    /// Returns the deterministic decision cache key for this request.
    ///
    /// Layout: `authz:{tenant}:{principal}:{service}:{action}:{resource}:`
    /// followed by `{feature}:{role|-}:{quantity}`. Free-form segments are
    /// length-prefixed and absent optional segments are `-`.
    #[must_use]
    pub fn cache_key(&self) -> String {
        format!(
            "{}{}:{}:{}:{}:{}:{}:{}",
            tenant_cache_prefix(&self.tenant_id),
            self.principal.cache_segment(),
            key_segment(self.service.as_str()),
            key_segment(&self.action),
            optional_segment(self.resource.as_deref()),
            optional_segment(self.required_feature.as_deref()),
            self.required_role.map_or("-", Role::as_str),
            self.quantity,
        )
    }
}

/// Returns the cache key prefix shared by every decision for `tenant_id`.
#[must_use]
pub fn tenant_cache_prefix(tenant_id: &TenantId) -> String {
    format!("authz:{}:", key_segment(tenant_id.as_str()))
}

/// Encodes a free-form key segment as `{byte_len}#{value}`.
fn key_segment(value: &str) -> String {
    format!("{}#{value}", value.len())
}

/// Encodes an optional segment; `None` is `-`, which no encoded value starts with.
fn optional_segment(value: Option<&str>) -> String {
    value.map_or_else(|| "-".to_string(), key_segment)
}

// ============================================================================
// SECTION: Reasons
// ============================================================================

/// Closed set of decision reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    /// Every check passed.
    Allowed,
    /// Session missing, revoked, expired, or bound elsewhere.
    SessionInvalid,
    /// User has no membership in the tenant.
    NotAMember,
    /// API key missing, revoked, expired, or owned by another tenant.
    ApiKeyInvalid,
    /// API key scopes do not cover the service.
    ApiKeyScope,
    /// Tenant has no subscription.
    SubscriptionMissing,
    /// Subscription is not active.
    SubscriptionInactive,
    /// Service is not enabled for the subscription.
    ServiceDisabled,
    /// Required feature is not enabled.
    FeatureDisabled,
    /// Quota would be exceeded.
    QuotaExceeded,
    /// Caller role is below the required role.
    InsufficientRole,
    /// Infrastructure failure; the pipeline failed closed.
    InternalError,
}

impl DecisionReason {
    /// Returns the stable reason code.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Allowed => "allowed",
            Self::SessionInvalid => "session_invalid",
            Self::NotAMember => "not_a_member",
            Self::ApiKeyInvalid => "api_key_invalid",
            Self::ApiKeyScope => "api_key_scope",
            Self::SubscriptionMissing => "subscription_missing",
            Self::SubscriptionInactive => "subscription_inactive",
            Self::ServiceDisabled => "service_disabled",
            Self::FeatureDisabled => "feature_disabled",
            Self::QuotaExceeded => "quota_exceeded",
            Self::InsufficientRole => "insufficient_role",
            Self::InternalError => "internal_error",
        }
    }

    /// Returns the fixed human-readable message.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::Allowed => "allowed",
            Self::SessionInvalid => "session is invalid or expired",
            Self::NotAMember => "user is not a member of this tenant",
            Self::ApiKeyInvalid => "api key is invalid, revoked, or expired",
            Self::ApiKeyScope => "api key is not scoped for this service",
            Self::SubscriptionMissing => "tenant has no subscription",
            Self::SubscriptionInactive => "subscription is not active",
            Self::ServiceDisabled => "service is not enabled for this subscription",
            Self::FeatureDisabled => "required feature is not enabled",
            Self::QuotaExceeded => "quota exceeded",
            Self::InsufficientRole => "insufficient role for this action",
            Self::InternalError => "internal authorization error",
        }
    }
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

// ============================================================================
// SECTION: Checks
// ============================================================================

/// Pipeline stage, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckName {
    /// Session validity.
    Session,
    /// API key validity and scope.
    ApiKey,
    /// Tenant membership.
    Membership,
    /// Override fetch.
    Overrides,
    /// Subscription status.
    Subscription,
    /// Service enablement.
    Service,
    /// Feature gating.
    Feature,
    /// Quota enforcement.
    Quota,
    /// Role comparison.
    Rbac,
}

impl CheckName {
    /// Every stage in evaluation order.
    pub const ALL: [Self; 9] = [
        Self::Session,
        Self::ApiKey,
        Self::Membership,
        Self::Overrides,
        Self::Subscription,
        Self::Service,
        Self::Feature,
        Self::Quota,
        Self::Rbac,
    ];
}

/// Outcome of a single stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    /// Stage ran and passed.
    Passed,
    /// Stage ran and denied.
    Failed,
    /// Stage did not apply to this request.
    Skipped,
    /// Pipeline stopped before reaching the stage.
    NotRun,
}

/// Returns a check map with every stage marked [`CheckStatus::NotRun`].
#[must_use]
pub fn initial_checks() -> BTreeMap<CheckName, CheckStatus> {
    CheckName::ALL.into_iter().map(|name| (name, CheckStatus::NotRun)).collect()
}

// ============================================================================
// SECTION: Decisions
// ============================================================================

/// Metadata attached to every decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionMetadata {
    /// Caller role within the tenant.
    pub role: Option<Role>,
    /// Effective tier after overrides.
    pub tier: Option<Tier>,
    /// Quota result after boosts.
    pub quota: Option<QuotaCheck>,
    /// Active overrides snapshot.
    pub overrides: Option<ParsedOverrides>,
    /// Per-stage outcome.
    pub checks: BTreeMap<CheckName, CheckStatus>,
    /// True when the decision was not freshly computed.
    pub degraded: bool,
    /// Evaluation time.
    pub evaluated_at: Timestamp,
}

impl DecisionMetadata {
    /// Creates empty metadata with every stage not run.
    #[must_use]
    pub fn new(evaluated_at: Timestamp) -> Self {
        Self {
            role: None,
            tier: None,
            quota: None,
            overrides: None,
            checks: initial_checks(),
            degraded: false,
            evaluated_at,
        }
    }

    /// Returns the recorded status of a stage.
    #[must_use]
    pub fn check(&self, name: CheckName) -> CheckStatus {
        self.checks.get(&name).copied().unwrap_or(CheckStatus::NotRun)
    }
}

/// Authorization outcome.
///
/// # Invariants
/// - `allowed` is true iff `reason` is [`DecisionReason::Allowed`].
/// - `message` is always `reason.message()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationDecision {
    /// Whether the action may proceed.
    pub allowed: bool,
    /// Stable reason code.
    pub reason: DecisionReason,
    /// Human-readable reason.
    pub message: String,
    /// Decision metadata.
    pub metadata: DecisionMetadata,
}

impl AuthorizationDecision {
    /// Builds an allow decision.
    #[must_use]
    pub fn allow(metadata: DecisionMetadata) -> Self {
        Self::from_reason(DecisionReason::Allowed, metadata)
    }

    /// Builds a deny decision.
    #[must_use]
    pub fn deny(reason: DecisionReason, metadata: DecisionMetadata) -> Self {
        Self::from_reason(reason, metadata)
    }

    /// Builds a decision whose allow flag follows the reason.
    fn from_reason(reason: DecisionReason, metadata: DecisionMetadata) -> Self {
        Self {
            allowed: reason == DecisionReason::Allowed,
            reason,
            message: reason.message().to_string(),
            metadata,
        }
    }

    /// Returns true when the decision is a fail-closed infrastructure deny.
    #[must_use]
    pub fn is_internal_error(&self) -> bool {
        self.reason == DecisionReason::InternalError
    }
}
