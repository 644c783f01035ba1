// crates/tenant-gate-core/src/core/mod.rs
// ============================================================================
// Module: Tenant Gate Core Types
// Description: Domain model shared by the engines, stores, and CLI.
// Purpose: Group identifiers, time, periods, hashing, and domain records.
// Dependencies: serde, sha2, rand, time, thiserror
// ============================================================================

//! ## Overview
//! Strongly typed domain records. JSON-encoded columns (scopes, flag
//! targeting lists, override values) never appear here; stores convert them
//! at their own boundary.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod billing;
pub mod decision;
pub mod flags;
pub mod hashing;
pub mod identifiers;
pub mod ids;
pub mod overrides;
pub mod period;
pub mod tenancy;
pub mod time;
pub mod usage;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use billing::Subscription;
pub use billing::SubscriptionItem;
pub use billing::SubscriptionStatus;
pub use billing::Tier;
pub use decision::AuthorizationDecision;
pub use decision::AuthorizationRequest;
pub use decision::CheckName;
pub use decision::CheckStatus;
pub use decision::DecisionMetadata;
pub use decision::DecisionReason;
pub use decision::Principal;
pub use decision::tenant_cache_prefix;
pub use flags::FeatureFlag;
pub use flags::MAX_ROLLOUT_PERCENTAGE;
pub use hashing::rollout_bucket;
pub use hashing::sha256_hex;
pub use identifiers::ApiKeyId;
pub use identifiers::FeatureFlagId;
pub use identifiers::IdempotencyKey;
pub use identifiers::OverrideId;
pub use identifiers::ServiceName;
pub use identifiers::SessionId;
pub use identifiers::SubscriptionId;
pub use identifiers::TenantId;
pub use identifiers::UsageEventId;
pub use identifiers::UserId;
pub use identifiers::WILDCARD_SERVICE;
pub use ids::generate_id;
pub use ids::random_base62;
pub use overrides::AdminOverride;
pub use overrides::OverrideEffect;
pub use overrides::ParsedOverrides;
pub use period::PeriodError;
pub use period::QuotaPeriod;
pub use period::UsagePeriod;
pub use tenancy::ApiKey;
pub use tenancy::ApiKeyStatus;
pub use tenancy::Role;
pub use tenancy::Session;
pub use tenancy::Tenant;
pub use tenancy::TenantUser;
pub use self::time::Clock;
pub use self::time::ManualClock;
pub use self::time::SystemClock;
pub use self::time::Timestamp;
pub use usage::QuotaCheck;
pub use usage::QuotaLevel;
pub use usage::UsageEvent;
