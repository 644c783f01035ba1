// crates/tenant-gate-core/src/runtime/mod.rs
// ============================================================================
// Module: Tenant Gate Runtime
// Description: Decision engines and in-memory collaborator backends.
// Purpose: Wire domain types and collaborator contracts into behavior.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! Every engine receives its store, cache, and clock at construction; there
//! are no process-wide singletons.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod api_keys;
pub mod authz;
pub mod cache;
pub mod flags;
pub mod membership;
pub mod overrides;
pub mod quota;
pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use api_keys::ApiKeyError;
pub use api_keys::ApiKeyIssuer;
pub use api_keys::IssuedApiKey;
pub use api_keys::NewApiKey;
pub use authz::AuthorizationEngine;
pub use authz::AuthorizationSettings;
pub use authz::DEFAULT_DECISION_TTL_SECONDS;
pub use authz::DEFAULT_STALE_GRACE_SECONDS;
pub use cache::CacheRead;
pub use cache::CacheSource;
pub use cache::InMemoryCacheStore;
pub use cache::ReadThroughCache;
pub use flags::FeatureFlagEngine;
pub use flags::evaluate_flag;
pub use membership::MembershipError;
pub use membership::MembershipService;
pub use overrides::OverrideEngine;
pub use overrides::apply_quota_boost;
pub use overrides::fold_overrides;
pub use quota::QuotaEngine;
pub use quota::QuotaError;
pub use quota::QuotaSettings;
pub use quota::RecordUsageInput;
pub use quota::UsageOutcome;
pub use quota::effective_limit;
pub use store::InMemoryStore;
