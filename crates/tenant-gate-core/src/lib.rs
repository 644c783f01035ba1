// crates/tenant-gate-core/src/lib.rs
// ============================================================================
// Module: Tenant Gate Core Library
// Description: Public API surface for the Tenant Gate authorization core.
// Purpose: Expose domain types, collaborator contracts, and decision engines.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! Tenant Gate core decides whether a principal (user session or API key) may
//! perform an action against a service inside a tenant, and explains why. The
//! decision pipeline chains session, membership, subscription, service,
//! feature-flag, quota, and role checks, short-circuiting on the first denial.
//!
//! The core never performs I/O on its own: the relational store and the
//! key-value cache are injected through the traits in [`interfaces`].
//! Security posture: the pipeline fails closed; infrastructure errors become
//! denials at the authorization boundary.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use crate::core::*;

pub use interfaces::ApiKeyRepository;
pub use interfaces::CacheEntry;
pub use interfaces::CacheError;
pub use interfaces::CacheStore;
pub use interfaces::ControlPlaneStore;
pub use interfaces::FeatureFlagRepository;
pub use interfaces::InsertOutcome;
pub use interfaces::MembershipRepository;
pub use interfaces::OverrideRepository;
pub use interfaces::SessionRepository;
pub use interfaces::StoreError;
pub use interfaces::SubscriptionRepository;
pub use interfaces::TenantRepository;
pub use interfaces::UsageRepository;
pub use interfaces::UsageScope;
pub use interfaces::UsageSummary;
pub use runtime::ApiKeyError;
pub use runtime::ApiKeyIssuer;
pub use runtime::AuthorizationEngine;
pub use runtime::AuthorizationSettings;
pub use runtime::CacheRead;
pub use runtime::CacheSource;
pub use runtime::DEFAULT_DECISION_TTL_SECONDS;
pub use runtime::DEFAULT_STALE_GRACE_SECONDS;
pub use runtime::FeatureFlagEngine;
pub use runtime::InMemoryCacheStore;
pub use runtime::InMemoryStore;
pub use runtime::IssuedApiKey;
pub use runtime::MembershipError;
pub use runtime::MembershipService;
pub use runtime::NewApiKey;
pub use runtime::OverrideEngine;
pub use runtime::QuotaEngine;
pub use runtime::QuotaError;
pub use runtime::QuotaSettings;
pub use runtime::ReadThroughCache;
pub use runtime::RecordUsageInput;
pub use runtime::UsageOutcome;
pub use runtime::apply_quota_boost;
pub use runtime::effective_limit;
pub use runtime::evaluate_flag;
pub use runtime::fold_overrides;
