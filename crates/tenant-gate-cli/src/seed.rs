// crates/tenant-gate-cli/src/seed.rs
// ============================================================================
// Module: Seed Fixtures
// Description: JSON fixtures that populate a control plane store.
// Purpose: Bootstrap tenants, billing, flags, and overrides for local use.
// Dependencies: serde, serde_json, tenant-gate-core
// ============================================================================

//! ## Overview
//! A fixture lists records in their stored shape. Records are written with
//! upserts where the store offers them, so re-seeding the same file is
//! idempotent except for API keys and overrides, which are inserts.
//!
//! ## Invariants
//! - Fixture files are bounded by [`MAX_SEED_BYTES`].
//! - `rollout_percentage` is validated before anything is written.

use std::fs;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;
use serde::Serialize;
use tenant_gate_core::AdminOverride;
use tenant_gate_core::ApiKey;
use tenant_gate_core::ControlPlaneStore;
use tenant_gate_core::FeatureFlag;
use tenant_gate_core::Session;
use tenant_gate_core::StoreError;
use tenant_gate_core::Subscription;
use tenant_gate_core::SubscriptionItem;
use tenant_gate_core::Tenant;
use tenant_gate_core::TenantUser;
use thiserror::Error;
use tracing::info;

/// Maximum fixture file size in bytes.
pub const MAX_SEED_BYTES: usize = 8 * 1024 * 1024;

/// Fixture loading and application errors.
#[derive(Debug, Error)]
pub enum SeedError {
    /// Fixture file could not be read.
    #[error("seed io error: {0}")]
    Io(String),
    /// Fixture JSON was malformed.
    #[error("seed parse error: {0}")]
    Parse(String),
    /// Fixture content violates a record invariant.
    #[error("invalid seed: {0}")]
    Invalid(String),
    /// Store write failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Records to load into a store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedFixture {
    /// Tenants.
    #[serde(default)]
    pub tenants: Vec<Tenant>,
    /// Tenant memberships.
    #[serde(default)]
    pub members: Vec<TenantUser>,
    /// Login sessions.
    #[serde(default)]
    pub sessions: Vec<Session>,
    /// Pre-hashed API keys.
    #[serde(default)]
    pub api_keys: Vec<ApiKey>,
    /// Subscriptions.
    #[serde(default)]
    pub subscriptions: Vec<Subscription>,
    /// Per-service subscription items.
    #[serde(default)]
    pub subscription_items: Vec<SubscriptionItem>,
    /// Feature flags.
    #[serde(default)]
    pub feature_flags: Vec<FeatureFlag>,
    /// Admin overrides.
    #[serde(default)]
    pub overrides: Vec<AdminOverride>,
}

/// Counts of records written by [`SeedFixture::apply`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    /// Tenants written.
    pub tenants: usize,
    /// Memberships written.
    pub members: usize,
    /// Sessions written.
    pub sessions: usize,
    /// API keys written.
    pub api_keys: usize,
    /// Subscriptions written.
    pub subscriptions: usize,
    /// Subscription items written.
    pub subscription_items: usize,
    /// Feature flags written.
    pub feature_flags: usize,
    /// Overrides written.
    pub overrides: usize,
}

impl SeedFixture {
    /// Reads and parses a fixture file.
    ///
    /// # Errors
    ///
    /// Returns [`SeedError`] when the file is unreadable, too large,
    /// malformed, or invalid.
    pub fn from_path(path: &Path) -> Result<Self, SeedError> {
        let file = fs::File::open(path).map_err(|err| SeedError::Io(err.to_string()))?;
        let limit = u64::try_from(MAX_SEED_BYTES).unwrap_or(u64::MAX);
        let mut bytes = Vec::new();
        file.take(limit.saturating_add(1))
            .read_to_end(&mut bytes)
            .map_err(|err| SeedError::Io(err.to_string()))?;
        if bytes.len() > MAX_SEED_BYTES {
            return Err(SeedError::Invalid(format!(
                "seed file exceeds size limit ({MAX_SEED_BYTES} bytes)"
            )));
        }
        Self::from_json_bytes(&bytes)
    }

    /// Parses and validates a fixture from JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns [`SeedError::Parse`] for malformed JSON and
    /// [`SeedError::Invalid`] for invariant violations.
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, SeedError> {
        let fixture: Self =
            serde_json::from_slice(bytes).map_err(|err| SeedError::Parse(err.to_string()))?;
        fixture.validate()?;
        Ok(fixture)
    }

    /// Checks record invariants the store does not enforce.
    fn validate(&self) -> Result<(), SeedError> {
        for flag in &self.feature_flags {
            if flag.rollout_percentage > 100 {
                return Err(SeedError::Invalid(format!(
                    "feature flag {} rollout_percentage exceeds 100",
                    flag.name
                )));
            }
        }
        for key in &self.api_keys {
            if key.key_hash.trim().is_empty() {
                return Err(SeedError::Invalid(format!("api key {} has an empty key_hash", key.id)));
            }
        }
        Ok(())
    }

    /// Writes every record to `store`.
    ///
    /// # Errors
    ///
    /// Returns [`SeedError::Store`] on the first failed write; earlier
    /// writes are kept.
    pub async fn apply(&self, store: &dyn ControlPlaneStore) -> Result<SeedReport, SeedError> {
        for tenant in &self.tenants {
            store.upsert_tenant(tenant).await?;
        }
        for member in &self.members {
            store.upsert_membership(member).await?;
        }
        for session in &self.sessions {
            store.upsert_session(session).await?;
        }
        for key in &self.api_keys {
            store.insert_api_key(key).await?;
        }
        for subscription in &self.subscriptions {
            store.upsert_subscription(subscription).await?;
        }
        for item in &self.subscription_items {
            store.upsert_subscription_item(item).await?;
        }
        for flag in &self.feature_flags {
            store.upsert_feature_flag(flag).await?;
        }
        for admin_override in &self.overrides {
            store.insert_override(admin_override).await?;
        }
        let report = SeedReport {
            tenants: self.tenants.len(),
            members: self.members.len(),
            sessions: self.sessions.len(),
            api_keys: self.api_keys.len(),
            subscriptions: self.subscriptions.len(),
            subscription_items: self.subscription_items.len(),
            feature_flags: self.feature_flags.len(),
            overrides: self.overrides.len(),
        };
        info!(tenants = report.tenants, "seed fixture applied");
        Ok(report)
    }
}
