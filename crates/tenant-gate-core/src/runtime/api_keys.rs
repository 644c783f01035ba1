// crates/tenant-gate-core/src/runtime/api_keys.rs
// ============================================================================
// Module: Tenant Gate API Key Issuer
// Description: API key issuance, resolution, and revocation.
// Purpose: Mint secrets that are returned once and stored only as digests.
// Dependencies: serde, thiserror, tracing, crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! Secrets are `tg_` followed by 40 uniformly random base62 characters. Only
//! the SHA-256 hex digest and an 8-character display prefix are persisted;
//! the plaintext exists solely in the [`IssuedApiKey`] returned by
//! [`ApiKeyIssuer::issue`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::core::ApiKey;
use crate::core::ApiKeyId;
use crate::core::ApiKeyStatus;
use crate::core::Clock;
use crate::core::QuotaPeriod;
use crate::core::TenantId;
use crate::core::Timestamp;
use crate::core::generate_id;
use crate::core::random_base62;
use crate::core::sha256_hex;
use crate::core::tenant_cache_prefix;
use crate::interfaces::ControlPlaneStore;
use crate::interfaces::StoreError;
use crate::runtime::cache::ReadThroughCache;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Prefix of every issued secret.
pub const API_KEY_SECRET_PREFIX: &str = "tg_";
/// Random characters in an issued secret.
pub const API_KEY_SECRET_RANDOM_CHARS: usize = 40;
/// Characters of the secret kept for display.
pub const API_KEY_DISPLAY_PREFIX_CHARS: usize = 8;
/// Prefix for generated key record ids.
const API_KEY_ID_PREFIX: &str = "key";

// ============================================================================
// SECTION: Types
// ============================================================================

/// API key issuance errors.
#[derive(Debug, Error)]
pub enum ApiKeyError {
    /// Tenant does not exist.
    #[error("tenant not found: {0}")]
    TenantNotFound(TenantId),
    /// Store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Parameters for a new API key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewApiKey {
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Services the key may call; empty means unrestricted.
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Key-level ceiling.
    #[serde(default)]
    pub quota_limit: Option<u64>,
    /// Window for the key-level ceiling.
    #[serde(default)]
    pub quota_period: QuotaPeriod,
    /// Optional expiry.
    #[serde(default)]
    pub expires_at: Option<Timestamp>,
}

/// Newly issued key with its one-time plaintext secret.
#[derive(Clone, Serialize)]
pub struct IssuedApiKey {
    /// Stored key record.
    pub api_key: ApiKey,
    /// Plaintext secret; never persisted.
    pub secret: String,
}

impl fmt::Debug for IssuedApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedApiKey")
            .field("api_key", &self.api_key)
            .field("secret", &"<redacted>")
            .finish()
    }
}

// ============================================================================
// SECTION: Issuer
// ============================================================================

/// Issues, resolves, and revokes API keys.
#[derive(Clone)]
pub struct ApiKeyIssuer {
    /// Relational store.
    store: Arc<dyn ControlPlaneStore>,
    /// Time source.
    clock: Arc<dyn Clock>,
    /// Decision cache to invalidate after revocation.
    cache: Option<ReadThroughCache>,
}

impl ApiKeyIssuer {
    /// Creates an issuer.
    #[must_use]
    pub fn new(
        store: Arc<dyn ControlPlaneStore>,
        clock: Arc<dyn Clock>,
        cache: Option<ReadThroughCache>,
    ) -> Self {
        Self {
            store,
            clock,
            cache,
        }
    }

    /// Issues a key and returns its plaintext secret exactly once.
    ///
    /// # Errors
    ///
    /// Returns [`ApiKeyError`] when the tenant is unknown or the store fails.
    pub async fn issue(&self, request: NewApiKey) -> Result<IssuedApiKey, ApiKeyError> {
        if self.store.get_tenant(&request.tenant_id).await?.is_none() {
            return Err(ApiKeyError::TenantNotFound(request.tenant_id));
        }
        let now = self.clock.now();
        let secret =
            format!("{API_KEY_SECRET_PREFIX}{}", random_base62(API_KEY_SECRET_RANDOM_CHARS));
        let api_key = ApiKey {
            id: ApiKeyId::new(generate_id(API_KEY_ID_PREFIX, now)),
            tenant_id: request.tenant_id,
            key_hash: sha256_hex(secret.as_bytes()),
            key_prefix: secret.chars().take(API_KEY_DISPLAY_PREFIX_CHARS).collect(),
            scopes: request.scopes,
            quota_limit: request.quota_limit,
            quota_period: request.quota_period,
            status: ApiKeyStatus::Active,
            expires_at: request.expires_at,
        };
        self.store.insert_api_key(&api_key).await?;
        info!(tenant_id = %api_key.tenant_id, api_key_id = %api_key.id, "api key issued");
        Ok(IssuedApiKey {
            api_key,
            secret,
        })
    }

    /// Resolves a plaintext secret to an active, unexpired key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails.
    pub async fn resolve(&self, secret: &str) -> Result<Option<ApiKey>, StoreError> {
        let now = self.clock.now();
        let key = self.store.find_api_key_by_hash(&sha256_hex(secret.as_bytes())).await?;
        Ok(key.filter(|key| key.is_usable(now)))
    }

    /// Revokes a key; returns false when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the update fails.
    pub async fn revoke(&self, api_key_id: &ApiKeyId) -> Result<bool, StoreError> {
        let Some(key) = self.store.get_api_key(api_key_id).await? else {
            return Ok(false);
        };
        let revoked = self.store.revoke_api_key(api_key_id).await?;
        if revoked {
            info!(tenant_id = %key.tenant_id, api_key_id = %api_key_id, "api key revoked");
            if let Some(cache) = &self.cache {
                cache.invalidate_prefix(&tenant_cache_prefix(&key.tenant_id)).await;
            }
        }
        Ok(revoked)
    }
}
