// crates/tenant-gate-core/src/core/tenancy.rs
// ============================================================================
// Module: Tenant Gate Tenancy Model
// Description: Tenants, memberships, sessions, and API keys.
// Purpose: Define the principal-side records consulted by the pipeline.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Principal records: who belongs to which tenant, with what role, and which
//! credentials (sessions and API keys) are currently valid. Expiry is always
//! evaluated against an injected "now"; nothing here reads the clock.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::ApiKeyId;
use crate::core::identifiers::ServiceName;
use crate::core::identifiers::SessionId;
use crate::core::identifiers::TenantId;
use crate::core::identifiers::UserId;
use crate::core::identifiers::WILDCARD_SERVICE;
use crate::core::period::QuotaPeriod;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Tenant
// ============================================================================

/// Billing and isolation boundary.
///
/// # Invariants
/// - `name` is unique across tenants (enforced by the store).
/// - `global_quota_limit = None` means unlimited usage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    /// Tenant identifier.
    pub id: TenantId,
    /// Unique display name.
    pub name: String,
    /// Monthly usage ceiling across the whole tenant.
    pub global_quota_limit: Option<u64>,
}

// ============================================================================
// SECTION: Membership
// ============================================================================

/// Tenant role, ordered by privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Regular member.
    Member,
    /// Administrator.
    Admin,
    /// Owner; every tenant keeps at least one.
    Owner,
}

impl Role {
    /// Numeric privilege rank (member=0 < admin=1 < owner=2).
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Member => 0,
            Self::Admin => 1,
            Self::Owner => 2,
        }
    }

    /// Returns true when this role meets or exceeds `required`.
    #[must_use]
    pub const fn satisfies(self, required: Self) -> bool {
        self.rank() >= required.rank()
    }

    /// Returns the stable label for the role.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Member => "member",
            Self::Admin => "admin",
            Self::Owner => "owner",
        }
    }

    /// Parses a role label.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "member" => Some(Self::Member),
            "admin" => Some(Self::Admin),
            "owner" => Some(Self::Owner),
            _ => None,
        }
    }
}

/// Membership row binding a user to a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantUser {
    /// Tenant identifier.
    pub tenant_id: TenantId,
    /// User identifier.
    pub user_id: UserId,
    /// Role within the tenant.
    pub role: Role,
}

// ============================================================================
// SECTION: Sessions
// ============================================================================

/// Login session bound to a (user, tenant, service) tuple.
///
/// # Invariants
/// - `service = "*"` binds the session to every service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Session identifier.
    pub id: SessionId,
    /// Owning user.
    pub user_id: UserId,
    /// Tenant the session was opened against.
    pub tenant_id: TenantId,
    /// Service binding, or `*`.
    pub service: ServiceName,
    /// Expiry time.
    pub expires_at: Timestamp,
    /// Explicit revocation time.
    pub revoked_at: Option<Timestamp>,
}

impl Session {
    /// Returns true when the session is neither revoked nor expired at `now`.
    #[must_use]
    pub fn is_live(&self, now: Timestamp) -> bool {
        self.revoked_at.is_none() && self.expires_at >= now
    }

    /// Returns true when the session may be used against `service`.
    #[must_use]
    pub fn covers_service(&self, service: &ServiceName) -> bool {
        self.service.is_wildcard() || &self.service == service
    }
}

// ============================================================================
// SECTION: API Keys
// ============================================================================

/// API key lifecycle status; `Revoked` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiKeyStatus {
    /// Key is usable.
    Active,
    /// Key was revoked.
    Revoked,
}

impl ApiKeyStatus {
    /// Returns the stable label for the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Revoked => "revoked",
        }
    }

    /// Parses a status label.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "active" => Some(Self::Active),
            "revoked" => Some(Self::Revoked),
            _ => None,
        }
    }
}

/// Tenant API key record.
///
/// # Invariants
/// - Only the SHA-256 digest of the secret is stored; `key_hash` is unique.
/// - `quota_limit = None` means the key has no key-level ceiling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKey {
    /// Key record identifier.
    pub id: ApiKeyId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Lowercase hex SHA-256 of the secret.
    pub key_hash: String,
    /// Short display prefix of the secret.
    pub key_prefix: String,
    /// Services this key may call; empty means unrestricted.
    pub scopes: Vec<String>,
    /// Key-level usage ceiling.
    pub quota_limit: Option<u64>,
    /// Window the key-level ceiling applies to.
    pub quota_period: QuotaPeriod,
    /// Lifecycle status.
    pub status: ApiKeyStatus,
    /// Optional expiry time.
    pub expires_at: Option<Timestamp>,
}

impl ApiKey {
    /// Returns true when the key is active and unexpired at `now`.
    #[must_use]
    pub fn is_usable(&self, now: Timestamp) -> bool {
        self.status == ApiKeyStatus::Active && self.expires_at.is_none_or(|at| at > now)
    }

    /// Returns true when the key's scopes cover `service`.
    #[must_use]
    pub fn allows_service(&self, service: &ServiceName) -> bool {
        self.scopes.is_empty()
            || self
                .scopes
                .iter()
                .any(|scope| scope == WILDCARD_SERVICE || scope == service.as_str())
    }
}
