// crates/tenant-gate-core/src/core/identifiers.rs
// ============================================================================
// Module: Tenant Gate Identifiers
// Description: Canonical opaque identifiers for tenants, principals, and records.
// Purpose: Provide strongly typed, serializable IDs with stable string forms.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Identifiers are opaque strings that serialize transparently. Validation of
//! caller-supplied identifiers happens at the request boundary, not inside
//! these wrappers; the wrappers only keep a tenant id from being passed where
//! a user id is expected.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Identifier Macro
// ============================================================================

/// Declares a transparent string identifier with the shared accessor surface.
macro_rules! string_identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier from any string-like value.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self::new(value)
            }
        }
    };
}

// ============================================================================
// SECTION: Identifier Types
// ============================================================================

string_identifier!(
    /// Tenant identifier; the billing and isolation boundary.
    TenantId
);

string_identifier!(
    /// User identifier, unique across tenants.
    UserId
);

string_identifier!(
    /// Login session identifier.
    SessionId
);

string_identifier!(
    /// API key record identifier (never the secret itself).
    ApiKeyId
);

string_identifier!(
    /// Subscription record identifier.
    SubscriptionId
);

string_identifier!(
    /// Usage ledger event identifier.
    UsageEventId
);

string_identifier!(
    /// Feature flag record identifier.
    FeatureFlagId
);

string_identifier!(
    /// Admin override record identifier.
    OverrideId
);

string_identifier!(
    /// Service name a tenant subscribes to (for example `storage`).
    ServiceName
);

string_identifier!(
    /// Caller-supplied key that makes usage recording safe to retry.
    IdempotencyKey
);

/// Wildcard service binding accepted on sessions and API key scopes.
pub const WILDCARD_SERVICE: &str = "*";

impl ServiceName {
    /// Returns true when the service name is the `*` wildcard.
    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        self.0 == WILDCARD_SERVICE
    }
}
