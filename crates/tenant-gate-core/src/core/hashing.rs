// crates/tenant-gate-core/src/core/hashing.rs
// ============================================================================
// Module: Tenant Gate Hashing
// Description: SHA-256 digests for secrets and the rollout bucketing hash.
// Purpose: Provide the two hash functions the decision pipeline relies on.
// Dependencies: sha2
// ============================================================================

//! ## Overview
//! Two unrelated hashes live here:
//! - [`sha256_hex`] digests API key secrets; only the digest is persisted.
//! - [`rolling_hash`] / [`rollout_bucket`] bucket tenants into feature-flag
//!   rollouts. This hash is deliberately non-cryptographic and must stay
//!   bit-for-bit stable: changing it reshuffles every tenant's rollout.

// ============================================================================
// SECTION: Imports
// ============================================================================

use sha2::Digest;
use sha2::Sha256;

use crate::core::identifiers::TenantId;

// ============================================================================
// SECTION: SHA-256
// ============================================================================

/// Returns the lowercase hex SHA-256 digest of `bytes`.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex_encode(&hasher.finalize())
}

/// Encodes bytes as a lowercase hex string.
fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(HEX[(byte >> 4) as usize] as char);
        out.push(HEX[(byte & 0x0f) as usize] as char);
    }
    out
}

// ============================================================================
// SECTION: Rollout Hash
// ============================================================================

/// Number of rollout buckets.
pub const ROLLOUT_BUCKETS: u8 = 100;

/// 32-bit rolling hash over the UTF-16 code units of `input`.
///
/// Computes `hash = hash * 31 + unit` with wrapping signed 32-bit arithmetic,
/// which matches `(hash * 31 + charCode) mod 2^32` read as a signed integer.
#[must_use]
pub fn rolling_hash(input: &str) -> i32 {
    input
        .encode_utf16()
        .fold(0_i32, |hash, unit| hash.wrapping_mul(31).wrapping_add(i32::from(unit)))
}

/// Returns the rollout bucket (`0..100`) for a tenant and flag pair.
///
/// The bucket is `abs(rolling_hash("{tenant}:{flag}")) mod 100`; the absolute
/// value is taken in 64-bit so `i32::MIN` does not overflow.
#[must_use]
pub fn rollout_bucket(tenant_id: &TenantId, flag_name: &str) -> u8 {
    let hash = rolling_hash(&format!("{}:{flag_name}", tenant_id.as_str()));
    let bucket = i64::from(hash).abs() % i64::from(ROLLOUT_BUCKETS);
    u8::try_from(bucket).unwrap_or(0)
}
