// crates/tenant-gate-core/src/core/ids.rs
// ============================================================================
// Module: Tenant Gate ID Generation
// Description: Collision-resistant identifiers and uniform random base62 text.
// Purpose: Generate record ids and API key secrets from the OS RNG.
// Dependencies: rand
// ============================================================================

//! ## Overview
//! Identifiers combine a base62 millisecond component (so ids sort roughly by
//! creation time) with random base62 characters. Random characters come from
//! rejection sampling: bytes at or above 248 (the largest multiple of 62 below
//! 256) are discarded so every symbol is equally likely.

// ============================================================================
// SECTION: Imports
// ============================================================================

use rand::RngCore;
use rand::rngs::OsRng;

use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Base62 alphabet.
const BASE62_ALPHABET: &[u8; 62] =
    b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";
/// Largest multiple of 62 that fits in a byte; bytes at or above are rejected.
const REJECTION_THRESHOLD: u8 = 248;
/// Number of random characters appended to generated ids.
pub const ID_RANDOM_CHARS: usize = 16;

// ============================================================================
// SECTION: Generators
// ============================================================================

/// Returns `len` uniformly distributed base62 characters.
#[must_use]
pub fn random_base62(len: usize) -> String {
    let mut out = String::with_capacity(len);
    let mut buffer = [0_u8; 64];
    while out.len() < len {
        OsRng.fill_bytes(&mut buffer);
        for byte in buffer {
            if byte >= REJECTION_THRESHOLD {
                continue;
            }
            out.push(BASE62_ALPHABET[usize::from(byte % 62)] as char);
            if out.len() == len {
                break;
            }
        }
    }
    out
}

/// Encodes a non-negative integer in base62.
#[must_use]
pub fn encode_base62(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while value > 0 {
        let index = usize::try_from(value % 62).unwrap_or(0);
        digits.push(BASE62_ALPHABET[index]);
        value /= 62;
    }
    digits.reverse();
    String::from_utf8(digits).unwrap_or_default()
}

/// Generates a prefixed identifier such as `use_1kPz3Q…`.
#[must_use]
pub fn generate_id(prefix: &str, now: Timestamp) -> String {
    let millis = u64::try_from(now.as_unix_millis()).unwrap_or(0);
    format!("{prefix}_{}{}", encode_base62(millis), random_base62(ID_RANDOM_CHARS))
}
