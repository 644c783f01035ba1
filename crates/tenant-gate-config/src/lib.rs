// crates/tenant-gate-config/src/lib.rs
// ============================================================================
// Module: Tenant Gate Config
// Description: Canonical configuration model and validation.
// Purpose: Single source of truth for tenant-gate.toml semantics.
// Dependencies: tenant-gate-core, tenant-gate-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! Loads `tenant-gate.toml` under hard size and path limits and converts the
//! validated sections into engine settings and store configs.

pub mod config;

pub use config::*;
