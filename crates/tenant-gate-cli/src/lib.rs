// crates/tenant-gate-cli/src/lib.rs
// ============================================================================
// Module: Tenant Gate CLI Library
// Description: Shared wiring for the tenant-gate binary.
// Purpose: Keep store wiring, fixtures, and logging testable outside main.
// Dependencies: tenant-gate-config, tenant-gate-core, tenant-gate-store-sqlite
// ============================================================================

//! ## Overview
//! [`ControlPlane`] assembles the engines over the configured `SQLite` store
//! and cache backend. [`SeedFixture`] loads JSON fixtures into a store, and
//! [`init_logging`] installs the process-wide tracing subscriber.

pub mod context;
pub mod logging;
pub mod seed;

pub use context::ControlPlane;
pub use context::ControlPlaneError;
pub use logging::LoggingError;
pub use logging::init_logging;
pub use seed::SeedError;
pub use seed::SeedFixture;
pub use seed::SeedReport;
