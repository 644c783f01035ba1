// crates/tenant-gate-config/src/config.rs
// ============================================================================
// Module: Tenant Gate Configuration
// Description: Configuration loading and validation for Tenant Gate.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: tenant-gate-core, tenant-gate-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! Every section has defaults, so an empty file is valid; out-of-range values
//! fail the whole load rather than being clamped.
//!
//! ## Invariants
//! - `decision_cache.ttl_seconds` is within `1..=3600`.
//! - `decision_cache.stale_grace_seconds` is at most one day.
//! - `quota.safety_buffer_percent` is within `1..=100`.
//! - A memory cache never carries a path; a sqlite cache always does.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use tenant_gate_core::AuthorizationSettings;
use tenant_gate_core::DEFAULT_DECISION_TTL_SECONDS;
use tenant_gate_core::DEFAULT_STALE_GRACE_SECONDS;
use tenant_gate_core::QuotaSettings;
use tenant_gate_core::runtime::quota::DEFAULT_SAFETY_BUFFER_PERCENT;
use tenant_gate_store_sqlite::DEFAULT_BUSY_TIMEOUT_MS;
use tenant_gate_store_sqlite::SqliteStoreConfig;
use tenant_gate_store_sqlite::SqliteStoreMode;
use tenant_gate_store_sqlite::SqliteSyncMode;
use thiserror::Error;

// ============================================================================
// SECTION: Limits and Defaults
// ============================================================================

/// Default config file name.
pub const DEFAULT_CONFIG_NAME: &str = "tenant-gate.toml";
/// Environment variable for config path.
pub const CONFIG_ENV_VAR: &str = "TENANT_GATE_CONFIG";
/// Default `SQLite` database path.
pub const DEFAULT_STORE_PATH: &str = "tenant-gate.db";
/// Maximum config file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Upper bound for the decision cache freshness window.
pub(crate) const MAX_DECISION_TTL_SECONDS: u64 = 3_600;
/// Upper bound for the stale grace window.
pub(crate) const MAX_STALE_GRACE_SECONDS: u64 = 86_400;
/// Accepted log level names.
const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

// ============================================================================
// SECTION: Configuration Types
// ============================================================================

/// Tenant Gate configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TenantGateConfig {
    /// Control plane store configuration.
    #[serde(default = "default_store_config")]
    pub store: SqliteStoreConfig,
    /// Cache backend configuration.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Decision cache timing.
    #[serde(default)]
    pub decision_cache: DecisionCacheConfig,
    /// Quota enforcement settings.
    #[serde(default)]
    pub quota: QuotaConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for TenantGateConfig {
    fn default() -> Self {
        Self {
            store: default_store_config(),
            cache: CacheConfig::default(),
            decision_cache: DecisionCacheConfig::default(),
            quota: QuotaConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl TenantGateConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        Self::from_toml_str(content)
    }

    /// Parses and validates configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_store_section(&self.store)?;
        self.cache.validate()?;
        self.decision_cache.validate()?;
        self.quota.validate()?;
        self.logging.validate()?;
        Ok(())
    }

    /// Returns quota engine settings.
    #[must_use]
    pub const fn quota_settings(&self) -> QuotaSettings {
        QuotaSettings {
            safety_buffer_percent: self.quota.safety_buffer_percent,
        }
    }

    /// Returns authorization engine settings.
    #[must_use]
    pub const fn authorization_settings(&self) -> AuthorizationSettings {
        AuthorizationSettings {
            cache_decisions: self.decision_cache.enabled,
            quota: self.quota_settings(),
        }
    }

    /// Returns the `SQLite` config for a sqlite cache backend, reusing the
    /// store's pragmas.
    #[must_use]
    pub fn cache_store_config(&self) -> Option<SqliteStoreConfig> {
        match self.cache.backend {
            CacheBackend::Memory => None,
            CacheBackend::Sqlite => self.cache.path.as_ref().map(|path| SqliteStoreConfig {
                path: path.clone(),
                busy_timeout_ms: self.store.busy_timeout_ms,
                journal_mode: self.store.journal_mode,
                sync_mode: self.store.sync_mode,
            }),
        }
    }
}

/// Returns the default store configuration.
fn default_store_config() -> SqliteStoreConfig {
    SqliteStoreConfig {
        path: PathBuf::from(DEFAULT_STORE_PATH),
        busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        journal_mode: SqliteStoreMode::default(),
        sync_mode: SqliteSyncMode::default(),
    }
}

/// Validates the `[store]` section.
fn validate_store_section(store: &SqliteStoreConfig) -> Result<(), ConfigError> {
    validate_path_string("store.path", &store.path.to_string_lossy())?;
    if store.busy_timeout_ms == 0 {
        return Err(ConfigError::Invalid(
            "store.busy_timeout_ms must be greater than zero".to_string(),
        ));
    }
    store.validate().map_err(|err| ConfigError::Invalid(err.to_string()))
}

/// Cache backend configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    /// Cache backend type.
    #[serde(default)]
    pub backend: CacheBackend,
    /// `SQLite` database path when using the sqlite backend.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl CacheConfig {
    /// Validates cache backend configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        match self.backend {
            CacheBackend::Memory => {
                if self.path.is_some() {
                    return Err(ConfigError::Invalid(
                        "memory cache must not set path".to_string(),
                    ));
                }
                Ok(())
            }
            CacheBackend::Sqlite => {
                let path = self.path.as_ref().ok_or_else(|| {
                    ConfigError::Invalid("sqlite cache requires path".to_string())
                })?;
                validate_path_string("cache.path", &path.to_string_lossy())
            }
        }
    }
}

/// Cache backend type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CacheBackend {
    /// Process-local cache.
    #[default]
    Memory,
    /// `SQLite`-backed cache that survives restarts.
    Sqlite,
}

/// Decision cache timing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DecisionCacheConfig {
    /// Whether authorization decisions are cached.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Freshness window in seconds.
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,
    /// Retention past freshness for stale fallback, in seconds.
    #[serde(default = "default_stale_grace_seconds")]
    pub stale_grace_seconds: u64,
}

impl Default for DecisionCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_seconds: DEFAULT_DECISION_TTL_SECONDS,
            stale_grace_seconds: DEFAULT_STALE_GRACE_SECONDS,
        }
    }
}

impl DecisionCacheConfig {
    /// Validates decision cache timing.
    fn validate(&self) -> Result<(), ConfigError> {
        if !(1 ..= MAX_DECISION_TTL_SECONDS).contains(&self.ttl_seconds) {
            return Err(ConfigError::Invalid(format!(
                "decision_cache.ttl_seconds must be between 1 and {MAX_DECISION_TTL_SECONDS}"
            )));
        }
        if self.stale_grace_seconds > MAX_STALE_GRACE_SECONDS {
            return Err(ConfigError::Invalid(format!(
                "decision_cache.stale_grace_seconds must be at most {MAX_STALE_GRACE_SECONDS}"
            )));
        }
        Ok(())
    }
}

/// Quota enforcement settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QuotaConfig {
    /// Percentage of each limit that may be consumed.
    #[serde(default = "default_safety_buffer_percent")]
    pub safety_buffer_percent: u8,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            safety_buffer_percent: DEFAULT_SAFETY_BUFFER_PERCENT,
        }
    }
}

impl QuotaConfig {
    /// Validates the safety buffer.
    fn validate(&self) -> Result<(), ConfigError> {
        if !(1 ..= 100).contains(&self.safety_buffer_percent) {
            return Err(ConfigError::Invalid(
                "quota.safety_buffer_percent must be between 1 and 100".to_string(),
            ));
        }
        Ok(())
    }
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Default level filter; `RUST_LOG` takes precedence.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

impl LoggingConfig {
    /// Validates the level name.
    fn validate(&self) -> Result<(), ConfigError> {
        let level = self.level.trim().to_ascii_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "logging.level must be one of {}",
                LOG_LEVELS.join(", ")
            )));
        }
        Ok(())
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// Returns true for serde defaults.
const fn default_true() -> bool {
    true
}

/// Returns the default decision TTL.
const fn default_ttl_seconds() -> u64 {
    DEFAULT_DECISION_TTL_SECONDS
}

/// Returns the default stale grace window.
const fn default_stale_grace_seconds() -> u64 {
    DEFAULT_STALE_GRACE_SECONDS
}

/// Returns the default safety buffer.
const fn default_safety_buffer_percent() -> u8 {
    DEFAULT_SAFETY_BUFFER_PERCENT
}

/// Returns the default log level.
fn default_log_level() -> String {
    "info".to_string()
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading or validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from an explicit argument, the environment, or
/// the default file name.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against security limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in Path::new(trimmed).components() {
        let component_value = component.as_os_str().to_string_lossy();
        if component_value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}
