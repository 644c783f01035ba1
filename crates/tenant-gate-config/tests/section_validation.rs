//! Section validation tests for tenant-gate-config.
// crates/tenant-gate-config/tests/section_validation.rs
// =============================================================================
// Module: Config Section Validation Tests
// Description: Validate per-section range and consistency checks.
// Purpose: Ensure out-of-range settings fail closed instead of clamping.
// =============================================================================

use tenant_gate_config::ConfigError;
use tenant_gate_config::TenantGateConfig;

type TestResult = Result<(), String>;

fn assert_invalid(content: &str, needle: &str) -> TestResult {
    match TenantGateConfig::from_toml_str(content) {
        Err(ConfigError::Invalid(message)) if message.contains(needle) => Ok(()),
        Err(error) => Err(format!("error {error} did not contain {needle}")),
        Ok(_) => Err(format!("expected invalid config for {content}")),
    }
}

fn assert_valid(content: &str) -> TestResult {
    TenantGateConfig::from_toml_str(content).map(|_| ()).map_err(|err| err.to_string())
}

#[test]
fn decision_cache_ttl_bounds() -> TestResult {
    assert_invalid("[decision_cache]\nttl_seconds = 0\n", "decision_cache.ttl_seconds")?;
    assert_invalid("[decision_cache]\nttl_seconds = 3601\n", "decision_cache.ttl_seconds")?;
    assert_valid("[decision_cache]\nttl_seconds = 1\n")?;
    assert_valid("[decision_cache]\nttl_seconds = 3600\n")?;
    Ok(())
}

#[test]
fn stale_grace_upper_bound() -> TestResult {
    assert_invalid(
        "[decision_cache]\nstale_grace_seconds = 86401\n",
        "decision_cache.stale_grace_seconds",
    )?;
    assert_valid("[decision_cache]\nstale_grace_seconds = 0\n")?;
    assert_valid("[decision_cache]\nstale_grace_seconds = 86400\n")?;
    Ok(())
}

#[test]
fn safety_buffer_bounds() -> TestResult {
    assert_invalid("[quota]\nsafety_buffer_percent = 0\n", "quota.safety_buffer_percent")?;
    assert_invalid("[quota]\nsafety_buffer_percent = 101\n", "quota.safety_buffer_percent")?;
    assert_valid("[quota]\nsafety_buffer_percent = 1\n")?;
    assert_valid("[quota]\nsafety_buffer_percent = 100\n")?;
    Ok(())
}

#[test]
fn memory_cache_rejects_path() -> TestResult {
    assert_invalid("[cache]\nbackend = \"memory\"\npath = \"cache.db\"\n", "memory cache")
}

#[test]
fn sqlite_cache_requires_path() -> TestResult {
    assert_invalid("[cache]\nbackend = \"sqlite\"\n", "sqlite cache requires path")?;
    assert_invalid("[cache]\nbackend = \"sqlite\"\npath = \"  \"\n", "cache.path")?;
    Ok(())
}

#[test]
fn store_rejects_empty_path_and_zero_timeout() -> TestResult {
    assert_invalid("[store]\npath = \"\"\n", "store.path")?;
    assert_invalid("[store]\npath = \"gate.db\"\nbusy_timeout_ms = 0\n", "busy_timeout_ms")?;
    Ok(())
}

#[test]
fn store_rejects_directory_path() -> TestResult {
    let dir = tempfile::tempdir().map_err(|err| err.to_string())?;
    let content = format!("[store]\npath = \"{}\"\n", dir.path().display());
    assert_invalid(&content, "directory")
}

#[test]
fn store_rejects_overlong_component() -> TestResult {
    let content = format!("[store]\npath = \"{}.db\"\n", "a".repeat(300));
    assert_invalid(&content, "store.path path component too long")
}

#[test]
fn logging_level_must_be_known() -> TestResult {
    assert_invalid("[logging]\nlevel = \"verbose\"\n", "logging.level")?;
    assert_valid("[logging]\nlevel = \"WARN\"\n")?;
    Ok(())
}

#[test]
fn unknown_enum_values_fail_parse() -> TestResult {
    for content in [
        "[cache]\nbackend = \"redis\"\n",
        "[logging]\nformat = \"xml\"\n",
        "[store]\npath = \"gate.db\"\njournal_mode = \"memory\"\n",
    ] {
        match TenantGateConfig::from_toml_str(content) {
            Err(ConfigError::Parse(_)) => {}
            other => return Err(format!("expected parse error for {content}, got {other:?}")),
        }
    }
    Ok(())
}
