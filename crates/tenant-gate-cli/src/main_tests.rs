// crates/tenant-gate-cli/src/main_tests.rs
// ============================================================================
// Module: CLI Main Tests
// Description: Argument parsing and command execution tests.
// Purpose: Ensure commands map onto engine calls and emit stable JSON.
// Dependencies: tenant-gate-cli main helpers
// ============================================================================

//! ## Overview
//! Parses real argument vectors with clap and runs the resulting commands
//! against a temporary `SQLite` store driven by a manual clock.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use serde_json::Value;
use tempfile::TempDir;
use tenant_gate_cli::ControlPlane;
use tenant_gate_config::TenantGateConfig;
use tenant_gate_core::ManualClock;
use tenant_gate_core::Principal;
use tenant_gate_core::Role;
use tenant_gate_core::Timestamp;

use super::Cli;
use super::Commands;
use super::ConfigCommand;
use super::PlaneCommand;
use super::build_request;
use super::command_config;
use super::execute;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// 2026-03-15T12:00:00Z.
const START_MILLIS: i64 = 1_773_576_000_000;

const FIXTURE: &str = r#"{
  "tenants": [{ "id": "acme", "name": "Acme", "global_quota_limit": 10 }],
  "members": [
    { "tenant_id": "acme", "user_id": "alice", "role": "owner" },
    { "tenant_id": "acme", "user_id": "bob", "role": "member" }
  ],
  "sessions": [{
    "id": "sess_alice",
    "user_id": "alice",
    "tenant_id": "acme",
    "service": "*",
    "expires_at": 1773579600000,
    "revoked_at": null
  }],
  "subscriptions": [{
    "id": "sub_acme",
    "tenant_id": "acme",
    "tier": "pro",
    "status": "active",
    "current_period_end": null
  }],
  "subscription_items": [
    { "subscription_id": "sub_acme", "service": "storage", "enabled": true }
  ],
  "feature_flags": [{
    "id": "flag_beta",
    "name": "beta",
    "enabled_tiers": ["pro"],
    "active": true
  }],
  "overrides": [{
    "id": "ovr_1",
    "tenant_id": "acme",
    "effect": { "type": "feature_grant", "value": "export" },
    "reason": "pilot",
    "expires_at": 1773579600000
  }]
}"#;

struct Harness {
    dir: TempDir,
    clock: Arc<ManualClock>,
    plane: ControlPlane,
}

impl Harness {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let content = format!("[store]\npath = \"{}\"\n", dir.path().join("gate.db").display());
        let config = TenantGateConfig::from_toml_str(&content).unwrap();
        let clock = Arc::new(ManualClock::new(Timestamp::from_unix_millis(START_MILLIS)));
        let plane = ControlPlane::open(&config, clock.clone()).unwrap();
        Self {
            dir,
            clock,
            plane,
        }
    }

    async fn seeded() -> Self {
        let harness = Self::new();
        let path = harness.dir.path().join("fixture.json");
        fs::write(&path, FIXTURE).unwrap();
        let report = harness.run(&["seed", "--file", path.to_str().unwrap()]).await;
        assert_eq!(report["tenants"], 1);
        assert_eq!(report["members"], 2);
        harness
    }

    async fn run(&self, args: &[&str]) -> Value {
        self.try_run(args).await.unwrap()
    }

    async fn try_run(&self, args: &[&str]) -> Result<Value, String> {
        execute(plane_command(args), &self.plane).await.map_err(|err| err.to_string())
    }
}

fn parse(args: &[&str]) -> Cli {
    let mut argv = vec!["tenant-gate"];
    argv.extend_from_slice(args);
    Cli::try_parse_from(argv).unwrap()
}

fn plane_command(args: &[&str]) -> PlaneCommand {
    match parse(args).command {
        Commands::Plane(command) => command,
        other => panic!("expected a store command, got {other:?}"),
    }
}

fn authorize_command(args: &[&str]) -> super::AuthorizeCommand {
    match plane_command(args) {
        PlaneCommand::Authorize(command) => command,
        other => panic!("expected authorize, got {other:?}"),
    }
}

fn temp_config(dir: &Path) -> TenantGateConfig {
    let content = format!("[store]\npath = \"{}\"\n", dir.join("gate.db").display());
    TenantGateConfig::from_toml_str(&content).unwrap()
}

// ============================================================================
// SECTION: Parsing
// ============================================================================

#[test]
fn global_config_flag_is_accepted_after_subcommand() {
    let cli = parse(&["quota", "usage", "--tenant", "acme", "--config", "gate.toml"]);
    assert_eq!(cli.config.as_deref(), Some(Path::new("gate.toml")));
}

#[test]
fn authorize_requires_a_principal() {
    let result = Cli::try_parse_from([
        "tenant-gate",
        "authorize",
        "--tenant",
        "acme",
        "--service",
        "storage",
        "--action",
        "read",
    ]);
    assert!(result.is_err());
}

#[test]
fn authorize_rejects_both_principals() {
    let result = Cli::try_parse_from([
        "tenant-gate",
        "authorize",
        "--tenant",
        "acme",
        "--user",
        "alice",
        "--api-key",
        "key_1",
        "--service",
        "storage",
        "--action",
        "read",
    ]);
    assert!(result.is_err());
}

#[test]
fn session_requires_user() {
    let result = Cli::try_parse_from([
        "tenant-gate",
        "authorize",
        "--tenant",
        "acme",
        "--api-key",
        "key_1",
        "--session",
        "sess_1",
        "--service",
        "storage",
        "--action",
        "read",
    ]);
    assert!(result.is_err());
}

#[test]
fn build_request_maps_every_flag() {
    let command = authorize_command(&[
        "authorize",
        "--tenant",
        "acme",
        "--user",
        "alice",
        "--session",
        "sess_alice",
        "--service",
        "storage",
        "--action",
        "write",
        "--resource",
        "bucket/1",
        "--feature",
        "beta",
        "--role",
        "admin",
        "--quantity",
        "3",
    ]);
    let request = build_request(command).unwrap();
    assert_eq!(request.tenant_id.as_str(), "acme");
    assert_eq!(request.service.as_str(), "storage");
    assert_eq!(request.action, "write");
    assert_eq!(request.resource.as_deref(), Some("bucket/1"));
    assert_eq!(request.required_feature.as_deref(), Some("beta"));
    assert_eq!(request.required_role, Some(Role::Admin));
    assert_eq!(request.quantity, 3);
    match request.principal {
        Principal::User {
            user_id,
            session_id,
        } => {
            assert_eq!(user_id.as_str(), "alice");
            assert_eq!(session_id.map(|id| id.as_str().to_string()).as_deref(), Some("sess_alice"));
        }
        Principal::ApiKey {
            ..
        } => panic!("expected a user principal"),
    }
}

#[test]
fn config_validate_reports_without_opening_store() {
    let dir = tempfile::tempdir().unwrap();
    let config = temp_config(dir.path());
    let cli = parse(&["config", "validate"]);
    let Commands::Config {
        command,
    } = cli.command
    else {
        panic!("expected config command");
    };
    assert!(matches!(command, ConfigCommand::Validate));
    let output = command_config(&command, &config);
    assert_eq!(output["valid"], true);
    assert_eq!(output["persistent_cache"], false);
    assert!(!dir.path().join("gate.db").exists());
}

// ============================================================================
// SECTION: Execution
// ============================================================================

#[tokio::test]
async fn init_reports_schema_version() {
    let harness = Harness::new();
    let output = harness.run(&["init"]).await;
    assert_eq!(output["initialized"], true);
    assert_eq!(output["schema_version"], 1);
    assert!(harness.dir.path().join("gate.db").exists());
}

#[tokio::test]
async fn authorize_allows_seeded_owner_and_reports_denials_as_output() {
    let harness = Harness::seeded().await;
    let allowed = harness
        .run(&[
            "authorize",
            "--tenant",
            "acme",
            "--user",
            "alice",
            "--session",
            "sess_alice",
            "--service",
            "storage",
            "--action",
            "read",
            "--feature",
            "beta",
        ])
        .await;
    assert_eq!(allowed["allowed"], true);
    assert_eq!(allowed["reason"], "allowed");
    assert_eq!(allowed["metadata"]["tier"], "pro");

    let denied = harness
        .run(&[
            "authorize",
            "--tenant",
            "acme",
            "--user",
            "bob",
            "--service",
            "storage",
            "--action",
            "delete",
            "--role",
            "admin",
        ])
        .await;
    assert_eq!(denied["allowed"], false);
    assert_eq!(denied["reason"], "insufficient_role");
}

#[tokio::test]
async fn quota_record_then_usage_and_check() {
    let harness = Harness::seeded().await;
    let recorded = harness
        .run(&[
            "quota",
            "record",
            "--tenant",
            "acme",
            "--service",
            "storage",
            "--action",
            "upload",
            "--quantity",
            "5",
            "--idempotency-key",
            "upload-1",
            "--user",
            "alice",
        ])
        .await;
    assert_eq!(recorded["allowed"], true);
    assert_eq!(recorded["event"]["quantity"], 5);

    let usage = harness.run(&["quota", "usage", "--tenant", "acme"]).await;
    assert_eq!(usage["period"], "2026-03");
    assert_eq!(usage["total"], 5);
    assert_eq!(usage["count"], 1);

    let other_month = harness.run(&["quota", "usage", "--tenant", "acme", "--period", "2026-02"]).await;
    assert_eq!(other_month["total"], 0);

    let check = harness.run(&["quota", "check", "--tenant", "acme", "--quantity", "5"]).await;
    assert_eq!(check["allowed"], false);
    assert_eq!(check["effective_limit"], 9);
    assert_eq!(check["remaining"], -1);
}

#[tokio::test]
async fn quota_usage_rejects_bad_period_label() {
    let harness = Harness::seeded().await;
    let error = harness
        .try_run(&["quota", "usage", "--tenant", "acme", "--period", "2026-13"])
        .await
        .unwrap_err();
    assert!(error.contains("2026-13"), "{error}");
}

#[tokio::test]
async fn flag_eval_reports_each_name() {
    let harness = Harness::seeded().await;
    let output =
        harness.run(&["flag", "eval", "--tenant", "acme", "--name", "beta", "--name", "missing"]).await;
    assert_eq!(output["flags"]["beta"], true);
    assert_eq!(output["flags"]["missing"], false);
}

#[tokio::test]
async fn overrides_show_then_cleanup_after_expiry() {
    let harness = Harness::seeded().await;
    let shown = harness.run(&["overrides", "show", "--tenant", "acme"]).await;
    assert_eq!(shown["overrides"].as_array().map(Vec::len), Some(1));
    assert_eq!(shown["effective"]["feature_grants"][0], "export");

    harness.clock.advance_seconds(3_600);
    let cleaned = harness.run(&["overrides", "cleanup"]).await;
    assert_eq!(cleaned["removed"], 1);
    let after = harness.run(&["overrides", "show", "--tenant", "acme"]).await;
    assert_eq!(after["overrides"].as_array().map(Vec::len), Some(0));
}

#[tokio::test]
async fn member_commands_enforce_last_owner() {
    let harness = Harness::seeded().await;
    let error = harness
        .try_run(&["member", "remove", "--tenant", "acme", "--user", "alice"])
        .await
        .unwrap_err();
    assert!(error.contains("owner"), "{error}");
    let readd = harness
        .try_run(&["member", "add", "--tenant", "acme", "--user", "alice", "--role", "admin"])
        .await
        .unwrap_err();
    assert!(readd.contains("owner"), "{readd}");

    let promoted =
        harness.run(&["member", "set-role", "--tenant", "acme", "--user", "bob", "--role", "owner"]).await;
    assert_eq!(promoted["role"], "owner");
    let removed = harness.run(&["member", "remove", "--tenant", "acme", "--user", "alice"]).await;
    assert_eq!(removed["removed"], true);

    let added =
        harness.run(&["member", "add", "--tenant", "acme", "--user", "carol", "--role", "member"]).await;
    assert_eq!(added["user_id"], "carol");
}

#[tokio::test]
async fn api_key_issue_authorize_and_revoke() {
    let harness = Harness::seeded().await;
    let issued = harness
        .run(&["api-key", "issue", "--tenant", "acme", "--scope", "storage", "--quota-limit", "50"])
        .await;
    let secret = issued["secret"].as_str().unwrap();
    assert!(secret.starts_with("tg_"));
    let key_id = issued["api_key"]["id"].as_str().unwrap().to_string();
    assert_eq!(issued["api_key"]["quota_period"], "month");

    let args = [
        "authorize",
        "--tenant",
        "acme",
        "--api-key",
        key_id.as_str(),
        "--service",
        "storage",
        "--action",
        "read",
    ];
    let allowed = harness.run(&args).await;
    assert_eq!(allowed["allowed"], true);

    let revoked = harness.run(&["api-key", "revoke", "--id", key_id.as_str()]).await;
    assert_eq!(revoked["revoked"], true);
    let denied = harness.run(&args).await;
    assert_eq!(denied["allowed"], false);
    assert_eq!(denied["reason"], "api_key_invalid");
}

#[tokio::test]
async fn api_key_issue_for_unknown_tenant_fails() {
    let harness = Harness::seeded().await;
    let error = harness.try_run(&["api-key", "issue", "--tenant", "ghost"]).await.unwrap_err();
    assert!(error.contains("ghost"), "{error}");
}

#[tokio::test]
async fn seed_rejects_missing_file() {
    let harness = Harness::new();
    let path = harness.dir.path().join("absent.json");
    let error = harness.try_run(&["seed", "--file", path.to_str().unwrap()]).await.unwrap_err();
    assert!(error.contains("seed io error"), "{error}");
}
