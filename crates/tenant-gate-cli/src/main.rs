// crates/tenant-gate-cli/src/main.rs
// ============================================================================
// Module: Tenant Gate CLI Entry Point
// Description: Command dispatcher for the Tenant Gate control plane.
// Purpose: Operate the authorization, quota, flag, and membership engines.
// Dependencies: clap, serde_json, tenant-gate-cli, tenant-gate-config, tokio
// ============================================================================

//! ## Overview
//! Every command loads `tenant-gate.toml`, opens the configured store, runs
//! one engine operation, and prints the result as JSON on stdout. Failures
//! print a message on stderr and exit with status 1. An authorization denial
//! is a successful command whose output says `"allowed": false`.

// ============================================================================
// SECTION: Modules
// ============================================================================

#[cfg(test)]
mod main_tests;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::ArgGroup;
use clap::Args;
use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use tenant_gate_cli::ControlPlane;
use tenant_gate_cli::SeedFixture;
use tenant_gate_cli::init_logging;
use tenant_gate_config::TenantGateConfig;
use tenant_gate_core::ApiKeyId;
use tenant_gate_core::AuthorizationRequest;
use tenant_gate_core::IdempotencyKey;
use tenant_gate_core::NewApiKey;
use tenant_gate_core::Principal;
use tenant_gate_core::QuotaPeriod;
use tenant_gate_core::RecordUsageInput;
use tenant_gate_core::Role;
use tenant_gate_core::ServiceName;
use tenant_gate_core::SessionId;
use tenant_gate_core::SystemClock;
use tenant_gate_core::TenantId;
use tenant_gate_core::Timestamp;
use tenant_gate_core::UsagePeriod;
use tenant_gate_core::UserId;
use tenant_gate_core::fold_overrides;
use tenant_gate_store_sqlite::SCHEMA_VERSION;
use thiserror::Error;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "tenant-gate", version, disable_help_subcommand = true)]
struct Cli {
    /// Config file path (defaults to tenant-gate.toml or `TENANT_GATE_CONFIG`).
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Configuration utilities.
    Config {
        /// Selected config subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Commands that run against the control plane store.
    #[command(flatten)]
    Plane(PlaneCommand),
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Validate the configuration file without opening the store.
    Validate,
}

/// Store-backed subcommands.
#[derive(Subcommand, Debug)]
enum PlaneCommand {
    /// Create (or verify) the store schema.
    Init,
    /// Load a JSON fixture into the store.
    Seed(SeedCommand),
    /// Evaluate an authorization request.
    Authorize(AuthorizeCommand),
    /// Quota checks and usage recording.
    Quota {
        /// Selected quota subcommand.
        #[command(subcommand)]
        command: QuotaCommand,
    },
    /// Feature flag evaluation.
    Flag {
        /// Selected flag subcommand.
        #[command(subcommand)]
        command: FlagCommand,
    },
    /// Admin override inspection and cleanup.
    Overrides {
        /// Selected overrides subcommand.
        #[command(subcommand)]
        command: OverridesCommand,
    },
    /// Tenant membership changes.
    Member {
        /// Selected member subcommand.
        #[command(subcommand)]
        command: MemberCommand,
    },
    /// API key lifecycle.
    ApiKey {
        /// Selected API key subcommand.
        #[command(subcommand)]
        command: ApiKeyCommand,
    },
}

/// Arguments for `seed`.
#[derive(Args, Debug)]
struct SeedCommand {
    /// Fixture file path.
    #[arg(long, value_name = "PATH")]
    file: PathBuf,
}

/// Arguments for `authorize`.
#[derive(Args, Debug)]
#[command(group(ArgGroup::new("principal").required(true).args(["user", "api_key"])))]
struct AuthorizeCommand {
    /// Tenant the action is attempted in.
    #[arg(long, value_name = "TENANT_ID")]
    tenant: String,
    /// Acting user.
    #[arg(long, value_name = "USER_ID")]
    user: Option<String>,
    /// Session presented by the user.
    #[arg(long, value_name = "SESSION_ID", requires = "user")]
    session: Option<String>,
    /// Acting API key record id.
    #[arg(long = "api-key", value_name = "API_KEY_ID")]
    api_key: Option<String>,
    /// Target service.
    #[arg(long)]
    service: String,
    /// Action being performed.
    #[arg(long)]
    action: String,
    /// Optional resource identifier.
    #[arg(long)]
    resource: Option<String>,
    /// Feature that must be enabled.
    #[arg(long, value_name = "FEATURE")]
    feature: Option<String>,
    /// Minimum role required.
    #[arg(long, value_enum)]
    role: Option<RoleArg>,
    /// Units of quota the action consumes.
    #[arg(long, default_value_t = 1)]
    quantity: u64,
}

/// Quota subcommands.
#[derive(Subcommand, Debug)]
enum QuotaCommand {
    /// Check whether a quantity fits under the applicable limit.
    Check(QuotaCheckCommand),
    /// Check, record, and re-check usage.
    Record(QuotaRecordCommand),
    /// Sum tenant usage for a period.
    Usage(QuotaUsageCommand),
}

/// Arguments for `quota check`.
#[derive(Args, Debug)]
struct QuotaCheckCommand {
    /// Tenant to check.
    #[arg(long, value_name = "TENANT_ID")]
    tenant: String,
    /// Units requested.
    #[arg(long, default_value_t = 1)]
    quantity: u64,
    /// API key whose own limit applies, if any.
    #[arg(long = "api-key", value_name = "API_KEY_ID")]
    api_key: Option<String>,
}

/// Arguments for `quota record`.
#[derive(Args, Debug)]
struct QuotaRecordCommand {
    /// Tenant billed for the usage.
    #[arg(long, value_name = "TENANT_ID")]
    tenant: String,
    /// Service consumed.
    #[arg(long)]
    service: String,
    /// Action performed.
    #[arg(long)]
    action: String,
    /// Units consumed.
    #[arg(long, default_value_t = 1)]
    quantity: u64,
    /// Deduplication key; retries must reuse it.
    #[arg(long, value_name = "KEY")]
    idempotency_key: String,
    /// API key the usage was made with.
    #[arg(long = "api-key", value_name = "API_KEY_ID")]
    api_key: Option<String>,
    /// User the usage was made by.
    #[arg(long, value_name = "USER_ID")]
    user: Option<String>,
}

/// Arguments for `quota usage`.
#[derive(Args, Debug)]
struct QuotaUsageCommand {
    /// Tenant to sum.
    #[arg(long, value_name = "TENANT_ID")]
    tenant: String,
    /// Period label (`2026-03`, `2026-03-15`, `2026-03-15-12`); defaults to
    /// the current month.
    #[arg(long, value_name = "PERIOD")]
    period: Option<String>,
}

/// Flag subcommands.
#[derive(Subcommand, Debug)]
enum FlagCommand {
    /// Evaluate one or more flags for a tenant.
    Eval(FlagEvalCommand),
}

/// Arguments for `flag eval`.
#[derive(Args, Debug)]
struct FlagEvalCommand {
    /// Tenant to evaluate for.
    #[arg(long, value_name = "TENANT_ID")]
    tenant: String,
    /// Flag names (repeatable).
    #[arg(long = "name", value_name = "FLAG", required = true)]
    names: Vec<String>,
}

/// Override subcommands.
#[derive(Subcommand, Debug)]
enum OverridesCommand {
    /// List a tenant's active overrides and their folded effect.
    Show(OverridesShowCommand),
    /// Delete expired overrides.
    Cleanup,
}

/// Arguments for `overrides show`.
#[derive(Args, Debug)]
struct OverridesShowCommand {
    /// Tenant to inspect.
    #[arg(long, value_name = "TENANT_ID")]
    tenant: String,
}

/// Member subcommands.
#[derive(Subcommand, Debug)]
enum MemberCommand {
    /// Add a member or replace their role.
    Add(MemberRoleCommand),
    /// Remove a member.
    Remove(MemberTargetCommand),
    /// Change a member's role.
    SetRole(MemberRoleCommand),
}

/// Member selection arguments.
#[derive(Args, Debug)]
struct MemberTargetCommand {
    /// Tenant the membership belongs to.
    #[arg(long, value_name = "TENANT_ID")]
    tenant: String,
    /// Member user id.
    #[arg(long, value_name = "USER_ID")]
    user: String,
}

/// Member selection plus a role.
#[derive(Args, Debug)]
struct MemberRoleCommand {
    /// Tenant the membership belongs to.
    #[arg(long, value_name = "TENANT_ID")]
    tenant: String,
    /// Member user id.
    #[arg(long, value_name = "USER_ID")]
    user: String,
    /// Role to assign.
    #[arg(long, value_enum)]
    role: RoleArg,
}

/// API key subcommands.
#[derive(Subcommand, Debug)]
enum ApiKeyCommand {
    /// Issue a key; the secret is printed once.
    Issue(ApiKeyIssueCommand),
    /// Revoke a key.
    Revoke(ApiKeyRevokeCommand),
}

/// Arguments for `api-key issue`.
#[derive(Args, Debug)]
struct ApiKeyIssueCommand {
    /// Owning tenant.
    #[arg(long, value_name = "TENANT_ID")]
    tenant: String,
    /// Allowed services (repeatable); none means unrestricted.
    #[arg(long = "scope", value_name = "SERVICE")]
    scopes: Vec<String>,
    /// Key-level usage ceiling.
    #[arg(long, value_name = "UNITS")]
    quota_limit: Option<u64>,
    /// Window for the key-level ceiling.
    #[arg(long, value_enum, default_value_t = QuotaPeriodArg::Month)]
    quota_period: QuotaPeriodArg,
    /// Expiry as Unix milliseconds.
    #[arg(long, value_name = "UNIX_MS")]
    expires_at: Option<i64>,
}

/// Arguments for `api-key revoke`.
#[derive(Args, Debug)]
struct ApiKeyRevokeCommand {
    /// API key record id.
    #[arg(long, value_name = "API_KEY_ID")]
    id: String,
}

/// Role values accepted on the command line.
#[derive(ValueEnum, Copy, Clone, Debug, PartialEq, Eq)]
enum RoleArg {
    /// Regular member.
    Member,
    /// Administrator.
    Admin,
    /// Owner.
    Owner,
}

impl From<RoleArg> for Role {
    fn from(value: RoleArg) -> Self {
        match value {
            RoleArg::Member => Self::Member,
            RoleArg::Admin => Self::Admin,
            RoleArg::Owner => Self::Owner,
        }
    }
}

/// Quota windows accepted on the command line.
#[derive(ValueEnum, Copy, Clone, Debug, PartialEq, Eq)]
enum QuotaPeriodArg {
    /// Calendar hour.
    Hour,
    /// Calendar day.
    Day,
    /// Calendar month.
    Month,
}

impl From<QuotaPeriodArg> for QuotaPeriod {
    fn from(value: QuotaPeriodArg) -> Self {
        match value {
            QuotaPeriodArg::Hour => Self::Hour,
            QuotaPeriodArg::Day => Self::Day,
            QuotaPeriodArg::Month => Self::Month,
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper carrying the message printed on stderr.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`].
    const fn new(message: String) -> Self {
        Self {
            message,
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the CLI command dispatcher.
async fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    let config = TenantGateConfig::load(cli.config.as_deref())
        .map_err(|err| CliError::new(format!("failed to load config: {err}")))?;
    let output = match cli.command {
        Commands::Config {
            command,
        } => command_config(&command, &config),
        Commands::Plane(command) => {
            init_logging(&config.logging).map_err(|err| CliError::new(err.to_string()))?;
            let plane = ControlPlane::open(&config, Arc::new(SystemClock))
                .map_err(|err| CliError::new(err.to_string()))?;
            execute(command, &plane).await?
        }
    };
    write_json(&output)?;
    Ok(ExitCode::SUCCESS)
}

/// Runs one store-backed command and returns its JSON output.
async fn execute(command: PlaneCommand, plane: &ControlPlane) -> CliResult<Value> {
    match command {
        PlaneCommand::Init => Ok(command_init(plane)),
        PlaneCommand::Seed(command) => command_seed(&command, plane).await,
        PlaneCommand::Authorize(command) => command_authorize(command, plane).await,
        PlaneCommand::Quota {
            command,
        } => command_quota(command, plane).await,
        PlaneCommand::Flag {
            command,
        } => command_flag(command, plane).await,
        PlaneCommand::Overrides {
            command,
        } => command_overrides(command, plane).await,
        PlaneCommand::Member {
            command,
        } => command_member(command, plane).await,
        PlaneCommand::ApiKey {
            command,
        } => command_api_key(command, plane).await,
    }
}

// ============================================================================
// SECTION: Config and Store Commands
// ============================================================================

/// Executes `config validate`.
fn command_config(command: &ConfigCommand, config: &TenantGateConfig) -> Value {
    match command {
        ConfigCommand::Validate => json!({
            "valid": true,
            "store_path": config.store.path.display().to_string(),
            "persistent_cache": config.cache_store_config().is_some(),
            "decision_cache_enabled": config.decision_cache.enabled,
        }),
    }
}

/// Executes `init`; opening the plane already created the schema.
fn command_init(plane: &ControlPlane) -> Value {
    json!({
        "initialized": true,
        "store_path": plane.store().config().path.display().to_string(),
        "schema_version": SCHEMA_VERSION,
    })
}

/// Executes `seed`.
async fn command_seed(command: &SeedCommand, plane: &ControlPlane) -> CliResult<Value> {
    let fixture =
        SeedFixture::from_path(&command.file).map_err(|err| CliError::new(err.to_string()))?;
    let report = fixture
        .apply(plane.store().as_ref())
        .await
        .map_err(|err| CliError::new(err.to_string()))?;
    to_value(&report)
}

// ============================================================================
// SECTION: Authorization Command
// ============================================================================

/// Builds the engine request from `authorize` arguments.
fn build_request(command: AuthorizeCommand) -> CliResult<AuthorizationRequest> {
    let principal = match (command.user, command.api_key) {
        (Some(user), None) => Principal::User {
            user_id: UserId::new(user),
            session_id: command.session.map(SessionId::new),
        },
        (None, Some(api_key)) => Principal::ApiKey {
            api_key_id: ApiKeyId::new(api_key),
        },
        _ => {
            return Err(CliError::new(
                "exactly one of --user or --api-key is required".to_string(),
            ));
        }
    };
    let mut request = AuthorizationRequest::new(
        TenantId::new(command.tenant),
        principal,
        ServiceName::new(command.service),
        command.action,
    )
    .with_quantity(command.quantity);
    if let Some(resource) = command.resource {
        request = request.with_resource(resource);
    }
    if let Some(feature) = command.feature {
        request = request.with_required_feature(feature);
    }
    if let Some(role) = command.role {
        request = request.with_required_role(role.into());
    }
    Ok(request)
}

/// Executes `authorize`.
async fn command_authorize(command: AuthorizeCommand, plane: &ControlPlane) -> CliResult<Value> {
    let request = build_request(command)?;
    let decision = plane.authorization().authorize(&request).await;
    to_value(&decision)
}

// ============================================================================
// SECTION: Quota Commands
// ============================================================================

/// Dispatches quota subcommands.
async fn command_quota(command: QuotaCommand, plane: &ControlPlane) -> CliResult<Value> {
    match command {
        QuotaCommand::Check(command) => {
            let api_key = command.api_key.map(ApiKeyId::new);
            let check = plane
                .quota()
                .check_quota(&TenantId::new(command.tenant), command.quantity, api_key.as_ref())
                .await
                .map_err(|err| CliError::new(err.to_string()))?;
            to_value(&check)
        }
        QuotaCommand::Record(command) => {
            let input = RecordUsageInput {
                tenant_id: TenantId::new(command.tenant),
                service: ServiceName::new(command.service),
                action: command.action,
                quantity: command.quantity,
                api_key_id: command.api_key.map(ApiKeyId::new),
                user_id: command.user.map(UserId::new),
                idempotency_key: IdempotencyKey::new(command.idempotency_key),
            };
            let outcome = plane
                .quota()
                .check_and_record_usage(&input)
                .await
                .map_err(|err| CliError::new(err.to_string()))?;
            to_value(&outcome)
        }
        QuotaCommand::Usage(command) => {
            let period = match command.period {
                Some(label) => UsagePeriod::parse(&label),
                None => UsagePeriod::current_month(plane.clock().now()),
            }
            .map_err(|err| CliError::new(err.to_string()))?;
            let tenant_id = TenantId::new(command.tenant);
            let summary = plane
                .quota()
                .get_usage(&tenant_id, Some(period))
                .await
                .map_err(|err| CliError::new(err.to_string()))?;
            Ok(json!({
                "tenant_id": tenant_id,
                "period": period.label(),
                "total": summary.total,
                "count": summary.count,
            }))
        }
    }
}

// ============================================================================
// SECTION: Flag and Override Commands
// ============================================================================

/// Dispatches flag subcommands.
async fn command_flag(command: FlagCommand, plane: &ControlPlane) -> CliResult<Value> {
    match command {
        FlagCommand::Eval(command) => {
            let tenant_id = TenantId::new(command.tenant);
            let flags = plane
                .flags()
                .features_enabled(&command.names, &tenant_id, None)
                .await
                .map_err(|err| CliError::new(err.to_string()))?;
            Ok(json!({
                "tenant_id": tenant_id,
                "flags": flags,
            }))
        }
    }
}

/// Dispatches override subcommands.
async fn command_overrides(command: OverridesCommand, plane: &ControlPlane) -> CliResult<Value> {
    match command {
        OverridesCommand::Show(command) => {
            let tenant_id = TenantId::new(command.tenant);
            let overrides = plane
                .overrides()
                .active_overrides(&tenant_id)
                .await
                .map_err(|err| CliError::new(err.to_string()))?;
            let effective = fold_overrides(&overrides, plane.clock().now());
            Ok(json!({
                "tenant_id": tenant_id,
                "overrides": overrides,
                "effective": effective,
            }))
        }
        OverridesCommand::Cleanup => {
            let removed = plane
                .overrides()
                .cleanup_expired()
                .await
                .map_err(|err| CliError::new(err.to_string()))?;
            Ok(json!({ "removed": removed }))
        }
    }
}

// ============================================================================
// SECTION: Membership and API Key Commands
// ============================================================================

/// Dispatches member subcommands.
async fn command_member(command: MemberCommand, plane: &ControlPlane) -> CliResult<Value> {
    match command {
        MemberCommand::Add(command) => {
            let membership = plane
                .membership()
                .add_member(
                    &TenantId::new(command.tenant),
                    &UserId::new(command.user),
                    command.role.into(),
                )
                .await
                .map_err(|err| CliError::new(err.to_string()))?;
            to_value(&membership)
        }
        MemberCommand::Remove(command) => {
            let tenant_id = TenantId::new(command.tenant);
            let user_id = UserId::new(command.user);
            plane
                .membership()
                .remove_member(&tenant_id, &user_id)
                .await
                .map_err(|err| CliError::new(err.to_string()))?;
            Ok(json!({
                "tenant_id": tenant_id,
                "user_id": user_id,
                "removed": true,
            }))
        }
        MemberCommand::SetRole(command) => {
            let membership = plane
                .membership()
                .change_role(
                    &TenantId::new(command.tenant),
                    &UserId::new(command.user),
                    command.role.into(),
                )
                .await
                .map_err(|err| CliError::new(err.to_string()))?;
            to_value(&membership)
        }
    }
}

/// Dispatches API key subcommands.
async fn command_api_key(command: ApiKeyCommand, plane: &ControlPlane) -> CliResult<Value> {
    match command {
        ApiKeyCommand::Issue(command) => {
            let request = NewApiKey {
                tenant_id: TenantId::new(command.tenant),
                scopes: command.scopes,
                quota_limit: command.quota_limit,
                quota_period: command.quota_period.into(),
                expires_at: command.expires_at.map(Timestamp::from_unix_millis),
            };
            let issued = plane
                .api_keys()
                .issue(request)
                .await
                .map_err(|err| CliError::new(err.to_string()))?;
            to_value(&issued)
        }
        ApiKeyCommand::Revoke(command) => {
            let api_key_id = ApiKeyId::new(command.id);
            let revoked = plane
                .api_keys()
                .revoke(&api_key_id)
                .await
                .map_err(|err| CliError::new(err.to_string()))?;
            Ok(json!({
                "api_key_id": api_key_id,
                "revoked": revoked,
            }))
        }
    }
}

// ============================================================================
// SECTION: Output Helpers
// ============================================================================

/// Serializes a command result.
fn to_value<T: Serialize>(value: &T) -> CliResult<Value> {
    serde_json::to_value(value)
        .map_err(|err| CliError::new(format!("failed to serialize output: {err}")))
}

/// Writes pretty JSON to stdout.
fn write_json(value: &Value) -> CliResult<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|err| CliError::new(format!("failed to serialize output: {err}")))?;
    write_stdout_line(&text)
        .map_err(|err| CliError::new(format!("failed to write to stdout: {err}")))
}

/// Writes a line to stdout.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
}

/// Writes a line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
