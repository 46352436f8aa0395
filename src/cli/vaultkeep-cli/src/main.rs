//! Vaultkeep CLI - Command line interface.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vaultkeep_audit::{
    ingest, Anomaly, AnomalyConfig, AnomalyDetector, AuditLog, AuditReport, RetentionConfig,
    RetentionManager,
};
use vaultkeep_client::{AuthMethod, ConnectionConfig, ReadOptions, SecretStoreClient, WriteOptions};
use vaultkeep_rotation::{
    HandlerRegistry, RotationHistoryTracker, RotationOrchestrator, RotationPolicy,
    RotationScheduler, RotationStatus, SchedulePattern,
};
use vaultkeep_storage::{MemoryStore, SecretStore};
use vaultkeep_storage_sqlite::SqliteStore;

/// Database name used inside a `sqlite://` directory.
const SQLITE_DB_NAME: &str = "vaultkeep";

// ============================================================================
// CLI Structure
// ============================================================================

#[derive(Parser)]
#[command(name = "vaultkeep")]
#[command(about = "Vaultkeep - Secret access, credential rotation and audit analysis")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ConnectionArgs {
    /// Store address (sqlite://<dir> or memory://local)
    #[arg(long, default_value = "sqlite://./vaultkeep-data", env = "VAULTKEEP_ADDR")]
    addr: String,

    /// Login method (token, approle, kubernetes, userpass, ldap)
    #[arg(long, default_value = "token", env = "VAULTKEEP_AUTH_METHOD")]
    auth_method: AuthMethod,

    /// Static token
    #[arg(long, env = "VAULTKEEP_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// AppRole role id
    #[arg(long, env = "VAULTKEEP_ROLE_ID")]
    role_id: Option<String>,

    /// AppRole secret id
    #[arg(long, env = "VAULTKEEP_SECRET_ID", hide_env_values = true)]
    secret_id: Option<String>,

    /// Username for userpass/ldap
    #[arg(long, env = "VAULTKEEP_USERNAME")]
    username: Option<String>,

    /// Password for userpass/ldap
    #[arg(long, env = "VAULTKEEP_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Store-side role for Kubernetes login
    #[arg(long, env = "VAULTKEEP_K8S_ROLE")]
    k8s_role: Option<String>,

    /// Service-account token file for Kubernetes login
    #[arg(long, env = "VAULTKEEP_K8S_JWT_PATH")]
    k8s_jwt_path: Option<String>,

    /// Namespace prepended to every path
    #[arg(long, env = "VAULTKEEP_NAMESPACE")]
    namespace: Option<String>,

    /// Backend mount
    #[arg(long, default_value = "secret", env = "VAULTKEEP_MOUNT")]
    mount: String,

    /// Per-call timeout in seconds
    #[arg(long, default_value = "30", env = "VAULTKEEP_TIMEOUT")]
    timeout: u64,
}

#[derive(Subcommand)]
enum Commands {
    /// Read and write secrets
    Secrets {
        #[command(subcommand)]
        command: SecretsCommands,
    },
    /// Store administration
    Operator {
        #[command(subcommand)]
        command: OperatorCommands,
    },
    /// Credential rotation
    Rotation {
        #[command(subcommand)]
        command: RotationCommands,
    },
    /// Audit log analysis
    Audit {
        #[command(subcommand)]
        command: AuditCommands,
    },
}

#[derive(Subcommand)]
enum SecretsCommands {
    /// Get a secret
    Get {
        /// Secret path
        path: String,
        /// Read a specific version
        #[arg(long)]
        version: Option<u32>,
        /// Output format (json, value)
        #[arg(long, default_value = "json")]
        format: String,
        /// Specific field to extract (only with format=value)
        #[arg(long)]
        field: Option<String>,
    },
    /// Store a secret as a new version
    Put {
        /// Secret path
        path: String,
        /// Key=value pairs
        #[arg(required = true)]
        data: Vec<String>,
        /// Only write if the current version matches
        #[arg(long)]
        cas: Option<u32>,
    },
    /// Delete a secret (all versions unless --versions is given)
    Delete {
        /// Secret path
        path: String,
        /// Soft-delete only these versions (comma separated)
        #[arg(long, value_delimiter = ',')]
        versions: Vec<u32>,
    },
    /// List a folder
    List {
        /// Folder path (root when omitted)
        #[arg(default_value = "")]
        path: String,
    },
    /// Show version metadata
    Metadata {
        /// Secret path
        path: String,
    },
}

#[derive(Subcommand)]
enum OperatorCommands {
    /// Register the configured credentials with a sqlite store
    Register,
}

#[derive(Subcommand)]
enum RotationCommands {
    /// List policies that are due
    Due {
        /// Policies file (JSON array)
        #[arg(long, env = "VAULTKEEP_POLICIES")]
        policies: PathBuf,
    },
    /// Rotate due secrets and write back the updated policies
    Check {
        /// Policies file (JSON array)
        #[arg(long, env = "VAULTKEEP_POLICIES")]
        policies: PathBuf,
        /// History file (JSON)
        #[arg(long, env = "VAULTKEEP_HISTORY")]
        history: PathBuf,
        /// Only this secret path
        #[arg(long)]
        path: Option<String>,
        /// Rotate even if not due
        #[arg(long)]
        force: bool,
        /// Deadline for each handler, in seconds
        #[arg(long)]
        handler_timeout: Option<u64>,
    },
    /// Show rotation history, newest first
    History {
        /// History file (JSON)
        #[arg(long, env = "VAULTKEEP_HISTORY")]
        history: PathBuf,
        /// Only this secret path
        #[arg(long)]
        path: Option<String>,
        /// Maximum number of records
        #[arg(long, default_value = "50")]
        limit: usize,
        /// Only records with this status
        #[arg(long)]
        status: Option<RotationStatus>,
    },
    /// Show rotation statistics
    Stats {
        /// History file (JSON)
        #[arg(long, env = "VAULTKEEP_HISTORY")]
        history: PathBuf,
        /// Only this secret path
        #[arg(long)]
        path: Option<String>,
    },
}

#[derive(Subcommand)]
enum AuditCommands {
    /// Summarize an audit log
    Report {
        /// Log file, gzip file or directory
        input: PathBuf,
        /// File name glob when input is a directory
        #[arg(long)]
        pattern: Option<String>,
        /// Output format (text, json)
        #[arg(long, default_value = "text")]
        format: String,
        #[command(flatten)]
        anomaly: AnomalyArgs,
    },
    /// Detect anomalies
    Anomalies {
        /// Log file, gzip file or directory
        input: PathBuf,
        /// File name glob when input is a directory
        #[arg(long)]
        pattern: Option<String>,
        #[command(flatten)]
        anomaly: AnomalyArgs,
    },
    /// Archive audit files past their retention period
    Retention {
        /// Directory holding audit files
        log_dir: PathBuf,
        /// Retention period in days
        #[arg(long, default_value = "90")]
        days: u64,
        /// Archive directory (defaults to <log_dir>/archive)
        #[arg(long)]
        archive_dir: Option<PathBuf>,
        /// File name glob
        #[arg(long, default_value = "*")]
        pattern: String,
        /// Only report what would be archived
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Args)]
struct AnomalyArgs {
    /// Window length in minutes
    #[arg(long, default_value = "60")]
    window_minutes: i64,
    /// Operations per actor per window
    #[arg(long, default_value = "100")]
    threshold: usize,
    /// Sensitive path prefix or glob (repeatable; replaces the defaults)
    #[arg(long = "sensitive")]
    sensitive: Vec<String>,
    /// Window end (RFC 3339); defaults to the latest event
    #[arg(long)]
    end: Option<DateTime<Utc>>,
}

/// One entry of a policies file: the policy plus its fallback cadence.
#[derive(Debug, Serialize, Deserialize)]
struct PolicyEntry {
    #[serde(flatten)]
    policy: RotationPolicy,
    #[serde(default)]
    schedule: SchedulePattern,
}

// ============================================================================
// Store Connection
// ============================================================================

impl ConnectionArgs {
    fn to_config(&self) -> ConnectionConfig {
        let mut config = ConnectionConfig::new(self.addr.clone(), self.auth_method);
        config.token = self.token.clone();
        config.role_id = self.role_id.clone();
        config.secret_id = self.secret_id.clone();
        config.username = self.username.clone();
        config.password = self.password.clone();
        config.kubernetes_role = self.k8s_role.clone();
        if let Some(path) = &self.k8s_jwt_path {
            config.jwt_path = path.clone();
        }
        config.namespace = self.namespace.clone();
        config.mount = self.mount.clone();
        config.timeout_seconds = self.timeout;
        config
    }
}

/// Directory named by a `sqlite://` address.
fn sqlite_dir(address: &str) -> Result<PathBuf> {
    let rest = address
        .strip_prefix("sqlite://")
        .with_context(|| format!("not a sqlite address: {address}"))?;
    if rest.trim_matches('/').is_empty() {
        bail!("sqlite address needs a directory, e.g. sqlite:///var/lib/vaultkeep");
    }
    Ok(PathBuf::from(rest))
}

async fn open_sqlite(config: &ConnectionConfig) -> Result<SqliteStore> {
    let dir = sqlite_dir(&config.address)?;
    SqliteStore::open(&dir, SQLITE_DB_NAME)
        .await
        .with_context(|| format!("Failed to open store in {}", dir.display()))
}

async fn open_store(config: &ConnectionConfig) -> Result<Arc<dyn SecretStore>> {
    let url = config.url()?;
    match url.scheme() {
        "sqlite" => Ok(Arc::new(open_sqlite(config).await?)),
        "memory" => {
            tracing::warn!("Using an in-memory store; nothing is persisted");
            let credentials = config.credentials().await?;
            Ok(Arc::new(MemoryStore::new().with_credentials(credentials)))
        },
        scheme => bail!("{scheme}:// stores need a transport adapter; use sqlite:// or memory://"),
    }
}

async fn connect(args: &ConnectionArgs) -> Result<Arc<SecretStoreClient>> {
    let config = args.to_config();
    config.validate().context("Invalid connection settings")?;
    let store = open_store(&config).await?;
    let client = SecretStoreClient::new(config, store).context("Failed to create client")?;
    Ok(Arc::new(client))
}

// ============================================================================
// Secrets
// ============================================================================

fn parse_pairs(pairs: &[String]) -> Result<HashMap<String, String>> {
    let mut data = HashMap::new();
    for pair in pairs {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("Invalid key=value pair: {pair}. Use format: key=value");
        };
        data.insert(key.to_string(), value.to_string());
    }
    Ok(data)
}

async fn cmd_secrets_get(
    client: &SecretStoreClient,
    path: &str,
    version: Option<u32>,
    format: &str,
    field: Option<&str>,
) -> Result<()> {
    let options = match version {
        Some(v) => ReadOptions::version(v),
        None => ReadOptions::default(),
    };
    let secret = client.get_secret(path, options).await?;
    let sorted: BTreeMap<&String, &String> = secret.data.iter().collect();

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&sorted)?);
        },
        "value" => match field {
            Some(field) => match secret.field(field) {
                Some(value) => println!("{value}"),
                None => bail!("Field '{field}' not found in secret"),
            },
            None => {
                for (k, v) in sorted {
                    println!("{k}={v}");
                }
            },
        },
        _ => bail!("Unknown format: {format}. Use 'json' or 'value'"),
    }

    Ok(())
}

async fn cmd_secrets_put(
    client: &SecretStoreClient,
    path: &str,
    pairs: &[String],
    cas: Option<u32>,
) -> Result<()> {
    let data = parse_pairs(pairs)?;
    let written = client.write_secret(path, data, WriteOptions { cas }).await?;

    match written.version {
        Some(version) => println!("Secret written successfully (version {version})"),
        None => println!("Secret written successfully"),
    }
    Ok(())
}

async fn cmd_secrets_delete(client: &SecretStoreClient, path: &str, versions: &[u32]) -> Result<()> {
    if versions.is_empty() {
        client.delete_secret(path, None).await?;
        println!("Secret '{path}' destroyed");
    } else {
        client.delete_secret(path, Some(versions)).await?;
        println!("Deleted versions {versions:?} of '{path}'");
    }
    Ok(())
}

async fn cmd_secrets_list(client: &SecretStoreClient, path: &str) -> Result<()> {
    let keys = client.list_secrets(path).await?;

    if keys.is_empty() {
        println!("No secrets found");
    } else {
        println!("Secrets:");
        for key in &keys {
            println!("  {key}");
        }
    }
    Ok(())
}

async fn cmd_secrets_metadata(client: &SecretStoreClient, path: &str) -> Result<()> {
    let metadata = client.get_secret_metadata(path).await?;
    println!("{}", serde_json::to_string_pretty(&metadata)?);
    Ok(())
}

async fn run_secrets(args: &ConnectionArgs, command: SecretsCommands) -> Result<()> {
    let client = connect(args).await?;

    let result = match command {
        SecretsCommands::Get {
            path,
            version,
            format,
            field,
        } => cmd_secrets_get(&client, &path, version, &format, field.as_deref()).await,
        SecretsCommands::Put { path, data, cas } => {
            cmd_secrets_put(&client, &path, &data, cas).await
        },
        SecretsCommands::Delete { path, versions } => {
            cmd_secrets_delete(&client, &path, &versions).await
        },
        SecretsCommands::List { path } => cmd_secrets_list(&client, &path).await,
        SecretsCommands::Metadata { path } => cmd_secrets_metadata(&client, &path).await,
    };

    client.close().await;
    result
}

// ============================================================================
// Operator
// ============================================================================

async fn cmd_operator_register(args: &ConnectionArgs) -> Result<()> {
    let config = args.to_config();
    config.validate().context("Invalid connection settings")?;
    if config.url()?.scheme() != "sqlite" {
        bail!("Credentials can only be registered with a sqlite:// store");
    }

    let store = open_sqlite(&config).await?;
    let credentials = config.credentials().await?;
    store
        .register_credentials(&credentials)
        .await
        .context("Failed to register credentials")?;

    println!(
        "Registered {} credentials for '{}' in {}",
        credentials.method(),
        credentials.principal(),
        store.db_path().display()
    );
    Ok(())
}

// ============================================================================
// Rotation
// ============================================================================

fn load_policies(path: &Path) -> Result<Vec<PolicyEntry>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read policies from {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Invalid policies file {}", path.display()))
}

fn save_policies(path: &Path, entries: &[PolicyEntry]) -> Result<()> {
    let content = serde_json::to_string_pretty(entries)?;
    fs::write(path, content)
        .with_context(|| format!("Failed to write policies to {}", path.display()))
}

fn load_history(path: &Path) -> Result<RotationHistoryTracker> {
    RotationHistoryTracker::load(path)
        .with_context(|| format!("Failed to load history from {}", path.display()))
}

fn cmd_rotation_due(policies: &Path) -> Result<()> {
    let now = Utc::now();
    let entries = load_policies(policies)?;
    let due: Vec<&PolicyEntry> = entries
        .iter()
        .filter(|e| e.policy.is_active && e.policy.is_due(now))
        .collect();

    if due.is_empty() {
        println!("No rotations due");
        return Ok(());
    }

    println!("Due rotations:");
    for entry in due {
        let next = entry
            .policy
            .next_rotation
            .map_or_else(|| "never scheduled".to_string(), |t| t.to_rfc3339());
        println!(
            "  {:<40} {:<12} {}",
            entry.policy.secret_path, entry.policy.handler_kind, next
        );
    }
    Ok(())
}

async fn cmd_rotation_check(
    args: &ConnectionArgs,
    policies: &Path,
    history: &Path,
    path: Option<&str>,
    force: bool,
    handler_timeout: Option<u64>,
) -> Result<()> {
    let entries = load_policies(policies)?;
    let tracker = Arc::new(Mutex::new(load_history(history)?));
    let client = connect(args).await?;

    let mut orchestrator = RotationOrchestrator::new(client.clone(), HandlerRegistry::with_builtins())
        .with_tracker(tracker.clone())
        .with_performed_by("vaultkeep-cli");
    if let Some(seconds) = handler_timeout {
        orchestrator = orchestrator.with_handler_timeout(Duration::from_secs(seconds));
    }
    let mut scheduler = RotationScheduler::new(Arc::new(orchestrator));

    let mut inactive = Vec::new();
    for entry in entries {
        if !entry.policy.is_active {
            inactive.push(entry);
            continue;
        }
        let secret_path = entry.policy.secret_path.clone();
        scheduler
            .schedule_rotation(entry.policy, entry.schedule)
            .with_context(|| format!("Invalid policy for {secret_path}"))?;
    }

    let records = scheduler.check_and_rotate(path, force).await;
    client.close().await;

    if records.is_empty() {
        println!("No rotations performed");
    }
    for record in &records {
        match &record.error_message {
            Some(error) => println!("  {:<12} {}: {}", record.status.to_string(), record.secret_path, error),
            None => println!("  {:<12} {}", record.status.to_string(), record.secret_path),
        }
    }

    let mut updated: Vec<PolicyEntry> = scheduler
        .scheduled()
        .map(|s| PolicyEntry {
            policy: s.policy.clone(),
            schedule: s.pattern,
        })
        .collect();
    updated.extend(inactive);
    updated.sort_by(|a, b| a.policy.secret_path.cmp(&b.policy.secret_path));
    save_policies(policies, &updated)?;
    tracker
        .lock()
        .await
        .save(history)
        .with_context(|| format!("Failed to save history to {}", history.display()))?;

    let failed = records
        .iter()
        .filter(|r| r.status == RotationStatus::Failed)
        .count();
    if failed > 0 {
        bail!("{failed} rotation(s) failed");
    }
    Ok(())
}

fn cmd_rotation_history(
    history: &Path,
    path: Option<&str>,
    limit: usize,
    status: Option<RotationStatus>,
) -> Result<()> {
    let tracker = load_history(history)?;
    let records = tracker.get_history(path, limit, status);

    if records.is_empty() {
        println!("No rotation history");
        return Ok(());
    }

    for record in records {
        let duration = record
            .duration_seconds
            .map_or_else(String::new, |d| format!("{d:.2}s"));
        println!(
            "{}  {:<12} {:<40} {:>8}  {}",
            record.timestamp.to_rfc3339(),
            record.status.to_string(),
            record.secret_path,
            duration,
            record.error_message.unwrap_or_default()
        );
    }
    Ok(())
}

fn cmd_rotation_stats(history: &Path, path: Option<&str>) -> Result<()> {
    let stats = load_history(history)?.get_rotation_stats(path);

    println!("Rotation statistics:");
    println!("  Total:        {}", stats.total);
    println!("  Succeeded:    {}", stats.success_count);
    println!("  Failed:       {}", stats.failed_count);
    println!("  Success rate: {:.1}%", stats.success_rate * 100.0);
    println!("  Avg duration: {:.2}s", stats.avg_duration_seconds);
    match stats.last_rotation {
        Some(t) => println!("  Last:         {}", t.to_rfc3339()),
        None => println!("  Last:         never"),
    }
    Ok(())
}

async fn run_rotation(args: &ConnectionArgs, command: RotationCommands) -> Result<()> {
    match command {
        RotationCommands::Due { policies } => cmd_rotation_due(&policies),
        RotationCommands::Check {
            policies,
            history,
            path,
            force,
            handler_timeout,
        } => {
            cmd_rotation_check(args, &policies, &history, path.as_deref(), force, handler_timeout)
                .await
        },
        RotationCommands::History {
            history,
            path,
            limit,
            status,
        } => cmd_rotation_history(&history, path.as_deref(), limit, status),
        RotationCommands::Stats { history, path } => cmd_rotation_stats(&history, path.as_deref()),
    }
}

// ============================================================================
// Audit
// ============================================================================

fn load_audit_log(input: &Path, pattern: Option<&str>) -> Result<AuditLog> {
    let result = ingest(input, pattern)
        .with_context(|| format!("Failed to read audit events from {}", input.display()))?;
    if result.lines_skipped > 0 {
        tracing::warn!(skipped = result.lines_skipped, "Some audit lines were skipped");
    }
    Ok(AuditLog::new(result.events))
}

fn detect(log: &AuditLog, args: &AnomalyArgs) -> Result<Vec<Anomaly>> {
    let mut config = AnomalyConfig {
        window_minutes: args.window_minutes,
        threshold: args.threshold,
        ..AnomalyConfig::default()
    };
    if !args.sensitive.is_empty() {
        config.sensitive_patterns = args.sensitive.clone();
    }
    let detector = AnomalyDetector::new(config)?;

    let end = args
        .end
        .or_else(|| log.time_range().map(|(_, last)| last))
        .unwrap_or_else(Utc::now);
    Ok(detector.detect_at(log, end))
}

fn print_anomalies(anomalies: &[Anomaly]) {
    if anomalies.is_empty() {
        println!("No anomalies detected");
        return;
    }
    for anomaly in anomalies {
        println!(
            "  [{}] {}: {}",
            anomaly.severity, anomaly.kind, anomaly.description
        );
    }
}

fn print_report(report: &AuditReport) {
    let summary = &report.summary;
    println!("Audit report:");
    println!(
        "  Events:  {} ({} succeeded, {} failed)",
        summary.total, summary.success, summary.failed
    );
    if let Some(range) = &summary.time_range {
        println!(
            "  Period:  {} .. {}",
            range.start.to_rfc3339(),
            range.end.to_rfc3339()
        );
    }

    println!();
    println!("Operations:");
    for (operation, count) in &report.operations_by_type {
        println!("  {operation:<14} {count}");
    }

    println!();
    println!("Top paths:");
    for ranked in &report.top_paths {
        println!("  {:>6}  {}", ranked.count, ranked.name);
    }

    println!();
    println!("Top actors:");
    for ranked in &report.top_actors {
        println!("  {:>6}  {}", ranked.count, ranked.name);
    }

    println!();
    println!("Anomalies:");
    print_anomalies(&report.anomalies);
}

fn cmd_audit_report(input: &Path, pattern: Option<&str>, format: &str, anomaly: &AnomalyArgs) -> Result<()> {
    let log = load_audit_log(input, pattern)?;
    let anomalies = detect(&log, anomaly)?;
    let report = AuditReport::build(&log, anomalies);

    match format {
        "json" => println!("{}", report.to_json()?),
        "text" => print_report(&report),
        _ => bail!("Unknown format: {format}. Use 'text' or 'json'"),
    }
    Ok(())
}

fn cmd_audit_anomalies(input: &Path, pattern: Option<&str>, anomaly: &AnomalyArgs) -> Result<()> {
    let log = load_audit_log(input, pattern)?;
    let anomalies = detect(&log, anomaly)?;
    println!("{} event(s) scanned, {} finding(s)", log.len(), anomalies.len());
    print_anomalies(&anomalies);
    Ok(())
}

fn cmd_audit_retention(
    log_dir: PathBuf,
    days: u64,
    archive_dir: Option<PathBuf>,
    pattern: String,
    dry_run: bool,
) -> Result<()> {
    let config = RetentionConfig {
        log_dir,
        retention_days: days,
        archive_dir,
        pattern,
    };
    let report = RetentionManager::new(config).apply(dry_run)?;

    let verb = if dry_run { "Would archive" } else { "Archived" };
    println!(
        "{verb} {} file(s), {} bytes",
        report.expired.len(),
        report.freed_bytes
    );
    for path in &report.expired {
        println!("  {}", path.display());
    }
    Ok(())
}

fn run_audit(command: AuditCommands) -> Result<()> {
    match command {
        AuditCommands::Report {
            input,
            pattern,
            format,
            anomaly,
        } => cmd_audit_report(&input, pattern.as_deref(), &format, &anomaly),
        AuditCommands::Anomalies {
            input,
            pattern,
            anomaly,
        } => cmd_audit_anomalies(&input, pattern.as_deref(), &anomaly),
        AuditCommands::Retention {
            log_dir,
            days,
            archive_dir,
            pattern,
            dry_run,
        } => cmd_audit_retention(log_dir, days, archive_dir, pattern, dry_run),
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Secrets { command } => run_secrets(&cli.connection, command).await,
        Commands::Operator { command } => match command {
            OperatorCommands::Register => cmd_operator_register(&cli.connection).await,
        },
        Commands::Rotation { command } => run_rotation(&cli.connection, command).await,
        Commands::Audit { command } => run_audit(command),
    }
}
