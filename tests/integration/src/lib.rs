//! Integration tests for Vaultkeep.
//!
//! These tests drive the client, rotation and audit crates together against
//! the in-memory and SQLite stores.

// Allow unwrap() in tests - panics are acceptable for test assertions
#![allow(clippy::disallowed_methods)]

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tempfile::TempDir;

use vaultkeep_client::{ConnectionConfig, ReadOptions, SecretStoreClient, WriteOptions};
use vaultkeep_rotation::{HandlerError, RotationHandler, RotationPolicy};
use vaultkeep_storage::{Credentials, MemoryStore};
use vaultkeep_storage_sqlite::SqliteStore;

/// Token registered with every test store.
pub const ROOT_TOKEN: &str = "it-root-token";

// ============================================================================
// Test Stores
// ============================================================================

/// Client over a fresh in-memory store.
pub fn memory_client() -> Arc<SecretStoreClient> {
    let store = MemoryStore::new().with_credentials(Credentials::Token {
        token: ROOT_TOKEN.into(),
    });
    Arc::new(
        SecretStoreClient::new(
            ConnectionConfig::token("memory://local", ROOT_TOKEN),
            Arc::new(store),
        )
        .unwrap(),
    )
}

/// A SQLite store in its own temporary directory.
pub struct TestSqlite {
    pub dir: TempDir,
    pub store: Arc<SqliteStore>,
}

impl TestSqlite {
    /// Opens a store and registers an AppRole login.
    pub async fn start(role_id: &str, secret_id: &str) -> Result<Self> {
        let dir = TempDir::new().context("Failed to create temp dir")?;
        let store = SqliteStore::open(dir.path(), "vaultkeep").await?;
        store
            .register_credentials(&Credentials::AppRole {
                role_id: role_id.into(),
                secret_id: secret_id.into(),
            })
            .await?;
        Ok(Self {
            dir,
            store: Arc::new(store),
        })
    }

    /// Reopens the same database file.
    pub async fn reopen(&self) -> Result<Arc<SqliteStore>> {
        Ok(Arc::new(SqliteStore::open(self.dir.path(), "vaultkeep").await?))
    }

    /// AppRole client over `store`.
    pub fn client(
        &self,
        store: Arc<SqliteStore>,
        role_id: &str,
        secret_id: &str,
    ) -> Result<Arc<SecretStoreClient>> {
        let address = format!("sqlite://{}", self.dir.path().display());
        let config = ConnectionConfig::approle(address, role_id, secret_id);
        Ok(Arc::new(SecretStoreClient::new(config, store)?))
    }
}

/// Builds secret data from pairs.
pub fn data(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

// ============================================================================
// Test Handlers
// ============================================================================

/// Handler that always errors out.
pub struct RaisingHandler;

#[async_trait]
impl RotationHandler for RaisingHandler {
    async fn execute(
        &self,
        _client: &SecretStoreClient,
        _path: &str,
        _policy: &RotationPolicy,
    ) -> Result<bool, HandlerError> {
        Err(HandlerError::Internal("upstream credential API unavailable".into()))
    }
}

/// Handler that writes a half-finished value and then reports failure.
pub struct CorruptingHandler;

#[async_trait]
impl RotationHandler for CorruptingHandler {
    async fn execute(
        &self,
        client: &SecretStoreClient,
        path: &str,
        _policy: &RotationPolicy,
    ) -> Result<bool, HandlerError> {
        client
            .write_secret(path, data(&[("password", "half-rotated")]), WriteOptions::default())
            .await?;
        Ok(false)
    }
}

// ============================================================================
// Audit Fixtures
// ============================================================================

/// One audit line as written by the store.
pub fn audit_line(
    time: DateTime<Utc>,
    accessor: &str,
    operation: &str,
    path: &str,
    error: Option<&str>,
) -> String {
    let mut entry = serde_json::json!({
        "type": "response",
        "time": time.to_rfc3339(),
        "auth": {"accessor": accessor, "display_name": format!("{accessor}-name")},
        "request": {
            "id": format!("{accessor}-{}", time.timestamp_nanos_opt().unwrap_or_default()),
            "operation": operation,
            "path": path,
            "remote_address": "10.1.2.3"
        }
    });
    if let Some(error) = error {
        entry["error"] = serde_json::Value::String(error.to_string());
    }
    entry.to_string()
}

/// Reads a secret's data, bypassing the cache.
pub async fn read_fresh(client: &SecretStoreClient, path: &str) -> HashMap<String, String> {
    client
        .get_secret(path, ReadOptions::uncached())
        .await
        .unwrap()
        .data
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::Duration as ChronoDuration;
    use tokio::sync::Mutex;
    use vaultkeep_audit::{ingest, AnomalyConfig, AnomalyDetector, AnomalyKind, AuditLog, AuditReport, Operation, Severity};
    use vaultkeep_client::ClientError;
    use vaultkeep_rotation::{
        HandlerRegistry, RotationHistoryRecord, RotationHistoryTracker, RotationOrchestrator,
        RotationScheduler, RotationStatus, RotationType, SchedulePattern,
    };

    fn scheduler(client: Arc<SecretStoreClient>, handlers: HandlerRegistry) -> RotationScheduler {
        RotationScheduler::new(Arc::new(RotationOrchestrator::new(client, handlers)))
    }

    // ---------------------------------------------------------------- secrets

    async fn secrets_lifecycle(client: &SecretStoreClient) {
        let written = client
            .write_secret("app/db", data(&[("user", "u"), ("pass", "p")]), WriteOptions::default())
            .await
            .unwrap();
        assert_eq!(written.version, Some(1));

        let secret = client.get_secret("app/db", ReadOptions::default()).await.unwrap();
        assert_eq!(secret.data, data(&[("user", "u"), ("pass", "p")]));

        let listed = client.list_secrets("app/").await.unwrap();
        assert!(listed.contains(&"db".to_string()));

        client.delete_secret("app/db", None).await.unwrap();
        client.delete_secret("app/db", None).await.unwrap();

        let gone = client.get_secret("app/db", ReadOptions::default()).await;
        assert!(matches!(gone, Err(ClientError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_secrets_lifecycle_memory() {
        let client = memory_client();
        secrets_lifecycle(&client).await;
    }

    #[tokio::test]
    async fn test_secrets_lifecycle_sqlite() {
        let env = TestSqlite::start("etl", "etl-secret").await.unwrap();
        let client = env.client(env.store.clone(), "etl", "etl-secret").unwrap();
        secrets_lifecycle(&client).await;
        client.close().await;
    }

    #[tokio::test]
    async fn test_sqlite_rejects_wrong_secret_id() {
        let env = TestSqlite::start("etl", "etl-secret").await.unwrap();
        let client = env.client(env.store.clone(), "etl", "guess").unwrap();

        let result = client.get_secret("app/db", ReadOptions::default()).await;
        assert!(matches!(result, Err(ClientError::Authentication(_))));
    }

    #[tokio::test]
    async fn test_sqlite_survives_reopen() {
        let env = TestSqlite::start("etl", "etl-secret").await.unwrap();
        let client = env.client(env.store.clone(), "etl", "etl-secret").unwrap();
        client
            .write_secret("app/api", data(&[("key", "v1")]), WriteOptions::default())
            .await
            .unwrap();
        client
            .write_secret("app/api", data(&[("key", "v2")]), WriteOptions::default())
            .await
            .unwrap();
        client.close().await;

        let reopened = env.reopen().await.unwrap();
        let client = env.client(reopened, "etl", "etl-secret").unwrap();
        assert_eq!(client.get_field("app/api", "key").await.unwrap(), "v2");
        let old = client.get_secret("app/api", ReadOptions::version(1)).await.unwrap();
        assert_eq!(old.field("key"), Some("v1"));
    }

    #[tokio::test]
    async fn test_concurrent_writers_see_own_writes() {
        let client = memory_client();
        let mut tasks = Vec::new();

        for worker in 0..16 {
            let client = client.clone();
            tasks.push(tokio::spawn(async move {
                let path = format!("conc/worker-{worker}");
                for round in 0..20 {
                    let value = format!("{worker}-{round}");
                    client
                        .write_secret(&path, data(&[("v", &value)]), WriteOptions::default())
                        .await
                        .unwrap();
                    let read = client.get_secret(&path, ReadOptions::default()).await.unwrap();
                    assert_eq!(read.field("v"), Some(value.as_str()));
                }
            }));
        }

        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(client.list_secrets("conc").await.unwrap().len(), 16);
    }

    #[tokio::test]
    async fn test_hot_path_readers_never_see_stale_data_after_write() {
        let client = memory_client();
        client
            .write_secret("hot/key", data(&[("v", "0")]), WriteOptions::default())
            .await
            .unwrap();

        let latest = Arc::new(AtomicUsize::new(0));
        let mut readers = Vec::new();
        for _ in 0..8 {
            let client = client.clone();
            let latest = latest.clone();
            readers.push(tokio::spawn(async move {
                for _ in 0..50 {
                    let floor = latest.load(Ordering::SeqCst);
                    let secret = client.get_secret("hot/key", ReadOptions::default()).await.unwrap();
                    let seen: usize = secret.field("v").unwrap().parse().unwrap();
                    assert!(seen >= floor, "read {seen} after write {floor} completed");
                    tokio::task::yield_now().await;
                }
            }));
        }

        for n in 1..=30usize {
            client
                .write_secret("hot/key", data(&[("v", &n.to_string())]), WriteOptions::default())
                .await
                .unwrap();
            latest.store(n, Ordering::SeqCst);
            tokio::task::yield_now().await;
        }

        for reader in readers {
            reader.await.unwrap();
        }
    }

    // --------------------------------------------------------------- rotation

    #[tokio::test]
    async fn test_forced_rotation_with_raising_handler_is_recorded() {
        let client = memory_client();
        client
            .write_secret("app/api-key", data(&[("api_key", "vk_old")]), WriteOptions::default())
            .await
            .unwrap();

        let mut handlers = HandlerRegistry::with_builtins();
        handlers.register("api_key", Arc::new(RaisingHandler));
        let mut scheduler = scheduler(client.clone(), handlers);

        let mut policy = RotationPolicy::new("app/api-key").every_days(7).with_handler("api_key");
        policy.rollback_on_failure = true;
        scheduler
            .schedule_rotation(policy, SchedulePattern::Weekly)
            .unwrap();

        let records = scheduler.check_and_rotate(None, true).await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, RotationStatus::Failed);
        assert!(records[0]
            .error_message
            .as_deref()
            .is_some_and(|m| m.contains("upstream credential API unavailable")));

        let tracker = scheduler.orchestrator().tracker();
        let history = tracker.lock().await.get_history(Some("app/api-key"), 50, None);
        assert_eq!(history.len(), 1, "nothing changed, so no rollback record");
        assert_eq!(read_fresh(&client, "app/api-key").await["api_key"], "vk_old");
    }

    #[tokio::test]
    async fn test_one_failure_does_not_stop_the_pass() {
        let client = memory_client();
        for path in ["svc/a", "svc/b"] {
            client
                .write_secret(path, data(&[("v", "1")]), WriteOptions::default())
                .await
                .unwrap();
        }

        let mut handlers = HandlerRegistry::with_builtins();
        handlers.register("broken", Arc::new(RaisingHandler));
        let mut scheduler = scheduler(client.clone(), handlers);
        let overdue = Some(Utc::now() - ChronoDuration::minutes(1));
        for policy in [
            RotationPolicy::new("svc/a").with_handler("broken"),
            RotationPolicy::new("svc/b"),
        ] {
            let policy = RotationPolicy {
                next_rotation: overdue,
                ..policy
            };
            scheduler.schedule_rotation(policy, SchedulePattern::Daily).unwrap();
        }
        assert_eq!(scheduler.get_due_rotations().len(), 2);

        let records = scheduler.check_and_rotate(None, false).await;
        let by_path: HashMap<&str, &RotationHistoryRecord> =
            records.iter().map(|r| (r.secret_path.as_str(), r)).collect();
        assert_eq!(by_path["svc/a"].status, RotationStatus::Failed);
        assert_eq!(by_path["svc/b"].status, RotationStatus::Success);
        assert!(read_fresh(&client, "svc/b").await.contains_key("last_rotated"));

        let a = scheduler.get("svc/a").unwrap();
        let b = scheduler.get("svc/b").unwrap();
        assert_eq!(a.status, RotationStatus::Failed);
        assert!(a.policy.last_rotated.is_none());
        assert!(b.policy.last_rotated.is_some());
    }

    #[tokio::test]
    async fn test_failed_rotation_restores_previous_value() {
        let client = memory_client();
        client
            .write_secret("db/main", data(&[("password", "known-good")]), WriteOptions::default())
            .await
            .unwrap();

        let mut handlers = HandlerRegistry::with_builtins();
        handlers.register("database", Arc::new(CorruptingHandler));
        let mut scheduler = scheduler(client.clone(), handlers);
        scheduler
            .schedule_rotation(
                RotationPolicy::new("db/main").with_handler("database"),
                SchedulePattern::Daily,
            )
            .unwrap();

        let records = scheduler.check_and_rotate(Some("db/main"), true).await;
        assert_eq!(records[0].status, RotationStatus::Failed);
        assert_eq!(read_fresh(&client, "db/main").await["password"], "known-good");

        let tracker = scheduler.orchestrator().tracker();
        let history = tracker.lock().await.get_history(Some("db/main"), 50, None);
        let statuses: Vec<RotationStatus> = history.iter().map(|r| r.status).collect();
        assert!(statuses.contains(&RotationStatus::Failed));
        assert!(statuses.contains(&RotationStatus::RolledBack));

        let metadata = client.get_secret_metadata("db/main").await.unwrap();
        assert_eq!(metadata.current_version, 3);
    }

    #[tokio::test]
    async fn test_next_rotation_follows_period() {
        let client = memory_client();
        client
            .write_secret("app/token", data(&[("v", "1")]), WriteOptions::default())
            .await
            .unwrap();

        let mut scheduler = scheduler(client, HandlerRegistry::with_builtins());
        scheduler
            .schedule_rotation(RotationPolicy::new("app/token").every_days(5), SchedulePattern::Daily)
            .unwrap();
        scheduler.check_and_rotate(None, true).await;

        let policy = &scheduler.get("app/token").unwrap().policy;
        let last = policy.last_rotated.unwrap();
        assert_eq!(policy.next_rotation, Some(last + ChronoDuration::days(5)));
        assert!(scheduler.get_due_rotations().is_empty());
    }

    #[tokio::test]
    async fn test_database_rotation_on_sqlite_persists() {
        let env = TestSqlite::start("rotator", "rotator-secret").await.unwrap();
        let client = env.client(env.store.clone(), "rotator", "rotator-secret").unwrap();
        client
            .write_secret("db/warehouse", data(&[("username", "etl"), ("password", "initial")]), WriteOptions::default())
            .await
            .unwrap();

        let mut scheduler = scheduler(client.clone(), HandlerRegistry::with_builtins());
        scheduler
            .schedule_rotation(
                RotationPolicy::new("db/warehouse").every_days(30).with_handler("database"),
                SchedulePattern::Monthly,
            )
            .unwrap();
        let records = scheduler.check_and_rotate(None, true).await;
        assert_eq!(records[0].status, RotationStatus::Success);
        assert_eq!(records[0].previous_version, Some(1));
        assert_eq!(records[0].new_version, Some(2));
        client.close().await;

        let reopened = env.reopen().await.unwrap();
        let client = env.client(reopened, "rotator", "rotator-secret").unwrap();
        let secret = client.get_secret("db/warehouse", ReadOptions::default()).await.unwrap();
        assert_eq!(secret.field("previous_password"), Some("initial"));
        assert_ne!(secret.field("password"), Some("initial"));
        assert_eq!(secret.field("username"), Some("etl"));
    }

    #[tokio::test]
    async fn test_history_keeps_latest_hundred() {
        let mut tracker = RotationHistoryTracker::new();
        tracker.record_rotation(
            RotationHistoryRecord::new("app/db", RotationType::Automatic, RotationStatus::Failed)
                .error("first attempt failed"),
        );
        for _ in 0..100 {
            tracker.record_rotation(
                RotationHistoryRecord::new("app/db", RotationType::Automatic, RotationStatus::Success)
                    .duration(0.5),
            );
        }

        assert_eq!(tracker.len_for("app/db"), 100);
        let stats = tracker.get_rotation_stats(Some("app/db"));
        assert_eq!(stats.total, 100);
        assert_eq!(stats.failed_count, 0);
        assert!((stats.success_rate - 1.0).abs() < f64::EPSILON);

        let dir = TempDir::new().unwrap();
        let file = dir.path().join("history.json");
        tracker.save(&file).unwrap();
        let loaded = RotationHistoryTracker::load(&file).unwrap();
        assert_eq!(loaded.get_rotation_stats(None), stats);
    }

    #[tokio::test]
    async fn test_history_shared_with_orchestrator() {
        let client = memory_client();
        client
            .write_secret("svc/key", data(&[("api_key", "vk_1")]), WriteOptions::default())
            .await
            .unwrap();
        let tracker = Arc::new(Mutex::new(RotationHistoryTracker::new()));
        let orchestrator = RotationOrchestrator::new(client, HandlerRegistry::with_builtins())
            .with_tracker(tracker.clone())
            .with_performed_by("integration");

        let mut policy = RotationPolicy::new("svc/key").with_handler("api_key");
        orchestrator.execute(&mut policy).await.unwrap();

        let last = tracker
            .lock()
            .await
            .get_last_successful_rotation("svc/key")
            .unwrap();
        assert_eq!(last.performed_by, "integration");
        assert_eq!(policy.last_rotated, Some(last.timestamp));
    }

    // ------------------------------------------------------------------ audit

    fn write_log(dir: &TempDir, name: &str, lines: &[String]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, lines.join("\n")).unwrap();
        path
    }

    fn detect(count: usize) -> Vec<vaultkeep_audit::Anomaly> {
        let end = Utc::now();
        let lines: Vec<String> = (0..count)
            .map(|i| {
                let time = end - ChronoDuration::seconds(i as i64 * 10);
                audit_line(time, "actor-x", "read", "secret/data/app/db", None)
            })
            .collect();
        let dir = TempDir::new().unwrap();
        let file = write_log(&dir, "audit.log", &lines);

        let log = AuditLog::new(ingest(&file, None).unwrap().events);
        AnomalyDetector::new(AnomalyConfig::default())
            .unwrap()
            .detect_at(&log, end)
    }

    #[test]
    fn test_anomaly_severity_scales_with_volume() {
        let medium = detect(101);
        let ops: Vec<_> = medium
            .iter()
            .filter(|a| a.kind == AnomalyKind::ExcessiveOperations)
            .collect();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].severity, Severity::Medium);
        assert_eq!(ops[0].actor, "actor-x");

        let high = detect(201);
        let ops: Vec<_> = high
            .iter()
            .filter(|a| a.kind == AnomalyKind::ExcessiveOperations)
            .collect();
        assert_eq!(ops[0].severity, Severity::High);

        assert!(detect(100).is_empty());
    }

    #[test]
    fn test_directory_report() {
        let start = Utc::now() - ChronoDuration::minutes(30);
        let dir = TempDir::new().unwrap();
        write_log(
            &dir,
            "audit-1.log",
            &[
                audit_line(start, "alice", "read", "secret/data/app/db", None),
                audit_line(start, "alice", "update", "secret/data/app/db", None),
                "not json at all".to_string(),
            ],
        );
        write_log(
            &dir,
            "audit-2.log",
            &[
                audit_line(start, "bob", "delete", "secret/data/production/db", Some("permission denied")),
                audit_line(start, "bob", "update", "sys/policies/acl/etl", None),
            ],
        );
        write_log(&dir, "ignored.txt", &[audit_line(start, "eve", "read", "x", None)]);

        let result = ingest(dir.path(), Some("audit-*.log")).unwrap();
        assert_eq!(result.files_read, 2);
        assert_eq!(result.lines_skipped, 1);

        let log = AuditLog::new(result.events);
        assert_eq!(log.with_success(false).len(), 1);
        assert_eq!(log.with_operations(&[Operation::PolicyWrite]).len(), 1);

        let detector = AnomalyDetector::new(AnomalyConfig::default()).unwrap();
        let anomalies = detector.detect(&log);
        let report = AuditReport::build(&log, anomalies);
        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();

        assert_eq!(json["summary"]["total"], 4);
        assert_eq!(json["summary"]["failed"], 1);
        assert_eq!(json["operationsByType"]["update"], 1);
        assert_eq!(json["operationsByType"]["policy_write"], 1);
        assert_eq!(json["topActors"][0]["name"], "alice");
        let kinds: Vec<&str> = json["anomalies"]
            .as_array()
            .unwrap()
            .iter()
            .map(|a| a["kind"].as_str().unwrap())
            .collect();
        assert_eq!(kinds, vec!["sensitive_path_access", "sensitive_path_access"]);
    }
}
