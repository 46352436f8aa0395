//! Executes one rotation for one secret.
//!
//! The orchestrator resolves the handler for a policy, runs it, records the
//! outcome and, when the policy asks for it, restores the version that was
//! live before a failed attempt. At most one execution per path runs at a
//! time; a second caller gets [`RotationError::InProgress`].

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex as SyncMutex;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use vaultkeep_client::SecretStoreClient;

use crate::error::RotationError;
use crate::handler::HandlerRegistry;
use crate::history::{RotationHistoryRecord, RotationHistoryTracker};
use crate::policy::{RotationPolicy, RotationStatus};

/// Marks a path as in flight until dropped.
struct InFlightGuard<'a> {
    set: &'a SyncMutex<HashSet<String>>,
    path: String,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(set: &'a SyncMutex<HashSet<String>>, path: &str) -> Option<Self> {
        if !set.lock().insert(path.to_string()) {
            return None;
        }
        Some(Self {
            set,
            path: path.to_string(),
        })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.set.lock().remove(&self.path);
    }
}

/// Runs rotations and records their outcomes.
pub struct RotationOrchestrator {
    client: Arc<SecretStoreClient>,
    handlers: HandlerRegistry,
    tracker: Arc<Mutex<RotationHistoryTracker>>,
    in_flight: SyncMutex<HashSet<String>>,
    handler_timeout: Option<Duration>,
    performed_by: String,
}

impl RotationOrchestrator {
    /// Orchestrator with the given handlers and an empty history.
    pub fn new(client: Arc<SecretStoreClient>, handlers: HandlerRegistry) -> Self {
        Self {
            client,
            handlers,
            tracker: Arc::new(Mutex::new(RotationHistoryTracker::new())),
            in_flight: SyncMutex::new(HashSet::new()),
            handler_timeout: None,
            performed_by: "system".to_string(),
        }
    }

    /// Uses an existing history.
    pub fn with_tracker(mut self, tracker: Arc<Mutex<RotationHistoryTracker>>) -> Self {
        self.tracker = tracker;
        self
    }

    /// Treats handlers running longer than `timeout` as failed.
    pub fn with_handler_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout = Some(timeout);
        self
    }

    /// Actor recorded in history.
    pub fn with_performed_by(mut self, actor: impl Into<String>) -> Self {
        self.performed_by = actor.into();
        self
    }

    /// Shared history.
    pub fn tracker(&self) -> Arc<Mutex<RotationHistoryTracker>> {
        self.tracker.clone()
    }

    /// The client handlers write through.
    pub fn client(&self) -> &Arc<SecretStoreClient> {
        &self.client
    }

    /// Whether a rotation of `path` is running.
    pub fn is_in_progress(&self, path: &str) -> bool {
        self.in_flight.lock().contains(path)
    }

    /// Rotates `policy.secret_path` once.
    ///
    /// Handler failures do not surface as errors: they produce a `failed`
    /// record (plus a rollback record when a rollback was attempted). On
    /// success `policy.last_rotated` is set.
    pub async fn execute(
        &self,
        policy: &mut RotationPolicy,
    ) -> Result<RotationHistoryRecord, RotationError> {
        let path = policy.secret_path.clone();
        let _guard = InFlightGuard::acquire(&self.in_flight, &path)
            .ok_or_else(|| RotationError::InProgress(path.clone()))?;

        let started = Instant::now();
        let previous_version = self.live_version(&path).await;
        debug!(path = %path, kind = %policy.handler_kind, "Rotation started");

        let outcome = self.run_handler(&path, policy).await;
        let duration = started.elapsed().as_secs_f64();

        let record = match outcome {
            Ok(()) => {
                let new_version = self.live_version(&path).await;
                let record = self
                    .base_record(policy, RotationStatus::Success)
                    .duration(duration)
                    .versions(previous_version, new_version);
                let record = self.tracker.lock().await.record_rotation(record);
                policy.last_rotated = Some(record.timestamp);

                info!(path = %path, duration_seconds = duration, "Rotation succeeded");
                record
            },
            Err(message) => {
                let record = self
                    .base_record(policy, RotationStatus::Failed)
                    .error(message.clone())
                    .duration(duration)
                    .versions(previous_version, None);
                let record = self.tracker.lock().await.record_rotation(record);

                error!(path = %path, error = %message, "Rotation failed");
                if policy.rollback_on_failure {
                    self.rollback(policy, previous_version).await;
                }
                record
            },
        };

        Ok(record)
    }

    /// Records a failure that happened outside a handler.
    pub async fn record_failure(
        &self,
        policy: &RotationPolicy,
        message: impl Into<String>,
    ) -> RotationHistoryRecord {
        let record = self
            .base_record(policy, RotationStatus::Failed)
            .error(message);
        self.tracker.lock().await.record_rotation(record)
    }

    async fn run_handler(&self, path: &str, policy: &RotationPolicy) -> Result<(), String> {
        let handler = self.handlers.resolve(&policy.handler_kind);
        let run = handler.execute(&self.client, path, policy);

        let result = match self.handler_timeout {
            Some(limit) => match tokio::time::timeout(limit, run).await {
                Ok(result) => result,
                Err(_) => return Err(format!("handler timed out after {}s", limit.as_secs_f64())),
            },
            None => run.await,
        };

        match result {
            Ok(true) => Ok(()),
            Ok(false) => Err(format!("{} handler reported failure", policy.handler_kind)),
            Err(e) => Err(e.to_string()),
        }
    }

    /// Restores `previous` if the failed attempt left a newer version behind.
    async fn rollback(&self, policy: &RotationPolicy, previous: Option<u32>) {
        let path = &policy.secret_path;
        let current = self.live_version(path).await;

        let previous = match (previous, current) {
            (Some(previous), Some(current)) if current > previous => previous,
            _ => {
                debug!(path = %path, "Nothing to roll back");
                return;
            },
        };

        let record = match self.client.restore_version(path, previous).await {
            Ok(restored) => {
                warn!(path = %path, restored_from = previous, "Rotation rolled back");
                self.base_record(policy, RotationStatus::RolledBack)
                    .versions(current, restored.version)
                    .with_metadata("restored_from", previous.to_string())
            },
            Err(e) => {
                error!(path = %path, error = %e, "Rollback failed");
                self.base_record(policy, RotationStatus::Failed)
                    .error(format!("rollback failed: {e}"))
                    .versions(current, None)
            },
        };
        self.tracker.lock().await.record_rotation(record);
    }

    async fn live_version(&self, path: &str) -> Option<u32> {
        match self.client.get_secret_metadata(path).await {
            Ok(meta) => meta.latest_live_version,
            Err(e) => {
                debug!(path = %path, error = %e, "No version information");
                None
            },
        }
    }

    fn base_record(&self, policy: &RotationPolicy, status: RotationStatus) -> RotationHistoryRecord {
        RotationHistoryRecord::new(policy.secret_path.clone(), policy.rotation_type, status)
            .performed_by(self.performed_by.clone())
            .with_metadata("handler_kind", policy.handler_kind.clone())
    }
}
