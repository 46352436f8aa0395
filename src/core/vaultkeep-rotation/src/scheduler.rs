//! Rotation scheduling.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::error::RotationError;
use crate::history::RotationHistoryRecord;
use crate::orchestrator::RotationOrchestrator;
use crate::policy::{normalize_path, RotationPolicy, RotationStatus, SchedulePattern};

/// Scheduler state for one secret path.
#[derive(Debug, Clone, Serialize)]
pub struct ScheduledRotation {
    /// The policy, with `last_rotated`/`next_rotation` kept current.
    pub policy: RotationPolicy,
    /// Cadence used when the policy has neither cron nor period.
    pub pattern: SchedulePattern,
    /// When the last pass handled this path.
    pub last_checked: Option<DateTime<Utc>>,
    /// Status of the last attempt.
    pub status: RotationStatus,
}

/// Owns the active rotation policies and drives the orchestrator.
pub struct RotationScheduler {
    orchestrator: Arc<RotationOrchestrator>,
    entries: BTreeMap<String, ScheduledRotation>,
}

impl RotationScheduler {
    /// Scheduler with no policies.
    pub fn new(orchestrator: Arc<RotationOrchestrator>) -> Self {
        Self {
            orchestrator,
            entries: BTreeMap::new(),
        }
    }

    /// The orchestrator rotations are delegated to.
    pub fn orchestrator(&self) -> &Arc<RotationOrchestrator> {
        &self.orchestrator
    }

    /// Adds or replaces the policy for its path and returns the next due time.
    ///
    /// An unset `next_rotation` is computed from the cron expression, else
    /// the period, else `pattern`.
    pub fn schedule_rotation(
        &mut self,
        mut policy: RotationPolicy,
        pattern: SchedulePattern,
    ) -> Result<DateTime<Utc>, RotationError> {
        policy.validate()?;
        policy.secret_path = normalize_path(&policy.secret_path);
        if !policy.is_active {
            return Err(RotationError::InactivePolicy(policy.secret_path));
        }

        let next = match policy.next_rotation {
            Some(next) => next,
            None => policy.next_rotation_after(Utc::now(), pattern),
        };
        policy.next_rotation = Some(next);

        info!(path = %policy.secret_path, next_rotation = %next, "Rotation scheduled");
        self.entries.insert(
            policy.secret_path.clone(),
            ScheduledRotation {
                policy,
                pattern,
                last_checked: None,
                status: RotationStatus::Pending,
            },
        );
        Ok(next)
    }

    /// Removes the policy for `path`. Returns whether one existed.
    pub fn remove_rotation(&mut self, path: &str) -> bool {
        let removed = self.entries.remove(&normalize_path(path)).is_some();
        if removed {
            info!(path = path, "Rotation unscheduled");
        }
        removed
    }

    /// Scheduler state for `path`.
    pub fn get(&self, path: &str) -> Option<&ScheduledRotation> {
        self.entries.get(&normalize_path(path))
    }

    /// Every scheduled entry, ordered by path.
    pub fn scheduled(&self) -> impl Iterator<Item = &ScheduledRotation> {
        self.entries.values()
    }

    /// Current policies, ordered by path.
    pub fn policies(&self) -> Vec<RotationPolicy> {
        self.entries.values().map(|e| e.policy.clone()).collect()
    }

    /// Active policies due now. No side effects.
    pub fn get_due_rotations(&self) -> Vec<RotationPolicy> {
        let now = Utc::now();
        self.entries
            .values()
            .filter(|e| e.policy.is_active && e.policy.is_due(now))
            .map(|e| e.policy.clone())
            .collect()
    }

    /// Rotates every active policy that is due (or all, with `force`),
    /// optionally restricted to one path.
    ///
    /// One path failing never stops the pass. Afterwards each handled
    /// policy gets a fresh `next_rotation`: from `last_rotated` after a
    /// success, from the pass time otherwise. Forced rotations advance it
    /// too.
    pub async fn check_and_rotate(
        &mut self,
        path: Option<&str>,
        force: bool,
    ) -> Vec<RotationHistoryRecord> {
        let now = Utc::now();
        let path = path.map(normalize_path);
        let selected: Vec<String> = self
            .entries
            .values()
            .filter(|e| e.policy.is_active)
            .filter(|e| path.as_ref().map_or(true, |p| &e.policy.secret_path == p))
            .filter(|e| force || e.policy.is_due(now))
            .map(|e| e.policy.secret_path.clone())
            .collect();

        debug!(count = selected.len(), force = force, "Rotation pass started");

        let mut records = Vec::with_capacity(selected.len());
        for secret_path in selected {
            let Some(entry) = self.entries.get_mut(&secret_path) else {
                continue;
            };
            entry.status = RotationStatus::InProgress;
            let mut policy = entry.policy.clone();
            let pattern = entry.pattern;

            let record = match self.orchestrator.execute(&mut policy).await {
                Ok(record) => record,
                Err(e) => {
                    error!(path = %secret_path, error = %e, "Rotation could not run");
                    self.orchestrator.record_failure(&policy, e.to_string()).await
                },
            };

            let base = match (record.status, policy.last_rotated) {
                (RotationStatus::Success, Some(rotated)) => rotated,
                _ => now,
            };
            policy.next_rotation = Some(policy.next_rotation_after(base, pattern));

            if let Some(entry) = self.entries.get_mut(&secret_path) {
                entry.policy = policy;
                entry.last_checked = Some(now);
                entry.status = record.status;
            }
            records.push(record);
        }

        info!(rotated = records.len(), "Rotation pass finished");
        records
    }

    /// Runs a check pass every `period` until `shutdown` resolves.
    pub async fn run(&mut self, period: Duration, shutdown: impl Future<Output = ()>) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        info!(period_seconds = period.as_secs(), "Rotation scheduler running");
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Rotation scheduler stopping");
                    break;
                }
                _ = ticker.tick() => {
                    self.check_and_rotate(None, false).await;
                }
            }
        }
    }
}
