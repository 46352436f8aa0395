//! Rotation history tracking.
//!
//! Records are append-only and bounded per path: once a path holds
//! [`MAX_RECORDS_PER_PATH`] records, the oldest is evicted.

use std::collections::{HashMap, VecDeque};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::RotationError;
use crate::policy::{RotationStatus, RotationType};

/// Records retained per secret path.
pub const MAX_RECORDS_PER_PATH: usize = 100;

/// Default page size for [`RotationHistoryTracker::get_history`].
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// One rotation attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RotationHistoryRecord {
    /// Unique record id.
    pub id: Uuid,
    /// Logical secret path.
    pub secret_path: String,
    /// Trigger kind.
    pub rotation_type: RotationType,
    /// Outcome.
    pub status: RotationStatus,
    /// When the attempt finished.
    pub timestamp: DateTime<Utc>,
    /// Who or what ran the rotation.
    pub performed_by: String,
    /// Failure reason.
    #[serde(default)]
    pub error_message: Option<String>,
    /// Wall-clock duration of the attempt.
    #[serde(default)]
    pub duration_seconds: Option<f64>,
    /// Latest live version before the attempt.
    #[serde(default)]
    pub previous_version: Option<u32>,
    /// Latest live version after the attempt.
    #[serde(default)]
    pub new_version: Option<u32>,
    /// Free-form annotations.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl RotationHistoryRecord {
    /// New record stamped now, performed by `system`.
    pub fn new(
        secret_path: impl Into<String>,
        rotation_type: RotationType,
        status: RotationStatus,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            secret_path: secret_path.into(),
            rotation_type,
            status,
            timestamp: Utc::now(),
            performed_by: "system".to_string(),
            error_message: None,
            duration_seconds: None,
            previous_version: None,
            new_version: None,
            metadata: HashMap::new(),
        }
    }

    /// Sets the actor.
    pub fn performed_by(mut self, actor: impl Into<String>) -> Self {
        self.performed_by = actor.into();
        self
    }

    /// Sets the failure reason.
    pub fn error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    /// Sets the duration.
    pub fn duration(mut self, seconds: f64) -> Self {
        self.duration_seconds = Some(seconds);
        self
    }

    /// Sets the version transition.
    pub fn versions(mut self, previous: Option<u32>, new: Option<u32>) -> Self {
        self.previous_version = previous;
        self.new_version = new;
        self
    }

    /// Adds an annotation.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Aggregate statistics over retained records.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RotationStats {
    /// Records considered.
    pub total: usize,
    /// Successful attempts.
    pub success_count: usize,
    /// Failed attempts.
    pub failed_count: usize,
    /// `success_count / total`, in [0, 1].
    pub success_rate: f64,
    /// Mean duration over records that carry one.
    pub avg_duration_seconds: f64,
    /// Timestamp of the newest record.
    pub last_rotation: Option<DateTime<Utc>>,
}

/// Bounded per-path rotation history.
#[derive(Debug, Default)]
pub struct RotationHistoryTracker {
    records: HashMap<String, VecDeque<RotationHistoryRecord>>,
}

impl RotationHistoryTracker {
    /// Empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a record, evicting the oldest for its path when over capacity.
    pub fn record_rotation(&mut self, record: RotationHistoryRecord) -> RotationHistoryRecord {
        let entries = self.records.entry(record.secret_path.clone()).or_default();
        entries.push_back(record.clone());
        while entries.len() > MAX_RECORDS_PER_PATH {
            entries.pop_front();
        }

        debug!(
            path = %record.secret_path,
            status = %record.status,
            retained = entries.len(),
            "Rotation recorded"
        );
        record
    }

    /// Records for one path or all paths, newest first.
    pub fn get_history(
        &self,
        path: Option<&str>,
        limit: usize,
        status: Option<RotationStatus>,
    ) -> Vec<RotationHistoryRecord> {
        let mut records: Vec<&RotationHistoryRecord> = self
            .selected(path)
            .filter(|r| status.map_or(true, |s| r.status == s))
            .collect();
        // Within a path, later records win timestamp ties.
        records.reverse();
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        records.into_iter().take(limit).cloned().collect()
    }

    /// Statistics for one path or all paths. All-zero when empty.
    pub fn get_rotation_stats(&self, path: Option<&str>) -> RotationStats {
        let mut stats = RotationStats::default();
        let mut duration_sum = 0.0;
        let mut duration_count = 0usize;

        for record in self.selected(path) {
            stats.total += 1;
            match record.status {
                RotationStatus::Success => stats.success_count += 1,
                RotationStatus::Failed => stats.failed_count += 1,
                _ => {},
            }
            if let Some(seconds) = record.duration_seconds {
                duration_sum += seconds;
                duration_count += 1;
            }
            if stats.last_rotation.map_or(true, |last| record.timestamp > last) {
                stats.last_rotation = Some(record.timestamp);
            }
        }

        if stats.total > 0 {
            stats.success_rate = stats.success_count as f64 / stats.total as f64;
        }
        if duration_count > 0 {
            stats.avg_duration_seconds = duration_sum / duration_count as f64;
        }
        stats
    }

    /// Newest successful record for `path`.
    pub fn get_last_successful_rotation(&self, path: &str) -> Option<RotationHistoryRecord> {
        self.records.get(path).and_then(|records| {
            records
                .iter()
                .rev()
                .find(|r| r.status == RotationStatus::Success)
                .cloned()
        })
    }

    /// Number of records retained for `path`.
    pub fn len_for(&self, path: &str) -> usize {
        self.records.get(path).map_or(0, VecDeque::len)
    }

    /// Writes every record as a JSON array.
    pub fn save(&self, file: impl AsRef<Path>) -> Result<(), RotationError> {
        let mut all: Vec<&RotationHistoryRecord> = self.records.values().flatten().collect();
        all.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        let json = serde_json::to_vec_pretty(&all)?;
        std::fs::write(file.as_ref(), json)?;
        debug!(file = %file.as_ref().display(), count = all.len(), "History saved");
        Ok(())
    }

    /// Loads a file written by [`save`](Self::save). A missing file is empty history.
    pub fn load(file: impl AsRef<Path>) -> Result<Self, RotationError> {
        let file = file.as_ref();
        if !file.exists() {
            return Ok(Self::new());
        }

        let records: Vec<RotationHistoryRecord> = serde_json::from_slice(&std::fs::read(file)?)?;
        let mut tracker = Self::new();
        for record in records {
            tracker.record_rotation(record);
        }
        Ok(tracker)
    }

    fn selected<'a>(
        &'a self,
        path: Option<&'a str>,
    ) -> Box<dyn Iterator<Item = &'a RotationHistoryRecord> + 'a> {
        match path {
            Some(path) => Box::new(self.records.get(path).into_iter().flatten()),
            None => Box::new(self.records.values().flatten()),
        }
    }
}
