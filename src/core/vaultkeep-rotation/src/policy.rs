//! Rotation policies.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::cron;
use crate::error::RotationError;

/// Longest accepted `rotation_period_days`.
pub const MAX_PERIOD_DAYS: u32 = 36_500;

/// How a rotation was triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationType {
    /// Operator initiated.
    Manual,
    /// Periodic, driven by `rotation_period_days`.
    Automatic,
    /// Driven by a cron expression.
    Scheduled,
}

/// Outcome of a rotation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationStatus {
    /// Rotation completed.
    Success,
    /// Rotation (or its rollback) failed.
    Failed,
    /// Scheduled, not yet attempted.
    Pending,
    /// Currently executing.
    InProgress,
    /// A failed rotation was reverted to the previous version.
    RolledBack,
}

impl fmt::Display for RotationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::RolledBack => "rolled_back",
        };
        f.write_str(name)
    }
}

impl FromStr for RotationStatus {
    type Err = RotationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "rolled_back" => Ok(Self::RolledBack),
            other => Err(RotationError::InvalidPolicy(format!("unknown status '{other}'"))),
        }
    }
}

/// Named default cadence used when a policy has neither cron nor period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulePattern {
    /// Every day.
    #[default]
    Daily,
    /// Every 7 days.
    Weekly,
    /// Every 30 days.
    Monthly,
}

impl SchedulePattern {
    /// Interval between rotations.
    pub fn interval(&self) -> Duration {
        match self {
            Self::Daily => Duration::days(1),
            Self::Weekly => Duration::days(7),
            Self::Monthly => Duration::days(30),
        }
    }
}

impl FromStr for SchedulePattern {
    type Err = RotationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            other => Err(RotationError::InvalidPolicy(format!("unknown schedule '{other}'"))),
        }
    }
}

/// Rotation policy for one secret path.
///
/// `max_retries`, `notify_on_failure` and `notify_emails` are carried for
/// external collaborators; the rotation engine itself does not act on them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RotationPolicy {
    /// Logical secret path.
    pub secret_path: String,

    /// Trigger kind recorded in history.
    #[serde(default = "default_rotation_type")]
    pub rotation_type: RotationType,

    /// Rotate every N days.
    #[serde(default)]
    pub rotation_period_days: Option<u32>,

    /// Reduced cron expression; takes precedence over the period.
    #[serde(default)]
    pub cron_schedule: Option<String>,

    /// Handler kind, e.g. `database` or `api_key`.
    #[serde(default = "default_handler_kind")]
    pub handler_kind: String,

    /// Inactive policies are never scheduled or rotated.
    #[serde(default = "default_true")]
    pub is_active: bool,

    /// Restore the previous version when a rotation fails.
    #[serde(default = "default_true")]
    pub rollback_on_failure: bool,

    /// Retry budget for an external retry driver.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Ask an external notifier to report failures.
    #[serde(default)]
    pub notify_on_failure: bool,

    /// Recipients for the external notifier.
    #[serde(default)]
    pub notify_emails: Vec<String>,

    /// Time of the last successful rotation.
    #[serde(default)]
    pub last_rotated: Option<DateTime<Utc>>,

    /// Time the next rotation is due.
    #[serde(default)]
    pub next_rotation: Option<DateTime<Utc>>,
}

fn default_rotation_type() -> RotationType {
    RotationType::Automatic
}

fn default_handler_kind() -> String {
    "generic".to_string()
}

fn default_true() -> bool {
    true
}

fn default_max_retries() -> u32 {
    3
}

impl RotationPolicy {
    /// Active automatic policy with the `generic` handler.
    pub fn new(secret_path: impl Into<String>) -> Self {
        Self {
            secret_path: secret_path.into(),
            rotation_type: default_rotation_type(),
            rotation_period_days: None,
            cron_schedule: None,
            handler_kind: default_handler_kind(),
            is_active: true,
            rollback_on_failure: true,
            max_retries: default_max_retries(),
            notify_on_failure: false,
            notify_emails: Vec::new(),
            last_rotated: None,
            next_rotation: None,
        }
    }

    /// Sets the rotation period.
    pub fn every_days(mut self, days: u32) -> Self {
        self.rotation_period_days = Some(days);
        self
    }

    /// Sets the cron expression.
    pub fn with_cron(mut self, expr: impl Into<String>) -> Self {
        self.cron_schedule = Some(expr.into());
        self.rotation_type = RotationType::Scheduled;
        self
    }

    /// Sets the handler kind.
    pub fn with_handler(mut self, kind: impl Into<String>) -> Self {
        self.handler_kind = kind.into();
        self
    }

    /// Rejects empty paths and periods outside `1..=MAX_PERIOD_DAYS`.
    pub fn validate(&self) -> Result<(), RotationError> {
        if normalize_path(&self.secret_path).is_empty() {
            return Err(RotationError::InvalidPolicy("secret_path cannot be empty".into()));
        }
        if let Some(days) = self.rotation_period_days {
            if days == 0 || days > MAX_PERIOD_DAYS {
                return Err(RotationError::InvalidPolicy(format!(
                    "rotation_period_days must be between 1 and {MAX_PERIOD_DAYS} for {}",
                    self.secret_path
                )));
            }
        }
        Ok(())
    }

    /// Whether the policy is due at `now`. Never-scheduled policies are due.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_rotation.map_or(true, |next| now >= next)
    }

    /// Next rotation after `from`: cron first, then the period, then `pattern`.
    pub fn next_rotation_after(
        &self,
        from: DateTime<Utc>,
        pattern: SchedulePattern,
    ) -> DateTime<Utc> {
        if let Some(expr) = &self.cron_schedule {
            return cron::next_occurrence(expr, from);
        }
        let step = match self.rotation_period_days {
            Some(days) => Duration::days(i64::from(days)),
            None => pattern.interval(),
        };
        from.checked_add_signed(step).unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

/// Trims slashes and drops empty segments: `/app//db/` becomes `app/db`.
pub fn normalize_path(path: &str) -> String {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}
