//! Anomaly detection over a trailing window.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::AuditError;
use crate::log::AuditLog;
use crate::pattern::PathPattern;

/// Share of the threshold above which failures are reported.
pub const FAILURE_RATIO: f64 = 0.2;

/// Longest accepted window, one year.
pub const MAX_WINDOW_MINUTES: i64 = 366 * 24 * 60;

/// Detector settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyConfig {
    /// Length of the trailing window in minutes.
    pub window_minutes: i64,
    /// Operations per actor per window before a finding.
    pub threshold: usize,
    /// Prefixes or globs whose every access is reported.
    pub sensitive_patterns: Vec<String>,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            window_minutes: 60,
            threshold: 100,
            sensitive_patterns: vec![
                "*production*".to_string(),
                "*admin*".to_string(),
                "sys/*".to_string(),
            ],
        }
    }
}

/// Kind of finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    /// Too many operations by one actor.
    ExcessiveOperations,
    /// Too many failures by one actor.
    ExcessiveFailures,
    /// Access to a sensitive path.
    SensitivePathAccess,
}

impl fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ExcessiveOperations => "excessive_operations",
            Self::ExcessiveFailures => "excessive_failures",
            Self::SensitivePathAccess => "sensitive_path_access",
        })
    }
}

/// How urgent a finding is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Above the line.
    Medium,
    /// Above twice the line, or sensitive.
    High,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Medium => "medium",
            Self::High => "high",
        })
    }
}

/// One finding.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Anomaly {
    /// What was found.
    pub kind: AnomalyKind,
    /// How urgent it is.
    pub severity: Severity,
    /// Actor responsible.
    pub actor: String,
    /// Path, for sensitive access.
    pub path: Option<String>,
    /// Events behind the finding.
    pub count: usize,
    /// Window start.
    pub window_start: DateTime<Utc>,
    /// Window end.
    pub window_end: DateTime<Utc>,
    /// Human-readable summary.
    pub description: String,
}

/// Scans an [`AuditLog`] for suspicious activity.
#[derive(Debug, Clone)]
pub struct AnomalyDetector {
    config: AnomalyConfig,
    sensitive: Vec<PathPattern>,
}

impl AnomalyDetector {
    /// Checks the window and compiles the sensitive patterns.
    pub fn new(config: AnomalyConfig) -> Result<Self, AuditError> {
        if !(1..=MAX_WINDOW_MINUTES).contains(&config.window_minutes) {
            return Err(AuditError::InvalidConfig(format!(
                "window_minutes must be between 1 and {MAX_WINDOW_MINUTES}, got {}",
                config.window_minutes
            )));
        }
        let sensitive = config
            .sensitive_patterns
            .iter()
            .map(|p| PathPattern::parse(p))
            .collect::<Result<_, _>>()?;
        Ok(Self { config, sensitive })
    }

    /// Settings in use.
    pub fn config(&self) -> &AnomalyConfig {
        &self.config
    }

    /// Findings for the window ending now.
    pub fn detect(&self, log: &AuditLog) -> Vec<Anomaly> {
        self.detect_at(log, Utc::now())
    }

    /// Findings for the window ending at `end`.
    ///
    /// The list is flat and non-exclusive: one actor can appear under
    /// several kinds.
    pub fn detect_at(&self, log: &AuditLog, end: DateTime<Utc>) -> Vec<Anomaly> {
        let start = end
            .checked_sub_signed(Duration::minutes(self.config.window_minutes))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let window = log.in_time_range(Some(start), Some(end));

        let mut operations: BTreeMap<&str, usize> = BTreeMap::new();
        let mut failures: BTreeMap<&str, usize> = BTreeMap::new();
        let mut sensitive: BTreeMap<(&str, &str), usize> = BTreeMap::new();
        for event in window.events() {
            *operations.entry(event.actor.as_str()).or_insert(0) += 1;
            if !event.success {
                *failures.entry(event.actor.as_str()).or_insert(0) += 1;
            }
            if self.sensitive.iter().any(|p| p.matches(&event.path)) {
                *sensitive
                    .entry((event.path.as_str(), event.actor.as_str()))
                    .or_insert(0) += 1;
            }
        }

        let mut anomalies = Vec::new();
        let threshold = self.config.threshold as f64;
        let anomaly = |kind, severity, actor: &str, path: Option<&str>, count, description| Anomaly {
            kind,
            severity,
            actor: actor.to_string(),
            path: path.map(str::to_string),
            count,
            window_start: start,
            window_end: end,
            description,
        };

        for (actor, count) in operations {
            if let Some(severity) = severity_for(count, threshold) {
                anomalies.push(anomaly(
                    AnomalyKind::ExcessiveOperations,
                    severity,
                    actor,
                    None,
                    count,
                    format!(
                        "{actor} performed {count} operations in {} minutes",
                        self.config.window_minutes
                    ),
                ));
            }
        }

        let failure_line = threshold * FAILURE_RATIO;
        for (actor, count) in failures {
            if let Some(severity) = severity_for(count, failure_line) {
                anomalies.push(anomaly(
                    AnomalyKind::ExcessiveFailures,
                    severity,
                    actor,
                    None,
                    count,
                    format!(
                        "{actor} had {count} failed operations in {} minutes",
                        self.config.window_minutes
                    ),
                ));
            }
        }

        for ((path, actor), count) in sensitive {
            anomalies.push(anomaly(
                AnomalyKind::SensitivePathAccess,
                Severity::High,
                actor,
                Some(path),
                count,
                format!("{actor} accessed sensitive path {path} {count} time(s)"),
            ));
        }

        debug!(
            events = window.len(),
            findings = anomalies.len(),
            "Anomaly detection complete"
        );
        anomalies
    }
}

fn severity_for(count: usize, line: f64) -> Option<Severity> {
    let count = count as f64;
    if count > 2.0 * line {
        Some(Severity::High)
    } else if count > line {
        Some(Severity::Medium)
    } else {
        None
    }
}
