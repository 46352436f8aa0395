//! Periodic audit reports.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::anomaly::Anomaly;
use crate::error::AuditError;
use crate::log::{AuditLog, Ranked};

/// Earliest and latest event covered.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeRange {
    /// First event.
    pub start: DateTime<Utc>,
    /// Last event.
    pub end: DateTime<Utc>,
}

/// Report totals.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    /// Number of events.
    pub total: usize,
    /// Successful events.
    pub success: usize,
    /// Failed events.
    pub failed: usize,
    /// Period covered, absent for an empty log.
    pub time_range: Option<TimeRange>,
}

/// Audit report, serialized in camelCase.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditReport {
    /// Totals.
    pub summary: ReportSummary,
    /// Events per operation name.
    pub operations_by_type: BTreeMap<String, usize>,
    /// Most accessed paths.
    pub top_paths: Vec<Ranked>,
    /// Most active actors.
    pub top_actors: Vec<Ranked>,
    /// Findings from anomaly detection.
    pub anomalies: Vec<Anomaly>,
}

impl AuditReport {
    /// Builds a report from a log and the anomalies found in it.
    pub fn build(log: &AuditLog, anomalies: Vec<Anomaly>) -> Self {
        let summary = log.access_summary();
        Self {
            summary: ReportSummary {
                total: summary.total,
                success: summary.success,
                failed: summary.failed,
                time_range: summary.time_range.map(|(start, end)| TimeRange { start, end }),
            },
            operations_by_type: summary
                .by_operation
                .into_iter()
                .map(|(op, count)| (op.as_str().to_string(), count))
                .collect(),
            top_paths: summary.top_paths,
            top_actors: summary.top_actors,
            anomalies,
        }
    }

    /// Pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, AuditError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;
    use crate::event::parse_line;

    #[test]
    fn test_report_shape() {
        let log = AuditLog::new(vec![
            parse_line(r#"{"time": "2026-02-01T08:00:00Z", "auth": {"accessor": "a"}, "request": {"operation": "read", "path": "secret/x"}}"#).unwrap(),
            parse_line(r#"{"time": "2026-02-01T09:00:00Z", "auth": {"accessor": "b"}, "request": {"operation": "delete", "path": "secret/y"}, "error": "permission denied"}"#).unwrap(),
        ]);
        let report = AuditReport::build(&log, Vec::new());
        let value: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();

        assert_eq!(value["summary"]["total"], 2);
        assert_eq!(value["summary"]["success"], 1);
        assert_eq!(value["summary"]["failed"], 1);
        assert_eq!(value["summary"]["timeRange"]["start"], "2026-02-01T08:00:00Z");
        assert_eq!(value["operationsByType"]["delete"], 1);
        assert_eq!(value["topPaths"].as_array().unwrap().len(), 2);
        assert_eq!(value["topActors"][0]["count"], 1);
        assert!(value["anomalies"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_empty_report() {
        let report = AuditReport::build(&AuditLog::default(), Vec::new());
        assert_eq!(report.summary.total, 0);
        assert!(report.summary.time_range.is_none());
    }
}
