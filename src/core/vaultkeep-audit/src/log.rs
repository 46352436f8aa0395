//! Filterable collections of audit events and their aggregations.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Datelike, Duration, DurationRound, TimeZone, Timelike, Utc};
use serde::Serialize;

use crate::error::AuditError;
use crate::event::{AuditLogEvent, Operation};
use crate::pattern::PathPattern;

/// How many entries the top-paths and top-actors lists keep.
pub const TOP_N: usize = 10;

/// Granularity of [`AuditLog::group_by_time`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeBucket {
    /// Truncate to the hour.
    Hour,
    /// Truncate to midnight UTC.
    Day,
    /// Truncate to Monday midnight UTC.
    Week,
    /// Truncate to the first of the month.
    Month,
}

impl TimeBucket {
    fn start_of(&self, t: DateTime<Utc>) -> DateTime<Utc> {
        let midnight = t.duration_trunc(Duration::days(1)).unwrap_or(t);
        match self {
            Self::Hour => t.duration_trunc(Duration::hours(1)).unwrap_or(t),
            Self::Day => midnight,
            Self::Week => {
                midnight - Duration::days(i64::from(midnight.weekday().num_days_from_monday()))
            },
            Self::Month => Utc
                .with_ymd_and_hms(t.year(), t.month(), 1, 0, 0, 0)
                .single()
                .unwrap_or(midnight),
        }
    }
}

/// Count attached to a path or actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ranked {
    /// Path or actor.
    pub name: String,
    /// Number of events.
    pub count: usize,
}

/// Summary of how the store was accessed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccessSummary {
    /// Number of events.
    pub total: usize,
    /// Successful events.
    pub success: usize,
    /// Failed events.
    pub failed: usize,
    /// Successful share of all events, 0 to 1.
    pub success_rate: f64,
    /// Events per operation.
    pub by_operation: BTreeMap<Operation, usize>,
    /// Most accessed paths.
    pub top_paths: Vec<Ranked>,
    /// Most active actors.
    pub top_actors: Vec<Ranked>,
    /// Events per hour of day (UTC), 24 slots.
    pub hourly_distribution: Vec<usize>,
    /// Earliest and latest event.
    pub time_range: Option<(DateTime<Utc>, DateTime<Utc>)>,
}

/// Audit events with chainable filters.
///
/// Filters return a new log and leave the receiver untouched.
#[derive(Debug, Clone, Default)]
pub struct AuditLog {
    events: Vec<AuditLogEvent>,
}

impl From<Vec<AuditLogEvent>> for AuditLog {
    fn from(events: Vec<AuditLogEvent>) -> Self {
        Self::new(events)
    }
}

impl AuditLog {
    /// Wraps events.
    pub fn new(events: Vec<AuditLogEvent>) -> Self {
        Self { events }
    }

    /// The events.
    pub fn events(&self) -> &[AuditLogEvent] {
        &self.events
    }

    /// Number of events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether there are no events.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    fn retain(&self, keep: impl Fn(&AuditLogEvent) -> bool) -> Self {
        Self {
            events: self.events.iter().filter(|e| keep(e)).cloned().collect(),
        }
    }

    /// Events with `start <= timestamp <= end`; open bounds are unbounded.
    pub fn in_time_range(&self, start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        self.retain(|e| {
            start.map_or(true, |s| e.timestamp >= s) && end.map_or(true, |t| e.timestamp <= t)
        })
    }

    /// Events whose operation is in `operations`.
    pub fn with_operations(&self, operations: &[Operation]) -> Self {
        self.retain(|e| operations.contains(&e.operation))
    }

    /// Events whose path matches a prefix or glob.
    pub fn with_path(&self, pattern: &str) -> Result<Self, AuditError> {
        let pattern = PathPattern::parse(pattern)?;
        Ok(self.retain(|e| pattern.matches(&e.path)))
    }

    /// Events by any of `actors`.
    pub fn with_actors(&self, actors: &[&str]) -> Self {
        let actors: HashSet<&str> = actors.iter().copied().collect();
        self.retain(|e| actors.contains(e.actor.as_str()))
    }

    /// Events with the given outcome.
    pub fn with_success(&self, success: bool) -> Self {
        self.retain(|e| e.success == success)
    }

    /// Events from any of `addresses`.
    pub fn with_client_ips(&self, addresses: &[&str]) -> Self {
        self.retain(|e| {
            e.client_ip
                .as_deref()
                .is_some_and(|ip| addresses.contains(&ip))
        })
    }

    /// Case-insensitive search across path, actor, error and metadata values.
    pub fn search(&self, text: &str) -> Self {
        let needle = text.to_lowercase();
        self.retain(|e| {
            let hit = |s: &str| s.to_lowercase().contains(&needle);
            hit(&e.path)
                || hit(&e.actor)
                || e.error_message.as_deref().is_some_and(hit)
                || e.metadata.values().any(|v| hit(v))
        })
    }

    /// Events grouped by operation.
    pub fn group_by_operation(&self) -> BTreeMap<Operation, Vec<&AuditLogEvent>> {
        let mut groups: BTreeMap<Operation, Vec<&AuditLogEvent>> = BTreeMap::new();
        for event in &self.events {
            groups.entry(event.operation).or_default().push(event);
        }
        groups
    }

    /// Event counts per bucket start.
    pub fn group_by_time(&self, bucket: TimeBucket) -> BTreeMap<DateTime<Utc>, usize> {
        let mut groups = BTreeMap::new();
        for event in &self.events {
            *groups.entry(bucket.start_of(event.timestamp)).or_insert(0) += 1;
        }
        groups
    }

    /// Earliest and latest timestamps.
    pub fn time_range(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let first = self.events.iter().map(|e| e.timestamp).min()?;
        let last = self.events.iter().map(|e| e.timestamp).max()?;
        Some((first, last))
    }

    /// Totals, per-operation counts, top paths and actors, hourly spread.
    pub fn access_summary(&self) -> AccessSummary {
        let total = self.events.len();
        let success = self.events.iter().filter(|e| e.success).count();

        let mut by_operation = BTreeMap::new();
        let mut paths: HashMap<&str, usize> = HashMap::new();
        let mut actors: HashMap<&str, usize> = HashMap::new();
        let mut hourly_distribution = vec![0; 24];
        for event in &self.events {
            *by_operation.entry(event.operation).or_insert(0) += 1;
            *paths.entry(event.path.as_str()).or_insert(0) += 1;
            *actors.entry(event.actor.as_str()).or_insert(0) += 1;
            hourly_distribution[event.timestamp.hour() as usize] += 1;
        }

        AccessSummary {
            total,
            success,
            failed: total - success,
            success_rate: if total == 0 {
                0.0
            } else {
                success as f64 / total as f64
            },
            by_operation,
            top_paths: top_n(paths),
            top_actors: top_n(actors),
            hourly_distribution,
            time_range: self.time_range(),
        }
    }
}

fn top_n(counts: HashMap<&str, usize>) -> Vec<Ranked> {
    let mut ranked: Vec<Ranked> = counts
        .into_iter()
        .map(|(name, count)| Ranked {
            name: name.to_string(),
            count,
        })
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
    ranked.truncate(TOP_N);
    ranked
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;

    fn event(minute: u32, op: Operation, path: &str, actor: &str, error: Option<&str>) -> AuditLogEvent {
        AuditLogEvent {
            id: format!("{path}-{minute}"),
            timestamp: Utc.with_ymd_and_hms(2026, 3, 4, 10, minute, 0).unwrap(),
            operation: op,
            path: path.to_string(),
            actor: actor.to_string(),
            success: error.is_none(),
            error_message: error.map(str::to_string),
            client_ip: Some(format!("10.0.0.{}", minute % 3)),
            request_id: None,
            metadata: BTreeMap::from([("display_name".to_string(), format!("{actor}-name"))]),
        }
    }

    fn sample() -> AuditLog {
        AuditLog::new(vec![
            event(0, Operation::Read, "secret/app/db", "alice", None),
            event(5, Operation::Read, "secret/app/db", "bob", None),
            event(10, Operation::Write, "secret/app/api", "alice", None),
            event(15, Operation::Delete, "secret/production/db", "carol", Some("permission denied")),
            event(20, Operation::List, "secret/app/", "alice", None),
        ])
    }

    #[test]
    fn test_filters_chain_without_mutating() {
        let log = sample();
        let filtered = log
            .with_actors(&["alice", "bob"])
            .with_operations(&[Operation::Read])
            .with_success(true);
        assert_eq!(filtered.len(), 2);
        assert_eq!(log.len(), 5);
    }

    #[test]
    fn test_time_range() {
        let log = sample();
        let start = Utc.with_ymd_and_hms(2026, 3, 4, 10, 5, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2026, 3, 4, 10, 15, 0).unwrap();
        assert_eq!(log.in_time_range(Some(start), Some(end)).len(), 3);
        assert_eq!(log.in_time_range(Some(start), None).len(), 4);
    }

    #[test]
    fn test_path_prefix_and_glob() {
        let log = sample();
        assert_eq!(log.with_path("secret/app/").unwrap().len(), 4);
        assert_eq!(log.with_path("*/db").unwrap().len(), 3);
    }

    #[test]
    fn test_client_ips_and_search() {
        let log = sample();
        assert_eq!(log.with_client_ips(&["10.0.0.0"]).len(), 2);
        assert_eq!(log.search("PERMISSION").len(), 1);
        assert_eq!(log.search("bob-name").len(), 1);
        assert_eq!(log.search("production").len(), 1);
    }

    #[test]
    fn test_group_by_operation() {
        let log = sample();
        let groups = log.group_by_operation();
        assert_eq!(groups[&Operation::Read].len(), 2);
        assert_eq!(groups[&Operation::Delete].len(), 1);
        assert!(!groups.contains_key(&Operation::Deny));
    }

    #[test]
    fn test_time_buckets() {
        // 2026-03-04 is a Wednesday.
        let t = Utc.with_ymd_and_hms(2026, 3, 4, 10, 42, 7).unwrap();
        assert_eq!(TimeBucket::Hour.start_of(t), Utc.with_ymd_and_hms(2026, 3, 4, 10, 0, 0).unwrap());
        assert_eq!(TimeBucket::Day.start_of(t), Utc.with_ymd_and_hms(2026, 3, 4, 0, 0, 0).unwrap());
        assert_eq!(TimeBucket::Week.start_of(t), Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap());
        assert_eq!(TimeBucket::Month.start_of(t), Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap());

        let groups = sample().group_by_time(TimeBucket::Hour);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups.values().sum::<usize>(), 5);
    }

    #[test]
    fn test_access_summary() {
        let summary = sample().access_summary();
        assert_eq!(summary.total, 5);
        assert_eq!(summary.failed, 1);
        assert!((summary.success_rate - 0.8).abs() < 1e-9);
        assert_eq!(summary.top_paths[0], Ranked { name: "secret/app/db".into(), count: 2 });
        assert_eq!(summary.top_actors[0], Ranked { name: "alice".into(), count: 3 });
        assert_eq!(summary.hourly_distribution[10], 5);
        assert_eq!(summary.by_operation[&Operation::Read], 2);
    }

    #[test]
    fn test_top_n_is_bounded() {
        let events = (0..15)
            .map(|i| event(i, Operation::Read, &format!("p/{i:02}"), "x", None))
            .collect();
        let summary = AuditLog::new(events).access_summary();
        assert_eq!(summary.top_paths.len(), TOP_N);
        assert_eq!(summary.top_paths[0].name, "p/00");
    }

    #[test]
    fn test_empty_summary() {
        let summary = AuditLog::default().access_summary();
        assert_eq!(summary.total, 0);
        assert_eq!(summary.success_rate, 0.0);
        assert!(summary.time_range.is_none());
    }
}
