//! # Vaultkeep Audit
//!
//! Analysis of secret store access logs.
//!
//! Each input line is one JSON record. [`ingest`] reads plain files, gzip
//! files and directories, skipping malformed lines. The resulting
//! [`AuditLog`] is filtered and aggregated, scanned by the
//! [`AnomalyDetector`] and summarized in an [`AuditReport`].
//! [`RetentionManager`] archives files past their retention period.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod anomaly;
pub mod error;
pub mod event;
pub mod ingest;
pub mod log;
pub mod pattern;
pub mod report;
pub mod retention;

pub use anomaly::{Anomaly, AnomalyConfig, AnomalyDetector, AnomalyKind, Severity};
pub use error::AuditError;
pub use event::{parse_line, AuditLogEvent, Operation};
pub use ingest::{ingest, Ingest};
pub use log::{AccessSummary, AuditLog, Ranked, TimeBucket};
pub use pattern::PathPattern;
pub use report::AuditReport;
pub use retention::{RetentionConfig, RetentionManager, RetentionReport};
