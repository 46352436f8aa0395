//! Retention of audit log files.
//!
//! Files older than the retention period (by modification time) are either
//! reported (dry run) or gzipped into the archive directory and removed.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::AuditError;
use crate::pattern::glob_to_regex;

/// Retention settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Directory holding audit files.
    pub log_dir: PathBuf,
    /// Age in days after which a file expires.
    #[serde(default = "default_retention_days")]
    pub retention_days: u64,
    /// Where expired files go, `<log_dir>/archive` when absent.
    #[serde(default)]
    pub archive_dir: Option<PathBuf>,
    /// File name glob.
    #[serde(default = "default_pattern")]
    pub pattern: String,
}

fn default_retention_days() -> u64 {
    90
}

fn default_pattern() -> String {
    "*".to_string()
}

impl RetentionConfig {
    /// Defaults for `log_dir`.
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
            retention_days: default_retention_days(),
            archive_dir: None,
            pattern: default_pattern(),
        }
    }

    /// Archive directory in effect.
    pub fn archive_dir(&self) -> PathBuf {
        self.archive_dir
            .clone()
            .unwrap_or_else(|| self.log_dir.join("archive"))
    }
}

/// Outcome of one retention pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RetentionReport {
    /// Files past the retention period.
    pub expired: Vec<PathBuf>,
    /// Archive files written.
    pub archived: Vec<PathBuf>,
    /// Bytes of original files removed, or that would be.
    pub freed_bytes: u64,
    /// Whether the pass only reported.
    pub dry_run: bool,
}

/// Applies a [`RetentionConfig`].
#[derive(Debug, Clone)]
pub struct RetentionManager {
    config: RetentionConfig,
}

impl RetentionManager {
    /// Creates a manager.
    pub fn new(config: RetentionConfig) -> Self {
        Self { config }
    }

    /// Settings in use.
    pub fn config(&self) -> &RetentionConfig {
        &self.config
    }

    /// Runs a pass against the current time.
    pub fn apply(&self, dry_run: bool) -> Result<RetentionReport, AuditError> {
        self.apply_at(SystemTime::now(), dry_run)
    }

    /// Runs a pass as if the time were `now`.
    pub fn apply_at(&self, now: SystemTime, dry_run: bool) -> Result<RetentionReport, AuditError> {
        let max_age = Duration::from_secs(self.config.retention_days.saturating_mul(24 * 60 * 60));
        let cutoff = now.checked_sub(max_age).unwrap_or(SystemTime::UNIX_EPOCH);
        let matcher = glob_to_regex(&self.config.pattern)?;

        let mut report = RetentionReport {
            dry_run,
            ..RetentionReport::default()
        };
        let mut candidates = Vec::new();
        for entry in fs::read_dir(&self.config.log_dir)? {
            let entry = entry?;
            let metadata = entry.metadata()?;
            if !metadata.is_file() {
                continue;
            }
            let matches = entry
                .file_name()
                .to_str()
                .is_some_and(|name| matcher.is_match(name));
            if matches && metadata.modified()? < cutoff {
                candidates.push((entry.path(), metadata.len()));
            }
        }
        candidates.sort();

        let archive_dir = self.config.archive_dir();
        if !dry_run && !candidates.is_empty() {
            fs::create_dir_all(&archive_dir)?;
        }

        for (path, size) in candidates {
            report.expired.push(path.clone());
            if dry_run {
                report.freed_bytes += size;
                continue;
            }
            match archive(&path, &archive_dir) {
                Ok(target) => {
                    fs::remove_file(&path)?;
                    report.freed_bytes += size;
                    report.archived.push(target);
                },
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "Failed to archive audit file");
                },
            }
        }

        info!(
            expired = report.expired.len(),
            archived = report.archived.len(),
            freed_bytes = report.freed_bytes,
            dry_run = dry_run,
            "Retention pass complete"
        );
        Ok(report)
    }
}

fn archive(path: &Path, archive_dir: &Path) -> io::Result<PathBuf> {
    let name = path
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "file has no name"))?;

    if path.extension().is_some_and(|ext| ext == "gz") {
        let target = archive_dir.join(name);
        fs::copy(path, &target)?;
        return Ok(target);
    }

    let mut target_name = name.to_os_string();
    target_name.push(".gz");
    let target = archive_dir.join(target_name);

    let mut input = BufReader::new(File::open(path)?);
    let mut encoder = GzEncoder::new(BufWriter::new(File::create(&target)?), Compression::default());
    io::copy(&mut input, &mut encoder)?;
    encoder.finish()?;
    Ok(target)
}
