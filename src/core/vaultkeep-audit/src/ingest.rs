//! Reading audit events from files, gzip files and directories.

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use tracing::{debug, warn};

use crate::error::AuditError;
use crate::event::{parse_line, AuditLogEvent};
use crate::pattern::glob_to_regex;

/// Events read from one or more files.
#[derive(Debug, Default)]
pub struct Ingest {
    /// Parsed events in file order.
    pub events: Vec<AuditLogEvent>,
    /// Number of files opened.
    pub files_read: usize,
    /// Lines that could not be parsed.
    pub lines_skipped: usize,
}

/// Reads events from `path`.
///
/// A directory is scanned non-recursively for file names matching `pattern`
/// (a glob, `*` when absent) in name order. Files ending in `.gz` are
/// decompressed.
pub fn ingest(path: &Path, pattern: Option<&str>) -> Result<Ingest, AuditError> {
    let mut ingest = Ingest::default();

    if path.is_dir() {
        let matcher = glob_to_regex(pattern.unwrap_or("*"))?;
        let mut files: Vec<PathBuf> = fs::read_dir(path)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|p| p.is_file())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| matcher.is_match(n))
            })
            .collect();
        files.sort();

        for file in files {
            ingest_file(&file, &mut ingest)?;
        }
    } else {
        ingest_file(path, &mut ingest)?;
    }

    debug!(
        files = ingest.files_read,
        events = ingest.events.len(),
        skipped = ingest.lines_skipped,
        "Audit ingestion complete"
    );
    Ok(ingest)
}

fn ingest_file(path: &Path, ingest: &mut Ingest) -> Result<(), AuditError> {
    let file = File::open(path)?;
    let reader: Box<dyn Read> = if is_gzip(path) {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };
    ingest.files_read += 1;
    read_lines(BufReader::new(reader), path, ingest);
    Ok(())
}

fn read_lines(reader: impl BufRead, path: &Path, ingest: &mut Ingest) {
    for (index, line) in reader.lines().enumerate() {
        let line_no = index + 1;
        let line = match line {
            Ok(line) => line,
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                warn!(file = %path.display(), line = line_no, "Skipping undecodable audit line");
                ingest.lines_skipped += 1;
                continue;
            },
            Err(e) => {
                warn!(file = %path.display(), line = line_no, error = %e, "Stopped reading audit file");
                return;
            },
        };

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        match parse_line(trimmed) {
            Ok(event) => ingest.events.push(event),
            Err(e) => {
                warn!(file = %path.display(), line = line_no, error = %e, "Skipping malformed audit line");
                ingest.lines_skipped += 1;
            },
        }
    }
}

fn is_gzip(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "gz")
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::TempDir;

    const GOOD: &str = r#"{"time": "2026-01-01T00:00:00Z", "auth": {"accessor": "a"}, "request": {"operation": "read", "path": "secret/x"}}"#;

    #[test]
    fn test_malformed_lines_are_skipped() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("audit.log");
        fs::write(&file, format!("{GOOD}\n{{broken\n\n{GOOD}\n")).unwrap();

        let result = ingest(&file, None).unwrap();
        assert_eq!(result.events.len(), 2);
        assert_eq!(result.lines_skipped, 1);
        assert_eq!(result.files_read, 1);
    }

    #[test]
    fn test_gzip_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("audit.log.gz");
        let mut encoder = GzEncoder::new(File::create(&file).unwrap(), Compression::default());
        writeln!(encoder, "{GOOD}").unwrap();
        writeln!(encoder, "{GOOD}").unwrap();
        encoder.finish().unwrap();

        let result = ingest(&file, None).unwrap();
        assert_eq!(result.events.len(), 2);
    }

    #[test]
    fn test_directory_with_pattern() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.log"), format!("{GOOD}\n")).unwrap();
        fs::write(dir.path().join("b.log"), format!("{GOOD}\nnope\n")).unwrap();
        fs::write(dir.path().join("notes.txt"), "not an audit file\n").unwrap();
        fs::create_dir(dir.path().join("nested.log")).unwrap();

        let result = ingest(dir.path(), Some("*.log")).unwrap();
        assert_eq!(result.files_read, 2);
        assert_eq!(result.events.len(), 2);
        assert_eq!(result.lines_skipped, 1);
    }

    #[test]
    fn test_invalid_utf8_line_is_skipped() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("audit.log");
        let mut bytes = Vec::new();
        bytes.extend_from_slice(GOOD.as_bytes());
        bytes.push(b'\n');
        bytes.extend_from_slice(&[0xff, 0xfe, b'\n']);
        bytes.extend_from_slice(GOOD.as_bytes());
        bytes.push(b'\n');
        fs::write(&file, bytes).unwrap();

        let result = ingest(&file, None).unwrap();
        assert_eq!(result.events.len(), 2);
        assert_eq!(result.lines_skipped, 1);
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            ingest(&dir.path().join("absent.log"), None),
            Err(AuditError::Io(_))
        ));
    }
}
