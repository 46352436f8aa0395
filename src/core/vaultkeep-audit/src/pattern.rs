//! Path and file-name patterns.

use regex::Regex;

use crate::error::AuditError;

/// A prefix or a glob (`*` any run of characters, `?` one character).
#[derive(Debug, Clone)]
pub enum PathPattern {
    /// Matches paths starting with the prefix.
    Prefix(String),
    /// Matches the whole path against a glob.
    Glob(Regex),
}

impl PathPattern {
    /// Parses `pattern` as a glob when it contains `*` or `?`, else as a prefix.
    pub fn parse(pattern: &str) -> Result<Self, AuditError> {
        if pattern.contains(['*', '?']) {
            Ok(Self::Glob(glob_to_regex(pattern)?))
        } else {
            Ok(Self::Prefix(pattern.to_string()))
        }
    }

    /// Whether `path` matches.
    pub fn matches(&self, path: &str) -> bool {
        match self {
            Self::Prefix(prefix) => path.starts_with(prefix.as_str()),
            Self::Glob(regex) => regex.is_match(path),
        }
    }
}

/// Compiles a glob into an anchored regex.
pub fn glob_to_regex(glob: &str) -> Result<Regex, AuditError> {
    let mut source = String::with_capacity(glob.len() + 8);
    source.push('^');
    for c in glob.chars() {
        match c {
            '*' => source.push_str(".*"),
            '?' => source.push('.'),
            other => source.push_str(&regex::escape(&other.to_string())),
        }
    }
    source.push('$');

    Regex::new(&source).map_err(|e| AuditError::Pattern {
        pattern: glob.to_string(),
        reason: e.to_string(),
    })
}
