//! Audit events and their parsing from raw JSON lines.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use vaultkeep_crypto::digest;

use crate::error::AuditError;

/// Operation performed by an audited request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Read a secret.
    Read,
    /// Create or overwrite a secret.
    Write,
    /// Update a secret.
    Update,
    /// Delete a secret.
    Delete,
    /// List a folder.
    List,
    /// Request denied.
    Deny,
    /// Read an access policy.
    PolicyRead,
    /// Change an access policy.
    PolicyWrite,
    /// Login.
    Auth,
    /// Token management.
    Token,
    /// Token revocation.
    Revoke,
    /// Token renewal.
    Renew,
}

impl Operation {
    /// Every operation.
    pub const ALL: [Operation; 12] = [
        Operation::Read,
        Operation::Write,
        Operation::Update,
        Operation::Delete,
        Operation::List,
        Operation::Deny,
        Operation::PolicyRead,
        Operation::PolicyWrite,
        Operation::Auth,
        Operation::Token,
        Operation::Revoke,
        Operation::Renew,
    ];

    /// Snake-case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::List => "list",
            Self::Deny => "deny",
            Self::PolicyRead => "policy_read",
            Self::PolicyWrite => "policy_write",
            Self::Auth => "auth",
            Self::Token => "token",
            Self::Revoke => "revoke",
            Self::Renew => "renew",
        }
    }

    fn is_mutation(&self) -> bool {
        matches!(self, Self::Write | Self::Update | Self::Delete)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = AuditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.to_ascii_lowercase();
        if lowered == "create" {
            return Ok(Self::Write);
        }
        Self::ALL
            .into_iter()
            .find(|op| op.as_str() == lowered)
            .ok_or_else(|| AuditError::Parse(format!("unknown operation '{s}'")))
    }
}

/// One parsed access event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditLogEvent {
    /// Request id, or a fingerprint of the raw line.
    pub id: String,
    /// When the request happened.
    pub timestamp: DateTime<Utc>,
    /// Inferred operation.
    pub operation: Operation,
    /// Requested path.
    pub path: String,
    /// Token accessor or entity id, else `unknown`.
    pub actor: String,
    /// False iff an error is present or the operation is `deny`.
    pub success: bool,
    /// Failure reason.
    pub error_message: Option<String>,
    /// Caller address.
    pub client_ip: Option<String>,
    /// Correlation id of the request.
    pub request_id: Option<String>,
    /// Remaining attributes.
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawAuth {
    accessor: Option<String>,
    entity_id: Option<String>,
    display_name: Option<String>,
    #[serde(default)]
    policies: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawRequest {
    id: Option<String>,
    operation: Option<String>,
    path: Option<String>,
    remote_address: Option<String>,
    mount_type: Option<String>,
    #[serde(default)]
    capabilities: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    #[serde(rename = "type")]
    entry_type: Option<String>,
    time: Option<Value>,
    timestamp: Option<Value>,
    operation: Option<String>,
    path: Option<String>,
    success: Option<bool>,
    error: Option<Value>,
    #[serde(default)]
    capabilities: Vec<String>,
    auth: Option<RawAuth>,
    request: Option<RawRequest>,
    #[serde(default)]
    metadata: HashMap<String, Value>,
}

/// Capabilities in priority order, with the operation each implies.
const CAPABILITY_PRIORITY: &[(&str, Operation)] = &[
    ("deny", Operation::Deny),
    ("sudo", Operation::Write),
    ("create", Operation::Write),
    ("update", Operation::Update),
    ("read", Operation::Read),
    ("delete", Operation::Delete),
    ("list", Operation::List),
];

/// Parses one JSON line into an event.
pub fn parse_line(line: &str) -> Result<AuditLogEvent, AuditError> {
    let raw: RawEntry =
        serde_json::from_str(line).map_err(|e| AuditError::Parse(e.to_string()))?;
    let auth = raw.auth.unwrap_or_default();
    let request = raw.request.unwrap_or_default();

    let path = request
        .path
        .or(raw.path)
        .unwrap_or_default()
        .trim_start_matches('/')
        .to_string();

    let explicit = raw.operation.or(request.operation);
    let capabilities = if request.capabilities.is_empty() {
        raw.capabilities
    } else {
        request.capabilities
    };
    let operation = infer_operation(explicit.as_deref(), &capabilities, &path);

    let actor = auth
        .accessor
        .clone()
        .or_else(|| auth.entity_id.clone())
        .filter(|a| !a.is_empty())
        .unwrap_or_else(|| "unknown".to_string());

    let mut error_message = raw.error.as_ref().and_then(error_text);
    if error_message.is_none() {
        if operation == Operation::Deny {
            error_message = Some("permission denied".to_string());
        } else if raw.success == Some(false) {
            error_message = Some("request failed".to_string());
        }
    }

    let timestamp = raw
        .time
        .as_ref()
        .or(raw.timestamp.as_ref())
        .and_then(parse_timestamp)
        .unwrap_or_else(|| {
            debug!("Unparsable audit timestamp, using current time");
            Utc::now()
        });

    let mut metadata: BTreeMap<String, String> = raw
        .metadata
        .into_iter()
        .map(|(k, v)| (k, value_text(&v)))
        .collect();
    if let Some(entry_type) = raw.entry_type {
        metadata.insert("entry_type".to_string(), entry_type);
    }
    if let Some(name) = auth.display_name {
        metadata.insert("display_name".to_string(), name);
    }
    if let Some(mount_type) = request.mount_type {
        metadata.insert("mount_type".to_string(), mount_type);
    }
    if !auth.policies.is_empty() {
        metadata.insert("policies".to_string(), auth.policies.join(","));
    }

    let id = request
        .id
        .clone()
        .unwrap_or_else(|| digest::fingerprint(line.as_bytes(), 32));

    Ok(AuditLogEvent {
        id,
        timestamp,
        operation,
        path,
        actor,
        success: error_message.is_none(),
        error_message,
        client_ip: request.remote_address,
        request_id: request.id,
        metadata,
    })
}

/// Explicit operation, else capabilities, else path heuristics, else `read`.
fn infer_operation(explicit: Option<&str>, capabilities: &[String], path: &str) -> Operation {
    let policy_path = path.starts_with("sys/polic");

    if let Some(op) = explicit.and_then(|name| name.parse::<Operation>().ok()) {
        return match op {
            Operation::Read | Operation::List if policy_path => Operation::PolicyRead,
            op if policy_path && op.is_mutation() => Operation::PolicyWrite,
            op => op,
        };
    }

    for (capability, op) in CAPABILITY_PRIORITY {
        if capabilities.iter().any(|c| c.eq_ignore_ascii_case(capability)) {
            return *op;
        }
    }

    if policy_path {
        Operation::PolicyRead
    } else if path.starts_with("auth/token/revoke") {
        Operation::Revoke
    } else if path.starts_with("auth/token/renew") {
        Operation::Renew
    } else if path.starts_with("auth/token") {
        Operation::Token
    } else if path.starts_with("auth/") {
        Operation::Auth
    } else {
        Operation::Read
    }
}

fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|t| t.with_timezone(&Utc)),
        Value::Number(n) => {
            let seconds = n.as_f64()?;
            let millis = (seconds * 1000.0).round() as i64;
            Utc.timestamp_millis_opt(millis).single()
        },
        _ => None,
    }
}

fn error_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        other => Some(value_text(other)),
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
