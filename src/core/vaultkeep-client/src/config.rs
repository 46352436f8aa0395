//! Connection configuration.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;
use vaultkeep_storage::Credentials;

use crate::error::ClientError;

/// Default service-account token location inside a pod.
pub const DEFAULT_K8S_JWT_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";

/// Accepted `address` schemes.
const SUPPORTED_SCHEMES: &[&str] = &["http", "https", "sqlite", "memory"];

/// Supported login methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMethod {
    /// Role id + secret id.
    AppRole,
    /// Static token.
    Token,
    /// Kubernetes service account.
    #[serde(alias = "k8s")]
    Kubernetes,
    /// Username/password held by the store.
    UserPass,
    /// Username/password checked against a directory.
    Ldap,
}

impl FromStr for AuthMethod {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "approle" => Ok(Self::AppRole),
            "token" => Ok(Self::Token),
            "kubernetes" | "k8s" => Ok(Self::Kubernetes),
            "userpass" => Ok(Self::UserPass),
            "ldap" => Ok(Self::Ldap),
            other => Err(ClientError::validation(format!("unknown auth method '{other}'"))),
        }
    }
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AppRole => "approle",
            Self::Token => "token",
            Self::Kubernetes => "kubernetes",
            Self::UserPass => "userpass",
            Self::Ldap => "ldap",
        };
        f.write_str(name)
    }
}

/// How to reach and authenticate against the secret store.
#[derive(Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Store address, e.g. `https://vault.internal:8200` or `sqlite:///var/lib/vaultkeep`.
    pub address: String,

    /// Login method.
    pub auth_method: AuthMethod,

    /// AppRole role id.
    #[serde(default)]
    pub role_id: Option<String>,

    /// AppRole secret id.
    #[serde(default)]
    pub secret_id: Option<String>,

    /// Static token.
    #[serde(default)]
    pub token: Option<String>,

    /// Username for userpass/ldap.
    #[serde(default)]
    pub username: Option<String>,

    /// Password for userpass/ldap.
    #[serde(default)]
    pub password: Option<String>,

    /// Store-side role for Kubernetes login.
    #[serde(default)]
    pub kubernetes_role: Option<String>,

    /// Service-account JWT file for Kubernetes login.
    #[serde(default = "default_jwt_path")]
    pub jwt_path: String,

    /// Optional multi-tenant namespace prepended to every path.
    #[serde(default)]
    pub namespace: Option<String>,

    /// Backend mount prefix.
    #[serde(default = "default_mount")]
    pub mount: String,

    /// Per-call deadline, in [1, 300].
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Cache TTL, in [0, 3600]. Zero disables caching.
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_seconds: u64,

    /// Verify TLS certificates for https addresses.
    #[serde(default = "default_verify_tls")]
    pub verify_tls: bool,
}

fn default_jwt_path() -> String {
    DEFAULT_K8S_JWT_PATH.to_string()
}

fn default_mount() -> String {
    "secret".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_cache_ttl() -> u64 {
    300
}

fn default_verify_tls() -> bool {
    true
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("address", &self.address)
            .field("auth_method", &self.auth_method)
            .field("role_id", &self.role_id)
            .field("username", &self.username)
            .field("namespace", &self.namespace)
            .field("mount", &self.mount)
            .field("timeout_seconds", &self.timeout_seconds)
            .field("cache_ttl_seconds", &self.cache_ttl_seconds)
            .field("verify_tls", &self.verify_tls)
            .finish_non_exhaustive()
    }
}

impl ConnectionConfig {
    /// Creates a config with defaults for everything but address and method.
    pub fn new(address: impl Into<String>, auth_method: AuthMethod) -> Self {
        Self {
            address: address.into(),
            auth_method,
            role_id: None,
            secret_id: None,
            token: None,
            username: None,
            password: None,
            kubernetes_role: None,
            jwt_path: default_jwt_path(),
            namespace: None,
            mount: default_mount(),
            timeout_seconds: default_timeout(),
            cache_ttl_seconds: default_cache_ttl(),
            verify_tls: default_verify_tls(),
        }
    }

    /// AppRole config.
    pub fn approle(
        address: impl Into<String>,
        role_id: impl Into<String>,
        secret_id: impl Into<String>,
    ) -> Self {
        Self {
            role_id: Some(role_id.into()),
            secret_id: Some(secret_id.into()),
            ..Self::new(address, AuthMethod::AppRole)
        }
    }

    /// Static token config.
    pub fn token(address: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            ..Self::new(address, AuthMethod::Token)
        }
    }

    /// Builds a config from `VAULTKEEP_*` environment variables and validates it.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any key lookup using the `VAULTKEEP_*` names.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ClientError> {
        let address = lookup("VAULTKEEP_ADDR")
            .ok_or_else(|| ClientError::validation("VAULTKEEP_ADDR is not set"))?;
        let auth_method = lookup("VAULTKEEP_AUTH_METHOD")
            .map(|m| m.parse())
            .transpose()?
            .unwrap_or(AuthMethod::Token);

        let mut config = Self::new(address, auth_method);
        config.role_id = lookup("VAULTKEEP_ROLE_ID");
        config.secret_id = lookup("VAULTKEEP_SECRET_ID");
        config.token = lookup("VAULTKEEP_TOKEN");
        config.username = lookup("VAULTKEEP_USERNAME");
        config.password = lookup("VAULTKEEP_PASSWORD");
        config.kubernetes_role = lookup("VAULTKEEP_K8S_ROLE");
        config.namespace = lookup("VAULTKEEP_NAMESPACE").filter(|ns| !ns.is_empty());

        if let Some(path) = lookup("VAULTKEEP_K8S_JWT_PATH") {
            config.jwt_path = path;
        }
        if let Some(mount) = lookup("VAULTKEEP_MOUNT") {
            config.mount = mount;
        }
        if let Some(timeout) = lookup("VAULTKEEP_TIMEOUT") {
            config.timeout_seconds = parse_number("VAULTKEEP_TIMEOUT", &timeout)?;
        }
        if let Some(ttl) = lookup("VAULTKEEP_CACHE_TTL") {
            config.cache_ttl_seconds = parse_number("VAULTKEEP_CACHE_TTL", &ttl)?;
        }
        if let Some(verify) = lookup("VAULTKEEP_VERIFY_TLS") {
            config.verify_tls = !matches!(verify.to_ascii_lowercase().as_str(), "0" | "false" | "no");
        }

        config.validate()?;
        Ok(config)
    }

    /// Checks ranges, address syntax and the fields required by the auth method.
    pub fn validate(&self) -> Result<(), ClientError> {
        if !(1..=300).contains(&self.timeout_seconds) {
            return Err(ClientError::validation(format!(
                "timeout_seconds must be in [1, 300], got {}",
                self.timeout_seconds
            )));
        }
        if self.cache_ttl_seconds > 3600 {
            return Err(ClientError::validation(format!(
                "cache_ttl_seconds must be in [0, 3600], got {}",
                self.cache_ttl_seconds
            )));
        }

        let url = self.url()?;
        if !SUPPORTED_SCHEMES.contains(&url.scheme()) {
            return Err(ClientError::validation(format!(
                "unsupported address scheme '{}'",
                url.scheme()
            )));
        }

        if self.mount.is_empty() || self.mount.contains('/') {
            return Err(ClientError::validation("mount must be a single non-empty segment"));
        }
        if let Some(ns) = &self.namespace {
            if ns.split('/').any(|segment| segment.is_empty() || segment == "..") {
                return Err(ClientError::validation(format!("invalid namespace '{ns}'")));
            }
        }

        let missing = |field: &str| {
            ClientError::validation(format!("{} auth requires {field}", self.auth_method))
        };
        match self.auth_method {
            AuthMethod::AppRole => {
                if is_blank(&self.role_id) {
                    return Err(missing("role_id"));
                }
                if is_blank(&self.secret_id) {
                    return Err(missing("secret_id"));
                }
            },
            AuthMethod::Token => {
                if is_blank(&self.token) {
                    return Err(missing("token"));
                }
            },
            AuthMethod::Kubernetes => {
                if is_blank(&self.kubernetes_role) {
                    return Err(missing("kubernetes_role"));
                }
            },
            AuthMethod::UserPass | AuthMethod::Ldap => {
                if is_blank(&self.username) {
                    return Err(missing("username"));
                }
                if is_blank(&self.password) {
                    return Err(missing("password"));
                }
            },
        }

        Ok(())
    }

    /// Parsed store address.
    pub fn url(&self) -> Result<Url, ClientError> {
        Url::parse(&self.address)
            .map_err(|e| ClientError::validation(format!("invalid address '{}': {e}", self.address)))
    }

    /// Per-call deadline.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Cache TTL.
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }

    /// Prefix applied to every logical path.
    pub(crate) fn path_prefix(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{ns}/{}", self.mount),
            None => self.mount.clone(),
        }
    }

    /// Resolves the login credentials for the configured method.
    ///
    /// Kubernetes login reads the service-account JWT from `jwt_path`.
    pub async fn credentials(&self) -> Result<Credentials, ClientError> {
        let field = |value: &Option<String>, name: &str| {
            value.clone().filter(|v| !v.trim().is_empty()).ok_or_else(|| {
                ClientError::authentication(format!("{} auth requires {name}", self.auth_method))
            })
        };

        Ok(match self.auth_method {
            AuthMethod::AppRole => Credentials::AppRole {
                role_id: field(&self.role_id, "role_id")?,
                secret_id: field(&self.secret_id, "secret_id")?,
            },
            AuthMethod::Token => Credentials::Token {
                token: field(&self.token, "token")?,
            },
            AuthMethod::Kubernetes => {
                let jwt = tokio::fs::read_to_string(&self.jwt_path).await.map_err(|e| {
                    ClientError::authentication(format!(
                        "cannot read service account token {}: {e}",
                        self.jwt_path
                    ))
                })?;
                Credentials::Kubernetes {
                    role: field(&self.kubernetes_role, "kubernetes_role")?,
                    jwt: jwt.trim().to_string(),
                }
            },
            AuthMethod::UserPass => Credentials::UserPass {
                username: field(&self.username, "username")?,
                password: field(&self.password, "password")?,
            },
            AuthMethod::Ldap => Credentials::Ldap {
                username: field(&self.username, "username")?,
                password: field(&self.password, "password")?,
            },
        })
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

fn parse_number(key: &str, value: &str) -> Result<u64, ClientError> {
    value
        .trim()
        .parse()
        .map_err(|_| ClientError::validation(format!("{key} must be a number, got '{value}'")))
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = ConnectionConfig::token("https://vault:8200", "t");
        assert_eq!(config.timeout_seconds, 30);
        assert_eq!(config.cache_ttl_seconds, 300);
        assert!(config.verify_tls);
        assert_eq!(config.mount, "secret");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_approle_requires_role_id() {
        let mut config = ConnectionConfig::approle("https://vault:8200", "role", "sid");
        assert!(config.validate().is_ok());

        config.role_id = None;
        assert!(matches!(config.validate(), Err(ClientError::Validation(_))));
    }

    #[test]
    fn test_ranges() {
        let mut config = ConnectionConfig::token("https://vault:8200", "t");
        config.timeout_seconds = 0;
        assert!(config.validate().is_err());
        config.timeout_seconds = 301;
        assert!(config.validate().is_err());
        config.timeout_seconds = 300;
        config.cache_ttl_seconds = 3601;
        assert!(config.validate().is_err());
        config.cache_ttl_seconds = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_address_scheme() {
        let config = ConnectionConfig::token("ftp://vault", "t");
        assert!(config.validate().is_err());

        let config = ConnectionConfig::token("not a url", "t");
        assert!(config.validate().is_err());

        let config = ConnectionConfig::token("memory://local", "t");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_path_prefix() {
        let mut config = ConnectionConfig::token("memory://local", "t");
        assert_eq!(config.path_prefix(), "secret");

        config.namespace = Some("team-a".into());
        assert_eq!(config.path_prefix(), "team-a/secret");
    }

    #[test]
    fn test_auth_method_parse() {
        assert_eq!("AppRole".parse::<AuthMethod>().unwrap(), AuthMethod::AppRole);
        assert_eq!("k8s".parse::<AuthMethod>().unwrap(), AuthMethod::Kubernetes);
        assert!("kerberos".parse::<AuthMethod>().is_err());
    }

    #[test]
    fn test_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("VAULTKEEP_ADDR", "https://vault:8200"),
            ("VAULTKEEP_AUTH_METHOD", "userpass"),
            ("VAULTKEEP_USERNAME", "etl"),
            ("VAULTKEEP_PASSWORD", "pw"),
            ("VAULTKEEP_CACHE_TTL", "0"),
            ("VAULTKEEP_VERIFY_TLS", "false"),
        ]
        .into_iter()
        .collect();

        let config =
            ConnectionConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string())).unwrap();
        assert_eq!(config.auth_method, AuthMethod::UserPass);
        assert_eq!(config.cache_ttl_seconds, 0);
        assert!(!config.verify_tls);
    }

    #[test]
    fn test_from_lookup_missing_address() {
        let result = ConnectionConfig::from_lookup(|_| None);
        assert!(matches!(result, Err(ClientError::Validation(_))));
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: ConnectionConfig = serde_json::from_str(
            r#"{"address": "https://vault:8200", "auth_method": "k8s", "kubernetes_role": "etl"}"#,
        )
        .unwrap();
        assert_eq!(config.auth_method, AuthMethod::Kubernetes);
        assert_eq!(config.jwt_path, DEFAULT_K8S_JWT_PATH);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_debug_hides_secrets() {
        let config = ConnectionConfig::approle("https://vault:8200", "role", "very-secret");
        assert!(!format!("{config:?}").contains("very-secret"));
    }

    #[tokio::test]
    async fn test_kubernetes_credentials_read_jwt() {
        let dir = tempfile::TempDir::new().unwrap();
        let jwt_path = dir.path().join("token");
        std::fs::write(&jwt_path, "header.payload.sig\n").unwrap();

        let mut config = ConnectionConfig::new("memory://local", AuthMethod::Kubernetes);
        config.kubernetes_role = Some("etl".into());
        config.jwt_path = jwt_path.display().to_string();

        let creds = config.credentials().await.unwrap();
        assert_eq!(
            creds,
            Credentials::Kubernetes {
                role: "etl".into(),
                jwt: "header.payload.sig".into()
            }
        );
    }
}
