//! Client configuration.
//!
//! Settings come from an optional YAML file named by `BOLTWIRE_CONFIG`,
//! then `BOLTWIRE_*` environment variables, which take precedence.

use crate::address::BoltAddress;
use crate::connection::ConnectionConfig;
use crate::error::ClientError;
use crate::security::{RevocationPolicy, SecurityPlan, TlsSettings};
use boltwire_protocol::AuthToken;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "BOLTWIRE_CONFIG";

/// Top-level client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Server address, `host[:port]`.
    pub address: String,
    /// Default database; the server's home database when unset.
    pub database: Option<String>,
    pub auth: AuthConfig,
    pub tls: TlsConfig,
    pub timeouts: TimeoutConfig,
    /// Overrides the default `boltwire/<version>` user agent.
    pub user_agent: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            address: "localhost:7687".to_string(),
            database: None,
            auth: AuthConfig::default(),
            tls: TlsConfig::default(),
            timeouts: TimeoutConfig::default(),
            user_agent: None,
        }
    }
}

impl ClientConfig {
    /// Loads configuration from the file named by `BOLTWIRE_CONFIG`, if
    /// set, with environment overrides applied.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Loads configuration from a YAML file, without environment overrides.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))
    }

    /// Saves configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ConfigError::IoError(path.to_path_buf(), e))
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(address) = var("BOLTWIRE_ADDRESS") {
            self.address = address;
        }
        if let Some(database) = var("BOLTWIRE_DATABASE") {
            self.database = Some(database).filter(|d| !d.is_empty());
        }
        if let Some(agent) = var("BOLTWIRE_USER_AGENT") {
            self.user_agent = Some(agent);
        }
        self.auth.apply_overrides(&var);
        self.tls.apply_overrides(&var);
        self.timeouts.apply_overrides(&var);
    }

    pub fn bolt_address(&self) -> Result<BoltAddress, ConfigError> {
        self.address
            .parse()
            .map_err(|e: ClientError| ConfigError::Invalid(e.to_string()))
    }

    pub fn security_plan(&self) -> Result<SecurityPlan, ConfigError> {
        self.tls.security_plan()
    }

    pub fn auth_token(&self) -> Result<AuthToken, ConfigError> {
        self.auth.auth_token()
    }

    pub fn connection_config(&self) -> ConnectionConfig {
        let mut config = ConnectionConfig::default()
            .with_connect_timeout(Duration::from_millis(self.timeouts.connect_ms));
        if let Some(read) = self.timeouts.read_timeout() {
            config = config.with_read_timeout(read);
        }
        if let Some(agent) = &self.user_agent {
            config = config.with_user_agent(agent.clone());
        }
        config
    }
}

/// Authentication settings.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// `none`, `basic`, `bearer`, `kerberos` or a custom scheme name.
    pub scheme: String,
    pub principal: Option<String>,
    pub credentials: Option<String>,
    pub realm: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            scheme: "none".to_string(),
            principal: None,
            credentials: None,
            realm: None,
        }
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("scheme", &self.scheme)
            .field("principal", &self.principal)
            .field("credentials", &self.credentials.as_ref().map(|_| "******"))
            .field("realm", &self.realm)
            .finish()
    }
}

impl AuthConfig {
    fn apply_overrides(&mut self, var: &impl Fn(&str) -> Option<String>) {
        if let Some(scheme) = var("BOLTWIRE_AUTH_SCHEME") {
            self.scheme = scheme;
        }
        if let Some(user) = var("BOLTWIRE_USER") {
            self.principal = Some(user);
            // A user without an explicit scheme means basic auth.
            if self.scheme == "none" && var("BOLTWIRE_AUTH_SCHEME").is_none() {
                self.scheme = "basic".to_string();
            }
        }
        if let Some(password) = var("BOLTWIRE_PASSWORD") {
            self.credentials = Some(password);
        }
        if let Some(realm) = var("BOLTWIRE_AUTH_REALM") {
            self.realm = Some(realm);
        }
    }

    /// Builds the LOGON token for the configured scheme.
    pub fn auth_token(&self) -> Result<AuthToken, ConfigError> {
        match self.scheme.as_str() {
            "none" => Ok(AuthToken::none()),
            "basic" => {
                let principal = self.principal.clone().ok_or_else(|| {
                    ConfigError::Invalid("basic auth requires a principal".to_string())
                })?;
                let credentials = self.credentials.clone().ok_or_else(|| {
                    ConfigError::Invalid("basic auth requires credentials".to_string())
                })?;
                Ok(AuthToken::basic(principal, credentials, self.realm.clone()))
            }
            "bearer" => self
                .credentials
                .clone()
                .map(AuthToken::bearer)
                .ok_or_else(|| ConfigError::Invalid("bearer auth requires a token".to_string())),
            "kerberos" => self
                .credentials
                .clone()
                .map(AuthToken::kerberos)
                .ok_or_else(|| {
                    ConfigError::Invalid("kerberos auth requires a ticket".to_string())
                }),
            "" => Err(ConfigError::Invalid("auth scheme is empty".to_string())),
            scheme => Ok(AuthToken::custom(
                scheme,
                self.principal.clone(),
                self.credentials.clone(),
                self.realm.clone(),
            )),
        }
    }
}

/// Certificate revocation checking.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevocationConfig {
    #[default]
    NoChecks,
    VerifyIfPresent,
    Strict,
}

impl From<RevocationConfig> for RevocationPolicy {
    fn from(config: RevocationConfig) -> Self {
        match config {
            RevocationConfig::NoChecks => RevocationPolicy::NoChecks,
            RevocationConfig::VerifyIfPresent => RevocationPolicy::VerifyIfPresent,
            RevocationConfig::Strict => RevocationPolicy::Strict,
        }
    }
}

/// TLS settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    pub enabled: bool,
    /// PEM-encoded CA certificate(s); the web PKI roots when unset.
    pub ca_cert: Option<PathBuf>,
    /// PEM-encoded client certificate for mTLS.
    pub client_cert: Option<PathBuf>,
    /// PEM-encoded client private key for mTLS.
    pub client_key: Option<PathBuf>,
    /// Accept any server certificate. Development only.
    pub insecure: bool,
    pub verify_hostname: bool,
    /// SNI and verification name; the address host when unset.
    pub server_name: Option<String>,
    pub revocation: RevocationConfig,
    /// PEM-encoded certificate revocation lists.
    pub crls: Vec<PathBuf>,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ca_cert: None,
            client_cert: None,
            client_key: None,
            insecure: false,
            verify_hostname: true,
            server_name: None,
            revocation: RevocationConfig::NoChecks,
            crls: Vec::new(),
        }
    }
}

fn parse_flag(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

impl TlsConfig {
    fn apply_overrides(&mut self, var: &impl Fn(&str) -> Option<String>) {
        if let Some(enabled) = var("BOLTWIRE_TLS_ENABLED") {
            self.enabled = parse_flag(&enabled);
        }
        if let Some(path) = var("BOLTWIRE_TLS_CA_CERT") {
            self.ca_cert = Some(PathBuf::from(path));
        }
        if let Some(path) = var("BOLTWIRE_TLS_CLIENT_CERT") {
            self.client_cert = Some(PathBuf::from(path));
        }
        if let Some(path) = var("BOLTWIRE_TLS_CLIENT_KEY") {
            self.client_key = Some(PathBuf::from(path));
        }
        if let Some(insecure) = var("BOLTWIRE_TLS_INSECURE") {
            self.insecure = parse_flag(&insecure);
        }
        if let Some(verify) = var("BOLTWIRE_TLS_VERIFY_HOSTNAME") {
            self.verify_hostname = parse_flag(&verify);
        }
        if let Some(name) = var("BOLTWIRE_TLS_SERVER_NAME") {
            self.server_name = Some(name);
        }
    }

    /// Validates TLS configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.enabled {
            return Ok(());
        }
        if self.client_cert.is_some() != self.client_key.is_some() {
            return Err(ConfigError::Invalid(
                "client_cert and client_key must be set together".to_string(),
            ));
        }
        if self.revocation == RevocationConfig::Strict && self.crls.is_empty() {
            return Err(ConfigError::Invalid(
                "strict revocation checking requires at least one CRL".to_string(),
            ));
        }
        Ok(())
    }

    pub fn security_plan(&self) -> Result<SecurityPlan, ConfigError> {
        self.validate()?;
        if !self.enabled {
            return Ok(SecurityPlan::Plaintext);
        }

        let mut settings = TlsSettings::new()
            .with_verify_hostname(self.verify_hostname)
            .with_revocation(self.revocation.into());
        if let Some(ca) = &self.ca_cert {
            settings = settings.with_ca_cert(ca);
        }
        if let (Some(cert), Some(key)) = (&self.client_cert, &self.client_key) {
            settings = settings.with_client_cert(cert, key);
        }
        if self.insecure {
            settings = settings.with_trust_all();
        }
        if let Some(name) = &self.server_name {
            settings = settings.with_server_name(name);
        }
        for crl in &self.crls {
            settings = settings.with_crl(crl);
        }
        Ok(SecurityPlan::tls(settings))
    }
}

/// Timeouts, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub connect_ms: u64,
    /// Response timeout once requests are sent. Unset or 0 defers to the
    /// server's hint.
    pub read_ms: Option<u64>,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_ms: 10_000,
            read_ms: None,
        }
    }
}

impl TimeoutConfig {
    fn apply_overrides(&mut self, var: &impl Fn(&str) -> Option<String>) {
        if let Some(ms) = var("BOLTWIRE_CONNECT_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.connect_ms = ms;
        }
        if let Some(ms) = var("BOLTWIRE_READ_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.read_ms = Some(ms);
        }
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_ms.filter(|ms| *ms > 0).map(Duration::from_millis)
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {1}", path = .0.display())]
    IoError(PathBuf, #[source] std::io::Error),
    #[error("failed to parse config file '{path}': {1}", path = .0.display())]
    ParseError(PathBuf, String),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl From<ConfigError> for ClientError {
    fn from(e: ConfigError) -> Self {
        ClientError::Config(e.to_string())
    }
}
