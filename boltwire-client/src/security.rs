//! Transport security settings.

use std::path::PathBuf;

/// How certificate revocation is checked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RevocationPolicy {
    /// Revocation lists are not consulted.
    #[default]
    NoChecks,
    /// Supplied revocation lists are consulted; certificates they do not
    /// cover are accepted.
    VerifyIfPresent,
    /// Every certificate in the chain must be covered by a supplied list.
    Strict,
}

/// TLS configuration for a connection.
#[derive(Debug, Clone)]
pub struct TlsSettings {
    /// Path to PEM-encoded CA certificate(s) for server verification.
    /// If None, the bundled web PKI roots are used.
    pub ca_cert_path: Option<PathBuf>,
    /// Path to PEM-encoded client certificate (for mTLS).
    pub client_cert_path: Option<PathBuf>,
    /// Path to PEM-encoded client private key (for mTLS).
    pub client_key_path: Option<PathBuf>,
    /// Accept any server certificate (INSECURE - development only).
    pub trust_all: bool,
    /// Check that the certificate was issued for the server name.
    pub verify_hostname: bool,
    /// Server name for SNI and verification (defaults to the address host).
    pub server_name: Option<String>,
    pub revocation: RevocationPolicy,
    /// PEM-encoded certificate revocation lists.
    pub crl_paths: Vec<PathBuf>,
}

impl Default for TlsSettings {
    fn default() -> Self {
        Self {
            ca_cert_path: None,
            client_cert_path: None,
            client_key_path: None,
            trust_all: false,
            verify_hostname: true,
            server_name: None,
            revocation: RevocationPolicy::NoChecks,
            crl_paths: Vec::new(),
        }
    }
}

impl TlsSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ca_cert(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_cert_path = Some(path.into());
        self
    }

    pub fn with_client_cert(
        mut self,
        cert_path: impl Into<PathBuf>,
        key_path: impl Into<PathBuf>,
    ) -> Self {
        self.client_cert_path = Some(cert_path.into());
        self.client_key_path = Some(key_path.into());
        self
    }

    pub fn with_trust_all(mut self) -> Self {
        self.trust_all = true;
        self
    }

    pub fn with_verify_hostname(mut self, verify: bool) -> Self {
        self.verify_hostname = verify;
        self
    }

    pub fn with_server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = Some(name.into());
        self
    }

    pub fn with_revocation(mut self, policy: RevocationPolicy) -> Self {
        self.revocation = policy;
        self
    }

    pub fn with_crl(mut self, path: impl Into<PathBuf>) -> Self {
        self.crl_paths.push(path.into());
        self
    }
}

/// Whether and how a connection is encrypted.
#[derive(Debug, Clone, Default)]
pub enum SecurityPlan {
    #[default]
    Plaintext,
    Tls(TlsSettings),
}

impl SecurityPlan {
    pub fn tls(settings: TlsSettings) -> Self {
        SecurityPlan::Tls(settings)
    }

    pub fn requires_encryption(&self) -> bool {
        matches!(self, SecurityPlan::Tls(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tls_defaults() {
        let tls = TlsSettings::new();
        assert!(tls.verify_hostname);
        assert!(!tls.trust_all);
        assert_eq!(tls.revocation, RevocationPolicy::NoChecks);
        assert!(!SecurityPlan::default().requires_encryption());
    }

    #[test]
    fn test_tls_builder() {
        let tls = TlsSettings::new()
            .with_ca_cert("/etc/ca.pem")
            .with_client_cert("/etc/client.pem", "/etc/client.key")
            .with_verify_hostname(false)
            .with_server_name("db.internal")
            .with_revocation(RevocationPolicy::Strict)
            .with_crl("/etc/ca.crl");
        assert_eq!(tls.server_name.as_deref(), Some("db.internal"));
        assert!(tls.client_key_path.is_some());
        assert!(!tls.verify_hostname);
        assert_eq!(tls.crl_paths.len(), 1);
        assert!(SecurityPlan::tls(tls).requires_encryption());
    }
}
