//! Metadata maps attached to request messages.
//!
//! Builders omit any entry that holds its default, so a request that changes
//! nothing carries an empty map.

use crate::value::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Query id meaning "the most recently started query".
pub const ABSENT_QUERY_ID: i64 = -1;

/// Record budget meaning "everything".
pub const FETCH_ALL: i64 = -1;

pub type Metadata = BTreeMap<String, Value>;

/// Access mode of a transaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum AccessMode {
    Read,
    #[default]
    Write,
}

impl AccessMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessMode::Read => "r",
            AccessMode::Write => "w",
        }
    }
}

/// Whether a transaction was opened explicitly or wraps a single query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TransactionType {
    #[default]
    Explicit,
    Implicit,
}

/// Credentials sent with LOGON.
#[derive(Clone, PartialEq)]
pub struct AuthToken {
    pub scheme: String,
    pub principal: Option<String>,
    pub credentials: Option<String>,
    pub realm: Option<String>,
    pub parameters: BTreeMap<String, Value>,
}

impl AuthToken {
    pub fn none() -> Self {
        Self::custom("none", None, None, None)
    }

    pub fn basic(
        username: impl Into<String>,
        password: impl Into<String>,
        realm: Option<String>,
    ) -> Self {
        Self::custom(
            "basic",
            Some(username.into()),
            Some(password.into()),
            realm,
        )
    }

    pub fn bearer(token: impl Into<String>) -> Self {
        Self::custom("bearer", None, Some(token.into()), None)
    }

    /// `ticket` is the base64-encoded Kerberos ticket.
    pub fn kerberos(ticket: impl Into<String>) -> Self {
        Self::custom("kerberos", Some(String::new()), Some(ticket.into()), None)
    }

    pub fn custom(
        scheme: impl Into<String>,
        principal: Option<String>,
        credentials: Option<String>,
        realm: Option<String>,
    ) -> Self {
        Self {
            scheme: scheme.into(),
            principal,
            credentials,
            realm,
            parameters: BTreeMap::new(),
        }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn to_map(&self) -> Metadata {
        let mut map = Metadata::new();
        map.insert("scheme".into(), Value::from(self.scheme.as_str()));
        if let Some(principal) = &self.principal {
            map.insert("principal".into(), Value::from(principal.as_str()));
        }
        if let Some(credentials) = &self.credentials {
            map.insert("credentials".into(), Value::from(credentials.as_str()));
        }
        if let Some(realm) = self.realm.as_deref().filter(|r| !r.is_empty()) {
            map.insert("realm".into(), Value::from(realm));
        }
        if !self.parameters.is_empty() {
            map.insert("parameters".into(), Value::Map(self.parameters.clone()));
        }
        map
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthToken")
            .field("scheme", &self.scheme)
            .field("principal", &self.principal)
            .field("credentials", &self.credentials.as_ref().map(|_| "******"))
            .field("realm", &self.realm)
            .field("parameters", &self.parameters)
            .finish()
    }
}

/// Structured client identification sent as `bolt_agent`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoltAgent {
    pub product: String,
    pub platform: Option<String>,
    pub language: Option<String>,
    pub language_details: Option<String>,
}

impl BoltAgent {
    pub fn new(product: impl Into<String>) -> Self {
        Self {
            product: product.into(),
            platform: None,
            language: None,
            language_details: None,
        }
    }

    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = Some(platform.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_language_details(mut self, details: impl Into<String>) -> Self {
        self.language_details = Some(details.into());
        self
    }

    pub fn to_map(&self) -> Metadata {
        let mut map = Metadata::new();
        map.insert("product".into(), Value::from(self.product.as_str()));
        for (key, value) in [
            ("platform", &self.platform),
            ("language", &self.language),
            ("language_details", &self.language_details),
        ] {
            if let Some(v) = value {
                map.insert(key.into(), Value::from(v.as_str()));
            }
        }
        map
    }
}

/// Contents of the HELLO message.
#[derive(Debug, Clone, PartialEq)]
pub struct HelloMetadata {
    pub user_agent: String,
    pub bolt_agent: Option<BoltAgent>,
    /// Routing context; `None` disables server-side routing.
    pub routing: Option<BTreeMap<String, Value>>,
    /// Protocol patches to request; sent as `patch_bolt` when non-empty.
    pub patch_bolt: Vec<String>,
}

impl HelloMetadata {
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
            bolt_agent: None,
            routing: None,
            patch_bolt: Vec::new(),
        }
    }

    pub fn to_map(&self) -> Metadata {
        let mut map = Metadata::new();
        map.insert("user_agent".into(), Value::from(self.user_agent.as_str()));
        if let Some(agent) = &self.bolt_agent {
            map.insert("bolt_agent".into(), Value::Map(agent.to_map()));
        }
        if let Some(routing) = &self.routing {
            map.insert("routing".into(), Value::Map(routing.clone()));
        }
        if !self.patch_bolt.is_empty() {
            let patches = self.patch_bolt.iter().map(|p| Value::from(p.as_str())).collect();
            map.insert("patch_bolt".into(), Value::List(patches));
        }
        map
    }
}

/// Settings for BEGIN and auto-commit RUN.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionMetadata {
    pub bookmarks: Vec<String>,
    pub mode: AccessMode,
    pub database: Option<String>,
    pub tx_type: TransactionType,
    pub tx_metadata: BTreeMap<String, Value>,
    pub tx_timeout: Option<Duration>,
    pub impersonated_user: Option<String>,
}

impl TransactionMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bookmarks(mut self, bookmarks: impl IntoIterator<Item = String>) -> Self {
        self.bookmarks = bookmarks.into_iter().collect();
        self
    }

    pub fn with_mode(mut self, mode: AccessMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn with_tx_type(mut self, tx_type: TransactionType) -> Self {
        self.tx_type = tx_type;
        self
    }

    pub fn with_tx_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.tx_metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.tx_timeout = Some(timeout);
        self
    }

    pub fn with_impersonated_user(mut self, user: impl Into<String>) -> Self {
        self.impersonated_user = Some(user.into());
        self
    }

    pub fn to_map(&self) -> Metadata {
        let mut map = Metadata::new();
        if !self.bookmarks.is_empty() {
            map.insert("bookmarks".into(), Value::from(self.bookmarks.clone()));
        }
        if let Some(timeout) = self.tx_timeout {
            // Round partial milliseconds up so a tiny timeout never becomes zero.
            let millis = timeout.as_millis() + u128::from(timeout.subsec_nanos() % 1_000_000 != 0);
            map.insert(
                "tx_timeout".into(),
                Value::Integer(i64::try_from(millis).unwrap_or(i64::MAX)),
            );
        }
        if !self.tx_metadata.is_empty() {
            map.insert("tx_metadata".into(), Value::Map(self.tx_metadata.clone()));
        }
        if self.mode == AccessMode::Read {
            map.insert("mode".into(), Value::from(AccessMode::Read.as_str()));
        }
        if let Some(db) = &self.database {
            map.insert("db".into(), Value::from(db.as_str()));
        }
        if let Some(user) = &self.impersonated_user {
            map.insert("imp_user".into(), Value::from(user.as_str()));
        }
        if self.tx_type == TransactionType::Implicit {
            map.insert("tx_type".into(), Value::from("IMPLICIT"));
        }
        map
    }
}

/// Extra map of PULL and DISCARD.
pub fn stream_metadata(n: i64, qid: i64) -> Metadata {
    let mut map = Metadata::new();
    map.insert("n".into(), Value::Integer(n));
    if qid != ABSENT_QUERY_ID {
        map.insert("qid".into(), Value::Integer(qid));
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_transaction_metadata_is_empty() {
        assert!(TransactionMetadata::new().to_map().is_empty());
    }

    #[test]
    fn test_mode_only_when_read() {
        let write = TransactionMetadata::new().with_mode(AccessMode::Write);
        assert!(!write.to_map().contains_key("mode"));

        let read = TransactionMetadata::new().with_mode(AccessMode::Read);
        assert_eq!(read.to_map().get("mode"), Some(&Value::from("r")));
    }

    #[test]
    fn test_full_transaction_metadata() {
        let map = TransactionMetadata::new()
            .with_bookmarks(vec!["bm:1".to_string()])
            .with_database("movies")
            .with_tx_type(TransactionType::Implicit)
            .with_tx_metadata("app", "test")
            .with_timeout(Duration::from_micros(1500))
            .with_impersonated_user("bob")
            .to_map();
        assert_eq!(map.get("bookmarks"), Some(&Value::from(vec!["bm:1"])));
        assert_eq!(map.get("db"), Some(&Value::from("movies")));
        assert_eq!(map.get("tx_type"), Some(&Value::from("IMPLICIT")));
        assert_eq!(map.get("tx_timeout"), Some(&Value::Integer(2)));
        assert_eq!(map.get("imp_user"), Some(&Value::from("bob")));
        assert!(map.get("tx_metadata").is_some());
    }

    #[test]
    fn test_stream_metadata() {
        let all = stream_metadata(FETCH_ALL, ABSENT_QUERY_ID);
        assert_eq!(all.get("n"), Some(&Value::Integer(-1)));
        assert!(!all.contains_key("qid"));

        let some = stream_metadata(1000, 3);
        assert_eq!(some.get("qid"), Some(&Value::Integer(3)));
    }

    #[test]
    fn test_auth_token_map() {
        let map = AuthToken::basic("neo4j", "secret", None).to_map();
        assert_eq!(map.get("scheme"), Some(&Value::from("basic")));
        assert_eq!(map.get("principal"), Some(&Value::from("neo4j")));
        assert_eq!(map.get("credentials"), Some(&Value::from("secret")));
        assert!(!map.contains_key("realm"));

        let none = AuthToken::none().to_map();
        assert_eq!(none.len(), 1);
    }

    #[test]
    fn test_auth_token_debug_redacts() {
        let token = AuthToken::basic("neo4j", "hunter2", None);
        let debug = format!("{:?}", token);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("******"));
    }

    #[test]
    fn test_hello_metadata() {
        let mut routing = BTreeMap::new();
        routing.insert("address".to_string(), Value::from("localhost:7687"));
        let hello = HelloMetadata {
            user_agent: "boltwire/0.1".into(),
            bolt_agent: Some(BoltAgent::new("boltwire/0.1").with_platform("linux; x86_64")),
            routing: Some(routing),
            patch_bolt: vec!["utc".into()],
        };
        let map = hello.to_map();
        assert_eq!(map.get("patch_bolt"), Some(&Value::from(vec!["utc"])));
        assert_eq!(map.get("user_agent"), Some(&Value::from("boltwire/0.1")));
        let agent = map.get("bolt_agent").unwrap();
        assert_eq!(agent.get("platform"), Some(&Value::from("linux; x86_64")));
        assert_eq!(agent.get("language"), None);
        assert_eq!(
            map.get("routing").and_then(|r| r.get("address")),
            Some(&Value::from("localhost:7687"))
        );

        let bare = HelloMetadata::new("boltwire/0.1").to_map();
        assert_eq!(bare.len(), 1);
        assert!(!bare.contains_key("patch_bolt"));
    }
}
