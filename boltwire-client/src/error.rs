//! Client error types.

use crate::retry;
use boltwire_protocol::{HandshakeError, ProtocolError, ValueError};
use std::io;
use std::sync::Arc;
use thiserror::Error;

/// What went wrong with the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// TCP connect failed or timed out.
    CouldNotConnect,
    /// The TLS handshake was rejected.
    SecureHandshakeFailed,
    /// An established connection broke, timed out or was closed.
    ConnectionTerminated,
}

/// Client errors.
///
/// Errors are `Clone` so a single fatal cause can be handed to every
/// outstanding request.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    #[error("{code}: {message}")]
    Server { code: String, message: String },

    #[error("The server has ignored the message{}", ignored_suffix(.0))]
    Ignored(Option<Box<ClientError>>),

    #[error("{message}")]
    Transport {
        kind: TransportErrorKind,
        message: String,
        #[source]
        source: Option<Arc<io::Error>>,
    },

    #[error("TLS configuration error: {0}")]
    Tls(String),

    #[error(transparent)]
    Value(#[from] ValueError),

    #[error("configuration error: {0}")]
    Config(String),
}

fn ignored_suffix(cause: &Option<Box<ClientError>>) -> String {
    match cause {
        Some(cause) => format!(" because of previous failure: {}", cause),
        None => String::new(),
    }
}

impl ClientError {
    /// Builds a server failure, folding legacy codes onto their current names.
    pub fn server(code: impl AsRef<str>, message: impl Into<String>) -> Self {
        ClientError::Server {
            code: retry::normalize_code(code.as_ref()).to_string(),
            message: message.into(),
        }
    }

    pub fn could_not_connect(message: impl Into<String>, source: Option<io::Error>) -> Self {
        Self::transport(TransportErrorKind::CouldNotConnect, message, source)
    }

    pub fn secure_handshake_failed(message: impl Into<String>, source: Option<io::Error>) -> Self {
        Self::transport(TransportErrorKind::SecureHandshakeFailed, message, source)
    }

    pub fn terminated(message: impl Into<String>, source: Option<io::Error>) -> Self {
        Self::transport(TransportErrorKind::ConnectionTerminated, message, source)
    }

    fn transport(kind: TransportErrorKind, message: impl Into<String>, source: Option<io::Error>) -> Self {
        ClientError::Transport {
            kind,
            message: message.into(),
            source: source.map(Arc::new),
        }
    }

    /// Returns the server error code, if this is a server failure.
    pub fn code(&self) -> Option<&str> {
        match self {
            ClientError::Server { code, .. } => Some(code),
            _ => None,
        }
    }

    /// Returns the transport error kind, if this is a transport failure.
    pub fn transport_kind(&self) -> Option<TransportErrorKind> {
        match self {
            ClientError::Transport { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Returns whether the connection this error came from should be dropped.
    ///
    /// Protocol and transport errors have already closed it. Database errors
    /// and request violations leave it open but unfit for reuse.
    pub fn is_fatal(&self) -> bool {
        match self {
            ClientError::Protocol(_) | ClientError::Handshake(_) | ClientError::Transport { .. } => {
                true
            }
            ClientError::Server { code, .. } => retry::classify(code).is_fatal(),
            ClientError::Ignored(Some(cause)) => cause.is_fatal(),
            _ => false,
        }
    }

    /// Returns whether the failed work may succeed if retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Server { code, .. } => retry::classify(code).is_retryable(),
            ClientError::Transport { kind, .. } => {
                *kind != TransportErrorKind::SecureHandshakeFailed
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_error_display() {
        let err = ClientError::server("Neo.ClientError.Statement.SyntaxError", "bad query");
        assert_eq!(err.to_string(), "Neo.ClientError.Statement.SyntaxError: bad query");
        assert_eq!(err.code(), Some("Neo.ClientError.Statement.SyntaxError"));
        assert!(!err.is_fatal());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_legacy_codes_are_remapped() {
        let err = ClientError::server("Neo.TransientError.Transaction.Terminated", "killed");
        assert_eq!(err.code(), Some("Neo.ClientError.Transaction.Terminated"));
        assert!(!err.is_retryable());

        let err = ClientError::server("Neo.TransientError.Transaction.LockClientStopped", "stopped");
        assert_eq!(err.code(), Some("Neo.ClientError.Transaction.LockClientStopped"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_ignored_display() {
        assert_eq!(
            ClientError::Ignored(None).to_string(),
            "The server has ignored the message"
        );

        let cause = ClientError::server("Neo.ClientError.Statement.SyntaxError", "oops");
        let ignored = ClientError::Ignored(Some(Box::new(cause)));
        assert!(ignored.to_string().ends_with(
            "because of previous failure: Neo.ClientError.Statement.SyntaxError: oops"
        ));
    }

    #[test]
    fn test_transport_errors_are_fatal() {
        let err = ClientError::terminated("Connection to the database terminated", None);
        assert!(err.is_fatal());
        assert!(err.is_retryable());
        assert_eq!(err.transport_kind(), Some(TransportErrorKind::ConnectionTerminated));

        let tls = ClientError::secure_handshake_failed(
            "Failed to establish secured connection with the server",
            Some(io::Error::new(io::ErrorKind::InvalidData, "bad cert")),
        );
        assert!(tls.is_fatal());
        assert!(!tls.is_retryable());
        assert!(std::error::Error::source(&tls).is_some());
    }

    #[test]
    fn test_protocol_and_handshake_are_fatal() {
        assert!(ClientError::from(ProtocolError::InvalidUtf8).is_fatal());
        assert!(ClientError::from(HandshakeError::NoSupportedVersion).is_fatal());
        assert!(!ClientError::Config("x".into()).is_fatal());
    }

    #[test]
    fn test_database_error_is_fatal() {
        let err = ClientError::server("Neo.DatabaseError.General.UnknownError", "boom");
        assert!(err.is_fatal());
        let request = ClientError::server("Neo.ClientError.Request.Invalid", "bad message");
        assert!(request.is_fatal());
    }
}
