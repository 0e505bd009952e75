//! Classification of server error codes.
//!
//! Codes look like `Neo.<Classification>.<Category>.<Title>`. The tables below
//! list the exceptions to the per-classification defaults.

use std::borrow::Cow;

/// Transient codes the server moved to the client classification in 5.0.
/// Older servers still send the transient form.
static LEGACY_TRANSIENT_CODES: &[(&str, &str)] = &[
    (
        "Neo.TransientError.Transaction.Terminated",
        "Neo.ClientError.Transaction.Terminated",
    ),
    (
        "Neo.TransientError.Transaction.LockClientStopped",
        "Neo.ClientError.Transaction.LockClientStopped",
    ),
];

/// Client errors caused by cluster role changes or expired credentials. The
/// same work can succeed on a new connection.
static RETRYABLE_CLIENT_CODES: &[&str] = &[
    "Neo.ClientError.Cluster.NotALeader",
    "Neo.ClientError.General.ForbiddenOnReadOnlyDatabase",
    "Neo.ClientError.Security.AuthorizationExpired",
];

/// Transient codes that must not be retried.
static NON_RETRYABLE_TRANSIENT_CODES: &[&str] = &[
    "Neo.TransientError.Transaction.Terminated",
    "Neo.TransientError.Transaction.LockClientStopped",
];

/// Broad outcome of a server failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClassification {
    /// The failure depends on timing, e.g. a deadlock or a leader switch.
    Transient { retryable: bool },
    /// The request was wrong; repeating it fails the same way.
    Client { retryable: bool },
    /// The database itself failed.
    Database,
    /// The code is malformed or reports a protocol violation.
    Fatal,
}

impl ErrorClassification {
    pub fn is_retryable(self) -> bool {
        match self {
            ErrorClassification::Transient { retryable }
            | ErrorClassification::Client { retryable } => retryable,
            _ => false,
        }
    }

    /// Returns whether a connection that saw this failure should be dropped.
    pub fn is_fatal(self) -> bool {
        matches!(
            self,
            ErrorClassification::Database | ErrorClassification::Fatal
        )
    }
}

/// Replaces legacy transient codes with their current client form.
pub fn normalize_code(code: &str) -> Cow<'_, str> {
    LEGACY_TRANSIENT_CODES
        .iter()
        .find(|(legacy, _)| *legacy == code)
        .map(|(_, current)| Cow::Borrowed(*current))
        .unwrap_or(Cow::Borrowed(code))
}

/// Classifies a server error code.
pub fn classify(code: &str) -> ErrorClassification {
    if NON_RETRYABLE_TRANSIENT_CODES.contains(&code) {
        return ErrorClassification::Client { retryable: false };
    }
    if code.starts_with("Neo.ClientError.Request") {
        return ErrorClassification::Fatal;
    }

    let mut parts = code.split('.');
    if parts.next() != Some("Neo") {
        return ErrorClassification::Fatal;
    }
    match parts.next() {
        Some("TransientError") => ErrorClassification::Transient { retryable: true },
        Some("ClientError") => ErrorClassification::Client {
            retryable: RETRYABLE_CLIENT_CODES.contains(&code),
        },
        Some("DatabaseError") => ErrorClassification::Database,
        _ => ErrorClassification::Fatal,
    }
}

/// Returns whether work that failed with `code` may be retried.
pub fn is_retryable(code: &str) -> bool {
    classify(code).is_retryable()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_is_retryable() {
        assert_eq!(
            classify("Neo.TransientError.Transaction.DeadlockDetected"),
            ErrorClassification::Transient { retryable: true }
        );
        assert!(is_retryable("Neo.TransientError.General.DatabaseUnavailable"));
    }

    #[test]
    fn test_legacy_transient_not_retryable() {
        for code in NON_RETRYABLE_TRANSIENT_CODES {
            assert!(!is_retryable(code));
            assert!(normalize_code(code).starts_with("Neo.ClientError.Transaction."));
        }
        assert!(!is_retryable("Neo.ClientError.Transaction.Terminated"));
    }

    #[test]
    fn test_retryable_client_codes() {
        assert!(is_retryable("Neo.ClientError.Cluster.NotALeader"));
        assert!(is_retryable("Neo.ClientError.General.ForbiddenOnReadOnlyDatabase"));
        assert!(is_retryable("Neo.ClientError.Security.AuthorizationExpired"));
        assert!(!is_retryable("Neo.ClientError.Security.Unauthorized"));
        assert!(!is_retryable("Neo.ClientError.Statement.SyntaxError"));
    }

    #[test]
    fn test_fatal_classifications() {
        assert_eq!(classify("Neo.ClientError.Request.Invalid"), ErrorClassification::Fatal);
        assert_eq!(classify("garbage"), ErrorClassification::Fatal);
        assert_eq!(classify("Neo.Weird.Thing"), ErrorClassification::Fatal);
        assert_eq!(
            classify("Neo.DatabaseError.General.UnknownError"),
            ErrorClassification::Database
        );
        assert!(classify("Neo.DatabaseError.General.UnknownError").is_fatal());
        assert!(!classify("Neo.ClientError.Statement.SyntaxError").is_fatal());
    }

    #[test]
    fn test_normalize_passes_through() {
        assert_eq!(
            normalize_code("Neo.ClientError.Statement.SyntaxError"),
            "Neo.ClientError.Statement.SyntaxError"
        );
    }
}
