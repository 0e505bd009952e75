//! Protocol error types.

use crate::version::ProtocolVersion;
use thiserror::Error;

/// Errors raised while framing, packing or unpacking protocol data.
///
/// Every variant except [`ProtocolError::TooLarge`] on the encode path means the
/// byte stream can no longer be trusted, and the owning connection must close.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("unexpected end of data: needed {needed} more bytes")]
    UnexpectedEof { needed: usize },

    #[error("unknown PackStream marker: {0:#04x}")]
    UnknownMarker(u8),

    #[error("invalid UTF-8 in string value")]
    InvalidUtf8,

    #[error("map key must be a string, got {0}")]
    InvalidMapKey(&'static str),

    #[error("{kind} too large to pack: {size} (max {max})")]
    TooLarge {
        kind: &'static str,
        size: usize,
        max: usize,
    },

    #[error("invalid struct {name} ({signature:#04x}): expected {expected} fields, got {actual}")]
    InvalidStructSize {
        name: &'static str,
        signature: u8,
        expected: usize,
        actual: usize,
    },

    #[error("invalid field in struct {name}: {reason}")]
    InvalidStructField { name: &'static str, reason: String },

    #[error("unknown response message signature: {0:#04x}")]
    UnknownMessage(u8),

    #[error("received {0} with no pending request")]
    UnexpectedResponse(&'static str),

    #[error("expected a message struct, got marker {0:#04x}")]
    NotAMessage(u8),

    #[error("message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),

    #[error("value nesting exceeds {0} levels")]
    TooDeep(usize),

    #[error("trailing bytes after message: {0}")]
    TrailingBytes(usize),
}

/// Errors raised while negotiating the protocol version.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandshakeError {
    #[error(
        "The server does not support any of the protocol versions supported by this driver. \
         Ensure that you are using driver and server versions that are compatible with one another."
    )]
    NoSupportedVersion,

    #[error(
        "Server responded HTTP. Make sure you are not trying to connect to the http endpoint \
         (HTTP defaults to port 7474 whereas BOLT defaults to port 7687)"
    )]
    HttpEndpoint,

    #[error("Protocol error, server suggested unexpected protocol version: {0}")]
    UnsupportedVersion(ProtocolVersion),
}

/// Errors raised by value coercion and record lookup.
///
/// These are local to the call site and never affect the connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueError {
    #[error("cannot coerce {from} to {to} without losing information: {value}")]
    LossyCoercion {
        from: &'static str,
        to: &'static str,
        value: String,
    },

    #[error("cannot coerce {from} to {to}")]
    Uncoercible {
        from: &'static str,
        to: &'static str,
    },

    #[error("no such key: {0}")]
    NoSuchKey(String),

    #[error("index {index} out of bounds for record of length {len}")]
    NoSuchIndex { index: usize, len: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_error_display() {
        let err = ProtocolError::UnknownMarker(0xE5);
        assert!(err.to_string().contains("0xe5"));

        let err = ProtocolError::UnexpectedEof { needed: 4 };
        assert!(err.to_string().contains('4'));

        let err = ProtocolError::InvalidStructSize {
            name: "Node",
            signature: 0x4E,
            expected: 4,
            actual: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("Node"));
        assert!(msg.contains("0x4e"));

        let err = ProtocolError::MessageTooLarge { size: 100, max: 50 };
        assert!(err.to_string().contains("100"));
    }

    #[test]
    fn test_handshake_error_display() {
        assert!(HandshakeError::NoSupportedVersion
            .to_string()
            .contains("does not support any of the protocol versions"));
        assert!(HandshakeError::HttpEndpoint
            .to_string()
            .contains("Server responded HTTP"));
        let err = HandshakeError::UnsupportedVersion(ProtocolVersion::new(9, 3));
        assert!(err.to_string().ends_with("9.3"));
    }

    #[test]
    fn test_value_error_display() {
        let err = ValueError::LossyCoercion {
            from: "FLOAT",
            to: "i64",
            value: "1.5".into(),
        };
        assert!(err.to_string().contains("1.5"));
        assert!(ValueError::NoSuchKey("n".into()).to_string().contains('n'));
    }
}
