//! Version negotiation.

use crate::error::ClientError;
use boltwire_protocol::version::{handshake_request, select_version};
use boltwire_protocol::{ProtocolVersion, VersionProposal};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Message of errors raised when the server goes away unexpectedly.
pub const TERMINATED_MESSAGE: &str = "Connection to the database terminated. \
    Please ensure that your database is listening on the correct host and port \
    and that you have compatible encryption settings both on Neo4j server and driver. \
    Note that the default encryption setting has changed in Neo4j 4.0.";

/// Sends the magic preamble and proposals, then reads the server's choice.
pub async fn perform_handshake<S>(
    stream: &mut S,
    proposals: &[VersionProposal],
) -> Result<ProtocolVersion, ClientError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let request = handshake_request(proposals);
    stream
        .write_all(&request)
        .await
        .map_err(|e| ClientError::terminated("Connection to the database failed", Some(e)))?;
    stream
        .flush()
        .await
        .map_err(|e| ClientError::terminated("Connection to the database failed", Some(e)))?;
    tracing::debug!("Handshake sent, proposals: {:?}", proposals);

    let mut reply = [0u8; 4];
    stream.read_exact(&mut reply).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            ClientError::terminated(TERMINATED_MESSAGE, Some(e))
        } else {
            ClientError::terminated("Connection to the database failed", Some(e))
        }
    })?;

    let version = select_version(reply, proposals)?;
    tracing::debug!("Selected protocol version {}", version);
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;
    use boltwire_protocol::version::BOLT_MAGIC;
    use boltwire_protocol::HandshakeError;
    use tokio_test::io::Builder;

    fn proposals() -> Vec<VersionProposal> {
        vec![VersionProposal::exact(ProtocolVersion::V5_1)]
    }

    fn expected_request() -> Vec<u8> {
        let mut bytes = BOLT_MAGIC.to_vec();
        bytes.extend_from_slice(&[0, 0, 1, 5]);
        bytes.extend_from_slice(&[0; 12]);
        bytes
    }

    #[tokio::test]
    async fn test_handshake_selects_version() {
        let mut mock = Builder::new()
            .write(&expected_request())
            .read(&[0, 0, 1, 5])
            .build();
        let version = perform_handshake(&mut mock, &proposals()).await.unwrap();
        assert_eq!(version, ProtocolVersion::V5_1);
    }

    #[tokio::test]
    async fn test_handshake_no_supported_version() {
        let mut mock = Builder::new()
            .write(&expected_request())
            .read(&[0, 0, 0, 0])
            .build();
        let err = perform_handshake(&mut mock, &proposals()).await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Handshake(HandshakeError::NoSupportedVersion)
        ));
    }

    #[tokio::test]
    async fn test_handshake_http_endpoint() {
        let mut mock = Builder::new()
            .write(&expected_request())
            .read(b"HTTP")
            .build();
        let err = perform_handshake(&mut mock, &proposals()).await.unwrap_err();
        assert!(matches!(err, ClientError::Handshake(HandshakeError::HttpEndpoint)));
    }

    #[tokio::test]
    async fn test_handshake_unproposed_version() {
        let mut mock = Builder::new()
            .write(&expected_request())
            .read(&[0, 0, 4, 5])
            .build();
        let err = perform_handshake(&mut mock, &proposals()).await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Handshake(HandshakeError::UnsupportedVersion(v)) if v == ProtocolVersion::V5_4
        ));
    }

    #[tokio::test]
    async fn test_handshake_server_hangs_up() {
        let mut mock = Builder::new().write(&expected_request()).read(&[0, 0]).build();
        let err = perform_handshake(&mut mock, &proposals()).await.unwrap_err();
        assert!(err.to_string().starts_with("Connection to the database terminated."));
        assert!(err.is_fatal());
    }
}
