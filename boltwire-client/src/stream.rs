//! Socket abstraction over plain TCP and TLS.

use crate::address::BoltAddress;
use crate::error::ClientError;
use crate::security::SecurityPlan;
use crate::tls::create_tls_connector;
use pin_project_lite::pin_project;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;

pin_project! {
    /// A connection to the server, either plain TCP or TLS.
    #[derive(Debug)]
    #[project = BoltStreamProj]
    pub enum BoltStream {
        Plain { #[pin] stream: TcpStream },
        Tls { #[pin] stream: TlsStream<TcpStream> },
    }
}

impl BoltStream {
    /// Opens a TCP connection to `address` and applies `plan`.
    pub async fn open(address: &BoltAddress, plan: &SecurityPlan) -> Result<Self, ClientError> {
        tracing::debug!("Connecting to {}", address);

        let tcp = TcpStream::connect((address.host(), address.port()))
            .await
            .map_err(|e| {
                tracing::debug!("Connection to {} failed: {}", address, e);
                ClientError::could_not_connect(
                    format!("Failed to establish connection with the server at {}", address),
                    Some(e),
                )
            })?;
        tcp.set_nodelay(true).map_err(|e| {
            ClientError::could_not_connect("Failed to establish connection with the server", Some(e))
        })?;

        match plan {
            SecurityPlan::Plaintext => Ok(BoltStream::Plain { stream: tcp }),
            SecurityPlan::Tls(settings) => {
                let (connector, server_name) = create_tls_connector(settings, address.host())?;
                tracing::debug!("Starting TLS handshake with {:?}", server_name);
                let stream = connector.connect(server_name, tcp).await.map_err(|e| {
                    tracing::debug!("TLS handshake with {} failed: {}", address, e);
                    ClientError::secure_handshake_failed(
                        "Failed to establish secured connection with the server",
                        Some(e),
                    )
                })?;
                Ok(BoltStream::Tls { stream })
            }
        }
    }

    /// Returns whether this stream is TLS-encrypted.
    pub fn is_tls(&self) -> bool {
        matches!(self, BoltStream::Tls { .. })
    }

    pub fn peer_addr(&self) -> io::Result<std::net::SocketAddr> {
        match self {
            BoltStream::Plain { stream } => stream.peer_addr(),
            BoltStream::Tls { stream } => stream.get_ref().0.peer_addr(),
        }
    }
}

impl AsyncRead for BoltStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.project() {
            BoltStreamProj::Plain { stream } => stream.poll_read(cx, buf),
            BoltStreamProj::Tls { stream } => stream.poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for BoltStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.project() {
            BoltStreamProj::Plain { stream } => stream.poll_write(cx, buf),
            BoltStreamProj::Tls { stream } => stream.poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.project() {
            BoltStreamProj::Plain { stream } => stream.poll_flush(cx),
            BoltStreamProj::Tls { stream } => stream.poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.project() {
            BoltStreamProj::Plain { stream } => stream.poll_shutdown(cx),
            BoltStreamProj::Tls { stream } => stream.poll_shutdown(cx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportErrorKind;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_open_plaintext() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4];
            socket.read_exact(&mut buf).await.unwrap();
            socket.write_all(&buf).await.unwrap();
        });

        let address = BoltAddress::new("127.0.0.1", addr.port());
        let mut stream = BoltStream::open(&address, &SecurityPlan::Plaintext)
            .await
            .unwrap();
        assert!(!stream.is_tls());
        assert_eq!(stream.peer_addr().unwrap(), addr);

        stream.write_all(b"ping").await.unwrap();
        let mut echo = [0u8; 4];
        stream.read_exact(&mut echo).await.unwrap();
        assert_eq!(&echo, b"ping");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_open_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = BoltStream::open(&BoltAddress::new("127.0.0.1", port), &SecurityPlan::Plaintext)
            .await
            .unwrap_err();
        assert_eq!(err.transport_kind(), Some(TransportErrorKind::CouldNotConnect));
    }
}
