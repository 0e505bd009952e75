//! Scripted in-process server for connection tests.

use crate::address::BoltAddress;
use boltwire_protocol::version::BOLT_MAGIC;
use boltwire_protocol::{Decoder, Encoder, Metadata, Request, Response, Value};
use bytes::BytesMut;
use std::future::Future;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

pub(crate) struct FakeServer {
    address: BoltAddress,
    handle: JoinHandle<()>,
}

impl FakeServer {
    /// Accepts one connection and runs `script` against it.
    pub(crate) async fn start<F, Fut>(script: F) -> Self
    where
        F: FnOnce(Session) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            script(Session::new(socket)).await;
        });
        Self {
            address: BoltAddress::new("127.0.0.1", port),
            handle,
        }
    }

    pub(crate) fn address(&self) -> BoltAddress {
        self.address.clone()
    }

    /// Waits for the script to end, surfacing its assertion failures.
    pub(crate) async fn finish(self) {
        self.handle.await.unwrap();
    }
}

pub(crate) struct Session {
    socket: TcpStream,
    decoder: Decoder,
}

impl Session {
    fn new(socket: TcpStream) -> Self {
        Self {
            socket,
            decoder: Decoder::new(),
        }
    }

    pub(crate) async fn accept_handshake(&mut self, reply: [u8; 4]) {
        let mut request = [0u8; 20];
        self.socket.read_exact(&mut request).await.unwrap();
        assert_eq!(request[..4], BOLT_MAGIC);
        self.socket.write_all(&reply).await.unwrap();
    }

    /// Negotiates 5.1 and accepts HELLO and LOGON.
    pub(crate) async fn accept_login(&mut self) {
        self.accept_handshake([0, 0, 1, 5]).await;
        self.expect("HELLO").await;
        self.expect("LOGON").await;
        self.send_all(vec![hello_success(), success(&[])]).await;
    }

    /// Reads the next request and checks its kind.
    pub(crate) async fn expect(&mut self, name: &str) -> Request {
        let mut buf = [0u8; 4096];
        loop {
            if let Some(request) = self.decoder.decode_request().unwrap() {
                assert_eq!(request.name(), name);
                return request;
            }
            let n = self.socket.read(&mut buf).await.unwrap();
            assert!(n > 0, "client closed while server expected {}", name);
            self.decoder.extend(&buf[..n]);
        }
    }

    pub(crate) async fn send(&mut self, response: Response) {
        self.send_all(vec![response]).await;
    }

    /// Writes all responses with a single write.
    pub(crate) async fn send_all(&mut self, responses: Vec<Response>) {
        let mut buf = BytesMut::new();
        for response in &responses {
            Encoder::encode_response(response, &mut buf).unwrap();
        }
        self.socket.write_all(&buf).await.unwrap();
    }

    /// Reads until the client hangs up.
    pub(crate) async fn wait_closed(&mut self) {
        let mut buf = [0u8; 4096];
        while let Ok(n) = self.socket.read(&mut buf).await {
            if n == 0 {
                break;
            }
        }
    }
}

pub(crate) fn success(pairs: &[(&str, Value)]) -> Response {
    Response::Success(
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect::<Metadata>(),
    )
}

pub(crate) fn hello_success() -> Response {
    success(&[
        ("server", Value::from("Neo4j/5.13.0")),
        ("connection_id", Value::from("bolt-1")),
    ])
}
