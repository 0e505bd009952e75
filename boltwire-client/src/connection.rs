//! Connection management.
//!
//! A [`Connection`] is a cheap handle onto an IO task that owns the socket.
//! Every operation hands its request to that task at call time and returns a
//! [`Pending`] future for the typed response, so requests go out in call
//! order whether or not the caller awaits in between.

use crate::address::BoltAddress;
use crate::agent::{default_bolt_agent, default_user_agent};
use crate::dispatch::ResponseHandler;
use crate::error::ClientError;
use crate::handlers::{
    CommitHandler, CommitResponse, CompletionHandler, DiscardHandler, DiscardResponse,
    HelloHandler, HelloResponse, OpenStreams, PullHandler, PullResponse, RunHandler, RunResponse,
};
use crate::handshake::perform_handshake;
use crate::security::SecurityPlan;
use crate::stream::BoltStream;
use crate::task::{Command, IoTask, Outbound};
use boltwire_protocol::version::default_proposals;
use boltwire_protocol::{
    AuthToken, BoltAgent, HelloMetadata, Metadata, ProtocolVersion, Request, TransactionMetadata,
    TransactionType, Value, VersionProposal, DEFAULT_MAX_MESSAGE_SIZE,
};
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Default read buffer size (8 KiB).
pub const DEFAULT_READ_BUFFER_SIZE: usize = 8 * 1024;

/// Minimum read buffer size (1 KiB).
pub const MIN_READ_BUFFER_SIZE: usize = 1024;

/// Maximum read buffer size (1 MiB).
pub const MAX_READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Default bound on TCP connect, TLS and version negotiation.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Bound on TCP connect, TLS handshake and version negotiation.
    pub connect_timeout: Duration,
    /// How long to wait for a response once requests are flushed. When
    /// unset, the server's `connection.recv_timeout_seconds` hint applies.
    pub read_timeout: Option<Duration>,
    pub user_agent: String,
    /// Sent from protocol 5.3 on.
    pub bolt_agent: BoltAgent,
    /// Routing context; `None` disables server-side routing.
    pub routing_context: Option<BTreeMap<String, Value>>,
    pub max_message_size: usize,
    pub proposed_versions: Vec<VersionProposal>,
    /// Read buffer size for socket reads.
    pub read_buffer_size: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: None,
            user_agent: default_user_agent(),
            bolt_agent: default_bolt_agent(),
            routing_context: None,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            proposed_versions: default_proposals(),
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }
}

impl ConnectionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_bolt_agent(mut self, agent: BoltAgent) -> Self {
        self.bolt_agent = agent;
        self
    }

    /// Enables server-side routing. The server address is added to the
    /// context at connect time.
    pub fn with_routing_context(mut self, context: BTreeMap<String, Value>) -> Self {
        self.routing_context = Some(context);
        self
    }

    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    pub fn with_proposed_versions(mut self, proposals: Vec<VersionProposal>) -> Self {
        self.proposed_versions = proposals;
        self
    }

    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.clamp(MIN_READ_BUFFER_SIZE, MAX_READ_BUFFER_SIZE);
        self
    }

    fn hello(&self, version: ProtocolVersion, address: &BoltAddress) -> HelloMetadata {
        let mut hello = HelloMetadata::new(self.user_agent.clone());
        if version >= ProtocolVersion::V5_3 {
            hello.bolt_agent = Some(self.bolt_agent.clone());
        }
        if let Some(context) = &self.routing_context {
            let mut routing = context.clone();
            routing
                .entry("address".to_string())
                .or_insert_with(|| Value::from(address.to_string()));
            hello.routing = Some(routing);
        }
        hello
    }
}

/// A response that has been requested but may not have arrived yet.
#[must_use = "the response is lost unless the future is awaited"]
pub struct Pending<T> {
    rx: oneshot::Receiver<Result<T, ClientError>>,
}

impl<T> Pending<T> {
    fn new(rx: oneshot::Receiver<Result<T, ClientError>>) -> Self {
        Self { rx }
    }

    fn ready(result: Result<T, ClientError>) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(result);
        Self { rx }
    }
}

impl<T> Future for Pending<T> {
    type Output = Result<T, ClientError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().rx).poll(cx).map(|result| {
            result.unwrap_or_else(|_| {
                Err(ClientError::terminated(
                    "Connection to the database terminated before a response arrived",
                    None,
                ))
            })
        })
    }
}

/// Read timeout stored as milliseconds; zero means none.
struct ReadTimeout(AtomicU64);

impl ReadTimeout {
    fn new(timeout: Option<Duration>) -> Self {
        let this = Self(AtomicU64::new(0));
        this.set(timeout);
        this
    }

    fn get(&self) -> Option<Duration> {
        match self.0.load(Ordering::SeqCst) {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    fn set(&self, timeout: Option<Duration>) {
        let ms = timeout.map_or(0, |t| u64::try_from(t.as_millis()).unwrap_or(u64::MAX));
        self.0.store(ms, Ordering::SeqCst);
    }
}

struct Shared {
    commands: mpsc::UnboundedSender<Command>,
    address: BoltAddress,
    version: ProtocolVersion,
    server_agent: String,
    connection_id: Option<String>,
    database: Option<String>,
    read_timeout: ReadTimeout,
    open: Arc<AtomicBool>,
    streams: OpenStreams,
}

/// A connection to a Bolt server.
///
/// Clones share the same underlying connection.
#[derive(Clone)]
pub struct Connection {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("address", &self.shared.address)
            .field("version", &self.shared.version)
            .field("connection_id", &self.shared.connection_id)
            .field("open", &self.is_open())
            .finish()
    }
}

fn send(commands: &mpsc::UnboundedSender<Command>, command: Command) {
    if let Err(mpsc::error::SendError(command)) = commands.send(command) {
        command.reject(ClientError::terminated("Connection is closed", None));
    }
}

fn submit<T, H>(
    commands: &mpsc::UnboundedSender<Command>,
    request: Request,
    flush: bool,
    handler: impl FnOnce(oneshot::Sender<Result<T, ClientError>>) -> H,
) -> Pending<T>
where
    H: ResponseHandler + 'static,
{
    let (tx, rx) = oneshot::channel();
    let message: Outbound = (request, Some(Box::new(handler(tx))));
    send(
        commands,
        Command::Submit {
            messages: vec![message],
            flush,
        },
    );
    Pending::new(rx)
}

/// Opens an authenticated connection.
///
/// `config.connect_timeout` bounds TCP connect, TLS and version negotiation.
/// HELLO and LOGON are bounded by the read timeout instead.
pub async fn connect(
    address: &BoltAddress,
    plan: &SecurityPlan,
    database: Option<&str>,
    auth: &AuthToken,
    config: &ConnectionConfig,
) -> Result<Connection, ClientError> {
    let (stream, version) = tokio::time::timeout(config.connect_timeout, async {
        tracing::debug!("[{}] Connecting", address);
        let mut stream = BoltStream::open(address, plan).await?;
        tracing::debug!("[{}] HandshakeSent", address);
        let version = perform_handshake(&mut stream, &config.proposed_versions).await?;
        Ok::<_, ClientError>((stream, version))
    })
    .await
    .map_err(|_| {
        ClientError::could_not_connect(
            format!(
                "Unable to establish connection in {}ms",
                config.connect_timeout.as_millis()
            ),
            None,
        )
    })??;
    tracing::debug!("[{}] VersionSelected {}", address, version);

    let (commands, rx) = mpsc::unbounded_channel();
    let open = Arc::new(AtomicBool::new(true));
    let task = IoTask::new(
        stream,
        rx,
        config,
        open.clone(),
        address.clone(),
    );
    tokio::spawn(task.run());

    tracing::debug!("[{}] AuthExchange", address);
    let hello = config.hello(version, address);
    let hello = submit(
        &commands,
        Request::Hello {
            extra: hello.to_map(),
        },
        false,
        |reply| HelloHandler { reply },
    );
    let logon = submit(
        &commands,
        Request::Logon { auth: auth.clone() },
        true,
        |reply| CompletionHandler { reply },
    );

    let hello: HelloResponse = match hello.await {
        Ok(hello) => hello,
        Err(e) => return Err(abandon(&commands, e).await),
    };
    if let Err(e) = logon.await {
        return Err(abandon(&commands, e).await);
    }

    let read_timeout = config.read_timeout.or(hello.recv_timeout);
    if config.read_timeout.is_none() && read_timeout.is_some() {
        send(&commands, Command::SetReadTimeout(read_timeout));
    }

    tracing::debug!(
        "[{}] Ready, server {} connection {:?}",
        address,
        hello.server_agent,
        hello.connection_id
    );
    Ok(Connection {
        shared: Arc::new(Shared {
            commands,
            address: address.clone(),
            version,
            server_agent: hello.server_agent,
            connection_id: hello.connection_id,
            database: database.map(str::to_string),
            read_timeout: ReadTimeout::new(read_timeout),
            open,
            streams: OpenStreams::default(),
        }),
    })
}

/// Closes a connection that failed to initialize and hands back the error.
async fn abandon(commands: &mpsc::UnboundedSender<Command>, error: ClientError) -> ClientError {
    tracing::debug!("Connection initialization failed: {}", error);
    let (done, closed) = oneshot::channel();
    send(commands, Command::Close { done });
    let _ = closed.await;
    error
}

impl Connection {
    /// Opens an explicit transaction.
    pub fn begin_transaction(&self, tx: &TransactionMetadata, flush: bool) -> Pending<()> {
        let extra = self.with_default_database(tx).to_map();
        self.submit(Request::Begin { extra }, flush, |reply| CompletionHandler {
            reply,
        })
    }

    /// Runs a query inside the open transaction.
    pub fn run(&self, query: impl Into<String>, parameters: Metadata, flush: bool) -> Pending<RunResponse> {
        self.run_with(query.into(), parameters, Metadata::new(), flush)
    }

    /// Runs a query in its own implicit transaction.
    pub fn run_auto_commit(
        &self,
        query: impl Into<String>,
        parameters: Metadata,
        tx: &TransactionMetadata,
        flush: bool,
    ) -> Pending<RunResponse> {
        let tx = self
            .with_default_database(tx)
            .with_tx_type(TransactionType::Implicit);
        self.run_with(query.into(), parameters, tx.to_map(), flush)
    }

    fn run_with(
        &self,
        query: String,
        parameters: Metadata,
        extra: Metadata,
        flush: bool,
    ) -> Pending<RunResponse> {
        let streams = self.shared.streams.clone();
        self.submit(
            Request::Run {
                query,
                parameters,
                extra,
            },
            flush,
            |reply| RunHandler { reply, streams },
        )
    }

    /// Fetches up to `n` records (`FETCH_ALL` for all) of a result.
    pub fn pull(&self, query_id: i64, n: i64) -> Pending<PullResponse> {
        let streams = self.shared.streams.clone();
        self.submit(Request::Pull { n, qid: query_id }, true, |reply| {
            PullHandler::new(reply, streams, query_id)
        })
    }

    /// Skips up to `n` records of a result.
    pub fn discard(&self, query_id: i64, n: i64) -> Pending<DiscardResponse> {
        let streams = self.shared.streams.clone();
        self.submit(Request::Discard { n, qid: query_id }, true, |reply| {
            DiscardHandler {
                reply,
                streams,
                query_id,
            }
        })
    }

    pub fn commit(&self) -> Pending<CommitResponse> {
        self.submit(Request::Commit, true, |reply| CommitHandler { reply })
    }

    pub fn rollback(&self) -> Pending<()> {
        self.submit(Request::Rollback, true, |reply| CompletionHandler { reply })
    }

    /// Clears any failure state and open transaction on the server.
    pub fn reset(&self, flush: bool) -> Pending<()> {
        self.submit(Request::Reset, flush, |reply| CompletionHandler { reply })
    }

    /// Says GOODBYE and closes the transport. Requests still awaiting a
    /// response fail. Closing twice is harmless.
    pub fn close(&self) -> Pending<()> {
        if !self.is_open() {
            return Pending::ready(Ok(()));
        }
        let (done, rx) = oneshot::channel();
        send(&self.shared.commands, Command::Close { done });
        Pending::new(rx)
    }

    /// Default database for transactions that do not name one.
    pub fn database_name(&self) -> Option<&str> {
        self.shared.database.as_deref()
    }

    pub fn protocol_version(&self) -> ProtocolVersion {
        self.shared.version
    }

    pub fn server_agent(&self) -> &str {
        &self.shared.server_agent
    }

    pub fn connection_id(&self) -> Option<&str> {
        self.shared.connection_id.as_deref()
    }

    pub fn address(&self) -> &BoltAddress {
        &self.shared.address
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.shared.read_timeout.get()
    }

    /// Changes the read timeout. An armed timer restarts with the new value.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) {
        let timeout = timeout.filter(|t| !t.is_zero());
        self.shared.read_timeout.set(timeout);
        send(&self.shared.commands, Command::SetReadTimeout(timeout));
    }

    pub fn is_open(&self) -> bool {
        self.shared.open.load(Ordering::SeqCst)
    }

    fn with_default_database(&self, tx: &TransactionMetadata) -> TransactionMetadata {
        let mut tx = tx.clone();
        if tx.database.is_none() {
            tx.database = self.shared.database.clone();
        }
        tx
    }

    fn submit<T, H>(
        &self,
        request: Request,
        flush: bool,
        handler: impl FnOnce(oneshot::Sender<Result<T, ClientError>>) -> H,
    ) -> Pending<T>
    where
        H: ResponseHandler + 'static,
    {
        submit(&self.shared.commands, request, flush, handler)
    }
}
