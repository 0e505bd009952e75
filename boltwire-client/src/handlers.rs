//! Response handlers for each request kind and the typed results they yield.

use crate::dispatch::ResponseHandler;
use crate::error::ClientError;
use crate::summary::{self, ResultSummary};
use boltwire_protocol::{Metadata, ProtocolError, Record, Value, ABSENT_QUERY_ID};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;

type Reply<T> = oneshot::Sender<Result<T, ClientError>>;

/// Prefix every server agent string must carry.
pub const SERVER_AGENT_PREFIX: &str = "Neo4j/";

/// Outcome of HELLO.
#[derive(Debug, Clone, PartialEq)]
pub struct HelloResponse {
    pub server_agent: String,
    pub connection_id: Option<String>,
    /// Read timeout suggested by the server's `connection.recv_timeout_seconds` hint.
    pub recv_timeout: Option<Duration>,
}

impl HelloResponse {
    pub fn from_metadata(metadata: &Metadata) -> Result<Self, ProtocolError> {
        let server_agent = summary::string(metadata, "server")?
            .ok_or_else(|| ProtocolError::InvalidMetadata("server agent missing".into()))?;
        if !server_agent.starts_with(SERVER_AGENT_PREFIX) {
            return Err(ProtocolError::InvalidMetadata(format!(
                "server responded with unexpected agent: {}",
                server_agent
            )));
        }

        let recv_timeout = metadata
            .get("hints")
            .and_then(|hints| hints.get("connection.recv_timeout_seconds"))
            .and_then(|secs| match secs {
                Value::Integer(s) if *s > 0 => Some(Duration::from_secs(*s as u64)),
                _ => None,
            });

        Ok(HelloResponse {
            server_agent,
            connection_id: summary::string(metadata, "connection_id")?,
            recv_timeout,
        })
    }
}

/// Outcome of RUN.
#[derive(Debug, Clone, PartialEq)]
pub struct RunResponse {
    /// Id to address this result in PULL and DISCARD; `ABSENT_QUERY_ID`
    /// outside explicit transactions.
    pub query_id: i64,
    pub keys: Arc<[String]>,
    pub t_first: Option<Duration>,
}

impl RunResponse {
    pub fn from_metadata(metadata: &Metadata) -> Result<Self, ProtocolError> {
        let keys = match metadata.get("fields") {
            Some(Value::List(items)) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s.clone()),
                    other => Err(summary::invalid("fields", other)),
                })
                .collect::<Result<Vec<_>, _>>()?,
            Some(other) => return Err(summary::invalid("fields", other)),
            None => Vec::new(),
        };
        let query_id = match metadata.get("qid") {
            Some(Value::Integer(qid)) => *qid,
            Some(other) => return Err(summary::invalid("qid", other)),
            None => ABSENT_QUERY_ID,
        };
        Ok(RunResponse {
            query_id,
            keys: keys.into(),
            t_first: summary::millis(metadata, "t_first")?,
        })
    }
}

/// One batch of records from PULL.
#[derive(Debug, Clone, PartialEq)]
pub struct PullResponse {
    pub records: Vec<Record>,
    pub has_more: bool,
    /// Present once the stream is exhausted.
    pub summary: Option<ResultSummary>,
}

/// Outcome of DISCARD.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscardResponse {
    pub has_more: bool,
    pub summary: Option<ResultSummary>,
}

/// Outcome of COMMIT.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitResponse {
    pub bookmark: Option<String>,
}

/// Keys of open result streams, shared between RUN and the PULLs that read
/// its records. Only touched from the connection's IO task.
#[derive(Clone, Default)]
pub(crate) struct OpenStreams {
    inner: Arc<Mutex<HashMap<i64, RunResponse>>>,
}

impl OpenStreams {
    fn register(&self, run: &RunResponse) {
        let mut streams = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        streams.insert(ABSENT_QUERY_ID, run.clone());
        if run.query_id != ABSENT_QUERY_ID {
            streams.insert(run.query_id, run.clone());
        }
    }

    fn lookup(&self, query_id: i64) -> Option<RunResponse> {
        let streams = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        streams.get(&query_id).cloned()
    }

    /// Forgets a stream under both its qid and the absent-qid alias.
    fn finish(&self, query_id: i64) {
        let mut streams = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(run) = streams.remove(&query_id) else {
            return;
        };
        let alias = if query_id == ABSENT_QUERY_ID {
            run.query_id
        } else {
            ABSENT_QUERY_ID
        };
        if streams
            .get(&alias)
            .is_some_and(|other| other.query_id == run.query_id)
        {
            streams.remove(&alias);
        }
    }
}

fn has_more(metadata: &Metadata) -> bool {
    matches!(metadata.get("has_more"), Some(Value::Boolean(true)))
}

/// Resolves a stream summary unless more records are pending.
fn stream_summary(
    metadata: &Metadata,
    run: Option<&RunResponse>,
) -> Result<Option<ResultSummary>, ProtocolError> {
    if has_more(metadata) {
        return Ok(None);
    }
    ResultSummary::from_metadata(metadata, run.and_then(|r| r.t_first)).map(Some)
}

pub(crate) struct HelloHandler {
    pub reply: Reply<HelloResponse>,
}

impl ResponseHandler for HelloHandler {
    fn on_success(self: Box<Self>, metadata: Metadata) {
        let result = HelloResponse::from_metadata(&metadata).map_err(ClientError::from);
        let _ = self.reply.send(result);
    }

    fn on_failure(self: Box<Self>, error: ClientError) {
        let _ = self.reply.send(Err(error));
    }
}

/// Handler for requests whose success carries nothing of interest.
pub(crate) struct CompletionHandler {
    pub reply: Reply<()>,
}

impl ResponseHandler for CompletionHandler {
    fn on_success(self: Box<Self>, _metadata: Metadata) {
        let _ = self.reply.send(Ok(()));
    }

    fn on_failure(self: Box<Self>, error: ClientError) {
        let _ = self.reply.send(Err(error));
    }
}

pub(crate) struct RunHandler {
    pub reply: Reply<RunResponse>,
    pub streams: OpenStreams,
}

impl ResponseHandler for RunHandler {
    fn on_success(self: Box<Self>, metadata: Metadata) {
        let result = RunResponse::from_metadata(&metadata).map_err(ClientError::from);
        if let Ok(run) = &result {
            self.streams.register(run);
        }
        let _ = self.reply.send(result);
    }

    fn on_failure(self: Box<Self>, error: ClientError) {
        let _ = self.reply.send(Err(error));
    }
}

pub(crate) struct PullHandler {
    pub reply: Reply<PullResponse>,
    pub streams: OpenStreams,
    pub query_id: i64,
    pub run: Option<RunResponse>,
    pub records: Vec<Record>,
}

impl PullHandler {
    pub fn new(reply: Reply<PullResponse>, streams: OpenStreams, query_id: i64) -> Self {
        Self {
            reply,
            streams,
            query_id,
            run: None,
            records: Vec::new(),
        }
    }

    fn run(&mut self) -> Option<&RunResponse> {
        if self.run.is_none() {
            self.run = self.streams.lookup(self.query_id);
        }
        self.run.as_ref()
    }
}

impl ResponseHandler for PullHandler {
    fn on_success(mut self: Box<Self>, metadata: Metadata) {
        let summary = stream_summary(&metadata, self.run());
        if summary.as_ref().is_ok_and(Option::is_some) {
            self.streams.finish(self.query_id);
        }
        let result = summary.map_err(ClientError::from).map(|summary| PullResponse {
            records: std::mem::take(&mut self.records),
            has_more: summary.is_none(),
            summary,
        });
        let _ = self.reply.send(result);
    }

    fn on_failure(self: Box<Self>, error: ClientError) {
        let _ = self.reply.send(Err(error));
    }

    fn on_record(&mut self, fields: Vec<Value>) {
        let keys = match self.run() {
            Some(run) => run.keys.clone(),
            None => Arc::from(Vec::new()),
        };
        self.records.push(Record::new(keys, fields));
    }
}

pub(crate) struct DiscardHandler {
    pub reply: Reply<DiscardResponse>,
    pub streams: OpenStreams,
    pub query_id: i64,
}

impl ResponseHandler for DiscardHandler {
    fn on_success(self: Box<Self>, metadata: Metadata) {
        let run = self.streams.lookup(self.query_id);
        let summary = stream_summary(&metadata, run.as_ref());
        if summary.as_ref().is_ok_and(Option::is_some) {
            self.streams.finish(self.query_id);
        }
        let result = summary.map_err(ClientError::from).map(|summary| DiscardResponse {
            has_more: summary.is_none(),
            summary,
        });
        let _ = self.reply.send(result);
    }

    fn on_failure(self: Box<Self>, error: ClientError) {
        let _ = self.reply.send(Err(error));
    }
}

pub(crate) struct CommitHandler {
    pub reply: Reply<CommitResponse>,
}

impl ResponseHandler for CommitHandler {
    fn on_success(self: Box<Self>, metadata: Metadata) {
        let result = summary::string(&metadata, "bookmark")
            .map(|bookmark| CommitResponse { bookmark })
            .map_err(ClientError::from);
        let _ = self.reply.send(result);
    }

    fn on_failure(self: Box<Self>, error: ClientError) {
        let _ = self.reply.send(Err(error));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::DispatchQueue;

    fn metadata(pairs: &[(&str, Value)]) -> Metadata {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_hello_response() {
        let mut hints = Metadata::new();
        hints.insert("connection.recv_timeout_seconds".into(), Value::from(30));
        let mut meta = metadata(&[
            ("server", Value::from("Neo4j/5.13.0")),
            ("connection_id", Value::from("bolt-12")),
        ]);
        meta.insert("hints".into(), Value::Map(hints));

        let hello = HelloResponse::from_metadata(&meta).unwrap();
        assert_eq!(hello.server_agent, "Neo4j/5.13.0");
        assert_eq!(hello.connection_id.as_deref(), Some("bolt-12"));
        assert_eq!(hello.recv_timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_hello_rejects_foreign_server() {
        let meta = metadata(&[("server", Value::from("Memgraph/2.0"))]);
        assert!(HelloResponse::from_metadata(&meta).is_err());
        assert!(HelloResponse::from_metadata(&Metadata::new()).is_err());
    }

    #[test]
    fn test_run_response() {
        let meta = metadata(&[
            ("fields", Value::from(vec!["n", "m"])),
            ("qid", Value::from(4)),
            ("t_first", Value::from(7)),
        ]);
        let run = RunResponse::from_metadata(&meta).unwrap();
        assert_eq!(&run.keys[..], &["n".to_string(), "m".to_string()]);
        assert_eq!(run.query_id, 4);
        assert_eq!(run.t_first, Some(Duration::from_millis(7)));

        let auto = RunResponse::from_metadata(&metadata(&[("fields", Value::List(vec![]))])).unwrap();
        assert_eq!(auto.query_id, ABSENT_QUERY_ID);
        assert!(auto.keys.is_empty());
    }

    #[tokio::test]
    async fn test_pull_uses_keys_of_preceding_run() {
        let streams = OpenStreams::default();
        let mut queue = DispatchQueue::new();

        let (run_tx, run_rx) = oneshot::channel();
        let (pull_tx, pull_rx) = oneshot::channel();
        queue.enqueue(Box::new(RunHandler {
            reply: run_tx,
            streams: streams.clone(),
        }));
        queue.enqueue(Box::new(PullHandler::new(
            pull_tx,
            streams.clone(),
            ABSENT_QUERY_ID,
        )));

        queue
            .handle_success(metadata(&[
                ("fields", Value::from(vec!["x"])),
                ("t_first", Value::from(1)),
            ]))
            .unwrap();
        queue.handle_record(vec![Value::from(1)]).unwrap();
        queue.handle_record(vec![Value::from(2)]).unwrap();
        queue
            .handle_success(metadata(&[("type", Value::from("r"))]))
            .unwrap();

        let run = run_rx.await.unwrap().unwrap();
        assert_eq!(&run.keys[..], &["x".to_string()]);

        let pull = pull_rx.await.unwrap().unwrap();
        assert!(!pull.has_more);
        assert_eq!(pull.records.len(), 2);
        assert_eq!(pull.records[1].get("x").unwrap(), &Value::from(2));
        let summary = pull.summary.unwrap();
        assert_eq!(summary.result_available_after, Some(Duration::from_millis(1)));
        assert!(streams.lookup(ABSENT_QUERY_ID).is_none());
    }

    #[test]
    fn test_finished_stream_leaves_no_alias() {
        let streams = OpenStreams::default();
        let run = |qid: i64| {
            RunResponse::from_metadata(&metadata(&[
                ("fields", Value::from(vec!["n"])),
                ("qid", Value::from(qid)),
            ]))
            .unwrap()
        };

        streams.register(&run(2));
        assert_eq!(streams.lookup(ABSENT_QUERY_ID).unwrap().query_id, 2);
        streams.finish(2);
        assert!(streams.lookup(ABSENT_QUERY_ID).is_none());
        assert!(streams.lookup(2).is_none());

        // The alias follows the latest RUN; finishing an older one keeps it.
        streams.register(&run(0));
        streams.register(&run(1));
        streams.finish(0);
        assert_eq!(streams.lookup(ABSENT_QUERY_ID).unwrap().query_id, 1);
        streams.finish(ABSENT_QUERY_ID);
        assert!(streams.lookup(1).is_none());
        assert!(streams.lookup(ABSENT_QUERY_ID).is_none());
    }

    #[tokio::test]
    async fn test_pull_with_more_records_has_no_summary() {
        let streams = OpenStreams::default();
        let (tx, rx) = oneshot::channel();
        let handler = Box::new(PullHandler::new(tx, streams, 3));
        handler.on_success(metadata(&[("has_more", Value::from(true))]));

        let pull = rx.await.unwrap().unwrap();
        assert!(pull.has_more);
        assert!(pull.summary.is_none());
    }

    #[tokio::test]
    async fn test_commit_bookmark() {
        let (tx, rx) = oneshot::channel();
        Box::new(CommitHandler { reply: tx })
            .on_success(metadata(&[("bookmark", Value::from("FB:1"))]));
        assert_eq!(
            rx.await.unwrap().unwrap(),
            CommitResponse {
                bookmark: Some("FB:1".into())
            }
        );
    }

    #[tokio::test]
    async fn test_ignored_surfaces_as_failure() {
        let (tx, rx) = oneshot::channel();
        Box::new(CompletionHandler { reply: tx }).on_ignored(None);
        assert!(matches!(rx.await.unwrap(), Err(ClientError::Ignored(None))));
    }
}
