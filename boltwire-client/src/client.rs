//! High-level client API.
//!
//! [`Client`] wraps a [`Connection`] with the request sequences most callers
//! want: a pipelined auto-commit query, and an explicit transaction that
//! commits a batch of statements. Server failures are followed by a RESET so
//! the connection stays usable.

use crate::config::ClientConfig;
use crate::connection::{connect, Connection, Pending};
use crate::error::ClientError;
use crate::handlers::{PullResponse, RunResponse};
use crate::summary::ResultSummary;
use boltwire_protocol::{Metadata, Record, TransactionMetadata, Value, ABSENT_QUERY_ID};
use std::sync::Arc;

/// Records fetched per PULL unless configured otherwise.
pub const DEFAULT_FETCH_SIZE: i64 = 1000;

/// A query and its parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub query: String,
    pub parameters: Metadata,
}

impl Statement {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            parameters: Metadata::new(),
        }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }
}

/// A fully consumed result.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub keys: Arc<[String]>,
    pub records: Vec<Record>,
    pub summary: ResultSummary,
}

/// Results of a committed transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionResult {
    pub results: Vec<QueryResult>,
    /// Bookmark to chain causally dependent work.
    pub bookmark: Option<String>,
}

/// High-level client for a Bolt server.
pub struct Client {
    conn: Connection,
    fetch_size: i64,
}

impl Client {
    /// Connects and authenticates using `config`.
    pub async fn connect(config: &ClientConfig) -> Result<Self, ClientError> {
        let address = config.bolt_address()?;
        let plan = config.security_plan()?;
        let auth = config.auth_token()?;
        let conn = connect(
            &address,
            &plan,
            config.database.as_deref(),
            &auth,
            &config.connection_config(),
        )
        .await?;
        Ok(Self::from_connection(conn))
    }

    /// Wraps an already open connection.
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn,
            fetch_size: DEFAULT_FETCH_SIZE,
        }
    }

    /// Sets the PULL batch size. Non-positive values fetch everything at once.
    pub fn with_fetch_size(mut self, fetch_size: i64) -> Self {
        self.fetch_size = if fetch_size > 0 { fetch_size } else { -1 };
        self
    }

    /// Returns whether the client is connected.
    pub fn is_connected(&self) -> bool {
        self.conn.is_open()
    }

    /// Closes the connection.
    pub async fn close(&self) -> Result<(), ClientError> {
        self.conn.close().await
    }

    /// Returns the underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    // =========================================================================
    // Helper methods
    // =========================================================================

    /// Reads the remaining batches of a result.
    async fn drain(
        &self,
        run: Pending<RunResponse>,
        first: Pending<PullResponse>,
    ) -> Result<QueryResult, ClientError> {
        let run = run.await?;
        let mut batch = first.await?;
        let mut records = Vec::new();
        loop {
            records.append(&mut batch.records);
            if !batch.has_more {
                break;
            }
            batch = self.conn.pull(run.query_id, self.fetch_size).await?;
        }

        Ok(QueryResult {
            keys: run.keys,
            records,
            summary: batch.summary.unwrap_or_default(),
        })
    }

    /// Puts a connection left FAILED by a server error back into READY, or
    /// closes it when the error makes it unfit for reuse.
    async fn recover<T>(&self, result: Result<T, ClientError>) -> Result<T, ClientError> {
        let Err(e) = &result else {
            return result;
        };
        if !self.conn.is_open() {
            return result;
        }

        if e.is_fatal() {
            tracing::warn!("[{}] Closing after failure: {}", self.conn.address(), e);
            if let Err(close) = self.conn.close().await {
                tracing::warn!("[{}] Close failed: {}", self.conn.address(), close);
            }
        } else {
            tracing::debug!("[{}] Resetting after failure: {}", self.conn.address(), e);
            if let Err(reset) = self.conn.reset(true).await {
                tracing::warn!("[{}] Reset failed: {}", self.conn.address(), reset);
            }
        }
        result
    }

    // =========================================================================
    // Query operations
    // =========================================================================

    /// Runs one statement in an implicit transaction and consumes its result.
    pub async fn query(
        &self,
        statement: Statement,
        tx: &TransactionMetadata,
    ) -> Result<QueryResult, ClientError> {
        let run = self
            .conn
            .run_auto_commit(statement.query, statement.parameters, tx, false);
        let pull = self.conn.pull(ABSENT_QUERY_ID, self.fetch_size);
        let result = self.drain(run, pull).await;
        self.recover(result).await
    }

    /// Runs the statements in one explicit transaction and commits.
    ///
    /// Any failure rolls the transaction back through RESET.
    pub async fn transaction(
        &self,
        tx: &TransactionMetadata,
        statements: Vec<Statement>,
    ) -> Result<TransactionResult, ClientError> {
        let result = self.run_transaction(tx, statements).await;
        self.recover(result).await
    }

    async fn run_transaction(
        &self,
        tx: &TransactionMetadata,
        statements: Vec<Statement>,
    ) -> Result<TransactionResult, ClientError> {
        let begin = self.conn.begin_transaction(tx, false);
        let mut results = Vec::with_capacity(statements.len());
        let mut begun = Some(begin);
        for statement in statements {
            let run = self.conn.run(statement.query, statement.parameters, false);
            let pull = self.conn.pull(ABSENT_QUERY_ID, self.fetch_size);
            if let Some(begin) = begun.take() {
                begin.await?;
            }
            results.push(self.drain(run, pull).await?);
        }
        let commit = self.conn.commit();
        if let Some(begin) = begun {
            begin.await?;
        }
        let commit = commit.await?;

        Ok(TransactionResult {
            results,
            bookmark: commit.bookmark,
        })
    }

    /// Round-trips a RESET.
    pub async fn ping(&self) -> Result<(), ClientError> {
        self.conn.reset(true).await
    }
}
