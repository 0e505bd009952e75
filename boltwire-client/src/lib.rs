//! # boltwire-client
//!
//! Client engine for the Bolt wire protocol.
//!
//! This crate provides:
//! - Plaintext or TLS transport with version negotiation
//! - Authenticated, pipelined connections driven by a single IO task
//! - A FIFO dispatch queue pairing responses with pending requests
//! - Result summaries and server error classification for retries
//! - YAML and environment configuration

pub mod address;
pub mod agent;
pub mod client;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod handshake;
pub mod retry;
pub mod security;
pub mod stream;
pub mod summary;
pub mod tls;

mod task;

#[cfg(test)]
mod testing;

pub use address::BoltAddress;
pub use client::{Client, QueryResult, Statement, TransactionResult};
pub use config::{ClientConfig, ConfigError};
pub use connection::{connect, Connection, ConnectionConfig, Pending};
pub use error::{ClientError, TransportErrorKind};
pub use handlers::{CommitResponse, DiscardResponse, HelloResponse, PullResponse, RunResponse};
pub use retry::{classify, ErrorClassification};
pub use security::{RevocationPolicy, SecurityPlan, TlsSettings};
pub use summary::{QueryType, ResultSummary, SummaryCounters};

pub use boltwire_protocol;
