//! # boltwire-protocol
//!
//! Wire format of the Bolt graph database protocol.
//!
//! This crate provides:
//! - PackStream packing and unpacking of typed values
//! - Chunked message framing
//! - Request and response message types and their metadata maps
//! - Handshake words and version negotiation
//!
//! Nothing here performs I/O; everything is usable from any thread.

pub mod chunk;
pub mod codec;
pub mod error;
pub mod graph;
pub mod message;
pub mod metadata;
pub mod packstream;
pub mod record;
pub mod types;
pub mod value;
pub mod version;

pub use codec::{Decoder, Encoder};
pub use error::{HandshakeError, ProtocolError, ValueError};
pub use graph::{Node, Path, Relationship, UnboundRelationship};
pub use message::{Failure, Request, Response};
pub use metadata::{
    AccessMode, AuthToken, BoltAgent, HelloMetadata, Metadata, TransactionMetadata,
    TransactionType, ABSENT_QUERY_ID, FETCH_ALL,
};
pub use record::Record;
pub use types::{IsoDuration, OffsetTime, Point, UnsupportedType, ZonedDateTime};
pub use value::Value;
pub use version::{ProtocolVersion, VersionProposal};

/// Default port of a Bolt server.
pub const DEFAULT_PORT: u16 = 7687;

/// Default cap on the size of one reassembled inbound message (64 MiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;
