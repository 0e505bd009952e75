//! Request and response messages.
//!
//! Every message is a PackStream struct: a header carrying the field count
//! and a one-byte signature, followed by the fields in a fixed order.

use crate::error::ProtocolError;
use crate::metadata::{stream_metadata, AuthToken, Metadata};
use crate::packstream::{Packer, Unpacker};
use crate::value::Value;
use bytes::{Bytes, BytesMut};
use std::fmt;

/// Message signatures.
pub mod signature {
    pub const HELLO: u8 = 0x01;
    pub const GOODBYE: u8 = 0x02;
    pub const RESET: u8 = 0x0F;
    pub const RUN: u8 = 0x10;
    pub const BEGIN: u8 = 0x11;
    pub const COMMIT: u8 = 0x12;
    pub const ROLLBACK: u8 = 0x13;
    pub const DISCARD: u8 = 0x2F;
    pub const PULL: u8 = 0x3F;
    pub const LOGON: u8 = 0x6A;

    pub const SUCCESS: u8 = 0x70;
    pub const RECORD: u8 = 0x71;
    pub const IGNORED: u8 = 0x7E;
    pub const FAILURE: u8 = 0x7F;
}

/// A message sent by the client.
#[derive(Clone, PartialEq)]
pub enum Request {
    Hello { extra: Metadata },
    Logon { auth: AuthToken },
    Begin { extra: Metadata },
    Run {
        query: String,
        parameters: Metadata,
        extra: Metadata,
    },
    Pull { n: i64, qid: i64 },
    Discard { n: i64, qid: i64 },
    Commit,
    Rollback,
    Reset,
    Goodbye,
}

impl Request {
    pub fn signature(&self) -> u8 {
        match self {
            Request::Hello { .. } => signature::HELLO,
            Request::Logon { .. } => signature::LOGON,
            Request::Begin { .. } => signature::BEGIN,
            Request::Run { .. } => signature::RUN,
            Request::Pull { .. } => signature::PULL,
            Request::Discard { .. } => signature::DISCARD,
            Request::Commit => signature::COMMIT,
            Request::Rollback => signature::ROLLBACK,
            Request::Reset => signature::RESET,
            Request::Goodbye => signature::GOODBYE,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Request::Hello { .. } => "HELLO",
            Request::Logon { .. } => "LOGON",
            Request::Begin { .. } => "BEGIN",
            Request::Run { .. } => "RUN",
            Request::Pull { .. } => "PULL",
            Request::Discard { .. } => "DISCARD",
            Request::Commit => "COMMIT",
            Request::Rollback => "ROLLBACK",
            Request::Reset => "RESET",
            Request::Goodbye => "GOODBYE",
        }
    }

    /// The struct fields, in wire order.
    pub fn fields(&self) -> Vec<Value> {
        match self {
            Request::Hello { extra } | Request::Begin { extra } => vec![Value::Map(extra.clone())],
            Request::Logon { auth } => vec![Value::Map(auth.to_map())],
            Request::Run {
                query,
                parameters,
                extra,
            } => vec![
                Value::from(query.as_str()),
                Value::Map(parameters.clone()),
                Value::Map(extra.clone()),
            ],
            Request::Pull { n, qid } | Request::Discard { n, qid } => {
                vec![Value::Map(stream_metadata(*n, *qid))]
            }
            Request::Commit | Request::Rollback | Request::Reset | Request::Goodbye => Vec::new(),
        }
    }

    /// Appends the packed message (unchunked) to `dst`.
    pub fn encode(&self, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        let fields = self.fields();
        let mut packer = Packer::new(dst);
        packer.pack_struct_header(fields.len(), self.signature())?;
        for field in &fields {
            packer.pack(field)?;
        }
        Ok(())
    }

    /// Decodes a request. Used by servers and test doubles; a client never
    /// receives requests.
    pub fn decode(bytes: Bytes) -> Result<Request, ProtocolError> {
        let (signature, fields) = unpack_message(bytes)?;
        let mut fields = MessageFields::new(signature, fields);
        let request = match signature {
            signature::HELLO => Request::Hello {
                extra: fields.expect(1)?.map()?,
            },
            signature::LOGON => {
                let map = fields.expect(1)?.map()?;
                Request::Logon {
                    auth: auth_from_map(map)?,
                }
            }
            signature::BEGIN => Request::Begin {
                extra: fields.expect(1)?.map()?,
            },
            signature::RUN => {
                fields.expect(3)?;
                Request::Run {
                    query: fields.string()?,
                    parameters: fields.map()?,
                    extra: fields.map()?,
                }
            }
            signature::PULL | signature::DISCARD => {
                let extra = fields.expect(1)?.map()?;
                let n = extra.get("n").and_then(|v| v.as_i64().ok()).ok_or_else(|| {
                    ProtocolError::InvalidMetadata("missing record budget 'n'".into())
                })?;
                let qid = extra
                    .get("qid")
                    .and_then(|v| v.as_i64().ok())
                    .unwrap_or(crate::metadata::ABSENT_QUERY_ID);
                if signature == signature::PULL {
                    Request::Pull { n, qid }
                } else {
                    Request::Discard { n, qid }
                }
            }
            signature::COMMIT => {
                fields.expect(0)?;
                Request::Commit
            }
            signature::ROLLBACK => {
                fields.expect(0)?;
                Request::Rollback
            }
            signature::RESET => {
                fields.expect(0)?;
                Request::Reset
            }
            signature::GOODBYE => {
                fields.expect(0)?;
                Request::Goodbye
            }
            other => return Err(ProtocolError::UnknownMessage(other)),
        };
        Ok(request)
    }
}

fn auth_from_map(mut map: Metadata) -> Result<AuthToken, ProtocolError> {
    let mut take_string = |key: &str| match map.remove(key) {
        Some(Value::String(s)) => Some(s),
        _ => None,
    };
    let scheme = take_string("scheme")
        .ok_or_else(|| ProtocolError::InvalidMetadata("missing auth scheme".into()))?;
    let principal = take_string("principal");
    let credentials = take_string("credentials");
    let realm = take_string("realm");
    let mut token = AuthToken::custom(scheme, principal, credentials, realm);
    if let Some(Value::Map(parameters)) = map.remove("parameters") {
        token.parameters = parameters;
    }
    Ok(token)
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Request::Hello { extra } => write!(f, "HELLO {:?}", extra),
            Request::Logon { auth } => write!(f, "LOGON {:?}", auth),
            Request::Begin { extra } => write!(f, "BEGIN {:?}", extra),
            Request::Run {
                query,
                parameters,
                extra,
            } => write!(f, "RUN {:?} {:?} {:?}", query, parameters, extra),
            Request::Pull { n, qid } => write!(f, "PULL n={} qid={}", n, qid),
            Request::Discard { n, qid } => write!(f, "DISCARD n={} qid={}", n, qid),
            other => f.write_str(other.name()),
        }
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Error details carried by a FAILURE message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub code: String,
    pub message: String,
}

/// A message sent by the server.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Success(Metadata),
    Record(Vec<Value>),
    Ignored,
    Failure(Failure),
}

impl Response {
    pub fn name(&self) -> &'static str {
        match self {
            Response::Success(_) => "SUCCESS",
            Response::Record(_) => "RECORD",
            Response::Ignored => "IGNORED",
            Response::Failure(_) => "FAILURE",
        }
    }

    /// Decodes one complete, de-chunked message.
    ///
    /// An unknown signature or malformed body is an error; the connection
    /// cannot continue after either.
    pub fn decode(bytes: Bytes) -> Result<Response, ProtocolError> {
        let (signature, fields) = unpack_message(bytes)?;
        let mut fields = MessageFields::new(signature, fields);
        let response = match signature {
            signature::SUCCESS => Response::Success(fields.expect(1)?.map()?),
            signature::RECORD => Response::Record(fields.expect(1)?.list()?),
            signature::IGNORED => {
                fields.expect(0)?;
                Response::Ignored
            }
            signature::FAILURE => {
                let mut map = fields.expect(1)?.map()?;
                let mut take = |key: &str| match map.remove(key) {
                    Some(Value::String(s)) => Ok(s),
                    _ => Err(ProtocolError::InvalidMetadata(format!(
                        "FAILURE without '{}'",
                        key
                    ))),
                };
                Response::Failure(Failure {
                    code: take("code")?,
                    message: take("message")?,
                })
            }
            other => return Err(ProtocolError::UnknownMessage(other)),
        };
        Ok(response)
    }

    /// Appends the packed message (unchunked) to `dst`.
    pub fn encode(&self, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        let mut packer = Packer::new(dst);
        match self {
            Response::Success(metadata) => {
                packer.pack_struct_header(1, signature::SUCCESS)?;
                packer.pack_map(metadata)?;
            }
            Response::Record(values) => {
                packer.pack_struct_header(1, signature::RECORD)?;
                packer.pack_list(values)?;
            }
            Response::Ignored => packer.pack_struct_header(0, signature::IGNORED)?,
            Response::Failure(failure) => {
                packer.pack_struct_header(1, signature::FAILURE)?;
                packer.pack_map_header(2)?;
                packer.pack_string("code")?;
                packer.pack_string(&failure.code)?;
                packer.pack_string("message")?;
                packer.pack_string(&failure.message)?;
            }
        }
        Ok(())
    }
}

fn unpack_message(bytes: Bytes) -> Result<(u8, Vec<Value>), ProtocolError> {
    let mut unpacker = Unpacker::new(bytes);
    let (size, signature) = unpacker.unpack_struct_header()?;
    let fields = unpacker.unpack_fields(size)?;
    if unpacker.remaining() > 0 {
        return Err(ProtocolError::TrailingBytes(unpacker.remaining()));
    }
    Ok((signature, fields))
}

/// Sequential, typed access to a message's fields.
struct MessageFields {
    signature: u8,
    iter: std::vec::IntoIter<Value>,
    len: usize,
}

impl MessageFields {
    fn new(signature: u8, fields: Vec<Value>) -> Self {
        Self {
            signature,
            len: fields.len(),
            iter: fields.into_iter(),
        }
    }

    fn expect(&mut self, count: usize) -> Result<&mut Self, ProtocolError> {
        if self.len != count {
            return Err(ProtocolError::InvalidStructSize {
                name: "message",
                signature: self.signature,
                expected: count,
                actual: self.len,
            });
        }
        Ok(self)
    }

    fn next(&mut self, expected: &'static str) -> Result<Value, ProtocolError> {
        self.iter.next().ok_or_else(|| {
            ProtocolError::InvalidMetadata(format!("missing {} field", expected))
        })
    }

    fn wrong(&self, expected: &str, got: &Value) -> ProtocolError {
        ProtocolError::InvalidMetadata(format!(
            "message {:#04x}: expected {}, got {}",
            self.signature,
            expected,
            got.type_name()
        ))
    }

    fn map(&mut self) -> Result<Metadata, ProtocolError> {
        match self.next("MAP")? {
            Value::Map(m) => Ok(m),
            other => Err(self.wrong("MAP", &other)),
        }
    }

    fn list(&mut self) -> Result<Vec<Value>, ProtocolError> {
        match self.next("LIST")? {
            Value::List(l) => Ok(l),
            other => Err(self.wrong("LIST", &other)),
        }
    }

    fn string(&mut self) -> Result<String, ProtocolError> {
        match self.next("STRING")? {
            Value::String(s) => Ok(s),
            other => Err(self.wrong("STRING", &other)),
        }
    }
}
