//! Encoder and decoder for chunked messages.

use crate::chunk::{read_chunk, write_chunked, Chunk};
use crate::error::ProtocolError;
use crate::message::{Request, Response};
use crate::DEFAULT_MAX_MESSAGE_SIZE;
use bytes::{Bytes, BytesMut};

/// Encodes messages into chunked wire form.
pub struct Encoder;

impl Encoder {
    /// Encodes a request and appends its chunks to `dst`.
    pub fn encode_request(request: &Request, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        let mut body = BytesMut::new();
        request.encode(&mut body)?;
        write_chunked(&body, dst);
        Ok(())
    }

    /// Encodes a response and appends its chunks to `dst`.
    pub fn encode_response(response: &Response, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        let mut body = BytesMut::new();
        response.encode(&mut body)?;
        write_chunked(&body, dst);
        Ok(())
    }
}

/// Reassembles messages from arbitrarily fragmented input.
///
/// Bytes of a message are only handed out once its end marker has arrived.
/// NOOP keep-alives between messages are dropped.
pub struct Decoder {
    buffer: BytesMut,
    message: BytesMut,
    max_message_size: usize,
}

impl Decoder {
    pub fn new() -> Self {
        Self::with_max_message_size(DEFAULT_MAX_MESSAGE_SIZE)
    }

    pub fn with_max_message_size(max_message_size: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(8192),
            message: BytesMut::new(),
            max_message_size,
        }
    }

    /// Appends data to the internal buffer.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Attempts to decode the next complete message body.
    pub fn decode_message(&mut self) -> Result<Option<Bytes>, ProtocolError> {
        loop {
            match read_chunk(&mut self.buffer, &mut self.message, self.max_message_size)? {
                None => return Ok(None),
                Some(Chunk::Data(_)) => continue,
                Some(Chunk::End) if self.message.is_empty() => continue,
                Some(Chunk::End) => return Ok(Some(self.message.split().freeze())),
            }
        }
    }

    /// Attempts to decode the next response.
    pub fn decode_response(&mut self) -> Result<Option<Response>, ProtocolError> {
        match self.decode_message()? {
            Some(body) => Response::decode(body).map(Some),
            None => Ok(None),
        }
    }

    /// Attempts to decode the next request.
    pub fn decode_request(&mut self) -> Result<Option<Request>, ProtocolError> {
        match self.decode_message()? {
            Some(body) => Request::decode(body).map(Some),
            None => Ok(None),
        }
    }

    /// Returns the number of bytes currently buffered, including chunks of
    /// an unfinished message.
    pub fn buffered(&self) -> usize {
        self.buffer.len() + self.message.len()
    }

    /// Clears the internal buffers.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.message.clear();
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}
