//! Chunked message framing.
//!
//! A message is split into chunks, each with a 2-byte big-endian length
//! prefix, and terminated by a zero-length chunk:
//!
//! ```text
//! +---------+-----------------+---------+-----------------+---------+
//! | len (2) | payload (len)   | len (2) | payload (len)   | 0x0000  |
//! +---------+-----------------+---------+-----------------+---------+
//! ```
//!
//! A lone `0x0000` with no preceding chunks is a NOOP keep-alive.

use crate::error::ProtocolError;
use bytes::{Buf, BufMut, BytesMut};

/// Largest payload a single chunk can carry.
pub const MAX_CHUNK_SIZE: usize = u16::MAX as usize;

/// Size of a chunk length prefix.
pub const CHUNK_HEADER_SIZE: usize = 2;

/// Zero-length chunk ending a message.
pub const END_MARKER: [u8; 2] = [0x00, 0x00];

/// Writes `message` as a sequence of chunks followed by the end marker.
pub fn write_chunked(message: &[u8], dst: &mut BytesMut) {
    let chunks = message.len().div_ceil(MAX_CHUNK_SIZE);
    dst.reserve(message.len() + chunks * CHUNK_HEADER_SIZE + END_MARKER.len());
    for chunk in message.chunks(MAX_CHUNK_SIZE) {
        dst.put_u16(chunk.len() as u16);
        dst.put_slice(chunk);
    }
    dst.put_slice(&END_MARKER);
}

/// Outcome of reading one chunk from a buffer.
#[derive(Debug, PartialEq, Eq)]
pub enum Chunk {
    /// A payload chunk of the given size was appended to the message.
    Data(usize),
    /// The end marker was consumed.
    End,
}

/// Moves one complete chunk from `src` into `message`.
///
/// Returns `Ok(None)` without consuming anything if the chunk is incomplete,
/// so a partial chunk never reaches `message`.
pub fn read_chunk(
    src: &mut BytesMut,
    message: &mut BytesMut,
    max_message_size: usize,
) -> Result<Option<Chunk>, ProtocolError> {
    if src.len() < CHUNK_HEADER_SIZE {
        return Ok(None);
    }

    let len = usize::from(u16::from_be_bytes([src[0], src[1]]));
    if len == 0 {
        src.advance(CHUNK_HEADER_SIZE);
        return Ok(Some(Chunk::End));
    }

    if src.len() < CHUNK_HEADER_SIZE + len {
        return Ok(None);
    }

    let size = message.len() + len;
    if size > max_message_size {
        return Err(ProtocolError::MessageTooLarge {
            size,
            max: max_message_size,
        });
    }

    src.advance(CHUNK_HEADER_SIZE);
    message.extend_from_slice(&src.split_to(len));
    Ok(Some(Chunk::Data(len)))
}
