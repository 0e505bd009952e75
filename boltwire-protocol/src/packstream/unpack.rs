//! Value unpacking.

use super::marker::*;
use super::structs::value_from_struct;
use crate::error::ProtocolError;
use crate::value::Value;
use bytes::{Buf, Bytes};
use std::collections::BTreeMap;

/// Maximum nesting of lists, maps and structs.
pub const MAX_DEPTH: usize = 128;

/// Reads PackStream values out of a byte buffer.
///
/// Byte arrays are sliced out of the input without copying.
pub struct Unpacker {
    buf: Bytes,
    depth: usize,
}

impl Unpacker {
    pub fn new(buf: Bytes) -> Self {
        Self { buf, depth: 0 }
    }

    /// Number of unread bytes.
    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    fn ensure(&self, needed: usize) -> Result<(), ProtocolError> {
        if self.buf.remaining() < needed {
            return Err(ProtocolError::UnexpectedEof {
                needed: needed - self.buf.remaining(),
            });
        }
        Ok(())
    }

    fn read_u8(&mut self) -> Result<u8, ProtocolError> {
        self.ensure(1)?;
        Ok(self.buf.get_u8())
    }

    fn peek_u8(&self) -> Result<u8, ProtocolError> {
        self.ensure(1)?;
        Ok(self.buf[0])
    }

    fn read_u16(&mut self) -> Result<u16, ProtocolError> {
        self.ensure(2)?;
        Ok(self.buf.get_u16())
    }

    fn read_u32(&mut self) -> Result<u32, ProtocolError> {
        self.ensure(4)?;
        Ok(self.buf.get_u32())
    }

    fn read_slice(&mut self, len: usize) -> Result<Bytes, ProtocolError> {
        self.ensure(len)?;
        Ok(self.buf.split_to(len))
    }

    /// Reads a struct header, returning `(field_count, signature)`.
    pub fn unpack_struct_header(&mut self) -> Result<(usize, u8), ProtocolError> {
        let marker = self.read_u8()?;
        let size = if high_nibble(marker) == TINY_STRUCT {
            low_nibble(marker)
        } else {
            match marker {
                STRUCT_8 => usize::from(self.read_u8()?),
                STRUCT_16 => usize::from(self.read_u16()?),
                other => return Err(ProtocolError::NotAMessage(other)),
            }
        };
        let signature = self.read_u8()?;
        Ok((size, signature))
    }

    /// Reads one value.
    pub fn unpack(&mut self) -> Result<Value, ProtocolError> {
        let marker = self.read_u8()?;

        if is_tiny_int(marker) {
            return Ok(Value::Integer(i64::from(marker as i8)));
        }

        match high_nibble(marker) {
            TINY_STRING => return self.unpack_string(low_nibble(marker)),
            TINY_LIST => return self.unpack_list(low_nibble(marker)),
            TINY_MAP => return self.unpack_map(low_nibble(marker)),
            TINY_STRUCT => return self.unpack_struct(low_nibble(marker)),
            _ => {}
        }

        match marker {
            NULL => Ok(Value::Null),
            TRUE => Ok(Value::Boolean(true)),
            FALSE => Ok(Value::Boolean(false)),
            FLOAT_64 => {
                self.ensure(8)?;
                Ok(Value::Float(self.buf.get_f64()))
            }
            INT_8 => {
                self.ensure(1)?;
                Ok(Value::Integer(i64::from(self.buf.get_i8())))
            }
            INT_16 => {
                self.ensure(2)?;
                Ok(Value::Integer(i64::from(self.buf.get_i16())))
            }
            INT_32 => {
                self.ensure(4)?;
                Ok(Value::Integer(i64::from(self.buf.get_i32())))
            }
            INT_64 => {
                self.ensure(8)?;
                Ok(Value::Integer(self.buf.get_i64()))
            }
            BYTES_8 => {
                let len = usize::from(self.read_u8()?);
                Ok(Value::Bytes(self.read_slice(len)?))
            }
            BYTES_16 => {
                let len = usize::from(self.read_u16()?);
                Ok(Value::Bytes(self.read_slice(len)?))
            }
            BYTES_32 => {
                let len = self.read_u32()? as usize;
                Ok(Value::Bytes(self.read_slice(len)?))
            }
            STRING_8 => {
                let len = usize::from(self.read_u8()?);
                self.unpack_string(len)
            }
            STRING_16 => {
                let len = usize::from(self.read_u16()?);
                self.unpack_string(len)
            }
            STRING_32 => {
                let len = self.read_u32()? as usize;
                self.unpack_string(len)
            }
            LIST_8 => {
                let len = usize::from(self.read_u8()?);
                self.unpack_list(len)
            }
            LIST_16 => {
                let len = usize::from(self.read_u16()?);
                self.unpack_list(len)
            }
            LIST_32 => {
                let len = self.read_u32()? as usize;
                self.unpack_list(len)
            }
            LIST_STREAM => self.unpack_list_stream(),
            MAP_8 => {
                let len = usize::from(self.read_u8()?);
                self.unpack_map(len)
            }
            MAP_16 => {
                let len = usize::from(self.read_u16()?);
                self.unpack_map(len)
            }
            MAP_32 => {
                let len = self.read_u32()? as usize;
                self.unpack_map(len)
            }
            MAP_STREAM => self.unpack_map_stream(),
            STRUCT_8 => {
                let len = usize::from(self.read_u8()?);
                self.unpack_struct(len)
            }
            STRUCT_16 => {
                let len = usize::from(self.read_u16()?);
                self.unpack_struct(len)
            }
            other => Err(ProtocolError::UnknownMarker(other)),
        }
    }

    fn unpack_string(&mut self, len: usize) -> Result<Value, ProtocolError> {
        let raw = self.read_slice(len)?;
        let s = std::str::from_utf8(&raw).map_err(|_| ProtocolError::InvalidUtf8)?;
        Ok(Value::String(s.to_string()))
    }

    fn enter(&mut self) -> Result<(), ProtocolError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ProtocolError::TooDeep(MAX_DEPTH));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn unpack_key(&mut self) -> Result<String, ProtocolError> {
        match self.unpack()? {
            Value::String(s) => Ok(s),
            other => Err(ProtocolError::InvalidMapKey(other.type_name())),
        }
    }

    fn unpack_list(&mut self, len: usize) -> Result<Value, ProtocolError> {
        self.enter()?;
        // Every element takes at least one byte; cap the preallocation by that.
        let mut items = Vec::with_capacity(len.min(self.remaining()));
        for _ in 0..len {
            items.push(self.unpack()?);
        }
        self.leave();
        Ok(Value::List(items))
    }

    fn unpack_map(&mut self, len: usize) -> Result<Value, ProtocolError> {
        self.enter()?;
        let mut map = BTreeMap::new();
        for _ in 0..len {
            let key = self.unpack_key()?;
            let value = self.unpack()?;
            map.insert(key, value);
        }
        self.leave();
        Ok(Value::Map(map))
    }

    fn unpack_list_stream(&mut self) -> Result<Value, ProtocolError> {
        self.enter()?;
        let mut items = Vec::new();
        while self.peek_u8()? != END_OF_STREAM {
            items.push(self.unpack()?);
        }
        self.read_u8()?;
        self.leave();
        Ok(Value::List(items))
    }

    fn unpack_map_stream(&mut self) -> Result<Value, ProtocolError> {
        self.enter()?;
        let mut map = BTreeMap::new();
        while self.peek_u8()? != END_OF_STREAM {
            let key = self.unpack_key()?;
            let value = self.unpack()?;
            map.insert(key, value);
        }
        self.read_u8()?;
        self.leave();
        Ok(Value::Map(map))
    }

    fn unpack_struct(&mut self, len: usize) -> Result<Value, ProtocolError> {
        let signature = self.read_u8()?;
        let fields = self.unpack_fields(len)?;
        value_from_struct(signature, fields)
    }

    /// Reads `len` consecutive values, as found after a struct header.
    pub fn unpack_fields(&mut self, len: usize) -> Result<Vec<Value>, ProtocolError> {
        self.enter()?;
        let mut fields = Vec::with_capacity(len.min(self.remaining()));
        for _ in 0..len {
            fields.push(self.unpack()?);
        }
        self.leave();
        Ok(fields)
    }
}

/// Unpacks exactly one value from `bytes`, rejecting trailing data.
pub fn unpack(bytes: Bytes) -> Result<Value, ProtocolError> {
    let mut unpacker = Unpacker::new(bytes);
    let value = unpacker.unpack()?;
    if unpacker.remaining() > 0 {
        return Err(ProtocolError::TrailingBytes(unpacker.remaining()));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(bytes: &[u8]) -> Result<Value, ProtocolError> {
        unpack(Bytes::copy_from_slice(bytes))
    }

    #[test]
    fn test_unpack_tiny_ints() {
        assert_eq!(decode(&[0x00]), Ok(Value::Integer(0)));
        assert_eq!(decode(&[0x7F]), Ok(Value::Integer(127)));
        assert_eq!(decode(&[0xF0]), Ok(Value::Integer(-16)));
        assert_eq!(decode(&[0xFF]), Ok(Value::Integer(-1)));
    }

    #[test]
    fn test_unpack_wide_ints() {
        assert_eq!(decode(&[0xC8, 0x80]), Ok(Value::Integer(-128)));
        assert_eq!(decode(&[0xC9, 0x01, 0x00]), Ok(Value::Integer(256)));
        // Non-minimal encodings are still accepted.
        assert_eq!(
            decode(&[0xCB, 0, 0, 0, 0, 0, 0, 0, 1]),
            Ok(Value::Integer(1))
        );
    }

    #[test]
    fn test_unpack_streaming_list() {
        let bytes = [LIST_STREAM, 0x01, 0x02, 0x81, b'x', END_OF_STREAM];
        assert_eq!(
            decode(&bytes),
            Ok(Value::List(vec![
                Value::Integer(1),
                Value::Integer(2),
                Value::from("x"),
            ]))
        );
    }

    #[test]
    fn test_unpack_streaming_map() {
        let bytes = [MAP_STREAM, 0x81, b'a', 0x01, 0x81, b'b', 0xC3, END_OF_STREAM];
        let value = decode(&bytes).unwrap();
        assert_eq!(value.get("a"), Some(&Value::Integer(1)));
        assert_eq!(value.get("b"), Some(&Value::Boolean(true)));
    }

    #[test]
    fn test_unpack_unterminated_stream() {
        let bytes = [LIST_STREAM, 0x01];
        assert!(matches!(
            decode(&bytes),
            Err(ProtocolError::UnexpectedEof { .. })
        ));
    }

    #[test]
    fn test_unpack_struct_8() {
        // Date with the wide struct header.
        let bytes = [STRUCT_8, 1, b'D', 0x00];
        assert_eq!(
            decode(&bytes),
            Ok(Value::Date(chrono::NaiveDate::from_ymd_opt(1970, 1, 1).unwrap()))
        );
    }

    #[test]
    fn test_unpack_errors() {
        assert_eq!(decode(&[0xE0]), Err(ProtocolError::UnknownMarker(0xE0)));
        assert_eq!(decode(&[0xDF]), Err(ProtocolError::UnknownMarker(0xDF)));
        assert_eq!(
            decode(&[0x82, b'a']),
            Err(ProtocolError::UnexpectedEof { needed: 1 })
        );
        assert_eq!(decode(&[0x81, 0xFF]), Err(ProtocolError::InvalidUtf8));
        assert_eq!(
            decode(&[0xA1, 0x01, 0x01]),
            Err(ProtocolError::InvalidMapKey("INTEGER"))
        );
        assert_eq!(decode(&[0x01, 0x02]), Err(ProtocolError::TrailingBytes(1)));
    }

    #[test]
    fn test_unpack_depth_limit() {
        let mut bytes = vec![0x91; MAX_DEPTH + 1];
        bytes.push(0xC0);
        assert_eq!(decode(&bytes), Err(ProtocolError::TooDeep(MAX_DEPTH)));
    }

    #[test]
    fn test_unpack_bytes_zero_copy() {
        let input = Bytes::from_static(&[0xCC, 0x02, 0xAA, 0xBB]);
        let value = unpack(input).unwrap();
        assert_eq!(value, Value::Bytes(Bytes::from_static(&[0xAA, 0xBB])));
    }
}
