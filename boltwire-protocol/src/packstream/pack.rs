//! Value packing.

use super::marker::*;
use super::structs::{self, epoch_days, epoch_parts, nanos_of_day};
use crate::error::ProtocolError;
use crate::graph::{Node, Path, Relationship};
use crate::types::ZonedDateTime;
use crate::value::Value;
use bytes::{BufMut, BytesMut};
use std::collections::BTreeMap;

/// Writes PackStream values into a buffer, always choosing the smallest
/// encoding.
pub struct Packer<'a> {
    buf: &'a mut BytesMut,
}

impl<'a> Packer<'a> {
    pub fn new(buf: &'a mut BytesMut) -> Self {
        Self { buf }
    }

    pub fn pack_null(&mut self) {
        self.buf.put_u8(NULL);
    }

    pub fn pack_bool(&mut self, value: bool) {
        self.buf.put_u8(if value { TRUE } else { FALSE });
    }

    pub fn pack_int(&mut self, value: i64) {
        if (TINY_INT_MIN..=TINY_INT_MAX).contains(&value) {
            self.buf.put_i8(value as i8);
        } else if i8::try_from(value).is_ok() {
            self.buf.put_u8(INT_8);
            self.buf.put_i8(value as i8);
        } else if i16::try_from(value).is_ok() {
            self.buf.put_u8(INT_16);
            self.buf.put_i16(value as i16);
        } else if i32::try_from(value).is_ok() {
            self.buf.put_u8(INT_32);
            self.buf.put_i32(value as i32);
        } else {
            self.buf.put_u8(INT_64);
            self.buf.put_i64(value);
        }
    }

    pub fn pack_float(&mut self, value: f64) {
        self.buf.put_u8(FLOAT_64);
        self.buf.put_f64(value);
    }

    pub fn pack_bytes(&mut self, value: &[u8]) -> Result<(), ProtocolError> {
        let len = value.len();
        if len <= u8::MAX as usize {
            self.buf.put_u8(BYTES_8);
            self.buf.put_u8(len as u8);
        } else if len <= u16::MAX as usize {
            self.buf.put_u8(BYTES_16);
            self.buf.put_u16(len as u16);
        } else if len <= u32::MAX as usize {
            self.buf.put_u8(BYTES_32);
            self.buf.put_u32(len as u32);
        } else {
            return Err(too_large("bytes", len));
        }
        self.buf.put_slice(value);
        Ok(())
    }

    pub fn pack_string(&mut self, value: &str) -> Result<(), ProtocolError> {
        self.pack_sized_header(value.len(), TINY_STRING, [STRING_8, STRING_16, STRING_32], "string")?;
        self.buf.put_slice(value.as_bytes());
        Ok(())
    }

    pub fn pack_list_header(&mut self, len: usize) -> Result<(), ProtocolError> {
        self.pack_sized_header(len, TINY_LIST, [LIST_8, LIST_16, LIST_32], "list")
    }

    pub fn pack_map_header(&mut self, len: usize) -> Result<(), ProtocolError> {
        self.pack_sized_header(len, TINY_MAP, [MAP_8, MAP_16, MAP_32], "map")
    }

    /// Writes a struct header. Only tiny structs (up to 15 fields) are
    /// produced; the wide forms are accepted when reading.
    pub fn pack_struct_header(&mut self, fields: usize, signature: u8) -> Result<(), ProtocolError> {
        if fields > TINY_SIZE_MAX {
            return Err(ProtocolError::TooLarge {
                kind: "struct",
                size: fields,
                max: TINY_SIZE_MAX,
            });
        }
        self.buf.put_u8(TINY_STRUCT | fields as u8);
        self.buf.put_u8(signature);
        Ok(())
    }

    fn pack_sized_header(
        &mut self,
        len: usize,
        tiny: u8,
        [m8, m16, m32]: [u8; 3],
        kind: &'static str,
    ) -> Result<(), ProtocolError> {
        if len <= TINY_SIZE_MAX {
            self.buf.put_u8(tiny | len as u8);
        } else if len <= u8::MAX as usize {
            self.buf.put_u8(m8);
            self.buf.put_u8(len as u8);
        } else if len <= u16::MAX as usize {
            self.buf.put_u8(m16);
            self.buf.put_u16(len as u16);
        } else if len <= u32::MAX as usize {
            self.buf.put_u8(m32);
            self.buf.put_u32(len as u32);
        } else {
            return Err(too_large(kind, len));
        }
        Ok(())
    }

    pub fn pack_list(&mut self, items: &[Value]) -> Result<(), ProtocolError> {
        self.pack_list_header(items.len())?;
        for item in items {
            self.pack(item)?;
        }
        Ok(())
    }

    pub fn pack_map(&mut self, map: &BTreeMap<String, Value>) -> Result<(), ProtocolError> {
        self.pack_map_header(map.len())?;
        for (key, value) in map {
            self.pack_string(key)?;
            self.pack(value)?;
        }
        Ok(())
    }

    fn pack_strings(&mut self, items: &[String]) -> Result<(), ProtocolError> {
        self.pack_list_header(items.len())?;
        for item in items {
            self.pack_string(item)?;
        }
        Ok(())
    }

    fn pack_node(&mut self, node: &Node) -> Result<(), ProtocolError> {
        self.pack_struct_header(4, structs::NODE)?;
        self.pack_int(node.id);
        self.pack_strings(&node.labels)?;
        self.pack_map(&node.properties)?;
        self.pack_string(&node.element_id)
    }

    fn pack_relationship(&mut self, rel: &Relationship) -> Result<(), ProtocolError> {
        self.pack_struct_header(8, structs::RELATIONSHIP)?;
        self.pack_int(rel.id);
        self.pack_int(rel.start_node_id);
        self.pack_int(rel.end_node_id);
        self.pack_string(&rel.rel_type)?;
        self.pack_map(&rel.properties)?;
        self.pack_string(&rel.element_id)?;
        self.pack_string(&rel.start_node_element_id)?;
        self.pack_string(&rel.end_node_element_id)
    }

    fn pack_path(&mut self, path: &Path) -> Result<(), ProtocolError> {
        let mut nodes: Vec<&Node> = Vec::new();
        let mut rels: Vec<&Relationship> = Vec::new();
        let mut indices: Vec<i64> = Vec::with_capacity(path.relationships.len() * 2);

        for node in &path.nodes {
            if !nodes.iter().any(|n| n.same_entity(node)) {
                nodes.push(node);
            }
        }
        for (from, rel, to) in path.segments() {
            let rel_pos = match rels
                .iter()
                .position(|r| r.id == rel.id && r.element_id == rel.element_id)
            {
                Some(pos) => pos,
                None => {
                    rels.push(rel);
                    rels.len() - 1
                }
            };
            let rel_index = rel_pos as i64 + 1;
            indices.push(if rel.starts_at(from) { rel_index } else { -rel_index });
            let node_pos = nodes.iter().position(|n| n.same_entity(to)).unwrap_or(0);
            indices.push(node_pos as i64);
        }

        self.pack_struct_header(3, structs::PATH)?;
        self.pack_list_header(nodes.len())?;
        for node in nodes {
            self.pack_node(node)?;
        }
        self.pack_list_header(rels.len())?;
        for rel in rels {
            self.pack_struct_header(4, structs::UNBOUND_RELATIONSHIP)?;
            self.pack_int(rel.id);
            self.pack_string(&rel.rel_type)?;
            self.pack_map(&rel.properties)?;
            self.pack_string(&rel.element_id)?;
        }
        self.pack_list_header(indices.len())?;
        for index in indices {
            self.pack_int(index);
        }
        Ok(())
    }

    /// Packs any value.
    pub fn pack(&mut self, value: &Value) -> Result<(), ProtocolError> {
        match value {
            Value::Null => self.pack_null(),
            Value::Boolean(b) => self.pack_bool(*b),
            Value::Integer(i) => self.pack_int(*i),
            Value::Float(f) => self.pack_float(*f),
            Value::Bytes(b) => self.pack_bytes(b)?,
            Value::String(s) => self.pack_string(s)?,
            Value::List(items) => self.pack_list(items)?,
            Value::Map(map) => self.pack_map(map)?,
            Value::Node(node) => self.pack_node(node)?,
            Value::Relationship(rel) => self.pack_relationship(rel)?,
            Value::Path(path) => self.pack_path(path)?,
            Value::Point(p) => match p.z {
                None => {
                    self.pack_struct_header(3, structs::POINT_2D)?;
                    self.pack_int(i64::from(p.srid));
                    self.pack_float(p.x);
                    self.pack_float(p.y);
                }
                Some(z) => {
                    self.pack_struct_header(4, structs::POINT_3D)?;
                    self.pack_int(i64::from(p.srid));
                    self.pack_float(p.x);
                    self.pack_float(p.y);
                    self.pack_float(z);
                }
            },
            Value::Date(d) => {
                self.pack_struct_header(1, structs::DATE)?;
                self.pack_int(epoch_days(*d));
            }
            Value::Time(t) => {
                self.pack_struct_header(2, structs::TIME)?;
                self.pack_int(nanos_of_day(t.time));
                self.pack_int(i64::from(t.offset.local_minus_utc()));
            }
            Value::LocalTime(t) => {
                self.pack_struct_header(1, structs::LOCAL_TIME)?;
                self.pack_int(nanos_of_day(*t));
            }
            Value::LocalDateTime(dt) => {
                let (seconds, nanos) = epoch_parts(*dt);
                self.pack_struct_header(2, structs::LOCAL_DATE_TIME)?;
                self.pack_int(seconds);
                self.pack_int(nanos);
            }
            Value::DateTime(ZonedDateTime::Offset(dt)) => {
                let (seconds, nanos) = epoch_parts(dt.naive_utc());
                self.pack_struct_header(3, structs::DATE_TIME)?;
                self.pack_int(seconds);
                self.pack_int(nanos);
                self.pack_int(i64::from(dt.offset().local_minus_utc()));
            }
            Value::DateTime(ZonedDateTime::ZoneId { utc, zone_id }) => {
                let (seconds, nanos) = epoch_parts(*utc);
                self.pack_struct_header(3, structs::DATE_TIME_ZONE_ID)?;
                self.pack_int(seconds);
                self.pack_int(nanos);
                self.pack_string(zone_id)?;
            }
            Value::Duration(d) => {
                self.pack_struct_header(4, structs::DURATION)?;
                self.pack_int(d.months);
                self.pack_int(d.days);
                self.pack_int(d.seconds);
                self.pack_int(i64::from(d.nanoseconds));
            }
            Value::Unsupported(u) => {
                self.pack_struct_header(u.fields.len(), u.signature)?;
                for field in &u.fields {
                    self.pack(field)?;
                }
            }
        }
        Ok(())
    }
}

fn too_large(kind: &'static str, size: usize) -> ProtocolError {
    ProtocolError::TooLarge {
        kind,
        size,
        max: u32::MAX as usize,
    }
}

/// Packs a single value into a fresh buffer.
pub fn pack(value: &Value) -> Result<BytesMut, ProtocolError> {
    let mut buf = BytesMut::new();
    Packer::new(&mut buf).pack(value)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packed(value: impl Into<Value>) -> Vec<u8> {
        pack(&value.into()).unwrap().to_vec()
    }

    #[test]
    fn test_pack_scalars() {
        assert_eq!(packed(Value::Null), vec![0xC0]);
        assert_eq!(packed(true), vec![0xC3]);
        assert_eq!(packed(false), vec![0xC2]);
        assert_eq!(
            packed(1.5),
            vec![0xC1, 0x3F, 0xF8, 0, 0, 0, 0, 0, 0]
        );
    }

    #[test]
    fn test_pack_int_widths() {
        assert_eq!(packed(1), vec![0x01]);
        assert_eq!(packed(127), vec![0x7F]);
        assert_eq!(packed(-16), vec![0xF0]);
        assert_eq!(packed(-17), vec![0xC8, 0xEF]);
        assert_eq!(packed(-128), vec![0xC8, 0x80]);
        assert_eq!(packed(128), vec![0xC9, 0x00, 0x80]);
        assert_eq!(packed(32768), vec![0xCA, 0x00, 0x00, 0x80, 0x00]);
        assert_eq!(
            packed(2_147_483_648i64),
            vec![0xCB, 0, 0, 0, 0, 0x80, 0, 0, 0]
        );
    }

    #[test]
    fn test_pack_strings() {
        assert_eq!(packed(""), vec![0x80]);
        assert_eq!(packed("a"), vec![0x81, b'a']);
        let s = "x".repeat(16);
        let bytes = packed(s.as_str());
        assert_eq!(&bytes[..2], &[0xD0, 16]);
        let s = "x".repeat(256);
        let bytes = packed(s.as_str());
        assert_eq!(&bytes[..3], &[0xD1, 0x01, 0x00]);
    }

    #[test]
    fn test_pack_collections() {
        assert_eq!(packed(Vec::<i64>::new()), vec![0x90]);
        assert_eq!(packed(vec![1, 2]), vec![0x92, 0x01, 0x02]);

        let mut map = BTreeMap::new();
        map.insert("n".to_string(), Value::from(1));
        assert_eq!(packed(map), vec![0xA1, 0x81, b'n', 0x01]);
    }

    #[test]
    fn test_pack_bytes() {
        assert_eq!(packed(&[1u8, 2, 3][..]), vec![0xCC, 3, 1, 2, 3]);
    }

    #[test]
    fn test_pack_struct_too_large() {
        let mut buf = BytesMut::new();
        let err = Packer::new(&mut buf).pack_struct_header(16, 0x01).unwrap_err();
        assert!(matches!(err, ProtocolError::TooLarge { kind: "struct", .. }));
    }

    #[test]
    fn test_pack_date() {
        let date = chrono::NaiveDate::from_ymd_opt(1970, 1, 2).unwrap();
        assert_eq!(packed(date), vec![0xB1, b'D', 0x01]);
    }
}
