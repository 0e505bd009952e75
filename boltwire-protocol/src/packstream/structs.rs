//! Struct signatures and the mapping between struct fields and values.

use crate::error::ProtocolError;
use crate::graph::{Node, Path, Properties, Relationship};
use crate::types::{IsoDuration, OffsetTime, Point, UnsupportedType, ZonedDateTime};
use crate::value::Value;
use crate::version::ProtocolVersion;
use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

pub const NODE: u8 = b'N';
pub const RELATIONSHIP: u8 = b'R';
pub const UNBOUND_RELATIONSHIP: u8 = b'r';
pub const PATH: u8 = b'P';
pub const POINT_2D: u8 = b'X';
pub const POINT_3D: u8 = b'Y';
pub const DATE: u8 = b'D';
pub const TIME: u8 = b'T';
pub const LOCAL_TIME: u8 = b't';
pub const LOCAL_DATE_TIME: u8 = b'd';
pub const DATE_TIME: u8 = b'I';
pub const DATE_TIME_ZONE_ID: u8 = b'i';
pub const LEGACY_DATE_TIME: u8 = b'F';
pub const LEGACY_DATE_TIME_ZONE_ID: u8 = b'f';
pub const DURATION: u8 = b'E';
pub const UNSUPPORTED_TYPE: u8 = b'?';

/// `NaiveDate::num_days_from_ce` of 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i64 = 719_163;
const NANOS_PER_SECOND: i64 = 1_000_000_000;

pub(crate) fn epoch_days(date: NaiveDate) -> i64 {
    i64::from(date.num_days_from_ce()) - UNIX_EPOCH_DAYS_FROM_CE
}

pub(crate) fn nanos_of_day(time: NaiveTime) -> i64 {
    i64::from(time.num_seconds_from_midnight()) * NANOS_PER_SECOND + i64::from(time.nanosecond())
}

/// Seconds and nanoseconds since the epoch, treating `dt` as UTC.
pub(crate) fn epoch_parts(dt: NaiveDateTime) -> (i64, i64) {
    let utc = dt.and_utc();
    (utc.timestamp(), i64::from(utc.timestamp_subsec_nanos()))
}

fn invalid(name: &'static str, reason: impl Into<String>) -> ProtocolError {
    ProtocolError::InvalidStructField {
        name,
        reason: reason.into(),
    }
}

/// Sequential reader over a struct's fields.
struct Fields {
    name: &'static str,
    iter: std::vec::IntoIter<Value>,
}

impl Fields {
    fn new(
        name: &'static str,
        signature: u8,
        fields: Vec<Value>,
        expected: usize,
    ) -> Result<Self, ProtocolError> {
        if fields.len() != expected {
            return Err(ProtocolError::InvalidStructSize {
                name,
                signature,
                expected,
                actual: fields.len(),
            });
        }
        Ok(Self {
            name,
            iter: fields.into_iter(),
        })
    }

    fn next(&mut self) -> Result<Value, ProtocolError> {
        self.iter
            .next()
            .ok_or_else(|| invalid(self.name, "missing field"))
    }

    fn int(&mut self) -> Result<i64, ProtocolError> {
        match self.next()? {
            Value::Integer(i) => Ok(i),
            other => Err(invalid(
                self.name,
                format!("expected INTEGER, got {}", other.type_name()),
            )),
        }
    }

    fn float(&mut self) -> Result<f64, ProtocolError> {
        match self.next()? {
            Value::Float(f) => Ok(f),
            other => Err(invalid(
                self.name,
                format!("expected FLOAT, got {}", other.type_name()),
            )),
        }
    }

    fn string(&mut self) -> Result<String, ProtocolError> {
        match self.next()? {
            Value::String(s) => Ok(s),
            other => Err(invalid(
                self.name,
                format!("expected STRING, got {}", other.type_name()),
            )),
        }
    }

    fn map(&mut self) -> Result<Properties, ProtocolError> {
        match self.next()? {
            Value::Map(m) => Ok(m),
            other => Err(invalid(
                self.name,
                format!("expected MAP, got {}", other.type_name()),
            )),
        }
    }

    fn list(&mut self) -> Result<Vec<Value>, ProtocolError> {
        match self.next()? {
            Value::List(l) => Ok(l),
            other => Err(invalid(
                self.name,
                format!("expected LIST, got {}", other.type_name()),
            )),
        }
    }

    fn strings(&mut self) -> Result<Vec<String>, ProtocolError> {
        let name = self.name;
        self.list()?
            .into_iter()
            .map(|v| match v {
                Value::String(s) => Ok(s),
                other => Err(invalid(
                    name,
                    format!("expected STRING element, got {}", other.type_name()),
                )),
            })
            .collect()
    }

    fn i32(&mut self) -> Result<i32, ProtocolError> {
        let value = self.int()?;
        i32::try_from(value).map_err(|_| invalid(self.name, format!("{} out of range", value)))
    }
}

fn offset(name: &'static str, seconds: i64) -> Result<FixedOffset, ProtocolError> {
    i32::try_from(seconds)
        .ok()
        .and_then(FixedOffset::east_opt)
        .ok_or_else(|| invalid(name, format!("invalid offset {}", seconds)))
}

fn local_time(name: &'static str, nanos: i64) -> Result<NaiveTime, ProtocolError> {
    if !(0..86_400 * NANOS_PER_SECOND).contains(&nanos) {
        return Err(invalid(name, format!("nanos of day {} out of range", nanos)));
    }
    let secs = (nanos / NANOS_PER_SECOND) as u32;
    let sub = (nanos % NANOS_PER_SECOND) as u32;
    NaiveTime::from_num_seconds_from_midnight_opt(secs, sub)
        .ok_or_else(|| invalid(name, "invalid time of day"))
}

/// Resolves an epoch instant. `Ok(None)` means the instant is well formed
/// but outside the range chrono can represent.
fn utc_instant(
    name: &'static str,
    seconds: i64,
    nanos: i64,
) -> Result<Option<NaiveDateTime>, ProtocolError> {
    if !(0..NANOS_PER_SECOND).contains(&nanos) {
        return Err(invalid(name, format!("nanosecond {} out of range", nanos)));
    }
    Ok(DateTime::from_timestamp(seconds, nanos as u32).map(|dt| dt.naive_utc()))
}

/// Stands in for a temporal value beyond chrono's range. The raw fields are
/// kept so the value packs back to the same struct.
fn beyond_range(signature: u8, name: &str, fields: Vec<Value>) -> Value {
    Value::Unsupported(UnsupportedType {
        name: name.to_string(),
        signature,
        min_protocol_version: None,
        message: Some(format!("{} is outside the representable range", name)),
        fields,
    })
}

fn node(mut f: Fields) -> Result<Node, ProtocolError> {
    Ok(Node {
        id: f.int()?,
        labels: f.strings()?,
        properties: f.map()?,
        element_id: f.string()?,
    })
}

fn unbound_relationship(mut f: Fields) -> Result<Relationship, ProtocolError> {
    let id = f.int()?;
    let rel_type = f.string()?;
    let properties = f.map()?;
    let element_id = f.string()?;
    Ok(Relationship {
        id,
        element_id,
        start_node_id: -1,
        start_node_element_id: String::new(),
        end_node_id: -1,
        end_node_element_id: String::new(),
        rel_type,
        properties,
    })
}

fn path(mut f: Fields) -> Result<Path, ProtocolError> {
    let nodes = f
        .list()?
        .into_iter()
        .map(|v| match v {
            Value::Node(n) => Ok(n),
            other => Err(invalid("Path", format!("expected NODE, got {}", other.type_name()))),
        })
        .collect::<Result<Vec<_>, _>>()?;
    let rels = f
        .list()?
        .into_iter()
        .map(|v| match v {
            Value::Relationship(r) => Ok(r.to_unbound()),
            other => Err(invalid(
                "Path",
                format!("expected RELATIONSHIP, got {}", other.type_name()),
            )),
        })
        .collect::<Result<Vec<_>, _>>()?;
    let indices = f
        .list()?
        .into_iter()
        .map(|v| match v {
            Value::Integer(i) => Ok(i),
            other => Err(invalid("Path", format!("expected INTEGER, got {}", other.type_name()))),
        })
        .collect::<Result<Vec<_>, _>>()?;

    if indices.len() % 2 != 0 {
        return Err(invalid("Path", "index sequence must have even length"));
    }
    let start = nodes
        .first()
        .cloned()
        .ok_or_else(|| invalid("Path", "path has no nodes"))?;

    let mut walk = Path::single(start);
    for pair in indices.chunks_exact(2) {
        let (rel_index, node_index) = (pair[0], pair[1]);
        let rel = usize::try_from(rel_index.unsigned_abs())
            .ok()
            .and_then(|i| i.checked_sub(1))
            .and_then(|i| rels.get(i))
            .ok_or_else(|| invalid("Path", format!("relationship index {} out of range", rel_index)))?;
        let next = usize::try_from(node_index)
            .ok()
            .and_then(|i| nodes.get(i))
            .ok_or_else(|| invalid("Path", format!("node index {} out of range", node_index)))?;
        let prev = walk
            .end()
            .ok_or_else(|| invalid("Path", "path has no nodes"))?;
        let bound = if rel_index > 0 {
            rel.bind(prev, next)
        } else {
            rel.bind(next, prev)
        };
        walk = walk.push(bound, next.clone());
    }
    Ok(walk)
}

fn unsupported(signature: u8, name: &str, fields: Vec<Value>) -> Value {
    Value::Unsupported(UnsupportedType {
        name: name.to_string(),
        signature,
        min_protocol_version: None,
        message: None,
        fields,
    })
}

/// Unpacks the server's explicit "unsupported type" struct.
fn server_unsupported(fields: Vec<Value>) -> Result<Value, ProtocolError> {
    let raw = fields.clone();
    let mut f = Fields::new("UnsupportedType", UNSUPPORTED_TYPE, fields, 4)?;
    let name = f.string()?;
    let major = f.int()?;
    let minor = f.int()?;
    let extra = f.map()?;
    let min_protocol_version = match (u8::try_from(major), u8::try_from(minor)) {
        (Ok(major), Ok(minor)) => Some(ProtocolVersion::new(major, minor)),
        _ => None,
    };
    let message = match extra.get("message") {
        Some(Value::String(s)) => Some(s.clone()),
        _ => None,
    };
    Ok(Value::Unsupported(UnsupportedType {
        name,
        signature: UNSUPPORTED_TYPE,
        min_protocol_version,
        message,
        fields: raw,
    }))
}

/// Converts a decoded struct into its value.
///
/// Unrecognized signatures become [`Value::Unsupported`] rather than an
/// error, so newer servers can send types this engine does not know.
pub(crate) fn value_from_struct(signature: u8, fields: Vec<Value>) -> Result<Value, ProtocolError> {
    let value = match signature {
        NODE => Value::Node(node(Fields::new("Node", signature, fields, 4)?)?),
        RELATIONSHIP => {
            let mut f = Fields::new("Relationship", signature, fields, 8)?;
            Value::Relationship(Relationship {
                id: f.int()?,
                start_node_id: f.int()?,
                end_node_id: f.int()?,
                rel_type: f.string()?,
                properties: f.map()?,
                element_id: f.string()?,
                start_node_element_id: f.string()?,
                end_node_element_id: f.string()?,
            })
        }
        UNBOUND_RELATIONSHIP => Value::Relationship(unbound_relationship(Fields::new(
            "UnboundRelationship",
            signature,
            fields,
            4,
        )?)?),
        PATH => Value::Path(path(Fields::new("Path", signature, fields, 3)?)?),
        POINT_2D => {
            let mut f = Fields::new("Point2D", signature, fields, 3)?;
            let srid = u32::try_from(f.int()?).map_err(|_| invalid("Point2D", "invalid srid"))?;
            Value::Point(Point::new_2d(srid, f.float()?, f.float()?))
        }
        POINT_3D => {
            let mut f = Fields::new("Point3D", signature, fields, 4)?;
            let srid = u32::try_from(f.int()?).map_err(|_| invalid("Point3D", "invalid srid"))?;
            Value::Point(Point::new_3d(srid, f.float()?, f.float()?, f.float()?))
        }
        DATE => {
            let raw = fields.clone();
            let mut f = Fields::new("Date", signature, fields, 1)?;
            let days = f.int()?;
            let date = days
                .checked_add(UNIX_EPOCH_DAYS_FROM_CE)
                .and_then(|d| i32::try_from(d).ok())
                .and_then(NaiveDate::from_num_days_from_ce_opt);
            match date {
                Some(date) => Value::Date(date),
                None => beyond_range(signature, "Date", raw),
            }
        }
        TIME => {
            let mut f = Fields::new("Time", signature, fields, 2)?;
            let time = local_time("Time", f.int()?)?;
            let offset = offset("Time", f.int()?)?;
            Value::Time(OffsetTime::new(time, offset))
        }
        LOCAL_TIME => {
            let mut f = Fields::new("LocalTime", signature, fields, 1)?;
            Value::LocalTime(local_time("LocalTime", f.int()?)?)
        }
        LOCAL_DATE_TIME => {
            let raw = fields.clone();
            let mut f = Fields::new("LocalDateTime", signature, fields, 2)?;
            let seconds = f.int()?;
            let nanos = f.int()?;
            match utc_instant("LocalDateTime", seconds, nanos)? {
                Some(local) => Value::LocalDateTime(local),
                None => beyond_range(signature, "LocalDateTime", raw),
            }
        }
        DATE_TIME => {
            let raw = fields.clone();
            let mut f = Fields::new("DateTime", signature, fields, 3)?;
            let seconds = f.int()?;
            let nanos = f.int()?;
            let instant = utc_instant("DateTime", seconds, nanos)?;
            let offset = offset("DateTime", f.int()?)?;
            match instant {
                Some(utc) => Value::DateTime(ZonedDateTime::Offset(
                    utc.and_utc().with_timezone(&offset),
                )),
                None => beyond_range(signature, "DateTime", raw),
            }
        }
        DATE_TIME_ZONE_ID => {
            let raw = fields.clone();
            let mut f = Fields::new("DateTimeZoneId", signature, fields, 3)?;
            let seconds = f.int()?;
            let nanos = f.int()?;
            let instant = utc_instant("DateTimeZoneId", seconds, nanos)?;
            let zone_id = f.string()?;
            match instant {
                Some(utc) => Value::DateTime(ZonedDateTime::ZoneId { utc, zone_id }),
                None => beyond_range(signature, "DateTimeZoneId", raw),
            }
        }
        LEGACY_DATE_TIME | LEGACY_DATE_TIME_ZONE_ID => {
            unsupported(signature, "LegacyDateTime", fields)
        }
        DURATION => {
            let mut f = Fields::new("Duration", signature, fields, 4)?;
            Value::Duration(IsoDuration::new(f.int()?, f.int()?, f.int()?, f.i32()?))
        }
        UNSUPPORTED_TYPE => server_unsupported(fields)?,
        other => unsupported(other, &format!("Struct({:#04x})", other), fields),
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epoch_days() {
        let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
        assert_eq!(epoch_days(epoch), 0);
        assert_eq!(epoch_days(NaiveDate::from_ymd_opt(1969, 12, 31).unwrap()), -1);
        let decoded = value_from_struct(DATE, vec![Value::Integer(19_723)]).unwrap();
        assert_eq!(decoded, Value::Date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()));
    }

    #[test]
    fn test_wrong_field_count() {
        let err = value_from_struct(DATE, vec![]).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::InvalidStructSize {
                expected: 1,
                actual: 0,
                ..
            }
        ));
    }

    #[test]
    fn test_wrong_field_type() {
        let err = value_from_struct(LOCAL_TIME, vec![Value::from("noon")]).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidStructField { .. }));
    }

    #[test]
    fn test_unknown_signature_is_unsupported() {
        let value = value_from_struct(0x01, vec![Value::Integer(7)]).unwrap();
        match value {
            Value::Unsupported(u) => {
                assert_eq!(u.signature, 0x01);
                assert_eq!(u.fields, vec![Value::Integer(7)]);
                assert_eq!(u.min_protocol_version, None);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_legacy_date_time_is_unsupported() {
        let value = value_from_struct(
            LEGACY_DATE_TIME,
            vec![Value::Integer(0), Value::Integer(0), Value::Integer(0)],
        )
        .unwrap();
        assert_eq!(value.type_name(), "UNSUPPORTED");
    }

    #[test]
    fn test_server_unsupported_type() {
        let mut extra = Properties::new();
        extra.insert("message".into(), Value::from("needs vectors"));
        let value = value_from_struct(
            UNSUPPORTED_TYPE,
            vec![
                Value::from("Vector"),
                Value::Integer(6),
                Value::Integer(0),
                Value::Map(extra),
            ],
        )
        .unwrap();
        match value {
            Value::Unsupported(u) => {
                assert_eq!(u.name, "Vector");
                assert_eq!(u.min_protocol_version, Some(ProtocolVersion::new(6, 0)));
                assert_eq!(u.message.as_deref(), Some("needs vectors"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_path_bad_index() {
        let node = Value::Node(Node::new(1, "n1"));
        let err = value_from_struct(
            PATH,
            vec![
                Value::List(vec![node]),
                Value::List(vec![]),
                Value::List(vec![Value::Integer(1), Value::Integer(0)]),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidStructField { .. }));
    }

    #[test]
    fn test_dates_beyond_chrono_range() {
        // date('+999999999-12-31')
        let raw = vec![Value::Integer(365_241_780_471)];
        match value_from_struct(DATE, raw.clone()).unwrap() {
            Value::Unsupported(u) => {
                assert_eq!(u.signature, DATE);
                assert_eq!(u.name, "Date");
                assert_eq!(u.fields, raw);
            }
            other => panic!("unexpected {:?}", other),
        }

        let raw = vec![Value::Integer(31_556_889_864_403_199), Value::Integer(0)];
        let value = value_from_struct(LOCAL_DATE_TIME, raw.clone()).unwrap();
        assert!(matches!(&value, Value::Unsupported(u) if u.fields == raw));

        let raw = vec![
            Value::Integer(-31_557_014_135_596_800),
            Value::Integer(0),
            Value::Integer(3600),
        ];
        let value = value_from_struct(DATE_TIME, raw.clone()).unwrap();
        assert!(matches!(&value, Value::Unsupported(u) if u.signature == DATE_TIME));

        let raw = vec![
            Value::Integer(31_556_889_864_403_199),
            Value::Integer(0),
            Value::from("Europe/Paris"),
        ];
        let value = value_from_struct(DATE_TIME_ZONE_ID, raw).unwrap();
        assert_eq!(value.type_name(), "UNSUPPORTED");
    }

    #[test]
    fn test_malformed_instant_is_rejected() {
        let err = value_from_struct(
            LOCAL_DATE_TIME,
            vec![Value::Integer(0), Value::Integer(NANOS_PER_SECOND)],
        )
        .unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidStructField { .. }));

        let err = value_from_struct(
            DATE_TIME,
            vec![Value::Integer(i64::MAX), Value::Integer(0), Value::from("UTC")],
        )
        .unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidStructField { .. }));
    }

    #[test]
    fn test_time_out_of_range() {
        let err = value_from_struct(LOCAL_TIME, vec![Value::Integer(-1)]).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidStructField { .. }));
    }
}
