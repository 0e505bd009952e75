//! The typed value model shared by query parameters and results.

use crate::error::ValueError;
use crate::graph::{Node, Path, Relationship};
use crate::types::{IsoDuration, OffsetTime, Point, UnsupportedType, ZonedDateTime};
use bytes::Bytes;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Largest integer magnitude an `f64` represents exactly.
const F64_EXACT_INT: i64 = 1 << 53;
/// Largest integer magnitude an `f32` represents exactly.
const F32_EXACT_INT: i64 = 1 << 24;

/// A value that can be sent as a parameter or received in a result.
///
/// Values are immutable once built. Collections hold `Value`s, never raw
/// host types.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Bytes(Bytes),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Node(Node),
    Relationship(Relationship),
    Path(Path),
    Point(Point),
    Date(NaiveDate),
    Time(OffsetTime),
    LocalTime(NaiveTime),
    DateTime(ZonedDateTime),
    LocalDateTime(NaiveDateTime),
    Duration(IsoDuration),
    Unsupported(UnsupportedType),
}

impl Value {
    /// Name of the variant, as used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Boolean(_) => "BOOLEAN",
            Value::Integer(_) => "INTEGER",
            Value::Float(_) => "FLOAT",
            Value::Bytes(_) => "BYTES",
            Value::String(_) => "STRING",
            Value::List(_) => "LIST",
            Value::Map(_) => "MAP",
            Value::Node(_) => "NODE",
            Value::Relationship(_) => "RELATIONSHIP",
            Value::Path(_) => "PATH",
            Value::Point(_) => "POINT",
            Value::Date(_) => "DATE",
            Value::Time(_) => "TIME",
            Value::LocalTime(_) => "LOCAL_TIME",
            Value::DateTime(_) => "DATE_TIME",
            Value::LocalDateTime(_) => "LOCAL_DATE_TIME",
            Value::Duration(_) => "DURATION",
            Value::Unsupported(_) => "UNSUPPORTED",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    fn uncoercible(&self, to: &'static str) -> ValueError {
        ValueError::Uncoercible {
            from: self.type_name(),
            to,
        }
    }

    fn lossy(&self, to: &'static str) -> ValueError {
        ValueError::LossyCoercion {
            from: self.type_name(),
            to,
            value: self.to_string(),
        }
    }

    pub fn as_bool(&self) -> Result<bool, ValueError> {
        match self {
            Value::Boolean(b) => Ok(*b),
            _ => Err(self.uncoercible("bool")),
        }
    }

    /// Coerces to `i64`. Floats are accepted only when they hold an exact
    /// integer.
    pub fn as_i64(&self) -> Result<i64, ValueError> {
        match self {
            Value::Integer(i) => Ok(*i),
            Value::Float(f) => {
                // i64::MAX as f64 rounds up to 2^63, so the upper bound is exclusive.
                if f.is_finite() && f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64
                {
                    Ok(*f as i64)
                } else {
                    Err(self.lossy("i64"))
                }
            }
            _ => Err(self.uncoercible("i64")),
        }
    }

    pub fn as_i32(&self) -> Result<i32, ValueError> {
        let wide = self.as_i64().map_err(|e| match e {
            ValueError::LossyCoercion { .. } => self.lossy("i32"),
            _ => self.uncoercible("i32"),
        })?;
        i32::try_from(wide).map_err(|_| self.lossy("i32"))
    }

    /// Coerces to `f64`. Integers beyond 2^53 are rejected as lossy.
    pub fn as_f64(&self) -> Result<f64, ValueError> {
        match self {
            Value::Float(f) => Ok(*f),
            Value::Integer(i) => {
                if i.unsigned_abs() <= F64_EXACT_INT as u64 {
                    Ok(*i as f64)
                } else {
                    Err(self.lossy("f64"))
                }
            }
            _ => Err(self.uncoercible("f64")),
        }
    }

    pub fn as_f32(&self) -> Result<f32, ValueError> {
        match self {
            Value::Float(f) => {
                let narrow = *f as f32;
                if f.is_nan() || f64::from(narrow) == *f {
                    Ok(narrow)
                } else {
                    Err(self.lossy("f32"))
                }
            }
            Value::Integer(i) => {
                if i.unsigned_abs() <= F32_EXACT_INT as u64 {
                    Ok(*i as f32)
                } else {
                    Err(self.lossy("f32"))
                }
            }
            _ => Err(self.uncoercible("f32")),
        }
    }

    pub fn as_str(&self) -> Result<&str, ValueError> {
        match self {
            Value::String(s) => Ok(s),
            _ => Err(self.uncoercible("string")),
        }
    }

    pub fn as_bytes(&self) -> Result<&Bytes, ValueError> {
        match self {
            Value::Bytes(b) => Ok(b),
            _ => Err(self.uncoercible("bytes")),
        }
    }

    pub fn as_list(&self) -> Result<&[Value], ValueError> {
        match self {
            Value::List(l) => Ok(l),
            _ => Err(self.uncoercible("list")),
        }
    }

    pub fn as_map(&self) -> Result<&BTreeMap<String, Value>, ValueError> {
        match self {
            Value::Map(m) => Ok(m),
            _ => Err(self.uncoercible("map")),
        }
    }

    pub fn as_node(&self) -> Result<&Node, ValueError> {
        match self {
            Value::Node(n) => Ok(n),
            _ => Err(self.uncoercible("node")),
        }
    }

    pub fn as_relationship(&self) -> Result<&Relationship, ValueError> {
        match self {
            Value::Relationship(r) => Ok(r),
            _ => Err(self.uncoercible("relationship")),
        }
    }

    pub fn as_path(&self) -> Result<&Path, ValueError> {
        match self {
            Value::Path(p) => Ok(p),
            _ => Err(self.uncoercible("path")),
        }
    }

    pub fn as_point(&self) -> Result<Point, ValueError> {
        match self {
            Value::Point(p) => Ok(*p),
            _ => Err(self.uncoercible("point")),
        }
    }

    pub fn as_duration(&self) -> Result<IsoDuration, ValueError> {
        match self {
            Value::Duration(d) => Ok(*d),
            _ => Err(self.uncoercible("duration")),
        }
    }

    /// Coerces to a date. A local date-time narrows only when it is exactly
    /// midnight.
    pub fn as_date(&self) -> Result<NaiveDate, ValueError> {
        match self {
            Value::Date(d) => Ok(*d),
            Value::LocalDateTime(dt) => {
                if dt.time() == NaiveTime::MIN {
                    Ok(dt.date())
                } else {
                    Err(self.lossy("date"))
                }
            }
            _ => Err(self.uncoercible("date")),
        }
    }

    /// Coerces to a local time. An offset time narrows only at UTC.
    pub fn as_local_time(&self) -> Result<NaiveTime, ValueError> {
        match self {
            Value::LocalTime(t) => Ok(*t),
            Value::Time(t) => {
                if t.offset.local_minus_utc() == 0 {
                    Ok(t.time)
                } else {
                    Err(self.lossy("local time"))
                }
            }
            _ => Err(self.uncoercible("local time")),
        }
    }

    pub fn as_local_date_time(&self) -> Result<NaiveDateTime, ValueError> {
        match self {
            Value::LocalDateTime(dt) => Ok(*dt),
            Value::Date(d) => Ok(d.and_time(NaiveTime::MIN)),
            _ => Err(self.uncoercible("local date-time")),
        }
    }

    /// Coerces to an offset date-time. Zone-id values would lose the zone,
    /// so they are rejected as lossy.
    pub fn as_date_time(&self) -> Result<DateTime<FixedOffset>, ValueError> {
        match self {
            Value::DateTime(ZonedDateTime::Offset(dt)) => Ok(*dt),
            Value::DateTime(ZonedDateTime::ZoneId { .. }) => Err(self.lossy("date-time")),
            _ => Err(self.uncoercible("date-time")),
        }
    }

    /// Looks up `key` in a map value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Map(m) => m.get(key),
            _ => None,
        }
    }
}

fn write_string_literal(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    f.write_str("\"")?;
    for c in s.chars() {
        match c {
            '"' => f.write_str("\\\"")?,
            '\\' => f.write_str("\\\\")?,
            '\n' => f.write_str("\\n")?,
            c => write!(f, "{}", c)?,
        }
    }
    f.write_str("\"")
}

fn write_map(f: &mut fmt::Formatter<'_>, map: &BTreeMap<String, Value>) -> fmt::Result {
    f.write_str("{")?;
    for (i, (k, v)) in map.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}: {}", k, v)?;
    }
    f.write_str("}")
}

fn write_node(f: &mut fmt::Formatter<'_>, node: &Node) -> fmt::Result {
    f.write_str("(")?;
    for label in &node.labels {
        write!(f, ":{}", label)?;
    }
    if !node.properties.is_empty() {
        if !node.labels.is_empty() {
            f.write_str(" ")?;
        }
        write_map(f, &node.properties)?;
    }
    f.write_str(")")
}

fn write_relationship(f: &mut fmt::Formatter<'_>, rel: &Relationship) -> fmt::Result {
    write!(f, "[:{}", rel.rel_type)?;
    if !rel.properties.is_empty() {
        f.write_str(" ")?;
        write_map(f, &rel.properties)?;
    }
    f.write_str("]")
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{:?}", x),
            Value::Bytes(b) => {
                f.write_str("bytes(")?;
                for byte in b.iter() {
                    write!(f, "{:02x}", byte)?;
                }
                f.write_str(")")
            }
            Value::String(s) => write_string_literal(f, s),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            Value::Map(m) => write_map(f, m),
            Value::Node(n) => write_node(f, n),
            Value::Relationship(r) => write_relationship(f, r),
            Value::Path(p) => {
                if let Some(start) = p.start() {
                    write_node(f, start)?;
                }
                for (from, rel, to) in p.segments() {
                    if rel.starts_at(from) {
                        f.write_str("-")?;
                        write_relationship(f, rel)?;
                        f.write_str("->")?;
                    } else {
                        f.write_str("<-")?;
                        write_relationship(f, rel)?;
                        f.write_str("-")?;
                    }
                    write_node(f, to)?;
                }
                Ok(())
            }
            Value::Point(p) => write!(f, "{}", p),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::Time(t) => write!(f, "{}", t),
            Value::LocalTime(t) => write!(f, "{}", t.format("%H:%M:%S%.f")),
            Value::DateTime(dt) => write!(f, "{}", dt),
            Value::LocalDateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%S%.f")),
            Value::Duration(d) => write!(f, "{}", d),
            Value::Unsupported(u) => write!(f, "{}", u),
        }
    }
}

macro_rules! impl_from_int {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Self {
                    Value::Integer(i64::from(v))
                }
            }
        )*
    };
}

impl_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(f64::from(v))
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Bytes> for Value {
    fn from(v: Bytes) -> Self {
        Value::Bytes(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Bytes(Bytes::copy_from_slice(v))
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

impl<V: Into<Value>> From<BTreeMap<String, V>> for Value {
    fn from(v: BTreeMap<String, V>) -> Self {
        Value::Map(v.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

impl<V: Into<Value>> From<HashMap<String, V>> for Value {
    fn from(v: HashMap<String, V>) -> Self {
        Value::Map(v.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl From<Node> for Value {
    fn from(v: Node) -> Self {
        Value::Node(v)
    }
}

impl From<Relationship> for Value {
    fn from(v: Relationship) -> Self {
        Value::Relationship(v)
    }
}

impl From<Path> for Value {
    fn from(v: Path) -> Self {
        Value::Path(v)
    }
}

impl From<Point> for Value {
    fn from(v: Point) -> Self {
        Value::Point(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl From<OffsetTime> for Value {
    fn from(v: OffsetTime) -> Self {
        Value::Time(v)
    }
}

impl From<NaiveTime> for Value {
    fn from(v: NaiveTime) -> Self {
        Value::LocalTime(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::LocalDateTime(v)
    }
}

impl From<DateTime<FixedOffset>> for Value {
    fn from(v: DateTime<FixedOffset>) -> Self {
        Value::DateTime(ZonedDateTime::Offset(v))
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::DateTime(ZonedDateTime::Offset(v.fixed_offset()))
    }
}

impl From<ZonedDateTime> for Value {
    fn from(v: ZonedDateTime) -> Self {
        Value::DateTime(v)
    }
}

impl From<IsoDuration> for Value {
    fn from(v: IsoDuration) -> Self {
        Value::Duration(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Map(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lossy_float_to_int() {
        let err = Value::Float(1.5).as_i64().unwrap_err();
        assert!(matches!(err, ValueError::LossyCoercion { .. }));
        assert_eq!(Value::Float(2.0).as_i64(), Ok(2));
        assert_eq!(Value::Float(-7.0).as_i32(), Ok(-7));
        assert!(matches!(
            Value::Float(f64::NAN).as_i64(),
            Err(ValueError::LossyCoercion { .. })
        ));
        assert!(matches!(
            Value::Float(1e300).as_i64(),
            Err(ValueError::LossyCoercion { .. })
        ));
    }

    #[test]
    fn test_lossy_int_narrowing() {
        assert_eq!(Value::Integer(42).as_i32(), Ok(42));
        assert!(matches!(
            Value::Integer(1 << 40).as_i32(),
            Err(ValueError::LossyCoercion { .. })
        ));
        assert!(matches!(
            Value::Float(1.5).as_i32(),
            Err(ValueError::LossyCoercion { .. })
        ));
    }

    #[test]
    fn test_int_to_float() {
        assert_eq!(Value::Integer(3).as_f64(), Ok(3.0));
        assert_eq!(Value::Integer(1 << 53).as_f64(), Ok(9007199254740992.0));
        assert!(matches!(
            Value::Integer((1 << 53) + 1).as_f64(),
            Err(ValueError::LossyCoercion { .. })
        ));
        assert!(matches!(
            Value::Integer(i64::MIN).as_f64(),
            Err(ValueError::LossyCoercion { .. })
        ));
    }

    #[test]
    fn test_float_narrowing() {
        assert_eq!(Value::Float(0.5).as_f32(), Ok(0.5));
        assert!(matches!(
            Value::Float(0.1).as_f32(),
            Err(ValueError::LossyCoercion { .. })
        ));
        assert!(Value::Float(f64::NAN).as_f32().unwrap().is_nan());
    }

    #[test]
    fn test_uncoercible() {
        assert_eq!(
            Value::from("x").as_i64(),
            Err(ValueError::Uncoercible {
                from: "STRING",
                to: "i64"
            })
        );
        assert!(matches!(
            Value::Null.as_bool(),
            Err(ValueError::Uncoercible { .. })
        ));
    }

    #[test]
    fn test_temporal_coercion() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        let midnight = Value::LocalDateTime(date.and_hms_opt(0, 0, 0).unwrap());
        assert_eq!(midnight.as_date(), Ok(date));

        let noon = Value::LocalDateTime(date.and_hms_opt(12, 0, 0).unwrap());
        assert!(matches!(
            noon.as_date(),
            Err(ValueError::LossyCoercion { .. })
        ));

        assert_eq!(
            Value::Date(date).as_local_date_time(),
            Ok(date.and_hms_opt(0, 0, 0).unwrap())
        );

        let zoned = Value::DateTime(ZonedDateTime::ZoneId {
            utc: date.and_hms_opt(1, 0, 0).unwrap(),
            zone_id: "Europe/Paris".into(),
        });
        assert!(matches!(
            zoned.as_date_time(),
            Err(ValueError::LossyCoercion { .. })
        ));
    }

    #[test]
    fn test_display() {
        let mut map = BTreeMap::new();
        map.insert("a".to_string(), Value::from(1));
        map.insert("b".to_string(), Value::from(vec!["x", "y"]));
        assert_eq!(Value::Map(map).to_string(), "{a: 1, b: [\"x\", \"y\"]}");
        assert_eq!(Value::Float(2.0).to_string(), "2.0");
        assert_eq!(Value::Null.to_string(), "NULL");
        assert_eq!(Value::from(&b"\x01\xff"[..]).to_string(), "bytes(01ff)");

        let node = Node::new(1, "n1")
            .with_label("Person")
            .with_property("name", "Ann");
        assert_eq!(Value::Node(node).to_string(), "(:Person {name: \"Ann\"})");
    }

    #[test]
    fn test_path_display() {
        let a = Node::new(1, "a").with_label("A");
        let b = Node::new(2, "b").with_label("B");
        let c = Node::new(3, "c").with_label("C");
        let r1 = Relationship::new(10, "r1", "X").between(&a, &b);
        let r2 = Relationship::new(11, "r2", "Y").between(&c, &b);
        let path = Path::single(a).push(r1, b).push(r2, c);
        assert_eq!(Value::Path(path).to_string(), "(:A)-[:X]->(:B)<-[:Y]-(:C)");
    }

    #[test]
    fn test_from_json() {
        let v = Value::from(json!({"n": 1, "f": 1.5, "s": "x", "l": [true, null]}));
        assert_eq!(v.get("n"), Some(&Value::Integer(1)));
        assert_eq!(v.get("f"), Some(&Value::Float(1.5)));
        assert_eq!(
            v.get("l"),
            Some(&Value::List(vec![Value::Boolean(true), Value::Null]))
        );
    }

    #[test]
    fn test_from_option() {
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some("x")), Value::from("x"));
    }
}
