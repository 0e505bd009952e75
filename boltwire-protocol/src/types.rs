//! Spatial and temporal value types that have no direct chrono equivalent.

use crate::value::Value;
use crate::version::ProtocolVersion;
use chrono::{DateTime, FixedOffset, NaiveDateTime, NaiveTime};
use std::fmt;

/// A 2D or 3D point in a coordinate reference system.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub srid: u32,
    pub x: f64,
    pub y: f64,
    pub z: Option<f64>,
}

impl Point {
    /// WGS-84 geographic, 2D.
    pub const WGS84: u32 = 4326;
    /// WGS-84 geographic, 3D.
    pub const WGS84_3D: u32 = 4979;
    /// Cartesian, 2D.
    pub const CARTESIAN: u32 = 7203;
    /// Cartesian, 3D.
    pub const CARTESIAN_3D: u32 = 9157;

    pub fn new_2d(srid: u32, x: f64, y: f64) -> Self {
        Self { srid, x, y, z: None }
    }

    pub fn new_3d(srid: u32, x: f64, y: f64, z: f64) -> Self {
        Self {
            srid,
            x,
            y,
            z: Some(z),
        }
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "point({{srid: {}, x: {:?}, y: {:?}", self.srid, self.x, self.y)?;
        if let Some(z) = self.z {
            write!(f, ", z: {:?}", z)?;
        }
        f.write_str("})")
    }
}

/// A time of day with a fixed UTC offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffsetTime {
    pub time: NaiveTime,
    pub offset: FixedOffset,
}

impl OffsetTime {
    pub fn new(time: NaiveTime, offset: FixedOffset) -> Self {
        Self { time, offset }
    }
}

impl fmt::Display for OffsetTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.time.format("%H:%M:%S%.f"), self.offset)
    }
}

/// A zoned instant.
///
/// Offset-based values map to chrono directly. Values tied to a named zone
/// keep the UTC instant and the zone id, since resolving the id needs a
/// timezone database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ZonedDateTime {
    Offset(DateTime<FixedOffset>),
    ZoneId {
        utc: NaiveDateTime,
        zone_id: String,
    },
}

impl ZonedDateTime {
    /// The instant in UTC.
    pub fn utc(&self) -> NaiveDateTime {
        match self {
            ZonedDateTime::Offset(dt) => dt.naive_utc(),
            ZonedDateTime::ZoneId { utc, .. } => *utc,
        }
    }
}

impl fmt::Display for ZonedDateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ZonedDateTime::Offset(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%S%.f%:z")),
            ZonedDateTime::ZoneId { utc, zone_id } => {
                write!(f, "{}Z[{}]", utc.format("%Y-%m-%dT%H:%M:%S%.f"), zone_id)
            }
        }
    }
}

/// A temporal amount with independent month, day and second components.
///
/// The components are not normalized: one month is not thirty days.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct IsoDuration {
    pub months: i64,
    pub days: i64,
    pub seconds: i64,
    pub nanoseconds: i32,
}

impl IsoDuration {
    pub fn new(months: i64, days: i64, seconds: i64, nanoseconds: i32) -> Self {
        Self {
            months,
            days,
            seconds,
            nanoseconds,
        }
    }
}

impl fmt::Display for IsoDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}M{}DT", self.months, self.days)?;
        let total_nanos = i128::from(self.seconds) * 1_000_000_000 + i128::from(self.nanoseconds);
        let sign = if total_nanos < 0 { "-" } else { "" };
        let abs = total_nanos.unsigned_abs();
        let secs = abs / 1_000_000_000;
        let frac = abs % 1_000_000_000;
        if frac == 0 {
            write!(f, "{}{}S", sign, secs)
        } else {
            let frac = format!("{:09}", frac);
            write!(f, "{}{}.{}S", sign, secs, frac.trim_end_matches('0'))
        }
    }
}

/// Placeholder for a value the server sent in a form this engine cannot
/// represent.
#[derive(Debug, Clone, PartialEq)]
pub struct UnsupportedType {
    /// Type name, as reported by the server or derived from the signature.
    pub name: String,
    /// Struct signature the value arrived with.
    pub signature: u8,
    /// Minimum protocol version needed to receive the value, if known.
    pub min_protocol_version: Option<ProtocolVersion>,
    /// Human-readable explanation, if the server supplied one.
    pub message: Option<String>,
    /// Raw struct fields.
    pub fields: Vec<Value>,
}

impl fmt::Display for UnsupportedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<unsupported {}", self.name)?;
        if let Some(v) = self.min_protocol_version {
            write!(f, " (requires protocol {})", v)?;
        }
        f.write_str(">")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_display() {
        assert_eq!(IsoDuration::new(1, 2, 3, 0).to_string(), "P1M2DT3S");
        assert_eq!(
            IsoDuration::new(0, 0, 1, 500_000_000).to_string(),
            "P0M0DT1.5S"
        );
        assert_eq!(
            IsoDuration::new(0, 0, -1, 500_000_000).to_string(),
            "P0M0DT-0.5S"
        );
    }

    #[test]
    fn test_point_display() {
        let p = Point::new_2d(Point::CARTESIAN, 1.0, 2.5);
        assert_eq!(p.to_string(), "point({srid: 7203, x: 1.0, y: 2.5})");
        let p = Point::new_3d(Point::WGS84_3D, 1.0, 2.0, 3.0);
        assert!(p.to_string().ends_with("z: 3.0})"));
    }

    #[test]
    fn test_offset_time_display() {
        let t = OffsetTime::new(
            NaiveTime::from_hms_opt(10, 30, 0).unwrap(),
            FixedOffset::east_opt(3600).unwrap(),
        );
        assert_eq!(t.to_string(), "10:30:00+01:00");
    }

    #[test]
    fn test_zoned_display() {
        let utc = chrono::NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        let z = ZonedDateTime::ZoneId {
            utc,
            zone_id: "Europe/Berlin".into(),
        };
        assert_eq!(z.to_string(), "2024-03-01T12:00:00Z[Europe/Berlin]");
        assert_eq!(z.utc(), utc);
    }
}
