//! Expected cell values

use std::fmt;

use rust_decimal::Decimal;

use crate::types::{Geography, GeographyPoint, NULL_BIGINT, NULL_FLOAT};

/// One expected cell.
///
/// `Long` and `Double` carry SQL NULL in-band as [`NULL_BIGINT`] and
/// [`NULL_FLOAT`]; the other variants use `None`.
#[derive(Debug, Clone, PartialEq)]
pub enum Expected {
    Long(i64),
    Double(f64),
    Decimal(Option<Decimal>),
    String(Option<String>),
    Bytes(Option<Vec<u8>>),
    /// Microseconds since the unix epoch
    Timestamp(Option<i64>),
    Point(Option<GeographyPoint>),
    Polygon(Option<Geography>),
}

impl Expected {
    pub const NULL_LONG: Expected = Expected::Long(NULL_BIGINT);
    pub const NULL_DOUBLE: Expected = Expected::Double(NULL_FLOAT);

    pub fn is_null(&self) -> bool {
        match self {
            Expected::Long(v) => *v == NULL_BIGINT,
            Expected::Double(v) => *v == NULL_FLOAT,
            Expected::Decimal(v) => v.is_none(),
            Expected::String(v) => v.is_none(),
            Expected::Bytes(v) => v.is_none(),
            Expected::Timestamp(v) => v.is_none(),
            Expected::Point(v) => v.is_none(),
            Expected::Polygon(v) => v.is_none(),
        }
    }
}

impl fmt::Display for Expected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            return f.write_str("NULL");
        }
        match self {
            Expected::Long(v) => write!(f, "{}", v),
            Expected::Double(v) => write!(f, "{}", v),
            Expected::Decimal(Some(v)) => write!(f, "{}", v),
            Expected::String(Some(v)) => write!(f, "{}", v),
            Expected::Bytes(Some(v)) => {
                for byte in v {
                    write!(f, "{:02X}", byte)?;
                }
                Ok(())
            }
            Expected::Timestamp(Some(v)) => write!(f, "{}us", v),
            Expected::Point(Some(v)) => write!(f, "{}", v),
            Expected::Polygon(Some(v)) => write!(f, "{}", v),
            _ => f.write_str("NULL"),
        }
    }
}

impl From<i64> for Expected {
    fn from(v: i64) -> Self {
        Expected::Long(v)
    }
}

impl From<i32> for Expected {
    fn from(v: i32) -> Self {
        Expected::Long(v as i64)
    }
}

impl From<f64> for Expected {
    fn from(v: f64) -> Self {
        Expected::Double(v)
    }
}

impl From<Decimal> for Expected {
    fn from(v: Decimal) -> Self {
        Expected::Decimal(Some(v))
    }
}

impl From<&str> for Expected {
    fn from(v: &str) -> Self {
        Expected::String(Some(v.to_string()))
    }
}

impl From<String> for Expected {
    fn from(v: String) -> Self {
        Expected::String(Some(v))
    }
}

impl From<Vec<u8>> for Expected {
    fn from(v: Vec<u8>) -> Self {
        Expected::Bytes(Some(v))
    }
}

impl From<GeographyPoint> for Expected {
    fn from(v: GeographyPoint) -> Self {
        Expected::Point(Some(v))
    }
}

impl From<Geography> for Expected {
    fn from(v: Geography) -> Self {
        Expected::Polygon(Some(v))
    }
}
