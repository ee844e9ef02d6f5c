//! Cell values and column types shared by result tables and call parameters

use std::cmp::Ordering;
use std::fmt;

use rust_decimal::Decimal;

use super::geography::{Geography, GeographyPoint};

/// In-band null for TINYINT columns
pub const NULL_TINYINT: i8 = i8::MIN;

/// In-band null for SMALLINT columns
pub const NULL_SMALLINT: i16 = i16::MIN;

/// In-band null for INTEGER columns
pub const NULL_INTEGER: i32 = i32::MIN;

/// In-band null for BIGINT columns, also the "expect NULL" marker in long arrays
pub const NULL_BIGINT: i64 = i64::MIN;

/// In-band null for FLOAT columns
pub const NULL_FLOAT: f64 = -1.7E308;

/// Declared type of a result column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    Float,
    Decimal,
    Varchar,
    Varbinary,
    Timestamp,
    GeographyPoint,
    Geography,
}

impl ColumnType {
    /// True for the four fixed-width integer types
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            ColumnType::TinyInt | ColumnType::SmallInt | ColumnType::Integer | ColumnType::BigInt
        )
    }

    /// The value an integer column reports for NULL, widened to i64
    pub fn null_long(&self) -> Option<i64> {
        match self {
            ColumnType::TinyInt => Some(NULL_TINYINT as i64),
            ColumnType::SmallInt => Some(NULL_SMALLINT as i64),
            ColumnType::Integer => Some(NULL_INTEGER as i64),
            ColumnType::BigInt => Some(NULL_BIGINT),
            _ => None,
        }
    }

    /// SQL type name as reported by catalog introspection
    pub fn sql_name(&self) -> &'static str {
        match self {
            ColumnType::TinyInt => "TINYINT",
            ColumnType::SmallInt => "SMALLINT",
            ColumnType::Integer => "INTEGER",
            ColumnType::BigInt => "BIGINT",
            ColumnType::Float => "FLOAT",
            ColumnType::Decimal => "DECIMAL",
            ColumnType::Varchar => "VARCHAR",
            ColumnType::Varbinary => "VARBINARY",
            ColumnType::Timestamp => "TIMESTAMP",
            ColumnType::GeographyPoint => "GEOGRAPHY_POINT",
            ColumnType::Geography => "GEOGRAPHY",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sql_name())
    }
}

/// A single cell, or a single procedure parameter
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Value {
    /// SQL NULL
    #[default]
    Null,
    /// Any integer width
    Integer(i64),
    /// Double precision float
    Float(f64),
    /// Exact decimal
    Decimal(Decimal),
    /// Character data
    Varchar(String),
    /// Binary data
    Varbinary(Vec<u8>),
    /// Microseconds since the unix epoch
    Timestamp(i64),
    /// Geographic point
    Point(GeographyPoint),
    /// Geographic polygon
    Geography(Geography),
}

impl Value {
    /// Check if this value is NULL
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    fn type_tag(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Integer(_) => 1,
            Value::Float(_) => 2,
            Value::Decimal(_) => 3,
            Value::Varchar(_) => 4,
            Value::Varbinary(_) => 5,
            Value::Timestamp(_) => 6,
            Value::Point(_) => 7,
            Value::Geography(_) => 8,
        }
    }

    /// Total order used only to sort rows before comparing them.
    ///
    /// NULL sorts first; floats use IEEE total ordering; geography values
    /// fall back to their WKT text.
    pub fn sort_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            (Value::Decimal(a), Value::Decimal(b)) => a.cmp(b),
            (Value::Varchar(a), Value::Varchar(b)) => a.cmp(b),
            (Value::Varbinary(a), Value::Varbinary(b)) => a.cmp(b),
            (Value::Timestamp(a), Value::Timestamp(b)) => a.cmp(b),
            (Value::Point(a), Value::Point(b)) => a.to_string().cmp(&b.to_string()),
            (Value::Geography(a), Value::Geography(b)) => a.to_string().cmp(&b.to_string()),
            _ => self.type_tag().cmp(&other.type_tag()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::Decimal(d) => write!(f, "{}", d),
            Value::Varchar(s) => write!(f, "{}", s),
            Value::Varbinary(b) => {
                for byte in b {
                    write!(f, "{:02X}", byte)?;
                }
                Ok(())
            }
            Value::Timestamp(micros) => match chrono::DateTime::from_timestamp_micros(*micros) {
                Some(ts) => write!(f, "{}", ts.format("%Y-%m-%d %H:%M:%S%.6f")),
                None => write!(f, "{}us", micros),
            },
            Value::Point(p) => write!(f, "{}", p),
            Value::Geography(g) => write!(f, "{}", g),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Self {
        Value::Decimal(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Varchar(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Varchar(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Varbinary(v)
    }
}

impl From<GeographyPoint> for Value {
    fn from(v: GeographyPoint) -> Self {
        Value::Point(v)
    }
}

impl From<Geography> for Value {
    fn from(v: Geography) -> Self {
        Value::Geography(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}
