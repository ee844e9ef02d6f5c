//! Value model consumed by the comparison engine

pub mod decimal;
pub mod geography;
pub mod table;
pub mod value;

pub use decimal::{
    normalize, parse_exact, round_decimal_str, DecimalError, RoundingMode, DEFAULT_SCALE,
    EXACT_DIGITS, MAX_PRECISION,
};
pub use geography::{Geography, GeographyParseError, GeographyPoint};
pub use table::{Column, DecodeError, Fetched, ResultTable, TableRow};
pub use value::{
    ColumnType, Value, NULL_BIGINT, NULL_FLOAT, NULL_INTEGER, NULL_SMALLINT, NULL_TINYINT,
};
