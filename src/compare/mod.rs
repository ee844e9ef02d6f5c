//! Result comparison engine
//!
//! Every check makes exactly one pass over the actual table and returns a
//! [`Comparison`]: `Ok(())` on a match, or the first [`Mismatch`] with its
//! row, column, expected and actual values. Tolerance comes only from the
//! epsilon and rounding in [`CompareOptions`].

pub mod expected;
pub mod geo;
pub mod numeric;
pub mod tables;

use std::fmt;

use crate::types::RoundingMode;

pub use expected::Expected;
pub use geo::{points_equal, polygons_equal};
pub use numeric::{decimals_equal, floats_equal, read_long};
pub use tables::{
    compare_content_of_table, compare_tables, validate_row_count, validate_row_of_longs,
    validate_table_column_of_scalar_float, validate_table_column_of_scalar_varbinary,
    validate_table_column_of_scalar_varchar, validate_table_of_longs,
    validate_table_of_scalar_decimals, validate_table_of_scalar_longs, VERBOSE_ROW_LIMIT,
};

/// Outcome of one comparison
pub type Comparison = Result<(), Mismatch>;

/// The first difference a comparison found
#[derive(Debug, Clone, PartialEq)]
pub struct Mismatch {
    pub row: Option<usize>,
    pub column: Option<usize>,
    pub column_name: Option<String>,
    pub expected: String,
    pub actual: String,
    pub message: String,
}

impl Mismatch {
    /// A difference in table shape (row or column counts)
    pub fn shape(message: impl Into<String>, expected: impl fmt::Display, actual: impl fmt::Display) -> Self {
        Self {
            row: None,
            column: None,
            column_name: None,
            expected: expected.to_string(),
            actual: actual.to_string(),
            message: message.into(),
        }
    }

    /// A difference in one cell
    pub fn cell(
        row: usize,
        column: usize,
        column_name: Option<&str>,
        expected: impl fmt::Display,
        actual: impl Into<String>,
    ) -> Self {
        Self {
            row: Some(row),
            column: Some(column),
            column_name: column_name.map(str::to_string),
            expected: expected.to_string(),
            actual: actual.into(),
            message: "value mismatch".to_string(),
        }
    }

    pub(crate) fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        if let Some(row) = self.row {
            write!(f, " at row {}", row)?;
        }
        if let Some(column) = self.column {
            write!(f, ", column {}", column)?;
            if let Some(name) = &self.column_name {
                write!(f, " ({})", name)?;
            }
        }
        write!(f, ": expected {}, actual {}", self.expected, self.actual)
    }
}

impl std::error::Error for Mismatch {}

/// Tolerances for approximate comparison
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompareOptions {
    /// Float tolerance; zero or negative means exact
    pub epsilon: f64,
    /// Rounding used to bring decimals to the default scale
    pub rounding: RoundingMode,
}

impl Default for CompareOptions {
    fn default() -> Self {
        Self {
            epsilon: 0.0,
            rounding: RoundingMode::HalfUp,
        }
    }
}

impl CompareOptions {
    pub fn exact() -> Self {
        Self::default()
    }

    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    pub fn with_rounding(mut self, rounding: RoundingMode) -> Self {
        self.rounding = rounding;
        self
    }
}
