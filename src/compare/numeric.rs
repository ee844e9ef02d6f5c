//! Numeric cell rules: the integer fallback chain, float epsilon equality
//! and scale-normalized decimals

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::types::{normalize, DecodeError, Fetched, RoundingMode, TableRow, NULL_BIGINT, NULL_FLOAT};

/// Float equality.
///
/// A non-positive epsilon, or a NaN or infinite expectation, demands exact
/// equality (NaN equals NaN). Otherwise the difference must be strictly
/// below epsilon. Zeros of either sign are equal.
pub fn floats_equal(expected: f64, actual: f64, epsilon: f64) -> bool {
    if epsilon <= 0.0 || !expected.is_finite() {
        if expected.is_nan() {
            return actual.is_nan();
        }
        return expected == actual;
    }
    (expected - actual).abs() < epsilon
}

/// Whether a float read should count as SQL NULL.
///
/// Some backends return the sentinel without setting the null flag.
pub fn is_null_float(fetched: &Fetched<f64>) -> bool {
    fetched.was_null || fetched.value == NULL_FLOAT
}

/// Read a column as an integer, trying integer, double, timestamp and
/// decimal encodings in that order.
///
/// Only a type mismatch moves on to the next encoding; the last mismatch is
/// returned when none fits. Doubles and decimals are truncated toward zero;
/// one outside the BIGINT range is [`DecodeError::OutOfRange`].
pub fn read_long(row: &TableRow<'_>, column: usize) -> Result<Fetched<i64>, DecodeError> {
    match row.get_long(column) {
        Err(DecodeError::TypeMismatch { .. }) => {}
        other => return other,
    }
    match row.get_double(column) {
        Ok(f) => {
            if is_null_float(&f) {
                return Ok(Fetched {
                    value: NULL_BIGINT,
                    was_null: true,
                });
            }
            let truncated = f.value.trunc();
            if !(i64::MIN as f64..i64::MAX as f64).contains(&truncated) {
                return Err(out_of_range(column, f.value));
            }
            return Ok(Fetched {
                value: truncated as i64,
                was_null: false,
            });
        }
        Err(DecodeError::TypeMismatch { .. }) => {}
        Err(e) => return Err(e),
    }
    match row.get_timestamp_as_long(column) {
        Err(DecodeError::TypeMismatch { .. }) => {}
        other => return other,
    }
    let decimal = row.get_decimal(column)?;
    Ok(match decimal {
        Some(d) => Fetched {
            value: d.trunc().to_i64().ok_or_else(|| out_of_range(column, d))?,
            was_null: false,
        },
        None => Fetched {
            value: NULL_BIGINT,
            was_null: true,
        },
    })
}

/// Outcome of matching one long expectation: `Err` holds the actual value
/// as text
fn out_of_range(column: usize, value: impl ToString) -> DecodeError {
    DecodeError::OutOfRange {
        column,
        value: value.to_string(),
        requested: "BIGINT",
    }
}

pub fn match_long(expected: i64, row: &TableRow<'_>, column: usize) -> Result<(), String> {
    let actual = read_long(row, column).map_err(|e| e.to_string())?;
    if expected == NULL_BIGINT {
        return if actual.was_null {
            Ok(())
        } else {
            Err(actual.value.to_string())
        };
    }
    if actual.was_null {
        return Err("NULL".to_string());
    }
    if actual.value == expected {
        Ok(())
    } else {
        Err(actual.value.to_string())
    }
}

pub fn match_double(
    expected: f64,
    row: &TableRow<'_>,
    column: usize,
    epsilon: f64,
) -> Result<(), String> {
    let actual = row.get_double(column).map_err(|e| e.to_string())?;
    let actual_null = is_null_float(&actual);
    if expected == NULL_FLOAT {
        return if actual_null {
            Ok(())
        } else {
            Err(actual.value.to_string())
        };
    }
    if actual_null {
        return Err("NULL".to_string());
    }
    if floats_equal(expected, actual.value, epsilon) {
        Ok(())
    } else {
        Err(actual.value.to_string())
    }
}

/// Decimals compare after both are normalized to the default scale
pub fn decimals_equal(expected: Decimal, actual: Decimal, rounding: RoundingMode) -> bool {
    normalize(expected, rounding) == normalize(actual, rounding)
}

pub fn match_decimal(
    expected: Option<Decimal>,
    row: &TableRow<'_>,
    column: usize,
    rounding: RoundingMode,
) -> Result<(), String> {
    let actual = row.get_decimal(column).map_err(|e| e.to_string())?;
    match (expected, actual) {
        (None, None) => Ok(()),
        (Some(e), Some(a)) if decimals_equal(e, a, rounding) => Ok(()),
        (_, Some(a)) => Err(a.to_string()),
        (Some(_), None) => Err("NULL".to_string()),
    }
}
