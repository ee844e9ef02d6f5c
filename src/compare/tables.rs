//! Table-level checks

use rust_decimal::Decimal;

use super::expected::Expected;
use super::geo::{points_equal, polygons_equal};
use super::numeric::{
    decimals_equal, floats_equal, is_null_float, match_decimal, match_double, match_long, read_long,
};
use super::{CompareOptions, Comparison, Mismatch};
use crate::types::{ColumnType, ResultTable, RoundingMode, TableRow, Value};

/// Row-count mismatches on tables smaller than this dump both sides
pub const VERBOSE_ROW_LIMIT: usize = 20;

fn row_count_mismatch(
    table: &ResultTable,
    expected_rows: usize,
    expected_dump: impl FnOnce() -> String,
) -> Mismatch {
    let mut message = "row count mismatch".to_string();
    if expected_rows < VERBOSE_ROW_LIMIT && table.row_count() < VERBOSE_ROW_LIMIT {
        message.push_str(&format!(
            "\nexpected:\n{}actual:\n{}",
            expected_dump(),
            table
        ));
    }
    Mismatch::shape(message, expected_rows, table.row_count())
}

fn check_row_count(
    table: &ResultTable,
    expected_rows: usize,
    expected_dump: impl FnOnce() -> String,
) -> Comparison {
    if table.row_count() == expected_rows {
        Ok(())
    } else {
        tracing::debug!(expected = expected_rows, actual = table.row_count(), "Row count mismatch");
        Err(row_count_mismatch(table, expected_rows, expected_dump))
    }
}

fn column_name<'a>(row: &TableRow<'a>, column: usize) -> Option<&'a str> {
    row.table().column_name(column).ok()
}

fn cell_mismatch(row: &TableRow<'_>, column: usize, expected: impl std::fmt::Display, actual: String) -> Mismatch {
    Mismatch::cell(row.index(), column, column_name(row, column), expected, actual)
}

fn dump_rows<R: AsRef<[T]>, T: std::fmt::Display>(rows: &[R]) -> String {
    rows.iter()
        .enumerate()
        .map(|(i, row)| {
            let cells: Vec<String> = row.as_ref().iter().map(|c| c.to_string()).collect();
            format!("row {}: [{}]\n", i, cells.join(", "))
        })
        .collect()
}

fn dump_column<T: std::fmt::Display>(values: &[T]) -> String {
    values
        .iter()
        .enumerate()
        .map(|(i, v)| format!("row {}: [{}]\n", i, v))
        .collect()
}

fn display_opt<T: std::fmt::Display>(value: &Option<T>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => "NULL".to_string(),
    }
}

/// The table has exactly `expected_rows` rows
pub fn validate_row_count(table: &ResultTable, expected_rows: usize) -> Comparison {
    check_row_count(table, expected_rows, || format!("{} rows\n", expected_rows))
}

/// One row holds exactly the given longs. [`crate::types::NULL_BIGINT`]
/// expects SQL NULL.
pub fn validate_row_of_longs(row: &TableRow<'_>, expected: &[i64]) -> Comparison {
    if row.column_count() != expected.len() {
        return Err(Mismatch::shape("column count mismatch", expected.len(), row.column_count())
            .with_row(row.index()));
    }
    for (column, &want) in expected.iter().enumerate() {
        match_long(want, row, column)
            .map_err(|actual| cell_mismatch(row, column, display_long(want), actual))?;
    }
    Ok(())
}

fn display_long(v: i64) -> String {
    Expected::Long(v).to_string()
}

/// Every row and column matches the expected longs, in order
pub fn validate_table_of_longs<R: AsRef<[i64]>>(table: &ResultTable, expected: &[R]) -> Comparison {
    check_row_count(table, expected.len(), || dump_rows(expected))?;
    for (row, want) in table.rows().zip(expected) {
        validate_row_of_longs(&row, want.as_ref())?;
    }
    Ok(())
}

/// Column 0 of each row matches the expected longs, in order
pub fn validate_table_of_scalar_longs(table: &ResultTable, expected: &[i64]) -> Comparison {
    let shown: Vec<String> = expected.iter().map(|v| display_long(*v)).collect();
    check_row_count(table, expected.len(), || dump_column(&shown))?;
    for (row, &want) in table.rows().zip(expected) {
        match_long(want, &row, 0).map_err(|actual| cell_mismatch(&row, 0, display_long(want), actual))?;
    }
    Ok(())
}

/// Column 0 of each row matches the expected decimals at the default scale
pub fn validate_table_of_scalar_decimals(
    table: &ResultTable,
    expected: &[Option<Decimal>],
    rounding: RoundingMode,
) -> Comparison {
    let shown: Vec<String> = expected.iter().map(display_opt).collect();
    check_row_count(table, expected.len(), || dump_column(&shown))?;
    for (row, want) in table.rows().zip(expected) {
        match_decimal(*want, &row, 0, rounding)
            .map_err(|actual| cell_mismatch(&row, 0, display_opt(want), actual))?;
    }
    Ok(())
}

/// One VARCHAR column matches the expected strings (`None` is NULL)
pub fn validate_table_column_of_scalar_varchar(
    table: &ResultTable,
    column: usize,
    expected: &[Option<&str>],
) -> Comparison {
    let shown: Vec<String> = expected.iter().map(display_opt).collect();
    check_row_count(table, expected.len(), || dump_column(&shown))?;
    for (row, want) in table.rows().zip(expected) {
        let actual = row
            .get_string(column)
            .map_err(|e| cell_mismatch(&row, column, display_opt(want), e.to_string()))?;
        if actual != *want {
            return Err(cell_mismatch(&row, column, display_opt(want), display_opt(&actual)));
        }
    }
    Ok(())
}

/// Length first, then byte by byte
fn match_bytes(expected: &[u8], actual: &[u8]) -> Result<(), String> {
    if expected.len() != actual.len() {
        return Err(format!(
            "length differs: expected {}, actual {}",
            expected.len(),
            actual.len()
        ));
    }
    match expected.iter().zip(actual).position(|(e, a)| e != a) {
        Some(i) => Err(format!(
            "byte {} differs: expected {:02X}, actual {:02X}",
            i, expected[i], actual[i]
        )),
        None => Ok(()),
    }
}

fn hex(bytes: &[u8]) -> String {
    Value::Varbinary(bytes.to_vec()).to_string()
}

/// One VARBINARY column matches the expected byte strings (`None` is NULL)
pub fn validate_table_column_of_scalar_varbinary(
    table: &ResultTable,
    column: usize,
    expected: &[Option<&[u8]>],
) -> Comparison {
    let shown: Vec<String> = expected
        .iter()
        .map(|v| v.map_or_else(|| "NULL".to_string(), hex))
        .collect();
    check_row_count(table, expected.len(), || dump_column(&shown))?;
    for ((row, want), want_text) in table.rows().zip(expected).zip(&shown) {
        let actual = row
            .get_bytes(column)
            .map_err(|e| cell_mismatch(&row, column, want_text, e.to_string()))?;
        match (want, actual) {
            (None, None) => {}
            (Some(e), Some(a)) => match_bytes(e, a).map_err(|msg| {
                cell_mismatch(&row, column, want_text, hex(a)).with_message(msg)
            })?,
            (_, a) => {
                let actual = a.map_or_else(|| "NULL".to_string(), hex);
                return Err(cell_mismatch(&row, column, want_text, actual));
            }
        }
    }
    Ok(())
}

/// One FLOAT column matches the expected doubles under `epsilon`
pub fn validate_table_column_of_scalar_float(
    table: &ResultTable,
    column: usize,
    expected: &[f64],
    epsilon: f64,
) -> Comparison {
    let shown: Vec<String> = expected.iter().map(|v| Expected::Double(*v).to_string()).collect();
    check_row_count(table, expected.len(), || dump_column(&shown))?;
    for ((row, &want), want_text) in table.rows().zip(expected).zip(&shown) {
        match_double(want, &row, column, epsilon)
            .map_err(|actual| cell_mismatch(&row, column, want_text, actual))?;
    }
    Ok(())
}

fn match_cell(
    expected: &Expected,
    row: &TableRow<'_>,
    column: usize,
    options: &CompareOptions,
) -> Result<(), String> {
    let null = || "NULL".to_string();
    match expected {
        Expected::Long(v) => match_long(*v, row, column),
        Expected::Double(v) => match_double(*v, row, column, options.epsilon),
        Expected::Decimal(v) => match_decimal(*v, row, column, options.rounding),
        Expected::String(v) => {
            let actual = row.get_string(column).map_err(|e| e.to_string())?;
            if actual == v.as_deref() {
                Ok(())
            } else {
                Err(actual.map_or_else(null, str::to_string))
            }
        }
        Expected::Bytes(v) => {
            let actual = row.get_bytes(column).map_err(|e| e.to_string())?;
            match (v, actual) {
                (None, None) => Ok(()),
                (Some(e), Some(a)) => match_bytes(e, a),
                (_, a) => Err(a.map_or_else(null, hex)),
            }
        }
        Expected::Timestamp(v) => {
            let actual = row.get_timestamp_as_long(column).map_err(|e| e.to_string())?;
            let actual = (!actual.was_null).then_some(actual.value);
            if actual == *v {
                Ok(())
            } else {
                Err(actual.map_or_else(null, |us| format!("{}us", us)))
            }
        }
        Expected::Point(v) => {
            let actual = row.get_point(column).map_err(|e| e.to_string())?;
            match (v, actual) {
                (None, None) => Ok(()),
                (Some(e), Some(a)) if points_equal(e, &a, options.epsilon) => Ok(()),
                (_, a) => Err(a.map_or_else(null, |p| p.to_string())),
            }
        }
        Expected::Polygon(v) => {
            let actual = row.get_geography(column).map_err(|e| e.to_string())?;
            match (v, actual) {
                (None, None) => Ok(()),
                (Some(e), Some(a)) => polygons_equal(e, a, options.epsilon),
                (_, a) => Err(a.map_or_else(null, |g| g.to_string())),
            }
        }
    }
}

/// Every cell matches its typed expectation, rows in order
pub fn compare_content_of_table(
    table: &ResultTable,
    expected: &[Vec<Expected>],
    options: &CompareOptions,
) -> Comparison {
    check_row_count(table, expected.len(), || dump_rows(expected))?;
    for (row, want) in table.rows().zip(expected) {
        if row.column_count() != want.len() {
            return Err(Mismatch::shape("column count mismatch", want.len(), row.column_count())
                .with_row(row.index()));
        }
        for (column, cell) in want.iter().enumerate() {
            match_cell(cell, &row, column, options)
                .map_err(|actual| cell_mismatch(&row, column, cell, actual))?;
        }
    }
    Ok(())
}

/// Compare two result tables cell by cell, driven by the expected side's
/// column types. Floats and geography use `epsilon`; decimals compare at
/// the default scale.
pub fn compare_tables(expected: &ResultTable, actual: &ResultTable, epsilon: f64) -> Comparison {
    if expected.column_count() != actual.column_count() {
        return Err(Mismatch::shape(
            "column count mismatch",
            expected.column_count(),
            actual.column_count(),
        ));
    }
    check_row_count(actual, expected.row_count(), || expected.to_string())?;

    for (want, got) in expected.rows().zip(actual.rows()) {
        for column in 0..expected.column_count() {
            let want_value = want
                .value(column)
                .map_err(|e| cell_mismatch(&got, column, "?", e.to_string()))?;
            let ty = expected
                .column_type(column)
                .map_err(|e| cell_mismatch(&got, column, want_value, e.to_string()))?;
            compare_values(ty, &want, &got, column, epsilon)
                .map_err(|shown| cell_mismatch(&got, column, want_value, shown))?;
        }
    }
    Ok(())
}

fn compare_values(
    ty: ColumnType,
    want: &TableRow<'_>,
    got: &TableRow<'_>,
    column: usize,
    epsilon: f64,
) -> Result<(), String> {
    let show = |row: &TableRow<'_>| row.value(column).map(|v| v.to_string()).unwrap_or_default();
    let equal = match ty {
        t if t.is_integer() => {
            let e = read_long(want, column).map_err(|e| e.to_string())?;
            let a = read_long(got, column).map_err(|e| e.to_string())?;
            e.was_null == a.was_null && (e.was_null || e.value == a.value)
        }
        ColumnType::Float => {
            let e = want.get_double(column).map_err(|e| e.to_string())?;
            let a = got.get_double(column).map_err(|e| e.to_string())?;
            match (is_null_float(&e), is_null_float(&a)) {
                (true, true) => true,
                (false, false) => floats_equal(e.value, a.value, epsilon),
                _ => false,
            }
        }
        ColumnType::Decimal => {
            let e = want.get_decimal(column).map_err(|e| e.to_string())?;
            let a = got.get_decimal(column).map_err(|e| e.to_string())?;
            match (e, a) {
                (Some(e), Some(a)) => decimals_equal(e, a, RoundingMode::default()),
                (e, a) => e.is_none() && a.is_none(),
            }
        }
        ColumnType::GeographyPoint => {
            let e = want.get_point(column).map_err(|e| e.to_string())?;
            let a = got.get_point(column).map_err(|e| e.to_string())?;
            match (e, a) {
                (Some(e), Some(a)) => points_equal(&e, &a, epsilon),
                (e, a) => e.is_none() && a.is_none(),
            }
        }
        ColumnType::Geography => {
            let e = want.get_geography(column).map_err(|e| e.to_string())?;
            let a = got.get_geography(column).map_err(|e| e.to_string())?;
            match (e, a) {
                (Some(e), Some(a)) => return polygons_equal(e, a, epsilon),
                (e, a) => e.is_none() && a.is_none(),
            }
        }
        _ => {
            let e = want.value(column).map_err(|e| e.to_string())?;
            let a = got.value(column).map_err(|e| e.to_string())?;
            e == a
        }
    };
    if equal {
        Ok(())
    } else {
        Err(show(got))
    }
}

impl Mismatch {
    fn with_row(mut self, row: usize) -> Self {
        self.row = Some(row);
        self
    }
}
