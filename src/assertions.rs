//! Assertion helpers for test bodies
//!
//! Thin panicking wrappers over [`crate::compare`]: a [`Mismatch`] becomes
//! a test failure reported at the caller's location.

use regex::Regex;
use rust_decimal::Decimal;

use crate::client::{Client, ADHOC};
use crate::compare::{self, CompareOptions, Comparison, Expected, Mismatch};
use crate::error::{HarnessError, ProcCallFailure};
use crate::types::{ResultTable, RoundingMode, TableRow, Value};

#[track_caller]
fn check(result: Comparison) {
    if let Err(mismatch) = result {
        fail(&mismatch);
    }
}

#[track_caller]
fn fail(mismatch: &Mismatch) -> ! {
    panic!("{}", mismatch)
}

#[track_caller]
pub fn assert_row_count(table: &ResultTable, expected_rows: usize) {
    check(compare::validate_row_count(table, expected_rows));
}

#[track_caller]
pub fn assert_row_of_longs(row: &TableRow<'_>, expected: &[i64]) {
    check(compare::validate_row_of_longs(row, expected));
}

#[track_caller]
pub fn assert_table_of_longs<R: AsRef<[i64]>>(table: &ResultTable, expected: &[R]) {
    check(compare::validate_table_of_longs(table, expected));
}

#[track_caller]
pub fn assert_table_of_scalar_longs(table: &ResultTable, expected: &[i64]) {
    check(compare::validate_table_of_scalar_longs(table, expected));
}

#[track_caller]
pub fn assert_table_of_scalar_decimals(table: &ResultTable, expected: &[Option<Decimal>]) {
    check(compare::validate_table_of_scalar_decimals(
        table,
        expected,
        RoundingMode::default(),
    ));
}

#[track_caller]
pub fn assert_table_column_of_scalar_varchar(table: &ResultTable, column: usize, expected: &[Option<&str>]) {
    check(compare::validate_table_column_of_scalar_varchar(table, column, expected));
}

#[track_caller]
pub fn assert_table_column_of_scalar_varbinary(
    table: &ResultTable,
    column: usize,
    expected: &[Option<&[u8]>],
) {
    check(compare::validate_table_column_of_scalar_varbinary(table, column, expected));
}

#[track_caller]
pub fn assert_table_column_of_scalar_float(table: &ResultTable, column: usize, expected: &[f64], epsilon: f64) {
    check(compare::validate_table_column_of_scalar_float(
        table, column, expected, epsilon,
    ));
}

#[track_caller]
pub fn assert_content_of_table(table: &ResultTable, expected: &[Vec<Expected>], options: &CompareOptions) {
    check(compare::compare_content_of_table(table, expected, options));
}

/// Exact unless `epsilon` is positive
#[track_caller]
pub fn assert_tables_equal(expected: &ResultTable, actual: &ResultTable, epsilon: f64) {
    check(compare::compare_tables(expected, actual, epsilon));
}

fn compile(pattern: &str) -> Regex {
    match Regex::new(pattern) {
        Ok(re) => re,
        Err(e) => panic!("invalid failure pattern {:?}: {}", pattern, e),
    }
}

fn expect_failure(
    what: &str,
    result: Result<Vec<ResultTable>, HarnessError>,
    pattern: &str,
) -> ProcCallFailure {
    let re = compile(pattern);
    match result {
        Ok(_) => panic!("{} succeeded, expected a failure matching {:?}", what, pattern),
        Err(HarnessError::ProcedureCall(failure)) => {
            if !re.is_match(&failure.message) {
                panic!(
                    "{} failed with {:?}, which does not match {:?}",
                    what, failure.message, pattern
                );
            }
            failure
        }
        Err(other) => panic!(
            "{} failed with {}, expected a procedure failure matching {:?}",
            what, other, pattern
        ),
    }
}

/// Run an ad hoc statement that must fail with a message matching `pattern`
pub async fn verify_stmt_fails(client: &Client, sql: &str, pattern: &str) -> ProcCallFailure {
    let result = client.call(ADHOC, &[Value::from(sql)]).await;
    expect_failure(&format!("statement {:?}", sql), result, pattern)
}

/// Call a procedure that must fail with a message matching `pattern`
pub async fn verify_proc_fails(
    client: &Client,
    pattern: &str,
    procedure: &str,
    params: &[Value],
) -> ProcCallFailure {
    let result = client.call(procedure, params).await;
    expect_failure(&format!("procedure {}", procedure), result, pattern)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NULL_BIGINT;

    #[test]
    fn test_assertions_pass() {
        let t = ResultTable::of_longs("C", &[Some(1), None]);
        assert_row_count(&t, 2);
        assert_table_of_scalar_longs(&t, &[1, NULL_BIGINT]);
        assert_tables_equal(&t, &t.clone(), 0.0);
    }

    #[test]
    #[should_panic(expected = "row count mismatch")]
    fn test_row_count_failure_panics() {
        assert_row_count(&ResultTable::of_longs("C", &[Some(1)]), 2);
    }

    #[test]
    fn test_expect_failure_matches_pattern() {
        let result = Err(ProcCallFailure::graceful("@AdHoc", "Illegal to modify a materialized view.").into());
        let failure = expect_failure("statement", result, "(?i)materialized view");
        assert_eq!(failure.procedure, "@AdHoc");
    }

    #[test]
    #[should_panic(expected = "does not match")]
    fn test_expect_failure_rejects_other_message() {
        let result = Err(ProcCallFailure::graceful("P", "constraint violation").into());
        expect_failure("procedure P", result, "materialized");
    }

    #[test]
    #[should_panic(expected = "succeeded")]
    fn test_expect_failure_rejects_success() {
        expect_failure("procedure P", Ok(Vec::new()), ".*");
    }
}
