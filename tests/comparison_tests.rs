//! Result comparison against tables returned through a live client

mod test_utils;

use std::str::FromStr;

use rust_decimal::Decimal;

use roodb_regress::assertions::{assert_table_of_longs, assert_table_of_scalar_longs, verify_stmt_fails};
use roodb_regress::compare::{
    compare_content_of_table, compare_tables, validate_row_of_longs, validate_table_of_longs,
    validate_table_of_scalar_longs, CompareOptions, Expected,
};
use roodb_regress::suite::TestInstance;
use roodb_regress::types::{Column, ColumnType, Geography, GeographyPoint, ResultTable, Value, NULL_BIGINT};
use test_utils::{reference_topology, test_config};

fn table(columns: &[(&str, ColumnType)], rows: Vec<Vec<Value>>) -> ResultTable {
    let mut t = ResultTable::new(columns.iter().map(|(n, ty)| Column::new(*n, *ty)).collect());
    for row in rows {
        t.add_row(row).unwrap();
    }
    t
}

#[tokio::test]
async fn test_counts_read_through_client() {
    let (_engine, topology) = reference_topology();
    let instance = TestInstance::new("counts", topology, test_config()).last_for_topology(true);
    instance.set_up().await.unwrap();
    let client = instance.client().await.unwrap();

    let inserted = client.adhoc("INSERT INTO ORDERS VALUES (10)").await.unwrap();
    assert_table_of_scalar_longs(&inserted, &[1]);
    client.adhoc("INSERT INTO ORDERS VALUES (11)").await.unwrap();

    let counted = client.adhoc("SELECT COUNT(*) FROM ORDERS").await.unwrap();
    assert_table_of_longs(&counted, &[[2i64]]);

    let failure = verify_stmt_fails(&client, "INSERT INTO ORDER_COUNTS VALUES (1)", "materialized view").await;
    assert!(failure.message.starts_with("Illegal to modify"));

    instance.tear_down().await.unwrap();
}

#[test]
fn test_single_row_of_integers() {
    let cols = [("A", ColumnType::Integer), ("B", ColumnType::Integer), ("C", ColumnType::Integer)];
    let one = table(&cols, vec![vec![1i64.into(), 2i64.into(), 3i64.into()]]);
    assert!(validate_table_of_longs(&one, &[[1i64, 2, 3]]).is_ok());

    let two = table(
        &cols,
        vec![
            vec![1i64.into(), 2i64.into(), 3i64.into()],
            vec![4i64.into(), 5i64.into(), 6i64.into()],
        ],
    );
    let err = validate_table_of_longs(&two, &[[1i64, 2, 3]]).unwrap_err();
    assert!(err.message.starts_with("row count mismatch"));
}

#[test]
fn test_null_sentinel_expects_sql_null() {
    let t = table(&[("N", ColumnType::Integer)], vec![vec![Value::Null]]);
    assert!(validate_table_of_scalar_longs(&t, &[NULL_BIGINT]).is_ok());

    // An actual value equal to the sentinel without the null flag is not null
    let t = table(&[("N", ColumnType::BigInt)], vec![vec![Value::Integer(7)]]);
    assert!(validate_table_of_scalar_longs(&t, &[NULL_BIGINT]).is_err());
}

#[test]
fn test_long_expectation_reads_other_numeric_columns() {
    let t = table(
        &[
            ("F", ColumnType::Float),
            ("T", ColumnType::Timestamp),
            ("D", ColumnType::Decimal),
        ],
        vec![vec![
            Value::Float(4.0),
            Value::Timestamp(1_000_000),
            Value::Decimal(Decimal::from_str("9.75").unwrap()),
        ]],
    );
    let row = t.row(0).unwrap();
    // Decimal narrowing truncates
    assert!(validate_row_of_longs(&row, &[4, 1_000_000, 9]).is_ok());
}

#[test]
fn test_epsilon_widens_float_matches() {
    let cols = [("F", ColumnType::Float)];
    let expected = table(&cols, vec![vec![Value::Float(1.0)]]);
    let actual = table(&cols, vec![vec![Value::Float(1.0005)]]);

    assert!(compare_tables(&expected, &actual, 0.0).is_err());
    assert!(compare_tables(&expected, &actual, 0.001).is_ok());
    // Any epsilon that accepts also accepts at a larger epsilon
    assert!(compare_tables(&expected, &actual, 0.01).is_ok());
}

#[test]
fn test_row_order_matters() {
    let cols = [("A", ColumnType::BigInt)];
    let expected = table(&cols, vec![vec![1i64.into()], vec![2i64.into()]]);
    let actual = table(&cols, vec![vec![2i64.into()], vec![1i64.into()]]);
    let err = compare_tables(&expected, &actual, 0.0).unwrap_err();
    assert_eq!(err.row, Some(0));

    let sorted = actual.sorted_by(&[0]);
    assert!(compare_tables(&expected, &sorted, 0.0).is_ok());
}

#[test]
fn test_mixed_content_with_geography() {
    let square = Geography::from_wkt("POLYGON((0 0, 1 0, 1 1, 0 1, 0 0))").unwrap();
    let reversed = Geography::from_wkt("POLYGON((0 0, 0 1, 1 1, 1 0, 0 0))").unwrap();
    let t = table(
        &[
            ("NAME", ColumnType::Varchar),
            ("AT", ColumnType::GeographyPoint),
            ("AREA", ColumnType::Geography),
            ("PRICE", ColumnType::Decimal),
        ],
        vec![vec![
            Value::from("depot"),
            Value::from(GeographyPoint::new(10.0, 20.0)),
            Value::from(square.clone()),
            Value::Decimal(Decimal::from_str("2.5").unwrap()),
        ]],
    );

    let matching = vec![vec![
        Expected::from("depot"),
        Expected::Point(Some(GeographyPoint::new(10.0, 20.0000001))),
        Expected::Polygon(Some(square)),
        Expected::Decimal(Some(Decimal::from_str("2.500000000000").unwrap())),
    ]];
    let options = CompareOptions::exact().with_epsilon(1e-6);
    assert!(compare_content_of_table(&t, &matching, &options).is_ok());

    let mut wrong_ring = matching.clone();
    wrong_ring[0][2] = Expected::Polygon(Some(reversed));
    let err = compare_content_of_table(&t, &wrong_ring, &options).unwrap_err();
    assert_eq!(err.column, Some(2));
}
