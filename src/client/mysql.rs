//! MySQL-protocol adapter for native topologies
//!
//! Procedure names map onto SQL: `@AdHoc` runs its first parameter as a
//! statement (binding the rest), `@SystemCatalog` answers from
//! `information_schema`, and any other name becomes `CALL name(?, ...)`.
//! Column metadata maps back onto [`ColumnType`] the same way the server
//! maps its own types onto the wire.

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, Timelike};
use mysql_async::consts::ColumnType as WireType;
use mysql_async::prelude::*;
use mysql_async::{Conn, Opts, OptsBuilder, Params, Row, SslOpts};

use super::{Connection, Connector, ADHOC, SYSTEM_CATALOG};
use crate::config::{AuthScheme, ClientOptions};
use crate::error::{CallStatus, HarnessError, HarnessResult, ProcCallFailure};
use crate::topology::HostAddress;
use crate::types::{
    parse_exact, Column, ColumnType, DecodeError, Geography, GeographyPoint, ResultTable, Value,
};

/// Column name of the synthetic table returned for statements without rows
pub const MODIFIED_TUPLES: &str = "modified_tuples";

/// Character set id the server reports for binary columns
const BINARY_CHARSET: u16 = 63;

const CATALOG_TABLES_SQL: &str = "SELECT TABLE_NAME, \
     CASE TABLE_TYPE WHEN 'BASE TABLE' THEN 'TABLE' ELSE TABLE_TYPE END AS TABLE_TYPE, \
     TABLE_COMMENT AS REMARKS \
     FROM information_schema.TABLES WHERE TABLE_SCHEMA = DATABASE() \
     ORDER BY CREATE_TIME, TABLE_NAME";

const CATALOG_COLUMNS_SQL: &str = "SELECT TABLE_NAME, COLUMN_NAME, \
     UPPER(DATA_TYPE) AS TYPE_NAME, IS_NULLABLE \
     FROM information_schema.COLUMNS WHERE TABLE_SCHEMA = DATABASE() \
     ORDER BY TABLE_NAME, ORDINAL_POSITION";

const CATALOG_PROCEDURES_SQL: &str = "SELECT ROUTINE_NAME AS PROCEDURE_NAME \
     FROM information_schema.ROUTINES \
     WHERE ROUTINE_SCHEMA = DATABASE() AND ROUTINE_TYPE = 'PROCEDURE' \
     ORDER BY ROUTINE_NAME";

/// Connector speaking the MySQL wire protocol via `mysql_async`
#[derive(Debug, Clone)]
pub struct MySqlConnector {
    tls: bool,
    database: Option<String>,
}

impl MySqlConnector {
    pub fn new(tls: bool, database: Option<String>) -> Self {
        Self { tls, database }
    }

    fn opts(&self, address: &HostAddress, options: &ClientOptions) -> Opts {
        let mut builder = OptsBuilder::default()
            .ip_or_hostname(address.host.clone())
            .tcp_port(address.port)
            .user(Some(options.credentials.user.clone()))
            .pass(Some(options.credentials.password.clone()))
            .db_name(self.database.clone())
            .enable_cleartext_plugin(options.auth == AuthScheme::ClearPassword)
            .max_allowed_packet(Some(16_777_216))
            .wait_timeout(Some(28800));
        if self.tls {
            builder = builder.ssl_opts(SslOpts::default().with_danger_accept_invalid_certs(true));
        }
        builder.into()
    }
}

#[async_trait]
impl Connector for MySqlConnector {
    async fn connect(
        &self,
        address: &HostAddress,
        options: &ClientOptions,
    ) -> HarnessResult<Box<dyn Connection>> {
        let conn = Conn::new(self.opts(address, options))
            .await
            .map_err(|e| connect_error(address, e))?;
        tracing::debug!(address = %address, "MySQL connection established");
        Ok(Box::new(MySqlConnection {
            address: address.clone(),
            conn: Some(conn),
        }))
    }
}

fn connect_error(address: &HostAddress, e: mysql_async::Error) -> HarnessError {
    match &e {
        mysql_async::Error::Io(mysql_async::IoError::Io(io))
            if io.kind() == std::io::ErrorKind::ConnectionRefused =>
        {
            HarnessError::ConnectionRefused {
                address: address.clone(),
            }
        }
        _ => HarnessError::Connect {
            address: address.clone(),
            message: e.to_string(),
        },
    }
}

fn call_error(procedure: &str, e: mysql_async::Error) -> HarnessError {
    let status = match &e {
        mysql_async::Error::Server(_) => CallStatus::GracefulFailure,
        mysql_async::Error::Io(_) => CallStatus::ConnectionLost,
        _ => CallStatus::UnexpectedFailure,
    };
    let message = match &e {
        mysql_async::Error::Server(server) => server.message.clone(),
        other => other.to_string(),
    };
    ProcCallFailure::new(procedure, status, message).into()
}

struct MySqlConnection {
    address: HostAddress,
    conn: Option<Conn>,
}

/// Read every result set of a query result into tables
macro_rules! collect_tables {
    ($result:expr) => {{
        let mut result = $result;
        let mut tables = Vec::new();
        while !result.is_empty() {
            let columns = result.columns();
            let affected = result.affected_rows();
            let rows: Vec<Row> = result.collect().await?;
            tables.push((columns, affected, rows));
        }
        Ok::<_, mysql_async::Error>(tables)
    }};
}

type RawResultSet = (Option<std::sync::Arc<[mysql_async::Column]>>, u64, Vec<Row>);

impl MySqlConnection {
    fn conn(&mut self) -> HarnessResult<&mut Conn> {
        self.conn.as_mut().ok_or(HarnessError::Closed)
    }

    async fn run(&mut self, sql: &str, params: &[Value]) -> Result<Vec<RawResultSet>, mysql_async::Error> {
        let conn = match self.conn.as_mut() {
            Some(conn) => conn,
            None => return Ok(Vec::new()),
        };
        if params.is_empty() {
            collect_tables!(conn.query_iter(sql).await?)
        } else {
            let bound = Params::Positional(params.iter().map(to_wire).collect());
            collect_tables!(conn.exec_iter(sql, bound).await?)
        }
    }
}

#[async_trait]
impl Connection for MySqlConnection {
    async fn invoke(&mut self, procedure: &str, params: &[Value]) -> HarnessResult<Vec<ResultTable>> {
        self.conn()?;
        let (sql, bound): (String, &[Value]) = match procedure {
            ADHOC => match params.split_first() {
                Some((Value::Varchar(sql), rest)) => (sql.clone(), rest),
                _ => {
                    return Err(ProcCallFailure::graceful(
                        procedure,
                        "@AdHoc expects a SQL string as its first parameter",
                    )
                    .into())
                }
            },
            SYSTEM_CATALOG => {
                let selector = match params.first() {
                    Some(Value::Varchar(s)) => s.to_ascii_uppercase(),
                    _ => String::new(),
                };
                let sql = match selector.as_str() {
                    "TABLES" => CATALOG_TABLES_SQL,
                    "COLUMNS" => CATALOG_COLUMNS_SQL,
                    "PROCEDURES" => CATALOG_PROCEDURES_SQL,
                    _ => {
                        return Err(ProcCallFailure::graceful(
                            procedure,
                            format!("unknown @SystemCatalog selector '{}'", selector),
                        )
                        .into())
                    }
                };
                (sql.to_string(), &[])
            }
            name if name.starts_with('@') => {
                return Err(ProcCallFailure::graceful(
                    procedure,
                    format!("system procedure {} is not available over MySQL", name),
                )
                .into())
            }
            name => {
                let placeholders = vec!["?"; params.len()].join(", ");
                (format!("CALL {}({})", name, placeholders), params)
            }
        };

        let raw = self
            .run(&sql, bound)
            .await
            .map_err(|e| call_error(procedure, e))?;
        raw.into_iter().map(to_table).collect()
    }

    async fn drain(&mut self) -> HarnessResult<()> {
        // The protocol is strictly request/response; nothing is in flight
        // once invoke has returned.
        Ok(())
    }

    async fn close(&mut self) -> HarnessResult<()> {
        if let Some(conn) = self.conn.take() {
            conn.disconnect().await.map_err(|e| HarnessError::Connect {
                address: self.address.clone(),
                message: format!("disconnect failed: {}", e),
            })?;
        }
        Ok(())
    }
}

fn to_wire(value: &Value) -> mysql_async::Value {
    use mysql_async::Value as W;
    match value {
        Value::Null => W::NULL,
        Value::Integer(i) => W::Int(*i),
        Value::Float(f) => W::Double(*f),
        Value::Decimal(d) => W::Bytes(d.to_string().into_bytes()),
        Value::Varchar(s) => W::Bytes(s.clone().into_bytes()),
        Value::Varbinary(b) => W::Bytes(b.clone()),
        Value::Timestamp(micros) => match chrono::DateTime::from_timestamp_micros(*micros) {
            Some(ts) => {
                let ts = ts.naive_utc();
                W::Date(
                    ts.year() as u16,
                    ts.month() as u8,
                    ts.day() as u8,
                    ts.hour() as u8,
                    ts.minute() as u8,
                    ts.second() as u8,
                    ts.nanosecond() / 1000,
                )
            }
            None => W::NULL,
        },
        Value::Point(p) => W::Bytes(p.to_string().into_bytes()),
        Value::Geography(g) => W::Bytes(g.to_string().into_bytes()),
    }
}

/// Wire column type to declared type (the inverse of the server's mapping)
fn column_type(column: &mysql_async::Column) -> ColumnType {
    let binary = column.character_set() == BINARY_CHARSET;
    match column.column_type() {
        WireType::MYSQL_TYPE_TINY => ColumnType::TinyInt,
        WireType::MYSQL_TYPE_SHORT | WireType::MYSQL_TYPE_YEAR => ColumnType::SmallInt,
        WireType::MYSQL_TYPE_LONG | WireType::MYSQL_TYPE_INT24 => ColumnType::Integer,
        WireType::MYSQL_TYPE_LONGLONG => ColumnType::BigInt,
        WireType::MYSQL_TYPE_FLOAT | WireType::MYSQL_TYPE_DOUBLE => ColumnType::Float,
        WireType::MYSQL_TYPE_DECIMAL | WireType::MYSQL_TYPE_NEWDECIMAL => ColumnType::Decimal,
        WireType::MYSQL_TYPE_TIMESTAMP
        | WireType::MYSQL_TYPE_TIMESTAMP2
        | WireType::MYSQL_TYPE_DATETIME
        | WireType::MYSQL_TYPE_DATETIME2
        | WireType::MYSQL_TYPE_DATE
        | WireType::MYSQL_TYPE_NEWDATE => ColumnType::Timestamp,
        WireType::MYSQL_TYPE_GEOMETRY => ColumnType::Geography,
        WireType::MYSQL_TYPE_TINY_BLOB
        | WireType::MYSQL_TYPE_MEDIUM_BLOB
        | WireType::MYSQL_TYPE_LONG_BLOB
        | WireType::MYSQL_TYPE_BLOB
        | WireType::MYSQL_TYPE_VAR_STRING
        | WireType::MYSQL_TYPE_STRING
        | WireType::MYSQL_TYPE_VARCHAR
        | WireType::MYSQL_TYPE_BIT
            if binary =>
        {
            ColumnType::Varbinary
        }
        _ => ColumnType::Varchar,
    }
}

fn to_table((columns, affected, rows): RawResultSet) -> HarnessResult<ResultTable> {
    let columns = match columns {
        Some(columns) if !columns.is_empty() => columns,
        _ => {
            let table = ResultTable::of_longs(MODIFIED_TUPLES, &[Some(affected as i64)]);
            return Ok(table);
        }
    };

    let mut declared: Vec<Column> = columns
        .iter()
        .map(|c| Column::new(c.name_str().to_string(), column_type(c)))
        .collect();

    let mut converted = Vec::with_capacity(rows.len());
    for row in rows {
        let mut values = Vec::with_capacity(declared.len());
        for (idx, column) in declared.iter().enumerate() {
            let wire = row.as_ref(idx).cloned().unwrap_or(mysql_async::Value::NULL);
            values.push(from_wire(idx, column.ty, wire)?);
        }
        converted.push(values);
    }

    settle_geometry(&mut declared, &converted);

    let mut table = ResultTable::new(declared);
    for values in converted {
        table.add_row(values)?;
    }
    Ok(table)
}

/// GEOMETRY covers both points and polygons; the data decides. A column
/// becomes GeographyPoint only when it holds a point and nothing but points.
fn settle_geometry(declared: &mut [Column], rows: &[Vec<Value>]) {
    for (idx, column) in declared.iter_mut().enumerate() {
        if column.ty != ColumnType::Geography {
            continue;
        }
        let cells = || rows.iter().filter_map(move |row| row.get(idx));
        let any_point = cells().any(|v| matches!(v, Value::Point(_)));
        let all_points = cells().all(|v| matches!(v, Value::Point(_) | Value::Null));
        if any_point && all_points {
            column.ty = ColumnType::GeographyPoint;
        }
    }
}

fn from_wire(column: usize, ty: ColumnType, wire: mysql_async::Value) -> HarnessResult<Value> {
    use mysql_async::Value as W;
    let corrupt = |raw: String| -> HarnessError {
        DecodeError::Corrupt {
            column,
            declared: ty,
            value: Value::Varchar(raw),
        }
        .into()
    };

    let value = match (ty, wire) {
        (_, W::NULL) => Value::Null,
        (_, W::Int(i)) => Value::Integer(i),
        (_, W::UInt(u)) => i64::try_from(u)
            .map(Value::Integer)
            .map_err(|_| corrupt(u.to_string()))?,
        (_, W::Float(f)) => Value::Float(f as f64),
        (_, W::Double(d)) => Value::Float(d),
        (_, W::Date(y, mo, d, h, mi, s, us)) => NaiveDate::from_ymd_opt(y as i32, mo as u32, d as u32)
            .and_then(|date| date.and_hms_micro_opt(h as u32, mi as u32, s as u32, us))
            .map(|ts| Value::Timestamp(ts.and_utc().timestamp_micros()))
            .ok_or_else(|| corrupt(format!("{}-{}-{} {}:{}:{}.{}", y, mo, d, h, mi, s, us)))?,
        (ColumnType::Varbinary, W::Bytes(b)) => Value::Varbinary(b),
        (ty, W::Bytes(b)) => {
            let text = String::from_utf8_lossy(&b).into_owned();
            match ty {
                t if t.is_integer() => text
                    .parse::<i64>()
                    .map(Value::Integer)
                    .map_err(|_| corrupt(text.clone()))?,
                ColumnType::Float => text
                    .parse::<f64>()
                    .map(Value::Float)
                    .map_err(|_| corrupt(text.clone()))?,
                ColumnType::Decimal => parse_exact(&text)
                    .map(Value::Decimal)
                    .map_err(|_| corrupt(text.clone()))?,
                ColumnType::Timestamp => parse_timestamp(&text).ok_or_else(|| corrupt(text.clone()))?,
                ColumnType::Geography | ColumnType::GeographyPoint => {
                    if text.trim_start().to_ascii_uppercase().starts_with("POINT") {
                        GeographyPoint::from_wkt(&text)
                            .map(Value::Point)
                            .map_err(|_| corrupt(text.clone()))?
                    } else {
                        Geography::from_wkt(&text)
                            .map(Value::Geography)
                            .map_err(|_| corrupt(text.clone()))?
                    }
                }
                _ => Value::Varchar(text),
            }
        }
        (_, other) => Value::Varchar(format!("{:?}", other)),
    };
    Ok(value)
}

fn parse_timestamp(text: &str) -> Option<Value> {
    let text = text.trim();
    chrono::NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f")
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .map(|ts| Value::Timestamp(ts.and_utc().timestamp_micros()))
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use rust_decimal::Decimal;

    use super::*;

    #[test]
    fn test_text_cells_decode_by_declared_type() {
        let w = |s: &str| mysql_async::Value::Bytes(s.as_bytes().to_vec());
        assert_eq!(
            from_wire(0, ColumnType::BigInt, w("-42")).unwrap(),
            Value::Integer(-42)
        );
        assert_eq!(
            from_wire(0, ColumnType::Float, w("2.5")).unwrap(),
            Value::Float(2.5)
        );
        assert_eq!(
            from_wire(0, ColumnType::Decimal, w("1.10")).unwrap(),
            Value::Decimal(Decimal::from_str("1.10").unwrap())
        );
        assert_eq!(
            from_wire(0, ColumnType::Timestamp, w("1970-01-01 00:00:02.5")).unwrap(),
            Value::Timestamp(2_500_000)
        );
        assert_eq!(
            from_wire(0, ColumnType::Varchar, mysql_async::Value::NULL).unwrap(),
            Value::Null
        );
        assert!(matches!(
            from_wire(3, ColumnType::Integer, w("abc")),
            Err(HarnessError::Decode(DecodeError::Corrupt { column: 3, .. }))
        ));
    }

    #[test]
    fn test_out_of_range_cells_are_corrupt() {
        let w = |s: &str| mysql_async::Value::Bytes(s.as_bytes().to_vec());
        assert_eq!(
            from_wire(0, ColumnType::BigInt, mysql_async::Value::UInt(i64::MAX as u64)).unwrap(),
            Value::Integer(i64::MAX)
        );
        match from_wire(1, ColumnType::BigInt, mysql_async::Value::UInt(u64::MAX)) {
            Err(HarnessError::Decode(DecodeError::Corrupt { column: 1, value, .. })) => {
                assert_eq!(value, Value::Varchar(u64::MAX.to_string()));
            }
            other => panic!("unexpected decode {:?}", other),
        }
        // 38 digits do not fit a Decimal without rounding
        let wide = "12345678901234567890123456.123456789012";
        match from_wire(2, ColumnType::Decimal, w(wide)) {
            Err(HarnessError::Decode(DecodeError::Corrupt { column: 2, declared, value })) => {
                assert_eq!(declared, ColumnType::Decimal);
                assert_eq!(value, Value::Varchar(wide.to_string()));
            }
            other => panic!("unexpected decode {:?}", other),
        }
    }

    #[test]
    fn test_geometry_column_retyped_only_when_all_points() {
        let point = || Value::Point(GeographyPoint::from_wkt("POINT(1 2)").unwrap());
        let polygon =
            || Value::Geography(Geography::from_wkt("POLYGON((0 0, 1 0, 1 1, 0 0))").unwrap());
        let geometry = || vec![Column::new("G", ColumnType::Geography)];

        let mut declared = geometry();
        settle_geometry(&mut declared, &[vec![point()], vec![Value::Null]]);
        assert_eq!(declared[0].ty, ColumnType::GeographyPoint);

        let mut declared = geometry();
        settle_geometry(&mut declared, &[vec![point()], vec![polygon()]]);
        assert_eq!(declared[0].ty, ColumnType::Geography);

        let mut declared = geometry();
        settle_geometry(&mut declared, &[vec![Value::Null]]);
        assert_eq!(declared[0].ty, ColumnType::Geography);
    }

    #[test]
    fn test_geometry_text_picks_point_or_polygon() {
        let w = |s: &str| mysql_async::Value::Bytes(s.as_bytes().to_vec());
        assert!(matches!(
            from_wire(0, ColumnType::Geography, w("POINT(1 2)")).unwrap(),
            Value::Point(_)
        ));
        assert!(matches!(
            from_wire(0, ColumnType::Geography, w("POLYGON((0 0, 1 0, 1 1, 0 0))")).unwrap(),
            Value::Geography(_)
        ));
    }

    #[test]
    fn test_timestamp_param_round_trips_fields() {
        match to_wire(&Value::Timestamp(86_400_000_001)) {
            mysql_async::Value::Date(y, mo, d, h, mi, s, us) => {
                assert_eq!((y, mo, d, h, mi, s, us), (1970, 1, 2, 0, 0, 0, 1));
            }
            other => panic!("unexpected wire value {:?}", other),
        }
    }

    #[test]
    fn test_statement_without_rows_reports_modified_tuples() {
        let table = to_table((None, 3, Vec::new())).unwrap();
        assert_eq!(table.column_name(0).unwrap(), MODIFIED_TUPLES);
        assert_eq!(table.row(0).unwrap().get_long(0).unwrap().value, 3);
    }
}
