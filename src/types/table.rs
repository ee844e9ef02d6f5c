//! Result tables as returned by a procedure call
//!
//! A table is read-only once built. Cells are read through typed accessors
//! on [`TableRow`]; each accessor decodes only the column types it declares
//! and reports NULL independently of the decoded value.

use std::cmp::Ordering;
use std::fmt;

use rust_decimal::Decimal;
use thiserror::Error;

use super::geography::{Geography, GeographyPoint};
use super::value::{ColumnType, Value, NULL_FLOAT};

/// Accessor failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    /// The column's declared type cannot be read as the requested type
    #[error("column {column} is declared {declared}, cannot read as {requested}")]
    TypeMismatch {
        column: usize,
        declared: ColumnType,
        requested: &'static str,
    },

    #[error("column index {index} out of bounds (table has {count} columns)")]
    ColumnOutOfRange { index: usize, count: usize },

    #[error("row index {index} out of bounds (table has {count} rows)")]
    RowOutOfRange { index: usize, count: usize },

    #[error("no column named {0}")]
    NoSuchColumn(String),

    #[error("row has {got} values, table has {expected} columns")]
    Arity { expected: usize, got: usize },

    /// Cell decodes but does not fit the requested width
    #[error("column {column} holds {value}, outside the range of {requested}")]
    OutOfRange {
        column: usize,
        value: String,
        requested: &'static str,
    },

    /// Stored cell does not agree with its column's declared type
    #[error("column {column} holds {value:?}, not a {declared} value")]
    Corrupt {
        column: usize,
        declared: ColumnType,
        value: Value,
    },
}

/// A fixed-width read: the encoded value plus the was-null flag.
///
/// For a NULL cell `value` holds the column type's in-band sentinel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fetched<T> {
    pub value: T,
    pub was_null: bool,
}

/// Column metadata
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub ty: ColumnType,
}

impl Column {
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// An ordered sequence of typed rows
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResultTable {
    columns: Vec<Column>,
    rows: Vec<Vec<Value>>,
}

impl ResultTable {
    /// Create an empty table with the given columns
    pub fn new(columns: Vec<Column>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Append a row, checking its arity
    pub fn add_row(&mut self, row: Vec<Value>) -> Result<(), DecodeError> {
        if row.len() != self.columns.len() {
            return Err(DecodeError::Arity {
                expected: self.columns.len(),
                got: row.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    /// Builder-style [`Self::add_row`]
    pub fn with_row(mut self, row: Vec<Value>) -> Result<Self, DecodeError> {
        self.add_row(row)?;
        Ok(self)
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_name(&self, index: usize) -> Result<&str, DecodeError> {
        self.column(index).map(|c| c.name.as_str())
    }

    pub fn column_type(&self, index: usize) -> Result<ColumnType, DecodeError> {
        self.column(index).map(|c| c.ty)
    }

    /// Case-insensitive column lookup
    pub fn column_index(&self, name: &str) -> Result<usize, DecodeError> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| DecodeError::NoSuchColumn(name.to_string()))
    }

    fn column(&self, index: usize) -> Result<&Column, DecodeError> {
        self.columns.get(index).ok_or(DecodeError::ColumnOutOfRange {
            index,
            count: self.columns.len(),
        })
    }

    /// Get a row by index
    pub fn row(&self, index: usize) -> Result<TableRow<'_>, DecodeError> {
        if index >= self.rows.len() {
            return Err(DecodeError::RowOutOfRange {
                index,
                count: self.rows.len(),
            });
        }
        Ok(TableRow { table: self, index })
    }

    /// Iterate rows in order
    pub fn rows(&self) -> impl Iterator<Item = TableRow<'_>> {
        (0..self.rows.len()).map(move |index| TableRow { table: self, index })
    }

    /// A copy with rows ordered by the given columns (then by all others).
    ///
    /// Row comparison is order-sensitive; sorting both sides the same way is
    /// the supported way to compare results of unordered queries.
    pub fn sorted_by(&self, key_columns: &[usize]) -> Self {
        let mut rows = self.rows.clone();
        rows.sort_by(|a, b| {
            key_columns
                .iter()
                .copied()
                .chain(0..a.len())
                .map(|i| match (a.get(i), b.get(i)) {
                    (Some(x), Some(y)) => x.sort_cmp(y),
                    _ => Ordering::Equal,
                })
                .find(|o| *o != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        });
        Self {
            columns: self.columns.clone(),
            rows,
        }
    }

    /// Convenience for single-column BIGINT tables in tests and fakes
    pub fn of_longs(column: &str, values: &[Option<i64>]) -> Self {
        Self {
            columns: vec![Column::new(column, ColumnType::BigInt)],
            rows: values.iter().map(|v| vec![Value::from(*v)]).collect(),
        }
    }
}

impl fmt::Display for ResultTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let header: Vec<String> = self
            .columns
            .iter()
            .map(|c| format!("{}({})", c.name, c.ty))
            .collect();
        writeln!(f, "header: [{}]", header.join(", "))?;
        for (idx, row) in self.rows.iter().enumerate() {
            let cells: Vec<String> = row.iter().map(|v| v.to_string()).collect();
            writeln!(f, "row {}: [{}]", idx, cells.join(", "))?;
        }
        Ok(())
    }
}

/// A borrowed view of one row
#[derive(Debug, Clone, Copy)]
pub struct TableRow<'a> {
    table: &'a ResultTable,
    index: usize,
}

impl<'a> TableRow<'a> {
    /// Position of this row in its table
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn table(&self) -> &'a ResultTable {
        self.table
    }

    pub fn column_count(&self) -> usize {
        self.table.columns.len()
    }

    /// The raw cell
    pub fn value(&self, column: usize) -> Result<&'a Value, DecodeError> {
        let count = self.table.columns.len();
        self.table.rows[self.index]
            .get(column)
            .ok_or(DecodeError::ColumnOutOfRange {
                index: column,
                count,
            })
    }

    fn typed(
        &self,
        column: usize,
        requested: &'static str,
        ok: fn(ColumnType) -> bool,
    ) -> Result<(ColumnType, &'a Value), DecodeError> {
        let declared = self.table.column_type(column)?;
        if !ok(declared) {
            return Err(DecodeError::TypeMismatch {
                column,
                declared,
                requested,
            });
        }
        Ok((declared, self.value(column)?))
    }

    fn corrupt(&self, column: usize, declared: ColumnType, value: &Value) -> DecodeError {
        DecodeError::Corrupt {
            column,
            declared,
            value: value.clone(),
        }
    }

    /// Read an integer column (any width)
    pub fn get_long(&self, column: usize) -> Result<Fetched<i64>, DecodeError> {
        let (declared, value) = self.typed(column, "long", |t| t.is_integer())?;
        match value {
            Value::Integer(v) => Ok(Fetched {
                value: *v,
                was_null: false,
            }),
            Value::Null => Ok(Fetched {
                value: declared.null_long().unwrap_or(i64::MIN),
                was_null: true,
            }),
            other => Err(self.corrupt(column, declared, other)),
        }
    }

    /// Read a FLOAT column. NULL reads as [`NULL_FLOAT`].
    pub fn get_double(&self, column: usize) -> Result<Fetched<f64>, DecodeError> {
        let (declared, value) = self.typed(column, "double", |t| t == ColumnType::Float)?;
        match value {
            Value::Float(v) => Ok(Fetched {
                value: *v,
                was_null: false,
            }),
            Value::Null => Ok(Fetched {
                value: NULL_FLOAT,
                was_null: true,
            }),
            other => Err(self.corrupt(column, declared, other)),
        }
    }

    /// Read a TIMESTAMP column as microseconds since the epoch
    pub fn get_timestamp_as_long(&self, column: usize) -> Result<Fetched<i64>, DecodeError> {
        let (declared, value) =
            self.typed(column, "timestamp", |t| t == ColumnType::Timestamp)?;
        match value {
            Value::Timestamp(v) => Ok(Fetched {
                value: *v,
                was_null: false,
            }),
            Value::Null => Ok(Fetched {
                value: i64::MIN,
                was_null: true,
            }),
            other => Err(self.corrupt(column, declared, other)),
        }
    }

    /// Read a DECIMAL column
    pub fn get_decimal(&self, column: usize) -> Result<Option<Decimal>, DecodeError> {
        let (declared, value) = self.typed(column, "decimal", |t| t == ColumnType::Decimal)?;
        match value {
            Value::Decimal(d) => Ok(Some(*d)),
            Value::Null => Ok(None),
            other => Err(self.corrupt(column, declared, other)),
        }
    }

    /// Read a VARCHAR column
    pub fn get_string(&self, column: usize) -> Result<Option<&'a str>, DecodeError> {
        let (declared, value) = self.typed(column, "string", |t| t == ColumnType::Varchar)?;
        match value {
            Value::Varchar(s) => Ok(Some(s.as_str())),
            Value::Null => Ok(None),
            other => Err(self.corrupt(column, declared, other)),
        }
    }

    /// Read a VARCHAR column by name
    pub fn get_string_by_name(&self, name: &str) -> Result<Option<&'a str>, DecodeError> {
        self.get_string(self.table.column_index(name)?)
    }

    /// Read a VARBINARY column
    pub fn get_bytes(&self, column: usize) -> Result<Option<&'a [u8]>, DecodeError> {
        let (declared, value) =
            self.typed(column, "varbinary", |t| t == ColumnType::Varbinary)?;
        match value {
            Value::Varbinary(b) => Ok(Some(b.as_slice())),
            Value::Null => Ok(None),
            other => Err(self.corrupt(column, declared, other)),
        }
    }

    /// Read a GEOGRAPHY_POINT column
    pub fn get_point(&self, column: usize) -> Result<Option<GeographyPoint>, DecodeError> {
        let (declared, value) =
            self.typed(column, "geography point", |t| t == ColumnType::GeographyPoint)?;
        match value {
            Value::Point(p) => Ok(Some(*p)),
            Value::Null => Ok(None),
            other => Err(self.corrupt(column, declared, other)),
        }
    }

    /// Read a GEOGRAPHY column
    pub fn get_geography(&self, column: usize) -> Result<Option<&'a Geography>, DecodeError> {
        let (declared, value) =
            self.typed(column, "geography", |t| t == ColumnType::Geography)?;
        match value {
            Value::Geography(g) => Ok(Some(g)),
            Value::Null => Ok(None),
            other => Err(self.corrupt(column, declared, other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mixed_table() -> ResultTable {
        ResultTable::new(vec![
            Column::new("ID", ColumnType::TinyInt),
            Column::new("RATIO", ColumnType::Float),
            Column::new("NAME", ColumnType::Varchar),
        ])
        .with_row(vec![Value::Integer(3), Value::Float(0.5), "a".into()])
        .unwrap()
        .with_row(vec![Value::Null, Value::Null, Value::Null])
        .unwrap()
    }

    #[test]
    fn test_null_reads_sentinel_and_flag() {
        let table = mixed_table();
        let row = table.row(1).unwrap();
        assert_eq!(
            row.get_long(0).unwrap(),
            Fetched {
                value: -128,
                was_null: true
            }
        );
        let d = row.get_double(1).unwrap();
        assert!(d.was_null);
        assert_eq!(d.value, NULL_FLOAT);
        assert_eq!(row.get_string(2).unwrap(), None);
    }

    #[test]
    fn test_accessor_type_mismatch() {
        let table = mixed_table();
        let row = table.row(0).unwrap();
        assert!(matches!(
            row.get_long(1),
            Err(DecodeError::TypeMismatch { column: 1, .. })
        ));
        assert!(matches!(
            row.get_double(0),
            Err(DecodeError::TypeMismatch { column: 0, .. })
        ));
        assert!(matches!(
            row.get_long(7),
            Err(DecodeError::ColumnOutOfRange { index: 7, count: 3 })
        ));
    }

    #[test]
    fn test_arity_checked() {
        let mut table = ResultTable::new(vec![Column::new("A", ColumnType::BigInt)]);
        assert_eq!(
            table.add_row(vec![]),
            Err(DecodeError::Arity {
                expected: 1,
                got: 0
            })
        );
    }

    #[test]
    fn test_sorted_by() {
        let table = ResultTable::of_longs("A", &[Some(3), None, Some(1)]);
        let sorted = table.sorted_by(&[0]);
        let values: Vec<_> = sorted
            .rows()
            .map(|r| r.get_long(0).unwrap().was_null)
            .collect();
        assert_eq!(values, vec![true, false, false]);
        assert_eq!(sorted.row(2).unwrap().get_long(0).unwrap().value, 3);
    }

    #[test]
    fn test_column_lookup_by_name() {
        let table = mixed_table();
        assert_eq!(table.column_index("name"), Ok(2));
        assert_eq!(
            table.row(0).unwrap().get_string_by_name("NAME").unwrap(),
            Some("a")
        );
        assert!(table.column_index("missing").is_err());
    }
}
