//! A tiny in-memory reference engine.
//!
//! Understands just enough SQL for lifecycle tests: `CREATE TABLE|VIEW|STREAM
//! name`, `CREATE PROCEDURE name`, `INSERT INTO name VALUES (n)`, `DELETE
//! FROM name`, `SELECT COUNT(*) FROM name`, plus `@SystemCatalog`.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use roodb_regress::client::{ADHOC, SYSTEM_CATALOG};
use roodb_regress::error::{HarnessResult, ProcCallFailure};
use roodb_regress::topology::{Schema, MATERIALIZED_VIEW_REJECTION};
use roodb_regress::types::{Column, ColumnType, ResultTable, Value};

#[derive(Debug, Clone)]
struct FakeTable {
    kind: &'static str,
    rows: Vec<i64>,
}

#[derive(Default)]
struct State {
    tables: BTreeMap<String, FakeTable>,
    order: Vec<String>,
    procedures: Vec<String>,
}

#[derive(Default)]
pub struct FakeEngine {
    state: Mutex<State>,
    log: Mutex<Vec<String>>,
    /// Message returned by every DELETE on a plain table
    delete_failure: Mutex<Option<String>>,
    /// How long every INSERT waits before it is applied
    insert_delay: Mutex<Option<Duration>>,
    pub loads: AtomicUsize,
    pub resets: AtomicUsize,
    pub shutdowns: AtomicUsize,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call seen, as `procedure` or `procedure: sql`
    pub fn log(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    pub fn clear_log(&self) {
        self.log.lock().clear();
    }

    pub fn fail_deletes_with(&self, message: &str) {
        *self.delete_failure.lock() = Some(message.to_string());
    }

    pub fn delay_inserts(&self, delay: Duration) {
        *self.insert_delay.lock() = Some(delay);
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.state
            .lock()
            .tables
            .get(&table.to_ascii_uppercase())
            .map_or(0, |t| t.rows.len())
    }

    fn execute_ddl(&self, state: &mut State, sql: &str) -> Result<(), String> {
        let words: Vec<&str> = sql.split_whitespace().collect();
        let upper: Vec<String> = words.iter().map(|w| w.to_ascii_uppercase()).collect();
        let kind = match upper.get(1).map(String::as_str) {
            Some("TABLE") => "TABLE",
            Some("VIEW") => "VIEW",
            Some("STREAM") => "EXPORT",
            Some("PROCEDURE") => {
                let name = words.get(2).ok_or("missing procedure name")?;
                state.procedures.push(name.to_ascii_uppercase());
                return Ok(());
            }
            _ => return Err(format!("unsupported DDL: {}", sql)),
        };
        let name = words
            .get(2)
            .ok_or("missing object name")?
            .trim_end_matches('(')
            .to_ascii_uppercase();
        if state.tables.contains_key(&name) {
            return Err(format!("object {} already exists", name));
        }
        state.order.push(name.clone());
        state.tables.insert(name, FakeTable { kind, rows: Vec::new() });
        Ok(())
    }

    fn adhoc(&self, sql: &str) -> Result<Vec<ResultTable>, String> {
        let mut state = self.state.lock();
        let words: Vec<&str> = sql.split_whitespace().collect();
        let upper: Vec<String> = words.iter().map(|w| w.to_ascii_uppercase()).collect();
        let table_at = |i: usize| -> Result<String, String> {
            upper
                .get(i)
                .map(|s| s.trim_end_matches(';').to_string())
                .ok_or_else(|| format!("malformed statement: {}", sql))
        };

        match upper.first().map(String::as_str) {
            Some("CREATE") => {
                self.execute_ddl(&mut state, sql)?;
                Ok(vec![ResultTable::of_longs("modified_tuples", &[Some(0)])])
            }
            Some("INSERT") => {
                let name = table_at(2)?;
                let value: i64 = sql
                    .rsplit('(')
                    .next()
                    .and_then(|v| v.trim_end_matches([')', ';', ' ']).trim().parse().ok())
                    .ok_or_else(|| format!("bad INSERT: {}", sql))?;
                let table = state
                    .tables
                    .get_mut(&name)
                    .ok_or_else(|| format!("object {} not found", name))?;
                if table.kind == "VIEW" {
                    return Err(format!("{}.", MATERIALIZED_VIEW_REJECTION));
                }
                table.rows.push(value);
                Ok(vec![ResultTable::of_longs("modified_tuples", &[Some(1)])])
            }
            Some("DELETE") => {
                let name = table_at(2)?;
                let failure = self.delete_failure.lock().clone();
                let table = state
                    .tables
                    .get_mut(&name)
                    .ok_or_else(|| format!("object {} not found", name))?;
                if table.kind == "VIEW" {
                    return Err(format!("{}.", MATERIALIZED_VIEW_REJECTION));
                }
                if let Some(message) = failure {
                    return Err(message);
                }
                let n = table.rows.len() as i64;
                table.rows.clear();
                Ok(vec![ResultTable::of_longs("modified_tuples", &[Some(n)])])
            }
            Some("SELECT") if upper.get(1).map(String::as_str) == Some("COUNT(*)") => {
                let name = table_at(3)?;
                let table = state
                    .tables
                    .get(&name)
                    .ok_or_else(|| format!("object {} not found", name))?;
                Ok(vec![ResultTable::of_longs("C1", &[Some(table.rows.len() as i64)])])
            }
            _ => Err(format!("unsupported statement: {}", sql)),
        }
    }

    fn catalog(&self, selector: &str) -> Result<Vec<ResultTable>, String> {
        let state = self.state.lock();
        let varchar = |name: &str| Column::new(name, ColumnType::Varchar);
        let table = match selector {
            "TABLES" => {
                let mut t = ResultTable::new(vec![varchar("TABLE_NAME"), varchar("TABLE_TYPE")]);
                for name in &state.order {
                    let kind = state.tables[name].kind;
                    t.add_row(vec![name.as_str().into(), kind.into()])
                        .map_err(|e| e.to_string())?;
                }
                t
            }
            "COLUMNS" => {
                let mut t = ResultTable::new(vec![
                    varchar("TABLE_NAME"),
                    varchar("COLUMN_NAME"),
                    varchar("TYPE_NAME"),
                ]);
                for name in &state.order {
                    t.add_row(vec![name.as_str().into(), "V".into(), "BIGINT".into()])
                        .map_err(|e| e.to_string())?;
                }
                t
            }
            "PROCEDURES" => {
                let mut t = ResultTable::new(vec![varchar("PROCEDURE_NAME")]);
                for name in &state.procedures {
                    t.add_row(vec![name.as_str().into()]).map_err(|e| e.to_string())?;
                }
                t
            }
            other => return Err(format!("unknown selector {}", other)),
        };
        Ok(vec![table])
    }
}

#[async_trait]
impl roodb_regress::topology::ReferenceEngine for FakeEngine {
    fn name(&self) -> &str {
        "fake"
    }

    async fn load_schema(&self, schema: &Schema) -> HarnessResult<()> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock();
        *state = State::default();
        for ddl in &schema.ddl {
            self.execute_ddl(&mut state, ddl)
                .map_err(|m| ProcCallFailure::graceful("load_schema", m))?;
        }
        Ok(())
    }

    async fn reset(&self) -> HarnessResult<()> {
        self.resets.fetch_add(1, Ordering::SeqCst);
        for table in self.state.lock().tables.values_mut() {
            table.rows.clear();
        }
        Ok(())
    }

    async fn invoke(&self, procedure: &str, params: &[Value]) -> HarnessResult<Vec<ResultTable>> {
        let text = match params.first() {
            Some(Value::Varchar(s)) => s.clone(),
            _ => String::new(),
        };
        let delay = *self.insert_delay.lock();
        if let Some(delay) = delay {
            if procedure == ADHOC && text.to_ascii_uppercase().starts_with("INSERT") {
                tokio::time::sleep(delay).await;
            }
        }
        self.log.lock().push(if text.is_empty() {
            procedure.to_string()
        } else {
            format!("{}: {}", procedure, text)
        });

        let result = match procedure {
            ADHOC => self.adhoc(&text),
            SYSTEM_CATALOG => self.catalog(&text.to_ascii_uppercase()),
            name => {
                let known = self.state.lock().procedures.contains(&name.to_ascii_uppercase());
                if known {
                    Ok(vec![ResultTable::of_longs("ARGS", &[Some(params.len() as i64)])])
                } else {
                    Err(format!("Procedure {} was not found", name))
                }
            }
        };
        result.map_err(|m| ProcCallFailure::graceful(procedure, m).into())
    }

    async fn shutdown(&self) -> HarnessResult<()> {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        *self.state.lock() = State::default();
        Ok(())
    }
}
