//! Catalog snapshots, diffs and user-table truncation
//!
//! A snapshot is a canonical, line-per-object digest of what the engine's
//! `@SystemCatalog` reports for tables, columns and procedures. Two
//! snapshots diff line by line; the first line of every diff is the
//! boilerplate [`SCHEMA_CHANGED_MARKER`], so a clean diff has exactly one
//! line.

use std::collections::HashSet;
use std::fmt;

use crate::client::{Client, Connector, SYSTEM_CATALOG};
use crate::config::ClientOptions;
use crate::error::{HarnessError, HarnessResult};
use crate::types::{ResultTable, Value};

use super::HostAddress;

/// First line of every catalog diff
pub const SCHEMA_CHANGED_MARKER: &str = "schemaChanged";

/// The one truncation failure teardown accepts
pub const MATERIALIZED_VIEW_REJECTION: &str = "Illegal to modify a materialized view";

/// Table type reported for export streams, which are never truncated
const EXPORT_TABLE_TYPE: &str = "EXPORT";

/// Structural digest of schema and procedures
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogSnapshot {
    lines: Vec<String>,
}

impl CatalogSnapshot {
    /// Build a snapshot from raw digest lines
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }

    /// Query the engine's catalog through `client`
    pub async fn capture(client: &Client) -> HarnessResult<Self> {
        let mut lines = Vec::new();

        let tables = catalog_table(client, "TABLES").await?;
        for row in tables.rows() {
            let name = row.get_string_by_name("TABLE_NAME")?.unwrap_or_default();
            let kind = row.get_string_by_name("TABLE_TYPE")?.unwrap_or_default();
            lines.push(format!("table {} {}", name.to_ascii_uppercase(), kind));
        }

        let columns = catalog_table(client, "COLUMNS").await?;
        let nullable = columns.column_index("IS_NULLABLE").ok();
        for row in columns.rows() {
            let table = row.get_string_by_name("TABLE_NAME")?.unwrap_or_default();
            let column = row.get_string_by_name("COLUMN_NAME")?.unwrap_or_default();
            let ty = row.get_string_by_name("TYPE_NAME")?.unwrap_or_default();
            let null = match nullable {
                Some(idx) => row.get_string(idx)?.unwrap_or_default(),
                None => "",
            };
            lines.push(format!(
                "column {}.{} {} {}",
                table.to_ascii_uppercase(),
                column.to_ascii_uppercase(),
                ty,
                null
            ));
        }

        let procedures = catalog_table(client, "PROCEDURES").await?;
        for row in procedures.rows() {
            let name = row.get_string_by_name("PROCEDURE_NAME")?.unwrap_or_default();
            lines.push(format!("procedure {}", name));
        }

        Ok(Self { lines })
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Diff from `self` (the baseline) to `current`
    pub fn diff(&self, current: &CatalogSnapshot) -> CatalogDiff {
        let before: HashSet<&str> = self.lines.iter().map(String::as_str).collect();
        let after: HashSet<&str> = current.lines.iter().map(String::as_str).collect();

        let mut lines = vec![SCHEMA_CHANGED_MARKER.to_string()];
        lines.extend(
            self.lines
                .iter()
                .filter(|l| !after.contains(l.as_str()))
                .map(|l| format!("- {}", l)),
        );
        lines.extend(
            current
                .lines
                .iter()
                .filter(|l| !before.contains(l.as_str()))
                .map(|l| format!("+ {}", l)),
        );
        CatalogDiff { lines }
    }
}

/// Line diff between two snapshots
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogDiff {
    lines: Vec<String>,
}

impl CatalogDiff {
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Nothing beyond the boilerplate marker
    pub fn is_clean(&self) -> bool {
        self.lines.len() <= 1
    }
}

impl fmt::Display for CatalogDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.lines.join("\n"))
    }
}

async fn catalog_table(client: &Client, selector: &str) -> HarnessResult<ResultTable> {
    let mut tables = client.call(SYSTEM_CATALOG, &[Value::from(selector)]).await?;
    Ok(if tables.is_empty() {
        ResultTable::default()
    } else {
        tables.swap_remove(0)
    })
}

/// Non-export tables in catalog order
pub async fn user_tables(client: &Client) -> HarnessResult<Vec<String>> {
    let tables = catalog_table(client, "TABLES").await?;
    let mut names = Vec::new();
    for row in tables.rows() {
        let kind = row.get_string_by_name("TABLE_TYPE")?.unwrap_or_default();
        if kind.eq_ignore_ascii_case(EXPORT_TABLE_TYPE) {
            continue;
        }
        if let Some(name) = row.get_string_by_name("TABLE_NAME")? {
            names.push(name.to_string());
        }
    }
    Ok(names)
}

/// Delete every row of every user table.
///
/// A materialized view rejects the delete with
/// [`MATERIALIZED_VIEW_REJECTION`]; that failure is skipped, any other is
/// returned. Returns the number of tables emptied.
pub async fn truncate_user_tables(client: &Client) -> HarnessResult<usize> {
    let mut truncated = 0;
    for table in user_tables(client).await? {
        match client.adhoc(&format!("DELETE FROM {}", table)).await {
            Ok(_) => truncated += 1,
            Err(HarnessError::ProcedureCall(failure))
                if failure.message.contains(MATERIALIZED_VIEW_REJECTION) =>
            {
                tracing::trace!(table = %table, "Skipping materialized view");
            }
            Err(e) => return Err(e),
        }
    }
    Ok(truncated)
}

/// Open a single-connection client to `address`, run `f`, close the client
pub(crate) async fn with_admin_session<T, F, Fut>(
    connector: &dyn Connector,
    address: &HostAddress,
    options: &ClientOptions,
    f: F,
) -> HarnessResult<T>
where
    F: FnOnce(Client) -> Fut,
    Fut: std::future::Future<Output = HarnessResult<T>>,
{
    let conn = connector.connect(address, options).await?;
    let client = Client::new(vec![(address.clone(), conn)], options.clone());
    let result = f(client.clone()).await;
    if let Err(e) = client.close().await {
        tracing::debug!(address = %address, error = %e, "Admin session close failed");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_snapshots_diff_to_marker_only() {
        let a = CatalogSnapshot::from_lines(["table T TABLE", "procedure P"]);
        let diff = a.diff(&a.clone());
        assert_eq!(diff.lines(), &[SCHEMA_CHANGED_MARKER.to_string()]);
        assert!(diff.is_clean());
    }

    #[test]
    fn test_added_and_removed_objects_show_in_diff() {
        let a = CatalogSnapshot::from_lines(["table T TABLE", "procedure P"]);
        let b = CatalogSnapshot::from_lines(["table T TABLE", "table U TABLE"]);
        let diff = a.diff(&b);
        assert!(!diff.is_clean());
        assert_eq!(diff.lines()[0], SCHEMA_CHANGED_MARKER);
        assert_eq!(diff.lines()[1], "- procedure P");
        assert_eq!(diff.lines()[2], "+ table U TABLE");
        assert!(diff.to_string().contains("+ table U TABLE"));
    }
}
