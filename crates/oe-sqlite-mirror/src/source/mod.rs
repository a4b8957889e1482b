//! Source database access: catalog introspection and row streaming.
//!
//! The engine talks to the source through the [`SourceReader`] trait so the
//! sync strategies can be exercised against an in-memory implementation in
//! tests. The production implementation is [`odbc::OdbcSource`], compiled
//! behind the `odbc` feature.

#[cfg(feature = "odbc")]
pub mod odbc;

use crate::error::Result;

/// Column name patterns that identify a modification-timestamp column.
/// The first column matching any pattern (in column order) wins.
const TIMESTAMP_PATTERNS: [&str; 5] = ["timestamp", "modified", "updated", "changed", "datetime"];

/// Metadata for one source table, captured at run start.
///
/// Names are lowercased during discovery and used as-is for destination
/// tables and for keys in the progress and hash stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    /// Lowercased table name.
    pub name: String,

    /// Ordered, lowercased column names.
    pub columns: Vec<String>,

    /// Lowercased primary-key column, if the table has one.
    /// Composite keys are not modeled; only the first key column is used.
    pub pk_column: Option<String>,
}

impl TableInfo {
    /// Position of the primary-key column within [`columns`](Self::columns).
    pub fn pk_index(&self) -> Option<usize> {
        let pk = self.pk_column.as_deref()?;
        self.columns.iter().position(|c| c == pk)
    }

    /// First column usable as a modification timestamp, if any.
    pub fn timestamp_column(&self) -> Option<&str> {
        self.columns
            .iter()
            .find(|col| {
                let lower = col.to_lowercase();
                TIMESTAMP_PATTERNS.iter().any(|p| lower.contains(p))
            })
            .map(|s| s.as_str())
    }
}

/// A `column > value` predicate, bound as a query parameter.
#[derive(Debug, Clone)]
pub struct RowFilter {
    /// Column the predicate applies to.
    pub column: String,

    /// Exclusive lower bound, carried as text.
    pub exclusive_min: String,
}

/// A streaming row query against one source table.
#[derive(Debug, Clone)]
pub struct RowQuery {
    /// Schema the table lives in.
    pub schema: String,

    /// Table name.
    pub table: String,

    /// Columns to select, in order.
    pub columns: Vec<String>,

    /// Optional `column > ?` predicate.
    pub filter: Option<RowFilter>,

    /// Optional ascending ordering column.
    pub order_by: Option<String>,
}

impl RowQuery {
    /// Render the query as parameterized SQL.
    pub fn to_sql(&self) -> String {
        let cols = self
            .columns
            .iter()
            .map(|c| format!("\"{}\"", c))
            .collect::<Vec<_>>()
            .join(", ");
        let mut sql = format!("SELECT {} FROM {}.{}", cols, self.schema, self.table);
        if let Some(filter) = &self.filter {
            sql.push_str(&format!(" WHERE \"{}\" > ?", filter.column));
        }
        if let Some(order) = &self.order_by {
            sql.push_str(&format!(" ORDER BY \"{}\" ASC", order));
        }
        sql
    }
}

/// Cursor over the rows of a [`RowQuery`].
///
/// Each row is an ordered sequence of text column values matching the query's
/// column list; NULL is represented as the empty string.
pub trait RowStream {
    /// Fetch the next row, or `None` when the result set is exhausted.
    fn next_row(&mut self) -> Result<Option<Vec<String>>>;
}

/// Read access to the source database: catalog introspection plus
/// parameterized row streaming.
pub trait SourceReader {
    /// List the table names in a schema.
    fn table_names(&mut self, schema: &str) -> Result<Vec<String>>;

    /// Primary-key column of a table, from the driver's key metadata.
    /// Returns `None` for keyless tables.
    fn primary_key_column(&mut self, schema: &str, table: &str) -> Result<Option<String>>;

    /// Ordered column names of a table, from a `SELECT * … WHERE 1=0` probe.
    fn column_names(&mut self, schema: &str, table: &str) -> Result<Vec<String>>;

    /// `COUNT(*)` over a table, optionally restricted by a filter.
    fn count_rows(&mut self, schema: &str, table: &str, filter: Option<&RowFilter>)
        -> Result<i64>;

    /// Open a streaming cursor over a row query.
    fn open_rows<'a>(&'a mut self, query: &RowQuery) -> Result<Box<dyn RowStream + 'a>>;
}
