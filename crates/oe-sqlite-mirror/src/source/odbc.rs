//! ODBC-based OpenEdge source.
//!
//! This module provides the production implementation of [`SourceReader`] on
//! top of the Progress DataDirect OpenEdge Wire Protocol ODBC driver.
//!
//! **Requirements:**
//! - The `odbc` feature must be enabled
//! - An ODBC driver manager must be installed (unixODBC on Linux/macOS)
//! - The Progress OpenEdge ODBC driver must be registered with it
//!
//! Because driver keyword spellings vary between DataDirect releases,
//! connection is attempted with several DSN-less connection-string formats in
//! order (and a configured DSN last) until one succeeds.

use crate::config::{redact_connection_string, SourceDbConfig};
use crate::error::{MirrorError, Result};
use crate::source::{RowFilter, RowQuery, RowStream, SourceReader};
use odbc_api::{
    Connection, ConnectionOptions, Cursor, CursorRow, Environment, IntoParameter,
    ResultSetMetadata,
};
use tracing::{info, warn};

/// ODBC connection to the OpenEdge source database.
pub struct OdbcSource {
    conn: Connection<'static>,
}

impl OdbcSource {
    /// Connect to the source database, trying each connection-string
    /// permutation in order.
    ///
    /// # Errors
    ///
    /// Returns an error if the ODBC environment cannot be created or if every
    /// connection attempt fails; the last driver error is surfaced.
    pub fn connect(config: &SourceDbConfig) -> Result<Self> {
        // The environment must outlive the connection and its cursors; it is
        // created once per connect and lives for the rest of the process.
        let env: &'static Environment = Box::leak(Box::new(Environment::new().map_err(|e| {
            MirrorError::Config(format!(
                "Failed to create ODBC environment: {}. \
                 Make sure an ODBC driver manager (unixODBC) and the \
                 Progress OpenEdge ODBC driver are installed.",
                e
            ))
        })?));

        let mut last_err: Option<odbc_api::Error> = None;
        for conn_str in config.connection_strings() {
            info!(
                "Attempting connection with: {}",
                redact_connection_string(&conn_str)
            );
            match env.connect_with_connection_string(&conn_str, ConnectionOptions::default()) {
                Ok(conn) => {
                    info!(
                        "Connected to OpenEdge database {}:{}/{}",
                        config.host, config.port, config.db_name
                    );
                    return Ok(Self { conn });
                }
                Err(e) => {
                    warn!("Connection attempt failed: {}", e);
                    last_err = Some(e);
                }
            }
        }

        match last_err {
            Some(e) => Err(MirrorError::Source(e)),
            None => Err(MirrorError::Config(
                "No connection strings could be built from the configuration".to_string(),
            )),
        }
    }
}

impl SourceReader for OdbcSource {
    fn table_names(&mut self, schema: &str) -> Result<Vec<String>> {
        let schema_pattern = if schema.is_empty() { "%" } else { schema };
        let mut cursor = self.conn.tables("", schema_pattern, "%", "TABLE")?;

        let mut tables = Vec::new();
        while let Some(mut row) = cursor.next_row()? {
            // TABLE_NAME is the third column of the catalog result set
            let name = column_text(&mut row, 3)?;
            if !name.is_empty() {
                tables.push(name);
            }
        }
        Ok(tables)
    }

    fn primary_key_column(&mut self, schema: &str, table: &str) -> Result<Option<String>> {
        // The OpenEdge metaschema exposes the primary index through
        // _File._Prime-Index; the first index field is the key column.
        let sql = format!(
            "SELECT fld.\"_Field-Name\" \
             FROM {schema}.\"_File\" tbl, {schema}.\"_Index-Field\" ixf, {schema}.\"_Field\" fld \
             WHERE tbl.\"_File-Name\" = ? \
               AND ixf.\"_Index-Recid\" = tbl.\"_Prime-Index\" \
               AND fld.ROWID = ixf.\"_Field-Recid\" \
             ORDER BY ixf.\"_Index-Seq\"",
        );
        let cursor = self.conn.execute(&sql, &table.into_parameter())?;

        let Some(mut cursor) = cursor else {
            return Ok(None);
        };
        match cursor.next_row()? {
            Some(mut row) => {
                let column = column_text(&mut row, 1)?;
                Ok(if column.is_empty() { None } else { Some(column) })
            }
            None => Ok(None),
        }
    }

    fn column_names(&mut self, schema: &str, table: &str) -> Result<Vec<String>> {
        let sql = format!("SELECT * FROM {}.{} WHERE 1=0", schema, table);
        let cursor = self.conn.execute(&sql, ())?;

        let Some(mut cursor) = cursor else {
            return Ok(Vec::new());
        };
        let mut columns = Vec::new();
        for name in cursor.column_names()? {
            columns.push(name?);
        }
        Ok(columns)
    }

    fn count_rows(
        &mut self,
        schema: &str,
        table: &str,
        filter: Option<&RowFilter>,
    ) -> Result<i64> {
        let (sql, param) = match filter {
            Some(f) => (
                format!(
                    "SELECT COUNT(*) FROM {}.{} WHERE \"{}\" > ?",
                    schema, table, f.column
                ),
                Some(f.exclusive_min.as_str()),
            ),
            None => (format!("SELECT COUNT(*) FROM {}.{}", schema, table), None),
        };

        let cursor = match param {
            Some(value) => self.conn.execute(&sql, &value.into_parameter())?,
            None => self.conn.execute(&sql, ())?,
        };

        let Some(mut cursor) = cursor else {
            return Ok(0);
        };
        match cursor.next_row()? {
            Some(mut row) => {
                let text = column_text(&mut row, 1)?;
                Ok(text.trim().parse::<i64>().unwrap_or(0))
            }
            None => Ok(0),
        }
    }

    fn open_rows<'a>(&'a mut self, query: &RowQuery) -> Result<Box<dyn RowStream + 'a>> {
        let sql = query.to_sql();
        let cursor = match &query.filter {
            Some(f) => self
                .conn
                .execute(&sql, &f.exclusive_min.as_str().into_parameter())?,
            None => self.conn.execute(&sql, ())?,
        };
        let cursor = cursor.ok_or_else(|| {
            MirrorError::Config(format!("Query returned no result set: {}", sql))
        })?;
        Ok(Box::new(OdbcRows {
            cursor,
            width: query.columns.len(),
        }))
    }
}

struct OdbcRows<C> {
    cursor: C,
    width: usize,
}

impl<C: Cursor> RowStream for OdbcRows<C> {
    fn next_row(&mut self) -> Result<Option<Vec<String>>> {
        match self.cursor.next_row()? {
            Some(mut row) => {
                let mut fields = Vec::with_capacity(self.width);
                for i in 0..self.width {
                    fields.push(column_text(&mut row, (i + 1) as u16)?);
                }
                Ok(Some(fields))
            }
            None => Ok(None),
        }
    }
}

/// Read one column of the current row as text; NULL becomes the empty string.
fn column_text(row: &mut CursorRow<'_>, column: u16) -> Result<String> {
    let mut buf = Vec::new();
    let not_null = row.get_text(column, &mut buf)?;
    if !not_null {
        return Ok(String::new());
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
