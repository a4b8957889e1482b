//! Destination database: the local SQLite file that receives mirrored data.
//!
//! All mirrored columns are typed TEXT; no attempt is made to preserve source
//! types. Schema management is additive only: missing columns are added,
//! extra destination columns are left alone.

use crate::error::Result;
use crate::source::TableInfo;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::collections::HashSet;
use std::path::Path;
use tracing::{info, warn};

/// The destination SQLite database.
pub struct SqliteTarget {
    conn: Connection,
}

impl SqliteTarget {
    /// Open (creating if necessary) the destination database file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON")?;
        info!("Connected to SQLite database at {}", path.display());
        Ok(Self { conn })
    }

    /// Open an in-memory destination database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON")?;
        Ok(Self { conn })
    }

    /// Shared access to the underlying connection, e.g. for the progress
    /// store which lives in the same database file.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Begin a batch transaction. Rolls back on drop unless committed.
    pub fn begin(&self) -> Result<Transaction<'_>> {
        Ok(self.conn.unchecked_transaction()?)
    }

    /// Make sure the destination table exists with at least the source's
    /// columns, every column typed TEXT.
    ///
    /// Creates the table on first observation; afterwards adds any missing
    /// columns via `ALTER TABLE`. Column comparison is case-insensitive on
    /// lowercased names. Idempotent.
    pub fn ensure_table(&self, info: &TableInfo) -> Result<()> {
        if !self.table_exists(&info.name)? {
            let column_defs = info
                .columns
                .iter()
                .map(|c| format!("\"{}\" TEXT", c))
                .collect::<Vec<_>>()
                .join(", ");
            self.conn
                .execute(&format!("CREATE TABLE {} ({})", info.name, column_defs), [])?;
            info!("Created table {}", info.name);
            return Ok(());
        }

        let existing = self.existing_columns(&info.name)?;
        for column in &info.columns {
            if existing.contains(&column.to_lowercase()) {
                continue;
            }
            let alter = format!("ALTER TABLE {} ADD COLUMN \"{}\" TEXT", info.name, column);
            match self.conn.execute(&alter, []) {
                Ok(_) => info!("Added column {} to table {}", column, info.name),
                Err(e) => warn!("Failed to add column {} to table {}: {}", column, info.name, e),
            }
        }
        Ok(())
    }

    /// Remove every row from a destination table (full-sync truncate).
    pub fn clear_table(&self, table: &str) -> Result<usize> {
        Ok(self.conn.execute(&format!("DELETE FROM {}", table), [])?)
    }

    fn table_exists(&self, table: &str) -> Result<bool> {
        let name = self
            .conn
            .query_row(
                "SELECT name FROM sqlite_master WHERE type='table' AND name=?1",
                params![table],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(name.is_some())
    }

    fn existing_columns(&self, table: &str) -> Result<HashSet<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM pragma_table_info(?1)")?;
        let columns = stmt
            .query_map(params![table], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(columns.into_iter().map(|c| c.to_lowercase()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(columns: &[&str]) -> TableInfo {
        TableInfo {
            name: "orders".to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            pk_column: Some("id".to_string()),
        }
    }

    fn columns_of(target: &SqliteTarget, name: &str) -> Vec<String> {
        let mut stmt = target
            .conn
            .prepare("SELECT name FROM pragma_table_info(?1)")
            .unwrap();
        stmt.query_map(params![name], |r| r.get::<_, String>(0))
            .unwrap()
            .collect::<rusqlite::Result<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn test_ensure_table_creates_text_columns() {
        let target = SqliteTarget::open_in_memory().unwrap();
        target.ensure_table(&table(&["id", "total"])).unwrap();

        assert_eq!(columns_of(&target, "orders"), vec!["id", "total"]);

        let type_of_id: String = target
            .conn
            .query_row(
                "SELECT type FROM pragma_table_info('orders') WHERE name='id'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(type_of_id, "TEXT");
    }

    #[test]
    fn test_ensure_table_is_idempotent() {
        let target = SqliteTarget::open_in_memory().unwrap();
        let info = table(&["id", "total"]);
        target.ensure_table(&info).unwrap();
        target.ensure_table(&info).unwrap();

        assert_eq!(columns_of(&target, "orders"), vec!["id", "total"]);
    }

    #[test]
    fn test_ensure_table_adds_missing_columns() {
        let target = SqliteTarget::open_in_memory().unwrap();
        target.ensure_table(&table(&["id", "total"])).unwrap();
        target
            .ensure_table(&table(&["id", "total", "status"]))
            .unwrap();

        assert_eq!(columns_of(&target, "orders"), vec!["id", "total", "status"]);
    }

    #[test]
    fn test_ensure_table_leaves_extra_columns_alone() {
        let target = SqliteTarget::open_in_memory().unwrap();
        target
            .conn
            .execute("CREATE TABLE orders (\"id\" TEXT, \"legacy\" TEXT)", [])
            .unwrap();

        target.ensure_table(&table(&["id", "total"])).unwrap();

        assert_eq!(columns_of(&target, "orders"), vec!["id", "legacy", "total"]);
    }

    #[test]
    fn test_ensure_table_column_match_is_case_insensitive() {
        let target = SqliteTarget::open_in_memory().unwrap();
        target
            .conn
            .execute("CREATE TABLE orders (\"ID\" TEXT)", [])
            .unwrap();

        target.ensure_table(&table(&["id", "total"])).unwrap();

        // "id" already present as "ID"; only "total" is added
        assert_eq!(columns_of(&target, "orders"), vec!["ID", "total"]);
    }

    #[test]
    fn test_clear_table() {
        let target = SqliteTarget::open_in_memory().unwrap();
        target.ensure_table(&table(&["id", "total"])).unwrap();
        target
            .conn
            .execute("INSERT INTO orders VALUES ('1', '10')", [])
            .unwrap();

        let removed = target.clear_table("orders").unwrap();
        assert_eq!(removed, 1);

        let count: i64 = target
            .conn
            .query_row("SELECT COUNT(*) FROM orders", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_begin_rolls_back_on_drop() {
        let target = SqliteTarget::open_in_memory().unwrap();
        target.ensure_table(&table(&["id", "total"])).unwrap();

        {
            let tx = target.begin().unwrap();
            tx.execute("INSERT INTO orders VALUES ('1', '10')", [])
                .unwrap();
            // dropped without commit
        }

        let count: i64 = target
            .conn
            .query_row("SELECT COUNT(*) FROM orders", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
