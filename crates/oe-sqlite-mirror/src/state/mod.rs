//! Per-table synchronization progress, persisted in the destination database.
//!
//! The `sync_state` table lives alongside the mirrored data tables so that
//! progress rows share the destination file. One row per table records when
//! it last synced, the highest key value transferred, the method usable next
//! run, and the accumulated row count.

use crate::error::Result;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;

/// Progress record for one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRecord {
    /// Destination-local time of the last successful sync; empty when the
    /// table has never synced.
    pub last_sync_time: String,

    /// Highest primary-key value transferred, as text; may be empty.
    pub last_key_value: String,

    /// Sync method recorded at the last progress write.
    pub sync_method: String,

    /// Accumulated destination row count.
    pub row_count: i64,
}

impl Default for SyncRecord {
    fn default() -> Self {
        Self {
            last_sync_time: String::new(),
            last_key_value: String::new(),
            sync_method: "timestamp".to_string(),
            row_count: 0,
        }
    }
}

/// Store of [`SyncRecord`]s, backed by the destination connection.
pub struct ProgressStore<'c> {
    conn: &'c Connection,
}

impl<'c> ProgressStore<'c> {
    /// Create the store, ensuring the `sync_state` table exists.
    pub fn new(conn: &'c Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS sync_state (
                table_name TEXT PRIMARY KEY,
                last_sync_time TEXT,
                last_key_value TEXT,
                sync_method TEXT DEFAULT 'timestamp',
                row_count INTEGER DEFAULT 0
            )",
        )?;
        Ok(Self { conn })
    }

    /// Progress record for a table; a zero-value record when none exists.
    pub fn last_sync(&self, table: &str) -> Result<SyncRecord> {
        let record = self
            .conn
            .query_row(
                "SELECT last_sync_time, last_key_value, sync_method, row_count
                 FROM sync_state WHERE table_name = ?1",
                params![table],
                |row| {
                    Ok(SyncRecord {
                        last_sync_time: row.get::<_, Option<String>>(0)?.unwrap_or_default(),
                        last_key_value: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                        sync_method: row
                            .get::<_, Option<String>>(2)?
                            .unwrap_or_else(|| "timestamp".to_string()),
                        row_count: row.get::<_, Option<i64>>(3)?.unwrap_or(0),
                    })
                },
            )
            .optional()?;
        Ok(record.unwrap_or_default())
    }

    /// Insert or replace the progress record for a table.
    ///
    /// `last_sync_time` is always stamped with the destination's current time
    /// at execution.
    pub fn update(
        &self,
        table: &str,
        last_key_value: &str,
        sync_method: &str,
        row_count: i64,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO sync_state
             (table_name, last_sync_time, last_key_value, sync_method, row_count)
             VALUES (?1, datetime('now'), ?2, ?3, ?4)",
            params![table, last_key_value, sync_method, row_count],
        )?;
        info!(
            "Updated sync state for {}, key: {}, rows: {}",
            table, last_key_value, row_count
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(conn: &Connection) -> ProgressStore<'_> {
        ProgressStore::new(conn).unwrap()
    }

    #[test]
    fn test_missing_table_returns_zero_record() {
        let conn = Connection::open_in_memory().unwrap();
        let progress = store(&conn);

        let record = progress.last_sync("orders").unwrap();
        assert_eq!(record.last_sync_time, "");
        assert_eq!(record.last_key_value, "");
        assert_eq!(record.sync_method, "timestamp");
        assert_eq!(record.row_count, 0);
    }

    #[test]
    fn test_update_and_read_back() {
        let conn = Connection::open_in_memory().unwrap();
        let progress = store(&conn);

        progress.update("orders", "42", "key_based", 100).unwrap();

        let record = progress.last_sync("orders").unwrap();
        assert!(!record.last_sync_time.is_empty());
        assert_eq!(record.last_key_value, "42");
        assert_eq!(record.sync_method, "key_based");
        assert_eq!(record.row_count, 100);
    }

    #[test]
    fn test_update_replaces_existing_row() {
        let conn = Connection::open_in_memory().unwrap();
        let progress = store(&conn);

        progress.update("orders", "42", "key_based", 100).unwrap();
        progress.update("orders", "", "hash_based", 100).unwrap();

        let record = progress.last_sync("orders").unwrap();
        assert_eq!(record.last_key_value, "");
        assert_eq!(record.sync_method, "hash_based");

        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM sync_state", [], |r| r.get(0))
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn test_last_sync_time_is_monotonic() {
        let conn = Connection::open_in_memory().unwrap();
        let progress = store(&conn);

        progress.update("orders", "1", "key_based", 1).unwrap();
        let first = progress.last_sync("orders").unwrap().last_sync_time;

        progress.update("orders", "2", "key_based", 2).unwrap();
        let second = progress.last_sync("orders").unwrap().last_sync_time;

        // datetime('now') strings compare lexicographically in time order
        assert!(second >= first);
    }

    #[test]
    fn test_new_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        {
            let progress = store(&conn);
            progress.update("orders", "7", "key_based", 7).unwrap();
        }
        let progress = store(&conn);
        assert_eq!(progress.last_sync("orders").unwrap().last_key_value, "7");
    }

    #[test]
    fn test_tables_are_independent() {
        let conn = Connection::open_in_memory().unwrap();
        let progress = store(&conn);

        progress.update("orders", "42", "key_based", 10).unwrap();
        progress.update("events", "", "timestamp", 5).unwrap();

        assert_eq!(progress.last_sync("orders").unwrap().row_count, 10);
        assert_eq!(progress.last_sync("events").unwrap().sync_method, "timestamp");
    }
}
