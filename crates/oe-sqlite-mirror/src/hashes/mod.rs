//! Row content hashing and the content-addressed hash store.
//!
//! The hash store lives in its own SQLite file, independent of the
//! destination database, and maps `(table_name, pk_value)` to the SHA-256
//! hash of the row as last applied. Hash-based sync compares freshly
//! computed hashes against it to find rows that changed in place.

use crate::error::{MirrorError, Result};
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::info;

/// Compute the content hash of one row.
///
/// Fields are canonicalized as `<byte-length>:<value>|` in column order and
/// the concatenation is hashed with SHA-256 (lowercase hex). The length
/// prefix keeps adjacent fields unambiguous; NULL values arrive here as the
/// empty string and contribute `0:|`.
pub fn row_hash(fields: &[String]) -> String {
    let mut canonical = String::new();
    for field in fields {
        canonical.push_str(&field.len().to_string());
        canonical.push(':');
        canonical.push_str(field);
        canonical.push('|');
    }

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Persistent map of row hashes, keyed by `(table_name, pk_value)`.
pub struct HashStore {
    conn: Connection,
}

impl HashStore {
    /// Open (creating if necessary) the hash store database file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.ensure_schema()?;
        info!("Connected to hash database: {}", path.display());
        Ok(store)
    }

    /// Open an in-memory hash store.
    pub fn open_in_memory() -> Result<Self> {
        let store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.ensure_schema()?;
        Ok(store)
    }

    fn ensure_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS row_hashes (
                table_name TEXT NOT NULL,
                pk_value TEXT NOT NULL,
                row_hash TEXT NOT NULL,
                last_updated TEXT NOT NULL,
                PRIMARY KEY (table_name, pk_value)
            )",
        )?;
        Ok(())
    }

    /// Insert or replace the hash for one row, stamping the current time.
    pub fn store(&self, table: &str, pk_value: &str, hash: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO row_hashes (table_name, pk_value, row_hash, last_updated)
             VALUES (?1, ?2, ?3, datetime('now'))",
            params![table, pk_value, hash],
        )?;
        Ok(())
    }

    /// Stored hash for one row, or the empty string if absent.
    pub fn get(&self, table: &str, pk_value: &str) -> Result<String> {
        let hash = self
            .conn
            .query_row(
                "SELECT row_hash FROM row_hashes WHERE table_name = ?1 AND pk_value = ?2",
                params![table, pk_value],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(hash.unwrap_or_default())
    }

    /// Remove the hash for one row.
    pub fn delete(&self, table: &str, pk_value: &str) -> Result<()> {
        self.conn.execute(
            "DELETE FROM row_hashes WHERE table_name = ?1 AND pk_value = ?2",
            params![table, pk_value],
        )?;
        Ok(())
    }

    /// Remove every hash recorded for a table.
    pub fn delete_table_hashes(&self, table: &str) -> Result<()> {
        self.conn.execute(
            "DELETE FROM row_hashes WHERE table_name = ?1",
            params![table],
        )?;
        Ok(())
    }

    /// Subset of `pk_values` whose stored hash is missing or differs from the
    /// corresponding entry in `row_hashes`, preserving input order.
    ///
    /// A pk with no stored hash counts as changed (new row).
    pub fn changed_rows(
        &self,
        table: &str,
        pk_values: &[String],
        row_hashes: &[String],
    ) -> Result<Vec<String>> {
        if pk_values.len() != row_hashes.len() {
            return Err(MirrorError::HashStore(
                "Mismatch between primary key and hash array sizes".to_string(),
            ));
        }

        let mut changed = Vec::new();
        for (pk, hash) in pk_values.iter().zip(row_hashes) {
            let stored = self.get(table, pk)?;
            if stored.is_empty() || stored != *hash {
                changed.push(pk.clone());
            }
        }
        Ok(changed)
    }
}
