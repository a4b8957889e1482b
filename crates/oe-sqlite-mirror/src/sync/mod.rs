//! The per-table synchronization strategy engine.
//!
//! For each table a strategy is selected from what the table offers
//! (primary key, prior progress record, hash store availability), then the
//! source rows are streamed into the destination in bounded batches, each
//! batch applied inside one destination transaction:
//!
//! - **Full**: truncate and re-transfer everything. Always used on the first
//!   run and when a full sync is requested.
//! - **Key-based**: transfer only rows whose primary key exceeds the highest
//!   key seen in a prior run. Suited to append-only tables.
//! - **Hash-based**: scan the whole table, compare per-row content hashes
//!   against the hash store, and apply only rows that changed. Catches
//!   in-place updates a key scan would miss.
//! - **Timestamp**: fallback for keyless tables; transfer rows whose
//!   modification-timestamp column is newer than the last sync time.
//!
//! Progress is written only after a table completes, so an interrupted sync
//! replays from the previous watermark on the next run.

use crate::error::{MirrorError, Result};
use crate::hashes::{row_hash, HashStore};
use crate::source::{RowFilter, RowQuery, SourceReader, TableInfo};
use crate::state::{ProgressStore, SyncRecord};
use crate::target::SqliteTarget;
use rusqlite::Transaction;
use std::collections::HashSet;
use std::fmt;
use tracing::{error, info, warn};

/// The four per-table synchronization strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    Full,
    KeyBased,
    HashBased,
    Timestamp,
}

impl SyncStrategy {
    /// The method name as persisted in the progress store.
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStrategy::Full => "full",
            SyncStrategy::KeyBased => "key_based",
            SyncStrategy::HashBased => "hash_based",
            SyncStrategy::Timestamp => "timestamp",
        }
    }
}

impl fmt::Display for SyncStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pick the strategy for one table.
///
/// The first run is always full; hash-based is preferred over key-based when
/// a primary key exists because it detects in-place updates; timestamp is the
/// last resort for keyless tables.
pub fn select_strategy(
    info: &TableInfo,
    last: &SyncRecord,
    hashing_enabled: bool,
    full_sync: bool,
) -> SyncStrategy {
    if full_sync {
        return SyncStrategy::Full;
    }
    if last.last_sync_time.is_empty() {
        return SyncStrategy::Full;
    }
    if hashing_enabled && info.pk_column.is_some() {
        return SyncStrategy::HashBased;
    }
    if info.pk_column.is_some() {
        return SyncStrategy::KeyBased;
    }
    SyncStrategy::Timestamp
}

/// Drives the synchronization of individual tables.
pub struct TableSyncer<'a, S: SourceReader + ?Sized> {
    source: &'a mut S,
    target: &'a SqliteTarget,
    progress: &'a ProgressStore<'a>,
    hashes: Option<&'a HashStore>,
    schema: String,
    batch_size: usize,
}

impl<'a, S: SourceReader + ?Sized> TableSyncer<'a, S> {
    /// Create a syncer over the given collaborators.
    pub fn new(
        source: &'a mut S,
        target: &'a SqliteTarget,
        progress: &'a ProgressStore<'a>,
        hashes: Option<&'a HashStore>,
        schema: &str,
        batch_size: usize,
    ) -> Self {
        Self {
            source,
            target,
            progress,
            hashes,
            schema: schema.to_string(),
            batch_size,
        }
    }

    /// Synchronize one table: ensure the destination schema, select a
    /// strategy, and run it. Returns the number of rows applied.
    pub fn sync_table(&mut self, info: &TableInfo, full_sync: bool) -> Result<i64> {
        self.target.ensure_table(info)?;

        let last = self.progress.last_sync(&info.name)?;
        let strategy = select_strategy(info, &last, self.hashes.is_some(), full_sync);
        info!("Using {} sync strategy for {}", strategy, info.name);

        match strategy {
            SyncStrategy::Full => self.sync_full(info),
            SyncStrategy::KeyBased => self.sync_key_based(info),
            SyncStrategy::HashBased => self.sync_hash_based(info),
            SyncStrategy::Timestamp => self.sync_timestamp(info),
        }
    }

    /// Truncate the destination table and re-transfer every source row.
    fn sync_full(&mut self, info: &TableInfo) -> Result<i64> {
        let total = match self.source.count_rows(&self.schema, &info.name, None) {
            Ok(n) => {
                info!("Source table {} has {} rows", info.name, n);
                n
            }
            Err(e) => {
                // Progress percentages only; the transfer does not depend on it.
                warn!("Failed to count rows in {}: {}", info.name, e);
                0
            }
        };

        self.target.clear_table(&info.name)?;

        let query = RowQuery {
            schema: self.schema.clone(),
            table: info.name.clone(),
            columns: info.columns.clone(),
            filter: None,
            order_by: None,
        };

        let pk_idx = info.pk_index();
        let update_hashes = self.hashes.is_some() && pk_idx.is_some();
        let mut rows_synced: i64 = 0;
        let mut last_value = String::new();
        let mut chunk: Vec<Vec<String>> = Vec::with_capacity(self.batch_size);

        let mut stream = self.source.open_rows(&query)?;
        while let Some(row) = stream.next_row()? {
            if let Some(i) = pk_idx {
                last_value = row.get(i).cloned().unwrap_or_default();
            }
            chunk.push(row);

            if chunk.len() >= self.batch_size {
                match apply_batch(self.target, self.hashes, info, None, &chunk, update_hashes) {
                    Ok(applied) => {
                        rows_synced += applied as i64;
                        let pct = if total > 0 {
                            rows_synced as f64 / total as f64 * 100.0
                        } else {
                            0.0
                        };
                        info!(
                            "Inserted {} rows for {} (total: {} of {} ({:.1}%))",
                            chunk.len(),
                            info.name,
                            rows_synced,
                            total,
                            pct
                        );
                    }
                    Err(e) => {
                        error!("Error performing full sync of {}: {}", info.name, e);
                        return Ok(rows_synced);
                    }
                }
                chunk.clear();
            }
        }
        drop(stream);

        if !chunk.is_empty() {
            match apply_batch(self.target, self.hashes, info, None, &chunk, update_hashes) {
                Ok(applied) => rows_synced += applied as i64,
                Err(e) => {
                    error!("Error performing full sync of {}: {}", info.name, e);
                    return Ok(rows_synced);
                }
            }
        }

        // The recorded method reflects what is usable next run, not this
        // run's method; selection re-derives the decision each run anyway.
        if info.pk_column.is_some() && !last_value.is_empty() {
            self.progress.update(
                &info.name,
                &last_value,
                SyncStrategy::KeyBased.as_str(),
                rows_synced,
            )?;
        } else {
            self.progress
                .update(&info.name, "", SyncStrategy::Timestamp.as_str(), rows_synced)?;
        }

        info!("Completed full sync of {}: {} rows", info.name, rows_synced);
        Ok(rows_synced)
    }

    /// Transfer rows whose primary key exceeds the last transferred key.
    fn sync_key_based(&mut self, info: &TableInfo) -> Result<i64> {
        let Some(pk_col) = info.pk_column.clone() else {
            warn!(
                "Table {} has no primary key, falling back to full sync",
                info.name
            );
            return self.sync_full(info);
        };

        let last = self.progress.last_sync(&info.name)?;
        if last.last_key_value.is_empty() {
            warn!(
                "No last key value for {}, falling back to full sync",
                info.name
            );
            return self.sync_full(info);
        }

        let filter = RowFilter {
            column: pk_col.clone(),
            exclusive_min: last.last_key_value.clone(),
        };
        let new_rows = self
            .source
            .count_rows(&self.schema, &info.name, Some(&filter))?;
        info!(
            "Found {} new/changed rows to sync for {}",
            new_rows, info.name
        );
        if new_rows == 0 {
            return Ok(0);
        }

        let pk_idx = match info.pk_index() {
            Some(i) => i,
            None => {
                return Err(MirrorError::table(
                    &info.name,
                    "primary key column missing from result columns",
                ))
            }
        };

        let query = RowQuery {
            schema: self.schema.clone(),
            table: info.name.clone(),
            columns: info.columns.clone(),
            filter: Some(filter),
            order_by: Some(pk_col),
        };

        let update_hashes = self.hashes.is_some();
        let mut rows_synced: i64 = 0;
        let mut last_value = last.last_key_value.clone();
        let mut pks: Vec<String> = Vec::with_capacity(self.batch_size);
        let mut chunk: Vec<Vec<String>> = Vec::with_capacity(self.batch_size);

        let mut stream = self.source.open_rows(&query)?;
        while let Some(row) = stream.next_row()? {
            let pk = row.get(pk_idx).cloned().unwrap_or_default();
            last_value = pk.clone();
            pks.push(pk);
            chunk.push(row);

            if chunk.len() >= self.batch_size {
                match apply_batch(
                    self.target,
                    self.hashes,
                    info,
                    Some(&pks),
                    &chunk,
                    update_hashes,
                ) {
                    Ok(applied) => {
                        rows_synced += applied as i64;
                        let pct = rows_synced as f64 / new_rows as f64 * 100.0;
                        info!(
                            "Synced {} rows for {} (total: {} of {} ({:.1}%))",
                            chunk.len(),
                            info.name,
                            rows_synced,
                            new_rows,
                            pct
                        );
                    }
                    Err(e) => {
                        error!("Error performing key-based sync of {}: {}", info.name, e);
                        return Ok(rows_synced);
                    }
                }
                pks.clear();
                chunk.clear();
            }
        }
        drop(stream);

        if !chunk.is_empty() {
            match apply_batch(
                self.target,
                self.hashes,
                info,
                Some(&pks),
                &chunk,
                update_hashes,
            ) {
                Ok(applied) => rows_synced += applied as i64,
                Err(e) => {
                    error!("Error performing key-based sync of {}: {}", info.name, e);
                    return Ok(rows_synced);
                }
            }
        }

        let total_rows = last.row_count + rows_synced;
        self.progress.update(
            &info.name,
            &last_value,
            SyncStrategy::KeyBased.as_str(),
            total_rows,
        )?;

        info!(
            "Completed key-based sync of {}: {} new/changed rows",
            info.name, rows_synced
        );
        Ok(rows_synced)
    }

    /// Scan the whole table and apply only rows whose content hash differs
    /// from the hash store.
    fn sync_hash_based(&mut self, info: &TableInfo) -> Result<i64> {
        let store = match self.hashes {
            Some(s) if info.pk_column.is_some() => s,
            _ => {
                warn!(
                    "Unable to use hash-based sync for {}, falling back to key-based",
                    info.name
                );
                return self.sync_key_based(info);
            }
        };

        let pk_idx = match info.pk_index() {
            Some(i) => i,
            None => {
                return Err(MirrorError::table(
                    &info.name,
                    "primary key column missing from result columns",
                ))
            }
        };
        let pk_col = info.columns[pk_idx].clone();

        let query = RowQuery {
            schema: self.schema.clone(),
            table: info.name.clone(),
            columns: info.columns.clone(),
            filter: None,
            order_by: Some(pk_col),
        };

        let mut rows_synced: i64 = 0;
        let mut pks: Vec<String> = Vec::with_capacity(self.batch_size);
        let mut hashes: Vec<String> = Vec::with_capacity(self.batch_size);
        let mut chunk: Vec<Vec<String>> = Vec::with_capacity(self.batch_size);

        let mut stream = self.source.open_rows(&query)?;
        while let Some(row) = stream.next_row()? {
            let pk = row.get(pk_idx).cloned().unwrap_or_default();
            if !pk.is_empty() {
                hashes.push(row_hash(&row));
                pks.push(pk);
                chunk.push(row);
            }

            if chunk.len() >= self.batch_size {
                match flush_hash_batch(self.target, store, info, &pks, &hashes, &chunk) {
                    Ok((applied, changed)) => {
                        rows_synced += applied as i64;
                        info!(
                            "Processed {} rows for {}, found {} changes",
                            chunk.len(),
                            info.name,
                            changed
                        );
                    }
                    Err(e) => {
                        error!("Error performing hash-based sync of {}: {}", info.name, e);
                        return Ok(rows_synced);
                    }
                }
                pks.clear();
                hashes.clear();
                chunk.clear();
            }
        }
        drop(stream);

        if !chunk.is_empty() {
            match flush_hash_batch(self.target, store, info, &pks, &hashes, &chunk) {
                Ok((applied, changed)) => {
                    rows_synced += applied as i64;
                    info!(
                        "Processed final {} rows for {}, found {} changes",
                        chunk.len(),
                        info.name,
                        changed
                    );
                }
                Err(e) => {
                    error!("Error performing hash-based sync of {}: {}", info.name, e);
                    return Ok(rows_synced);
                }
            }
        }

        // The key watermark is not used by hash-based sync and the row count
        // is carried forward unchanged.
        let prior = self.progress.last_sync(&info.name)?;
        self.progress.update(
            &info.name,
            "",
            SyncStrategy::HashBased.as_str(),
            prior.row_count,
        )?;

        info!(
            "Completed hash-based sync of {}: {} changed rows",
            info.name, rows_synced
        );
        Ok(rows_synced)
    }

    /// Transfer rows whose modification-timestamp column is newer than the
    /// last sync time. Keyless fallback; duplicates are possible when no
    /// primary key is available to match rows on.
    fn sync_timestamp(&mut self, info: &TableInfo) -> Result<i64> {
        let last = self.progress.last_sync(&info.name)?;
        if last.last_sync_time.is_empty() {
            warn!(
                "No last sync time for {}, falling back to full sync",
                info.name
            );
            return self.sync_full(info);
        }

        let Some(ts_col) = info.timestamp_column() else {
            warn!(
                "No timestamp column found for {}, falling back to full sync",
                info.name
            );
            return self.sync_full(info);
        };
        let ts_col = ts_col.to_string();
        info!("Using timestamp column: {} for table {}", ts_col, info.name);

        let query = RowQuery {
            schema: self.schema.clone(),
            table: info.name.clone(),
            columns: info.columns.clone(),
            filter: Some(RowFilter {
                column: ts_col,
                exclusive_min: last.last_sync_time.clone(),
            }),
            order_by: info.pk_column.clone(),
        };

        let pk_idx = info.pk_index();
        let update_hashes = self.hashes.is_some();
        let mut rows_synced: i64 = 0;
        let mut pks: Vec<String> = Vec::with_capacity(self.batch_size);
        let mut chunk: Vec<Vec<String>> = Vec::with_capacity(self.batch_size);

        let mut stream = self.source.open_rows(&query)?;
        while let Some(row) = stream.next_row()? {
            if let Some(i) = pk_idx {
                pks.push(row.get(i).cloned().unwrap_or_default());
            }
            chunk.push(row);

            if chunk.len() >= self.batch_size {
                let result = if pk_idx.is_some() {
                    apply_batch(
                        self.target,
                        self.hashes,
                        info,
                        Some(&pks),
                        &chunk,
                        update_hashes,
                    )
                } else {
                    // No identity to match on: insert only.
                    apply_batch(self.target, self.hashes, info, None, &chunk, false)
                };
                match result {
                    Ok(applied) => {
                        rows_synced += applied as i64;
                        info!("Processed {} rows for table {}", chunk.len(), info.name);
                    }
                    Err(e) => {
                        error!(
                            "Error performing timestamp-based sync of {}: {}",
                            info.name, e
                        );
                        return Ok(rows_synced);
                    }
                }
                pks.clear();
                chunk.clear();
            }
        }
        drop(stream);

        if !chunk.is_empty() {
            let result = if pk_idx.is_some() {
                apply_batch(
                    self.target,
                    self.hashes,
                    info,
                    Some(&pks),
                    &chunk,
                    update_hashes,
                )
            } else {
                apply_batch(self.target, self.hashes, info, None, &chunk, false)
            };
            match result {
                Ok(applied) => rows_synced += applied as i64,
                Err(e) => {
                    error!(
                        "Error performing timestamp-based sync of {}: {}",
                        info.name, e
                    );
                    return Ok(rows_synced);
                }
            }
        }

        // Last key of the final partial batch; empty when the row count
        // landed exactly on a batch boundary.
        let last_value = pks.last().cloned().unwrap_or_default();
        let total_rows = last.row_count + rows_synced;
        self.progress.update(
            &info.name,
            &last_value,
            SyncStrategy::Timestamp.as_str(),
            total_rows,
        )?;

        info!(
            "Completed timestamp-based sync of {}: {} changed rows",
            info.name, rows_synced
        );
        Ok(rows_synced)
    }
}

/// Apply one batch of rows inside a single destination transaction.
///
/// When `pks` is given, matching destination rows are deleted first, which
/// yields upsert semantics without DBMS-specific syntax. A failed row insert
/// is logged and skipped; the rest of the batch still commits. When
/// `update_hashes` is set, the hash store records the content hash of every
/// applied row that has a non-empty primary key value.
fn apply_batch(
    target: &SqliteTarget,
    hashes: Option<&HashStore>,
    info: &TableInfo,
    pks: Option<&[String]>,
    rows: &[Vec<String>],
    update_hashes: bool,
) -> Result<usize> {
    if rows.is_empty() {
        return Ok(0);
    }

    let tx = target.begin()?;

    if let (Some(pks), Some(pk_col)) = (pks, info.pk_column.as_deref()) {
        delete_rows(&tx, &info.name, pk_col, pks)?;
    }

    let pk_idx = info.pk_index();
    let sql = insert_sql(&info.name, &info.columns);
    let mut stmt = tx.prepare(&sql)?;
    let mut applied = 0;

    for (idx, row) in rows.iter().enumerate() {
        let params = rusqlite::params_from_iter(
            row.iter()
                .map(|v| if v.is_empty() { None } else { Some(v.as_str()) }),
        );
        if let Err(e) = stmt.execute(params) {
            error!("Error inserting row into {}: {}", info.name, e);
            continue;
        }
        applied += 1;

        if !update_hashes {
            continue;
        }
        let Some(store) = hashes else { continue };
        let pk_value = match pks {
            Some(pks) => pks.get(idx).cloned().unwrap_or_default(),
            None => pk_idx.and_then(|i| row.get(i).cloned()).unwrap_or_default(),
        };
        if pk_value.is_empty() {
            continue;
        }
        if let Err(e) = store.store(&info.name, &pk_value, &row_hash(row)) {
            warn!(
                "Failed to store row hash for {}:{}: {}",
                info.name, pk_value, e
            );
        }
    }

    drop(stmt);
    tx.commit()?;
    Ok(applied)
}

/// Resolve a hash-based batch against the store and apply the changed subset.
/// Returns `(rows_applied, rows_changed)`.
fn flush_hash_batch(
    target: &SqliteTarget,
    store: &HashStore,
    info: &TableInfo,
    pks: &[String],
    hashes: &[String],
    rows: &[Vec<String>],
) -> Result<(usize, usize)> {
    let changed = store.changed_rows(&info.name, pks, hashes)?;
    if changed.is_empty() {
        return Ok((0, 0));
    }

    let changed_set: HashSet<&String> = changed.iter().collect();
    let mut changed_pks = Vec::with_capacity(changed.len());
    let mut changed_rows = Vec::with_capacity(changed.len());
    for (i, pk) in pks.iter().enumerate() {
        if changed_set.contains(pk) {
            changed_pks.push(pk.clone());
            changed_rows.push(rows[i].clone());
        }
    }

    let applied = apply_batch(
        target,
        Some(store),
        info,
        Some(&changed_pks),
        &changed_rows,
        true,
    )?;
    Ok((applied, changed.len()))
}

fn insert_sql(table: &str, columns: &[String]) -> String {
    let cols = columns
        .iter()
        .map(|c| format!("\"{}\"", c))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = vec!["?"; columns.len()].join(", ");
    format!("INSERT INTO {} ({}) VALUES ({})", table, cols, placeholders)
}

fn delete_rows(tx: &Transaction<'_>, table: &str, pk_col: &str, pks: &[String]) -> Result<usize> {
    if pks.is_empty() {
        return Ok(0);
    }
    let placeholders = vec!["?"; pks.len()].join(", ");
    let sql = format!(
        "DELETE FROM {} WHERE \"{}\" IN ({})",
        table, pk_col, placeholders
    );
    Ok(tx.execute(&sql, rusqlite::params_from_iter(pks.iter()))?)
}
