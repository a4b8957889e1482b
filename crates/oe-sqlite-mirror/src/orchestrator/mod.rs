//! Run orchestration: table discovery, per-table dispatch, run metrics.
//!
//! A run opens the destination and hash stores, enumerates the source
//! schema, filters out system and ignored tables, and hands each remaining
//! table to the [`TableSyncer`]. Failures are isolated per table: a failed
//! table is logged and recorded in the summary, and the run continues.

use crate::config::Config;
use crate::error::Result;
use crate::hashes::HashStore;
use crate::source::{SourceReader, TableInfo};
use crate::state::ProgressStore;
use crate::sync::TableSyncer;
use crate::target::SqliteTarget;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::time::Instant;
use tracing::{error, info, warn};

/// The source schema tables are enumerated from.
pub const SOURCE_SCHEMA: &str = "PUB";

/// Result of one mirror run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    /// When the run started.
    pub started_at: DateTime<Utc>,

    /// When the run completed.
    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// Tables considered after filtering.
    pub tables_total: usize,

    /// Tables synchronized successfully.
    pub tables_synced: usize,

    /// Tables that failed.
    pub tables_failed: usize,

    /// Total rows applied to the destination.
    pub rows_synced: i64,

    /// Names of the tables that failed.
    pub failed_tables: Vec<String>,
}

impl RunSummary {
    /// Convert to a pretty JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Mirror run orchestrator.
pub struct Orchestrator {
    config: Config,
    full_sync: bool,
    ignored: HashSet<String>,
}

impl Orchestrator {
    /// Create an orchestrator: loads the ignore file and appends any new
    /// `ignore_tables` entries to it.
    pub fn new(config: Config, full_sync: bool, ignore_tables: &[String]) -> Result<Self> {
        let ignore_file = config.mirror_settings.ignore_file.clone();
        let mut ignored = load_ignore_list(&ignore_file);
        if !ignore_tables.is_empty() {
            append_ignore_list(&ignore_file, ignore_tables, &mut ignored)?;
        }

        Ok(Self {
            config,
            full_sync,
            ignored,
        })
    }

    /// Connect to the configured ODBC source and run.
    #[cfg(feature = "odbc")]
    pub fn connect_and_run(&self) -> Result<RunSummary> {
        let mut source = crate::source::odbc::OdbcSource::connect(&self.config.progress_db)?;
        self.run(&mut source)
    }

    /// Stub when built without ODBC support.
    #[cfg(not(feature = "odbc"))]
    pub fn connect_and_run(&self) -> Result<RunSummary> {
        Err(crate::error::MirrorError::Config(
            "Connecting to an OpenEdge source requires the 'odbc' feature.\n\n\
             Rebuild with: cargo build --features odbc"
                .to_string(),
        ))
    }

    /// Run a sync against an already-connected source.
    pub fn run(&self, source: &mut dyn SourceReader) -> Result<RunSummary> {
        let started_at = Utc::now();
        let start = Instant::now();
        info!("Starting data sync (full_sync={})", self.full_sync);

        let target = SqliteTarget::open(&self.config.sqlite_db.db_path)?;
        let progress = ProgressStore::new(target.connection())?;

        let hash_store = if self.config.hash_db.enable_hashing {
            match HashStore::open(&self.config.hash_db.db_path) {
                Ok(store) => {
                    info!("Hash database initialized successfully");
                    Some(store)
                }
                Err(e) => {
                    error!("Failed to initialize hash database: {}", e);
                    None
                }
            }
        } else {
            None
        };

        let tables = self.discover_tables(source)?;
        if tables.is_empty() {
            warn!("No tables found to sync");
        } else {
            info!("Found {} tables to sync", tables.len());
        }

        let mut rows_synced: i64 = 0;
        let mut tables_synced = 0;
        let mut failed_tables = Vec::new();

        let mut syncer = TableSyncer::new(
            source,
            &target,
            &progress,
            hash_store.as_ref(),
            SOURCE_SCHEMA,
            self.config.mirror_settings.batch_size,
        );

        for (index, table) in tables.iter().enumerate() {
            info!(
                "Processing table {}/{}: {}",
                index + 1,
                tables.len(),
                table.name
            );
            match syncer.sync_table(table, self.full_sync) {
                Ok(rows) => {
                    tables_synced += 1;
                    rows_synced += rows;
                }
                Err(e) => {
                    error!("Error syncing table {}: {}", table.name, e);
                    failed_tables.push(table.name.clone());
                }
            }
        }

        let completed_at = Utc::now();
        let duration_seconds = start.elapsed().as_secs_f64();
        info!("Sync completed in {:.2} seconds", duration_seconds);
        info!("Processed {} tables", tables_synced);
        info!("Synced {} rows", rows_synced);

        Ok(RunSummary {
            started_at,
            completed_at,
            duration_seconds,
            tables_total: tables.len(),
            tables_synced,
            tables_failed: failed_tables.len(),
            rows_synced,
            failed_tables,
        })
    }

    /// Enumerate, filter, and introspect the source tables.
    ///
    /// Tables whose name starts with `_` (system tables) and tables in the
    /// ignore set are skipped. Introspection failure skips that table only.
    fn discover_tables(&self, source: &mut dyn SourceReader) -> Result<Vec<TableInfo>> {
        let names = source.table_names(SOURCE_SCHEMA)?;

        let mut tables = Vec::new();
        for name in names {
            let lower = name.to_lowercase();
            if lower.starts_with('_') || self.ignored.contains(&lower) {
                continue;
            }

            let pk_column = match source.primary_key_column(SOURCE_SCHEMA, &name) {
                Ok(pk) => pk.map(|c| c.to_lowercase()).filter(|c| !c.is_empty()),
                Err(e) => {
                    warn!("Skipping table {}: failed to read primary key: {}", lower, e);
                    continue;
                }
            };

            let columns = match source.column_names(SOURCE_SCHEMA, &lower) {
                Ok(cols) => cols
                    .into_iter()
                    .map(|c| c.to_lowercase())
                    .collect::<Vec<_>>(),
                Err(e) => {
                    warn!("Skipping table {}: failed to read columns: {}", lower, e);
                    continue;
                }
            };
            if columns.is_empty() {
                continue;
            }

            info!(
                "Found table {} with {} columns and PK: {}",
                lower,
                columns.len(),
                pk_column.as_deref().unwrap_or("none")
            );
            tables.push(TableInfo {
                name: lower,
                columns,
                pk_column,
            });
        }

        Ok(tables)
    }
}

/// Load the newline-delimited ignore file into a lowercased set.
/// A missing file is treated as an empty list.
fn load_ignore_list(path: &str) -> HashSet<String> {
    let mut ignored = HashSet::new();
    match std::fs::read_to_string(path) {
        Ok(content) => {
            for line in content.lines() {
                let line = line.trim();
                if !line.is_empty() {
                    ignored.insert(line.to_lowercase());
                }
            }
            info!("Loaded ignore list with {} tables", ignored.len());
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            error!("Error loading ignore file {}: {}", path, e);
        }
    }
    ignored
}

/// Append new (lowercased) table names to the ignore file, skipping
/// duplicates already in the set.
fn append_ignore_list(
    path: &str,
    tables: &[String],
    ignored: &mut HashSet<String>,
) -> Result<()> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    for table in tables {
        let lower = table.to_lowercase();
        if ignored.insert(lower.clone()) {
            writeln!(file, "{}", lower)?;
        }
    }
    info!("Added tables to ignore list");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_ignore_list_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ignore.txt");
        let ignored = load_ignore_list(path.to_str().unwrap());
        assert!(ignored.is_empty());
    }

    #[test]
    fn test_load_ignore_list_lowercases_and_skips_blanks() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ignore.txt");
        std::fs::write(&path, "Orders\n\n  \ncustomers\n").unwrap();

        let ignored = load_ignore_list(path.to_str().unwrap());
        assert_eq!(ignored.len(), 2);
        assert!(ignored.contains("orders"));
        assert!(ignored.contains("customers"));
    }

    #[test]
    fn test_append_ignore_list_skips_duplicates() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ignore.txt");
        std::fs::write(&path, "orders\n").unwrap();

        let mut ignored = load_ignore_list(path.to_str().unwrap());
        append_ignore_list(
            path.to_str().unwrap(),
            &["Orders".to_string(), "Events".to_string()],
            &mut ignored,
        )
        .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "orders\nevents\n");
        assert!(ignored.contains("events"));
    }

    #[test]
    fn test_append_ignore_list_creates_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ignore.txt");

        let mut ignored = HashSet::new();
        append_ignore_list(
            path.to_str().unwrap(),
            &["secrets".to_string()],
            &mut ignored,
        )
        .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "secrets\n");
    }

    #[test]
    fn test_run_summary_to_json() {
        let summary = RunSummary {
            started_at: Utc::now(),
            completed_at: Utc::now(),
            duration_seconds: 1.5,
            tables_total: 3,
            tables_synced: 2,
            tables_failed: 1,
            rows_synced: 100,
            failed_tables: vec!["orders".to_string()],
        };
        let json = summary.to_json().unwrap();
        assert!(json.contains("\"tables_total\": 3"));
        assert!(json.contains("\"failed_tables\""));
    }
}
