//! # oe-sqlite-mirror
//!
//! One-way mirroring of OpenEdge tables into a local SQLite file, built for
//! recurring incremental runs over many tables with differing shapes:
//!
//! - **Per-table strategies**: full, key-based, hash-based, and
//!   timestamp-based synchronization, selected from what each table offers
//!   (primary key, prior progress, hash store availability).
//! - **Bounded transactional batches** with commit at batch boundaries, so a
//!   crashed run replays from the previous watermark.
//! - **Durable progress state** in a `sync_state` table beside the mirrored
//!   data.
//! - **Row-hash change detection** via a content-addressed side store, for
//!   tables where neither a monotonic key nor a timestamp column can be
//!   trusted to reveal updates.
//!
//! ## Example
//!
//! ```rust,no_run
//! use oe_sqlite_mirror::{Config, Orchestrator};
//!
//! fn main() -> oe_sqlite_mirror::Result<()> {
//!     let config = Config::load("config.json")?;
//!     let orchestrator = Orchestrator::new(config, false, &[])?;
//!     let summary = orchestrator.connect_and_run()?;
//!     println!("Synced {} rows", summary.rows_synced);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod hashes;
pub mod orchestrator;
pub mod source;
pub mod state;
pub mod sync;
pub mod target;

// Re-exports for convenient access
pub use config::{Config, HashDbConfig, MirrorSettings, SourceDbConfig, SqliteDbConfig};
pub use error::{MirrorError, Result};
pub use hashes::{row_hash, HashStore};
pub use orchestrator::{Orchestrator, RunSummary, SOURCE_SCHEMA};
pub use source::{RowFilter, RowQuery, RowStream, SourceReader, TableInfo};
pub use state::{ProgressStore, SyncRecord};
pub use sync::{select_strategy, SyncStrategy, TableSyncer};
pub use target::SqliteTarget;

#[cfg(feature = "odbc")]
pub use source::odbc::OdbcSource;
