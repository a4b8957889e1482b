//! Configuration type definitions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source database connection parameters (OpenEdge, via ODBC).
    pub progress_db: SourceDbConfig,

    /// Destination database configuration (SQLite).
    pub sqlite_db: SqliteDbConfig,

    /// Hash store configuration. Optional; hashing is disabled when absent.
    #[serde(default)]
    pub hash_db: HashDbConfig,

    /// Mirroring behavior configuration.
    pub mirror_settings: MirrorSettings,
}

/// Source database (OpenEdge) connection parameters.
///
/// `driver_class` and `jar_file` are part of the required key set for
/// compatibility with JDBC-based deployments of the same configuration file;
/// the ODBC connection path does not use them.
#[derive(Clone, Serialize, Deserialize)]
pub struct SourceDbConfig {
    /// Database host.
    pub host: String,

    /// Database port.
    pub port: u16,

    /// Database name.
    pub db_name: String,

    /// Username.
    pub user: String,

    /// Password.
    pub password: String,

    /// JDBC driver class (unused by the ODBC path).
    pub driver_class: String,

    /// JDBC driver jar path (unused by the ODBC path).
    pub jar_file: String,

    /// Optional ODBC data source name, tried after the DSN-less formats.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dsn: Option<String>,
}

impl fmt::Debug for SourceDbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceDbConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("db_name", &self.db_name)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("driver_class", &self.driver_class)
            .field("jar_file", &self.jar_file)
            .field("dsn", &self.dsn)
            .finish()
    }
}

/// Destination database (SQLite) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqliteDbConfig {
    /// Path to the destination database file (created if missing).
    pub db_path: String,
}

/// Hash store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashDbConfig {
    /// Path to the hash store database file.
    #[serde(default = "default_hash_db_path")]
    pub db_path: String,

    /// Enable hash-based change detection.
    #[serde(default)]
    pub enable_hashing: bool,
}

impl Default for HashDbConfig {
    fn default() -> Self {
        Self {
            db_path: default_hash_db_path(),
            enable_hashing: false,
        }
    }
}

/// Mirroring behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorSettings {
    /// Batch commit granularity (rows per destination transaction).
    pub batch_size: usize,

    /// Path to the log file.
    pub log_file: String,

    /// Path to the newline-delimited ignore file.
    pub ignore_file: String,
}

fn default_hash_db_path() -> String {
    "hashes.db".to_string()
}
