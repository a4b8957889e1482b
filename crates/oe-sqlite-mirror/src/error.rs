//! Error types for the mirroring library.

use thiserror::Error;

/// Main error type for mirror operations.
#[derive(Error, Debug)]
pub enum MirrorError {
    /// Configuration error (invalid JSON, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Source database connection or query error
    #[cfg(feature = "odbc")]
    #[error("Source database error: {0}")]
    Source(#[from] odbc_api::Error),

    /// Destination database error
    #[error("Destination database error: {0}")]
    Destination(#[from] rusqlite::Error),

    /// Hash store error
    #[error("Hash store error: {0}")]
    HashStore(String),

    /// Sync failed for a specific table
    #[error("Sync failed for table {table}: {message}")]
    Table { table: String, message: String },

    /// IO error (config file, ignore file, log file)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MirrorError {
    /// Create a Table error.
    pub fn table(table: impl Into<String>, message: impl Into<String>) -> Self {
        MirrorError::Table {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Format error with full details including error chain.
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for mirror operations.
pub type Result<T> = std::result::Result<T, MirrorError>;
