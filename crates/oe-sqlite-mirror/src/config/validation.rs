//! Configuration validation.

use super::Config;
use crate::error::{MirrorError, Result};

/// Validate a parsed configuration.
pub fn validate(config: &Config) -> Result<()> {
    if config.progress_db.host.is_empty() {
        return Err(MirrorError::Config(
            "progress_db.host must not be empty".to_string(),
        ));
    }
    if config.progress_db.port == 0 {
        return Err(MirrorError::Config(
            "progress_db.port must be a valid port number".to_string(),
        ));
    }
    if config.progress_db.db_name.is_empty() {
        return Err(MirrorError::Config(
            "progress_db.db_name must not be empty".to_string(),
        ));
    }
    if config.sqlite_db.db_path.is_empty() {
        return Err(MirrorError::Config(
            "sqlite_db.db_path must not be empty".to_string(),
        ));
    }
    if config.hash_db.enable_hashing && config.hash_db.db_path.is_empty() {
        return Err(MirrorError::Config(
            "hash_db.db_path must not be empty when hashing is enabled".to_string(),
        ));
    }
    if config.mirror_settings.batch_size == 0 {
        return Err(MirrorError::Config(
            "mirror_settings.batch_size must be positive".to_string(),
        ));
    }
    if config.mirror_settings.log_file.is_empty() {
        return Err(MirrorError::Config(
            "mirror_settings.log_file must not be empty".to_string(),
        ));
    }
    if config.mirror_settings.ignore_file.is_empty() {
        return Err(MirrorError::Config(
            "mirror_settings.ignore_file must not be empty".to_string(),
        ));
    }
    Ok(())
}
