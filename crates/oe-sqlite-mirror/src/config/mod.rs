//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::error::{MirrorError, Result};
use std::path::Path;

impl Config {
    /// Load configuration from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            MirrorError::Config(format!("Cannot open config file {}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
    }

    /// Parse configuration from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)
            .map_err(|e| MirrorError::Config(format!("Failed to parse JSON config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }
}

impl SourceDbConfig {
    /// Build the DSN-less connection string permutations tried in order.
    ///
    /// Different releases of the Progress DataDirect driver accept different
    /// keyword spellings, so each format is attempted until one connects.
    /// A configured DSN is tried last.
    pub fn connection_strings(&self) -> Vec<String> {
        let mut strings = vec![
            format!(
                "DRIVER={{Progress OpenEdge Wire Protocol}};HOST={};PORT={};DB={};UID={};PWD={};",
                self.host, self.port, self.db_name, self.user, self.password
            ),
            format!(
                "DRIVER={{Progress OpenEdge Wire Protocol}};HostName={};PortNumber={};Database={};User={};Password={};",
                self.host, self.port, self.db_name, self.user, self.password
            ),
            format!(
                "DRIVER={{Progress OpenEdge Wire Protocol}};ServerName={};PortNumber={};DatabaseName={};LogonID={};Password={};",
                self.host, self.port, self.db_name, self.user, self.password
            ),
        ];

        if let Some(dsn) = &self.dsn {
            if !dsn.is_empty() {
                strings.push(format!(
                    "DSN={};UID={};PWD={};",
                    dsn, self.user, self.password
                ));
            }
        }

        strings
    }
}

/// Redact the password portion of a connection string for logging.
pub fn redact_connection_string(conn_str: &str) -> String {
    for marker in ["PWD=", "Password="] {
        if let Some(idx) = conn_str.find(marker) {
            return format!("{}{}********;", &conn_str[..idx], marker);
        }
    }
    conn_str.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const VALID_JSON: &str = r#"{
  "progress_db": {
    "host": "oe-host",
    "port": 9000,
    "db_name": "sports",
    "user": "sysprogress",
    "password": "secret",
    "driver_class": "com.ddtek.jdbc.openedge.OpenEdgeDriver",
    "jar_file": "/opt/openedge/openedge.jar"
  },
  "sqlite_db": {
    "db_path": "analytics.db"
  },
  "hash_db": {
    "db_path": "hashes.db",
    "enable_hashing": true
  },
  "mirror_settings": {
    "batch_size": 500,
    "log_file": "mirror.log",
    "ignore_file": "ignore.txt"
  }
}"#;

    #[test]
    fn test_from_json_valid() {
        let config = Config::from_json(VALID_JSON).unwrap();
        assert_eq!(config.progress_db.host, "oe-host");
        assert_eq!(config.progress_db.port, 9000);
        assert_eq!(config.sqlite_db.db_path, "analytics.db");
        assert!(config.hash_db.enable_hashing);
        assert_eq!(config.mirror_settings.batch_size, 500);
    }

    #[test]
    fn test_from_json_invalid_syntax() {
        let result = Config::from_json(r#"{ "progress_db": { invalid json }"#);
        assert!(matches!(result, Err(MirrorError::Config(_))));
    }

    #[test]
    fn test_from_json_missing_required_field() {
        // No sqlite_db section
        let missing = r#"{
          "progress_db": {
            "host": "h", "port": 9000, "db_name": "d", "user": "u",
            "password": "p", "driver_class": "c", "jar_file": "j"
          },
          "mirror_settings": { "batch_size": 100, "log_file": "l", "ignore_file": "i" }
        }"#;
        assert!(Config::from_json(missing).is_err());
    }

    #[test]
    fn test_hash_db_defaults_when_absent() {
        let json = r#"{
          "progress_db": {
            "host": "h", "port": 9000, "db_name": "d", "user": "u",
            "password": "p", "driver_class": "c", "jar_file": "j"
          },
          "sqlite_db": { "db_path": "out.db" },
          "mirror_settings": { "batch_size": 100, "log_file": "l", "ignore_file": "i" }
        }"#;
        let config = Config::from_json(json).unwrap();
        assert_eq!(config.hash_db.db_path, "hashes.db");
        assert!(!config.hash_db.enable_hashing);
    }

    #[test]
    fn test_from_json_validates_config() {
        let zero_batch = VALID_JSON.replace("\"batch_size\": 500", "\"batch_size\": 0");
        let result = Config::from_json(&zero_batch);
        assert!(matches!(result, Err(MirrorError::Config(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::with_suffix(".json").unwrap();
        file.write_all(VALID_JSON.as_bytes()).unwrap();
        file.flush().unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.progress_db.db_name, "sports");
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load("/nonexistent/config.json");
        assert!(matches!(result, Err(MirrorError::Config(_))));
    }

    #[test]
    fn test_connection_strings_order() {
        let config = Config::from_json(VALID_JSON).unwrap();
        let strings = config.progress_db.connection_strings();
        assert_eq!(strings.len(), 3);
        assert!(strings[0].contains("HOST=oe-host"));
        assert!(strings[1].contains("HostName=oe-host"));
        assert!(strings[2].contains("LogonID=sysprogress"));
    }

    #[test]
    fn test_connection_strings_with_dsn() {
        let mut config = Config::from_json(VALID_JSON).unwrap();
        config.progress_db.dsn = Some("oedsn".to_string());
        let strings = config.progress_db.connection_strings();
        assert_eq!(strings.len(), 4);
        assert!(strings[3].starts_with("DSN=oedsn;"));
    }

    #[test]
    fn test_debug_redacts_password() {
        let config = Config::from_json(VALID_JSON).unwrap();
        let debug = format!("{:?}", config.progress_db);
        assert!(!debug.contains("secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_redact_connection_string() {
        let redacted = redact_connection_string("DRIVER={X};HOST=h;UID=u;PWD=secret;");
        assert!(!redacted.contains("secret"));
        assert!(redacted.contains("PWD=********"));
    }
}
