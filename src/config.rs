//! Configuration file support for helpdesk
//!
//! Reads from .helpdesk/config.toml

use crate::db::{Database, DEFAULT_POOL_SIZE};
use crate::knowledge::DEFAULT_EXCERPT_CHARS;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration structure
#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct Config {
    /// Database settings
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Triage and suggestion settings
    #[serde(default)]
    pub triage: TriageConfig,

    /// Log output settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Database location and pool sizing
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    /// Explicit database file. HELPDESK_DB_PATH still wins when set.
    #[serde(default)]
    pub path: Option<String>,

    /// Maximum pooled connections
    /// Default: 5
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
}

fn default_pool_size() -> u32 {
    DEFAULT_POOL_SIZE
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: None,
            pool_size: default_pool_size(),
        }
    }
}

/// Knowledge-base suggestion settings
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TriageConfig {
    /// Suggestions returned when the caller gives no limit
    /// Default: 3
    #[serde(default = "default_suggestion_limit")]
    pub suggestion_limit: usize,

    /// Characters of a solution shown in a suggestion
    /// Default: 100
    #[serde(default = "default_excerpt_chars")]
    pub excerpt_chars: usize,
}

fn default_suggestion_limit() -> usize {
    3
}

fn default_excerpt_chars() -> usize {
    DEFAULT_EXCERPT_CHARS
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            suggestion_limit: default_suggestion_limit(),
            excerpt_chars: default_excerpt_chars(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// `tracing` filter used when neither RUST_LOG nor -v is given
    /// Default: "warn"
    #[serde(default = "default_level")]
    pub level: String,
}

fn default_level() -> String {
    "warn".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_level() }
    }
}

impl Config {
    /// Load config from .helpdesk/config.toml
    /// Returns default config if file doesn't exist
    pub fn load() -> Result<Self, String> {
        match Self::find_config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// Parse one config file; a file that exists but does not parse is an error
    pub fn load_from(path: &Path) -> Result<Self, String> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Could not read {}: {}", path.display(), e))?;
        toml::from_str(&contents).map_err(|e| format!("Invalid {}: {}", path.display(), e))
    }

    /// Find config.toml by walking up directory tree
    pub fn find_config_path() -> Option<PathBuf> {
        let current_dir = std::env::current_dir().ok()?;
        let mut dir = current_dir.as_path();

        loop {
            let config_path = dir.join(".helpdesk").join("config.toml");
            if config_path.exists() {
                return Some(config_path);
            }

            match dir.parent() {
                Some(parent) => dir = parent,
                None => break,
            }
        }
        None
    }

    /// Database file to open: HELPDESK_DB_PATH, then `[database] path`,
    /// then the nearest .helpdesk/helpdesk.db
    pub fn database_path(&self) -> PathBuf {
        if std::env::var_os("HELPDESK_DB_PATH").is_some() {
            return Database::db_path();
        }
        match &self.database.path {
            Some(path) => PathBuf::from(path),
            None => Database::db_path(),
        }
    }

    /// Render as TOML for `helpdesk init`
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.database.pool_size, 5);
        assert_eq!(config.database.path, None);
        assert_eq!(config.triage.suggestion_limit, 3);
        assert_eq!(config.triage.excerpt_chars, 100);
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[database]
path = "/var/lib/helpdesk/helpdesk.db"

[triage]
suggestion_limit = 5
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.database.path.as_deref(), Some("/var/lib/helpdesk/helpdesk.db"));
        assert_eq!(config.database.pool_size, 5);
        assert_eq!(config.triage.suggestion_limit, 5);
        assert_eq!(config.triage.excerpt_chars, 100);
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn test_load_from_reports_malformed_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[triage\nsuggestion_limit = = 5\n").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(err.contains("config.toml"), "got: {}", err);

        std::fs::write(&path, "[database]\npath = \"/srv/helpdesk.db\"\n").unwrap();
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.database.path.as_deref(), Some("/srv/helpdesk.db"));
    }

    #[test]
    fn test_default_config_renders_and_parses_back() {
        let rendered = Config::default().to_toml().unwrap();
        assert!(rendered.contains("[triage]"));
        let parsed: Config = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed.triage.excerpt_chars, 100);
    }
}
