use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::collector::{CollectItems, Scope};
use crate::export::{ExportItems, DEFAULT_CSV_FOLDER};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
    #[error("failed to parse {name} as integer: {source}")]
    ParseInt {
        name: String,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("failed to parse {name} as boolean: {value}")]
    ParseBool { name: String, value: String },
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Discourse
    pub site_url: String,
    pub categories: Vec<String>,
    pub topic_id: Option<u64>,
    pub rate_limit: Duration,
    pub request_timeout: Duration,

    // Scheduling
    pub repeat_collect: bool,
    pub collection_interval: Duration,

    // Export
    pub export_type: ExportType,
    pub export_path: Option<PathBuf>,
    /// Folder the CSV export writes its files into.
    pub csv_folder: PathBuf,
    pub export_posts: bool,
    pub export_edits: bool,
    pub export_users: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportType {
    /// One JSON document per cycle, to a file or stdout
    Json,
    /// Upserts into a SQLite database
    Sqlite,
    /// One file per row kind in `CSV_FOLDER`
    Csv,
}

/// Database file used by the SQLite export when `EXPORT_PATH` is unset.
pub const DEFAULT_SQLITE_PATH: &str = "./data/discourse.sqlite";

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is present but cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            // Discourse
            site_url: env_or_default("DISCOURSE_SITE_URL", "http://127.0.0.1:3000"),
            categories: parse_list(&env_or_default("DISCOURSE_CATEGORIES", "")),
            topic_id: parse_env_optional_u64("DISCOURSE_TOPIC")?,
            rate_limit: Duration::from_millis(parse_env_u64("DISCOURSE_RATE_LIMIT_MS", 1000)?),
            request_timeout: Duration::from_secs(parse_env_u64("REQUEST_TIMEOUT_SECS", 30)?),

            // Scheduling
            repeat_collect: parse_env_bool("REPEAT_COLLECT", false)?,
            collection_interval: Duration::from_secs(parse_env_u64(
                "COLLECTION_INTERVAL_SECS",
                3600,
            )?),

            // Export
            export_type: parse_export_type(&env_or_default("EXPORT_TYPE", "json"))?,
            export_path: optional_env("EXPORT_PATH").map(PathBuf::from),
            csv_folder: PathBuf::from(env_or_default("CSV_FOLDER", DEFAULT_CSV_FOLDER)),
            export_posts: parse_env_bool("EXPORT_POSTS", true)?,
            export_edits: parse_env_bool("EXPORT_EDITS", true)?,
            export_users: parse_env_bool("EXPORT_USERS", true)?,
        })
    }

    /// Validate that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match url::Url::parse(&self.site_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => {
                return Err(ConfigError::InvalidValue {
                    name: "DISCOURSE_SITE_URL".to_string(),
                    message: format!("unsupported scheme '{}'", url.scheme()),
                });
            }
            Err(e) => {
                return Err(ConfigError::InvalidValue {
                    name: "DISCOURSE_SITE_URL".to_string(),
                    message: e.to_string(),
                });
            }
        }
        if self.topic_id == Some(0) {
            return Err(ConfigError::InvalidValue {
                name: "DISCOURSE_TOPIC".to_string(),
                message: "must be a positive topic id".to_string(),
            });
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                name: "REQUEST_TIMEOUT_SECS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.repeat_collect && self.collection_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                name: "COLLECTION_INTERVAL_SECS".to_string(),
                message: "must be at least 1 when REPEAT_COLLECT is enabled".to_string(),
            });
        }
        if !(self.export_posts || self.export_edits || self.export_users) {
            return Err(ConfigError::InvalidValue {
                name: "EXPORT_POSTS/EXPORT_EDITS/EXPORT_USERS".to_string(),
                message: "at least one must be enabled".to_string(),
            });
        }
        Ok(())
    }

    /// Collection scope: a single topic overrides the category list.
    #[must_use]
    pub fn scope(&self) -> Scope {
        match self.topic_id {
            Some(topic_id) => Scope::Topic(topic_id),
            None if self.categories.is_empty() => Scope::AllCategories,
            None => Scope::Categories(self.categories.clone()),
        }
    }

    #[must_use]
    pub fn collect_items(&self) -> CollectItems {
        CollectItems {
            posts: self.export_posts,
            users: self.export_users,
            edits: self.export_edits,
        }
    }

    #[must_use]
    pub fn export_items(&self) -> ExportItems {
        ExportItems {
            posts: self.export_posts,
            edits: self.export_edits,
            users: self.export_users,
        }
    }

    /// Configuration with defaults and no environment access.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            site_url: "http://127.0.0.1:3000".to_string(),
            categories: Vec::new(),
            topic_id: None,
            rate_limit: Duration::ZERO,
            request_timeout: Duration::from_secs(5),
            repeat_collect: false,
            collection_interval: Duration::from_secs(3600),
            export_type: ExportType::Json,
            export_path: None,
            csv_folder: PathBuf::from(DEFAULT_CSV_FOLDER),
            export_posts: true,
            export_edits: true,
            export_users: true,
        }
    }
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_or_default(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_env_u64(name: &str, default: u64) -> Result<u64, ConfigError> {
    Ok(parse_env_optional_u64(name)?.unwrap_or(default))
}

fn parse_env_optional_u64(name: &str) -> Result<Option<u64>, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.trim().is_empty() => {
            val.trim()
                .parse()
                .map(Some)
                .map_err(|e| ConfigError::ParseInt {
                    name: name.to_string(),
                    source: e,
                })
        }
        _ => Ok(None),
    }
}

fn parse_env_bool(name: &str, default: bool) -> Result<bool, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => match val.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::ParseBool {
                name: name.to_string(),
                value: val,
            }),
        },
        _ => Ok(default),
    }
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn parse_export_type(value: &str) -> Result<ExportType, ConfigError> {
    match value.to_lowercase().as_str() {
        "json" => Ok(ExportType::Json),
        "sqlite" => Ok(ExportType::Sqlite),
        "csv" => Ok(ExportType::Csv),
        _ => Err(ConfigError::InvalidValue {
            name: "EXPORT_TYPE".to_string(),
            message: format!("must be 'json', 'sqlite' or 'csv', got '{value}'"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;

    #[test]
    fn test_parse_export_type() {
        assert_eq!(parse_export_type("json").unwrap(), ExportType::Json);
        assert_eq!(parse_export_type("JSON").unwrap(), ExportType::Json);
        assert_eq!(parse_export_type("sqlite").unwrap(), ExportType::Sqlite);
        assert_eq!(parse_export_type("Csv").unwrap(), ExportType::Csv);
        assert!(parse_export_type("mysql").is_err());
    }

    #[test]
    fn test_parse_list() {
        assert_eq!(
            parse_list(" announcements, dev/rust ,,"),
            vec!["announcements".to_string(), "dev/rust".to_string()]
        );
        assert!(parse_list("").is_empty());
    }

    #[test]
    fn test_scope_selection() {
        let mut config = Config::for_testing();
        assert_eq!(config.scope(), Scope::AllCategories);

        config.categories = vec!["general".to_string()];
        assert_eq!(config.scope(), Scope::Categories(vec!["general".to_string()]));

        config.topic_id = Some(42);
        assert_eq!(config.scope(), Scope::Topic(42));
    }

    #[test]
    fn test_validate() {
        assert!(Config::for_testing().validate().is_ok());

        let mut config = Config::for_testing();
        config.site_url = "ftp://forum.example.com".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::for_testing();
        config.export_posts = false;
        config.export_edits = false;
        config.export_users = false;
        assert!(config.validate().is_err());

        let mut config = Config::for_testing();
        config.topic_id = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_from_env() {
        std::env::set_var("DISCOURSE_SITE_URL", "https://forum.example.com");
        std::env::set_var("DISCOURSE_CATEGORIES", "general,dev/rust");
        std::env::set_var("DISCOURSE_RATE_LIMIT_MS", "250");
        std::env::set_var("EXPORT_TYPE", "sqlite");
        std::env::set_var("EXPORT_EDITS", "no");

        let config = Config::from_env().unwrap();

        std::env::remove_var("DISCOURSE_SITE_URL");
        std::env::remove_var("DISCOURSE_CATEGORIES");
        std::env::remove_var("DISCOURSE_RATE_LIMIT_MS");
        std::env::remove_var("EXPORT_TYPE");
        std::env::remove_var("EXPORT_EDITS");

        assert_eq!(config.site_url, "https://forum.example.com");
        assert_eq!(config.categories, vec!["general", "dev/rust"]);
        assert_eq!(config.rate_limit, Duration::from_millis(250));
        assert_eq!(config.export_type, ExportType::Sqlite);
        assert!(!config.export_edits);
        assert!(config.export_posts);
        assert_eq!(config.topic_id, None);
        assert_eq!(config.csv_folder, PathBuf::from("out"));
    }

    #[test]
    #[serial]
    fn test_from_env_csv_folder() {
        std::env::set_var("EXPORT_TYPE", "csv");
        std::env::set_var("CSV_FOLDER", "exports/forum");

        let config = Config::from_env().unwrap();

        std::env::remove_var("EXPORT_TYPE");
        std::env::remove_var("CSV_FOLDER");

        assert_eq!(config.export_type, ExportType::Csv);
        assert_eq!(config.csv_folder, PathBuf::from("exports/forum"));
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_bad_values() {
        std::env::set_var("DISCOURSE_TOPIC", "abc");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::ParseInt { .. })
        ));
        std::env::remove_var("DISCOURSE_TOPIC");

        std::env::set_var("REPEAT_COLLECT", "maybe");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::ParseBool { .. })
        ));
        std::env::remove_var("REPEAT_COLLECT");
    }
}
