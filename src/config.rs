use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Deserialize;

use crate::error::ConfigError;
use crate::lexicon::Catalog;

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub chat: ChatConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_bot_username")]
    pub bot_username: String,
    #[serde(default = "default_locale")]
    pub default_locale: String,
    #[serde(default = "default_timezone")]
    pub default_timezone: String,
    /// Mirrors the host's experimental timezone display setting: when off,
    /// wall-clock phrases are interpreted in UTC instead of the user's
    /// timezone.
    #[serde(default = "default_timezone_aware")]
    pub timezone_aware: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_level: default_log_level(),
            bot_username: default_bot_username(),
            default_locale: default_locale(),
            default_timezone: default_timezone(),
            timezone_aware: default_timezone_aware(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_bot_username() -> String {
    "remindbot".to_string()
}
fn default_locale() -> String {
    "en".to_string()
}
fn default_timezone() -> String {
    "UTC".to_string()
}
fn default_timezone_aware() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    "remindbot.db".to_string()
}

#[derive(Debug, Deserialize)]
pub struct ChatConfig {
    #[serde(default = "default_chat_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub token: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            base_url: default_chat_base_url(),
            token: String::new(),
        }
    }
}

fn default_chat_base_url() -> String {
    "http://localhost:8065".to_string()
}

impl Config {
    /// Resolve the database path (relative to data_dir if not absolute).
    pub fn db_path(&self) -> PathBuf {
        let db_path = Path::new(&self.database.path);
        if db_path.is_absolute() {
            db_path.to_path_buf()
        } else {
            self.service.data_dir.join(db_path)
        }
    }

    pub fn default_tz(&self) -> chrono_tz::Tz {
        self.service
            .default_timezone
            .parse()
            .unwrap_or(chrono_tz::UTC)
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Unreadable {
        path: path.display().to_string(),
        source: e,
    })?;
    let config: Config = toml::from_str(&content).map_err(ConfigError::Toml)?;
    Ok(config)
}

pub fn validate_config(config: &Config) -> Result<()> {
    // Validate timezone
    config
        .service
        .default_timezone
        .parse::<chrono_tz::Tz>()
        .map_err(|_| {
            ConfigError::Invalid(format!(
                "unknown timezone '{}'",
                config.service.default_timezone
            ))
        })?;

    // Validate the default locale is shipped with the binary
    Catalog::builtin(&config.service.default_locale).map_err(|e| {
        ConfigError::Invalid(format!(
            "default locale '{}': {e}",
            config.service.default_locale
        ))
    })?;

    if config.service.bot_username.is_empty() {
        return Err(ConfigError::Invalid("bot_username must not be empty".to_string()).into());
    }

    if !config.chat.base_url.starts_with("http://") && !config.chat.base_url.starts_with("https://") {
        return Err(ConfigError::Invalid(format!(
            "chat base_url '{}' must be an http(s) URL",
            config.chat.base_url
        ))
        .into());
    }

    Ok(())
}
