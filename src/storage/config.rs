use chrono::Weekday;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::access::Identity;

pub const APP_DIR: &str = "palette-calendar";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),
    #[error("Unknown weekday: {0}")]
    InvalidWeekday(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub identity: IdentityConfig,
    pub store: StoreConfig,
    pub memo: MemoConfig,
    pub ui: UiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IdentityConfig {
    pub uid: String,
    pub display_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreConfig {
    pub database: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemoConfig {
    pub debounce_ms: u64,
    pub saving_indicator_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UiConfig {
    pub first_day_of_week: String,
}

impl MemoConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn saving_indicator(&self) -> Duration {
        Duration::from_millis(self.saving_indicator_ms)
    }
}

impl Default for MemoConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 1500,
            saving_indicator_ms: 500,
        }
    }
}

impl UiConfig {
    pub fn first_weekday(&self) -> Result<Weekday, ConfigError> {
        self.first_day_of_week
            .parse::<Weekday>()
            .map_err(|_| ConfigError::InvalidWeekday(self.first_day_of_week.clone()))
    }
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            first_day_of_week: "Sunday".to_string(),
        }
    }
}

impl Config {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(ConfigError::from)
    }

    pub fn load_or_create() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            Self::from_toml(&content)
        } else {
            let config = Self::default();
            config.save()?;
            Ok(config)
        }
    }

    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
    }

    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, config_path: &std::path::Path) -> Result<(), ConfigError> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;

        Ok(())
    }

    pub fn identity(&self) -> Identity {
        Identity::new(&self.identity.uid, &self.identity.display_name)
    }
}

impl Default for Config {
    fn default() -> Self {
        let user = std::env::var("USER").unwrap_or_else(|_| "owner".to_string());

        Self {
            identity: IdentityConfig {
                uid: user.clone(),
                display_name: user,
            },
            store: StoreConfig {
                database: Self::config_dir().join("calendar.db"),
            },
            memo: MemoConfig::default(),
            ui: UiConfig::default(),
        }
    }
}
