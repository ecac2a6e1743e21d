use std::{fs, path::PathBuf};

use serde::{Deserialize, Serialize};

pub const APP_NAME: &str = "hearth";
pub const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Host that invite links point at
    #[serde(default = "default_host")]
    pub host: String,
    /// How far a signed request timestamp may drift, in milliseconds
    #[serde(default = "default_max_age_ms")]
    pub max_age_ms: u64,
    /// Default log level; RUST_LOG overrides it
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_host() -> String {
    "hearth.local".to_string()
}

fn default_max_age_ms() -> u64 {
    300_000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            max_age_ms: default_max_age_ms(),
            log_level: default_log_level(),
        }
    }
}

/// The hearth config directory. Never holds secrets.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Path to the hearth directory (~/.hearth)
    pub hearth_dir: PathBuf,
    /// Path to the config file
    pub config_path: PathBuf,
    /// Loaded configuration
    pub config: AppConfig,
}

impl AppState {
    /// Get the hearth directory path (custom or default ~/.hearth)
    pub fn hearth_dir(custom_path: Option<PathBuf>) -> Result<PathBuf, StateError> {
        if let Some(path) = custom_path {
            return Ok(path);
        }

        let home = dirs::home_dir().ok_or(StateError::NoHomeDirectory)?;
        Ok(home.join(format!(".{}", APP_NAME)))
    }

    /// Initialize a new hearth directory
    pub fn init(custom_path: Option<PathBuf>, config: Option<AppConfig>) -> Result<Self, StateError> {
        let hearth_dir = Self::hearth_dir(custom_path)?;
        let config_path = hearth_dir.join(CONFIG_FILE_NAME);

        if config_path.exists() {
            return Err(StateError::AlreadyInitialized);
        }

        fs::create_dir_all(&hearth_dir)?;

        let config = config.unwrap_or_default();
        let config_toml = toml::to_string_pretty(&config)?;
        fs::write(&config_path, config_toml)?;

        Ok(Self {
            hearth_dir,
            config_path,
            config,
        })
    }

    /// Load existing state from the hearth directory
    pub fn load(custom_path: Option<PathBuf>) -> Result<Self, StateError> {
        let hearth_dir = Self::hearth_dir(custom_path)?;
        let config_path = hearth_dir.join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            return Err(StateError::NotInitialized);
        }

        let config_toml = fs::read_to_string(&config_path)?;
        let config: AppConfig = toml::from_str(&config_toml)?;

        Ok(Self {
            hearth_dir,
            config_path,
            config,
        })
    }

    /// Load the config, or fall back to defaults if the directory was never
    /// initialized
    pub fn load_or_default(custom_path: Option<PathBuf>) -> Result<Self, StateError> {
        match Self::load(custom_path.clone()) {
            Err(StateError::NotInitialized) => {
                let hearth_dir = Self::hearth_dir(custom_path)?;
                Ok(Self {
                    config_path: hearth_dir.join(CONFIG_FILE_NAME),
                    hearth_dir,
                    config: AppConfig::default(),
                })
            }
            other => other,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("hearth directory not initialized. Run 'hearth init' first")]
    NotInitialized,

    #[error("hearth directory already initialized")]
    AlreadyInitialized,

    #[error("no home directory found")]
    NoHomeDirectory,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to write config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("failed to read config: {0}")]
    Deserialize(#[from] toml::de::Error),
}
