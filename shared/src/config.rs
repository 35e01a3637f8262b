use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default ceiling for a refresh result bundle, kept under the ~1 MB
/// platform IPC transaction limit.
pub const DEFAULT_PAYLOAD_BUDGET_BYTES: usize = 500 * 1024;
pub const DEFAULT_PHOTO_MAX_WIDTH: u32 = 500;
pub const DEFAULT_PHOTO_MAX_HEIGHT: u32 = 500;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    pub payload_budget_bytes: usize,
    pub photo_max_width: u32,
    pub photo_max_height: u32,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            payload_budget_bytes: DEFAULT_PAYLOAD_BUDGET_BYTES,
            photo_max_width: DEFAULT_PHOTO_MAX_WIDTH,
            photo_max_height: DEFAULT_PHOTO_MAX_HEIGHT,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhotoConfig {
    pub max_input_bytes: usize,
    pub max_dimension: u32,
    pub max_alloc_bytes: u64,
}

impl Default for PhotoConfig {
    fn default() -> Self {
        Self {
            max_input_bytes: 10 * 1024 * 1024,
            max_dimension: 8_192,
            max_alloc_bytes: 256 * 1024 * 1024,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// SQLite file; in-memory when absent.
    pub database_path: Option<PathBuf>,
    pub refresh: RefreshConfig,
    pub photo: PhotoConfig,
}

impl CoreConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.refresh.payload_budget_bytes == 0 {
            return Err(ConfigError::Invalid(
                "refresh.payload_budget_bytes must be > 0".into(),
            ));
        }
        if self.refresh.photo_max_width == 0 || self.refresh.photo_max_height == 0 {
            return Err(ConfigError::Invalid(
                "refresh photo bounds must be > 0".into(),
            ));
        }
        if self.photo.max_input_bytes == 0 {
            return Err(ConfigError::Invalid(
                "photo.max_input_bytes must be > 0".into(),
            ));
        }
        if self.photo.max_dimension < self.refresh.photo_max_width.max(self.refresh.photo_max_height) {
            return Err(ConfigError::Invalid(
                "photo.max_dimension must cover the refresh photo bounds".into(),
            ));
        }
        Ok(())
    }
}
