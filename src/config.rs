use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

// =============================================================================
// Index-related constants
// =============================================================================

/// Default MetaCPAN API endpoint
pub const DEFAULT_INDEX_URL: &str = "https://fastapi.metacpan.org";

/// Page-size ceiling for index searches; reaching it is an error, never a truncation
pub const DEFAULT_MAX_RESULTS: usize = 5000;

/// Timeout for a single index request in milliseconds (30 seconds)
pub const FETCH_TIMEOUT_MS: u64 = 30_000;

// =============================================================================
// Survey-related constants
// =============================================================================

/// Weight of a manifest module whose version matches but whose file size differs
pub const DEFAULT_SIZE_MISMATCH_WEIGHT: f64 = 0.1;

/// Number of modules resolved concurrently
pub const DEFAULT_CONCURRENCY: usize = 8;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Survey configuration structure
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct SurveyConfig {
    pub index: IndexConfig,
    pub scoring: ScoringConfig,
    pub cache: CacheConfig,
    pub concurrency: usize,
}

impl Default for SurveyConfig {
    fn default() -> Self {
        Self {
            index: IndexConfig::default(),
            scoring: ScoringConfig::default(),
            cache: CacheConfig::default(),
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

impl SurveyConfig {
    /// Load a JSON config file; missing fields keep their defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make every index query fail
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.index.max_results == 0 {
            return Err(ConfigError::Invalid(
                "index.maxResults must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Remote index configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct IndexConfig {
    pub base_url: String,
    pub max_results: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_INDEX_URL.to_string(),
            max_results: DEFAULT_MAX_RESULTS,
        }
    }
}

/// Scoring parameters
#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ScoringConfig {
    pub size_mismatch_weight: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            size_mismatch_weight: DEFAULT_SIZE_MISMATCH_WEIGHT,
        }
    }
}

/// Memo cache configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct CacheConfig {
    pub enabled: bool,
    /// Database file; defaults to [`db_path`]
    pub path: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
        }
    }
}

/// Returns the path to the data directory for dist-surveyor.
/// Uses $XDG_DATA_HOME/dist-surveyor if XDG_DATA_HOME is set,
/// otherwise falls back to ~/.local/share/dist-surveyor,
/// or ./dist-surveyor if neither is available.
pub fn data_dir() -> PathBuf {
    data_dir_with_env(std::env::var("XDG_DATA_HOME").ok(), dirs::home_dir())
}

/// Returns the path to the memo database file.
pub fn db_path() -> PathBuf {
    data_dir().join("memo.db")
}

fn data_dir_with_env(xdg_data_home: Option<String>, home_dir: Option<PathBuf>) -> PathBuf {
    let data_dir = xdg_data_home
        .map(PathBuf::from)
        .or_else(|| home_dir.map(|home| home.join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."));

    data_dir.join("dist-surveyor")
}
