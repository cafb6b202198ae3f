//! Configuration for report generation
//!
//! Loaded from, in order of priority:
//! - an explicit path (`--config` / `CYKEL_CONFIG`)
//! - `<config dir>/cykel/config.toml`
//! - built-in defaults

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub report: ReportConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ReportConfig {
    /// How many of the latest symptoms to include in a report
    pub recent_symptoms: usize,
    /// Users that always get a report, even without any logged data
    pub users: Vec<String>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            recent_symptoms: 5,
            users: Vec::new(),
        }
    }
}

impl Config {
    /// Load from `path` if given, otherwise from the user config file when it
    /// exists. A file that exists but does not parse is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match Self::user_config_path().filter(|p| p.exists()) {
                Some(p) => p,
                None => return Ok(Self::default()),
            },
        };

        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("cykel").join("config.toml"))
    }
}
