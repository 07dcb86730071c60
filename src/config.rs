//! Configuration file support.
//!
//! Located at `~/Library/Application Support/sift/config.toml` (macOS),
//! `%LOCALAPPDATA%\sift\config.toml` (Windows) or
//! `~/.local/share/sift/config.toml` (Linux). Every key is optional.

use crate::error::{Error, Result};
use crate::logging::LogConfig;
use crate::posterior::Importance;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const APP_NAME: &str = "sift";
const CONFIG_FILE: &str = "config.toml";

/// Default maximum line gap between consecutive proximity matches
pub const DEFAULT_NEAR_DISTANCE: usize = 3;

/// Default time a query waits for a document source
pub const DEFAULT_SOURCE_TIMEOUT_MS: u64 = 10_000;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SiftConfig {
    pub search: SearchConfig,
    pub posterior: PosteriorConfig,
    pub fs: FsConfig,
    pub command: CommandConfig,
    pub logging: LogConfig,
}

/// Which ranking function turns term counts into scores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RankingModel {
    #[default]
    Bm25,
    Bm25f,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Maximum line gap inside a proximity match
    pub near_distance: usize,
    /// Expand bare terms into camel/snake/kebab alternatives
    pub expand_terms: bool,
    /// How long to wait for each document source
    pub source_timeout_ms: u64,
    /// Results per page
    pub page_size: usize,
    pub ranking: RankingModel,
    /// Per-field BM25F weights; unlisted fields weigh 1.0
    pub field_weights: HashMap<String, f64>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            near_distance: DEFAULT_NEAR_DISTANCE,
            expand_terms: true,
            source_timeout_ms: DEFAULT_SOURCE_TIMEOUT_MS,
            page_size: 10,
            ranking: RankingModel::Bm25,
            field_weights: HashMap::new(),
        }
    }
}

impl SearchConfig {
    pub fn source_timeout(&self) -> Duration {
        Duration::from_millis(self.source_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PosteriorConfig {
    /// Importance given to the query's own probability
    pub query_importance: Importance,
    /// Multiplier applied per observation event
    pub observation_decay: f64,
    /// Floor for the observation multiplier; it never reaches zero
    pub min_observation: f64,
}

impl Default for PosteriorConfig {
    fn default() -> Self {
        Self {
            query_importance: Importance::Medium,
            observation_decay: 0.5,
            min_observation: 1e-6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FsConfig {
    /// Only files matching one of these globs are listed
    pub include: Vec<String>,
    /// Files matching one of these globs are skipped
    pub exclude: Vec<String>,
    /// Include hidden files
    pub hidden: bool,
    /// Larger files are never read
    pub max_file_size: u64,
}

impl Default for FsConfig {
    fn default() -> Self {
        Self {
            include: Vec::new(),
            exclude: Vec::new(),
            hidden: false,
            max_file_size: 10 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandConfig {
    /// Counting program
    pub program: String,
    /// Arguments; `{pattern}` and `{root}` are substituted
    pub args: Vec<String>,
    /// Exit codes meaning "no matches" rather than failure
    pub no_match_exit_codes: Vec<i32>,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            program: "rg".to_string(),
            args: [
                "--count-matches",
                "--with-filename",
                "--no-messages",
                "-e",
                "{pattern}",
                "{root}",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            no_match_exit_codes: vec![1],
        }
    }
}

impl SiftConfig {
    /// Load config from the app data directory, or defaults if not found
    pub fn load() -> Result<Self> {
        match get_config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load config from an explicit path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn parse(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}

/// Get the application data directory
pub fn get_app_data_dir() -> Option<PathBuf> {
    let base = if cfg!(target_os = "macos") {
        dirs::home_dir().map(|h| h.join("Library").join("Application Support"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
    } else {
        // Linux/Unix: use XDG_DATA_HOME or ~/.local/share
        dirs::data_dir()
    };
    base.map(|b| b.join(APP_NAME))
}

/// Get the path to the config file
pub fn get_config_path() -> Option<PathBuf> {
    get_app_data_dir().map(|dir| dir.join(CONFIG_FILE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::LogFormat;

    #[test]
    fn test_defaults() {
        let config = SiftConfig::default();
        assert_eq!(config.search.near_distance, 3);
        assert!(config.search.expand_terms);
        assert_eq!(config.search.ranking, RankingModel::Bm25);
        assert_eq!(config.posterior.query_importance, Importance::Medium);
        assert_eq!(config.command.program, "rg");
    }

    #[test]
    fn test_parse_partial_config() {
        let config = SiftConfig::parse(
            r#"
[search]
near_distance = 5
ranking = "bm25f"

[search.field_weights]
name = 2.5

[posterior]
query_importance = "high"

[logging]
format = "json"
"#,
        )
        .unwrap();

        assert_eq!(config.search.near_distance, 5);
        assert_eq!(config.search.ranking, RankingModel::Bm25f);
        assert_eq!(config.search.field_weights.get("name"), Some(&2.5));
        assert!(!config.search.field_weights.contains_key("path"));
        assert!(config.search.expand_terms);
        assert_eq!(config.posterior.query_importance, Importance::High);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_parse_empty_config() {
        let config = SiftConfig::parse("").unwrap();
        assert_eq!(config.search.page_size, 10);
    }

    #[test]
    fn test_invalid_config_is_error() {
        assert!(SiftConfig::parse("[search]\nnear_distance = \"far\"").is_err());
    }
}
