use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::env;
use std::path::{Path, PathBuf};

use crate::document::Document;
use crate::timestamp::{
    DocumentTimestampService, NullTimestampService, SortingTimestampService, TimestampService,
};
use crate::tracker::DEFAULT_MAX_RECORDED_ERRORS;

/// Environment variable naming a config file.
pub const CONFIG_ENV: &str = "DEJE_CONFIG";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DejeConfig {
    #[serde(default)]
    pub tracker: TrackerConfig,
    #[serde(default)]
    pub document: DocumentConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerConfig {
    #[serde(default)]
    pub source: TimestampSource,
    #[serde(default = "default_max_recorded_errors")]
    pub max_recorded_errors: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            source: TimestampSource::default(),
            max_recorded_errors: default_max_recorded_errors(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentConfig {
    #[serde(default = "default_true")]
    pub verify_hashes: bool,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            verify_hashes: default_true(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    #[default]
    Human,
    Json,
}

/// Which built-in timestamp service answers for a document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimestampSource {
    /// The document file's own `timestamps` list.
    #[default]
    Document,
    /// Every registered quorum, in hash order.
    SortedQuorums,
    None,
}

impl TimestampService for TimestampSource {
    type Error = Infallible;

    fn get_timestamps(&self, topic: &str, doc: &Document) -> Result<Vec<String>, Infallible> {
        match self {
            Self::Document => DocumentTimestampService.get_timestamps(topic, doc),
            Self::SortedQuorums => SortingTimestampService.get_timestamps(topic, doc),
            Self::None => NullTimestampService.get_timestamps(topic, doc),
        }
    }
}

/// Pick the config file: `explicit`, then `$DEJE_CONFIG`, then the user
/// config dir. `None` when no candidate location is known.
#[must_use]
pub fn config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    resolve_path(
        explicit,
        env::var_os(CONFIG_ENV).map(PathBuf::from),
        dirs::config_dir(),
    )
}

fn resolve_path(
    explicit: Option<&Path>,
    env_path: Option<PathBuf>,
    config_dir: Option<PathBuf>,
) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Some(path) = env_path.filter(|p| !p.as_os_str().is_empty()) {
        return Some(path);
    }
    config_dir.map(|dir| dir.join("deje/config.toml"))
}

/// Load configuration, falling back to defaults when no file exists.
///
/// # Errors
///
/// Returns an error if the chosen file exists but cannot be read or parsed.
pub fn load_config(explicit: Option<&Path>) -> Result<DejeConfig> {
    match config_path(explicit) {
        Some(path) => load_config_file(&path),
        None => Ok(DejeConfig::default()),
    }
}

/// Load one config file. A missing file yields the defaults.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_config_file(path: &Path) -> Result<DejeConfig> {
    if !path.exists() {
        return Ok(DejeConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<DejeConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

const fn default_true() -> bool {
    true
}

const fn default_max_recorded_errors() -> usize {
    DEFAULT_MAX_RECORDED_ERRORS
}
