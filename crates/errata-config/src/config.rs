//! Tool settings for `ej`.
//!
//! Settings are layered with figment: built-in defaults, then the YAML
//! settings file (if one was found), then `EJ_`-prefixed environment
//! variables.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur while locating or loading settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The settings file could not be read.
    #[error("failed to read settings file: {0}")]
    ReadError(#[from] std::io::Error),

    /// The settings file contained invalid YAML.
    #[error("failed to parse settings file: {0}")]
    ParseError(#[from] serde_yaml::Error),

    /// A layer produced a value of the wrong shape.
    #[error("invalid settings: {0}")]
    Extract(#[from] Box<figment::Error>),

    /// An explicitly requested settings file does not exist.
    #[error("settings file not found: {}", .0.display())]
    NotFound(PathBuf),
}

/// A specialized `Result` type for settings operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Prefix for environment variables that override settings.
pub const ENV_PREFIX: &str = "EJ_";

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Resolved `ej` settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Issue config used when a command is not given one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_config: Option<String>,

    /// Environment variables added to every expansion, below `-e` values.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,

    /// Assignee used for every issue instead of the template assignee.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,

    /// Settings file the values were loaded from, if any.
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

/// Load settings, layering `file` (if any) and the environment over defaults.
pub fn load_settings(file: Option<&Path>) -> Result<Settings> {
    let mut figment = Figment::from(Serialized::defaults(Settings::default()));
    if let Some(path) = file {
        if !path.is_file() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        // Fail with a YAML message rather than a figment one.
        let content = std::fs::read_to_string(path)?;
        if !content.trim().is_empty() {
            serde_yaml::from_str::<serde_yaml::Value>(&content)?;
        }
        figment = figment.merge(Yaml::file(path));
    }
    figment = figment.merge(Env::prefixed(ENV_PREFIX).only(&["issue_config", "assignee"]));

    let mut settings: Settings = figment.extract().map_err(Box::new)?;
    settings.source = file.map(Path::to_path_buf);
    debug!(source = ?settings.source, "loaded settings");
    Ok(settings)
}

/// Render settings as YAML.
pub fn to_yaml(settings: &Settings) -> Result<String> {
    Ok(serde_yaml::to_string(settings)?)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
