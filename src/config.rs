//! # Configuration Module
//!
//! Loads engine settings from a TOML file, falling back to defaults when the
//! file is missing or cannot be parsed. Every section and field is optional.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::models::{SessionTemplate, DEFAULT_SPLIT_RATIO};

/// Main engine configuration structure
///
/// Groups the layout, session and persistence sections of the TOML file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    pub layout: LayoutSettings,
    pub sessions: SessionSettings,
    pub persistence: PersistenceSettings,
}

/// Split-tree settings shared by panes and session groups
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LayoutSettings {
    /// Ratio given to new splits, 0..=100. Larger values are clamped.
    pub default_split_ratio: u8,
}

/// Terminal session settings
///
/// Launch defaults for sessions that have no neighbour to copy from, plus the
/// initial PTY size.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionSettings {
    pub default_shell: Option<String>,
    pub default_cwd: Option<String>,
    pub cols: u16,
    pub rows: u16,
}

/// Snapshot storage settings
///
/// Each registry is saved as `<directory>/<key>.json`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PersistenceSettings {
    pub enabled: bool,
    pub directory: PathBuf,
    pub pane_key: String,
    pub session_key: String,
}

impl Default for LayoutSettings {
    fn default() -> Self {
        Self {
            default_split_ratio: DEFAULT_SPLIT_RATIO,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            default_shell: None,
            default_cwd: None,
            cols: 80,
            rows: 24,
        }
    }
}

impl SessionSettings {
    /// Template used when no existing session can be copied
    ///
    /// # Returns
    ///
    /// A `SessionTemplate` carrying the configured shell and working directory
    pub fn template(&self) -> SessionTemplate {
        SessionTemplate {
            shell: self.default_shell.clone(),
            cwd: self.default_cwd.clone(),
        }
    }
}

impl Default for PersistenceSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: PathBuf::from(".workspace"),
            pane_key: "editor-layout".to_string(),
            session_key: "terminal-groups".to_string(),
        }
    }
}

/// Loads configuration from a TOML file
///
/// A missing or unparsable file is not an error: the problem is logged and
/// [`default_config`] is returned instead.
///
/// # Returns
///
/// A `WorkspaceConfig` either loaded from `path` or using defaults
pub fn load_config(path: impl AsRef<Path>) -> WorkspaceConfig {
    let path = path.as_ref();
    match fs::read_to_string(path) {
        Ok(content) => parse_config(&content).unwrap_or_else(|e| {
            log::warn!("Error parsing {}: {}", path.display(), e);
            default_config()
        }),
        Err(_) => {
            log::info!("{} not found, using default configuration", path.display());
            default_config()
        }
    }
}

/// Parses configuration from TOML text
///
/// Sections and fields left out of `content` keep their default values.
///
/// # Returns
///
/// The parsed `WorkspaceConfig`, or the TOML error when `content` is invalid
pub fn parse_config(content: &str) -> Result<WorkspaceConfig, toml::de::Error> {
    toml::from_str(content)
}

/// Provides the default engine configuration
///
/// Even splits, an 80x24 terminal with the system shell, and persistence
/// under `.workspace/`.
///
/// # Returns
///
/// A `WorkspaceConfig` instance with default settings
pub fn default_config() -> WorkspaceConfig {
    WorkspaceConfig::default()
}
