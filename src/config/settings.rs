//! Repository settings management
//!
//! Reads optional repository-wide settings from `stackforge.toml` at the
//! repository root. A missing file yields the defaults.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::defaults::{
    DEFAULT_BUILDER, DEFAULT_LABEL_PREFIX, DEFAULT_SERVICES_DIR, SETTINGS_FILE,
};
use crate::core::context::DepCacheMode;

/// Repository settings error types
#[derive(Error, Debug)]
pub enum SettingsError {
    /// Failed to read settings file
    #[error("Failed to read settings file '{path}': {error}")]
    ReadError { path: String, error: String },

    /// Failed to parse settings file
    #[error("Failed to parse settings file '{path}': {error}")]
    ParseError { path: String, error: String },
}

/// Repository-wide settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepoSettings {
    /// Directory (relative to the repository root) holding service directories
    pub services_dir: PathBuf,

    /// Registry prefix prepended to image names (e.g. `ghcr.io/acme`)
    pub registry: Option<String>,

    /// Container builder CLI
    pub builder: String,

    /// Prefix of generated image labels
    pub label_prefix: String,

    /// Dep-cache mode used in CI when no flag is given
    pub dep_cache: DepCacheMode,
}

impl Default for RepoSettings {
    fn default() -> Self {
        Self {
            services_dir: PathBuf::from(DEFAULT_SERVICES_DIR),
            registry: None,
            builder: DEFAULT_BUILDER.to_string(),
            label_prefix: DEFAULT_LABEL_PREFIX.to_string(),
            dep_cache: DepCacheMode::default(),
        }
    }
}

impl RepoSettings {
    /// Load settings from `<repo_root>/stackforge.toml`
    pub fn load(repo_root: &Path) -> Result<Self, SettingsError> {
        Self::load_from_path(&repo_root.join(SETTINGS_FILE))
    }

    /// Load settings from a specific path
    ///
    /// If the file doesn't exist, returns the defaults.
    pub fn load_from_path(path: &Path) -> Result<Self, SettingsError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| SettingsError::ReadError {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;

        toml::from_str(&content).map_err(|e| SettingsError::ParseError {
            path: path.display().to_string(),
            error: e.to_string(),
        })
    }

    /// Full image name for a service, honouring the registry prefix
    pub fn image_name(&self, service: &str) -> String {
        match self.registry.as_deref().map(|r| r.trim_end_matches('/')) {
            Some(registry) if !registry.is_empty() => format!("{registry}/{service}"),
            _ => service.to_string(),
        }
    }
}
