//! Version and platform manifests
//!
//! `versions.toml` lists the buildable versions of a service, each with its
//! configuration overrides. `platforms.toml` (optional) lists the platform
//! variants, each with its own Dockerfile and platform-level settings.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::OnceLock;
use toml::value::Table;
use toml::Value;

use crate::core::merge::deep_merge;
use crate::error::ConfigValidationError;

fn platform_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$").expect("valid platform name regex")
    })
}

/// Version manifest (`versions.toml`)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VersionManifest {
    /// Version built when none is requested
    pub default: String,

    /// Overrides applied to every version (version-specific values win)
    #[serde(default)]
    pub defaults: Option<Table>,

    /// Buildable versions
    #[serde(default)]
    pub versions: Vec<VersionSpec>,
}

/// One buildable version
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VersionSpec {
    /// Version name, never platform-suffixed
    pub name: String,

    /// Also tag as `latest`
    #[serde(default)]
    pub latest: bool,

    /// Additional tag aliases
    #[serde(default)]
    pub tags: Vec<String>,

    /// Configuration overrides; `overrides.platforms.<name>` holds
    /// platform-specific overrides
    #[serde(default)]
    pub overrides: Table,
}

impl VersionSpec {
    /// Create a version with no overrides
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            latest: false,
            tags: Vec::new(),
            overrides: Table::new(),
        }
    }

    /// Overrides without the platform-specific section
    pub fn common_overrides(&self) -> Table {
        let mut table = self.overrides.clone();
        table.remove("platforms");
        table
    }

    /// Overrides for one platform, if any
    pub fn platform_overrides(&self, platform: &str) -> Option<&Table> {
        self.overrides
            .get("platforms")
            .and_then(Value::as_table)
            .and_then(|platforms| platforms.get(platform))
            .and_then(Value::as_table)
    }

    /// True if `requested` names this version or one of its aliases
    pub fn answers_to(&self, requested: &str) -> bool {
        self.name == requested
            || self.tags.iter().any(|t| t == requested)
            || (self.latest && requested == "latest")
    }
}

impl VersionManifest {
    /// Parse from TOML string
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Find a version by name, tag alias or `latest`
    ///
    /// Exact names take precedence over aliases.
    pub fn find(&self, requested: &str) -> Option<&VersionSpec> {
        self.versions
            .iter()
            .find(|v| v.name == requested)
            .or_else(|| self.versions.iter().find(|v| v.answers_to(requested)))
    }

    /// Names of every version, in manifest order
    pub fn version_names(&self) -> Vec<String> {
        self.versions.iter().map(|v| v.name.clone()).collect()
    }

    /// Check the manifest itself
    ///
    /// `platforms` are the configured platform names of the service, used to
    /// reject platform-suffixed version names.
    pub fn validate(&self, location: &str, platforms: &[String]) -> ConfigValidationError {
        let mut errors = ConfigValidationError::new();
        let mut seen = HashSet::new();

        for version in &self.versions {
            if version.name.is_empty() {
                errors.push(location, "version with empty name");
                continue;
            }
            if !seen.insert(version.name.as_str()) {
                errors.push(location, format!("duplicate version '{}'", version.name));
            }
            if let Some(platform) = platforms
                .iter()
                .find(|p| version.name.ends_with(&format!("-{p}")))
            {
                errors.push(
                    location,
                    format!(
                        "version name '{}' must not carry the platform suffix '-{platform}'",
                        version.name
                    ),
                );
            }
        }

        if !self.versions.iter().any(|v| v.name == self.default) {
            errors.push(
                location,
                format!("default version '{}' is not listed in versions", self.default),
            );
        }

        errors
    }
}

/// Platform manifest (`platforms.toml`)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlatformManifest {
    /// Platform that also carries the unsuffixed tags
    pub default: String,

    /// Settings shared by every platform (platform-specific values win)
    #[serde(default)]
    pub defaults: Option<Table>,

    /// Platform variants
    #[serde(default)]
    pub platforms: Vec<PlatformSpec>,
}

/// One platform variant
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlatformSpec {
    /// Platform name (`^[a-z0-9]+(?:-[a-z0-9]+)*$`)
    pub name: String,

    /// Platform configuration layer: dockerfile, build_args,
    /// external_images, dependencies, labels
    #[serde(flatten)]
    pub layer: Table,
}

impl PlatformSpec {
    /// Dockerfile of this platform
    pub fn dockerfile(&self) -> Option<&str> {
        self.layer.get("dockerfile").and_then(Value::as_str)
    }
}

impl PlatformManifest {
    /// Parse from TOML string
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Names of every platform, in manifest order
    pub fn names(&self) -> Vec<String> {
        self.platforms.iter().map(|p| p.name.clone()).collect()
    }

    /// Find a platform by name
    pub fn get(&self, name: &str) -> Option<&PlatformSpec> {
        self.platforms.iter().find(|p| p.name == name)
    }

    /// True if `name` is a configured platform
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Platform layer with the manifest-level defaults merged underneath
    pub fn layer_for(&self, name: &str) -> Option<Table> {
        let spec = self.get(name)?;
        Some(match &self.defaults {
            Some(defaults) => deep_merge(defaults, &spec.layer),
            None => spec.layer.clone(),
        })
    }

    /// Check the manifest itself
    pub fn validate(&self, location: &str) -> ConfigValidationError {
        let mut errors = ConfigValidationError::new();
        let mut seen = HashSet::new();

        if self.platforms.is_empty() {
            errors.push(location, "platform manifest lists no platforms");
        }

        for platform in &self.platforms {
            if !platform_name_pattern().is_match(&platform.name) {
                errors.push(
                    location,
                    format!(
                        "platform name '{}' must match ^[a-z0-9]+(?:-[a-z0-9]+)*$",
                        platform.name
                    ),
                );
            }
            if !seen.insert(platform.name.as_str()) {
                errors.push(location, format!("duplicate platform '{}'", platform.name));
            }
            let has_dockerfile = platform.dockerfile().is_some()
                || self
                    .defaults
                    .as_ref()
                    .is_some_and(|d| d.get("dockerfile").and_then(Value::as_str).is_some());
            if !has_dockerfile {
                errors.push(
                    format!("{location}[{}]", platform.name),
                    "platform has no 'dockerfile'",
                );
            }
        }

        if !self.contains(&self.default) {
            errors.push(
                location,
                format!("default platform '{}' is not listed in platforms", self.default),
            );
        }

        errors
    }
}
