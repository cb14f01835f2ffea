//! Service repository layout
//!
//! A repository holds one directory per service under the services
//! directory (default `services/`), each with `service.toml`,
//! `versions.toml` and optionally `platforms.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use toml::value::Table;

use crate::config::defaults::{PLATFORMS_FILE, SERVICE_FILE, VERSIONS_FILE};
use crate::config::settings::{RepoSettings, SettingsError};
use crate::core::manifest::{PlatformManifest, VersionManifest};
use crate::error::{ConfigValidationError, ResolveError};

/// Raw configuration files of one service
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceFiles {
    /// Service name (directory name)
    pub name: String,
    /// Base layer (`service.toml`)
    pub base: Table,
    /// Platform manifest, absent for single-platform services
    pub platforms: Option<PlatformManifest>,
    /// Version manifest
    pub versions: VersionManifest,
}

impl ServiceFiles {
    /// True if the service has a platform manifest
    pub fn is_multi_platform(&self) -> bool {
        self.platforms.is_some()
    }

    /// Configured platform names (empty for single-platform services)
    pub fn platform_names(&self) -> Vec<String> {
        self.platforms
            .as_ref()
            .map(PlatformManifest::names)
            .unwrap_or_default()
    }

    /// Human-readable location of one of this service's files
    pub fn location(&self, file: &str) -> String {
        format!("{}/{file}", self.name)
    }
}

/// A service repository on disk
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
    settings: RepoSettings,
}

impl Workspace {
    /// Create a workspace with explicit settings
    pub fn new(root: impl Into<PathBuf>, settings: RepoSettings) -> Self {
        Self {
            root: root.into(),
            settings,
        }
    }

    /// Open a repository, reading `stackforge.toml` if present
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, SettingsError> {
        let root = root.into();
        let settings = RepoSettings::load(&root)?;
        Ok(Self::new(root, settings))
    }

    /// Repository root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Repository settings
    pub fn settings(&self) -> &RepoSettings {
        &self.settings
    }

    /// Directory of one service
    pub fn service_dir(&self, service: &str) -> PathBuf {
        self.root.join(&self.settings.services_dir).join(service)
    }

    /// Every service (directories with a `service.toml`), sorted by name
    pub fn list_services(&self) -> Result<Vec<String>, ResolveError> {
        let dir = self.root.join(&self.settings.services_dir);
        let entries = fs::read_dir(&dir).map_err(|e| ResolveError::ReadFile {
            path: dir.clone(),
            error: e.to_string(),
        })?;

        let mut services: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.path().join(SERVICE_FILE).is_file())
            .filter_map(|e| e.file_name().to_str().map(str::to_string))
            .collect();
        services.sort();
        Ok(services)
    }

    /// Read a file relative to the repository root
    pub fn read_to_string(&self, relative: &str) -> Result<String, ResolveError> {
        let path = self.root.join(relative);
        fs::read_to_string(&path).map_err(|e| ResolveError::ReadFile {
            path,
            error: e.to_string(),
        })
    }

    /// Load and validate the manifests of one service
    pub fn load_service(&self, service: &str) -> Result<ServiceFiles, ResolveError> {
        let dir = self.service_dir(service);
        let base_path = dir.join(SERVICE_FILE);
        if !base_path.is_file() {
            return Err(ResolveError::ServiceNotFound {
                service: service.to_string(),
                path: base_path,
            });
        }

        let versions_path = dir.join(VERSIONS_FILE);
        if !versions_path.is_file() {
            return Err(ResolveError::ManifestMissing {
                service: service.to_string(),
                path: versions_path,
            });
        }

        let mut errors = ConfigValidationError::new();
        let base_location = format!("{service}/{SERVICE_FILE}");
        let versions_location = format!("{service}/{VERSIONS_FILE}");
        let platforms_location = format!("{service}/{PLATFORMS_FILE}");

        let base: Option<Table> = parse_file(&base_path, &base_location, &mut errors, |s| {
            toml::from_str(s)
        })?;
        let versions = parse_file(&versions_path, &versions_location, &mut errors, |s| {
            VersionManifest::from_toml(s)
        })?;

        let platforms_path = dir.join(PLATFORMS_FILE);
        let platforms = if platforms_path.is_file() {
            parse_file(&platforms_path, &platforms_location, &mut errors, |s| {
                PlatformManifest::from_toml(s)
            })?
        } else {
            None
        };

        if let Some(platforms) = &platforms {
            errors.extend(platforms.validate(&platforms_location));
        }
        if let Some(versions) = &versions {
            let names = platforms.as_ref().map(PlatformManifest::names).unwrap_or_default();
            errors.extend(versions.validate(&versions_location, &names));
        }

        errors.into_result()?;

        match (base, versions) {
            (Some(base), Some(versions)) => Ok(ServiceFiles {
                name: service.to_string(),
                base,
                platforms,
                versions,
            }),
            // Unreachable: a failed parse always records a violation.
            _ => Err(ConfigValidationError::new().into()),
        }
    }
}

/// Read and parse one file, recording parse failures as violations
fn parse_file<T, F>(
    path: &Path,
    location: &str,
    errors: &mut ConfigValidationError,
    parse: F,
) -> Result<Option<T>, ResolveError>
where
    F: FnOnce(&str) -> Result<T, toml::de::Error>,
{
    let content = fs::read_to_string(path).map_err(|e| ResolveError::ReadFile {
        path: path.to_path_buf(),
        error: e.to_string(),
    })?;
    match parse(&content) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            errors.push(location, format!("invalid TOML: {}", e.message()));
            Ok(None)
        }
    }
}
