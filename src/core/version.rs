//! Version and platform resolution
//!
//! Resolves requested version strings against a service's manifests,
//! strips platform suffixes, expands versions into platform variants, and
//! decides which `{version, platform}` a dependency resolves to.
//!
//! Dependency inheritance rules, evaluated in order:
//!
//! 1. An explicit version carrying a platform suffix is used as-is.
//! 2. An explicit version without suffix inherits the parent's platform
//!    when the parent is multi-platform (with a warning).
//! 3. Without an explicit version, both version and platform come from
//!    the parent.
//! 4. A dependency without a platform manifest is reused verbatim across
//!    every parent platform (informational message unless
//!    `single_platform = true`).
//! 5. An explicit platform suffix overrides `single_platform = true`
//!    (with a warning).
//!
//! Dependencies never fall back to their own manifest's default version.

use tracing::{debug, info, warn};

use crate::core::graph::NodeKey;
use crate::core::manifest::{PlatformManifest, VersionManifest, VersionSpec};
use crate::core::merge::deep_merge;
use crate::core::service::DependencySpec;
use crate::core::workspace::ServiceFiles;
use crate::error::ResolveError;

/// A requested version split into its base name and detected platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedVersionName {
    /// Version name without platform suffix
    pub base_name: String,
    /// Platform detected from the suffix
    pub platform: Option<String>,
}

/// Split a trailing `-{platform}` off `requested`.
///
/// A name that exists in the manifest as given is never split. When several
/// configured platforms match as suffix, only a split whose base exists in
/// the manifest is accepted; otherwise the whole string is kept as the
/// version name. A suffix-looking token that matches no platform is an
/// error only when `expect_platform` is set.
pub fn resolve_version_name(
    service: &str,
    requested: &str,
    manifest: &VersionManifest,
    platforms: Option<&PlatformManifest>,
    expect_platform: bool,
) -> Result<ResolvedVersionName, ResolveError> {
    let unsplit = ResolvedVersionName {
        base_name: requested.to_string(),
        platform: None,
    };

    let Some(platforms) = platforms else {
        return Ok(unsplit);
    };
    if manifest.find(requested).is_some() {
        return Ok(unsplit);
    }

    let candidates: Vec<(&str, &str)> = platforms
        .platforms
        .iter()
        .filter_map(|p| {
            requested
                .strip_suffix(p.name.as_str())
                .and_then(|rest| rest.strip_suffix('-'))
                .filter(|base| !base.is_empty())
                .map(|base| (base, p.name.as_str()))
        })
        .collect();

    let chosen = match candidates.as_slice() {
        [] => None,
        [single] => Some(*single),
        many => {
            let known: Vec<&(&str, &str)> = many
                .iter()
                .filter(|(base, _)| manifest.find(base).is_some())
                .collect();
            match known.as_slice() {
                [single] => Some(**single),
                _ => {
                    debug!(
                        "Version '{requested}' of {service} has an ambiguous platform suffix; \
                         treating it as a version name"
                    );
                    None
                }
            }
        }
    };

    if let Some((base, platform)) = chosen {
        return Ok(ResolvedVersionName {
            base_name: base.to_string(),
            platform: Some(platform.to_string()),
        });
    }

    if expect_platform && candidates.is_empty() {
        if let Some((_, suffix)) = requested.rsplit_once('-') {
            return Err(ResolveError::PlatformMismatch {
                service: service.to_string(),
                message: format!(
                    "suffix '-{suffix}' of version '{requested}' is not a configured platform \
                     (available: {})",
                    platforms.names().join(", ")
                ),
            });
        }
    }

    Ok(unsplit)
}

/// Look up a version or fail with the list of available versions
pub fn find_version<'a>(
    service: &str,
    requested: &str,
    manifest: &'a VersionManifest,
) -> Result<&'a VersionSpec, ResolveError> {
    manifest
        .find(requested)
        .ok_or_else(|| ResolveError::VersionNotFound {
            service: service.to_string(),
            requested: requested.to_string(),
            available: manifest.version_names(),
        })
}

/// Merge the manifest-level `defaults` into a version's overrides.
///
/// Version-specific overrides win.
pub fn apply_version_defaults(manifest: &VersionManifest, version: &VersionSpec) -> VersionSpec {
    let mut effective = version.clone();
    if let Some(defaults) = &manifest.defaults {
        effective.overrides = deep_merge(defaults, &version.overrides);
    }
    effective
}

/// `name` or `name-platform`
pub fn full_version_name(version: &str, platform: Option<&str>) -> String {
    match platform {
        Some(p) => format!("{version}-{p}"),
        None => version.to_string(),
    }
}

/// One version bound to one platform (or to none, for single-platform services)
#[derive(Debug, Clone, PartialEq)]
pub struct VersionVariant {
    /// The version
    pub version: VersionSpec,
    /// Platform of this variant
    pub platform: Option<String>,
    /// Every tag this variant is published under
    pub tags: Vec<String>,
}

impl VersionVariant {
    /// `name` or `name-platform`
    pub fn full_name(&self) -> String {
        full_version_name(&self.version.name, self.platform.as_deref())
    }

    /// Node key for this variant of `service`
    pub fn key(&self, service: &str) -> NodeKey {
        NodeKey::new(service, &self.version.name, self.platform.as_deref())
    }
}

/// The only variant of a single-platform version
pub fn single_platform_variant(version: &VersionSpec) -> VersionVariant {
    let mut tags = vec![version.name.clone()];
    tags.extend(version.tags.iter().cloned());
    if version.latest {
        tags.push("latest".to_string());
    }
    dedup_in_order(&mut tags);

    VersionVariant {
        version: version.clone(),
        platform: None,
        tags,
    }
}

/// Expand one version into one variant per platform.
///
/// Every variant is tagged `name-platform` (plus suffixed aliases); the
/// variant of `default_platform` additionally carries every unsuffixed tag.
pub fn expand_to_platforms(
    version: &VersionSpec,
    platforms: &PlatformManifest,
    default_platform: &str,
) -> Vec<VersionVariant> {
    platforms
        .platforms
        .iter()
        .map(|platform| {
            let p = platform.name.as_str();
            let mut tags = vec![format!("{}-{p}", version.name)];
            tags.extend(version.tags.iter().map(|t| format!("{t}-{p}")));
            if version.latest {
                tags.push(format!("latest-{p}"));
            }
            if p == default_platform {
                tags.push(version.name.clone());
                tags.extend(version.tags.iter().cloned());
                if version.latest {
                    tags.push("latest".to_string());
                }
            }
            dedup_in_order(&mut tags);

            VersionVariant {
                version: version.clone(),
                platform: Some(p.to_string()),
                tags,
            }
        })
        .collect()
}

/// The variant of `version` for `platform` (None for single-platform services)
pub fn variant_for(
    files: &ServiceFiles,
    version: &VersionSpec,
    platform: Option<&str>,
) -> Option<VersionVariant> {
    match (&files.platforms, platform) {
        (Some(manifest), Some(p)) => expand_to_platforms(version, manifest, &manifest.default)
            .into_iter()
            .find(|v| v.platform.as_deref() == Some(p)),
        (None, None) => Some(single_platform_variant(version)),
        _ => None,
    }
}

fn dedup_in_order(tags: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    tags.retain(|t| seen.insert(t.clone()));
}

/// Resolve what a build request for one service version targets.
///
/// `platform_flag` is the explicit `--platform`; a platform suffix on the
/// version is the other signal. Without either, every platform is built.
pub fn resolve_root_variants(
    files: &ServiceFiles,
    requested: Option<&str>,
    platform_flag: Option<&str>,
) -> Result<Vec<VersionVariant>, ResolveError> {
    let requested = requested.unwrap_or(&files.versions.default);
    let name = resolve_version_name(
        &files.name,
        requested,
        &files.versions,
        files.platforms.as_ref(),
        platform_flag.is_some(),
    )?;
    let version = find_version(&files.name, &name.base_name, &files.versions)?;

    let Some(platforms) = &files.platforms else {
        if let Some(flag) = platform_flag {
            debug!(
                "{} is single-platform; ignoring --platform {flag}",
                files.name
            );
        }
        return Ok(vec![single_platform_variant(version)]);
    };

    let selected = match (platform_flag, name.platform.as_deref()) {
        (Some(flag), Some(suffix)) if flag != suffix => {
            return Err(ResolveError::PlatformMismatch {
                service: files.name.clone(),
                message: format!(
                    "--platform {flag} conflicts with the '-{suffix}' suffix of version '{requested}'"
                ),
            });
        }
        (Some(p), _) | (None, Some(p)) => {
            if !platforms.contains(p) {
                return Err(ResolveError::PlatformMismatch {
                    service: files.name.clone(),
                    message: format!(
                        "platform '{p}' is not configured (available: {})",
                        platforms.names().join(", ")
                    ),
                });
            }
            Some(p)
        }
        (None, None) => None,
    };

    Ok(expand_to_platforms(version, platforms, &platforms.default)
        .into_iter()
        .filter(|v| selected.is_none() || v.platform.as_deref() == selected)
        .collect())
}

/// The node a parent is resolving a dependency for
#[derive(Debug, Clone, Copy)]
pub struct ParentRef<'a> {
    pub service: &'a str,
    pub version: &'a str,
    pub platform: Option<&'a str>,
}

impl ParentRef<'_> {
    fn label(&self) -> String {
        NodeKey::new(self.service, self.version, self.platform).to_string()
    }
}

/// Effective `{service, version, platform}` of a dependency
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDependency {
    pub service: String,
    /// Canonical version name, without platform suffix
    pub version: String,
    pub platform: Option<String>,
}

impl ResolvedDependency {
    /// `version` or `version-platform`, the tag the dependency is consumed by
    pub fn full_version(&self) -> String {
        full_version_name(&self.version, self.platform.as_deref())
    }

    /// Node key of the dependency
    pub fn key(&self) -> NodeKey {
        NodeKey::new(&self.service, &self.version, self.platform.as_deref())
    }
}

/// Resolve a dependency's effective version and platform.
pub fn resolve_dependency(
    parent: ParentRef<'_>,
    dep: &DependencySpec,
    dep_files: &ServiceFiles,
) -> Result<ResolvedDependency, ResolveError> {
    let (requested, platform) = match (&dep.version, &dep_files.platforms) {
        (explicit, None) => {
            if parent.platform.is_some() && !dep.single_platform {
                info!(
                    "{}: dependency '{}' is single-platform; reusing one image across all platforms \
                     (set single_platform = true to silence)",
                    parent.label(),
                    dep.service
                );
            }
            let version = explicit.clone().unwrap_or_else(|| parent.version.to_string());
            (version, None)
        }
        (Some(explicit), Some(manifest)) => {
            let name = resolve_version_name(
                &dep.service,
                explicit,
                &dep_files.versions,
                Some(manifest),
                false,
            )?;
            match name.platform {
                Some(suffix) => {
                    if dep.single_platform {
                        warn!(
                            "{}: dependency '{}' is marked single_platform but version '{explicit}' \
                             names platform '{suffix}'; the suffix wins",
                            parent.label(),
                            dep.service
                        );
                    }
                    (name.base_name, Some(suffix))
                }
                None if dep.single_platform => {
                    debug!(
                        "{}: single_platform dependency '{}' uses its default platform '{}'",
                        parent.label(),
                        dep.service,
                        manifest.default
                    );
                    (name.base_name, Some(manifest.default.clone()))
                }
                None => match parent.platform {
                    Some(parent_platform) => {
                        warn!(
                            "{}: dependency '{}' version '{explicit}' has no platform suffix; \
                             inheriting '-{parent_platform}' from the parent",
                            parent.label(),
                            dep.service
                        );
                        (name.base_name, Some(parent_platform.to_string()))
                    }
                    None => (name.base_name, Some(manifest.default.clone())),
                },
            }
        }
        (None, Some(manifest)) => {
            let platform = match parent.platform {
                Some(p) if !dep.single_platform => p.to_string(),
                _ => manifest.default.clone(),
            };
            (parent.version.to_string(), Some(platform))
        }
    };

    if let (Some(p), Some(manifest)) = (&platform, &dep_files.platforms) {
        if !manifest.contains(p) {
            return Err(ResolveError::PlatformMismatch {
                service: dep.service.clone(),
                message: format!(
                    "required by {} for platform '{p}', which it does not provide (available: {})",
                    parent.label(),
                    manifest.names().join(", ")
                ),
            });
        }
    }

    let version = find_version(&dep.service, &requested, &dep_files.versions)?;

    Ok(ResolvedDependency {
        service: dep.service.clone(),
        version: version.name.clone(),
        platform,
    })
}
