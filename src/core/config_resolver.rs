//! Layered configuration resolution
//!
//! Merge order: base config, platform config, the version manifest's
//! `defaults` + the version's `overrides`, then the version's
//! `overrides.platforms.<platform>`. Each layer has its own field-placement
//! rules; every violation across every layer is collected and reported
//! together.

use toml::value::Table;
use toml::Value;

use crate::config::defaults::{PLATFORMS_FILE, SERVICE_FILE, VERSIONS_FILE};
use crate::core::manifest::VersionSpec;
use crate::core::merge::merge_tables;
use crate::core::service::ServiceConfig;
use crate::core::version::apply_version_defaults;
use crate::core::workspace::ServiceFiles;
use crate::error::ConfigValidationError;

/// The configuration layer a table belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    /// `service.toml`
    Base,
    /// One entry of `platforms.toml`
    Platform,
    /// Version defaults or overrides in `versions.toml`
    Version,
}

/// Check one layer against the field-placement rules.
pub fn validate_layer(
    layer: &Table,
    kind: LayerKind,
    has_platform_manifest: bool,
    location: &str,
    errors: &mut ConfigValidationError,
) {
    if layer.contains_key("sources") {
        match kind {
            LayerKind::Platform => {
                errors.push(location, "'sources' is not allowed in the platform layer");
            }
            LayerKind::Base if has_platform_manifest => errors.push(
                location,
                "'sources' is not allowed in the base config when a platform manifest exists; \
                 declare them in version overrides",
            ),
            _ => {}
        }
    }

    if kind != LayerKind::Base && layer.contains_key("tls") {
        errors.push(location, "'tls' is only allowed in the base config");
    }

    if kind != LayerKind::Version && layer.contains_key("platforms") {
        errors.push(location, "'platforms' overrides are only allowed in version overrides");
    }

    if let Some(images) = layer.get("external_images").and_then(Value::as_table) {
        for (key, image) in images {
            let Some(image) = image.as_table() else {
                errors.push(location, format!("external_images.{key} must be a table"));
                continue;
            };
            if kind != LayerKind::Version && image.contains_key("tag") {
                errors.push(
                    location,
                    format!("external_images.{key}.tag is only allowed in version overrides"),
                );
            }
            if kind == LayerKind::Version {
                for field in ["name", "build_arg"] {
                    if image.contains_key(field) {
                        errors.push(
                            location,
                            format!(
                                "external_images.{key}.{field} is not allowed in version overrides"
                            ),
                        );
                    }
                }
            }
        }
    }

    if let Some(deps) = layer.get("dependencies").and_then(Value::as_table) {
        for (key, dep) in deps {
            let Some(dep) = dep.as_table() else {
                errors.push(location, format!("dependencies.{key} must be a table"));
                continue;
            };
            if kind != LayerKind::Version && dep.contains_key("version") {
                errors.push(
                    location,
                    format!("dependencies.{key}.version is only allowed in version overrides"),
                );
            }
        }
    }
}

/// Validate a version-level table (defaults or one version's overrides),
/// including its `platforms.<name>` sections.
fn validate_version_table(
    table: &Table,
    files: &ServiceFiles,
    location: &str,
    errors: &mut ConfigValidationError,
) {
    let mut common = table.clone();
    let platforms = common.remove("platforms");
    validate_layer(&common, LayerKind::Version, files.is_multi_platform(), location, errors);

    let Some(platforms) = platforms else {
        return;
    };
    let Some(platforms) = platforms.as_table() else {
        errors.push(location, "'platforms' overrides must be a table");
        return;
    };
    let names = files.platform_names();
    for (platform, overrides) in platforms {
        let platform_location = format!("{location}.platforms.{platform}");
        if !files.is_multi_platform() {
            errors.push(
                &platform_location,
                "platform overrides given but the service has no platform manifest",
            );
        } else if !names.contains(platform) {
            errors.push(
                &platform_location,
                format!("unknown platform '{platform}' (available: {})", names.join(", ")),
            );
        }
        match overrides.as_table() {
            Some(overrides) => {
                if overrides.contains_key("platforms") {
                    errors.push(&platform_location, "nested 'platforms' overrides are not allowed");
                }
                validate_layer(
                    overrides,
                    LayerKind::Version,
                    files.is_multi_platform(),
                    &platform_location,
                    errors,
                );
            }
            None => errors.push(&platform_location, "platform overrides must be a table"),
        }
    }
}

/// Resolve the merged configuration of `{service, version, platform}`.
///
/// `platform` must be given for multi-platform services and omitted for
/// single-platform ones.
pub fn resolve_config(
    files: &ServiceFiles,
    version: &VersionSpec,
    platform: Option<&str>,
) -> Result<ServiceConfig, ConfigValidationError> {
    let mut errors = ConfigValidationError::new();
    let versions_location = files.location(VERSIONS_FILE);

    validate_layer(
        &files.base,
        LayerKind::Base,
        files.is_multi_platform(),
        &files.location(SERVICE_FILE),
        &mut errors,
    );
    let mut merged = files.base.clone();

    match (platform, &files.platforms) {
        (Some(name), Some(manifest)) => match manifest.layer_for(name) {
            Some(layer) => {
                let location = format!("{}[{name}]", files.location(PLATFORMS_FILE));
                validate_layer(&layer, LayerKind::Platform, true, &location, &mut errors);
                merge_tables(&mut merged, &layer);
            }
            None => errors.push(
                files.location(PLATFORMS_FILE),
                format!(
                    "platform '{name}' is not configured (available: {})",
                    manifest.names().join(", ")
                ),
            ),
        },
        (Some(name), None) => errors.push(
            files.location(SERVICE_FILE),
            format!("platform '{name}' requested but the service has no platform manifest"),
        ),
        (None, Some(_)) => errors.push(
            files.location(PLATFORMS_FILE),
            "a platform must be selected for a multi-platform service",
        ),
        (None, None) => {}
    }

    if let Some(defaults) = &files.versions.defaults {
        validate_version_table(
            defaults,
            files,
            &format!("{versions_location}[defaults]"),
            &mut errors,
        );
    }
    validate_version_table(
        &version.overrides,
        files,
        &format!("{versions_location}[{}]", version.name),
        &mut errors,
    );

    let effective = apply_version_defaults(&files.versions, version);
    merge_tables(&mut merged, &effective.common_overrides());
    if let Some(platform) = platform {
        if let Some(platform_overrides) = effective.platform_overrides(platform) {
            merge_tables(&mut merged, platform_overrides);
        }
    }

    let location = match platform {
        Some(p) => format!("{}:{}:{p} (merged)", files.name, version.name),
        None => format!("{}:{} (merged)", files.name, version.name),
    };
    match ServiceConfig::from_table(&files.name, &merged, &location) {
        Ok(config) => {
            errors.into_result()?;
            Ok(config)
        }
        Err(merged_errors) => {
            errors.extend(merged_errors);
            Err(errors)
        }
    }
}
