//! Typed service configuration
//!
//! A [`ServiceConfig`] is the result of merging every configuration layer
//! for one `{service, version, platform}`. It is recomputed on every
//! resolution and never persisted.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;
use toml::value::Table;
use toml::Value;

use crate::error::ConfigValidationError;

fn source_key_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-z0-9_]+$").expect("valid source key regex"))
}

/// Where a service's sources come from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceSpec {
    /// Remote git repository at a ref
    Git {
        url: String,
        #[serde(rename = "ref")]
        reference: String,
    },
    /// Directory inside the repository
    Local { path: String },
}

/// An upstream image consumed through a build argument
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExternalImageSpec {
    /// Image name (fixed per platform)
    pub name: String,
    /// Build argument receiving the image reference
    pub build_arg: String,
    /// Tag (version-controlled)
    pub tag: Option<String>,
}

impl ExternalImageSpec {
    /// `name:tag`, or just `name` when untagged
    pub fn image_ref(&self) -> String {
        match &self.tag {
            Some(tag) => format!("{}:{tag}", self.name),
            None => self.name.clone(),
        }
    }
}

/// A dependency on another service's image
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencySpec {
    /// Service providing the image
    pub service: String,
    /// Explicit version (possibly platform-suffixed)
    pub version: Option<String>,
    /// Build argument receiving the resolved image reference
    pub build_arg: String,
    /// Dependency is intentionally single-platform
    pub single_platform: bool,
}

/// TLS block of the base config
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TlsConfig {
    #[serde(default = "default_tls_enabled")]
    pub enabled: bool,
    #[serde(default = "default_tls_mode")]
    pub mode: String,
    #[serde(default)]
    pub cert_name: Option<String>,
    #[serde(default)]
    pub ca_name: Option<String>,
}

fn default_tls_enabled() -> bool {
    true
}

fn default_tls_mode() -> String {
    "auto".to_string()
}

/// Fully merged configuration of one node
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceConfig {
    pub name: String,
    /// Build context, relative to the repository root
    pub context: String,
    /// Dockerfile, relative to the repository root
    pub dockerfile: String,
    pub sources: BTreeMap<String, SourceSpec>,
    pub external_images: BTreeMap<String, ExternalImageSpec>,
    pub dependencies: BTreeMap<String, DependencySpec>,
    pub build_args: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
    pub tls: Option<TlsConfig>,
}

impl ServiceConfig {
    /// True if any source is a git source
    pub fn has_git_sources(&self) -> bool {
        self.sources
            .values()
            .any(|s| matches!(s, SourceSpec::Git { .. }))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSource {
    url: Option<String>,
    #[serde(rename = "ref")]
    reference: Option<String>,
    path: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawExternalImage {
    name: Option<String>,
    build_arg: Option<String>,
    tag: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDependency {
    service: Option<String>,
    version: Option<String>,
    build_arg: Option<String>,
    #[serde(default)]
    single_platform: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawServiceConfig {
    name: Option<String>,
    context: Option<String>,
    dockerfile: Option<String>,
    #[serde(default)]
    sources: BTreeMap<String, RawSource>,
    #[serde(default)]
    external_images: BTreeMap<String, RawExternalImage>,
    #[serde(default)]
    dependencies: BTreeMap<String, RawDependency>,
    #[serde(default)]
    build_args: BTreeMap<String, Value>,
    #[serde(default)]
    labels: BTreeMap<String, Value>,
    tls: Option<TlsConfig>,
}

/// Render a scalar config value as a build-arg/label string
fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Integer(i) => Some(i.to_string()),
        Value::Float(f) => Some(f.to_string()),
        Value::Boolean(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Classify one raw source entry
fn classify_source(
    key: &str,
    raw: RawSource,
    location: &str,
    errors: &mut ConfigValidationError,
) -> Option<SourceSpec> {
    if !source_key_pattern().is_match(key) {
        errors.push(
            location,
            format!("source key '{key}' must match ^[a-z0-9_]+$"),
        );
    }

    match (raw.path, raw.url, raw.reference) {
        (Some(path), None, None) => Some(SourceSpec::Local { path }),
        (None, Some(url), Some(reference)) => Some(SourceSpec::Git { url, reference }),
        (Some(_), _, _) => {
            errors.push(
                location,
                format!("source '{key}' mixes 'path' with 'url'/'ref' (local and git are exclusive)"),
            );
            None
        }
        (None, Some(_), None) => {
            errors.push(location, format!("git source '{key}' has 'url' but no 'ref'"));
            None
        }
        (None, None, Some(_)) => {
            errors.push(location, format!("git source '{key}' has 'ref' but no 'url'"));
            None
        }
        (None, None, None) => {
            errors.push(
                location,
                format!("source '{key}' needs either 'path' or 'url' + 'ref'"),
            );
            None
        }
    }
}

impl ServiceConfig {
    /// Convert a merged layer table into a typed config.
    ///
    /// Every problem found is recorded; nothing short-circuits except a
    /// structurally unreadable table.
    pub fn from_table(
        service: &str,
        table: &Table,
        location: &str,
    ) -> Result<Self, ConfigValidationError> {
        let mut errors = ConfigValidationError::new();

        let raw: RawServiceConfig = match Value::Table(table.clone()).try_into() {
            Ok(raw) => raw,
            Err(e) => {
                errors.push(location, format!("invalid structure: {}", e.message()));
                return Err(errors);
            }
        };

        if let Some(name) = &raw.name {
            if name != service {
                errors.push(
                    location,
                    format!("name '{name}' does not match service directory '{service}'"),
                );
            }
        }

        let dockerfile = raw.dockerfile.unwrap_or_default();
        if dockerfile.is_empty() {
            errors.push(location, "no dockerfile configured");
        }

        let mut sources = BTreeMap::new();
        for (key, raw_source) in raw.sources {
            if let Some(spec) = classify_source(&key, raw_source, location, &mut errors) {
                sources.insert(key, spec);
            }
        }

        let mut build_arg_owners: HashMap<String, String> = HashMap::new();
        let mut claim_build_arg =
            |arg: &str, owner: String, errors: &mut ConfigValidationError| {
                if let Some(previous) = build_arg_owners.insert(arg.to_string(), owner.clone()) {
                    errors.push(
                        location,
                        format!("build_arg '{arg}' is used by both {previous} and {owner}"),
                    );
                }
            };

        let mut external_images = BTreeMap::new();
        for (key, image) in raw.external_images {
            match (image.name, image.build_arg) {
                (Some(name), Some(build_arg)) => {
                    claim_build_arg(&build_arg, format!("external image '{key}'"), &mut errors);
                    external_images.insert(
                        key,
                        ExternalImageSpec {
                            name,
                            build_arg,
                            tag: image.tag,
                        },
                    );
                }
                (name, build_arg) => {
                    if name.is_none() {
                        errors.push(location, format!("external image '{key}' has no 'name'"));
                    }
                    if build_arg.is_none() {
                        errors.push(
                            location,
                            format!("external image '{key}' has no 'build_arg'"),
                        );
                    }
                }
            }
        }

        let mut dependencies = BTreeMap::new();
        for (key, dep) in raw.dependencies {
            let Some(build_arg) = dep.build_arg else {
                errors.push(location, format!("dependency '{key}' has no 'build_arg'"));
                continue;
            };
            claim_build_arg(&build_arg, format!("dependency '{key}'"), &mut errors);
            dependencies.insert(
                key.clone(),
                DependencySpec {
                    service: dep.service.unwrap_or(key),
                    version: dep.version,
                    build_arg,
                    single_platform: dep.single_platform,
                },
            );
        }

        let mut string_map = |section: &str, values: BTreeMap<String, Value>| {
            let mut out = BTreeMap::new();
            for (key, value) in values {
                match scalar_to_string(&value) {
                    Some(s) => {
                        out.insert(key, s);
                    }
                    None => errors.push(
                        location,
                        format!("{section}.{key} must be a string, number or boolean"),
                    ),
                }
            }
            out
        };
        let build_args = string_map("build_args", raw.build_args);
        let labels = string_map("labels", raw.labels);

        errors.into_result()?;

        Ok(Self {
            name: service.to_string(),
            context: raw.context.unwrap_or_else(|| ".".to_string()),
            dockerfile,
            sources,
            external_images,
            dependencies,
            build_args,
            labels,
            tls: raw.tls,
        })
    }
}
