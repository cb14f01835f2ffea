//! Build-argument composition
//!
//! Arguments are layered in a fixed order; a later step always overwrites
//! an earlier one:
//!
//! 1. `COMMIT_SHA` and `VERSION`
//! 2. source-derived `{KEY}_REF/_URL/_SHA` (git) or `{KEY}_PATH/_MODE` (local)
//! 3. external image references
//! 4. the config's `build_args`
//! 5. environment overrides of any key set so far
//! 6. dependency image references
//! 7. TLS arguments
//! 8. `CACHEBUST`

use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::{debug, warn};

use crate::config::defaults::{
    CACHEBUST_ARG, CACHEBUST_DIGEST_LEN, CACHEBUST_SEPARATOR, DEFAULT_CACHEBUST,
};
use crate::core::context::BuildContext;
use crate::core::graph::GraphNode;
use crate::core::service::{ServiceConfig, SourceSpec};
use crate::core::tls::TlsMetadata;
use crate::infra::git::RevisionSource;

/// Final argument map handed to the builder
pub type BuildArgs = BTreeMap<String, String>;

/// Resolved short SHA per source key; `None` when extraction failed
pub type SourceShas = BTreeMap<String, Option<String>>;

/// Short SHAs already looked up in this invocation, keyed by `(url, ref)`
#[derive(Debug, Default)]
pub struct ShaCache {
    entries: HashMap<(String, String), Option<String>>,
}

impl ShaCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve one ref, querying `source` only on first use
    pub fn resolve(
        &mut self,
        source: &dyn RevisionSource,
        url: &str,
        reference: &str,
    ) -> Option<String> {
        let key = (url.to_string(), reference.to_string());
        if let Some(cached) = self.entries.get(&key) {
            return cached.clone();
        }
        let sha = match source.short_sha(url, reference) {
            Ok(sha) => Some(sha),
            Err(e) => {
                warn!("Could not resolve {reference} of {url}: {e}");
                None
            }
        };
        self.entries.insert(key, sha.clone());
        sha
    }

    /// Number of distinct refs looked up
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Resolve the SHA of every git source of a config
pub fn resolve_source_shas(
    config: &ServiceConfig,
    cache: &mut ShaCache,
    source: &dyn RevisionSource,
) -> SourceShas {
    config
        .sources
        .iter()
        .filter_map(|(key, spec)| match spec {
            SourceSpec::Git { url, reference } => {
                Some((key.clone(), cache.resolve(source, url, reference)))
            }
            SourceSpec::Local { .. } => None,
        })
        .collect()
}

/// Steps 3 and 4: external images and the config's own `build_args`.
///
/// This is the part of the argument map that describes the service
/// definition, independent of the invocation.
pub fn definition_build_args(config: &ServiceConfig) -> BuildArgs {
    let mut args = BuildArgs::new();
    for image in config.external_images.values() {
        args.insert(image.build_arg.clone(), image.image_ref());
    }
    for (key, value) in &config.build_args {
        args.insert(key.clone(), value.clone());
    }
    args
}

/// Path of a local source relative to the build context
fn context_relative(context: &str, path: &str) -> String {
    if context == "." || context.is_empty() {
        return path.to_string();
    }
    Path::new(path)
        .strip_prefix(context)
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| path.to_string())
}

/// Compose the argument map of one node.
pub fn compose(
    node: &GraphNode,
    ctx: &BuildContext,
    tls: Option<&TlsMetadata>,
    shas: &SourceShas,
) -> BuildArgs {
    let config = &node.config;
    let mut args = BuildArgs::new();

    args.insert("COMMIT_SHA".to_string(), ctx.commit_id().to_string());
    args.insert("VERSION".to_string(), node.variant.full_name());

    for (key, spec) in &config.sources {
        let prefix = key.to_uppercase();
        match spec {
            SourceSpec::Git { url, reference } => {
                let sha = shas
                    .get(key)
                    .cloned()
                    .flatten()
                    .unwrap_or_else(|| reference.clone());
                args.insert(format!("{prefix}_REF"), reference.clone());
                args.insert(format!("{prefix}_URL"), url.clone());
                args.insert(format!("{prefix}_SHA"), sha);
            }
            SourceSpec::Local { path } => {
                args.insert(format!("{prefix}_PATH"), context_relative(&config.context, path));
                args.insert(format!("{prefix}_MODE"), "local".to_string());
            }
        }
    }

    args.extend(definition_build_args(config));

    if ctx.env_var("TLS_MODE").is_some() {
        warn!(
            "{}: ignoring TLS_MODE from the environment; TLS mode comes from the service config",
            node.key
        );
    }
    for (key, value) in args.iter_mut() {
        if key == "TLS_MODE" {
            continue;
        }
        if let Some(env_value) = ctx.env_var(key) {
            debug!("{}: {key} overridden from the environment", node.key);
            *value = env_value.to_string();
        }
    }

    for link in &node.dependencies {
        args.insert(link.build_arg.clone(), link.image.clone());
    }

    if let Some(tls) = tls {
        args.extend(tls.build_args());
    }

    args.insert(CACHEBUST_ARG.to_string(), resolve_cache_bust(ctx, config, shas));
    args
}

/// Cache-bust value for one node.
///
/// Order: explicit override, forced random, `CACHEBUST` from the
/// environment, then the per-service value. Never empty.
pub fn resolve_cache_bust(ctx: &BuildContext, config: &ServiceConfig, shas: &SourceShas) -> String {
    let value = if let Some(value) = ctx.cache_bust.as_deref().filter(|v| !v.is_empty()) {
        value.to_string()
    } else if ctx.force_random_cache_bust {
        random_token()
    } else if let Some(value) = ctx.env_var(CACHEBUST_ARG).filter(|v| !v.is_empty()) {
        value.to_string()
    } else {
        service_cache_bust(config, shas, ctx.commit_id())
    };

    if value.is_empty() {
        DEFAULT_CACHEBUST.to_string()
    } else {
        value
    }
}

/// Per-service cache-bust value derived from the config's sources
pub fn service_cache_bust(config: &ServiceConfig, shas: &SourceShas, commit: &str) -> String {
    if config.sources.is_empty() {
        return commit.to_string();
    }
    if !config.has_git_sources() {
        return random_token();
    }

    let revisions: Vec<(String, String)> = config
        .sources
        .iter()
        .filter_map(|(key, spec)| match spec {
            SourceSpec::Git { reference, .. } => {
                let sha = shas.get(key).cloned().flatten();
                Some((key.clone(), sha.unwrap_or_else(|| reference.clone())))
            }
            SourceSpec::Local { .. } => None,
        })
        .collect();
    source_digest(&revisions)
}

/// First 16 hex characters of the SHA-256 of the revisions joined by `|`,
/// in source-key order.
pub fn source_digest(revisions: &[(String, String)]) -> String {
    let mut sorted: Vec<&(String, String)> = revisions.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));
    let joined = sorted
        .iter()
        .map(|(_, rev)| rev.as_str())
        .collect::<Vec<_>>()
        .join(CACHEBUST_SEPARATOR);

    let digest = hex::encode(Sha256::digest(joined.as_bytes()));
    digest[..CACHEBUST_DIGEST_LEN].to_string()
}

fn random_token() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
