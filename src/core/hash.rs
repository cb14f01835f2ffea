//! Service definition hashes and dependency cache decisions
//!
//! Each node hashes its own definition (Dockerfile, sources, external
//! images, definition build args, TLS block) together with the hashes of
//! its direct dependencies, so any change propagates to every transitive
//! dependent. The hash is stored as an image label at build time and read
//! back to decide whether a dependency image can be reused.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};

use crate::core::build_args::{definition_build_args, BuildArgs};
use crate::core::context::DepCacheMode;
use crate::core::graph::{DependencyGraph, NodeKey};
use crate::core::service::{ExternalImageSpec, SourceSpec, TlsConfig};
use crate::core::workspace::Workspace;
use crate::error::{BuildError, ResolveError};

#[derive(Serialize)]
struct HashInput<'a> {
    dockerfile: &'a str,
    sources: &'a BTreeMap<String, SourceSpec>,
    external_images: &'a BTreeMap<String, ExternalImageSpec>,
    build_args: BuildArgs,
    tls: &'a Option<TlsConfig>,
    dependencies: BTreeMap<String, String>,
}

/// Compute the definition hash of every node in `order`.
///
/// Dependencies of a node are hashed before the node itself, whatever the
/// order given.
pub fn compute_hashes(
    graph: &DependencyGraph,
    order: &[NodeKey],
    workspace: &Workspace,
) -> Result<HashMap<NodeKey, String>, ResolveError> {
    let mut hashes = HashMap::new();
    let mut dockerfiles = HashMap::new();
    for key in order {
        hash_node(graph, key, workspace, &mut hashes, &mut dockerfiles)?;
    }
    Ok(hashes)
}

fn hash_node(
    graph: &DependencyGraph,
    key: &NodeKey,
    workspace: &Workspace,
    hashes: &mut HashMap<NodeKey, String>,
    dockerfiles: &mut HashMap<String, String>,
) -> Result<(), ResolveError> {
    if hashes.contains_key(key) {
        return Ok(());
    }
    let Some(node) = graph.node(key) else {
        return Ok(());
    };

    let mut dependencies = BTreeMap::new();
    for link in &node.dependencies {
        hash_node(graph, &link.key, workspace, hashes, dockerfiles)?;
        if let Some(hash) = hashes.get(&link.key) {
            dependencies.insert(link.key.to_string(), hash.clone());
        }
    }

    let config = &node.config;
    if !dockerfiles.contains_key(&config.dockerfile) {
        let content = workspace.read_to_string(&config.dockerfile)?;
        dockerfiles.insert(config.dockerfile.clone(), content);
    }
    let dockerfile = dockerfiles
        .get(&config.dockerfile)
        .map(String::as_str)
        .unwrap_or_default();

    let input = HashInput {
        dockerfile,
        sources: &config.sources,
        external_images: &config.external_images,
        build_args: definition_build_args(config),
        tls: &config.tls,
        dependencies,
    };
    hashes.insert(key.clone(), digest(&input));
    Ok(())
}

fn digest(input: &HashInput<'_>) -> String {
    // Serializing maps and plain structs cannot fail.
    let canonical = serde_json::to_vec(input).unwrap_or_default();
    hex::encode(Sha256::digest(&canonical))
}

/// State of an existing image relative to a freshly computed hash
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Freshness {
    /// No image with the exact tag
    Missing,
    /// Image exists but carries no hash label
    Unlabeled,
    /// Image carries a different hash
    Mismatch(String),
    /// Image carries the expected hash
    Fresh,
}

impl Freshness {
    /// Compare an image's labels (`None` when absent) with `expected`
    pub fn of(labels: Option<&BTreeMap<String, String>>, label_key: &str, expected: &str) -> Self {
        match labels {
            None => Self::Missing,
            Some(labels) => match labels.get(label_key) {
                None => Self::Unlabeled,
                Some(found) if found == expected => Self::Fresh,
                Some(found) => Self::Mismatch(found.clone()),
            },
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            Self::Missing => "image is missing",
            Self::Unlabeled => "image has no definition hash label",
            Self::Mismatch(_) => "image was built from a different definition",
            Self::Fresh => "image is up to date",
        }
    }
}

/// What to do with a dependency node in CI
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheDecision {
    /// Existing image is up to date
    Reuse,
    /// Build the node
    Rebuild,
}

/// Apply the dep-cache mode to a dependency's freshness
pub fn decide(
    mode: DepCacheMode,
    freshness: &Freshness,
    node: &NodeKey,
    image: &str,
    expected: &str,
) -> Result<CacheDecision, BuildError> {
    match (mode, freshness) {
        (DepCacheMode::Off, _) => Ok(CacheDecision::Rebuild),
        (_, Freshness::Fresh) => Ok(CacheDecision::Reuse),
        (DepCacheMode::Soft, stale) => {
            tracing::warn!("{node}: {} ({image}); rebuilding", stale.describe());
            Ok(CacheDecision::Rebuild)
        }
        (DepCacheMode::Strict, stale) => Err(BuildError::HashMismatch {
            node: node.to_string(),
            image: image.to_string(),
            expected: expected.to_string(),
            found: match stale {
                Freshness::Mismatch(found) => Some(found.clone()),
                _ => None,
            },
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::settings::RepoSettings;
    use crate::core::graph::GraphBuilder;
    use crate::core::resolver::topological_sort;
    use crate::core::version::resolve_root_variants;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn single(root: &Path, name: &str, deps: &[&str]) {
        let mut base = format!("dockerfile = \"services/{name}/Dockerfile\"\n");
        for dep in deps {
            base.push_str(&format!(
                "[dependencies.{dep}]\nbuild_arg = \"{}_IMAGE\"\n",
                dep.to_uppercase()
            ));
        }
        write(root, &format!("services/{name}/service.toml"), &base);
        write(
            root,
            &format!("services/{name}/versions.toml"),
            "default = \"v1\"\n[[versions]]\nname = \"v1\"\n",
        );
        write(root, &format!("services/{name}/Dockerfile"), &format!("FROM scratch\n# {name}\n"));
    }

    fn hashes(ws: &Workspace) -> HashMap<NodeKey, String> {
        let mut builder = GraphBuilder::new(ws);
        let files = builder.service_files("app").unwrap();
        for variant in resolve_root_variants(&files, None, None).unwrap() {
            builder.add_root("app", variant).unwrap();
        }
        let graph = builder.finish().unwrap();
        let order = topological_sort(&graph).unwrap();
        compute_hashes(&graph, &order, ws).unwrap()
    }

    fn key(service: &str) -> NodeKey {
        NodeKey::new(service, "v1", None)
    }

    #[test]
    fn test_hash_changes_propagate_to_dependents_only() {
        let dir = TempDir::new().unwrap();
        single(dir.path(), "base", &[]);
        single(dir.path(), "lib", &["base"]);
        single(dir.path(), "tool", &[]);
        single(dir.path(), "app", &["lib", "tool"]);
        let ws = Workspace::new(dir.path(), RepoSettings::default());

        let before = hashes(&ws);
        assert_eq!(before, hashes(&ws));
        assert_eq!(before.len(), 4);

        write(dir.path(), "services/lib/Dockerfile", "FROM scratch\n# lib changed\n");
        let after = hashes(&ws);

        assert_eq!(before[&key("base")], after[&key("base")]);
        assert_eq!(before[&key("tool")], after[&key("tool")]);
        assert_ne!(before[&key("lib")], after[&key("lib")]);
        assert_ne!(before[&key("app")], after[&key("app")]);
    }

    #[test]
    fn test_missing_dockerfile_is_an_error() {
        let dir = TempDir::new().unwrap();
        single(dir.path(), "app", &[]);
        fs::remove_file(dir.path().join("services/app/Dockerfile")).unwrap();
        let ws = Workspace::new(dir.path(), RepoSettings::default());

        let mut builder = GraphBuilder::new(&ws);
        let files = builder.service_files("app").unwrap();
        for variant in resolve_root_variants(&files, None, None).unwrap() {
            builder.add_root("app", variant).unwrap();
        }
        let graph = builder.finish().unwrap();
        let order = topological_sort(&graph).unwrap();
        assert!(matches!(
            compute_hashes(&graph, &order, &ws),
            Err(ResolveError::ReadFile { .. })
        ));
    }

    #[test]
    fn test_freshness() {
        let labels = BTreeMap::from([("h".to_string(), "abc".to_string())]);
        assert_eq!(Freshness::of(None, "h", "abc"), Freshness::Missing);
        assert_eq!(Freshness::of(Some(&BTreeMap::new()), "h", "abc"), Freshness::Unlabeled);
        assert_eq!(Freshness::of(Some(&labels), "h", "abc"), Freshness::Fresh);
        assert_eq!(
            Freshness::of(Some(&labels), "h", "def"),
            Freshness::Mismatch("abc".to_string())
        );
    }

    #[test]
    fn test_decisions_per_mode() {
        let node = key("base");
        let stale = Freshness::Unlabeled;

        assert_eq!(
            decide(DepCacheMode::Off, &Freshness::Fresh, &node, "base:v1", "h").unwrap(),
            CacheDecision::Rebuild
        );
        assert_eq!(
            decide(DepCacheMode::Soft, &Freshness::Fresh, &node, "base:v1", "h").unwrap(),
            CacheDecision::Reuse
        );
        assert_eq!(
            decide(DepCacheMode::Soft, &stale, &node, "base:v1", "h").unwrap(),
            CacheDecision::Rebuild
        );
        let err = decide(
            DepCacheMode::Strict,
            &Freshness::Mismatch("old".to_string()),
            &node,
            "base:v1",
            "new",
        )
        .unwrap_err();
        assert_eq!(
            err,
            BuildError::HashMismatch {
                node: "base:v1".to_string(),
                image: "base:v1".to_string(),
                expected: "new".to_string(),
                found: Some("old".to_string()),
            }
        );
    }
}
