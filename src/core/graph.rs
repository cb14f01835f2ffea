//! Dependency graph construction
//!
//! Nodes are `{service, version, platform}` triples; an edge `(a, b)` means
//! `a` depends on `b`. Traversal starts at the requested root nodes and
//! follows every dependency transitively, resolving each node's merged
//! configuration along the way.

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::core::config_resolver::resolve_config;
use crate::core::service::ServiceConfig;
use crate::core::version::{find_version, resolve_dependency, variant_for, ParentRef, VersionVariant};
use crate::core::workspace::{ServiceFiles, Workspace};
use crate::error::{ConfigValidationError, ForgeError, ResolveError};

/// Identity of one buildable image: `service:version[:platform]`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeKey {
    pub service: String,
    /// Version name without platform suffix
    pub version: String,
    pub platform: Option<String>,
}

impl NodeKey {
    pub fn new(service: &str, version: &str, platform: Option<&str>) -> Self {
        Self {
            service: service.to_string(),
            version: version.to_string(),
            platform: platform.map(str::to_string),
        }
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.platform {
            Some(p) => write!(f, "{}:{}:{p}", self.service, self.version),
            None => write!(f, "{}:{}", self.service, self.version),
        }
    }
}

/// A resolved dependency of one node
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyLink {
    /// Node providing the image
    pub key: NodeKey,
    /// Build argument receiving `image`
    pub build_arg: String,
    /// `{image_name}:{full_version}`
    pub image: String,
}

/// One node with its resolved configuration
#[derive(Debug, Clone, PartialEq)]
pub struct GraphNode {
    pub key: NodeKey,
    pub config: ServiceConfig,
    pub variant: VersionVariant,
    pub dependencies: Vec<DependencyLink>,
}

/// Build graph: nodes in insertion order plus dependency edges
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: Vec<GraphNode>,
    index: HashMap<NodeKey, usize>,
    edges: Vec<(NodeKey, NodeKey)>,
    edge_set: HashSet<(NodeKey, NodeKey)>,
}

impl DependencyGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node; returns false if the key is already present
    pub fn add_node(&mut self, node: GraphNode) -> bool {
        if self.index.contains_key(&node.key) {
            return false;
        }
        self.index.insert(node.key.clone(), self.nodes.len());
        self.nodes.push(node);
        true
    }

    /// Record that `from` depends on `to`
    pub fn add_edge(&mut self, from: NodeKey, to: NodeKey) {
        if self.edge_set.insert((from.clone(), to.clone())) {
            self.edges.push((from, to));
        }
    }

    /// Union another graph into this one, deduplicating nodes and edges
    pub fn merge(&mut self, other: DependencyGraph) {
        for node in other.nodes {
            self.add_node(node);
        }
        for (from, to) in other.edges {
            self.add_edge(from, to);
        }
    }

    /// Nodes in insertion order
    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    /// Node keys in insertion order
    pub fn keys(&self) -> impl Iterator<Item = &NodeKey> {
        self.nodes.iter().map(|n| &n.key)
    }

    pub fn node(&self, key: &NodeKey) -> Option<&GraphNode> {
        self.index.get(key).map(|&i| &self.nodes[i])
    }

    /// Edges in insertion order
    pub fn edges(&self) -> &[(NodeKey, NodeKey)] {
        &self.edges
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Walks dependencies from root nodes and builds a [`DependencyGraph`]
///
/// Configuration violations, including invalid manifests of dependency
/// services, are collected across every node and reported together by
/// [`GraphBuilder::finish`]. Resolution errors (unknown service, missing
/// version, platform mismatch) abort immediately.
pub struct GraphBuilder<'a> {
    workspace: &'a Workspace,
    services: HashMap<String, ServiceFiles>,
    graph: DependencyGraph,
    visited: HashSet<NodeKey>,
    errors: ConfigValidationError,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(workspace: &'a Workspace) -> Self {
        Self {
            workspace,
            services: HashMap::new(),
            graph: DependencyGraph::new(),
            visited: HashSet::new(),
            errors: ConfigValidationError::new(),
        }
    }

    /// Manifests of a service, loaded once per traversal
    pub fn service_files(&mut self, service: &str) -> Result<ServiceFiles, ResolveError> {
        if let Some(files) = self.services.get(service) {
            return Ok(files.clone());
        }
        let files = self.workspace.load_service(service)?;
        self.services.insert(service.to_string(), files.clone());
        Ok(files)
    }

    /// Add a root node and everything it depends on
    pub fn add_root(&mut self, service: &str, variant: VersionVariant) -> Result<(), ForgeError> {
        self.visit(service, variant)
    }

    fn visit(&mut self, service: &str, variant: VersionVariant) -> Result<(), ForgeError> {
        let key = variant.key(service);
        if !self.visited.insert(key.clone()) {
            return Ok(());
        }

        let files = match self.service_files(service) {
            Ok(files) => files,
            Err(ResolveError::Config(errors)) => {
                self.errors.extend(errors);
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        let config = match resolve_config(&files, &variant.version, variant.platform.as_deref()) {
            Ok(config) => config,
            Err(errors) => {
                self.errors.extend(errors);
                return Ok(());
            }
        };

        let parent = ParentRef {
            service,
            version: &variant.version.name,
            platform: variant.platform.as_deref(),
        };

        let mut links = Vec::new();
        let mut children = Vec::new();
        for dep in config.dependencies.values() {
            let at = |e: ResolveError| ForgeError::at(key.to_string(), e);
            let dep_files = match self.service_files(&dep.service) {
                Ok(files) => files,
                Err(ResolveError::Config(errors)) => {
                    self.errors.extend(errors);
                    continue;
                }
                Err(e) => return Err(at(e)),
            };
            let resolved = resolve_dependency(parent, dep, &dep_files).map_err(at)?;
            let dep_version =
                find_version(&dep.service, &resolved.version, &dep_files.versions).map_err(at)?;
            let dep_variant = variant_for(&dep_files, dep_version, resolved.platform.as_deref())
                .ok_or_else(|| {
                    at(ResolveError::PlatformMismatch {
                        service: dep.service.clone(),
                        message: format!("no variant for {}", resolved.key()),
                    })
                })?;

            links.push(DependencyLink {
                key: resolved.key(),
                build_arg: dep.build_arg.clone(),
                image: format!(
                    "{}:{}",
                    self.workspace.settings().image_name(&dep.service),
                    resolved.full_version()
                ),
            });
            children.push((dep.service.clone(), dep_variant));
        }

        for link in &links {
            self.graph.add_edge(key.clone(), link.key.clone());
        }
        self.graph.add_node(GraphNode {
            key,
            config,
            variant,
            dependencies: links,
        });

        for (child_service, child_variant) in children {
            self.visit(&child_service, child_variant)?;
        }
        Ok(())
    }

    /// Finish the traversal
    pub fn finish(self) -> Result<DependencyGraph, ConfigValidationError> {
        self.errors.into_result()?;
        Ok(self.graph)
    }
}
