//! Build orchestration logic
//!
//! Turns build targets into a sorted plan and walks it node by node:
//! decide whether a dependency image can be reused, compose tags, labels
//! and build arguments, and hand each node to the [`ImageBackend`].

use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info, warn};

use crate::core::build_args::{compose, resolve_source_shas, ShaCache};
use crate::core::context::{BuildContext, DepCacheMode};
use crate::core::graph::{DependencyGraph, GraphBuilder, GraphNode, NodeKey};
use crate::core::hash::{compute_hashes, decide, CacheDecision, Freshness};
use crate::core::labels::{hash_label_key, image_labels, image_tags, primary_image};
use crate::core::resolver::topological_sort;
use crate::core::tls::TlsMetadataProvider;
use crate::core::version::VersionVariant;
use crate::core::workspace::Workspace;
use crate::error::{BuildError, ConfigValidationError, ForgeError};
use crate::infra::docker::{BuildRequest, ImageBackend};
use crate::infra::git::RevisionSource;

/// One requested `{service, version, platform}`
#[derive(Debug, Clone, PartialEq)]
pub struct BuildTarget {
    pub service: String,
    pub variant: VersionVariant,
}

/// A sorted, validated build graph
#[derive(Debug, Clone)]
pub struct BuildPlan {
    pub graph: DependencyGraph,
    /// Dependency-first order
    pub order: Vec<NodeKey>,
    /// Nodes that were requested explicitly
    pub roots: Vec<NodeKey>,
}

impl BuildPlan {
    /// True if `key` was requested rather than pulled in as a dependency
    pub fn is_root(&self, key: &NodeKey) -> bool {
        self.roots.contains(key)
    }
}

/// Resolve targets into a plan.
///
/// Each service's graph is built on its own and the graphs are unioned.
/// Configuration violations are gathered across every service before
/// failing; cycles and resolution errors fail immediately.
pub fn plan(workspace: &Workspace, targets: &[BuildTarget]) -> Result<BuildPlan, ForgeError> {
    let mut graph = DependencyGraph::new();
    let mut roots = Vec::new();
    let mut errors = ConfigValidationError::new();

    let mut services: Vec<&str> = Vec::new();
    for target in targets {
        if !services.contains(&target.service.as_str()) {
            services.push(&target.service);
        }
    }

    for service in services {
        let mut builder = GraphBuilder::new(workspace);
        for target in targets.iter().filter(|t| t.service == service) {
            let key = target.variant.key(service);
            builder.add_root(service, target.variant.clone())?;
            if !roots.contains(&key) {
                roots.push(key);
            }
        }
        match builder.finish() {
            Ok(service_graph) => graph.merge(service_graph),
            Err(service_errors) => errors.extend(service_errors),
        }
    }
    errors.into_result()?;

    let order = topological_sort(&graph)?;
    debug!("Build order: {}", render_order(&order));
    Ok(BuildPlan {
        graph,
        order,
        roots,
    })
}

fn render_order(order: &[NodeKey]) -> String {
    order
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// What happened to one node
#[derive(Debug, Clone, PartialEq)]
pub enum NodeOutcome {
    /// Image was built
    Built,
    /// Existing image was reused
    Reused,
    /// Not attempted because a dependency failed
    Skipped { dependency: NodeKey },
    /// Build or cache check failed
    Failed { error: BuildError },
}

/// Result of executing one or more plans
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildReport {
    pub outcomes: Vec<(NodeKey, NodeOutcome)>,
}

impl BuildReport {
    fn count(&self, pred: impl Fn(&NodeOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|(_, o)| pred(o)).count()
    }

    pub fn built(&self) -> usize {
        self.count(|o| matches!(o, NodeOutcome::Built))
    }

    pub fn reused(&self) -> usize {
        self.count(|o| matches!(o, NodeOutcome::Reused))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, NodeOutcome::Skipped { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, NodeOutcome::Failed { .. }))
    }

    /// Outcome of one node, if it was processed
    pub fn outcome(&self, key: &NodeKey) -> Option<&NodeOutcome> {
        self.outcomes.iter().find(|(k, _)| k == key).map(|(_, o)| o)
    }

    /// Append another report
    pub fn absorb(&mut self, other: BuildReport) {
        self.outcomes.extend(other.outcomes);
    }

    /// `Err(Incomplete)` if anything failed or was skipped
    pub fn into_result(self) -> Result<Self, BuildError> {
        let failed = self.failed() + self.skipped();
        if failed == 0 {
            Ok(self)
        } else {
            Err(BuildError::Incomplete {
                failed,
                total: self.outcomes.len(),
            })
        }
    }
}

type Observer<'a> = Box<dyn FnMut(&NodeKey, &NodeOutcome) + 'a>;

/// Executes build plans against an [`ImageBackend`]
pub struct BuildOrchestrator<'a> {
    workspace: &'a Workspace,
    ctx: &'a BuildContext,
    backend: &'a dyn ImageBackend,
    revisions: &'a dyn RevisionSource,
    tls: &'a dyn TlsMetadataProvider,
    sha_cache: ShaCache,
    /// Nodes built or reused by an earlier `execute` call
    completed: HashSet<NodeKey>,
    no_cache: bool,
    observer: Option<Observer<'a>>,
}

impl<'a> BuildOrchestrator<'a> {
    /// Create a new build orchestrator
    pub fn new(
        workspace: &'a Workspace,
        ctx: &'a BuildContext,
        backend: &'a dyn ImageBackend,
        revisions: &'a dyn RevisionSource,
        tls: &'a dyn TlsMetadataProvider,
    ) -> Self {
        Self {
            workspace,
            ctx,
            backend,
            revisions,
            tls,
            sha_cache: ShaCache::new(),
            completed: HashSet::new(),
            no_cache: false,
            observer: None,
        }
    }

    /// Pass `--no-cache` to the builder
    #[must_use]
    pub fn with_no_cache(mut self, no_cache: bool) -> Self {
        self.no_cache = no_cache;
        self
    }

    /// Called after every node
    #[must_use]
    pub fn with_observer(mut self, observer: impl FnMut(&NodeKey, &NodeOutcome) + 'a) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    /// Execute a plan.
    ///
    /// In fail-fast mode the first failing node aborts the run with its
    /// error. Otherwise failures are recorded, dependents of a failed node
    /// are skipped, and independent nodes still run. Nodes completed by an
    /// earlier plan on the same orchestrator are reused without a build.
    pub fn execute(&mut self, plan: &BuildPlan) -> Result<BuildReport, ForgeError> {
        let hashes = compute_hashes(&plan.graph, &plan.order, self.workspace)?;
        let mut report = BuildReport::default();
        let mut broken: HashSet<NodeKey> = HashSet::new();

        for key in &plan.order {
            let Some(node) = plan.graph.node(key) else {
                continue;
            };

            let outcome = match node.dependencies.iter().find(|d| broken.contains(&d.key)) {
                Some(dep) => {
                    warn!("Skipping {key}: dependency {} failed", dep.key);
                    NodeOutcome::Skipped {
                        dependency: dep.key.clone(),
                    }
                }
                None if self.completed.contains(key) => {
                    debug!("{key} already completed in this run");
                    NodeOutcome::Reused
                }
                None => {
                    let hash = hashes.get(key).map(String::as_str);
                    match self.process(node, plan.is_root(key), hash) {
                        Ok(outcome) => outcome,
                        Err(error) if self.ctx.fail_fast => {
                            return Err(ForgeError::at(key.to_string(), error));
                        }
                        Err(error) => {
                            warn!("{key}: {error}");
                            NodeOutcome::Failed { error }
                        }
                    }
                }
            };

            match outcome {
                NodeOutcome::Built | NodeOutcome::Reused => {
                    self.completed.insert(key.clone());
                }
                NodeOutcome::Skipped { .. } | NodeOutcome::Failed { .. } => {
                    broken.insert(key.clone());
                }
            }
            if let Some(observer) = self.observer.as_mut() {
                observer(key, &outcome);
            }
            report.outcomes.push((key.clone(), outcome));
        }

        Ok(report)
    }

    fn process(
        &mut self,
        node: &GraphNode,
        is_root: bool,
        hash: Option<&str>,
    ) -> Result<NodeOutcome, BuildError> {
        let settings = self.workspace.settings();
        let image_name = settings.image_name(&node.key.service);
        let image = primary_image(&image_name, node);

        if !is_root {
            if let Some(outcome) = self.check_dependency(node, &image, hash)? {
                return Ok(outcome);
            }
        }

        let shas = resolve_source_shas(&node.config, &mut self.sha_cache, self.revisions);
        let tls = node
            .config
            .tls
            .as_ref()
            .map(|t| self.tls.metadata(&node.key.service, t));
        let request = BuildRequest {
            context: self.workspace.root().join(&node.config.context),
            dockerfile: self.workspace.root().join(&node.config.dockerfile),
            tags: image_tags(&image_name, node),
            build_args: compose(node, self.ctx, tls.as_ref(), &shas),
            labels: image_labels(&settings.label_prefix, node, self.ctx, hash, &shas),
            no_cache: self.no_cache,
            pull: self.ctx.pull,
        };

        info!("Building {} ({image})", node.key);
        self.backend
            .build(&request)
            .map_err(|e| BuildError::BuildFailed {
                node: node.key.to_string(),
                error: e.to_string(),
            })?;
        Ok(NodeOutcome::Built)
    }

    /// Decide whether a dependency node needs building.
    ///
    /// `Some(outcome)` short-circuits the build. In CI the definition hash
    /// is checked first; without auto-build a dependency that would need
    /// rebuilding is an error.
    fn check_dependency(
        &self,
        node: &GraphNode,
        image: &str,
        hash: Option<&str>,
    ) -> Result<Option<NodeOutcome>, BuildError> {
        let check_cache = self.ctx.ci && self.ctx.dep_cache != DepCacheMode::Off;
        if self.ctx.auto_build && !check_cache {
            return Ok(None);
        }

        let labels = self.existing_labels(image).map_err(|error| BuildError::BuildFailed {
            node: node.key.to_string(),
            error,
        })?;

        if !check_cache {
            return match labels {
                Some(_) => {
                    info!("Using existing {image} for {}", node.key);
                    Ok(Some(NodeOutcome::Reused))
                }
                None => Err(BuildError::DependencyMissing {
                    node: node.key.to_string(),
                    image: image.to_string(),
                }),
            };
        }

        let expected = hash.unwrap_or_default();
        let label_key = hash_label_key(&self.workspace.settings().label_prefix);
        let freshness = Freshness::of(labels.as_ref(), &label_key, expected);
        match decide(self.ctx.dep_cache, &freshness, &node.key, image, expected)? {
            CacheDecision::Reuse => {
                info!("{} is up to date ({image})", node.key);
                Ok(Some(NodeOutcome::Reused))
            }
            CacheDecision::Rebuild if self.ctx.auto_build => Ok(None),
            CacheDecision::Rebuild => Err(match freshness {
                Freshness::Missing => BuildError::DependencyMissing {
                    node: node.key.to_string(),
                    image: image.to_string(),
                },
                Freshness::Mismatch(found) => BuildError::HashMismatch {
                    node: node.key.to_string(),
                    image: image.to_string(),
                    expected: expected.to_string(),
                    found: Some(found),
                },
                Freshness::Unlabeled | Freshness::Fresh => BuildError::HashMismatch {
                    node: node.key.to_string(),
                    image: image.to_string(),
                    expected: expected.to_string(),
                    found: None,
                },
            }),
        }
    }

    /// Labels of `image`, pulling it first when allowed and absent locally
    fn existing_labels(&self, image: &str) -> Result<Option<BTreeMap<String, String>>, String> {
        let local = self.backend.image_labels(image).map_err(|e| e.to_string())?;
        if local.is_some() || !self.ctx.pull {
            return Ok(local);
        }
        debug!("{image} not present locally, trying to pull");
        if self.backend.pull(image).map_err(|e| e.to_string())? {
            self.backend.image_labels(image).map_err(|e| e.to_string())
        } else {
            Ok(None)
        }
    }
}
