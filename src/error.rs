//! Error types for stackforge
//!
//! Domain-specific error types using thiserror.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::config::settings::SettingsError;
use crate::infra::docker::BackendError;

/// A single field-placement or format violation in one configuration layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Where the violation was found (e.g. `platforms.toml[debian]`)
    pub location: String,
    /// What is wrong
    pub message: String,
}

impl Violation {
    /// Create a new violation
    pub fn new(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.location, self.message)
    }
}

/// Aggregated configuration violations
///
/// Collected across every layer (and every node of a graph) and reported
/// once, before any build starts.
#[derive(Error, Debug, Clone, Default, PartialEq, Eq)]
#[error("{}", render_violations(.violations))]
pub struct ConfigValidationError {
    /// Every violation found, in discovery order
    pub violations: Vec<Violation>,
}

fn render_violations(violations: &[Violation]) -> String {
    let mut out = format!(
        "Invalid configuration ({} violation{}):",
        violations.len(),
        if violations.len() == 1 { "" } else { "s" }
    );
    for violation in violations {
        out.push_str("\n  - ");
        out.push_str(&violation.to_string());
    }
    out
}

impl ConfigValidationError {
    /// Create an empty collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a violation
    pub fn push(&mut self, location: impl Into<String>, message: impl Into<String>) {
        self.violations.push(Violation::new(location, message));
    }

    /// Absorb every violation of another collector
    pub fn extend(&mut self, other: ConfigValidationError) {
        for violation in other.violations {
            if !self.violations.contains(&violation) {
                self.violations.push(violation);
            }
        }
    }

    /// True if nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    /// `Ok(())` when empty, otherwise `Err(self)`
    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

/// Service, manifest and version resolution errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResolveError {
    /// No directory for the service
    #[error("Service '{service}' not found (expected {path})")]
    ServiceNotFound { service: String, path: PathBuf },

    /// Service has no version manifest
    #[error("Service '{service}' has no version manifest at {path}")]
    ManifestMissing { service: String, path: PathBuf },

    /// Requested version absent from the manifest
    #[error(
        "Version '{requested}' not found for service '{service}' (available: {})",
        .available.join(", ")
    )]
    VersionNotFound {
        service: String,
        requested: String,
        available: Vec<String>,
    },

    /// Conflicting platform signals
    #[error("Platform mismatch for service '{service}': {message}")]
    PlatformMismatch { service: String, message: String },

    /// Aggregated configuration violations
    #[error(transparent)]
    Config(#[from] ConfigValidationError),

    /// Failed to read a file
    #[error("Failed to read file '{path}': {error}")]
    ReadFile { path: PathBuf, error: String },
}

/// Cycles found by the topological sort
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{}", render_cycles(.cycles))]
pub struct CycleDetectedError {
    /// Every distinct cycle, each closed (first key repeated at the end)
    pub cycles: Vec<Vec<String>>,
}

fn render_cycles(cycles: &[Vec<String>]) -> String {
    let mut out = format!(
        "Circular dependency detected ({} cycle{}):",
        cycles.len(),
        if cycles.len() == 1 { "" } else { "s" }
    );
    for cycle in cycles {
        out.push_str("\n  ");
        out.push_str(&cycle.join(" -> "));
    }
    out
}

/// Errors raised while executing a build plan
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BuildError {
    /// Dependency image absent and auto-build disabled
    #[error("Dependency image '{image}' for {node} is missing and auto-build is disabled")]
    DependencyMissing { node: String, image: String },

    /// Stale or missing dependency image in strict dep-cache mode
    #[error(
        "Dependency {node} is stale: image '{image}' carries hash {} but the definition hashes to {expected}",
        .found.as_deref().unwrap_or("<none>")
    )]
    HashMismatch {
        node: String,
        image: String,
        expected: String,
        found: Option<String>,
    },

    /// The external builder failed
    #[error("Build failed for {node}: {error}")]
    BuildFailed { node: String, error: String },

    /// One or more nodes failed in continue-on-failure mode
    #[error("{failed} of {total} image builds failed")]
    Incomplete { failed: usize, total: usize },
}

/// Top-level stackforge error type
#[derive(Error, Debug)]
pub enum ForgeError {
    /// Resolution error
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// Configuration violations
    #[error(transparent)]
    Config(#[from] ConfigValidationError),

    /// Cycle error
    #[error(transparent)]
    Cycle(#[from] CycleDetectedError),

    /// Build error
    #[error(transparent)]
    Build(#[from] BuildError),

    /// Container backend error
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Repository settings error
    #[error(transparent)]
    Settings(#[from] SettingsError),

    /// Error with a node label prefix
    #[error("{node}: {error}")]
    Node { node: String, error: Box<ForgeError> },
}

impl ForgeError {
    /// Attach a `{service}:{version}[:{platform}]` prefix
    pub fn at(node: impl Into<String>, source: impl Into<ForgeError>) -> Self {
        Self::Node {
            node: node.into(),
            error: Box::new(source.into()),
        }
    }
}
