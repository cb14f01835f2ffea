//! Core business logic module
//!
//! Everything needed to turn service definitions into an ordered build
//! plan. Apart from reading configuration files and Dockerfiles it has no
//! side effects; builds, pulls and git queries go through the traits in
//! [`crate::infra`].
//!
//! # Submodules
//!
//! - [`workspace`] - Repository layout and manifest loading
//! - [`manifest`] - Version and platform manifests
//! - [`service`] - Typed service configuration
//! - [`merge`] - Deep merge of configuration layers
//! - [`config_resolver`] - Layer validation and merging
//! - [`version`] - Version/platform resolution and dependency inheritance
//! - [`graph`] - Dependency graph construction
//! - [`resolver`] - Build order and cycle detection
//! - [`hash`] - Definition hashes and dependency cache decisions
//! - [`build_args`] - Build argument and cache-bust composition
//! - [`labels`] - Image tags and labels
//! - [`tls`] - TLS metadata
//! - [`context`] - Per-invocation build context
//! - [`builder`] - Build orchestration

pub mod build_args;
pub mod builder;
pub mod config_resolver;
pub mod context;
pub mod graph;
pub mod hash;
pub mod labels;
pub mod manifest;
pub mod merge;
pub mod resolver;
pub mod service;
pub mod tls;
pub mod version;
pub mod workspace;
