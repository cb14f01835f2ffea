//! Stackforge - build orchestration for multi-service container images
//!
//! Resolves layered service configuration, builds the dependency graph of
//! `{service, version, platform}` images, orders it, and drives the
//! container builder with deterministic tags, labels and build arguments.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`cli`] - Command-line interface parsing and output formatting
//! - [`core`] - Business logic (no process spawning)
//! - [`infra`] - Infrastructure layer (container builder, git)
//! - [`config`] - Configuration and constants
//! - [`error`] - Error types and handling

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod infra;
