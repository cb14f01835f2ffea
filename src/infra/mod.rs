//! Infrastructure layer
//!
//! Handles external processes: the container builder CLI and git.
//! This module is the only place where side effects occur.

pub mod docker;
pub mod git;
