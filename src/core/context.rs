//! Build context
//!
//! Everything a resolution or build step needs from the outside world,
//! captured once by the CLI layer and passed explicitly to every core call.
//! No core module reads the process environment itself.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::config::defaults::{LOCAL_COMMIT, SHORT_SHA_LEN};

/// CI policy for stale or missing dependency images
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DepCacheMode {
    /// Ignore hashes, always rebuild dependencies
    Off,
    /// Rebuild stale dependencies with a warning
    #[default]
    Soft,
    /// Fail on stale dependencies
    Strict,
}

impl fmt::Display for DepCacheMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Off => write!(f, "off"),
            Self::Soft => write!(f, "soft"),
            Self::Strict => write!(f, "strict"),
        }
    }
}

impl FromStr for DepCacheMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "off" => Ok(Self::Off),
            "soft" => Ok(Self::Soft),
            "strict" => Ok(Self::Strict),
            other => Err(format!(
                "invalid dep-cache mode '{other}': must be one of off, soft, strict"
            )),
        }
    }
}

/// Explicit inputs shared by every resolver and build step
#[derive(Debug, Clone)]
pub struct BuildContext {
    /// Snapshot of the process environment
    pub env: BTreeMap<String, String>,
    /// Running under CI
    pub ci: bool,
    /// Commit identifier of the repository (None outside a checkout)
    pub commit: Option<String>,
    /// Global cache-bust override value (`--cache-bust`)
    pub cache_bust: Option<String>,
    /// Fresh random cache-bust on every invocation (`--no-cache`)
    pub force_random_cache_bust: bool,
    /// Dep-cache mode (only applied in CI)
    pub dep_cache: DepCacheMode,
    /// Ask the builder to pull base images
    pub pull: bool,
    /// Build dependency nodes instead of requiring them to exist
    pub auto_build: bool,
    /// Abort on the first failure
    pub fail_fast: bool,
}

impl Default for BuildContext {
    fn default() -> Self {
        Self {
            env: BTreeMap::new(),
            ci: false,
            commit: None,
            cache_bust: None,
            force_random_cache_bust: false,
            dep_cache: DepCacheMode::default(),
            pull: false,
            auto_build: true,
            fail_fast: true,
        }
    }
}

impl BuildContext {
    /// Create a context with no environment
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context from an environment snapshot
    ///
    /// Detects CI and picks up a CI-provided commit identifier.
    pub fn from_env<I>(vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let env: BTreeMap<String, String> = vars.into_iter().collect();
        let ci = env
            .get("CI")
            .map(|v| !v.is_empty() && v != "false" && v != "0")
            .unwrap_or(false);
        let commit = env
            .get("CI_COMMIT_SHORT_SHA")
            .filter(|v| !v.is_empty())
            .cloned()
            .or_else(|| {
                env.get("GITHUB_SHA")
                    .filter(|v| !v.is_empty())
                    .map(|sha| sha.chars().take(SHORT_SHA_LEN).collect())
            });

        Self {
            env,
            ci,
            commit,
            ..Self::default()
        }
    }

    /// Set one environment variable in the snapshot
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set CI mode
    #[must_use]
    pub fn with_ci(mut self, ci: bool) -> Self {
        self.ci = ci;
        self
    }

    /// Set the commit identifier
    #[must_use]
    pub fn with_commit(mut self, commit: impl Into<String>) -> Self {
        self.commit = Some(commit.into());
        self
    }

    /// Set the dep-cache mode
    #[must_use]
    pub fn with_dep_cache(mut self, mode: DepCacheMode) -> Self {
        self.dep_cache = mode;
        self
    }

    /// Look up a variable in the environment snapshot
    pub fn env_var(&self, key: &str) -> Option<&str> {
        self.env.get(key).map(String::as_str)
    }

    /// Commit identifier, or `local` outside a checkout
    pub fn commit_id(&self) -> &str {
        self.commit.as_deref().unwrap_or(LOCAL_COMMIT)
    }
}
