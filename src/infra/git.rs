//! Git revision lookups
//!
//! Resolves remote refs to commit SHAs (`git ls-remote`) and reads the
//! commit of the local checkout using the gix crate.

use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

use crate::config::defaults::SHORT_SHA_LEN;

/// Git operation errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GitError {
    /// `git ls-remote` could not run or failed
    #[error("Failed to query '{url}' for ref '{reference}': {error}")]
    LsRemoteFailed {
        url: String,
        reference: String,
        error: String,
    },

    /// Ref not advertised by the remote
    #[error("Ref '{reference}' not found in repository '{url}'")]
    RefNotFound { url: String, reference: String },

    /// Invalid repository
    #[error("Invalid repository at '{path}': {error}")]
    InvalidRepository { path: PathBuf, error: String },
}

/// Resolves a git ref of a remote repository to a short commit SHA
pub trait RevisionSource {
    fn short_sha(&self, url: &str, reference: &str) -> Result<String, GitError>;
}

/// Length of a full hex commit SHA
const FULL_SHA_LEN: usize = 40;

/// True if `reference` is a full commit SHA.
///
/// Abbreviated hex strings are not trusted: tags such as `2024010` look the
/// same and must be resolved against the remote.
pub fn is_full_sha(reference: &str) -> bool {
    reference.len() == FULL_SHA_LEN && reference.chars().all(|c| c.is_ascii_hexdigit())
}

/// First [`SHORT_SHA_LEN`] characters of a SHA
pub fn shorten(sha: &str) -> String {
    sha.chars().take(SHORT_SHA_LEN).collect::<String>().to_lowercase()
}

/// Pick the commit for `reference` out of `git ls-remote` output.
///
/// Peeled annotated tags (`refs/tags/x^{}`) win over the tag object itself.
pub fn parse_ls_remote(output: &str, reference: &str) -> Option<String> {
    let mut first = None;
    for line in output.lines() {
        let Some((sha, name)) = line.split_once('\t') else {
            continue;
        };
        if !is_full_sha(sha) {
            continue;
        }
        if name == format!("refs/tags/{reference}^{{}}") {
            return Some(sha.to_string());
        }
        if first.is_none() {
            first = Some(sha.to_string());
        }
    }
    first
}

/// [`RevisionSource`] backed by the `git` CLI
#[derive(Debug, Clone, Default)]
pub struct GitCli;

impl RevisionSource for GitCli {
    fn short_sha(&self, url: &str, reference: &str) -> Result<String, GitError> {
        if is_full_sha(reference) {
            return Ok(shorten(reference));
        }

        let failed = |error: String| GitError::LsRemoteFailed {
            url: url.to_string(),
            reference: reference.to_string(),
            error,
        };

        tracing::debug!("Resolving {reference} in {url}");
        let output = Command::new("git")
            .arg("ls-remote")
            .arg(url)
            .arg(reference)
            .arg(format!("refs/tags/{reference}^{{}}"))
            .env("GIT_TERMINAL_PROMPT", "0")
            .output()
            .map_err(|e| failed(e.to_string()))?;

        if !output.status.success() {
            return Err(failed(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        parse_ls_remote(&String::from_utf8_lossy(&output.stdout), reference)
            .map(|sha| shorten(&sha))
            .ok_or_else(|| GitError::RefNotFound {
                url: url.to_string(),
                reference: reference.to_string(),
            })
    }
}

/// Short SHA of `HEAD` of the checkout containing `path`
pub fn head_commit(path: &Path) -> Result<String, GitError> {
    let invalid = |error: String| GitError::InvalidRepository {
        path: path.to_path_buf(),
        error,
    };
    let repo = gix::discover(path).map_err(|e| invalid(e.to_string()))?;
    let head = repo.head_id().map_err(|e| invalid(e.to_string()))?;
    Ok(head.to_hex_with_len(SHORT_SHA_LEN).to_string())
}
