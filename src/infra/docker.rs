//! Container builder CLI wrapper
//!
//! Images are built, inspected and pulled through the `docker` CLI (or a
//! compatible one such as `podman`). The [`ImageBackend`] trait is the seam
//! the build orchestrator talks to.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::{Command, Output};
use thiserror::Error;

/// Container backend errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    /// Builder executable not on PATH
    #[error("Container builder '{builder}' not found in PATH. Install Docker or set `builder` in stackforge.toml")]
    BuilderNotFound { builder: String },

    /// Process could not be started
    #[error("Failed to run '{command}': {error}")]
    ExecutionFailed { command: String, error: String },

    /// Process exited unsuccessfully
    #[error("'{command}' failed ({status}): {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    /// Unexpected output from the builder
    #[error("Unexpected output from '{command}': {error}")]
    InvalidOutput { command: String, error: String },
}

/// One image build invocation
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BuildRequest {
    /// Build context directory
    pub context: PathBuf,
    /// Dockerfile path
    pub dockerfile: PathBuf,
    /// Full image references to tag (`name:tag`)
    pub tags: Vec<String>,
    pub build_args: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
    /// Disable the builder's layer cache
    pub no_cache: bool,
    /// Always pull base images
    pub pull: bool,
}

/// Operations the orchestrator needs from a container builder
pub trait ImageBackend {
    /// Labels of a locally present image, or `None` if the image is absent
    fn image_labels(&self, image: &str) -> Result<Option<BTreeMap<String, String>>, BackendError>;

    /// Try to pull an image; `Ok(false)` if the registry does not have it
    fn pull(&self, image: &str) -> Result<bool, BackendError>;

    /// Build and tag an image
    fn build(&self, request: &BuildRequest) -> Result<(), BackendError>;
}

/// [`ImageBackend`] driving a docker-compatible CLI
#[derive(Debug, Clone)]
pub struct DockerCli {
    builder: String,
}

impl DockerCli {
    /// Use the given builder executable
    pub fn new(builder: impl Into<String>) -> Self {
        Self {
            builder: builder.into(),
        }
    }

    /// Use the given builder, checking that it is on PATH
    pub fn detect(builder: &str) -> Result<Self, BackendError> {
        which::which(builder).map_err(|_| BackendError::BuilderNotFound {
            builder: builder.to_string(),
        })?;
        Ok(Self::new(builder))
    }

    /// Arguments of `<builder> build ...` for a request
    pub fn build_args(request: &BuildRequest) -> Vec<String> {
        let mut args = vec!["build".to_string()];
        args.push(format!("--file={}", request.dockerfile.display()));
        for tag in &request.tags {
            args.push(format!("--tag={tag}"));
        }
        for (key, value) in &request.build_args {
            args.push(format!("--build-arg={key}={value}"));
        }
        for (key, value) in &request.labels {
            args.push(format!("--label={key}={value}"));
        }
        if request.no_cache {
            args.push("--no-cache".to_string());
        }
        if request.pull {
            args.push("--pull".to_string());
        }
        args.push(request.context.display().to_string());
        args
    }

    fn run(&self, args: &[String]) -> Result<Output, BackendError> {
        tracing::debug!("Running: {} {}", self.builder, args.join(" "));
        Command::new(&self.builder)
            .args(args)
            .output()
            .map_err(|e| BackendError::ExecutionFailed {
                command: self.describe(args),
                error: e.to_string(),
            })
    }

    fn describe(&self, args: &[String]) -> String {
        match args.first() {
            Some(sub) => format!("{} {sub}", self.builder),
            None => self.builder.clone(),
        }
    }
}

/// Parse the `{{json .Config.Labels}}` output of `image inspect`
pub fn parse_labels(output: &str) -> Result<BTreeMap<String, String>, serde_json::Error> {
    let trimmed = output.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Ok(BTreeMap::new());
    }
    serde_json::from_str(trimmed)
}

impl ImageBackend for DockerCli {
    fn image_labels(&self, image: &str) -> Result<Option<BTreeMap<String, String>>, BackendError> {
        let args = vec![
            "image".to_string(),
            "inspect".to_string(),
            "--format={{json .Config.Labels}}".to_string(),
            image.to_string(),
        ];
        let output = self.run(&args)?;
        if !output.status.success() {
            return Ok(None);
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_labels(&stdout)
            .map(Some)
            .map_err(|e| BackendError::InvalidOutput {
                command: self.describe(&args),
                error: e.to_string(),
            })
    }

    fn pull(&self, image: &str) -> Result<bool, BackendError> {
        let output = self.run(&["pull".to_string(), image.to_string()])?;
        if !output.status.success() {
            tracing::debug!(
                "Pull of {image} failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(output.status.success())
    }

    fn build(&self, request: &BuildRequest) -> Result<(), BackendError> {
        let args = Self::build_args(request);
        let output = self.run(&args)?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        let tail: Vec<&str> = stderr.lines().rev().take(20).collect();
        Err(BackendError::CommandFailed {
            command: self.describe(&args),
            status: output.status.to_string(),
            stderr: tail.into_iter().rev().collect::<Vec<_>>().join("\n"),
        })
    }
}
