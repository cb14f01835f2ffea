//! CLI command implementations
//!
//! Each command is implemented in its own submodule.

pub mod build;
pub mod check;
pub mod deps;

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use std::path::Path;
use tracing::debug;

use crate::core::builder::BuildTarget;
use crate::core::version::resolve_root_variants;
use crate::core::workspace::{ServiceFiles, Workspace};

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build images and their dependencies in order
    #[command(disable_version_flag = true)]
    Build(build::BuildOptions),

    /// Print the dependency graph as JSON
    #[command(disable_version_flag = true)]
    Deps(deps::DepsOptions),

    /// Validate configuration of every version and platform
    Check(check::CheckOptions),
}

impl Commands {
    /// Run the command against the repository at `repo`
    pub async fn run(self, repo: &Path) -> Result<()> {
        match self {
            Self::Build(options) => build::execute(repo, options).await,
            Self::Deps(options) => deps::execute(repo, options).await,
            Self::Check(options) => check::execute(repo, options).await,
        }
    }
}

/// Which `{service, version, platform}` roots to work on
#[derive(Args, Debug, Clone, Default)]
pub struct TargetArgs {
    /// Service name
    #[arg(conflicts_with = "all_services")]
    pub service: Option<String>,

    /// Version to select (name, tag alias, `latest`, or platform-suffixed name)
    #[arg(long, conflicts_with_all = ["versions", "all_versions"])]
    pub version: Option<String>,

    /// Several versions, comma separated
    #[arg(long, value_delimiter = ',', conflicts_with = "all_versions")]
    pub versions: Vec<String>,

    /// Every version in the manifest
    #[arg(long)]
    pub all_versions: bool,

    /// Restrict multi-platform services to one platform
    #[arg(long)]
    pub platform: Option<String>,

    /// Every service in the repository
    #[arg(long)]
    pub all_services: bool,
}

/// Targets built together, in one plan
#[derive(Debug, Clone)]
pub struct TargetGroup {
    /// Human-readable selector (`web:v1.0.0`, `all services`)
    pub label: String,
    pub targets: Vec<BuildTarget>,
}

impl TargetArgs {
    /// Resolve the selection into target groups.
    ///
    /// A single service yields one group per requested version; the
    /// whole-repository selection yields one group.
    pub fn resolve(&self, workspace: &Workspace) -> Result<Vec<TargetGroup>> {
        if self.all_services {
            return self.resolve_all(workspace).map(|group| vec![group]);
        }

        let Some(service) = &self.service else {
            bail!("Specify a service or use --all-services");
        };
        let files = workspace.load_service(service)?;

        let versions: Vec<Option<String>> = if let Some(version) = &self.version {
            vec![Some(version.clone())]
        } else if !self.versions.is_empty() {
            self.versions.iter().cloned().map(Some).collect()
        } else if self.all_versions {
            files.versions.version_names().into_iter().map(Some).collect()
        } else {
            vec![None]
        };

        versions
            .into_iter()
            .map(|version| -> Result<TargetGroup> {
                let label = format!(
                    "{service}:{}",
                    version.as_deref().unwrap_or(&files.versions.default)
                );
                let targets = root_targets(&files, version.as_deref(), self.platform.as_deref())
                    .with_context(|| label.clone())?;
                Ok(TargetGroup { label, targets })
            })
            .collect()
    }

    fn resolve_all(&self, workspace: &Workspace) -> Result<TargetGroup> {
        if self.version.is_some() || !self.versions.is_empty() {
            bail!("--version and --versions select versions of one service; use --all-versions with --all-services");
        }

        let mut targets = Vec::new();
        for service in workspace.list_services()? {
            let files = workspace.load_service(&service)?;
            if let (Some(flag), Some(platforms)) = (&self.platform, &files.platforms) {
                if !platforms.contains(flag) {
                    debug!("{service} does not build for platform {flag}; skipping");
                    continue;
                }
            }

            let versions = if self.all_versions {
                files.versions.version_names()
            } else {
                vec![files.versions.default.clone()]
            };
            for version in versions {
                targets.extend(
                    root_targets(&files, Some(version.as_str()), self.platform.as_deref())
                        .with_context(|| format!("{service}:{version}"))?,
                );
            }
        }

        Ok(TargetGroup {
            label: "all services".to_string(),
            targets,
        })
    }
}

fn root_targets(
    files: &ServiceFiles,
    version: Option<&str>,
    platform: Option<&str>,
) -> Result<Vec<BuildTarget>> {
    Ok(resolve_root_variants(files, version, platform)?
        .into_iter()
        .map(|variant| BuildTarget {
            service: files.name.clone(),
            variant,
        })
        .collect())
}

/// Open the repository at `repo`
pub fn open_workspace(repo: &Path) -> Result<Workspace> {
    Workspace::open(repo)
        .with_context(|| format!("Failed to open repository at {}", repo.display()))
}
