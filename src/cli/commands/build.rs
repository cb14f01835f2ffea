//! Build command implementation
//!
//! Implements `stackforge build`: resolve the requested targets into plans,
//! then either print the build order or run every plan through the
//! container builder.

use anyhow::{bail, Result};
use clap::Args;
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info, warn};

use super::{open_workspace, TargetArgs, TargetGroup};
use crate::cli::output::{create_build_bar, print_status, status, OutputConfig};
use crate::core::builder::{plan, BuildOrchestrator, BuildPlan, BuildReport, NodeOutcome};
use crate::core::context::{BuildContext, DepCacheMode};
use crate::core::tls::ConfigTls;
use crate::core::workspace::Workspace;
use crate::infra::docker::DockerCli;
use crate::infra::git::{head_commit, GitCli};

/// Build options
#[derive(Args, Debug, Clone, Default)]
pub struct BuildOptions {
    #[command(flatten)]
    pub targets: TargetArgs,

    /// Print the dependency-first build order without building
    #[arg(long)]
    pub show_build_order: bool,

    /// Use this value as the cache-bust token for every image
    #[arg(long, value_name = "VALUE")]
    pub cache_bust: Option<String>,

    /// Fresh random cache-bust and no builder layer cache
    #[arg(long)]
    pub no_cache: bool,

    /// How CI treats stale dependency images (off, soft, strict)
    #[arg(long, value_name = "MODE", env = "STACKFORGE_DEP_CACHE")]
    pub dep_cache: Option<DepCacheMode>,

    /// Pull base images and allow pulling dependency images
    #[arg(long)]
    pub pull: bool,

    /// Require dependency images to exist instead of building them
    #[arg(long)]
    pub no_auto_build: bool,

    /// Keep building after a failure
    #[arg(long)]
    pub continue_on_failure: bool,
}

/// Execute the build command
pub async fn execute(repo: &Path, options: BuildOptions) -> Result<()> {
    let workspace = open_workspace(repo)?;
    let groups = options.targets.resolve(&workspace)?;

    // Every plan is validated before anything is built.
    let mut plans: Vec<(&TargetGroup, BuildPlan)> = Vec::with_capacity(groups.len());
    for group in &groups {
        plans.push((group, plan(&workspace, &group.targets)?));
    }

    if options.show_build_order {
        print_build_order(&plans);
        return Ok(());
    }

    let ctx = build_context(repo, &workspace, &options);
    debug!(
        "ci={} commit={} dep-cache={} fail-fast={}",
        ctx.ci,
        ctx.commit_id(),
        ctx.dep_cache,
        ctx.fail_fast
    );
    let backend = DockerCli::detect(&workspace.settings().builder)?;

    let total: usize = plans.iter().map(|(_, plan)| plan.order.len()).sum();
    let bar = create_build_bar(total as u64);
    let progress = bar.clone();

    let mut orchestrator = BuildOrchestrator::new(&workspace, &ctx, &backend, &GitCli, &ConfigTls)
        .with_no_cache(options.no_cache)
        .with_observer(move |key, _| {
            progress.set_message(key.to_string());
            progress.inc(1);
        });

    let mut report = BuildReport::default();
    let mut failed_groups = Vec::new();
    for (group, plan) in &plans {
        info!("Building {} ({} images)", group.label, plan.order.len());
        match orchestrator.execute(plan) {
            Ok(group_report) => report.absorb(group_report),
            Err(e) if ctx.fail_fast => {
                bar.abandon();
                return Err(e.into());
            }
            Err(e) => {
                warn!("{}: {e}", group.label);
                failed_groups.push(group.label.clone());
            }
        }
    }
    bar.finish_and_clear();

    print_summary(&report);

    if !failed_groups.is_empty() {
        bail!("Failed to build {}", failed_groups.join(", "));
    }
    report.into_result()?;
    Ok(())
}

/// Capture the environment and apply command-line overrides
fn build_context(repo: &Path, workspace: &Workspace, options: &BuildOptions) -> BuildContext {
    let mut ctx = BuildContext::from_env(std::env::vars());
    if ctx.commit.is_none() {
        ctx.commit = match head_commit(repo) {
            Ok(commit) => Some(commit),
            Err(e) => {
                debug!("No commit identifier: {e}");
                None
            }
        };
    }

    ctx.cache_bust = options.cache_bust.clone();
    ctx.force_random_cache_bust = options.no_cache;
    ctx.dep_cache = options.dep_cache.unwrap_or(workspace.settings().dep_cache);
    ctx.pull = options.pull;
    ctx.auto_build = !options.no_auto_build;
    // Whole-repository builds always keep independent branches going.
    ctx.fail_fast = !options.continue_on_failure && !options.targets.all_services;
    ctx
}

/// Print node keys in build order, once each
fn print_build_order(plans: &[(&TargetGroup, BuildPlan)]) {
    let mut keys: Vec<String> = Vec::new();
    for (_, plan) in plans {
        for key in &plan.order {
            let key = key.to_string();
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
    }

    if OutputConfig::current().json {
        println!("{}", serde_json::json!(keys));
    } else {
        for key in keys {
            println!("{key}");
        }
    }
}

#[derive(Serialize)]
struct Summary {
    built: Vec<String>,
    reused: Vec<String>,
    skipped: Vec<String>,
    failed: Vec<FailedNode>,
}

#[derive(Serialize)]
struct FailedNode {
    node: String,
    error: String,
}

fn print_summary(report: &BuildReport) {
    if OutputConfig::current().json {
        let mut summary = Summary {
            built: Vec::new(),
            reused: Vec::new(),
            skipped: Vec::new(),
            failed: Vec::new(),
        };
        for (key, outcome) in &report.outcomes {
            let node = key.to_string();
            match outcome {
                NodeOutcome::Built => summary.built.push(node),
                NodeOutcome::Reused => summary.reused.push(node),
                NodeOutcome::Skipped { .. } => summary.skipped.push(node),
                NodeOutcome::Failed { error } => summary.failed.push(FailedNode {
                    node,
                    error: error.to_string(),
                }),
            }
        }
        if let Ok(json) = serde_json::to_string_pretty(&summary) {
            println!("{json}");
        }
        return;
    }

    for (key, outcome) in &report.outcomes {
        match outcome {
            NodeOutcome::Skipped { dependency } => {
                print_status(status::WARNING, &format!("{key} skipped ({dependency} failed)"));
            }
            NodeOutcome::Failed { error } => print_status(status::ERROR, &error.to_string()),
            NodeOutcome::Built | NodeOutcome::Reused => {}
        }
    }

    let prefix = if report.failed() + report.skipped() == 0 {
        status::SUCCESS
    } else {
        status::ERROR
    };
    print_status(
        prefix,
        &format!(
            "{} built, {} reused, {} skipped, {} failed",
            report.built(),
            report.reused(),
            report.skipped(),
            report.failed()
        ),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whole_repo_builds_never_fail_fast() {
        let options = BuildOptions {
            targets: TargetArgs {
                all_services: true,
                ..TargetArgs::default()
            },
            ..BuildOptions::default()
        };
        let dir = tempfile::TempDir::new().unwrap();
        let ws = Workspace::new(dir.path(), Default::default());
        let ctx = build_context(dir.path(), &ws, &options);
        assert!(!ctx.fail_fast);
        assert!(ctx.auto_build);
    }

    #[test]
    fn test_flags_reach_context() {
        let options = BuildOptions {
            targets: TargetArgs {
                service: Some("web".to_string()),
                ..TargetArgs::default()
            },
            cache_bust: Some("fixed".to_string()),
            no_cache: true,
            dep_cache: Some(DepCacheMode::Off),
            pull: true,
            no_auto_build: true,
            ..BuildOptions::default()
        };
        let dir = tempfile::TempDir::new().unwrap();
        let ws = Workspace::new(dir.path(), Default::default());
        let ctx = build_context(dir.path(), &ws, &options);

        assert!(ctx.fail_fast);
        assert_eq!(ctx.cache_bust.as_deref(), Some("fixed"));
        assert!(ctx.force_random_cache_bust);
        assert_eq!(ctx.dep_cache, DepCacheMode::Off);
        assert!(ctx.pull);
        assert!(!ctx.auto_build);
    }
}
