//! Deps command implementation
//!
//! Implements `stackforge deps`: print every node of the selected targets'
//! graph with its direct dependencies, as JSON, in build order. CI
//! generators use the listing to declare job-level `needs`.

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use std::path::Path;

use super::{open_workspace, TargetArgs};
use crate::core::builder::{plan, BuildPlan};
use crate::core::labels::{image_tags, primary_image};
use crate::core::workspace::Workspace;

/// Deps options
#[derive(Args, Debug, Clone, Default)]
pub struct DepsOptions {
    #[command(flatten)]
    pub targets: TargetArgs,
}

/// One node of the listing
#[derive(Debug, Serialize, PartialEq)]
pub struct NodeEntry {
    pub node: String,
    pub service: String,
    pub version: String,
    pub platform: Option<String>,
    pub image: String,
    pub tags: Vec<String>,
    pub dependencies: Vec<DependencyEntry>,
}

/// One direct dependency of a node
#[derive(Debug, Serialize, PartialEq)]
pub struct DependencyEntry {
    pub node: String,
    pub build_arg: String,
    pub image: String,
}

/// Execute the deps command
pub async fn execute(repo: &Path, options: DepsOptions) -> Result<()> {
    let workspace = open_workspace(repo)?;
    let targets: Vec<_> = options
        .targets
        .resolve(&workspace)?
        .into_iter()
        .flat_map(|group| group.targets)
        .collect();

    let plan = plan(&workspace, &targets)?;
    let entries = list_nodes(&workspace, &plan);
    println!("{}", serde_json::to_string_pretty(&entries)?);
    Ok(())
}

/// Entries of every node of `plan`, dependencies first
pub fn list_nodes(workspace: &Workspace, plan: &BuildPlan) -> Vec<NodeEntry> {
    let settings = workspace.settings();
    plan.order
        .iter()
        .filter_map(|key| plan.graph.node(key))
        .map(|node| {
            let image_name = settings.image_name(&node.key.service);
            NodeEntry {
                node: node.key.to_string(),
                service: node.key.service.clone(),
                version: node.variant.full_name(),
                platform: node.key.platform.clone(),
                image: primary_image(&image_name, node),
                tags: image_tags(&image_name, node),
                dependencies: node
                    .dependencies
                    .iter()
                    .map(|link| DependencyEntry {
                        node: link.key.to_string(),
                        build_arg: link.build_arg.clone(),
                        image: link.image.clone(),
                    })
                    .collect(),
            }
        })
        .collect()
}
