//! Image tags and labels

use std::collections::BTreeMap;

use crate::config::defaults::DEFINITION_HASH_LABEL;
use crate::core::build_args::SourceShas;
use crate::core::context::BuildContext;
use crate::core::graph::GraphNode;
use crate::core::service::SourceSpec;

/// Full `name:tag` references of a node's image
pub fn image_tags(image_name: &str, node: &GraphNode) -> Vec<String> {
    node.variant
        .tags
        .iter()
        .map(|tag| format!("{image_name}:{tag}"))
        .collect()
}

/// The exact reference a node is consumed by (`name:full_version`)
pub fn primary_image(image_name: &str, node: &GraphNode) -> String {
    format!("{image_name}:{}", node.variant.full_name())
}

/// Label key of the definition hash
pub fn hash_label_key(prefix: &str) -> String {
    format!("{prefix}.{DEFINITION_HASH_LABEL}")
}

/// Labels of a node's image.
///
/// Generated labels are applied over the config's own labels.
pub fn image_labels(
    prefix: &str,
    node: &GraphNode,
    ctx: &BuildContext,
    definition_hash: Option<&str>,
    shas: &SourceShas,
) -> BTreeMap<String, String> {
    let mut labels = node.config.labels.clone();

    labels.insert(format!("{prefix}.service"), node.key.service.clone());
    labels.insert(format!("{prefix}.version"), node.variant.full_name());
    if let Some(platform) = &node.key.platform {
        labels.insert(format!("{prefix}.platform"), platform.clone());
    }
    labels.insert(format!("{prefix}.revision"), ctx.commit_id().to_string());
    if let Some(hash) = definition_hash {
        labels.insert(hash_label_key(prefix), hash.to_string());
    }

    for (key, spec) in &node.config.sources {
        let base = format!("{prefix}.source.{key}");
        match spec {
            SourceSpec::Git { url, reference } => {
                let sha = shas
                    .get(key)
                    .cloned()
                    .flatten()
                    .unwrap_or_else(|| format!("missing:{reference}"));
                labels.insert(format!("{base}.ref"), reference.clone());
                labels.insert(format!("{base}.url"), url.clone());
                labels.insert(format!("{base}.sha"), sha);
            }
            SourceSpec::Local { path } => {
                labels.insert(format!("{base}.path"), path.clone());
            }
        }
    }

    labels
}
