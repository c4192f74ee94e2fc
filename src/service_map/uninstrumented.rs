//! Placeholders for dependencies that never reported spans.
//!
//! A mesh node without downstream links means the sidecar forwarded traffic
//! to a service that emitted nothing; it gets a synthesized placeholder node
//! and link. An outbound node without downstream links is a call site with
//! no instrumentation behind it; it is relabelled in place.

use crate::core::{GraphConfig, Result, TracemapError};
use crate::service_map::model::{Link, LinkMap, Node, NodeKind, NodeMap};
use crate::service_map::relationships::TraversalContext;

/// Synthesizes or relabels dead-end nodes and returns how many were found.
///
/// Only nodes present when `context` was wired are inspected, so synthesized
/// placeholders are never examined themselves.
pub fn mark_uninstrumented(
    nodes: &mut NodeMap,
    links: &mut LinkMap,
    context: &TraversalContext,
    config: &GraphConfig,
) -> Result<u64> {
    let mut uninstrumented = 0u64;

    for position in 0..nodes.len() {
        if !context.downstream(position).is_empty() {
            continue;
        }

        match nodes[position].kind {
            NodeKind::Mesh => {
                let placeholder = placeholder_for(&nodes[position], config)?;
                let mut link = Link::new(nodes[position].id.clone(), placeholder.id.clone())?;
                link.is_uninstrumented = true;

                nodes.insert(placeholder.id.clone(), placeholder).map_err(|existing| {
                    TracemapError::schema(format!(
                        "uninstrumented placeholder id {} collides with an existing node",
                        existing.id
                    ))
                })?;
                links.insert(link.key(), link).map_err(|existing| {
                    TracemapError::schema(format!(
                        "duplicate link {} -> {}",
                        existing.source, existing.target
                    ))
                })?;
                uninstrumented += 1;
            },
            NodeKind::Outbound => {
                nodes[position].kind = NodeKind::Uninstrumented;
                uninstrumented += 1;
            },
            _ => {},
        }
    }

    if uninstrumented > 0 {
        tracing::debug!("Marked {} uninstrumented dependencies", uninstrumented);
    }
    Ok(uninstrumented)
}

/// Placeholder inherits the mesh node's statistics and relationship.
fn placeholder_for(mesh: &Node, config: &GraphConfig) -> Result<Node> {
    let mut placeholder = Node::new(
        format!("{}{}", mesh.id, config.uninstrumented_suffix),
        config.uninstrumented_name.clone(),
        NodeKind::Uninstrumented,
    )?;
    placeholder.service_name = config.uninstrumented_service_name.clone();
    placeholder.count = mesh.count;
    placeholder.operations = mesh.operations.clone();
    placeholder.duration = mesh.duration;
    placeholder.avg_duration = mesh.avg_duration.clone();
    placeholder.trace_ids = mesh.trace_ids.clone();
    placeholder.relationship = mesh.relationship;
    Ok(placeholder)
}
