//! Folds spans into unique graph nodes.

use crate::core::{Result, Span, TracemapError};
use crate::service_map::classifier::SpanClass;
use crate::service_map::model::{format_avg_duration, Node, NodeKind, NodeMap, Relationship};

/// Builds the node map from spans and their precomputed classifications.
///
/// `classes[i]` must be the classification of `spans[i]`. A node is central
/// when it was first seen on a span of `service_name` that is not an
/// outbound call site.
pub fn build_nodes(spans: &[Span], classes: &[SpanClass], service_name: &str) -> Result<NodeMap> {
    let mut nodes = NodeMap::new();

    for (span, class) in spans.iter().zip(classes) {
        match nodes.get_mut(class.id.as_str()) {
            Some(existing) => update_node_from_span(existing, span),
            None => {
                let node = create_node_from_span(class, span, service_name)?;
                nodes
                    .insert(node.id.clone(), node)
                    .map_err(|node| TracemapError::schema(format!("duplicate node id {}", node.id)))?;
            },
        }
    }

    Ok(nodes)
}

fn create_node_from_span(class: &SpanClass, span: &Span, service_name: &str) -> Result<Node> {
    let mut node = Node::new(class.id.clone(), class.name.clone(), class.kind)?;
    node.service_name = span.service_name.to_string();
    node.duration = span.duration;
    node.avg_duration = format_avg_duration(node.duration, node.count);
    node.operations.insert(span.operation_name.clone(), 1);
    node.trace_ids.push(span.trace_id.clone());
    node.database_type = class.database_type.clone();

    if node.service_name == service_name && node.kind != NodeKind::Outbound {
        node.relationship = Some(Relationship::Central);
    }

    Ok(node)
}

fn update_node_from_span(node: &mut Node, span: &Span) {
    *node.operations.entry(span.operation_name.clone()).or_insert(0) += 1;
    node.count += 1;
    node.duration = node.duration.saturating_add(span.duration);
    node.avg_duration = format_avg_duration(node.duration, node.count);
    node.trace_ids.push(span.trace_id.clone());
}
