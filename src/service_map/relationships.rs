//! Relationship classification relative to the central node.
//!
//! Adjacency needed for the walk lives in a [`TraversalContext`] that is
//! built from the link map and dropped once classification and placeholder
//! synthesis are done, so [`Node`] never carries traversal state.

use crate::service_map::model::{LinkMap, Node, NodeMap, Relationship};
use smallvec::SmallVec;

type Neighbours = SmallVec<[usize; 4]>;

/// Node-position-indexed adjacency built from links.
#[derive(Debug, Default)]
pub struct TraversalContext {
    downstream: Vec<Neighbours>,
    upstream: Vec<Neighbours>,
}

impl TraversalContext {
    /// Wires adjacency for every link whose endpoints exist.
    pub fn wire(nodes: &NodeMap, links: &LinkMap) -> Self {
        let mut context = TraversalContext {
            downstream: vec![Neighbours::new(); nodes.len()],
            upstream: vec![Neighbours::new(); nodes.len()],
        };
        for link in links.iter() {
            if let (Some(source), Some(target)) = (
                nodes.position(link.source.as_str()),
                nodes.position(link.target.as_str()),
            ) {
                context.downstream[source].push(target);
                context.upstream[target].push(source);
            }
        }
        context
    }

    pub fn downstream(&self, node: usize) -> &[usize] {
        self.downstream.get(node).map(|n| n.as_slice()).unwrap_or(&[])
    }

    pub fn upstream(&self, node: usize) -> &[usize] {
        self.upstream.get(node).map(|n| n.as_slice()).unwrap_or(&[])
    }
}

/// Labels every node and returns the position of the central node, if any.
///
/// When several nodes were marked central during aggregation the first one
/// in output order is kept and the others are classified like any other node.
pub fn classify_relationships(nodes: &mut NodeMap, context: &TraversalContext) -> Option<usize> {
    let central = nodes.iter().position(Node::is_central);

    if let Some(central) = central {
        let central_id = nodes[central].id.clone();
        for (position, node) in nodes.iter_mut().enumerate() {
            if position != central && node.is_central() {
                tracing::warn!(
                    "Node {} also matches the central service; keeping {} as central",
                    node.id,
                    central_id
                );
                node.relationship = None;
            }
        }

        traverse_downstream(nodes, context, central, false);
        traverse_upstream(nodes, context, central);
    } else if !nodes.is_empty() {
        tracing::warn!("No central node found; all {} nodes are unknown", nodes.len());
    }

    for node in nodes.iter_mut() {
        node.assign(Relationship::Unknown);
    }

    central
}

/// Labels nodes reachable downstream of `start` (exclusive).
fn traverse_downstream(nodes: &mut NodeMap, context: &TraversalContext, start: usize, distributary: bool) {
    let label = if distributary {
        Relationship::Distributary
    } else {
        Relationship::Downstream
    };

    let mut stack: Vec<(usize, usize)> = vec![(start, 0)];
    while let Some(&(node, next)) = stack.last() {
        let Some(&neighbour) = context.downstream(node).get(next) else {
            stack.pop();
            continue;
        };
        if let Some(frame) = stack.last_mut() {
            frame.1 += 1;
        }
        if nodes[neighbour].assign(label) {
            stack.push((neighbour, 0));
        }
    }
}

/// Labels nodes reachable upstream of `start` (exclusive). Once everything
/// upstream of a node is labelled, its other consumers are labelled
/// distributary.
fn traverse_upstream(nodes: &mut NodeMap, context: &TraversalContext, start: usize) {
    let mut stack: Vec<(usize, usize)> = vec![(start, 0)];
    while let Some(&(node, next)) = stack.last() {
        let Some(&neighbour) = context.upstream(node).get(next) else {
            stack.pop();
            if node != start {
                traverse_downstream(nodes, context, node, true);
            }
            continue;
        };
        if let Some(frame) = stack.last_mut() {
            frame.1 += 1;
        }
        if nodes[neighbour].assign(Relationship::Upstream) {
            stack.push((neighbour, 0));
        }
    }
}
