//! Service dependency graph construction.
//!
//! This module analyzes the spans gathered around one central service to
//! build a dependency graph, flags dependency cycles, classifies every node
//! by its role relative to the central service and marks dependencies that
//! never reported spans.
//!
//! Extraction is a pure function of its input: every call builds fresh maps,
//! so concurrent calls need no coordination.

pub mod classifier;
pub mod cycles;
pub mod links;
pub mod model;
pub mod nodes;
pub mod relationships;
pub mod uninstrumented;

use crate::core::{Config, GraphConfig, Result, Span, TraceId};
use ahash::AHashSet;
use classifier::{SpanClass, SpanClassifier, SpanMatcher};
use relationships::TraversalContext;
use serde::{Deserialize, Serialize};

pub use model::{Link, Node, NodeKind, Relationship};

/// Input of one extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphRequest {
    /// Fully hydrated spans, typically from many traces
    pub spans: Vec<Span>,
    /// The central service the graph is built for
    pub service_name: String,
    /// Whether the span fetch was truncated by a trace limit
    #[serde(default)]
    pub trace_limit_reached: bool,
}

/// Violation counts; zero counts are omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violations {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cycles: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uninstrumented: Option<u64>,
}

impl Violations {
    fn from_counts(cycles: u64, uninstrumented: u64) -> Self {
        Violations {
            cycles: (cycles > 0).then_some(cycles),
            uninstrumented: (uninstrumented > 0).then_some(uninstrumented),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cycles.is_none() && self.uninstrumented.is_none()
    }
}

/// Graph summary returned next to nodes and links.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub violations: Violations,
    pub has_violations: bool,
    /// Distinct traces seen across all span-derived nodes
    pub traces_considered: usize,
    pub trace_limit_reached: bool,
}

/// Service dependency graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceGraph {
    pub summary: Summary,
    pub nodes: Vec<Node>,
    pub links: Vec<Link>,
}

/// Builds service graphs with a fixed span classifier.
#[derive(Debug)]
pub struct ServiceMapBuilder {
    classifier: SpanClassifier,
    graph: GraphConfig,
}

impl ServiceMapBuilder {
    /// Create a builder from an explicit matcher chain (priority order,
    /// service matcher last).
    pub fn new(matchers: Vec<Box<dyn SpanMatcher>>, graph: GraphConfig) -> Result<Self> {
        Ok(Self {
            classifier: SpanClassifier::new(matchers)?,
            graph,
        })
    }

    /// Create a builder from configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            classifier: SpanClassifier::from_config(&config.span_types)?,
            graph: config.graph.clone(),
        })
    }

    pub fn classifier(&self) -> &SpanClassifier {
        &self.classifier
    }

    /// Build the graph for a request.
    pub fn extract(&self, request: &GraphRequest) -> Result<ServiceGraph> {
        self.build(&request.spans, &request.service_name, request.trace_limit_reached)
    }

    /// Build the graph for `service_name` from spans of many traces.
    pub fn build(&self, spans: &[Span], service_name: &str, trace_limit_reached: bool) -> Result<ServiceGraph> {
        tracing::debug!("Building service graph for {} from {} spans", service_name, spans.len());

        // Each span is classified once and shared by both aggregation passes
        let classes: Vec<SpanClass> = spans.iter().map(|span| self.classifier.classify(span)).collect();

        let mut nodes = nodes::build_nodes(spans, &classes, service_name)?;
        let mut links = links::build_links(spans, &classes)?;
        let cycles = cycles::detect_cycles(&mut nodes, &mut links);

        let traces_considered = nodes
            .iter()
            .flat_map(|node| node.trace_ids.iter())
            .collect::<AHashSet<&TraceId>>()
            .len();

        let context = TraversalContext::wire(&nodes, &links);
        relationships::classify_relationships(&mut nodes, &context);
        let uninstrumented = uninstrumented::mark_uninstrumented(&mut nodes, &mut links, &context, &self.graph)?;
        drop(context);

        let violations = Violations::from_counts(cycles, uninstrumented);
        let summary = Summary {
            has_violations: !violations.is_empty(),
            violations,
            traces_considered,
            trace_limit_reached,
        };

        tracing::debug!(
            "Service graph for {}: {} nodes, {} links, {} traces",
            service_name,
            nodes.len(),
            links.len(),
            traces_considered
        );

        Ok(ServiceGraph {
            summary,
            nodes: nodes.into_vec(),
            links: links.into_vec(),
        })
    }
}

/// Build a graph with the default configuration.
pub fn extract_nodes_and_links(request: &GraphRequest) -> Result<ServiceGraph> {
    ServiceMapBuilder::from_config(&Config::default())?.extract(request)
}
