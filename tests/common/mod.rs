//! Common test utilities and fixtures.

#![allow(dead_code)]

use tracemap_lib::core::{ServiceName, Span, SpanId, TraceId};
use tracemap_lib::service_map::{Link, Node, ServiceGraph};

/// Test fixture builder for creating spans with sensible defaults.
pub struct TestSpanBuilder {
    trace: String,
    span: String,
    parent: Option<String>,
    service: String,
    operation: String,
    start_time: u64,
    duration: u64,
    tags: Vec<(String, String)>,
}

impl TestSpanBuilder {
    pub fn new(trace: &str, span: &str) -> Self {
        Self {
            trace: trace.to_string(),
            span: span.to_string(),
            parent: None,
            service: "test-service".to_string(),
            operation: "operation".to_string(),
            start_time: 1_000_000,
            duration: 100,
            tags: Vec::new(),
        }
    }

    pub fn service(mut self, service: &str) -> Self {
        self.service = service.to_string();
        self
    }

    pub fn operation(mut self, operation: &str) -> Self {
        self.operation = operation.to_string();
        self
    }

    pub fn parent(mut self, parent: &str) -> Self {
        self.parent = Some(parent.to_string());
        self
    }

    pub fn start_time(mut self, start_time: u64) -> Self {
        self.start_time = start_time;
        self
    }

    pub fn duration(mut self, duration: u64) -> Self {
        self.duration = duration;
        self
    }

    pub fn tag(mut self, key: &str, value: &str) -> Self {
        self.tags.push((key.to_string(), value.to_string()));
        self
    }

    pub fn with_error(self) -> Self {
        self.tag("error", "true")
    }

    pub fn build(self) -> Span {
        let mut builder = Span::builder()
            .trace_id(TraceId::new(self.trace).unwrap())
            .span_id(SpanId::new(self.span).unwrap())
            .service_name(ServiceName::new(self.service).unwrap())
            .operation_name(self.operation)
            .start_time(self.start_time)
            .duration(self.duration);

        if let Some(parent) = self.parent {
            builder = builder.parent_span_id(SpanId::new(parent).unwrap());
        }
        for (key, value) in self.tags {
            builder = builder.tag(key, value);
        }

        builder.build().unwrap()
    }
}

/// Shorthand for a span of `service` in trace `t1`.
pub fn span(id: &str, parent: Option<&str>, service: &str) -> Span {
    let builder = TestSpanBuilder::new("t1", id).service(service);
    match parent {
        Some(parent) => builder.parent(parent).build(),
        None => builder.build(),
    }
}

pub fn node<'a>(graph: &'a ServiceGraph, id: &str) -> &'a Node {
    graph
        .nodes
        .iter()
        .find(|n| n.id == id)
        .unwrap_or_else(|| panic!("node {} missing from graph", id))
}

pub fn link<'a>(graph: &'a ServiceGraph, source: &str, target: &str) -> Option<&'a Link> {
    graph
        .links
        .iter()
        .find(|l| l.source == source && l.target == target)
}
