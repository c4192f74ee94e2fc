//! Trace search result summaries.
//!
//! Condenses each trace into the few numbers a result list shows: the root
//! call, which services took part, and how much of the work was spent in the
//! service or operation that was searched for.

use crate::core::{Span, Trace};
use serde::{Deserialize, Serialize};

/// What the user searched for.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    pub service_name: Option<String>,
    pub operation_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RootSummary {
    pub url: Option<String>,
    pub service_name: String,
    pub operation_name: String,
    pub duration: u64,
    pub error: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSpanCount {
    pub name: String,
    pub span_count: usize,
}

/// Share of a trace's cumulative span time spent in matching spans.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareSummary {
    pub duration: u64,
    pub duration_percent: f64,
    pub error: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceSummary {
    pub trace_id: String,
    pub services: Vec<ServiceSpanCount>,
    pub root: RootSummary,
    pub queried_service: Option<ShareSummary>,
    pub queried_operation: Option<ShareSummary>,
    /// Root span start in milliseconds
    pub start_time: u64,
    /// End-to-end duration in microseconds, at least 1
    pub duration: u64,
    pub error: bool,
}

fn cumulative_duration<'a>(spans: impl Iterator<Item = &'a Span>) -> u64 {
    spans.fold(0u64, |total, span| total.saturating_add(span.duration))
}

fn services_summary(trace: &Trace) -> Vec<ServiceSpanCount> {
    let mut services: Vec<ServiceSpanCount> = Vec::new();
    for span in &trace.spans {
        match services.iter_mut().find(|s| s.name == span.service_name.as_str()) {
            Some(entry) => entry.span_count += 1,
            None => services.push(ServiceSpanCount {
                name: span.service_name.to_string(),
                span_count: 1,
            }),
        }
    }
    services
}

fn share_of<F>(trace: &Trace, total: u64, matches: F) -> ShareSummary
where
    F: Fn(&Span) -> bool,
{
    let duration = cumulative_duration(trace.spans.iter().filter(|span| matches(span)));
    let duration_percent = if total == 0 {
        0.0
    } else {
        duration as f64 / total as f64 * 100.0
    };
    ShareSummary {
        duration,
        duration_percent,
        error: trace.spans.iter().filter(|span| matches(span)).any(Span::is_error),
    }
}

/// Summarizes one trace. Returns `None` for an empty trace.
pub fn summarize(trace: &Trace, query: &SearchQuery) -> Option<TraceSummary> {
    let root = trace.root_span().or_else(|| trace.spans.first())?;
    let total = cumulative_duration(trace.spans.iter());

    let queried_service = query
        .service_name
        .as_deref()
        .filter(|name| !name.is_empty())
        .map(|name| share_of(trace, total, |span| span.service_name.as_str() == name));
    let queried_operation = query
        .operation_name
        .as_deref()
        .filter(|name| !name.is_empty())
        .map(|name| share_of(trace, total, |span| span.operation_name == name));

    Some(TraceSummary {
        trace_id: trace.trace_id.to_string(),
        services: services_summary(trace),
        root: RootSummary {
            url: root.tag("url").map(str::to_string),
            service_name: root.service_name.to_string(),
            operation_name: root.operation_name.clone(),
            duration: root.duration,
            error: root.is_error(),
        },
        queried_service,
        queried_operation,
        start_time: root.start_time / 1000,
        duration: trace.end_to_end_duration(),
        error: root.is_error(),
    })
}

/// Summarizes every trace in order.
pub fn summarize_all(traces: &[Trace], query: &SearchQuery) -> Vec<TraceSummary> {
    traces.iter().filter_map(|trace| summarize(trace, query)).collect()
}
