//! Span sources feeding the service graph.
//!
//! A [`SpanSource`] answers "which spans surround this service in this time
//! window". [`ServiceInsights`] pairs a source with a [`ServiceMapBuilder`]
//! to turn such a query into a graph.

use crate::core::{Config, Result, Span, Trace, TracemapError};
use crate::service_map::{ServiceGraph, ServiceMapBuilder};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Time-windowed query for one service. Times are microseconds since epoch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpanQuery {
    pub service: String,
    pub from: u64,
    pub to: u64,
}

impl SpanQuery {
    pub fn new(service: impl Into<String>, from: u64, to: u64) -> Result<Self> {
        let service = service.into();
        if service.is_empty() {
            return Err(TracemapError::source("service name is required"));
        }
        if from > to {
            return Err(TracemapError::source(format!(
                "invalid time window: from {} is after to {}",
                from, to
            )));
        }
        Ok(Self { service, from, to })
    }
}

/// Current wall clock time in microseconds since epoch.
pub fn now_micros() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_micros()).unwrap_or(0)
}

/// Spans returned for a query.
#[derive(Debug, Clone, Default)]
pub struct SpanBatch {
    pub spans: Vec<Span>,
    /// More traces matched than the source was allowed to return
    pub trace_limit_reached: bool,
}

/// Provider of fully hydrated spans.
#[async_trait]
pub trait SpanSource: Send + Sync {
    async fn fetch(&self, query: &SpanQuery) -> Result<SpanBatch>;

    fn name(&self) -> &str;
}

/// Keeps whole traces in which `query.service` has a span starting inside
/// the window. Traces are ranked by their latest matching span start, most
/// recent first, and at most `trace_limit` are returned.
pub fn select_traces(spans: Vec<Span>, query: &SpanQuery, trace_limit: usize) -> SpanBatch {
    let mut ranked: Vec<(u64, Trace)> = Trace::group(spans)
        .into_iter()
        .filter_map(|trace| {
            let latest = trace
                .spans
                .iter()
                .filter(|span| {
                    span.service_name.as_str() == query.service
                        && (query.from..=query.to).contains(&span.start_time)
                })
                .map(|span| span.start_time)
                .max()?;
            Some((latest, trace))
        })
        .collect();

    // Stable sort keeps input order among equally recent traces
    ranked.sort_by(|a, b| b.0.cmp(&a.0));

    let trace_limit_reached = ranked.len() > trace_limit;
    ranked.truncate(trace_limit);

    SpanBatch {
        spans: ranked.into_iter().flat_map(|(_, trace)| trace.spans).collect(),
        trace_limit_reached,
    }
}

/// Reads spans from a JSON array of span objects.
pub fn parse_spans(json: &str) -> Result<Vec<Span>> {
    serde_json::from_str(json).map_err(|e| TracemapError::parse(format!("invalid span array: {}", e)))
}

/// Span source backed by a JSON file, re-read on every fetch.
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
    trace_limit: usize,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>, trace_limit: usize) -> Self {
        Self {
            path: path.into(),
            trace_limit,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Result<Vec<Span>> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            TracemapError::source(format!("failed to read spans from {}: {}", self.path.display(), e))
        })?;
        parse_spans(&content)
    }
}

#[async_trait]
impl SpanSource for JsonFileSource {
    async fn fetch(&self, query: &SpanQuery) -> Result<SpanBatch> {
        let spans = self.load().await?;
        tracing::debug!("Read {} spans from {}", spans.len(), self.path.display());
        Ok(select_traces(spans, query, self.trace_limit))
    }

    fn name(&self) -> &str {
        "json-file"
    }
}

/// Span source over a fixed in-memory span set.
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    spans: Vec<Span>,
    trace_limit: usize,
}

impl InMemorySource {
    pub fn new(spans: Vec<Span>, trace_limit: usize) -> Self {
        Self { spans, trace_limit }
    }
}

#[async_trait]
impl SpanSource for InMemorySource {
    async fn fetch(&self, query: &SpanQuery) -> Result<SpanBatch> {
        Ok(select_traces(self.spans.clone(), query, self.trace_limit))
    }

    fn name(&self) -> &str {
        "in-memory"
    }
}

/// Builds service graphs from a span source.
#[derive(Clone)]
pub struct ServiceInsights {
    source: Arc<dyn SpanSource>,
    builder: Arc<ServiceMapBuilder>,
}

impl ServiceInsights {
    pub fn new(source: Arc<dyn SpanSource>, builder: ServiceMapBuilder) -> Self {
        Self {
            source,
            builder: Arc::new(builder),
        }
    }

    pub fn from_config(source: Arc<dyn SpanSource>, config: &Config) -> Result<Self> {
        Ok(Self::new(source, ServiceMapBuilder::from_config(config)?))
    }

    /// Fetch spans around `query.service` and build its graph.
    pub async fn for_service(&self, query: &SpanQuery) -> Result<ServiceGraph> {
        let batch = self.source.fetch(query).await?;
        tracing::info!(
            "Fetched {} spans for {} from {} source{}",
            batch.spans.len(),
            query.service,
            self.source.name(),
            if batch.trace_limit_reached { " (trace limit reached)" } else { "" }
        );
        self.builder
            .build(&batch.spans, &query.service, batch.trace_limit_reached)
    }

    pub fn source(&self) -> &Arc<dyn SpanSource> {
        &self.source
    }
}
