//! Span, trace and identifier types.

use crate::core::error::{Result, TracemapError};
use ahash::AHashMap;
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a trace
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub struct TraceId(String);

/// Unique identifier for a span within a trace
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SpanId(String);

/// Service name identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub struct ServiceName(String);

impl TraceId {
    /// Creates a new TraceId after validation
    pub fn new(id: String) -> Result<Self> {
        if id.is_empty() {
            return Err(TracemapError::InvalidSpan("TraceId cannot be empty".to_string()));
        }
        // UUIDs and 32-char OTEL hex ids both fit
        if id.len() > 64 {
            return Err(TracemapError::InvalidSpan(format!(
                "TraceId cannot exceed 64 characters, got {}",
                id.len()
            )));
        }
        Ok(TraceId(id))
    }

    /// Returns the string representation of the trace ID
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for TraceId {
    type Error = TracemapError;

    fn try_from(id: String) -> Result<Self> {
        Self::new(id)
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl SpanId {
    /// Creates a new SpanId after validation
    pub fn new(id: String) -> Result<Self> {
        if id.is_empty() {
            return Err(TracemapError::InvalidSpan("SpanId cannot be empty".to_string()));
        }
        if id.len() > 64 {
            return Err(TracemapError::InvalidSpan(format!(
                "SpanId cannot exceed 64 characters, got {}",
                id.len()
            )));
        }
        Ok(SpanId(id))
    }

    /// Returns the string representation of the span ID
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Span ids arrive as strings from OTEL exporters and as integers from
/// older clients.
struct SpanIdVisitor;

impl<'de> Visitor<'de> for SpanIdVisitor {
    type Value = SpanId;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a non-empty string or an unsigned integer span id")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<SpanId, E> {
        SpanId::new(v.to_string()).map_err(E::custom)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<SpanId, E> {
        SpanId::new(v.to_string()).map_err(E::custom)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<SpanId, E> {
        SpanId::new(v.to_string()).map_err(E::custom)
    }
}

impl<'de> Deserialize<'de> for SpanId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_any(SpanIdVisitor)
    }
}

impl ServiceName {
    /// Creates a new ServiceName after validation
    pub fn new(name: String) -> Result<Self> {
        if name.is_empty() {
            return Err(TracemapError::InvalidSpan("ServiceName cannot be empty".to_string()));
        }
        if name.len() > 255 {
            return Err(TracemapError::InvalidSpan(
                "ServiceName cannot exceed 255 characters".to_string(),
            ));
        }
        Ok(ServiceName(name))
    }

    /// Returns the string representation of the service name
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ServiceName {
    type Error = TracemapError;

    fn try_from(name: String) -> Result<Self> {
        Self::new(name)
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A key/value tag attached to a span
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    /// Tag key
    pub key: String,
    #[serde(deserialize_with = "scalar_as_string")]
    /// Tag value; non-string JSON scalars are stringified
    pub value: String,
}

fn scalar_as_string<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Null => Ok(String::new()),
        other => Ok(other.to_string()),
    }
}

/// Root spans are sent with a missing, null or empty parent id.
fn optional_parent<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<SpanId>, D::Error> {
    match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) if s.is_empty() => Ok(None),
        Some(serde_json::Value::String(s)) => SpanId::new(s).map(Some).map_err(de::Error::custom),
        Some(serde_json::Value::Number(n)) => {
            SpanId::new(n.to_string()).map(Some).map_err(de::Error::custom)
        },
        Some(other) => Err(de::Error::custom(format!("invalid parentSpanId: {}", other))),
    }
}

/// Represents a single span in a distributed trace
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Span {
    /// Unique identifier for the trace this span belongs to
    pub trace_id: TraceId,
    /// Unique identifier for this span
    pub span_id: SpanId,
    /// Parent span ID if this is a child span
    #[serde(default, deserialize_with = "optional_parent", skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<SpanId>,
    /// Name of the service that generated this span
    pub service_name: ServiceName,
    /// Name of the operation this span represents
    pub operation_name: String,
    /// Start time in microseconds since the unix epoch
    #[serde(default)]
    pub start_time: u64,
    /// Duration in microseconds
    #[serde(default)]
    pub duration: u64,
    /// Tags for span-type matching and error detection
    #[serde(default)]
    pub tags: Vec<Tag>,
}

impl Span {
    /// Creates a new span builder
    pub fn builder() -> SpanBuilder {
        SpanBuilder::default()
    }

    /// Returns the end time of the span in microseconds
    pub fn end_time(&self) -> u64 {
        self.start_time.saturating_add(self.duration)
    }

    /// Returns true if this span is a root span (has no parent)
    pub fn is_root(&self) -> bool {
        self.parent_span_id.is_none()
    }

    /// Gets a tag value by key. Tag keys are matched case-insensitively.
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|tag| tag.key.eq_ignore_ascii_case(key))
            .map(|tag| tag.value.as_str())
    }

    /// Returns true if the span carries an `error=true` tag
    pub fn is_error(&self) -> bool {
        self.tag("error") == Some("true")
    }
}

/// Builder for creating Span instances
#[derive(Default)]
pub struct SpanBuilder {
    trace_id: Option<TraceId>,
    span_id: Option<SpanId>,
    parent_span_id: Option<SpanId>,
    service_name: Option<ServiceName>,
    operation_name: Option<String>,
    start_time: u64,
    duration: u64,
    tags: Vec<Tag>,
}

impl SpanBuilder {
    /// Sets the trace id
    pub fn trace_id(mut self, trace_id: TraceId) -> Self {
        self.trace_id = Some(trace_id);
        self
    }

    /// Sets the span id
    pub fn span_id(mut self, span_id: SpanId) -> Self {
        self.span_id = Some(span_id);
        self
    }

    /// Sets the parent span id; omit for root spans
    pub fn parent_span_id(mut self, parent_span_id: SpanId) -> Self {
        self.parent_span_id = Some(parent_span_id);
        self
    }

    /// Sets the emitting service
    pub fn service_name(mut self, service_name: ServiceName) -> Self {
        self.service_name = Some(service_name);
        self
    }

    /// Sets the operation name
    pub fn operation_name<S: Into<String>>(mut self, operation_name: S) -> Self {
        self.operation_name = Some(operation_name.into());
        self
    }

    /// Sets the start time in microseconds since epoch
    pub fn start_time(mut self, start_time_us: u64) -> Self {
        self.start_time = start_time_us;
        self
    }

    /// Sets the duration in microseconds
    pub fn duration(mut self, duration_us: u64) -> Self {
        self.duration = duration_us;
        self
    }

    /// Appends a tag
    pub fn tag<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.tags.push(Tag {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    /// Builds the span, failing when a required field is unset
    pub fn build(self) -> Result<Span> {
        Ok(Span {
            trace_id: self
                .trace_id
                .ok_or_else(|| TracemapError::InvalidSpan("trace_id is required".to_string()))?,
            span_id: self
                .span_id
                .ok_or_else(|| TracemapError::InvalidSpan("span_id is required".to_string()))?,
            parent_span_id: self.parent_span_id,
            service_name: self
                .service_name
                .ok_or_else(|| TracemapError::InvalidSpan("service_name is required".to_string()))?,
            operation_name: self
                .operation_name
                .ok_or_else(|| TracemapError::InvalidSpan("operation_name is required".to_string()))?,
            start_time: self.start_time,
            duration: self.duration,
            tags: self.tags,
        })
    }
}

/// Represents a complete distributed trace
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trace {
    /// Unique identifier for this trace
    pub trace_id: TraceId,
    /// All spans that are part of this trace, in arrival order
    pub spans: Vec<Span>,
}

impl Trace {
    /// Creates a new trace from a collection of spans
    pub fn from_spans(trace_id: TraceId, spans: Vec<Span>) -> Result<Self> {
        if spans.is_empty() {
            return Err(TracemapError::InvalidSpan(
                "Trace must contain at least one span".to_string(),
            ));
        }
        if let Some(stray) = spans.iter().find(|span| span.trace_id != trace_id) {
            return Err(TracemapError::InvalidSpan(format!(
                "span {} belongs to trace {}, not {}",
                stray.span_id, stray.trace_id, trace_id
            )));
        }
        Ok(Trace { trace_id, spans })
    }

    /// Groups a flat span list into traces, ordered by first appearance.
    pub fn group(spans: Vec<Span>) -> Vec<Trace> {
        let mut index: AHashMap<TraceId, usize> = AHashMap::new();
        let mut traces: Vec<Trace> = Vec::new();

        for span in spans {
            match index.get(&span.trace_id) {
                Some(&i) => traces[i].spans.push(span),
                None => {
                    index.insert(span.trace_id.clone(), traces.len());
                    traces.push(Trace {
                        trace_id: span.trace_id.clone(),
                        spans: vec![span],
                    });
                },
            }
        }

        traces
    }

    /// Returns the root span if it exists
    pub fn root_span(&self) -> Option<&Span> {
        self.spans.iter().find(|span| span.is_root())
    }

    /// Earliest span start in microseconds
    pub fn start_time(&self) -> u64 {
        self.spans.iter().map(|span| span.start_time).min().unwrap_or(0)
    }

    /// Time from the earliest span start to the latest span end.
    /// Never returns zero so it can be used as a divisor.
    pub fn end_to_end_duration(&self) -> u64 {
        let latest_end = self.spans.iter().map(Span::end_time).max().unwrap_or(0);
        latest_end.saturating_sub(self.start_time()).max(1)
    }

    /// Returns true if any span belongs to the given service
    pub fn involves_service(&self, service_name: &str) -> bool {
        self.spans
            .iter()
            .any(|span| span.service_name.as_str() == service_name)
    }
}
