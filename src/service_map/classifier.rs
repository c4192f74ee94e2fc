//! Span classification.
//!
//! A span is resolved to a node identity by walking an ordered chain of
//! [`SpanMatcher`]s. The first matcher that accepts the span decides the node
//! id, display name and kind. The chain must end with a service matcher,
//! which accepts every span that reached it.

use crate::core::config::{MatcherRule, SpanTypesConfig};
use crate::core::{Result, Span, TracemapError};
use crate::service_map::model::NodeKind;
use regex::Regex;

/// Placeholder syntax used by id/name templates: `${...}`
const PLACEHOLDER: &str = r"\$\{([^}]*)\}";

/// Capability interface for one span type.
pub trait SpanMatcher: Send + Sync {
    /// Node kind produced by this matcher
    fn kind(&self) -> NodeKind;

    /// Returns true if the span belongs to this matcher's kind
    fn is_type(&self, span: &Span) -> bool;

    /// Unique node id for the span
    fn node_id(&self, span: &Span) -> String;

    /// Display name for the span's node
    fn node_name(&self, span: &Span) -> String;

    /// Database type label; only meaningful for database matchers
    fn database_type(&self, _span: &Span) -> Option<String> {
        None
    }
}

/// Resolved identity of a span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpanClass {
    pub id: String,
    pub name: String,
    pub kind: NodeKind,
    pub database_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    ServiceName,
    OperationName,
    Tag(String),
}

/// Compiled id/name template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    /// Parses a template such as `edge-${serviceName}` or `${tag:db.instance}`.
    pub fn parse(source: &str) -> Result<Self> {
        if source.is_empty() {
            return Err(TracemapError::config("span type template cannot be empty"));
        }

        let placeholder = Regex::new(PLACEHOLDER)?;
        let mut segments = Vec::new();
        let mut last = 0;
        for captures in placeholder.captures_iter(source) {
            let (Some(whole), Some(inner)) = (captures.get(0), captures.get(1)) else {
                continue;
            };
            if whole.start() > last {
                segments.push(Segment::Literal(source[last..whole.start()].to_string()));
            }
            segments.push(match inner.as_str() {
                "serviceName" => Segment::ServiceName,
                "operationName" => Segment::OperationName,
                other => match other.strip_prefix("tag:") {
                    Some(key) if !key.is_empty() => Segment::Tag(key.to_string()),
                    _ => {
                        return Err(TracemapError::config(format!(
                            "unknown placeholder ${{{}}} in template '{}'",
                            other, source
                        )))
                    },
                },
            });
            last = whole.end();
        }
        if last < source.len() {
            segments.push(Segment::Literal(source[last..].to_string()));
        }

        Ok(Template { segments })
    }

    /// Returns true when every tag the template references is present on the
    /// span and the rendered text would be non-empty.
    pub fn resolves(&self, span: &Span) -> bool {
        let mut empty = true;
        for segment in &self.segments {
            let value = match segment {
                Segment::Literal(text) => text.as_str(),
                Segment::ServiceName => span.service_name.as_str(),
                Segment::OperationName => span.operation_name.as_str(),
                Segment::Tag(key) => match span.tag(key) {
                    Some(value) => value,
                    None => return false,
                },
            };
            empty &= value.is_empty();
        }
        !empty
    }

    /// Renders the template for a span. Missing tags render as empty text.
    pub fn render(&self, span: &Span) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::ServiceName => out.push_str(span.service_name.as_str()),
                Segment::OperationName => out.push_str(&span.operation_name),
                Segment::Tag(key) => out.push_str(span.tag(key).unwrap_or_default()),
            }
        }
        out
    }
}

/// Matcher compiled from a declarative [`MatcherRule`].
#[derive(Debug, Clone)]
pub struct RuleMatcher {
    kind: NodeKind,
    service_pattern: Option<Regex>,
    operation_pattern: Option<Regex>,
    tag: Option<String>,
    tag_value: Option<String>,
    id: Template,
    name: Template,
    database_type_tag: Option<String>,
}

impl RuleMatcher {
    pub fn compile(kind: NodeKind, rule: &MatcherRule) -> Result<Self> {
        if rule.tag_value.is_some() && rule.tag.is_none() {
            return Err(TracemapError::config(format!(
                "{:?} span type sets tag_value without tag",
                kind
            )));
        }
        Ok(RuleMatcher {
            kind,
            service_pattern: rule.service_pattern.as_deref().map(Regex::new).transpose()?,
            operation_pattern: rule.operation_pattern.as_deref().map(Regex::new).transpose()?,
            tag: rule.tag.clone(),
            tag_value: rule.tag_value.clone(),
            id: Template::parse(&rule.id)?,
            name: Template::parse(&rule.name)?,
            database_type_tag: rule.database_type_tag.clone(),
        })
    }
}

impl SpanMatcher for RuleMatcher {
    fn kind(&self) -> NodeKind {
        self.kind
    }

    fn is_type(&self, span: &Span) -> bool {
        if let Some(pattern) = &self.service_pattern {
            if !pattern.is_match(span.service_name.as_str()) {
                return false;
            }
        }
        if let Some(pattern) = &self.operation_pattern {
            if !pattern.is_match(&span.operation_name) {
                return false;
            }
        }
        if let Some(key) = &self.tag {
            match (span.tag(key), &self.tag_value) {
                (None, _) => return false,
                (Some(actual), Some(expected)) if actual != expected => return false,
                _ => {},
            }
        }
        // A span that cannot name its node falls through to later matchers
        self.id.resolves(span) && self.name.resolves(span)
    }

    fn node_id(&self, span: &Span) -> String {
        self.id.render(span)
    }

    fn node_name(&self, span: &Span) -> String {
        self.name.render(span)
    }

    fn database_type(&self, span: &Span) -> Option<String> {
        let key = self.database_type_tag.as_deref()?;
        span.tag(key).map(str::to_string)
    }
}

/// Ordered matcher chain ending in the service fallback.
pub struct SpanClassifier {
    prioritized: Vec<Box<dyn SpanMatcher>>,
    fallback: Box<dyn SpanMatcher>,
}

impl std::fmt::Debug for SpanClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpanClassifier")
            .field("prioritized", &self.prioritized.iter().map(|m| m.kind()).collect::<Vec<_>>())
            .field("fallback", &self.fallback.kind())
            .finish()
    }
}

impl SpanClassifier {
    /// Wires a classifier from matchers in priority order.
    ///
    /// Fails when the chain does not end with exactly one service matcher.
    /// This is a deployment misconfiguration, so it is reported here instead
    /// of on the first span.
    pub fn new(mut matchers: Vec<Box<dyn SpanMatcher>>) -> Result<Self> {
        let fallback = match matchers.pop() {
            Some(last) if last.kind() == NodeKind::Service => last,
            _ => {
                return Err(TracemapError::config(
                    "missing required span type: service must be the last matcher",
                ))
            },
        };
        let services = 1 + matchers.iter().filter(|m| m.kind() == NodeKind::Service).count();
        if services > 1 {
            return Err(TracemapError::config(format!(
                "span type service configured {} times; it must appear once, last",
                services
            )));
        }
        if matchers.iter().any(|m| m.kind() == NodeKind::Uninstrumented) {
            return Err(TracemapError::config(
                "uninstrumented nodes are synthesized and cannot be matched from spans",
            ));
        }
        Ok(SpanClassifier {
            prioritized: matchers,
            fallback,
        })
    }

    /// Builds the chain edge, gateway, mesh, database, outbound, service
    /// from configuration, skipping unset optional kinds.
    pub fn from_config(config: &SpanTypesConfig) -> Result<Self> {
        let ordered = [
            (NodeKind::Edge, &config.edge),
            (NodeKind::Gateway, &config.gateway),
            (NodeKind::Mesh, &config.mesh),
            (NodeKind::Database, &config.database),
            (NodeKind::Outbound, &config.outbound),
            (NodeKind::Service, &config.service),
        ];

        let mut matchers: Vec<Box<dyn SpanMatcher>> = Vec::with_capacity(ordered.len());
        for (kind, rule) in ordered {
            if let Some(rule) = rule {
                matchers.push(Box::new(RuleMatcher::compile(kind, rule)?));
            }
        }

        Self::new(matchers)
    }

    /// Resolves the matcher responsible for a span.
    fn matcher_for(&self, span: &Span) -> &dyn SpanMatcher {
        self.prioritized
            .iter()
            .find(|matcher| matcher.is_type(span))
            .unwrap_or(&self.fallback)
            .as_ref()
    }

    /// Node id for a span
    pub fn node_id(&self, span: &Span) -> String {
        self.matcher_for(span).node_id(span)
    }

    /// Full identity for a span
    pub fn classify(&self, span: &Span) -> SpanClass {
        let matcher = self.matcher_for(span);
        let kind = matcher.kind();
        SpanClass {
            id: matcher.node_id(span),
            name: matcher.node_name(span),
            kind,
            database_type: if kind == NodeKind::Database {
                matcher.database_type(span)
            } else {
                None
            },
        }
    }
}
