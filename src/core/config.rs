//! Configuration management for Tracemap.
//!
//! This module provides configuration handling with:
//! - YAML file support
//! - CLI argument overrides
//! - Validation and defaults
//!
//! The `span_types` section describes how spans are mapped onto graph nodes.
//! Each rule is a predicate plus id/name templates; the rules are compiled
//! into the matcher chain by [`crate::service_map::classifier`].

use crate::core::{Result, TracemapError};
use crate::service_map::classifier::SpanClassifier;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::time::Duration;

/// Complete configuration for Tracemap
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Span type matchers used to resolve nodes
    pub span_types: SpanTypesConfig,
    /// Graph construction settings
    pub graph: GraphConfig,
    /// Span source settings
    pub source: SourceConfig,
    /// HTTP server settings
    pub server: ServerConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Debug mode
    #[serde(skip)]
    pub debug: bool,
}

/// One matcher rule per span type, in priority order.
///
/// `service` is the terminal fallback and must be present.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpanTypesConfig {
    /// Edge router spans
    pub edge: Option<MatcherRule>,
    /// API gateway spans
    pub gateway: Option<MatcherRule>,
    /// Service mesh proxy spans
    pub mesh: Option<MatcherRule>,
    /// Database client spans
    pub database: Option<MatcherRule>,
    /// Outbound client call sites
    pub outbound: Option<MatcherRule>,
    /// Fallback for every remaining span
    pub service: Option<MatcherRule>,
}

/// Declarative span matcher.
///
/// All configured predicates must hold for the rule to match. Templates may
/// reference `${serviceName}`, `${operationName}` and `${tag:<key>}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatcherRule {
    /// Regex the span's service name must match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_pattern: Option<String>,
    /// Regex the span's operation name must match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_pattern: Option<String>,
    /// Tag key that must be present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    /// Exact value the tag must carry (requires `tag`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_value: Option<String>,
    /// Node id template
    pub id: String,
    /// Node display name template
    pub name: String,
    /// Tag holding the database type (database rules only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_type_tag: Option<String>,
}

/// Graph construction settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Appended to a mesh node id to form its uninstrumented placeholder id
    pub uninstrumented_suffix: String,
    /// Display name of synthesized placeholder nodes
    pub uninstrumented_name: String,
    /// Service name of synthesized placeholder nodes
    pub uninstrumented_service_name: String,
}

/// Span source settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Maximum number of traces handed to one extraction
    pub trace_limit: usize,
    /// Default time window when a request omits `from`
    #[serde(with = "humantime_serde")]
    pub lookback: Duration,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address for the API
    pub bind_address: IpAddr,
    /// API port
    pub port: u16,
    /// Enable permissive CORS headers
    pub enable_cors: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: LogLevel,
}

/// Log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Very verbose
    Trace,
    /// Per-stage graph statistics
    Debug,
    /// Lifecycle events
    Info,
    /// Policy fallbacks
    Warn,
    /// Failures only
    Error,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            span_types: SpanTypesConfig::default(),
            graph: GraphConfig::default(),
            source: SourceConfig::default(),
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
            debug: false,
        }
    }
}

impl MatcherRule {
    /// Rule matching every span that carries `key` (any value).
    pub fn tagged(key: &str, id: &str, name: &str) -> Self {
        MatcherRule {
            service_pattern: None,
            operation_pattern: None,
            tag: Some(key.to_string()),
            tag_value: None,
            id: id.to_string(),
            name: name.to_string(),
            database_type_tag: None,
        }
    }

    /// Restricts the rule to spans whose tag carries exactly `value`.
    pub fn with_tag_value(mut self, value: &str) -> Self {
        self.tag_value = Some(value.to_string());
        self
    }

    /// Rule matching every span; ids and names come from the service name.
    pub fn by_service_name() -> Self {
        MatcherRule {
            service_pattern: None,
            operation_pattern: None,
            tag: None,
            tag_value: None,
            id: "${serviceName}".to_string(),
            name: "${serviceName}".to_string(),
            database_type_tag: None,
        }
    }
}

impl Default for SpanTypesConfig {
    fn default() -> Self {
        let mut database = MatcherRule::tagged("db.type", "${tag:db.type}-${tag:db.instance}", "${tag:db.instance}");
        database.database_type_tag = Some("db.type".to_string());

        SpanTypesConfig {
            edge: Some(MatcherRule::tagged("edge.router", "edge-${serviceName}", "${serviceName}")),
            gateway: Some(MatcherRule::tagged(
                "gateway.route",
                "gateway-${serviceName}",
                "${serviceName}",
            )),
            mesh: Some(
                MatcherRule::tagged("component", "mesh-${tag:upstream_cluster}", "${tag:upstream_cluster}")
                    .with_tag_value("proxy"),
            ),
            database: Some(database),
            outbound: Some(
                MatcherRule::tagged("span.kind", "${serviceName}-outbound-${operationName}", "${operationName}")
                    .with_tag_value("client"),
            ),
            service: Some(MatcherRule::by_service_name()),
        }
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        GraphConfig {
            uninstrumented_suffix: "-missing-trace".to_string(),
            uninstrumented_name: "Uninstrumented Service".to_string(),
            uninstrumented_service_name: "unknown".to_string(),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig {
            trace_limit: 200,
            lookback: Duration::from_secs(3600), // 1 hour
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind_address: IpAddr::from([0, 0, 0, 0]),
            port: 8080,
            enable_cors: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: LogLevel::Info,
        }
    }
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Result<Self> {
        let config = Config::default();
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(TracemapError::config("server.port must be greater than 0"));
        }

        if self.source.trace_limit == 0 {
            return Err(TracemapError::config("source.trace_limit must be greater than 0"));
        }

        if self.source.lookback.is_zero() {
            return Err(TracemapError::config("source.lookback must be greater than 0"));
        }

        if self.graph.uninstrumented_suffix.is_empty() {
            return Err(TracemapError::config("graph.uninstrumented_suffix cannot be empty"));
        }

        if self.graph.uninstrumented_name.is_empty() {
            return Err(TracemapError::config("graph.uninstrumented_name cannot be empty"));
        }

        // Compiling the chain checks patterns, templates and the service fallback
        SpanClassifier::from_config(&self.span_types)?;

        Ok(())
    }
}

impl LogLevel {
    /// Convert to tracing filter string
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Configuration builder for programmatic construction
pub struct ConfigBuilder {
    config: Config,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigBuilder {
    /// Create a new builder with defaults
    pub fn new() -> Self {
        ConfigBuilder {
            config: Config::default(),
        }
    }

    /// Load configuration from YAML string
    pub fn from_yaml(mut self, yaml: &str) -> Result<Self> {
        self.config = serde_yaml::from_str(yaml)?;
        Ok(self)
    }

    /// Set API port
    pub fn port(mut self, port: u16) -> Self {
        self.config.server.port = port;
        self
    }

    /// Set trace limit
    pub fn trace_limit(mut self, limit: usize) -> Self {
        self.config.source.trace_limit = limit;
        self
    }

    /// Replace the span type rules
    pub fn span_types(mut self, span_types: SpanTypesConfig) -> Self {
        self.config.span_types = span_types;
        self
    }

    /// Set log level
    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.config.logging.level = level;
        self
    }

    /// Set debug mode
    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}
