//! Crate-wide error type.

use thiserror::Error;

/// Errors raised while loading configuration, reading spans or building graphs
#[derive(Error, Debug)]
pub enum TracemapError {
    /// Invalid or incomplete configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// A graph element was constructed without a required property
    #[error("Schema error: {0}")]
    Schema(String),

    /// Span fields failed validation
    #[error("Invalid span data: {0}")]
    InvalidSpan(String),

    /// A span source could not deliver spans
    #[error("Span source error: {0}")]
    Source(String),

    /// Span input could not be decoded
    #[error("Parse error: {message}")]
    Parse {
        /// What failed to parse and why
        message: String,
    },

    /// Socket or server failure
    #[error("Network error: {0}")]
    Network(String),

    /// A matcher regex failed to compile
    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// Underlying I/O failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Malformed YAML configuration
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type alias for Tracemap operations
pub type Result<T> = std::result::Result<T, TracemapError>;

impl TracemapError {
    /// Creates a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a new schema error
    pub fn schema<S: Into<String>>(msg: S) -> Self {
        Self::Schema(msg.into())
    }

    /// Creates a new span source error
    pub fn source<S: Into<String>>(msg: S) -> Self {
        Self::Source(msg.into())
    }

    /// Creates a new network error
    pub fn network<S: Into<String>>(msg: S) -> Self {
        Self::Network(msg.into())
    }

    /// Creates a new parse error
    pub fn parse<S: Into<String>>(msg: S) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Returns true if retrying the failed operation may succeed.
    ///
    /// Graph extraction is a pure transform, so only errors raised while
    /// fetching spans or binding sockets qualify.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Source(_) | Self::Network(_) | Self::Io(_))
    }

    /// Returns the error category for metrics/logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config(_) | Self::Pattern(_) | Self::Yaml(_) => "config",
            Self::Schema(_) => "schema",
            Self::InvalidSpan(_) => "validation",
            Self::Source(_) => "source",
            Self::Network(_) => "network",
            Self::Io(_) => "io",
            Self::Serialization(_) | Self::Parse { .. } => "serialization",
        }
    }
}
