//! Core domain models for Tracemap.
//!
//! This module contains the span model, the crate-wide error type and the
//! configuration that drives span classification and graph construction.

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use config::{
    Config, ConfigBuilder, GraphConfig, LogLevel, MatcherRule, ServerConfig, SourceConfig, SpanTypesConfig,
};
pub use error::{Result, TracemapError};
pub use types::{ServiceName, Span, SpanBuilder, SpanId, Tag, Trace, TraceId};
