//! Tracemap - service dependency graphs from distributed-tracing spans.
//!
//! Given the spans of many traces surrounding one service, Tracemap builds a
//! directed graph of the components involved, flags dependency cycles,
//! classifies every node relative to the central service and marks
//! dependencies that never reported spans of their own.
//!
//! # Architecture
//!
//! - `core`: span model, errors and configuration
//! - `service_map`: span classification and graph construction
//! - `source`: span providers and the service insights entry point
//! - `search`: per-trace summaries for result lists
//! - `api`: HTTP API
//! - `cli`: command-line interface
//!
//! # Example
//!
//! ```no_run
//! use tracemap_lib::core::Config;
//! use tracemap_lib::service_map::ServiceMapBuilder;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let json = std::fs::read_to_string("spans.json")?;
//!     let spans = tracemap_lib::source::parse_spans(&json)?;
//!     let builder = ServiceMapBuilder::from_config(&Config::default())?;
//!     let graph = builder.build(&spans, "checkout", false)?;
//!     println!("{}", serde_json::to_string_pretty(&graph)?);
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod api;
pub mod cli;
pub mod core;
pub mod search;
pub mod service_map;
pub mod source;

// Re-export core types for convenience
pub use crate::core::{Config, Result};
