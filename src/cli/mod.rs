//! Command-line interface for Tracemap.
//!
//! `tracemap graph --spans spans.json --service checkout` prints the
//! dependency graph around `checkout` as JSON.

use crate::core::{Config, ConfigBuilder, Result, Trace, TracemapError};
use crate::search::{self, SearchQuery};
use crate::service_map::ServiceMapBuilder;
use crate::source::{self, JsonFileSource, ServiceInsights};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncReadExt;

/// Service dependency graphs from distributed-tracing spans
#[derive(Parser, Debug)]
#[command(name = "tracemap")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path (default: ~/.config/tracemap/config.yaml)
    #[arg(short, long, global = true, env = "TRACEMAP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true, env = "TRACEMAP_DEBUG")]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build the dependency graph around one service
    Graph {
        /// JSON span array, or `-` for stdin
        #[arg(long)]
        spans: PathBuf,

        /// Central service
        #[arg(long)]
        service: String,

        /// Mark the input as truncated by a trace limit
        #[arg(long)]
        trace_limit_reached: bool,

        /// Pretty-print the output
        #[arg(long)]
        pretty: bool,
    },

    /// Summarize every trace in a span file
    Summary {
        /// JSON span array, or `-` for stdin
        #[arg(long)]
        spans: PathBuf,

        /// Service to report the time share of
        #[arg(long)]
        service: Option<String>,

        /// Operation to report the time share of
        #[arg(long)]
        operation: Option<String>,
    },

    /// Serve the HTTP API over a span file
    Serve {
        /// JSON span array, re-read on every request
        #[arg(long)]
        spans: PathBuf,

        /// API port
        #[arg(long, env = "TRACEMAP_PORT")]
        port: Option<u16>,
    },

    /// Validate configuration and exit
    CheckConfig,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("tracemap").join("config.yaml"))
    }

    /// Load configuration with proper precedence:
    /// 1. CLI arguments (highest priority)
    /// 2. Config file
    /// 3. Defaults (lowest priority)
    pub async fn load_config(&self) -> Result<Config> {
        let mut builder = ConfigBuilder::new();

        let config_path = match &self.config {
            Some(path) => Some(path.clone()),
            None => Self::default_config_path().filter(|path| path.exists()),
        };

        if let Some(path) = config_path {
            match tokio::fs::read_to_string(&path).await {
                Ok(content) => {
                    builder = builder.from_yaml(&content)?;
                    tracing::info!("Loaded configuration from: {:?}", path);
                },
                Err(e) if self.config.is_some() => {
                    return Err(TracemapError::config(format!(
                        "Failed to read config file {:?}: {}",
                        path, e
                    )));
                },
                Err(_) => {
                    tracing::debug!("No config file found at {:?}, using defaults", path);
                },
            }
        }

        if let Command::Serve { port: Some(port), .. } = &self.command {
            builder = builder.port(*port);
        }

        builder.debug(self.debug).build()
    }

    /// Initialize logging. `RUST_LOG` wins, then `TRACEMAP_LOG_LEVEL`, then
    /// `level`; `--debug` forces debug. Logs go to stderr so graph JSON on
    /// stdout stays clean.
    pub fn init_logging(&self, level: &str) -> Result<()> {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

        let log_level = if self.debug {
            "debug".to_string()
        } else {
            std::env::var("TRACEMAP_LOG_LEVEL").unwrap_or_else(|_| level.to_string())
        };

        let filter = if self.debug {
            EnvFilter::new(log_level)
        } else {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level))
        };

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(self.debug)
            .compact();

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| TracemapError::config(format!("Failed to initialize logging: {}", e)))?;

        Ok(())
    }
}

async fn read_spans(path: &Path) -> Result<Vec<crate::core::Span>> {
    let content = if path == Path::new("-") {
        let mut content = String::new();
        tokio::io::stdin().read_to_string(&mut content).await?;
        content
    } else {
        tokio::fs::read_to_string(path).await.map_err(|e| {
            TracemapError::source(format!("failed to read spans from {}: {}", path.display(), e))
        })?
    };
    source::parse_spans(&content)
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{}", json);
    Ok(())
}

/// Execute the Tracemap application.
pub async fn execute(cli: Cli) -> Result<()> {
    let config = cli.load_config().await?;
    cli.init_logging(config.logging.level.as_str())?;

    match &cli.command {
        Command::CheckConfig => {
            println!("Configuration is valid!");
            println!("  API: {}:{}", config.server.bind_address, config.server.port);
            println!("  Trace limit: {}", config.source.trace_limit);
            println!("  Lookback: {:?}", config.source.lookback);
            Ok(())
        },
        Command::Graph {
            spans,
            service,
            trace_limit_reached,
            pretty,
        } => {
            let spans = read_spans(spans).await?;
            let builder = ServiceMapBuilder::from_config(&config)?;
            let graph = builder.build(&spans, service, *trace_limit_reached)?;
            print_json(&graph, *pretty)
        },
        Command::Summary {
            spans,
            service,
            operation,
        } => {
            let traces = Trace::group(read_spans(spans).await?);
            let query = SearchQuery {
                service_name: service.clone(),
                operation_name: operation.clone(),
            };
            print_json(&search::summarize_all(&traces, &query), true)
        },
        Command::Serve { spans, .. } => {
            let source = JsonFileSource::new(spans.clone(), config.source.trace_limit);
            tracing::info!("Serving spans from {}", source.path().display());
            let insights = ServiceInsights::from_config(Arc::new(source), &config)?;
            crate::api::start_server(insights, &config).await
        },
    }
}
