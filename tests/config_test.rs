//! Configuration system tests.

mod common;

use common::TestSpanBuilder;
use std::time::Duration;
use tracemap_lib::core::config::LogLevel;
use tracemap_lib::core::{Config, ConfigBuilder};
use tracemap_lib::service_map::{NodeKind, ServiceMapBuilder};

#[test]
fn test_default_config() {
    let config = Config::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.server.port, 8080);
    assert_eq!(config.source.trace_limit, 200);
    assert_eq!(config.source.lookback, Duration::from_secs(3600));
    assert_eq!(config.graph.uninstrumented_suffix, "-missing-trace");
    assert_eq!(config.logging.level, LogLevel::Info);
}

#[test]
fn test_config_builder() {
    let config = ConfigBuilder::new()
        .port(9090)
        .trace_limit(50)
        .log_level(LogLevel::Debug)
        .debug(true)
        .build()
        .unwrap();

    assert_eq!(config.server.port, 9090);
    assert_eq!(config.source.trace_limit, 50);
    assert_eq!(config.logging.level, LogLevel::Debug);
    assert!(config.debug);
}

#[test]
fn test_yaml_config() {
    let yaml = r#"
server:
  port: 5080
  enable_cors: false
source:
  trace_limit: 25
  lookback: 30m
logging:
  level: warn
graph:
  uninstrumented_suffix: "-dark"
span_types:
  gateway: null
  mesh:
    service_pattern: "^envoy-"
    id: "mesh-${tag:upstream_cluster}"
    name: "${tag:upstream_cluster}"
"#;

    let config = ConfigBuilder::new().from_yaml(yaml).unwrap().build().unwrap();

    assert_eq!(config.server.port, 5080);
    assert!(!config.server.enable_cors);
    assert_eq!(config.source.trace_limit, 25);
    assert_eq!(config.source.lookback, Duration::from_secs(30 * 60));
    assert_eq!(config.logging.level, LogLevel::Warn);
    assert_eq!(config.graph.uninstrumented_suffix, "-dark");
    // Unlisted sections keep their defaults
    assert_eq!(config.graph.uninstrumented_name, "Uninstrumented Service");
    assert!(config.span_types.gateway.is_none());
    assert!(config.span_types.edge.is_some());
}

#[test]
fn test_yaml_span_types_drive_classification() {
    let yaml = r#"
span_types:
  mesh:
    service_pattern: "^envoy-"
    id: "mesh-${tag:upstream_cluster}"
    name: "${tag:upstream_cluster}"
"#;
    let config = ConfigBuilder::new().from_yaml(yaml).unwrap().build().unwrap();
    let builder = ServiceMapBuilder::from_config(&config).unwrap();

    let span = TestSpanBuilder::new("t1", "1")
        .service("envoy-checkout")
        .tag("upstream_cluster", "payments")
        .build();
    let class = builder.classifier().classify(&span);
    assert_eq!(class.kind, NodeKind::Mesh);
    assert_eq!(class.id, "mesh-payments");
}

#[test]
fn test_invalid_configs_rejected() {
    assert!(ConfigBuilder::new().port(0).build().is_err());
    assert!(ConfigBuilder::new().trace_limit(0).build().is_err());

    let unknown_placeholder = r#"
span_types:
  edge:
    tag: edge.router
    id: "${hostname}"
    name: "${serviceName}"
"#;
    let err = ConfigBuilder::new()
        .from_yaml(unknown_placeholder)
        .unwrap()
        .build()
        .unwrap_err();
    assert_eq!(err.category(), "config");

    let bad_pattern = r#"
span_types:
  database:
    service_pattern: "(unclosed"
    id: "${serviceName}"
    name: "${serviceName}"
"#;
    assert!(ConfigBuilder::new().from_yaml(bad_pattern).unwrap().build().is_err());
}

#[test]
fn test_malformed_yaml_is_config_error() {
    let err = ConfigBuilder::new().from_yaml("server: [").err().unwrap();
    assert_eq!(err.category(), "config");
    assert!(err.to_string().starts_with("YAML error"));
}
