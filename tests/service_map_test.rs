//! End-to-end graph construction tests.

mod common;

use common::{link, node, span, TestSpanBuilder};
use pretty_assertions::assert_eq;
use std::collections::BTreeSet;
use tracemap_lib::core::{Config, Span, SpanTypesConfig};
use tracemap_lib::service_map::classifier::SpanClassifier;
use tracemap_lib::service_map::{
    extract_nodes_and_links, GraphRequest, NodeKind, Relationship, ServiceGraph, ServiceMapBuilder,
};

fn build(spans: &[Span], service: &str) -> ServiceGraph {
    ServiceMapBuilder::from_config(&Config::default())
        .unwrap()
        .build(spans, service, false)
        .unwrap()
}

#[test]
fn test_single_span_graph() {
    let request: GraphRequest = serde_json::from_str(
        r#"{
            "serviceName": "A",
            "spans": [{"spanId": 1, "parentSpanId": null, "serviceName": "A",
                       "operationName": "op1", "traceId": "t1", "duration": 100}]
        }"#,
    )
    .unwrap();

    let graph = extract_nodes_and_links(&request).unwrap();
    let json = serde_json::to_value(&graph).unwrap();

    assert_eq!(json["nodes"].as_array().unwrap().len(), 1);
    assert_eq!(json["nodes"][0]["relationship"], "central");
    assert_eq!(json["nodes"][0]["count"], 1);
    assert!(graph.links.is_empty());
    assert_eq!(
        json["summary"],
        serde_json::json!({
            "violations": {},
            "hasViolations": false,
            "tracesConsidered": 1,
            "traceLimitReached": false
        })
    );
}

#[test]
fn test_two_service_cycle() {
    let spans = vec![span("1", None, "A"), span("2", Some("1"), "B"), span("3", Some("2"), "A")];
    let graph = build(&spans, "A");

    assert_eq!(graph.nodes.len(), 2);
    assert_eq!(graph.links.len(), 2);
    assert!(link(&graph, "A", "B").is_some());
    assert!(link(&graph, "B", "A").is_some());
    assert!(node(&graph, "A").invalid_cycle_detected);
    assert!(node(&graph, "B").invalid_cycle_detected);
    assert!(graph.links.iter().all(|l| l.invalid_cycle_detected));
    assert_eq!(graph.summary.violations.cycles, Some(1));
    assert!(graph.summary.has_violations);
    assert_eq!(node(&graph, "A").count, 2);
}

#[test]
fn test_relationships_around_central_service() {
    // web -> checkout -> payments, web -> search -> index
    let spans = vec![
        span("1", None, "web"),
        span("2", Some("1"), "checkout"),
        span("3", Some("2"), "payments"),
        span("4", Some("1"), "search"),
        span("5", Some("4"), "index"),
        TestSpanBuilder::new("t2", "9").service("batch").build(),
    ];
    let graph = build(&spans, "checkout");

    assert_eq!(node(&graph, "checkout").relationship, Some(Relationship::Central));
    assert_eq!(node(&graph, "web").relationship, Some(Relationship::Upstream));
    assert_eq!(node(&graph, "payments").relationship, Some(Relationship::Downstream));
    assert_eq!(node(&graph, "search").relationship, Some(Relationship::Distributary));
    assert_eq!(node(&graph, "index").relationship, Some(Relationship::Distributary));
    assert_eq!(node(&graph, "batch").relationship, Some(Relationship::Unknown));
    assert_eq!(graph.summary.traces_considered, 2);
    assert!(!graph.summary.has_violations);
}

#[test]
fn test_dead_end_mesh_gets_uninstrumented_placeholder() {
    let spans = vec![
        span("1", None, "checkout"),
        TestSpanBuilder::new("t1", "2")
            .service("istio-proxy")
            .parent("1")
            .tag("component", "proxy")
            .tag("upstream_cluster", "payments")
            .build(),
    ];
    let graph = build(&spans, "checkout");

    let mesh = node(&graph, "mesh-payments");
    assert_eq!(mesh.kind, NodeKind::Mesh);
    assert_eq!(mesh.name, "payments");

    let placeholder = node(&graph, "mesh-payments-missing-trace");
    assert_eq!(placeholder.kind, NodeKind::Uninstrumented);
    assert_eq!(placeholder.name, "Uninstrumented Service");
    assert_eq!(placeholder.service_name, "unknown");
    assert_eq!(placeholder.relationship, Some(Relationship::Downstream));

    let synthesized = link(&graph, "mesh-payments", "mesh-payments-missing-trace").unwrap();
    assert!(synthesized.is_uninstrumented);
    assert_eq!(graph.summary.violations.uninstrumented, Some(1));
    assert_eq!(graph.summary.violations.cycles, None);
    assert!(graph.summary.has_violations);
    // Placeholders do not add traces
    assert_eq!(graph.summary.traces_considered, 1);
}

#[test]
fn test_dead_end_outbound_is_relabelled() {
    let spans = vec![
        span("1", None, "checkout"),
        TestSpanBuilder::new("t1", "2")
            .service("checkout")
            .operation("charge")
            .parent("1")
            .tag("span.kind", "client")
            .build(),
    ];
    let graph = build(&spans, "checkout");

    let outbound = node(&graph, "checkout-outbound-charge");
    assert_eq!(outbound.kind, NodeKind::Uninstrumented);
    assert_eq!(outbound.name, "charge");
    assert_eq!(outbound.relationship, Some(Relationship::Downstream));
    assert_eq!(graph.nodes.len(), 2);
    assert_eq!(graph.summary.violations.uninstrumented, Some(1));
}

#[test]
fn test_instrumented_outbound_keeps_its_kind() {
    let spans = vec![
        span("1", None, "checkout"),
        TestSpanBuilder::new("t1", "2")
            .service("checkout")
            .operation("charge")
            .parent("1")
            .tag("span.kind", "client")
            .build(),
        span("3", Some("2"), "payments"),
    ];
    let graph = build(&spans, "checkout");

    assert_eq!(node(&graph, "checkout-outbound-charge").kind, NodeKind::Outbound);
    assert!(link(&graph, "checkout-outbound-charge", "payments").is_some());
    assert!(!graph.summary.has_violations);
}

#[test]
fn test_database_node_carries_type() {
    let spans = vec![
        span("1", None, "orders"),
        TestSpanBuilder::new("t1", "2")
            .service("orders")
            .parent("1")
            .tag("db.type", "postgresql")
            .tag("db.instance", "orders-db")
            .build(),
    ];
    let graph = build(&spans, "orders");

    let database = node(&graph, "postgresql-orders-db");
    assert_eq!(database.kind, NodeKind::Database);
    assert_eq!(database.name, "orders-db");
    assert_eq!(database.database_type.as_deref(), Some("postgresql"));
}

#[test]
fn test_unresolved_parent_produces_no_link() {
    let spans = vec![span("2", Some("not-fetched"), "B"), span("3", Some("2"), "C")];
    let graph = build(&spans, "B");

    assert_eq!(graph.nodes.len(), 2);
    assert_eq!(graph.links.len(), 1);
    assert!(link(&graph, "B", "C").is_some());
}

#[test]
fn test_self_parented_span() {
    let request: GraphRequest = serde_json::from_str(
        r#"{
            "serviceName": "mock-service",
            "spans": [{"spanId": 1, "parentSpanId": 1, "serviceName": "mock-service",
                       "operationName": "operation", "traceId": "t1", "tags": []}]
        }"#,
    )
    .unwrap();

    let graph = extract_nodes_and_links(&request).unwrap();
    assert_eq!(graph.nodes.len(), 1);
    assert!(graph.links.is_empty());
    assert_eq!(graph.summary.traces_considered, 1);
}

#[test]
fn test_output_is_deterministic() {
    let spans = vec![
        span("1", None, "web"),
        span("2", Some("1"), "checkout"),
        span("3", Some("2"), "payments"),
        span("4", Some("2"), "inventory"),
        span("5", Some("3"), "web"),
    ];
    let first = serde_json::to_string(&build(&spans, "checkout")).unwrap();
    let second = serde_json::to_string(&build(&spans, "checkout")).unwrap();
    assert_eq!(first, second);

    let ids: Vec<String> = build(&spans, "checkout").nodes.into_iter().map(|n| n.id).collect();
    assert_eq!(ids, vec!["web", "checkout", "payments", "inventory"]);
}

#[test]
fn test_every_node_gets_a_relationship() {
    let spans = vec![
        span("1", None, "a"),
        span("2", Some("1"), "b"),
        span("3", Some("2"), "c"),
        span("4", Some("3"), "a"),
        TestSpanBuilder::new("t2", "5").service("lonely").build(),
    ];
    for service in ["a", "b", "c", "lonely", "absent"] {
        let graph = build(&spans, service);
        assert!(graph.nodes.iter().all(|n| n.relationship.is_some()));
        let centrals = graph
            .nodes
            .iter()
            .filter(|n| n.relationship == Some(Relationship::Central))
            .count();
        assert_eq!(centrals, usize::from(service != "absent"));
    }
}

#[test]
fn test_missing_service_matcher_is_rejected_at_wiring() {
    let mut config = Config::default();
    config.span_types.service = None;
    let err = ServiceMapBuilder::from_config(&config).unwrap_err();
    assert_eq!(err.category(), "config");
}

#[test]
fn test_trace_limit_flag_is_passed_through() {
    let graph = ServiceMapBuilder::from_config(&Config::default())
        .unwrap()
        .build(&[span("1", None, "a")], "a", true)
        .unwrap();
    assert!(graph.summary.trace_limit_reached);
    assert!(!graph.summary.has_violations);
}

#[test]
fn test_demo_spans_with_demo_config() {
    let config = tracemap_lib::core::ConfigBuilder::new()
        .from_yaml(include_str!("../demos/config.yaml"))
        .unwrap()
        .build()
        .unwrap();
    let spans = tracemap_lib::source::parse_spans(include_str!("../demos/spans.json")).unwrap();
    let graph = ServiceMapBuilder::from_config(&config)
        .unwrap()
        .build(&spans, "checkout", false)
        .unwrap();

    let ids: Vec<&str> = graph.nodes.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(
        ids,
        vec![
            "web",
            "checkout",
            "postgresql-carts",
            "mesh-payments",
            "web-outbound-recommend",
            "mesh-payments-missing-trace",
        ]
    );

    assert_eq!(node(&graph, "checkout").relationship, Some(Relationship::Central));
    // Database spans emitted by the central service are demoted to downstream
    assert_eq!(node(&graph, "postgresql-carts").relationship, Some(Relationship::Downstream));
    assert_eq!(node(&graph, "web").relationship, Some(Relationship::Upstream));
    assert_eq!(
        node(&graph, "web-outbound-recommend").relationship,
        Some(Relationship::Distributary)
    );
    assert_eq!(node(&graph, "web-outbound-recommend").kind, NodeKind::Uninstrumented);
    assert_eq!(graph.summary.violations.uninstrumented, Some(2));
    assert_eq!(graph.summary.violations.cycles, None);
    assert_eq!(graph.links.len(), 5);
}

#[test]
fn test_spans_missing_template_tags_fall_back_to_service_nodes() {
    let spans = vec![
        span("1", None, "orders"),
        TestSpanBuilder::new("t1", "2")
            .service("orders")
            .parent("1")
            .tag("db.type", "redis")
            .build(),
        TestSpanBuilder::new("t1", "3")
            .service("istio-proxy")
            .parent("1")
            .tag("component", "proxy")
            .build(),
        TestSpanBuilder::new("t1", "4")
            .service("orders")
            .operation("")
            .parent("1")
            .tag("span.kind", "client")
            .build(),
    ];
    let graph = build(&spans, "orders");

    let ids: Vec<&str> = graph.nodes.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(ids, vec!["orders", "istio-proxy"]);
    assert_eq!(node(&graph, "orders").count, 3);
    assert_eq!(node(&graph, "istio-proxy").kind, NodeKind::Service);
    assert!(link(&graph, "orders", "istio-proxy").is_some());
    assert!(!graph.summary.has_violations);
}

#[test]
fn test_cycles_sharing_an_edge_are_counted_separately() {
    // Links a->b, b->c, c->a, a->c; both c->a spans merge into one link
    let spans = vec![
        span("1", None, "a"),
        span("2", Some("1"), "b"),
        span("3", Some("2"), "c"),
        span("4", Some("3"), "a"),
        span("5", Some("4"), "c"),
        span("6", Some("5"), "a"),
    ];
    let graph = build(&spans, "a");

    assert_eq!(graph.links.len(), 4);
    assert_eq!(link(&graph, "c", "a").map(|l| l.count), Some(2));
    assert_eq!(graph.summary.violations.cycles, Some(2));
    assert!(graph.nodes.iter().all(|n| n.invalid_cycle_detected));
}

#[test]
fn test_node_and_trace_accounting_across_traces() {
    let proxy = |trace: &str, id: &str, parent: &str, service: &str, cluster: &str| {
        TestSpanBuilder::new(trace, id)
            .service(service)
            .parent(parent)
            .tag("component", "proxy")
            .tag("upstream_cluster", cluster)
            .build()
    };
    let spans = vec![
        TestSpanBuilder::new("t1", "1").service("web").build(),
        TestSpanBuilder::new("t1", "2").service("checkout").parent("1").build(),
        proxy("t1", "3", "2", "checkout", "payments"),
        TestSpanBuilder::new("t1", "4")
            .service("checkout")
            .parent("2")
            .tag("db.type", "postgresql")
            .tag("db.instance", "carts")
            .build(),
        TestSpanBuilder::new("t2", "10").service("web").build(),
        TestSpanBuilder::new("t2", "11").service("checkout").parent("10").build(),
        proxy("t2", "12", "11", "checkout", "payments"),
        proxy("t2", "13", "11", "checkout", "inventory"),
        TestSpanBuilder::new("t2", "14").service("inventory").parent("13").build(),
        TestSpanBuilder::new("t3", "20").service("batch").build(),
        proxy("t3", "21", "20", "batch", "ledger"),
        // Same trace id as the first request, seen again later
        TestSpanBuilder::new("t1", "30").service("web").parent("1").operation("retry").build(),
    ];
    let graph = build(&spans, "checkout");

    let synthesized: BTreeSet<&str> = graph
        .links
        .iter()
        .filter(|l| l.is_uninstrumented)
        .map(|l| l.target.as_str())
        .collect();
    assert_eq!(
        synthesized,
        BTreeSet::from(["mesh-ledger-missing-trace", "mesh-payments-missing-trace"])
    );

    let classifier = SpanClassifier::from_config(&SpanTypesConfig::default()).unwrap();
    let classified: BTreeSet<String> = spans.iter().map(|s| classifier.node_id(s)).collect();
    let span_derived: BTreeSet<String> = graph
        .nodes
        .iter()
        .filter(|n| !synthesized.contains(n.id.as_str()))
        .map(|n| n.id.clone())
        .collect();
    assert_eq!(graph.nodes.len() - synthesized.len(), classified.len());
    assert_eq!(span_derived, classified);

    let traces: BTreeSet<&str> = graph
        .nodes
        .iter()
        .filter(|n| !synthesized.contains(n.id.as_str()))
        .flat_map(|n| n.trace_ids.iter().map(|t| t.as_str()))
        .collect();
    assert_eq!(graph.summary.traces_considered, traces.len());
    assert_eq!(graph.summary.traces_considered, 3);
    assert_eq!(graph.summary.violations.uninstrumented, Some(2));
}
