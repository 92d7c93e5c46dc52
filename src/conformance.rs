//! Self-test of a backend against a ten-edge graph with known answers.
//!
//! Clears the handle's namespace before and after, so only point it at a
//! scratch namespace.

use std::fmt;

use tracing::{info, warn};

use crate::{
    backend::{GraphBackend, NodeSet},
    errors::Result,
    graph::{Edge, GraphDegree},
    import::{ImportConfig, import_edges},
};

/// The reference graph: eight vertices, ten directed edges.
pub fn fixture() -> Vec<Edge> {
    [
        (1, 2, 4.0, 100),
        (2, 3, 20.0, 1100),
        (3, 4, 10.0, 1200),
        (4, 5, 3.0, 1300),
        (5, 3, 2.0, 1400),
        (4, 1, 5.0, 1500),
        (8, 6, 4.0, 1600),
        (8, 7, 2.0, 1700),
        (6, 1, 3.0, 1800),
        (7, 1, 2.0, 1900),
    ]
    .into_iter()
    .map(|(from, to, weight, id)| Edge::new(from, to).with_weight(weight).with_id(id))
    .collect()
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConformanceReport {
    pub namespace: String,
    pub checks: usize,
    pub failures: Vec<String>,
}

impl ConformanceReport {
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }

    fn check(&mut self, stage: &str, what: &str, ok: bool, detail: impl fmt::Display) {
        self.checks += 1;
        if !ok {
            self.failures.push(format!("{stage}: {what}: {detail}"));
        }
    }
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.passed() {
            write!(f, "{}: {} checks passed", self.namespace, self.checks)
        } else {
            writeln!(f, "{}: {} of {} checks failed", self.namespace, self.failures.len(), self.checks)?;
            for failure in &self.failures {
                writeln!(f, "  - {failure}")?;
            }
            Ok(())
        }
    }
}

/// Runs single, batched and bulk round trips of [`fixture`] and validates
/// the graph after each load.
pub fn run_conformance<B: GraphBackend + ?Sized>(backend: &B) -> Result<ConformanceReport> {
    let edges = fixture();
    let mut report = ConformanceReport {
        namespace: backend.namespace().to_string(),
        ..ConformanceReport::default()
    };

    backend.remove_all()?;
    expect_empty(backend, "cleaning", &mut report, true)?;

    for edge in &edges {
        backend.insert_edge(edge)?;
    }
    validate_contents(backend, "single operations", &edges, &mut report)?;
    for edge in &edges {
        backend.remove_edge(edge)?;
    }
    expect_empty(backend, "single operations", &mut report, false)?;

    let inserted = backend.insert_edges(&edges)?;
    report.check("batch operations", "inserted count", inserted == edges.len(), inserted);
    validate_contents(backend, "batch operations", &edges, &mut report)?;
    let removed = backend.remove_edges(&edges)?;
    report.check("batch operations", "removed count", removed == edges.len(), removed);
    expect_empty(backend, "batch operations", &mut report, false)?;

    backend.remove_all()?;
    let plain: Vec<Edge> = edges.iter().cloned().map(Edge::without_id).collect();
    let config = ImportConfig {
        workers: 2,
        batch_per_worker: 3,
    };
    let summary = import_edges(backend, &plain, &config)?;
    report.check("bulk insert", "imported count", summary.inserted == edges.len(), summary.inserted);
    validate_contents(backend, "bulk insert", &edges, &mut report)?;
    backend.remove_all()?;
    expect_empty(backend, "bulk insert", &mut report, true)?;

    if report.passed() {
        info!(namespace = %report.namespace, checks = report.checks, "conformance passed");
    } else {
        warn!(namespace = %report.namespace, failures = report.failures.len(), "conformance failed");
    }
    Ok(report)
}

fn expect_empty<B: GraphBackend + ?Sized>(
    backend: &B,
    stage: &str,
    report: &mut ConformanceReport,
    nodes_too: bool,
) -> Result<()> {
    let edges = backend.count_edges()?;
    report.check(stage, "count_edges == 0", edges == 0, edges);
    if nodes_too {
        let nodes = backend.count_nodes()?;
        report.check(stage, "count_nodes == 0", nodes == 0, nodes);
    }
    Ok(())
}

fn validate_contents<B: GraphBackend + ?Sized>(
    backend: &B,
    stage: &str,
    edges: &[Edge],
    report: &mut ConformanceReport,
) -> Result<()> {
    for edge in edges {
        let found = backend.find_edge(edge.v_from, edge.v_to)?;
        report.check(stage, "find_edge", found.is_some(), format!("{} -> {}", edge.v_from, edge.v_to));
    }

    let edge_count = backend.count_edges()?;
    report.check(stage, "count_edges == 10", edge_count == 10, edge_count);
    let node_count = backend.count_nodes()?;
    report.check(stage, "count_nodes == 8", node_count == 8, node_count);

    let degrees = [
        ("count_followers(1)", backend.count_followers(1)?, GraphDegree::new(3, 10.0)),
        ("count_following(1)", backend.count_following(1)?, GraphDegree::new(1, 4.0)),
        ("count_related(1)", backend.count_related(1)?, GraphDegree::new(4, 14.0)),
        ("count_followers(5)", backend.count_followers(5)?, GraphDegree::new(1, 3.0)),
        ("count_following(5)", backend.count_following(5)?, GraphDegree::new(1, 2.0)),
    ];
    for (what, got, expected) in degrees {
        report.check(stage, what, got == expected, format!("{got:?}"));
    }

    let neighbours = backend.nodes_related(1)?;
    report.check(stage, "nodes_related(1)", neighbours == set(&[2, 4, 6, 7]), format!("{neighbours:?}"));
    let two_hop = backend.nodes_related_to_related(8, false)?;
    report.check(stage, "nodes_related_to_related(8)", two_hop == set(&[1]), format!("{two_hop:?}"));
    Ok(())
}

fn set(ids: &[i64]) -> NodeSet {
    ids.iter().copied().collect()
}
