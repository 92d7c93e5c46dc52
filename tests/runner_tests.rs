use std::{
    fs,
    sync::atomic::{AtomicUsize, Ordering},
    thread,
    time::Duration,
};

use graphbench::{
    BenchmarkRunner, Edge, GraphBackend, GraphBenchError, GraphDegree, MeasurementKey,
    MeasurementStore, MemoryStore, NativeBackend, NodeId, NodeSet, Operation, OperationStatus,
    PairTarget, Result, RunnerConfig, SqliteBackend, SqliteConfig, Workload,
    runner::RunnerPhase,
};
use tempfile::tempdir;

/// Wraps a backend, counting calls and injecting delays or failures.
struct Instrumented<B> {
    inner: B,
    calls: AtomicUsize,
    delay: Duration,
    /// Extra per-call delay for named operations.
    slow: Vec<(&'static str, Duration)>,
    query_fail_on: Option<&'static str>,
    unavailable_on: Option<&'static str>,
}

impl<B: GraphBackend> Instrumented<B> {
    fn new(inner: B) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
            slow: Vec::new(),
            query_fail_on: None,
            unavailable_on: None,
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn gate(&self, op: &str) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        for (name, extra) in &self.slow {
            if *name == op {
                thread::sleep(*extra);
            }
        }
        if self.unavailable_on == Some(op) {
            return Err(GraphBenchError::unavailable("connection reset"));
        }
        if self.query_fail_on == Some(op) {
            return Err(GraphBenchError::query("syntax error"));
        }
        Ok(())
    }
}

impl<B: GraphBackend> GraphBackend for Instrumented<B> {
    fn namespace(&self) -> &str {
        self.inner.namespace()
    }
    fn insert_edge(&self, edge: &Edge) -> Result<bool> {
        self.gate("insert_edge")?;
        self.inner.insert_edge(edge)
    }
    fn insert_edges(&self, edges: &[Edge]) -> Result<usize> {
        self.gate("insert_edges")?;
        self.inner.insert_edges(edges)
    }
    fn upsert_edge(&self, edge: &Edge) -> Result<bool> {
        self.gate("upsert_edge")?;
        self.inner.upsert_edge(edge)
    }
    fn upsert_edges(&self, edges: &[Edge]) -> Result<usize> {
        self.gate("upsert_edges")?;
        self.inner.upsert_edges(edges)
    }
    fn remove_edge(&self, edge: &Edge) -> Result<bool> {
        self.gate("remove_edge")?;
        self.inner.remove_edge(edge)
    }
    fn remove_edges(&self, edges: &[Edge]) -> Result<usize> {
        self.gate("remove_edges")?;
        self.inner.remove_edges(edges)
    }
    fn find_edge(&self, v_from: NodeId, v_to: NodeId) -> Result<Option<Edge>> {
        self.gate("find_edge")?;
        self.inner.find_edge(v_from, v_to)
    }
    fn find_edge_or_inv(&self, v1: NodeId, v2: NodeId) -> Result<Option<Edge>> {
        self.gate("find_edge_or_inv")?;
        self.inner.find_edge_or_inv(v1, v2)
    }
    fn edges_from(&self, v: NodeId) -> Result<Vec<Edge>> {
        self.gate("edges_from")?;
        self.inner.edges_from(v)
    }
    fn edges_to(&self, v: NodeId) -> Result<Vec<Edge>> {
        self.gate("edges_to")?;
        self.inner.edges_to(v)
    }
    fn edges_related(&self, v: NodeId) -> Result<Vec<Edge>> {
        self.gate("edges_related")?;
        self.inner.edges_related(v)
    }
    fn count_following(&self, v: NodeId) -> Result<GraphDegree> {
        self.gate("count_following")?;
        self.inner.count_following(v)
    }
    fn count_followers(&self, v: NodeId) -> Result<GraphDegree> {
        self.gate("count_followers")?;
        self.inner.count_followers(v)
    }
    fn count_related(&self, v: NodeId) -> Result<GraphDegree> {
        self.gate("count_related")?;
        self.inner.count_related(v)
    }
    fn nodes_related(&self, v: NodeId) -> Result<NodeSet> {
        self.gate("nodes_related")?;
        self.inner.nodes_related(v)
    }
    fn nodes_related_to_group(&self, vs: &[NodeId]) -> Result<NodeSet> {
        self.gate("nodes_related_to_group")?;
        self.inner.nodes_related_to_group(vs)
    }
    fn nodes_related_to_related(&self, v: NodeId, include_related: bool) -> Result<NodeSet> {
        self.gate("nodes_related_to_related")?;
        self.inner.nodes_related_to_related(v, include_related)
    }
    fn remove_node(&self, v: NodeId) -> Result<usize> {
        self.gate("remove_node")?;
        self.inner.remove_node(v)
    }
    fn remove_all(&self) -> Result<usize> {
        self.gate("remove_all")?;
        self.inner.remove_all()
    }
    fn count_nodes(&self) -> Result<u64> {
        self.gate("count_nodes")?;
        self.inner.count_nodes()
    }
    fn count_edges(&self) -> Result<u64> {
        self.gate("count_edges")?;
        self.inner.count_edges()
    }
}

fn ring(len: i64) -> Vec<Edge> {
    (0..len).map(|i| Edge::new(i, (i + 1) % len)).collect()
}

fn workload_for(edges: &[Edge]) -> Workload {
    let nodes: Vec<NodeId> = edges.iter().map(|e| e.v_from).collect();
    Workload {
        edges_to_query: edges.to_vec(),
        nodes_to_query: nodes.clone(),
        nodes_to_analyze: nodes.iter().copied().take(10).collect(),
        edges_to_change_by_one: edges[..edges.len() / 2].to_vec(),
        edges_to_change_batched: edges[..edges.len() / 2].chunks(7).map(<[Edge]>::to_vec).collect(),
        nodes_to_change_by_one: nodes.iter().copied().take(5).collect(),
    }
}

fn populated_sqlite(edges: &[Edge]) -> SqliteBackend {
    let graph = SqliteBackend::in_memory("Ring", &SqliteConfig::default()).unwrap();
    graph.insert_edges(edges).unwrap();
    graph
}

fn persistent_target() -> PairTarget<'static> {
    PairTarget {
        dataset: "Ring",
        dataset_path: None,
        backend: "SQLite",
        in_memory: false,
    }
}

fn quick_config() -> RunnerConfig {
    RunnerConfig {
        device_name: "test-rig".to_string(),
        ..RunnerConfig::default()
    }
}

fn key(op: Operation, target: &PairTarget<'_>) -> MeasurementKey {
    MeasurementKey::new(op.name(), target.backend, target.dataset, "test-rig")
}

#[test]
fn test_second_run_makes_no_backend_calls() {
    let edges = ring(100);
    let backend = Instrumented::new(populated_sqlite(&edges));
    let workload = workload_for(&edges);
    let config = quick_config();
    let target = persistent_target();
    let mut store = MemoryStore::new();

    let report = BenchmarkRunner::new(&config, &workload)
        .run(&backend, &target, &mut store)
        .unwrap();
    assert_eq!(report.measured(), 10);
    assert_eq!(store.len(), 10);
    let first_calls = backend.calls();
    assert!(first_calls > 0);

    let report = BenchmarkRunner::new(&config, &workload)
        .run(&backend, &target, &mut store)
        .unwrap();
    assert_eq!(backend.calls(), first_calls);
    assert!(report.skipped.is_some());
    assert!(report.outcomes.iter().all(|(_, s)| *s == OperationStatus::Skipped));
}

#[test]
fn test_repeat_existing_measures_again() {
    let edges = ring(20);
    let backend = Instrumented::new(populated_sqlite(&edges));
    let workload = workload_for(&edges);
    let mut config = quick_config();
    let target = persistent_target();
    let mut store = MemoryStore::new();
    BenchmarkRunner::new(&config, &workload).run(&backend, &target, &mut store).unwrap();
    let calls = backend.calls();

    config.repeat_existing = true;
    let report = BenchmarkRunner::new(&config, &workload).run(&backend, &target, &mut store).unwrap();
    assert!(backend.calls() > calls);
    assert_eq!(report.measured(), 10);
}

#[test]
fn test_single_measured_operation_is_skipped_without_calls() {
    let edges = ring(30);
    let backend = Instrumented::new(populated_sqlite(&edges));
    let workload = workload_for(&edges);
    let config = quick_config();
    let target = persistent_target();
    let mut store = MemoryStore::new();
    store.upsert(
        key(Operation::FindIngoingEdges, &target),
        graphbench::Measurement::new(1, Duration::from_secs(1), Some(1)),
    );

    let report = BenchmarkRunner::new(&config, &workload).run(&backend, &target, &mut store).unwrap();
    assert_eq!(report.status(Operation::FindIngoingEdges), Some(&OperationStatus::Skipped));
    assert_eq!(store.get(&key(Operation::FindIngoingEdges, &target)).unwrap().operations, 1);
    assert_eq!(report.measured(), 9);
}

#[test]
fn test_time_budget_cuts_probe_short() {
    let edges = ring(10_000);
    let mut backend = Instrumented::new(populated_sqlite(&edges));
    backend.delay = Duration::from_millis(2);
    let mut workload = workload_for(&edges);
    workload.edges_to_change_by_one.truncate(5);
    workload.edges_to_change_batched.truncate(2);
    let config = RunnerConfig {
        max_seconds_per_query: Duration::from_millis(40),
        ..quick_config()
    };
    let target = persistent_target();
    let mut store = MemoryStore::new();

    let report = BenchmarkRunner::new(&config, &workload).run(&backend, &target, &mut store).unwrap();
    let measured = store.get(&key(Operation::FindIngoingEdges, &target)).unwrap();
    assert!(measured.operations > 0);
    assert!(measured.operations < 10_000);
    assert!(matches!(report.status(Operation::FindEdge), Some(OperationStatus::Measured(_))));
}

#[test]
fn test_zero_items_records_nothing() {
    let edges = ring(10);
    let backend = populated_sqlite(&edges);
    let mut workload = workload_for(&edges);
    workload.nodes_to_query.clear();
    let config = quick_config();
    let target = persistent_target();
    let mut store = MemoryStore::new();

    let report = BenchmarkRunner::new(&config, &workload).run(&backend, &target, &mut store).unwrap();
    assert_eq!(report.status(Operation::FindIngoingEdges), Some(&OperationStatus::Empty));
    assert!(!store.contains(&key(Operation::FindIngoingEdges, &target)));
    assert!(store.contains(&key(Operation::FindEdge, &target)));
}

#[test]
fn test_query_failure_moves_on_to_next_operation() {
    let edges = ring(10);
    let mut backend = Instrumented::new(populated_sqlite(&edges));
    backend.query_fail_on = Some("edges_to");
    let workload = workload_for(&edges);
    let config = quick_config();
    let target = persistent_target();
    let mut store = MemoryStore::new();

    let report = BenchmarkRunner::new(&config, &workload).run(&backend, &target, &mut store).unwrap();
    assert!(matches!(report.status(Operation::FindIngoingEdges), Some(OperationStatus::Failed(_))));
    assert!(!store.contains(&key(Operation::FindIngoingEdges, &target)));
    assert!(store.contains(&key(Operation::FindConnectedEdges, &target)));
    assert!(store.contains(&key(Operation::UpsertEdgesBatch, &target)));
}

#[test]
fn test_unavailable_backend_aborts_pair_keeping_earlier_results() {
    let edges = ring(10);
    let mut backend = Instrumented::new(populated_sqlite(&edges));
    backend.unavailable_on = Some("count_related");
    let workload = workload_for(&edges);
    let config = quick_config();
    let target = persistent_target();
    let mut store = MemoryStore::new();

    let err = BenchmarkRunner::new(&config, &workload)
        .run(&backend, &target, &mut store)
        .unwrap_err();
    assert!(err.is_fatal_for_backend());
    assert!(store.contains(&key(Operation::FindFriends, &target)));
    assert!(!store.contains(&key(Operation::CountFriends, &target)));
    assert!(!store.contains(&key(Operation::RemoveEdge, &target)));
}

#[test]
fn test_reads_report_found_counts() {
    let edges = ring(50);
    let backend = populated_sqlite(&edges);
    let mut workload = workload_for(&edges);
    workload.edges_to_query.push(Edge::new(1_000, 2_000));
    let config = quick_config();
    let target = persistent_target();
    let mut store = MemoryStore::new();

    BenchmarkRunner::new(&config, &workload).run(&backend, &target, &mut store).unwrap();
    let find = store.get(&key(Operation::FindEdge, &target)).unwrap();
    assert_eq!(find.operations, 51);
    assert_eq!(find.found, Some(50));
    let ingoing = store.get(&key(Operation::FindIngoingEdges, &target)).unwrap();
    assert_eq!(ingoing.found, Some(50));
    assert_eq!(store.get(&key(Operation::RemoveEdge, &target)).unwrap().found, None);
}

#[test]
fn test_write_pairs_leave_edge_count_unchanged() {
    let edges = ring(40);
    let backend = populated_sqlite(&edges);
    let workload = workload_for(&edges);
    let config = quick_config();
    let target = persistent_target();
    let mut store = MemoryStore::new();

    let mut runner = BenchmarkRunner::new(&config, &workload);
    runner.run(&backend, &target, &mut store).unwrap();
    assert_eq!(runner.phase(), RunnerPhase::Done);
    assert_eq!(backend.count_edges().unwrap(), 40);
}

#[test]
fn test_clearing_phase_empties_the_namespace() {
    let edges = ring(40);
    let backend = populated_sqlite(&edges);
    let workload = workload_for(&edges);
    let config = RunnerConfig {
        remove_all_afterwards: true,
        include_analytics: true,
        ..quick_config()
    };
    let target = persistent_target();
    let mut store = MemoryStore::new();

    let report = BenchmarkRunner::new(&config, &workload).run(&backend, &target, &mut store).unwrap();
    assert_eq!(report.outcomes.len(), 13);
    assert!(store.contains(&key(Operation::FindFriendsOfFriends, &target)));
    assert!(store.contains(&key(Operation::RemoveVertex, &target)));
    assert!(store.contains(&key(Operation::RemoveAll, &target)));
    assert_eq!(backend.count_edges().unwrap(), 0);
}

#[test]
fn test_empty_persistent_backend_is_skipped() {
    let backend = SqliteBackend::in_memory("Ring", &SqliteConfig::default()).unwrap();
    let workload = workload_for(&ring(10));
    let config = quick_config();
    let mut store = MemoryStore::new();
    let report = BenchmarkRunner::new(&config, &workload)
        .run(&backend, &persistent_target(), &mut store)
        .unwrap();
    assert!(report.skipped.is_some());
    assert!(store.is_empty());
}

#[test]
fn test_in_memory_backend_is_populated_from_dataset() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ring.csv");
    let edges = ring(60);
    let csv: String = edges.iter().map(|e| format!("{},{}\n", e.v_from, e.v_to)).collect();
    fs::write(&path, csv).unwrap();
    let workload = workload_for(&edges);
    let config = quick_config();
    let target = PairTarget {
        dataset: "Ring",
        dataset_path: Some(&path),
        backend: "Native",
        in_memory: true,
    };
    let mut store = MemoryStore::new();

    let backend = NativeBackend::in_memory("Ring").unwrap();
    let report = BenchmarkRunner::new(&config, &workload).run(&backend, &target, &mut store).unwrap();
    let import = store.get(&key(Operation::ImportCsv, &target)).unwrap();
    assert_eq!(import.operations, 60);
    assert_eq!(report.measured(), 11);
    assert_eq!(store.get(&key(Operation::FindEdge, &target)).unwrap().found, Some(60));

    // One read missing: the import runs again but is not re-recorded.
    let mut store_missing_one = MemoryStore::new();
    for (k, m) in store.entries() {
        if k.operation != Operation::CountFollowers.name() {
            store_missing_one.upsert(k.clone(), m.clone());
        }
    }
    let fresh = NativeBackend::in_memory("Ring").unwrap();
    let report = BenchmarkRunner::new(&config, &workload)
        .run(&fresh, &target, &mut store_missing_one)
        .unwrap();
    assert_eq!(report.status(Operation::ImportCsv), Some(&OperationStatus::Skipped));
    match report.status(Operation::CountFollowers) {
        Some(OperationStatus::Measured(m)) => assert_eq!(m.found, Some(60)),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(fresh.count_edges().unwrap(), 60);
}

#[test]
fn test_found_counts_queries_that_matched() {
    let star: Vec<Edge> = (1..=10).map(|i| Edge::new(i, 0)).collect();
    let backend = populated_sqlite(&star);
    let workload = Workload {
        edges_to_query: star.clone(),
        nodes_to_query: vec![0, 99],
        nodes_to_analyze: vec![3],
        ..Workload::default()
    };
    let config = RunnerConfig {
        include_analytics: true,
        ..quick_config()
    };
    let target = persistent_target();
    let mut store = MemoryStore::new();

    BenchmarkRunner::new(&config, &workload).run(&backend, &target, &mut store).unwrap();
    for op in [
        Operation::FindIngoingEdges,
        Operation::FindConnectedEdges,
        Operation::FindFriends,
        Operation::CountFriends,
        Operation::CountFollowers,
    ] {
        let measured = store.get(&key(op, &target)).unwrap();
        assert_eq!(measured.operations, 2, "{op}");
        assert_eq!(measured.found, Some(1), "{op}");
    }
    let fof = store.get(&key(Operation::FindFriendsOfFriends, &target)).unwrap();
    assert_eq!((fof.operations, fof.found), (1, Some(1)));
}

#[test]
fn test_slow_upserts_still_restore_every_removed_edge() {
    let edges = ring(400);
    let mut backend = Instrumented::new(populated_sqlite(&edges));
    backend.slow = vec![
        ("remove_edge", Duration::from_millis(1)),
        ("upsert_edge", Duration::from_millis(4)),
        ("remove_edges", Duration::from_millis(1)),
        ("upsert_edges", Duration::from_millis(4)),
    ];
    let workload = workload_for(&edges);
    let config = RunnerConfig {
        max_seconds_per_query: Duration::from_millis(100),
        ..quick_config()
    };
    let target = persistent_target();
    let mut store = MemoryStore::new();

    BenchmarkRunner::new(&config, &workload).run(&backend, &target, &mut store).unwrap();
    let removed = store.get(&key(Operation::RemoveEdge, &target)).unwrap().operations;
    let upserted = store.get(&key(Operation::UpsertEdge, &target)).unwrap().operations;
    assert!(removed < 200);
    assert!(upserted >= removed);
    assert_eq!(backend.count_edges().unwrap(), 400);
}

#[test]
fn test_removed_edges_come_back_when_upsert_is_already_measured() {
    let edges = ring(40);
    let backend = populated_sqlite(&edges);
    let workload = workload_for(&edges);
    let config = quick_config();
    let target = persistent_target();
    let mut store = MemoryStore::new();
    for op in [Operation::UpsertEdge, Operation::UpsertEdgesBatch] {
        store.upsert(
            key(op, &target),
            graphbench::Measurement::new(1, Duration::from_secs(1), None),
        );
    }

    let report = BenchmarkRunner::new(&config, &workload).run(&backend, &target, &mut store).unwrap();
    assert!(matches!(report.status(Operation::RemoveEdge), Some(OperationStatus::Measured(_))));
    assert_eq!(report.status(Operation::UpsertEdge), Some(&OperationStatus::Skipped));
    assert_eq!(backend.count_edges().unwrap(), 40);
}
