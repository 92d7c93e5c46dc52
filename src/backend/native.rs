//! In-process adjacency-graph engine.
//!
//! A [`NativeEngine`] is a shared handle to one engine instance holding a
//! separate graph per namespace. [`NativeBackend`] is a view of one namespace
//! and is the graph-engine counterpart of the relational adapter.

use std::sync::Arc;

use ahash::{AHashMap, AHashSet};
use parking_lot::RwLock;
use tracing::{debug, warn};

use super::{GraphBackend, NodeSet, two_hop};
use crate::{
    errors::{GraphBenchError, Result},
    graph::{Edge, GraphDegree, NodeId, validate_edge},
};

type EdgeIds = AHashSet<i64>;

#[derive(Default)]
struct NamespaceGraph {
    edges: AHashMap<i64, Edge>,
    outgoing: AHashMap<NodeId, EdgeIds>,
    incoming: AHashMap<NodeId, EdgeIds>,
    /// Stored `(v_from, v_to)` to edge ids.
    pairs: AHashMap<(NodeId, NodeId), Vec<i64>>,
    next_id: i64,
}

impl NamespaceGraph {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn store(&mut self, mut edge: Edge) -> i64 {
        let id = match edge.id {
            Some(id) => {
                self.next_id = self.next_id.max(id);
                id
            }
            None => self.allocate_id(),
        };
        edge.id = Some(id);
        self.outgoing.entry(edge.v_from).or_default().insert(id);
        self.incoming.entry(edge.v_to).or_default().insert(id);
        self.pairs.entry((edge.v_from, edge.v_to)).or_default().push(id);
        self.edges.insert(id, edge);
        id
    }

    fn unlink(&mut self, id: i64) -> Option<Edge> {
        let edge = self.edges.remove(&id)?;
        detach(&mut self.outgoing, edge.v_from, id);
        detach(&mut self.incoming, edge.v_to, id);
        let key = (edge.v_from, edge.v_to);
        if let Some(ids) = self.pairs.get_mut(&key) {
            ids.retain(|stored| *stored != id);
            if ids.is_empty() {
                self.pairs.remove(&key);
            }
        }
        Some(edge)
    }

    fn pair_ids(&self, from: NodeId, to: NodeId) -> impl Iterator<Item = i64> + '_ {
        self.pairs.get(&(from, to)).into_iter().flatten().copied()
    }

    /// Lowest stored id among `ids` whose edge satisfies `keep`.
    fn first_matching<I, F>(&self, ids: I, keep: F) -> Option<i64>
    where
        I: IntoIterator<Item = i64>,
        F: Fn(&Edge) -> bool,
    {
        ids.into_iter()
            .filter(|id| self.edges.get(id).is_some_and(&keep))
            .min()
    }

    fn logical_match(&self, edge: &Edge) -> Option<i64> {
        let forward = self.pair_ids(edge.v_from, edge.v_to);
        let reverse = self.pair_ids(edge.v_to, edge.v_from);
        self.first_matching(forward.chain(reverse), |stored| {
            stored.same_logical_edge(edge)
        })
    }

    fn ids_from(&self, v: NodeId) -> Vec<i64> {
        let mut ids: Vec<i64> = self.outgoing.get(&v).into_iter().flatten().copied().collect();
        for id in self.incoming.get(&v).into_iter().flatten() {
            if let Some(edge) = self.edges.get(id) {
                if !edge.directed && edge.v_from != v {
                    ids.push(*id);
                }
            }
        }
        ids.sort_unstable();
        ids
    }

    fn ids_to(&self, v: NodeId) -> Vec<i64> {
        let mut ids: Vec<i64> = self.incoming.get(&v).into_iter().flatten().copied().collect();
        for id in self.outgoing.get(&v).into_iter().flatten() {
            if let Some(edge) = self.edges.get(id) {
                if !edge.directed && edge.v_to != v {
                    ids.push(*id);
                }
            }
        }
        ids.sort_unstable();
        ids
    }

    fn ids_related(&self, v: NodeId) -> Vec<i64> {
        let mut ids: Vec<i64> = self.outgoing.get(&v).into_iter().flatten().copied().collect();
        for id in self.incoming.get(&v).into_iter().flatten() {
            if self.edges.get(id).is_some_and(|edge| edge.v_from != v) {
                ids.push(*id);
            }
        }
        ids.sort_unstable();
        ids
    }

    fn collect(&self, ids: Vec<i64>) -> Vec<Edge> {
        ids.into_iter()
            .filter_map(|id| self.edges.get(&id).cloned())
            .collect()
    }

    fn degree(&self, ids: &[i64]) -> GraphDegree {
        let mut degree = GraphDegree::default();
        for id in ids {
            if let Some(edge) = self.edges.get(id) {
                degree.add(edge.weight);
            }
        }
        degree
    }

    fn neighbours_into(&self, v: NodeId, out: &mut NodeSet) {
        for id in self.outgoing.get(&v).into_iter().flatten() {
            if let Some(edge) = self.edges.get(id) {
                out.insert(edge.v_to);
            }
        }
        for id in self.incoming.get(&v).into_iter().flatten() {
            if let Some(edge) = self.edges.get(id) {
                out.insert(edge.v_from);
            }
        }
    }

    fn node_count(&self) -> u64 {
        let only_incoming = self
            .incoming
            .keys()
            .filter(|v| !self.outgoing.contains_key(*v))
            .count();
        (self.outgoing.len() + only_incoming) as u64
    }
}

fn detach(index: &mut AHashMap<NodeId, EdgeIds>, v: NodeId, id: i64) {
    if let Some(ids) = index.get_mut(&v) {
        ids.remove(&id);
        if ids.is_empty() {
            index.remove(&v);
        }
    }
}

struct EngineState {
    running: bool,
    graphs: AHashMap<String, NamespaceGraph>,
}

/// Cloneable handle to one engine instance.
#[derive(Clone)]
pub struct NativeEngine {
    state: Arc<RwLock<EngineState>>,
}

impl Default for NativeEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeEngine {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(EngineState {
                running: true,
                graphs: AHashMap::new(),
            })),
        }
    }

    /// Opens a handle scoped to `namespace`.
    pub fn graph(&self, namespace: &str) -> Result<NativeBackend> {
        let namespace = namespace.to_string();
        let mut state = self.state.write();
        if !state.running {
            return Err(GraphBenchError::unavailable("native engine is shut down"));
        }
        state.graphs.entry(namespace.clone()).or_default();
        Ok(NativeBackend {
            engine: self.clone(),
            namespace,
        })
    }

    pub fn namespaces(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state.read().graphs.keys().cloned().collect();
        names.sort();
        names
    }

    /// Stops the engine. Every handle fails with `BackendUnavailable` afterwards.
    pub fn shutdown(&self) {
        let mut state = self.state.write();
        state.running = false;
        state.graphs.clear();
    }

    pub fn is_running(&self) -> bool {
        self.state.read().running
    }
}

pub struct NativeBackend {
    engine: NativeEngine,
    namespace: String,
}

impl NativeBackend {
    pub fn in_memory(namespace: &str) -> Result<Self> {
        NativeEngine::new().graph(namespace)
    }

    pub fn engine(&self) -> &NativeEngine {
        &self.engine
    }

    fn read<T>(&self, f: impl FnOnce(&NamespaceGraph) -> T) -> Result<T> {
        let state = self.engine.state.read();
        if !state.running {
            return Err(GraphBenchError::unavailable("native engine is shut down"));
        }
        match state.graphs.get(&self.namespace) {
            Some(graph) => Ok(f(graph)),
            None => Ok(f(&NamespaceGraph::default())),
        }
    }

    fn write<T>(&self, f: impl FnOnce(&mut NamespaceGraph) -> Result<T>) -> Result<T> {
        let mut state = self.engine.state.write();
        if !state.running {
            return Err(GraphBenchError::unavailable("native engine is shut down"));
        }
        f(state.graphs.entry(self.namespace.clone()).or_default())
    }

    fn insert_many(&self, edges: &[Edge], merge: bool) -> Result<usize> {
        for edge in edges {
            validate_edge(edge)?;
        }
        self.write(|graph| {
            if !merge {
                let mut seen = AHashSet::new();
                let clash = edges.iter().filter_map(|e| e.id).find(|id| {
                    graph.edges.contains_key(id) || !seen.insert(*id)
                });
                if let Some(id) = clash {
                    warn!(
                        namespace = %self.namespace,
                        batch = edges.len(),
                        id,
                        "batch insert rejected on duplicate id"
                    );
                    return Ok(0);
                }
            }
            for edge in edges {
                if merge {
                    merge_edge(graph, edge);
                } else {
                    graph.store(edge.clone());
                }
            }
            Ok(edges.len())
        })
    }
}

/// Updates the weight of the matching stored edge or stores a new one.
fn merge_edge(graph: &mut NamespaceGraph, edge: &Edge) {
    let existing = match edge.id {
        Some(id) if graph.edges.contains_key(&id) => Some(id),
        Some(_) => None,
        None => graph.logical_match(edge),
    };
    match existing.and_then(|id| graph.edges.get_mut(&id)) {
        Some(stored) => stored.weight = edge.weight,
        None => {
            graph.store(edge.clone());
        }
    }
}

impl GraphBackend for NativeBackend {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn insert_edge(&self, edge: &Edge) -> Result<bool> {
        validate_edge(edge)?;
        self.write(|graph| {
            if let Some(id) = edge.id {
                if graph.edges.contains_key(&id) {
                    return Err(GraphBenchError::query(format!("edge id {id} already stored")));
                }
            }
            graph.store(edge.clone());
            Ok(true)
        })
    }

    fn insert_edges(&self, edges: &[Edge]) -> Result<usize> {
        self.insert_many(edges, false)
    }

    fn upsert_edge(&self, edge: &Edge) -> Result<bool> {
        validate_edge(edge)?;
        self.write(|graph| {
            merge_edge(graph, edge);
            Ok(true)
        })
    }

    fn upsert_edges(&self, edges: &[Edge]) -> Result<usize> {
        self.insert_many(edges, true)
    }

    fn remove_edge(&self, edge: &Edge) -> Result<bool> {
        self.write(|graph| {
            let target = match edge.id {
                Some(id) => Some(id),
                None => graph.first_matching(graph.pair_ids(edge.v_from, edge.v_to), |stored| {
                    stored.directed == edge.directed
                }),
            };
            Ok(target.and_then(|id| graph.unlink(id)).is_some())
        })
    }

    fn remove_edges(&self, edges: &[Edge]) -> Result<usize> {
        let mut removed = 0;
        for edge in edges {
            if self.remove_edge(edge)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn find_edge(&self, v_from: NodeId, v_to: NodeId) -> Result<Option<Edge>> {
        self.read(|graph| {
            let forward = graph.first_matching(graph.pair_ids(v_from, v_to), |_| true);
            let reverse = graph.first_matching(graph.pair_ids(v_to, v_from), |e| !e.directed);
            let id = match (forward, reverse) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            };
            id.and_then(|id| graph.edges.get(&id).cloned())
        })
    }

    fn find_edge_or_inv(&self, v1: NodeId, v2: NodeId) -> Result<Option<Edge>> {
        self.read(|graph| {
            let ids = graph.pair_ids(v1, v2).chain(graph.pair_ids(v2, v1));
            graph
                .first_matching(ids, |_| true)
                .and_then(|id| graph.edges.get(&id).cloned())
        })
    }

    fn edges_from(&self, v: NodeId) -> Result<Vec<Edge>> {
        self.read(|graph| graph.collect(graph.ids_from(v)))
    }

    fn edges_to(&self, v: NodeId) -> Result<Vec<Edge>> {
        self.read(|graph| graph.collect(graph.ids_to(v)))
    }

    fn edges_related(&self, v: NodeId) -> Result<Vec<Edge>> {
        self.read(|graph| graph.collect(graph.ids_related(v)))
    }

    fn count_following(&self, v: NodeId) -> Result<GraphDegree> {
        self.read(|graph| graph.degree(&graph.ids_from(v)))
    }

    fn count_followers(&self, v: NodeId) -> Result<GraphDegree> {
        self.read(|graph| graph.degree(&graph.ids_to(v)))
    }

    fn count_related(&self, v: NodeId) -> Result<GraphDegree> {
        self.read(|graph| graph.degree(&graph.ids_related(v)))
    }

    fn nodes_related(&self, v: NodeId) -> Result<NodeSet> {
        self.read(|graph| {
            let mut nodes = NodeSet::new();
            graph.neighbours_into(v, &mut nodes);
            nodes.remove(&v);
            nodes
        })
    }

    fn nodes_related_to_group(&self, vs: &[NodeId]) -> Result<NodeSet> {
        self.read(|graph| {
            let mut nodes = NodeSet::new();
            for v in vs {
                graph.neighbours_into(*v, &mut nodes);
            }
            for v in vs {
                nodes.remove(v);
            }
            nodes
        })
    }

    fn nodes_related_to_related(&self, v: NodeId, include_related: bool) -> Result<NodeSet> {
        two_hop(self, v, include_related)
    }

    fn remove_node(&self, v: NodeId) -> Result<usize> {
        self.write(|graph| {
            let ids = graph.ids_related(v);
            let removed = ids.into_iter().filter(|id| graph.unlink(*id).is_some()).count();
            Ok(removed)
        })
    }

    fn remove_all(&self) -> Result<usize> {
        self.write(|graph| {
            let removed = graph.edges.len();
            *graph = NamespaceGraph::default();
            debug!(namespace = %self.namespace, removed, "namespace cleared");
            Ok(removed)
        })
    }

    fn count_nodes(&self) -> Result<u64> {
        self.read(NamespaceGraph::node_count)
    }

    fn count_edges(&self) -> Result<u64> {
        self.read(|graph| graph.edges.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespaces_share_engine_without_interfering() {
        let engine = NativeEngine::new();
        let a = engine.graph("alpha").unwrap();
        let b = engine.graph("beta").unwrap();
        a.insert_edge(&Edge::new(1, 2)).unwrap();
        assert_eq!(a.count_edges().unwrap(), 1);
        assert_eq!(b.count_edges().unwrap(), 0);
        b.remove_all().unwrap();
        assert_eq!(a.count_edges().unwrap(), 1);
        assert_eq!(engine.namespaces(), vec!["alpha".to_string(), "beta".to_string()]);
    }

    #[test]
    fn test_shutdown_makes_handles_unavailable() {
        let engine = NativeEngine::new();
        let graph = engine.graph("g").unwrap();
        engine.shutdown();
        let err = graph.count_edges().unwrap_err();
        assert!(err.is_fatal_for_backend());
        assert!(engine.graph("other").is_err());
    }

    #[test]
    fn test_undirected_self_loop_counted_once() {
        let graph = NativeBackend::in_memory("loops").unwrap();
        graph.insert_edge(&Edge::undirected(3, 3).with_weight(2.0)).unwrap();
        assert_eq!(graph.count_following(3).unwrap(), GraphDegree::new(1, 2.0));
        assert_eq!(graph.count_related(3).unwrap(), GraphDegree::new(1, 2.0));
        assert!(graph.nodes_related(3).unwrap().is_empty());
        assert_eq!(graph.count_nodes().unwrap(), 1);
    }

    #[test]
    fn test_batch_with_duplicate_id_stores_nothing() {
        let graph = NativeBackend::in_memory("ids").unwrap();
        let batch = vec![Edge::new(1, 2).with_id(5), Edge::new(2, 3).with_id(5)];
        assert_eq!(graph.insert_edges(&batch).unwrap(), 0);
        assert_eq!(graph.count_edges().unwrap(), 0);
    }

    #[test]
    fn test_remove_node_drops_orphaned_vertices() {
        let graph = NativeBackend::in_memory("orphans").unwrap();
        graph
            .insert_edges(&[Edge::new(1, 2), Edge::new(1, 3), Edge::new(4, 5)])
            .unwrap();
        assert_eq!(graph.remove_node(1).unwrap(), 2);
        assert_eq!(graph.count_nodes().unwrap(), 2);
    }
}
