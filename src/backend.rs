//! The graph-access contract every storage backend implements.
//!
//! The runner is written once against [`GraphBackend`] and only ever holds
//! `&dyn GraphBackend` / `Box<dyn GraphBackend>` handles. Aggregates are kept
//! apart from list-returning reads so each adapter can pick its cheapest path
//! (SQL `COUNT`/`SUM`, an adjacency walk) instead of materialising edges.

pub mod native;
pub mod sqlite;

pub use native::{NativeBackend, NativeEngine};
pub use sqlite::{SqliteBackend, SqliteConfig};

use ahash::AHashSet;

use crate::{
    errors::Result,
    graph::{Edge, GraphDegree, NodeId},
};

/// Sets of vertex ids returned by neighbourhood queries.
pub type NodeSet = AHashSet<NodeId>;

pub trait GraphBackend: Send + Sync {
    /// Namespace this handle reads and writes, used for logging.
    fn namespace(&self) -> &str;

    /// Appends an edge. Whether a duplicate `(v_from, v_to, directed)` is
    /// merged or stored twice is up to the backend.
    fn insert_edge(&self, edge: &Edge) -> Result<bool>;
    /// Inserts every edge or none of them; a rejected batch reports `Ok(0)`.
    fn insert_edges(&self, edges: &[Edge]) -> Result<usize>;
    /// Updates the weight of a matching stored edge, inserting it otherwise.
    /// A match is by `id` when the edge carries one, else by logical identity.
    fn upsert_edge(&self, edge: &Edge) -> Result<bool>;
    fn upsert_edges(&self, edges: &[Edge]) -> Result<usize>;
    /// Deletes the edge with the given `id`, or at most one edge matching
    /// `(v_from, v_to, directed)` without looking at the reversed pair.
    fn remove_edge(&self, edge: &Edge) -> Result<bool>;
    fn remove_edges(&self, edges: &[Edge]) -> Result<usize>;

    /// Matches an edge walkable from `v_from` to `v_to`.
    fn find_edge(&self, v_from: NodeId, v_to: NodeId) -> Result<Option<Edge>>;
    /// Matches an edge joining `v1` and `v2` in either orientation.
    fn find_edge_or_inv(&self, v1: NodeId, v2: NodeId) -> Result<Option<Edge>>;
    fn edges_from(&self, v: NodeId) -> Result<Vec<Edge>>;
    fn edges_to(&self, v: NodeId) -> Result<Vec<Edge>>;
    fn edges_related(&self, v: NodeId) -> Result<Vec<Edge>>;

    fn count_following(&self, v: NodeId) -> Result<GraphDegree>;
    fn count_followers(&self, v: NodeId) -> Result<GraphDegree>;
    fn count_related(&self, v: NodeId) -> Result<GraphDegree>;

    fn nodes_related(&self, v: NodeId) -> Result<NodeSet>;
    fn nodes_related_to_group(&self, vs: &[NodeId]) -> Result<NodeSet>;
    fn nodes_related_to_related(&self, v: NodeId, include_related: bool) -> Result<NodeSet>;

    /// Removes every edge touching `v`, returning how many went.
    fn remove_node(&self, v: NodeId) -> Result<usize>;
    /// Clears this handle's namespace only.
    fn remove_all(&self) -> Result<usize>;
    fn count_nodes(&self) -> Result<u64>;
    fn count_edges(&self) -> Result<u64>;
}

/// Two-hop neighbourhood derived from the one-hop primitives.
pub(crate) fn two_hop<B>(backend: &B, v: NodeId, include_related: bool) -> Result<NodeSet>
where
    B: GraphBackend + ?Sized,
{
    let related = backend.nodes_related(v)?;
    let mut group: Vec<NodeId> = related.iter().copied().collect();
    group.push(v);
    let mut result = backend.nodes_related_to_group(&group)?;
    if include_related {
        result.extend(related.iter().copied());
    }
    result.remove(&v);
    Ok(result)
}

impl<B> GraphBackend for &B
where
    B: GraphBackend + ?Sized,
{
    fn namespace(&self) -> &str {
        (**self).namespace()
    }

    fn insert_edge(&self, edge: &Edge) -> Result<bool> {
        (**self).insert_edge(edge)
    }

    fn insert_edges(&self, edges: &[Edge]) -> Result<usize> {
        (**self).insert_edges(edges)
    }

    fn upsert_edge(&self, edge: &Edge) -> Result<bool> {
        (**self).upsert_edge(edge)
    }

    fn upsert_edges(&self, edges: &[Edge]) -> Result<usize> {
        (**self).upsert_edges(edges)
    }

    fn remove_edge(&self, edge: &Edge) -> Result<bool> {
        (**self).remove_edge(edge)
    }

    fn remove_edges(&self, edges: &[Edge]) -> Result<usize> {
        (**self).remove_edges(edges)
    }

    fn find_edge(&self, v_from: NodeId, v_to: NodeId) -> Result<Option<Edge>> {
        (**self).find_edge(v_from, v_to)
    }

    fn find_edge_or_inv(&self, v1: NodeId, v2: NodeId) -> Result<Option<Edge>> {
        (**self).find_edge_or_inv(v1, v2)
    }

    fn edges_from(&self, v: NodeId) -> Result<Vec<Edge>> {
        (**self).edges_from(v)
    }

    fn edges_to(&self, v: NodeId) -> Result<Vec<Edge>> {
        (**self).edges_to(v)
    }

    fn edges_related(&self, v: NodeId) -> Result<Vec<Edge>> {
        (**self).edges_related(v)
    }

    fn count_following(&self, v: NodeId) -> Result<GraphDegree> {
        (**self).count_following(v)
    }

    fn count_followers(&self, v: NodeId) -> Result<GraphDegree> {
        (**self).count_followers(v)
    }

    fn count_related(&self, v: NodeId) -> Result<GraphDegree> {
        (**self).count_related(v)
    }

    fn nodes_related(&self, v: NodeId) -> Result<NodeSet> {
        (**self).nodes_related(v)
    }

    fn nodes_related_to_group(&self, vs: &[NodeId]) -> Result<NodeSet> {
        (**self).nodes_related_to_group(vs)
    }

    fn nodes_related_to_related(&self, v: NodeId, include_related: bool) -> Result<NodeSet> {
        (**self).nodes_related_to_related(v, include_related)
    }

    fn remove_node(&self, v: NodeId) -> Result<usize> {
        (**self).remove_node(v)
    }

    fn remove_all(&self) -> Result<usize> {
        (**self).remove_all()
    }

    fn count_nodes(&self) -> Result<u64> {
        (**self).count_nodes()
    }

    fn count_edges(&self) -> Result<u64> {
        (**self).count_edges()
    }
}
