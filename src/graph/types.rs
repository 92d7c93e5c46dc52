use serde::{Deserialize, Serialize};

use crate::errors::{GraphBenchError, Result};

pub type NodeId = i64;

fn default_weight() -> f64 {
    1.0
}

fn default_directed() -> bool {
    true
}

/// A weighted, optionally directed connection between two vertices.
///
/// `id` is assigned by the backend on insert; edges read from a dataset carry none.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Edge {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub v_from: NodeId,
    pub v_to: NodeId,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default = "default_directed")]
    pub directed: bool,
}

impl Edge {
    pub fn new(v_from: NodeId, v_to: NodeId) -> Self {
        Self {
            id: None,
            v_from,
            v_to,
            weight: 1.0,
            directed: true,
        }
    }

    pub fn undirected(v_from: NodeId, v_to: NodeId) -> Self {
        Self {
            directed: false,
            ..Self::new(v_from, v_to)
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn without_id(mut self) -> Self {
        self.id = None;
        self
    }

    /// Two edges are the same logical edge when endpoints and directedness
    /// match; undirected edges also match their reversed pair.
    pub fn same_logical_edge(&self, other: &Edge) -> bool {
        if self.directed != other.directed {
            return false;
        }
        if self.v_from == other.v_from && self.v_to == other.v_to {
            return true;
        }
        !self.directed && self.v_from == other.v_to && self.v_to == other.v_from
    }

    /// True when the edge joins `a` and `b` in either orientation.
    pub fn connects(&self, a: NodeId, b: NodeId) -> bool {
        (self.v_from == a && self.v_to == b) || (self.v_from == b && self.v_to == a)
    }

    /// True when the edge can be walked from `from` to `to`.
    pub fn is_traversable(&self, from: NodeId, to: NodeId) -> bool {
        (self.v_from == from && self.v_to == to)
            || (!self.directed && self.v_from == to && self.v_to == from)
    }

    pub fn touches(&self, v: NodeId) -> bool {
        self.v_from == v || self.v_to == v
    }

    /// The endpoint opposite to `v`, or `None` when `v` is not an endpoint.
    pub fn other_end(&self, v: NodeId) -> Option<NodeId> {
        if self.v_from == v {
            Some(self.v_to)
        } else if self.v_to == v {
            Some(self.v_from)
        } else {
            None
        }
    }
}

/// Edge count and weight sum returned by the aggregate operations.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct GraphDegree {
    pub count: u64,
    pub weight: f64,
}

impl GraphDegree {
    pub fn new(count: u64, weight: f64) -> Self {
        Self { count, weight }
    }

    pub fn of(edges: &[Edge]) -> Self {
        edges.iter().fold(Self::default(), |mut acc, edge| {
            acc.add(edge.weight);
            acc
        })
    }

    pub fn add(&mut self, weight: f64) {
        self.count += 1;
        self.weight += weight;
    }
}

pub fn validate_edge(edge: &Edge) -> Result<()> {
    if !edge.weight.is_finite() {
        return Err(GraphBenchError::invalid_input(format!(
            "edge {}->{} has non-finite weight",
            edge.v_from, edge.v_to
        )));
    }
    if let Some(id) = edge.id {
        if id < 0 {
            return Err(GraphBenchError::invalid_input("edge id must not be negative"));
        }
    }
    Ok(())
}

/// Maps a `SELECT id, v_from, v_to, weight, directed` row.
pub fn row_to_edge(row: &rusqlite::Row<'_>) -> std::result::Result<Edge, rusqlite::Error> {
    Ok(Edge {
        id: Some(row.get(0)?),
        v_from: row.get(1)?,
        v_to: row.get(2)?,
        weight: row.get(3)?,
        directed: row.get(4)?,
    })
}
