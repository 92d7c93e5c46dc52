//! Reproducible workload sampling.
//!
//! The dataset is read once. A seeded reservoir keeps just enough edges for
//! the largest task; every task is then drawn from that reservoir so repeated
//! runs over the same file probe the same edges and vertices.

use std::path::Path;

use ahash::AHashSet;
use rand::{Rng, SeedableRng, rngs::StdRng, seq::SliceRandom};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    dataset::DatasetReader,
    errors::{GraphBenchError, Result},
    graph::{Edge, NodeId},
};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SamplerConfig {
    pub count_finds: usize,
    pub count_analytics: usize,
    pub count_changes: usize,
    pub batch_size: usize,
    pub seed: u64,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            count_finds: 20_000,
            count_analytics: 300,
            count_changes: 10_000,
            batch_size: 100,
            seed: 42,
        }
    }
}

impl SamplerConfig {
    pub fn needed_samples(&self) -> usize {
        self.count_finds
            .max(self.count_analytics)
            .max(self.count_changes)
    }
}

/// Inputs of one benchmark pass. Edges carry no ids so they can be replayed
/// against any backend.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Workload {
    pub edges_to_query: Vec<Edge>,
    pub nodes_to_query: Vec<NodeId>,
    pub nodes_to_analyze: Vec<NodeId>,
    pub edges_to_change_by_one: Vec<Edge>,
    pub edges_to_change_batched: Vec<Vec<Edge>>,
    pub nodes_to_change_by_one: Vec<NodeId>,
}

impl Workload {
    pub fn is_empty(&self) -> bool {
        self.edges_to_query.is_empty() && self.nodes_to_query.is_empty()
    }
}

pub struct TaskSampler {
    config: SamplerConfig,
}

impl TaskSampler {
    pub fn new(config: SamplerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    pub fn sample_file<P: AsRef<Path>>(&self, path: P) -> Result<Workload> {
        let path = path.as_ref();
        let workload = self.sample_edges(DatasetReader::open(path)?)?;
        info!(
            dataset = %path.display(),
            finds = workload.edges_to_query.len(),
            changes = workload.edges_to_change_by_one.len(),
            "workload sampled"
        );
        Ok(workload)
    }

    /// Single pass of reservoir sampling over `edges`.
    pub fn sample_edges<I>(&self, edges: I) -> Result<Workload>
    where
        I: IntoIterator<Item = Result<Edge>>,
    {
        let capacity = self.config.needed_samples();
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut reservoir: Vec<Edge> = Vec::with_capacity(capacity.min(1 << 20));
        for (seen, edge) in edges.into_iter().enumerate() {
            let edge = edge?.without_id();
            if reservoir.len() < capacity {
                reservoir.push(edge);
            } else {
                let slot = rng.gen_range(0..=seen);
                if slot < capacity {
                    reservoir[slot] = edge;
                }
            }
        }
        self.split(reservoir, &mut rng)
    }

    /// Synthetic workload of random pairs over vertices `1..node_count`, for
    /// when no dataset file is at hand.
    pub fn sample_from_distribution(&self, node_count: NodeId) -> Result<Workload> {
        if node_count < 3 {
            return Err(GraphBenchError::exhausted(format!(
                "cannot draw distinct pairs from {node_count} vertices"
            )));
        }
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let needed = self.config.needed_samples();
        let mut buffer = Vec::with_capacity(needed);
        while buffer.len() < needed {
            let first = rng.gen_range(1..node_count);
            let second = rng.gen_range(1..node_count);
            if first != second {
                buffer.push(Edge::new(first, second));
            }
        }
        self.split(buffer, &mut rng)
    }

    fn split(&self, buffer: Vec<Edge>, rng: &mut StdRng) -> Result<Workload> {
        if buffer.is_empty() {
            return Err(GraphBenchError::exhausted("dataset contains no edges"));
        }
        let cfg = &self.config;
        let count_finds = clamp("count_finds", cfg.count_finds, buffer.len());
        let count_analytics = clamp("count_analytics", cfg.count_analytics, buffer.len());
        let count_changes = clamp("count_changes", cfg.count_changes, buffer.len());

        let edges_to_query: Vec<Edge> = buffer.choose_multiple(rng, count_finds).cloned().collect();
        let nodes_to_query = sample_nodes(&buffer, count_finds, rng);
        let nodes_to_analyze = sample_nodes(&buffer, count_analytics, rng);
        let nodes_to_change_by_one = sample_nodes(&buffer, count_changes, rng);
        let edges_to_change_by_one = buffer[..count_changes].to_vec();
        let edges_to_change_batched = edges_to_change_by_one
            .chunks(cfg.batch_size.max(1))
            .map(<[Edge]>::to_vec)
            .collect();

        Ok(Workload {
            edges_to_query,
            nodes_to_query,
            nodes_to_analyze,
            edges_to_change_by_one,
            edges_to_change_batched,
            nodes_to_change_by_one,
        })
    }
}

fn clamp(what: &str, requested: usize, available: usize) -> usize {
    if requested > available {
        warn!(what, requested, available, "dataset smaller than requested sample, clamping");
        available
    } else {
        requested
    }
}

/// Distinct endpoints of `count` random edges, one random end per edge.
fn sample_nodes(buffer: &[Edge], count: usize, rng: &mut StdRng) -> Vec<NodeId> {
    let picked: Vec<&Edge> = buffer.choose_multiple(rng, count).collect();
    let mut seen = AHashSet::with_capacity(picked.len());
    let mut nodes = Vec::with_capacity(picked.len());
    for edge in picked {
        let v = if rng.r#gen::<bool>() { edge.v_from } else { edge.v_to };
        if seen.insert(v) {
            nodes.push(v);
        }
    }
    nodes.shuffle(rng);
    nodes
}
