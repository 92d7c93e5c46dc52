//! Parallel chunked bulk import of a dataset into one backend.

use std::{path::Path, time::Instant};

use tracing::{debug, info, warn};

use crate::{
    backend::GraphBackend,
    dataset::DatasetReader,
    errors::Result,
    graph::Edge,
    pool::{DEFAULT_WORKERS, WorkerPool},
};

#[derive(Clone, Debug)]
pub struct ImportConfig {
    pub workers: usize,
    /// Edges handed to one `insert_edges` call.
    pub batch_per_worker: usize,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            batch_per_worker: 1_000,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ImportSummary {
    pub read: usize,
    pub inserted: usize,
    pub elapsed_secs: f64,
}

/// Streams `path` into `backend`, one chunk of `workers * batch_per_worker`
/// edges at a time.
pub fn import_dataset<B>(backend: &B, path: &Path, config: &ImportConfig) -> Result<ImportSummary>
where
    B: GraphBackend + ?Sized,
{
    let mut reader = DatasetReader::open(path)?;
    import_from(backend, || reader.next_chunk(chunk_len(config)), config)
}

/// Imports already-loaded edges with the same chunking as [`import_dataset`].
pub fn import_edges<B>(backend: &B, edges: &[Edge], config: &ImportConfig) -> Result<ImportSummary>
where
    B: GraphBackend + ?Sized,
{
    let mut chunks = edges.chunks(chunk_len(config));
    import_from(backend, || Ok(chunks.next().map(<[Edge]>::to_vec).unwrap_or_default()), config)
}

fn chunk_len(config: &ImportConfig) -> usize {
    config.workers.max(1) * config.batch_per_worker.max(1)
}

fn import_from<B, F>(backend: &B, mut next_chunk: F, config: &ImportConfig) -> Result<ImportSummary>
where
    B: GraphBackend + ?Sized,
    F: FnMut() -> Result<Vec<Edge>>,
{
    let pool = WorkerPool::new(config.workers);
    let batch = config.batch_per_worker.max(1);
    let start = Instant::now();
    let mut summary = ImportSummary::default();

    loop {
        let chunk = next_chunk()?;
        if chunk.is_empty() {
            break;
        }
        summary.read += chunk.len();
        let batches: Vec<&[Edge]> = chunk.chunks(batch).collect();
        let results = pool.map(&batches, |edges| backend.insert_edges(edges));
        for result in results {
            match result {
                Ok(n) => summary.inserted += n,
                Err(err) if err.is_fatal_for_backend() => return Err(err),
                Err(err) => {
                    warn!(namespace = backend.namespace(), error = %err, "import batch failed");
                }
            }
        }
        debug!(namespace = backend.namespace(), read = summary.read, "import chunk drained");
    }

    summary.elapsed_secs = start.elapsed().as_secs_f64();
    info!(
        namespace = backend.namespace(),
        read = summary.read,
        inserted = summary.inserted,
        secs = summary.elapsed_secs,
        "import finished"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NativeBackend;

    #[test]
    fn test_import_edges_spans_many_chunks() {
        let graph = NativeBackend::in_memory("import").unwrap();
        let edges: Vec<Edge> = (0..1_000).map(|i| Edge::new(i, i + 1)).collect();
        let config = ImportConfig {
            workers: 4,
            batch_per_worker: 7,
        };
        let summary = import_edges(&graph, &edges, &config).unwrap();
        assert_eq!(summary.read, 1_000);
        assert_eq!(summary.inserted, 1_000);
        assert_eq!(graph.count_edges().unwrap(), 1_000);
    }

    #[test]
    fn test_import_into_stopped_engine_aborts() {
        let graph = NativeBackend::in_memory("gone").unwrap();
        graph.engine().shutdown();
        let err = import_edges(&graph, &[Edge::new(1, 2)], &ImportConfig::default()).unwrap_err();
        assert!(err.is_fatal_for_backend());
    }
}
