//! Datasets × backends orchestration.

use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

use crate::{
    backend::{GraphBackend, NativeEngine, SqliteBackend, SqliteConfig},
    config::{BackendDescriptor, BackendKind, BenchConfig, DatasetDescriptor},
    errors::{GraphBenchError, Result},
    import::import_dataset,
    runner::{BenchmarkRunner, Operation, PairReport, PairTarget, RunnerConfig},
    sampler::{TaskSampler, Workload},
    stats::{DumpGuard, Measurement, MeasurementKey, MeasurementStore},
};

/// Produces a contract-conforming handle for one backend/dataset pair.
pub trait BackendFactory {
    fn open(
        &self,
        backend: &BackendDescriptor,
        dataset: &DatasetDescriptor,
    ) -> Result<Box<dyn GraphBackend>>;
}

/// Opens SQLite files, private in-memory SQLite databases and namespaces of
/// one shared native engine.
pub struct DefaultFactory {
    base_dir: PathBuf,
    engine: NativeEngine,
}

impl DefaultFactory {
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
            engine: NativeEngine::new(),
        }
    }

    pub fn engine(&self) -> &NativeEngine {
        &self.engine
    }
}

impl BackendFactory for DefaultFactory {
    fn open(
        &self,
        backend: &BackendDescriptor,
        dataset: &DatasetDescriptor,
    ) -> Result<Box<dyn GraphBackend>> {
        let url = backend.resolve_url(&dataset.name, |var| std::env::var(var).ok());
        match backend.kind {
            BackendKind::Sqlite => {
                let mut path = PathBuf::from(&url);
                if path.is_relative() {
                    path = self.base_dir.join(path);
                }
                if let Some(dir) = path.parent() {
                    std::fs::create_dir_all(dir)
                        .map_err(|e| GraphBenchError::unavailable(format!("{}: {e}", dir.display())))?;
                }
                let config = SqliteConfig {
                    check_uniqueness: backend.check_uniqueness,
                    ..SqliteConfig::file_defaults()
                };
                Ok(Box::new(SqliteBackend::open(&path, &dataset.name, &config)?))
            }
            BackendKind::SqliteMemory => {
                let config = SqliteConfig {
                    check_uniqueness: backend.check_uniqueness,
                    pragmas: Vec::new(),
                };
                Ok(Box::new(SqliteBackend::in_memory(&dataset.name, &config)?))
            }
            BackendKind::Native => {
                let namespace = if url.is_empty() { dataset.name.clone() } else { url };
                Ok(Box::new(self.engine.graph(&namespace)?))
            }
        }
    }
}

/// Empties an in-memory handle when the pair is done with it.
struct ClearOnDrop<'h>(&'h dyn GraphBackend);

impl Drop for ClearOnDrop<'_> {
    fn drop(&mut self) {
        match self.0.remove_all() {
            Ok(removed) => debug!(namespace = self.0.namespace(), removed, "in-memory handle cleared"),
            Err(err) => warn!(namespace = self.0.namespace(), error = %err, "clearing in-memory handle failed"),
        }
    }
}

/// Outcome of a whole session.
#[derive(Debug, Default)]
pub struct SessionSummary {
    pub pairs: Vec<PairReport>,
    /// `(dataset, backend, error)` for pairs that could not run.
    pub failures: Vec<(String, String, String)>,
}

pub struct BenchSession<'a, F: BackendFactory> {
    config: &'a BenchConfig,
    factory: &'a F,
}

impl<'a, F: BackendFactory> BenchSession<'a, F> {
    pub fn new(config: &'a BenchConfig, factory: &'a F) -> Self {
        Self { config, factory }
    }

    /// Benchmarks every enabled pair. The store is dumped after each pair
    /// and once more when the session returns or unwinds. A process killed by
    /// a signal skips the final dump and loses at most the pair in flight.
    pub fn run(&self, store: &mut dyn MeasurementStore) -> Result<SessionSummary> {
        let mut store = DumpGuard::new(store);
        let runner_config = self.config.runner_config();
        let sampler = TaskSampler::new(self.config.sampler.clone());
        let mut summary = SessionSummary::default();

        for dataset in self.config.enabled_datasets() {
            let path = self.config.dataset_path(dataset);
            let workload = match sampler.sample_file(&path) {
                Ok(workload) => workload,
                Err(err) => {
                    error!(dataset = %dataset.name, error = %err, "cannot sample dataset, skipping");
                    for backend in self.config.enabled_backends() {
                        summary.failures.push((dataset.name.clone(), backend.name.clone(), err.to_string()));
                    }
                    continue;
                }
            };
            for backend in self.config.enabled_backends() {
                let outcome = self.run_pair(backend, dataset, &path, &workload, &runner_config, &mut *store);
                match outcome {
                    Ok(report) => summary.pairs.push(report),
                    Err(err) => {
                        error!(dataset = %dataset.name, backend = %backend.name, error = %err, "pair aborted");
                        summary.failures.push((dataset.name.clone(), backend.name.clone(), err.to_string()));
                    }
                }
                if let Err(err) = store.dump() {
                    warn!(error = %err, "intermediate dump failed");
                }
            }
        }
        Ok(summary)
    }

    fn run_pair(
        &self,
        backend: &BackendDescriptor,
        dataset: &DatasetDescriptor,
        path: &Path,
        workload: &Workload,
        runner_config: &RunnerConfig,
        store: &mut dyn MeasurementStore,
    ) -> Result<PairReport> {
        let target = PairTarget {
            dataset: &dataset.name,
            dataset_path: Some(path),
            backend: &backend.name,
            in_memory: backend.is_in_memory(),
        };
        let mut runner = BenchmarkRunner::new(runner_config, workload);
        if let Some(report) = runner.measured_report(&target, &*store) {
            info!(dataset = %dataset.name, backend = %backend.name, "pair already measured, not connecting");
            return Ok(report);
        }

        let handle = self.factory.open(backend, dataset)?;
        // In-memory handles do not outlive their pair, aborted or not.
        let _clear = target.in_memory.then(|| ClearOnDrop(handle.as_ref()));
        runner.run(handle.as_ref(), &target, store)
    }

    /// Imports every enabled dataset into each enabled persistent backend
    /// that is still empty, recording the import throughput.
    pub fn import_all(&self, store: &mut dyn MeasurementStore) -> Result<SessionSummary> {
        let mut store = DumpGuard::new(store);
        let import_config = self.config.import_config();
        let mut summary = SessionSummary::default();
        for dataset in self.config.enabled_datasets() {
            let path = self.config.dataset_path(dataset);
            for backend in self.config.enabled_backends().filter(|b| !b.is_in_memory()) {
                let result = self.factory.open(backend, dataset).and_then(|handle| {
                    if handle.count_edges()? > 0 {
                        info!(dataset = %dataset.name, backend = %backend.name, "already populated");
                        return Ok(None);
                    }
                    import_dataset(handle.as_ref(), &path, &import_config).map(Some)
                });
                match result {
                    Ok(Some(imported)) if imported.inserted > 0 => {
                        let key = MeasurementKey::new(
                            Operation::ImportCsv.name(),
                            &backend.name,
                            &dataset.name,
                            &self.config.device_name,
                        );
                        store.upsert(
                            key,
                            Measurement::new(
                                imported.inserted as u64,
                                std::time::Duration::from_secs_f64(imported.elapsed_secs),
                                None,
                            ),
                        );
                    }
                    Ok(_) => {}
                    Err(err) => {
                        error!(dataset = %dataset.name, backend = %backend.name, error = %err, "import failed");
                        summary.failures.push((dataset.name.clone(), backend.name.clone(), err.to_string()));
                    }
                }
            }
        }
        Ok(summary)
    }
}
