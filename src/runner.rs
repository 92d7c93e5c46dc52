//! Benchmark runner for one `(dataset, backend)` pair.
//!
//! Operations run in a fixed order, each bounded by a cooperative wall-clock
//! budget. Anything already present in the measurement store is skipped
//! before the backend is touched.

use std::{
    cell::Cell,
    fmt,
    path::Path,
    time::{Duration, Instant},
};

use tracing::{debug, info, warn};

use crate::{
    backend::GraphBackend,
    errors::Result,
    import::{ImportConfig, import_dataset},
    sampler::Workload,
    stats::{Measurement, MeasurementKey, MeasurementStore},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    ImportCsv,
    FindEdge,
    FindIngoingEdges,
    FindConnectedEdges,
    FindFriends,
    CountFriends,
    CountFollowers,
    FindFriendsOfFriends,
    RemoveEdge,
    UpsertEdge,
    RemoveEdgesBatch,
    UpsertEdgesBatch,
    RemoveVertex,
    RemoveAll,
}

impl Operation {
    /// Name under which results are stored.
    pub fn name(self) -> &'static str {
        match self {
            Operation::ImportCsv => "Sequential Writes: Import CSV",
            Operation::FindEdge => "Random Reads: Find Specific Edge",
            Operation::FindIngoingEdges => "Random Reads: Find Ingoing Edges",
            Operation::FindConnectedEdges => "Random Reads: Find Connected Edges",
            Operation::FindFriends => "Random Reads: Find Friends",
            Operation::CountFriends => "Random Reads: Count Friends",
            Operation::CountFollowers => "Random Reads: Count Followers",
            Operation::FindFriendsOfFriends => "Random Reads: Find Friends of Friends",
            Operation::RemoveEdge => "Random Writes: Remove Edge",
            Operation::UpsertEdge => "Random Writes: Upsert Edge",
            Operation::RemoveEdgesBatch => "Random Writes: Remove Edges Batch",
            Operation::UpsertEdgesBatch => "Random Writes: Upsert Edges Batch",
            Operation::RemoveVertex => "Random Writes: Remove Vertex",
            Operation::RemoveAll => "Sequential Writes: Remove All",
        }
    }

    pub fn phase(self) -> RunnerPhase {
        match self {
            Operation::ImportCsv => RunnerPhase::Populating,
            Operation::FindEdge
            | Operation::FindIngoingEdges
            | Operation::FindConnectedEdges
            | Operation::FindFriends
            | Operation::CountFriends
            | Operation::CountFollowers
            | Operation::FindFriendsOfFriends => RunnerPhase::ProbingReads,
            Operation::RemoveEdge
            | Operation::UpsertEdge
            | Operation::RemoveEdgesBatch
            | Operation::UpsertEdgesBatch => RunnerPhase::MutatingWrites,
            Operation::RemoveVertex | Operation::RemoveAll => RunnerPhase::Clearing,
        }
    }

    /// Reads also record how many probes matched something.
    pub fn is_read(self) -> bool {
        self.phase() == RunnerPhase::ProbingReads
    }

    /// Operations run against one pair, in order.
    pub fn sequence(config: &RunnerConfig, in_memory: bool) -> Vec<Operation> {
        let mut ops = Vec::with_capacity(14);
        if in_memory {
            ops.push(Operation::ImportCsv);
        }
        ops.extend([
            Operation::FindEdge,
            Operation::FindIngoingEdges,
            Operation::FindConnectedEdges,
            Operation::FindFriends,
            Operation::CountFriends,
            Operation::CountFollowers,
        ]);
        if config.include_analytics {
            ops.push(Operation::FindFriendsOfFriends);
        }
        ops.extend([
            Operation::RemoveEdge,
            Operation::UpsertEdge,
            Operation::RemoveEdgesBatch,
            Operation::UpsertEdgesBatch,
        ]);
        if config.remove_all_afterwards {
            ops.extend([Operation::RemoveVertex, Operation::RemoveAll]);
        }
        ops
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunnerPhase {
    Idle,
    Populating,
    ProbingReads,
    MutatingWrites,
    Clearing,
    Done,
}

#[derive(Clone, Debug)]
pub struct RunnerConfig {
    pub max_seconds_per_query: Duration,
    pub repeat_existing: bool,
    pub remove_all_afterwards: bool,
    pub include_analytics: bool,
    pub device_name: String,
    pub import: ImportConfig,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_seconds_per_query: Duration::from_secs(60),
            repeat_existing: false,
            remove_all_afterwards: false,
            include_analytics: false,
            device_name: "default".to_string(),
            import: ImportConfig::default(),
        }
    }
}

/// What the runner is benchmarking.
#[derive(Clone, Copy, Debug)]
pub struct PairTarget<'a> {
    pub dataset: &'a str,
    /// Source file used to populate in-memory backends.
    pub dataset_path: Option<&'a Path>,
    pub backend: &'a str,
    pub in_memory: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub enum OperationStatus {
    Measured(Measurement),
    /// Already in the store.
    Skipped,
    /// Ran zero items; nothing recorded.
    Empty,
    Failed(String),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PairReport {
    pub dataset: String,
    pub backend: String,
    /// Set when the pair was not benchmarked at all.
    pub skipped: Option<String>,
    pub outcomes: Vec<(Operation, OperationStatus)>,
}

impl PairReport {
    pub fn status(&self, op: Operation) -> Option<&OperationStatus> {
        self.outcomes.iter().find(|(o, _)| *o == op).map(|(_, s)| s)
    }

    pub fn measured(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, s)| matches!(s, OperationStatus::Measured(_)))
            .count()
    }
}

fn one<T>(_: &T) -> u64 {
    1
}

/// Counts gathered by a time-boxed loop.
#[derive(Clone, Copy, Debug, Default)]
struct Tally {
    operations: u64,
    found: u64,
    elapsed: Duration,
}

pub struct BenchmarkRunner<'a> {
    config: &'a RunnerConfig,
    workload: &'a Workload,
    phase: RunnerPhase,
    /// Items the last time-boxed loop started, including a failed one.
    progress: Cell<usize>,
    /// Prefix of `edges_to_change_by_one` removed and not yet upserted back.
    restore_by_one: usize,
    /// Prefix of `edges_to_change_batched` removed and not yet upserted back.
    restore_batched: usize,
}

impl<'a> BenchmarkRunner<'a> {
    pub fn new(config: &'a RunnerConfig, workload: &'a Workload) -> Self {
        Self {
            config,
            workload,
            phase: RunnerPhase::Idle,
            progress: Cell::new(0),
            restore_by_one: 0,
            restore_batched: 0,
        }
    }

    pub fn phase(&self) -> RunnerPhase {
        self.phase
    }

    /// Report for a pair whose every operation is already stored, or `None`
    /// when something still has to run. Makes no backend call.
    pub fn measured_report(
        &self,
        target: &PairTarget<'_>,
        store: &dyn MeasurementStore,
    ) -> Option<PairReport> {
        if self.config.repeat_existing {
            return None;
        }
        let sequence = Operation::sequence(self.config, target.in_memory);
        if !sequence.iter().all(|op| store.contains(&self.key(*op, target))) {
            return None;
        }
        Some(PairReport {
            dataset: target.dataset.to_string(),
            backend: target.backend.to_string(),
            skipped: Some("already measured".to_string()),
            outcomes: sequence.into_iter().map(|op| (op, OperationStatus::Skipped)).collect(),
        })
    }

    /// Runs the full sequence against `backend`.
    ///
    /// Only `BackendUnavailable` is returned as an error; a rejected query
    /// marks that operation failed and the sequence continues.
    pub fn run(
        &mut self,
        backend: &dyn GraphBackend,
        target: &PairTarget<'_>,
        store: &mut dyn MeasurementStore,
    ) -> Result<PairReport> {
        if let Some(report) = self.measured_report(target, &*store) {
            debug!(dataset = target.dataset, backend = target.backend, "pair already measured");
            self.phase = RunnerPhase::Done;
            return Ok(report);
        }
        let mut report = PairReport {
            dataset: target.dataset.to_string(),
            backend: target.backend.to_string(),
            ..PairReport::default()
        };

        if !target.in_memory && backend.count_edges()? == 0 {
            info!(dataset = target.dataset, backend = target.backend, "backend holds no edges, skipping");
            report.skipped = Some("backend holds no edges".to_string());
            self.phase = RunnerPhase::Done;
            return Ok(report);
        }

        info!(dataset = target.dataset, backend = target.backend, "benchmarking pair");
        for op in Operation::sequence(self.config, target.in_memory) {
            self.enter(op.phase());
            let status = if op == Operation::ImportCsv {
                self.populate(backend, target, store)?
            } else {
                self.measure(op, backend, target, store)?
            };
            report.outcomes.push((op, status));
        }
        self.enter(RunnerPhase::Done);
        Ok(report)
    }

    fn enter(&mut self, phase: RunnerPhase) {
        if self.phase != phase {
            debug!(from = ?self.phase, to = ?phase, "runner phase");
            self.phase = phase;
        }
    }

    fn key(&self, op: Operation, target: &PairTarget<'_>) -> MeasurementKey {
        MeasurementKey::new(op.name(), target.backend, target.dataset, &self.config.device_name)
    }

    /// Imports into an in-memory backend, measured only when the import
    /// itself is missing from the store.
    fn populate(
        &self,
        backend: &dyn GraphBackend,
        target: &PairTarget<'_>,
        store: &mut dyn MeasurementStore,
    ) -> Result<OperationStatus> {
        let key = self.key(Operation::ImportCsv, target);
        let Some(path) = target.dataset_path else {
            warn!(dataset = target.dataset, "no dataset file to populate from");
            return Ok(OperationStatus::Empty);
        };
        let measured = self.config.repeat_existing || !store.contains(&key);
        let summary = match import_dataset(backend, path, &self.config.import) {
            Ok(summary) => summary,
            Err(err) if err.is_fatal_for_backend() => return Err(err),
            Err(err) => {
                warn!(op = %Operation::ImportCsv, backend = target.backend, error = %err, "operation failed");
                return Ok(OperationStatus::Failed(err.to_string()));
            }
        };
        if !measured {
            debug!(backend = target.backend, inserted = summary.inserted, "populated without measuring");
            return Ok(OperationStatus::Skipped);
        }
        Ok(self.record(
            Operation::ImportCsv,
            target,
            store,
            Tally {
                operations: summary.inserted as u64,
                found: 0,
                elapsed: Duration::from_secs_f64(summary.elapsed_secs),
            },
        ))
    }

    fn measure(
        &mut self,
        op: Operation,
        backend: &dyn GraphBackend,
        target: &PairTarget<'_>,
        store: &mut dyn MeasurementStore,
    ) -> Result<OperationStatus> {
        let key = self.key(op, target);
        if !self.config.repeat_existing && store.contains(&key) {
            debug!(op = %op, backend = target.backend, "skipping, already measured");
            self.restore_unmeasured(op, backend)?;
            return Ok(OperationStatus::Skipped);
        }
        let result = self.execute(op, backend);
        match op {
            Operation::RemoveEdge => self.restore_by_one = self.progress.get(),
            Operation::RemoveEdgesBatch => self.restore_batched = self.progress.get(),
            Operation::UpsertEdge => self.restore_by_one = 0,
            Operation::UpsertEdgesBatch => self.restore_batched = 0,
            _ => {}
        }
        match result {
            Ok(tally) => Ok(self.record(op, target, store, tally)),
            Err(err) if err.is_fatal_for_backend() => Err(err),
            Err(err) => {
                warn!(op = %op, backend = target.backend, error = %err, "operation failed");
                Ok(OperationStatus::Failed(err.to_string()))
            }
        }
    }

    /// Puts back edges removed earlier in this pass when the upsert that
    /// would restore them is already measured.
    fn restore_unmeasured(&mut self, op: Operation, g: &dyn GraphBackend) -> Result<()> {
        let w = self.workload;
        let restored = match op {
            Operation::UpsertEdge if self.restore_by_one > 0 => {
                let prefix = &w.edges_to_change_by_one[..self.restore_by_one];
                self.restore_by_one = 0;
                prefix.iter().try_fold(0, |n, e| g.upsert_edge(e).map(|hit| n + hit as usize))
            }
            Operation::UpsertEdgesBatch if self.restore_batched > 0 => {
                let prefix = &w.edges_to_change_batched[..self.restore_batched];
                self.restore_batched = 0;
                prefix.iter().try_fold(0, |n, es| g.upsert_edges(es).map(|hit| n + hit))
            }
            _ => return Ok(()),
        };
        match restored {
            Ok(restored) => {
                debug!(op = %op, restored, "restored removed edges without measuring");
                Ok(())
            }
            Err(err) if err.is_fatal_for_backend() => Err(err),
            Err(err) => {
                warn!(op = %op, error = %err, "restoring removed edges failed");
                Ok(())
            }
        }
    }

    fn record(
        &self,
        op: Operation,
        target: &PairTarget<'_>,
        store: &mut dyn MeasurementStore,
        tally: Tally,
    ) -> OperationStatus {
        if tally.operations == 0 {
            info!(op = %op, backend = target.backend, "no measurement, zero operations");
            return OperationStatus::Empty;
        }
        let found = op.is_read().then_some(tally.found);
        let measurement = Measurement::new(tally.operations, tally.elapsed, found);
        info!(
            op = %op,
            backend = target.backend,
            dataset = target.dataset,
            operations = measurement.operations,
            found = ?found,
            ops_per_sec = measurement.ops_per_sec,
            "measured"
        );
        store.upsert(self.key(op, target), measurement.clone());
        OperationStatus::Measured(measurement)
    }

    fn execute(&self, op: Operation, g: &dyn GraphBackend) -> Result<Tally> {
        let w = self.workload;
        match op {
            Operation::FindEdge => self.time_boxed(&w.edges_to_query, 0, one, |e| {
                Ok(g.find_edge(e.v_from, e.v_to)?.is_some() as u64)
            }),
            Operation::FindIngoingEdges => self.time_boxed(&w.nodes_to_query, 0, one, |v| {
                Ok((!g.edges_to(*v)?.is_empty()) as u64)
            }),
            Operation::FindConnectedEdges => self.time_boxed(&w.nodes_to_query, 0, one, |v| {
                Ok((!g.edges_related(*v)?.is_empty()) as u64)
            }),
            Operation::FindFriends => self.time_boxed(&w.nodes_to_query, 0, one, |v| {
                Ok((!g.nodes_related(*v)?.is_empty()) as u64)
            }),
            Operation::CountFriends => self.time_boxed(&w.nodes_to_query, 0, one, |v| {
                Ok((g.count_related(*v)?.count > 0) as u64)
            }),
            Operation::CountFollowers => self.time_boxed(&w.nodes_to_query, 0, one, |v| {
                Ok((g.count_followers(*v)?.count > 0) as u64)
            }),
            Operation::FindFriendsOfFriends => self.time_boxed(&w.nodes_to_analyze, 0, one, |v| {
                Ok((!g.nodes_related_to_related(*v, false)?.is_empty()) as u64)
            }),
            Operation::RemoveEdge => self.time_boxed(&w.edges_to_change_by_one, 0, one, |e| {
                Ok(g.remove_edge(e)? as u64)
            }),
            // Always re-inserts at least what the remove step took out.
            Operation::UpsertEdge => {
                self.time_boxed(&w.edges_to_change_by_one, self.restore_by_one, one, |e| {
                    Ok(g.upsert_edge(e)? as u64)
                })
            }
            Operation::RemoveEdgesBatch => self.time_boxed(
                &w.edges_to_change_batched,
                0,
                |es| es.len() as u64,
                |es| Ok(g.remove_edges(es)? as u64),
            ),
            Operation::UpsertEdgesBatch => self.time_boxed(
                &w.edges_to_change_batched,
                self.restore_batched,
                |es| es.len() as u64,
                |es| Ok(g.upsert_edges(es)? as u64),
            ),
            Operation::RemoveVertex => self.time_boxed(&w.nodes_to_change_by_one, 0, one, |v| {
                Ok(g.remove_node(*v)? as u64)
            }),
            Operation::RemoveAll => {
                let start = Instant::now();
                let removed = g.remove_all()? as u64;
                Ok(Tally {
                    operations: removed,
                    found: 0,
                    elapsed: start.elapsed(),
                })
            }
            Operation::ImportCsv => Ok(Tally::default()),
        }
    }

    /// Processes `items` one at a time and stops once the budget is spent,
    /// keeping the partial counts. The first `at_least` items always run.
    fn time_boxed<T>(
        &self,
        items: &[T],
        at_least: usize,
        size: impl Fn(&T) -> u64,
        mut step: impl FnMut(&T) -> Result<u64>,
    ) -> Result<Tally> {
        let budget = self.config.max_seconds_per_query;
        let start = Instant::now();
        let mut tally = Tally::default();
        self.progress.set(0);
        for (done, item) in items.iter().enumerate() {
            self.progress.set(done + 1);
            tally.found += step(item)?;
            tally.operations += size(item);
            if done + 1 >= at_least && start.elapsed() > budget {
                debug!(operations = tally.operations, total = items.len(), "time budget exceeded");
                break;
            }
        }
        tally.elapsed = start.elapsed();
        Ok(tally)
    }
}
