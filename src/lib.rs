//! Benchmarks graph workloads across storage backends.
//!
//! Every backend is driven through [`backend::GraphBackend`], so an operation
//! such as "count followers" means the same thing on each of them. Results are
//! keyed per operation, backend, dataset and device and persisted, which lets
//! a long session resume without measuring anything twice.
//! Run Criterion benchmarks with `cargo bench` to inspect reports under `target/criterion`.

pub mod backend;
pub mod cli;
pub mod config;
pub mod conformance;
pub mod dataset;
pub mod errors;
pub mod graph;
pub mod import;
pub mod pool;
pub mod report;
pub mod runner;
pub mod sampler;
pub mod schema;
pub mod session;
pub mod stats;

pub use crate::backend::{GraphBackend, NativeBackend, NativeEngine, NodeSet, SqliteBackend, SqliteConfig};
pub use crate::config::{BackendDescriptor, BackendKind, BenchConfig, DatasetDescriptor};
pub use crate::errors::{GraphBenchError, Result};
pub use crate::graph::{Edge, GraphDegree, NodeId};
pub use crate::runner::{BenchmarkRunner, Operation, OperationStatus, PairReport, PairTarget, RunnerConfig};
pub use crate::sampler::{SamplerConfig, TaskSampler, Workload};
pub use crate::session::{BackendFactory, BenchSession, DefaultFactory};
pub use crate::stats::{DumpGuard, Measurement, MeasurementKey, MeasurementStore, MemoryStore, StatsFile};
