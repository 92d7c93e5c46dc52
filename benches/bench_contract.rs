use std::time::Duration;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use graphbench::{
    Edge, GraphBackend, NativeBackend, SamplerConfig, SqliteBackend, SqliteConfig, TaskSampler,
    Workload,
};

const SEED: u64 = 0xB3C4;
const NODES: i64 = 2_000;
const SAMPLE_SIZE: usize = 20;
const WARM_UP: Duration = Duration::from_millis(300);
const MEASURE: Duration = Duration::from_millis(500);

fn workload() -> Workload {
    let sampler = TaskSampler::new(SamplerConfig {
        count_finds: 10_000,
        count_analytics: 100,
        count_changes: 1_000,
        batch_size: 100,
        seed: SEED,
    });
    sampler
        .sample_from_distribution(NODES)
        .expect("synthetic workload")
}

fn backends(edges: &[Edge]) -> Vec<(&'static str, Box<dyn GraphBackend>)> {
    let sqlite = SqliteBackend::in_memory("Bench", &SqliteConfig::default()).expect("sqlite");
    let native = NativeBackend::in_memory("Bench").expect("native");
    let mut out: Vec<(&'static str, Box<dyn GraphBackend>)> =
        vec![("sqlite_mem", Box::new(sqlite)), ("native", Box::new(native))];
    for (_, backend) in &mut out {
        backend.insert_edges(edges).expect("populate");
    }
    out
}

fn bench_reads(c: &mut Criterion) {
    let work = workload();
    let mut group = c.benchmark_group("contract_reads");
    group.sample_size(SAMPLE_SIZE);
    group.warm_up_time(WARM_UP);
    group.measurement_time(MEASURE);
    for (name, backend) in backends(&work.edges_to_query) {
        group.bench_function(BenchmarkId::new("find_edge", name), |b| {
            b.iter(|| {
                for edge in work.edges_to_query.iter().take(200) {
                    let _ = backend.find_edge(edge.v_from, edge.v_to);
                }
            });
        });
        group.bench_function(BenchmarkId::new("count_followers", name), |b| {
            b.iter(|| {
                for v in work.nodes_to_query.iter().take(200) {
                    let _ = backend.count_followers(*v);
                }
            });
        });
        group.bench_function(BenchmarkId::new("friends_of_friends", name), |b| {
            b.iter(|| {
                for v in work.nodes_to_analyze.iter().take(20) {
                    let _ = backend.nodes_related_to_related(*v, false);
                }
            });
        });
    }
    group.finish();
}

fn bench_writes(c: &mut Criterion) {
    let work = workload();
    let mut group = c.benchmark_group("contract_writes");
    group.sample_size(SAMPLE_SIZE);
    group.warm_up_time(WARM_UP);
    group.measurement_time(MEASURE);
    for (name, backend) in backends(&work.edges_to_query) {
        group.bench_function(BenchmarkId::new("remove_upsert", name), |b| {
            b.iter(|| {
                for edge in work.edges_to_change_by_one.iter().take(100) {
                    let _ = backend.remove_edge(edge);
                    let _ = backend.upsert_edge(edge);
                }
            });
        });
        group.bench_function(BenchmarkId::new("remove_upsert_batch", name), |b| {
            b.iter(|| {
                for batch in work.edges_to_change_batched.iter().take(2) {
                    let _ = backend.remove_edges(batch);
                    let _ = backend.upsert_edges(batch);
                }
            });
        });
    }
    group.finish();
}

criterion_group!(
    name = contract_benches;
    config = Criterion::default();
    targets = bench_reads, bench_writes
);
criterion_main!(contract_benches);
