//! Markdown summary of stored measurements.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;

use crate::{runner::Operation, stats::MeasurementStore};

const ORDER: [Operation; 14] = [
    Operation::ImportCsv,
    Operation::FindEdge,
    Operation::FindIngoingEdges,
    Operation::FindConnectedEdges,
    Operation::FindFriends,
    Operation::CountFriends,
    Operation::CountFollowers,
    Operation::FindFriendsOfFriends,
    Operation::RemoveEdge,
    Operation::UpsertEdge,
    Operation::RemoveEdgesBatch,
    Operation::UpsertEdgesBatch,
    Operation::RemoveVertex,
    Operation::RemoveAll,
];

fn operation_rank(name: &str) -> usize {
    ORDER
        .iter()
        .position(|op| op.name() == name)
        .unwrap_or(ORDER.len())
}

/// One table per dataset: rows are operations, columns are backends, cells
/// are operations per second. Only measurements taken on `device` are shown.
pub fn render_markdown<S: MeasurementStore + ?Sized>(store: &S, device: &str) -> String {
    // dataset -> operation -> backend -> ops/sec
    let mut tables: BTreeMap<&str, BTreeMap<&str, BTreeMap<&str, f64>>> = BTreeMap::new();
    let mut backends: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for (key, measurement) in store.entries() {
        if key.device != device {
            continue;
        }
        tables
            .entry(key.dataset.as_str())
            .or_default()
            .entry(key.operation.as_str())
            .or_default()
            .insert(key.backend.as_str(), measurement.ops_per_sec);
        backends
            .entry(key.dataset.as_str())
            .or_default()
            .insert(key.backend.as_str());
    }

    let mut out = String::new();
    let _ = writeln!(out, "# Graph benchmarks on {device}\n");
    if tables.is_empty() {
        let _ = writeln!(out, "No measurements recorded yet.");
        return out;
    }
    for (dataset, rows) in &tables {
        let columns: Vec<&str> = backends
            .get(dataset)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        let _ = writeln!(out, "## {dataset}\n");
        let _ = writeln!(out, "| Operation | {} |", columns.join(" | "));
        let _ = writeln!(out, "|---|{}", "---:|".repeat(columns.len()));

        let mut names: Vec<&str> = rows.keys().copied().collect();
        names.sort_by_key(|name| (operation_rank(name), *name));
        for name in names {
            let cells: Vec<String> = columns
                .iter()
                .map(|backend| {
                    rows[name]
                        .get(backend)
                        .map(|ops| format_rate(*ops))
                        .unwrap_or_else(|| "-".to_string())
                })
                .collect();
            let _ = writeln!(out, "| {name} | {} |", cells.join(" | "));
        }
        out.push('\n');
    }
    out
}

fn format_rate(ops_per_sec: f64) -> String {
    if ops_per_sec >= 1_000_000.0 {
        format!("{:.2}M", ops_per_sec / 1_000_000.0)
    } else if ops_per_sec >= 1_000.0 {
        format!("{:.1}K", ops_per_sec / 1_000.0)
    } else {
        format!("{ops_per_sec:.1}")
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::stats::{Measurement, MeasurementKey, MemoryStore};

    #[test]
    fn test_tables_follow_operation_order() {
        let mut store = MemoryStore::new();
        let put = |store: &mut MemoryStore, op: Operation, backend: &str, ops: u64| {
            store.upsert(
                MeasurementKey::new(op.name(), backend, "Test", "laptop"),
                Measurement::new(ops, Duration::from_secs(1), None),
            );
        };
        put(&mut store, Operation::UpsertEdge, "SQLite", 500);
        put(&mut store, Operation::FindEdge, "SQLite", 2_500);
        put(&mut store, Operation::FindEdge, "Native", 3_000_000);
        store.upsert(
            MeasurementKey::new(Operation::FindEdge.name(), "SQLite", "Test", "other"),
            Measurement::new(1, Duration::from_secs(1), None),
        );

        let md = render_markdown(&store, "laptop");
        assert!(md.contains("## Test"));
        assert!(md.contains("| Operation | Native | SQLite |"));
        let find = md.find("Find Specific Edge").unwrap();
        let upsert = md.find("Upsert Edge").unwrap();
        assert!(find < upsert);
        assert!(md.contains("| Random Reads: Find Specific Edge | 3.00M | 2.5K |"));
        assert!(md.contains("| Random Writes: Upsert Edge | - | 500.0 |"));
    }

    #[test]
    fn test_empty_store_says_so() {
        let md = render_markdown(&MemoryStore::new(), "laptop");
        assert!(md.contains("No measurements"));
    }
}
