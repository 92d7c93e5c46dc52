//! Measurement store.
//!
//! Results are keyed by `(operation, backend, dataset, device)` and looked up
//! before every operation so interrupted sessions resume where they stopped.

use std::{
    collections::BTreeMap,
    fs,
    ops::{Deref, DerefMut},
    path::{Path, PathBuf},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::{GraphBenchError, Result};

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MeasurementKey {
    pub operation: String,
    pub backend: String,
    pub dataset: String,
    pub device: String,
}

impl MeasurementKey {
    pub fn new(
        operation: impl Into<String>,
        backend: impl Into<String>,
        dataset: impl Into<String>,
        device: impl Into<String>,
    ) -> Self {
        Self {
            operation: operation.into(),
            backend: backend.into(),
            dataset: dataset.into(),
            device: device.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub operations: u64,
    pub elapsed_secs: f64,
    pub ops_per_sec: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub found: Option<u64>,
    #[serde(default)]
    pub recorded_at: u64,
}

impl Measurement {
    pub fn new(operations: u64, elapsed: Duration, found: Option<u64>) -> Self {
        let elapsed_secs = elapsed.as_secs_f64();
        let ops_per_sec = if elapsed_secs > 0.0 {
            operations as f64 / elapsed_secs
        } else {
            0.0
        };
        let recorded_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        Self {
            operations,
            elapsed_secs,
            ops_per_sec,
            found,
            recorded_at,
        }
    }
}

/// One row of the stats file.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct StatsRecord {
    #[serde(flatten)]
    key: MeasurementKey,
    #[serde(flatten)]
    measurement: Measurement,
}

pub trait MeasurementStore {
    fn contains(&self, key: &MeasurementKey) -> bool;
    fn get(&self, key: &MeasurementKey) -> Option<&Measurement>;
    /// Replaces any measurement stored under `key`.
    fn upsert(&mut self, key: MeasurementKey, measurement: Measurement);
    /// Persists every measurement.
    fn dump(&self) -> Result<()>;
    fn len(&self) -> usize;
    fn entries(&self) -> Vec<(&MeasurementKey, &Measurement)>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Store that lives only as long as the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: BTreeMap<MeasurementKey, Measurement>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MeasurementStore for MemoryStore {
    fn contains(&self, key: &MeasurementKey) -> bool {
        self.records.contains_key(key)
    }

    fn get(&self, key: &MeasurementKey) -> Option<&Measurement> {
        self.records.get(key)
    }

    fn upsert(&mut self, key: MeasurementKey, measurement: Measurement) {
        self.records.insert(key, measurement);
    }

    fn dump(&self) -> Result<()> {
        Ok(())
    }

    fn len(&self) -> usize {
        self.records.len()
    }

    fn entries(&self) -> Vec<(&MeasurementKey, &Measurement)> {
        self.records.iter().collect()
    }
}

/// JSON array of measurements on disk.
#[derive(Debug)]
pub struct StatsFile {
    path: PathBuf,
    records: BTreeMap<MeasurementKey, Measurement>,
}

impl StatsFile {
    /// Loads `path`; a missing or empty file starts an empty store.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let records = load_records_from(&path)?
            .into_iter()
            .map(|r| (r.key, r.measurement))
            .collect();
        Ok(Self { path, records })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn load_records_from(path: &Path) -> Result<Vec<StatsRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let data = fs::read(path).map_err(|e| GraphBenchError::store(format!("{}: {e}", path.display())))?;
    if data.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }
    serde_json::from_slice(&data)
        .map_err(|e| GraphBenchError::store(format!("{}: {e}", path.display())))
}

impl MeasurementStore for StatsFile {
    fn contains(&self, key: &MeasurementKey) -> bool {
        self.records.contains_key(key)
    }

    fn get(&self, key: &MeasurementKey) -> Option<&Measurement> {
        self.records.get(key)
    }

    fn upsert(&mut self, key: MeasurementKey, measurement: Measurement) {
        self.records.insert(key, measurement);
    }

    /// Writes sorted pretty JSON to a sibling temp file, then renames it over
    /// the target.
    fn dump(&self) -> Result<()> {
        let rows: Vec<StatsRecord> = self
            .records
            .iter()
            .map(|(key, measurement)| StatsRecord {
                key: key.clone(),
                measurement: measurement.clone(),
            })
            .collect();
        let data = serde_json::to_vec_pretty(&rows).map_err(|e| GraphBenchError::store(e.to_string()))?;
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| GraphBenchError::store(e.to_string()))?;
        }
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, data).map_err(|e| GraphBenchError::store(format!("{}: {e}", tmp.display())))?;
        fs::rename(&tmp, &self.path)
            .map_err(|e| GraphBenchError::store(format!("{}: {e}", self.path.display())))?;
        debug!(path = %self.path.display(), records = rows.len(), "stats dumped");
        Ok(())
    }

    fn len(&self) -> usize {
        self.records.len()
    }

    fn entries(&self) -> Vec<(&MeasurementKey, &Measurement)> {
        self.records.iter().collect()
    }
}

/// Dumps the wrapped store when dropped, including during unwinding.
pub struct DumpGuard<'a, S: MeasurementStore + ?Sized> {
    store: &'a mut S,
}

impl<'a, S: MeasurementStore + ?Sized> DumpGuard<'a, S> {
    pub fn new(store: &'a mut S) -> Self {
        Self { store }
    }
}

impl<S: MeasurementStore + ?Sized> Deref for DumpGuard<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        &*self.store
    }
}

impl<S: MeasurementStore + ?Sized> DerefMut for DumpGuard<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        &mut *self.store
    }
}

impl<S: MeasurementStore + ?Sized> Drop for DumpGuard<'_, S> {
    fn drop(&mut self) {
        if let Err(err) = self.store.dump() {
            warn!(error = %err, "failed to dump measurements");
        }
    }
}
