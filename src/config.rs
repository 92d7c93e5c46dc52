//! Session configuration.
//!
//! A [`BenchConfig`] is loaded once from JSON, adjusted from the environment
//! and then passed by reference to everything that needs it.

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::{
    errors::{GraphBenchError, Result},
    import::ImportConfig,
    pool::DEFAULT_WORKERS,
    runner::RunnerConfig,
    sampler::SamplerConfig,
};

/// Placeholder substituted with the dataset name in backend URLs.
pub const DATASET_PLACEHOLDER: &str = "${DATASET_NAME}";

/// Storage engine behind a backend descriptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// SQLite database file, one table per dataset.
    #[serde(alias = "sqlite_file")]
    Sqlite,
    /// Private in-memory SQLite database per handle.
    #[serde(alias = "sqlite_mem")]
    SqliteMemory,
    /// In-process adjacency engine shared by every dataset.
    Native,
}

impl BackendKind {
    pub fn in_memory_by_default(self) -> bool {
        !matches!(self, BackendKind::Sqlite)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DatasetDescriptor {
    pub name: String,
    pub path: PathBuf,
    #[serde(default = "enabled_default")]
    pub enabled: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BackendDescriptor {
    pub name: String,
    pub kind: BackendKind,
    /// Connection target; may contain `${DATASET_NAME}`.
    #[serde(default)]
    pub url: String,
    /// Environment variable that overrides `url` when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_variable_name: Option<String>,
    #[serde(default = "enabled_default")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_memory: Option<bool>,
    /// Relational only: merge duplicate inserts instead of appending.
    #[serde(default)]
    pub check_uniqueness: bool,
}

impl BackendDescriptor {
    pub fn new(name: impl Into<String>, kind: BackendKind) -> Self {
        Self {
            name: name.into(),
            kind,
            url: String::new(),
            url_variable_name: None,
            enabled: true,
            in_memory: None,
            check_uniqueness: false,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn is_in_memory(&self) -> bool {
        self.in_memory.unwrap_or_else(|| self.kind.in_memory_by_default())
    }

    /// Connection target for `dataset`, with the environment override applied
    /// through `lookup`.
    pub fn resolve_url<F>(&self, dataset: &str, lookup: F) -> String
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw = self
            .url_variable_name
            .as_deref()
            .and_then(|var| lookup(var))
            .unwrap_or_else(|| self.url.clone());
        raw.replace(DATASET_PLACEHOLDER, dataset)
    }
}

fn enabled_default() -> bool {
    true
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    pub device_name: String,
    pub stats_file: PathBuf,
    pub max_seconds_per_query: f64,
    pub repeat_existing: bool,
    pub remove_all_afterwards: bool,
    pub include_analytics: bool,
    pub workers: usize,
    pub batch_per_worker: usize,
    pub sampler: SamplerConfig,
    pub datasets: Vec<DatasetDescriptor>,
    pub backends: Vec<BackendDescriptor>,
    /// Directory relative dataset paths are resolved against.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            device_name: "default".to_string(),
            stats_file: PathBuf::from("graphbench_stats.json"),
            max_seconds_per_query: 60.0,
            repeat_existing: false,
            remove_all_afterwards: false,
            include_analytics: false,
            workers: DEFAULT_WORKERS,
            batch_per_worker: ImportConfig::default().batch_per_worker,
            sampler: SamplerConfig::default(),
            datasets: Vec::new(),
            backends: Vec::new(),
            base_dir: PathBuf::from("."),
        }
    }
}

impl BenchConfig {
    /// Reads `path` and applies process environment overrides.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .map_err(|e| GraphBenchError::config(format!("{}: {e}", path.display())))?;
        let mut config: BenchConfig = serde_json::from_str(&data)
            .map_err(|e| GraphBenchError::config(format!("{}: {e}", path.display())))?;
        config.base_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        if config.stats_file.is_relative() {
            config.stats_file = config.base_dir.join(&config.stats_file);
        }
        config.validate()?;
        Ok(config)
    }

    /// Overrides from `DEVICE_NAME`, `COUNT_FINDS`, `COUNT_ANALYTICS`,
    /// `COUNT_CHANGES`, `MAX_SECONDS_PER_QUERY` and `GRAPHBENCH_STATS_FILE`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(device) = lookup("DEVICE_NAME") {
            self.device_name = device;
        }
        if let Some(raw) = lookup("COUNT_FINDS") {
            self.sampler.count_finds = parse_env("COUNT_FINDS", &raw)?;
        }
        if let Some(raw) = lookup("COUNT_ANALYTICS") {
            self.sampler.count_analytics = parse_env("COUNT_ANALYTICS", &raw)?;
        }
        if let Some(raw) = lookup("COUNT_CHANGES") {
            self.sampler.count_changes = parse_env("COUNT_CHANGES", &raw)?;
        }
        if let Some(raw) = lookup("MAX_SECONDS_PER_QUERY") {
            self.max_seconds_per_query = parse_env("MAX_SECONDS_PER_QUERY", &raw)?;
        }
        if let Some(path) = lookup("GRAPHBENCH_STATS_FILE") {
            self.stats_file = PathBuf::from(path);
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<()> {
        if !self.max_seconds_per_query.is_finite() || self.max_seconds_per_query <= 0.0 {
            return Err(GraphBenchError::config("max_seconds_per_query must be positive"));
        }
        if self.device_name.trim().is_empty() {
            return Err(GraphBenchError::config("device_name must not be empty"));
        }
        for backend in &self.backends {
            if backend.kind == BackendKind::Sqlite && backend.url.is_empty() && backend.url_variable_name.is_none() {
                return Err(GraphBenchError::config(format!(
                    "backend {} needs a database path",
                    backend.name
                )));
            }
        }
        Ok(())
    }

    pub fn dataset_path(&self, dataset: &DatasetDescriptor) -> PathBuf {
        if dataset.path.is_absolute() {
            dataset.path.clone()
        } else {
            self.base_dir.join(&dataset.path)
        }
    }

    pub fn enabled_datasets(&self) -> impl Iterator<Item = &DatasetDescriptor> {
        self.datasets.iter().filter(|d| d.enabled)
    }

    pub fn enabled_backends(&self) -> impl Iterator<Item = &BackendDescriptor> {
        self.backends.iter().filter(|b| b.enabled)
    }

    pub fn import_config(&self) -> ImportConfig {
        ImportConfig {
            workers: self.workers.max(1),
            batch_per_worker: self.batch_per_worker.max(1),
        }
    }

    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            max_seconds_per_query: Duration::from_secs_f64(self.max_seconds_per_query),
            repeat_existing: self.repeat_existing,
            remove_all_afterwards: self.remove_all_afterwards,
            include_analytics: self.include_analytics,
            device_name: self.device_name.clone(),
            import: self.import_config(),
        }
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| GraphBenchError::config(format!("{name}={raw} is not a valid number")))
}
