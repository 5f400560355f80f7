//! Explicit configuration of an analysis run.
//!
//! All settings have defaults matching the published benchmark suite, so an empty JSON object is
//! a valid configuration file.
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Graph parameters of one benchmarked dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Name used in trace file names.
    pub name: String,
    /// Number of nodes `n`.
    pub nodes: u64,
    /// Total size `t`: nodes plus edges, undirected edges counted in both directions.
    pub total_size: u64,
    /// Number of layers of the reference protocol's input.
    pub layers: u64,
}

impl DatasetConfig {
    fn new(name: &str, nodes: u64, total_size: u64, layers: u64) -> Self {
        Self {
            name: name.to_string(),
            nodes,
            total_size,
            layers,
        }
    }
}

/// Configuration threaded into the loader, the cost model and the validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    /// Directory containing one `p0`, `p1` and `p2` sub-directory of trace files.
    pub base_dir: PathBuf,
    /// Bit-width of the secret-shared ring elements.
    pub ring_bits: u32,
    /// Largest depth of the dataset sweeps.
    pub max_depth: u32,
    /// Layer count assumed for the reference protocol in size sweeps.
    pub reference_layers: u64,
    /// The benchmarked datasets.
    pub datasets: Vec<DatasetConfig>,
    /// Total-size factors of the size sweeps (`t = factor * n`).
    pub size_factors: Vec<u64>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("../build/benchmarks"),
            ring_bits: 32,
            max_depth: 10,
            reference_layers: 3,
            datasets: vec![
                DatasetConfig::new("aarhus", 61, 1301, 5),
                DatasetConfig::new("london", 369, 1375, 3),
                DatasetConfig::new("hiv", 1005, 3693, 3),
                DatasetConfig::new("arabi", 6980, 43214, 7),
                DatasetConfig::new("higgs", 304691, 1415653, 3),
            ],
            size_factors: vec![11, 51, 101],
        }
    }
}

/// Errors related to loading or validating an [`AnalysisConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("could not read config file {path}: {source}")]
    Io {
        /// The config file.
        path: PathBuf,
        /// The underlying error.
        source: std::io::Error,
    },
    /// The configuration file is not valid JSON for an [`AnalysisConfig`].
    #[error("invalid config: {0}")]
    Json(#[from] serde_json::Error),
    /// Ring elements must consist of whole bytes.
    #[error("ring bit-width must be a positive multiple of 8, got {0}")]
    RingBits(u32),
    /// A dataset violates `1 <= n <= t` or has no layers.
    #[error(
        "dataset {name} has invalid parameters \
         (n = {nodes}, t = {total_size}, layers = {layers})"
    )]
    InvalidDataset {
        /// Name of the dataset.
        name: String,
        /// Configured node count.
        nodes: u64,
        /// Configured total size.
        total_size: u64,
        /// Configured layer count.
        layers: u64,
    },
    /// Two datasets share a name.
    #[error("dataset {0} is configured twice")]
    DuplicateDataset(String),
    /// A size factor below 1 would make the total size smaller than the node count.
    #[error("size factor must be at least 1, got {0}")]
    SizeFactor(u64),
    /// The reference protocol needs at least one layer.
    #[error("reference layer count must be at least 1")]
    ReferenceLayers,
    /// A selector names a dataset that is not configured.
    #[error("unknown dataset {0}")]
    UnknownDataset(String),
}

impl AnalysisConfig {
    /// Parses and validates a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: AnalysisConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// Checks the invariants the cost model and the loader rely on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ring_bits == 0 || self.ring_bits % 8 != 0 {
            return Err(ConfigError::RingBits(self.ring_bits));
        }
        if self.reference_layers == 0 {
            return Err(ConfigError::ReferenceLayers);
        }
        for (i, dataset) in self.datasets.iter().enumerate() {
            if dataset.nodes == 0 || dataset.total_size < dataset.nodes || dataset.layers == 0 {
                return Err(ConfigError::InvalidDataset {
                    name: dataset.name.clone(),
                    nodes: dataset.nodes,
                    total_size: dataset.total_size,
                    layers: dataset.layers,
                });
            }
            if self.datasets[..i].iter().any(|d| d.name == dataset.name) {
                return Err(ConfigError::DuplicateDataset(dataset.name.clone()));
            }
        }
        if let Some(&factor) = self.size_factors.iter().find(|&&f| f == 0) {
            return Err(ConfigError::SizeFactor(factor));
        }
        Ok(())
    }

    /// Looks up a dataset by name.
    pub fn dataset(&self, name: &str) -> Result<&DatasetConfig, ConfigError> {
        self.datasets
            .iter()
            .find(|d| d.name == name)
            .ok_or_else(|| ConfigError::UnknownDataset(name.to_string()))
    }
}
