//! Simulation configuration
//!
//! Every section has defaults, so a JSON file only needs the keys it
//! changes:
//!
//! ```json
//! {
//!   "seed": 7,
//!   "generator": { "depth": 3, "apps": 20 },
//!   "bench": { "iterations": 100 }
//! }
//! ```

use crate::bench::BenchConfig;
use crate::error::{ModelError, Result};
use crate::measurement::MeasurementConfig;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Parameters of a single random hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub depth: usize,
    /// Ordinary applications (the VI application is always added)
    pub apps: usize,
    pub min_instances: usize,
    /// Exclusive upper bound of instances per application
    pub max_instances: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            depth: 4,
            apps: 100,
            min_instances: 1,
            max_instances: 100,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Seed for reproducible runs; entropy when unset
    pub seed: Option<u64>,
    /// Directory for JSON and CSV output
    pub output_dir: PathBuf,
    /// File name prefix, e.g. `docker`
    pub tag: Option<String>,
    pub generator: GeneratorConfig,
    pub bench: BenchConfig,
    pub measurement: MeasurementConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: None,
            output_dir: PathBuf::from("data"),
            tag: None,
            generator: GeneratorConfig::default(),
            bench: BenchConfig::default(),
            measurement: MeasurementConfig::default(),
        }
    }
}

impl SimulationConfig {
    /// Read a JSON configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.generator.depth == 0 {
            return Err(ModelError::config("generator depth must be at least 1"));
        }
        if self.generator.min_instances == 0 {
            return Err(ModelError::config("applications deploy at least one instance"));
        }
        self.bench.validate()?;
        self.measurement.validate()
    }

    /// Random source for this run
    pub fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }

    /// Output file stem, prefixed with the tag when there is one
    pub fn file_stem(&self, name: &str) -> String {
        match &self.tag {
            Some(tag) => format!("{}_{}", tag, name),
            None => name.to_string(),
        }
    }
}
