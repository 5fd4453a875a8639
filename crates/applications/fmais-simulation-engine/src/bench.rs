//! Timing sweeps for generation and ME-ERT-CORE
//!
//! ## Sweeps
//!
//! - **System model**: time to generate a random hierarchy
//! - **ME-ERT-CORE**: canonical computation on random hierarchies with
//!   random priorities and reliabilities, plus reliability statistics
//! - **Optimized**: simple optimized pass on wide models fed from the
//!   measurement profiles at a random step
//!
//! Every cell of a sweep averages `iterations` runs and is reported in
//! microseconds.

use crate::error::{ModelError, Result};
use crate::fixtures;
use crate::measurement::{DEFAULT_DEVIATION, MEASUREMENT_STEPS, wide_feeds};
use crate::meertcore::MeErtCore;
use crate::model::SystemModel;
use crate::storage::{ResultTable, insert_cell};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::info;

/// Sweep bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    pub max_depth: usize,
    pub max_apps: usize,
    pub max_instances: usize,
    /// Runs averaged per cell
    pub iterations: usize,
    /// Increment of the application and instance counts
    pub stride: usize,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            max_depth: 4,
            max_apps: 100,
            max_instances: 100,
            iterations: 25_000,
            stride: 5,
        }
    }
}

impl BenchConfig {
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_max_apps(mut self, max_apps: usize) -> Self {
        self.max_apps = max_apps;
        self
    }

    pub fn with_max_instances(mut self, max_instances: usize) -> Self {
        self.max_instances = max_instances;
        self
    }

    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_depth == 0 || self.iterations == 0 || self.stride == 0 {
            return Err(ModelError::config(
                "max depth, iterations and stride must be positive",
            ));
        }
        Ok(())
    }

    /// `(depth, apps, max instances)` cells of the sweep
    fn cells(&self) -> impl Iterator<Item = (usize, usize, usize)> + '_ {
        (1..=self.max_depth).flat_map(move |depth| {
            (1..=self.max_apps + 1).step_by(self.stride).flat_map(move |apps| {
                (1..=self.max_instances + 1)
                    .step_by(self.stride)
                    .map(move |instances| (depth, apps, instances))
            })
        })
    }
}

/// Extreme value and the cell it was seen in
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Peak {
    pub value: f64,
    pub depth: usize,
    pub apps: usize,
    pub instances: usize,
}

impl Peak {
    fn update(slot: &mut Option<Peak>, candidate: Peak, better: impl Fn(f64, f64) -> bool) {
        match slot {
            Some(current) if !better(candidate.value, current.value) => {}
            _ => *slot = Some(candidate),
        }
    }

    /// Single-cell table, the format the peaks are stored in
    pub fn to_table(&self) -> ResultTable {
        let mut table = ResultTable::new();
        insert_cell(&mut table, self.depth, self.apps, self.instances, self.value);
        table
    }
}

/// Anything a sweep produces that ends up on disk
pub trait BenchReport {
    /// File name stem shared by every table
    fn name(&self) -> &str;

    /// Tables with their name suffix
    fn tables(&self) -> Vec<(String, ResultTable)>;
}

/// Result of [`bench_system_model`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelBenchReport {
    pub timings: ResultTable,
    pub largest: Option<Peak>,
}

impl BenchReport for ModelBenchReport {
    fn name(&self) -> &str {
        "fmais"
    }

    fn tables(&self) -> Vec<(String, ResultTable)> {
        let mut tables = vec![("benchmark".to_string(), self.timings.clone())];
        if let Some(peak) = &self.largest {
            tables.push(("max_instances".to_string(), peak.to_table()));
        }
        tables
    }
}

/// Result of [`bench_me_ert_core`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoreBenchReport {
    pub timings: ResultTable,
    pub average_reliability: ResultTable,
    pub largest: Option<Peak>,
    pub max_reliability: Option<Peak>,
    pub min_reliability: Option<Peak>,
}

impl BenchReport for CoreBenchReport {
    fn name(&self) -> &str {
        "meertcore"
    }

    fn tables(&self) -> Vec<(String, ResultTable)> {
        let mut tables = vec![
            ("benchmark".to_string(), self.timings.clone()),
            ("average_reliability".to_string(), self.average_reliability.clone()),
        ];
        for (suffix, peak) in [
            ("max_instances", &self.largest),
            ("maximum_reliability", &self.max_reliability),
            ("minimum_reliability", &self.min_reliability),
        ] {
            if let Some(peak) = peak {
                tables.push((suffix.to_string(), peak.to_table()));
            }
        }
        tables
    }
}

/// Result of [`bench_me_ert_core_optimized`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OptimizedBenchReport {
    pub timings: ResultTable,
}

impl BenchReport for OptimizedBenchReport {
    fn name(&self) -> &str {
        "meertcore_optimized"
    }

    fn tables(&self) -> Vec<(String, ResultTable)> {
        vec![("benchmark".to_string(), self.timings.clone())]
    }
}

fn random_model<R: Rng + ?Sized>(
    depth: usize,
    apps: usize,
    instances: usize,
    rng: &mut R,
) -> SystemModel {
    let names = SystemModel::generate_app_names(apps);
    let mut model = SystemModel::new(names.len(), depth);
    model.create_random_applications(&names, 1, instances, rng);
    model
}

fn micros(total: std::time::Duration, iterations: usize) -> f64 {
    total.as_secs_f64() * 1e6 / iterations as f64
}

/// Time hierarchy generation over the sweep
pub fn bench_system_model<R: Rng + ?Sized>(
    config: &BenchConfig,
    rng: &mut R,
) -> Result<ModelBenchReport> {
    config.validate()?;
    let mut report = ModelBenchReport::default();

    for (depth, apps, instances) in config.cells() {
        info!(
            iterations = config.iterations,
            depth, apps, instances, "Fractal MAIS benchmarking"
        );
        let mut elapsed = std::time::Duration::ZERO;
        for _ in 0..config.iterations {
            let mut model = random_model(depth, apps, instances, rng);
            let start = Instant::now();
            model.generate(rng);
            elapsed += start.elapsed();

            let size = model.total_instances() as f64;
            Peak::update(
                &mut report.largest,
                Peak { value: size, depth, apps, instances },
                |a, b| a > b,
            );
        }
        let mean = micros(elapsed, config.iterations);
        info!(mean_us = mean, "cell finished");
        insert_cell(&mut report.timings, depth, apps, instances, mean);
    }

    if let Some(peak) = &report.largest {
        info!(?peak, "largest model generated");
    }
    Ok(report)
}

/// Time the canonical computation over the sweep
pub fn bench_me_ert_core<R: Rng + ?Sized>(
    config: &BenchConfig,
    rng: &mut R,
) -> Result<CoreBenchReport> {
    config.validate()?;
    let mut report = CoreBenchReport::default();

    for (depth, apps, instances) in config.cells() {
        info!(
            iterations = config.iterations,
            depth, apps, instances, "ME-ERT-CORE benchmarking"
        );
        let mut elapsed = std::time::Duration::ZERO;
        let mut average = 0.0;
        for _ in 0..config.iterations {
            let mut model = random_model(depth, apps, instances, rng);
            model.generate(rng);
            model.set_application_priorities_random(rng);
            model.set_instance_priorities_random(rng)?;
            model.set_instance_reliabilities_random(rng)?;

            let start = Instant::now();
            let reliability = MeErtCore::new(&mut model).compute_reliability_per_definition()?;
            elapsed += start.elapsed();
            average += reliability / config.iterations as f64;

            let cell = |value| Peak { value, depth, apps, instances };
            Peak::update(&mut report.max_reliability, cell(reliability), |a, b| a > b);
            Peak::update(&mut report.min_reliability, cell(reliability), |a, b| a < b);
            Peak::update(
                &mut report.largest,
                cell(model.total_instances() as f64),
                |a, b| a > b,
            );
        }
        let mean = micros(elapsed, config.iterations);
        info!(mean_us = mean, average_reliability = average, "cell finished");
        insert_cell(&mut report.timings, depth, apps, instances, mean);
        insert_cell(&mut report.average_reliability, depth, apps, instances, average);
    }

    info!(
        max = ?report.max_reliability,
        min = ?report.min_reliability,
        "reliability range"
    );
    Ok(report)
}

/// Time the simple optimized pass on wide models of `apps` applications
///
/// Depth runs from 2 to `config.max_depth`, instances per application from 1
/// to `config.max_instances` in `config.stride` increments.
pub fn bench_me_ert_core_optimized<R: Rng + ?Sized>(
    config: &BenchConfig,
    apps: usize,
    rng: &mut R,
) -> Result<OptimizedBenchReport> {
    config.validate()?;
    let mut report = OptimizedBenchReport::default();

    for depth in 2..=config.max_depth.min(4) {
        for instances in (1..=config.max_instances).step_by(config.stride) {
            let mut model = fixtures::wide_bench(apps, instances, depth)?;
            let feeds = wide_feeds(instances, DEFAULT_DEVIATION, rng);
            info!(
                iterations = config.iterations,
                depth, apps, instances, "ME-ERT-CORE (optimized) benchmarking"
            );

            let mut elapsed = std::time::Duration::ZERO;
            for _ in 0..config.iterations {
                let step = rng.gen_range(1..=MEASUREMENT_STEPS);
                for feed in &feeds {
                    feed.apply(&mut model, step, rng)?;
                }
                model.gather_all_applications_reliabilities()?;

                let start = Instant::now();
                MeErtCore::new(&mut model).compute_reliability_optimized_simple()?;
                elapsed += start.elapsed();
            }
            let mean = micros(elapsed, config.iterations);
            info!(mean_us = mean, "cell finished");
            insert_cell(&mut report.timings, depth, apps, instances, mean);
        }
    }
    Ok(report)
}
