//! # Fractal MAIS Simulation Engine
//!
//! Generates fractal multi-agent hierarchies of virtualization hosts (VI) and
//! applications, and scores them with the ME-ERT-CORE reliability model.
//!
//! ## Architecture
//!
//! ```text
//! generator / fixtures ──► SystemModel ──► reliability setup ──► MeErtCore
//!                          (arena of        (priorities,          ├── canonical
//!                           instances)       reliabilities,       ├── optimized
//!                                            chain coefficients)  └── simple
//!                                                                     │
//!                          bench / measurement ◄──────────────────────┘
//!                                   │
//!                                storage (JSON, CSV)
//! ```
//!
//! ## Reliability
//!
//! 1. **Canonical**: bottom-up weighted sum over the tree, `O(edges)`
//! 2. **Optimized**: one pass over applications using precomputed chain
//!    coefficients; equal to canonical when the VI application's priority is 1
//! 3. **Simple**: optimized without chain coefficients, an approximation
//!
//! See [`meertcore`] for the formulas and [`reliability`] for the setup steps.

#![warn(clippy::all)]

pub mod aspects;
pub mod bench;
pub mod config;
pub mod error;
pub mod fixtures;
pub mod generator;
pub mod measurement;
pub mod meertcore;
pub mod model;
pub mod reliability;
pub mod storage;

// ============================================================================
// Public exports - Model
// ============================================================================

pub use aspects::{AspectKey, Aspects, HasAspects};
pub use error::{ModelError, Result};
pub use model::{
    Application, Instance, InstanceId, InstanceKind, Layer, ParsedName, ROOT_NAME, SystemModel,
    VI_APPLICATION, ViCounter,
};

// ============================================================================
// Public exports - Reliability
// ============================================================================

pub use meertcore::{MeErtCore, ReliabilityVariant, me_ert_core_coefficient};
pub use reliability::InstanceReliabilities;

// ============================================================================
// Public exports - Experiments
// ============================================================================

pub use bench::{
    BenchConfig, BenchReport, CoreBenchReport, ModelBenchReport, OptimizedBenchReport, Peak,
};
pub use config::{GeneratorConfig, SimulationConfig};
pub use measurement::{
    MeasurementConfig, MeasurementRun, ReliabilityFeed, Scenario, WideMeasurement,
};
pub use storage::{ResultTable, load_table, save_table, table_dimensions};
