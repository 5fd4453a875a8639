//! Time-series reliability measurement over the reference hierarchies
//!
//! Each instance reliability follows a piecewise profile: a nominal mean,
//! a dip for a few steps, then recovery. Every step draws a value uniformly
//! within `mean ± deviation`, pushes it into the model, gathers application
//! reliabilities and records the simple optimized ME-ERT-CORE value. After
//! the run the ME-ERT-CORE coefficient is computed for every step.
//!
//! ## Scenarios
//!
//! - **Depth 2/3/4**: the [`crate::fixtures`] depth models with fixed profiles
//! - **Wide**: models of 10, 10 + step, .. applications where only `App#1` fails

use crate::error::{ModelError, Result};
use crate::fixtures;
use crate::meertcore::{MeErtCore, me_ert_core_coefficient};
use crate::model::{SystemModel, VI_APPLICATION};
use rand::Rng;
use rand_distr::{Distribution, Uniform};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

/// Number of steps in one measurement run
pub const MEASUREMENT_STEPS: usize = 300;

/// Half-width of the uniform noise around a profile mean
pub const DEFAULT_DEVIATION: f64 = 0.025;

/// Noise reduction applied to the wide scenario
pub const WIDE_DEVIATION_FACTOR: f64 = 0.1;

/// Step to value
pub type Series = BTreeMap<usize, f64>;

/// Mean value over an inclusive step range
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InputSegment {
    pub from: usize,
    pub to: usize,
    pub value: f64,
}

const fn segment(from: usize, to: usize, value: f64) -> InputSegment {
    InputSegment { from, to, value }
}

pub const APP1_INST1: &[InputSegment] = &[
    segment(1, 50, 0.5),
    segment(51, 75, 0.35),
    segment(76, 300, 0.5),
];
pub const APP1_INST2: &[InputSegment] = &[
    segment(1, 25, 0.37),
    segment(26, 40, 0.27),
    segment(41, 300, 0.37),
];
pub const APP1_INST3: &[InputSegment] = &[
    segment(1, 100, 0.71),
    segment(101, 125, 0.59),
    segment(126, 300, 0.71),
];
pub const APP2_INST1: &[InputSegment] = &[
    segment(1, 130, 0.46),
    segment(131, 150, 0.24),
    segment(151, 300, 0.46),
];
pub const APP2_INST2: &[InputSegment] = &[
    segment(1, 160, 0.69),
    segment(161, 175, 0.0),
    segment(176, 300, 0.9),
];
pub const APP3_INST1: &[InputSegment] = &[
    segment(1, 190, 0.54),
    segment(191, 215, 0.38),
    segment(216, 300, 0.54),
];
pub const APP3_INST2: &[InputSegment] = &[
    segment(1, 230, 0.47),
    segment(231, 245, 0.33),
    segment(246, 300, 0.47),
];
pub const APP4_INST1: &[InputSegment] = &[
    segment(1, 250, 0.8),
    segment(251, 261, 0.0),
    segment(262, 300, 0.8),
];
pub const VIAAS: &[InputSegment] = &[
    segment(1, 270, 0.94),
    segment(271, 285, 0.21),
    segment(286, 300, 0.94),
];

/// Nominal instances of the wide scenario
pub const APP_INST1: &[InputSegment] = &[segment(1, 300, 0.46)];
pub const APP_INST2: &[InputSegment] = &[segment(1, 300, 0.69)];

/// Failing application of the wide scenario
pub const APP_FAIL_INST1: &[InputSegment] = &[
    segment(1, 99, 0.46),
    segment(100, 130, 0.3),
    segment(131, 300, 0.46),
];
pub const APP_FAIL_INST2: &[InputSegment] = &[
    segment(1, 160, 0.69),
    segment(161, 185, 0.59),
    segment(186, 300, 0.69),
];

/// Mean of `profile` at `step`
pub fn profile_mean(profile: &[InputSegment], step: usize) -> Option<f64> {
    profile
        .iter()
        .find(|s| (s.from..=s.to).contains(&step))
        .map(|s| s.value)
}

fn draw<R: Rng + ?Sized>(mean: f64, deviation: f64, rng: &mut R) -> f64 {
    let deviation = deviation.abs();
    let noise = Uniform::new_inclusive(-deviation, deviation).sample(rng);
    (mean + noise).clamp(0.0, 1.0)
}

/// Draw a series for every step covered by `profile`
///
/// Values are clamped to `[0, 1]`.
pub fn generate_series<R: Rng + ?Sized>(
    profile: &[InputSegment],
    deviation: f64,
    rng: &mut R,
) -> Series {
    profile
        .iter()
        .flat_map(|s| s.from..=s.to)
        .map(|step| {
            // Segments cover the step by construction
            let mean = profile_mean(profile, step).unwrap_or_default();
            (step, draw(mean, deviation, rng))
        })
        .collect()
}

/// A source of instance reliabilities for one measurement step
#[derive(Debug, Clone)]
pub enum ReliabilityFeed {
    /// Pre-drawn series per instance ordinal of one application or the `VI` pool
    Recorded {
        application: String,
        series: BTreeMap<u64, Series>,
    },
    /// Fresh draws for `App#first` up to `App#last` (or every application)
    ///
    /// Ordinal `k` follows `profiles[(k - 1) % profiles.len()]`.
    Profiled {
        first: usize,
        last: Option<usize>,
        instances: usize,
        profiles: Vec<&'static [InputSegment]>,
        deviation: f64,
    },
}

impl ReliabilityFeed {
    /// Pre-draw one series per profile, ordinals starting at 1
    pub fn recorded<R: Rng + ?Sized>(
        application: &str,
        profiles: &[&[InputSegment]],
        deviation: f64,
        rng: &mut R,
    ) -> Self {
        let series = profiles
            .iter()
            .enumerate()
            .map(|(i, profile)| (i as u64 + 1, generate_series(profile, deviation, rng)))
            .collect();
        Self::Recorded {
            application: application.to_string(),
            series,
        }
    }

    /// Push the values for `step` into the model
    pub fn apply<R: Rng + ?Sized>(
        &self,
        model: &mut SystemModel,
        step: usize,
        rng: &mut R,
    ) -> Result<()> {
        match self {
            Self::Recorded {
                application,
                series,
            } => {
                let mut values = BTreeMap::new();
                for (ordinal, s) in series {
                    let value = s.get(&step).copied().ok_or_else(|| ModelError::IncompleteSeries {
                        name: format!("{}/{}", application, ordinal),
                        step,
                    })?;
                    values.insert(*ordinal, value);
                }
                model.update_application_reliability(application, &values)
            }
            Self::Profiled {
                first,
                last,
                instances,
                profiles,
                deviation,
            } => {
                if profiles.is_empty() {
                    return Ok(());
                }
                let ordinary = model.applications.values().filter(|a| !a.is_vi()).count();
                let last = last.unwrap_or(ordinary).min(ordinary);
                for app in *first..=last {
                    let name = format!("App#{}", app);
                    let mut values = BTreeMap::new();
                    for ordinal in 1..=*instances {
                        let profile = profiles[(ordinal - 1) % profiles.len()];
                        let mean = profile_mean(profile, step).ok_or_else(|| {
                            ModelError::IncompleteSeries {
                                name: format!("{}/{}", name, ordinal),
                                step,
                            }
                        })?;
                        values.insert(ordinal as u64, draw(mean, *deviation, rng));
                    }
                    model.update_application_reliability(&name, &values)?;
                }
                Ok(())
            }
        }
    }
}

/// Reference hierarchy a measurement runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scenario {
    Depth2,
    Depth3,
    Depth4,
}

impl Scenario {
    pub const ALL: [Scenario; 3] = [Scenario::Depth4, Scenario::Depth3, Scenario::Depth2];

    pub fn model(&self) -> SystemModel {
        match self {
            Scenario::Depth2 => fixtures::depth2(),
            Scenario::Depth3 => fixtures::depth3(),
            Scenario::Depth4 => fixtures::depth4(),
        }
    }

    /// Input feeds with series drawn up front
    pub fn feeds<R: Rng + ?Sized>(&self, deviation: f64, rng: &mut R) -> Vec<ReliabilityFeed> {
        let mut feeds = vec![
            ReliabilityFeed::recorded(
                "App#1",
                &[APP1_INST1, APP1_INST2, APP1_INST3],
                deviation,
                rng,
            ),
            ReliabilityFeed::recorded("App#2", &[APP2_INST1, APP2_INST2], deviation, rng),
        ];
        if matches!(self, Scenario::Depth3 | Scenario::Depth4) {
            feeds.push(ReliabilityFeed::recorded(
                "App#3",
                &[APP3_INST1, APP3_INST2],
                deviation,
                rng,
            ));
        }
        if matches!(self, Scenario::Depth4) {
            feeds.push(ReliabilityFeed::recorded("App#4", &[APP4_INST1], deviation, rng));
        }
        feeds.push(ReliabilityFeed::recorded(VI_APPLICATION, &[VIAAS], deviation, rng));
        feeds
    }
}

/// Measurement settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeasurementConfig {
    pub steps: usize,
    pub deviation: f64,
    pub wide_deviation_factor: f64,
    /// Largest application count of the wide scenario
    pub wide_max_apps: usize,
    /// Application count increment of the wide scenario
    pub wide_step: usize,
}

impl Default for MeasurementConfig {
    fn default() -> Self {
        Self {
            steps: MEASUREMENT_STEPS,
            deviation: DEFAULT_DEVIATION,
            wide_deviation_factor: WIDE_DEVIATION_FACTOR,
            wide_max_apps: 1000,
            wide_step: 10,
        }
    }
}

impl MeasurementConfig {
    pub fn with_deviation(mut self, deviation: f64) -> Self {
        self.deviation = deviation;
        self
    }

    pub fn with_wide_range(mut self, max_apps: usize, step: usize) -> Self {
        self.wide_max_apps = max_apps;
        self.wide_step = step;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.steps == 0 || self.steps > MEASUREMENT_STEPS {
            return Err(ModelError::config(format!(
                "steps must be within 1..={}, got {}",
                MEASUREMENT_STEPS, self.steps
            )));
        }
        if !(self.deviation >= 0.0 && self.deviation.is_finite()) {
            return Err(ModelError::config(format!("invalid deviation {}", self.deviation)));
        }
        if self.wide_step == 0 {
            return Err(ModelError::config("wide step must be positive"));
        }
        Ok(())
    }
}

/// One measured series
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasurementRun {
    pub depth: usize,
    /// Ordinary applications in the model
    pub applications: usize,
    pub reliability: Series,
    pub coefficients: Series,
}

/// ME-ERT-CORE coefficient for every step of `series`
pub fn compute_coefficients(series: &Series, order: usize, steps: usize) -> Result<Series> {
    (1..=steps)
        .map(|step| {
            let value = series.get(&step).copied().ok_or_else(|| ModelError::IncompleteSeries {
                name: "reliability".to_string(),
                step,
            })?;
            Ok((step, me_ert_core_coefficient(value, order)?))
        })
        .collect()
}

fn run_model<R: Rng + ?Sized>(
    mut model: SystemModel,
    feeds: &[ReliabilityFeed],
    steps: usize,
    rng: &mut R,
) -> Result<MeasurementRun> {
    let applications = model.applications.values().filter(|a| !a.is_vi()).count();
    let mut reliability = Series::new();
    for step in 1..=steps {
        for feed in feeds {
            feed.apply(&mut model, step, rng)?;
        }
        model.gather_all_applications_reliabilities()?;
        let value = MeErtCore::new(&mut model).compute_reliability_optimized_simple()?;
        reliability.insert(step, value);
    }

    let coefficients = compute_coefficients(&reliability, applications, steps)?;
    Ok(MeasurementRun {
        depth: model.depth,
        applications,
        reliability,
        coefficients,
    })
}

/// Run one depth scenario
pub fn run<R: Rng + ?Sized>(
    scenario: Scenario,
    config: &MeasurementConfig,
    rng: &mut R,
) -> Result<MeasurementRun> {
    config.validate()?;
    info!(?scenario, steps = config.steps, "running measurement");
    let feeds = scenario.feeds(config.deviation, rng);
    run_model(scenario.model(), &feeds, config.steps, rng)
}

/// Wide scenario results keyed by application count
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WideMeasurement {
    pub reliability: BTreeMap<usize, Series>,
    pub coefficients: BTreeMap<usize, Series>,
}

/// Feeds for the wide models: `App#1` fails, the rest stay nominal
pub fn wide_feeds<R: Rng + ?Sized>(
    instances: usize,
    deviation: f64,
    rng: &mut R,
) -> Vec<ReliabilityFeed> {
    if instances == 2 {
        return vec![
            ReliabilityFeed::recorded("App#1", &[APP_FAIL_INST1, APP_FAIL_INST2], deviation, rng),
            ReliabilityFeed::Profiled {
                first: 2,
                last: None,
                instances,
                profiles: vec![APP_INST1, APP_INST2],
                deviation,
            },
        ];
    }
    vec![
        ReliabilityFeed::Profiled {
            first: 1,
            last: Some(1),
            instances,
            profiles: vec![APP_FAIL_INST1, APP_FAIL_INST2],
            deviation,
        },
        ReliabilityFeed::Profiled {
            first: 2,
            last: None,
            instances,
            profiles: vec![APP_INST1, APP_INST2],
            deviation,
        },
    ]
}

/// Run the wide scenario for 10, 10 + step, .. up to `config.wide_max_apps` applications
pub fn run_wide<R: Rng + ?Sized>(
    config: &MeasurementConfig,
    rng: &mut R,
) -> Result<WideMeasurement> {
    config.validate()?;
    let deviation = config.deviation * config.wide_deviation_factor;
    let feeds = wide_feeds(2, deviation, rng);

    let mut result = WideMeasurement::default();
    for apps in (10..=config.wide_max_apps).step_by(config.wide_step) {
        info!(apps, "running wide measurement");
        let run = run_model(fixtures::wide(apps), &feeds, config.steps, rng)?;
        result.reliability.insert(apps, run.reliability);
        result.coefficients.insert(apps, run.coefficients);
    }
    Ok(result)
}
