//! ME-ERT-CORE reliability aggregation
//!
//! ## Variants
//!
//! - **Canonical**: walks the hierarchy bottom-up. Every host's reliability
//!   is the sum over its children of `reliability * priority * owner priority`,
//!   where the owner is the child's application (or the VI application).
//! - **Optimized**: one pass over applications. Each deployed application
//!   contributes `reliability * priority * chain coefficient`, the VI leaves
//!   are pooled under the VI application's priority.
//! - **Simple**: the optimized pass with every chain coefficient taken as 1.
//!
//! The optimized pass matches the canonical value when the VI application's
//! priority is 1. The simple pass is an approximation and diverges otherwise.
//!
//! Both optimized passes read application reliabilities produced by
//! [`SystemModel::gather_all_applications_reliabilities`] and overwrite them
//! with the contributions, so gather again before the next pass.

use crate::aspects::HasAspects;
use crate::error::{ModelError, Result};
use crate::model::{SystemModel, VI_APPLICATION};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Which aggregation to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ReliabilityVariant {
    #[default]
    Canonical,
    Optimized,
    Simple,
}

impl fmt::Display for ReliabilityVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReliabilityVariant::Canonical => "canonical",
            ReliabilityVariant::Optimized => "optimized",
            ReliabilityVariant::Simple => "simple",
        };
        f.write_str(name)
    }
}

/// Reliability engine bound to one model
pub struct MeErtCore<'a> {
    model: &'a mut SystemModel,
    reliability: Option<f64>,
}

impl<'a> MeErtCore<'a> {
    pub fn new(model: &'a mut SystemModel) -> Self {
        Self {
            model,
            reliability: None,
        }
    }

    /// Result of the last computation
    pub fn reliability(&self) -> Option<f64> {
        self.reliability
    }

    pub fn model(&self) -> &SystemModel {
        self.model
    }

    /// Run the given variant
    pub fn compute(&mut self, variant: ReliabilityVariant) -> Result<f64> {
        match variant {
            ReliabilityVariant::Canonical => self.compute_reliability_per_definition(),
            ReliabilityVariant::Optimized => self.compute_reliability_optimized(),
            ReliabilityVariant::Simple => self.compute_reliability_optimized_simple(),
        }
    }

    /// Bottom-up weighted sum, stored on every host and returned for the root
    ///
    /// # Errors
    ///
    /// Any missing layer, aspect or application, and unparsable instance names.
    pub fn compute_reliability_per_definition(&mut self) -> Result<f64> {
        let root = self.model.root()?;
        if self.model.layer_count() == 1 {
            let reliability = self.model.instance(root).reliability()?;
            return self.finish(reliability);
        }

        for level in (1..=self.model.layer_count()).rev() {
            let hosts = self.model.layer(level)?.instances.clone();
            for host in hosts {
                let children = &self.model.instance(host).relations;
                if children.is_empty() {
                    continue;
                }
                let mut total = 0.0;
                for child in children {
                    let instance = self.model.instance(*child);
                    let weight = self.model.owner_of(*child)?.priority()?;
                    total += instance.reliability()? * instance.priority()? * weight;
                }
                self.model.instance_mut(host).set_reliability(total);
            }
        }

        let reliability = self.model.instance(root).reliability()?;
        self.finish(reliability)
    }

    /// Single pass over applications using chain coefficients
    pub fn compute_reliability_optimized(&mut self) -> Result<f64> {
        self.aggregate_applications(true)
    }

    /// Single pass over applications with unit chain coefficients
    pub fn compute_reliability_optimized_simple(&mut self) -> Result<f64> {
        self.aggregate_applications(false)
    }

    fn aggregate_applications(&mut self, chained: bool) -> Result<f64> {
        if self.model.layer_count() == 1 {
            let root = self.model.root()?;
            let reliability = self.model.instance(root).reliability()?;
            return self.finish(reliability);
        }

        let mut contributions = Vec::new();
        for app in self.model.applications.values().filter(|a| a.state && !a.is_vi()) {
            let coefficient = if chained { app.chain_coefficient()? } else { 1.0 };
            let contribution = app.reliability()? * app.priority()? * coefficient;
            contributions.push((app.name.clone(), contribution));
        }

        let leaves = self.model.vi_leaves();
        let pooled = if leaves.is_empty() {
            None
        } else {
            let vi_priority = self.model.application(VI_APPLICATION)?.priority()?;
            let mut pooled = 0.0;
            for id in leaves {
                let leaf = self.model.instance(id);
                let coefficient = if chained { leaf.chain_coefficient()? } else { 1.0 };
                pooled += leaf.reliability()? * leaf.priority()? * vi_priority * coefficient;
            }
            Some(pooled)
        };

        let mut total = 0.0;
        for (name, contribution) in contributions {
            self.model.application_mut(&name)?.set_reliability(contribution);
            total += contribution;
        }
        if let Some(pooled) = pooled {
            self.model.application_mut(VI_APPLICATION)?.set_reliability(pooled);
            total += pooled;
        }
        self.finish(total)
    }

    fn finish(&mut self, reliability: f64) -> Result<f64> {
        debug!(reliability, "ME-ERT-CORE computed");
        self.reliability = Some(reliability);
        Ok(reliability)
    }
}

/// Normalize a reliability into the ME-ERT-CORE coefficient
///
/// Scales `value` by `10^(d - 1)`, where `d` is the number of decimal digits
/// of `order`, and returns the fractional part of the result.
///
/// # Arguments
///
/// * `value` - System reliability
/// * `order` - Magnitude reference, usually the number of applications
///
/// # Returns
///
/// The digits after the decimal point, as a number in `[0, 1)`
pub fn me_ert_core_coefficient(value: f64, order: usize) -> Result<f64> {
    let digits = order.max(1).to_string().len() as i32;
    let scaled = value * 10f64.powi(digits - 1);
    let text = scaled.to_string();
    let (_, fraction) = text
        .split_once('.')
        .ok_or_else(|| ModelError::NoFractionalPart(text.clone()))?;
    format!("0.{}", fraction)
        .parse::<f64>()
        .map_err(|_| ModelError::NoFractionalPart(text.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {}, got {}",
            expected,
            actual
        );
    }

    #[test]
    fn test_canonical_basic() {
        let mut model = fixtures::basic();
        let mut core = MeErtCore::new(&mut model);
        let reliability = core.compute_reliability_per_definition().unwrap();
        assert_eq!(format!("{:.12}", reliability), "0.155589687500");
        assert_eq!(core.reliability(), Some(reliability));
    }

    #[test]
    fn test_canonical_is_deterministic() {
        let mut model = fixtures::basic();
        let first = MeErtCore::new(&mut model).compute_reliability_per_definition().unwrap();
        let second = MeErtCore::new(&mut model).compute_reliability_per_definition().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_canonical_sets_host_reliability() {
        let mut model = fixtures::basic();
        MeErtCore::new(&mut model).compute_reliability_per_definition().unwrap();
        let vi = model.get_instance("VI#2-1-2").unwrap();
        assert!(model.instance(vi).reliability().is_ok());
    }

    #[test]
    fn test_optimized_matches_canonical_with_unit_vi_priority() {
        let mut model = fixtures::basic();
        model.application_mut(VI_APPLICATION).unwrap().set_priority(1.0);
        let canonical = MeErtCore::new(&mut model).compute_reliability_per_definition().unwrap();

        model.gather_all_applications_reliabilities().unwrap();
        model.set_chain_coefficients().unwrap();
        let optimized = MeErtCore::new(&mut model).compute_reliability_optimized().unwrap();

        assert_close(canonical, 0.260975);
        assert_close(optimized, canonical);
    }

    #[test]
    fn test_simple_diverges_from_canonical() {
        let mut model = fixtures::basic();
        let canonical = MeErtCore::new(&mut model).compute_reliability_per_definition().unwrap();
        model.gather_all_applications_reliabilities().unwrap();
        let simple = MeErtCore::new(&mut model).compute_reliability_optimized_simple().unwrap();
        assert!((canonical - simple).abs() > 1e-6);
    }

    #[test]
    fn test_simple_depth_fixtures() {
        let cases = [
            (fixtures::depth2(), 0.506727),
            (fixtures::depth3(), 0.536827),
            (fixtures::depth4(), 0.557274),
        ];
        for (mut model, expected) in cases {
            model.gather_all_applications_reliabilities().unwrap();
            let mut core = MeErtCore::new(&mut model);
            assert_close(core.compute(ReliabilityVariant::Simple).unwrap(), expected);
        }
    }

    #[test]
    fn test_optimized_requires_gather() {
        let mut model = fixtures::depth2();
        model.set_chain_coefficients().unwrap();
        assert!(matches!(
            MeErtCore::new(&mut model).compute_reliability_optimized(),
            Err(ModelError::MissingAspect { .. })
        ));
    }

    #[test]
    fn test_missing_priority_aborts() {
        let mut rng = StdRng::seed_from_u64(11);
        let names = SystemModel::generate_app_names(5);
        let mut model = SystemModel::new(names.len(), 3);
        for name in &names {
            model.create_application(2, 1.0, name);
        }
        model.generate(&mut rng);
        model.set_instance_reliabilities_random(&mut rng).unwrap();
        assert!(MeErtCore::new(&mut model).compute_reliability_per_definition().is_err());
    }

    #[test]
    fn test_canonical_unknown_application() {
        let mut model = fixtures::basic();
        model.applications.remove("App#2");
        assert!(matches!(
            MeErtCore::new(&mut model).compute_reliability_per_definition(),
            Err(ModelError::UnknownApplication(name)) if name == "App#2"
        ));
    }

    #[test]
    fn test_random_model_end_to_end() {
        let mut rng = StdRng::seed_from_u64(21);
        let names = SystemModel::generate_app_names(20);
        let mut model = SystemModel::new(names.len(), 4);
        model.create_random_applications(&names, 1, 4, &mut rng);
        model.generate(&mut rng);
        model.set_application_priorities_random(&mut rng);
        model.set_instance_priorities_random(&mut rng).unwrap();
        model.set_instance_reliabilities_random(&mut rng).unwrap();

        let reliability = MeErtCore::new(&mut model).compute_reliability_per_definition().unwrap();
        assert!((0.0..=1.0).contains(&reliability));
    }

    #[test]
    fn test_root_only_model() {
        let mut model = SystemModel::new(0, 1);
        let root = model.initialize_root_layer();
        model.instance_mut(root).set_reliability(0.9);
        let mut core = MeErtCore::new(&mut model);
        assert_eq!(core.compute_reliability_per_definition().unwrap(), 0.9);
        assert_eq!(core.compute_reliability_optimized_simple().unwrap(), 0.9);
    }

    #[test]
    fn test_coefficient() {
        assert_eq!(me_ert_core_coefficient(0.54893654512, 9).unwrap(), 0.54893654512);
        let c = me_ert_core_coefficient(0.54893654512, 11).unwrap();
        assert!((c - 0.4893654512).abs() < 1e-12);
        let c = me_ert_core_coefficient(0.54893654512, 100).unwrap();
        assert!((c - 0.893654512).abs() < 1e-12);
    }

    #[test]
    fn test_coefficient_without_fraction() {
        assert!(matches!(
            me_ert_core_coefficient(1.0, 5),
            Err(ModelError::NoFractionalPart(_))
        ));
    }

    #[test]
    fn test_variant_serde() {
        let json = serde_json::to_string(&ReliabilityVariant::Simple).unwrap();
        assert_eq!(json, "\"simple\"");
        let back: ReliabilityVariant = serde_json::from_str("\"optimized\"").unwrap();
        assert_eq!(back, ReliabilityVariant::Optimized);
    }
}
