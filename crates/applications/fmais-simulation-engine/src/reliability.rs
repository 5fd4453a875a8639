//! Reliability setup and aggregation queries on a [`SystemModel`]
//!
//! ## Random setup
//!
//! - **Application priorities**: drawn from a shrinking unit budget
//! - **Instance priorities**: per application, and per layer for the VI pool
//! - **Instance reliabilities**: uniform in `[0, 1)` for every leaf
//!
//! ## Aggregation
//!
//! [`SystemModel::gather_application_instance_reliabilities`] folds the
//! instances of one application into `Σ reliability * priority` and stores
//! it on the application. [`SystemModel::set_chain_coefficients`] precomputes
//! the ancestor priority products the optimized ME-ERT-CORE pass needs.

use crate::aspects::HasAspects;
use crate::error::{ModelError, Result};
use crate::model::{InstanceId, InstanceKind, SystemModel, VI_APPLICATION};
use rand::Rng;
use std::collections::BTreeMap;
use tracing::debug;

/// Instance name to reliability
pub type InstanceReliabilities = BTreeMap<String, f64>;

impl SystemModel {
    /// Deployed ordinary applications with their declared instance count
    fn deployed_applications(&self) -> Vec<(String, usize)> {
        self.applications
            .values()
            .filter(|app| app.state && !app.is_vi())
            .map(|app| (app.name.clone(), app.rules))
            .collect()
    }

    /// Instances of `application`, checked against its declared count
    fn counted_instances(&self, application: &str, expected: usize) -> Result<Vec<InstanceId>> {
        let ids = self.instances_of(application);
        if ids.len() != expected {
            return Err(ModelError::InstanceCountMismatch {
                application: application.to_string(),
                expected,
                found: ids.len(),
            });
        }
        Ok(ids)
    }

    /// Random priorities for all applications, summing to at most 1
    pub fn set_application_priorities_random<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let mut budget = 1.0;
        for app in self.applications.values_mut() {
            let priority = rng.r#gen::<f64>() * budget;
            app.set_priority(priority);
            budget -= priority;
        }
    }

    /// Random instance priorities
    ///
    /// Instances of one application share a unit budget; VI instances share a
    /// unit budget per layer. A root-only model gives the root a priority.
    pub fn set_instance_priorities_random<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<()> {
        if self.layer_count() == 1 {
            let root = self.root()?;
            self.instance_mut(root).set_priority(rng.r#gen());
            return Ok(());
        }

        for (name, rules) in self.deployed_applications() {
            let mut budget = 1.0;
            for id in self.counted_instances(&name, rules)? {
                let priority = rng.r#gen::<f64>() * budget;
                self.instance_mut(id).set_priority(priority);
                budget -= priority;
            }
        }

        let mut vi_seen = 0u64;
        for level in 2..=self.layer_count() {
            if !self.layer(level - 1)?.vi_deployed {
                break;
            }
            let pool: Vec<InstanceId> = self
                .layer(level)?
                .instances
                .iter()
                .copied()
                .filter(|id| self.instance(*id).is_vi())
                .collect();
            let mut budget = 1.0;
            for id in pool {
                let priority = rng.r#gen::<f64>() * budget;
                self.instance_mut(id).set_priority(priority);
                budget -= priority;
                vi_seen += 1;
            }
        }

        let expected = self.vi_count().saturating_sub(1);
        if vi_seen != expected {
            return Err(ModelError::InstanceCountMismatch {
                application: VI_APPLICATION.to_string(),
                expected: expected as usize,
                found: vi_seen as usize,
            });
        }
        Ok(())
    }

    /// Random reliabilities for every leaf instance
    pub fn set_instance_reliabilities_random<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
    ) -> Result<()> {
        let deployed = self.deployed_applications();
        if deployed.is_empty() && self.layer_count() == 1 {
            let root = self.root()?;
            self.instance_mut(root).set_reliability(rng.r#gen());
            return Ok(());
        }

        for (name, rules) in deployed {
            for id in self.counted_instances(&name, rules)? {
                self.instance_mut(id).set_reliability(rng.r#gen());
            }
        }
        for id in self.vi_leaves() {
            self.instance_mut(id).set_reliability(rng.r#gen());
        }
        Ok(())
    }

    /// Reliability of each instance of `application`
    ///
    /// Also stores `Σ reliability * priority` over those instances as the
    /// application's reliability.
    ///
    /// # Errors
    ///
    /// Unknown, undeployed or VI applications, and instances missing either aspect.
    pub fn gather_application_instance_reliabilities(
        &mut self,
        application: &str,
    ) -> Result<InstanceReliabilities> {
        let app = self.application(application)?;
        if app.is_vi() {
            return Err(ModelError::VirtualizationPool(application.to_string()));
        }
        if !app.state {
            return Err(ModelError::ApplicationNotDeployed(application.to_string()));
        }
        let rules = app.rules;

        let mut reliabilities = InstanceReliabilities::new();
        let mut weighted = 0.0;
        for id in self.counted_instances(application, rules)? {
            let instance = self.instance(id);
            let reliability = instance.reliability()?;
            weighted += reliability * instance.priority()?;
            reliabilities.insert(instance.name.clone(), reliability);
        }

        self.application_mut(application)?.set_reliability(weighted);
        Ok(reliabilities)
    }

    /// [`Self::gather_application_instance_reliabilities`] for every deployed application
    pub fn gather_all_applications_reliabilities(
        &mut self,
    ) -> Result<BTreeMap<String, InstanceReliabilities>> {
        let mut all = BTreeMap::new();
        for (name, _) in self.deployed_applications() {
            let reliabilities = self.gather_application_instance_reliabilities(&name)?;
            all.insert(name, reliabilities);
        }
        Ok(all)
    }

    /// Overwrite instance reliabilities from externally supplied values
    ///
    /// `values` maps instance ordinal to reliability. An ordinary application
    /// must have one matching instance per value. `VI` targets every VI leaf,
    /// a full VI instance name targets that instance; VI lookups fall back to
    /// the value under ordinal 1.
    pub fn update_application_reliability(
        &mut self,
        target: &str,
        values: &BTreeMap<u64, f64>,
    ) -> Result<()> {
        let vi_target = target
            .get(..VI_APPLICATION.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(VI_APPLICATION));
        let pool_target = target.eq_ignore_ascii_case(VI_APPLICATION);
        if !vi_target {
            let known = self
                .applications
                .keys()
                .any(|name| name.eq_ignore_ascii_case(target));
            if !known {
                return Err(ModelError::UnknownApplication(target.to_string()));
            }
        }

        let mut updated = 0usize;
        'layers: for level in (2..=self.layer_count()).rev() {
            let ids = self.layer(level)?.instances.clone();
            for id in ids {
                if !vi_target && updated == values.len() {
                    break 'layers;
                }
                let instance = self.instance(id);
                let parsed = instance.parsed_name()?;

                let value = if vi_target {
                    if !instance.is_vi() || !instance.is_leaf() {
                        continue;
                    }
                    if !pool_target && !instance.name.eq_ignore_ascii_case(target) {
                        continue;
                    }
                    values.get(&parsed.ordinal).or_else(|| values.get(&1))
                } else {
                    if instance.kind != InstanceKind::App
                        || !parsed.application.eq_ignore_ascii_case(target)
                    {
                        continue;
                    }
                    values.get(&parsed.ordinal)
                };

                let value = value.copied().ok_or_else(|| ModelError::MissingReliabilityInput {
                    application: target.to_string(),
                    ordinal: parsed.ordinal,
                })?;
                self.instance_mut(id).set_reliability(value);
                updated += 1;
            }
        }

        if vi_target && updated == 0 {
            return Err(ModelError::InstanceNotFound(target.to_string()));
        }
        if !vi_target && updated != values.len() {
            return Err(ModelError::InstanceCountMismatch {
                application: target.to_string(),
                expected: values.len(),
                found: updated,
            });
        }
        Ok(())
    }

    /// Precompute chain coefficients for every leaf below the root
    ///
    /// A leaf's coefficient is the product of the priorities of its non-root
    /// ancestors. Each deployed application takes the coefficient of its
    /// first instance found from the deepest layer up. Running it twice
    /// gives the same values.
    pub fn set_chain_coefficients(&mut self) -> Result<()> {
        let parents = self.parent_index();
        let root = self.root()?;
        let mut first_found: BTreeMap<String, f64> = BTreeMap::new();

        for level in (2..=self.layer_count()).rev() {
            let ids = self.layer(level)?.instances.clone();
            for id in ids {
                if !self.instance(id).is_leaf() {
                    continue;
                }
                let mut coefficient = 1.0;
                let mut ancestor = parents[id.0];
                while let Some(parent) = ancestor {
                    if parent == root {
                        break;
                    }
                    coefficient *= self.instance(parent).priority()?;
                    ancestor = parents[parent.0];
                }

                let owner = self.instance(id).parsed_name()?.application;
                first_found.entry(owner).or_insert(coefficient);
                self.instance_mut(id).set_chain_coefficient(coefficient);
            }
        }

        for (name, coefficient) in first_found {
            if let Some(app) = self.applications.get_mut(&name) {
                if !app.is_vi() {
                    app.set_chain_coefficient(coefficient);
                }
            }
        }
        debug!(instances = self.total_instances(), "chain coefficients set");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn random_model(seed: u64) -> SystemModel {
        let mut rng = StdRng::seed_from_u64(seed);
        let names = SystemModel::generate_app_names(25);
        let mut model = SystemModel::new(names.len(), 4);
        model.create_random_applications(&names, 1, 5, &mut rng);
        model.generate(&mut rng);
        model
    }

    #[test]
    fn test_application_priorities_fit_budget() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut model = random_model(9);
        model.set_application_priorities_random(&mut rng);
        let total: f64 = model
            .applications
            .values()
            .map(|a| a.priority().unwrap())
            .sum();
        assert!(total <= 1.0 + 1e-12);
    }

    #[test]
    fn test_sibling_priorities_fit_budget() {
        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut model = random_model(seed);
            model.set_instance_priorities_random(&mut rng).unwrap();

            for app in model.applications.values().filter(|a| a.state && !a.is_vi()) {
                let total: f64 = model
                    .instances_of(&app.name)
                    .iter()
                    .map(|id| model.instance(*id).priority().unwrap())
                    .sum();
                assert!(total <= 1.0 + 1e-12, "{} sums to {}", app.name, total);
            }
            for (_, layer) in model.layers().skip(1) {
                let total: f64 = layer
                    .instances
                    .iter()
                    .filter(|id| model.instance(**id).is_vi())
                    .map(|id| model.instance(*id).priority().unwrap())
                    .sum();
                assert!(total <= 1.0 + 1e-12);
            }
        }
    }

    #[test]
    fn test_root_only_model_gets_root_aspects() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut model = SystemModel::new(1, 3);
        model.create_application(1, 0.0, "App#1");
        model.generate(&mut rng);
        model.set_instance_priorities_random(&mut rng).unwrap();
        model.set_instance_reliabilities_random(&mut rng).unwrap();
        let root = model.instance(model.root().unwrap());
        assert!(root.priority().is_ok());
        assert!(root.reliability().is_ok());
    }

    #[test]
    fn test_random_reliabilities_cover_leaves() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut model = random_model(4);
        model.set_instance_reliabilities_random(&mut rng).unwrap();
        for (_, layer) in model.layers().skip(1) {
            for id in &layer.instances {
                let instance = model.instance(*id);
                if instance.is_leaf() {
                    let r = instance.reliability().unwrap();
                    assert!((0.0..1.0).contains(&r));
                }
            }
        }
    }

    #[test]
    fn test_gather_basic() {
        let mut model = fixtures::basic();
        let gathered = model.gather_application_instance_reliabilities("App#1").unwrap();
        assert_eq!(gathered.len(), 3);
        assert_eq!(gathered["App#1-1-2"], 0.77);
        // 0.77*0.2 + 0.34*0.5 + 0.62*0.3
        let stored = model.application("App#1").unwrap().reliability().unwrap();
        assert!((stored - 0.51).abs() < 1e-12);
    }

    #[test]
    fn test_gather_errors_do_not_panic() {
        let mut model = fixtures::basic();
        model.create_application(2, 0.5, "App#9");
        assert!(matches!(
            model.gather_application_instance_reliabilities("App#9"),
            Err(ModelError::ApplicationNotDeployed(_))
        ));
        assert!(matches!(
            model.gather_application_instance_reliabilities(VI_APPLICATION),
            Err(ModelError::VirtualizationPool(_))
        ));
        assert!(matches!(
            model.gather_application_instance_reliabilities("App#42"),
            Err(ModelError::UnknownApplication(_))
        ));
    }

    #[test]
    fn test_gather_all_skips_undeployed() {
        let mut model = fixtures::basic();
        model.create_application(2, 0.5, "App#9");
        let all = model.gather_all_applications_reliabilities().unwrap();
        assert_eq!(all.keys().collect::<Vec<_>>(), vec!["App#1", "App#2"]);
    }

    #[test]
    fn test_update_application_reliability() {
        let mut model = fixtures::depth2();
        let values = BTreeMap::from([(1, 0.9), (2, 0.8)]);
        model.update_application_reliability("app#2", &values).unwrap();
        let id = model.get_instance("App#2-2-2").unwrap();
        assert_eq!(model.instance(id).reliability().unwrap(), 0.8);

        let too_few = BTreeMap::from([(1, 0.9)]);
        // Stops after one match, which is fine
        model.update_application_reliability("App#2", &too_few).unwrap();

        let too_many = BTreeMap::from([(1, 0.9), (2, 0.8), (3, 0.7)]);
        assert!(matches!(
            model.update_application_reliability("App#2", &too_many),
            Err(ModelError::InstanceCountMismatch { expected: 3, found: 2, .. })
        ));
        assert!(matches!(
            model.update_application_reliability("App#7", &values),
            Err(ModelError::UnknownApplication(_))
        ));
    }

    #[test]
    fn test_update_missing_ordinal() {
        let mut model = fixtures::depth2();
        let values = BTreeMap::from([(1, 0.9), (5, 0.8)]);
        assert!(matches!(
            model.update_application_reliability("App#2", &values),
            Err(ModelError::MissingReliabilityInput { ordinal: 2, .. })
        ));
    }

    #[test]
    fn test_update_vi_pool_uses_relaxed_key() {
        let mut model = fixtures::depth3();
        model
            .update_application_reliability(VI_APPLICATION, &BTreeMap::from([(1, 0.3)]))
            .unwrap();
        for id in model.vi_leaves() {
            assert_eq!(model.instance(id).reliability().unwrap(), 0.3);
        }
        assert!(model
            .update_application_reliability("VI#99-1-3", &BTreeMap::from([(1, 0.3)]))
            .is_err());
    }

    #[test]
    fn test_update_vi_pool_ignores_case() {
        let mut model = fixtures::depth3();
        model
            .update_application_reliability("vi", &BTreeMap::from([(1, 0.45)]))
            .unwrap();
        for id in model.vi_leaves() {
            assert_eq!(model.instance(id).reliability().unwrap(), 0.45);
        }

        let leaf = model.vi_leaves()[0];
        let name = model.instance(leaf).name.to_lowercase();
        model
            .update_application_reliability(&name, &BTreeMap::from([(1, 0.2)]))
            .unwrap();
        assert_eq!(model.instance(leaf).reliability().unwrap(), 0.2);
    }

    #[test]
    fn test_random_priorities_count_mismatch() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut model = fixtures::basic();
        model.applications.get_mut("App#1").unwrap().rules = 4;
        assert!(matches!(
            model.set_instance_priorities_random(&mut rng),
            Err(ModelError::InstanceCountMismatch { expected: 4, found: 3, .. })
        ));
        assert!(matches!(
            model.set_instance_reliabilities_random(&mut rng),
            Err(ModelError::InstanceCountMismatch { expected: 4, found: 3, .. })
        ));
    }

    #[test]
    fn test_random_priorities_vi_pool_mismatch() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut snapshot = serde_json::to_value(fixtures::basic()).unwrap();
        snapshot["vi_counter"] = serde_json::json!(9);
        let mut model: SystemModel = serde_json::from_value(snapshot).unwrap();
        assert!(matches!(
            model.set_instance_priorities_random(&mut rng),
            Err(ModelError::InstanceCountMismatch { expected: 8, found: 4, .. })
        ));
    }

    #[test]
    fn test_chain_coefficients() {
        let mut model = fixtures::basic();
        model.set_chain_coefficients().unwrap();

        let app2 = model.get_instance("App#2-1-3").unwrap();
        assert_eq!(model.instance(app2).chain_coefficient().unwrap(), 0.25);
        let app1 = model.get_instance("App#1-1-2").unwrap();
        assert_eq!(model.instance(app1).chain_coefficient().unwrap(), 1.0);
        assert_eq!(model.application("App#2").unwrap().chain_coefficient().unwrap(), 0.25);
        assert!(model.application(VI_APPLICATION).unwrap().chain_coefficient().is_err());
    }

    #[test]
    fn test_chain_coefficients_idempotent() {
        let mut model = fixtures::depth4();
        model.set_chain_coefficients().unwrap();
        let first = serde_json::to_string(&model).unwrap();
        model.set_chain_coefficients().unwrap();
        assert_eq!(first, serde_json::to_string(&model).unwrap());
    }

    #[test]
    fn test_chain_coefficients_need_priorities() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut model = SystemModel::new(2, 4);
        model.create_application(1, 1.0, "App#1");
        model.create_application(1, 1.0, VI_APPLICATION);
        model.generate(&mut rng);
        assert!(matches!(
            model.set_chain_coefficients(),
            Err(ModelError::MissingAspect { .. })
        ));
    }
}
