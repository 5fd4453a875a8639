//! Probabilistic hierarchy generator
//!
//! Builds a Fractal MAIS layer by layer from the root. Every VI instance of
//! the previous layer is offered every application in name order; an
//! application deploys with its own probability and then creates `rules`
//! instances on the host. Ordinary applications deploy once per model, the
//! VI application may deploy on any host, which is what lets the hierarchy
//! grow deeper.
//!
//! # Example
//!
//! ```
//! use fmais_simulation_engine::model::SystemModel;
//! use rand::{SeedableRng, rngs::StdRng};
//!
//! let mut rng = StdRng::seed_from_u64(7);
//! let names = SystemModel::generate_app_names(10);
//! let mut model = SystemModel::new(names.len(), 4);
//! model.create_random_applications(&names, 1, 5, &mut rng);
//! model.generate(&mut rng);
//! assert_eq!(model.layer(1).unwrap().instances.len(), 1);
//! ```

use crate::model::{InstanceKind, SystemModel, VI_APPLICATION, app_instance_name, vi_instance_name};
use rand::Rng;
use tracing::debug;

impl SystemModel {
    /// Application names `VI, App#1, .., App#n`
    pub fn generate_app_names(n: usize) -> Vec<String> {
        std::iter::once(VI_APPLICATION.to_string())
            .chain((1..=n).map(|i| format!("App#{}", i)))
            .collect()
    }

    /// Register applications with random probabilities and instance counts
    ///
    /// Probabilities are drawn from a shrinking unit budget, so together they
    /// never exceed 1. Instance counts are uniform in `[max(min, 1), max)`, or
    /// 1 when that range is empty.
    pub fn create_random_applications<R: Rng + ?Sized>(
        &mut self,
        names: &[String],
        min: usize,
        max: usize,
        rng: &mut R,
    ) {
        let mut budget = 1.0;
        for name in names {
            let probability = rng.r#gen::<f64>() * budget;
            let min = min.max(1);
            let rules = if max > min { rng.gen_range(min..max) } else { 1 };
            self.create_application(rules, probability, name);
            budget -= probability;
        }
    }

    /// Build the hierarchy from the registered applications
    ///
    /// Any previous hierarchy is discarded. Generation stops at `depth`
    /// layers, or earlier when a layer hosts no VI or nothing deploys.
    pub fn generate<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.initialize_root_layer();
        for app in self.applications.values_mut() {
            app.state = false;
        }
        let names: Vec<String> = self.applications.keys().cloned().collect();

        for level in 2..=self.depth {
            let hosts: Vec<_> = match self.layer(level - 1) {
                Ok(previous) if previous.vi_deployed => previous
                    .instances
                    .iter()
                    .copied()
                    .filter(|id| self.instance(*id).is_vi())
                    .collect(),
                _ => break,
            };

            let mut opened = false;
            for host in hosts {
                for name in &names {
                    let app = &self.applications[name];
                    let is_vi = app.is_vi();
                    if app.state && !is_vi {
                        continue;
                    }
                    let (probability, rules) = (app.probability, app.rules);
                    if rng.r#gen::<f64>() >= probability || rules == 0 {
                        continue;
                    }

                    if !opened {
                        self.open_layer();
                        opened = true;
                    }
                    for ordinal in 1..=rules {
                        let (child_name, kind) = if is_vi {
                            let number = self.vi_count() + 1;
                            (vi_instance_name(number, ordinal, level), InstanceKind::Vi)
                        } else {
                            (app_instance_name(name, ordinal, level), InstanceKind::App)
                        };
                        let child = self.push_unchecked(level, child_name, kind);
                        self.instance_mut(host).relations.push(child);
                    }
                    if let Some(app) = self.applications.get_mut(name) {
                        app.state = true;
                    }
                }
            }

            if !opened {
                debug!(level, "nothing deployed, generation stops");
                break;
            }
            debug!(
                level,
                instances = self.layer(level).map(|l| l.instances.len()).unwrap_or(0),
                "layer generated"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aspects::HasAspects;
    use crate::meertcore::MeErtCore;
    use crate::model::ROOT_NAME;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn random_model(seed: u64, apps: usize, depth: usize, max_instances: usize) -> SystemModel {
        let mut rng = StdRng::seed_from_u64(seed);
        let names = SystemModel::generate_app_names(apps);
        let mut model = SystemModel::new(names.len(), depth);
        model.create_random_applications(&names, 1, max_instances, &mut rng);
        model.generate(&mut rng);
        model
    }

    #[test]
    fn test_generate_app_names() {
        assert_eq!(
            SystemModel::generate_app_names(3),
            vec!["VI", "App#1", "App#2", "App#3"]
        );
        assert_eq!(SystemModel::generate_app_names(0), vec!["VI"]);
    }

    #[test]
    fn test_random_probabilities_fit_unit_budget() {
        let mut rng = StdRng::seed_from_u64(1);
        let names = SystemModel::generate_app_names(50);
        let mut model = SystemModel::new(names.len(), 3);
        model.create_random_applications(&names, 2, 6, &mut rng);

        let total: f64 = model.applications.values().map(|a| a.probability).sum();
        assert!(total <= 1.0 + 1e-12);
        assert!(model.applications.values().all(|a| (2..6).contains(&a.rules)));
    }

    #[test]
    fn test_empty_instance_range_deploys_one() {
        let mut rng = StdRng::seed_from_u64(1);
        let names = SystemModel::generate_app_names(4);
        let mut model = SystemModel::new(names.len(), 3);
        model.create_random_applications(&names, 3, 3, &mut rng);
        assert!(model.applications.values().all(|a| a.rules == 1));
    }

    #[test]
    fn test_certain_deployment() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut model = SystemModel::new(2, 3);
        model.create_application(2, 1.0, "App#1");
        model.create_application(1, 1.0, VI_APPLICATION);
        model.generate(&mut rng);

        // Layer 2: App#1 twice plus one VI; layer 3: the VI hosts another VI
        let layer2 = model.layer(2).unwrap();
        assert_eq!(layer2.instances.len(), 3);
        assert!(layer2.vi_deployed);
        assert!(model.get_instance("App#1-1-2").is_ok());
        assert!(model.get_instance("VI#2-1-2").is_ok());
        assert!(model.get_instance("VI#3-1-3").is_ok());
        assert_eq!(model.layer_count(), 3);
        assert!(model.applications["App#1"].state);
    }

    #[test]
    fn test_zero_probability_stops_at_root() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut model = SystemModel::new(1, 4);
        model.create_application(3, 0.0, "App#1");
        model.generate(&mut rng);
        assert_eq!(model.layer_count(), 1);
        assert_eq!(model.instance(model.root().unwrap()).name, ROOT_NAME);
    }

    #[test]
    fn test_zero_rule_application_attaches_no_layer() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut model = SystemModel::new(2, 3);
        model.create_application(0, 1.0, "App#1");
        model.create_application(0, 1.0, VI_APPLICATION);
        model.generate(&mut rng);

        assert_eq!(model.layer_count(), 1);
        assert!(model.layer(2).is_err());
        assert!(!model.applications["App#1"].state);

        model.set_instance_priorities_random(&mut rng).unwrap();
        model.set_instance_reliabilities_random(&mut rng).unwrap();
        let root = model.root().unwrap();
        let expected = model.instance(root).reliability().unwrap();
        let reliability = MeErtCore::new(&mut model)
            .compute_reliability_per_definition()
            .unwrap();
        assert_eq!(reliability, expected);
    }

    #[test]
    fn test_zero_rule_application_beside_deploying_one() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut model = SystemModel::new(2, 3);
        model.create_application(0, 1.0, "App#1");
        model.create_application(2, 1.0, "App#2");
        model.generate(&mut rng);

        assert_eq!(model.layer_count(), 2);
        assert_eq!(model.layer(2).unwrap().instances.len(), 2);
        assert!(model.instances_of("App#1").is_empty());
    }

    #[test]
    fn test_random_applications_deploy_at_least_one_instance() {
        let mut rng = StdRng::seed_from_u64(4);
        let names = SystemModel::generate_app_names(40);
        let mut model = SystemModel::new(names.len(), 3);
        model.create_random_applications(&names, 0, 3, &mut rng);
        assert!(model.applications.values().all(|a| (1..3).contains(&a.rules)));
    }

    #[test]
    fn test_depth_one_is_root_only() {
        let model = random_model(3, 10, 1, 4);
        assert_eq!(model.layer_count(), 1);
        assert_eq!(model.total_instances(), 1);
    }

    #[test]
    fn test_same_seed_same_model() {
        let a = random_model(42, 30, 4, 6);
        let b = random_model(42, 30, 4, 6);
        assert_eq!(a.to_string(), b.to_string());
    }

    #[test]
    fn test_regenerate_resets_state() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut model = SystemModel::new(1, 2);
        model.create_application(1, 1.0, "App#1");
        model.generate(&mut rng);
        model.generate(&mut rng);
        assert_eq!(model.total_instances(), 2);
        assert_eq!(model.vi_count(), 1);
    }

    proptest! {
        #[test]
        fn prop_every_child_has_one_parent(
            seed in any::<u64>(),
            apps in 1usize..40,
            depth in 1usize..5,
            max_instances in 1usize..6,
        ) {
            let model = random_model(seed, apps, depth, max_instances);
            prop_assert_eq!(model.layer(1).unwrap().instances.len(), 1);
            prop_assert!(model.layer_count() <= depth.max(1));

            let mut hosted = vec![0usize; model.total_instances()];
            for (level, layer) in model.layers() {
                for id in &layer.instances {
                    for child in &model.instance(*id).relations {
                        prop_assert_eq!(model.instance(*child).layer, level + 1);
                        hosted[child.0] += 1;
                    }
                }
            }
            for (level, layer) in model.layers().skip(1) {
                for id in &layer.instances {
                    prop_assert_eq!(hosted[id.0], 1, "instance on layer {} hosted once", level);
                }
            }
        }

        #[test]
        fn prop_vi_counter_matches_vi_instances(seed in any::<u64>(), apps in 1usize..30) {
            let model = random_model(seed, apps, 4, 4);
            let vi = model
                .layers()
                .flat_map(|(_, l)| l.instances.iter())
                .filter(|id| model.instance(**id).is_vi())
                .count() as u64;
            prop_assert_eq!(model.vi_count(), vi);
        }
    }
}
