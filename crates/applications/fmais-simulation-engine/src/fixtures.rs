//! Hand-built reference hierarchies
//!
//! The fixtures have every aspect the reliability engine needs already set
//! and every application marked deployed, so they can be fed straight to
//! [`crate::meertcore::MeErtCore`].
//!
//! ```text
//! basic():                          depth4():
//! MAIS                              MAIS
//! ├── VI#2-1-2                      ├── VI#2-1-2
//! │   └── App#2 x5                  │   └── App#2 x2
//! ├── VI#3-2-2                      ├── VI#3-2-2
//! │   ├── VI#4-1-3                  │   ├── App#3 x2
//! │   └── VI#5-2-3                  │   ├── VI#4-1-3
//! └── App#1 x3                      │   │   └── App#4-1-4
//!                                   │   └── VI#5-2-3
//!                                   └── App#1 x3
//! ```

use crate::aspects::{Aspects, HasAspects};
use crate::error::{ModelError, Result};
use crate::model::{
    InstanceId, InstanceKind, SystemModel, VI_APPLICATION, app_instance_name, vi_instance_name,
};

/// VI and applications per VI in the wide models
const WIDE_APPS_PER_VI: usize = 5;
const WIDE_VI_PER_VI: usize = 2;
const WIDE_VI_PRIORITY: f64 = 0.1;

/// Instance priority and reliability of the wide model's two instances
const WIDE_INSTANCES: [(f64, f64); 2] = [(0.41, 0.77), (0.59, 0.34)];

struct Builder {
    model: SystemModel,
    root: InstanceId,
}

impl Builder {
    fn new(depth: usize) -> Self {
        let mut model = SystemModel::new(0, depth);
        let root = model.initialize_root_layer();
        Self { model, root }
    }

    fn application(&mut self, name: &str, rules: usize, priority: f64) {
        let app = self.model.create_application(rules, 1.0, name);
        app.set_priority(priority);
        app.state = true;
    }

    fn level_below(&mut self, host: InstanceId) -> usize {
        let level = self.model.instance(host).layer + 1;
        while self.model.layer_count() < level {
            self.model.open_layer();
        }
        level
    }

    fn vi(&mut self, host: InstanceId, ordinal: usize, aspects: Aspects) -> InstanceId {
        let level = self.level_below(host);
        let name = vi_instance_name(self.model.vi_count() + 1, ordinal, level);
        self.attach(host, level, name, InstanceKind::Vi, aspects)
    }

    fn app(
        &mut self,
        host: InstanceId,
        application: &str,
        ordinal: usize,
        aspects: Aspects,
    ) -> InstanceId {
        let level = self.level_below(host);
        let name = app_instance_name(application, ordinal, level);
        self.attach(host, level, name, InstanceKind::App, aspects)
    }

    fn apps(&mut self, host: InstanceId, application: &str, instances: &[(f64, f64)]) {
        for (i, (priority, reliability)) in instances.iter().enumerate() {
            let aspects = Aspects::default()
                .with_priority(*priority)
                .with_reliability(*reliability);
            self.app(host, application, i + 1, aspects);
        }
    }

    fn attach(
        &mut self,
        host: InstanceId,
        level: usize,
        name: String,
        kind: InstanceKind,
        aspects: Aspects,
    ) -> InstanceId {
        let id = self.model.push_unchecked(level, name, kind);
        self.model.instance_mut(id).aspects = aspects;
        self.model.instance_mut(host).relations.push(id);
        id
    }

    fn build(self) -> SystemModel {
        self.model
    }
}

fn priority(p: f64) -> Aspects {
    Aspects::default().with_priority(p)
}

fn leaf(p: f64, r: f64) -> Aspects {
    Aspects::default().with_priority(p).with_reliability(r)
}

/// Two VI and two applications over three layers
///
/// Canonical ME-ERT-CORE reliability is `0.1555896875`.
pub fn basic() -> SystemModel {
    let mut b = Builder::new(3);
    b.application(VI_APPLICATION, 2, 0.35);
    b.application("App#1", 3, 0.25);
    b.application("App#2", 5, 0.4);

    let root = b.root;
    let vi1 = b.vi(root, 1, priority(0.25));
    let vi2 = b.vi(root, 2, priority(0.25));
    b.apps(root, "App#1", &[(0.2, 0.77), (0.5, 0.34), (0.3, 0.62)]);

    b.apps(
        vi1,
        "App#2",
        &[(0.2, 0.47), (0.2, 0.39), (0.2, 0.53), (0.2, 0.45), (0.2, 0.74)],
    );
    b.vi(vi2, 1, leaf(0.25, 0.61));
    b.vi(vi2, 2, leaf(0.25, 0.7));
    b.build()
}

const APP1_INSTANCES: [(f64, f64); 3] = [(0.41, 0.77), (0.28, 0.34), (0.31, 0.62)];
const APP2_INSTANCES: [(f64, f64); 2] = [(0.35, 0.77), (0.65, 0.34)];
const APP3_INSTANCES: [(f64, f64); 2] = [(0.7, 0.77), (0.3, 0.34)];

/// Root hosting two applications and one VI leaf
pub fn depth2() -> SystemModel {
    let mut b = Builder::new(2);
    b.application(VI_APPLICATION, 1, 0.35);
    b.application("App#1", 3, 0.27);
    b.application("App#2", 2, 0.38);

    let root = b.root;
    b.apps(root, "App#1", &APP1_INSTANCES);
    b.apps(root, "App#2", &APP2_INSTANCES);
    b.vi(root, 1, leaf(1.0, 0.45));
    b.build()
}

/// Three applications, two of them behind VI hosts
pub fn depth3() -> SystemModel {
    let mut b = Builder::new(3);
    b.application(VI_APPLICATION, 2, 0.35);
    b.application("App#1", 3, 0.27);
    b.application("App#2", 2, 0.18);
    b.application("App#3", 2, 0.2);

    let root = b.root;
    let vi1 = b.vi(root, 1, priority(0.25));
    let vi2 = b.vi(root, 2, priority(0.25));
    b.apps(root, "App#1", &APP1_INSTANCES);

    b.apps(vi1, "App#2", &APP2_INSTANCES);
    b.apps(vi2, "App#3", &APP3_INSTANCES);
    b.vi(vi2, 1, leaf(1.0, 0.45));
    b.build()
}

/// Four applications, the last one on layer 4
pub fn depth4() -> SystemModel {
    let mut b = Builder::new(4);
    b.application(VI_APPLICATION, 2, 0.35);
    b.application("App#1", 3, 0.19);
    b.application("App#2", 2, 0.15);
    b.application("App#3", 2, 0.21);
    b.application("App#4", 1, 0.1);

    let root = b.root;
    let vi1 = b.vi(root, 1, priority(0.25));
    let vi2 = b.vi(root, 2, priority(0.25));
    b.apps(root, "App#1", &APP1_INSTANCES);

    b.apps(vi1, "App#2", &APP2_INSTANCES);
    b.apps(vi2, "App#3", &APP3_INSTANCES);
    let vi3 = b.vi(vi2, 1, priority(0.25));
    b.apps(vi3, "App#4", &[(1.0, 0.77)]);
    b.vi(vi2, 2, leaf(1.0, 0.45));
    b.build()
}

/// Many identical applications, five per VI
///
/// Fewer than 10 applications sit directly on the root, fewer than 50 on one
/// VI layer, the rest on two VI layers.
pub fn wide(num_apps: usize) -> SystemModel {
    let depth = if num_apps < 10 {
        2
    } else if num_apps < 50 {
        3
    } else {
        4
    };
    wide_topology(num_apps, depth, &WIDE_INSTANCES)
}

/// [`wide`] with an explicit depth and `instances` identical instances per application
///
/// # Errors
///
/// [`ModelError::UnsupportedDepth`] outside `2..=4`.
pub fn wide_bench(num_apps: usize, instances: usize, depth: usize) -> Result<SystemModel> {
    if !(2..=4).contains(&depth) {
        return Err(ModelError::UnsupportedDepth(depth));
    }
    let share = 1.0 / instances.max(1) as f64;
    let layout = vec![(share, 0.77); instances.max(1)];
    Ok(wide_topology(num_apps, depth, &layout))
}

fn wide_topology(num_apps: usize, depth: usize, instances: &[(f64, f64)]) -> SystemModel {
    let mut b = Builder::new(depth);
    b.application(VI_APPLICATION, WIDE_VI_PER_VI, WIDE_VI_PRIORITY);
    let app_priority = (1.0 - WIDE_VI_PRIORITY) / num_apps.max(1) as f64;
    let names: Vec<String> = (1..=num_apps).map(|i| format!("App#{}", i)).collect();
    for name in &names {
        b.application(name, instances.len(), app_priority);
    }

    let root = b.root;
    match depth {
        2 => {
            for name in &names {
                b.apps(root, name, instances);
            }
        }
        3 => {
            for (j, chunk) in names.chunks(WIDE_APPS_PER_VI).enumerate() {
                let vi = b.vi(root, j + 1, priority(1.0));
                for name in chunk {
                    b.apps(vi, name, instances);
                }
            }
        }
        _ => {
            let groups: Vec<&[String]> = names.chunks(WIDE_APPS_PER_VI).collect();
            for (k, upper) in groups.chunks(WIDE_VI_PER_VI).enumerate() {
                let upper_vi = b.vi(root, k + 1, priority(1.0));
                for (j, chunk) in upper.iter().enumerate() {
                    let vi = b.vi(upper_vi, j + 1, priority(1.0));
                    for name in chunk.iter() {
                        b.apps(vi, name, instances);
                    }
                }
            }
        }
    }
    b.build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_layout() {
        let model = basic();
        assert_eq!(model.layer_count(), 3);
        assert_eq!(model.layer(2).unwrap().instances.len(), 5);
        assert_eq!(model.layer(3).unwrap().instances.len(), 7);
        assert_eq!(model.vi_count(), 5);
        assert!(model.get_instance("VI#5-2-3").is_ok());
        assert_eq!(model.vi_leaves().len(), 2);
    }

    #[test]
    fn test_depth_fixture_layers() {
        assert_eq!(depth2().layer_count(), 2);
        assert_eq!(depth3().layer_count(), 3);
        let model = depth4();
        assert_eq!(model.layer_count(), 4);
        assert!(model.get_instance("App#4-1-4").is_ok());
        assert_eq!(model.vi_leaves().len(), 1);
    }

    #[test]
    fn test_fixture_priorities_fit_budget() {
        for model in [basic(), depth2(), depth3(), depth4()] {
            let total: f64 = model
                .applications
                .values()
                .map(|a| a.priority().unwrap())
                .sum();
            assert!(total <= 1.0 + 1e-9);
            for app in model.applications.values().filter(|a| !a.is_vi()) {
                assert_eq!(model.instances_of(&app.name).len(), app.rules);
            }
        }
    }

    #[test]
    fn test_wide_depths() {
        assert_eq!(wide(5).layer_count(), 2);
        assert_eq!(wide(20).layer_count(), 3);
        assert_eq!(wide(100).layer_count(), 4);
    }

    #[test]
    fn test_wide_places_every_application() {
        for apps in [7, 23, 101] {
            let model = wide(apps);
            assert_eq!(model.applications.len(), apps + 1);
            assert_eq!(model.total_instances() - model.vi_count() as usize, apps * 2);
        }
    }

    #[test]
    fn test_wide_vi_fan_out() {
        let model = wide(100);
        // 20 VI hosting applications under 10 upper VI
        assert_eq!(model.layer(2).unwrap().instances.len(), 10);
        assert_eq!(model.layer(3).unwrap().instances.len(), 20);
        assert_eq!(model.layer(4).unwrap().instances.len(), 200);
    }

    #[test]
    fn test_wide_bench() {
        let model = wide_bench(12, 4, 3).unwrap();
        let id = model.get_instance("App#12-4-3").unwrap();
        assert_eq!(model.instance(id).priority().unwrap(), 0.25);
        assert!(matches!(wide_bench(12, 4, 5), Err(ModelError::UnsupportedDepth(5))));
        assert!(matches!(wide_bench(12, 4, 1), Err(ModelError::UnsupportedDepth(1))));
    }
}
