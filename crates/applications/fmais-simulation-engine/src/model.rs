//! Hierarchy model: layers, instances and applications
//!
//! A Fractal MAIS is a tree of virtualization hosts (VI) and application
//! instances, organised in numbered layers. Layer 1 holds a single VI root
//! named `MAIS`; every instance on layer `k > 1` is hosted by exactly one VI
//! instance on layer `k - 1`.
//!
//! ## Storage
//!
//! Instances live in one arena owned by [`SystemModel`] and are addressed by
//! [`InstanceId`]. Layers and relations only hold ids, so the tree has no
//! owning pointers and parent lookup goes through [`SystemModel::parent_index`].
//!
//! ## Naming
//!
//! ```text
//! MAIS                         root (layer 1)
//! App#3-2-4                    instance 2 of App#3 on layer 4
//! VI#7-1-3                     VI instance, 7th VI created, ordinal 1, layer 3
//! ```

use crate::aspects::{Aspects, HasAspects};
use crate::error::{ModelError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::fmt;

/// Name of the root instance
pub const ROOT_NAME: &str = "MAIS";

/// Name of the virtualization application
pub const VI_APPLICATION: &str = "VI";

/// Kind of a deployed instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstanceKind {
    /// Virtualization host, may host further instances
    Vi,
    /// Application instance
    App,
}

/// Index of an instance in the model arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceId(pub usize);

/// A deployed node of the hierarchy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    pub name: String,
    pub kind: InstanceKind,
    /// Layer the instance is deployed on (1 = root)
    pub layer: usize,
    /// Hosted instances on the next layer, in creation order
    pub relations: Vec<InstanceId>,
    pub aspects: Aspects,
}

impl Instance {
    pub fn is_vi(&self) -> bool {
        self.kind == InstanceKind::Vi
    }

    pub fn is_leaf(&self) -> bool {
        self.relations.is_empty()
    }

    /// Parse the owning application, ordinal and layer out of the name
    pub fn parsed_name(&self) -> Result<ParsedName> {
        ParsedName::parse(&self.name)
    }
}

impl HasAspects for Instance {
    fn owner_name(&self) -> &str {
        &self.name
    }

    fn aspects(&self) -> &Aspects {
        &self.aspects
    }

    fn aspects_mut(&mut self) -> &mut Aspects {
        &mut self.aspects
    }
}

/// Components of an instance name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedName {
    /// Owning application (`VI` for every virtualization instance)
    pub application: String,
    pub ordinal: u64,
    pub layer: usize,
}

impl ParsedName {
    /// Split `<owner>-<ordinal>-<layer>`; `MAIS` parses as VI ordinal 1 on layer 1
    pub fn parse(name: &str) -> Result<Self> {
        if name == ROOT_NAME {
            return Ok(Self {
                application: VI_APPLICATION.to_string(),
                ordinal: 1,
                layer: 1,
            });
        }

        let parts: Vec<&str> = name.split('-').collect();
        let [owner, ordinal, layer] = parts.as_slice() else {
            return Err(ModelError::invalid_name(
                name,
                "expected <application>-<ordinal>-<layer>",
            ));
        };
        if owner.is_empty() {
            return Err(ModelError::invalid_name(name, "empty application name"));
        }

        let ordinal = ordinal
            .parse::<u64>()
            .map_err(|_| ModelError::invalid_name(name, "ordinal is not a number"))?;
        let layer = layer
            .parse::<usize>()
            .map_err(|_| ModelError::invalid_name(name, "layer is not a number"))?;

        let application = if owner.starts_with(VI_APPLICATION) {
            VI_APPLICATION.to_string()
        } else {
            owner.to_string()
        };

        Ok(Self {
            application,
            ordinal,
            layer,
        })
    }
}

/// Name of an application instance
pub fn app_instance_name(application: &str, ordinal: usize, layer: usize) -> String {
    format!("{}-{}-{}", application, ordinal, layer)
}

/// Name of a VI instance; `number` is the VI counter value after counting it
pub fn vi_instance_name(number: u64, ordinal: usize, layer: usize) -> String {
    format!("{}#{}-{}-{}", VI_APPLICATION, number, ordinal, layer)
}

/// One level of the hierarchy
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Layer {
    pub instances: Vec<InstanceId>,
    /// At least one VI instance lives on this layer
    pub vi_deployed: bool,
}

/// An application that can be deployed onto VI hosts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Application {
    pub name: String,
    /// Instances created per deployment
    pub rules: usize,
    /// Deployment probability per hosting VI, in `[0, 1]`
    pub probability: f64,
    /// Whether the application has been deployed
    pub state: bool,
    pub aspects: Aspects,
}

impl Application {
    pub fn new(name: impl Into<String>, rules: usize, probability: f64) -> Self {
        Self {
            name: name.into(),
            rules,
            probability,
            state: false,
            aspects: Aspects::default(),
        }
    }

    /// The virtualization pool rather than an ordinary application
    pub fn is_vi(&self) -> bool {
        self.name.starts_with(VI_APPLICATION)
    }
}

impl HasAspects for Application {
    fn owner_name(&self) -> &str {
        &self.name
    }

    fn aspects(&self) -> &Aspects {
        &self.aspects
    }

    fn aspects_mut(&mut self) -> &mut Aspects {
        &mut self.aspects
    }
}

/// Counts VI instances created in one model, root included
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViCounter(u64);

impl ViCounter {
    /// Count one more VI instance and return the new total
    pub fn advance(&mut self) -> u64 {
        self.0 += 1;
        self.0
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

/// Fractal MAIS hierarchy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemModel {
    /// Maximum number of layers
    pub depth: usize,
    /// Applications by name, iterated in sorted order
    pub applications: BTreeMap<String, Application>,
    instances: Vec<Instance>,
    layers: Vec<Layer>,
    vi_counter: ViCounter,
}

impl SystemModel {
    /// Create an empty model with room for `app_count_hint` instances
    pub fn new(app_count_hint: usize, depth: usize) -> Self {
        Self {
            depth,
            applications: BTreeMap::new(),
            instances: Vec::with_capacity(app_count_hint + 1),
            layers: Vec::with_capacity(depth),
            vi_counter: ViCounter::default(),
        }
    }

    /// Register an application; an existing entry with the same name is replaced
    pub fn create_application(
        &mut self,
        rules: usize,
        probability: f64,
        name: &str,
    ) -> &mut Application {
        let application = Application::new(name, rules, probability);
        match self.applications.entry(name.to_string()) {
            Entry::Occupied(mut entry) => {
                entry.insert(application);
                entry.into_mut()
            }
            Entry::Vacant(entry) => entry.insert(application),
        }
    }

    /// Reset the hierarchy to a single VI root on layer 1
    pub fn initialize_root_layer(&mut self) -> InstanceId {
        self.instances.clear();
        self.layers.clear();
        self.vi_counter = ViCounter::default();
        self.layers.push(Layer::default());
        self.push_unchecked(1, ROOT_NAME.to_string(), InstanceKind::Vi)
    }

    /// Append an instance to `level`, opening the layer if it is the next one
    pub fn push_instance(
        &mut self,
        level: usize,
        name: &str,
        kind: InstanceKind,
    ) -> Result<InstanceId> {
        if level == 0 || level > self.depth.max(1) || level > self.layers.len() + 1 {
            return Err(ModelError::LayerNotFound(level));
        }
        if level == 1 && !self.layers.is_empty() {
            return Err(ModelError::invalid_name(name, "layer 1 only holds the root"));
        }
        if level > self.layers.len() {
            self.layers.push(Layer::default());
        }
        Ok(self.push_unchecked(level, name.to_string(), kind))
    }

    /// Open the next layer and return its level
    pub(crate) fn open_layer(&mut self) -> usize {
        self.layers.push(Layer::default());
        self.layers.len()
    }

    /// Append to an already opened layer, counting VI instances
    pub(crate) fn push_unchecked(
        &mut self,
        level: usize,
        name: String,
        kind: InstanceKind,
    ) -> InstanceId {
        let id = InstanceId(self.instances.len());
        self.instances.push(Instance {
            name,
            kind,
            layer: level,
            relations: Vec::new(),
            aspects: Aspects::default(),
        });
        if kind == InstanceKind::Vi {
            self.vi_counter.advance();
        }
        let layer = &mut self.layers[level - 1];
        layer.instances.push(id);
        layer.vi_deployed |= kind == InstanceKind::Vi;
        id
    }

    /// Host `child` on `parent`, which sits one layer above it
    ///
    /// Any instance may hold relations; the generator only ever hosts on VI
    /// instances.
    pub fn relate(&mut self, parent: InstanceId, child: InstanceId) -> Result<()> {
        let child_layer = self.try_instance(child)?.layer;
        let host = self.try_instance(parent)?;
        if child_layer != host.layer + 1 {
            return Err(ModelError::LayerNotFound(host.layer + 1));
        }
        self.instances[parent.0].relations.push(child);
        Ok(())
    }

    /// Number of VI instances created so far, root included
    pub fn vi_count(&self) -> u64 {
        self.vi_counter.value()
    }

    /// Number of layers actually generated
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    pub fn layer(&self, level: usize) -> Result<&Layer> {
        level
            .checked_sub(1)
            .and_then(|i| self.layers.get(i))
            .ok_or(ModelError::LayerNotFound(level))
    }

    /// Layers with their level, root first
    pub fn layers(&self) -> impl DoubleEndedIterator<Item = (usize, &Layer)> {
        self.layers.iter().enumerate().map(|(i, l)| (i + 1, l))
    }

    /// Instance by id; ids are only handed out by this model
    pub fn instance(&self, id: InstanceId) -> &Instance {
        &self.instances[id.0]
    }

    pub fn instance_mut(&mut self, id: InstanceId) -> &mut Instance {
        &mut self.instances[id.0]
    }

    fn try_instance(&self, id: InstanceId) -> Result<&Instance> {
        self.instances
            .get(id.0)
            .ok_or_else(|| ModelError::InstanceNotFound(format!("#{}", id.0)))
    }

    /// Look an instance up by exact name, deepest layer first
    pub fn get_instance(&self, name: &str) -> Result<InstanceId> {
        self.layers
            .iter()
            .rev()
            .flat_map(|layer| layer.instances.iter().copied())
            .find(|id| self.instances[id.0].name == name)
            .ok_or_else(|| ModelError::InstanceNotFound(name.to_string()))
    }

    pub fn root(&self) -> Result<InstanceId> {
        self.layer(1)?
            .instances
            .first()
            .copied()
            .ok_or(ModelError::LayerNotFound(1))
    }

    pub fn application(&self, name: &str) -> Result<&Application> {
        self.applications
            .get(name)
            .ok_or_else(|| ModelError::UnknownApplication(name.to_string()))
    }

    pub fn application_mut(&mut self, name: &str) -> Result<&mut Application> {
        self.applications
            .get_mut(name)
            .ok_or_else(|| ModelError::UnknownApplication(name.to_string()))
    }

    /// Application that owns an instance (the VI application for VI instances)
    pub fn owner_of(&self, id: InstanceId) -> Result<&Application> {
        let parsed = self.instance(id).parsed_name()?;
        self.application(&parsed.application)
    }

    /// Child to parent lookup table, indexed by [`InstanceId`]
    pub fn parent_index(&self) -> Vec<Option<InstanceId>> {
        let mut parents = vec![None; self.instances.len()];
        for (i, instance) in self.instances.iter().enumerate() {
            for child in &instance.relations {
                parents[child.0] = Some(InstanceId(i));
            }
        }
        parents
    }

    pub fn total_instances(&self) -> usize {
        self.instances.len()
    }

    /// Largest number of instances on one layer
    pub fn widest_layer(&self) -> usize {
        self.layers.iter().map(|l| l.instances.len()).max().unwrap_or(0)
    }

    /// Application instances whose name parses to `application`, deepest layer first
    pub fn instances_of(&self, application: &str) -> Vec<InstanceId> {
        self.layers
            .iter()
            .rev()
            .flat_map(|layer| layer.instances.iter().copied())
            .filter(|id| {
                let instance = &self.instances[id.0];
                instance.kind == InstanceKind::App
                    && instance
                        .parsed_name()
                        .map(|p| p.application == application)
                        .unwrap_or(false)
            })
            .collect()
    }

    /// VI instances below the root that host nothing
    pub fn vi_leaves(&self) -> Vec<InstanceId> {
        self.layers
            .iter()
            .skip(1)
            .flat_map(|layer| layer.instances.iter().copied())
            .filter(|id| {
                let instance = &self.instances[id.0];
                instance.is_vi() && instance.is_leaf()
            })
            .collect()
    }
}

impl fmt::Display for SystemModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Fractal MAIS: {} layers (max {}), {} instances, {} VI",
            self.layers.len(),
            self.depth,
            self.instances.len(),
            self.vi_count()
        )?;
        for (level, layer) in self.layers() {
            writeln!(f, "Layer {} ({} instances):", level, layer.instances.len())?;
            for id in &layer.instances {
                let instance = self.instance(*id);
                write!(f, "  {}", instance.name)?;
                if !instance.relations.is_empty() {
                    let children: Vec<&str> = instance
                        .relations
                        .iter()
                        .map(|c| self.instance(*c).name.as_str())
                        .collect();
                    write!(f, " -> [{}]", children.join(", "))?;
                }
                writeln!(f)?;
            }
        }
        Ok(())
    }
}
