//! Numeric aspects attached to instances and applications
//!
//! Every node of the hierarchy and every application carries up to three
//! numbers: a priority (weight among siblings), a reliability in `[0, 1]`
//! and the chain coefficient used by the optimized ME-ERT-CORE pass.
//! Getters distinguish "never set" from "set to something unusable" so the
//! reliability engine can abort with a precise error instead of reading zero.

use crate::error::{ModelError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Aspect slot identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AspectKey {
    Priority,
    Reliability,
    ChainCoefficient,
}

impl fmt::Display for AspectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AspectKey::Priority => "priority",
            AspectKey::Reliability => "reliability",
            AspectKey::ChainCoefficient => "chainCoefficient",
        };
        f.write_str(name)
    }
}

/// Typed aspect storage
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Aspects {
    pub priority: Option<f64>,
    pub reliability: Option<f64>,
    pub chain_coefficient: Option<f64>,
}

impl Aspects {
    /// Read a slot
    pub fn get(&self, key: AspectKey) -> Option<f64> {
        match key {
            AspectKey::Priority => self.priority,
            AspectKey::Reliability => self.reliability,
            AspectKey::ChainCoefficient => self.chain_coefficient,
        }
    }

    /// Overwrite a slot
    pub fn set(&mut self, key: AspectKey, value: f64) {
        let slot = match key {
            AspectKey::Priority => &mut self.priority,
            AspectKey::Reliability => &mut self.reliability,
            AspectKey::ChainCoefficient => &mut self.chain_coefficient,
        };
        *slot = Some(value);
    }

    /// Builder-style priority setter, used by fixtures
    pub fn with_priority(mut self, priority: f64) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Builder-style reliability setter, used by fixtures
    pub fn with_reliability(mut self, reliability: f64) -> Self {
        self.reliability = Some(reliability);
        self
    }
}

/// Shared accessor surface for anything that owns [`Aspects`]
pub trait HasAspects {
    /// Name used in error messages
    fn owner_name(&self) -> &str;

    fn aspects(&self) -> &Aspects;

    fn aspects_mut(&mut self) -> &mut Aspects;

    /// Store a value
    fn set_aspect(&mut self, key: AspectKey, value: f64) {
        self.aspects_mut().set(key, value);
    }

    /// Value and whether it was found
    fn aspect(&self, key: AspectKey) -> Option<f64> {
        self.aspects().get(key)
    }

    /// Parse textual input and store it
    fn set_aspect_str(&mut self, key: AspectKey, raw: &str) -> Result<()> {
        let value = raw
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| ModelError::MalformedAspect {
                owner: self.owner_name().to_string(),
                aspect: key.to_string(),
                raw: raw.to_string(),
            })?;
        self.set_aspect(key, value);
        Ok(())
    }

    /// Value that must exist and be finite
    fn require_aspect(&self, key: AspectKey) -> Result<f64> {
        match self.aspect(key) {
            None => Err(ModelError::missing_aspect(self.owner_name(), key.to_string())),
            Some(v) if !v.is_finite() => Err(ModelError::MalformedAspect {
                owner: self.owner_name().to_string(),
                aspect: key.to_string(),
                raw: v.to_string(),
            }),
            Some(v) => Ok(v),
        }
    }

    fn priority(&self) -> Result<f64> {
        self.require_aspect(AspectKey::Priority)
    }

    fn set_priority(&mut self, value: f64) {
        self.set_aspect(AspectKey::Priority, value);
    }

    fn reliability(&self) -> Result<f64> {
        self.require_aspect(AspectKey::Reliability)
    }

    fn set_reliability(&mut self, value: f64) {
        self.set_aspect(AspectKey::Reliability, value);
    }

    fn chain_coefficient(&self) -> Result<f64> {
        self.require_aspect(AspectKey::ChainCoefficient)
    }

    fn set_chain_coefficient(&mut self, value: f64) {
        self.set_aspect(AspectKey::ChainCoefficient, value);
    }
}
