//! Error types for the simulation engine

use thiserror::Error;

/// Simulation engine result type
pub type Result<T> = std::result::Result<T, ModelError>;

/// Errors that can occur while building or evaluating a Fractal MAIS model
#[derive(Error, Debug)]
pub enum ModelError {
    /// Layer index outside the generated hierarchy
    #[error("Layer {0} not found")]
    LayerNotFound(usize),

    /// Instance lookup by name failed
    #[error("Instance {0} not found")]
    InstanceNotFound(String),

    /// Aspect was never set on the owner
    #[error("Aspect {aspect} not set on {owner}")]
    MissingAspect { owner: String, aspect: String },

    /// Aspect value could not be interpreted as a finite number
    #[error("Aspect {aspect} on {owner} is malformed: {raw:?}")]
    MalformedAspect {
        owner: String,
        aspect: String,
        raw: String,
    },

    /// Instance name does not follow the naming grammar
    #[error("Invalid instance name {name:?}: {reason}")]
    InvalidInstanceName { name: String, reason: String },

    /// Application is not registered on the model
    #[error("Application {0} not found")]
    UnknownApplication(String),

    /// Application exists but was never deployed
    #[error("Application {0} is not deployed")]
    ApplicationNotDeployed(String),

    /// Operation is defined for ordinary applications only
    #[error("{0} is the virtualization pool, not an application")]
    VirtualizationPool(String),

    /// Number of instances found differs from what the application declares
    #[error("Application {application}: expected {expected} instances, found {found}")]
    InstanceCountMismatch {
        application: String,
        expected: usize,
        found: usize,
    },

    /// No input value for an instance ordinal
    #[error("No reliability input for {application} instance {ordinal}")]
    MissingReliabilityInput { application: String, ordinal: u64 },

    /// Scaled value has no digits after the decimal point
    #[error("Value {0} has no fractional part")]
    NoFractionalPart(String),

    /// Fixture depth outside the supported range
    #[error("Unsupported depth {0}")]
    UnsupportedDepth(usize),

    /// Measurement series shorter than the scenario needs
    #[error("Series {name} has no value for step {step}")]
    IncompleteSeries { name: String, step: usize },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV parsing error
    #[error("CSV error: {0}")]
    Csv(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ModelError {
    /// Create a missing-aspect error
    pub fn missing_aspect(owner: impl Into<String>, aspect: impl Into<String>) -> Self {
        Self::MissingAspect {
            owner: owner.into(),
            aspect: aspect.into(),
        }
    }

    /// Create an invalid-name error
    pub fn invalid_name(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidInstanceName {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create a CSV error
    pub fn csv(msg: impl Into<String>) -> Self {
        Self::Csv(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
