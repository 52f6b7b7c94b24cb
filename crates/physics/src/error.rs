//! Error types for the physics layer

use thiserror::Error;

/// Physics layer errors.
///
/// These target development-time misconfiguration; callers propagate them
/// rather than retry.
#[derive(Debug, Error)]
pub enum PhysicsError {
    /// Invalid or ambiguous shape, geometry, or controller description
    #[error("invalid physics configuration: {0}")]
    Configuration(String),

    /// Operation not valid for the object's current state
    #[error("invalid physics state: {0}")]
    State(String),

    /// Name or id lookup failed
    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    /// Feature declared but not implemented
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// The solver worker failed or went away mid-step
    #[error("simulation failed: {0}")]
    Simulation(String),

    /// Document could not be written or read
    #[error("serialization failed: {0}")]
    Serialization(String),
}

impl PhysicsError {
    pub(crate) fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }
}

impl From<engine_core::SceneError> for PhysicsError {
    fn from(err: engine_core::SceneError) -> Self {
        Self::not_found("scene object", err.to_string())
    }
}

/// Result type for physics operations
pub type Result<T> = std::result::Result<T, PhysicsError>;
