//! Physics materials defining surface properties

use serde::{Deserialize, Serialize};

/// Named surface material, shared by every prefab and controller that uses it.
#[derive(Debug, Clone, PartialEq)]
pub struct PhysicsMaterial {
    name: String,
    /// Friction coefficient at rest
    pub static_friction: f32,
    /// Friction coefficient while sliding. Native colliders use this one.
    pub dynamic_friction: f32,
    /// Restitution/bounciness (0 = no bounce, 1 = perfect bounce)
    pub restitution: f32,
}

impl PhysicsMaterial {
    pub fn new(
        name: impl Into<String>,
        static_friction: f32,
        dynamic_friction: f32,
        restitution: f32,
    ) -> Self {
        Self {
            name: name.into(),
            static_friction,
            dynamic_friction,
            restitution,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn to_document(&self) -> MaterialDocument {
        MaterialDocument {
            static_friction: self.static_friction,
            dynamic_friction: self.dynamic_friction,
            restitution: self.restitution,
        }
    }
}

/// Saved form of a material; the name is the document key.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MaterialDocument {
    pub static_friction: f32,
    pub dynamic_friction: f32,
    pub restitution: f32,
}
