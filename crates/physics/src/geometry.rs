//! Collision geometry variants usable by shape prefabs.

use crate::error::{PhysicsError, Result};
use glam::Vec3;
use rapier3d::prelude::*;
use serde::{Deserialize, Serialize};

/// Geometry of a shape prefab.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PhysicsGeometry {
    /// Box given by its half extents.
    Box { half_extents: Vec3 },
    Sphere { radius: f32 },
    /// Infinite half-space with +Y normal. Only static bodies may use it.
    Plane,
}

impl Default for PhysicsGeometry {
    fn default() -> Self {
        Self::Box {
            half_extents: Vec3::ONE,
        }
    }
}

impl PhysicsGeometry {
    pub fn is_plane(&self) -> bool {
        matches!(self, Self::Plane)
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Box { .. } => "box",
            Self::Sphere { .. } => "sphere",
            Self::Plane => "plane",
        }
    }

    /// Reject degenerate extents before they reach the solver.
    pub fn validate(&self) -> Result<()> {
        match *self {
            Self::Box { half_extents } => {
                if !half_extents.is_finite() || half_extents.min_element() <= 0.0 {
                    return Err(PhysicsError::Configuration(format!(
                        "box half extents must be positive, got {}",
                        half_extents
                    )));
                }
            }
            Self::Sphere { radius } => {
                if !radius.is_finite() || radius <= 0.0 {
                    return Err(PhysicsError::Configuration(format!(
                        "sphere radius must be positive, got {}",
                        radius
                    )));
                }
            }
            Self::Plane => {}
        }
        Ok(())
    }

    pub(crate) fn to_shared_shape(&self) -> SharedShape {
        match *self {
            Self::Box { half_extents } => {
                SharedShape::cuboid(half_extents.x, half_extents.y, half_extents.z)
            }
            Self::Sphere { radius } => SharedShape::ball(radius),
            Self::Plane => SharedShape::halfspace(Vector::y_axis()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degenerate_geometry_is_rejected() {
        assert!(PhysicsGeometry::Sphere { radius: 0.0 }.validate().is_err());
        assert!(PhysicsGeometry::Box {
            half_extents: Vec3::new(1.0, 0.0, 1.0)
        }
        .validate()
        .is_err());
        assert!(PhysicsGeometry::Plane.validate().is_ok());
        assert!(PhysicsGeometry::default().validate().is_ok());
    }

    #[test]
    fn shapes_match_variant() {
        let sphere = PhysicsGeometry::Sphere { radius: 2.0 }.to_shared_shape();
        assert_eq!(sphere.as_ball().map(|b| b.radius), Some(2.0));
        let plane = PhysicsGeometry::Plane.to_shared_shape();
        assert!(plane.as_halfspace().is_some());
    }
}
