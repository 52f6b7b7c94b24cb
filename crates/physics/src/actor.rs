//! Rigid bodies: one native body per scene object, carrying at most one shape.

use crate::convert::{from_isometry, to_isometry, to_vector};
use crate::error::{PhysicsError, Result};
use crate::native::NativeScene;
use crate::shape::{PhysicsShape, ShapePrefab, ShapePrefabId};
use engine_core::{Entity, Transform, Vec3};
use rapier3d::prelude::*;
use serde::{Deserialize, Serialize};

pub use crate::shape::BodyId;

/// Simulation role of a rigid body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RigidType {
    Static,
    #[default]
    Dynamic,
    /// Declared for completeness; building one is unsupported.
    ArticulationLink,
}

/// Construction parameters for a rigid body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RigidBodyDescription {
    pub rigid_type: RigidType,
    pub density: f32,
    /// Only meaningful for dynamic bodies.
    pub is_kinematic: bool,
}

impl Default for RigidBodyDescription {
    fn default() -> Self {
        Self {
            rigid_type: RigidType::Dynamic,
            density: 1.0,
            is_kinematic: false,
        }
    }
}

/// Link between a scene object and its native body.
#[derive(Debug, Clone, Copy)]
pub struct PhysicsActor {
    pub scene_object: Entity,
    handle: Option<RigidBodyHandle>,
}

impl PhysicsActor {
    pub fn handle(&self) -> Option<RigidBodyHandle> {
        self.handle
    }
}

#[derive(Debug)]
pub struct RigidBody {
    actor: PhysicsActor,
    rigid_type: RigidType,
    is_kinematic: bool,
    density: f32,
    shapes: Vec<PhysicsShape>,
}

impl RigidBody {
    pub(crate) fn new(scene_object: Entity, desc: RigidBodyDescription) -> Self {
        Self {
            actor: PhysicsActor {
                scene_object,
                handle: None,
            },
            rigid_type: desc.rigid_type,
            is_kinematic: desc.is_kinematic,
            density: desc.density,
            shapes: Vec::new(),
        }
    }

    pub fn actor(&self) -> &PhysicsActor {
        &self.actor
    }

    pub fn scene_object(&self) -> Entity {
        self.actor.scene_object
    }

    pub fn handle(&self) -> Option<RigidBodyHandle> {
        self.actor.handle
    }

    pub(crate) fn require_handle(&self) -> Result<RigidBodyHandle> {
        self.actor.handle.ok_or_else(|| {
            PhysicsError::State(format!(
                "rigid body of {:?} has no native body",
                self.actor.scene_object
            ))
        })
    }

    pub fn rigid_type(&self) -> RigidType {
        self.rigid_type
    }

    pub fn is_kinematic(&self) -> bool {
        self.is_kinematic
    }

    pub fn density(&self) -> f32 {
        self.density
    }

    pub fn shapes(&self) -> &[PhysicsShape] {
        &self.shapes
    }

    pub(crate) fn shape_mut(&mut self, id: crate::shape::ShapeId) -> Option<&mut PhysicsShape> {
        self.shapes.iter_mut().find(|s| s.id() == id)
    }

    /// Prefab of the single shape, if any.
    pub fn prefab(&self) -> Option<ShapePrefabId> {
        self.shapes.first().and_then(|s| s.prefab())
    }

    /// Take every shape off this body, detaching the native colliders.
    /// The caller deregisters them from their prefabs.
    pub(crate) fn clear_shapes(&mut self, native: &mut NativeScene) -> Vec<PhysicsShape> {
        let shapes = std::mem::take(&mut self.shapes);
        if self.actor.handle.is_some() {
            for shape in &shapes {
                shape.detach(native);
            }
        }
        shapes
    }

    /// A body carries at most one shape.
    pub(crate) fn push_shape(&mut self, shape: PhysicsShape) -> Result<()> {
        if let Some(existing) = self.shapes.first() {
            let message = if existing.prefab().is_some() && existing.prefab() == shape.prefab() {
                "rigid body already has a shape from this prefab"
            } else {
                "rigid body already has a shape, a second one is not allowed"
            };
            return Err(PhysicsError::State(message.into()));
        }
        self.shapes.push(shape);
        Ok(())
    }

    /// Drop the native body. Joints touching it go with it.
    pub(crate) fn release_native(&mut self, native: &mut NativeScene) -> Option<RigidBodyHandle> {
        let handle = self.actor.handle.take()?;
        native.remove_body(handle);
        Some(handle)
    }

    /// Create the native body for `prefab` at `transform`, replacing nothing:
    /// callers clear shapes and release the old native body first.
    pub(crate) fn build_native(
        &mut self,
        native: &mut NativeScene,
        transform: &Transform,
        prefab: &ShapePrefab,
    ) -> Result<(RigidBodyHandle, ColliderHandle)> {
        if prefab.geometry().is_plane() && self.rigid_type != RigidType::Static {
            log::debug!(
                "Plane prefab '{}' forces {:?} to a static body",
                prefab.name(),
                self.actor.scene_object
            );
            self.rigid_type = RigidType::Static;
        }

        let builder = match self.rigid_type {
            RigidType::Static => RigidBodyBuilder::fixed(),
            RigidType::Dynamic => RigidBodyBuilder::dynamic(),
            RigidType::ArticulationLink => {
                return Err(PhysicsError::Unsupported(
                    "articulation links are not implemented".into(),
                ))
            }
        };
        let handle = native.insert_body(builder.position(to_isometry(transform)).build());
        self.actor.handle = Some(handle);

        let collider = prefab.create_exclusive(native, handle, self.density)?;

        if self.rigid_type == RigidType::Dynamic {
            self.update_mass(native)?;
            if self.is_kinematic {
                if let Some(body) = native.rigid_body_set.get_mut(handle) {
                    body.set_body_type(RigidBodyType::KinematicPositionBased, true);
                }
            }
        }
        Ok((handle, collider))
    }

    /// Turn an already built body static, as a Plane prefab requires.
    pub(crate) fn force_static(&mut self, native: &mut NativeScene) -> Result<()> {
        if self.rigid_type == RigidType::Static {
            return Ok(());
        }
        log::debug!("Plane geometry forces {:?} to a static body", self.actor.scene_object);
        self.native_body(native)?.set_body_type(RigidBodyType::Fixed, true);
        self.rigid_type = RigidType::Static;
        Ok(())
    }

    /// Recompute mass and inertia from the attached colliders' density.
    pub(crate) fn update_mass(&self, native: &mut NativeScene) -> Result<()> {
        let handle = self.require_handle()?;
        let NativeScene {
            rigid_body_set,
            collider_set,
            ..
        } = native;
        let body = rigid_body_set
            .get_mut(handle)
            .ok_or_else(|| PhysicsError::State("native body vanished".into()))?;
        body.recompute_mass_properties_from_colliders(collider_set);

        let mass = body.mass();
        if !mass.is_finite() || mass <= 0.0 {
            return Err(PhysicsError::Configuration(format!(
                "mass and inertia update failed for {:?} (density {}, mass {})",
                self.actor.scene_object, self.density, mass
            )));
        }
        Ok(())
    }

    fn native_body<'a>(
        &self,
        native: &'a mut NativeScene,
    ) -> Result<&'a mut rapier3d::dynamics::RigidBody> {
        let handle = self.require_handle()?;
        native
            .rigid_body_set
            .get_mut(handle)
            .ok_or_else(|| PhysicsError::State("native body vanished".into()))
    }

    /// Current pose of the native body, as position and rotation.
    pub fn transform(&self, native: &NativeScene) -> Result<Transform> {
        let handle = self.require_handle()?;
        let body = native
            .rigid_body_set
            .get(handle)
            .ok_or_else(|| PhysicsError::State("native body vanished".into()))?;
        let (position, rotation) = from_isometry(body.position());
        Ok(Transform::from_position_rotation(position, rotation))
    }

    /// Move the body.
    ///
    /// Static bodies are teleported; doing that every frame is expensive for the solver.
    /// Kinematic bodies get a target reached during the next step. Other dynamic
    /// bodies are teleported and keep their velocity.
    pub fn set_transform(&mut self, native: &mut NativeScene, transform: &Transform) -> Result<()> {
        let pose = to_isometry(transform);
        let kinematic_member = self.rigid_type == RigidType::Dynamic && self.is_kinematic;
        let body = self.native_body(native)?;

        if kinematic_member {
            if !body.is_kinematic() {
                return Err(PhysicsError::State(
                    "kinematic target set on a body that is not kinematic natively".into(),
                ));
            }
            body.set_next_kinematic_position(pose);
        } else {
            body.set_position(pose, true);
        }
        native.mark_queries_dirty();
        Ok(())
    }

    /// Toggle the native kinematic flag; `update_member` also records it on this wrapper.
    pub fn set_kinematic(
        &mut self,
        native: &mut NativeScene,
        kinematic: bool,
        update_member: bool,
    ) -> Result<()> {
        if self.rigid_type != RigidType::Dynamic {
            return Err(PhysicsError::State(format!(
                "only dynamic bodies can be kinematic, this one is {:?}",
                self.rigid_type
            )));
        }
        let body_type = if kinematic {
            RigidBodyType::KinematicPositionBased
        } else {
            RigidBodyType::Dynamic
        };
        self.native_body(native)?.set_body_type(body_type, true);
        if update_member {
            self.is_kinematic = kinematic;
        }
        Ok(())
    }

    pub fn sleep(&mut self, native: &mut NativeScene) -> Result<()> {
        self.native_body(native)?.sleep();
        Ok(())
    }

    pub fn wake_up(&mut self, native: &mut NativeScene) -> Result<()> {
        self.native_body(native)?.wake_up(true);
        Ok(())
    }

    pub fn is_sleeping(&self, native: &NativeScene) -> bool {
        self.actor
            .handle
            .and_then(|h| native.rigid_body_set.get(h))
            .map_or(false, |b| b.is_sleeping())
    }

    pub fn linear_velocity(&self, native: &NativeScene) -> Vec3 {
        self.actor
            .handle
            .and_then(|h| native.rigid_body_set.get(h))
            .map_or(Vec3::ZERO, |b| crate::convert::from_vector(b.linvel()))
    }

    pub fn set_linear_velocity(&mut self, native: &mut NativeScene, velocity: Vec3) -> Result<()> {
        self.native_body(native)?.set_linvel(to_vector(velocity), true);
        Ok(())
    }

    pub fn set_angular_damping(&mut self, native: &mut NativeScene, damping: f32) -> Result<()> {
        self.native_body(native)?.set_angular_damping(damping);
        Ok(())
    }

    pub fn enable_gravity(&mut self, native: &mut NativeScene) -> Result<()> {
        self.native_body(native)?.set_gravity_scale(1.0, true);
        Ok(())
    }

    pub fn disable_gravity(&mut self, native: &mut NativeScene) -> Result<()> {
        self.native_body(native)?.set_gravity_scale(0.0, true);
        Ok(())
    }

    pub fn gravity_enabled(&self, native: &NativeScene) -> bool {
        self.actor
            .handle
            .and_then(|h| native.rigid_body_set.get(h))
            .map_or(false, |b| b.gravity_scale() != 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::PhysicsGeometry;
    use crate::material::PhysicsMaterial;
    use crate::shape::ShapeId;
    use engine_core::World;
    use std::sync::Arc;

    fn prefab(geometry: PhysicsGeometry) -> ShapePrefab {
        let material = Arc::new(PhysicsMaterial::new("test", 0.5, 0.5, 0.2));
        ShapePrefab::new("test", geometry, material)
    }

    fn entity() -> Entity {
        World::new().spawn(())
    }

    fn built(desc: RigidBodyDescription, geometry: PhysicsGeometry) -> (RigidBody, NativeScene) {
        let mut native = NativeScene::new(Vec3::new(0.0, -9.81, 0.0));
        let mut body = RigidBody::new(entity(), desc);
        body.build_native(&mut native, &Transform::from_position(Vec3::Y), &prefab(geometry))
            .unwrap();
        (body, native)
    }

    #[test]
    fn plane_forces_static() {
        let (body, native) = built(RigidBodyDescription::default(), PhysicsGeometry::Plane);
        assert_eq!(body.rigid_type(), RigidType::Static);
        let handle = body.handle().unwrap();
        assert!(native.rigid_body_set[handle].is_fixed());
    }

    #[test]
    fn zero_density_is_fatal() {
        let mut native = NativeScene::new(Vec3::ZERO);
        let mut body = RigidBody::new(
            entity(),
            RigidBodyDescription {
                density: 0.0,
                ..Default::default()
            },
        );
        let crate_prefab = prefab(PhysicsGeometry::default());
        let result = body.build_native(&mut native, &Transform::default(), &crate_prefab);
        assert!(matches!(result, Err(PhysicsError::Configuration(_))));
    }

    #[test]
    fn articulation_links_are_unsupported() {
        let mut native = NativeScene::new(Vec3::ZERO);
        let mut body = RigidBody::new(
            entity(),
            RigidBodyDescription {
                rigid_type: RigidType::ArticulationLink,
                ..Default::default()
            },
        );
        let crate_prefab = prefab(PhysicsGeometry::default());
        let result = body.build_native(&mut native, &Transform::default(), &crate_prefab);
        assert!(matches!(result, Err(PhysicsError::Unsupported(_))));
    }

    #[test]
    fn kinematic_target_requires_native_kinematic() {
        let (mut body, mut native) = built(
            RigidBodyDescription {
                is_kinematic: true,
                ..Default::default()
            },
            PhysicsGeometry::default(),
        );
        let target = Transform::from_position(Vec3::new(0.0, 3.0, 0.0));
        body.set_transform(&mut native, &target).unwrap();

        // Native flag cleared, wrapper still says kinematic.
        body.set_kinematic(&mut native, false, false).unwrap();
        assert!(body.is_kinematic());
        assert!(matches!(
            body.set_transform(&mut native, &target),
            Err(PhysicsError::State(_))
        ));
    }

    #[test]
    fn static_bodies_cannot_be_kinematic() {
        let (mut body, mut native) = built(
            RigidBodyDescription {
                rigid_type: RigidType::Static,
                ..Default::default()
            },
            PhysicsGeometry::default(),
        );
        assert!(matches!(
            body.set_kinematic(&mut native, true, true),
            Err(PhysicsError::State(_))
        ));
    }

    #[test]
    fn dynamic_pose_write_is_immediate() {
        let (mut body, mut native) =
            built(RigidBodyDescription::default(), PhysicsGeometry::default());
        body.set_transform(&mut native, &Transform::from_position(Vec3::new(4.0, 5.0, 6.0)))
            .unwrap();
        let t = body.transform(&native).unwrap();
        assert_eq!(t.position, Vec3::new(4.0, 5.0, 6.0));
    }

    #[test]
    fn second_shape_is_rejected() {
        let mut body = RigidBody::new(entity(), RigidBodyDescription::default());
        let prefab_id = ShapePrefabId(rapier3d::data::arena::Index::from_raw_parts(0, 0));
        let other_id = ShapePrefabId(rapier3d::data::arena::Index::from_raw_parts(1, 0));
        let collider = ColliderHandle::invalid();

        body.push_shape(PhysicsShape::new(ShapeId(1), collider, prefab_id)).unwrap();
        assert!(matches!(
            body.push_shape(PhysicsShape::new(ShapeId(2), collider, prefab_id)),
            Err(PhysicsError::State(_))
        ));
        assert!(matches!(
            body.push_shape(PhysicsShape::new(ShapeId(3), collider, other_id)),
            Err(PhysicsError::State(_))
        ));
        assert_eq!(body.shapes().len(), 1);
    }
}
