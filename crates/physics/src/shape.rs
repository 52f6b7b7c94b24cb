//! Shape prefabs (shared geometry + material templates) and the per-body
//! shapes stamped from them.
//!
//! Prefabs never point at shapes and shapes never point at prefabs directly:
//! each side holds ids. A prefab lists [`ShapeInstance`]s, a shape keeps an
//! optional [`ShapePrefabId`]. Dropping either side only invalidates ids.

use crate::collision::CollisionGroup;
use crate::error::{PhysicsError, Result};
use crate::geometry::PhysicsGeometry;
use crate::material::PhysicsMaterial;
use crate::native::NativeScene;
use engine_core::SceneId;
use rapier3d::data::arena::Index;
use rapier3d::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Stable id of a prefab in the world's registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShapePrefabId(pub(crate) Index);

/// Stable id of one shape instance. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShapeId(pub(crate) u64);

/// Stable id of a rigid body inside its physics scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BodyId(pub(crate) Index);

/// Where a prefab instance lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShapeInstance {
    pub scene: SceneId,
    pub body: BodyId,
    pub shape: ShapeId,
}

/// Named geometry + material template shared by many bodies.
#[derive(Debug)]
pub struct ShapePrefab {
    name: String,
    geometry: PhysicsGeometry,
    materials: Vec<Arc<PhysicsMaterial>>,
    instances: Vec<ShapeInstance>,
}

impl ShapePrefab {
    pub(crate) fn new(
        name: impl Into<String>,
        geometry: PhysicsGeometry,
        material: Arc<PhysicsMaterial>,
    ) -> Self {
        Self {
            name: name.into(),
            geometry,
            materials: vec![material],
            instances: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn geometry(&self) -> &PhysicsGeometry {
        &self.geometry
    }

    /// Swap the geometry. Instances keep their old colliders until the world
    /// rebuilds them.
    pub(crate) fn replace_geometry(&mut self, geometry: PhysicsGeometry) {
        self.geometry = geometry;
    }

    pub fn materials(&self) -> &[Arc<PhysicsMaterial>] {
        &self.materials
    }

    pub(crate) fn add_material(&mut self, material: Arc<PhysicsMaterial>) {
        self.materials.push(material);
    }

    /// The single material of this prefab. Several materials are ambiguous.
    pub fn material(&self) -> Result<&Arc<PhysicsMaterial>> {
        match self.materials.as_slice() {
            [only] => Ok(only),
            [] => Err(PhysicsError::Configuration(format!(
                "shape prefab '{}' has no material",
                self.name
            ))),
            _ => Err(PhysicsError::Configuration(format!(
                "shape prefab '{}' has {} materials, a single material is ambiguous",
                self.name,
                self.materials.len()
            ))),
        }
    }

    pub fn instances(&self) -> &[ShapeInstance] {
        &self.instances
    }

    pub(crate) fn add_instance(&mut self, instance: ShapeInstance) {
        self.instances.push(instance);
    }

    pub(crate) fn remove_instance(&mut self, shape: ShapeId) -> Result<()> {
        let index = self
            .instances
            .iter()
            .position(|i| i.shape == shape)
            .ok_or_else(|| {
                PhysicsError::State(format!(
                    "shape {:?} is not an instance of prefab '{}'",
                    shape, self.name
                ))
            })?;
        self.instances.remove(index);
        Ok(())
    }

    /// Hand the instance list over wholesale, leaving this prefab with none.
    pub(crate) fn take_instances(&mut self) -> Vec<ShapeInstance> {
        std::mem::take(&mut self.instances)
    }

    /// Build a collider exclusive to `body` from this prefab's geometry and material.
    pub(crate) fn create_exclusive(
        &self,
        native: &mut NativeScene,
        body: RigidBodyHandle,
        density: f32,
    ) -> Result<ColliderHandle> {
        let material = self.material()?;
        let (membership, filter) = CollisionGroup::body();
        let collider = ColliderBuilder::new(self.geometry.to_shared_shape())
            .friction(material.dynamic_friction)
            .restitution(material.restitution)
            .density(density)
            .collision_groups(InteractionGroups::new(membership, filter))
            .build();
        Ok(native.attach_collider(collider, body))
    }

    pub(crate) fn to_document(&self) -> ShapePrefabDocument {
        ShapePrefabDocument {
            geometry: self.geometry,
            materials: self.materials.iter().map(|m| m.name().to_string()).collect(),
        }
    }
}

/// One collider stamped from a prefab, owned by exactly one body.
#[derive(Debug)]
pub struct PhysicsShape {
    id: ShapeId,
    collider: ColliderHandle,
    prefab: Option<ShapePrefabId>,
}

impl PhysicsShape {
    pub(crate) fn new(id: ShapeId, collider: ColliderHandle, prefab: ShapePrefabId) -> Self {
        Self {
            id,
            collider,
            prefab: Some(prefab),
        }
    }

    pub fn id(&self) -> ShapeId {
        self.id
    }

    pub fn collider(&self) -> ColliderHandle {
        self.collider
    }

    /// Prefab this shape was built from, or `None` once that prefab is gone.
    pub fn prefab(&self) -> Option<ShapePrefabId> {
        self.prefab
    }

    pub(crate) fn set_prefab(&mut self, prefab: ShapePrefabId) {
        self.prefab = Some(prefab);
    }

    /// Forget the prefab so teardown does not try to deregister from it.
    pub(crate) fn prepare_for_delete(&mut self) {
        self.prefab = None;
    }

    /// Drop the native collider from its body.
    pub(crate) fn detach(&self, native: &mut NativeScene) {
        if !native.remove_collider(self.collider) {
            log::warn!("Shape {:?} had no native collider to detach", self.id);
        }
    }

    /// Replace the native collider with a fresh one from `prefab`.
    pub(crate) fn reinitialize(
        &mut self,
        native: &mut NativeScene,
        prefab: &ShapePrefab,
        body: RigidBodyHandle,
        density: f32,
    ) -> Result<()> {
        let collider = prefab.create_exclusive(native, body, density)?;
        self.detach(native);
        self.collider = collider;
        Ok(())
    }
}

/// Saved form of a prefab; the name is the document key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapePrefabDocument {
    pub geometry: PhysicsGeometry,
    pub materials: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn material(name: &str) -> Arc<PhysicsMaterial> {
        Arc::new(PhysicsMaterial::new(name, 0.5, 0.4, 0.1))
    }

    #[test]
    fn single_material_is_unambiguous() {
        let mut prefab = ShapePrefab::new("crate", PhysicsGeometry::default(), material("wood"));
        assert_eq!(prefab.material().unwrap().name(), "wood");

        prefab.add_material(material("steel"));
        assert!(matches!(prefab.material(), Err(PhysicsError::Configuration(_))));
    }

    #[test]
    fn exclusive_collider_uses_geometry_and_material() {
        let prefab = ShapePrefab::new(
            "ball",
            PhysicsGeometry::Sphere { radius: 0.25 },
            material("rubber"),
        );
        let mut native = NativeScene::new(Vec3::ZERO);
        let body = native.insert_body(RigidBodyBuilder::dynamic().build());
        let handle = prefab.create_exclusive(&mut native, body, 2.0).unwrap();

        let collider = native.collider_set.get(handle).unwrap();
        assert_eq!(collider.shape().as_ball().map(|b| b.radius), Some(0.25));
        assert_eq!(collider.friction(), 0.4);
        assert_eq!(collider.parent(), Some(body));
    }

    #[test]
    fn removing_unknown_instance_is_an_error() {
        let mut prefab = ShapePrefab::new("crate", PhysicsGeometry::default(), material("wood"));
        assert!(matches!(
            prefab.remove_instance(ShapeId(99)),
            Err(PhysicsError::State(_))
        ));
    }

    #[test]
    fn failed_rebuild_keeps_the_old_collider() {
        let mut native = NativeScene::new(Vec3::ZERO);
        let body = native.insert_body(RigidBodyBuilder::dynamic().build());
        let mut prefab = ShapePrefab::new("crate", PhysicsGeometry::default(), material("wood"));
        let collider = prefab.create_exclusive(&mut native, body, 1.0).unwrap();
        let prefab_id = ShapePrefabId(Index::from_raw_parts(0, 0));
        let mut shape = PhysicsShape::new(ShapeId(1), collider, prefab_id);

        prefab.add_material(material("steel"));
        assert!(matches!(
            shape.reinitialize(&mut native, &prefab, body, 1.0),
            Err(PhysicsError::Configuration(_))
        ));
        assert_eq!(shape.collider(), collider);
        assert!(native.collider_set.get(collider).is_some());
        assert_eq!(native.rigid_body_set[body].colliders().len(), 1);
    }
}
