//! Scene graph: named scene objects living in a hecs world.
//!
//! A scene owns its objects; other systems refer to them by [`Entity`] and
//! resolve them by name when rehydrating saved state.

use crate::Transform;
use glam::Vec3;
use hecs::{Entity, World};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

static NEXT_SCENE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique scene identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SceneId(u64);

impl SceneId {
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Display name of a scene object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Name(pub String);

/// Parent link. Objects without one are top-level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Parent(pub Entity);

#[derive(Debug, Error)]
pub enum SceneError {
    #[error("scene object {0:?} does not exist")]
    NoSuchObject(Entity),
}

/// A scene of game objects.
pub struct Scene {
    id: SceneId,
    name: String,
    world: World,
}

impl Scene {
    pub fn new(name: impl Into<String>) -> Self {
        let id = SceneId(NEXT_SCENE_ID.fetch_add(1, Ordering::Relaxed));
        let name = name.into();
        log::debug!("Created scene {:?} ({})", id, name);
        Self {
            id,
            name,
            world: World::new(),
        }
    }

    pub fn id(&self) -> SceneId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Spawn a top-level object.
    pub fn spawn(&mut self, name: impl Into<String>, transform: Transform) -> Entity {
        self.world.spawn((Name(name.into()), transform))
    }

    /// Spawn an object parented to another one.
    pub fn spawn_child(
        &mut self,
        name: impl Into<String>,
        transform: Transform,
        parent: Entity,
    ) -> Result<Entity, SceneError> {
        if !self.world.contains(parent) {
            return Err(SceneError::NoSuchObject(parent));
        }
        Ok(self.world.spawn((Name(name.into()), transform, Parent(parent))))
    }

    pub fn despawn(&mut self, entity: Entity) -> bool {
        self.world.despawn(entity).is_ok()
    }

    pub fn contains(&self, entity: Entity) -> bool {
        self.world.contains(entity)
    }

    /// World transform of an object.
    pub fn transform(&self, entity: Entity) -> Option<Transform> {
        self.world.get::<&Transform>(entity).ok().map(|t| *t)
    }

    pub fn set_transform(
        &mut self,
        entity: Entity,
        transform: Transform,
    ) -> Result<(), SceneError> {
        let mut current = self
            .world
            .get::<&mut Transform>(entity)
            .map_err(|_| SceneError::NoSuchObject(entity))?;
        *current = transform;
        Ok(())
    }

    /// Move an object, leaving rotation and scale untouched.
    pub fn set_position(&mut self, entity: Entity, position: Vec3) -> Result<(), SceneError> {
        let mut current = self
            .world
            .get::<&mut Transform>(entity)
            .map_err(|_| SceneError::NoSuchObject(entity))?;
        current.position = position;
        Ok(())
    }

    pub fn object_name(&self, entity: Entity) -> Option<String> {
        self.world.get::<&Name>(entity).ok().map(|n| n.0.clone())
    }

    /// First object with the given name.
    pub fn find_by_name(&self, name: &str) -> Option<Entity> {
        self.world
            .query::<&Name>()
            .iter()
            .find(|(_, n)| n.0 == name)
            .map(|(entity, _)| entity)
    }

    /// Objects with a transform and no parent.
    pub fn top_level_objects(&self) -> Vec<Entity> {
        self.world
            .query::<(&Transform, Option<&Parent>)>()
            .iter()
            .filter(|(_, (_, parent))| parent.is_none())
            .map(|(entity, _)| entity)
            .collect()
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenes_get_distinct_ids() {
        let a = Scene::new("a");
        let b = Scene::new("b");
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn children_are_not_top_level() {
        let mut scene = Scene::new("graph");
        let root = scene.spawn("root", Transform::default());
        let child = scene.spawn_child("child", Transform::default(), root).unwrap();
        let top = scene.top_level_objects();
        assert!(top.contains(&root));
        assert!(!top.contains(&child));
    }

    #[test]
    fn find_by_name_and_move() {
        let mut scene = Scene::new("graph");
        let crate_obj = scene.spawn("crate", Transform::from_position(Vec3::Y));
        assert_eq!(scene.find_by_name("crate"), Some(crate_obj));
        assert_eq!(scene.find_by_name("barrel"), None);

        scene.set_position(crate_obj, Vec3::new(0.0, 5.0, 0.0)).unwrap();
        assert_eq!(scene.transform(crate_obj).unwrap().position.y, 5.0);

        assert!(scene.despawn(crate_obj));
        assert!(scene.set_position(crate_obj, Vec3::ZERO).is_err());
    }
}
