//! The physics manager: material and shape registries, physics scenes, and
//! the per-tick `step` that drives them.

use crate::actor::{BodyId, RigidBodyDescription};
use crate::collision::{CollisionFlags, ControllerFilters};
use crate::config::PhysicsConfig;
use crate::controller::{ControllerDescription, ControllerId};
use crate::dispatcher::SolverDispatcher;
use crate::error::{PhysicsError, Result};
use crate::geometry::PhysicsGeometry;
use crate::joint::{JointActor, JointId, JointType};
use crate::material::PhysicsMaterial;
use crate::scene::PhysicsScene;
use crate::shape::{ShapeInstance, ShapePrefab, ShapePrefabId};
use engine_core::{Entity, Scene, SceneId, Transform, Vec3};
use rapier3d::data::arena::Arena;
use std::sync::Arc;

pub const DEFAULT_MATERIAL: &str = "defaultMaterial";
pub const DEFAULT_SHAPE: &str = "defaultShape";

/// Owns every physics scene and shape prefab, and shares the materials.
pub struct PhysicsWorld {
    config: PhysicsConfig,
    dispatcher: SolverDispatcher,
    materials: Vec<Arc<PhysicsMaterial>>,
    pub(crate) prefabs: Arena<ShapePrefab>,
    scenes: Vec<PhysicsScene>,
    default_shape: Option<ShapePrefabId>,
}

impl PhysicsWorld {
    pub fn new(config: PhysicsConfig) -> Self {
        let dispatcher = SolverDispatcher::new(config.solver_thread_count());
        let mut world = Self {
            config,
            dispatcher,
            materials: Vec::new(),
            prefabs: Arena::new(),
            scenes: Vec::new(),
            default_shape: None,
        };
        world.seed_defaults();
        log::info!(
            "Physics world ready ({} solver threads)",
            world.dispatcher.worker_count()
        );
        world
    }

    pub fn config(&self) -> &PhysicsConfig {
        &self.config
    }

    fn seed_defaults(&mut self) {
        let material = match self.material(DEFAULT_MATERIAL) {
            Some(material) => material.clone(),
            None => {
                let material = Arc::new(PhysicsMaterial::new(DEFAULT_MATERIAL, 0.5, 0.5, 0.2));
                self.materials.insert(0, material.clone());
                material
            }
        };
        if self.default_shape.is_none() {
            let prefab = ShapePrefab::new(DEFAULT_SHAPE, PhysicsGeometry::default(), material);
            self.default_shape = Some(ShapePrefabId(self.prefabs.insert(prefab)));
        }
    }

    /// Drop every scene and every non-default material and prefab. Without
    /// `preserve_defaults` the defaults go too; only final teardown does that.
    pub fn clear(&mut self, preserve_defaults: bool) {
        for mut scene in self.scenes.drain(..) {
            scene.prepare_shapes_for_delete();
            scene.release();
        }

        if preserve_defaults {
            let default = self.default_shape;
            self.prefabs.retain(|index, _| Some(ShapePrefabId(index)) == default);
            if let Some(prefab) = default.and_then(|id| self.prefabs.get_mut(id.0)) {
                prefab.take_instances();
            }
            self.materials.retain(|m| m.name() == DEFAULT_MATERIAL);
        } else {
            self.prefabs.clear();
            self.default_shape = None;
            self.materials.clear();
        }
        log::info!("Physics registries cleared (defaults kept: {})", preserve_defaults);
    }

    /// Release everything, then stop the solver pool.
    pub fn shutdown(&mut self) {
        self.clear(false);
        self.dispatcher.shutdown();
    }

    // Materials ---------------------------------------------------------------

    pub fn material(&self, name: &str) -> Option<&Arc<PhysicsMaterial>> {
        self.materials.iter().find(|m| m.name() == name)
    }

    pub fn require_material(&self, name: &str) -> Result<Arc<PhysicsMaterial>> {
        self.material(name)
            .cloned()
            .ok_or_else(|| PhysicsError::not_found("material", name))
    }

    pub fn default_material(&self) -> Option<&Arc<PhysicsMaterial>> {
        self.material(DEFAULT_MATERIAL)
    }

    pub fn materials(&self) -> &[Arc<PhysicsMaterial>] {
        &self.materials
    }

    pub fn create_material(
        &mut self,
        name: &str,
        static_friction: f32,
        dynamic_friction: f32,
        restitution: f32,
    ) -> Result<Arc<PhysicsMaterial>> {
        if self.material(name).is_some() {
            return Err(PhysicsError::Configuration(format!("material '{}' already exists", name)));
        }
        if static_friction < 0.0 || dynamic_friction < 0.0 || restitution < 0.0 {
            return Err(PhysicsError::Configuration(format!(
                "material '{}' needs non-negative friction and restitution",
                name
            )));
        }
        let material = Arc::new(PhysicsMaterial::new(
            name,
            static_friction,
            dynamic_friction,
            restitution,
        ));
        self.materials.push(material.clone());
        log::info!("Created material '{}'", name);
        Ok(material)
    }

    /// Unregister a material. Prefabs already using it keep their reference.
    pub fn remove_material(&mut self, name: &str) -> Result<()> {
        if name == DEFAULT_MATERIAL {
            return Err(PhysicsError::State("the default material cannot be removed".into()));
        }
        let index = self
            .materials
            .iter()
            .position(|m| m.name() == name)
            .ok_or_else(|| PhysicsError::not_found("material", name))?;
        self.materials.remove(index);
        log::info!("Removed material '{}'", name);
        Ok(())
    }

    // Shape prefabs -----------------------------------------------------------

    pub fn shape(&self, name: &str) -> Option<ShapePrefabId> {
        self.prefabs
            .iter()
            .find(|(_, p)| p.name() == name)
            .map(|(i, _)| ShapePrefabId(i))
    }

    pub fn require_shape(&self, name: &str) -> Result<ShapePrefabId> {
        self.shape(name)
            .ok_or_else(|| PhysicsError::not_found("shape prefab", name))
    }

    pub fn default_shape(&self) -> Option<ShapePrefabId> {
        self.default_shape
    }

    pub fn prefab(&self, id: ShapePrefabId) -> Option<&ShapePrefab> {
        self.prefabs.get(id.0)
    }

    fn require_prefab(&self, id: ShapePrefabId) -> Result<&ShapePrefab> {
        self.prefab(id)
            .ok_or_else(|| PhysicsError::not_found("shape prefab", format!("{:?}", id)))
    }

    pub fn prefabs(&self) -> impl Iterator<Item = (ShapePrefabId, &ShapePrefab)> {
        self.prefabs.iter().map(|(i, p)| (ShapePrefabId(i), p))
    }

    pub fn create_shape(
        &mut self,
        name: &str,
        geometry: PhysicsGeometry,
        material: &str,
    ) -> Result<ShapePrefabId> {
        if self.shape(name).is_some() {
            return Err(PhysicsError::Configuration(format!(
                "shape prefab '{}' already exists",
                name
            )));
        }
        geometry.validate()?;
        let material = self.require_material(material)?;
        let id = ShapePrefabId(self.prefabs.insert(ShapePrefab::new(name, geometry, material)));
        log::info!("Created {} shape prefab '{}'", geometry.kind_name(), name);
        Ok(id)
    }

    pub fn rename_shape(&mut self, id: ShapePrefabId, name: &str) -> Result<()> {
        if Some(id) == self.default_shape {
            return Err(PhysicsError::State("the default shape cannot be renamed".into()));
        }
        if self.shape(name).is_some_and(|existing| existing != id) {
            return Err(PhysicsError::Configuration(format!(
                "shape prefab '{}' already exists",
                name
            )));
        }
        let prefab = self
            .prefabs
            .get_mut(id.0)
            .ok_or_else(|| PhysicsError::not_found("shape prefab", format!("{:?}", id)))?;
        log::info!("Renamed shape prefab '{}' to '{}'", prefab.name(), name);
        prefab.set_name(name);
        Ok(())
    }

    pub fn add_shape_material(&mut self, id: ShapePrefabId, material: &str) -> Result<()> {
        let material = self.require_material(material)?;
        self.prefabs
            .get_mut(id.0)
            .ok_or_else(|| PhysicsError::not_found("shape prefab", format!("{:?}", id)))?
            .add_material(material);
        Ok(())
    }

    /// Replace a prefab's geometry and rebuild every instance from it.
    pub fn set_shape_geometry(
        &mut self,
        id: ShapePrefabId,
        geometry: PhysicsGeometry,
    ) -> Result<()> {
        geometry.validate()?;
        let prefab = self
            .prefabs
            .get_mut(id.0)
            .ok_or_else(|| PhysicsError::not_found("shape prefab", format!("{:?}", id)))?;
        if !prefab.instances().is_empty() {
            prefab.material()?;
        }
        prefab.replace_geometry(geometry);
        self.update_instances(id)
    }

    /// Rebuild the collider of every instance of a prefab, one for one.
    pub fn update_instances(&mut self, id: ShapePrefabId) -> Result<()> {
        let prefab = self
            .prefabs
            .get(id.0)
            .ok_or_else(|| PhysicsError::not_found("shape prefab", format!("{:?}", id)))?;
        if !prefab.instances().is_empty() {
            prefab.material()?;
        }
        for instance in prefab.instances() {
            match self.scenes.iter_mut().find(|s| s.scene_id() == instance.scene) {
                Some(scene) => scene.rebuild_shape(instance.body, instance.shape, id, prefab)?,
                None => log::warn!("Prefab '{}' has an instance in a missing scene", prefab.name()),
            }
        }
        log::debug!("Updated {} instances of '{}'", prefab.instances().len(), prefab.name());
        Ok(())
    }

    /// Move one shape instance over to another prefab and rebuild it.
    pub fn set_shape_prefab(
        &mut self,
        instance: ShapeInstance,
        prefab_id: ShapePrefabId,
    ) -> Result<()> {
        self.require_prefab(prefab_id)?.material()?;
        let scene = find_scene(&mut self.scenes, instance.scene)?;
        let current = scene
            .body(instance.body)
            .and_then(|b| b.shapes().iter().find(|s| s.id() == instance.shape))
            .ok_or_else(|| PhysicsError::not_found("shape", format!("{:?}", instance.shape)))?
            .prefab();

        if let Some(old) = current.and_then(|old| self.prefabs.get_mut(old.0)) {
            old.remove_instance(instance.shape)?;
        }
        if let Some(prefab) = self.prefabs.get(prefab_id.0) {
            scene.rebuild_shape(instance.body, instance.shape, prefab_id, prefab)?;
        }
        if let Some(prefab) = self.prefabs.get_mut(prefab_id.0) {
            prefab.add_instance(instance);
        }
        Ok(())
    }

    /// Remove a prefab. Its instances move to the default prefab first.
    pub fn remove_shape(&mut self, id: ShapePrefabId) -> Result<()> {
        let default_id = self
            .default_shape
            .ok_or_else(|| PhysicsError::State("no default shape to fall back to".into()))?;
        if id == default_id {
            return Err(PhysicsError::State("the default shape cannot be removed".into()));
        }
        if !self.require_prefab(id)?.instances().is_empty() {
            self.require_prefab(default_id)?.material()?;
        }
        let instances = self
            .prefabs
            .get_mut(id.0)
            .ok_or_else(|| PhysicsError::not_found("shape prefab", format!("{:?}", id)))?
            .take_instances();

        for instance in &instances {
            if let (Some(scene), Some(default)) = (
                self.scenes.iter_mut().find(|s| s.scene_id() == instance.scene),
                self.prefabs.get(default_id.0),
            ) {
                scene.rebuild_shape(instance.body, instance.shape, default_id, default)?;
            }
            if let Some(default) = self.prefabs.get_mut(default_id.0) {
                default.add_instance(*instance);
            }
        }

        if let Some(prefab) = self.prefabs.remove(id.0) {
            log::info!(
                "Removed shape prefab '{}', {} instances moved to '{}'",
                prefab.name(),
                instances.len(),
                DEFAULT_SHAPE
            );
        }
        Ok(())
    }

    // Scenes ------------------------------------------------------------------

    pub fn create_scene(&mut self, graph: &Scene) -> Result<&mut PhysicsScene> {
        let id = graph.id();
        if self.scene(id).is_some() {
            return Err(PhysicsError::State(format!("scene {} already has physics", id.raw())));
        }
        self.scenes.push(PhysicsScene::new(id, self.config.scene_gravity));
        log::info!("Created physics scene for '{}'", graph.name());
        let index = self.scenes.len() - 1;
        Ok(&mut self.scenes[index])
    }

    /// Drop a physics scene. Returns false if it was already gone.
    pub fn destroy_scene(&mut self, id: SceneId) -> bool {
        let Some(index) = self.scenes.iter().position(|s| s.scene_id() == id) else {
            return false;
        };
        let mut scene = self.scenes.remove(index);
        for (prefab_id, shape) in scene.shape_links() {
            if let Some(prefab) = self.prefabs.get_mut(prefab_id.0) {
                if let Err(err) = prefab.remove_instance(shape) {
                    log::warn!("{}", err);
                }
            }
        }
        scene.release();
        log::debug!("Destroyed physics scene {}", id.raw());
        true
    }

    pub fn scene(&self, id: SceneId) -> Option<&PhysicsScene> {
        self.scenes.iter().find(|s| s.scene_id() == id)
    }

    pub fn scene_mut(&mut self, id: SceneId) -> Option<&mut PhysicsScene> {
        self.scenes.iter_mut().find(|s| s.scene_id() == id)
    }

    pub fn require_scene_mut(&mut self, id: SceneId) -> Result<&mut PhysicsScene> {
        find_scene(&mut self.scenes, id)
    }

    pub fn scenes(&self) -> impl Iterator<Item = &PhysicsScene> {
        self.scenes.iter()
    }

    pub fn scene_count(&self) -> usize {
        self.scenes.len()
    }

    // Rigid bodies ------------------------------------------------------------

    /// Create a body for `object` at its current transform, shaped by `prefab`.
    pub fn create_rigid_body(
        &mut self,
        scene_id: SceneId,
        graph: &Scene,
        object: Entity,
        desc: RigidBodyDescription,
        prefab: ShapePrefabId,
    ) -> Result<BodyId> {
        let transform = graph
            .transform(object)
            .ok_or_else(|| PhysicsError::not_found("scene object", format!("{:?}", object)))?;
        let scene = find_scene(&mut self.scenes, scene_id)?;
        let id = scene.insert_body(object, desc)?;
        if let Err(err) = scene.initialize_body(id, &transform, prefab, &mut self.prefabs) {
            if let Err(cleanup) = scene.remove_body(id, &mut self.prefabs) {
                log::warn!("Cleanup after failed body creation: {}", cleanup);
            }
            return Err(err);
        }
        Ok(id)
    }

    /// Rebuild a body at `transform` from `prefab`.
    pub fn initialize_rigid_body(
        &mut self,
        scene_id: SceneId,
        body: BodyId,
        transform: &Transform,
        prefab: ShapePrefabId,
    ) -> Result<()> {
        find_scene(&mut self.scenes, scene_id)?.initialize_body(
            body,
            transform,
            prefab,
            &mut self.prefabs,
        )
    }

    /// Rebuild a body from its object's current transform and its current prefab.
    pub fn reinitialize_rigid_body(
        &mut self,
        scene_id: SceneId,
        body: BodyId,
        graph: &Scene,
    ) -> Result<()> {
        let scene = find_scene(&mut self.scenes, scene_id)?;
        let rigid_body = scene
            .body(body)
            .ok_or_else(|| PhysicsError::not_found("rigid body", format!("{:?}", body)))?;
        let prefab = rigid_body
            .prefab()
            .ok_or_else(|| {
                PhysicsError::State("cannot reinitialize a body without a shape".into())
            })?;
        let transform = graph
            .transform(rigid_body.scene_object())
            .ok_or_else(|| {
                PhysicsError::not_found("scene object", format!("{:?}", rigid_body.scene_object()))
            })?;
        scene.initialize_body(body, &transform, prefab, &mut self.prefabs)
    }

    /// Remove a body. A scene that is already gone took the body with it.
    pub fn remove_rigid_body(&mut self, scene_id: SceneId, body: BodyId) -> Result<()> {
        match self.scenes.iter_mut().find(|s| s.scene_id() == scene_id) {
            Some(scene) => scene.remove_body(body, &mut self.prefabs),
            None => {
                log::debug!("Body {:?} outlived scene {}, nothing to detach", body, scene_id.raw());
                Ok(())
            }
        }
    }

    // Controllers -------------------------------------------------------------

    /// Create a controller standing `height_offset` above `object` along its up direction.
    pub fn create_controller(
        &mut self,
        scene_id: SceneId,
        graph: &Scene,
        object: Entity,
        description: ControllerDescription,
        height_offset: f32,
    ) -> Result<ControllerId> {
        let material = self.require_material(&description.material)?;
        let scene = find_scene(&mut self.scenes, scene_id)?;
        scene.create_controller(graph, object, description, &material, height_offset, &self.config)
    }

    pub fn remove_controller(&mut self, scene_id: SceneId, id: ControllerId) -> Result<()> {
        find_scene(&mut self.scenes, scene_id)?.remove_controller(id)
    }

    pub fn move_controller(
        &mut self,
        graph: &mut Scene,
        id: ControllerId,
        displacement: Vec3,
        dt: f32,
        filters: &ControllerFilters,
    ) -> Result<CollisionFlags> {
        find_scene(&mut self.scenes, graph.id())?
            .move_controller(graph, id, displacement, dt, filters)
    }

    // Joints ------------------------------------------------------------------

    pub fn create_joint(
        &mut self,
        scene_id: SceneId,
        joint_type: JointType,
        actor_a: JointActor,
        frame_a: &Transform,
        actor_b: JointActor,
        frame_b: &Transform,
    ) -> Result<JointId> {
        find_scene(&mut self.scenes, scene_id)?
            .create_joint(joint_type, actor_a, frame_a, actor_b, frame_b)
    }

    // Stepping ----------------------------------------------------------------

    /// Advance every live scene by `dt`: controller gravity first, then the
    /// rigid body solve. Physics scenes whose graph is gone are dropped first.
    pub fn step(&mut self, dt: f32, graphs: &mut [Scene]) -> Result<()> {
        let stale: Vec<SceneId> = self
            .scenes
            .iter()
            .map(|s| s.scene_id())
            .filter(|id| !graphs.iter().any(|g| g.id() == *id))
            .collect();
        for id in stale {
            self.destroy_scene(id);
        }

        for scene in &mut self.scenes {
            let Some(graph) = graphs.iter_mut().find(|g| g.id() == scene.scene_id()) else {
                continue;
            };
            scene.update_controllers(graph, dt)?;
            scene.simulate(dt, &self.dispatcher)?;
            scene.fetch_results(true, graph)?;
        }
        Ok(())
    }
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self::new(PhysicsConfig::default())
    }
}

impl Drop for PhysicsWorld {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn find_scene(scenes: &mut [PhysicsScene], id: SceneId) -> Result<&mut PhysicsScene> {
    scenes
        .iter_mut()
        .find(|s| s.scene_id() == id)
        .ok_or_else(|| PhysicsError::not_found("physics scene", id.raw().to_string()))
}
