//! Per-scene simulation context and its two-phase step.
//!
//! A `PhysicsScene` mirrors one scene-graph scene. Its native state lives in a
//! boxed [`NativeScene`] that `simulate` hands to the solver pool and
//! `fetch_results` takes back. While the box is away every native access
//! fails with a state error, so no query ever sees a half-solved world.

use crate::actor::{BodyId, RigidBody, RigidBodyDescription};
use crate::collision::{CollisionFlags, ControllerFilters};
use crate::config::PhysicsConfig;
use crate::controller::{ControllerDescription, ControllerId, ControllerManager};
use crate::convert::{from_isometry, to_vector};
use crate::dispatcher::SolverDispatcher;
use crate::error::{PhysicsError, Result};
use crate::joint::{JointActor, JointId, JointType, PhysicsJoint};
use crate::material::PhysicsMaterial;
use crate::native::NativeScene;
use crate::raycast::Raycast;
use crate::shape::{PhysicsShape, ShapeId, ShapeInstance, ShapePrefab, ShapePrefabId};
use crossbeam_channel::{bounded, Receiver, TryRecvError};
use engine_core::{Entity, Scene, SceneId, Transform, Vec3};
use rapier3d::data::arena::Arena;
use rapier3d::prelude::{ImpulseJointHandle, RigidBodyHandle};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_SHAPE_ID: AtomicU64 = AtomicU64::new(1);

fn next_shape_id() -> ShapeId {
    ShapeId(NEXT_SHAPE_ID.fetch_add(1, Ordering::Relaxed))
}

pub struct PhysicsScene {
    scene_id: SceneId,
    gravity: Vec3,
    native: Option<Box<NativeScene>>,
    pending: Option<Receiver<Box<NativeScene>>>,
    bodies: Arena<RigidBody>,
    object_bodies: HashMap<Entity, BodyId>,
    actor_objects: HashMap<RigidBodyHandle, Entity>,
    controllers: ControllerManager,
    joints: Arena<PhysicsJoint>,
    joint_lookup: HashMap<ImpulseJointHandle, JointId>,
}

impl PhysicsScene {
    pub(crate) fn new(scene_id: SceneId, gravity: Vec3) -> Self {
        log::debug!("Creating physics scene for scene {}", scene_id.raw());
        Self {
            scene_id,
            gravity,
            native: Some(Box::new(NativeScene::new(gravity))),
            pending: None,
            bodies: Arena::new(),
            object_bodies: HashMap::new(),
            actor_objects: HashMap::new(),
            controllers: ControllerManager::default(),
            joints: Arena::new(),
            joint_lookup: HashMap::new(),
        }
    }

    pub fn scene_id(&self) -> SceneId {
        self.scene_id
    }

    pub fn gravity(&self) -> Vec3 {
        self.gravity
    }

    pub fn set_gravity(&mut self, gravity: Vec3) -> Result<()> {
        self.native_mut()?.gravity = to_vector(gravity);
        self.gravity = gravity;
        Ok(())
    }

    /// True between `simulate` and the `fetch_results` that completes it.
    pub fn is_simulating(&self) -> bool {
        self.pending.is_some()
    }

    pub fn native(&self) -> Result<&NativeScene> {
        match self.native.as_deref() {
            Some(native) => Ok(native),
            None => Err(unavailable(self.scene_id)),
        }
    }

    pub fn native_mut(&mut self) -> Result<&mut NativeScene> {
        match self.native.as_deref_mut() {
            Some(native) => Ok(native),
            None => Err(unavailable(self.scene_id)),
        }
    }

    pub fn update_query_pipeline(&mut self) -> Result<()> {
        self.native_mut()?.update_query_pipeline();
        Ok(())
    }

    // Bodies ------------------------------------------------------------------

    pub fn body(&self, id: BodyId) -> Option<&RigidBody> {
        self.bodies.get(id.0)
    }

    /// A body together with the native scene its methods act on.
    pub fn body_mut(&mut self, id: BodyId) -> Result<(&mut RigidBody, &mut NativeScene)> {
        let native = self.native.as_deref_mut().ok_or_else(|| unavailable(self.scene_id))?;
        let body = self
            .bodies
            .get_mut(id.0)
            .ok_or_else(|| PhysicsError::not_found("rigid body", format!("{:?}", id)))?;
        Ok((body, native))
    }

    pub fn bodies(&self) -> impl Iterator<Item = (BodyId, &RigidBody)> {
        self.bodies.iter().map(|(i, b)| (BodyId(i), b))
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    pub fn body_for_object(&self, object: Entity) -> Option<BodyId> {
        self.object_bodies.get(&object).copied()
    }

    /// Scene object owning a native body, whether rigid body or controller.
    pub fn body_object(&self, handle: RigidBodyHandle) -> Option<Entity> {
        self.actor_objects
            .get(&handle)
            .copied()
            .or_else(|| self.controllers.object_for_body(handle))
    }

    /// Register a wrapper with no native body yet.
    pub(crate) fn insert_body(
        &mut self,
        object: Entity,
        desc: RigidBodyDescription,
    ) -> Result<BodyId> {
        if self.object_bodies.contains_key(&object) {
            return Err(PhysicsError::State(format!("{:?} already has a rigid body", object)));
        }
        let id = BodyId(self.bodies.insert(RigidBody::new(object, desc)));
        self.object_bodies.insert(object, id);
        Ok(id)
    }

    /// Attach a built body to the scene: map it to its object and turn gravity on.
    pub fn add_actor(&mut self, id: BodyId) -> Result<()> {
        let (body, native) = self.body_mut(id)?;
        let handle = body.require_handle()?;
        let object = body.scene_object();
        body.enable_gravity(native)?;
        self.actor_objects.insert(handle, object);
        self.object_bodies.insert(object, id);
        Ok(())
    }

    /// Detach a body's native actor. The wrapper stays and can be rebuilt.
    pub fn remove_actor(&mut self, id: BodyId) -> Result<()> {
        let native = self.native.as_deref_mut().ok_or_else(|| unavailable(self.scene_id))?;
        let body = self
            .bodies
            .get_mut(id.0)
            .ok_or_else(|| PhysicsError::not_found("rigid body", format!("{:?}", id)))?;
        if let Some(handle) = body.release_native(native) {
            self.actor_objects.remove(&handle);
        }
        forget_joints(&mut self.joints, &mut self.joint_lookup, id);
        Ok(())
    }

    /// Build or rebuild a body from `prefab`: old shapes and native body go,
    /// one fresh exclusive shape comes in, then the body is added to the scene.
    pub(crate) fn initialize_body(
        &mut self,
        id: BodyId,
        transform: &Transform,
        prefab_id: ShapePrefabId,
        prefabs: &mut Arena<ShapePrefab>,
    ) -> Result<()> {
        let scene_id = self.scene_id;
        let native = self.native.as_deref_mut().ok_or_else(|| unavailable(scene_id))?;
        let body = self
            .bodies
            .get_mut(id.0)
            .ok_or_else(|| PhysicsError::not_found("rigid body", format!("{:?}", id)))?;

        for shape in body.clear_shapes(native) {
            deregister(prefabs, &shape);
        }
        if let Some(old) = body.release_native(native) {
            self.actor_objects.remove(&old);
            forget_joints(&mut self.joints, &mut self.joint_lookup, id);
        }

        let prefab = prefabs
            .get_mut(prefab_id.0)
            .ok_or_else(|| PhysicsError::not_found("shape prefab", format!("{:?}", prefab_id)))?;
        let (_, collider) = body.build_native(native, transform, prefab)?;
        let shape = next_shape_id();
        body.push_shape(PhysicsShape::new(shape, collider, prefab_id))?;
        prefab.add_instance(ShapeInstance {
            scene: scene_id,
            body: id,
            shape,
        });

        self.add_actor(id)?;
        self.relink_joints(id)
    }

    /// Drop a body entirely, deregistering its shape from the prefab.
    pub(crate) fn remove_body(
        &mut self,
        id: BodyId,
        prefabs: &mut Arena<ShapePrefab>,
    ) -> Result<()> {
        let native = self.native.as_deref_mut().ok_or_else(|| unavailable(self.scene_id))?;
        let mut body = self
            .bodies
            .remove(id.0)
            .ok_or_else(|| PhysicsError::not_found("rigid body", format!("{:?}", id)))?;
        self.object_bodies.remove(&body.scene_object());
        forget_joints(&mut self.joints, &mut self.joint_lookup, id);

        for shape in body.clear_shapes(native) {
            deregister(prefabs, &shape);
        }
        if let Some(handle) = body.release_native(native) {
            self.actor_objects.remove(&handle);
        }
        Ok(())
    }

    /// Rebuild one shape's collider from `prefab` in place. A Plane prefab
    /// turns the body static.
    pub(crate) fn rebuild_shape(
        &mut self,
        body_id: BodyId,
        shape_id: ShapeId,
        prefab_id: ShapePrefabId,
        prefab: &ShapePrefab,
    ) -> Result<()> {
        prefab.material()?;
        let (body, native) = self.body_mut(body_id)?;
        let handle = body.require_handle()?;
        let density = body.density();
        let shape = body
            .shape_mut(shape_id)
            .ok_or_else(|| PhysicsError::not_found("shape", format!("{:?}", shape_id)))?;
        shape.reinitialize(native, prefab, handle, density)?;
        shape.set_prefab(prefab_id);
        if prefab.geometry().is_plane() {
            body.force_static(native)?;
        }

        let dynamic = native.rigid_body_set.get(handle).map_or(false, |b| b.is_dynamic());
        if dynamic {
            body.update_mass(native)?;
        }
        Ok(())
    }

    /// Every (prefab, shape) pair still linked in this scene.
    pub(crate) fn shape_links(&self) -> Vec<(ShapePrefabId, ShapeId)> {
        self.bodies
            .iter()
            .flat_map(|(_, body)| body.shapes().iter())
            .filter_map(|shape| shape.prefab().map(|p| (p, shape.id())))
            .collect()
    }

    /// Clear every shape's prefab link, for teardown alongside the prefabs.
    pub(crate) fn prepare_shapes_for_delete(&mut self) {
        for (_, body) in self.bodies.iter_mut() {
            let ids: Vec<ShapeId> = body.shapes().iter().map(|s| s.id()).collect();
            for id in ids {
                if let Some(shape) = body.shape_mut(id) {
                    shape.prepare_for_delete();
                }
            }
        }
    }

    // Queries -----------------------------------------------------------------

    /// Cast `cast` into the scene, filling its hit buffer.
    pub fn raycast(&mut self, cast: &mut Raycast) -> Result<bool> {
        let native = self.native.as_deref_mut().ok_or_else(|| unavailable(self.scene_id))?;
        native.sync_queries();

        let actor_objects = &self.actor_objects;
        let controllers = &self.controllers;
        let colliders = &native.collider_set;
        let hit = native.cast_ray(cast, |collider| {
            let parent = colliders.get(collider)?.parent()?;
            actor_objects
                .get(&parent)
                .copied()
                .or_else(|| controllers.object_for_body(parent))
        });
        Ok(hit)
    }

    // Two-phase step ----------------------------------------------------------

    /// Start solving `dt` seconds on the dispatcher's pool.
    pub fn simulate(&mut self, dt: f32, dispatcher: &SolverDispatcher) -> Result<()> {
        if !(dt > 0.0) || !dt.is_finite() {
            return Err(PhysicsError::Configuration(format!(
                "simulation step must be positive, got {}",
                dt
            )));
        }
        if self.pending.is_some() {
            return Err(PhysicsError::State(format!(
                "scene {} is already simulating",
                self.scene_id.raw()
            )));
        }
        let mut native = self.native.take().ok_or_else(|| unavailable(self.scene_id))?;

        let (tx, rx) = bounded(1);
        dispatcher.execute(move || {
            native.step(dt);
            let _ = tx.send(native);
        });
        self.pending = Some(rx);
        Ok(())
    }

    /// Take the solved scene back and write body poses onto top-level objects.
    /// With `block == false` returns `Ok(false)` while the solve is still running.
    pub fn fetch_results(&mut self, block: bool, graph: &mut Scene) -> Result<bool> {
        if graph.id() != self.scene_id {
            return Err(PhysicsError::State(format!(
                "physics scene {} fetched into scene {}",
                self.scene_id.raw(),
                graph.id().raw()
            )));
        }
        let rx = self.pending.as_ref().ok_or_else(|| {
            PhysicsError::State(format!("scene {} has no simulation to fetch", self.scene_id.raw()))
        })?;

        let received = if block {
            rx.recv().map_err(|_| TryRecvError::Disconnected)
        } else {
            rx.try_recv()
        };
        let native = match received {
            Ok(native) => native,
            Err(TryRecvError::Empty) => return Ok(false),
            Err(TryRecvError::Disconnected) => {
                self.pending = None;
                return Err(lost_solver(self.scene_id));
            }
        };
        self.pending = None;
        self.native = Some(native);
        self.write_back(graph)?;
        Ok(true)
    }

    fn write_back(&self, graph: &mut Scene) -> Result<()> {
        let native = self.native()?;
        for object in graph.top_level_objects() {
            let Some(id) = self.object_bodies.get(&object) else {
                continue;
            };
            let Some(handle) = self.bodies.get(id.0).and_then(|b| b.handle()) else {
                continue;
            };
            let Some(body) = native.rigid_body_set.get(handle) else {
                continue;
            };
            let (position, rotation) = from_isometry(body.position());
            if let Some(mut transform) = graph.transform(object) {
                transform.set_pose(position, rotation);
                graph.set_transform(object, transform)?;
            }
        }
        Ok(())
    }

    // Controllers -------------------------------------------------------------

    pub fn controllers(&self) -> &ControllerManager {
        &self.controllers
    }

    /// Manager toggles. Controller moves go through the scene so they can reach native state.
    pub fn controllers_mut(&mut self) -> &mut ControllerManager {
        &mut self.controllers
    }

    pub(crate) fn create_controller(
        &mut self,
        graph: &Scene,
        object: Entity,
        description: ControllerDescription,
        material: &PhysicsMaterial,
        height_offset: f32,
        config: &PhysicsConfig,
    ) -> Result<ControllerId> {
        let native = self.native.as_deref_mut().ok_or_else(|| unavailable(self.scene_id))?;
        self.controllers
            .create(native, graph, object, description, material, height_offset, config)
    }

    pub fn remove_controller(&mut self, id: ControllerId) -> Result<()> {
        let native = self.native.as_deref_mut().ok_or_else(|| unavailable(self.scene_id))?;
        self.controllers.remove(native, id)
    }

    pub fn move_controller(
        &mut self,
        graph: &mut Scene,
        id: ControllerId,
        displacement: Vec3,
        dt: f32,
        filters: &ControllerFilters,
    ) -> Result<CollisionFlags> {
        let native = self.native.as_deref_mut().ok_or_else(|| unavailable(self.scene_id))?;
        self.controllers
            .move_controller(native, graph, id, displacement, dt, filters)
    }

    /// Controller gravity pass; runs before `simulate` in a world step.
    pub fn update_controllers(&mut self, graph: &mut Scene, dt: f32) -> Result<()> {
        let native = self.native.as_deref_mut().ok_or_else(|| unavailable(self.scene_id))?;
        self.controllers.update_gravity(native, graph, dt)
    }

    // Joints ------------------------------------------------------------------

    pub fn create_joint(
        &mut self,
        joint_type: JointType,
        actor_a: JointActor,
        frame_a: &Transform,
        actor_b: JointActor,
        frame_b: &Transform,
    ) -> Result<JointId> {
        let joint = PhysicsJoint::new(joint_type, actor_a, frame_a, actor_b, frame_b)?;
        let id = JointId(self.joints.insert(joint));
        if let Err(err) = self.link_joint(id) {
            self.joints.remove(id.0);
            return Err(err);
        }
        Ok(id)
    }

    pub fn joint(&self, id: JointId) -> Option<&PhysicsJoint> {
        self.joints.get(id.0)
    }

    /// Wrapper of a native joint.
    pub fn joint_for_native(&self, handle: ImpulseJointHandle) -> Option<JointId> {
        self.joint_lookup.get(&handle).copied()
    }

    pub fn set_joint_actors(
        &mut self,
        id: JointId,
        actor_a: JointActor,
        actor_b: JointActor,
    ) -> Result<()> {
        self.joints
            .get_mut(id.0)
            .ok_or_else(|| PhysicsError::State(format!("joint {:?} does not exist", id)))?
            .set_actors(actor_a, actor_b)?;
        self.link_joint(id)
    }

    pub fn remove_joint(&mut self, id: JointId) -> Result<()> {
        let native = self.native.as_deref_mut().ok_or_else(|| unavailable(self.scene_id))?;
        let mut joint = self
            .joints
            .remove(id.0)
            .ok_or_else(|| PhysicsError::State(format!("joint {:?} does not exist", id)))?;
        if let Some(handle) = joint.unlink(native) {
            self.joint_lookup.remove(&handle);
        }
        Ok(())
    }

    fn link_joint(&mut self, id: JointId) -> Result<()> {
        let native = self.native.as_deref_mut().ok_or_else(|| unavailable(self.scene_id))?;
        let joint = self
            .joints
            .get_mut(id.0)
            .ok_or_else(|| PhysicsError::State(format!("joint {:?} does not exist", id)))?;
        let (a, b) = joint.bodies();
        let handle_of = |body: BodyId| {
            self.bodies
                .get(body.0)
                .and_then(|b| b.handle())
                .ok_or_else(|| {
                    PhysicsError::State(format!("joint actor {:?} has no native body", body))
                })
        };
        let (handle_a, handle_b) = (handle_of(a)?, handle_of(b)?);

        if let Some(old) = joint.unlink(native) {
            self.joint_lookup.remove(&old);
        }
        let handle = joint.link(native, handle_a, handle_b)?;
        self.joint_lookup.insert(handle, id);
        Ok(())
    }

    /// Re-create native joints touching a rebuilt body.
    fn relink_joints(&mut self, body: BodyId) -> Result<()> {
        let ids: Vec<JointId> = self
            .joints
            .iter()
            .filter(|(_, j)| j.involves(body))
            .map(|(i, _)| JointId(i))
            .collect();
        for id in ids {
            let (a, b) = match self.joints.get(id.0) {
                Some(joint) => joint.bodies(),
                None => continue,
            };
            let linked = [a, b]
                .iter()
                .all(|b| self.bodies.get(b.0).map_or(false, |b| b.handle().is_some()));
            if linked {
                self.link_joint(id)?;
            }
        }
        Ok(())
    }

    /// Tear down native state. Used when the scene is destroyed.
    pub(crate) fn release(&mut self) {
        if let Some(native) = self.native.as_deref_mut() {
            self.controllers.clear(Some(native));
        } else {
            self.controllers.clear(None);
        }
        self.joints.clear();
        self.joint_lookup.clear();
        self.bodies.clear();
        self.object_bodies.clear();
        self.actor_objects.clear();
        self.pending = None;
        self.native = None;
    }
}

fn unavailable(scene_id: SceneId) -> PhysicsError {
    PhysicsError::State(format!(
        "scene {} has no native scene (simulation in flight or failed)",
        scene_id.raw()
    ))
}

fn lost_solver(scene_id: SceneId) -> PhysicsError {
    PhysicsError::Simulation(format!(
        "solver for scene {} stopped before finishing",
        scene_id.raw()
    ))
}

/// Take a shape off its prefab's instance list, unless the prefab already let go.
fn deregister(prefabs: &mut Arena<ShapePrefab>, shape: &PhysicsShape) {
    let Some(prefab_id) = shape.prefab() else {
        return;
    };
    match prefabs.get_mut(prefab_id.0) {
        Some(prefab) => {
            if let Err(err) = prefab.remove_instance(shape.id()) {
                log::warn!("{}", err);
            }
        }
        None => log::warn!("Shape {:?} points at a missing prefab", shape.id()),
    }
}

/// Native joints on `body` are gone with its native body; drop their lookups.
fn forget_joints(
    joints: &mut Arena<PhysicsJoint>,
    lookup: &mut HashMap<ImpulseJointHandle, JointId>,
    body: BodyId,
) {
    for (_, joint) in joints.iter_mut() {
        if joint.involves(body) {
            if let Some(handle) = joint.forget_native() {
                lookup.remove(&handle);
            }
        }
    }
}
