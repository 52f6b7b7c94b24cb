//! Native simulation context owned by one physics scene.

use crate::convert::to_vector;
use glam::Vec3;
use rapier3d::prelude::*;

/// All solver state for one scene. Moved onto a solver thread while a step runs.
pub struct NativeScene {
    pub rigid_body_set: RigidBodySet,
    pub collider_set: ColliderSet,
    pub gravity: Vector<Real>,
    pub integration_parameters: IntegrationParameters,
    pub physics_pipeline: PhysicsPipeline,
    pub island_manager: IslandManager,
    pub broad_phase: DefaultBroadPhase,
    pub narrow_phase: NarrowPhase,
    pub impulse_joint_set: ImpulseJointSet,
    pub multibody_joint_set: MultibodyJointSet,
    pub ccd_solver: CCDSolver,
    pub query_pipeline: QueryPipeline,
    /// Colliders changed since the query pipeline was last rebuilt.
    queries_dirty: bool,
}

impl NativeScene {
    pub fn new(gravity: Vec3) -> Self {
        Self {
            rigid_body_set: RigidBodySet::new(),
            collider_set: ColliderSet::new(),
            gravity: to_vector(gravity),
            integration_parameters: IntegrationParameters::default(),
            physics_pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            impulse_joint_set: ImpulseJointSet::new(),
            multibody_joint_set: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
            queries_dirty: false,
        }
    }

    /// Advance the simulation by `dt` seconds. The query pipeline is refreshed as part of the step.
    pub fn step(&mut self, dt: Real) {
        self.integration_parameters.dt = dt;
        self.physics_pipeline.step(
            &self.gravity,
            &self.integration_parameters,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.rigid_body_set,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            &mut self.ccd_solver,
            Some(&mut self.query_pipeline),
            &(),
            &(),
        );
        self.queries_dirty = false;
    }

    /// Update query pipeline for raycasting and controller sweeps.
    pub fn update_query_pipeline(&mut self) {
        self.query_pipeline.update(&self.collider_set);
        self.queries_dirty = false;
    }

    /// Rebuild queries only if colliders were added, removed, or moved by hand.
    pub fn sync_queries(&mut self) {
        if self.queries_dirty {
            self.update_query_pipeline();
        }
    }

    pub fn mark_queries_dirty(&mut self) {
        self.queries_dirty = true;
    }

    pub fn insert_body(&mut self, body: RigidBody) -> RigidBodyHandle {
        self.rigid_body_set.insert(body)
    }

    /// Attach a collider to a body. Mass properties of dynamic bodies follow automatically.
    pub fn attach_collider(&mut self, collider: Collider, body: RigidBodyHandle) -> ColliderHandle {
        self.queries_dirty = true;
        self.collider_set
            .insert_with_parent(collider, body, &mut self.rigid_body_set)
    }

    /// Remove a collider by its handle.
    pub fn remove_collider(&mut self, handle: ColliderHandle) -> bool {
        self.queries_dirty = true;
        self.collider_set
            .remove(
                handle,
                &mut self.island_manager,
                &mut self.rigid_body_set,
                true,
            )
            .is_some()
    }

    /// Remove a rigid body, its colliders, and any joint touching it.
    pub fn remove_body(&mut self, handle: RigidBodyHandle) -> bool {
        self.queries_dirty = true;
        self.rigid_body_set
            .remove(
                handle,
                &mut self.island_manager,
                &mut self.collider_set,
                &mut self.impulse_joint_set,
                &mut self.multibody_joint_set,
                true,
            )
            .is_some()
    }
}
