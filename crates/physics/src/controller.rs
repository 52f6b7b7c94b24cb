//! Kinematic character controllers and the per-scene manager that owns them.
//!
//! Each controller is a kinematic native body plus a capsule or box collider,
//! moved through rapier's sweep-based `KinematicCharacterController`. Gravity
//! is not left to the solver: the manager runs a small state machine per
//! controller (grounded or falling) once per tick, before the scene steps.

use crate::collision::{CollisionFlags, CollisionGroup, ControllerFilters};
use crate::config::PhysicsConfig;
use crate::convert::{from_vector, to_rotation, to_vector};
use crate::error::{PhysicsError, Result};
use crate::material::PhysicsMaterial;
use crate::native::NativeScene;
use engine_core::{Entity, Quat, Scene, Vec3};
use rapier3d::control::{CharacterAutostep, CharacterLength, KinematicCharacterController};
use rapier3d::data::arena::{Arena, Index};
use rapier3d::na::Unit;
use rapier3d::prelude::*;
use serde::{Deserialize, Serialize};

/// Stable id of a controller inside its scene's manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ControllerId(pub(crate) Index);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ClimbingMode {
    /// Step offset applies regardless of capsule radius.
    #[default]
    Easy,
    /// Step offset is limited by the capsule radius.
    Constrained,
}

/// What happens on slopes steeper than the slope limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum UnwalkableMode {
    #[default]
    PreventClimbing,
    PreventClimbingAndForceSliding,
}

/// Volume of a controller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ControllerShape {
    Box {
        half_height: f32,
        half_side_extent: f32,
        half_forward_extent: f32,
    },
    Capsule {
        radius: f32,
        /// Distance between the two hemisphere centers.
        height: f32,
        #[serde(default)]
        climbing_mode: ClimbingMode,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerKind {
    Box,
    Capsule,
}

impl ControllerShape {
    pub fn kind(&self) -> ControllerKind {
        match self {
            Self::Box { .. } => ControllerKind::Box,
            Self::Capsule { .. } => ControllerKind::Capsule,
        }
    }

    /// Smallest extent, which bounds how far one precise sub-sweep may travel.
    fn min_extent(&self) -> f32 {
        match *self {
            Self::Box {
                half_height,
                half_side_extent,
                half_forward_extent,
            } => half_height.min(half_side_extent).min(half_forward_extent),
            Self::Capsule { radius, .. } => radius,
        }
    }

    fn to_shared_shape(&self) -> SharedShape {
        match *self {
            Self::Box {
                half_height,
                half_side_extent,
                half_forward_extent,
            } => SharedShape::cuboid(half_side_extent, half_height, half_forward_extent),
            Self::Capsule { radius, height, .. } => SharedShape::capsule_y(height * 0.5, radius),
        }
    }
}

fn default_up() -> Vec3 {
    Vec3::Y
}

fn default_slope_limit() -> f32 {
    0.707
}

fn default_step_offset() -> f32 {
    0.5
}

fn default_contact_offset() -> f32 {
    0.1
}

fn default_density() -> f32 {
    10.0
}

fn default_scale_coeff() -> f32 {
    0.8
}

fn default_material() -> String {
    crate::world::DEFAULT_MATERIAL.to_string()
}

/// Everything needed to build a controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerDescription {
    pub shape: ControllerShape,
    #[serde(default)]
    pub initial_position: Vec3,
    #[serde(default = "default_up")]
    pub up_direction: Vec3,
    /// Cosine of the steepest walkable slope. Zero disables the limit.
    #[serde(default = "default_slope_limit")]
    pub slope_limit: f32,
    #[serde(default = "default_step_offset")]
    pub step_offset: f32,
    #[serde(default = "default_contact_offset")]
    pub contact_offset: f32,
    #[serde(default = "default_density")]
    pub density: f32,
    /// Scale applied to the volume used for pushing dynamic bodies.
    #[serde(default = "default_scale_coeff")]
    pub scale_coeff: f32,
    #[serde(default = "default_material")]
    pub material: String,
    #[serde(default)]
    pub unwalkable_mode: UnwalkableMode,
}

impl ControllerDescription {
    pub fn new(shape: ControllerShape) -> Self {
        Self {
            shape,
            initial_position: Vec3::ZERO,
            up_direction: default_up(),
            slope_limit: default_slope_limit(),
            step_offset: default_step_offset(),
            contact_offset: default_contact_offset(),
            density: default_density(),
            scale_coeff: default_scale_coeff(),
            material: default_material(),
            unwalkable_mode: UnwalkableMode::default(),
        }
    }

    pub fn capsule(radius: f32, height: f32) -> Self {
        Self::new(ControllerShape::Capsule {
            radius,
            height,
            climbing_mode: ClimbingMode::default(),
        })
    }

    pub fn cuboid(half_height: f32, half_side_extent: f32, half_forward_extent: f32) -> Self {
        Self::new(ControllerShape::Box {
            half_height,
            half_side_extent,
            half_forward_extent,
        })
    }

    pub fn kind(&self) -> ControllerKind {
        self.shape.kind()
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |what: &str| {
            Err(PhysicsError::Configuration(format!(
                "invalid controller description: {}",
                what
            )))
        };

        if !self.up_direction.is_finite() || self.up_direction.length_squared() < 1.0e-6 {
            return invalid("up direction must be non-zero");
        }
        if self.slope_limit < 0.0 {
            return invalid("slope limit must not be negative");
        }
        if self.step_offset < 0.0 {
            return invalid("step offset must not be negative");
        }
        if self.contact_offset <= 0.0 {
            return invalid("contact offset must be positive");
        }
        if self.density < 0.0 {
            return invalid("density must not be negative");
        }
        if self.scale_coeff < 0.0 {
            return invalid("scale coefficient must not be negative");
        }
        match self.shape {
            ControllerShape::Capsule { radius, height, .. } => {
                if radius <= 0.0 || height <= 0.0 {
                    return invalid("capsule radius and height must be positive");
                }
                if self.step_offset > height + radius * 2.0 {
                    return invalid("step offset is taller than the capsule");
                }
            }
            ControllerShape::Box {
                half_height,
                half_side_extent,
                half_forward_extent,
            } => {
                if half_height <= 0.0 || half_side_extent <= 0.0 || half_forward_extent <= 0.0 {
                    return invalid("box extents must be positive");
                }
                if self.step_offset > half_height * 2.0 {
                    return invalid("step offset is taller than the box");
                }
            }
        }
        Ok(())
    }

    fn native_controller(&self, overlap_recovery: bool) -> KinematicCharacterController {
        let mut controller = KinematicCharacterController::default();
        controller.up = Unit::new_normalize(to_vector(self.up_direction));
        controller.offset = CharacterLength::Absolute(self.contact_offset);
        controller.slide = true;
        controller.snap_to_ground = None;
        controller.autostep = if self.step_offset > 0.0 {
            let min_width = match self.shape {
                ControllerShape::Capsule {
                    radius,
                    climbing_mode: ClimbingMode::Constrained,
                    ..
                } => radius,
                _ => self.shape.min_extent() * 0.5,
            };
            Some(CharacterAutostep {
                max_height: CharacterLength::Absolute(self.step_offset),
                min_width: CharacterLength::Absolute(min_width),
                include_dynamic_bodies: true,
            })
        } else {
            None
        };
        if self.slope_limit > 0.0 {
            controller.max_slope_climb_angle = self.slope_limit.min(1.0).acos();
        }
        controller.min_slope_slide_angle = match self.unwalkable_mode {
            UnwalkableMode::PreventClimbing => std::f32::consts::FRAC_PI_2,
            UnwalkableMode::PreventClimbingAndForceSliding => controller.max_slope_climb_angle,
        };
        controller.normal_nudge_factor = nudge_factor(overlap_recovery);
        controller
    }
}

fn nudge_factor(overlap_recovery: bool) -> f32 {
    if overlap_recovery {
        1.0e-4
    } else {
        0.0
    }
}

/// A kinematic mover attached to one scene object.
pub struct CharacterController {
    scene_object: Entity,
    description: ControllerDescription,
    body: RigidBodyHandle,
    collider: ColliderHandle,
    native: KinematicCharacterController,
    up: Vec3,
    rotation: Quat,
    position: Vec3,
    grounded: bool,
    collision_flags: CollisionFlags,
    gravity: Vec3,
    fall_velocity: Vec3,
    terminal_velocity: f32,
    height_offset: f32,
    min_distance: f32,
}

impl CharacterController {
    #[allow(clippy::too_many_arguments)]
    fn create(
        native: &mut NativeScene,
        scene_object: Entity,
        object_position: Vec3,
        mut description: ControllerDescription,
        material: &PhysicsMaterial,
        height_offset: f32,
        overlap_recovery: bool,
        config: &PhysicsConfig,
    ) -> Result<Self> {
        description.validate()?;

        let up = description.up_direction.normalize();
        let position = object_position + up * height_offset;
        description.initial_position = position;
        let rotation = Quat::from_rotation_arc(Vec3::Y, up);

        let body = native.insert_body(
            RigidBodyBuilder::kinematic_position_based()
                .position(Isometry::from_parts(
                    Translation::from(to_vector(position)),
                    to_rotation(rotation),
                ))
                .build(),
        );
        let (membership, filter) = CollisionGroup::character();
        let collider = native.attach_collider(
            ColliderBuilder::new(description.shape.to_shared_shape())
                .density(description.density)
                .friction(material.dynamic_friction)
                .restitution(material.restitution)
                .collision_groups(InteractionGroups::new(membership, filter))
                .build(),
            body,
        );

        Ok(Self {
            scene_object,
            native: description.native_controller(overlap_recovery),
            description,
            body,
            collider,
            up,
            rotation,
            position,
            grounded: false,
            collision_flags: CollisionFlags::NONE,
            gravity: config.controller_gravity,
            fall_velocity: Vec3::ZERO,
            terminal_velocity: config.terminal_velocity,
            height_offset,
            min_distance: config.min_move_distance,
        })
    }

    pub fn scene_object(&self) -> Entity {
        self.scene_object
    }

    pub fn description(&self) -> &ControllerDescription {
        &self.description
    }

    pub fn kind(&self) -> ControllerKind {
        self.description.kind()
    }

    pub fn body(&self) -> RigidBodyHandle {
        self.body
    }

    /// Center of the controller volume.
    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Where the owning scene object sits.
    pub fn foot_position(&self) -> Vec3 {
        self.position - self.up * self.height_offset
    }

    pub fn is_grounded(&self) -> bool {
        self.grounded
    }

    pub fn collision_flags(&self) -> CollisionFlags {
        self.collision_flags
    }

    pub fn gravity(&self) -> Vec3 {
        self.gravity
    }

    pub fn set_gravity(&mut self, gravity: Vec3) {
        self.gravity = gravity;
    }

    pub fn fall_velocity(&self) -> Vec3 {
        self.fall_velocity
    }

    pub fn set_fall_velocity(&mut self, velocity: Vec3) {
        self.fall_velocity = velocity;
    }

    pub fn terminal_velocity(&self) -> f32 {
        self.terminal_velocity
    }

    pub fn set_terminal_velocity(&mut self, terminal_velocity: f32) {
        self.terminal_velocity = terminal_velocity.max(0.0);
    }

    pub fn height_offset(&self) -> f32 {
        self.height_offset
    }

    pub fn min_distance(&self) -> f32 {
        self.min_distance
    }

    pub fn set_min_distance(&mut self, min_distance: f32) {
        self.min_distance = min_distance.max(0.0);
    }

    /// Sweep the volume by `displacement`, sliding along what it hits, and
    /// write the result onto the scene object.
    pub(crate) fn move_by(
        &mut self,
        native: &mut NativeScene,
        graph: &mut Scene,
        displacement: Vec3,
        dt: f32,
        filters: &ControllerFilters,
        precise_sweeps: bool,
    ) -> Result<CollisionFlags> {
        if displacement.length() < self.min_distance {
            self.collision_flags = CollisionFlags::NONE;
            self.grounded = false;
            return Ok(self.collision_flags);
        }

        native.sync_queries();
        let sweeps = if precise_sweeps {
            let step = self.description.shape.min_extent().max(1.0e-3);
            ((displacement.length() / step).ceil() as usize).clamp(1, 16)
        } else {
            1
        };
        let sub_displacement = displacement / sweeps as f32;
        let sub_dt = dt / sweeps as f32;
        let filter = filters.to_query_filter(self.body);

        let mut flags = CollisionFlags::NONE;
        let mut position = self.position;
        {
            let collider = native.collider_set.get(self.collider).ok_or_else(|| {
                PhysicsError::State(format!(
                    "controller of {:?} lost its collider",
                    self.scene_object
                ))
            })?;
            for _ in 0..sweeps {
                let pose = Isometry::from_parts(
                    Translation::from(to_vector(position)),
                    to_rotation(self.rotation),
                );
                let movement = self.native.move_shape(
                    sub_dt,
                    &native.rigid_body_set,
                    &native.collider_set,
                    &native.query_pipeline,
                    collider.shape(),
                    &pose,
                    to_vector(sub_displacement),
                    filter,
                    |_| {},
                );
                let applied = from_vector(&movement.translation);
                flags.insert(self.blocked_sides(sub_displacement, applied));
                if movement.grounded {
                    flags.insert(CollisionFlags::BELOW);
                }
                position += applied;
            }
        }

        self.position = position;
        if let Some(body) = native.rigid_body_set.get_mut(self.body) {
            body.set_next_kinematic_translation(to_vector(position));
        }
        self.collision_flags = flags;
        self.grounded = flags.contains(CollisionFlags::BELOW);

        graph.set_position(self.scene_object, self.foot_position())?;
        Ok(flags)
    }

    /// Side and ceiling contacts, read off how much of the request was refused.
    fn blocked_sides(&self, desired: Vec3, applied: Vec3) -> CollisionFlags {
        const EPSILON: f32 = 1.0e-4;
        let mut flags = CollisionFlags::NONE;

        let desired_up = desired.dot(self.up);
        let applied_up = applied.dot(self.up);
        if desired_up > EPSILON && applied_up < desired_up - EPSILON {
            flags.insert(CollisionFlags::ABOVE);
        }

        let desired_side = (desired - self.up * desired_up).length();
        let applied_side = (applied - self.up * applied_up).length();
        if desired_side > EPSILON && applied_side < desired_side - EPSILON {
            flags.insert(CollisionFlags::SIDES);
        }
        flags
    }

    /// Integrate gravity into the fall velocity, clamped to terminal speed.
    pub fn update_fall_velocity(&mut self, dt: f32) {
        self.fall_velocity += self.gravity * dt;
        let speed = self.fall_velocity.length();
        if speed > self.terminal_velocity {
            self.fall_velocity *= self.terminal_velocity / speed;
        }
    }

    /// One tick of the grounded/falling state machine.
    fn apply_gravity(
        &mut self,
        native: &mut NativeScene,
        graph: &mut Scene,
        dt: f32,
        precise_sweeps: bool,
    ) -> Result<()> {
        if !self.grounded && self.gravity.length() > 0.0 {
            let displacement = self.fall_velocity * dt;
            let filters = ControllerFilters::default();
            self.move_by(native, graph, displacement, dt, &filters, precise_sweeps)?;
            self.update_fall_velocity(dt);
        } else if self.grounded && self.fall_velocity != Vec3::ZERO {
            self.fall_velocity = Vec3::ZERO;
        }
        Ok(())
    }
}

/// Owns every controller of one physics scene.
pub struct ControllerManager {
    controllers: Arena<CharacterController>,
    overlap_recovery: bool,
    precise_sweeps: bool,
}

impl Default for ControllerManager {
    fn default() -> Self {
        Self {
            controllers: Arena::new(),
            overlap_recovery: true,
            precise_sweeps: true,
        }
    }
}

impl ControllerManager {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn create(
        &mut self,
        native: &mut NativeScene,
        graph: &Scene,
        scene_object: Entity,
        description: ControllerDescription,
        material: &PhysicsMaterial,
        height_offset: f32,
        config: &PhysicsConfig,
    ) -> Result<ControllerId> {
        let transform = graph
            .transform(scene_object)
            .ok_or_else(|| PhysicsError::not_found("scene object", format!("{:?}", scene_object)))?;
        let controller = CharacterController::create(
            native,
            scene_object,
            transform.position,
            description,
            material,
            height_offset,
            self.overlap_recovery,
            config,
        )?;
        log::debug!(
            "Created {:?} controller for {:?} at {}",
            controller.kind(),
            scene_object,
            controller.position()
        );
        Ok(ControllerId(self.controllers.insert(controller)))
    }

    pub(crate) fn remove(&mut self, native: &mut NativeScene, id: ControllerId) -> Result<()> {
        let controller = self
            .controllers
            .remove(id.0)
            .ok_or_else(|| PhysicsError::not_found("controller", format!("{:?}", id)))?;
        native.remove_body(controller.body);
        Ok(())
    }

    /// Drop every controller and its native body.
    pub(crate) fn clear(&mut self, native: Option<&mut NativeScene>) {
        let bodies: Vec<_> = self.controllers.drain().map(|(_, c)| c.body).collect();
        if let Some(native) = native {
            for body in bodies {
                native.remove_body(body);
            }
        }
    }

    pub fn get(&self, id: ControllerId) -> Option<&CharacterController> {
        self.controllers.get(id.0)
    }

    pub fn get_mut(&mut self, id: ControllerId) -> Option<&mut CharacterController> {
        self.controllers.get_mut(id.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ControllerId, &CharacterController)> {
        self.controllers.iter().map(|(i, c)| (ControllerId(i), c))
    }

    pub fn len(&self) -> usize {
        self.controllers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controllers.len() == 0
    }

    pub fn overlap_recovery(&self) -> bool {
        self.overlap_recovery
    }

    pub fn set_overlap_recovery(&mut self, enabled: bool) {
        self.overlap_recovery = enabled;
        for (_, controller) in self.controllers.iter_mut() {
            controller.native.normal_nudge_factor = nudge_factor(enabled);
        }
    }

    pub fn precise_sweeps(&self) -> bool {
        self.precise_sweeps
    }

    pub fn set_precise_sweeps(&mut self, enabled: bool) {
        self.precise_sweeps = enabled;
    }

    /// Scene object owning a controller body, if `body` is one.
    pub fn object_for_body(&self, body: RigidBodyHandle) -> Option<Entity> {
        self.controllers
            .iter()
            .find(|(_, c)| c.body == body)
            .map(|(_, c)| c.scene_object)
    }

    pub(crate) fn move_controller(
        &mut self,
        native: &mut NativeScene,
        graph: &mut Scene,
        id: ControllerId,
        displacement: Vec3,
        dt: f32,
        filters: &ControllerFilters,
    ) -> Result<CollisionFlags> {
        let precise = self.precise_sweeps;
        let controller = self
            .controllers
            .get_mut(id.0)
            .ok_or_else(|| PhysicsError::not_found("controller", format!("{:?}", id)))?;
        controller.move_by(native, graph, displacement, dt, filters, precise)
    }

    /// Gravity pass over every controller.
    pub(crate) fn update_gravity(
        &mut self,
        native: &mut NativeScene,
        graph: &mut Scene,
        dt: f32,
    ) -> Result<()> {
        let precise = self.precise_sweeps;
        for (_, controller) in self.controllers.iter_mut() {
            controller.apply_gravity(native, graph, dt, precise)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use engine_core::Transform;

    const DT: f32 = 1.0 / 60.0;

    fn material() -> PhysicsMaterial {
        PhysicsMaterial::new("test", 0.5, 0.5, 0.2)
    }

    fn setup(
        with_ground: bool,
        object_position: Vec3,
    ) -> (NativeScene, Scene, ControllerManager, ControllerId) {
        let mut native = NativeScene::new(Vec3::new(0.0, -9.81, 0.0));
        if with_ground {
            let ground = native.insert_body(
                RigidBodyBuilder::fixed()
                    .translation(vector![0.0, -1.0, 0.0])
                    .build(),
            );
            native.attach_collider(ColliderBuilder::cuboid(50.0, 1.0, 50.0).build(), ground);
        }
        let mut graph = Scene::new("test");
        let object = graph.spawn("player", Transform::from_position(object_position));
        let mut manager = ControllerManager::default();
        let id = manager
            .create(
                &mut native,
                &graph,
                object,
                ControllerDescription::capsule(0.5, 1.0),
                &material(),
                0.0,
                &PhysicsConfig::default(),
            )
            .unwrap();
        (native, graph, manager, id)
    }

    #[test]
    fn invalid_descriptions_are_rejected() {
        assert!(ControllerDescription::capsule(0.0, 1.0).validate().is_err());
        assert!(ControllerDescription::cuboid(1.0, 0.5, -0.5).validate().is_err());
        let mut desc = ControllerDescription::capsule(0.5, 1.0);
        desc.contact_offset = 0.0;
        assert!(desc.validate().is_err());
        desc.contact_offset = 0.1;
        desc.step_offset = 5.0;
        assert!(desc.validate().is_err());
        assert!(ControllerDescription::capsule(0.5, 1.0).validate().is_ok());
    }

    #[test]
    fn capsule_starts_at_object_plus_height_offset() {
        let mut native = NativeScene::new(Vec3::ZERO);
        let mut graph = Scene::new("test");
        let object = graph.spawn("player", Transform::from_position(Vec3::new(2.0, 3.0, 4.0)));
        let mut manager = ControllerManager::default();
        let id = manager
            .create(
                &mut native,
                &graph,
                object,
                ControllerDescription::capsule(1.0, 1.0),
                &material(),
                0.5,
                &PhysicsConfig::default(),
            )
            .unwrap();

        let controller = manager.get(id).unwrap();
        assert_eq!(controller.kind(), ControllerKind::Capsule);
        assert_eq!(controller.position(), Vec3::new(2.0, 3.5, 4.0));
        assert_eq!(controller.description().initial_position, Vec3::new(2.0, 3.5, 4.0));
        assert_eq!(controller.foot_position(), Vec3::new(2.0, 3.0, 4.0));
    }

    #[test]
    fn fall_speed_grows_then_clamps_at_terminal() {
        let (mut native, mut graph, mut manager, id) = setup(false, Vec3::new(0.0, 100.0, 0.0));
        manager.get_mut(id).unwrap().set_terminal_velocity(5.0);

        let mut last_speed = 0.0;
        let mut reached_terminal = false;
        for _ in 0..120 {
            manager.update_gravity(&mut native, &mut graph, DT).unwrap();
            let speed = manager.get(id).unwrap().fall_velocity().length();
            assert!(speed >= last_speed);
            assert!(speed <= 5.0 + 1.0e-4);
            if reached_terminal {
                assert_relative_eq!(speed, 5.0, epsilon = 1.0e-4);
            }
            reached_terminal |= (speed - 5.0).abs() < 1.0e-4;
            last_speed = speed;
        }
        assert!(reached_terminal);
        assert!(!manager.get(id).unwrap().is_grounded());
    }

    #[test]
    fn landing_sets_grounded_and_next_pass_resets_fall_velocity() {
        let (mut native, mut graph, mut manager, id) = setup(true, Vec3::new(0.0, 1.05, 0.0));
        manager.get_mut(id).unwrap().set_fall_velocity(Vec3::new(0.0, -3.0, 0.0));
        let filters = ControllerFilters::default();

        let flags = manager
            .move_controller(&mut native, &mut graph, id, Vec3::new(0.0, -0.5, 0.0), DT, &filters)
            .unwrap();
        assert!(flags.contains(CollisionFlags::BELOW));
        let controller = manager.get(id).unwrap();
        assert!(controller.is_grounded());
        assert!(controller.position().y > 0.99 && controller.position().y < 1.2);

        manager.update_gravity(&mut native, &mut graph, DT).unwrap();
        assert_eq!(manager.get(id).unwrap().fall_velocity(), Vec3::ZERO);
        assert!(manager.get(id).unwrap().is_grounded());
    }

    #[test]
    fn tiny_moves_are_skipped() {
        let (mut native, mut graph, mut manager, id) = setup(false, Vec3::ZERO);
        let before = manager.get(id).unwrap().position();
        let filters = ControllerFilters::default();
        let flags = manager
            .move_controller(&mut native, &mut graph, id, Vec3::splat(1.0e-8), DT, &filters)
            .unwrap();
        assert!(flags.is_empty());
        assert_eq!(manager.get(id).unwrap().position(), before);
    }

    #[test]
    fn move_writes_object_position() {
        let (mut native, mut graph, mut manager, id) = setup(false, Vec3::ZERO);
        let filters = ControllerFilters::default();
        manager
            .move_controller(&mut native, &mut graph, id, Vec3::X, DT, &filters)
            .unwrap();
        let object = manager.get(id).unwrap().scene_object();
        let position = graph.transform(object).unwrap().position;
        assert_relative_eq!(position.x, 1.0, epsilon = 1.0e-3);
    }

    #[test]
    fn move_drives_kinematic_body_through_the_solver() {
        let (mut native, mut graph, mut manager, id) = setup(false, Vec3::ZERO);
        let filters = ControllerFilters::default();
        manager
            .move_controller(&mut native, &mut graph, id, Vec3::X, DT, &filters)
            .unwrap();
        let controller = manager.get(id).unwrap();
        let start = controller.position().x - 1.0;
        let body = &native.rigid_body_set[controller.body()];
        assert_relative_eq!(body.translation().x, start, epsilon = 1.0e-4);
        assert_relative_eq!(body.next_position().translation.x, start + 1.0, epsilon = 1.0e-4);

        native.step(DT);
        let body = &native.rigid_body_set[manager.get(id).unwrap().body()];
        assert_relative_eq!(body.translation().x, start + 1.0, epsilon = 1.0e-4);
    }

    #[test]
    fn remove_drops_native_body() {
        let (mut native, _graph, mut manager, id) = setup(false, Vec3::ZERO);
        let body = manager.get(id).unwrap().body();
        manager.remove(&mut native, id).unwrap();
        assert!(native.rigid_body_set.get(body).is_none());
        assert!(manager.is_empty());
    }
}
