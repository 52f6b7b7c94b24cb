//! Constraints between two rigid bodies.

use crate::actor::BodyId;
use crate::controller::ControllerId;
use crate::convert::to_isometry;
use crate::error::{PhysicsError, Result};
use crate::native::NativeScene;
use engine_core::Transform;
use rapier3d::data::arena::Index;
use rapier3d::prelude::*;
use serde::{Deserialize, Serialize};

/// Stable id of a joint inside its scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JointId(pub(crate) Index);

/// Every joint kind a scene may request. Only `Fixed` is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JointType {
    Fixed,
    Spherical,
    Revolute,
    Prismatic,
    Distance,
    D6,
    Custom,
}

/// Something a joint end can point at. Only rigid bodies can be linked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JointActor {
    RigidBody(BodyId),
    Controller(ControllerId),
}

impl JointActor {
    fn body(self) -> Result<BodyId> {
        match self {
            Self::RigidBody(body) => Ok(body),
            Self::Controller(id) => Err(PhysicsError::State(format!(
                "joint actors must be rigid bodies, got controller {:?}",
                id
            ))),
        }
    }
}

#[derive(Debug)]
pub struct PhysicsJoint {
    joint_type: JointType,
    body_a: BodyId,
    body_b: BodyId,
    frame_a: Isometry<Real>,
    frame_b: Isometry<Real>,
    handle: Option<ImpulseJointHandle>,
}

impl PhysicsJoint {
    /// Check the type tag and actors. Nothing native is built yet.
    pub(crate) fn new(
        joint_type: JointType,
        actor_a: JointActor,
        frame_a: &Transform,
        actor_b: JointActor,
        frame_b: &Transform,
    ) -> Result<Self> {
        if joint_type != JointType::Fixed {
            return Err(PhysicsError::Unsupported(format!(
                "{:?} joints are not implemented",
                joint_type
            )));
        }
        Ok(Self {
            joint_type,
            body_a: actor_a.body()?,
            body_b: actor_b.body()?,
            frame_a: to_isometry(frame_a),
            frame_b: to_isometry(frame_b),
            handle: None,
        })
    }

    pub fn joint_type(&self) -> JointType {
        self.joint_type
    }

    pub fn bodies(&self) -> (BodyId, BodyId) {
        (self.body_a, self.body_b)
    }

    pub fn involves(&self, body: BodyId) -> bool {
        self.body_a == body || self.body_b == body
    }

    pub fn handle(&self) -> Option<ImpulseJointHandle> {
        self.handle
    }

    /// Point both ends at new actors. The caller relinks the native joint.
    pub(crate) fn set_actors(&mut self, actor_a: JointActor, actor_b: JointActor) -> Result<()> {
        let (a, b) = (actor_a.body()?, actor_b.body()?);
        self.body_a = a;
        self.body_b = b;
        Ok(())
    }

    /// Build the native joint between two native bodies, replacing any previous one.
    pub(crate) fn link(
        &mut self,
        native: &mut NativeScene,
        a: RigidBodyHandle,
        b: RigidBodyHandle,
    ) -> Result<ImpulseJointHandle> {
        self.unlink(native);
        let joint: GenericJoint = match self.joint_type {
            JointType::Fixed => FixedJointBuilder::new()
                .local_frame1(self.frame_a)
                .local_frame2(self.frame_b)
                .build()
                .into(),
            other => {
                return Err(PhysicsError::Unsupported(format!(
                    "{:?} joints are not implemented",
                    other
                )))
            }
        };
        let handle = native.impulse_joint_set.insert(a, b, joint, true);
        self.handle = Some(handle);
        Ok(handle)
    }

    /// Drop the native joint if it is still there.
    pub(crate) fn unlink(&mut self, native: &mut NativeScene) -> Option<ImpulseJointHandle> {
        let handle = self.handle.take()?;
        native.impulse_joint_set.remove(handle, true);
        Some(handle)
    }

    /// Forget a native joint that was already removed along with one of its bodies.
    pub(crate) fn forget_native(&mut self) -> Option<ImpulseJointHandle> {
        self.handle.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn body_id(n: u32) -> BodyId {
        BodyId(Index::from_raw_parts(n, 0))
    }

    #[test]
    fn only_fixed_joints_are_built() {
        let t = Transform::default();
        let (a, b) = (JointActor::RigidBody(body_id(0)), JointActor::RigidBody(body_id(1)));
        for joint_type in [
            JointType::Spherical,
            JointType::Revolute,
            JointType::Prismatic,
            JointType::Distance,
            JointType::D6,
            JointType::Custom,
        ] {
            let result = PhysicsJoint::new(joint_type, a, &t, b, &t);
            assert!(matches!(result, Err(PhysicsError::Unsupported(_))));
        }
        assert!(PhysicsJoint::new(JointType::Fixed, a, &t, b, &t).is_ok());
    }

    #[test]
    fn controllers_cannot_be_joint_actors() {
        let t = Transform::default();
        let controller = JointActor::Controller(ControllerId(Index::from_raw_parts(0, 0)));
        let (a, b) = (JointActor::RigidBody(body_id(0)), JointActor::RigidBody(body_id(1)));
        let result = PhysicsJoint::new(JointType::Fixed, a, &t, controller, &t);
        assert!(matches!(result, Err(PhysicsError::State(_))));

        let mut joint = PhysicsJoint::new(JointType::Fixed, a, &t, b, &t).unwrap();
        assert!(matches!(
            joint.set_actors(controller, b),
            Err(PhysicsError::State(_))
        ));
        assert_eq!(joint.bodies(), (body_id(0), body_id(1)));
    }

    #[test]
    fn link_replaces_native_joint() {
        let mut native = NativeScene::new(Vec3::ZERO);
        let a = native.insert_body(RigidBodyBuilder::dynamic().build());
        let b = native.insert_body(RigidBodyBuilder::dynamic().build());
        let t = Transform::default();
        let actor_a = JointActor::RigidBody(body_id(0));
        let actor_b = JointActor::RigidBody(body_id(1));
        let mut joint = PhysicsJoint::new(JointType::Fixed, actor_a, &t, actor_b, &t).unwrap();

        let first = joint.link(&mut native, a, b).unwrap();
        let second = joint.link(&mut native, a, b).unwrap();
        assert!(native.impulse_joint_set.get(first).is_none() || first == second);
        assert_eq!(native.impulse_joint_set.len(), 1);
        assert_eq!(joint.handle(), Some(second));
    }
}
