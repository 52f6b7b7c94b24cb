//! Conversions between engine math (glam) and native solver math (nalgebra).

use engine_core::Transform;
use glam::{Quat, Vec3};
use rapier3d::na::{Quaternion, UnitQuaternion};
use rapier3d::prelude::*;

pub fn to_vector(v: Vec3) -> Vector<Real> {
    vector![v.x, v.y, v.z]
}

pub fn to_point(v: Vec3) -> Point<Real> {
    point![v.x, v.y, v.z]
}

pub fn from_vector(v: &Vector<Real>) -> Vec3 {
    Vec3::new(v.x, v.y, v.z)
}

pub fn to_rotation(q: Quat) -> UnitQuaternion<Real> {
    UnitQuaternion::from_quaternion(Quaternion::new(q.w, q.x, q.y, q.z))
}

pub fn from_rotation(rot: &UnitQuaternion<Real>) -> Quat {
    Quat::from_xyzw(rot.i, rot.j, rot.k, rot.w)
}

/// Scale is dropped; native poses are rigid.
pub fn to_isometry(t: &Transform) -> Isometry<Real> {
    Isometry::from_parts(
        Translation::new(t.position.x, t.position.y, t.position.z),
        to_rotation(t.rotation),
    )
}

pub fn from_isometry(iso: &Isometry<Real>) -> (Vec3, Quat) {
    (
        from_vector(&iso.translation.vector),
        from_rotation(&iso.rotation),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn isometry_round_trip_keeps_pose() {
        let t = Transform::from_position_rotation(
            Vec3::new(1.0, -2.0, 3.5),
            Quat::from_rotation_z(0.7),
        );
        let (position, rotation) = from_isometry(&to_isometry(&t));
        assert_relative_eq!(position.x, 1.0);
        assert_relative_eq!(position.y, -2.0);
        assert_relative_eq!(position.z, 3.5);
        assert!(rotation.angle_between(t.rotation) < 1e-5);
    }
}
