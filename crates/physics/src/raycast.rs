//! Ray queries against a scene, with a caller-owned hit buffer.

use crate::convert::{from_vector, to_point, to_vector};
use crate::native::NativeScene;
use engine_core::{Entity, Vec3};
use rapier3d::prelude::*;

/// Result of a raycast query.
#[derive(Debug, Clone, Copy)]
pub struct RaycastHit {
    /// The collider that was hit.
    pub collider: ColliderHandle,
    /// Scene object owning the collider's body, when it belongs to an actor.
    pub scene_object: Option<Entity>,
    /// Distance along the ray to the hit point.
    pub distance: f32,
    /// World position of the hit.
    pub point: Vec3,
    /// Surface normal at the hit point.
    pub normal: Vec3,
}

/// A ray plus the buffer its hits are written into.
#[derive(Debug, Clone)]
pub struct Raycast {
    pub origin: Vec3,
    pub direction: Vec3,
    pub max_distance: f32,
    /// 1 keeps only the closest hit.
    pub max_hits: usize,
    hits: Vec<RaycastHit>,
}

impl Raycast {
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction,
            max_distance: 1.0e30,
            max_hits: 1,
            hits: Vec::new(),
        }
    }

    pub fn with_max_distance(mut self, max_distance: f32) -> Self {
        self.max_distance = max_distance;
        self
    }

    pub fn with_max_hits(mut self, max_hits: usize) -> Self {
        self.max_hits = max_hits.max(1);
        self
    }

    /// Hits from the last cast, closest first.
    pub fn hits(&self) -> &[RaycastHit] {
        &self.hits
    }

    pub fn closest(&self) -> Option<&RaycastHit> {
        self.hits.first()
    }

    pub fn has_hit(&self) -> bool {
        !self.hits.is_empty()
    }

    pub(crate) fn ray(&self) -> Ray {
        Ray::new(
            to_point(self.origin),
            to_vector(self.direction.normalize_or_zero()),
        )
    }
}

impl NativeScene {
    /// Fill `cast`'s buffer and report whether anything was hit. The query
    /// pipeline must be current.
    pub(crate) fn cast_ray(
        &self,
        cast: &mut Raycast,
        object_for: impl Fn(ColliderHandle) -> Option<Entity>,
    ) -> bool {
        cast.hits.clear();
        let ray = cast.ray();
        let filter = QueryFilter::default().exclude_sensors();

        if cast.max_hits <= 1 {
            if let Some((collider, intersection)) = self.query_pipeline.cast_ray_and_get_normal(
                &self.rigid_body_set,
                &self.collider_set,
                &ray,
                cast.max_distance,
                true,
                filter,
            ) {
                cast.hits.push(hit_from(&ray, collider, intersection, &object_for));
            }
            return cast.has_hit();
        }

        let mut hits = Vec::new();
        self.query_pipeline.intersections_with_ray(
            &self.rigid_body_set,
            &self.collider_set,
            &ray,
            cast.max_distance,
            true,
            filter,
            |collider, intersection: RayIntersection| {
                hits.push(hit_from(&ray, collider, intersection, &object_for));
                true // Continue searching
            },
        );

        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(cast.max_hits);
        cast.hits = hits;
        cast.has_hit()
    }
}

fn hit_from(
    ray: &Ray,
    collider: ColliderHandle,
    intersection: RayIntersection,
    object_for: &impl Fn(ColliderHandle) -> Option<Entity>,
) -> RaycastHit {
    let point = ray.point_at(intersection.time_of_impact);
    RaycastHit {
        collider,
        scene_object: object_for(collider),
        distance: intersection.time_of_impact,
        point: Vec3::new(point.x, point.y, point.z),
        normal: from_vector(&intersection.normal),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn scene_with_boxes() -> NativeScene {
        let mut native = NativeScene::new(Vec3::ZERO);
        for z in [5.0, 10.0] {
            let body = native.insert_body(
                RigidBodyBuilder::fixed()
                    .translation(vector![0.0, 0.0, z])
                    .build(),
            );
            native.attach_collider(ColliderBuilder::cuboid(1.0, 1.0, 1.0).build(), body);
        }
        native.update_query_pipeline();
        native
    }

    #[test]
    fn closest_hit_only_by_default() {
        let native = scene_with_boxes();
        let mut cast = Raycast::new(Vec3::ZERO, Vec3::Z);
        assert!(native.cast_ray(&mut cast, |_| None));
        assert_eq!(cast.hits().len(), 1);
        assert_relative_eq!(cast.hits()[0].distance, 4.0, epsilon = 1e-4);
        assert_relative_eq!(cast.hits()[0].normal.z, -1.0, epsilon = 1e-4);
    }

    #[test]
    fn multiple_hits_are_sorted() {
        let native = scene_with_boxes();
        let mut cast = Raycast::new(Vec3::ZERO, Vec3::Z).with_max_hits(8);
        assert!(native.cast_ray(&mut cast, |_| None));
        assert_eq!(cast.hits().len(), 2);
        assert!(cast.hits()[0].distance < cast.hits()[1].distance);
    }

    #[test]
    fn miss_clears_previous_hits() {
        let native = scene_with_boxes();
        let mut cast = Raycast::new(Vec3::ZERO, Vec3::Z);
        assert!(native.cast_ray(&mut cast, |_| None));
        cast.direction = Vec3::NEG_Z;
        assert!(!native.cast_ray(&mut cast, |_| None));
        assert!(cast.hits().is_empty());
    }
}
