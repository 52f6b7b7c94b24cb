//! Saved forms of the world registries and of one physics scene, stored as RON.
//!
//! Defaults are never written and always re-seeded, so loading a document into
//! a fresh world cannot duplicate them. Scene objects are referenced by name.

use crate::actor::{RigidBodyDescription, RigidType};
use crate::controller::ControllerDescription;
use crate::error::{PhysicsError, Result};
use crate::material::MaterialDocument;
use crate::shape::ShapePrefabDocument;
use crate::world::{PhysicsWorld, DEFAULT_MATERIAL, DEFAULT_SHAPE};
use engine_core::{Entity, Scene, SceneId, Vec3};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Materials and shape prefabs, keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldDocument {
    #[serde(default)]
    pub materials: BTreeMap<String, MaterialDocument>,
    #[serde(default)]
    pub shapes: BTreeMap<String, ShapePrefabDocument>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneDocument {
    pub gravity: Vec3,
    pub controllers: ControllerManagerDocument,
    #[serde(default)]
    pub bodies: Vec<RigidBodyDocument>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerManagerDocument {
    pub overlap_recovery: bool,
    pub precise_sweeps: bool,
    #[serde(default)]
    pub controllers: Vec<ControllerDocument>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerDocument {
    /// `initial_position` holds the position at save time.
    pub description: ControllerDescription,
    pub scene_object: String,
    pub height_offset: f32,
    pub gravity: Vec3,
    pub fall_velocity: Vec3,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RigidBodyDocument {
    pub scene_object: String,
    /// Prefab names. Bodies carry at most one.
    pub shapes: Vec<String>,
    pub rigid_type: RigidType,
    pub density: f32,
    #[serde(default)]
    pub is_kinematic: bool,
}

pub fn to_ron<T: Serialize>(value: &T) -> Result<String> {
    ron::ser::to_string_pretty(value, ron::ser::PrettyConfig::default())
        .map_err(|e| PhysicsError::Serialization(e.to_string()))
}

pub fn from_ron<T: DeserializeOwned>(text: &str) -> Result<T> {
    ron::from_str(text).map_err(|e| PhysicsError::Serialization(e.to_string()))
}

pub fn save_ron<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let text = to_ron(value)?;
    std::fs::write(path, text)
        .map_err(|e| PhysicsError::Serialization(format!("writing {:?}: {}", path, e)))
}

pub fn load_ron<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| PhysicsError::Serialization(format!("reading {:?}: {}", path, e)))?;
    from_ron(&text)
}

impl PhysicsWorld {
    pub fn to_document(&self) -> WorldDocument {
        let materials = self
            .materials()
            .iter()
            .filter(|m| m.name() != DEFAULT_MATERIAL)
            .map(|m| (m.name().to_string(), m.to_document()))
            .collect();
        let shapes = self
            .prefabs()
            .filter(|(id, _)| Some(*id) != self.default_shape())
            .map(|(_, p)| (p.name().to_string(), p.to_document()))
            .collect();
        WorldDocument { materials, shapes }
    }

    /// Register the document's materials and prefabs. Existing materials are
    /// kept as they are; an existing prefab other than the default is an error.
    pub fn load_document(&mut self, doc: &WorldDocument) -> Result<()> {
        for (name, material) in &doc.materials {
            if self.material(name).is_some() {
                log::debug!("Material '{}' already registered, keeping it", name);
                continue;
            }
            self.create_material(
                name,
                material.static_friction,
                material.dynamic_friction,
                material.restitution,
            )?;
        }

        for (name, shape) in &doc.shapes {
            if name == DEFAULT_SHAPE {
                continue;
            }
            if self.shape(name).is_some() {
                return Err(PhysicsError::Configuration(format!(
                    "shape prefab '{}' is already registered",
                    name
                )));
            }
            let (first, rest) = match shape.materials.split_first() {
                Some((first, rest)) => (first.as_str(), rest),
                None => (DEFAULT_MATERIAL, &[][..]),
            };
            let id = self.create_shape(name, shape.geometry, first)?;
            for material in rest {
                self.add_shape_material(id, material)?;
            }
        }
        Ok(())
    }

    pub fn scene_document(&self, scene_id: SceneId, graph: &Scene) -> Result<SceneDocument> {
        let scene = self
            .scene(scene_id)
            .ok_or_else(|| PhysicsError::not_found("physics scene", scene_id.raw().to_string()))?;
        let object_name = |object| {
            graph
                .object_name(object)
                .ok_or_else(|| PhysicsError::not_found("scene object", format!("{:?}", object)))
        };

        let manager = scene.controllers();
        let mut controllers = Vec::with_capacity(manager.len());
        for (_, controller) in manager.iter() {
            let mut description = controller.description().clone();
            description.initial_position = controller.position();
            controllers.push(ControllerDocument {
                description,
                scene_object: object_name(controller.scene_object())?,
                height_offset: controller.height_offset(),
                gravity: controller.gravity(),
                fall_velocity: controller.fall_velocity(),
            });
        }

        let mut bodies = Vec::with_capacity(scene.body_count());
        for (_, body) in scene.bodies() {
            let shapes = body
                .shapes()
                .iter()
                .filter_map(|s| s.prefab())
                .filter_map(|id| self.prefab(id))
                .map(|p| p.name().to_string())
                .collect();
            bodies.push(RigidBodyDocument {
                scene_object: object_name(body.scene_object())?,
                shapes,
                rigid_type: body.rigid_type(),
                density: body.density(),
                is_kinematic: body.is_kinematic(),
            });
        }

        Ok(SceneDocument {
            gravity: scene.gravity(),
            controllers: ControllerManagerDocument {
                overlap_recovery: manager.overlap_recovery(),
                precise_sweeps: manager.precise_sweeps(),
                controllers,
            },
            bodies,
        })
    }

    /// Rebuild a scene's controllers and bodies from `doc`, resolving objects by name.
    /// The physics scene is created if `graph` has none yet.
    pub fn load_scene_document(&mut self, graph: &mut Scene, doc: &SceneDocument) -> Result<()> {
        let scene_id = graph.id();
        if self.scene(scene_id).is_none() {
            self.create_scene(graph)?;
        }
        let scene = self.require_scene_mut(scene_id)?;
        scene.set_gravity(doc.gravity)?;
        let manager = scene.controllers_mut();
        manager.set_overlap_recovery(doc.controllers.overlap_recovery);
        manager.set_precise_sweeps(doc.controllers.precise_sweeps);

        for saved in &doc.controllers.controllers {
            let object = find_object(graph, &saved.scene_object)?;
            let description = saved.description.clone();
            let id =
                self.create_controller(scene_id, graph, object, description, saved.height_offset)?;
            if let Some(controller) = self
                .scene_mut(scene_id)
                .and_then(|s| s.controllers_mut().get_mut(id))
            {
                controller.set_gravity(saved.gravity);
                controller.set_fall_velocity(saved.fall_velocity);
            }
        }

        for saved in &doc.bodies {
            if saved.shapes.len() > 1 {
                return Err(PhysicsError::Unsupported(format!(
                    "'{}' has {} shapes, bodies carry at most one",
                    saved.scene_object,
                    saved.shapes.len()
                )));
            }
            let object = find_object(graph, &saved.scene_object)?;
            let prefab = match saved.shapes.first() {
                Some(name) => self.require_shape(name)?,
                None => self
                    .default_shape()
                    .ok_or_else(|| PhysicsError::not_found("shape prefab", DEFAULT_SHAPE))?,
            };
            let desc = RigidBodyDescription {
                rigid_type: saved.rigid_type,
                density: saved.density,
                is_kinematic: saved.is_kinematic,
            };
            self.create_rigid_body(scene_id, graph, object, desc, prefab)?;
        }
        log::info!(
            "Loaded {} controllers and {} bodies into '{}'",
            doc.controllers.controllers.len(),
            doc.bodies.len(),
            graph.name()
        );
        Ok(())
    }
}

fn find_object(graph: &Scene, name: &str) -> Result<Entity> {
    graph
        .find_by_name(name)
        .ok_or_else(|| PhysicsError::not_found("scene object", name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PhysicsConfig;
    use crate::controller::ControllerKind;
    use crate::geometry::PhysicsGeometry;
    use engine_core::Transform;

    fn world() -> PhysicsWorld {
        PhysicsWorld::new(PhysicsConfig {
            solver_threads: Some(1),
            ..Default::default()
        })
    }

    fn populated_graph() -> Scene {
        let mut graph = Scene::new("level");
        graph.spawn("player", Transform::from_position(Vec3::new(0.0, 2.0, 0.0)));
        graph.spawn("guard", Transform::from_position(Vec3::new(4.0, 2.0, 0.0)));
        graph.spawn("crate", Transform::from_position(Vec3::new(0.0, 6.0, 3.0)));
        graph
    }

    #[test]
    fn world_document_skips_defaults() {
        let mut world = world();
        world.create_material("ice", 0.05, 0.02, 0.0).unwrap();
        world
            .create_shape("puck", PhysicsGeometry::Sphere { radius: 0.2 }, "ice")
            .unwrap();

        let doc = world.to_document();
        assert_eq!(doc.materials.len(), 1);
        assert_eq!(doc.shapes.len(), 1);
        assert_eq!(doc.shapes["puck"].materials, vec!["ice".to_string()]);

        let text = to_ron(&doc).unwrap();
        let mut fresh = self::world();
        fresh.load_document(&from_ron(&text).unwrap()).unwrap();
        assert_eq!(fresh.materials().len(), 2);
        assert_eq!(fresh.prefabs().count(), 2);
        assert!(fresh.shape("puck").is_some());
    }

    #[test]
    fn loading_twice_rejects_existing_prefab() {
        let mut world = world();
        let mut doc = WorldDocument::default();
        doc.shapes.insert(
            "puck".into(),
            ShapePrefabDocument {
                geometry: PhysicsGeometry::Sphere { radius: 0.2 },
                materials: vec![DEFAULT_MATERIAL.into()],
            },
        );
        world.load_document(&doc).unwrap();
        assert!(matches!(world.load_document(&doc), Err(PhysicsError::Configuration(_))));
    }

    #[test]
    fn scene_round_trip_keeps_gravity_and_controllers() {
        let mut world = world();
        world.create_material("rubber", 0.9, 0.8, 0.6).unwrap();
        world.create_shape("ball", PhysicsGeometry::Sphere { radius: 0.5 }, "rubber").unwrap();

        let mut graph = populated_graph();
        let scene_id = graph.id();
        world.create_scene(&graph).unwrap();
        world
            .scene_mut(scene_id)
            .unwrap()
            .set_gravity(Vec3::new(0.0, -3.7, 0.0))
            .unwrap();
        let player = graph.find_by_name("player").unwrap();
        let guard = graph.find_by_name("guard").unwrap();
        let crate_object = graph.find_by_name("crate").unwrap();
        world
            .create_controller(
                scene_id,
                &graph,
                player,
                ControllerDescription::capsule(0.4, 1.2),
                0.8,
            )
            .unwrap();
        world
            .create_controller(
                scene_id,
                &graph,
                guard,
                ControllerDescription::cuboid(0.9, 0.4, 0.3),
                0.9,
            )
            .unwrap();
        let ball = world.require_shape("ball").unwrap();
        world
            .create_rigid_body(
                scene_id,
                &graph,
                crate_object,
                RigidBodyDescription::default(),
                ball,
            )
            .unwrap();

        let world_text = to_ron(&world.to_document()).unwrap();
        let scene_text = to_ron(&world.scene_document(scene_id, &graph).unwrap()).unwrap();

        let mut restored = self::world();
        restored.load_document(&from_ron(&world_text).unwrap()).unwrap();
        let mut copy = populated_graph();
        restored
            .load_scene_document(&mut copy, &from_ron(&scene_text).unwrap())
            .unwrap();

        let scene = restored.scene(copy.id()).unwrap();
        assert_eq!(scene.gravity(), Vec3::new(0.0, -3.7, 0.0));
        let mut kinds: Vec<ControllerKind> =
            scene.controllers().iter().map(|(_, c)| c.kind()).collect();
        kinds.sort_by_key(|k| *k as u8);
        assert_eq!(kinds, vec![ControllerKind::Box, ControllerKind::Capsule]);
        assert_eq!(scene.body_count(), 1);

        assert_eq!(restored.materials().len(), 2);
        assert_eq!(restored.prefabs().count(), 2);
        assert_eq!(
            restored.materials().iter().filter(|m| m.name() == DEFAULT_MATERIAL).count(),
            1
        );
    }

    #[test]
    fn multi_shape_bodies_are_unsupported() {
        let mut world = world();
        let mut graph = populated_graph();
        let doc = SceneDocument {
            gravity: Vec3::new(0.0, -9.81, 0.0),
            controllers: ControllerManagerDocument {
                overlap_recovery: true,
                precise_sweeps: true,
                controllers: Vec::new(),
            },
            bodies: vec![RigidBodyDocument {
                scene_object: "crate".into(),
                shapes: vec![DEFAULT_SHAPE.into(), DEFAULT_SHAPE.into()],
                rigid_type: RigidType::Dynamic,
                density: 1.0,
                is_kinematic: false,
            }],
        };
        assert!(matches!(
            world.load_scene_document(&mut graph, &doc),
            Err(PhysicsError::Unsupported(_))
        ));
    }

    #[test]
    fn controller_description_is_tagged_by_shape() {
        let text = to_ron(&ControllerDescription::capsule(0.5, 1.0)).unwrap();
        assert!(text.contains("Capsule"));
        let back: ControllerDescription = from_ron(&text).unwrap();
        assert_eq!(back.kind(), ControllerKind::Capsule);
    }
}
