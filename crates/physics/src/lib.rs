//! Physics layer: bridges engine scenes to the rapier3d solver.
//!
//! [`PhysicsWorld`] owns the shared material and shape-prefab registries and
//! one [`PhysicsScene`] per engine scene. Call [`PhysicsWorld::step`] once per
//! tick; everything else is synchronous on the calling thread.

pub mod actor;
pub mod collision;
pub mod config;
pub mod controller;
pub mod convert;
pub mod dispatcher;
pub mod document;
pub mod error;
pub mod geometry;
pub mod joint;
pub mod material;
pub mod native;
pub mod raycast;
pub mod scene;
pub mod shape;
pub mod world;

pub use actor::*;
pub use collision::*;
pub use config::*;
pub use controller::*;
pub use dispatcher::*;
pub use document::*;
pub use error::*;
pub use geometry::*;
pub use joint::*;
pub use material::*;
pub use native::*;
pub use raycast::*;
pub use scene::*;
pub use shape::{
    PhysicsShape, ShapeId, ShapeInstance, ShapePrefab, ShapePrefabDocument, ShapePrefabId,
};
pub use world::*;

// Re-export Rapier for downstream crates
pub use rapier3d;

// Re-export common Rapier types
pub use rapier3d::prelude::{ColliderHandle, ImpulseJointHandle, RigidBodyHandle};
