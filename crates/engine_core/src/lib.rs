//! Core engine types shared by every subsystem.
//!
//! This crate provides the foundational types the physics layer talks to:
//! - Transform
//! - Scene graph of named objects
//! - Simulation clock

pub mod scene;
pub mod time;
pub mod transform;

pub use scene::*;
pub use time::*;
pub use transform::*;

// Re-export commonly used types
pub use glam::{Mat4, Quat, Vec3};
pub use hecs::{Entity, World};
