//! Physics configuration. Loaded from `physics.ron` at startup.

use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Tunables for the physics layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhysicsConfig {
    /// Gravity given to newly created physics scenes.
    #[serde(default = "default_scene_gravity")]
    pub scene_gravity: Vec3,
    /// Solver worker threads. `None` uses half the hardware threads.
    #[serde(default)]
    pub solver_threads: Option<usize>,
    /// Controller moves shorter than this are skipped.
    #[serde(default = "default_min_move_distance")]
    pub min_move_distance: f32,
    /// Gravity applied to new character controllers.
    #[serde(default = "default_scene_gravity")]
    pub controller_gravity: Vec3,
    /// Fall speed clamp for new character controllers (m/s).
    #[serde(default = "default_terminal_velocity")]
    pub terminal_velocity: f32,
    /// Tick length used by the sandbox loop (seconds).
    #[serde(default = "default_fixed_timestep")]
    pub fixed_timestep: f32,
}

fn default_scene_gravity() -> Vec3 {
    Vec3::new(0.0, -9.81, 0.0)
}
fn default_min_move_distance() -> f32 {
    1e-6
}
fn default_terminal_velocity() -> f32 {
    55.0
}
fn default_fixed_timestep() -> f32 {
    1.0 / 60.0
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            scene_gravity: default_scene_gravity(),
            solver_threads: None,
            min_move_distance: default_min_move_distance(),
            controller_gravity: default_scene_gravity(),
            terminal_velocity: default_terminal_velocity(),
            fixed_timestep: default_fixed_timestep(),
        }
    }
}

impl PhysicsConfig {
    /// Load config from `physics.ron` in the current directory.
    pub fn load() -> Self {
        Self::load_from(&config_path())
    }

    /// Load config from a file. If the file is missing or invalid, returns default config.
    pub fn load_from(path: &Path) -> Self {
        if let Ok(data) = std::fs::read_to_string(path) {
            match Self::from_ron(&data) {
                Ok(c) => return c,
                Err(e) => log::warn!("Invalid physics config at {:?}: {}, using defaults", path, e),
            }
        }
        Self::default()
    }

    pub fn from_ron(data: &str) -> Result<Self, ron::error::SpannedError> {
        ron::from_str(data)
    }

    /// Worker count for the solver pool, never zero.
    pub fn solver_thread_count(&self) -> usize {
        match self.solver_threads {
            Some(n) => n.max(1),
            None => std::thread::available_parallelism()
                .map(|n| n.get() / 2)
                .unwrap_or(1)
                .max(1),
        }
    }
}

fn config_path() -> PathBuf {
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join("physics.ron")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_falls_back_per_field() {
        let config =
            PhysicsConfig::from_ron("(solver_threads: Some(3), terminal_velocity: 20.0)").unwrap();
        assert_eq!(config.solver_thread_count(), 3);
        assert_eq!(config.terminal_velocity, 20.0);
        assert_eq!(config.scene_gravity, Vec3::new(0.0, -9.81, 0.0));
        assert_eq!(config.min_move_distance, 1e-6);
    }

    #[test]
    fn zero_threads_still_gets_one_worker() {
        let config = PhysicsConfig {
            solver_threads: Some(0),
            ..Default::default()
        };
        assert_eq!(config.solver_thread_count(), 1);
        assert!(PhysicsConfig::default().solver_thread_count() >= 1);
    }

    #[test]
    fn missing_file_gives_defaults() {
        let config = PhysicsConfig::load_from(Path::new("/definitely/not/here/physics.ron"));
        assert_eq!(config.terminal_velocity, 55.0);
    }
}
