//! Physics sandbox: drops a crate and a character onto the ground, runs a few
//! seconds of simulated time, and saves the resulting scene document.

use anyhow::{Context, Result};
use engine_core::{Scene, SimulationClock, Transform};
use glam::Vec3;
use physics::{
    save_ron, ControllerDescription, ControllerFilters, PhysicsConfig, PhysicsGeometry,
    PhysicsWorld, RigidBodyDescription, RigidType, DEFAULT_MATERIAL,
};
use std::path::Path;
use std::time::Duration;

/// Simulated seconds to run when no argument is given.
const DEFAULT_SECONDS: f32 = 3.0;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let seconds = match std::env::args().nth(1) {
        Some(arg) => arg
            .parse::<f32>()
            .with_context(|| format!("expected seconds to simulate, got '{}'", arg))?,
        None => DEFAULT_SECONDS,
    };

    let config = PhysicsConfig::load();
    let fixed_step = Duration::from_secs_f32(config.fixed_timestep.max(1.0e-4));
    let mut clock = SimulationClock::with_fixed_step(fixed_step);
    let mut world = PhysicsWorld::new(config);

    let mut level = Scene::new("sandbox");
    let scene_id = level.id();
    world.create_scene(&level)?;

    world.create_material("rubber", 0.9, 0.8, 0.7)?;
    let ground_shape = world.create_shape(
        "ground",
        PhysicsGeometry::Box {
            half_extents: Vec3::new(50.0, 1.0, 50.0),
        },
        DEFAULT_MATERIAL,
    )?;
    let ball_shape = world.create_shape("ball", PhysicsGeometry::Sphere { radius: 0.5 }, "rubber")?;
    let crate_shape = world.default_shape().context("default shape missing")?;

    let ground = level.spawn("ground", Transform::from_position(Vec3::new(0.0, -1.0, 0.0)));
    world.create_rigid_body(
        scene_id,
        &level,
        ground,
        RigidBodyDescription {
            rigid_type: RigidType::Static,
            ..Default::default()
        },
        ground_shape,
    )?;

    let crate_object = level.spawn("crate", Transform::from_position(Vec3::new(3.0, 6.0, 0.0)));
    world.create_rigid_body(
        scene_id,
        &level,
        crate_object,
        RigidBodyDescription::default(),
        crate_shape,
    )?;
    let ball = level.spawn("ball", Transform::from_position(Vec3::new(-3.0, 8.0, 0.0)));
    world.create_rigid_body(scene_id, &level, ball, RigidBodyDescription::default(), ball_shape)?;

    let player = level.spawn("player", Transform::from_position(Vec3::new(0.0, 4.0, 0.0)));
    let controller = world.create_controller(
        scene_id,
        &level,
        player,
        ControllerDescription::capsule(0.4, 1.0),
        0.9,
    )?;

    let mut levels = [level];
    let ticks = (seconds / clock.fixed_step_seconds()).ceil() as u32;
    clock.accumulate(clock.fixed_step() * ticks);
    let walk = Vec3::new(0.0, 0.0, 1.5);
    let filters = ControllerFilters::default();

    while clock.tick() {
        let dt = clock.fixed_step_seconds();
        world.step(dt, &mut levels)?;
        let grounded = world
            .scene(scene_id)
            .and_then(|s| s.controllers().get(controller))
            .map_or(false, |c| c.is_grounded());
        if grounded {
            world.move_controller(&mut levels[0], controller, walk * dt, dt, &filters)?;
        }

        if clock.tick_count() % 60 == 0 {
            let level = &levels[0];
            log::info!(
                "t={:.2}s crate={:?} ball={:?} player={:?} grounded={}",
                clock.elapsed_seconds(),
                level.transform(crate_object).map(|t| t.position),
                level.transform(ball).map(|t| t.position),
                level.transform(player).map(|t| t.position),
                grounded
            );
        }
    }

    let scene_doc = world.scene_document(scene_id, &levels[0])?;
    save_ron(Path::new("sandbox_scene.ron"), &scene_doc)?;
    save_ron(Path::new("sandbox_world.ron"), &world.to_document())?;
    log::info!(
        "Saved {} controllers and {} bodies after {} ticks",
        scene_doc.controllers.controllers.len(),
        scene_doc.bodies.len(),
        clock.tick_count()
    );
    Ok(())
}
