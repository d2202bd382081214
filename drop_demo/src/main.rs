//! Drop demo
//!
//! Drops a sphere and a box onto a static slab and logs where they end up.
//! Pass a TOML or RON settings file as the first argument to override the
//! server defaults; `RUST_LOG=debug` shows the server's own logging.

use physics_server::foundation::logging;
use physics_server::foundation::math::translation;
use physics_server::prelude::*;

const STEP: Real = 1.0 / 60.0;
const SECONDS: usize = 3;

fn load_settings() -> Result<PhysicsSettings, PhysicsError> {
    match std::env::args().nth(1) {
        Some(path) => {
            log::info!("Loading settings from {}", path);
            Ok(PhysicsSettings::load_from_file(path)?)
        }
        None => Ok(PhysicsSettings::default()),
    }
}

fn shape(server: &mut PhysicsServer, kind: ShapeType, data: ShapeData) -> Result<ShapeRid, PhysicsError> {
    let rid = server.shape_create(kind);
    server.shape_set_data(rid, data)?;
    Ok(rid)
}

fn spawn(server: &mut PhysicsServer, space: SpaceRid, mode: BodyMode, shape: ShapeRid, origin: Vec3) -> Result<BodyRid, PhysicsError> {
    let body = server.body_create();
    server.body_set_mode(body, mode)?;
    server.body_add_shape(body, shape, Transform::identity(), false)?;
    server.body_set_state(body, BodyState::Transform, ParamValue::Transform(translation(origin)))?;
    server.body_set_space(body, Some(space))?;
    Ok(body)
}

fn origin(server: &PhysicsServer, body: BodyRid) -> Result<Vec3, PhysicsError> {
    Ok(server.body_get_state(body, BodyState::Transform)?.as_transform()?.translation.vector)
}

fn run() -> Result<(), PhysicsError> {
    let settings = load_settings()?;
    let mut server = PhysicsServer::new(settings)?;
    server.init();

    let space = server.space_create()?;
    server.space_set_active(space, true)?;

    let slab = shape(&mut server, ShapeType::Box, ShapeData::Box { half_extents: Vec3::new(10.0, 0.5, 10.0) })?;
    let ball = shape(&mut server, ShapeType::Sphere, ShapeData::Sphere { radius: 0.5 })?;
    let crate_shape = shape(&mut server, ShapeType::Box, ShapeData::Box { half_extents: Vec3::new(0.5, 0.5, 0.5) })?;

    spawn(&mut server, space, BodyMode::Static, slab, Vec3::zeros())?;
    let sphere = spawn(&mut server, space, BodyMode::Dynamic, ball, Vec3::new(0.0, 8.0, 0.0))?;
    let cube = spawn(&mut server, space, BodyMode::Dynamic, crate_shape, Vec3::new(2.0, 4.0, 0.0))?;

    for frame in 1..=SECONDS * 60 {
        server.step(STEP)?;
        server.flush_queries();
        if frame % 30 == 0 {
            log::info!(
                "t={:.1}s sphere={:?} cube={:?} active={} pairs={} islands={}",
                frame as Real * STEP,
                origin(&server, sphere)?,
                origin(&server, cube)?,
                server.get_process_info(ProcessInfo::ActiveObjects),
                server.get_process_info(ProcessInfo::CollisionPairs),
                server.get_process_info(ProcessInfo::IslandCount),
            );
        }
    }

    let asleep = server.body_get_state(sphere, BodyState::Sleeping)?.as_bool()?;
    log::info!("Sphere resting at {:?} (asleep: {})", origin(&server, sphere)?, asleep);

    server.free(sphere)?;
    server.free(cube)?;
    server.finish();
    Ok(())
}

fn main() {
    logging::init();
    log::info!("Starting drop demo...");
    if let Err(e) = run() {
        log::error!("Drop demo failed: {}", e);
        std::process::exit(1);
    }
}
