//! Area gravity overrides and overlap monitoring

use std::sync::{Arc, Mutex};

use super::fixtures::World;
use crate::foundation::math::{translation, Real, Transform, Vec3};
use crate::object::{AreaParameter, AreaSpaceOverrideMode, BodyMode, BodyParameter, BodyState, MonitorEvent, MonitorEventKind};
use crate::param::ParamValue;
use crate::rid::{AreaRid, ObjectRid};
use approx::assert_relative_eq;

fn gravity_area(world: &mut World, mode: AreaSpaceOverrideMode, gravity: Real, direction: Vec3, priority: Real) -> AreaRid {
    let server = &mut world.server;
    let volume = server.shape_create(crate::collision::ShapeType::Sphere);
    server
        .shape_set_data(volume, crate::collision::ShapeData::Sphere { radius: 5.0 })
        .unwrap();
    let area = server.area_create();
    server.area_add_shape(area, volume, Transform::identity(), false).unwrap();
    server.area_set_space_override_mode(area, mode).unwrap();
    server.area_set_param(area, AreaParameter::Gravity, ParamValue::Real(gravity)).unwrap();
    server.area_set_param(area, AreaParameter::GravityVector, ParamValue::Vector(direction)).unwrap();
    server.area_set_param(area, AreaParameter::Priority, ParamValue::Real(priority)).unwrap();
    server.area_set_space(area, Some(world.space)).unwrap();
    area
}

#[test]
fn test_combine_replace_hides_lower_areas() {
    let mut world = World::new();
    gravity_area(&mut world, AreaSpaceOverrideMode::CombineReplace, 5.0, Vec3::x(), 2.0);
    gravity_area(&mut world, AreaSpaceOverrideMode::Combine, 20.0, Vec3::z(), 1.0);
    let ball = world.sphere(0.25);
    let body = world.body(BodyMode::Dynamic, ball, Vec3::zeros());

    world.advance(4);
    assert_relative_eq!(world.server.objects.bodies[body].total_gravity(), Vec3::new(5.0, 0.0, 0.0), epsilon = 1e-5);
}

#[test]
fn test_combine_adds_default_gravity() {
    let mut world = World::new();
    gravity_area(&mut world, AreaSpaceOverrideMode::Combine, 2.0, Vec3::x(), 1.0);
    let ball = world.sphere(0.25);
    let body = world.body(BodyMode::Dynamic, ball, Vec3::zeros());

    world.advance(4);
    assert_relative_eq!(world.server.objects.bodies[body].total_gravity(), Vec3::new(2.0, -9.8, 0.0), epsilon = 1e-5);
}

#[test]
fn test_body_crossing_area_reports_one_enter_and_one_exit() {
    let mut world = World::new();
    let gate_shape = world.cuboid(Vec3::repeat(1.0));
    let gate = world.server.area_create();
    world.server.area_add_shape(gate, gate_shape, Transform::identity(), false).unwrap();
    world.server.area_set_space(gate, Some(world.space)).unwrap();

    let events: Arc<Mutex<Vec<MonitorEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    world
        .server
        .area_set_monitor_callback(
            gate,
            Some(Box::new(move |event| {
                sink.lock().unwrap().push(*event);
            })),
        )
        .unwrap();

    let ball = world.sphere(0.25);
    let body = world.body(BodyMode::Dynamic, ball, Vec3::new(-5.0, 0.0, 0.0));
    world.server.body_attach_object_instance_id(body, 77).unwrap();
    world.server.body_set_param(body, BodyParameter::GravityScale, ParamValue::Real(0.0)).unwrap();
    world.server.body_set_param(body, BodyParameter::LinearDamp, ParamValue::Real(0.0)).unwrap();
    world
        .server
        .body_set_state(body, BodyState::LinearVelocity, ParamValue::Vector(Vec3::new(6.0, 0.0, 0.0)))
        .unwrap();

    world.advance(120);
    assert!(world.transform(body).translation.vector.x > 5.0);

    let events = events.lock().unwrap();
    let kinds: Vec<MonitorEventKind> = events.iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![MonitorEventKind::Added, MonitorEventKind::Removed]);
    assert!(events.iter().all(|e| e.rid == ObjectRid::Body(body) && e.instance_id == 77));
}

#[test]
fn test_moving_area_reaches_resting_body() {
    let mut world = World::new();
    let area = gravity_area(&mut world, AreaSpaceOverrideMode::Replace, 1.0, Vec3::y(), 1.0);
    world.server.area_set_transform(area, translation(Vec3::new(100.0, 0.0, 0.0))).unwrap();
    let ball = world.sphere(0.25);
    let body = world.body(BodyMode::Dynamic, ball, Vec3::zeros());
    world.advance(2);
    assert_relative_eq!(world.server.objects.bodies[body].total_gravity(), Vec3::new(0.0, -9.8, 0.0), epsilon = 1e-5);

    let here = world.transform(body).translation.vector;
    world.server.area_set_transform(area, translation(here)).unwrap();
    world.advance(3);
    assert_relative_eq!(world.server.objects.bodies[body].total_gravity(), Vec3::new(0.0, 1.0, 0.0), epsilon = 1e-5);
}
