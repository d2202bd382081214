//! Bodies settling on the ground and staying there

use super::fixtures::World;
use crate::config::PhysicsSettings;
use crate::foundation::math::{transform_from, Quat, Real, Vec3};
use crate::object::BodyMode;
use crate::rid::{BodyRid, ShapeRid};

const GROUND_TOP: Real = 0.5;
const SETTLE_STEPS: usize = 30;
const RESTING_STEPS: usize = 320;

/// Drop `body` from just above `rest_height` and check it holds that height
/// on every step once settled.
fn assert_stays_at_rest(world: &mut World, body: BodyRid, rest_height: Real) {
    let max_penetration = PhysicsSettings::default().contact_max_allowed_penetration;
    let low = rest_height - 2.0 * max_penetration - 0.005;
    let high = rest_height + 2.0 * max_penetration;

    world.advance(SETTLE_STEPS);
    let start = world.transform(body);
    for step in 0..RESTING_STEPS {
        world.tick();
        let at = world.transform(body);
        let y = at.translation.vector.y;
        assert!((low..=high).contains(&y), "step {step}: y = {y}, expected {low}..={high}");
        let offset = at.translation.vector - start.translation.vector;
        let drift = Vec3::new(offset.x, 0.0, offset.z).norm();
        assert!(drift < 0.05, "step {step}: drifted {drift}");
        let turned = start.rotation.angle_to(&at.rotation);
        assert!(turned < 0.1, "step {step}: turned {turned} rad");
    }
}

fn drop_onto_ground(world: &mut World, shape: ShapeRid, rest_height: Real, rotation: Quat) -> BodyRid {
    world.ground();
    let body = world.body(BodyMode::Dynamic, shape, Vec3::zeros());
    world.pose(body, transform_from(Vec3::new(0.3, rest_height + 0.05, -0.2), rotation));
    body
}

#[test]
fn test_sphere_rests_on_ground() {
    let mut world = World::new();
    let ball = world.sphere(0.5);
    let body = drop_onto_ground(&mut world, ball, GROUND_TOP + 0.5, Quat::identity());
    assert_stays_at_rest(&mut world, body, GROUND_TOP + 0.5);
}

#[test]
fn test_rotated_sphere_rests_on_ground() {
    let mut world = World::new();
    let ball = world.sphere(0.5);
    let rotation = Quat::from_euler_angles(0.7, 0.3, -1.1);
    let body = drop_onto_ground(&mut world, ball, GROUND_TOP + 0.5, rotation);
    assert_stays_at_rest(&mut world, body, GROUND_TOP + 0.5);
}

#[test]
fn test_box_rests_on_ground() {
    let mut world = World::new();
    let crate_shape = world.cuboid(Vec3::new(0.5, 0.5, 0.5));
    let body = drop_onto_ground(&mut world, crate_shape, GROUND_TOP + 0.5, Quat::identity());
    assert_stays_at_rest(&mut world, body, GROUND_TOP + 0.5);
}

#[test]
fn test_yawed_box_rests_on_ground() {
    let mut world = World::new();
    let crate_shape = world.cuboid(Vec3::new(0.5, 0.25, 0.75));
    let yaw = Quat::from_axis_angle(&Vec3::y_axis(), 0.6);
    let body = drop_onto_ground(&mut world, crate_shape, GROUND_TOP + 0.25, yaw);
    assert_stays_at_rest(&mut world, body, GROUND_TOP + 0.25);
}
