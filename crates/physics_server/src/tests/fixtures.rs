//! Shared scene builders for the scenario tests

use crate::collision::{ShapeData, ShapeType};
use crate::config::PhysicsSettings;
use crate::foundation::logging;
use crate::foundation::math::{translation, Real, Transform, Vec3};
use crate::object::{BodyMode, BodyState};
use crate::param::ParamValue;
use crate::rid::{BodyRid, ShapeRid, SpaceRid};
use crate::server::PhysicsServer;

/// Fixed simulation step
pub const STEP: Real = 1.0 / 60.0;

/// A server with one active space
pub struct World {
    pub server: PhysicsServer,
    pub space: SpaceRid,
}

impl World {
    pub fn new() -> Self {
        logging::init_for_tests();
        let mut server = PhysicsServer::new(PhysicsSettings::default()).unwrap();
        server.init();
        let space = server.space_create().unwrap();
        server.space_set_active(space, true).unwrap();
        Self { server, space }
    }

    pub fn sphere(&mut self, radius: Real) -> ShapeRid {
        let shape = self.server.shape_create(ShapeType::Sphere);
        self.server.shape_set_data(shape, ShapeData::Sphere { radius }).unwrap();
        shape
    }

    pub fn cuboid(&mut self, half_extents: Vec3) -> ShapeRid {
        let shape = self.server.shape_create(ShapeType::Box);
        self.server.shape_set_data(shape, ShapeData::Box { half_extents }).unwrap();
        shape
    }

    /// A body with one shape, placed and added to the space
    pub fn body(&mut self, mode: BodyMode, shape: ShapeRid, position: Vec3) -> BodyRid {
        let body = self.server.body_create();
        self.server.body_set_mode(body, mode).unwrap();
        self.server.body_add_shape(body, shape, Transform::identity(), false).unwrap();
        self.place(body, position);
        self.server.body_set_space(body, Some(self.space)).unwrap();
        body
    }

    /// Static 10 x 1 x 10 slab whose top face is at y = 0.5
    pub fn ground(&mut self) -> BodyRid {
        let slab = self.cuboid(Vec3::new(5.0, 0.5, 5.0));
        self.body(BodyMode::Static, slab, Vec3::zeros())
    }

    pub fn place(&mut self, body: BodyRid, position: Vec3) {
        self.pose(body, translation(position));
    }

    pub fn pose(&mut self, body: BodyRid, transform: Transform) {
        self.server.body_set_state(body, BodyState::Transform, ParamValue::Transform(transform)).unwrap();
    }

    pub fn transform(&self, body: BodyRid) -> Transform {
        self.server.body_get_state(body, BodyState::Transform).unwrap().as_transform().unwrap()
    }

    pub fn tick(&mut self) {
        self.server.step(STEP).unwrap();
        self.server.flush_queries();
    }

    pub fn advance(&mut self, steps: usize) {
        for _ in 0..steps {
            self.tick();
        }
    }
}
