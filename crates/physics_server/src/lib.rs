//! # Physics Server
//!
//! A handle-based 3D physics server: rigid bodies, areas, soft bodies and
//! joints living in independent spaces, stepped at a fixed rate by the caller.
//!
//! ## Features
//!
//! - **Opaque handles**: every resource is addressed by a typed slotmap key
//! - **Spaces**: isolated worlds with their own broadphase, islands and solver
//! - **Areas**: gravity and damping overrides with enter/exit monitoring
//! - **Soft bodies**: mass-spring meshes colliding with rigid shapes
//! - **Queries**: point, ray, shape cast and body motion tests
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use physics_server::prelude::*;
//!
//! fn main() -> Result<(), PhysicsError> {
//!     let mut server = PhysicsServer::new(PhysicsSettings::default())?;
//!     server.init();
//!     let space = server.space_create()?;
//!     server.space_set_active(space, true)?;
//!
//!     let sphere = server.shape_create(ShapeType::Sphere);
//!     let body = server.body_create();
//!     server.body_add_shape(body, sphere, Transform::identity(), false)?;
//!     server.body_set_space(body, Some(space))?;
//!
//!     for _ in 0..60 {
//!         server.step(1.0 / 60.0)?;
//!         server.flush_queries();
//!     }
//!     server.finish();
//!     Ok(())
//! }
//! ```

pub mod foundation;
pub mod config;
pub mod error;
pub mod rid;
pub mod param;
pub mod broadphase;
pub mod collision;
pub mod object;
pub mod constraint;
pub mod space;
pub mod server;

pub use error::{PhysicsError, PhysicsResult};
pub use server::PhysicsServer;

#[cfg(test)]
mod tests;

/// Common imports for server users
pub mod prelude {
    pub use crate::{
        PhysicsError, PhysicsResult, PhysicsServer,
        collision::{ShapeData, ShapeType},
        config::{Config, PhysicsSettings},
        constraint::{DampedSpringParameter, JointType, PinJointParameter},
        foundation::math::{Real, Transform, Vec3, Quat},
        object::{AreaParameter, AreaSpaceOverrideMode, BodyAxis, BodyMode, BodyParameter, BodyState, MonitorEvent, MonitorEventKind},
        param::ParamValue,
        rid::{AreaRid, BodyRid, JointRid, ObjectRid, Rid, ShapeRid, SoftBodyRid, SpaceRid},
        space::{MotionParameters, MotionResult, ProcessInfo, QueryParameters, SpaceParameter},
    };
}
