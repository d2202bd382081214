//! Shapes and the narrow phase
//!
//! Based on Game Engine Architecture 3rd Edition, Section 13.3:
//! "The narrow phase... determines whether the candidate pairs are actually
//! in contact."

pub mod epa;
pub mod gjk;
pub mod layers;
pub mod mesh;
pub mod shape;
pub mod solver;
pub mod support;

pub use layers::CollisionLayers;
pub use mesh::TriMesh;
pub use shape::{Shape, ShapeData, ShapeType};
pub use solver::{solve_distance, solve_static, ContactBuffer};
