//! Constraints
//!
//! Based on Game Engine Architecture 3rd Edition, Section 13.4.7
//! ("Constraints"): every relationship the solver looks at (a touching body
//! pair, an area overlap, a joint) runs the same three passes each step.
//!
//! - `setup` refreshes the geometric state (runs the narrow phase for pairs).
//! - `pre_solve` precomputes the solver terms, applies warm starting and fires
//!   overlap side effects. Returning `false` drops the constraint from this
//!   step's solve loop.
//! - `solve` applies one sequential impulse iteration.
//!
//! Overlap pairs are owned by their space and keyed by [`PairId`]; joints are
//! server resources keyed by [`JointRid`]. [`ConstraintRef`] names either.

pub(crate) mod area_pair;
pub(crate) mod body_pair;
pub(crate) mod body_soft_body_pair;
pub mod joint;

use slotmap::{new_key_type, SlotMap};

pub(crate) use area_pair::{Area2Pair, AreaPair, AreaSoftBodyPair};
pub(crate) use body_pair::BodyPair;
pub(crate) use body_soft_body_pair::BodySoftBodyPair;
pub use joint::{DampedSpringParameter, Joint, JointKind, JointType, PinJointParameter};

use crate::collision::Shape;
use crate::foundation::math::{Real, Transform};
use crate::object::{CollisionObject, Objects};
use crate::rid::{BodyRid, JointRid, ShapeRid, SoftBodyRid};
use crate::space::{SpaceParams, SpaceQueues};

new_key_type! {
    /// Handle to an overlap pair owned by a space
    pub struct PairId;
}

/// Reference to any constraint, as stored in object constraint lists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConstraintRef {
    /// Broadphase-created overlap pair
    Pair(PairId),
    /// User joint
    Joint(JointRid),
}

/// Everything a constraint may read or write while the space steps
pub(crate) struct SolverContext<'a> {
    pub(crate) objects: &'a mut Objects,
    pub(crate) shapes: &'a SlotMap<ShapeRid, Shape>,
    pub(crate) queues: &'a mut SpaceQueues,
    pub(crate) params: &'a SpaceParams,
    pub(crate) step: Real,
}

/// The three solver passes
pub(crate) trait Solve {
    fn setup(&mut self, ctx: &mut SolverContext<'_>) -> bool;

    fn pre_solve(&mut self, ctx: &mut SolverContext<'_>) -> bool;

    fn solve(&mut self, ctx: &mut SolverContext<'_>);

    /// Number of extra iteration rounds this constraint takes part in
    fn priority(&self) -> u32 {
        1
    }
}

/// Overlap pair created from a broadphase pair event
#[derive(Debug)]
pub(crate) enum Pair {
    Area(AreaPair),
    Area2(Area2Pair),
    AreaSoftBody(AreaSoftBodyPair),
    Body(BodyPair),
    BodySoftBody(BodySoftBodyPair),
}

impl Pair {
    /// Rigid bodies linked by this pair, for island building
    pub(crate) fn bodies(&self) -> Vec<BodyRid> {
        match self {
            Self::Area(p) => vec![p.body()],
            Self::Area2(_) | Self::AreaSoftBody(_) => Vec::new(),
            Self::Body(p) => p.bodies().to_vec(),
            Self::BodySoftBody(p) => vec![p.body()],
        }
    }

    /// Soft bodies linked by this pair
    pub(crate) fn soft_body(&self) -> Option<SoftBodyRid> {
        match self {
            Self::AreaSoftBody(p) => Some(p.soft_body()),
            Self::BodySoftBody(p) => Some(p.soft_body()),
            _ => None,
        }
    }

    /// Undo side effects before the pair is dropped
    pub(crate) fn destroy(&mut self, id: PairId, objects: &mut Objects, queues: &mut SpaceQueues) {
        match self {
            Self::Area(p) => p.destroy(id, objects, queues),
            Self::Area2(p) => p.destroy(id, objects, queues),
            Self::AreaSoftBody(p) => p.destroy(id, objects, queues),
            Self::Body(p) => p.destroy(id, objects),
            Self::BodySoftBody(p) => p.destroy(id, objects),
        }
    }
}

impl Solve for Pair {
    fn setup(&mut self, ctx: &mut SolverContext<'_>) -> bool {
        match self {
            Self::Area(p) => p.setup(ctx),
            Self::Area2(p) => p.setup(ctx),
            Self::AreaSoftBody(p) => p.setup(ctx),
            Self::Body(p) => p.setup(ctx),
            Self::BodySoftBody(p) => p.setup(ctx),
        }
    }

    fn pre_solve(&mut self, ctx: &mut SolverContext<'_>) -> bool {
        match self {
            Self::Area(p) => p.pre_solve(ctx),
            Self::Area2(p) => p.pre_solve(ctx),
            Self::AreaSoftBody(p) => p.pre_solve(ctx),
            Self::Body(p) => p.pre_solve(ctx),
            Self::BodySoftBody(p) => p.pre_solve(ctx),
        }
    }

    fn solve(&mut self, ctx: &mut SolverContext<'_>) {
        match self {
            Self::Area(p) => p.solve(ctx),
            Self::Area2(p) => p.solve(ctx),
            Self::AreaSoftBody(p) => p.solve(ctx),
            Self::Body(p) => p.solve(ctx),
            Self::BodySoftBody(p) => p.solve(ctx),
        }
    }
}

/// Enabled shape `index` of `object` with its world transform
pub(crate) fn placed_shape<'s>(shapes: &'s SlotMap<ShapeRid, Shape>, object: &CollisionObject, index: usize) -> Option<(&'s Shape, Transform)> {
    let entry = object.shapes().get(index)?;
    if entry.disabled {
        return None;
    }
    Some((shapes.get(entry.shape)?, object.transform() * entry.transform))
}

/// Bounce of two touching materials
pub(crate) fn combine_bounce(a: Real, b: Real) -> Real {
    (a + b).clamp(0.0, 1.0)
}

/// Friction of two touching materials
pub(crate) fn combine_friction(a: Real, b: Real) -> Real {
    a.min(b).abs()
}

/// Position correction factor of two shapes; zero custom biases fall back to `default`
pub(crate) fn combine_bias(a: Real, b: Real, default: Real) -> Real {
    match (a == 0.0, b == 0.0) {
        (true, true) => default,
        (true, false) => b,
        (false, true) => a,
        (false, false) => (a + b) * 0.5,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_material_combination() {
        assert_relative_eq!(combine_bounce(0.7, 0.6), 1.0);
        assert_relative_eq!(combine_bounce(-0.5, 0.2), 0.0);
        assert_relative_eq!(combine_friction(0.3, -0.8), 0.8);
        assert_relative_eq!(combine_friction(0.3, 0.8), 0.3);
    }

    #[test]
    fn test_bias_combination() {
        assert_relative_eq!(combine_bias(0.0, 0.0, 0.8), 0.8);
        assert_relative_eq!(combine_bias(0.2, 0.0, 0.8), 0.2);
        assert_relative_eq!(combine_bias(0.0, 0.4, 0.8), 0.4);
        assert_relative_eq!(combine_bias(0.2, 0.4, 0.8), 0.3, epsilon = 1e-6);
    }
}
