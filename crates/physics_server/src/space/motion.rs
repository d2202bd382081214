//! Body motion queries
//!
//! GEA 13.3.6 ("Swept Shapes and Continuous Collision Detection"): a body is
//! first pushed out of anything it already penetrates, then swept along the
//! requested motion with a biased bisection on the motion fraction, and
//! finally the contacts at the first unsafe fraction are gathered as rest
//! information.

use std::collections::BTreeSet;

use slotmap::SlotMap;

use super::Space;
use crate::broadphase::{BroadPhase, INTERSECTION_QUERY_MAX};
use crate::collision::solver::ContactCallback;
use crate::collision::{solve_distance, solve_static, ContactBuffer, Shape, ShapeData};
use crate::constraint::placed_shape;
use crate::error::{PhysicsError, PhysicsResult};
use crate::foundation::math::{Aabb, Real, Transform, Vec3, CMP_EPSILON};
use crate::object::{Body, Objects};
use crate::rid::{BodyRid, ObjectRid, ShapeRid};

/// Largest number of collisions a motion query can report
pub const MAX_COLLISIONS: usize = 32;

/// Fraction of the margin a contact may stay penetrated after recovery
pub(crate) const MIN_CONTACT_DEPTH_FACTOR: Real = 0.05;

const RECOVER_ATTEMPTS: usize = 4;
const RECOVER_MAX_RESULTS: usize = 32;
const RECOVER_FACTOR: Real = 0.4;
const BISECTION_STEPS: usize = 8;

/// Input of [`Space::test_body_motion`]
#[derive(Debug, Clone)]
pub struct MotionParameters {
    /// Transform the body starts from, replacing its current one
    pub from: Transform,
    /// Requested displacement
    pub motion: Vec3,
    /// Extra thickness used for recovery and rest contacts
    pub margin: Real,
    /// Number of rest contacts to report, in `1..=MAX_COLLISIONS`
    pub max_collisions: usize,
    /// Let separation ray shapes stop the sweep
    pub collide_separation_ray: bool,
    /// Bodies ignored by the query
    pub exclude_bodies: BTreeSet<BodyRid>,
    /// Instance ids ignored by the query
    pub exclude_objects: BTreeSet<u64>,
}

impl MotionParameters {
    /// Sweep from `from` along `motion` with the default margin
    pub fn new(from: Transform, motion: Vec3) -> Self {
        Self { from, motion, ..Self::default() }
    }
}

impl Default for MotionParameters {
    fn default() -> Self {
        Self {
            from: Transform::identity(),
            motion: Vec3::zeros(),
            margin: 0.001,
            max_collisions: 1,
            collide_separation_ray: false,
            exclude_bodies: BTreeSet::new(),
            exclude_objects: BTreeSet::new(),
        }
    }
}

/// One rest contact found at the unsafe fraction
#[derive(Debug, Clone, PartialEq)]
pub struct MotionCollision {
    /// Contact point on the collider
    pub position: Vec3,
    /// Contact normal, pointing away from the collider
    pub normal: Vec3,
    /// Velocity of the collider at the contact point
    pub collider_velocity: Vec3,
    /// Penetration depth
    pub depth: Real,
    /// Index of the moving body's shape
    pub local_shape: usize,
    /// Instance id of the collider
    pub collider_id: u64,
    /// Handle of the collider
    pub collider: BodyRid,
    /// Index of the collider's shape
    pub collider_shape: usize,
}

/// Output of [`Space::test_body_motion`]
#[derive(Debug, Clone, PartialEq)]
pub struct MotionResult {
    /// Displacement actually achieved, including recovery
    pub travel: Vec3,
    /// Part of the motion left undone
    pub remainder: Vec3,
    /// Largest fraction of the motion free of collisions
    pub collision_safe_fraction: Real,
    /// Smallest fraction of the motion found to collide
    pub collision_unsafe_fraction: Real,
    /// Rest contacts, deepest first
    pub collisions: Vec<MotionCollision>,
}

impl MotionResult {
    fn free(travel: Vec3) -> Self {
        Self {
            travel,
            remainder: Vec3::zeros(),
            collision_safe_fraction: 1.0,
            collision_unsafe_fraction: 1.0,
            collisions: Vec::new(),
        }
    }

    /// Whether the motion was stopped by a collider
    pub fn collided(&self) -> bool {
        !self.collisions.is_empty()
    }
}

/// A contact kept by [`RestCollector`]
#[derive(Debug, Clone, Copy)]
pub(crate) struct RestContact {
    pub(crate) object: ObjectRid,
    pub(crate) shape: usize,
    pub(crate) local_shape: usize,
    pub(crate) contact: Vec3,
    pub(crate) normal: Vec3,
    pub(crate) len: Real,
}

/// Gathers contact pairs deeper than a threshold, deepest first
#[derive(Debug)]
pub(crate) struct RestCollector {
    min_allowed_depth: Real,
    max_results: usize,
    results: Vec<RestContact>,
}

impl RestCollector {
    pub(crate) fn new(min_allowed_depth: Real, max_results: usize) -> Self {
        Self { min_allowed_depth, max_results, results: Vec::new() }
    }

    /// Record the contact `(point_a, point_b)` where A is the query shape
    pub(crate) fn add(&mut self, point_a: Vec3, point_b: Vec3, object: ObjectRid, shape: usize, local_shape: usize) {
        let rel = point_b - point_a;
        let len = rel.norm();
        if len < self.min_allowed_depth || len <= 0.0 {
            return;
        }
        let contact = RestContact { object, shape, local_shape, contact: point_b, normal: rel / len, len };
        // Ties keep insertion order
        let at = self.results.partition_point(|r| r.len >= len);
        if at < self.max_results {
            self.results.insert(at, contact);
            self.results.truncate(self.max_results);
        }
    }

    pub(crate) fn into_results(self) -> Vec<RestContact> {
        self.results
    }
}

/// Velocity of `body` at the world point `point`
pub(crate) fn velocity_at_world_point(body: &Body, point: &Vec3) -> Vec3 {
    let rel = point - (body.base().transform().translation.vector + body.center_of_mass());
    body.linear_velocity() + body.angular_velocity().cross(&rel)
}

/// Shape `index` of `body` placed as if the body stood at `at`
fn placed_at<'s>(shapes: &'s SlotMap<ShapeRid, Shape>, body: &Body, index: usize, at: &Transform) -> Option<(&'s Shape, Transform)> {
    let entry = body.base().shapes().get(index)?;
    Some((shapes.get(entry.shape)?, at * entry.transform))
}

impl Space {
    /// Broadphase candidates a body can collide with, in broadphase order
    fn cull_aabb_for_body(&self, body: &Body, objects: &Objects, aabb: &Aabb, params: &MotionParameters) -> Vec<(BodyRid, usize)> {
        let own = body.base().rid();
        self.broadphase
            .cull_aabb(aabb, INTERSECTION_QUERY_MAX)
            .into_iter()
            .filter_map(|(owner, shape)| {
                let rid = owner.as_body()?;
                let other = objects.bodies.get(rid)?;
                let keep = owner != own
                    && body.base().collides_with(other.base())
                    && !other.has_exception(own)
                    && !body.has_exception(owner)
                    && !params.exclude_bodies.contains(&rid)
                    && !params.exclude_objects.contains(&other.base().instance_id());
                keep.then_some((rid, shape))
            })
            .collect()
    }

    /// Sweep a body along a motion, recovering from initial penetration first
    pub(crate) fn test_body_motion(
        &self,
        rid: BodyRid,
        objects: &Objects,
        shapes: &SlotMap<ShapeRid, Shape>,
        params: &MotionParameters,
    ) -> PhysicsResult<MotionResult> {
        crate::ensure!(
            (1..=MAX_COLLISIONS).contains(&params.max_collisions),
            PhysicsError::TooManyCollisions { requested: params.max_collisions, max: MAX_COLLISIONS }
        );
        let body = objects
            .bodies
            .get(rid)
            .ok_or(PhysicsError::InvalidHandle { kind: "body", rid: rid.into() })?;

        let enabled: Vec<usize> = (0..body.base().shape_count()).filter(|&i| !body.base().is_shape_disabled(i)).collect();
        let Some(local_aabb) = enabled
            .iter()
            .map(|&i| body.base().shapes()[i].aabb_cache)
            .reduce(|a, b| a.merge(&b))
        else {
            return Ok(MotionResult::free(params.motion));
        };

        let rebase = params.from * body.base().transform().inverse();
        let mut body_aabb = local_aabb.transformed(&rebase).grow(params.margin);
        let min_contact_depth = params.margin * MIN_CONTACT_DEPTH_FACTOR;
        let motion_length = params.motion.norm();
        let mut body_transform = params.from;

        // Recovery
        let mut recovered = false;
        for _ in 0..RECOVER_ATTEMPTS {
            let mut contacts = ContactBuffer::new(RECOVER_MAX_RESULTS);
            let candidates = self.cull_aabb_for_body(body, objects, &body_aabb, params);
            for &j in &enabled {
                let Some((body_shape, body_xform)) = placed_at(shapes, body, j, &body_transform) else {
                    continue;
                };
                for &(other, shape_index) in &candidates {
                    let Some((other_shape, other_xform)) = objects.bodies.get(other).and_then(|o| placed_shape(shapes, o.base(), shape_index)) else {
                        continue;
                    };
                    let mut collect = |a: Vec3, b: Vec3| contacts.push(a, b);
                    let callback: &mut ContactCallback<'_> = &mut collect;
                    solve_static(body_shape, &body_xform, other_shape, &other_xform, Some(callback), params.margin, 0.0);
                }
            }
            if contacts.is_empty() {
                break;
            }
            recovered = true;

            let mut recover_motion = Vec3::zeros();
            for (a, b) in contacts.pairs() {
                let n = (a - b).try_normalize(CMP_EPSILON).unwrap_or_else(Vec3::zeros);
                let d = n.dot(b);
                let depth = n.dot(&(a + recover_motion)) - d;
                if depth > min_contact_depth + CMP_EPSILON {
                    recover_motion -= n * ((depth - min_contact_depth) * RECOVER_FACTOR);
                }
            }
            if recover_motion == Vec3::zeros() {
                break;
            }
            body_transform.translation.vector += recover_motion;
            body_aabb = Aabb::new(body_aabb.min + recover_motion, body_aabb.max + recover_motion);
        }
        if recovered {
            log::debug!("motion query recovered {:?} by {:?}", rid, body_transform.translation.vector - params.from.translation.vector);
        }

        // Sweep
        let mut safe: Real = 1.0;
        let mut unsafe_fraction: Real = 1.0;
        let mut best_shape = None;
        let motion_aabb = body_aabb.swept(&params.motion);
        let candidates = self.cull_aabb_for_body(body, objects, &motion_aabb, params);
        for &j in &enabled {
            let Some((body_shape, body_xform)) = placed_at(shapes, body, j, &body_transform) else {
                continue;
            };
            if let ShapeData::SeparationRay { slide_on_slope, .. } = body_shape.data() {
                if !params.collide_separation_ray && !slide_on_slope {
                    continue;
                }
            }

            let mut stuck = false;
            let mut best_safe: Real = 1.0;
            let mut best_unsafe: Real = 1.0;
            for &(other, shape_index) in &candidates {
                let Some((other_shape, other_xform)) = objects.bodies.get(other).and_then(|o| placed_shape(shapes, o.base(), shape_index)) else {
                    continue;
                };
                if solve_distance(body_shape, &body_xform, &params.motion, other_shape, &other_xform).is_some() {
                    continue;
                }
                if solve_distance(body_shape, &body_xform, &Vec3::zeros(), other_shape, &other_xform).is_none() {
                    stuck = true;
                    break;
                }

                let mut low: Real = 0.0;
                let mut hi: Real = 1.0;
                let mut coeff: Real = 0.5;
                for k in 0..BISECTION_STEPS {
                    let fraction = low + (hi - low) * coeff;
                    let motion = params.motion * fraction;
                    if solve_distance(body_shape, &body_xform, &motion, other_shape, &other_xform).is_none() {
                        hi = fraction;
                        coeff = if k == 0 || low > 0.0 { 0.5 } else { 0.25 };
                    } else {
                        low = fraction;
                        coeff = if k == 0 || hi < 1.0 { 0.5 } else { 0.75 };
                    }
                }
                if low < best_safe {
                    best_safe = low;
                    best_unsafe = hi;
                }
            }

            if stuck {
                log::debug!("motion query: {:?} shape {} is stuck", rid, j);
                safe = 0.0;
                unsafe_fraction = 0.0;
                best_shape = Some(j);
                break;
            }
            if best_safe < safe {
                safe = best_safe;
                unsafe_fraction = best_unsafe;
                best_shape = Some(j);
            }
        }

        let recovery = body_transform.translation.vector - params.from.translation.vector;
        if recovered || safe < 1.0 {
            if safe >= 1.0 {
                best_shape = None;
            }
            let offset = params.motion * unsafe_fraction;
            let mut rest_transform = body_transform;
            rest_transform.translation.vector += offset;
            let rest_aabb = Aabb::new(body_aabb.min + offset, body_aabb.max + offset);
            let candidates = self.cull_aabb_for_body(body, objects, &rest_aabb, params);

            let mut collector = RestCollector::new(motion_length.min(min_contact_depth), params.max_collisions);
            let local_shapes = best_shape.map_or_else(|| enabled.clone(), |j| vec![j]);
            for j in local_shapes {
                let Some((body_shape, body_xform)) = placed_at(shapes, body, j, &rest_transform) else {
                    continue;
                };
                for &(other, shape_index) in &candidates {
                    let Some((other_shape, other_xform)) = objects.bodies.get(other).and_then(|o| placed_shape(shapes, o.base(), shape_index)) else {
                        continue;
                    };
                    let object = ObjectRid::Body(other);
                    let mut collect = |a: Vec3, b: Vec3| collector.add(a, b, object, shape_index, j);
                    let callback: &mut ContactCallback<'_> = &mut collect;
                    solve_static(body_shape, &body_xform, other_shape, &other_xform, Some(callback), params.margin, 0.0);
                }
            }

            let collisions: Vec<MotionCollision> = collector
                .into_results()
                .into_iter()
                .filter_map(|r| {
                    let collider = r.object.as_body()?;
                    let other = objects.bodies.get(collider)?;
                    Some(MotionCollision {
                        position: r.contact,
                        normal: r.normal,
                        collider_velocity: velocity_at_world_point(other, &r.contact),
                        depth: r.len,
                        local_shape: r.local_shape,
                        collider_id: other.base().instance_id(),
                        collider,
                        collider_shape: r.shape,
                    })
                })
                .collect();
            if !collisions.is_empty() {
                let travel = params.motion * safe;
                return Ok(MotionResult {
                    travel: travel + recovery,
                    remainder: params.motion - travel,
                    collision_safe_fraction: safe,
                    collision_unsafe_fraction: unsafe_fraction,
                    collisions,
                });
            }
        }

        Ok(MotionResult::free(params.motion + recovery))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn contact(len: Real) -> (Vec3, Vec3) {
        (Vec3::zeros(), Vec3::new(0.0, len, 0.0))
    }

    #[test]
    fn test_rest_collector_keeps_deepest_first() {
        let mut keys: SlotMap<BodyRid, ()> = SlotMap::with_key();
        let object = ObjectRid::Body(keys.insert(()));
        let mut collector = RestCollector::new(0.01, 2);
        for len in [0.05, 0.2, 0.001, 0.1] {
            let (a, b) = contact(len);
            collector.add(a, b, object, 0, 0);
        }
        let results = collector.into_results();
        assert_eq!(results.len(), 2);
        assert_relative_eq!(results[0].len, 0.2, epsilon = 1e-6);
        assert_relative_eq!(results[1].len, 0.1, epsilon = 1e-6);
        assert_relative_eq!(results[0].normal.y, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_default_parameters_are_valid() {
        let params = MotionParameters::new(Transform::identity(), Vec3::new(1.0, 0.0, 0.0));
        assert!((1..=MAX_COLLISIONS).contains(&params.max_collisions));
        assert!(params.margin > 0.0);
    }
}
