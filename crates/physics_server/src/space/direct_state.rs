//! Read-only spatial queries against a space
//!
//! GEA 13.3.7 ("Collision Queries"): point, ray and shape casts run over the
//! broadphase candidates and then the narrow phase. A [`DirectSpaceState`]
//! borrows the space, its objects and the shape table, so nothing can mutate
//! the world while a query runs.

use std::collections::BTreeSet;

use slotmap::SlotMap;

use super::motion::{velocity_at_world_point, RestCollector, MIN_CONTACT_DEPTH_FACTOR};
use super::Space;
use crate::broadphase::{BroadPhase, INTERSECTION_QUERY_MAX};
use crate::collision::solver::ContactCallback;
use crate::collision::{solve_distance, solve_static, ContactBuffer, Shape};
use crate::constraint::placed_shape;
use crate::error::{PhysicsError, PhysicsResult};
use crate::foundation::math::{xform, xform_inv, Real, Transform, Vec3, CMP_EPSILON};
use crate::object::{CollisionObject, Objects};
use crate::rid::{ObjectRid, ShapeRid};

/// Filter shared by every query
#[derive(Debug, Clone)]
pub struct QueryParameters {
    /// Only objects whose layer intersects this mask are considered
    pub collision_mask: u32,
    /// Consider bodies and soft bodies
    pub collide_with_bodies: bool,
    /// Consider areas
    pub collide_with_areas: bool,
    /// Objects skipped by the query
    pub exclude: BTreeSet<ObjectRid>,
}

impl Default for QueryParameters {
    fn default() -> Self {
        Self { collision_mask: u32::MAX, collide_with_bodies: true, collide_with_areas: false, exclude: BTreeSet::new() }
    }
}

impl QueryParameters {
    fn accepts(&self, rid: ObjectRid, object: &CollisionObject) -> bool {
        if object.collision_layer() & self.collision_mask == 0 || self.exclude.contains(&rid) {
            return false;
        }
        match rid {
            ObjectRid::Area(_) => self.collide_with_areas,
            ObjectRid::Body(_) | ObjectRid::SoftBody(_) => self.collide_with_bodies,
        }
    }
}

/// An object shape found by a point or shape query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShapeResult {
    /// The object
    pub rid: ObjectRid,
    /// Its instance id
    pub collider_id: u64,
    /// Index of the shape hit
    pub shape: usize,
}

/// Closest hit of a ray query
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayResult {
    /// Hit point
    pub position: Vec3,
    /// Surface normal at the hit point
    pub normal: Vec3,
    /// The object hit
    pub rid: ObjectRid,
    /// Its instance id
    pub collider_id: u64,
    /// Index of the shape hit
    pub shape: usize,
}

/// Deepest contact of a shape placed in the space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapeRestInfo {
    /// Contact point on the collider
    pub point: Vec3,
    /// Contact normal, pointing away from the collider
    pub normal: Vec3,
    /// The collider
    pub rid: ObjectRid,
    /// Its instance id
    pub collider_id: u64,
    /// Index of the collider's shape
    pub shape: usize,
    /// Velocity of the collider at the contact point
    pub linear_velocity: Vec3,
}

/// Safe and unsafe fractions of a shape cast
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CastMotion {
    /// Largest fraction of the motion free of collisions
    pub safe: Real,
    /// Smallest fraction found to collide
    pub unsafe_fraction: Real,
    /// Closest approach at the safe fraction, when something was hit
    pub info: Option<ShapeRestInfo>,
}

/// Query view over one space
#[derive(Clone, Copy)]
pub struct DirectSpaceState<'a> {
    space: &'a Space,
    objects: &'a Objects,
    shapes: &'a SlotMap<ShapeRid, Shape>,
}

impl std::fmt::Debug for DirectSpaceState<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectSpaceState").field("space", &self.space.rid()).finish()
    }
}

impl<'a> DirectSpaceState<'a> {
    pub(crate) fn new(space: &'a Space, objects: &'a Objects, shapes: &'a SlotMap<ShapeRid, Shape>) -> PhysicsResult<Self> {
        space.ensure_unlocked()?;
        Ok(Self { space, objects, shapes })
    }

    fn shape(&self, rid: ShapeRid) -> PhysicsResult<&'a Shape> {
        self.shapes.get(rid).ok_or(PhysicsError::InvalidHandle { kind: "shape", rid: rid.into() })
    }

    /// Candidates accepted by the filter, with the placed collider shape.
    /// Soft bodies have no shapes and are skipped.
    fn placed_candidates(&self, candidates: Vec<(ObjectRid, usize)>, filter: &QueryParameters) -> Vec<(ObjectRid, &'a CollisionObject, usize, &'a Shape, Transform)> {
        candidates
            .into_iter()
            .filter_map(|(rid, index)| {
                if matches!(rid, ObjectRid::SoftBody(_)) {
                    return None;
                }
                let object = self.objects.base(rid)?;
                if !filter.accepts(rid, object) {
                    return None;
                }
                let (shape, transform) = placed_shape(self.shapes, object, index)?;
                Some((rid, object, index, shape, transform))
            })
            .collect()
    }

    /// Object shapes containing `point`
    pub fn intersect_point(&self, point: &Vec3, max_results: usize, filter: &QueryParameters) -> Vec<ShapeResult> {
        let candidates = self.space.broadphase.cull_point(point, INTERSECTION_QUERY_MAX);
        self.placed_candidates(candidates, filter)
            .into_iter()
            .filter(|(_, _, _, shape, transform)| shape.intersect_point(&xform_inv(transform, point)))
            .take(max_results)
            .map(|(rid, object, shape, ..)| ShapeResult { rid, collider_id: object.instance_id(), shape })
            .collect()
    }

    /// Closest hit along the segment `from -> to`. With `pick_ray` objects that
    /// are not ray pickable are skipped.
    pub fn intersect_ray(&self, from: &Vec3, to: &Vec3, filter: &QueryParameters, pick_ray: bool) -> Option<RayResult> {
        let direction = (to - from).try_normalize(CMP_EPSILON)?;
        let candidates = self.space.broadphase.cull_segment(from, to, INTERSECTION_QUERY_MAX);

        let mut best: Option<(Real, RayResult)> = None;
        let mut consider = |position: Vec3, normal: Vec3, rid: ObjectRid, collider_id: u64, shape: usize| {
            let distance = direction.dot(&position);
            if best.as_ref().map_or(true, |(d, _)| distance < *d) {
                best = Some((distance, RayResult { position, normal, rid, collider_id, shape }));
            }
        };

        for (rid, index) in candidates {
            let Some(object) = self.objects.base(rid) else {
                continue;
            };
            if !filter.accepts(rid, object) || (pick_ray && !object.is_ray_pickable()) {
                continue;
            }
            if let ObjectRid::SoftBody(s) = rid {
                if let Some((point, normal)) = self.objects.soft_bodies.get(s).and_then(|sb| sb.intersect_segment(from, to)) {
                    consider(point, normal, rid, object.instance_id(), 0);
                }
                continue;
            }
            let Some((shape, transform)) = placed_shape(self.shapes, object, index) else {
                continue;
            };
            let local_from = xform_inv(&transform, from);
            let local_to = xform_inv(&transform, to);
            if let Some((point, normal)) = shape.intersect_segment(&local_from, &local_to) {
                let normal = (transform.rotation * normal).try_normalize(CMP_EPSILON).unwrap_or(normal);
                consider(xform(&transform, &point), normal, rid, object.instance_id(), index);
            }
        }
        best.map(|(_, hit)| hit)
    }

    /// Object shapes overlapping `shape` placed at `transform`
    pub fn intersect_shape(&self, shape: ShapeRid, transform: &Transform, margin: Real, max_results: usize, filter: &QueryParameters) -> PhysicsResult<Vec<ShapeResult>> {
        let query = self.shape(shape)?;
        let aabb = query.aabb().transformed(transform);
        let candidates = self.space.broadphase.cull_aabb(&aabb, INTERSECTION_QUERY_MAX);
        Ok(self
            .placed_candidates(candidates, filter)
            .into_iter()
            .filter(|(_, _, _, other, other_xform)| solve_static(query, transform, other, other_xform, None, margin, 0.0))
            .take(max_results)
            .map(|(rid, object, index, ..)| ShapeResult { rid, collider_id: object.instance_id(), shape: index })
            .collect())
    }

    /// Sweep `shape` from `transform` along `motion`. Colliders the shape
    /// starts inside of are ignored.
    pub fn cast_motion(&self, shape: ShapeRid, transform: &Transform, motion: &Vec3, margin: Real, filter: &QueryParameters) -> PhysicsResult<CastMotion> {
        let query = self.shape(shape)?;
        let aabb = query.aabb().transformed(transform).swept(motion).grow(margin);
        let candidates = self.space.broadphase.cull_aabb(&aabb, INTERSECTION_QUERY_MAX);

        let mut best_safe: Real = 1.0;
        let mut best_unsafe: Real = 1.0;
        let mut best_first = true;
        let mut closest: Option<(Vec3, Vec3)> = None;
        let mut info = None;

        for (rid, object, index, other, other_xform) in self.placed_candidates(candidates, filter) {
            if solve_distance(query, transform, motion, other, &other_xform).is_some() {
                continue;
            }
            let Some(mut points) = solve_distance(query, transform, &Vec3::zeros(), other, &other_xform) else {
                continue;
            };

            let mut low: Real = 0.0;
            let mut hi: Real = 1.0;
            let mut coeff: Real = 0.5;
            for k in 0..8 {
                let fraction = low + (hi - low) * coeff;
                match solve_distance(query, transform, &(motion * fraction), other, &other_xform) {
                    None => {
                        hi = fraction;
                        coeff = if k == 0 || low > 0.0 { 0.5 } else { 0.25 };
                    }
                    Some(found) => {
                        points = found;
                        low = fraction;
                        coeff = if k == 0 || hi < 1.0 { 0.5 } else { 0.75 };
                    }
                }
            }

            if low < best_safe {
                best_first = true;
                best_safe = low;
                best_unsafe = hi;
            }
            let (a, b) = points;
            let closer = closest.map_or(true, |(ca, cb)| (a - b).norm_squared() < (ca - cb).norm_squared());
            if best_first || (closer && low <= best_safe) {
                closest = Some(points);
                best_first = false;
                let linear_velocity = rid
                    .as_body()
                    .and_then(|body| self.objects.bodies.get(body))
                    .map_or_else(Vec3::zeros, |body| velocity_at_world_point(body, &b));
                info = Some(ShapeRestInfo {
                    point: b,
                    normal: (a - b).try_normalize(CMP_EPSILON).unwrap_or_else(Vec3::zeros),
                    rid,
                    collider_id: object.instance_id(),
                    shape: index,
                    linear_velocity,
                });
            }
        }
        Ok(CastMotion { safe: best_safe, unsafe_fraction: best_unsafe, info })
    }

    /// Contact pairs `(point_on_shape, point_on_collider)` of `shape` placed at
    /// `transform`, at most `max_results` of them
    pub fn collide_shape(&self, shape: ShapeRid, transform: &Transform, margin: Real, max_results: usize, filter: &QueryParameters) -> PhysicsResult<Vec<(Vec3, Vec3)>> {
        let query = self.shape(shape)?;
        let aabb = query.aabb().transformed(transform).grow(margin);
        let candidates = self.space.broadphase.cull_aabb(&aabb, INTERSECTION_QUERY_MAX);
        let mut buffer = ContactBuffer::new(max_results);
        for (_, _, _, other, other_xform) in self.placed_candidates(candidates, filter) {
            let mut collect = |a: Vec3, b: Vec3| buffer.push(a, b);
            let callback: &mut ContactCallback<'_> = &mut collect;
            solve_static(query, transform, other, &other_xform, Some(callback), margin, 0.0);
        }
        Ok(buffer.into_pairs())
    }

    /// Deepest contact of `shape` placed at `transform`
    pub fn rest_info(&self, shape: ShapeRid, transform: &Transform, margin: Real, filter: &QueryParameters) -> PhysicsResult<Option<ShapeRestInfo>> {
        let query = self.shape(shape)?;
        let aabb = query.aabb().transformed(transform).grow(margin);
        let candidates = self.space.broadphase.cull_aabb(&aabb, INTERSECTION_QUERY_MAX);
        let mut collector = RestCollector::new(margin * MIN_CONTACT_DEPTH_FACTOR, 1);
        for (rid, _, index, other, other_xform) in self.placed_candidates(candidates, filter) {
            let mut collect = |a: Vec3, b: Vec3| collector.add(a, b, rid, index, 0);
            let callback: &mut ContactCallback<'_> = &mut collect;
            solve_static(query, transform, other, &other_xform, Some(callback), margin, 0.0);
        }
        Ok(collector.into_results().first().and_then(|best| {
            let object = self.objects.base(best.object)?;
            let linear_velocity = best
                .object
                .as_body()
                .and_then(|body| self.objects.bodies.get(body))
                .map_or_else(Vec3::zeros, |body| velocity_at_world_point(body, &best.contact));
            Some(ShapeRestInfo {
                point: best.contact,
                normal: best.normal,
                rid: best.object,
                collider_id: object.instance_id(),
                shape: best.shape,
                linear_velocity,
            })
        }))
    }

    /// Closest point to `point` on the surface or inside of any enabled shape
    /// of `object`. Objects without enabled shapes answer with their origin.
    pub fn closest_point_to_object_volume(&self, object: ObjectRid, point: &Vec3) -> PhysicsResult<Vec3> {
        let base = self.objects.base(object).ok_or(PhysicsError::InvalidHandle { kind: "collision object", rid: object.into() })?;
        crate::ensure!(
            base.space() == Some(self.space.rid()),
            PhysicsError::precondition("object does not belong to the queried space")
        );
        let closest = (0..base.shape_count())
            .filter_map(|i| placed_shape(self.shapes, base, i))
            .map(|(shape, transform)| xform(&transform, &shape.closest_point_to(&xform_inv(&transform, point))))
            .min_by(|a, b| (a - point).norm_squared().total_cmp(&(b - point).norm_squared()));
        Ok(closest.unwrap_or(base.transform().translation.vector))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::ShapeType;
    use crate::foundation::math::translation;
    use crate::object::{Area, Body, BodyMode};
    use crate::rid::SpaceRid;
    use crate::space::SpaceParams;
    use approx::assert_relative_eq;

    struct World {
        space: Space,
        objects: Objects,
        shapes: SlotMap<ShapeRid, Shape>,
        sphere: ShapeRid,
    }

    impl World {
        fn new() -> Self {
            let mut keys: SlotMap<SpaceRid, ()> = SlotMap::with_key();
            let mut shapes = SlotMap::with_key();
            let sphere = shapes.insert(Shape::new(ShapeType::Sphere));
            Self { space: Space::new(keys.insert(()), SpaceParams::default()), objects: Objects::default(), shapes, sphere }
        }

        fn static_sphere(&mut self, at: Vec3) -> ObjectRid {
            let rid = self.objects.bodies.insert_with_key(Body::new);
            let body = &mut self.objects.bodies[rid];
            body.set_mode(BodyMode::Static, None);
            body.base_mut().set_transform(translation(at));
            body.base_mut().push_shape(self.sphere, Transform::identity(), false);
            self.space.add_object(ObjectRid::Body(rid), &mut self.objects, &self.shapes);
            ObjectRid::Body(rid)
        }

        fn state(&self) -> DirectSpaceState<'_> {
            DirectSpaceState::new(&self.space, &self.objects, &self.shapes).unwrap()
        }
    }

    #[test]
    fn test_ray_hits_closest_sphere() {
        let mut world = World::new();
        let far = world.static_sphere(Vec3::new(5.0, 0.0, 0.0));
        let near = world.static_sphere(Vec3::new(2.0, 0.0, 0.0));
        let state = world.state();
        let hit = state.intersect_ray(&Vec3::zeros(), &Vec3::new(10.0, 0.0, 0.0), &QueryParameters::default(), false).unwrap();
        assert_eq!(hit.rid, near);
        assert_ne!(hit.rid, far);
        assert_relative_eq!(hit.position.x, 1.5, epsilon = 1e-4);
        assert_relative_eq!(hit.normal.x, -1.0, epsilon = 1e-4);
    }

    #[test]
    fn test_point_query_respects_filter() {
        let mut world = World::new();
        let body = world.static_sphere(Vec3::zeros());
        let area = world.objects.areas.insert_with_key(Area::new);
        world.objects.areas[area].base_mut().push_shape(world.sphere, Transform::identity(), false);
        world.space.add_object(ObjectRid::Area(area), &mut world.objects, &world.shapes);

        let state = world.state();
        let hits = state.intersect_point(&Vec3::new(0.1, 0.0, 0.0), 8, &QueryParameters::default());
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].rid, body);

        let with_areas = QueryParameters { collide_with_areas: true, ..QueryParameters::default() };
        assert_eq!(state.intersect_point(&Vec3::new(0.1, 0.0, 0.0), 8, &with_areas).len(), 2);

        let mut excluding = QueryParameters::default();
        excluding.exclude.insert(body);
        assert!(state.intersect_point(&Vec3::new(0.1, 0.0, 0.0), 8, &excluding).is_empty());
    }

    #[test]
    fn test_cast_motion_stops_before_sphere() {
        let mut world = World::new();
        world.static_sphere(Vec3::new(3.0, 0.0, 0.0));
        let sphere = world.sphere;
        let state = world.state();
        let cast = state.cast_motion(sphere, &Transform::identity(), &Vec3::new(4.0, 0.0, 0.0), 0.0, &QueryParameters::default()).unwrap();
        // spheres touch after travelling 2 units
        assert!(cast.safe <= 0.5 + 1e-3);
        assert!(cast.unsafe_fraction >= 0.5 - 1e-3);
        assert!(cast.unsafe_fraction - cast.safe < 0.01);
        assert!(cast.info.is_some());
    }

    #[test]
    fn test_shape_overlap_queries() {
        let mut world = World::new();
        let body = world.static_sphere(Vec3::zeros());
        world.static_sphere(Vec3::new(10.0, 0.0, 0.0));
        let sphere = world.sphere;
        let state = world.state();
        let touching = translation(Vec3::new(0.8, 0.0, 0.0));

        let hits = state.intersect_shape(sphere, &touching, 0.0, 8, &QueryParameters::default()).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].rid, body);

        let pairs = state.collide_shape(sphere, &touching, 0.0, 4, &QueryParameters::default()).unwrap();
        assert!(!pairs.is_empty() && pairs.len() <= 4);
        assert!(state.collide_shape(sphere, &translation(Vec3::new(0.0, 5.0, 0.0)), 0.0, 4, &QueryParameters::default()).unwrap().is_empty());
    }

    #[test]
    fn test_rest_info_reports_deepest_contact() {
        let mut world = World::new();
        let body = world.static_sphere(Vec3::zeros());
        let sphere = world.sphere;
        let state = world.state();
        let info = state.rest_info(sphere, &translation(Vec3::new(0.0, 0.8, 0.0)), 0.01, &QueryParameters::default()).unwrap().unwrap();
        assert_eq!(info.rid, body);
        assert!(info.normal.y > 0.9);
        assert!(state.rest_info(sphere, &translation(Vec3::new(0.0, 3.0, 0.0)), 0.01, &QueryParameters::default()).unwrap().is_none());
    }

    #[test]
    fn test_closest_point_to_volume() {
        let mut world = World::new();
        let body = world.static_sphere(Vec3::zeros());
        let state = world.state();
        let p = state.closest_point_to_object_volume(body, &Vec3::new(0.0, 2.0, 0.0)).unwrap();
        assert_relative_eq!(p.y, 0.5, epsilon = 1e-4);
    }
}
