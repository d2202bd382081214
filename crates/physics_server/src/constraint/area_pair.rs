//! Area overlap pairs
//!
//! These pairs never push on anything. `setup` runs the narrow phase and
//! notes whether the overlap state flipped; `pre_solve` applies the flip once
//! (attach the area's gravity override, queue a monitor event) and then drops
//! out of the solve loop. Destroying a pair that is still overlapping retracts
//! its side effects through the same calls as an exit.

use slotmap::SlotMap;

use super::{placed_shape, ConstraintRef, PairId, Solve, SolverContext};
use crate::collision::solver::{solve_convex_vs_shape, solve_static};
use crate::collision::support::{ConvexGeometry, ConvexSupport};
use crate::collision::Shape;
use crate::foundation::math::{translation, Transform, Vec3};
use crate::object::{BodyMode, CollisionObject, Objects, SoftBody};
use crate::rid::{AreaRid, BodyRid, ObjectRid, ShapeRid, SoftBodyRid};
use crate::space::SpaceQueues;

fn shapes_overlap(shapes: &SlotMap<ShapeRid, Shape>, a: &CollisionObject, shape_a: usize, b: &CollisionObject, shape_b: usize) -> bool {
    let (Some((sa, xa)), Some((sb, xb))) = (placed_shape(shapes, a, shape_a), placed_shape(shapes, b, shape_b)) else {
        return false;
    };
    solve_static(sa, &xa, sb, &xb, None, 0.0, 0.0)
}

/// Whether any node sphere of the soft body touches the placed shape
pub(crate) fn soft_body_overlaps(soft_body: &SoftBody, shape: &Shape, transform: &Transform) -> bool {
    let aabb = shape.aabb().transformed(transform);
    let radius = soft_body.collision_margin();
    let mut sink = |_: Vec3, _: Vec3| {};
    soft_body.nodes_in(&aabb).into_iter().any(|node| {
        let sphere = ConvexSupport::new(ConvexGeometry::Sphere(radius), translation(soft_body.node_position(node)), 0.0);
        solve_convex_vs_shape(&sphere, shape, transform, &mut sink, 0.0)
    })
}

/// A rigid body shape overlapping an area shape
#[derive(Debug)]
pub struct AreaPair {
    body: BodyRid,
    body_shape: usize,
    area: AreaRid,
    area_shape: usize,
    colliding: bool,
    process_collision: bool,
    has_space_override: bool,
    body_has_attached_area: bool,
}

impl AreaPair {
    /// Register the pair with both objects. Kinematic bodies are woken so the
    /// overlap is evaluated even if they never move.
    pub(crate) fn new(
        id: PairId,
        (body, body_shape): (BodyRid, usize),
        (area, area_shape): (AreaRid, usize),
        objects: &mut Objects,
        queues: &mut SpaceQueues,
    ) -> Self {
        if let Some(b) = objects.bodies.get_mut(body) {
            b.add_constraint(ConstraintRef::Pair(id), 0);
            if b.mode() == BodyMode::Kinematic {
                b.set_active(true, Some(queues));
            }
        }
        if let Some(a) = objects.areas.get_mut(area) {
            a.add_constraint(ConstraintRef::Pair(id));
        }
        Self {
            body,
            body_shape,
            area,
            area_shape,
            colliding: false,
            process_collision: false,
            has_space_override: false,
            body_has_attached_area: false,
        }
    }

    pub(crate) const fn body(&self) -> BodyRid {
        self.body
    }

    pub(crate) fn destroy(&mut self, id: PairId, objects: &mut Objects, queues: &mut SpaceQueues) {
        let Objects { bodies, areas, .. } = objects;
        if self.colliding {
            if self.body_has_attached_area {
                self.body_has_attached_area = false;
                if let Some(body) = bodies.get_mut(self.body) {
                    body.remove_area(self.area);
                }
            }
            if let (Some(area), Some(body)) = (areas.get_mut(self.area), bodies.get(self.body)) {
                if area.has_monitor_callback() {
                    let instance_id = body.base().instance_id();
                    area.remove_object_from_query(ObjectRid::Body(self.body), instance_id, self.body_shape, self.area_shape, queues);
                }
            }
            self.colliding = false;
        }
        if let Some(body) = bodies.get_mut(self.body) {
            body.remove_constraint(ConstraintRef::Pair(id));
        }
        if let Some(area) = areas.get_mut(self.area) {
            area.remove_constraint(ConstraintRef::Pair(id));
        }
    }
}

impl Solve for AreaPair {
    fn setup(&mut self, ctx: &mut SolverContext<'_>) -> bool {
        let (Some(body), Some(area)) = (ctx.objects.bodies.get(self.body), ctx.objects.areas.get(self.area)) else {
            return false;
        };
        let result = area.base().collides_with(body.base())
            && shapes_overlap(ctx.shapes, body.base(), self.body_shape, area.base(), self.area_shape);

        self.process_collision = false;
        self.has_space_override = false;
        if result != self.colliding {
            self.has_space_override = area.has_space_override();
            self.process_collision = self.has_space_override || self.body_has_attached_area || area.has_monitor_callback();
            self.colliding = result;
        }
        self.process_collision
    }

    fn pre_solve(&mut self, ctx: &mut SolverContext<'_>) -> bool {
        if !self.process_collision {
            return false;
        }
        let Objects { bodies, areas, .. } = &mut *ctx.objects;
        let (Some(body), Some(area)) = (bodies.get_mut(self.body), areas.get_mut(self.area)) else {
            return false;
        };
        let instance_id = body.base().instance_id();
        let object = ObjectRid::Body(self.body);
        if self.colliding {
            if self.has_space_override {
                self.body_has_attached_area = true;
                body.add_area(self.area);
            }
            if area.has_monitor_callback() {
                area.add_object_to_query(object, instance_id, self.body_shape, self.area_shape, ctx.queues);
            }
        } else {
            if self.body_has_attached_area {
                self.body_has_attached_area = false;
                body.remove_area(self.area);
            }
            if area.has_monitor_callback() {
                area.remove_object_from_query(object, instance_id, self.body_shape, self.area_shape, ctx.queues);
            }
        }
        false
    }

    fn solve(&mut self, _ctx: &mut SolverContext<'_>) {}
}

/// Two overlapping area shapes. Each side reports the other only when it has
/// an area monitor callback and the other side is monitorable.
#[derive(Debug)]
pub struct Area2Pair {
    a: AreaRid,
    shape_a: usize,
    b: AreaRid,
    shape_b: usize,
    colliding_a: bool,
    colliding_b: bool,
    process_a: bool,
    process_b: bool,
}

impl Area2Pair {
    pub(crate) fn new(id: PairId, (a, shape_a): (AreaRid, usize), (b, shape_b): (AreaRid, usize), objects: &mut Objects) -> Self {
        for rid in [a, b] {
            if let Some(area) = objects.areas.get_mut(rid) {
                area.add_constraint(ConstraintRef::Pair(id));
            }
        }
        Self { a, shape_a, b, shape_b, colliding_a: false, colliding_b: false, process_a: false, process_b: false }
    }

    pub(crate) fn destroy(&mut self, id: PairId, objects: &mut Objects, queues: &mut SpaceQueues) {
        if let Some([a, b]) = objects.areas.get_disjoint_mut([self.a, self.b]) {
            if self.colliding_a && a.has_area_monitor_callback() {
                let instance_id = b.base().instance_id();
                a.remove_area_from_query(self.b, instance_id, self.shape_b, self.shape_a, queues);
            }
            if self.colliding_b && b.has_area_monitor_callback() {
                let instance_id = a.base().instance_id();
                b.remove_area_from_query(self.a, instance_id, self.shape_a, self.shape_b, queues);
            }
        }
        self.colliding_a = false;
        self.colliding_b = false;
        for rid in [self.a, self.b] {
            if let Some(area) = objects.areas.get_mut(rid) {
                area.remove_constraint(ConstraintRef::Pair(id));
            }
        }
    }
}

impl Solve for Area2Pair {
    fn setup(&mut self, ctx: &mut SolverContext<'_>) -> bool {
        let (Some(a), Some(b)) = (ctx.objects.areas.get(self.a), ctx.objects.areas.get(self.b)) else {
            return false;
        };
        let mut result_a = a.base().collides_with(b.base());
        let mut result_b = b.base().collides_with(a.base());
        if (result_a || result_b) && !shapes_overlap(ctx.shapes, a.base(), self.shape_a, b.base(), self.shape_b) {
            result_a = false;
            result_b = false;
        }

        self.process_a = false;
        if result_a != self.colliding_a {
            self.process_a = a.has_area_monitor_callback() && b.is_monitorable();
            self.colliding_a = result_a;
        }
        self.process_b = false;
        if result_b != self.colliding_b {
            self.process_b = b.has_area_monitor_callback() && a.is_monitorable();
            self.colliding_b = result_b;
        }
        self.process_a || self.process_b
    }

    fn pre_solve(&mut self, ctx: &mut SolverContext<'_>) -> bool {
        let Some([a, b]) = ctx.objects.areas.get_disjoint_mut([self.a, self.b]) else {
            return false;
        };
        if self.process_a {
            let instance_id = b.base().instance_id();
            if self.colliding_a {
                a.add_area_to_query(self.b, instance_id, self.shape_b, self.shape_a, ctx.queues);
            } else {
                a.remove_area_from_query(self.b, instance_id, self.shape_b, self.shape_a, ctx.queues);
            }
        }
        if self.process_b {
            let instance_id = a.base().instance_id();
            if self.colliding_b {
                b.add_area_to_query(self.a, instance_id, self.shape_a, self.shape_b, ctx.queues);
            } else {
                b.remove_area_from_query(self.a, instance_id, self.shape_a, self.shape_b, ctx.queues);
            }
        }
        false
    }

    fn solve(&mut self, _ctx: &mut SolverContext<'_>) {}
}

/// A soft body overlapping an area shape
#[derive(Debug)]
pub struct AreaSoftBodyPair {
    soft_body: SoftBodyRid,
    area: AreaRid,
    area_shape: usize,
    colliding: bool,
    process_collision: bool,
    has_space_override: bool,
    soft_body_has_attached_area: bool,
}

impl AreaSoftBodyPair {
    pub(crate) fn new(id: PairId, soft_body: SoftBodyRid, (area, area_shape): (AreaRid, usize), objects: &mut Objects) -> Self {
        if let Some(s) = objects.soft_bodies.get_mut(soft_body) {
            s.add_constraint(ConstraintRef::Pair(id));
        }
        if let Some(a) = objects.areas.get_mut(area) {
            a.add_constraint(ConstraintRef::Pair(id));
        }
        Self {
            soft_body,
            area,
            area_shape,
            colliding: false,
            process_collision: false,
            has_space_override: false,
            soft_body_has_attached_area: false,
        }
    }

    pub(crate) const fn soft_body(&self) -> SoftBodyRid {
        self.soft_body
    }

    pub(crate) fn destroy(&mut self, id: PairId, objects: &mut Objects, queues: &mut SpaceQueues) {
        let Objects { soft_bodies, areas, .. } = objects;
        if self.colliding {
            if self.soft_body_has_attached_area {
                self.soft_body_has_attached_area = false;
                if let Some(s) = soft_bodies.get_mut(self.soft_body) {
                    s.remove_area(self.area);
                }
            }
            if let (Some(area), Some(s)) = (areas.get_mut(self.area), soft_bodies.get(self.soft_body)) {
                if area.has_monitor_callback() {
                    let instance_id = s.base().instance_id();
                    area.remove_object_from_query(ObjectRid::SoftBody(self.soft_body), instance_id, 0, self.area_shape, queues);
                }
            }
            self.colliding = false;
        }
        if let Some(s) = soft_bodies.get_mut(self.soft_body) {
            s.remove_constraint(ConstraintRef::Pair(id));
        }
        if let Some(area) = areas.get_mut(self.area) {
            area.remove_constraint(ConstraintRef::Pair(id));
        }
    }
}

impl Solve for AreaSoftBodyPair {
    fn setup(&mut self, ctx: &mut SolverContext<'_>) -> bool {
        let (Some(soft_body), Some(area)) = (ctx.objects.soft_bodies.get(self.soft_body), ctx.objects.areas.get(self.area)) else {
            return false;
        };
        let result = area.base().collides_with(soft_body.base())
            && placed_shape(ctx.shapes, area.base(), self.area_shape)
                .is_some_and(|(shape, transform)| soft_body_overlaps(soft_body, shape, &transform));

        self.process_collision = false;
        self.has_space_override = false;
        if result != self.colliding {
            self.has_space_override = area.has_space_override();
            self.process_collision = self.has_space_override || self.soft_body_has_attached_area || area.has_monitor_callback();
            self.colliding = result;
        }
        self.process_collision
    }

    fn pre_solve(&mut self, ctx: &mut SolverContext<'_>) -> bool {
        if !self.process_collision {
            return false;
        }
        let Objects { soft_bodies, areas, .. } = &mut *ctx.objects;
        let (Some(soft_body), Some(area)) = (soft_bodies.get_mut(self.soft_body), areas.get_mut(self.area)) else {
            return false;
        };
        let instance_id = soft_body.base().instance_id();
        let object = ObjectRid::SoftBody(self.soft_body);
        if self.colliding {
            if self.has_space_override {
                self.soft_body_has_attached_area = true;
                soft_body.add_area(self.area);
            }
            if area.has_monitor_callback() {
                area.add_object_to_query(object, instance_id, 0, self.area_shape, ctx.queues);
            }
        } else {
            if self.soft_body_has_attached_area {
                self.soft_body_has_attached_area = false;
                soft_body.remove_area(self.area);
            }
            if area.has_monitor_callback() {
                area.remove_object_from_query(object, instance_id, 0, self.area_shape, ctx.queues);
            }
        }
        false
    }

    fn solve(&mut self, _ctx: &mut SolverContext<'_>) {}
}
