//! Rigid body against soft body contacts
//!
//! Every soft body node collides as a sphere of the soft body's collision
//! margin. Contacts are keyed by node, one per node, and impulses on the soft
//! side go straight into that node's velocity.

use std::f32::consts::PI;

use super::{placed_shape, ConstraintRef, PairId, Solve, SolverContext};
use crate::collision::solver::solve_convex_vs_shape;
use crate::collision::support::{ConvexGeometry, ConvexSupport};
use crate::foundation::math::{translation, xform, xform_inv, Mat3, Real, Vec3, CMP_EPSILON};
use crate::object::body::ReportedContact;
use crate::object::{BodyMode, Objects};
use crate::rid::{BodyRid, ObjectRid, SoftBodyRid};

const MIN_VELOCITY: Real = 0.0001;
const MAX_BIAS_ROTATION: Real = PI / 8.0;

#[derive(Debug, Clone, Default)]
struct Contact {
    node: usize,
    normal: Vec3,
    /// Body-space point on the body
    local_a: Vec3,
    /// Offset of the contact from its node
    local_b: Vec3,
    ra: Vec3,
    acc_normal_impulse: Real,
    acc_bias_impulse: Real,
    acc_bias_impulse_center_of_mass: Real,
    acc_tangent_impulse: Vec3,
    acc_impulse: Vec3,
    mass_normal: Real,
    bias: Real,
    bounce: Real,
    active: bool,
    used: bool,
}

/// One body shape whose bounds overlap a soft body
#[derive(Debug)]
pub struct BodySoftBodyPair {
    body: BodyRid,
    body_shape: usize,
    soft_body: SoftBodyRid,
    contacts: Vec<Contact>,
    collided: bool,
    body_collides: bool,
    soft_body_collides: bool,
    report_contacts_only: bool,
}

impl BodySoftBodyPair {
    pub(crate) fn new(id: PairId, (body, body_shape): (BodyRid, usize), soft_body: SoftBodyRid, objects: &mut Objects) -> Self {
        if let Some(b) = objects.bodies.get_mut(body) {
            b.add_constraint(ConstraintRef::Pair(id), 0);
        }
        if let Some(s) = objects.soft_bodies.get_mut(soft_body) {
            s.add_constraint(ConstraintRef::Pair(id));
        }
        Self {
            body,
            body_shape,
            soft_body,
            contacts: Vec::new(),
            collided: false,
            body_collides: false,
            soft_body_collides: false,
            report_contacts_only: false,
        }
    }

    pub(crate) const fn body(&self) -> BodyRid {
        self.body
    }

    pub(crate) const fn soft_body(&self) -> SoftBodyRid {
        self.soft_body
    }

    /// Number of node contacts
    pub(crate) fn contact_count(&self) -> usize {
        self.contacts.len()
    }

    pub(crate) fn destroy(&mut self, id: PairId, objects: &mut Objects) {
        if let Some(b) = objects.bodies.get_mut(self.body) {
            b.remove_constraint(ConstraintRef::Pair(id));
        }
        if let Some(s) = objects.soft_bodies.get_mut(self.soft_body) {
            s.remove_constraint(ConstraintRef::Pair(id));
        }
    }

    fn contact_added(&mut self, point_a: Vec3, point_b: Vec3, node: usize, local_a: Vec3, node_position: Vec3, recycle_radius: Real) {
        let local_b = point_b - node_position;
        let mut contact = Contact {
            node,
            normal: (point_a - point_b).try_normalize(CMP_EPSILON).unwrap_or_else(Vec3::zeros),
            local_a,
            local_b,
            used: true,
            ..Contact::default()
        };
        let radius2 = recycle_radius * recycle_radius;
        if let Some(existing) = self.contacts.iter_mut().find(|c| c.node == node) {
            if (existing.local_a - local_a).norm_squared() < radius2 && (existing.local_b - local_b).norm_squared() < radius2 {
                contact.acc_normal_impulse = existing.acc_normal_impulse;
                contact.acc_bias_impulse = existing.acc_bias_impulse;
                contact.acc_bias_impulse_center_of_mass = existing.acc_bias_impulse_center_of_mass;
                contact.acc_tangent_impulse = existing.acc_tangent_impulse;
            }
            *existing = contact;
            return;
        }
        self.contacts.push(contact);
    }
}

impl Solve for BodySoftBodyPair {
    fn setup(&mut self, ctx: &mut SolverContext<'_>) -> bool {
        let (Some(body), Some(soft_body)) = (ctx.objects.bodies.get(self.body), ctx.objects.soft_bodies.get(self.soft_body)) else {
            self.collided = false;
            return false;
        };
        if !body.base().interacts_with(soft_body.base())
            || body.has_exception(soft_body.base().rid())
            || soft_body.has_exception(body.base().rid())
        {
            self.collided = false;
            return false;
        }

        self.body_collides = body.mode() > BodyMode::Kinematic && body.base().collides_with(soft_body.base());
        self.soft_body_collides = soft_body.base().collides_with(body.base());
        self.report_contacts_only = false;
        if !self.body_collides && !self.soft_body_collides {
            if body.max_contacts_reported() > 0 {
                self.report_contacts_only = true;
            } else {
                self.collided = false;
                return false;
            }
        }

        let body_xform = *body.base().transform();
        let max_separation = ctx.params.contact_max_separation;
        let max_separation2 = max_separation * max_separation;
        self.contacts.retain_mut(|c| {
            if !c.used {
                return false;
            }
            c.used = false;
            let global_a = xform(&body_xform, &c.local_a);
            let global_b = soft_body.node_position(c.node) + c.local_b;
            let depth = (global_a - global_b).dot(&c.normal);
            depth >= -max_separation && (global_b + c.normal * depth - global_a).norm_squared() <= max_separation2
        });

        let Some((shape, shape_xform)) = placed_shape(ctx.shapes, body.base(), self.body_shape) else {
            self.collided = false;
            return false;
        };
        let radius = soft_body.collision_margin();
        let aabb = shape.aabb().transformed(&shape_xform).grow(radius);
        let recycle_radius = ctx.params.contact_recycle_radius;

        self.collided = false;
        for node in soft_body.nodes_in(&aabb) {
            let position = soft_body.node_position(node);
            let sphere = ConvexSupport::new(ConvexGeometry::Sphere(radius), translation(position), 0.0);
            let mut points = Vec::new();
            let mut collect = |sphere_point: Vec3, shape_point: Vec3| points.push((shape_point, sphere_point));
            if solve_convex_vs_shape(&sphere, shape, &shape_xform, &mut collect, 0.0) {
                self.collided = true;
                for (point_a, point_b) in points {
                    self.contact_added(point_a, point_b, node, xform_inv(&body_xform, &point_a), position, recycle_radius);
                }
            }
        }
        self.collided
    }

    fn pre_solve(&mut self, ctx: &mut SolverContext<'_>) -> bool {
        if !self.collided {
            return false;
        }
        let Objects { bodies, soft_bodies, .. } = &mut *ctx.objects;
        let (Some(body), Some(soft_body)) = (bodies.get_mut(self.body), soft_bodies.get_mut(self.soft_body)) else {
            return false;
        };

        let custom_bias = placed_shape(ctx.shapes, body.base(), self.body_shape).map_or(0.0, |(s, _)| s.custom_bias());
        let bias = if custom_bias == 0.0 { ctx.params.contact_default_bias } else { custom_bias };
        let max_penetration = ctx.params.contact_max_allowed_penetration;
        let inv_dt = 1.0 / ctx.step;

        let body_xform = *body.base().transform();
        let inv_inertia = if self.body_collides { *body.inv_inertia_tensor() } else { Mat3::zeros() };
        let body_inv_mass = if self.body_collides { body.inv_mass() } else { 0.0 };

        let mut do_process = false;
        for c in &mut self.contacts {
            c.active = false;
            let node_inv_mass = if self.soft_body_collides { soft_body.node_inv_mass(c.node) } else { 0.0 };
            if node_inv_mass == 0.0 && body_inv_mass == 0.0 {
                continue;
            }
            let global_a = xform(&body_xform, &c.local_a);
            let global_b = soft_body.node_position(c.node) + c.local_b;
            let depth = (global_a - global_b).dot(&c.normal);
            if depth <= 0.0 {
                continue;
            }
            c.active = true;
            do_process = true;
            c.ra = global_a - body_xform.translation.vector - body.center_of_mass();

            if body.can_report_contacts() {
                let velocity = body.angular_velocity().cross(&c.ra) + body.linear_velocity();
                body.add_contact(ReportedContact {
                    local_position: global_a,
                    local_normal: -c.normal,
                    depth,
                    local_shape: self.body_shape,
                    local_velocity_at_position: velocity,
                    collider_position: global_b,
                    collider_shape: 0,
                    collider_instance_id: soft_body.base().instance_id(),
                    collider: ObjectRid::SoftBody(self.soft_body),
                    collider_velocity_at_position: soft_body.node_velocity(c.node),
                    impulse: c.acc_impulse,
                });
            }

            if self.report_contacts_only {
                self.collided = false;
                continue;
            }

            let inertia_a = inv_inertia * c.ra.cross(&c.normal);
            let k_normal = body_inv_mass + node_inv_mass + c.normal.dot(&inertia_a.cross(&c.ra));
            c.mass_normal = if k_normal > CMP_EPSILON { 1.0 / k_normal } else { 0.0 };
            c.bias = -bias * inv_dt * (max_penetration - depth).min(0.0);

            let j = c.normal * c.acc_normal_impulse + c.acc_tangent_impulse;
            if self.body_collides {
                body.apply_impulse(&-j, &(c.ra + body.center_of_mass()));
            }
            if self.soft_body_collides {
                soft_body.apply_node_impulse(c.node, &j);
            }
            c.acc_impulse -= j;

            c.bounce = body.bounce();
            if c.bounce != 0.0 {
                let dv = soft_body.node_velocity(c.node) - body.linear_velocity() - body.angular_velocity().cross(&c.ra);
                c.bounce *= dv.dot(&c.normal);
            }
        }
        do_process
    }

    fn solve(&mut self, ctx: &mut SolverContext<'_>) {
        if !self.collided {
            return;
        }
        let Objects { bodies, soft_bodies, .. } = &mut *ctx.objects;
        let (Some(body), Some(soft_body)) = (bodies.get_mut(self.body), soft_bodies.get_mut(self.soft_body)) else {
            return;
        };
        let max_bias_av = MAX_BIAS_ROTATION / ctx.step;
        let inv_inertia = if self.body_collides { *body.inv_inertia_tensor() } else { Mat3::zeros() };
        let body_inv_mass = if self.body_collides { body.inv_mass() } else { 0.0 };
        let friction = body.friction();
        let (body_collides, soft_body_collides) = (self.body_collides, self.soft_body_collides);

        for c in self.contacts.iter_mut().filter(|c| c.active) {
            c.active = false;
            let node_inv_mass = if soft_body_collides { soft_body.node_inv_mass(c.node) } else { 0.0 };
            let inv_mass_sum = body_inv_mass + node_inv_mass;

            let bias_velocity = |body: &crate::object::Body, soft_body: &crate::object::SoftBody, c: &Contact| {
                let dbv = soft_body.node_biased_velocity(c.node)
                    - body.biased_linear_velocity
                    - body.biased_angular_velocity.cross(&c.ra);
                dbv.dot(&c.normal)
            };
            let vbn = bias_velocity(body, soft_body, c);
            if (c.bias - vbn).abs() > MIN_VELOCITY {
                let jbn = (c.bias - vbn) * c.mass_normal;
                let old = c.acc_bias_impulse;
                c.acc_bias_impulse = (old + jbn).max(0.0);
                let jb = c.normal * (c.acc_bias_impulse - old);
                if body_collides {
                    body.apply_bias_impulse(&-jb, &(c.ra + body.center_of_mass()), max_bias_av);
                }
                if soft_body_collides {
                    soft_body.apply_node_bias_impulse(c.node, &jb);
                }

                let vbn = bias_velocity(body, soft_body, c);
                if (c.bias - vbn).abs() > MIN_VELOCITY && inv_mass_sum > 0.0 {
                    let jbn_com = (c.bias - vbn) / inv_mass_sum;
                    let old_com = c.acc_bias_impulse_center_of_mass;
                    c.acc_bias_impulse_center_of_mass = (old_com + jbn_com).max(0.0);
                    let jb_com = c.normal * (c.acc_bias_impulse_center_of_mass - old_com);
                    if body_collides {
                        body.apply_bias_impulse(&-jb_com, &body.center_of_mass(), 0.0);
                    }
                    if soft_body_collides {
                        soft_body.apply_node_bias_impulse(c.node, &jb_com);
                    }
                }
                c.active = true;
            }

            let dv = soft_body.node_velocity(c.node) - body.linear_velocity() - body.angular_velocity().cross(&c.ra);
            let vn = dv.dot(&c.normal);
            if vn.abs() > MIN_VELOCITY {
                let jn = -(c.bounce + vn) * c.mass_normal;
                let old = c.acc_normal_impulse;
                c.acc_normal_impulse = (old + jn).max(0.0);
                let j = c.normal * (c.acc_normal_impulse - old);
                if body_collides {
                    body.apply_impulse(&-j, &(c.ra + body.center_of_mass()));
                }
                if soft_body_collides {
                    soft_body.apply_node_impulse(c.node, &j);
                }
                c.acc_impulse -= j;
                c.active = true;
            }

            let lva = body.linear_velocity() + body.angular_velocity().cross(&c.ra);
            let dtv = soft_body.node_velocity(c.node) - lva;
            let mut tv = dtv - c.normal * c.normal.dot(&dtv);
            let tvl = tv.norm();
            if tvl > MIN_VELOCITY {
                tv /= tvl;
                let temp = inv_inertia * c.ra.cross(&tv);
                let denom = inv_mass_sum + tv.dot(&temp.cross(&c.ra));
                if denom <= CMP_EPSILON {
                    continue;
                }
                let old = c.acc_tangent_impulse;
                c.acc_tangent_impulse += tv * (-tvl / denom);
                let len = c.acc_tangent_impulse.norm();
                let max = c.acc_normal_impulse * friction;
                if len > CMP_EPSILON && len > max {
                    c.acc_tangent_impulse *= max / len;
                }
                let jt = c.acc_tangent_impulse - old;
                if body_collides {
                    body.apply_impulse(&-jt, &(c.ra + body.center_of_mass()));
                }
                if soft_body_collides {
                    soft_body.apply_node_impulse(c.node, &jt);
                }
                c.acc_impulse -= jt;
                c.active = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::{Shape, ShapeData, ShapeType};
    use crate::foundation::math::Transform;
    use crate::object::{Body, BodyState, SoftBody};
    use crate::param::ParamValue;
    use crate::space::{SpaceParams, SpaceQueues};
    use slotmap::SlotMap;

    #[test]
    fn test_falling_cloth_node_stopped_by_ground() {
        let mut shapes = SlotMap::with_key();
        let mut ground_shape = Shape::new(ShapeType::Box);
        ground_shape.set_data(ShapeData::Box { half_extents: Vec3::new(5.0, 0.5, 5.0) }).unwrap();
        let ground_shape = shapes.insert(ground_shape);

        let mut objects = Objects::default();
        let ground = objects.bodies.insert_with_key(Body::new);
        {
            let body = &mut objects.bodies[ground];
            body.set_mode(BodyMode::Static, None);
            body.base_mut().push_shape(ground_shape, Transform::identity(), false);
            body.set_state(BodyState::Transform, ParamValue::Transform(translation(Vec3::new(0.0, -0.5, 0.0))), None).unwrap();
        }
        let cloth = objects.soft_bodies.insert_with_key(SoftBody::new);
        {
            let soft = &mut objects.soft_bodies[cloth];
            let vertices = [Vec3::new(0.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 0.0, 1.0)];
            soft.set_mesh(&vertices, &[0, 1, 2]).unwrap();
            // Sink the nodes slightly into the ground and move them downwards
            soft.set_transform(translation(Vec3::new(0.0, 0.02, 0.0)));
            for node in 0..3 {
                soft.apply_node_impulse(node, &Vec3::new(0.0, -1.0 / 3.0, 0.0));
            }
        }

        let mut queues = SpaceQueues::default();
        let params = SpaceParams::default();
        let mut pair = BodySoftBodyPair::new(PairId::default(), (ground, 0), cloth, &mut objects);
        let mut ctx = SolverContext { objects: &mut objects, shapes: &shapes, queues: &mut queues, params: &params, step: 1.0 / 60.0 };
        assert!(pair.setup(&mut ctx));
        assert_eq!(pair.contact_count(), 3);
        assert!(pair.pre_solve(&mut ctx));
        for _ in 0..8 {
            pair.solve(&mut ctx);
        }
        let soft = &objects.soft_bodies[cloth];
        for node in 0..3 {
            assert!(soft.node_velocity(node).y > -1e-3);
            assert!(soft.node_biased_velocity(node).y > 0.0);
        }
    }
}
