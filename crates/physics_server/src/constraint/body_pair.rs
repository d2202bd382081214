//! Rigid body contact pairs
//!
//! Based on Game Engine Architecture 3rd Edition, Section 13.4.8
//! ("Collision Response") using sequential impulses with accumulated,
//! clamped normal and friction impulses and a separate bias velocity for
//! penetration recovery.
//!
//! Contact points are stored relative to body A's origin in each body's local
//! orientation, so a persistent manifold survives small motions and the
//! accumulated impulses can be reused to warm start the next step.

use std::f32::consts::PI;

use super::{combine_bias, combine_bounce, combine_friction, placed_shape, ConstraintRef, PairId, Solve, SolverContext};
use crate::collision::solver::solve_static;
use crate::foundation::math::{Mat3, Real, Transform, Vec3, CMP_EPSILON};
use crate::object::body::ReportedContact;
use crate::object::{Body, BodyMode, Objects};
use crate::rid::{BodyRid, ObjectRid};

/// Largest manifold kept per shape pair
pub const MAX_CONTACTS: usize = 4;

/// Relative speeds below this are ignored by the solver
const MIN_VELOCITY: Real = 0.0001;

/// Cap on the angular bias velocity per step
const MAX_BIAS_ROTATION: Real = PI / 8.0;

#[derive(Debug, Clone, Default)]
struct Contact {
    normal: Vec3,
    local_a: Vec3,
    local_b: Vec3,
    ra: Vec3,
    rb: Vec3,
    acc_normal_impulse: Real,
    acc_bias_impulse: Real,
    acc_bias_impulse_center_of_mass: Real,
    acc_tangent_impulse: Vec3,
    acc_impulse: Vec3,
    mass_normal: Real,
    bias: Real,
    bounce: Real,
    depth: Real,
    active: bool,
    reused: bool,
}

/// Two rigid body shapes whose bounds overlap
#[derive(Debug)]
pub struct BodyPair {
    a: BodyRid,
    shape_a: usize,
    b: BodyRid,
    shape_b: usize,
    offset_b: Vec3,
    contacts: Vec<Contact>,
    collided: bool,
    collide_a: bool,
    collide_b: bool,
    report_contacts_only: bool,
}

/// Per-step view of one body's solver terms; zero for a side that does not respond
struct Response {
    inv_mass: Real,
    inv_inertia: Mat3,
}

impl Response {
    fn of(body: &Body, responds: bool) -> Self {
        if responds {
            Self { inv_mass: body.inv_mass(), inv_inertia: *body.inv_inertia_tensor() }
        } else {
            Self { inv_mass: 0.0, inv_inertia: Mat3::zeros() }
        }
    }
}

impl BodyPair {
    pub(crate) fn new(id: PairId, (a, shape_a): (BodyRid, usize), (b, shape_b): (BodyRid, usize), objects: &mut Objects) -> Self {
        if let Some(body) = objects.bodies.get_mut(a) {
            body.add_constraint(ConstraintRef::Pair(id), 0);
        }
        if let Some(body) = objects.bodies.get_mut(b) {
            body.add_constraint(ConstraintRef::Pair(id), 1);
        }
        Self {
            a,
            shape_a,
            b,
            shape_b,
            offset_b: Vec3::zeros(),
            contacts: Vec::with_capacity(MAX_CONTACTS),
            collided: false,
            collide_a: false,
            collide_b: false,
            report_contacts_only: false,
        }
    }

    pub(crate) const fn bodies(&self) -> [BodyRid; 2] {
        [self.a, self.b]
    }

    /// Number of contacts in the current manifold
    pub(crate) fn contact_count(&self) -> usize {
        self.contacts.len()
    }

    pub(crate) fn destroy(&mut self, id: PairId, objects: &mut Objects) {
        for rid in [self.a, self.b] {
            if let Some(body) = objects.bodies.get_mut(rid) {
                body.remove_constraint(ConstraintRef::Pair(id));
            }
        }
    }

    /// World-orientation contact points relative to A's origin
    fn global_points(&self, c: &Contact, a: &Transform, b: &Transform) -> (Vec3, Vec3) {
        (a.rotation * c.local_a, b.rotation * c.local_b + self.offset_b)
    }

    /// Drop contacts the narrow phase did not refresh last step, or that
    /// drifted apart beyond the separation limit
    fn validate_contacts(&mut self, a: &Transform, b: &Transform, max_separation: Real) {
        let max_separation2 = max_separation * max_separation;
        let offset_b = self.offset_b;
        self.contacts.retain_mut(|c| {
            if !c.reused {
                return false;
            }
            c.reused = false;
            let global_a = a.rotation * c.local_a;
            let global_b = b.rotation * c.local_b + offset_b;
            let depth = (global_a - global_b).dot(&c.normal);
            depth >= -max_separation && (global_b + c.normal * depth - global_a).norm_squared() <= max_separation2
        });
    }

    fn contact_added(&mut self, point_a: Vec3, point_b: Vec3, a: &Transform, b: &Transform, recycle_radius: Real) {
        let local_a = a.rotation.inverse() * point_a;
        let local_b = b.rotation.inverse() * (point_b - self.offset_b);
        let mut contact = Contact {
            normal: (point_a - point_b).try_normalize(CMP_EPSILON).unwrap_or_else(Vec3::zeros),
            local_a,
            local_b,
            reused: true,
            ..Contact::default()
        };

        let radius2 = recycle_radius * recycle_radius;
        if let Some(existing) = self
            .contacts
            .iter_mut()
            .find(|c| (c.local_a - local_a).norm_squared() < radius2 && (c.local_b - local_b).norm_squared() < radius2)
        {
            contact.acc_normal_impulse = existing.acc_normal_impulse;
            contact.acc_tangent_impulse = existing.acc_tangent_impulse;
            *existing = contact;
            return;
        }

        if self.contacts.len() < MAX_CONTACTS {
            self.contacts.push(contact);
            return;
        }

        // Full: the new contact replaces the shallowest one if it is deeper
        let depth_of = |c: &Contact| {
            let (ga, gb) = self.global_points(c, a, b);
            (ga - gb).dot(&c.normal)
        };
        let mut min_depth = depth_of(&contact);
        let mut least_deep = None;
        for (i, c) in self.contacts.iter().enumerate() {
            let depth = depth_of(c);
            if depth < min_depth {
                min_depth = depth;
                least_deep = Some(i);
            }
        }
        if let Some(i) = least_deep {
            self.contacts[i] = contact;
        }
    }
}

impl Solve for BodyPair {
    fn setup(&mut self, ctx: &mut SolverContext<'_>) -> bool {
        let (Some(a), Some(b)) = (ctx.objects.bodies.get(self.a), ctx.objects.bodies.get(self.b)) else {
            self.collided = false;
            return false;
        };
        if !a.base().interacts_with(b.base()) || a.has_exception(b.base().rid()) || b.has_exception(a.base().rid()) {
            self.collided = false;
            return false;
        }

        self.collide_a = a.mode() > BodyMode::Kinematic && a.base().collides_with(b.base());
        self.collide_b = b.mode() > BodyMode::Kinematic && b.base().collides_with(a.base());
        self.report_contacts_only = false;
        if !self.collide_a && !self.collide_b {
            if a.max_contacts_reported() > 0 || b.max_contacts_reported() > 0 {
                self.report_contacts_only = true;
            } else {
                self.collided = false;
                return false;
            }
        }

        let xform_a = *a.base().transform();
        let xform_b = *b.base().transform();
        self.offset_b = xform_b.translation.vector - xform_a.translation.vector;
        self.validate_contacts(&xform_a, &xform_b, ctx.params.contact_max_separation);

        let (Some((shape_a, world_a)), Some((shape_b, world_b))) =
            (placed_shape(ctx.shapes, a.base(), self.shape_a), placed_shape(ctx.shapes, b.base(), self.shape_b))
        else {
            self.collided = false;
            return false;
        };

        // Solve relative to A's origin to keep precision far from the world origin
        let mut local_a = world_a;
        local_a.translation.vector -= xform_a.translation.vector;
        let mut local_b = world_b;
        local_b.translation.vector -= xform_a.translation.vector;

        let mut points = Vec::new();
        let mut collect = |pa: Vec3, pb: Vec3| points.push((pa, pb));
        self.collided = solve_static(shape_a, &local_a, shape_b, &local_b, Some(&mut collect), 0.0, 0.0);
        let recycle_radius = ctx.params.contact_recycle_radius;
        for (pa, pb) in points {
            self.contact_added(pa, pb, &xform_a, &xform_b, recycle_radius);
        }
        self.collided
    }

    fn pre_solve(&mut self, ctx: &mut SolverContext<'_>) -> bool {
        if !self.collided {
            return false;
        }
        let Some([a, b]) = ctx.objects.bodies.get_disjoint_mut([self.a, self.b]) else {
            return false;
        };

        let custom_a = placed_shape(ctx.shapes, a.base(), self.shape_a).map_or(0.0, |(s, _)| s.custom_bias());
        let custom_b = placed_shape(ctx.shapes, b.base(), self.shape_b).map_or(0.0, |(s, _)| s.custom_bias());
        let bias = combine_bias(custom_a, custom_b, ctx.params.contact_default_bias);
        let max_penetration = ctx.params.contact_max_allowed_penetration;
        let inv_dt = 1.0 / ctx.step;

        let xform_a = *a.base().transform();
        let xform_b = *b.base().transform();
        let offset_a = xform_a.translation.vector;
        let ra_resp = Response::of(a, self.collide_a);
        let rb_resp = Response::of(b, self.collide_b);
        let report = a.can_report_contacts() || b.can_report_contacts();
        let bounce = combine_bounce(a.bounce(), b.bounce());

        let mut do_process = false;
        for i in 0..self.contacts.len() {
            let (global_a, global_b) = self.global_points(&self.contacts[i], &xform_a, &xform_b);
            let c = &mut self.contacts[i];
            c.active = false;
            let depth = (global_a - global_b).dot(&c.normal);
            if depth <= 0.0 {
                continue;
            }

            c.ra = global_a - a.center_of_mass();
            c.rb = global_b - b.center_of_mass() - self.offset_b;

            if report {
                let velocity_a = a.angular_velocity().cross(&c.ra) + a.linear_velocity();
                let velocity_b = b.angular_velocity().cross(&c.rb) + b.linear_velocity();
                let world_b = global_b + offset_a;
                let world_a = global_a + offset_a;
                a.add_contact(ReportedContact {
                    local_position: world_a,
                    local_normal: -c.normal,
                    depth,
                    local_shape: self.shape_a,
                    local_velocity_at_position: velocity_a,
                    collider_position: world_b,
                    collider_shape: self.shape_b,
                    collider_instance_id: b.base().instance_id(),
                    collider: ObjectRid::Body(self.b),
                    collider_velocity_at_position: velocity_b,
                    impulse: c.acc_impulse,
                });
                b.add_contact(ReportedContact {
                    local_position: world_b,
                    local_normal: c.normal,
                    depth,
                    local_shape: self.shape_b,
                    local_velocity_at_position: velocity_b,
                    collider_position: world_a,
                    collider_shape: self.shape_a,
                    collider_instance_id: a.base().instance_id(),
                    collider: ObjectRid::Body(self.a),
                    collider_velocity_at_position: velocity_a,
                    impulse: -c.acc_impulse,
                });
            }

            if self.report_contacts_only {
                self.collided = false;
                continue;
            }

            c.active = true;
            do_process = true;
            // Position correction is recomputed every step, never warm started.
            c.acc_bias_impulse = 0.0;
            c.acc_bias_impulse_center_of_mass = 0.0;

            let inertia_a = ra_resp.inv_inertia * c.ra.cross(&c.normal);
            let inertia_b = rb_resp.inv_inertia * c.rb.cross(&c.normal);
            let k_normal = ra_resp.inv_mass
                + rb_resp.inv_mass
                + c.normal.dot(&inertia_a.cross(&c.ra))
                + c.normal.dot(&inertia_b.cross(&c.rb));
            c.mass_normal = if k_normal > CMP_EPSILON { 1.0 / k_normal } else { 0.0 };
            c.bias = -bias * inv_dt * (max_penetration - depth).min(0.0);
            c.depth = depth;

            // Warm start
            let j = c.normal * c.acc_normal_impulse + c.acc_tangent_impulse;
            if self.collide_a {
                a.apply_impulse(&-j, &(c.ra + a.center_of_mass()));
            }
            if self.collide_b {
                b.apply_impulse(&j, &(c.rb + b.center_of_mass()));
            }
            c.acc_impulse -= j;

            c.bounce = bounce;
            if c.bounce != 0.0 {
                let cra = a.prev_angular_velocity().cross(&c.ra);
                let crb = b.prev_angular_velocity().cross(&c.rb);
                let dv = b.prev_linear_velocity() + crb - a.prev_linear_velocity() - cra;
                c.bounce *= dv.dot(&c.normal);
            }
        }
        do_process
    }

    fn solve(&mut self, ctx: &mut SolverContext<'_>) {
        if !self.collided {
            return;
        }
        let Some([a, b]) = ctx.objects.bodies.get_disjoint_mut([self.a, self.b]) else {
            return;
        };
        let max_bias_av = MAX_BIAS_ROTATION / ctx.step;
        let ra_resp = Response::of(a, self.collide_a);
        let rb_resp = Response::of(b, self.collide_b);
        let inv_mass_sum = ra_resp.inv_mass + rb_resp.inv_mass;
        let friction = combine_friction(a.friction(), b.friction());
        let (collide_a, collide_b) = (self.collide_a, self.collide_b);

        for c in self.contacts.iter_mut().filter(|c| c.active) {
            c.active = false;

            // Penetration recovery through the bias velocities
            let vbn = relative_bias_velocity(a, b, c);
            if (c.bias - vbn).abs() > MIN_VELOCITY {
                let jbn = (c.bias - vbn) * c.mass_normal;
                let old = c.acc_bias_impulse;
                c.acc_bias_impulse = (old + jbn).max(0.0);
                let jb = c.normal * (c.acc_bias_impulse - old);
                if collide_a {
                    a.apply_bias_impulse(&-jb, &(c.ra + a.center_of_mass()), max_bias_av);
                }
                if collide_b {
                    b.apply_bias_impulse(&jb, &(c.rb + b.center_of_mass()), max_bias_av);
                }

                // Whatever the capped rotation could not resolve goes through the centers of mass
                let vbn = relative_bias_velocity(a, b, c);
                if (c.bias - vbn).abs() > MIN_VELOCITY && inv_mass_sum > 0.0 {
                    let jbn_com = (c.bias - vbn) / inv_mass_sum;
                    let old_com = c.acc_bias_impulse_center_of_mass;
                    c.acc_bias_impulse_center_of_mass = (old_com + jbn_com).max(0.0);
                    let jb_com = c.normal * (c.acc_bias_impulse_center_of_mass - old_com);
                    if collide_a {
                        a.apply_bias_impulse(&-jb_com, &a.center_of_mass(), 0.0);
                    }
                    if collide_b {
                        b.apply_bias_impulse(&jb_com, &b.center_of_mass(), 0.0);
                    }
                }
                c.active = true;
            }

            // Normal impulse
            let dv = b.linear_velocity() + b.angular_velocity().cross(&c.rb) - a.linear_velocity() - a.angular_velocity().cross(&c.ra);
            let vn = dv.dot(&c.normal);
            if vn.abs() > MIN_VELOCITY {
                let jn = -(c.bounce + vn) * c.mass_normal;
                let old = c.acc_normal_impulse;
                c.acc_normal_impulse = (old + jn).max(0.0);
                let j = c.normal * (c.acc_normal_impulse - old);
                if collide_a {
                    a.apply_impulse(&-j, &(c.ra + a.center_of_mass()));
                }
                if collide_b {
                    b.apply_impulse(&j, &(c.rb + b.center_of_mass()));
                }
                c.acc_impulse -= j;
                c.active = true;
            }

            // Friction impulse, clamped to the friction cone
            let lva = a.linear_velocity() + a.angular_velocity().cross(&c.ra);
            let lvb = b.linear_velocity() + b.angular_velocity().cross(&c.rb);
            let dtv = lvb - lva;
            let mut tv = dtv - c.normal * c.normal.dot(&dtv);
            let tvl = tv.norm();
            if tvl > MIN_VELOCITY {
                tv /= tvl;
                let temp_a = ra_resp.inv_inertia * c.ra.cross(&tv);
                let temp_b = rb_resp.inv_inertia * c.rb.cross(&tv);
                let denom = inv_mass_sum + tv.dot(&(temp_a.cross(&c.ra) + temp_b.cross(&c.rb)));
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
                if collide_a {
                    a.apply_impulse(&-jt, &(c.ra + a.center_of_mass()));
                }
                if collide_b {
                    b.apply_impulse(&jt, &(c.rb + b.center_of_mass()));
                }
                c.acc_impulse -= jt;
                c.active = true;
            }
        }
    }
}

fn relative_bias_velocity(a: &Body, b: &Body, c: &Contact) -> Real {
    let dbv = b.biased_linear_velocity + b.biased_angular_velocity.cross(&c.rb)
        - a.biased_linear_velocity
        - a.biased_angular_velocity.cross(&c.ra);
    dbv.dot(&c.normal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::{Shape, ShapeData, ShapeType};
    use crate::foundation::math::translation;
    use crate::object::BodyState;
    use crate::param::ParamValue;
    use crate::rid::ShapeRid;
    use crate::space::{SpaceParams, SpaceQueues};
    use approx::assert_relative_eq;
    use slotmap::SlotMap;

    struct Fixture {
        objects: Objects,
        shapes: SlotMap<ShapeRid, Shape>,
        queues: SpaceQueues,
        params: SpaceParams,
        a: BodyRid,
        b: BodyRid,
    }

    /// A sphere of radius 0.5 resting `gap` above a static ground box, falling at 1 m/s
    fn fixture(gap: Real) -> Fixture {
        let mut shapes = SlotMap::with_key();
        let sphere = shapes.insert(Shape::new(ShapeType::Sphere));
        let mut ground_shape = Shape::new(ShapeType::Box);
        ground_shape.set_data(ShapeData::Box { half_extents: Vec3::new(5.0, 0.5, 5.0) }).unwrap();
        let ground_shape = shapes.insert(ground_shape);

        let mut objects = Objects::default();
        let a = objects.bodies.insert_with_key(Body::new);
        let b = objects.bodies.insert_with_key(Body::new);
        {
            let body = &mut objects.bodies[a];
            body.base_mut().push_shape(sphere, Transform::identity(), false);
            body.set_state(BodyState::Transform, ParamValue::Transform(translation(Vec3::new(0.0, 0.5 + gap, 0.0))), None).unwrap();
            body.set_linear_velocity(Vec3::new(0.0, -1.0, 0.0));
            body.update_mass_properties(&shapes);
        }
        {
            let ground = &mut objects.bodies[b];
            ground.set_mode(BodyMode::Static, None);
            ground.base_mut().push_shape(ground_shape, Transform::identity(), false);
            ground.set_state(BodyState::Transform, ParamValue::Transform(translation(Vec3::new(0.0, -0.5, 0.0))), None).unwrap();
            ground.update_mass_properties(&shapes);
        }
        Fixture { objects, shapes, queues: SpaceQueues::default(), params: SpaceParams::default(), a, b }
    }

    fn run(f: &mut Fixture, pair: &mut BodyPair) -> (bool, bool) {
        let mut ctx = SolverContext { objects: &mut f.objects, shapes: &f.shapes, queues: &mut f.queues, params: &f.params, step: 1.0 / 60.0 };
        let collided = pair.setup(&mut ctx);
        let process = collided && pair.pre_solve(&mut ctx);
        if process {
            for _ in 0..8 {
                pair.solve(&mut ctx);
            }
        }
        (collided, process)
    }

    #[test]
    fn test_separated_pair_does_nothing() {
        let mut f = fixture(0.5);
        let mut pair = BodyPair::new(PairId::default(), (f.a, 0), (f.b, 0), &mut f.objects);
        assert_eq!(run(&mut f, &mut pair), (false, false));
        assert_eq!(pair.contact_count(), 0);
        assert_relative_eq!(f.objects.bodies[f.a].linear_velocity().y, -1.0);
    }

    #[test]
    fn test_resting_contact_stops_approach() {
        let mut f = fixture(-0.05);
        let mut pair = BodyPair::new(PairId::default(), (f.a, 0), (f.b, 0), &mut f.objects);
        assert_eq!(run(&mut f, &mut pair), (true, true));
        assert!(pair.contact_count() >= 1);
        let sphere = &f.objects.bodies[f.a];
        // The approaching velocity is cancelled and the penetration is pushed out
        assert!(sphere.linear_velocity().y.abs() < 1e-3);
        assert!(sphere.biased_linear_velocity.y > 0.0);
        // The static ground never moves
        assert_relative_eq!(f.objects.bodies[f.b].linear_velocity(), Vec3::zeros());
    }

    #[test]
    fn test_exception_disables_pair() {
        let mut f = fixture(-0.05);
        let ground = ObjectRid::Body(f.b);
        f.objects.bodies[f.a].add_exception(ground);
        let mut pair = BodyPair::new(PairId::default(), (f.a, 0), (f.b, 0), &mut f.objects);
        assert_eq!(run(&mut f, &mut pair), (false, false));
    }

    #[test]
    fn test_reported_contacts_filled() {
        let mut f = fixture(-0.05);
        f.objects.bodies[f.a].set_max_contacts_reported(4);
        let mut pair = BodyPair::new(PairId::default(), (f.a, 0), (f.b, 0), &mut f.objects);
        run(&mut f, &mut pair);
        let contacts = f.objects.bodies[f.a].contacts();
        assert!(!contacts.is_empty());
        assert_eq!(contacts[0].collider, ObjectRid::Body(f.b));
        assert!(contacts[0].local_normal.y > 0.9);
        assert_relative_eq!(contacts[0].depth, 0.05, epsilon = 5e-3);
    }

    #[test]
    fn test_recycled_contact_resets_bias_accumulators() {
        let mut f = fixture(-0.05);
        let mut pair = BodyPair::new(PairId::default(), (f.a, 0), (f.b, 0), &mut f.objects);
        run(&mut f, &mut pair);
        let before = pair.contacts[0].clone();
        assert!(before.acc_bias_impulse > 0.0);
        assert!(before.acc_normal_impulse > 0.0);

        let identity = Transform::identity();
        let point_b = before.local_b + pair.offset_b;
        pair.contact_added(before.local_a, point_b, &identity, &identity, 0.01);
        assert_eq!(pair.contact_count(), 1);
        let after = &pair.contacts[0];
        assert_relative_eq!(after.acc_normal_impulse, before.acc_normal_impulse);
        assert_relative_eq!(after.acc_tangent_impulse, before.acc_tangent_impulse);
        assert_relative_eq!(after.acc_bias_impulse, 0.0);
        assert_relative_eq!(after.acc_bias_impulse_center_of_mass, 0.0);
    }
}
