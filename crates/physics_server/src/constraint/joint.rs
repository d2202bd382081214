//! Joints
//!
//! Based on Game Engine Architecture 3rd Edition, Section 13.4.7.1
//! ("Point-to-Point Constraints") and 13.4.7.3 ("Springs").
//!
//! A [`Joint`] is a server resource whose concrete behaviour can be swapped
//! behind the same handle with [`Joint::reconfigure`]. Settings shared by every
//! kind (solver priority, disabled collisions) survive the swap.

use super::{ConstraintRef, Solve, SolverContext};
use crate::error::{PhysicsError, PhysicsResult};
use crate::foundation::math::{xform, Real, Vec3, CMP_EPSILON};
use crate::object::{Body, BodyMode, Objects};
use crate::rid::{BodyRid, JointRid, ObjectRid};

/// Kind reported by `joint_get_type`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JointType {
    /// Created but not configured
    Empty,
    /// Point-to-point
    Pin,
    /// Damped spring between two anchors
    DampedSpring,
}

/// Pin joint tunables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinJointParameter {
    /// Fraction of the positional error corrected per step
    Bias,
    /// Fraction of the relative velocity removed per iteration
    Damping,
    /// Largest impulse per iteration; zero means unclamped
    ImpulseClamp,
}

/// Damped spring tunables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DampedSpringParameter {
    /// Anchor distance the spring pulls towards
    RestLength,
    /// Spring constant
    Stiffness,
    /// Velocity damping rate
    Damping,
}

/// Two anchors held at the same world point
#[derive(Debug, Clone)]
pub struct PinJoint {
    a: BodyRid,
    b: Option<BodyRid>,
    local_a: Vec3,
    /// Body-space anchor on B, or a world point when B is absent
    local_b: Vec3,
    bias: Real,
    damping: Real,
    impulse_clamp: Real,
    pos_a: Vec3,
    pos_b: Vec3,
    rel_a: Vec3,
    rel_b: Vec3,
    jac_diag_inv: [Real; 3],
    applied_impulse: Real,
    ready: bool,
}

impl PinJoint {
    fn new(a: BodyRid, local_a: Vec3, b: Option<BodyRid>, local_b: Vec3) -> Self {
        Self {
            a,
            b,
            local_a,
            local_b,
            bias: 0.3,
            damping: 1.0,
            impulse_clamp: 0.0,
            pos_a: Vec3::zeros(),
            pos_b: Vec3::zeros(),
            rel_a: Vec3::zeros(),
            rel_b: Vec3::zeros(),
            jac_diag_inv: [0.0; 3],
            applied_impulse: 0.0,
            ready: false,
        }
    }

    /// Accumulated impulse magnitude of the current step
    pub const fn applied_impulse(&self) -> Real {
        self.applied_impulse
    }

    fn set_param(&mut self, param: PinJointParameter, value: Real) {
        match param {
            PinJointParameter::Bias => self.bias = value,
            PinJointParameter::Damping => self.damping = value,
            PinJointParameter::ImpulseClamp => self.impulse_clamp = value,
        }
    }

    const fn param(&self, param: PinJointParameter) -> Real {
        match param {
            PinJointParameter::Bias => self.bias,
            PinJointParameter::Damping => self.damping,
            PinJointParameter::ImpulseClamp => self.impulse_clamp,
        }
    }

    fn setup(&mut self, objects: &Objects) -> bool {
        self.ready = false;
        let Some(a) = objects.bodies.get(self.a) else {
            return false;
        };
        let b = self.b.and_then(|b| objects.bodies.get(b));
        if !movable(Some(a)) && !movable(b) {
            return false;
        }
        self.applied_impulse = 0.0;
        self.pos_a = xform(a.base().transform(), &self.local_a);
        self.rel_a = self.pos_a - com_world(a);
        match b {
            Some(b) => {
                self.pos_b = xform(b.base().transform(), &self.local_b);
                self.rel_b = self.pos_b - com_world(b);
            }
            None => {
                self.pos_b = self.local_b;
                self.rel_b = Vec3::zeros();
            }
        }
        for (axis, jac) in self.jac_diag_inv.iter_mut().enumerate() {
            let n = Vec3::ith(axis, 1.0);
            let k = effective_mass(Some(a), &self.rel_a, &n) + effective_mass(b, &self.rel_b, &n);
            *jac = if k > CMP_EPSILON { 1.0 / k } else { 0.0 };
        }
        self.ready = true;
        true
    }

    fn solve(&mut self, objects: &mut Objects, step: Real) {
        let Some((a, mut b)) = body_pair(objects, self.a, self.b) else {
            return;
        };
        for axis in 0..3 {
            let n = Vec3::ith(axis, 1.0);
            let vel_a = velocity(a, &self.rel_a);
            let vel_b = b.as_deref().map_or_else(Vec3::zeros, |b| velocity(b, &self.rel_b));
            let rel_vel = n.dot(&(vel_a - vel_b));
            let depth = -(self.pos_a - self.pos_b).dot(&n);

            let jdi = self.jac_diag_inv[axis];
            let mut impulse = depth * self.bias / step * jdi - self.damping * rel_vel * jdi;
            if self.impulse_clamp > 0.0 {
                impulse = impulse.clamp(-self.impulse_clamp, self.impulse_clamp);
            }
            self.applied_impulse += impulse;

            let j = n * impulse;
            apply(a, &j, &self.rel_a);
            if let Some(b) = b.as_deref_mut() {
                apply(b, &-j, &self.rel_b);
            }
        }
    }
}

/// Spring pulling two anchors towards a rest distance
#[derive(Debug, Clone)]
pub struct DampedSpringJoint {
    a: BodyRid,
    b: Option<BodyRid>,
    local_a: Vec3,
    local_b: Vec3,
    rest_length: Real,
    stiffness: Real,
    damping: Real,
    n: Vec3,
    rel_a: Vec3,
    rel_b: Vec3,
    distance: Real,
    n_mass: Real,
    k: Real,
    target_vrn: Real,
    v_coef: Real,
    ready: bool,
}

impl DampedSpringJoint {
    fn new(a: BodyRid, local_a: Vec3, b: Option<BodyRid>, local_b: Vec3, rest_length: Real) -> Self {
        Self {
            a,
            b,
            local_a,
            local_b,
            rest_length,
            stiffness: 20.0,
            damping: 1.5,
            n: Vec3::zeros(),
            rel_a: Vec3::zeros(),
            rel_b: Vec3::zeros(),
            distance: 0.0,
            n_mass: 0.0,
            k: 0.0,
            target_vrn: 0.0,
            v_coef: 0.0,
            ready: false,
        }
    }

    fn set_param(&mut self, param: DampedSpringParameter, value: Real) {
        match param {
            DampedSpringParameter::RestLength => self.rest_length = value,
            DampedSpringParameter::Stiffness => self.stiffness = value,
            DampedSpringParameter::Damping => self.damping = value,
        }
    }

    const fn param(&self, param: DampedSpringParameter) -> Real {
        match param {
            DampedSpringParameter::RestLength => self.rest_length,
            DampedSpringParameter::Stiffness => self.stiffness,
            DampedSpringParameter::Damping => self.damping,
        }
    }

    fn setup(&mut self, objects: &Objects) -> bool {
        self.ready = false;
        let Some(a) = objects.bodies.get(self.a) else {
            return false;
        };
        let b = self.b.and_then(|b| objects.bodies.get(b));
        if !movable(Some(a)) && !movable(b) {
            return false;
        }
        let pos_a = xform(a.base().transform(), &self.local_a);
        self.rel_a = pos_a - com_world(a);
        let pos_b = match b {
            Some(b) => {
                let p = xform(b.base().transform(), &self.local_b);
                self.rel_b = p - com_world(b);
                p
            }
            None => {
                self.rel_b = Vec3::zeros();
                self.local_b
            }
        };
        let delta = pos_b - pos_a;
        self.distance = delta.norm();
        self.n = if self.distance > CMP_EPSILON { delta / self.distance } else { Vec3::zeros() };
        self.k = effective_mass(Some(a), &self.rel_a, &self.n) + effective_mass(b, &self.rel_b, &self.n);
        self.n_mass = if self.k > CMP_EPSILON { 1.0 / self.k } else { 0.0 };
        self.ready = self.n != Vec3::zeros();
        self.ready
    }

    fn pre_solve(&mut self, objects: &mut Objects, step: Real) -> bool {
        if !self.ready {
            return false;
        }
        let Some((a, b)) = body_pair(objects, self.a, self.b) else {
            return false;
        };
        let spring = (self.rest_length - self.distance) * self.stiffness;
        let j = self.n * (spring * step);
        apply(a, &-j, &self.rel_a);
        if let Some(b) = b {
            apply(b, &j, &self.rel_b);
        }
        self.target_vrn = 0.0;
        self.v_coef = 1.0 - (-self.damping * step * self.k).exp();
        true
    }

    fn solve(&mut self, objects: &mut Objects) {
        let Some((a, mut b)) = body_pair(objects, self.a, self.b) else {
            return;
        };
        let vel_a = velocity(a, &self.rel_a);
        let vel_b = b.as_deref().map_or_else(Vec3::zeros, |b| velocity(b, &self.rel_b));
        let vrn = self.n.dot(&(vel_b - vel_a));
        let v_damp = (self.target_vrn - vrn) * self.v_coef;
        self.target_vrn = vrn + v_damp;
        let j = self.n * (v_damp * self.n_mass);
        apply(a, &-j, &self.rel_a);
        if let Some(b) = b.as_deref_mut() {
            apply(b, &j, &self.rel_b);
        }
    }
}

/// Concrete joint behaviour
#[derive(Debug, Clone)]
pub enum JointKind {
    /// No behaviour yet
    Empty,
    /// See [`PinJoint`]
    Pin(PinJoint),
    /// See [`DampedSpringJoint`]
    DampedSpring(DampedSpringJoint),
}

/// A user joint between one or two bodies
#[derive(Debug, Clone)]
pub struct Joint {
    rid: JointRid,
    kind: JointKind,
    priority: u32,
    disabled_collisions: bool,
}

impl Joint {
    /// An empty joint
    pub fn new(rid: JointRid) -> Self {
        Self { rid, kind: JointKind::Empty, priority: 1, disabled_collisions: false }
    }

    /// Own handle
    pub const fn rid(&self) -> JointRid {
        self.rid
    }

    /// Concrete behaviour
    pub const fn kind(&self) -> &JointKind {
        &self.kind
    }

    /// Kind tag
    pub const fn joint_type(&self) -> JointType {
        match self.kind {
            JointKind::Empty => JointType::Empty,
            JointKind::Pin(_) => JointType::Pin,
            JointKind::DampedSpring(_) => JointType::DampedSpring,
        }
    }

    /// Bodies this joint links, in index order
    pub fn bodies(&self) -> Vec<BodyRid> {
        let (a, b) = match &self.kind {
            JointKind::Empty => return Vec::new(),
            JointKind::Pin(p) => (p.a, p.b),
            JointKind::DampedSpring(s) => (s.a, s.b),
        };
        std::iter::once(a).chain(b).collect()
    }

    /// Solver rounds this joint takes part in
    pub const fn solver_priority(&self) -> u32 {
        self.priority
    }

    pub(crate) fn set_solver_priority(&mut self, priority: u32) {
        self.priority = priority.max(1);
    }

    /// Whether the linked bodies ignore each other
    pub const fn is_disabled_collisions_between_bodies(&self) -> bool {
        self.disabled_collisions
    }

    /// Toggle collisions between the linked bodies
    pub(crate) fn disable_collisions_between_bodies(&mut self, disable: bool, objects: &mut Objects) {
        if self.disabled_collisions == disable {
            return;
        }
        self.disabled_collisions = disable;
        self.set_exceptions(disable, objects);
    }

    fn set_exceptions(&self, add: bool, objects: &mut Objects) {
        let bodies = self.bodies();
        let [a, b] = bodies.as_slice() else {
            return;
        };
        for (owner, other) in [(*a, *b), (*b, *a)] {
            if let Some(body) = objects.bodies.get_mut(owner) {
                if add {
                    body.add_exception(ObjectRid::Body(other));
                } else {
                    body.remove_exception(ObjectRid::Body(other));
                }
            }
        }
    }

    /// Unlink from the current bodies and become empty
    pub(crate) fn clear(&mut self, objects: &mut Objects) {
        self.reconfigure(JointKind::Empty, objects);
    }

    /// Replace the behaviour behind this handle, keeping priority and the
    /// disabled-collisions setting
    pub(crate) fn reconfigure(&mut self, kind: JointKind, objects: &mut Objects) {
        let me = ConstraintRef::Joint(self.rid);
        for body in self.bodies() {
            if let Some(body) = objects.bodies.get_mut(body) {
                body.remove_constraint(me);
            }
        }
        if self.disabled_collisions {
            self.set_exceptions(false, objects);
        }
        self.kind = kind;
        for (index, body) in self.bodies().into_iter().enumerate() {
            if let Some(body) = objects.bodies.get_mut(body) {
                body.add_constraint(me, index);
            }
        }
        if self.disabled_collisions {
            self.set_exceptions(true, objects);
        }
    }

    /// Forget a body that is being freed
    pub(crate) fn detach_body(&mut self, body: BodyRid, objects: &mut Objects) {
        if self.bodies().contains(&body) {
            self.clear(objects);
        }
    }

    /// Pin behaviour linking two body-space anchors. Without `body_b` the second
    /// anchor is a fixed world point.
    pub fn make_pin(body_a: BodyRid, local_a: Vec3, body_b: Option<BodyRid>, local_b: Vec3) -> JointKind {
        JointKind::Pin(PinJoint::new(body_a, local_a, body_b, local_b))
    }

    /// Spring behaviour between two anchors, resting at their current distance
    pub fn make_damped_spring(
        objects: &Objects,
        body_a: BodyRid,
        anchor_a: Vec3,
        body_b: Option<BodyRid>,
        anchor_b: Vec3,
    ) -> PhysicsResult<JointKind> {
        let a = objects.bodies.get(body_a).ok_or(PhysicsError::InvalidHandle { kind: "body", rid: body_a.into() })?;
        let world_a = xform(a.base().transform(), &anchor_a);
        let world_b = match body_b {
            Some(rid) => {
                let b = objects.bodies.get(rid).ok_or(PhysicsError::InvalidHandle { kind: "body", rid: rid.into() })?;
                xform(b.base().transform(), &anchor_b)
            }
            None => anchor_b,
        };
        Ok(JointKind::DampedSpring(DampedSpringJoint::new(body_a, anchor_a, body_b, anchor_b, (world_b - world_a).norm())))
    }

    /// Set a pin parameter
    pub(crate) fn set_pin_param(&mut self, param: PinJointParameter, value: Real) -> PhysicsResult<()> {
        match &mut self.kind {
            JointKind::Pin(p) => {
                p.set_param(param, value);
                Ok(())
            }
            _ => Err(self.not_a("pin joint")),
        }
    }

    /// Read a pin parameter
    pub fn pin_param(&self, param: PinJointParameter) -> PhysicsResult<Real> {
        match &self.kind {
            JointKind::Pin(p) => Ok(p.param(param)),
            _ => Err(self.not_a("pin joint")),
        }
    }

    /// Set a damped spring parameter
    pub(crate) fn set_damped_spring_param(&mut self, param: DampedSpringParameter, value: Real) -> PhysicsResult<()> {
        match &mut self.kind {
            JointKind::DampedSpring(s) => {
                s.set_param(param, value);
                Ok(())
            }
            _ => Err(self.not_a("damped spring joint")),
        }
    }

    /// Read a damped spring parameter
    pub fn damped_spring_param(&self, param: DampedSpringParameter) -> PhysicsResult<Real> {
        match &self.kind {
            JointKind::DampedSpring(s) => Ok(s.param(param)),
            _ => Err(self.not_a("damped spring joint")),
        }
    }

    fn not_a(&self, expected: &'static str) -> PhysicsError {
        let err = PhysicsError::WrongKind { expected, rid: self.rid.into() };
        log::error!("{}", err);
        err
    }
}

impl Solve for Joint {
    fn setup(&mut self, ctx: &mut SolverContext<'_>) -> bool {
        match &mut self.kind {
            JointKind::Empty => false,
            JointKind::Pin(p) => p.setup(ctx.objects),
            JointKind::DampedSpring(s) => s.setup(ctx.objects),
        }
    }

    fn pre_solve(&mut self, ctx: &mut SolverContext<'_>) -> bool {
        match &mut self.kind {
            JointKind::Empty => false,
            JointKind::Pin(p) => p.ready,
            JointKind::DampedSpring(s) => s.pre_solve(ctx.objects, ctx.step),
        }
    }

    fn solve(&mut self, ctx: &mut SolverContext<'_>) {
        match &mut self.kind {
            JointKind::Empty => {}
            JointKind::Pin(p) => p.solve(ctx.objects, ctx.step),
            JointKind::DampedSpring(s) => s.solve(ctx.objects),
        }
    }

    fn priority(&self) -> u32 {
        self.priority
    }
}

fn movable(body: Option<&Body>) -> bool {
    body.is_some_and(|b| b.mode() > BodyMode::Kinematic)
}

fn com_world(body: &Body) -> Vec3 {
    body.base().transform().translation.vector + body.center_of_mass()
}

/// Inverse effective mass of one body along `n` at offset `r` from its center of mass
fn effective_mass(body: Option<&Body>, r: &Vec3, n: &Vec3) -> Real {
    body.map_or(0.0, |b| {
        let angular = b.inv_inertia_tensor() * r.cross(n);
        b.inv_mass() + n.dot(&angular.cross(r))
    })
}

/// Velocity of the point at offset `rel` from the center of mass
fn velocity(body: &Body, rel: &Vec3) -> Vec3 {
    body.linear_velocity() + body.angular_velocity().cross(rel)
}

/// Impulse at an offset from the center of mass
fn apply(body: &mut Body, impulse: &Vec3, rel: &Vec3) {
    let position = rel + body.center_of_mass();
    body.apply_impulse(impulse, &position);
}

fn body_pair(objects: &mut Objects, a: BodyRid, b: Option<BodyRid>) -> Option<(&mut Body, Option<&mut Body>)> {
    match b {
        Some(b) => {
            let [a, b] = objects.bodies.get_disjoint_mut([a, b])?;
            Some((a, Some(b)))
        }
        None => objects.bodies.get_mut(a).map(|a| (a, None)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::translation;
    use crate::object::BodyState;
    use crate::param::ParamValue;
    use crate::space::{SpaceParams, SpaceQueues};
    use approx::assert_relative_eq;
    use slotmap::SlotMap;

    struct Fixture {
        objects: Objects,
        joints: SlotMap<JointRid, Joint>,
        a: BodyRid,
        b: BodyRid,
    }

    fn fixture() -> Fixture {
        let mut objects = Objects::default();
        let a = objects.bodies.insert_with_key(Body::new);
        let b = objects.bodies.insert_with_key(Body::new);
        objects.bodies[b]
            .set_state(BodyState::Transform, ParamValue::Transform(translation(Vec3::new(3.0, 0.0, 0.0))), None)
            .unwrap();
        Fixture { objects, joints: SlotMap::with_key(), a, b }
    }

    fn run(joint: &mut Joint, objects: &mut Objects, iterations: usize) {
        let shapes = SlotMap::with_key();
        let mut queues = SpaceQueues::default();
        let params = SpaceParams::default();
        let mut ctx = SolverContext { objects, shapes: &shapes, queues: &mut queues, params: &params, step: 1.0 / 60.0 };
        if joint.setup(&mut ctx) && joint.pre_solve(&mut ctx) {
            for _ in 0..iterations {
                joint.solve(&mut ctx);
            }
        }
    }

    #[test]
    fn test_reconfigure_keeps_handle_and_links_bodies() {
        let mut f = fixture();
        let rid = f.joints.insert_with_key(Joint::new);
        let joint = &mut f.joints[rid];
        assert_eq!(joint.joint_type(), JointType::Empty);
        joint.disable_collisions_between_bodies(true, &mut f.objects);
        joint.set_solver_priority(3);

        joint.reconfigure(Joint::make_pin(f.a, Vec3::zeros(), Some(f.b), Vec3::zeros()), &mut f.objects);
        assert_eq!(joint.rid(), rid);
        assert_eq!(joint.joint_type(), JointType::Pin);
        assert_eq!(joint.solver_priority(), 3);
        assert!(f.objects.bodies[f.a].has_exception(ObjectRid::Body(f.b)));
        assert!(f.objects.bodies[f.b].constraints().any(|(c, i)| c == ConstraintRef::Joint(rid) && i == 1));

        joint.clear(&mut f.objects);
        assert_eq!(joint.joint_type(), JointType::Empty);
        assert!(!f.objects.bodies[f.a].has_exception(ObjectRid::Body(f.b)));
        assert_eq!(f.objects.bodies[f.a].constraints().count(), 0);
    }

    #[test]
    fn test_pin_to_world_stops_drift() {
        let mut f = fixture();
        let rid = f.joints.insert_with_key(Joint::new);
        let mut joint = f.joints[rid].clone();
        joint.reconfigure(Joint::make_pin(f.a, Vec3::zeros(), None, Vec3::zeros()), &mut f.objects);
        f.objects.bodies[f.a].set_linear_velocity(Vec3::new(1.0, 0.0, 0.0));
        run(&mut joint, &mut f.objects, 1);
        assert_relative_eq!(f.objects.bodies[f.a].linear_velocity(), Vec3::zeros(), epsilon = 1e-5);
    }

    #[test]
    fn test_stretched_spring_pulls_bodies_together() {
        let mut f = fixture();
        let rid = f.joints.insert_with_key(Joint::new);
        let mut joint = f.joints[rid].clone();
        let kind = Joint::make_damped_spring(&f.objects, f.a, Vec3::zeros(), Some(f.b), Vec3::zeros()).unwrap();
        joint.reconfigure(kind, &mut f.objects);
        assert_relative_eq!(joint.damped_spring_param(DampedSpringParameter::RestLength).unwrap(), 3.0, epsilon = 1e-5);
        joint.set_damped_spring_param(DampedSpringParameter::RestLength, 1.0).unwrap();

        run(&mut joint, &mut f.objects, 4);
        assert!(f.objects.bodies[f.a].linear_velocity().x > 0.0);
        assert!(f.objects.bodies[f.b].linear_velocity().x < 0.0);
        assert!(joint.pin_param(PinJointParameter::Bias).is_err());
    }
}
