//! Direct body state
//!
//! The view handed to state-sync and force-integration callbacks and returned
//! by `body_get_direct_state`. It borrows the body mutably, so nothing else can
//! touch the body while a callback runs.

use super::body::{Body, BodyState, ReportedContact};
use crate::foundation::math::{Mat3, Real, Transform, Vec3};
use crate::param::ParamValue;
use crate::space::SpaceQueues;

/// Mutable access to one body's simulation state
pub struct DirectBodyState<'a> {
    body: &'a mut Body,
    queues: Option<&'a mut SpaceQueues>,
    step: Real,
    moved: bool,
}

impl<'a> DirectBodyState<'a> {
    pub(crate) fn new(body: &'a mut Body, queues: Option<&'a mut SpaceQueues>, step: Real) -> Self {
        Self { body, queues, step, moved: false }
    }

    /// Whether the transform was changed through this view
    pub(crate) const fn moved(&self) -> bool {
        self.moved
    }

    /// Length of the last simulation step
    pub const fn step(&self) -> Real {
        self.step
    }

    /// Gravity applied during the last step
    pub const fn total_gravity(&self) -> Vec3 {
        self.body.total_gravity()
    }

    /// Linear damping applied during the last step
    pub const fn total_linear_damp(&self) -> Real {
        self.body.total_linear_damp()
    }

    /// Angular damping applied during the last step
    pub const fn total_angular_damp(&self) -> Real {
        self.body.total_angular_damp()
    }

    /// World-space offset of the center of mass from the body origin
    pub const fn center_of_mass(&self) -> Vec3 {
        self.body.center_of_mass()
    }

    /// Center of mass in body space
    pub const fn center_of_mass_local(&self) -> Vec3 {
        self.body.center_of_mass_local()
    }

    /// Inverse mass
    pub const fn inverse_mass(&self) -> Real {
        self.body.inv_mass()
    }

    /// Inverse principal inertia
    pub const fn inverse_inertia(&self) -> Vec3 {
        self.body.inv_inertia()
    }

    /// World-space inverse inertia tensor
    pub const fn inverse_inertia_tensor(&self) -> &Mat3 {
        self.body.inv_inertia_tensor()
    }

    /// Linear velocity
    pub const fn linear_velocity(&self) -> Vec3 {
        self.body.linear_velocity()
    }

    /// Replace the linear velocity and wake the body
    pub fn set_linear_velocity(&mut self, velocity: Vec3) {
        self.body.set_linear_velocity(velocity);
        self.body.wakeup(self.queues.as_deref_mut());
    }

    /// Angular velocity
    pub const fn angular_velocity(&self) -> Vec3 {
        self.body.angular_velocity()
    }

    /// Replace the angular velocity and wake the body
    pub fn set_angular_velocity(&mut self, velocity: Vec3) {
        self.body.set_angular_velocity(velocity);
        self.body.wakeup(self.queues.as_deref_mut());
    }

    /// Body transform
    pub const fn transform(&self) -> &Transform {
        self.body.base().transform()
    }

    /// Move the body
    pub fn set_transform(&mut self, transform: Transform) {
        let moved = self
            .body
            .set_state(BodyState::Transform, ParamValue::Transform(transform), self.queues.as_deref_mut())
            .unwrap_or(false);
        self.moved |= moved;
    }

    /// Velocity of a point given relative to the body origin
    pub fn velocity_at_local_position(&self, position: &Vec3) -> Vec3 {
        self.body.velocity_at_local_point(position)
    }

    /// Apply an impulse through the center of mass
    pub fn apply_central_impulse(&mut self, impulse: &Vec3) {
        self.body.apply_central_impulse(impulse);
        self.body.wakeup(self.queues.as_deref_mut());
    }

    /// Apply an impulse at a position relative to the body origin
    pub fn apply_impulse(&mut self, impulse: &Vec3, position: &Vec3) {
        self.body.apply_impulse(impulse, position);
        self.body.wakeup(self.queues.as_deref_mut());
    }

    /// Apply an angular impulse
    pub fn apply_torque_impulse(&mut self, torque: &Vec3) {
        self.body.apply_torque_impulse(torque);
        self.body.wakeup(self.queues.as_deref_mut());
    }

    /// Add a force for the next step
    pub fn apply_central_force(&mut self, force: &Vec3) {
        self.body.apply_central_force(force);
        self.body.wakeup(self.queues.as_deref_mut());
    }

    /// Add a force at a position for the next step
    pub fn apply_force(&mut self, force: &Vec3, position: &Vec3) {
        self.body.apply_force(force, position);
        self.body.wakeup(self.queues.as_deref_mut());
    }

    /// Add a torque for the next step
    pub fn apply_torque(&mut self, torque: &Vec3) {
        self.body.apply_torque(torque);
        self.body.wakeup(self.queues.as_deref_mut());
    }

    /// Constant force applied every step
    pub const fn constant_force(&self) -> Vec3 {
        self.body.constant_force()
    }

    /// Replace the constant force
    pub fn set_constant_force(&mut self, force: Vec3) {
        self.body.set_constant_force(force);
        self.body.wakeup(self.queues.as_deref_mut());
    }

    /// Constant torque applied every step
    pub const fn constant_torque(&self) -> Vec3 {
        self.body.constant_torque()
    }

    /// Replace the constant torque
    pub fn set_constant_torque(&mut self, torque: Vec3) {
        self.body.set_constant_torque(torque);
        self.body.wakeup(self.queues.as_deref_mut());
    }

    /// Whether the body is asleep
    pub const fn is_sleeping(&self) -> bool {
        !self.body.is_active()
    }

    /// Put the body to sleep or wake it up
    pub fn set_sleeping(&mut self, sleeping: bool) {
        // Only fails on a type mismatch, which cannot happen here
        let _ = self.body.set_state(BodyState::Sleeping, ParamValue::Bool(sleeping), self.queues.as_deref_mut());
    }

    /// Contacts reported during the last step
    pub fn contacts(&self) -> &[ReportedContact] {
        self.body.contacts()
    }

    /// Number of reported contacts
    pub fn contact_count(&self) -> usize {
        self.body.contacts().len()
    }

    /// Apply the ambient gravity and damping by hand, for bodies that omit
    /// the built-in force integration
    pub fn integrate_forces(&mut self) {
        let step = self.step;
        let mut linear = self.body.linear_velocity() + self.body.total_gravity() * step;
        linear *= (1.0 - step * self.body.total_linear_damp()).max(0.0);
        let angular = self.body.angular_velocity() * (1.0 - step * self.body.total_angular_damp()).max(0.0);
        self.body.set_linear_velocity(linear);
        self.body.set_angular_velocity(angular);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::translation;
    use crate::rid::BodyRid;
    use approx::assert_relative_eq;
    use slotmap::SlotMap;

    fn body() -> Body {
        let mut keys: SlotMap<BodyRid, ()> = SlotMap::with_key();
        Body::new(keys.insert(()))
    }

    #[test]
    fn test_transform_through_state_marks_moved() {
        let mut body = body();
        let mut state = DirectBodyState::new(&mut body, None, 1.0 / 60.0);
        assert!(!state.moved());
        state.set_transform(translation(Vec3::new(1.0, 2.0, 3.0)));
        assert!(state.moved());
        assert_relative_eq!(state.transform().translation.vector, Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_impulse_changes_velocity() {
        let mut body = body();
        let mut state = DirectBodyState::new(&mut body, None, 1.0 / 60.0);
        state.apply_central_impulse(&Vec3::new(2.0, 0.0, 0.0));
        assert_relative_eq!(state.linear_velocity(), Vec3::new(2.0, 0.0, 0.0), epsilon = 1e-6);
    }

    #[test]
    fn test_manual_integration_damps() {
        let mut body = body();
        body.set_linear_velocity(Vec3::new(1.0, 0.0, 0.0));
        let mut state = DirectBodyState::new(&mut body, None, 0.5);
        state.integrate_forces();
        // No ambient state gathered yet, so damping and gravity are zero
        assert_relative_eq!(state.linear_velocity(), Vec3::new(1.0, 0.0, 0.0), epsilon = 1e-6);
    }
}
