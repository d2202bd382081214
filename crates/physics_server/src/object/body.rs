//! Rigid bodies
//!
//! Based on Game Engine Architecture 3rd Edition, Section 13.4 ("Rigid Body
//! Dynamics"): linear and angular state integrated with explicit Euler, mass
//! distributed over the attached shapes, and a still-time counter deciding
//! when a body may go to sleep.

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use slotmap::SlotMap;

use super::area::{Ambient, AreaOverlaps};
use super::direct_state::DirectBodyState;
use super::{Area, CollisionObject};
use crate::collision::Shape;
use crate::constraint::ConstraintRef;
use crate::ensure;
use crate::error::{PhysicsError, PhysicsResult};
use crate::foundation::math::{
    inverse_inertia_tensor, orthonormalized, Mat3, Quat, Real, Transform, Vec3, CMP_EPSILON,
};
use crate::param::ParamValue;
use crate::rid::{AreaRid, BodyRid, ObjectRid, ShapeRid};
use crate::space::SpaceQueues;

/// How a body takes part in the simulation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum BodyMode {
    /// Never moves; infinite mass
    Static,
    /// Moved by the caller; pushes dynamic bodies but is never pushed
    Kinematic,
    /// Fully simulated
    #[default]
    Dynamic,
    /// Simulated without rotation
    DynamicLinear,
}

impl BodyMode {
    /// Whether the solver moves bodies in this mode
    pub const fn is_dynamic(self) -> bool {
        matches!(self, Self::Dynamic | Self::DynamicLinear)
    }
}

bitflags! {
    /// Axes along which a body's motion is locked
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BodyAxis: u8 {
        /// Translation along X
        const LINEAR_X = 1 << 0;
        /// Translation along Y
        const LINEAR_Y = 1 << 1;
        /// Translation along Z
        const LINEAR_Z = 1 << 2;
        /// Rotation around X
        const ANGULAR_X = 1 << 3;
        /// Rotation around Y
        const ANGULAR_Y = 1 << 4;
        /// Rotation around Z
        const ANGULAR_Z = 1 << 5;
    }
}

const LINEAR_AXES: [BodyAxis; 3] = [BodyAxis::LINEAR_X, BodyAxis::LINEAR_Y, BodyAxis::LINEAR_Z];
const ANGULAR_AXES: [BodyAxis; 3] = [BodyAxis::ANGULAR_X, BodyAxis::ANGULAR_Y, BodyAxis::ANGULAR_Z];

/// Physical parameters set with `body_set_param`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BodyParameter {
    /// Restitution, combined additively and clamped to `0..=1`
    Bounce,
    /// Friction, the smaller of the two bodies' values is used
    Friction,
    /// Total mass; must be positive
    Mass,
    /// Principal moments; non-positive components are computed from the shapes
    Inertia,
    /// Local center of mass; pins it against recomputation
    CenterOfMass,
    /// Multiplier on the ambient gravity
    GravityScale,
    /// Linear damping; negative defers to the areas
    LinearDamp,
    /// Angular damping; negative defers to the areas
    AngularDamp,
}

/// Kinematic state set with `body_set_state`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BodyState {
    /// World transform
    Transform,
    /// Linear velocity
    LinearVelocity,
    /// Angular velocity
    AngularVelocity,
    /// Sleep flag
    Sleeping,
    /// Whether the body may fall asleep
    CanSleep,
}

/// A contact kept for reporting through the direct body state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReportedContact {
    /// Contact position on this body, world space
    pub local_position: Vec3,
    /// Contact normal pointing away from the collider
    pub local_normal: Vec3,
    /// Penetration depth
    pub depth: Real,
    /// Shape index on this body
    pub local_shape: usize,
    /// Velocity of this body at the contact
    pub local_velocity_at_position: Vec3,
    /// Contact position on the collider, world space
    pub collider_position: Vec3,
    /// Shape index on the collider
    pub collider_shape: usize,
    /// Owner tag of the collider
    pub collider_instance_id: u64,
    /// The collider
    pub collider: ObjectRid,
    /// Velocity of the collider at the contact
    pub collider_velocity_at_position: Vec3,
    /// Impulse accumulated on this body at the contact
    pub impulse: Vec3,
}

/// Called from `flush_queries` with the body's state after every step it moved
pub type StateSyncCallback = Box<dyn FnMut(&mut DirectBodyState<'_>) + Send>;

/// Custom force integrator, called from `flush_queries` with the user data it
/// was registered with
pub type ForceIntegrationCallback = Box<dyn FnMut(&mut DirectBodyState<'_>, Option<&mut (dyn Any + Send)>) + Send>;

pub(crate) struct ForceIntegration {
    pub(crate) callback: ForceIntegrationCallback,
    pub(crate) user_data: Option<Box<dyn Any + Send>>,
}

/// A rigid body
pub struct Body {
    base: CollisionObject,
    mode: BodyMode,
    locked_axes: BodyAxis,

    linear_velocity: Vec3,
    angular_velocity: Vec3,
    prev_linear_velocity: Vec3,
    prev_angular_velocity: Vec3,
    pub(crate) biased_linear_velocity: Vec3,
    pub(crate) biased_angular_velocity: Vec3,
    constant_linear_velocity: Vec3,
    constant_angular_velocity: Vec3,

    mass: Real,
    inv_mass: Real,
    bounce: Real,
    friction: Real,
    inertia: Vec3,
    principal_inertia: Vec3,
    inv_inertia: Vec3,
    principal_inertia_axes_local: Mat3,
    inv_inertia_tensor: Mat3,
    center_of_mass_local: Vec3,
    center_of_mass: Vec3,
    calculate_inertia: bool,
    calculate_center_of_mass: bool,

    gravity_scale: Real,
    linear_damp: Real,
    angular_damp: Real,
    total_gravity: Vec3,
    total_linear_damp: Real,
    total_angular_damp: Real,

    applied_force: Vec3,
    applied_torque: Vec3,
    constant_force: Vec3,
    constant_torque: Vec3,

    active: bool,
    can_sleep: bool,
    still_time: Real,
    first_integration: bool,
    omit_force_integration: bool,
    new_transform: Transform,

    pub(crate) areas: AreaOverlaps,
    exceptions: BTreeSet<ObjectRid>,
    pub(crate) constraints: BTreeMap<ConstraintRef, usize>,
    max_contacts_reported: usize,
    contacts: Vec<ReportedContact>,

    pub(crate) state_sync: Option<StateSyncCallback>,
    pub(crate) force_integration: Option<ForceIntegration>,
    pub(crate) island_step: u64,
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Body")
            .field("rid", &self.base.rid())
            .field("mode", &self.mode)
            .field("mass", &self.mass)
            .field("linear_velocity", &self.linear_velocity)
            .field("angular_velocity", &self.angular_velocity)
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

impl Body {
    /// A detached dynamic body of mass 1 at the origin
    pub fn new(rid: BodyRid) -> Self {
        Self {
            base: CollisionObject::new(ObjectRid::Body(rid)),
            mode: BodyMode::Dynamic,
            locked_axes: BodyAxis::empty(),
            linear_velocity: Vec3::zeros(),
            angular_velocity: Vec3::zeros(),
            prev_linear_velocity: Vec3::zeros(),
            prev_angular_velocity: Vec3::zeros(),
            biased_linear_velocity: Vec3::zeros(),
            biased_angular_velocity: Vec3::zeros(),
            constant_linear_velocity: Vec3::zeros(),
            constant_angular_velocity: Vec3::zeros(),
            mass: 1.0,
            inv_mass: 1.0,
            bounce: 0.0,
            friction: 1.0,
            inertia: Vec3::zeros(),
            principal_inertia: Vec3::zeros(),
            inv_inertia: Vec3::zeros(),
            principal_inertia_axes_local: Mat3::identity(),
            inv_inertia_tensor: Mat3::zeros(),
            center_of_mass_local: Vec3::zeros(),
            center_of_mass: Vec3::zeros(),
            calculate_inertia: true,
            calculate_center_of_mass: true,
            gravity_scale: 1.0,
            linear_damp: -1.0,
            angular_damp: -1.0,
            total_gravity: Vec3::zeros(),
            total_linear_damp: 0.0,
            total_angular_damp: 0.0,
            applied_force: Vec3::zeros(),
            applied_torque: Vec3::zeros(),
            constant_force: Vec3::zeros(),
            constant_torque: Vec3::zeros(),
            active: true,
            can_sleep: true,
            still_time: 0.0,
            first_integration: false,
            omit_force_integration: false,
            new_transform: Transform::identity(),
            areas: AreaOverlaps::default(),
            exceptions: BTreeSet::new(),
            constraints: BTreeMap::new(),
            max_contacts_reported: 0,
            contacts: Vec::new(),
            state_sync: None,
            force_integration: None,
            island_step: 0,
        }
    }

    /// Shared collision object state
    pub const fn base(&self) -> &CollisionObject {
        &self.base
    }

    /// Mutable shared collision object state
    pub fn base_mut(&mut self) -> &mut CollisionObject {
        &mut self.base
    }

    /// Own handle
    pub fn rid(&self) -> BodyRid {
        self.base.rid().as_body().unwrap_or_default()
    }

    /// Simulation mode
    pub const fn mode(&self) -> BodyMode {
        self.mode
    }

    /// Switch modes. Returns whether the broadphase proxies must change their
    /// static flag.
    pub(crate) fn set_mode(&mut self, mode: BodyMode, queues: Option<&mut SpaceQueues>) -> bool {
        let prev = self.mode;
        self.mode = mode;
        match mode {
            BodyMode::Static | BodyMode::Kinematic => {
                self.inv_mass = 0.0;
                self.inv_inertia = Vec3::zeros();
                self.update_transform_dependent();
                self.linear_velocity = Vec3::zeros();
                self.angular_velocity = Vec3::zeros();
                if mode == BodyMode::Kinematic && prev != mode {
                    self.first_integration = true;
                }
                let keep_active = mode == BodyMode::Kinematic && !self.contacts.is_empty();
                if let Some(queues) = queues {
                    self.mass_properties_changed(Some(&mut *queues));
                    self.set_active(keep_active, Some(queues));
                } else {
                    self.set_active(keep_active, None);
                }
            }
            BodyMode::Dynamic | BodyMode::DynamicLinear => {
                self.inv_mass = if self.mass > 0.0 { 1.0 / self.mass } else { 0.0 };
                if !self.calculate_inertia {
                    self.principal_inertia_axes_local = Mat3::identity();
                    self.inv_inertia = invert_components(&self.inertia);
                    self.update_transform_dependent();
                }
                if let Some(queues) = queues {
                    self.mass_properties_changed(Some(&mut *queues));
                    self.set_active(true, Some(queues));
                } else {
                    self.set_active(true, None);
                }
            }
        }
        (prev == BodyMode::Static) != (mode == BodyMode::Static)
    }

    /// Queue a lazy mass properties refresh
    pub(crate) fn mass_properties_changed(&self, queues: Option<&mut SpaceQueues>) {
        if let Some(queues) = queues {
            queues.mass_properties_update.push(self.rid());
        }
    }

    /// Set a physical parameter
    pub(crate) fn set_param(&mut self, param: BodyParameter, value: ParamValue, queues: Option<&mut SpaceQueues>) -> PhysicsResult<()> {
        match param {
            BodyParameter::Bounce => self.bounce = value.as_real()?,
            BodyParameter::Friction => self.friction = value.as_real()?,
            BodyParameter::Mass => {
                let mass = value.as_real()?;
                ensure!(mass > 0.0, PhysicsError::precondition(format!("body mass must be positive, got {mass}")));
                self.mass = mass;
                if self.mode.is_dynamic() {
                    self.mass_properties_changed(queues);
                }
            }
            BodyParameter::Inertia => {
                let inertia = value.as_vector()?;
                self.inertia = inertia;
                if inertia.x <= 0.0 || inertia.y <= 0.0 || inertia.z <= 0.0 {
                    self.calculate_inertia = true;
                    if self.mode == BodyMode::Dynamic {
                        self.mass_properties_changed(queues);
                    }
                } else {
                    self.calculate_inertia = false;
                    if self.mode == BodyMode::Dynamic {
                        self.principal_inertia_axes_local = Mat3::identity();
                        self.principal_inertia = inertia;
                        self.inv_inertia = invert_components(&inertia);
                        self.update_transform_dependent();
                    }
                }
            }
            BodyParameter::CenterOfMass => {
                self.calculate_center_of_mass = false;
                self.center_of_mass_local = value.as_vector()?;
                self.update_transform_dependent();
            }
            BodyParameter::GravityScale => {
                let scale = value.as_real()?;
                if self.gravity_scale.abs() <= CMP_EPSILON {
                    self.wakeup(queues);
                }
                self.gravity_scale = scale;
            }
            BodyParameter::LinearDamp => self.linear_damp = value.as_real()?,
            BodyParameter::AngularDamp => self.angular_damp = value.as_real()?,
        }
        Ok(())
    }

    /// Read a physical parameter
    pub fn param(&self, param: BodyParameter) -> ParamValue {
        match param {
            BodyParameter::Bounce => self.bounce.into(),
            BodyParameter::Friction => self.friction.into(),
            BodyParameter::Mass => self.mass.into(),
            BodyParameter::Inertia => self.inertia.into(),
            BodyParameter::CenterOfMass => self.center_of_mass_local.into(),
            BodyParameter::GravityScale => self.gravity_scale.into(),
            BodyParameter::LinearDamp => self.linear_damp.into(),
            BodyParameter::AngularDamp => self.angular_damp.into(),
        }
    }

    /// Forget manually pinned inertia and center of mass
    pub(crate) fn reset_mass_properties(&mut self, queues: Option<&mut SpaceQueues>) {
        self.calculate_inertia = true;
        self.calculate_center_of_mass = true;
        self.mass_properties_changed(queues);
    }

    /// Set kinematic state. Returns whether the transform changed, in which
    /// case the caller must refresh the broadphase proxies.
    pub(crate) fn set_state(&mut self, state: BodyState, value: ParamValue, queues: Option<&mut SpaceQueues>) -> PhysicsResult<bool> {
        let mut moved = false;
        match state {
            BodyState::Transform => {
                let transform = value.as_transform()?;
                match self.mode {
                    BodyMode::Kinematic => {
                        self.new_transform = transform;
                        if self.first_integration {
                            self.base.set_transform(transform);
                            self.first_integration = false;
                            moved = true;
                        }
                        self.set_active(true, queues);
                        return Ok(moved);
                    }
                    BodyMode::Static => {
                        self.base.set_transform(transform);
                        moved = true;
                    }
                    BodyMode::Dynamic | BodyMode::DynamicLinear => {
                        let t = orthonormalized(&transform);
                        self.new_transform = *self.base.transform();
                        if self.new_transform != t {
                            self.base.set_transform(t);
                            self.update_transform_dependent();
                            moved = true;
                        }
                    }
                }
                self.wakeup(queues);
            }
            BodyState::LinearVelocity => {
                self.linear_velocity = value.as_vector()?;
                self.constant_linear_velocity = self.linear_velocity;
                self.wakeup(queues);
            }
            BodyState::AngularVelocity => {
                self.angular_velocity = value.as_vector()?;
                self.constant_angular_velocity = self.angular_velocity;
                self.wakeup(queues);
            }
            BodyState::Sleeping => {
                let sleep = value.as_bool()?;
                if self.mode.is_dynamic() {
                    if sleep {
                        self.linear_velocity = Vec3::zeros();
                        self.angular_velocity = Vec3::zeros();
                    }
                    self.set_active(!sleep, queues);
                }
            }
            BodyState::CanSleep => {
                self.can_sleep = value.as_bool()?;
                if self.mode.is_dynamic() && !self.active && !self.can_sleep {
                    self.set_active(true, queues);
                }
            }
        }
        Ok(moved)
    }

    /// Read kinematic state
    pub fn state(&self, state: BodyState) -> ParamValue {
        match state {
            BodyState::Transform => (*self.base.transform()).into(),
            BodyState::LinearVelocity => self.linear_velocity.into(),
            BodyState::AngularVelocity => self.angular_velocity.into(),
            BodyState::Sleeping => (!self.active).into(),
            BodyState::CanSleep => self.can_sleep.into(),
        }
    }

    /// Whether the body is in its space's active list
    pub const fn is_active(&self) -> bool {
        self.active
    }

    pub(crate) fn set_active(&mut self, active: bool, queues: Option<&mut SpaceQueues>) {
        if self.active == active {
            return;
        }
        self.active = active && self.mode != BodyMode::Static;
        if let Some(queues) = queues {
            if self.active {
                queues.active_bodies.push(self.rid());
            } else {
                queues.active_bodies.remove(&self.rid());
            }
        }
    }

    /// Wake a sleeping dynamic body
    pub(crate) fn wakeup(&mut self, queues: Option<&mut SpaceQueues>) {
        if self.base.space().is_none() || !self.mode.is_dynamic() {
            return;
        }
        self.set_active(true, queues);
    }

    /// Whether the body may fall asleep at all
    pub const fn can_sleep(&self) -> bool {
        self.can_sleep
    }

    /// Linear velocity
    pub const fn linear_velocity(&self) -> Vec3 {
        self.linear_velocity
    }

    pub(crate) fn set_linear_velocity(&mut self, velocity: Vec3) {
        self.linear_velocity = velocity;
    }

    /// Angular velocity
    pub const fn angular_velocity(&self) -> Vec3 {
        self.angular_velocity
    }

    pub(crate) fn set_angular_velocity(&mut self, velocity: Vec3) {
        self.angular_velocity = velocity;
    }

    /// Linear velocity at the start of the current step
    pub const fn prev_linear_velocity(&self) -> Vec3 {
        self.prev_linear_velocity
    }

    /// Angular velocity at the start of the current step
    pub const fn prev_angular_velocity(&self) -> Vec3 {
        self.prev_angular_velocity
    }

    /// Set the velocity component along `axis_velocity`'s direction to its length
    pub(crate) fn set_axis_velocity(&mut self, axis_velocity: Vec3, queues: Option<&mut SpaceQueues>) {
        let len = axis_velocity.norm();
        let mut v = self.linear_velocity;
        if len > CMP_EPSILON {
            let axis = axis_velocity / len;
            v -= axis * axis.dot(&v);
        }
        v += axis_velocity;
        self.linear_velocity = v;
        self.wakeup(queues);
    }

    /// Velocity of the material point at `rel_pos` (relative to the body origin,
    /// world orientation)
    pub fn velocity_at_local_point(&self, rel_pos: &Vec3) -> Vec3 {
        self.linear_velocity + self.angular_velocity.cross(&(rel_pos - self.center_of_mass))
    }

    /// Total mass
    pub const fn mass(&self) -> Real {
        self.mass
    }

    /// Inverse mass; zero for static and kinematic bodies
    pub const fn inv_mass(&self) -> Real {
        self.inv_mass
    }

    /// Inverse principal moments of inertia; zero for static and kinematic bodies
    pub const fn inv_inertia(&self) -> Vec3 {
        self.inv_inertia
    }

    /// Principal moments of inertia
    pub const fn principal_inertia(&self) -> Vec3 {
        self.principal_inertia
    }

    /// Inverse inertia tensor in world orientation
    pub const fn inv_inertia_tensor(&self) -> &Mat3 {
        &self.inv_inertia_tensor
    }

    /// Center of mass in body space
    pub const fn center_of_mass_local(&self) -> Vec3 {
        self.center_of_mass_local
    }

    /// Center of mass relative to the body origin, in world orientation
    pub const fn center_of_mass(&self) -> Vec3 {
        self.center_of_mass
    }

    /// Restitution
    pub const fn bounce(&self) -> Real {
        self.bounce
    }

    /// Friction
    pub const fn friction(&self) -> Real {
        self.friction
    }

    /// Gravity applied during the last force integration
    pub const fn total_gravity(&self) -> Vec3 {
        self.total_gravity
    }

    /// Linear damping applied during the last force integration
    pub const fn total_linear_damp(&self) -> Real {
        self.total_linear_damp
    }

    /// Angular damping applied during the last force integration
    pub const fn total_angular_damp(&self) -> Real {
        self.total_angular_damp
    }

    /// Lock or unlock motion along the given axes
    pub(crate) fn set_axis_lock(&mut self, axes: BodyAxis, locked: bool) {
        self.locked_axes.set(axes, locked);
    }

    /// Whether every axis in `axes` is locked
    pub const fn is_axis_locked(&self, axes: BodyAxis) -> bool {
        self.locked_axes.contains(axes)
    }

    /// Skip the built-in force integration (a custom integrator takes over)
    pub(crate) fn set_omit_force_integration(&mut self, omit: bool) {
        self.omit_force_integration = omit;
    }

    /// Whether the built-in force integration is skipped
    pub const fn omits_force_integration(&self) -> bool {
        self.omit_force_integration
    }

    pub(crate) fn set_max_contacts_reported(&mut self, max: usize) {
        self.max_contacts_reported = max;
        self.contacts.truncate(max);
    }

    /// How many contacts are kept for reporting
    pub const fn max_contacts_reported(&self) -> usize {
        self.max_contacts_reported
    }

    /// Whether contacts are kept for reporting
    pub const fn can_report_contacts(&self) -> bool {
        self.max_contacts_reported > 0
    }

    /// Contacts kept during the last step
    pub fn contacts(&self) -> &[ReportedContact] {
        &self.contacts
    }

    /// Keep a contact for reporting, replacing the shallowest one when full
    pub(crate) fn add_contact(&mut self, contact: ReportedContact) {
        if self.max_contacts_reported == 0 {
            return;
        }
        if self.contacts.len() < self.max_contacts_reported {
            self.contacts.push(contact);
            return;
        }
        let least = self
            .contacts
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| a.depth.total_cmp(&b.depth))
            .map(|(i, c)| (i, c.depth));
        if let Some((index, depth)) = least {
            if depth < contact.depth {
                self.contacts[index] = contact;
            }
        }
    }

    pub(crate) fn add_exception(&mut self, other: ObjectRid) {
        self.exceptions.insert(other);
    }

    pub(crate) fn remove_exception(&mut self, other: ObjectRid) {
        self.exceptions.remove(&other);
    }

    /// Whether `other` is excluded from colliding with this body
    pub fn has_exception(&self, other: ObjectRid) -> bool {
        self.exceptions.contains(&other)
    }

    /// Collision exceptions in handle order
    pub fn exceptions(&self) -> impl Iterator<Item = ObjectRid> + '_ {
        self.exceptions.iter().copied()
    }

    /// Constraints this body takes part in, with its index inside each
    pub fn constraints(&self) -> impl Iterator<Item = (ConstraintRef, usize)> + '_ {
        self.constraints.iter().map(|(c, i)| (*c, *i))
    }

    pub(crate) fn add_constraint(&mut self, constraint: ConstraintRef, index: usize) {
        self.constraints.insert(constraint, index);
    }

    pub(crate) fn remove_constraint(&mut self, constraint: ConstraintRef) {
        self.constraints.remove(&constraint);
    }

    pub(crate) fn add_area(&mut self, area: AreaRid) {
        self.areas.add(area);
    }

    pub(crate) fn remove_area(&mut self, area: AreaRid) {
        self.areas.remove(area);
    }

    /// Whether a state sync or force integration callback wants this body's state
    pub fn has_queries(&self) -> bool {
        self.state_sync.is_some() || self.force_integration.is_some()
    }

    // Forces and impulses. Positions are relative to the body origin in world
    // orientation.

    /// Apply an impulse through the center of mass
    pub fn apply_central_impulse(&mut self, impulse: &Vec3) {
        self.linear_velocity += impulse * self.inv_mass;
    }

    /// Apply an impulse at `position`
    pub fn apply_impulse(&mut self, impulse: &Vec3, position: &Vec3) {
        self.linear_velocity += impulse * self.inv_mass;
        self.angular_velocity += self.inv_inertia_tensor * (position - self.center_of_mass).cross(impulse);
    }

    /// Apply an angular impulse
    pub fn apply_torque_impulse(&mut self, torque: &Vec3) {
        self.angular_velocity += self.inv_inertia_tensor * torque;
    }

    /// Apply a position correction impulse. A positive `max_delta_av` caps the
    /// angular velocity change; zero skips the angular part.
    pub(crate) fn apply_bias_impulse(&mut self, impulse: &Vec3, position: &Vec3, max_delta_av: Real) {
        self.biased_linear_velocity += impulse * self.inv_mass;
        if max_delta_av != 0.0 {
            let mut delta_av = self.inv_inertia_tensor * (position - self.center_of_mass).cross(impulse);
            let len = delta_av.norm();
            if max_delta_av > 0.0 && len > max_delta_av {
                delta_av *= max_delta_av / len;
            }
            self.biased_angular_velocity += delta_av;
        }
    }

    /// Accumulate a force through the center of mass for the next step
    pub fn apply_central_force(&mut self, force: &Vec3) {
        self.applied_force += force;
    }

    /// Accumulate a force at `position` for the next step
    pub fn apply_force(&mut self, force: &Vec3, position: &Vec3) {
        self.applied_force += force;
        self.applied_torque += (position - self.center_of_mass).cross(force);
    }

    /// Accumulate a torque for the next step
    pub fn apply_torque(&mut self, torque: &Vec3) {
        self.applied_torque += torque;
    }

    /// Add to the force applied every step
    pub fn add_constant_central_force(&mut self, force: &Vec3) {
        self.constant_force += force;
    }

    /// Add to the force applied every step at `position`
    pub fn add_constant_force(&mut self, force: &Vec3, position: &Vec3) {
        self.constant_force += force;
        self.constant_torque += (position - self.center_of_mass).cross(force);
    }

    /// Add to the torque applied every step
    pub fn add_constant_torque(&mut self, torque: &Vec3) {
        self.constant_torque += torque;
    }

    /// Force applied every step
    pub const fn constant_force(&self) -> Vec3 {
        self.constant_force
    }

    /// Replace the force applied every step
    pub fn set_constant_force(&mut self, force: Vec3) {
        self.constant_force = force;
    }

    /// Torque applied every step
    pub const fn constant_torque(&self) -> Vec3 {
        self.constant_torque
    }

    /// Replace the torque applied every step
    pub fn set_constant_torque(&mut self, torque: Vec3) {
        self.constant_torque = torque;
    }

    /// Mass each enabled shape receives, distributed by shape area
    pub fn shape_masses(&self, shapes: &SlotMap<ShapeRid, Shape>) -> Vec<(usize, Real)> {
        let areas: Vec<(usize, Real)> = self
            .base
            .shapes()
            .iter()
            .enumerate()
            .filter(|(_, entry)| !entry.disabled)
            .map(|(i, entry)| (i, shapes.get(entry.shape).map_or(0.0, Shape::area)))
            .collect();
        let total: Real = areas.iter().map(|(_, a)| a).sum();
        if total <= 0.0 {
            return Vec::new();
        }
        areas.into_iter().map(|(i, a)| (i, a * self.mass / total)).collect()
    }

    /// Recompute inverse mass, center of mass and the inertia tensor from the shapes
    pub fn update_mass_properties(&mut self, shapes: &SlotMap<ShapeRid, Shape>) {
        match self.mode {
            BodyMode::Dynamic => {
                let masses = self.shape_masses(shapes);
                if self.calculate_center_of_mass {
                    self.center_of_mass_local = Vec3::zeros();
                    if !masses.is_empty() {
                        for (i, mass) in &masses {
                            self.center_of_mass_local += self.base.shapes()[*i].transform.translation.vector * *mass;
                        }
                        self.center_of_mass_local /= self.mass;
                    }
                }
                if self.calculate_inertia {
                    let mut tensor = Mat3::zeros();
                    let mut inertia_set = false;
                    for (i, mass) in &masses {
                        let entry = &self.base.shapes()[*i];
                        let Some(shape) = shapes.get(entry.shape) else {
                            continue;
                        };
                        if *mass <= 0.0 {
                            continue;
                        }
                        inertia_set = true;
                        let basis = entry.transform.rotation.to_rotation_matrix().into_inner();
                        let local = Mat3::from_diagonal(&shape.moment_of_inertia(*mass));
                        let r = entry.transform.translation.vector - self.center_of_mass_local;
                        tensor += basis * local * basis.transpose() + (Mat3::identity() * r.dot(&r) - r * r.transpose()) * *mass;
                    }
                    if !inertia_set {
                        tensor = Mat3::identity();
                    }
                    for axis in 0..3 {
                        if self.inertia[axis] > 0.0 {
                            tensor[(axis, axis)] = self.inertia[axis];
                        }
                    }
                    let eigen = tensor.symmetric_eigen();
                    self.principal_inertia_axes_local = eigen.eigenvectors;
                    self.principal_inertia = eigen.eigenvalues;
                    self.inv_inertia = invert_components(&eigen.eigenvalues);
                }
                self.inv_mass = if self.mass > 0.0 { 1.0 / self.mass } else { 0.0 };
            }
            BodyMode::Static | BodyMode::Kinematic => {
                self.inv_inertia = Vec3::zeros();
                self.inv_mass = 0.0;
            }
            BodyMode::DynamicLinear => {
                self.inv_inertia = Vec3::zeros();
                self.inv_mass = 1.0 / self.mass;
            }
        }
        self.update_transform_dependent();
    }

    fn update_transform_dependent(&mut self) {
        let rotation = self.base.transform().rotation;
        self.center_of_mass = rotation * self.center_of_mass_local;
        let axes = rotation.to_rotation_matrix().into_inner() * self.principal_inertia_axes_local;
        self.inv_inertia_tensor = inverse_inertia_tensor(&axes, &self.inv_inertia);
    }

    /// Gather ambient gravity and damping, then integrate accumulated forces into
    /// the velocities. Returns the motion kinematic bodies will make this step.
    pub(crate) fn integrate_forces(&mut self, step: Real, areas: &SlotMap<AreaRid, Area>, default_area: Option<&Area>) -> Option<Vec3> {
        if self.mode == BodyMode::Static {
            return None;
        }

        let origin = self.base.transform().translation.vector;
        let Ambient { gravity, linear_damp, angular_damp } = self.areas.ambient(areas, default_area, &origin);
        self.total_gravity = gravity * self.gravity_scale;
        self.total_linear_damp = if self.linear_damp >= 0.0 { self.linear_damp } else { linear_damp };
        self.total_angular_damp = if self.angular_damp >= 0.0 { self.angular_damp } else { angular_damp };

        self.prev_linear_velocity = self.linear_velocity;
        self.prev_angular_velocity = self.angular_velocity;

        let mut motion = None;
        if self.mode == BodyMode::Kinematic {
            let current = *self.base.transform();
            let delta = self.new_transform.translation.vector - current.translation.vector;
            self.linear_velocity = self.constant_linear_velocity + delta / step;
            let rotation: Quat = self.new_transform.rotation * current.rotation.inverse();
            let spin = rotation.axis_angle().map_or_else(Vec3::zeros, |(axis, angle)| axis.into_inner() * (angle / step));
            self.angular_velocity = self.constant_angular_velocity + spin;
            motion = Some(delta);
        } else if !self.omit_force_integration {
            let force = self.total_gravity * self.mass + self.applied_force + self.constant_force;
            let torque = self.applied_torque + self.constant_torque;
            let damp = (1.0 - step * self.total_linear_damp).max(0.0);
            let angular_damp = (1.0 - step * self.total_angular_damp).max(0.0);
            self.linear_velocity *= damp;
            self.angular_velocity *= angular_damp;
            self.linear_velocity += force * (self.inv_mass * step);
            self.angular_velocity += self.inv_inertia_tensor * torque * step;
        }

        self.applied_force = Vec3::zeros();
        self.applied_torque = Vec3::zeros();
        self.biased_linear_velocity = Vec3::zeros();
        self.biased_angular_velocity = Vec3::zeros();
        self.contacts.clear();
        motion
    }

    /// Advance the transform by the solved velocities. Returns whether the
    /// body's proxies need refreshing.
    pub(crate) fn integrate_velocities(&mut self, step: Real, queues: &mut SpaceQueues) -> bool {
        if self.mode == BodyMode::Static {
            return false;
        }
        if self.has_queries() {
            queues.state_query.push(self.rid());
        }

        let origin = self.base.transform().translation.vector;
        for (i, axis) in LINEAR_AXES.iter().enumerate() {
            if self.locked_axes.contains(*axis) {
                self.linear_velocity[i] = 0.0;
                self.biased_linear_velocity[i] = 0.0;
                self.new_transform.translation.vector[i] = origin[i];
            }
        }
        for (i, axis) in ANGULAR_AXES.iter().enumerate() {
            if self.locked_axes.contains(*axis) {
                self.angular_velocity[i] = 0.0;
                self.biased_angular_velocity[i] = 0.0;
            }
        }

        if self.mode == BodyMode::Kinematic {
            self.base.set_transform(self.new_transform);
            self.update_transform_dependent();
            if self.contacts.is_empty() && self.linear_velocity == Vec3::zeros() && self.angular_velocity == Vec3::zeros() {
                self.set_active(false, Some(queues));
            }
            return false;
        }

        let mut transform = *self.base.transform();
        let total_angular = self.angular_velocity + self.biased_angular_velocity;
        let spin = total_angular.norm();
        if spin > CMP_EPSILON {
            let rotation = Quat::from_scaled_axis(total_angular * step);
            let com_before = transform.rotation * self.center_of_mass_local;
            let com_after = rotation * com_before;
            transform.translation.vector += com_before - com_after;
            transform.rotation = rotation * transform.rotation;
            transform = orthonormalized(&transform);
        }
        transform.translation.vector += (self.linear_velocity + self.biased_linear_velocity) * step;
        self.base.set_transform(transform);
        self.update_transform_dependent();
        true
    }

    /// Accumulate still time; true once the body has been still long enough to sleep
    pub(crate) fn sleep_test(&mut self, step: Real, linear_threshold: Real, angular_threshold: Real, time_to_sleep: Real) -> bool {
        if !self.mode.is_dynamic() {
            return true;
        }
        if !self.can_sleep {
            return false;
        }
        if self.angular_velocity.norm() < angular_threshold && self.linear_velocity.norm_squared() < linear_threshold * linear_threshold {
            self.still_time += step;
            self.still_time > time_to_sleep
        } else {
            self.still_time = 0.0;
            false
        }
    }

    /// Seconds the body has been continuously still
    pub const fn still_time(&self) -> Real {
        self.still_time
    }

    /// Transform the body is moved to during the next step (kinematic bodies)
    pub const fn new_transform(&self) -> &Transform {
        &self.new_transform
    }
}

fn invert_components(v: &Vec3) -> Vec3 {
    v.map(|x| if x == 0.0 { 0.0 } else { 1.0 / x })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::{ShapeData, ShapeType};
    use crate::foundation::math::translation;
    use approx::assert_relative_eq;

    fn body_with(shapes: &mut SlotMap<ShapeRid, Shape>, parts: &[(ShapeType, Vec3)]) -> Body {
        let mut bodies: SlotMap<BodyRid, ()> = SlotMap::with_key();
        let mut body = Body::new(bodies.insert(()));
        for (kind, offset) in parts {
            let rid = shapes.insert(Shape::new(*kind));
            body.base_mut().push_shape(rid, translation(*offset), false);
        }
        body
    }

    #[test]
    fn test_static_and_kinematic_have_no_inverse_mass() {
        let mut shapes = SlotMap::with_key();
        let mut body = body_with(&mut shapes, &[(ShapeType::Box, Vec3::zeros())]);
        body.update_mass_properties(&shapes);
        assert!(body.inv_mass() > 0.0);

        for mode in [BodyMode::Static, BodyMode::Kinematic] {
            body.set_mode(mode, None);
            assert_eq!(body.inv_mass(), 0.0);
            assert_eq!(body.inv_inertia(), Vec3::zeros());
            body.set_param(BodyParameter::Mass, ParamValue::Real(4.0), None).unwrap();
            body.update_mass_properties(&shapes);
            assert_eq!(body.inv_mass(), 0.0);
            assert_eq!(body.inv_inertia(), Vec3::zeros());
        }
    }

    #[test]
    fn test_non_positive_mass_rejected() {
        let mut bodies: SlotMap<BodyRid, ()> = SlotMap::with_key();
        let mut body = Body::new(bodies.insert(()));
        assert!(body.set_param(BodyParameter::Mass, ParamValue::Real(0.0), None).is_err());
        assert!(body.set_param(BodyParameter::Mass, ParamValue::Real(-2.0), None).is_err());
        assert_relative_eq!(body.mass(), 1.0);
    }

    #[test]
    fn test_mass_is_conserved_across_shapes() {
        let mut shapes = SlotMap::with_key();
        let mut body = body_with(
            &mut shapes,
            &[(ShapeType::Box, Vec3::zeros()), (ShapeType::Sphere, Vec3::new(2.0, 0.0, 0.0)), (ShapeType::Capsule, Vec3::new(0.0, 3.0, 0.0))],
        );
        body.set_param(BodyParameter::Mass, ParamValue::Real(7.5), None).unwrap();
        let total: Real = body.shape_masses(&shapes).iter().map(|(_, m)| m).sum();
        assert_relative_eq!(total, 7.5, epsilon = 1e-4);
    }

    #[test]
    fn test_center_of_mass_is_area_weighted() {
        let mut shapes = SlotMap::with_key();
        let mut body = body_with(&mut shapes, &[(ShapeType::Box, Vec3::new(-1.0, 0.0, 0.0)), (ShapeType::Box, Vec3::new(3.0, 0.0, 0.0))]);
        body.update_mass_properties(&shapes);
        assert_relative_eq!(body.center_of_mass_local(), Vec3::new(1.0, 0.0, 0.0), epsilon = 1e-5);
    }

    #[test]
    fn test_update_mass_properties_is_idempotent() {
        let mut shapes = SlotMap::with_key();
        let mut body = body_with(&mut shapes, &[(ShapeType::Box, Vec3::new(0.5, 0.0, 0.0)), (ShapeType::Cylinder, Vec3::new(0.0, 1.0, 1.0))]);
        body.update_mass_properties(&shapes);
        let com = body.center_of_mass_local();
        let inv = body.inv_inertia();
        let tensor = *body.inv_inertia_tensor();
        body.update_mass_properties(&shapes);
        assert_relative_eq!(body.center_of_mass_local(), com, epsilon = 1e-6);
        assert_relative_eq!(body.inv_inertia(), inv, epsilon = 1e-6);
        assert_relative_eq!(*body.inv_inertia_tensor(), tensor, epsilon = 1e-6);
    }

    #[test]
    fn test_sphere_inertia() {
        let mut shapes = SlotMap::with_key();
        let mut body = body_with(&mut shapes, &[(ShapeType::Sphere, Vec3::zeros())]);
        body.set_param(BodyParameter::Mass, ParamValue::Real(2.0), None).unwrap();
        body.update_mass_properties(&shapes);
        // 2/5 * m * r^2 with r = 0.5
        assert_relative_eq!(body.inv_inertia(), Vec3::repeat(1.0 / 0.2), epsilon = 1e-3);
    }

    #[test]
    fn test_custom_inertia_pins_moments() {
        let mut shapes = SlotMap::with_key();
        let mut body = body_with(&mut shapes, &[(ShapeType::Box, Vec3::zeros())]);
        body.set_param(BodyParameter::Inertia, ParamValue::Vector(Vec3::new(2.0, 4.0, 8.0)), None).unwrap();
        assert_relative_eq!(body.inv_inertia(), Vec3::new(0.5, 0.25, 0.125), epsilon = 1e-6);
    }

    #[test]
    fn test_disabled_shapes_take_no_mass() {
        let mut shapes = SlotMap::with_key();
        let mut body = body_with(&mut shapes, &[(ShapeType::Box, Vec3::zeros()), (ShapeType::Box, Vec3::new(4.0, 0.0, 0.0))]);
        body.base_mut().set_shape_disabled(1, true).unwrap();
        let masses = body.shape_masses(&shapes);
        assert_eq!(masses.len(), 1);
        assert_relative_eq!(masses[0].1, 1.0);
    }

    #[test]
    fn test_damped_force_integration() {
        let mut shapes = SlotMap::with_key();
        let mut body = body_with(&mut shapes, &[(ShapeType::Sphere, Vec3::zeros())]);
        body.update_mass_properties(&shapes);
        body.set_param(BodyParameter::LinearDamp, ParamValue::Real(0.0), None).unwrap();
        body.apply_central_force(&Vec3::new(6.0, 0.0, 0.0));
        let areas = SlotMap::with_key();
        body.integrate_forces(0.5, &areas, None);
        assert_relative_eq!(body.linear_velocity(), Vec3::new(3.0, 0.0, 0.0), epsilon = 1e-6);

        // The accumulator is cleared; only damping acts now.
        body.set_param(BodyParameter::LinearDamp, ParamValue::Real(1.0), None).unwrap();
        body.integrate_forces(0.5, &areas, None);
        assert_relative_eq!(body.linear_velocity(), Vec3::new(1.5, 0.0, 0.0), epsilon = 1e-6);
    }

    #[test]
    fn test_kinematic_velocity_from_target() {
        let mut bodies: SlotMap<BodyRid, ()> = SlotMap::with_key();
        let mut body = Body::new(bodies.insert(()));
        body.set_mode(BodyMode::Kinematic, None);
        body.set_state(BodyState::Transform, ParamValue::Transform(Transform::identity()), None).unwrap();
        body.set_state(BodyState::Transform, ParamValue::Transform(translation(Vec3::new(1.0, 0.0, 0.0))), None).unwrap();
        let areas = SlotMap::with_key();
        let motion = body.integrate_forces(0.25, &areas, None);
        assert_eq!(motion, Some(Vec3::new(1.0, 0.0, 0.0)));
        assert_relative_eq!(body.linear_velocity(), Vec3::new(4.0, 0.0, 0.0), epsilon = 1e-6);

        let mut queues = SpaceQueues::default();
        body.integrate_velocities(0.25, &mut queues);
        assert_relative_eq!(body.base().transform().translation.vector, Vec3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn test_rotation_pivots_about_center_of_mass() {
        let mut shapes = SlotMap::with_key();
        let mut body = body_with(&mut shapes, &[(ShapeType::Sphere, Vec3::new(1.0, 0.0, 0.0))]);
        body.update_mass_properties(&shapes);
        body.set_angular_velocity(Vec3::new(0.0, std::f32::consts::PI, 0.0));
        let mut queues = SpaceQueues::default();
        body.integrate_velocities(1.0, &mut queues);
        let com_world = xform_com(&body);
        assert_relative_eq!(com_world, Vec3::new(1.0, 0.0, 0.0), epsilon = 1e-4);
    }

    fn xform_com(body: &Body) -> Vec3 {
        crate::foundation::math::xform(body.base().transform(), &body.center_of_mass_local())
    }

    #[test]
    fn test_sleep_test_resets_on_motion() {
        let mut bodies: SlotMap<BodyRid, ()> = SlotMap::with_key();
        let mut body = Body::new(bodies.insert(()));
        assert!(!body.sleep_test(0.3, 0.1, 0.1, 0.5));
        assert!(body.sleep_test(0.3, 0.1, 0.1, 0.5));
        body.set_linear_velocity(Vec3::new(1.0, 0.0, 0.0));
        assert!(!body.sleep_test(0.3, 0.1, 0.1, 0.5));
        assert_eq!(body.still_time(), 0.0);
    }

    #[test]
    fn test_reported_contacts_keep_deepest() {
        let mut bodies: SlotMap<BodyRid, ()> = SlotMap::with_key();
        let rid = bodies.insert(());
        let mut body = Body::new(rid);
        body.set_max_contacts_reported(2);
        let contact = |depth| ReportedContact {
            local_position: Vec3::zeros(),
            local_normal: Vec3::y(),
            depth,
            local_shape: 0,
            local_velocity_at_position: Vec3::zeros(),
            collider_position: Vec3::zeros(),
            collider_shape: 0,
            collider_instance_id: 0,
            collider: ObjectRid::Body(rid),
            collider_velocity_at_position: Vec3::zeros(),
            impulse: Vec3::zeros(),
        };
        body.add_contact(contact(0.1));
        body.add_contact(contact(0.3));
        body.add_contact(contact(0.2));
        body.add_contact(contact(0.05));
        let mut depths: Vec<Real> = body.contacts().iter().map(|c| c.depth).collect();
        depths.sort_by(Real::total_cmp);
        assert_eq!(depths, vec![0.2, 0.3]);
    }

    #[test]
    fn test_axis_velocity() {
        let mut bodies: SlotMap<BodyRid, ()> = SlotMap::with_key();
        let mut body = Body::new(bodies.insert(()));
        body.set_linear_velocity(Vec3::new(2.0, -5.0, 0.0));
        body.set_axis_velocity(Vec3::new(0.0, 3.0, 0.0), None);
        assert_relative_eq!(body.linear_velocity(), Vec3::new(2.0, 3.0, 0.0));
    }

    #[test]
    fn test_shape_data_changes_mass_split() {
        let mut shapes = SlotMap::with_key();
        let mut body = body_with(&mut shapes, &[(ShapeType::Box, Vec3::zeros()), (ShapeType::Box, Vec3::new(2.0, 0.0, 0.0))]);
        let second = body.base().shape(1).unwrap().shape;
        shapes[second].set_data(ShapeData::Box { half_extents: Vec3::new(1.0, 0.5, 0.5) }).unwrap();
        let masses = body.shape_masses(&shapes);
        assert_relative_eq!(masses[0].1, 1.0 / 3.0, epsilon = 1e-5);
        assert_relative_eq!(masses[1].1, 2.0 / 3.0, epsilon = 1e-5);
    }
}
