//! Rigid body entry points

use std::any::Any;

use super::{invalid, PhysicsServer};
use crate::ensure;
use crate::error::{PhysicsError, PhysicsResult};
use crate::foundation::math::{Real, Transform, Vec3};
use crate::object::body::{ForceIntegration, ForceIntegrationCallback, StateSyncCallback};
use crate::object::{Body, BodyAxis, BodyMode, BodyParameter, BodyState, DirectBodyState};
use crate::param::ParamValue;
use crate::rid::{BodyRid, ObjectRid, ShapeRid, SpaceRid};
use crate::space::{MotionParameters, MotionResult, SpaceQueues};

const KIND: &str = "body";

impl PhysicsServer {
    /// Create a detached dynamic body
    pub fn body_create(&mut self) -> BodyRid {
        self.objects.bodies.insert_with_key(Body::new)
    }

    fn body(&self, rid: BodyRid) -> PhysicsResult<&Body> {
        self.objects.bodies.get(rid).ok_or_else(|| invalid(KIND, rid))
    }

    /// The body plus the work lists of its space, borrowed together
    fn body_and_queues(&mut self, rid: BodyRid) -> PhysicsResult<(&mut Body, Option<&mut SpaceQueues>)> {
        let body = self.objects.bodies.get_mut(rid).ok_or_else(|| invalid(KIND, rid))?;
        let queues = Self::queues_of(&mut self.spaces, body.base().space());
        Ok((body, queues))
    }

    /// Mutate a body through `f`, then wake it
    fn body_wake_with(&mut self, rid: BodyRid, f: impl FnOnce(&mut Body)) -> PhysicsResult<()> {
        let (body, queues) = self.body_and_queues(rid)?;
        f(body);
        body.wakeup(queues);
        Ok(())
    }

    /// Move a body to a space, or out of any
    pub fn body_set_space(&mut self, rid: BodyRid, space: Option<SpaceRid>) -> PhysicsResult<()> {
        self.object_set_space(ObjectRid::Body(rid), KIND, space)
    }

    /// Space the body belongs to
    pub fn body_get_space(&self, rid: BodyRid) -> PhysicsResult<Option<SpaceRid>> {
        Ok(self.body(rid)?.base().space())
    }

    /// Switch simulation mode
    pub fn body_set_mode(&mut self, rid: BodyRid, mode: BodyMode) -> PhysicsResult<()> {
        let (body, queues) = self.body_and_queues(rid)?;
        let static_changed = body.set_mode(mode, queues);
        let space_rid = body.base().space();
        if static_changed {
            if let Some(space) = space_rid.and_then(|s| self.spaces.get_mut(s)) {
                space.refresh_static(ObjectRid::Body(rid), &self.objects);
            }
        }
        Ok(())
    }

    /// Simulation mode
    pub fn body_get_mode(&self, rid: BodyRid) -> PhysicsResult<BodyMode> {
        Ok(self.body(rid)?.mode())
    }

    /// Attach a shape at `transform` (body space)
    pub fn body_add_shape(&mut self, rid: BodyRid, shape: ShapeRid, transform: Transform, disabled: bool) -> PhysicsResult<()> {
        self.object_add_shape(ObjectRid::Body(rid), KIND, shape, transform, disabled)
    }

    /// Swap the shape at `index`
    pub fn body_set_shape(&mut self, rid: BodyRid, index: usize, shape: ShapeRid) -> PhysicsResult<()> {
        self.object_set_shape(ObjectRid::Body(rid), KIND, index, shape)
    }

    /// Move the shape at `index`
    pub fn body_set_shape_transform(&mut self, rid: BodyRid, index: usize, transform: Transform) -> PhysicsResult<()> {
        self.object_set_shape_transform(ObjectRid::Body(rid), KIND, index, transform)
    }

    /// Enable or disable the shape at `index`
    pub fn body_set_shape_disabled(&mut self, rid: BodyRid, index: usize, disabled: bool) -> PhysicsResult<()> {
        self.object_set_shape_disabled(ObjectRid::Body(rid), KIND, index, disabled)
    }

    /// Number of attached shapes
    pub fn body_get_shape_count(&self, rid: BodyRid) -> PhysicsResult<usize> {
        Ok(self.body(rid)?.base().shape_count())
    }

    /// Shape at `index`
    pub fn body_get_shape(&self, rid: BodyRid, index: usize) -> PhysicsResult<ShapeRid> {
        Ok(self.body(rid)?.base().shape(index)?.shape)
    }

    /// Body-space placement of the shape at `index`
    pub fn body_get_shape_transform(&self, rid: BodyRid, index: usize) -> PhysicsResult<Transform> {
        Ok(self.body(rid)?.base().shape(index)?.transform)
    }

    /// Whether the shape at `index` is disabled
    pub fn body_is_shape_disabled(&self, rid: BodyRid, index: usize) -> PhysicsResult<bool> {
        Ok(self.body(rid)?.base().shape(index)?.disabled)
    }

    /// Detach the shape at `index`
    pub fn body_remove_shape(&mut self, rid: BodyRid, index: usize) -> PhysicsResult<()> {
        self.body(rid)?;
        self.object_remove_shape(ObjectRid::Body(rid), index)
    }

    /// Detach every shape
    pub fn body_clear_shapes(&mut self, rid: BodyRid) -> PhysicsResult<()> {
        self.object_clear_shapes(ObjectRid::Body(rid), KIND)
    }

    /// Tag handed back in contact and overlap reports
    pub fn body_attach_object_instance_id(&mut self, rid: BodyRid, id: u64) -> PhysicsResult<()> {
        self.base_mut(ObjectRid::Body(rid), KIND)?.set_instance_id(id);
        Ok(())
    }

    /// Owner tag
    pub fn body_get_object_instance_id(&self, rid: BodyRid) -> PhysicsResult<u64> {
        Ok(self.body(rid)?.base().instance_id())
    }

    /// Layers this body is found on
    pub fn body_set_collision_layer(&mut self, rid: BodyRid, layer: u32) -> PhysicsResult<()> {
        self.base_mut(ObjectRid::Body(rid), KIND)?.set_collision_layer(layer);
        self.object_filters_changed(ObjectRid::Body(rid));
        Ok(())
    }

    /// Layers this body is found on
    pub fn body_get_collision_layer(&self, rid: BodyRid) -> PhysicsResult<u32> {
        Ok(self.body(rid)?.base().collision_layer())
    }

    /// Layers this body looks for
    pub fn body_set_collision_mask(&mut self, rid: BodyRid, mask: u32) -> PhysicsResult<()> {
        self.base_mut(ObjectRid::Body(rid), KIND)?.set_collision_mask(mask);
        self.object_filters_changed(ObjectRid::Body(rid));
        Ok(())
    }

    /// Layers this body looks for
    pub fn body_get_collision_mask(&self, rid: BodyRid) -> PhysicsResult<u32> {
        Ok(self.body(rid)?.base().collision_mask())
    }

    /// How strongly this body resists being pushed out of overlaps
    pub fn body_set_collision_priority(&mut self, rid: BodyRid, priority: Real) -> PhysicsResult<()> {
        ensure!(priority > 0.0, PhysicsError::precondition(format!("collision priority must be positive, got {priority}")));
        self.base_mut(ObjectRid::Body(rid), KIND)?.set_collision_priority(priority);
        Ok(())
    }

    /// Whether rays with `pick_ray` set can hit this body
    pub fn body_set_ray_pickable(&mut self, rid: BodyRid, pickable: bool) -> PhysicsResult<()> {
        self.base_mut(ObjectRid::Body(rid), KIND)?.set_ray_pickable(pickable);
        Ok(())
    }

    /// Set a physical parameter
    pub fn body_set_param(&mut self, rid: BodyRid, param: BodyParameter, value: ParamValue) -> PhysicsResult<()> {
        let (body, queues) = self.body_and_queues(rid)?;
        body.set_param(param, value, queues)
    }

    /// Read a physical parameter
    pub fn body_get_param(&self, rid: BodyRid, param: BodyParameter) -> PhysicsResult<ParamValue> {
        Ok(self.body(rid)?.param(param))
    }

    /// Go back to inertia and center of mass computed from the shapes
    pub fn body_reset_mass_properties(&mut self, rid: BodyRid) -> PhysicsResult<()> {
        let (body, queues) = self.body_and_queues(rid)?;
        body.reset_mass_properties(queues);
        Ok(())
    }

    /// Set kinematic state
    pub fn body_set_state(&mut self, rid: BodyRid, state: BodyState, value: ParamValue) -> PhysicsResult<()> {
        let (body, queues) = self.body_and_queues(rid)?;
        if body.set_state(state, value, queues)? {
            self.object_moved(ObjectRid::Body(rid));
        }
        Ok(())
    }

    /// Read kinematic state
    pub fn body_get_state(&self, rid: BodyRid, state: BodyState) -> PhysicsResult<ParamValue> {
        Ok(self.body(rid)?.state(state))
    }

    /// Replace the velocity component along the vector's direction
    pub fn body_set_axis_velocity(&mut self, rid: BodyRid, axis_velocity: Vec3) -> PhysicsResult<()> {
        let (body, queues) = self.body_and_queues(rid)?;
        body.set_axis_velocity(axis_velocity, queues);
        Ok(())
    }

    /// Lock or unlock motion along axes
    pub fn body_set_axis_lock(&mut self, rid: BodyRid, axes: BodyAxis, locked: bool) -> PhysicsResult<()> {
        self.body_wake_with(rid, |body| body.set_axis_lock(axes, locked))
    }

    /// Whether every axis in `axes` is locked
    pub fn body_is_axis_locked(&self, rid: BodyRid, axes: BodyAxis) -> PhysicsResult<bool> {
        Ok(self.body(rid)?.is_axis_locked(axes))
    }

    /// Apply an impulse through the center of mass
    pub fn body_apply_central_impulse(&mut self, rid: BodyRid, impulse: Vec3) -> PhysicsResult<()> {
        self.body_wake_with(rid, |body| body.apply_central_impulse(&impulse))
    }

    /// Apply an impulse at `position` (relative to the body origin)
    pub fn body_apply_impulse(&mut self, rid: BodyRid, impulse: Vec3, position: Vec3) -> PhysicsResult<()> {
        self.body_wake_with(rid, |body| body.apply_impulse(&impulse, &position))
    }

    /// Apply an angular impulse
    pub fn body_apply_torque_impulse(&mut self, rid: BodyRid, torque: Vec3) -> PhysicsResult<()> {
        self.body_wake_with(rid, |body| body.apply_torque_impulse(&torque))
    }

    /// Apply a force through the center of mass for the next step
    pub fn body_apply_central_force(&mut self, rid: BodyRid, force: Vec3) -> PhysicsResult<()> {
        self.body_wake_with(rid, |body| body.apply_central_force(&force))
    }

    /// Apply a force at `position` for the next step
    pub fn body_apply_force(&mut self, rid: BodyRid, force: Vec3, position: Vec3) -> PhysicsResult<()> {
        self.body_wake_with(rid, |body| body.apply_force(&force, &position))
    }

    /// Apply a torque for the next step
    pub fn body_apply_torque(&mut self, rid: BodyRid, torque: Vec3) -> PhysicsResult<()> {
        self.body_wake_with(rid, |body| body.apply_torque(&torque))
    }

    /// Add to the force applied every step through the center of mass
    pub fn body_add_constant_central_force(&mut self, rid: BodyRid, force: Vec3) -> PhysicsResult<()> {
        self.body_wake_with(rid, |body| body.add_constant_central_force(&force))
    }

    /// Add to the force applied every step at `position`
    pub fn body_add_constant_force(&mut self, rid: BodyRid, force: Vec3, position: Vec3) -> PhysicsResult<()> {
        self.body_wake_with(rid, |body| body.add_constant_force(&force, &position))
    }

    /// Add to the torque applied every step
    pub fn body_add_constant_torque(&mut self, rid: BodyRid, torque: Vec3) -> PhysicsResult<()> {
        self.body_wake_with(rid, |body| body.add_constant_torque(&torque))
    }

    /// Force applied every step
    pub fn body_set_constant_force(&mut self, rid: BodyRid, force: Vec3) -> PhysicsResult<()> {
        self.body_wake_with(rid, |body| body.set_constant_force(force))
    }

    /// Force applied every step
    pub fn body_get_constant_force(&self, rid: BodyRid) -> PhysicsResult<Vec3> {
        Ok(self.body(rid)?.constant_force())
    }

    /// Torque applied every step
    pub fn body_set_constant_torque(&mut self, rid: BodyRid, torque: Vec3) -> PhysicsResult<()> {
        self.body_wake_with(rid, |body| body.set_constant_torque(torque))
    }

    /// Torque applied every step
    pub fn body_get_constant_torque(&self, rid: BodyRid) -> PhysicsResult<Vec3> {
        Ok(self.body(rid)?.constant_torque())
    }

    /// Never collide with `other`
    pub fn body_add_collision_exception(&mut self, rid: BodyRid, other: impl Into<ObjectRid>) -> PhysicsResult<()> {
        let other = other.into();
        self.body_wake_with(rid, |body| body.add_exception(other))
    }

    /// Collide with `other` again
    pub fn body_remove_collision_exception(&mut self, rid: BodyRid, other: impl Into<ObjectRid>) -> PhysicsResult<()> {
        let other = other.into();
        self.body_wake_with(rid, |body| body.remove_exception(other))
    }

    /// Objects this body never collides with
    pub fn body_get_collision_exceptions(&self, rid: BodyRid) -> PhysicsResult<Vec<ObjectRid>> {
        Ok(self.body(rid)?.exceptions().collect())
    }

    /// How many contacts are kept for the direct body state
    pub fn body_set_max_contacts_reported(&mut self, rid: BodyRid, max: usize) -> PhysicsResult<()> {
        self.objects.bodies.get_mut(rid).ok_or_else(|| invalid(KIND, rid))?.set_max_contacts_reported(max);
        Ok(())
    }

    /// How many contacts are kept for the direct body state
    pub fn body_get_max_contacts_reported(&self, rid: BodyRid) -> PhysicsResult<usize> {
        Ok(self.body(rid)?.max_contacts_reported())
    }

    /// Accepted for API compatibility; contact reporting has no depth filter
    pub fn body_set_contacts_reported_depth_threshold(&mut self, rid: BodyRid, _threshold: Real) -> PhysicsResult<()> {
        self.body(rid)?;
        Ok(())
    }

    /// Always zero, see [`Self::body_set_contacts_reported_depth_threshold`]
    pub fn body_get_contacts_reported_depth_threshold(&self, rid: BodyRid) -> PhysicsResult<Real> {
        self.body(rid)?;
        Ok(0.0)
    }

    /// Skip the built-in gravity and damping integration
    pub fn body_set_omit_force_integration(&mut self, rid: BodyRid, omit: bool) -> PhysicsResult<()> {
        self.objects.bodies.get_mut(rid).ok_or_else(|| invalid(KIND, rid))?.set_omit_force_integration(omit);
        Ok(())
    }

    /// Whether the built-in integration is skipped
    pub fn body_is_omitting_force_integration(&self, rid: BodyRid) -> PhysicsResult<bool> {
        Ok(self.body(rid)?.omits_force_integration())
    }

    /// Receive the body's state from `flush_queries` after every step it moved
    pub fn body_set_state_sync_callback(&mut self, rid: BodyRid, callback: Option<StateSyncCallback>) -> PhysicsResult<()> {
        self.objects.bodies.get_mut(rid).ok_or_else(|| invalid(KIND, rid))?.state_sync = callback;
        Ok(())
    }

    /// Custom force integrator run from `flush_queries`, with the user data
    /// handed back on every call
    pub fn body_set_force_integration_callback(
        &mut self,
        rid: BodyRid,
        callback: Option<ForceIntegrationCallback>,
        user_data: Option<Box<dyn Any + Send>>,
    ) -> PhysicsResult<()> {
        let body = self.objects.bodies.get_mut(rid).ok_or_else(|| invalid(KIND, rid))?;
        body.force_integration = callback.map(|callback| ForceIntegration { callback, user_data });
        Ok(())
    }

    /// Run `f` against the body's direct state. Proxies follow if `f` moved it.
    pub fn body_get_direct_state<R>(&mut self, rid: BodyRid, f: impl FnOnce(&mut DirectBodyState<'_>) -> R) -> PhysicsResult<R> {
        self.ensure_direct_state_available()?;
        self.ensure_object_unlocked(ObjectRid::Body(rid))?;
        let step = self.last_step;
        let (body, queues) = self.body_and_queues(rid)?;
        let mut state = DirectBodyState::new(body, queues, step);
        let result = f(&mut state);
        let moved = state.moved();
        if moved {
            self.object_moved(ObjectRid::Body(rid));
        }
        Ok(result)
    }

    /// Sweep the body along `params.motion` from `params.from`
    pub fn body_test_motion(&self, rid: BodyRid, params: &MotionParameters) -> PhysicsResult<MotionResult> {
        let body = self.body(rid)?;
        let space_rid = body.base().space().ok_or_else(|| {
            let err = PhysicsError::precondition("body_test_motion needs a body inside a space");
            log::error!("{}", err);
            err
        })?;
        let space = self.spaces.get(space_rid).ok_or_else(|| invalid("space", space_rid))?;
        space.ensure_unlocked()?;
        space.test_body_motion(rid, &self.objects, &self.shapes, params)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use crate::collision::{ShapeData, ShapeType};
    use crate::config::PhysicsSettings;
    use crate::foundation::math::{translation, Transform, Vec3};
    use crate::object::{BodyAxis, BodyMode, BodyParameter, BodyState};
    use crate::param::ParamValue;
    use crate::rid::ObjectRid;
    use crate::server::PhysicsServer;
    use approx::assert_relative_eq;

    fn server() -> PhysicsServer {
        PhysicsServer::new(PhysicsSettings::default()).unwrap()
    }

    #[test]
    fn test_static_and_kinematic_have_no_inverse_mass() {
        let mut server = server();
        let space = server.space_create().unwrap();
        let sphere = server.shape_create(ShapeType::Sphere);
        let body = server.body_create();
        server.body_add_shape(body, sphere, Transform::identity(), false).unwrap();
        server.body_set_space(body, Some(space)).unwrap();
        for mode in [BodyMode::Static, BodyMode::Kinematic] {
            server.body_set_mode(body, mode).unwrap();
            assert_eq!(server.body_get_mode(body).unwrap(), mode);
            let b = &server.objects.bodies[body];
            assert_relative_eq!(b.inv_mass(), 0.0);
            assert_relative_eq!(b.inv_inertia(), Vec3::zeros());
        }
        server.body_set_mode(body, BodyMode::Dynamic).unwrap();
        assert_relative_eq!(server.objects.bodies[body].inv_mass(), 1.0);
    }

    #[test]
    fn test_rejects_non_positive_mass() {
        let mut server = server();
        let body = server.body_create();
        assert!(server.body_set_param(body, BodyParameter::Mass, ParamValue::Real(0.0)).is_err());
        assert!(server.body_set_param(body, BodyParameter::Mass, ParamValue::Real(-2.0)).is_err());
        assert_relative_eq!(server.body_get_param(body, BodyParameter::Mass).unwrap().as_real().unwrap(), 1.0);
    }

    #[test]
    fn test_invalid_handle_is_rejected() {
        let mut server = server();
        let body = server.body_create();
        server.free(body).unwrap();
        assert!(server.body_get_mode(body).is_err());
        assert!(server.body_apply_central_impulse(body, Vec3::x()).is_err());
        assert!(server.body_set_state(body, BodyState::Sleeping, ParamValue::Bool(true)).is_err());
    }

    #[test]
    fn test_shape_list_editing() {
        let mut server = server();
        let sphere = server.shape_create(ShapeType::Sphere);
        let cube = server.shape_create(ShapeType::Box);
        let body = server.body_create();
        server.body_add_shape(body, sphere, Transform::identity(), false).unwrap();
        server.body_add_shape(body, cube, translation(Vec3::x()), true).unwrap();
        assert_eq!(server.body_get_shape_count(body).unwrap(), 2);
        assert!(server.body_is_shape_disabled(body, 1).unwrap());
        assert_relative_eq!(server.body_get_shape_transform(body, 1).unwrap().translation.vector, Vec3::x());

        server.body_set_shape(body, 0, cube).unwrap();
        assert_eq!(server.body_get_shape(body, 0).unwrap(), cube);
        assert!(server.shapes[sphere].owners().is_empty());

        server.body_remove_shape(body, 0).unwrap();
        assert_eq!(server.body_get_shape_count(body).unwrap(), 1);
        assert!(server.body_remove_shape(body, 4).is_err());
        server.body_clear_shapes(body).unwrap();
        assert!(server.shapes[cube].owners().is_empty());
    }

    #[test]
    fn test_exceptions_and_axis_lock() {
        let mut server = server();
        let a = server.body_create();
        let b = server.body_create();
        server.body_add_collision_exception(a, b).unwrap();
        assert_eq!(server.body_get_collision_exceptions(a).unwrap(), vec![ObjectRid::Body(b)]);
        server.body_remove_collision_exception(a, b).unwrap();
        assert!(server.body_get_collision_exceptions(a).unwrap().is_empty());

        server.body_set_axis_lock(a, BodyAxis::LINEAR_X | BodyAxis::ANGULAR_Z, true).unwrap();
        assert!(server.body_is_axis_locked(a, BodyAxis::LINEAR_X).unwrap());
        assert!(!server.body_is_axis_locked(a, BodyAxis::LINEAR_Y).unwrap());
    }

    #[test]
    fn test_depth_threshold_is_inert() {
        let mut server = server();
        let body = server.body_create();
        server.body_set_contacts_reported_depth_threshold(body, 0.5).unwrap();
        assert_relative_eq!(server.body_get_contacts_reported_depth_threshold(body).unwrap(), 0.0);
    }

    #[test]
    fn test_direct_state_moves_proxies() {
        let mut server = server();
        let space = server.space_create().unwrap();
        let sphere = server.shape_create(ShapeType::Sphere);
        server.shape_set_data(sphere, ShapeData::Sphere { radius: 0.5 }).unwrap();
        let body = server.body_create();
        server.body_add_shape(body, sphere, Transform::identity(), false).unwrap();
        server.body_set_space(body, Some(space)).unwrap();

        let moved_to = Vec3::new(10.0, 0.0, 0.0);
        let velocity = server
            .body_get_direct_state(body, |state| {
                state.set_transform(translation(moved_to));
                state.linear_velocity()
            })
            .unwrap();
        assert_relative_eq!(velocity, Vec3::zeros());

        let state = server.space_get_direct_state(space).unwrap();
        let hits = state.intersect_point(&moved_to, 4, &crate::space::QueryParameters::default());
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].rid, ObjectRid::Body(body));
    }

    #[test]
    fn test_state_sync_callback_runs_on_flush() {
        let mut server = server();
        let space = server.space_create().unwrap();
        server.space_set_active(space, true).unwrap();
        let body = server.body_create();
        server.body_set_space(body, Some(space)).unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        server
            .body_set_state_sync_callback(
                body,
                Some(Box::new(move |_state| {
                    seen.fetch_add(1, Ordering::SeqCst);
                })),
            )
            .unwrap();
        server.step(1.0 / 60.0).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        server.flush_queries();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        server.flush_queries();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_force_integration_callback_gets_user_data() {
        let mut server = server();
        let space = server.space_create().unwrap();
        server.space_set_active(space, true).unwrap();
        let body = server.body_create();
        server.body_set_space(body, Some(space)).unwrap();
        server.body_set_omit_force_integration(body, true).unwrap();
        server
            .body_set_force_integration_callback(
                body,
                Some(Box::new(|state, data| {
                    let push = data.and_then(|d| d.downcast_ref::<f32>().copied()).unwrap_or(0.0);
                    state.set_linear_velocity(Vec3::new(push, 0.0, 0.0));
                })),
                Some(Box::new(3.0_f32)),
            )
            .unwrap();
        server.step(1.0 / 60.0).unwrap();
        server.flush_queries();
        let v = server.body_get_state(body, BodyState::LinearVelocity).unwrap().as_vector().unwrap();
        assert_relative_eq!(v, Vec3::new(3.0, 0.0, 0.0), epsilon = 1e-6);
    }

    #[test]
    fn test_motion_needs_space() {
        let mut server = server();
        let body = server.body_create();
        let params = crate::space::MotionParameters::new(Transform::identity(), Vec3::x());
        assert!(server.body_test_motion(body, &params).is_err());
    }
}
