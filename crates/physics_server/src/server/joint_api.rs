//! Joint entry points

use super::{invalid, PhysicsServer};
use crate::constraint::{DampedSpringParameter, Joint, JointType, PinJointParameter};
use crate::error::PhysicsResult;
use crate::foundation::math::{Real, Vec3};
use crate::rid::{BodyRid, JointRid};

const KIND: &str = "joint";

impl PhysicsServer {
    /// Create an empty joint
    pub fn joint_create(&mut self) -> JointRid {
        self.joints.insert_with_key(Joint::new)
    }

    fn joint(&self, rid: JointRid) -> PhysicsResult<&Joint> {
        self.joints.get(rid).ok_or_else(|| invalid(KIND, rid))
    }

    fn joint_mut(&mut self, rid: JointRid) -> PhysicsResult<&mut Joint> {
        self.joints.get_mut(rid).ok_or_else(|| invalid(KIND, rid))
    }

    fn ensure_bodies(&self, a: BodyRid, b: Option<BodyRid>) -> PhysicsResult<()> {
        for body in std::iter::once(a).chain(b) {
            if !self.objects.bodies.contains_key(body) {
                return Err(invalid("body", body));
            }
        }
        Ok(())
    }

    /// Unlink a joint from its bodies, leaving it empty
    pub fn joint_clear(&mut self, rid: JointRid) -> PhysicsResult<()> {
        let Self { joints, objects, .. } = self;
        joints.get_mut(rid).ok_or_else(|| invalid(KIND, rid))?.clear(objects);
        Ok(())
    }

    /// Turn a joint into a pin between two body-space anchors. Without
    /// `body_b` the second anchor is a fixed world point.
    pub fn joint_make_pin(&mut self, rid: JointRid, body_a: BodyRid, local_a: Vec3, body_b: Option<BodyRid>, local_b: Vec3) -> PhysicsResult<()> {
        self.joint(rid)?;
        self.ensure_bodies(body_a, body_b)?;
        let kind = Joint::make_pin(body_a, local_a, body_b, local_b);
        let Self { joints, objects, .. } = self;
        if let Some(joint) = joints.get_mut(rid) {
            joint.reconfigure(kind, objects);
        }
        log::debug!("{:?} is now a pin between {:?} and {:?}", rid, body_a, body_b);
        Ok(())
    }

    /// Turn a joint into a damped spring resting at the current anchor distance
    pub fn joint_make_damped_spring(
        &mut self,
        rid: JointRid,
        body_a: BodyRid,
        anchor_a: Vec3,
        body_b: Option<BodyRid>,
        anchor_b: Vec3,
    ) -> PhysicsResult<()> {
        self.joint(rid)?;
        self.ensure_bodies(body_a, body_b)?;
        let kind = Joint::make_damped_spring(&self.objects, body_a, anchor_a, body_b, anchor_b)?;
        let Self { joints, objects, .. } = self;
        if let Some(joint) = joints.get_mut(rid) {
            joint.reconfigure(kind, objects);
        }
        log::debug!("{:?} is now a damped spring between {:?} and {:?}", rid, body_a, body_b);
        Ok(())
    }

    /// Kind of behaviour behind a joint
    pub fn joint_get_type(&self, rid: JointRid) -> PhysicsResult<JointType> {
        Ok(self.joint(rid)?.joint_type())
    }

    /// Set a pin parameter; the joint must be a pin
    pub fn pin_joint_set_param(&mut self, rid: JointRid, param: PinJointParameter, value: Real) -> PhysicsResult<()> {
        self.joint_mut(rid)?.set_pin_param(param, value)
    }

    /// Read a pin parameter
    pub fn pin_joint_get_param(&self, rid: JointRid, param: PinJointParameter) -> PhysicsResult<Real> {
        self.joint(rid)?.pin_param(param)
    }

    /// Set a spring parameter; the joint must be a damped spring
    pub fn damped_spring_joint_set_param(&mut self, rid: JointRid, param: DampedSpringParameter, value: Real) -> PhysicsResult<()> {
        self.joint_mut(rid)?.set_damped_spring_param(param, value)
    }

    /// Read a spring parameter
    pub fn damped_spring_joint_get_param(&self, rid: JointRid, param: DampedSpringParameter) -> PhysicsResult<Real> {
        self.joint(rid)?.damped_spring_param(param)
    }

    /// Solver rounds the joint takes part in; clamped to at least one
    pub fn joint_set_solver_priority(&mut self, rid: JointRid, priority: u32) -> PhysicsResult<()> {
        self.joint_mut(rid)?.set_solver_priority(priority);
        Ok(())
    }

    /// Solver rounds the joint takes part in
    pub fn joint_get_solver_priority(&self, rid: JointRid) -> PhysicsResult<u32> {
        Ok(self.joint(rid)?.solver_priority())
    }

    /// Stop or resume collisions between the linked bodies
    pub fn joint_disable_collisions_between_bodies(&mut self, rid: JointRid, disable: bool) -> PhysicsResult<()> {
        let Self { joints, objects, .. } = self;
        joints
            .get_mut(rid)
            .ok_or_else(|| invalid(KIND, rid))?
            .disable_collisions_between_bodies(disable, objects);
        Ok(())
    }

    /// Whether the linked bodies ignore each other
    pub fn joint_is_disabled_collisions_between_bodies(&self, rid: JointRid) -> PhysicsResult<bool> {
        Ok(self.joint(rid)?.is_disabled_collisions_between_bodies())
    }
}

#[cfg(test)]
mod tests {
    use crate::config::PhysicsSettings;
    use crate::constraint::{DampedSpringParameter, JointType, PinJointParameter};
    use crate::foundation::math::{translation, Vec3};
    use crate::object::BodyState;
    use crate::param::ParamValue;
    use crate::rid::ObjectRid;
    use crate::server::PhysicsServer;
    use approx::assert_relative_eq;

    fn server() -> PhysicsServer {
        PhysicsServer::new(PhysicsSettings::default()).unwrap()
    }

    #[test]
    fn test_params_need_matching_kind() {
        let mut server = server();
        let a = server.body_create();
        let joint = server.joint_create();
        assert_eq!(server.joint_get_type(joint).unwrap(), JointType::Empty);
        assert!(server.pin_joint_set_param(joint, PinJointParameter::Bias, 0.5).is_err());

        server.joint_make_pin(joint, a, Vec3::zeros(), None, Vec3::zeros()).unwrap();
        server.pin_joint_set_param(joint, PinJointParameter::Damping, 2.0).unwrap();
        assert_relative_eq!(server.pin_joint_get_param(joint, PinJointParameter::Damping).unwrap(), 2.0);
        assert!(server.damped_spring_joint_get_param(joint, DampedSpringParameter::Stiffness).is_err());
    }

    #[test]
    fn test_spring_rests_at_current_distance() {
        let mut server = server();
        let a = server.body_create();
        let b = server.body_create();
        server.body_set_state(b, BodyState::Transform, ParamValue::Transform(translation(Vec3::new(3.0, 4.0, 0.0)))).unwrap();
        let joint = server.joint_create();
        server.joint_make_damped_spring(joint, a, Vec3::zeros(), Some(b), Vec3::zeros()).unwrap();
        assert_eq!(server.joint_get_type(joint).unwrap(), JointType::DampedSpring);
        assert_relative_eq!(
            server.damped_spring_joint_get_param(joint, DampedSpringParameter::RestLength).unwrap(),
            5.0,
            epsilon = 1e-5
        );
    }

    #[test]
    fn test_disabled_collisions_survive_reconfigure() {
        let mut server = server();
        let a = server.body_create();
        let b = server.body_create();
        let c = server.body_create();
        let joint = server.joint_create();
        server.joint_make_pin(joint, a, Vec3::zeros(), Some(b), Vec3::zeros()).unwrap();
        server.joint_disable_collisions_between_bodies(joint, true).unwrap();
        assert!(server.objects.bodies[a].has_exception(ObjectRid::Body(b)));

        server.joint_make_pin(joint, a, Vec3::zeros(), Some(c), Vec3::zeros()).unwrap();
        assert!(server.joint_is_disabled_collisions_between_bodies(joint).unwrap());
        assert!(!server.objects.bodies[a].has_exception(ObjectRid::Body(b)));
        assert!(server.objects.bodies[a].has_exception(ObjectRid::Body(c)));

        server.joint_clear(joint).unwrap();
        assert!(!server.objects.bodies[a].has_exception(ObjectRid::Body(c)));
    }

    #[test]
    fn test_rejects_unknown_bodies() {
        let mut server = server();
        let a = server.body_create();
        let gone = server.body_create();
        server.free(gone).unwrap();
        let joint = server.joint_create();
        assert!(server.joint_make_pin(joint, a, Vec3::zeros(), Some(gone), Vec3::zeros()).is_err());
        assert_eq!(server.joint_get_type(joint).unwrap(), JointType::Empty);
        server.joint_set_solver_priority(joint, 0).unwrap();
        assert_eq!(server.joint_get_solver_priority(joint).unwrap(), 1);
    }
}
