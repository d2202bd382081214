//! Space entry points

use super::{invalid, PhysicsServer};
use crate::error::PhysicsResult;
use crate::foundation::math::Real;
use crate::object::{Area, AreaParameter};
use crate::param::ParamValue;
use crate::rid::{AreaRid, ObjectRid, SpaceRid};
use crate::space::{DirectSpaceState, Space, SpaceParameter, SpaceParams};

impl PhysicsServer {
    /// Create an inactive space together with its default area, configured
    /// from the server settings
    pub fn space_create(&mut self) -> PhysicsResult<SpaceRid> {
        let params = SpaceParams::from_settings(&self.settings);
        let rid = self.spaces.insert_with_key(|rid| Space::new(rid, params));

        let area = self.objects.areas.insert_with_key(Area::new);
        let settings = &self.settings;
        let configured = [
            (AreaParameter::Gravity, ParamValue::Real(settings.default_gravity)),
            (AreaParameter::GravityVector, ParamValue::Vector(settings.default_gravity_vector)),
            (AreaParameter::LinearDamp, ParamValue::Real(settings.default_linear_damp)),
            (AreaParameter::AngularDamp, ParamValue::Real(settings.default_angular_damp)),
            (AreaParameter::Priority, ParamValue::Real(-1.0)),
        ];
        if let Some(default_area) = self.objects.areas.get_mut(area) {
            for (param, value) in configured {
                default_area.set_param(param, value)?;
            }
        }
        if let Some(space) = self.spaces.get_mut(rid) {
            space.add_object(ObjectRid::Area(area), &mut self.objects, &self.shapes);
            space.set_default_area(Some(area));
        }
        log::debug!("created {:?} with default {:?}", rid, area);
        Ok(rid)
    }

    fn space(&self, rid: SpaceRid) -> PhysicsResult<&Space> {
        self.spaces.get(rid).ok_or_else(|| invalid("space", rid))
    }

    /// Start or stop stepping a space
    pub fn space_set_active(&mut self, rid: SpaceRid, active: bool) -> PhysicsResult<()> {
        let space = self.spaces.get_mut(rid).ok_or_else(|| invalid("space", rid))?;
        space.set_active(active);
        if active {
            self.active_spaces.insert(rid);
        } else {
            self.active_spaces.remove(&rid);
        }
        log::info!("{:?} {}", rid, if active { "activated" } else { "deactivated" });
        Ok(())
    }

    /// Whether a space is stepped
    pub fn space_is_active(&self, rid: SpaceRid) -> PhysicsResult<bool> {
        Ok(self.space(rid)?.is_active())
    }

    /// Set a solver tunable
    pub fn space_set_param(&mut self, rid: SpaceRid, param: SpaceParameter, value: Real) -> PhysicsResult<()> {
        self.spaces.get_mut(rid).ok_or_else(|| invalid("space", rid))?.set_param(param, value)
    }

    /// Read a solver tunable
    pub fn space_get_param(&self, rid: SpaceRid, param: SpaceParameter) -> PhysicsResult<Real> {
        Ok(self.space(rid)?.param(param))
    }

    /// The area supplying a space's ambient gravity and damping
    pub fn space_get_default_area(&self, rid: SpaceRid) -> PhysicsResult<Option<AreaRid>> {
        Ok(self.space(rid)?.default_area())
    }

    /// Query view of a space. Rejected while the space is locked, and outside
    /// the `sync()` window when the server runs on its own thread.
    pub fn space_get_direct_state(&self, rid: SpaceRid) -> PhysicsResult<DirectSpaceState<'_>> {
        let space = self.space(rid)?;
        self.ensure_direct_state_available()?;
        DirectSpaceState::new(space, &self.objects, &self.shapes)
    }
}

#[cfg(test)]
mod tests {
    use crate::config::PhysicsSettings;
    use crate::error::PhysicsError;
    use crate::foundation::math::{Real, Vec3};
    use crate::object::AreaParameter;
    use crate::server::PhysicsServer;
    use crate::space::{ProcessInfo, QueryParameters, SpaceParameter};
    use approx::assert_relative_eq;

    #[test]
    fn test_default_area_follows_settings() {
        let settings = PhysicsSettings::default().with_gravity(3.0, Vec3::new(1.0, 0.0, 0.0)).with_damping(0.25, 0.5);
        let mut server = PhysicsServer::new(settings).unwrap();
        let space = server.space_create().unwrap();
        let area = server.space_get_default_area(space).unwrap().unwrap();
        assert_relative_eq!(server.area_get_param(area, AreaParameter::Gravity).unwrap().as_real().unwrap(), 3.0);
        assert_relative_eq!(
            server.area_get_param(area, AreaParameter::GravityVector).unwrap().as_vector().unwrap(),
            Vec3::new(1.0, 0.0, 0.0)
        );
        assert_relative_eq!(server.area_get_param(area, AreaParameter::LinearDamp).unwrap().as_real().unwrap(), 0.25);
        assert_relative_eq!(server.area_get_param(area, AreaParameter::AngularDamp).unwrap().as_real().unwrap(), 0.5);
        assert_eq!(server.area_get_space(area).unwrap(), Some(space));
    }

    #[test]
    fn test_params_roundtrip() {
        let mut server = PhysicsServer::new(PhysicsSettings::default()).unwrap();
        let space = server.space_create().unwrap();
        server.space_set_param(space, SpaceParameter::ContactMaxSeparation, 0.2).unwrap();
        assert_relative_eq!(server.space_get_param(space, SpaceParameter::ContactMaxSeparation).unwrap(), 0.2);
        assert!(server.space_set_param(space, SpaceParameter::BodyTimeToSleep, -1.0).is_err());
        let sleep: Real = server.space_get_param(space, SpaceParameter::BodyTimeToSleep).unwrap();
        assert_relative_eq!(sleep, 0.5);
    }

    #[test]
    fn test_only_active_spaces_count() {
        let mut server = PhysicsServer::new(PhysicsSettings::default()).unwrap();
        let space = server.space_create().unwrap();
        let body = server.body_create();
        server.body_set_space(body, Some(space)).unwrap();
        server.step(1.0 / 60.0).unwrap();
        assert_eq!(server.get_process_info(ProcessInfo::ActiveObjects), 0);

        server.space_set_active(space, true).unwrap();
        assert!(server.space_is_active(space).unwrap());
        server.step(1.0 / 60.0).unwrap();
        assert_eq!(server.get_process_info(ProcessInfo::ActiveObjects), 1);
    }

    #[test]
    fn test_direct_state_needs_sync_window_when_threaded() {
        let settings = PhysicsSettings { run_on_separate_thread: true, ..PhysicsSettings::default() };
        let mut server = PhysicsServer::new(settings).unwrap();
        let space = server.space_create().unwrap();
        assert!(matches!(server.space_get_direct_state(space), Err(PhysicsError::DirectStateUnavailable)));

        server.sync();
        let state = server.space_get_direct_state(space).unwrap();
        assert!(state.intersect_point(&Vec3::zeros(), 8, &QueryParameters::default()).is_empty());
        server.end_sync();
        assert!(server.space_get_direct_state(space).is_err());
    }
}
