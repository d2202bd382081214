//! Area entry points

use super::{invalid, PhysicsServer};
use crate::error::PhysicsResult;
use crate::foundation::math::Transform;
use crate::object::area::MonitorCallback;
use crate::object::{Area, AreaParameter, AreaSpaceOverrideMode};
use crate::param::ParamValue;
use crate::rid::{AreaRid, ObjectRid, ShapeRid, SpaceRid};

const KIND: &str = "area";

impl PhysicsServer {
    /// Create a detached area
    pub fn area_create(&mut self) -> AreaRid {
        self.objects.areas.insert_with_key(Area::new)
    }

    fn area(&self, rid: AreaRid) -> PhysicsResult<&Area> {
        self.objects.areas.get(rid).ok_or_else(|| invalid(KIND, rid))
    }

    fn area_mut(&mut self, rid: AreaRid) -> PhysicsResult<&mut Area> {
        self.objects.areas.get_mut(rid).ok_or_else(|| invalid(KIND, rid))
    }

    /// Queue an area for gravity re-evaluation by the bodies it overlaps
    fn area_changed(&mut self, rid: AreaRid) {
        let space = self.objects.areas.get(rid).and_then(|a| a.base().space());
        if let Some(queues) = Self::queues_of(&mut self.spaces, space) {
            queues.moved_areas.push(rid);
        }
    }

    /// Move an area to a space, or out of any
    pub fn area_set_space(&mut self, rid: AreaRid, space: Option<SpaceRid>) -> PhysicsResult<()> {
        self.object_set_space(ObjectRid::Area(rid), KIND, space)
    }

    /// Space the area belongs to
    pub fn area_get_space(&self, rid: AreaRid) -> PhysicsResult<Option<SpaceRid>> {
        Ok(self.area(rid)?.base().space())
    }

    /// Attach a shape at `transform` (area space)
    pub fn area_add_shape(&mut self, rid: AreaRid, shape: ShapeRid, transform: Transform, disabled: bool) -> PhysicsResult<()> {
        self.object_add_shape(ObjectRid::Area(rid), KIND, shape, transform, disabled)
    }

    /// Swap the shape at `index`
    pub fn area_set_shape(&mut self, rid: AreaRid, index: usize, shape: ShapeRid) -> PhysicsResult<()> {
        self.object_set_shape(ObjectRid::Area(rid), KIND, index, shape)
    }

    /// Move the shape at `index`
    pub fn area_set_shape_transform(&mut self, rid: AreaRid, index: usize, transform: Transform) -> PhysicsResult<()> {
        self.object_set_shape_transform(ObjectRid::Area(rid), KIND, index, transform)
    }

    /// Enable or disable the shape at `index`
    pub fn area_set_shape_disabled(&mut self, rid: AreaRid, index: usize, disabled: bool) -> PhysicsResult<()> {
        self.object_set_shape_disabled(ObjectRid::Area(rid), KIND, index, disabled)
    }

    /// Number of attached shapes
    pub fn area_get_shape_count(&self, rid: AreaRid) -> PhysicsResult<usize> {
        Ok(self.area(rid)?.base().shape_count())
    }

    /// Shape at `index`
    pub fn area_get_shape(&self, rid: AreaRid, index: usize) -> PhysicsResult<ShapeRid> {
        Ok(self.area(rid)?.base().shape(index)?.shape)
    }

    /// Area-space placement of the shape at `index`
    pub fn area_get_shape_transform(&self, rid: AreaRid, index: usize) -> PhysicsResult<Transform> {
        Ok(self.area(rid)?.base().shape(index)?.transform)
    }

    /// Detach the shape at `index`
    pub fn area_remove_shape(&mut self, rid: AreaRid, index: usize) -> PhysicsResult<()> {
        self.area(rid)?;
        self.object_remove_shape(ObjectRid::Area(rid), index)
    }

    /// Detach every shape
    pub fn area_clear_shapes(&mut self, rid: AreaRid) -> PhysicsResult<()> {
        self.object_clear_shapes(ObjectRid::Area(rid), KIND)
    }

    /// Tag handed back in overlap reports
    pub fn area_attach_object_instance_id(&mut self, rid: AreaRid, id: u64) -> PhysicsResult<()> {
        self.area_mut(rid)?.base_mut().set_instance_id(id);
        Ok(())
    }

    /// Owner tag
    pub fn area_get_object_instance_id(&self, rid: AreaRid) -> PhysicsResult<u64> {
        Ok(self.area(rid)?.base().instance_id())
    }

    /// Set a gravity, damping, priority or wind parameter
    pub fn area_set_param(&mut self, rid: AreaRid, param: AreaParameter, value: ParamValue) -> PhysicsResult<()> {
        self.area_mut(rid)?.set_param(param, value)?;
        self.area_changed(rid);
        Ok(())
    }

    /// Read a parameter
    pub fn area_get_param(&self, rid: AreaRid, param: AreaParameter) -> PhysicsResult<ParamValue> {
        Ok(self.area(rid)?.param(param))
    }

    /// Place the area
    pub fn area_set_transform(&mut self, rid: AreaRid, transform: Transform) -> PhysicsResult<()> {
        self.area_mut(rid)?.base_mut().set_transform(transform);
        self.object_moved(ObjectRid::Area(rid));
        Ok(())
    }

    /// Area placement
    pub fn area_get_transform(&self, rid: AreaRid) -> PhysicsResult<Transform> {
        Ok(*self.area(rid)?.base().transform())
    }

    /// How this area's gravity and damping combine with lower priorities
    pub fn area_set_space_override_mode(&mut self, rid: AreaRid, mode: AreaSpaceOverrideMode) -> PhysicsResult<()> {
        self.area_mut(rid)?.set_space_override_mode(mode);
        self.area_changed(rid);
        Ok(())
    }

    /// Override mode
    pub fn area_get_space_override_mode(&self, rid: AreaRid) -> PhysicsResult<AreaSpaceOverrideMode> {
        Ok(self.area(rid)?.space_override_mode())
    }

    /// Whether other areas may detect this one. Rejected from inside a
    /// monitor callback while the area is in a space.
    pub fn area_set_monitorable(&mut self, rid: AreaRid, monitorable: bool) -> PhysicsResult<()> {
        self.area(rid)?;
        self.ensure_not_flushing(ObjectRid::Area(rid))?;
        self.area_mut(rid)?.set_monitorable(monitorable);
        self.area_changed(rid);
        Ok(())
    }

    /// Whether other areas may detect this one
    pub fn area_is_monitorable(&self, rid: AreaRid) -> PhysicsResult<bool> {
        Ok(self.area(rid)?.is_monitorable())
    }

    /// Receive enter/exit events for bodies and soft bodies, or stop with `None`
    pub fn area_set_monitor_callback(&mut self, rid: AreaRid, callback: Option<MonitorCallback>) -> PhysicsResult<()> {
        self.area_mut(rid)?.set_monitor_callback(callback);
        self.area_monitoring_changed(rid);
        Ok(())
    }

    /// Receive enter/exit events for other areas, or stop with `None`
    pub fn area_set_area_monitor_callback(&mut self, rid: AreaRid, callback: Option<MonitorCallback>) -> PhysicsResult<()> {
        self.area_mut(rid)?.set_area_monitor_callback(callback);
        self.area_monitoring_changed(rid);
        Ok(())
    }

    /// A monitoring area pairs with static bodies, a silent one does not
    fn area_monitoring_changed(&mut self, rid: AreaRid) {
        let space = self.objects.areas.get(rid).and_then(|a| a.base().space());
        if let Some(space) = space.and_then(|s| self.spaces.get_mut(s)) {
            space.refresh_static(ObjectRid::Area(rid), &self.objects);
            space.queues.moved_areas.push(rid);
        }
    }

    /// Whether rays with `pick_ray` set can hit this area
    pub fn area_set_ray_pickable(&mut self, rid: AreaRid, pickable: bool) -> PhysicsResult<()> {
        self.area_mut(rid)?.base_mut().set_ray_pickable(pickable);
        Ok(())
    }

    /// Layers this area is found on
    pub fn area_set_collision_layer(&mut self, rid: AreaRid, layer: u32) -> PhysicsResult<()> {
        self.area_mut(rid)?.base_mut().set_collision_layer(layer);
        self.object_filters_changed(ObjectRid::Area(rid));
        Ok(())
    }

    /// Layers this area is found on
    pub fn area_get_collision_layer(&self, rid: AreaRid) -> PhysicsResult<u32> {
        Ok(self.area(rid)?.base().collision_layer())
    }

    /// Layers this area looks for
    pub fn area_set_collision_mask(&mut self, rid: AreaRid, mask: u32) -> PhysicsResult<()> {
        self.area_mut(rid)?.base_mut().set_collision_mask(mask);
        self.object_filters_changed(ObjectRid::Area(rid));
        Ok(())
    }

    /// Layers this area looks for
    pub fn area_get_collision_mask(&self, rid: AreaRid) -> PhysicsResult<u32> {
        Ok(self.area(rid)?.base().collision_mask())
    }
}

#[cfg(test)]
mod tests {
    use crate::broadphase::BroadPhase;
    use crate::collision::ShapeType;
    use crate::config::PhysicsSettings;
    use crate::foundation::math::{translation, Vec3};
    use crate::object::{AreaParameter, AreaSpaceOverrideMode};
    use crate::param::ParamValue;
    use crate::server::PhysicsServer;
    use approx::assert_relative_eq;

    fn server() -> PhysicsServer {
        PhysicsServer::new(PhysicsSettings::default()).unwrap()
    }

    #[test]
    fn test_param_kinds_are_checked() {
        let mut server = server();
        let area = server.area_create();
        assert!(server.area_set_param(area, AreaParameter::Gravity, ParamValue::Vector(Vec3::x())).is_err());
        assert!(server.area_set_param(area, AreaParameter::WindForceMagnitude, ParamValue::Real(-1.0)).is_err());
        server.area_set_param(area, AreaParameter::Priority, ParamValue::Real(4.0)).unwrap();
        assert_relative_eq!(server.area_get_param(area, AreaParameter::Priority).unwrap().as_real().unwrap(), 4.0);
    }

    #[test]
    fn test_override_mode_and_transform() {
        let mut server = server();
        let space = server.space_create().unwrap();
        let area = server.area_create();
        server.area_set_space(area, Some(space)).unwrap();
        assert_eq!(server.area_get_space_override_mode(area).unwrap(), AreaSpaceOverrideMode::Disabled);
        server.area_set_space_override_mode(area, AreaSpaceOverrideMode::Replace).unwrap();
        assert_eq!(server.area_get_space_override_mode(area).unwrap(), AreaSpaceOverrideMode::Replace);

        server.area_set_transform(area, translation(Vec3::new(0.0, 5.0, 0.0))).unwrap();
        assert_relative_eq!(server.area_get_transform(area).unwrap().translation.vector, Vec3::new(0.0, 5.0, 0.0));
    }

    #[test]
    fn test_monitor_callback_makes_proxies_dynamic() {
        let mut server = server();
        let space = server.space_create().unwrap();
        let sphere = server.shape_create(ShapeType::Sphere);
        let area = server.area_create();
        server.area_add_shape(area, sphere, translation(Vec3::zeros()), false).unwrap();
        server.area_set_space(area, Some(space)).unwrap();

        let proxy = server.objects.areas[area].base().shapes()[0].proxy.unwrap();
        assert!(server.spaces[space].broadphase.proxy(proxy).unwrap().is_static);
        server.area_set_monitor_callback(area, Some(Box::new(|_event| {}))).unwrap();
        assert!(!server.spaces[space].broadphase.proxy(proxy).unwrap().is_static);
        server.area_set_monitor_callback(area, None).unwrap();
        assert!(server.spaces[space].broadphase.proxy(proxy).unwrap().is_static);
    }

    #[test]
    fn test_monitorable_roundtrip() {
        let mut server = server();
        let area = server.area_create();
        assert!(!server.area_is_monitorable(area).unwrap());
        server.area_set_monitorable(area, true).unwrap();
        assert!(server.area_is_monitorable(area).unwrap());
    }
}
