//! Areas
//!
//! Regions that override gravity and damping for the bodies inside them and
//! report objects entering and leaving. Overlap bookkeeping counts per
//! `(object, object shape, area shape)` key so that several transitions
//! within one step collapse into at most one event.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use slotmap::SlotMap;

use super::CollisionObject;
use crate::constraint::ConstraintRef;
use crate::ensure;
use crate::error::{PhysicsError, PhysicsResult};
use crate::foundation::math::{normalize_or_zero, xform, Real, Vec3};
use crate::param::ParamValue;
use crate::rid::{AreaRid, ObjectRid};
use crate::space::SpaceQueues;

/// How an area's gravity and damping combine with those of lower priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AreaSpaceOverrideMode {
    /// No effect on bodies
    #[default]
    Disabled,
    /// Add to what was accumulated so far and keep scanning
    Combine,
    /// Add to what was accumulated so far and stop
    CombineReplace,
    /// Discard what was accumulated so far, use this area and stop
    Replace,
    /// Discard what was accumulated so far, use this area and keep scanning
    ReplaceCombine,
}

/// Parameters set with `area_set_param`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AreaParameter {
    /// Gravity strength
    Gravity,
    /// Gravity direction, or the attraction point when gravity is a point
    GravityVector,
    /// Whether gravity pulls toward a point
    GravityIsPoint,
    /// Distance at which point gravity has its nominal strength; zero disables falloff
    GravityPointUnitDistance,
    /// Linear damping
    LinearDamp,
    /// Angular damping
    AngularDamp,
    /// Order in which overlapping areas are combined, highest first
    Priority,
    /// Wind strength on soft body faces
    WindForceMagnitude,
    /// Origin of the wind
    WindSource,
    /// Wind direction
    WindDirection,
    /// Wind falloff with distance from the source
    WindAttenuationFactor,
}

/// Whether a monitored object entered or left
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MonitorEventKind {
    /// The object started overlapping the area
    Added,
    /// The object stopped overlapping the area
    Removed,
}

/// One overlap transition delivered to a monitor callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorEvent {
    /// Entered or left
    pub kind: MonitorEventKind,
    /// The other object
    pub rid: ObjectRid,
    /// Owner tag of the other object
    pub instance_id: u64,
    /// Shape index on the other object
    pub object_shape: usize,
    /// Shape index on this area
    pub area_shape: usize,
}

/// Receives overlap transitions during `flush_queries`
pub type MonitorCallback = Box<dyn FnMut(&MonitorEvent) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct MonitorKey {
    rid: ObjectRid,
    object_shape: usize,
    area_shape: usize,
}

/// An area
pub struct Area {
    base: CollisionObject,
    space_override_mode: AreaSpaceOverrideMode,
    gravity: Real,
    gravity_vector: Vec3,
    gravity_is_point: bool,
    gravity_point_unit_distance: Real,
    linear_damp: Real,
    angular_damp: Real,
    priority: Real,
    wind_force_magnitude: Real,
    wind_source: Vec3,
    wind_direction: Vec3,
    wind_attenuation_factor: Real,
    monitorable: bool,

    monitor_callback: Option<MonitorCallback>,
    area_monitor_callback: Option<MonitorCallback>,
    monitored_objects: BTreeMap<MonitorKey, (u64, i32)>,
    monitored_areas: BTreeMap<MonitorKey, (u64, i32)>,
    pub(crate) constraints: BTreeSet<ConstraintRef>,
}

impl fmt::Debug for Area {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Area")
            .field("rid", &self.base.rid())
            .field("space_override_mode", &self.space_override_mode)
            .field("gravity", &self.gravity)
            .field("priority", &self.priority)
            .field("monitorable", &self.monitorable)
            .finish_non_exhaustive()
    }
}

impl Area {
    /// A detached area with standard gravity and no override
    pub fn new(rid: AreaRid) -> Self {
        Self {
            base: CollisionObject::new(ObjectRid::Area(rid)),
            space_override_mode: AreaSpaceOverrideMode::Disabled,
            gravity: 9.8,
            gravity_vector: Vec3::new(0.0, -1.0, 0.0),
            gravity_is_point: false,
            gravity_point_unit_distance: 0.0,
            linear_damp: 0.1,
            angular_damp: 1.0,
            priority: 0.0,
            wind_force_magnitude: 0.0,
            wind_source: Vec3::zeros(),
            wind_direction: Vec3::zeros(),
            wind_attenuation_factor: 0.0,
            monitorable: false,
            monitor_callback: None,
            area_monitor_callback: None,
            monitored_objects: BTreeMap::new(),
            monitored_areas: BTreeMap::new(),
            constraints: BTreeSet::new(),
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
    pub fn rid(&self) -> AreaRid {
        self.base.rid().as_area().unwrap_or_default()
    }

    /// Override mode
    pub const fn space_override_mode(&self) -> AreaSpaceOverrideMode {
        self.space_override_mode
    }

    pub(crate) fn set_space_override_mode(&mut self, mode: AreaSpaceOverrideMode) {
        self.space_override_mode = mode;
    }

    /// Whether this area changes gravity or damping of what it overlaps
    pub fn has_space_override(&self) -> bool {
        self.space_override_mode != AreaSpaceOverrideMode::Disabled
    }

    /// Set a parameter
    pub(crate) fn set_param(&mut self, param: AreaParameter, value: ParamValue) -> PhysicsResult<()> {
        match param {
            AreaParameter::Gravity => self.gravity = value.as_real()?,
            AreaParameter::GravityVector => self.gravity_vector = value.as_vector()?,
            AreaParameter::GravityIsPoint => self.gravity_is_point = value.as_bool()?,
            AreaParameter::GravityPointUnitDistance => self.gravity_point_unit_distance = value.as_real()?,
            AreaParameter::LinearDamp => self.linear_damp = value.as_real()?,
            AreaParameter::AngularDamp => self.angular_damp = value.as_real()?,
            AreaParameter::Priority => self.priority = value.as_real()?,
            AreaParameter::WindForceMagnitude => {
                let magnitude = value.as_real()?;
                ensure!(magnitude >= 0.0, PhysicsError::precondition("wind force magnitude must not be negative"));
                self.wind_force_magnitude = magnitude;
            }
            AreaParameter::WindSource => self.wind_source = value.as_vector()?,
            AreaParameter::WindDirection => self.wind_direction = value.as_vector()?,
            AreaParameter::WindAttenuationFactor => {
                let factor = value.as_real()?;
                ensure!(factor >= 0.0, PhysicsError::precondition("wind attenuation factor must not be negative"));
                self.wind_attenuation_factor = factor;
            }
        }
        Ok(())
    }

    /// Read a parameter
    pub fn param(&self, param: AreaParameter) -> ParamValue {
        match param {
            AreaParameter::Gravity => self.gravity.into(),
            AreaParameter::GravityVector => self.gravity_vector.into(),
            AreaParameter::GravityIsPoint => self.gravity_is_point.into(),
            AreaParameter::GravityPointUnitDistance => self.gravity_point_unit_distance.into(),
            AreaParameter::LinearDamp => self.linear_damp.into(),
            AreaParameter::AngularDamp => self.angular_damp.into(),
            AreaParameter::Priority => self.priority.into(),
            AreaParameter::WindForceMagnitude => self.wind_force_magnitude.into(),
            AreaParameter::WindSource => self.wind_source.into(),
            AreaParameter::WindDirection => self.wind_direction.into(),
            AreaParameter::WindAttenuationFactor => self.wind_attenuation_factor.into(),
        }
    }

    /// Combination order among overlapping areas
    pub const fn priority(&self) -> Real {
        self.priority
    }

    /// Linear damping
    pub const fn linear_damp(&self) -> Real {
        self.linear_damp
    }

    /// Angular damping
    pub const fn angular_damp(&self) -> Real {
        self.angular_damp
    }

    /// Gravity this area applies at a world position
    pub fn compute_gravity(&self, position: &Vec3) -> Vec3 {
        if !self.gravity_is_point {
            return self.gravity_vector * self.gravity;
        }
        let v = xform(self.base.transform(), &self.gravity_vector) - position;
        if self.gravity_point_unit_distance > 0.0 {
            let len_sq = v.norm_squared();
            if len_sq > 0.0 {
                let unit = self.gravity_point_unit_distance;
                normalize_or_zero(&v) * (self.gravity * unit * unit / len_sq)
            } else {
                Vec3::zeros()
            }
        } else {
            normalize_or_zero(&v) * self.gravity
        }
    }

    /// Wind strength
    pub const fn wind_force_magnitude(&self) -> Real {
        self.wind_force_magnitude
    }

    /// Wind origin
    pub const fn wind_source(&self) -> Vec3 {
        self.wind_source
    }

    /// Wind direction
    pub const fn wind_direction(&self) -> Vec3 {
        self.wind_direction
    }

    /// Wind falloff
    pub const fn wind_attenuation_factor(&self) -> Real {
        self.wind_attenuation_factor
    }

    /// Whether other areas may detect this one
    pub const fn is_monitorable(&self) -> bool {
        self.monitorable
    }

    pub(crate) fn set_monitorable(&mut self, monitorable: bool) {
        self.monitorable = monitorable;
    }

    /// Whether bodies and soft bodies entering are reported
    pub const fn has_monitor_callback(&self) -> bool {
        self.monitor_callback.is_some()
    }

    /// Whether areas entering are reported
    pub const fn has_area_monitor_callback(&self) -> bool {
        self.area_monitor_callback.is_some()
    }

    pub(crate) fn set_monitor_callback(&mut self, callback: Option<MonitorCallback>) {
        self.monitor_callback = callback;
        self.monitored_objects.clear();
    }

    pub(crate) fn set_area_monitor_callback(&mut self, callback: Option<MonitorCallback>) {
        self.area_monitor_callback = callback;
        self.monitored_areas.clear();
    }

    /// Forget pending transitions, e.g. when the area leaves its space
    pub(crate) fn clear_monitored(&mut self) {
        self.monitored_objects.clear();
        self.monitored_areas.clear();
    }

    pub(crate) fn add_object_to_query(&mut self, object: ObjectRid, instance_id: u64, object_shape: usize, area_shape: usize, queues: &mut SpaceQueues) {
        Self::bump(&mut self.monitored_objects, object, instance_id, object_shape, area_shape, 1);
        queues.monitor_query.push(self.rid());
    }

    pub(crate) fn remove_object_from_query(&mut self, object: ObjectRid, instance_id: u64, object_shape: usize, area_shape: usize, queues: &mut SpaceQueues) {
        Self::bump(&mut self.monitored_objects, object, instance_id, object_shape, area_shape, -1);
        queues.monitor_query.push(self.rid());
    }

    pub(crate) fn add_area_to_query(&mut self, area: AreaRid, instance_id: u64, other_shape: usize, area_shape: usize, queues: &mut SpaceQueues) {
        Self::bump(&mut self.monitored_areas, ObjectRid::Area(area), instance_id, other_shape, area_shape, 1);
        queues.monitor_query.push(self.rid());
    }

    pub(crate) fn remove_area_from_query(&mut self, area: AreaRid, instance_id: u64, other_shape: usize, area_shape: usize, queues: &mut SpaceQueues) {
        Self::bump(&mut self.monitored_areas, ObjectRid::Area(area), instance_id, other_shape, area_shape, -1);
        queues.monitor_query.push(self.rid());
    }

    fn bump(table: &mut BTreeMap<MonitorKey, (u64, i32)>, rid: ObjectRid, instance_id: u64, object_shape: usize, area_shape: usize, delta: i32) {
        let entry = table.entry(MonitorKey { rid, object_shape, area_shape }).or_insert((instance_id, 0));
        entry.1 += delta;
    }

    /// Deliver pending enter/exit transitions to the callbacks, then forget them.
    /// Keys whose transitions cancelled out within the step are skipped.
    pub(crate) fn call_queries(&mut self) {
        let objects = std::mem::take(&mut self.monitored_objects);
        if let Some(callback) = self.monitor_callback.as_mut() {
            deliver(&objects, callback);
        }
        let areas = std::mem::take(&mut self.monitored_areas);
        if let Some(callback) = self.area_monitor_callback.as_mut() {
            deliver(&areas, callback);
        }
    }

    pub(crate) fn add_constraint(&mut self, constraint: ConstraintRef) {
        self.constraints.insert(constraint);
    }

    pub(crate) fn remove_constraint(&mut self, constraint: ConstraintRef) {
        self.constraints.remove(&constraint);
    }

    /// Constraints (overlap pairs) this area takes part in
    pub fn constraints(&self) -> impl Iterator<Item = ConstraintRef> + '_ {
        self.constraints.iter().copied()
    }
}

fn deliver(table: &BTreeMap<MonitorKey, (u64, i32)>, callback: &mut MonitorCallback) {
    for (key, (instance_id, state)) in table {
        let kind = match state.signum() {
            1 => MonitorEventKind::Added,
            -1 => MonitorEventKind::Removed,
            _ => continue,
        };
        callback(&MonitorEvent {
            kind,
            rid: key.rid,
            instance_id: *instance_id,
            object_shape: key.object_shape,
            area_shape: key.area_shape,
        });
    }
}

/// Gravity and damping gathered from the areas around an object
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub(crate) struct Ambient {
    pub(crate) gravity: Vec3,
    pub(crate) linear_damp: Real,
    pub(crate) angular_damp: Real,
}

impl Ambient {
    fn accumulate(&mut self, area: &Area, position: &Vec3) {
        self.gravity += area.compute_gravity(position);
        self.linear_damp += area.linear_damp;
        self.angular_damp += area.angular_damp;
    }
}

/// Override areas currently overlapping an object, with overlap counts
#[derive(Debug, Clone, Default)]
pub(crate) struct AreaOverlaps {
    entries: Vec<(AreaRid, usize)>,
}

impl AreaOverlaps {
    pub(crate) fn add(&mut self, area: AreaRid) {
        match self.entries.iter_mut().find(|(rid, _)| *rid == area) {
            Some(entry) => entry.1 += 1,
            None => self.entries.push((area, 1)),
        }
    }

    pub(crate) fn remove(&mut self, area: AreaRid) {
        if let Some(index) = self.entries.iter().position(|(rid, _)| *rid == area) {
            self.entries[index].1 -= 1;
            if self.entries[index].1 == 0 {
                self.entries.remove(index);
            }
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = AreaRid> + '_ {
        self.entries.iter().map(|(rid, _)| *rid)
    }

    /// Areas sorted by ascending priority; ties keep overlap order
    pub(crate) fn sorted<'a>(&self, areas: &'a SlotMap<AreaRid, Area>) -> Vec<&'a Area> {
        let mut sorted: Vec<&Area> = self.entries.iter().filter_map(|(rid, _)| areas.get(*rid)).collect();
        sorted.sort_by(|a, b| a.priority.total_cmp(&b.priority));
        sorted
    }

    /// Walk the areas from the highest priority down, combining their gravity
    /// and damping according to each one's override mode. The default area
    /// contributes unless an area stopped the walk.
    pub(crate) fn ambient(&self, areas: &SlotMap<AreaRid, Area>, default_area: Option<&Area>, position: &Vec3) -> Ambient {
        let mut ambient = Ambient::default();
        let mut stopped = false;
        for area in self.sorted(areas).into_iter().rev() {
            match area.space_override_mode {
                AreaSpaceOverrideMode::Disabled => {}
                AreaSpaceOverrideMode::Combine | AreaSpaceOverrideMode::CombineReplace => {
                    ambient.accumulate(area, position);
                    stopped = area.space_override_mode == AreaSpaceOverrideMode::CombineReplace;
                }
                AreaSpaceOverrideMode::Replace | AreaSpaceOverrideMode::ReplaceCombine => {
                    ambient = Ambient::default();
                    ambient.accumulate(area, position);
                    stopped = area.space_override_mode == AreaSpaceOverrideMode::Replace;
                }
            }
            if stopped {
                break;
            }
        }
        if !stopped {
            if let Some(default_area) = default_area {
                ambient.accumulate(default_area, position);
            }
        }
        ambient
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::translation;
    use approx::assert_relative_eq;

    fn area(areas: &mut SlotMap<AreaRid, Area>, mode: AreaSpaceOverrideMode, gravity: Real, priority: Real) -> AreaRid {
        let rid = areas.insert_with_key(Area::new);
        let a = &mut areas[rid];
        a.set_space_override_mode(mode);
        a.set_param(AreaParameter::Gravity, ParamValue::Real(gravity)).unwrap();
        a.set_param(AreaParameter::Priority, ParamValue::Real(priority)).unwrap();
        rid
    }

    #[test]
    fn test_combine_replace_stops_the_walk() {
        let mut areas = SlotMap::with_key();
        let high = area(&mut areas, AreaSpaceOverrideMode::CombineReplace, 3.0, 2.0);
        let low = area(&mut areas, AreaSpaceOverrideMode::Combine, 5.0, 1.0);
        let default_area = Area::new(AreaRid::default());

        let mut overlaps = AreaOverlaps::default();
        overlaps.add(low);
        overlaps.add(high);
        let ambient = overlaps.ambient(&areas, Some(&default_area), &Vec3::zeros());
        assert_relative_eq!(ambient.gravity, Vec3::new(0.0, -3.0, 0.0), epsilon = 1e-6);
    }

    #[test]
    fn test_combine_falls_through_to_default() {
        let mut areas = SlotMap::with_key();
        let a = area(&mut areas, AreaSpaceOverrideMode::Combine, 1.0, 0.0);
        let default_area = Area::new(AreaRid::default());
        let mut overlaps = AreaOverlaps::default();
        overlaps.add(a);
        let ambient = overlaps.ambient(&areas, Some(&default_area), &Vec3::zeros());
        assert_relative_eq!(ambient.gravity.y, -10.8, epsilon = 1e-5);
        assert_relative_eq!(ambient.linear_damp, 0.2, epsilon = 1e-6);
    }

    #[test]
    fn test_replace_combine_discards_lower_sum() {
        let mut areas = SlotMap::with_key();
        let top = area(&mut areas, AreaSpaceOverrideMode::Combine, 2.0, 3.0);
        let mid = area(&mut areas, AreaSpaceOverrideMode::ReplaceCombine, 4.0, 2.0);
        let default_area = Area::new(AreaRid::default());
        let mut overlaps = AreaOverlaps::default();
        overlaps.add(top);
        overlaps.add(mid);
        // `top` is discarded by `mid`, then the default area is added.
        let ambient = overlaps.ambient(&areas, Some(&default_area), &Vec3::zeros());
        assert_relative_eq!(ambient.gravity.y, -(4.0 + 9.8), epsilon = 1e-5);
    }

    #[test]
    fn test_overlap_counting() {
        let mut areas = SlotMap::with_key();
        let a = area(&mut areas, AreaSpaceOverrideMode::Replace, 1.0, 0.0);
        let mut overlaps = AreaOverlaps::default();
        overlaps.add(a);
        overlaps.add(a);
        overlaps.remove(a);
        assert!(!overlaps.is_empty());
        overlaps.remove(a);
        assert!(overlaps.is_empty());
    }

    #[test]
    fn test_point_gravity_falloff() {
        let mut areas: SlotMap<AreaRid, Area> = SlotMap::with_key();
        let rid = areas.insert_with_key(Area::new);
        let a = &mut areas[rid];
        a.base_mut().set_transform(translation(Vec3::new(0.0, 10.0, 0.0)));
        a.set_param(AreaParameter::GravityIsPoint, ParamValue::Bool(true)).unwrap();
        a.set_param(AreaParameter::GravityVector, ParamValue::Vector(Vec3::zeros())).unwrap();
        a.set_param(AreaParameter::GravityPointUnitDistance, ParamValue::Real(1.0)).unwrap();
        let g = a.compute_gravity(&Vec3::new(0.0, 8.0, 0.0));
        assert_relative_eq!(g, Vec3::new(0.0, 9.8 / 4.0, 0.0), epsilon = 1e-5);
    }

    #[test]
    fn test_transitions_collapse_within_a_step() {
        let mut areas: SlotMap<AreaRid, Area> = SlotMap::with_key();
        let rid = areas.insert_with_key(Area::new);
        let other = areas.insert_with_key(Area::new);
        let events = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = events.clone();
        let a = &mut areas[rid];
        a.set_monitor_callback(Some(Box::new(move |e: &MonitorEvent| sink.lock().unwrap().push(*e))));

        let mut queues = SpaceQueues::default();
        let object = ObjectRid::Area(other);
        a.add_object_to_query(object, 7, 0, 0, &mut queues);
        a.remove_object_from_query(object, 7, 0, 0, &mut queues);
        a.add_object_to_query(object, 7, 1, 0, &mut queues);
        a.call_queries();
        a.call_queries();

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, MonitorEventKind::Added);
        assert_eq!(events[0].object_shape, 1);
        assert_eq!(events[0].instance_id, 7);
        assert_eq!(queues.monitor_query.len(), 1);
    }

    #[test]
    fn test_negative_wind_rejected() {
        let mut areas: SlotMap<AreaRid, Area> = SlotMap::with_key();
        let rid = areas.insert_with_key(Area::new);
        assert!(areas[rid].set_param(AreaParameter::WindForceMagnitude, ParamValue::Real(-1.0)).is_err());
    }
}
