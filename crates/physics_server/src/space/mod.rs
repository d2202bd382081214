//! Simulation spaces
//!
//! Based on Game Engine Architecture 3rd Edition, Section 13.4.8 ("The
//! Collision World"): a space owns the broadphase over its members, the pair
//! constraints the broadphase spawns, and the bookkeeping lists the stepper
//! and the deferred query flush walk.
//!
//! Objects themselves live in the server's [`Objects`] arena; a space only
//! holds their handles. Every method that needs object state takes the arena
//! explicitly, which keeps the borrow of one space disjoint from the others.

pub mod direct_state;
pub mod motion;
mod step;

use std::collections::{BTreeMap, BTreeSet};

use slotmap::SlotMap;

pub use direct_state::{CastMotion, DirectSpaceState, QueryParameters, RayResult, ShapeRestInfo, ShapeResult};
pub use motion::{MotionCollision, MotionParameters, MotionResult, MAX_COLLISIONS};

use crate::broadphase::{BroadPhase, BvhBroadPhase, PairEvent, ProxyId};
use crate::collision::Shape;
use crate::config::PhysicsSettings;
use crate::constraint::{Area2Pair, AreaPair, AreaSoftBodyPair, BodyPair, BodySoftBodyPair, Pair, PairId};
use crate::error::{PhysicsError, PhysicsResult};
use crate::foundation::math::{Real, Vec3};
use crate::object::{BodyMode, CollisionObject, DirectBodyState, Objects};
use crate::rid::{AreaRid, BodyRid, ObjectRid, ShapeRid, SoftBodyRid, SpaceRid};

/// Insertion-ordered list without duplicates
#[derive(Debug, Clone)]
pub(crate) struct UniqueList<T> {
    items: Vec<T>,
}

impl<T> Default for UniqueList<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T: Copy + PartialEq> UniqueList<T> {
    /// Append unless already present
    pub(crate) fn push(&mut self, item: T) {
        if !self.items.contains(&item) {
            self.items.push(item);
        }
    }

    pub(crate) fn remove(&mut self, item: &T) {
        self.items.retain(|i| i != item);
    }

    pub(crate) fn contains(&self, item: &T) -> bool {
        self.items.contains(item)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Empty the list, returning its contents in order
    pub(crate) fn take(&mut self) -> Vec<T> {
        std::mem::take(&mut self.items)
    }
}

/// Work lists objects enrol themselves in between and during steps
#[derive(Debug, Default)]
pub(crate) struct SpaceQueues {
    pub(crate) active_bodies: UniqueList<BodyRid>,
    pub(crate) active_soft_bodies: UniqueList<SoftBodyRid>,
    pub(crate) mass_properties_update: UniqueList<BodyRid>,
    pub(crate) state_query: UniqueList<BodyRid>,
    pub(crate) monitor_query: UniqueList<AreaRid>,
    pub(crate) moved_areas: UniqueList<AreaRid>,
}

impl SpaceQueues {
    /// Drop every reference to an object leaving the space
    fn forget(&mut self, rid: ObjectRid) {
        match rid {
            ObjectRid::Body(b) => {
                self.active_bodies.remove(&b);
                self.mass_properties_update.remove(&b);
                self.state_query.remove(&b);
            }
            ObjectRid::Area(a) => {
                self.monitor_query.remove(&a);
                self.moved_areas.remove(&a);
            }
            ObjectRid::SoftBody(s) => self.active_soft_bodies.remove(&s),
        }
    }
}

/// Per-space solver tunables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpaceParameter {
    /// Distance within which a contact is recycled between steps
    ContactRecycleRadius,
    /// Separation at which contacts are dropped
    ContactMaxSeparation,
    /// Penetration tolerated before position correction
    ContactMaxAllowedPenetration,
    /// Position correction factor for contacts
    ContactDefaultBias,
    /// Position correction factor for joints
    ConstraintDefaultBias,
    /// Linear speed below which a body counts as still
    BodyLinearVelocitySleepThreshold,
    /// Angular speed below which a body counts as still
    BodyAngularVelocitySleepThreshold,
    /// Seconds a body must be still before it sleeps
    BodyTimeToSleep,
    /// Solver iterations per island
    SolverIterations,
}

/// Current values of every [`SpaceParameter`]
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SpaceParams {
    pub(crate) contact_recycle_radius: Real,
    pub(crate) contact_max_separation: Real,
    pub(crate) contact_max_allowed_penetration: Real,
    pub(crate) contact_default_bias: Real,
    pub(crate) constraint_default_bias: Real,
    pub(crate) sleep_threshold_linear: Real,
    pub(crate) sleep_threshold_angular: Real,
    pub(crate) time_to_sleep: Real,
    pub(crate) solver_iterations: usize,
}

impl SpaceParams {
    pub(crate) fn from_settings(settings: &PhysicsSettings) -> Self {
        Self {
            contact_recycle_radius: settings.contact_recycle_radius,
            contact_max_separation: settings.contact_max_separation,
            contact_max_allowed_penetration: settings.contact_max_allowed_penetration,
            contact_default_bias: settings.contact_default_bias,
            constraint_default_bias: settings.constraint_default_bias,
            sleep_threshold_linear: settings.sleep_threshold_linear,
            sleep_threshold_angular: settings.sleep_threshold_angular,
            time_to_sleep: settings.time_before_sleep,
            solver_iterations: settings.solver_iterations,
        }
    }
}

impl Default for SpaceParams {
    fn default() -> Self {
        Self::from_settings(&PhysicsSettings::default())
    }
}

/// Which counter `get_process_info` reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessInfo {
    /// Bodies and soft bodies stepped last frame
    ActiveObjects,
    /// Live broadphase pairs
    CollisionPairs,
    /// Constraint islands solved last frame
    IslandCount,
}

/// A simulation space
#[derive(Debug)]
pub struct Space {
    rid: SpaceRid,
    active: bool,
    locked: bool,
    pub(crate) params: SpaceParams,
    pub(crate) queues: SpaceQueues,
    pub(crate) broadphase: BvhBroadPhase,
    pub(crate) pairs: SlotMap<PairId, Pair>,
    proxy_pairs: BTreeMap<(ProxyId, ProxyId), PairId>,
    members: BTreeSet<ObjectRid>,
    default_area: Option<AreaRid>,
    last_step: Real,
    step_stamp: u64,
    island_count: usize,
    active_objects: usize,
    collision_pairs: usize,
}

impl Space {
    /// An empty, inactive space
    pub(crate) fn new(rid: SpaceRid, params: SpaceParams) -> Self {
        Self {
            rid,
            active: false,
            locked: false,
            params,
            queues: SpaceQueues::default(),
            broadphase: BvhBroadPhase::new(),
            pairs: SlotMap::with_key(),
            proxy_pairs: BTreeMap::new(),
            members: BTreeSet::new(),
            default_area: None,
            last_step: 0.0,
            step_stamp: 0,
            island_count: 0,
            active_objects: 0,
            collision_pairs: 0,
        }
    }

    /// Own handle
    pub const fn rid(&self) -> SpaceRid {
        self.rid
    }

    /// Whether the server steps this space
    pub const fn is_active(&self) -> bool {
        self.active
    }

    pub(crate) fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    /// Whether the solver is running on this space
    pub const fn is_locked(&self) -> bool {
        self.locked
    }

    pub(crate) fn ensure_unlocked(&self) -> PhysicsResult<()> {
        crate::ensure!(!self.locked, PhysicsError::SpaceLocked);
        Ok(())
    }

    /// The area supplying space-wide gravity and damping
    pub const fn default_area(&self) -> Option<AreaRid> {
        self.default_area
    }

    pub(crate) fn set_default_area(&mut self, area: Option<AreaRid>) {
        self.default_area = area;
    }

    /// Length of the last step
    pub const fn last_step(&self) -> Real {
        self.last_step
    }

    /// Objects attached to this space
    pub fn members(&self) -> impl Iterator<Item = ObjectRid> + '_ {
        self.members.iter().copied()
    }

    /// Set a solver tunable
    pub(crate) fn set_param(&mut self, param: SpaceParameter, value: Real) -> PhysicsResult<()> {
        crate::ensure!(
            value.is_finite() && value >= 0.0,
            PhysicsError::precondition(format!("{param:?} must be finite and non-negative, got {value}"))
        );
        let p = &mut self.params;
        match param {
            SpaceParameter::ContactRecycleRadius => p.contact_recycle_radius = value,
            SpaceParameter::ContactMaxSeparation => p.contact_max_separation = value,
            SpaceParameter::ContactMaxAllowedPenetration => p.contact_max_allowed_penetration = value,
            SpaceParameter::ContactDefaultBias => p.contact_default_bias = value,
            SpaceParameter::ConstraintDefaultBias => p.constraint_default_bias = value,
            SpaceParameter::BodyLinearVelocitySleepThreshold => p.sleep_threshold_linear = value,
            SpaceParameter::BodyAngularVelocitySleepThreshold => p.sleep_threshold_angular = value,
            SpaceParameter::BodyTimeToSleep => p.time_to_sleep = value,
            SpaceParameter::SolverIterations => {
                crate::ensure!(value >= 1.0, PhysicsError::precondition("solver iterations must be at least 1"));
                p.solver_iterations = value as usize;
            }
        }
        Ok(())
    }

    /// Read a solver tunable
    pub fn param(&self, param: SpaceParameter) -> Real {
        let p = &self.params;
        match param {
            SpaceParameter::ContactRecycleRadius => p.contact_recycle_radius,
            SpaceParameter::ContactMaxSeparation => p.contact_max_separation,
            SpaceParameter::ContactMaxAllowedPenetration => p.contact_max_allowed_penetration,
            SpaceParameter::ContactDefaultBias => p.contact_default_bias,
            SpaceParameter::ConstraintDefaultBias => p.constraint_default_bias,
            SpaceParameter::BodyLinearVelocitySleepThreshold => p.sleep_threshold_linear,
            SpaceParameter::BodyAngularVelocitySleepThreshold => p.sleep_threshold_angular,
            SpaceParameter::BodyTimeToSleep => p.time_to_sleep,
            SpaceParameter::SolverIterations => p.solver_iterations as Real,
        }
    }

    /// Counter reported through `get_process_info`
    pub const fn process_info(&self, info: ProcessInfo) -> usize {
        match info {
            ProcessInfo::ActiveObjects => self.active_objects,
            ProcessInfo::CollisionPairs => self.collision_pairs,
            ProcessInfo::IslandCount => self.island_count,
        }
    }

    /// Attach an object: register its proxies and enrol it in the work lists
    pub(crate) fn add_object(&mut self, rid: ObjectRid, objects: &mut Objects, shapes: &SlotMap<ShapeRid, Shape>) {
        if !self.members.insert(rid) {
            return;
        }
        if let Some(base) = objects.base_mut(rid) {
            base.set_space_rid(Some(self.rid));
        }
        match rid {
            ObjectRid::Body(b) => {
                if let Some(body) = objects.bodies.get_mut(b) {
                    if body.is_active() {
                        self.queues.active_bodies.push(b);
                    }
                    body.mass_properties_changed(Some(&mut self.queues));
                }
            }
            ObjectRid::Area(a) => self.queues.moved_areas.push(a),
            ObjectRid::SoftBody(s) => self.queues.active_soft_bodies.push(s),
        }
        self.sync_proxies(rid, objects, shapes, &Vec3::zeros());
        log::debug!("{:?} joined {:?}", rid, self.rid);
    }

    /// Detach an object, destroying every pair it takes part in
    pub(crate) fn remove_object(&mut self, rid: ObjectRid, objects: &mut Objects) {
        if !self.members.remove(&rid) {
            return;
        }
        self.remove_proxies(rid, objects);
        self.queues.forget(rid);
        if let Some(area) = rid.as_area().and_then(|a| objects.areas.get_mut(a)) {
            area.clear_monitored();
        }
        if let Some(base) = objects.base_mut(rid) {
            base.set_space_rid(None);
        }
        log::debug!("{:?} left {:?}", rid, self.rid);
    }

    /// Remove every proxy of an object, so the next sync starts from scratch
    pub(crate) fn remove_proxies(&mut self, rid: ObjectRid, objects: &mut Objects) {
        let mut events = Vec::new();
        if let ObjectRid::SoftBody(s) = rid {
            if let Some(proxy) = objects.soft_bodies.get_mut(s).and_then(|sb| sb.proxy.take()) {
                events.extend(self.broadphase.remove(proxy));
            }
        } else if let Some(base) = objects.base_mut(rid) {
            for entry in base.shapes_mut() {
                if let Some(proxy) = entry.proxy.take() {
                    events.extend(self.broadphase.remove(proxy));
                }
            }
        }
        self.handle_pair_events(events, objects);
    }

    /// Remove one proxy whose shape entry is already gone
    pub(crate) fn release_proxy(&mut self, proxy: ProxyId, objects: &mut Objects) {
        let events = self.broadphase.remove(proxy);
        self.handle_pair_events(events, objects);
    }

    /// Whether an object's proxies are static for pairing purposes
    fn is_static(objects: &Objects, rid: ObjectRid) -> bool {
        match rid {
            ObjectRid::Body(b) => objects.bodies.get(b).is_some_and(|b| b.mode() == BodyMode::Static),
            ObjectRid::Area(a) => objects
                .areas
                .get(a)
                .is_some_and(|a| !a.has_monitor_callback() && !a.has_area_monitor_callback()),
            ObjectRid::SoftBody(_) => false,
        }
    }

    /// Bring an object's proxies in line with its shapes and transform: create
    /// proxies for enabled shapes, remove those of disabled shapes and move the
    /// rest. `motion` extends the bounds along the coming displacement.
    pub(crate) fn sync_proxies(&mut self, rid: ObjectRid, objects: &mut Objects, shapes: &SlotMap<ShapeRid, Shape>, motion: &Vec3) {
        if !self.members.contains(&rid) {
            return;
        }
        let is_static = Self::is_static(objects, rid);
        let mut events = Vec::new();
        if let ObjectRid::SoftBody(s) = rid {
            if let Some(soft_body) = objects.soft_bodies.get_mut(s) {
                let bounds = soft_body.bounds();
                if soft_body.node_count() == 0 {
                    if let Some(proxy) = soft_body.proxy.take() {
                        events.extend(self.broadphase.remove(proxy));
                    }
                } else if let Some(proxy) = soft_body.proxy {
                    self.broadphase.move_proxy(proxy, bounds);
                } else {
                    soft_body.proxy = Some(self.broadphase.create(rid, 0, bounds, false));
                }
            }
        } else if let Some(base) = objects.base_mut(rid) {
            base.refresh_shape_aabbs(shapes, motion);
            events.extend(sync_shape_proxies(&mut self.broadphase, base, is_static));
        }
        self.handle_pair_events(events, objects);
    }

    /// Re-evaluate the static flag of an object's proxies
    pub(crate) fn refresh_static(&mut self, rid: ObjectRid, objects: &Objects) {
        let is_static = Self::is_static(objects, rid);
        if let Some(base) = objects.base(rid) {
            for proxy in base.shapes().iter().filter_map(|e| e.proxy) {
                self.broadphase.set_static(proxy, is_static);
            }
        }
    }

    /// Turn broadphase transitions into pair constraints
    pub(crate) fn handle_pair_events(&mut self, events: Vec<PairEvent>, objects: &mut Objects) {
        for event in events {
            match event {
                PairEvent::Pair(a, b) => self.create_pair(a, b, objects),
                PairEvent::Unpair(a, b) => self.destroy_pair(a, b, objects),
            }
        }
    }

    fn create_pair(&mut self, pa: ProxyId, pb: ProxyId, objects: &mut Objects) {
        let (Some(a), Some(b)) = (self.broadphase.proxy(pa).copied(), self.broadphase.proxy(pb).copied()) else {
            return;
        };
        let (Some(base_a), Some(base_b)) = (objects.base(a.owner), objects.base(b.owner)) else {
            return;
        };
        if !base_a.interacts_with(base_b) {
            return;
        }
        let ((oa, sa), (ob, sb)) = if a.owner <= b.owner {
            ((a.owner, a.subindex), (b.owner, b.subindex))
        } else {
            ((b.owner, b.subindex), (a.owner, a.subindex))
        };

        let queues = &mut self.queues;
        let id = match (oa, ob) {
            (ObjectRid::Area(area_a), ObjectRid::Area(area_b)) => self
                .pairs
                .insert_with_key(|id| Pair::Area2(Area2Pair::new(id, (area_b, sb), (area_a, sa), objects))),
            (ObjectRid::Area(area), ObjectRid::Body(body)) => self
                .pairs
                .insert_with_key(|id| Pair::Area(AreaPair::new(id, (body, sb), (area, sa), objects, queues))),
            (ObjectRid::Area(area), ObjectRid::SoftBody(soft_body)) => self
                .pairs
                .insert_with_key(|id| Pair::AreaSoftBody(AreaSoftBodyPair::new(id, soft_body, (area, sa), objects))),
            (ObjectRid::Body(body_a), ObjectRid::Body(body_b)) => self
                .pairs
                .insert_with_key(|id| Pair::Body(BodyPair::new(id, (body_a, sa), (body_b, sb), objects))),
            (ObjectRid::Body(body), ObjectRid::SoftBody(soft_body)) => self
                .pairs
                .insert_with_key(|id| Pair::BodySoftBody(BodySoftBodyPair::new(id, (body, sa), soft_body, objects))),
            // Soft bodies do not collide with each other
            _ => return,
        };
        self.proxy_pairs.insert(ordered(pa, pb), id);
        self.collision_pairs += 1;
    }

    fn destroy_pair(&mut self, pa: ProxyId, pb: ProxyId, objects: &mut Objects) {
        let Some(id) = self.proxy_pairs.remove(&ordered(pa, pb)) else {
            return;
        };
        if let Some(mut pair) = self.pairs.remove(id) {
            pair.destroy(id, objects, &mut self.queues);
            self.collision_pairs = self.collision_pairs.saturating_sub(1);
        }
    }

    /// Drain the lazy mass properties list
    pub(crate) fn setup(&mut self, objects: &mut Objects, shapes: &SlotMap<ShapeRid, Shape>) {
        for rid in self.queues.mass_properties_update.take() {
            if let Some(body) = objects.bodies.get_mut(rid) {
                body.update_mass_properties(shapes);
            }
        }
    }

    /// Run the broadphase and apply its transitions
    pub(crate) fn update(&mut self, objects: &mut Objects) {
        let events = self.broadphase.update();
        self.handle_pair_events(events, objects);
    }

    /// Deliver deferred callbacks: direct state to bodies with state sync or
    /// force integration callbacks, then overlap events to monitoring areas
    pub(crate) fn call_queries(&mut self, objects: &mut Objects, shapes: &SlotMap<ShapeRid, Shape>) {
        let step = self.last_step;
        for rid in self.queues.state_query.take() {
            let Some(body) = objects.bodies.get_mut(rid) else {
                continue;
            };
            let mut force_integration = body.force_integration.take();
            let mut state_sync = body.state_sync.take();
            let moved = {
                let mut state = DirectBodyState::new(body, Some(&mut self.queues), step);
                if let Some(fi) = force_integration.as_mut() {
                    (fi.callback)(&mut state, fi.user_data.as_deref_mut());
                }
                if let Some(callback) = state_sync.as_mut() {
                    callback(&mut state);
                }
                state.moved()
            };
            body.force_integration = force_integration;
            body.state_sync = state_sync;
            if moved {
                self.sync_proxies(ObjectRid::Body(rid), objects, shapes, &Vec3::zeros());
            }
        }
        for rid in self.queues.monitor_query.take() {
            if let Some(area) = objects.areas.get_mut(rid) {
                area.call_queries();
            }
        }
    }
}

fn ordered(a: ProxyId, b: ProxyId) -> (ProxyId, ProxyId) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Create, move or remove the proxies of a shape list. Returns the unpair
/// events of removed proxies.
fn sync_shape_proxies(broadphase: &mut BvhBroadPhase, base: &mut CollisionObject, is_static: bool) -> Vec<PairEvent> {
    let owner = base.rid();
    let mut events = Vec::new();
    for (index, entry) in base.shapes_mut().iter_mut().enumerate() {
        match (entry.disabled, entry.proxy) {
            (true, Some(proxy)) => {
                events.extend(broadphase.remove(proxy));
                entry.proxy = None;
            }
            (true, None) => {}
            (false, Some(proxy)) => {
                broadphase.set_static(proxy, is_static);
                if broadphase.proxy(proxy).is_some_and(|p| p.subindex == index) {
                    broadphase.move_proxy(proxy, entry.aabb_cache);
                } else {
                    // The shape list was edited and this entry moved to another index
                    events.extend(broadphase.remove(proxy));
                    entry.proxy = Some(broadphase.create(owner, index, entry.aabb_cache, is_static));
                }
            }
            (false, None) => entry.proxy = Some(broadphase.create(owner, index, entry.aabb_cache, is_static)),
        }
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::ShapeType;
    use crate::foundation::math::{translation, Transform};
    use crate::object::{Area, Body, BodyState};
    use crate::param::ParamValue;

    fn space() -> Space {
        let mut keys: SlotMap<SpaceRid, ()> = SlotMap::with_key();
        Space::new(keys.insert(()), SpaceParams::default())
    }

    #[test]
    fn test_unique_list_keeps_first_insertion_order() {
        let mut list = UniqueList::default();
        list.push(3);
        list.push(1);
        list.push(3);
        assert_eq!(list.len(), 2);
        list.remove(&3);
        assert!(!list.contains(&3));
        assert_eq!(list.take(), vec![1]);
        assert!(list.is_empty());
    }

    #[test]
    fn test_params_validate() {
        let mut space = space();
        space.set_param(SpaceParameter::BodyTimeToSleep, 2.0).unwrap();
        assert!((space.param(SpaceParameter::BodyTimeToSleep) - 2.0).abs() < 1e-6);
        assert!(space.set_param(SpaceParameter::ContactMaxSeparation, -1.0).is_err());
        assert!(space.set_param(SpaceParameter::SolverIterations, 0.0).is_err());
        assert_eq!(space.param(SpaceParameter::SolverIterations) as usize, 8);
    }

    #[test]
    fn test_overlapping_members_pair_once() {
        let mut space = space();
        let mut objects = Objects::default();
        let mut shapes = SlotMap::with_key();
        let sphere = shapes.insert(Shape::new(ShapeType::Sphere));

        let a = objects.bodies.insert_with_key(Body::new);
        let b = objects.bodies.insert_with_key(Body::new);
        let area = objects.areas.insert_with_key(Area::new);
        objects.bodies[a].base_mut().push_shape(sphere, Transform::identity(), false);
        objects.bodies[b].base_mut().push_shape(sphere, Transform::identity(), false);
        objects.areas[area].base_mut().push_shape(sphere, Transform::identity(), false);
        objects.bodies[b]
            .set_state(BodyState::Transform, ParamValue::Transform(translation(Vec3::new(0.5, 0.0, 0.0))), None)
            .unwrap();

        for rid in [ObjectRid::Body(a), ObjectRid::Body(b), ObjectRid::Area(area)] {
            space.add_object(rid, &mut objects, &shapes);
        }
        space.update(&mut objects);
        // body-body plus two area-body pairs
        assert_eq!(space.process_info(ProcessInfo::CollisionPairs), 3);
        assert_eq!(space.pairs.len(), 3);
        assert_eq!(objects.bodies[a].constraints().count(), 2);

        space.remove_object(ObjectRid::Body(a), &mut objects);
        assert_eq!(space.process_info(ProcessInfo::CollisionPairs), 1);
        assert_eq!(objects.bodies[a].constraints().count(), 0);
        assert!(objects.bodies[a].base().space().is_none());
        assert!(!space.queues.active_bodies.contains(&a));
    }

    #[test]
    fn test_disabling_shape_unpairs() {
        let mut space = space();
        let mut objects = Objects::default();
        let mut shapes = SlotMap::with_key();
        let sphere = shapes.insert(Shape::new(ShapeType::Sphere));
        let a = objects.bodies.insert_with_key(Body::new);
        let b = objects.bodies.insert_with_key(Body::new);
        for rid in [a, b] {
            objects.bodies[rid].base_mut().push_shape(sphere, Transform::identity(), false);
            space.add_object(ObjectRid::Body(rid), &mut objects, &shapes);
        }
        space.update(&mut objects);
        assert_eq!(space.pairs.len(), 1);

        objects.bodies[a].base_mut().set_shape_disabled(0, true).unwrap();
        space.sync_proxies(ObjectRid::Body(a), &mut objects, &shapes, &Vec3::zeros());
        assert!(space.pairs.is_empty());
        assert_eq!(space.broadphase.proxy_count(), 1);
    }
}
