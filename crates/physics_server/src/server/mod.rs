//! # Physics Server
//!
//! The handle-based command surface everything outside the crate talks to.
//! Based on Game Engine Architecture 3rd Edition, Section 13.4.8 ("The
//! Collision World") and Section 8.5 ("The Game Loop"): one explicit server
//! object owns every resource arena, the caller drives it with a fixed
//! `step`, and deferred callbacks run from `flush_queries` once the solver
//! has let go of the spaces.
//!
//! The entry points are grouped by resource in the sibling modules; this
//! module holds the lifecycle, the per-tick driver and the helpers they share.

mod area_api;
mod body_api;
mod joint_api;
mod shape_api;
mod soft_body_api;
mod space_api;

use std::collections::BTreeSet;

use slotmap::SlotMap;

use crate::collision::Shape;
use crate::config::{ConfigError, PhysicsSettings};
use crate::constraint::Joint;
use crate::ensure;
use crate::error::{PhysicsError, PhysicsResult};
use crate::foundation::math::{Real, Transform, Vec3};
use crate::object::{CollisionObject, Objects};
use crate::rid::{JointRid, ObjectRid, Rid, ShapeRid, SpaceRid};
use crate::space::{ProcessInfo, Space, SpaceQueues};

/// Invalid-handle error, logged at the point of rejection
pub(crate) fn invalid(kind: &'static str, rid: impl Into<Rid>) -> PhysicsError {
    let err = PhysicsError::InvalidHandle { kind, rid: rid.into() };
    log::error!("{}", err);
    err
}

/// The physics server
pub struct PhysicsServer {
    settings: PhysicsSettings,
    active: bool,
    initialized: bool,
    doing_sync: bool,
    flushing_queries: bool,
    last_step: Real,
    pub(crate) shapes: SlotMap<ShapeRid, Shape>,
    pub(crate) objects: Objects,
    pub(crate) spaces: SlotMap<SpaceRid, Space>,
    pub(crate) joints: SlotMap<JointRid, Joint>,
    active_spaces: BTreeSet<SpaceRid>,
}

impl std::fmt::Debug for PhysicsServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysicsServer")
            .field("active", &self.active)
            .field("shapes", &self.shapes.len())
            .field("bodies", &self.objects.bodies.len())
            .field("areas", &self.objects.areas.len())
            .field("soft_bodies", &self.objects.soft_bodies.len())
            .field("spaces", &self.spaces.len())
            .field("joints", &self.joints.len())
            .finish_non_exhaustive()
    }
}

impl PhysicsServer {
    /// Create a server from validated settings
    pub fn new(settings: PhysicsSettings) -> PhysicsResult<Self> {
        settings.validate().map_err(|msg| {
            let err = PhysicsError::Config(ConfigError::Invalid(msg));
            log::error!("{}", err);
            err
        })?;
        Ok(Self {
            settings,
            active: true,
            initialized: false,
            doing_sync: false,
            flushing_queries: false,
            last_step: 0.0,
            shapes: SlotMap::with_key(),
            objects: Objects::default(),
            spaces: SlotMap::with_key(),
            joints: SlotMap::with_key(),
            active_spaces: BTreeSet::new(),
        })
    }

    /// Settings new spaces are created from
    pub const fn settings(&self) -> &PhysicsSettings {
        &self.settings
    }

    /// Start the physics lifetime
    pub fn init(&mut self) {
        self.initialized = true;
        self.doing_sync = false;
        log::info!(
            "Physics server initialized: gravity {} along {:?}, {} solver iterations",
            self.settings.default_gravity,
            self.settings.default_gravity_vector,
            self.settings.solver_iterations
        );
    }

    /// End the physics lifetime, releasing every resource
    pub fn finish(&mut self) {
        let joints: Vec<_> = self.joints.keys().collect();
        for rid in joints {
            self.free_joint(rid);
        }
        let spaces: Vec<_> = self.spaces.keys().collect();
        for rid in spaces {
            self.free_space(rid);
        }
        let bodies: Vec<_> = self.objects.bodies.keys().collect();
        for rid in bodies {
            self.free_object(ObjectRid::Body(rid));
        }
        let areas: Vec<_> = self.objects.areas.keys().collect();
        for rid in areas {
            self.free_object(ObjectRid::Area(rid));
        }
        let soft_bodies: Vec<_> = self.objects.soft_bodies.keys().collect();
        for rid in soft_bodies {
            self.free_object(ObjectRid::SoftBody(rid));
        }
        self.shapes.clear();
        self.initialized = false;
        log::info!("Physics server finished");
    }

    /// Whether `init` ran without a matching `finish`
    pub const fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Pause or resume stepping and query flushing
    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    /// Whether `step` and `flush_queries` do anything
    pub const fn is_active(&self) -> bool {
        self.active
    }

    /// Solver iterations for every space, current and future
    pub fn set_collision_iterations(&mut self, iterations: usize) -> PhysicsResult<()> {
        ensure!(iterations >= 1, PhysicsError::precondition("collision iterations must be at least 1"));
        self.settings.solver_iterations = iterations;
        for space in self.spaces.values_mut() {
            space.params.solver_iterations = iterations;
        }
        Ok(())
    }

    /// Advance every active space by `step` seconds
    pub fn step(&mut self, step: Real) -> PhysicsResult<()> {
        ensure!(
            step.is_finite() && step > 0.0,
            PhysicsError::precondition(format!("step must be positive and finite, got {step}"))
        );
        if !self.active {
            return Ok(());
        }
        self.doing_sync = false;
        self.last_step = step;

        let Self { spaces, objects, shapes, joints, active_spaces, .. } = self;
        for rid in active_spaces.iter() {
            if let Some(space) = spaces.get_mut(*rid) {
                space.step(step, objects, shapes, joints);
            }
        }
        log::trace!(
            "step {step}: {} active objects, {} pairs, {} islands",
            self.get_process_info(ProcessInfo::ActiveObjects),
            self.get_process_info(ProcessInfo::CollisionPairs),
            self.get_process_info(ProcessInfo::IslandCount)
        );
        Ok(())
    }

    /// Open the window in which direct state may be read from another thread
    pub fn sync(&mut self) {
        self.doing_sync = true;
    }

    /// Close the direct state window
    pub fn end_sync(&mut self) {
        self.doing_sync = false;
    }

    /// Deliver the callbacks queued by the last step
    pub fn flush_queries(&mut self) {
        if !self.active {
            return;
        }
        self.flushing_queries = true;
        let Self { spaces, objects, shapes, active_spaces, .. } = self;
        for rid in active_spaces.iter() {
            if let Some(space) = spaces.get_mut(*rid) {
                space.call_queries(objects, shapes);
            }
        }
        self.flushing_queries = false;
    }

    /// Counter summed over the active spaces
    pub fn get_process_info(&self, info: ProcessInfo) -> usize {
        self.active_spaces
            .iter()
            .filter_map(|rid| self.spaces.get(*rid))
            .map(|space| space.process_info(info))
            .sum()
    }

    /// Release any resource, detaching it from everything that references it
    pub fn free(&mut self, rid: impl Into<Rid>) -> PhysicsResult<()> {
        let rid = rid.into();
        match rid {
            Rid::Shape(r) => {
                ensure!(self.shapes.contains_key(r), PhysicsError::InvalidHandle { kind: "shape", rid });
                self.free_shape(r)?;
            }
            Rid::Body(r) => {
                ensure!(self.objects.bodies.contains_key(r), PhysicsError::InvalidHandle { kind: "body", rid });
                self.ensure_object_unlocked(ObjectRid::Body(r))?;
                let joints: Vec<_> = self.joints.keys().collect();
                for joint in joints {
                    if let Some(joint) = self.joints.get_mut(joint) {
                        joint.detach_body(r, &mut self.objects);
                    }
                }
                self.free_object(ObjectRid::Body(r));
            }
            Rid::Area(r) => {
                ensure!(self.objects.areas.contains_key(r), PhysicsError::InvalidHandle { kind: "area", rid });
                ensure!(
                    self.spaces.values().all(|s| s.default_area() != Some(r)),
                    PhysicsError::precondition("a space's default area is freed with its space")
                );
                self.ensure_object_unlocked(ObjectRid::Area(r))?;
                self.free_object(ObjectRid::Area(r));
            }
            Rid::SoftBody(r) => {
                ensure!(self.objects.soft_bodies.contains_key(r), PhysicsError::InvalidHandle { kind: "soft body", rid });
                self.ensure_object_unlocked(ObjectRid::SoftBody(r))?;
                self.free_object(ObjectRid::SoftBody(r));
            }
            Rid::Space(r) => {
                let space = self.spaces.get(r).ok_or_else(|| invalid("space", r))?;
                space.ensure_unlocked()?;
                self.free_space(r);
            }
            Rid::Joint(r) => {
                ensure!(self.joints.contains_key(r), PhysicsError::InvalidHandle { kind: "joint", rid });
                self.free_joint(r);
            }
        }
        log::debug!("freed {:?}", rid);
        Ok(())
    }

    /// Detach a shape from every owner, then drop it
    fn free_shape(&mut self, rid: ShapeRid) -> PhysicsResult<()> {
        let owners: Vec<ObjectRid> = self.shapes.get(rid).map(|s| s.owners().keys().copied().collect()).unwrap_or_default();
        for owner in &owners {
            self.ensure_object_unlocked(*owner)?;
        }
        for owner in owners {
            while let Some(index) = self
                .objects
                .base(owner)
                .and_then(|base| base.shapes().iter().position(|entry| entry.shape == rid))
            {
                self.object_remove_shape(owner, index)?;
            }
        }
        self.shapes.remove(rid);
        Ok(())
    }

    /// Leave the space, release every shape reference and drop the object
    fn free_object(&mut self, rid: ObjectRid) {
        if let Some(space) = self.objects.base(rid).and_then(CollisionObject::space) {
            if let Some(space) = self.spaces.get_mut(space) {
                space.remove_object(rid, &mut self.objects);
            }
        }
        if let Some(base) = self.objects.base(rid) {
            for entry in base.shapes() {
                if let Some(shape) = self.shapes.get_mut(entry.shape) {
                    shape.remove_owner(rid);
                }
            }
        }
        match rid {
            ObjectRid::Body(r) => {
                self.objects.bodies.remove(r);
            }
            ObjectRid::Area(r) => {
                self.objects.areas.remove(r);
            }
            ObjectRid::SoftBody(r) => {
                self.objects.soft_bodies.remove(r);
            }
        }
    }

    /// Detach every member, free the default area and drop the space
    fn free_space(&mut self, rid: SpaceRid) {
        self.active_spaces.remove(&rid);
        let Some(mut space) = self.spaces.remove(rid) else {
            return;
        };
        let members: Vec<ObjectRid> = space.members().collect();
        for member in members {
            space.remove_object(member, &mut self.objects);
        }
        if let Some(area) = space.default_area() {
            self.free_object(ObjectRid::Area(area));
        }
    }

    fn free_joint(&mut self, rid: JointRid) {
        if let Some(mut joint) = self.joints.remove(rid) {
            joint.clear(&mut self.objects);
        }
    }

    /// Reject direct state access outside the sync window when the server
    /// runs on its own thread
    fn ensure_direct_state_available(&self) -> PhysicsResult<()> {
        ensure!(
            !self.settings.run_on_separate_thread || self.doing_sync,
            PhysicsError::DirectStateUnavailable
        );
        Ok(())
    }

    fn ensure_not_flushing(&self, rid: ObjectRid) -> PhysicsResult<()> {
        let in_space = self.objects.base(rid).is_some_and(|b| b.space().is_some());
        ensure!(!(in_space && self.flushing_queries), PhysicsError::FlushingQueries);
        Ok(())
    }

    /// Reject structural changes while the object's space is being stepped
    fn ensure_object_unlocked(&self, rid: ObjectRid) -> PhysicsResult<()> {
        match self.objects.base(rid).and_then(CollisionObject::space).and_then(|s| self.spaces.get(s)) {
            Some(space) => space.ensure_unlocked(),
            None => Ok(()),
        }
    }

    fn base(&self, rid: ObjectRid, kind: &'static str) -> PhysicsResult<&CollisionObject> {
        self.objects.base(rid).ok_or_else(|| invalid(kind, rid))
    }

    fn base_mut(&mut self, rid: ObjectRid, kind: &'static str) -> PhysicsResult<&mut CollisionObject> {
        self.objects.base_mut(rid).ok_or_else(|| invalid(kind, rid))
    }

    /// Work lists of the space an object belongs to
    fn queues_of<'s>(spaces: &'s mut SlotMap<SpaceRid, Space>, space: Option<SpaceRid>) -> Option<&'s mut SpaceQueues> {
        space.and_then(|s| spaces.get_mut(s)).map(|s| &mut s.queues)
    }

    /// Move an object to another space, or out of any
    fn object_set_space(&mut self, rid: ObjectRid, kind: &'static str, space: Option<SpaceRid>) -> PhysicsResult<()> {
        let current = self.base(rid, kind)?.space();
        if current == space {
            return Ok(());
        }
        if let Some(target) = space {
            self.spaces.get(target).ok_or_else(|| invalid("space", target))?.ensure_unlocked()?;
        }
        self.ensure_object_unlocked(rid)?;
        if let Some(current) = current.and_then(|s| self.spaces.get_mut(s)) {
            current.remove_object(rid, &mut self.objects);
        }
        if let Some(target) = space.and_then(|s| self.spaces.get_mut(s)) {
            target.add_object(rid, &mut self.objects, &self.shapes);
        }
        Ok(())
    }

    /// Refresh proxies, queue mass properties and mark areas moved after the
    /// shape list or placement of an object changed
    fn object_shapes_changed(&mut self, rid: ObjectRid) {
        let space_rid = self.objects.base(rid).and_then(CollisionObject::space);
        if let Some(space) = space_rid.and_then(|s| self.spaces.get_mut(s)) {
            space.sync_proxies(rid, &mut self.objects, &self.shapes, &Vec3::zeros());
            match rid {
                ObjectRid::Body(b) => {
                    if let Some(body) = self.objects.bodies.get(b) {
                        body.mass_properties_changed(Some(&mut space.queues));
                    }
                }
                ObjectRid::Area(a) => space.queues.moved_areas.push(a),
                ObjectRid::SoftBody(_) => {}
            }
        } else if let Some(base) = self.objects.base_mut(rid) {
            base.refresh_shape_aabbs(&self.shapes, &Vec3::zeros());
        }
    }

    /// Drop and recreate an object's proxies so that pairs are re-evaluated
    /// against its new filters
    fn object_filters_changed(&mut self, rid: ObjectRid) {
        let space_rid = self.objects.base(rid).and_then(CollisionObject::space);
        if let Some(space) = space_rid.and_then(|s| self.spaces.get_mut(s)) {
            space.remove_proxies(rid, &mut self.objects);
            space.sync_proxies(rid, &mut self.objects, &self.shapes, &Vec3::zeros());
        }
    }

    /// Re-sync the proxies of an object that moved
    fn object_moved(&mut self, rid: ObjectRid) {
        let space_rid = self.objects.base(rid).and_then(CollisionObject::space);
        if let Some(space) = space_rid.and_then(|s| self.spaces.get_mut(s)) {
            if let ObjectRid::Area(a) = rid {
                space.queues.moved_areas.push(a);
            }
            space.sync_proxies(rid, &mut self.objects, &self.shapes, &Vec3::zeros());
        }
    }

    fn object_add_shape(&mut self, rid: ObjectRid, kind: &'static str, shape: ShapeRid, transform: Transform, disabled: bool) -> PhysicsResult<()> {
        self.base(rid, kind)?;
        ensure!(self.shapes.contains_key(shape), PhysicsError::InvalidHandle { kind: "shape", rid: shape.into() });
        self.ensure_object_unlocked(rid)?;
        self.base_mut(rid, kind)?.push_shape(shape, transform, disabled);
        if let Some(shape) = self.shapes.get_mut(shape) {
            shape.add_owner(rid);
        }
        self.object_shapes_changed(rid);
        Ok(())
    }

    fn object_set_shape(&mut self, rid: ObjectRid, kind: &'static str, index: usize, shape: ShapeRid) -> PhysicsResult<()> {
        self.base(rid, kind)?.shape(index)?;
        ensure!(self.shapes.contains_key(shape), PhysicsError::InvalidHandle { kind: "shape", rid: shape.into() });
        self.ensure_object_unlocked(rid)?;
        let old = self.base_mut(rid, kind)?.replace_shape(index, shape)?;
        if let Some(old) = self.shapes.get_mut(old) {
            old.remove_owner(rid);
        }
        if let Some(new) = self.shapes.get_mut(shape) {
            new.add_owner(rid);
        }
        self.object_shapes_changed(rid);
        Ok(())
    }

    fn object_set_shape_transform(&mut self, rid: ObjectRid, kind: &'static str, index: usize, transform: Transform) -> PhysicsResult<()> {
        self.ensure_object_unlocked(rid)?;
        self.base_mut(rid, kind)?.set_shape_transform(index, transform)?;
        self.object_shapes_changed(rid);
        Ok(())
    }

    fn object_set_shape_disabled(&mut self, rid: ObjectRid, kind: &'static str, index: usize, disabled: bool) -> PhysicsResult<()> {
        self.ensure_object_unlocked(rid)?;
        self.base_mut(rid, kind)?.set_shape_disabled(index, disabled)?;
        self.object_shapes_changed(rid);
        Ok(())
    }

    /// Remove a shape entry. Later entries shift down one index.
    fn object_remove_shape(&mut self, rid: ObjectRid, index: usize) -> PhysicsResult<()> {
        self.ensure_object_unlocked(rid)?;
        let base = self.objects.base_mut(rid).ok_or_else(|| invalid("object", rid))?;
        let space_rid = base.space();
        let entry = base.remove_shape_entry(index)?;
        if let Some(shape) = self.shapes.get_mut(entry.shape) {
            shape.remove_owner(rid);
        }
        if let (Some(proxy), Some(space)) = (entry.proxy, space_rid.and_then(|s| self.spaces.get_mut(s))) {
            space.release_proxy(proxy, &mut self.objects);
        }
        self.object_shapes_changed(rid);
        Ok(())
    }

    fn object_clear_shapes(&mut self, rid: ObjectRid, kind: &'static str) -> PhysicsResult<()> {
        while self.base(rid, kind)?.shape_count() > 0 {
            self.object_remove_shape(rid, 0)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadphase::BroadPhase;
    use crate::collision::ShapeType;

    fn server() -> PhysicsServer {
        let mut server = PhysicsServer::new(PhysicsSettings::default()).unwrap();
        server.init();
        server
    }

    #[test]
    fn test_rejects_invalid_settings() {
        let settings = PhysicsSettings::default().with_solver_iterations(0);
        assert!(matches!(PhysicsServer::new(settings), Err(PhysicsError::Config(_))));
    }

    #[test]
    fn test_rejects_bad_step() {
        let mut server = server();
        assert!(server.step(0.0).is_err());
        assert!(server.step(Real::NAN).is_err());
        assert!(server.step(1.0 / 60.0).is_ok());
    }

    #[test]
    fn test_freeing_shape_detaches_owners() {
        let mut server = server();
        let space = server.space_create().unwrap();
        let sphere = server.shape_create(ShapeType::Sphere);
        let body = server.body_create();
        server.body_add_shape(body, sphere, Transform::identity(), false).unwrap();
        server.body_add_shape(body, sphere, Transform::identity(), false).unwrap();
        server.body_set_space(body, Some(space)).unwrap();

        server.free(sphere).unwrap();
        assert_eq!(server.body_get_shape_count(body).unwrap(), 0);
        assert!(server.shape_get_type(sphere).is_err());
        assert_eq!(server.spaces[space].broadphase.proxy_count(), 0);
    }

    #[test]
    fn test_freeing_space_detaches_members() {
        let mut server = server();
        let space = server.space_create().unwrap();
        let default_area = server.spaces[space].default_area().unwrap();
        let body = server.body_create();
        server.body_set_space(body, Some(space)).unwrap();

        // The default area goes with its space
        assert!(server.free(default_area).is_err());
        server.free(space).unwrap();
        assert_eq!(server.body_get_space(body).unwrap(), None);
        assert!(!server.objects.areas.contains_key(default_area));
        assert!(server.free(space).is_err());
    }

    #[test]
    fn test_freeing_body_clears_joints() {
        let mut server = server();
        let a = server.body_create();
        let b = server.body_create();
        let joint = server.joint_create();
        server.joint_make_pin(joint, a, Vec3::zeros(), Some(b), Vec3::zeros()).unwrap();
        assert_eq!(server.objects.bodies[b].constraints().count(), 1);

        server.free(a).unwrap();
        assert_eq!(server.joint_get_type(joint).unwrap(), crate::constraint::JointType::Empty);
        assert_eq!(server.objects.bodies[b].constraints().count(), 0);
    }

    #[test]
    fn test_collision_iterations_reach_spaces() {
        let mut server = server();
        let space = server.space_create().unwrap();
        server.set_collision_iterations(3).unwrap();
        assert!(server.set_collision_iterations(0).is_err());
        let iterations = server.space_get_param(space, crate::space::SpaceParameter::SolverIterations).unwrap();
        assert_eq!(iterations as usize, 3);
    }

    #[test]
    fn test_finish_releases_everything() {
        let mut server = server();
        let space = server.space_create().unwrap();
        let body = server.body_create();
        server.body_set_space(body, Some(space)).unwrap();
        server.shape_create(ShapeType::Box);
        server.finish();
        assert!(!server.is_initialized());
        assert!(server.objects.bodies.is_empty());
        assert!(server.objects.areas.is_empty());
        assert!(server.spaces.is_empty());
        assert!(server.shapes.is_empty());
    }
}
