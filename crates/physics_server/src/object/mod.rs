//! Collision objects
//!
//! Based on Game Engine Architecture 3rd Edition, Section 13.3.1:
//! "Collidable objects... are described by a shape and a transform."
//!
//! [`CollisionObject`] is the part shared by areas, rigid bodies and soft
//! bodies: identity, owning space, transform, the ordered shape list and the
//! layer/mask filter. The concrete kinds embed it.

pub mod area;
pub mod body;
pub mod direct_state;
pub mod soft_body;

use slotmap::SlotMap;

pub use area::{Area, AreaParameter, AreaSpaceOverrideMode, MonitorEvent, MonitorEventKind};
pub use body::{Body, BodyAxis, BodyMode, BodyParameter, BodyState};
pub use direct_state::DirectBodyState;
pub use soft_body::SoftBody;

use crate::broadphase::ProxyId;
use crate::collision::{CollisionLayers, Shape};
use crate::error::{PhysicsError, PhysicsResult};
use crate::foundation::math::{Aabb, Real, Transform, Vec3};
use crate::rid::{AreaRid, BodyRid, ObjectRid, ShapeRid, SoftBodyRid, SpaceRid};

/// One shape attached to a collision object
#[derive(Debug, Clone)]
pub struct ShapeEntry {
    /// The attached shape
    pub shape: ShapeRid,
    /// Placement relative to the owner
    pub transform: Transform,
    /// Disabled shapes take no part in collision
    pub disabled: bool,
    pub(crate) proxy: Option<ProxyId>,
    pub(crate) aabb_cache: Aabb,
}

/// State shared by every collision object kind
#[derive(Debug, Clone)]
pub struct CollisionObject {
    rid: ObjectRid,
    instance_id: u64,
    space: Option<SpaceRid>,
    transform: Transform,
    shapes: Vec<ShapeEntry>,
    collision_layer: u32,
    collision_mask: u32,
    collision_priority: Real,
    ray_pickable: bool,
}

impl CollisionObject {
    /// Detached object with no shapes on the default layer
    pub fn new(rid: ObjectRid) -> Self {
        Self {
            rid,
            instance_id: 0,
            space: None,
            transform: Transform::identity(),
            shapes: Vec::new(),
            collision_layer: CollisionLayers::DEFAULT,
            collision_mask: CollisionLayers::DEFAULT,
            collision_priority: 1.0,
            ray_pickable: true,
        }
    }

    /// Own handle
    pub const fn rid(&self) -> ObjectRid {
        self.rid
    }

    /// Tag of the engine-side owner, echoed back in callbacks and query results
    pub const fn instance_id(&self) -> u64 {
        self.instance_id
    }

    /// Set the owner tag
    pub fn set_instance_id(&mut self, id: u64) {
        self.instance_id = id;
    }

    /// Space the object lives in
    pub const fn space(&self) -> Option<SpaceRid> {
        self.space
    }

    pub(crate) fn set_space_rid(&mut self, space: Option<SpaceRid>) {
        self.space = space;
    }

    /// World transform
    pub const fn transform(&self) -> &Transform {
        &self.transform
    }

    pub(crate) fn set_transform(&mut self, transform: Transform) {
        self.transform = transform;
    }

    /// Attached shapes in index order
    pub fn shapes(&self) -> &[ShapeEntry] {
        &self.shapes
    }

    pub(crate) fn shapes_mut(&mut self) -> &mut [ShapeEntry] {
        &mut self.shapes
    }

    /// Number of attached shapes
    pub fn shape_count(&self) -> usize {
        self.shapes.len()
    }

    /// Shape entry at `index`
    pub fn shape(&self, index: usize) -> PhysicsResult<&ShapeEntry> {
        self.shapes.get(index).ok_or_else(|| index_error(index, self.shapes.len()))
    }

    /// Whether the shape at `index` is disabled (out of range counts as disabled)
    pub fn is_shape_disabled(&self, index: usize) -> bool {
        self.shapes.get(index).map_or(true, |s| s.disabled)
    }

    /// World transform of the shape at `index`
    pub fn shape_world_transform(&self, index: usize) -> Transform {
        self.shapes.get(index).map_or(self.transform, |s| self.transform * s.transform)
    }

    /// Cached world bounds of the shape at `index`
    pub fn shape_aabb(&self, index: usize) -> Aabb {
        self.shapes.get(index).map_or_else(Aabb::default, |s| s.aabb_cache)
    }

    pub(crate) fn push_shape(&mut self, shape: ShapeRid, transform: Transform, disabled: bool) {
        self.shapes.push(ShapeEntry { shape, transform, disabled, proxy: None, aabb_cache: Aabb::default() });
    }

    pub(crate) fn remove_shape_entry(&mut self, index: usize) -> PhysicsResult<ShapeEntry> {
        if index >= self.shapes.len() {
            return Err(index_error(index, self.shapes.len()));
        }
        Ok(self.shapes.remove(index))
    }

    pub(crate) fn replace_shape(&mut self, index: usize, shape: ShapeRid) -> PhysicsResult<ShapeRid> {
        let len = self.shapes.len();
        let entry = self.shapes.get_mut(index).ok_or_else(|| index_error(index, len))?;
        Ok(std::mem::replace(&mut entry.shape, shape))
    }

    pub(crate) fn set_shape_transform(&mut self, index: usize, transform: Transform) -> PhysicsResult<()> {
        let len = self.shapes.len();
        self.shapes.get_mut(index).ok_or_else(|| index_error(index, len))?.transform = transform;
        Ok(())
    }

    pub(crate) fn set_shape_disabled(&mut self, index: usize, disabled: bool) -> PhysicsResult<()> {
        let len = self.shapes.len();
        self.shapes.get_mut(index).ok_or_else(|| index_error(index, len))?.disabled = disabled;
        Ok(())
    }

    /// Recompute the cached world bounds of every shape, extended along `motion`
    pub(crate) fn refresh_shape_aabbs(&mut self, shapes: &SlotMap<ShapeRid, Shape>, motion: &Vec3) {
        let transform = self.transform;
        for entry in &mut self.shapes {
            if let Some(shape) = shapes.get(entry.shape) {
                let world = shape.aabb().transformed(&(transform * entry.transform));
                entry.aabb_cache = world.swept(motion);
            }
        }
    }

    /// Layer bits
    pub const fn collision_layer(&self) -> u32 {
        self.collision_layer
    }

    pub(crate) fn set_collision_layer(&mut self, layer: u32) {
        self.collision_layer = layer;
    }

    /// Mask bits
    pub const fn collision_mask(&self) -> u32 {
        self.collision_mask
    }

    pub(crate) fn set_collision_mask(&mut self, mask: u32) {
        self.collision_mask = mask;
    }

    /// Weight of this object when pushing other bodies out during motion recovery
    pub const fn collision_priority(&self) -> Real {
        self.collision_priority
    }

    pub(crate) fn set_collision_priority(&mut self, priority: Real) {
        self.collision_priority = priority;
    }

    /// Whether ray picking queries may hit this object
    pub const fn is_ray_pickable(&self) -> bool {
        self.ray_pickable
    }

    pub(crate) fn set_ray_pickable(&mut self, pickable: bool) {
        self.ray_pickable = pickable;
    }

    /// Whether either object scans the other's layer
    pub const fn interacts_with(&self, other: &Self) -> bool {
        CollisionLayers::interacts(self.collision_layer, self.collision_mask, other.collision_layer, other.collision_mask)
    }

    /// Whether this object's mask covers the other's layer
    pub const fn collides_with(&self, other: &Self) -> bool {
        CollisionLayers::collides_with(self.collision_mask, other.collision_layer)
    }
}

fn index_error(index: usize, len: usize) -> PhysicsError {
    let err = PhysicsError::precondition(format!("shape index {index} out of range 0..{len}"));
    log::error!("{}", err);
    err
}

/// Arena of every collision object the server owns
#[derive(Default)]
pub struct Objects {
    /// Rigid bodies
    pub bodies: SlotMap<BodyRid, Body>,
    /// Areas
    pub areas: SlotMap<AreaRid, Area>,
    /// Soft bodies
    pub soft_bodies: SlotMap<SoftBodyRid, SoftBody>,
}

impl Objects {
    /// Shared state of any object
    pub fn base(&self, rid: ObjectRid) -> Option<&CollisionObject> {
        match rid {
            ObjectRid::Area(r) => self.areas.get(r).map(Area::base),
            ObjectRid::Body(r) => self.bodies.get(r).map(Body::base),
            ObjectRid::SoftBody(r) => self.soft_bodies.get(r).map(SoftBody::base),
        }
    }

    /// Mutable shared state of any object
    pub fn base_mut(&mut self, rid: ObjectRid) -> Option<&mut CollisionObject> {
        match rid {
            ObjectRid::Area(r) => self.areas.get_mut(r).map(Area::base_mut),
            ObjectRid::Body(r) => self.bodies.get_mut(r).map(Body::base_mut),
            ObjectRid::SoftBody(r) => self.soft_bodies.get_mut(r).map(SoftBody::base_mut),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::ShapeType;
    use crate::foundation::math::translation;
    use approx::assert_relative_eq;

    fn object() -> CollisionObject {
        let mut bodies: SlotMap<BodyRid, ()> = SlotMap::with_key();
        CollisionObject::new(ObjectRid::Body(bodies.insert(())))
    }

    #[test]
    fn test_shape_list_editing() {
        let mut shapes: SlotMap<ShapeRid, Shape> = SlotMap::with_key();
        let a = shapes.insert(Shape::new(ShapeType::Sphere));
        let b = shapes.insert(Shape::new(ShapeType::Box));
        let mut obj = object();
        obj.push_shape(a, Transform::identity(), false);
        obj.push_shape(b, translation(Vec3::new(2.0, 0.0, 0.0)), true);
        assert_eq!(obj.shape_count(), 2);
        assert!(obj.is_shape_disabled(1));
        assert!(obj.is_shape_disabled(7));
        assert!(obj.shape(2).is_err());

        let removed = obj.remove_shape_entry(0).unwrap();
        assert_eq!(removed.shape, a);
        assert_eq!(obj.shape(0).unwrap().shape, b);
    }

    #[test]
    fn test_refresh_aabbs_includes_motion() {
        let mut shapes: SlotMap<ShapeRid, Shape> = SlotMap::with_key();
        let s = shapes.insert(Shape::new(ShapeType::Box));
        let mut obj = object();
        obj.push_shape(s, Transform::identity(), false);
        obj.set_transform(translation(Vec3::new(0.0, 5.0, 0.0)));
        obj.refresh_shape_aabbs(&shapes, &Vec3::new(0.0, -1.0, 0.0));
        let aabb = obj.shape_aabb(0);
        assert_relative_eq!(aabb.max.y, 5.5, epsilon = 1e-5);
        assert_relative_eq!(aabb.min.y, 3.5, epsilon = 1e-5);
    }

    #[test]
    fn test_layers() {
        let mut a = object();
        let mut b = object();
        a.set_collision_layer(1);
        a.set_collision_mask(0);
        b.set_collision_layer(2);
        b.set_collision_mask(1);
        assert!(a.interacts_with(&b));
        assert!(b.collides_with(&a));
        assert!(!a.collides_with(&b));
    }
}
