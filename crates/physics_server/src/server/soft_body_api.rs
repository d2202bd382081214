//! Soft body entry points

use super::{invalid, PhysicsServer};
use crate::error::PhysicsResult;
use crate::foundation::math::{Aabb, Real, Transform, Vec3};
use crate::object::SoftBody;
use crate::rid::{ObjectRid, SoftBodyRid, SpaceRid};

const KIND: &str = "soft body";

impl PhysicsServer {
    /// Create a detached soft body without a mesh
    pub fn soft_body_create(&mut self) -> SoftBodyRid {
        self.objects.soft_bodies.insert_with_key(SoftBody::new)
    }

    fn soft_body(&self, rid: SoftBodyRid) -> PhysicsResult<&SoftBody> {
        self.objects.soft_bodies.get(rid).ok_or_else(|| invalid(KIND, rid))
    }

    /// Mutate a soft body, then bring its proxy in line with the new bounds
    fn soft_body_update(&mut self, rid: SoftBodyRid, f: impl FnOnce(&mut SoftBody) -> PhysicsResult<()>) -> PhysicsResult<()> {
        self.ensure_object_unlocked(ObjectRid::SoftBody(rid))?;
        let soft_body = self.objects.soft_bodies.get_mut(rid).ok_or_else(|| invalid(KIND, rid))?;
        f(soft_body)?;
        self.object_moved(ObjectRid::SoftBody(rid));
        Ok(())
    }

    fn soft_body_set(&mut self, rid: SoftBodyRid, f: impl FnOnce(&mut SoftBody) -> PhysicsResult<()>) -> PhysicsResult<()> {
        f(self.objects.soft_bodies.get_mut(rid).ok_or_else(|| invalid(KIND, rid))?)
    }

    /// Move a soft body to a space, or out of any
    pub fn soft_body_set_space(&mut self, rid: SoftBodyRid, space: Option<SpaceRid>) -> PhysicsResult<()> {
        self.object_set_space(ObjectRid::SoftBody(rid), KIND, space)
    }

    /// Space the soft body belongs to
    pub fn soft_body_get_space(&self, rid: SoftBodyRid) -> PhysicsResult<Option<SpaceRid>> {
        Ok(self.soft_body(rid)?.base().space())
    }

    /// Rebuild nodes, links and faces from a triangle list
    pub fn soft_body_set_mesh(&mut self, rid: SoftBodyRid, vertices: &[Vec3], indices: &[usize]) -> PhysicsResult<()> {
        self.soft_body_update(rid, |sb| sb.set_mesh(vertices, indices))
    }

    /// Place every node at its rest position under `transform`
    pub fn soft_body_set_transform(&mut self, rid: SoftBodyRid, transform: Transform) -> PhysicsResult<()> {
        self.soft_body_update(rid, |sb| {
            sb.set_transform(transform);
            Ok(())
        })
    }

    /// World bounds of every node
    pub fn soft_body_get_bounds(&self, rid: SoftBodyRid) -> PhysicsResult<Aabb> {
        Ok(self.soft_body(rid)?.bounds())
    }

    /// Total mass, spread evenly over unpinned nodes
    pub fn soft_body_set_total_mass(&mut self, rid: SoftBodyRid, mass: Real) -> PhysicsResult<()> {
        self.soft_body_set(rid, |sb| sb.set_total_mass(mass))
    }

    /// Total mass
    pub fn soft_body_get_total_mass(&self, rid: SoftBodyRid) -> PhysicsResult<Real> {
        Ok(self.soft_body(rid)?.total_mass())
    }

    /// Link stiffness in `(0, 1]`
    pub fn soft_body_set_linear_stiffness(&mut self, rid: SoftBodyRid, stiffness: Real) -> PhysicsResult<()> {
        self.soft_body_set(rid, |sb| sb.set_linear_stiffness(stiffness))
    }

    /// Link stiffness
    pub fn soft_body_get_linear_stiffness(&self, rid: SoftBodyRid) -> PhysicsResult<Real> {
        Ok(self.soft_body(rid)?.linear_stiffness())
    }

    /// Inflation pressure
    pub fn soft_body_set_pressure_coefficient(&mut self, rid: SoftBodyRid, pressure: Real) -> PhysicsResult<()> {
        self.soft_body_set(rid, |sb| {
            sb.set_pressure_coefficient(pressure);
            Ok(())
        })
    }

    /// Inflation pressure
    pub fn soft_body_get_pressure_coefficient(&self, rid: SoftBodyRid) -> PhysicsResult<Real> {
        Ok(self.soft_body(rid)?.pressure_coefficient())
    }

    /// Velocity damping per step
    pub fn soft_body_set_damping_coefficient(&mut self, rid: SoftBodyRid, damping: Real) -> PhysicsResult<()> {
        self.soft_body_set(rid, |sb| {
            sb.set_damping_coefficient(damping);
            Ok(())
        })
    }

    /// Velocity damping per step
    pub fn soft_body_get_damping_coefficient(&self, rid: SoftBodyRid) -> PhysicsResult<Real> {
        Ok(self.soft_body(rid)?.damping_coefficient())
    }

    /// Aerodynamic drag, stored only
    pub fn soft_body_set_drag_coefficient(&mut self, rid: SoftBodyRid, drag: Real) -> PhysicsResult<()> {
        self.soft_body_set(rid, |sb| {
            sb.set_drag_coefficient(drag);
            Ok(())
        })
    }

    /// Aerodynamic drag
    pub fn soft_body_get_drag_coefficient(&self, rid: SoftBodyRid) -> PhysicsResult<Real> {
        Ok(self.soft_body(rid)?.drag_coefficient())
    }

    /// Relaxation iterations per step
    pub fn soft_body_set_simulation_precision(&mut self, rid: SoftBodyRid, iterations: usize) -> PhysicsResult<()> {
        self.soft_body_set(rid, |sb| sb.set_simulation_precision(iterations))
    }

    /// Relaxation iterations per step
    pub fn soft_body_get_simulation_precision(&self, rid: SoftBodyRid) -> PhysicsResult<usize> {
        Ok(self.soft_body(rid)?.simulation_precision())
    }

    /// Node sphere radius
    pub fn soft_body_set_collision_margin(&mut self, rid: SoftBodyRid, margin: Real) -> PhysicsResult<()> {
        self.soft_body_update(rid, |sb| {
            sb.set_collision_margin(margin);
            Ok(())
        })
    }

    /// Node sphere radius
    pub fn soft_body_get_collision_margin(&self, rid: SoftBodyRid) -> PhysicsResult<Real> {
        Ok(self.soft_body(rid)?.collision_margin())
    }

    /// Pin or release a mesh vertex
    pub fn soft_body_pin_point(&mut self, rid: SoftBodyRid, vertex: usize, pin: bool) -> PhysicsResult<()> {
        self.soft_body_set(rid, |sb| sb.pin_point(vertex, pin))
    }

    /// Whether a mesh vertex is pinned
    pub fn soft_body_is_point_pinned(&self, rid: SoftBodyRid, vertex: usize) -> PhysicsResult<bool> {
        Ok(self.soft_body(rid)?.is_point_pinned(vertex))
    }

    /// Teleport a mesh vertex
    pub fn soft_body_move_point(&mut self, rid: SoftBodyRid, vertex: usize, position: Vec3) -> PhysicsResult<()> {
        self.soft_body_update(rid, |sb| sb.move_point(vertex, position))
    }

    /// World position of a mesh vertex
    pub fn soft_body_get_point_global_position(&self, rid: SoftBodyRid, vertex: usize) -> PhysicsResult<Vec3> {
        self.soft_body(rid)?.point_global_position(vertex)
    }

    /// Layers this soft body is found on
    pub fn soft_body_set_collision_layer(&mut self, rid: SoftBodyRid, layer: u32) -> PhysicsResult<()> {
        self.base_mut(ObjectRid::SoftBody(rid), KIND)?.set_collision_layer(layer);
        self.object_filters_changed(ObjectRid::SoftBody(rid));
        Ok(())
    }

    /// Layers this soft body is found on
    pub fn soft_body_get_collision_layer(&self, rid: SoftBodyRid) -> PhysicsResult<u32> {
        Ok(self.soft_body(rid)?.base().collision_layer())
    }

    /// Layers this soft body looks for
    pub fn soft_body_set_collision_mask(&mut self, rid: SoftBodyRid, mask: u32) -> PhysicsResult<()> {
        self.base_mut(ObjectRid::SoftBody(rid), KIND)?.set_collision_mask(mask);
        self.object_filters_changed(ObjectRid::SoftBody(rid));
        Ok(())
    }

    /// Layers this soft body looks for
    pub fn soft_body_get_collision_mask(&self, rid: SoftBodyRid) -> PhysicsResult<u32> {
        Ok(self.soft_body(rid)?.base().collision_mask())
    }

    /// Never collide with `other`
    pub fn soft_body_add_collision_exception(&mut self, rid: SoftBodyRid, other: impl Into<ObjectRid>) -> PhysicsResult<()> {
        let other = other.into();
        self.soft_body_set(rid, |sb| {
            sb.add_exception(other);
            Ok(())
        })
    }

    /// Collide with `other` again
    pub fn soft_body_remove_collision_exception(&mut self, rid: SoftBodyRid, other: impl Into<ObjectRid>) -> PhysicsResult<()> {
        let other = other.into();
        self.soft_body_set(rid, |sb| {
            sb.remove_exception(other);
            Ok(())
        })
    }

    /// Objects this soft body never collides with
    pub fn soft_body_get_collision_exceptions(&self, rid: SoftBodyRid) -> PhysicsResult<Vec<ObjectRid>> {
        Ok(self.soft_body(rid)?.exceptions().collect())
    }

    /// Whether rays with `pick_ray` set can hit this soft body
    pub fn soft_body_set_ray_pickable(&mut self, rid: SoftBodyRid, pickable: bool) -> PhysicsResult<()> {
        self.base_mut(ObjectRid::SoftBody(rid), KIND)?.set_ray_pickable(pickable);
        Ok(())
    }

    /// Tag handed back in contact and overlap reports
    pub fn soft_body_attach_object_instance_id(&mut self, rid: SoftBodyRid, id: u64) -> PhysicsResult<()> {
        self.base_mut(ObjectRid::SoftBody(rid), KIND)?.set_instance_id(id);
        Ok(())
    }

    /// Owner tag
    pub fn soft_body_get_object_instance_id(&self, rid: SoftBodyRid) -> PhysicsResult<u64> {
        Ok(self.soft_body(rid)?.base().instance_id())
    }
}
