//! Shape entry points

use super::{invalid, PhysicsServer};
use crate::collision::{solve_static, ContactBuffer, Shape, ShapeData, ShapeType};
use crate::error::PhysicsResult;
use crate::foundation::math::{Real, Transform, Vec3};
use crate::rid::{ObjectRid, ShapeRid};

impl PhysicsServer {
    /// Create a shape with the default geometry of its kind
    pub fn shape_create(&mut self, kind: ShapeType) -> ShapeRid {
        self.shapes.insert(Shape::new(kind))
    }

    fn shape(&self, rid: ShapeRid) -> PhysicsResult<&Shape> {
        self.shapes.get(rid).ok_or_else(|| invalid("shape", rid))
    }

    /// Replace a shape's geometry. Every owner refreshes its bounds and mass.
    pub fn shape_set_data(&mut self, rid: ShapeRid, data: ShapeData) -> PhysicsResult<()> {
        let owners: Vec<ObjectRid> = self.shape(rid)?.owners().keys().copied().collect();
        for owner in &owners {
            self.ensure_object_unlocked(*owner)?;
        }
        self.shapes.get_mut(rid).ok_or_else(|| invalid("shape", rid))?.set_data(data)?;
        for owner in owners {
            self.object_shapes_changed(owner);
        }
        Ok(())
    }

    /// Kind of a shape
    pub fn shape_get_type(&self, rid: ShapeRid) -> PhysicsResult<ShapeType> {
        Ok(self.shape(rid)?.shape_type())
    }

    /// Geometry of a shape
    pub fn shape_get_data(&self, rid: ShapeRid) -> PhysicsResult<ShapeData> {
        Ok(self.shape(rid)?.data().clone())
    }

    /// Per-shape contact bias; zero uses the space default
    pub fn shape_set_custom_bias(&mut self, rid: ShapeRid, bias: Real) -> PhysicsResult<()> {
        self.shapes.get_mut(rid).ok_or_else(|| invalid("shape", rid))?.set_custom_bias(bias);
        Ok(())
    }

    /// Per-shape contact bias
    pub fn shape_get_custom_bias(&self, rid: ShapeRid) -> PhysicsResult<Real> {
        Ok(self.shape(rid)?.custom_bias())
    }

    /// Collision margin
    pub fn shape_set_margin(&mut self, rid: ShapeRid, margin: Real) -> PhysicsResult<()> {
        self.shapes.get_mut(rid).ok_or_else(|| invalid("shape", rid))?.set_margin(margin);
        Ok(())
    }

    /// Collision margin
    pub fn shape_get_margin(&self, rid: ShapeRid) -> PhysicsResult<Real> {
        Ok(self.shape(rid)?.margin())
    }

    /// Collide two free-standing placed shapes. Returns up to `max_results`
    /// contact pairs (point on A, point on B), deepest kept first when the
    /// solver reports more. `None` when the shapes are apart.
    pub fn shape_collide(
        &self,
        shape_a: ShapeRid,
        xform_a: &Transform,
        shape_b: ShapeRid,
        xform_b: &Transform,
        max_results: usize,
    ) -> PhysicsResult<Option<Vec<(Vec3, Vec3)>>> {
        let a = self.shape(shape_a)?;
        let b = self.shape(shape_b)?;
        let mut buffer = ContactBuffer::new(max_results);
        let mut collect = |pa: Vec3, pb: Vec3| buffer.push(pa, pb);
        let collided = solve_static(a, xform_a, b, xform_b, Some(&mut collect), 0.0, 0.0);
        Ok(collided.then(|| buffer.into_pairs()))
    }
}
