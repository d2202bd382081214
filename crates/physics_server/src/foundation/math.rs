//! Math utilities and types
//!
//! Provides the fundamental math types used by the physics server. All
//! simulation math runs in single precision, matching the rest of the engine.

pub use nalgebra::{Isometry3, Matrix3, Quaternion, Translation3, Unit, UnitQuaternion, Vector3};

/// Scalar type used throughout the simulation
pub type Real = f32;

/// 3D vector type
pub type Vec3 = Vector3<Real>;

/// 3x3 matrix type
pub type Mat3 = Matrix3<Real>;

/// 3D point type
pub type Point3 = nalgebra::Point3<Real>;

/// Quaternion type for rotations
pub type Quat = UnitQuaternion<Real>;

/// Rigid transform (rotation + translation). Scaled shape transforms are not supported.
pub type Transform = Isometry3<Real>;

/// Comparison epsilon used for "is this effectively zero" tests
pub const CMP_EPSILON: Real = 0.00001;

/// Build a transform from an origin and a rotation
pub fn transform_from(origin: Vec3, rotation: Quat) -> Transform {
    Transform::from_parts(Translation3::from(origin), rotation)
}

/// Build a pure translation
pub fn translation(origin: Vec3) -> Transform {
    Transform::translation(origin.x, origin.y, origin.z)
}

/// Transform a point
#[inline]
pub fn xform(t: &Transform, p: &Vec3) -> Vec3 {
    t.rotation * p + t.translation.vector
}

/// Inverse-transform a point
#[inline]
pub fn xform_inv(t: &Transform, p: &Vec3) -> Vec3 {
    t.rotation.inverse_transform_vector(&(p - t.translation.vector))
}

/// Renormalize the rotation part of a transform
pub fn orthonormalized(t: &Transform) -> Transform {
    let q = t.rotation.into_inner();
    let norm = q.norm();
    if norm <= CMP_EPSILON {
        return Transform::from_parts(t.translation, Quat::identity());
    }
    Transform::from_parts(t.translation, Quat::new_unchecked(q / norm))
}

/// Safe normalization: returns zero for (near) zero vectors instead of NaN
pub fn normalize_or_zero(v: &Vec3) -> Vec3 {
    let len = v.norm();
    if len > CMP_EPSILON {
        v / len
    } else {
        Vec3::zeros()
    }
}

/// Pick two unit vectors orthogonal to `n` and to each other
pub fn plane_space(n: &Vec3) -> (Vec3, Vec3) {
    let reference = if n.x.abs() > 0.57735 { Vec3::y() } else { Vec3::x() };
    let p = n.cross(&reference).normalize();
    let q = n.cross(&p);
    (p, q)
}

/// Returns the world space inertia tensor inverse for principal inverse moments
/// expressed along `axes`
pub fn inverse_inertia_tensor(axes: &Mat3, inv_principal: &Vec3) -> Mat3 {
    axes * Mat3::from_diagonal(inv_principal) * axes.transpose()
}

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    /// Minimum corner
    pub min: Vec3,
    /// Maximum corner
    pub max: Vec3,
}

impl Default for Aabb {
    fn default() -> Self {
        Self { min: Vec3::zeros(), max: Vec3::zeros() }
    }
}

impl Aabb {
    /// Create an AABB from min and max corners
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Create an AABB from center and half extents
    pub fn from_center_extents(center: Vec3, extents: Vec3) -> Self {
        Self { min: center - extents, max: center + extents }
    }

    /// Smallest AABB containing all the points. Empty input gives a degenerate box at the origin.
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Vec3>) -> Self {
        let mut iter = points.into_iter();
        let Some(first) = iter.next() else {
            return Self::default();
        };
        let mut aabb = Self { min: *first, max: *first };
        for p in iter {
            aabb.expand_to(p);
        }
        aabb
    }

    /// Get center point
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Get half extents
    pub fn extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// Get full size
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Enclosed volume
    pub fn volume(&self) -> Real {
        let s = self.size();
        s.x * s.y * s.z
    }

    /// Half the surface area, used as the tree insertion cost
    pub fn half_perimeter(&self) -> Real {
        let s = self.size();
        s.x * s.y + s.y * s.z + s.z * s.x
    }

    /// Whether both corners are finite
    pub fn is_finite(&self) -> bool {
        self.min.iter().chain(self.max.iter()).all(|v| v.is_finite())
    }

    /// Union of two boxes
    pub fn merge(&self, other: &Self) -> Self {
        Self { min: self.min.inf(&other.min), max: self.max.sup(&other.max) }
    }

    /// Grow by a margin on every side
    pub fn grow(&self, margin: Real) -> Self {
        let m = Vec3::repeat(margin);
        Self { min: self.min - m, max: self.max + m }
    }

    /// Enlarge to include a point
    pub fn expand_to(&mut self, p: &Vec3) {
        self.min = self.min.inf(p);
        self.max = self.max.sup(p);
    }

    /// Extend the box along a motion vector
    pub fn swept(&self, motion: &Vec3) -> Self {
        let mut out = *self;
        out.min += motion.inf(&Vec3::zeros());
        out.max += motion.sup(&Vec3::zeros());
        out
    }

    /// Whether `other` fits entirely inside this box
    pub fn encloses(&self, other: &Self) -> bool {
        (0..3).all(|i| self.min[i] <= other.min[i] && self.max[i] >= other.max[i])
    }

    /// Check if a point is inside (boundary inclusive)
    pub fn contains_point(&self, p: &Vec3) -> bool {
        (0..3).all(|i| p[i] >= self.min[i] && p[i] <= self.max[i])
    }

    /// Strict overlap test (touching boxes do not intersect)
    pub fn intersects(&self, other: &Self) -> bool {
        (0..3).all(|i| self.min[i] < other.max[i] && self.max[i] > other.min[i])
    }

    /// Overlap test that counts touching boxes
    pub fn intersects_inclusive(&self, other: &Self) -> bool {
        (0..3).all(|i| self.min[i] <= other.max[i] && self.max[i] >= other.min[i])
    }

    /// Slab test against the segment `from..to`
    pub fn intersects_segment(&self, from: &Vec3, to: &Vec3) -> bool {
        let dir = to - from;
        let mut t_min: Real = 0.0;
        let mut t_max: Real = 1.0;
        for i in 0..3 {
            if dir[i].abs() < CMP_EPSILON {
                if from[i] < self.min[i] || from[i] > self.max[i] {
                    return false;
                }
                continue;
            }
            let inv = 1.0 / dir[i];
            let mut t1 = (self.min[i] - from[i]) * inv;
            let mut t2 = (self.max[i] - from[i]) * inv;
            if t1 > t2 {
                std::mem::swap(&mut t1, &mut t2);
            }
            t_min = t_min.max(t1);
            t_max = t_max.min(t2);
            if t_min > t_max {
                return false;
            }
        }
        true
    }

    /// Bounding box of this box after a rigid transform
    pub fn transformed(&self, t: &Transform) -> Self {
        let center = xform(t, &self.center());
        let rot = t.rotation.to_rotation_matrix();
        let abs = rot.matrix().abs();
        let extents = abs * self.extents();
        Self::from_center_extents(center, extents)
    }
}

/// Infinite plane `normal . p = d`
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Plane {
    /// Unit normal
    pub normal: Vec3,
    /// Distance from the origin along the normal
    pub d: Real,
}

impl Plane {
    /// Create a plane, normalizing the normal
    pub fn new(normal: Vec3, d: Real) -> Self {
        let len = normal.norm();
        if len > CMP_EPSILON {
            Self { normal: normal / len, d: d / len }
        } else {
            Self { normal: Vec3::y(), d }
        }
    }

    /// Signed distance from the plane
    pub fn distance_to(&self, p: &Vec3) -> Real {
        self.normal.dot(p) - self.d
    }

    /// Project a point onto the plane
    pub fn project(&self, p: &Vec3) -> Vec3 {
        p - self.normal * self.distance_to(p)
    }

    /// Plane after a rigid transform
    pub fn transformed(&self, t: &Transform) -> Self {
        let normal = t.rotation * self.normal;
        let point = xform(t, &(self.normal * self.d));
        Self { normal, d: normal.dot(&point) }
    }
}

/// Closest points between segments `p1..q1` and `p2..q2`
pub fn closest_points_between_segments(p1: &Vec3, q1: &Vec3, p2: &Vec3, q2: &Vec3) -> (Vec3, Vec3) {
    let d1 = q1 - p1;
    let d2 = q2 - p2;
    let r = p1 - p2;
    let a = d1.dot(&d1);
    let e = d2.dot(&d2);
    let f = d2.dot(&r);

    let (s, t) = if a <= CMP_EPSILON && e <= CMP_EPSILON {
        (0.0, 0.0)
    } else if a <= CMP_EPSILON {
        (0.0, (f / e).clamp(0.0, 1.0))
    } else {
        let c = d1.dot(&r);
        if e <= CMP_EPSILON {
            ((-c / a).clamp(0.0, 1.0), 0.0)
        } else {
            let b = d1.dot(&d2);
            let denom = a * e - b * b;
            let mut s = if denom > CMP_EPSILON { ((b * f - c * e) / denom).clamp(0.0, 1.0) } else { 0.0 };
            let mut t = (b * s + f) / e;
            if t < 0.0 {
                t = 0.0;
                s = (-c / a).clamp(0.0, 1.0);
            } else if t > 1.0 {
                t = 1.0;
                s = ((b - c) / a).clamp(0.0, 1.0);
            }
            (s, t)
        }
    };
    (p1 + d1 * s, p2 + d2 * t)
}

/// Closest point to `p` on segment `a..b`
pub fn closest_point_on_segment(p: &Vec3, a: &Vec3, b: &Vec3) -> Vec3 {
    let ab = b - a;
    let len2 = ab.norm_squared();
    if len2 <= CMP_EPSILON {
        return *a;
    }
    let t = ((p - a).dot(&ab) / len2).clamp(0.0, 1.0);
    a + ab * t
}

/// Closest point to `p` on triangle `a, b, c`
pub fn closest_point_on_triangle(p: &Vec3, a: &Vec3, b: &Vec3, c: &Vec3) -> Vec3 {
    let ab = b - a;
    let ac = c - a;
    let ap = p - a;
    let d1 = ab.dot(&ap);
    let d2 = ac.dot(&ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return *a;
    }
    let bp = p - b;
    let d3 = ab.dot(&bp);
    let d4 = ac.dot(&bp);
    if d3 >= 0.0 && d4 <= d3 {
        return *b;
    }
    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        return a + ab * (d1 / (d1 - d3));
    }
    let cp = p - c;
    let d5 = ab.dot(&cp);
    let d6 = ac.dot(&cp);
    if d6 >= 0.0 && d5 <= d6 {
        return *c;
    }
    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        return a + ac * (d2 / (d2 - d6));
    }
    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        return b + (c - b) * ((d4 - d3) / ((d4 - d3) + (d5 - d6)));
    }
    let denom = 1.0 / (va + vb + vc);
    a + ab * (vb * denom) + ac * (vc * denom)
}

/// Moller-Trumbore segment/triangle test returning the hit parameter along `from..to`
pub fn segment_intersects_triangle(from: &Vec3, to: &Vec3, a: &Vec3, b: &Vec3, c: &Vec3) -> Option<Real> {
    let dir = to - from;
    let e1 = b - a;
    let e2 = c - a;
    let h = dir.cross(&e2);
    let det = e1.dot(&h);
    if det.abs() < CMP_EPSILON {
        return None;
    }
    let inv = 1.0 / det;
    let s = from - a;
    let u = inv * s.dot(&h);
    if !(0.0..=1.0).contains(&u) {
        return None;
    }
    let q = s.cross(&e1);
    let v = inv * dir.dot(&q);
    if v < 0.0 || u + v > 1.0 {
        return None;
    }
    let t = inv * e2.dot(&q);
    (0.0..=1.0).contains(&t).then_some(t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_aabb_transformed_rotation() {
        let aabb = Aabb::from_center_extents(Vec3::zeros(), Vec3::new(1.0, 2.0, 3.0));
        let rot = Quat::from_axis_angle(&Vec3::z_axis(), std::f32::consts::FRAC_PI_2);
        let t = transform_from(Vec3::new(10.0, 0.0, 0.0), rot);
        let out = aabb.transformed(&t);
        assert_relative_eq!(out.center(), Vec3::new(10.0, 0.0, 0.0), epsilon = 1e-5);
        assert_relative_eq!(out.extents(), Vec3::new(2.0, 1.0, 3.0), epsilon = 1e-5);
    }

    #[test]
    fn test_aabb_segment() {
        let aabb = Aabb::new(Vec3::repeat(-1.0), Vec3::repeat(1.0));
        assert!(aabb.intersects_segment(&Vec3::new(-5.0, 0.0, 0.0), &Vec3::new(5.0, 0.0, 0.0)));
        assert!(!aabb.intersects_segment(&Vec3::new(-5.0, 2.0, 0.0), &Vec3::new(5.0, 2.0, 0.0)));
        assert!(!aabb.intersects_segment(&Vec3::new(-5.0, 0.0, 0.0), &Vec3::new(-3.0, 0.0, 0.0)));
    }

    #[test]
    fn test_touching_boxes() {
        let a = Aabb::new(Vec3::zeros(), Vec3::repeat(1.0));
        let b = Aabb::new(Vec3::new(1.0, 0.0, 0.0), Vec3::new(2.0, 1.0, 1.0));
        assert!(!a.intersects(&b));
        assert!(a.intersects_inclusive(&b));
    }

    #[test]
    fn test_segment_closest_points() {
        let (a, b) = closest_points_between_segments(
            &Vec3::new(-1.0, 0.0, 0.0),
            &Vec3::new(1.0, 0.0, 0.0),
            &Vec3::new(0.0, 1.0, -1.0),
            &Vec3::new(0.0, 1.0, 1.0),
        );
        assert_relative_eq!(a, Vec3::zeros(), epsilon = 1e-6);
        assert_relative_eq!(b, Vec3::new(0.0, 1.0, 0.0), epsilon = 1e-6);
    }

    #[test]
    fn test_plane_transformed() {
        let plane = Plane::new(Vec3::y(), 0.0);
        let moved = plane.transformed(&translation(Vec3::new(0.0, 2.0, 0.0)));
        assert_relative_eq!(moved.d, 2.0, epsilon = 1e-6);
        assert_relative_eq!(moved.distance_to(&Vec3::new(4.0, 5.0, 1.0)), 3.0, epsilon = 1e-6);
    }
}
