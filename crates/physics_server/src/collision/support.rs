//! Support mappings for the GJK/EPA narrow phase
//!
//! A support mapping answers "which point of the shape lies farthest along
//! this direction". Everything here works in world space except
//! [`LocalShapeSupport`], which the shapes use for their own local queries.

use super::shape::{Shape, EDGE_SUPPORT_THRESHOLD, FACE_SUPPORT_THRESHOLD};
use crate::foundation::math::{xform, Aabb, Real, Transform, Vec3, CMP_EPSILON};

/// Convex set described by its support function
pub trait SupportMap {
    /// Farthest point along `dir` (need not be normalized)
    fn support(&self, dir: &Vec3) -> Vec3;
}

/// A single point
#[derive(Debug, Clone, Copy)]
pub struct PointSupport(pub Vec3);

impl SupportMap for PointSupport {
    fn support(&self, _dir: &Vec3) -> Vec3 {
        self.0
    }
}

/// A shape in its own local space
#[derive(Debug, Clone, Copy)]
pub struct LocalShapeSupport<'a>(pub &'a Shape);

impl SupportMap for LocalShapeSupport<'_> {
    fn support(&self, dir: &Vec3) -> Vec3 {
        self.0.support(dir)
    }
}

/// Convex geometry the narrow phase can place in the world
#[derive(Debug, Clone, Copy)]
pub enum ConvexGeometry<'a> {
    /// A convex shape
    Shape(&'a Shape),
    /// One triangle of a concave mesh, in mesh-local coordinates
    Triangle([Vec3; 3]),
    /// A sphere around the local origin (soft body nodes)
    Sphere(Real),
}

impl ConvexGeometry<'_> {
    fn support_local(&self, dir: &Vec3) -> Vec3 {
        match self {
            Self::Shape(shape) => shape.support(dir),
            Self::Triangle(points) => {
                let mut best = points[0];
                let mut best_d = best.dot(dir);
                for p in &points[1..] {
                    let d = p.dot(dir);
                    if d > best_d {
                        best_d = d;
                        best = *p;
                    }
                }
                best
            }
            Self::Sphere(radius) => {
                let len = dir.norm();
                if len > CMP_EPSILON {
                    dir * (*radius / len)
                } else {
                    Vec3::new(0.0, *radius, 0.0)
                }
            }
        }
    }

    fn supports_local(&self, dir: &Vec3, out: &mut Vec<Vec3>) {
        match self {
            Self::Shape(shape) => shape.supports(dir, out),
            Self::Triangle(points) => {
                out.clear();
                let normal = (points[1] - points[0]).cross(&(points[2] - points[0]));
                let n_len = normal.norm();
                let d_len = dir.norm();
                if n_len > CMP_EPSILON && d_len > CMP_EPSILON {
                    let cos = normal.dot(dir) / (n_len * d_len);
                    if cos.abs() > FACE_SUPPORT_THRESHOLD {
                        out.extend_from_slice(points);
                        return;
                    }
                }
                let best = self.support_local(dir).dot(dir);
                for (i, p) in points.iter().enumerate() {
                    let j = (i + 1) % 3;
                    let edge = points[j] - p;
                    let edge_len = edge.norm();
                    if edge_len > CMP_EPSILON
                        && d_len > CMP_EPSILON
                        && (edge.dot(dir) / (edge_len * d_len)).abs() < EDGE_SUPPORT_THRESHOLD
                        && (p.dot(dir) - best).abs() <= CMP_EPSILON * d_len.max(1.0)
                    {
                        out.push(*p);
                        out.push(points[j]);
                        return;
                    }
                }
                out.push(self.support_local(dir));
            }
            Self::Sphere(_) => {
                out.clear();
                out.push(self.support_local(dir));
            }
        }
    }

    fn local_aabb(&self) -> Aabb {
        match self {
            Self::Shape(shape) => shape.aabb(),
            Self::Triangle(points) => Aabb::from_points(points),
            Self::Sphere(radius) => Aabb::from_center_extents(Vec3::zeros(), Vec3::repeat(*radius)),
        }
    }

    /// Whether this is a sphere-like geometry, with its radius
    pub fn sphere_radius(&self) -> Option<Real> {
        match self {
            Self::Shape(shape) => match shape.data() {
                super::shape::ShapeData::Sphere { radius } => Some(*radius),
                _ => None,
            },
            Self::Sphere(radius) => Some(*radius),
            Self::Triangle(_) => None,
        }
    }
}

/// Convex geometry placed in the world and inflated by a margin
#[derive(Debug, Clone, Copy)]
pub struct ConvexSupport<'a> {
    /// Geometry
    pub geometry: ConvexGeometry<'a>,
    /// Placement
    pub transform: Transform,
    /// Inflation applied in every direction
    pub margin: Real,
}

impl<'a> ConvexSupport<'a> {
    /// Place a geometry
    pub const fn new(geometry: ConvexGeometry<'a>, transform: Transform, margin: Real) -> Self {
        Self { geometry, transform, margin }
    }

    /// World position of the geometry's bounds center
    pub fn center(&self) -> Vec3 {
        xform(&self.transform, &self.geometry.local_aabb().center())
    }

    /// World bounds including the margin
    pub fn aabb(&self) -> Aabb {
        self.geometry.local_aabb().transformed(&self.transform).grow(self.margin)
    }

    /// World points of the supporting feature along `dir`
    pub fn supports(&self, dir: &Vec3, out: &mut Vec<Vec3>) {
        let local_dir = self.transform.rotation.inverse_transform_vector(dir);
        self.geometry.supports_local(&local_dir, out);
        let offset = margin_offset(dir, self.margin);
        for p in out.iter_mut() {
            *p = xform(&self.transform, p) + offset;
        }
    }
}

fn margin_offset(dir: &Vec3, margin: Real) -> Vec3 {
    if margin == 0.0 {
        return Vec3::zeros();
    }
    let len = dir.norm();
    if len > CMP_EPSILON {
        dir * (margin / len)
    } else {
        Vec3::zeros()
    }
}

impl SupportMap for ConvexSupport<'_> {
    fn support(&self, dir: &Vec3) -> Vec3 {
        let local_dir = self.transform.rotation.inverse_transform_vector(dir);
        xform(&self.transform, &self.geometry.support_local(&local_dir)) + margin_offset(dir, self.margin)
    }
}

/// A convex set swept along a motion vector
#[derive(Debug, Clone, Copy)]
pub struct Swept<'a, S> {
    /// Swept set
    pub inner: &'a S,
    /// Motion in world space
    pub motion: Vec3,
}

impl<S: SupportMap> SupportMap for Swept<'_, S> {
    fn support(&self, dir: &Vec3) -> Vec3 {
        let p = self.inner.support(dir);
        if self.motion.dot(dir) > 0.0 {
            p + self.motion
        } else {
            p
        }
    }
}
