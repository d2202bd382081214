//! Collision shapes
//!
//! Shapes are defined in their own local space and never carry a transform;
//! owners attach them with a local transform. Every query here takes and
//! returns local coordinates.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::gjk;
use super::mesh::TriMesh;
use super::support::PointSupport;
use crate::error::{PhysicsError, PhysicsResult};
use crate::foundation::math::{
    closest_point_on_segment, Aabb, Plane, Real, Vec3, CMP_EPSILON,
};
use crate::rid::ObjectRid;

/// Half size of the bounds reported for unbounded shapes
pub const WORLD_BOUNDARY_EXTENT: Real = 1.0e8;

/// Direction cosine above which a support query reports a whole face
pub const FACE_SUPPORT_THRESHOLD: Real = 0.9998;

/// Direction cosine below which a support query reports an edge
pub const EDGE_SUPPORT_THRESHOLD: Real = 0.0002;

/// Upper bound on feature points returned by `supports`
pub const MAX_SUPPORTS: usize = 8;

/// Shape kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShapeType {
    /// Ray that pushes its owner away from whatever it touches
    SeparationRay,
    /// Infinite plane; everything behind it is solid
    WorldBoundary,
    /// Sphere around the origin
    Sphere,
    /// Box centered at the origin
    Box,
    /// Capsule along the Y axis
    Capsule,
    /// Cylinder along the Y axis
    Cylinder,
    /// Convex hull of a point cloud
    ConvexPolygon,
    /// Arbitrary triangle soup
    ConcavePolygon,
}

/// Shape geometry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ShapeData {
    /// Ray along +Z
    SeparationRay {
        /// Ray length
        length: Real,
        /// Push out along the contact normal instead of along the ray
        slide_on_slope: bool,
    },
    /// Plane
    WorldBoundary(Plane),
    /// Sphere
    Sphere {
        /// Radius
        radius: Real,
    },
    /// Box
    Box {
        /// Half size along each axis
        half_extents: Vec3,
    },
    /// Capsule; `height` includes both hemispherical caps
    Capsule {
        /// Cap radius
        radius: Real,
        /// Total height
        height: Real,
    },
    /// Cylinder
    Cylinder {
        /// Radius
        radius: Real,
        /// Total height
        height: Real,
    },
    /// Convex hull
    ConvexPolygon {
        /// Hull points
        points: Vec<Vec3>,
    },
    /// Triangle soup, three vertices per face
    ConcavePolygon {
        /// Flat vertex list
        faces: Vec<Vec3>,
        /// Whether faces collide from behind
        backface_collision: bool,
    },
}

impl ShapeData {
    /// Default geometry for a shape kind
    pub fn default_for(kind: ShapeType) -> Self {
        match kind {
            ShapeType::SeparationRay => Self::SeparationRay { length: 1.0, slide_on_slope: false },
            ShapeType::WorldBoundary => Self::WorldBoundary(Plane::new(Vec3::y(), 0.0)),
            ShapeType::Sphere => Self::Sphere { radius: 0.5 },
            ShapeType::Box => Self::Box { half_extents: Vec3::repeat(0.5) },
            ShapeType::Capsule => Self::Capsule { radius: 0.5, height: 2.0 },
            ShapeType::Cylinder => Self::Cylinder { radius: 0.5, height: 2.0 },
            ShapeType::ConvexPolygon => Self::ConvexPolygon { points: Vec::new() },
            ShapeType::ConcavePolygon => Self::ConcavePolygon { faces: Vec::new(), backface_collision: false },
        }
    }

    /// Kind of this geometry
    pub const fn shape_type(&self) -> ShapeType {
        match self {
            Self::SeparationRay { .. } => ShapeType::SeparationRay,
            Self::WorldBoundary(_) => ShapeType::WorldBoundary,
            Self::Sphere { .. } => ShapeType::Sphere,
            Self::Box { .. } => ShapeType::Box,
            Self::Capsule { .. } => ShapeType::Capsule,
            Self::Cylinder { .. } => ShapeType::Cylinder,
            Self::ConvexPolygon { .. } => ShapeType::ConvexPolygon,
            Self::ConcavePolygon { .. } => ShapeType::ConcavePolygon,
        }
    }

    fn validate(&self) -> PhysicsResult<()> {
        let finite = |v: Real| v.is_finite() && v >= 0.0;
        let ok = match self {
            Self::SeparationRay { length, .. } => finite(*length),
            Self::WorldBoundary(plane) => plane.normal.norm() > CMP_EPSILON && plane.d.is_finite(),
            Self::Sphere { radius } => finite(*radius),
            Self::Box { half_extents } => half_extents.iter().all(|v| finite(*v)),
            Self::Capsule { radius, height } | Self::Cylinder { radius, height } => finite(*radius) && finite(*height),
            Self::ConvexPolygon { points } => points.iter().all(|p| p.iter().all(|v| v.is_finite())),
            Self::ConcavePolygon { faces, .. } => faces.len() % 3 == 0 && faces.iter().all(|p| p.iter().all(|v| v.is_finite())),
        };
        if ok {
            Ok(())
        } else {
            Err(PhysicsError::precondition(format!("invalid {:?} shape data", self.shape_type())))
        }
    }
}

/// A configured shape plus its owner bookkeeping
#[derive(Debug, Clone)]
pub struct Shape {
    data: ShapeData,
    custom_bias: Real,
    margin: Real,
    aabb: Aabb,
    hull: Vec<Plane>,
    mesh: Option<TriMesh>,
    owners: BTreeMap<ObjectRid, usize>,
}

impl Shape {
    /// Create a shape with the default geometry of its kind
    pub fn new(kind: ShapeType) -> Self {
        let mut shape = Self {
            data: ShapeData::default_for(kind),
            custom_bias: 0.0,
            margin: 0.04,
            aabb: Aabb::default(),
            hull: Vec::new(),
            mesh: None,
            owners: BTreeMap::new(),
        };
        shape.configure();
        shape
    }

    /// Replace the geometry. The kind cannot change.
    pub fn set_data(&mut self, data: ShapeData) -> PhysicsResult<()> {
        if data.shape_type() != self.shape_type() {
            return Err(PhysicsError::precondition(format!(
                "shape is {:?}, got {:?} data",
                self.shape_type(),
                data.shape_type()
            )));
        }
        data.validate()?;
        self.data = data;
        self.configure();
        Ok(())
    }

    fn configure(&mut self) {
        self.hull.clear();
        self.mesh = None;
        self.aabb = match &self.data {
            ShapeData::SeparationRay { length, .. } => Aabb::new(Vec3::zeros(), Vec3::new(0.0, 0.0, *length)),
            ShapeData::WorldBoundary(_) => Aabb::from_center_extents(Vec3::zeros(), Vec3::repeat(WORLD_BOUNDARY_EXTENT)),
            ShapeData::Sphere { radius } => Aabb::from_center_extents(Vec3::zeros(), Vec3::repeat(*radius)),
            ShapeData::Box { half_extents } => Aabb::from_center_extents(Vec3::zeros(), *half_extents),
            ShapeData::Capsule { radius, height } => {
                Aabb::from_center_extents(Vec3::zeros(), Vec3::new(*radius, (height * 0.5).max(*radius), *radius))
            }
            ShapeData::Cylinder { radius, height } => {
                Aabb::from_center_extents(Vec3::zeros(), Vec3::new(*radius, height * 0.5, *radius))
            }
            ShapeData::ConvexPolygon { points } => {
                self.hull = hull_planes(points);
                Aabb::from_points(points)
            }
            ShapeData::ConcavePolygon { faces, backface_collision } => {
                let mesh = TriMesh::new(faces, *backface_collision);
                let aabb = mesh.aabb();
                self.mesh = Some(mesh);
                aabb
            }
        };
    }

    /// Shape kind
    pub const fn shape_type(&self) -> ShapeType {
        self.data.shape_type()
    }

    /// Current geometry
    pub const fn data(&self) -> &ShapeData {
        &self.data
    }

    /// Extra solver bias for contacts against this shape
    pub const fn custom_bias(&self) -> Real {
        self.custom_bias
    }

    /// Set the extra solver bias
    pub fn set_custom_bias(&mut self, bias: Real) {
        self.custom_bias = bias;
    }

    /// Collision margin
    pub const fn margin(&self) -> Real {
        self.margin
    }

    /// Set the collision margin
    pub fn set_margin(&mut self, margin: Real) {
        self.margin = margin;
    }

    /// Local bounds
    pub const fn aabb(&self) -> Aabb {
        self.aabb
    }

    /// Triangle mesh of a concave shape
    pub const fn mesh(&self) -> Option<&TriMesh> {
        self.mesh.as_ref()
    }

    /// Whether the shape is a convex volume usable by GJK/EPA
    pub const fn is_convex(&self) -> bool {
        matches!(
            self.data,
            ShapeData::Sphere { .. }
                | ShapeData::Box { .. }
                | ShapeData::Capsule { .. }
                | ShapeData::Cylinder { .. }
                | ShapeData::ConvexPolygon { .. }
                | ShapeData::SeparationRay { .. }
        )
    }

    /// Measure used to distribute a body's mass among its shapes: the volume
    /// of the local bounds. Unbounded and flat shapes weigh nothing.
    pub fn area(&self) -> Real {
        match self.data {
            ShapeData::WorldBoundary(_) | ShapeData::SeparationRay { .. } => 0.0,
            _ => {
                let v = self.aabb.volume();
                if v.is_finite() {
                    v
                } else {
                    0.0
                }
            }
        }
    }

    /// Principal moments of inertia about the shape origin
    pub fn moment_of_inertia(&self, mass: Real) -> Vec3 {
        match &self.data {
            ShapeData::SeparationRay { .. } | ShapeData::WorldBoundary(_) => Vec3::zeros(),
            ShapeData::Sphere { radius } => Vec3::repeat(0.4 * mass * radius * radius),
            ShapeData::Cylinder { radius, height } => {
                let side = mass * (3.0 * radius * radius + height * height) / 12.0;
                Vec3::new(side, 0.5 * mass * radius * radius, side)
            }
            _ => {
                let e = self.aabb.extents();
                Vec3::new(
                    (mass / 3.0) * (e.y * e.y + e.z * e.z),
                    (mass / 3.0) * (e.x * e.x + e.z * e.z),
                    (mass / 3.0) * (e.x * e.x + e.y * e.y),
                )
            }
        }
    }

    /// Farthest point along `dir`. Only meaningful for convex shapes.
    pub fn support(&self, dir: &Vec3) -> Vec3 {
        match &self.data {
            ShapeData::SeparationRay { length, .. } => {
                if dir.z > 0.0 {
                    Vec3::new(0.0, 0.0, *length)
                } else {
                    Vec3::zeros()
                }
            }
            ShapeData::WorldBoundary(plane) => plane.normal * plane.d,
            ShapeData::Sphere { radius } => unit_or_up(dir) * *radius,
            ShapeData::Box { half_extents } => Vec3::new(
                half_extents.x.copysign(dir.x),
                half_extents.y.copysign(dir.y),
                half_extents.z.copysign(dir.z),
            ),
            ShapeData::Capsule { radius, height } => {
                let half = capsule_half_segment(*radius, *height);
                Vec3::new(0.0, half.copysign(dir.y), 0.0) + unit_or_up(dir) * *radius
            }
            ShapeData::Cylinder { radius, height } => {
                let radial = Vec3::new(dir.x, 0.0, dir.z);
                let len = radial.norm();
                let rim = if len > CMP_EPSILON { radial * (*radius / len) } else { Vec3::zeros() };
                rim + Vec3::new(0.0, (height * 0.5).copysign(dir.y), 0.0)
            }
            ShapeData::ConvexPolygon { points } => {
                let mut best = Vec3::zeros();
                let mut best_d = Real::MIN;
                for p in points {
                    let d = p.dot(dir);
                    if d > best_d {
                        best_d = d;
                        best = *p;
                    }
                }
                best
            }
            ShapeData::ConcavePolygon { .. } => self.aabb.center(),
        }
    }

    /// Points of the supporting feature (vertex, edge or face) along `dir`
    pub fn supports(&self, dir: &Vec3, out: &mut Vec<Vec3>) {
        out.clear();
        let n = unit_or_up(dir);
        match &self.data {
            ShapeData::Box { half_extents } => box_supports(half_extents, &n, out),
            ShapeData::Capsule { radius, height } => {
                let half = capsule_half_segment(*radius, *height);
                if n.y.abs() < EDGE_SUPPORT_THRESHOLD && half > 0.0 {
                    out.push(Vec3::new(0.0, half, 0.0) + n * *radius);
                    out.push(Vec3::new(0.0, -half, 0.0) + n * *radius);
                } else {
                    out.push(self.support(&n));
                }
            }
            ShapeData::Cylinder { radius, height } => {
                let h = height * 0.5;
                if n.y.abs() > FACE_SUPPORT_THRESHOLD {
                    let y = h.copysign(n.y);
                    for i in 0..MAX_SUPPORTS {
                        let angle = i as Real * std::f32::consts::TAU / MAX_SUPPORTS as Real;
                        out.push(Vec3::new(angle.cos() * radius, y, angle.sin() * radius));
                    }
                } else if n.y.abs() < EDGE_SUPPORT_THRESHOLD {
                    let rim = self.support(&n);
                    out.push(Vec3::new(rim.x, h, rim.z));
                    out.push(Vec3::new(rim.x, -h, rim.z));
                } else {
                    out.push(self.support(&n));
                }
            }
            ShapeData::ConvexPolygon { points } => {
                let scale = self.aabb.size().max().max(1.0);
                let max_d = self.support(&n).dot(&n);
                let tolerance = scale * 1.0e-3;
                for p in points {
                    if max_d - p.dot(&n) <= tolerance && out.len() < MAX_SUPPORTS {
                        out.push(*p);
                    }
                }
            }
            _ => out.push(self.support(&n)),
        }
    }

    /// Whether a point lies inside the shape
    pub fn intersect_point(&self, p: &Vec3) -> bool {
        match &self.data {
            ShapeData::SeparationRay { .. } | ShapeData::ConcavePolygon { .. } => false,
            ShapeData::WorldBoundary(plane) => plane.distance_to(p) < 0.0,
            ShapeData::Sphere { radius } => p.norm_squared() < radius * radius,
            ShapeData::Box { half_extents } => (0..3).all(|i| p[i].abs() <= half_extents[i]),
            ShapeData::Capsule { radius, height } => {
                let half = capsule_half_segment(*radius, *height);
                let axis = Vec3::new(0.0, p.y.clamp(-half, half), 0.0);
                (p - axis).norm_squared() < radius * radius
            }
            ShapeData::Cylinder { radius, height } => {
                p.y.abs() <= height * 0.5 && p.x * p.x + p.z * p.z < radius * radius
            }
            ShapeData::ConvexPolygon { .. } => {
                !self.hull.is_empty() && self.hull.iter().all(|plane| plane.distance_to(p) <= 0.0)
            }
        }
    }

    /// Closest point of the shape volume to `p` (returns `p` when inside)
    pub fn closest_point_to(&self, p: &Vec3) -> Vec3 {
        match &self.data {
            ShapeData::SeparationRay { length, .. } => {
                closest_point_on_segment(p, &Vec3::zeros(), &Vec3::new(0.0, 0.0, *length))
            }
            ShapeData::WorldBoundary(plane) => {
                if plane.distance_to(p) <= 0.0 {
                    *p
                } else {
                    plane.project(p)
                }
            }
            ShapeData::Sphere { radius } => {
                if p.norm() <= *radius {
                    *p
                } else {
                    p.normalize() * *radius
                }
            }
            ShapeData::Box { half_extents } => p.sup(&-half_extents).inf(half_extents),
            ShapeData::Capsule { radius, height } => {
                let half = capsule_half_segment(*radius, *height);
                let axis = Vec3::new(0.0, p.y.clamp(-half, half), 0.0);
                let offset = p - axis;
                if offset.norm() <= *radius {
                    *p
                } else {
                    axis + offset.normalize() * *radius
                }
            }
            ShapeData::Cylinder { radius, height } => {
                let h = height * 0.5;
                let mut radial = Vec3::new(p.x, 0.0, p.z);
                let len = radial.norm();
                if len > *radius {
                    radial *= *radius / len;
                }
                Vec3::new(radial.x, p.y.clamp(-h, h), radial.z)
            }
            ShapeData::ConvexPolygon { points } => {
                if points.is_empty() || self.intersect_point(p) {
                    return *p;
                }
                let hull = super::support::LocalShapeSupport(self);
                match gjk::distance(&hull, &PointSupport(*p), &(p - self.aabb.center())) {
                    gjk::GjkResult::Separated { point_a, .. } => point_a,
                    gjk::GjkResult::Overlapping(_) => *p,
                }
            }
            ShapeData::ConcavePolygon { .. } => self.mesh.as_ref().map_or(*p, |m| m.closest_point(p)),
        }
    }

    /// First entry point and normal of the segment `from..to` into the shape
    pub fn intersect_segment(&self, from: &Vec3, to: &Vec3) -> Option<(Vec3, Vec3)> {
        match &self.data {
            ShapeData::SeparationRay { .. } => None,
            ShapeData::WorldBoundary(plane) => {
                let da = plane.distance_to(from);
                let db = plane.distance_to(to);
                if da > 0.0 && db <= 0.0 {
                    let t = da / (da - db);
                    Some((from + (to - from) * t, plane.normal))
                } else {
                    None
                }
            }
            ShapeData::Sphere { radius } => segment_sphere(from, to, &Vec3::zeros(), *radius),
            ShapeData::Box { half_extents } => segment_box(from, to, half_extents),
            ShapeData::Capsule { radius, height } => {
                let half = capsule_half_segment(*radius, *height);
                let candidates = [
                    segment_cylinder_side(from, to, *radius, half),
                    segment_sphere(from, to, &Vec3::new(0.0, half, 0.0), *radius),
                    segment_sphere(from, to, &Vec3::new(0.0, -half, 0.0), *radius),
                ];
                nearest_hit(from, candidates)
            }
            ShapeData::Cylinder { radius, height } => {
                let h = height * 0.5;
                let candidates = [
                    segment_cylinder_side(from, to, *radius, h),
                    segment_disc(from, to, h, *radius, 1.0),
                    segment_disc(from, to, -h, *radius, -1.0),
                ];
                nearest_hit(from, candidates)
            }
            ShapeData::ConvexPolygon { .. } => segment_hull(from, to, &self.hull),
            ShapeData::ConcavePolygon { .. } => self.mesh.as_ref().and_then(|m| m.intersect_segment(from, to)),
        }
    }

    /// Owners currently referencing this shape, with reference counts
    pub const fn owners(&self) -> &BTreeMap<ObjectRid, usize> {
        &self.owners
    }

    /// Record one more reference from `owner`
    pub fn add_owner(&mut self, owner: ObjectRid) {
        *self.owners.entry(owner).or_insert(0) += 1;
    }

    /// Drop one reference from `owner`
    pub fn remove_owner(&mut self, owner: ObjectRid) {
        if let Some(count) = self.owners.get_mut(&owner) {
            *count -= 1;
            if *count == 0 {
                self.owners.remove(&owner);
            }
        }
    }
}

fn unit_or_up(dir: &Vec3) -> Vec3 {
    let len = dir.norm();
    if len > CMP_EPSILON {
        dir / len
    } else {
        Vec3::y()
    }
}

fn capsule_half_segment(radius: Real, height: Real) -> Real {
    (height * 0.5 - radius).max(0.0)
}

fn box_supports(he: &Vec3, n: &Vec3, out: &mut Vec<Vec3>) {
    for axis in 0..3 {
        if n[axis].abs() > FACE_SUPPORT_THRESHOLD {
            let (u, v) = ((axis + 1) % 3, (axis + 2) % 3);
            for (su, sv) in [(1.0, 1.0), (-1.0, 1.0), (-1.0, -1.0), (1.0, -1.0)] {
                let mut p = Vec3::zeros();
                p[axis] = he[axis].copysign(n[axis]);
                p[u] = he[u] * su;
                p[v] = he[v] * sv;
                out.push(p);
            }
            return;
        }
    }
    for axis in 0..3 {
        if n[axis].abs() < EDGE_SUPPORT_THRESHOLD {
            let mut a = Vec3::new(he.x.copysign(n.x), he.y.copysign(n.y), he.z.copysign(n.z));
            let mut b = a;
            a[axis] = he[axis];
            b[axis] = -he[axis];
            out.push(a);
            out.push(b);
            return;
        }
    }
    out.push(Vec3::new(he.x.copysign(n.x), he.y.copysign(n.y), he.z.copysign(n.z)));
}

fn hull_planes(points: &[Vec3]) -> Vec<Plane> {
    let mut planes: Vec<Plane> = Vec::new();
    if points.len() < 4 {
        return planes;
    }
    let scale = Aabb::from_points(points).size().max().max(CMP_EPSILON);
    let eps = scale * 1.0e-4;
    for i in 0..points.len() {
        for j in (i + 1)..points.len() {
            for k in (j + 1)..points.len() {
                let n = (points[j] - points[i]).cross(&(points[k] - points[i]));
                let len = n.norm();
                if len <= eps * eps {
                    continue;
                }
                let n = n / len;
                let d = n.dot(&points[i]);
                let (mut above, mut below) = (false, false);
                for p in points {
                    let dist = n.dot(p) - d;
                    above |= dist > eps;
                    below |= dist < -eps;
                }
                let plane = match (above, below) {
                    (false, _) => Plane { normal: n, d },
                    (true, false) => Plane { normal: -n, d: -d },
                    (true, true) => continue,
                };
                let duplicate = planes
                    .iter()
                    .any(|q| q.normal.dot(&plane.normal) > 1.0 - 1.0e-4 && (q.d - plane.d).abs() <= eps);
                if !duplicate {
                    planes.push(plane);
                }
            }
        }
    }
    planes
}

fn nearest_hit(from: &Vec3, candidates: [Option<(Vec3, Vec3)>; 3]) -> Option<(Vec3, Vec3)> {
    candidates
        .into_iter()
        .flatten()
        .min_by(|a, b| (a.0 - from).norm_squared().total_cmp(&(b.0 - from).norm_squared()))
}

fn segment_sphere(from: &Vec3, to: &Vec3, center: &Vec3, radius: Real) -> Option<(Vec3, Vec3)> {
    let d = to - from;
    let m = from - center;
    let a = d.dot(&d);
    if a <= CMP_EPSILON {
        return None;
    }
    let b = m.dot(&d);
    let c = m.dot(&m) - radius * radius;
    if c <= 0.0 {
        return None;
    }
    let disc = b * b - a * c;
    if disc < 0.0 {
        return None;
    }
    let t = (-b - disc.sqrt()) / a;
    if !(0.0..=1.0).contains(&t) {
        return None;
    }
    let point = from + d * t;
    Some((point, (point - center) / radius.max(CMP_EPSILON)))
}

fn segment_box(from: &Vec3, to: &Vec3, he: &Vec3) -> Option<(Vec3, Vec3)> {
    if (0..3).all(|i| from[i].abs() <= he[i]) {
        return None;
    }
    let d = to - from;
    let mut t_enter: Real = 0.0;
    let mut t_exit: Real = 1.0;
    let mut normal = Vec3::zeros();
    for i in 0..3 {
        if d[i].abs() < CMP_EPSILON {
            if from[i].abs() > he[i] {
                return None;
            }
            continue;
        }
        let inv = 1.0 / d[i];
        let mut t1 = (-he[i] - from[i]) * inv;
        let mut t2 = (he[i] - from[i]) * inv;
        let mut sign = -1.0;
        if t1 > t2 {
            std::mem::swap(&mut t1, &mut t2);
            sign = 1.0;
        }
        if t1 > t_enter {
            t_enter = t1;
            normal = Vec3::zeros();
            normal[i] = sign;
        }
        t_exit = t_exit.min(t2);
        if t_enter > t_exit {
            return None;
        }
    }
    Some((from + d * t_enter, normal))
}

fn segment_cylinder_side(from: &Vec3, to: &Vec3, radius: Real, half_height: Real) -> Option<(Vec3, Vec3)> {
    let d = to - from;
    let a = d.x * d.x + d.z * d.z;
    if a <= CMP_EPSILON {
        return None;
    }
    let b = from.x * d.x + from.z * d.z;
    let c = from.x * from.x + from.z * from.z - radius * radius;
    if c <= 0.0 {
        return None;
    }
    let disc = b * b - a * c;
    if disc < 0.0 {
        return None;
    }
    let t = (-b - disc.sqrt()) / a;
    if !(0.0..=1.0).contains(&t) {
        return None;
    }
    let point = from + d * t;
    if point.y.abs() > half_height {
        return None;
    }
    Some((point, Vec3::new(point.x, 0.0, point.z) / radius.max(CMP_EPSILON)))
}

fn segment_disc(from: &Vec3, to: &Vec3, y: Real, radius: Real, facing: Real) -> Option<(Vec3, Vec3)> {
    let d = to - from;
    if d.y * facing >= 0.0 || (from.y - y) * facing <= 0.0 {
        return None;
    }
    let t = (y - from.y) / d.y;
    if !(0.0..=1.0).contains(&t) {
        return None;
    }
    let point = from + d * t;
    (point.x * point.x + point.z * point.z <= radius * radius).then(|| (point, Vec3::new(0.0, facing, 0.0)))
}

fn segment_hull(from: &Vec3, to: &Vec3, planes: &[Plane]) -> Option<(Vec3, Vec3)> {
    if planes.is_empty() || planes.iter().all(|p| p.distance_to(from) <= 0.0) {
        return None;
    }
    let d = to - from;
    let mut t_enter: Real = 0.0;
    let mut t_exit: Real = 1.0;
    let mut normal = Vec3::zeros();
    for plane in planes {
        let dist = plane.distance_to(from);
        let denom = plane.normal.dot(&d);
        if denom.abs() < CMP_EPSILON {
            if dist > 0.0 {
                return None;
            }
            continue;
        }
        let t = -dist / denom;
        if denom < 0.0 {
            if t > t_enter {
                t_enter = t;
                normal = plane.normal;
            }
        } else {
            t_exit = t_exit.min(t);
        }
        if t_enter > t_exit {
            return None;
        }
    }
    Some((from + d * t_enter, normal))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn cube_points() -> Vec<Vec3> {
        let mut pts = Vec::new();
        for x in [-1.0, 1.0] {
            for y in [-1.0, 1.0] {
                for z in [-1.0, 1.0] {
                    pts.push(Vec3::new(x, y, z));
                }
            }
        }
        pts
    }

    #[test]
    fn test_set_data_rejects_kind_change() {
        let mut shape = Shape::new(ShapeType::Sphere);
        assert!(shape.set_data(ShapeData::Box { half_extents: Vec3::repeat(1.0) }).is_err());
        assert!(shape.set_data(ShapeData::Sphere { radius: -1.0 }).is_err());
        assert!(shape.set_data(ShapeData::Sphere { radius: 2.0 }).is_ok());
        assert_relative_eq!(shape.aabb().extents(), Vec3::repeat(2.0));
    }

    #[test]
    fn test_convex_hull_planes_of_cube() {
        let mut shape = Shape::new(ShapeType::ConvexPolygon);
        shape.set_data(ShapeData::ConvexPolygon { points: cube_points() }).unwrap();
        assert_eq!(shape.hull.len(), 6);
        assert!(shape.intersect_point(&Vec3::new(0.5, 0.5, 0.5)));
        assert!(!shape.intersect_point(&Vec3::new(1.5, 0.0, 0.0)));
        let (p, n) = shape.intersect_segment(&Vec3::new(5.0, 0.2, 0.0), &Vec3::new(-5.0, 0.2, 0.0)).unwrap();
        assert_relative_eq!(p, Vec3::new(1.0, 0.2, 0.0), epsilon = 1e-5);
        assert_relative_eq!(n, Vec3::x(), epsilon = 1e-5);
    }

    #[test]
    fn test_box_face_supports() {
        let shape = Shape::new(ShapeType::Box);
        let mut out = Vec::new();
        shape.supports(&Vec3::new(0.0, -1.0, 0.0), &mut out);
        assert_eq!(out.len(), 4);
        assert!(out.iter().all(|p| (p.y + 0.5).abs() < 1e-6));
        shape.supports(&Vec3::new(1.0, -1.0, 0.0), &mut out);
        assert_eq!(out.len(), 2);
        shape.supports(&Vec3::new(1.0, -1.0, 0.3), &mut out);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_segment_queries() {
        let sphere = Shape::new(ShapeType::Sphere);
        let (p, n) = sphere.intersect_segment(&Vec3::new(0.0, 2.0, 0.0), &Vec3::new(0.0, -2.0, 0.0)).unwrap();
        assert_relative_eq!(p, Vec3::new(0.0, 0.5, 0.0), epsilon = 1e-5);
        assert_relative_eq!(n, Vec3::y(), epsilon = 1e-5);

        let boxed = Shape::new(ShapeType::Box);
        let (p, n) = boxed.intersect_segment(&Vec3::new(0.1, 0.0, -3.0), &Vec3::new(0.1, 0.0, 3.0)).unwrap();
        assert_relative_eq!(p, Vec3::new(0.1, 0.0, -0.5), epsilon = 1e-5);
        assert_relative_eq!(n, -Vec3::z(), epsilon = 1e-5);

        let capsule = Shape::new(ShapeType::Capsule);
        let (p, _) = capsule.intersect_segment(&Vec3::new(0.0, 3.0, 0.0), &Vec3::new(0.0, -3.0, 0.0)).unwrap();
        assert_relative_eq!(p.y, 1.0, epsilon = 1e-5);

        let cylinder = Shape::new(ShapeType::Cylinder);
        let (p, n) = cylinder.intersect_segment(&Vec3::new(0.1, 3.0, 0.0), &Vec3::new(0.1, -3.0, 0.0)).unwrap();
        assert_relative_eq!(p.y, 1.0, epsilon = 1e-5);
        assert_relative_eq!(n, Vec3::y(), epsilon = 1e-5);
    }

    #[test]
    fn test_inertia_and_area() {
        let sphere = Shape::new(ShapeType::Sphere);
        assert_relative_eq!(sphere.moment_of_inertia(2.0), Vec3::repeat(0.2), epsilon = 1e-6);
        let boxed = Shape::new(ShapeType::Box);
        assert_relative_eq!(boxed.area(), 1.0, epsilon = 1e-6);
        assert_relative_eq!(boxed.moment_of_inertia(3.0), Vec3::repeat(0.5), epsilon = 1e-6);
        let plane = Shape::new(ShapeType::WorldBoundary);
        assert_relative_eq!(plane.area(), 0.0);
    }

    #[test]
    fn test_closest_points() {
        let boxed = Shape::new(ShapeType::Box);
        assert_relative_eq!(boxed.closest_point_to(&Vec3::new(2.0, 0.1, -3.0)), Vec3::new(0.5, 0.1, -0.5));
        let mut hull = Shape::new(ShapeType::ConvexPolygon);
        hull.set_data(ShapeData::ConvexPolygon { points: cube_points() }).unwrap();
        assert_relative_eq!(hull.closest_point_to(&Vec3::new(3.0, 0.0, 0.0)), Vec3::new(1.0, 0.0, 0.0), epsilon = 1e-3);
    }

    #[test]
    fn test_owner_refcount() {
        let mut shape = Shape::new(ShapeType::Sphere);
        let mut bodies: slotmap::SlotMap<crate::rid::BodyRid, ()> = slotmap::SlotMap::with_key();
        let owner = ObjectRid::Body(bodies.insert(()));
        shape.add_owner(owner);
        shape.add_owner(owner);
        shape.remove_owner(owner);
        assert_eq!(shape.owners().get(&owner), Some(&1));
        shape.remove_owner(owner);
        assert!(shape.owners().is_empty());
    }
}
