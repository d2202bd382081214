//! Triangle mesh used by concave polygon shapes
//!
//! Triangles are indexed by a [`DynamicBvh`] so the narrow phase only visits
//! the ones near the convex shape it is testing against.

use crate::broadphase::DynamicBvh;
use crate::foundation::math::{
    closest_point_on_triangle, segment_intersects_triangle, Aabb, Real, Vec3, CMP_EPSILON,
};

/// Indexed triangle soup
#[derive(Debug, Clone)]
pub struct TriMesh {
    triangles: Vec<[Vec3; 3]>,
    normals: Vec<Vec3>,
    tree: DynamicBvh<usize>,
    aabb: Aabb,
    backface_collision: bool,
}

impl TriMesh {
    /// Build from a flat list of vertices, three per triangle
    pub fn new(faces: &[Vec3], backface_collision: bool) -> Self {
        let mut tree = DynamicBvh::new();
        let mut triangles = Vec::with_capacity(faces.len() / 3);
        let mut normals = Vec::with_capacity(faces.len() / 3);
        for (index, tri) in faces.chunks_exact(3).enumerate() {
            let t = [tri[0], tri[1], tri[2]];
            let n = (t[1] - t[0]).cross(&(t[2] - t[0]));
            let len = n.norm();
            normals.push(if len > CMP_EPSILON { n / len } else { Vec3::zeros() });
            tree.insert(Aabb::from_points(&t), index);
            triangles.push(t);
        }
        let aabb = tree.root_aabb().unwrap_or_default();
        Self { triangles, normals, tree, aabb, backface_collision }
    }

    /// Bounds of the whole mesh
    pub const fn aabb(&self) -> Aabb {
        self.aabb
    }

    /// Number of triangles
    pub fn len(&self) -> usize {
        self.triangles.len()
    }

    /// Whether the mesh has no triangles
    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    /// Triangle vertices
    pub fn triangle(&self, index: usize) -> &[Vec3; 3] {
        &self.triangles[index]
    }

    /// Front face normal of a triangle (zero for degenerate triangles)
    pub fn normal(&self, index: usize) -> Vec3 {
        self.normals[index]
    }

    /// Whether triangles collide from both sides
    pub const fn backface_collision(&self) -> bool {
        self.backface_collision
    }

    /// Indices of triangles whose bounds overlap `aabb`, in a stable order
    pub fn triangles_in(&self, aabb: &Aabb) -> Vec<usize> {
        let mut out = Vec::new();
        self.tree.query_aabb(aabb, |_, index| {
            out.push(index);
            true
        });
        out.sort_unstable();
        out
    }

    /// First hit of the segment against the mesh
    pub fn intersect_segment(&self, from: &Vec3, to: &Vec3) -> Option<(Vec3, Vec3)> {
        let dir = to - from;
        let mut best: Option<(Real, usize)> = None;
        self.tree.query_segment(from, to, |_, index| {
            let [a, b, c] = &self.triangles[index];
            let facing = self.normals[index].dot(&dir);
            if !self.backface_collision && facing > 0.0 {
                return true;
            }
            if let Some(t) = segment_intersects_triangle(from, to, a, b, c) {
                if best.map_or(true, |(bt, _)| t < bt) {
                    best = Some((t, index));
                }
            }
            true
        });
        best.map(|(t, index)| {
            let mut n = self.normals[index];
            if n.dot(&dir) > 0.0 {
                n = -n;
            }
            (from + dir * t, n)
        })
    }

    /// Closest point on the mesh surface
    pub fn closest_point(&self, p: &Vec3) -> Vec3 {
        let mut best = *p;
        let mut best_d2 = Real::MAX;
        for [a, b, c] in &self.triangles {
            let q = closest_point_on_triangle(p, a, b, c);
            let d2 = (q - p).norm_squared();
            if d2 < best_d2 {
                best_d2 = d2;
                best = q;
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn quad() -> TriMesh {
        let faces = [
            Vec3::new(-1.0, 0.0, -1.0),
            Vec3::new(-1.0, 0.0, 1.0),
            Vec3::new(1.0, 0.0, 1.0),
            Vec3::new(-1.0, 0.0, -1.0),
            Vec3::new(1.0, 0.0, 1.0),
            Vec3::new(1.0, 0.0, -1.0),
        ];
        TriMesh::new(&faces, false)
    }

    #[test]
    fn test_segment_hits_front_face() {
        let mesh = quad();
        assert_eq!(mesh.len(), 2);
        let (point, normal) = mesh.intersect_segment(&Vec3::new(0.2, 1.0, 0.1), &Vec3::new(0.2, -1.0, 0.1)).unwrap();
        assert_relative_eq!(point, Vec3::new(0.2, 0.0, 0.1), epsilon = 1e-5);
        assert_relative_eq!(normal, Vec3::y(), epsilon = 1e-5);
    }

    #[test]
    fn test_backface_ignored() {
        let mesh = quad();
        assert!(mesh.intersect_segment(&Vec3::new(0.2, -1.0, 0.1), &Vec3::new(0.2, 1.0, 0.1)).is_none());
    }

    #[test]
    fn test_closest_point() {
        let mesh = quad();
        assert_relative_eq!(mesh.closest_point(&Vec3::new(3.0, 2.0, 0.0)), Vec3::new(1.0, 0.0, 0.0), epsilon = 1e-5);
    }
}
