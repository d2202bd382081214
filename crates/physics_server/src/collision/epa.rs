//! Expanding polytope algorithm
//!
//! Grows the final GJK simplex into a polytope hugging the Minkowski
//! difference until the face closest to the origin stops moving. That face
//! gives the penetration normal and depth.

use super::gjk::{support_point, SupportPoint};
use super::support::SupportMap;
use crate::foundation::math::{Real, Vec3, CMP_EPSILON};

const MAX_ITERATIONS: usize = 64;
const TOLERANCE: Real = 1.0e-4;

/// Penetration between two overlapping convex sets
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Penetration {
    /// Unit direction from A into B; moving A by `-normal * depth` separates them
    pub normal: Vec3,
    /// Penetration depth
    pub depth: Real,
    /// Deepest point of A inside B
    pub point_a: Vec3,
    /// Matching point on the surface of B
    pub point_b: Vec3,
}

#[derive(Debug, Clone, Copy)]
struct Face {
    v: [usize; 3],
    normal: Vec3,
    distance: Real,
}

fn make_face(vertices: &[SupportPoint], v: [usize; 3]) -> Option<Face> {
    let [a, b, c] = v.map(|i| vertices[i].w);
    let n = (b - a).cross(&(c - a));
    let len = n.norm();
    if len <= CMP_EPSILON * CMP_EPSILON {
        return None;
    }
    let normal = n / len;
    Some(Face { v, normal, distance: normal.dot(&a) })
}

/// Measure the penetration of two overlapping sets given GJK's final simplex
pub fn penetration(a: &dyn SupportMap, b: &dyn SupportMap, simplex: &[SupportPoint]) -> Option<Penetration> {
    let mut vertices = complete_tetrahedron(a, b, simplex)?;

    let mut faces = Vec::with_capacity(32);
    for v in [[0, 1, 2], [0, 3, 1], [0, 2, 3], [1, 3, 2]] {
        faces.push(make_face(&vertices, v)?);
    }
    // Orientation check against the centroid, which is robust when the origin
    // sits on a face.
    let centroid = vertices.iter().fold(Vec3::zeros(), |acc, s| acc + s.w) / 4.0;
    for face in &mut faces {
        if face.normal.dot(&(vertices[face.v[0]].w - centroid)) < 0.0 {
            let flipped = make_face(&vertices, [face.v[0], face.v[2], face.v[1]])?;
            *face = flipped;
        }
    }

    let mut closest = faces[0];
    for _ in 0..MAX_ITERATIONS {
        closest = *faces.iter().min_by(|x, y| x.distance.total_cmp(&y.distance))?;
        let w = support_point(a, b, &closest.normal);
        let gain = w.w.dot(&closest.normal) - closest.distance;
        if gain < TOLERANCE {
            break;
        }

        let new_index = vertices.len();
        vertices.push(w);

        let mut horizon: Vec<(usize, usize)> = Vec::new();
        faces.retain(|face| {
            let visible = face.normal.dot(&(w.w - vertices[face.v[0]].w)) > 0.0;
            if visible {
                for (e0, e1) in [(face.v[0], face.v[1]), (face.v[1], face.v[2]), (face.v[2], face.v[0])] {
                    if let Some(pos) = horizon.iter().position(|&(x, y)| x == e1 && y == e0) {
                        horizon.remove(pos);
                    } else {
                        horizon.push((e0, e1));
                    }
                }
            }
            !visible
        });
        for (e0, e1) in horizon {
            if let Some(face) = make_face(&vertices, [e0, e1, new_index]) {
                faces.push(face);
            }
        }
        if faces.is_empty() {
            break;
        }
    }

    let [ia, ib, ic] = closest.v;
    let (l0, l1, l2) = barycentric(
        &(closest.normal * closest.distance),
        &vertices[ia].w,
        &vertices[ib].w,
        &vertices[ic].w,
    );
    let point_a = vertices[ia].a * l0 + vertices[ib].a * l1 + vertices[ic].a * l2;
    let point_b = vertices[ia].b * l0 + vertices[ib].b * l1 + vertices[ic].b * l2;
    Some(Penetration { normal: closest.normal, depth: closest.distance.max(0.0), point_a, point_b })
}

/// Grow a 1-3 point simplex into a non-degenerate tetrahedron
fn complete_tetrahedron(a: &dyn SupportMap, b: &dyn SupportMap, simplex: &[SupportPoint]) -> Option<Vec<SupportPoint>> {
    let mut vertices: Vec<SupportPoint> = simplex.iter().take(4).copied().collect();
    let axes = [Vec3::x(), Vec3::y(), Vec3::z(), -Vec3::x(), -Vec3::y(), -Vec3::z()];

    if vertices.is_empty() {
        vertices.push(support_point(a, b, &Vec3::x()));
    }
    if vertices.len() == 1 {
        for axis in &axes {
            let p = support_point(a, b, axis);
            if (p.w - vertices[0].w).norm_squared() > CMP_EPSILON {
                vertices.push(p);
                break;
            }
        }
    }
    if vertices.len() == 2 {
        let line = vertices[1].w - vertices[0].w;
        for axis in &axes {
            let dir = line.cross(axis);
            if dir.norm_squared() <= CMP_EPSILON {
                continue;
            }
            let p = support_point(a, b, &dir);
            if (p.w - vertices[0].w).cross(&line).norm_squared() > CMP_EPSILON {
                vertices.push(p);
                break;
            }
        }
    }
    if vertices.len() == 3 {
        let n = (vertices[1].w - vertices[0].w).cross(&(vertices[2].w - vertices[0].w));
        if n.norm_squared() <= CMP_EPSILON * CMP_EPSILON {
            return None;
        }
        let up = support_point(a, b, &n);
        let down = support_point(a, b, &-n);
        let up_h = (up.w - vertices[0].w).dot(&n).abs();
        let down_h = (down.w - vertices[0].w).dot(&n).abs();
        let pick = if up_h >= down_h { up } else { down };
        if up_h.max(down_h) <= CMP_EPSILON {
            return None;
        }
        vertices.push(pick);
    }
    if vertices.len() != 4 {
        return None;
    }
    let volume = (vertices[1].w - vertices[0].w)
        .cross(&(vertices[2].w - vertices[0].w))
        .dot(&(vertices[3].w - vertices[0].w));
    (volume.abs() > CMP_EPSILON * CMP_EPSILON).then_some(vertices)
}

fn barycentric(p: &Vec3, a: &Vec3, b: &Vec3, c: &Vec3) -> (Real, Real, Real) {
    let v0 = b - a;
    let v1 = c - a;
    let v2 = p - a;
    let d00 = v0.dot(&v0);
    let d01 = v0.dot(&v1);
    let d11 = v1.dot(&v1);
    let d20 = v2.dot(&v0);
    let d21 = v2.dot(&v1);
    let denom = d00 * d11 - d01 * d01;
    if denom.abs() <= CMP_EPSILON * CMP_EPSILON {
        return (1.0, 0.0, 0.0);
    }
    let v = (d11 * d20 - d01 * d21) / denom;
    let w = (d00 * d21 - d01 * d20) / denom;
    (1.0 - v - w, v, w)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::gjk::{distance, GjkResult};
    use crate::collision::shape::{Shape, ShapeType};
    use crate::collision::support::{ConvexGeometry, ConvexSupport};
    use crate::foundation::math::translation;
    use approx::assert_relative_eq;

    #[test]
    fn test_box_box_penetration() {
        let shape = Shape::new(ShapeType::Box);
        let a = ConvexSupport::new(ConvexGeometry::Shape(&shape), translation(Vec3::new(0.0, 0.8, 0.0)), 0.0);
        let b = ConvexSupport::new(ConvexGeometry::Shape(&shape), translation(Vec3::zeros()), 0.0);
        let GjkResult::Overlapping(simplex) = distance(&a, &b, &Vec3::y()) else {
            panic!("boxes overlap");
        };
        let pen = penetration(&a, &b, &simplex).unwrap();
        assert_relative_eq!(pen.depth, 0.2, epsilon = 1e-3);
        assert_relative_eq!(pen.normal, -Vec3::y(), epsilon = 1e-3);
        assert_relative_eq!((pen.point_a - pen.point_b).dot(&pen.normal), 0.2, epsilon = 1e-3);
    }

    #[test]
    fn test_offset_boxes_pick_shallow_axis() {
        let shape = Shape::new(ShapeType::Box);
        let a = ConvexSupport::new(ConvexGeometry::Shape(&shape), translation(Vec3::new(0.3, 0.9, 0.0)), 0.0);
        let b = ConvexSupport::new(ConvexGeometry::Shape(&shape), translation(Vec3::zeros()), 0.0);
        let GjkResult::Overlapping(simplex) = distance(&a, &b, &Vec3::new(0.3, 0.9, 0.0)) else {
            panic!("boxes overlap");
        };
        let pen = penetration(&a, &b, &simplex).unwrap();
        assert_relative_eq!(pen.depth, 0.1, epsilon = 1e-3);
        assert!(pen.normal.y < -0.999);
    }
}
