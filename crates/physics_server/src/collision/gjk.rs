//! Gilbert-Johnson-Keerthi distance query
//!
//! Works on the Minkowski difference `A - B` of two support mappings. When the
//! sets are disjoint it returns the closest points; when they overlap it hands
//! back the final simplex so EPA can measure the penetration.

use super::support::SupportMap;
use crate::foundation::math::{Real, Vec3, CMP_EPSILON};

const MAX_ITERATIONS: usize = 64;
const REL_TOLERANCE: Real = 1.0e-6;
const ABS_TOLERANCE: Real = 1.0e-10;

/// Vertex of the Minkowski difference with the points that produced it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SupportPoint {
    /// `a - b`
    pub w: Vec3,
    /// Point on A
    pub a: Vec3,
    /// Point on B
    pub b: Vec3,
}

/// Support point of `A - B` along `dir`
pub fn support_point(a: &dyn SupportMap, b: &dyn SupportMap, dir: &Vec3) -> SupportPoint {
    let pa = a.support(dir);
    let pb = b.support(&-dir);
    SupportPoint { w: pa - pb, a: pa, b: pb }
}

/// GJK outcome
#[derive(Debug, Clone)]
pub enum GjkResult {
    /// The sets are disjoint
    Separated {
        /// Closest point on A
        point_a: Vec3,
        /// Closest point on B
        point_b: Vec3,
        /// Distance between them
        distance: Real,
    },
    /// The sets overlap; the simplex encloses (or touches) the origin
    Overlapping(Vec<SupportPoint>),
}

/// Run GJK between two convex sets. `guess` seeds the first search direction
/// (usually the offset between the two centers).
pub fn distance(a: &dyn SupportMap, b: &dyn SupportMap, guess: &Vec3) -> GjkResult {
    let seed = if guess.norm_squared() > CMP_EPSILON { *guess } else { Vec3::x() };
    let first = support_point(a, b, &seed);
    let mut simplex = vec![first];
    let mut weights = vec![1.0];
    let mut v = first.w;

    for _ in 0..MAX_ITERATIONS {
        let v2 = v.norm_squared();
        if v2 <= ABS_TOLERANCE {
            return GjkResult::Overlapping(simplex);
        }
        let w = support_point(a, b, &-v);

        // No progress along -v: v is the closest point.
        if v2 - v.dot(&w.w) <= REL_TOLERANCE * v2 || simplex.iter().any(|s| (s.w - w.w).norm_squared() <= ABS_TOLERANCE) {
            return separated(&simplex, &weights);
        }

        simplex.push(w);
        match closest_on_simplex(&simplex) {
            Some((reduced, new_weights)) => {
                simplex = reduced;
                weights = new_weights;
            }
            None => return GjkResult::Overlapping(simplex),
        }

        let new_v = combine(&simplex, &weights, |s| s.w);
        if new_v.norm_squared() >= v2 {
            // Numerical stall; the previous estimate is as good as it gets.
            return separated(&simplex, &weights);
        }
        v = new_v;
    }
    separated(&simplex, &weights)
}

fn separated(simplex: &[SupportPoint], weights: &[Real]) -> GjkResult {
    let point_a = combine(simplex, weights, |s| s.a);
    let point_b = combine(simplex, weights, |s| s.b);
    GjkResult::Separated { point_a, point_b, distance: (point_a - point_b).norm() }
}

fn combine(simplex: &[SupportPoint], weights: &[Real], f: impl Fn(&SupportPoint) -> Vec3) -> Vec3 {
    simplex.iter().zip(weights).fold(Vec3::zeros(), |acc, (s, w)| acc + f(s) * *w)
}

/// Closest point of the simplex to the origin, as the smallest sub-simplex and
/// its barycentric weights. `None` means the origin is inside a tetrahedron.
fn closest_on_simplex(simplex: &[SupportPoint]) -> Option<(Vec<SupportPoint>, Vec<Real>)> {
    match simplex.len() {
        1 => Some((simplex.to_vec(), vec![1.0])),
        2 => Some(closest_on_segment(simplex[0], simplex[1])),
        3 => Some(closest_on_triangle(simplex[0], simplex[1], simplex[2])),
        _ => closest_on_tetrahedron(simplex[0], simplex[1], simplex[2], simplex[3]),
    }
}

fn closest_on_segment(a: SupportPoint, b: SupportPoint) -> (Vec<SupportPoint>, Vec<Real>) {
    let ab = b.w - a.w;
    let len2 = ab.norm_squared();
    if len2 <= ABS_TOLERANCE {
        return (vec![a], vec![1.0]);
    }
    let t = -a.w.dot(&ab) / len2;
    if t <= 0.0 {
        (vec![a], vec![1.0])
    } else if t >= 1.0 {
        (vec![b], vec![1.0])
    } else {
        (vec![a, b], vec![1.0 - t, t])
    }
}

fn closest_on_triangle(a: SupportPoint, b: SupportPoint, c: SupportPoint) -> (Vec<SupportPoint>, Vec<Real>) {
    let ab = b.w - a.w;
    let ac = c.w - a.w;
    let ap = -a.w;
    let d1 = ab.dot(&ap);
    let d2 = ac.dot(&ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return (vec![a], vec![1.0]);
    }
    let bp = -b.w;
    let d3 = ab.dot(&bp);
    let d4 = ac.dot(&bp);
    if d3 >= 0.0 && d4 <= d3 {
        return (vec![b], vec![1.0]);
    }
    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let t = d1 / (d1 - d3);
        return (vec![a, b], vec![1.0 - t, t]);
    }
    let cp = -c.w;
    let d5 = ab.dot(&cp);
    let d6 = ac.dot(&cp);
    if d6 >= 0.0 && d5 <= d6 {
        return (vec![c], vec![1.0]);
    }
    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let t = d2 / (d2 - d6);
        return (vec![a, c], vec![1.0 - t, t]);
    }
    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let t = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return (vec![b, c], vec![1.0 - t, t]);
    }
    let sum = va + vb + vc;
    if sum.abs() <= ABS_TOLERANCE {
        // Degenerate triangle: fall back to the best edge.
        return closest_on_segment(a, b);
    }
    let denom = 1.0 / sum;
    let v = vb * denom;
    let w = vc * denom;
    (vec![a, b, c], vec![1.0 - v - w, v, w])
}

fn closest_on_tetrahedron(
    a: SupportPoint,
    b: SupportPoint,
    c: SupportPoint,
    d: SupportPoint,
) -> Option<(Vec<SupportPoint>, Vec<Real>)> {
    let faces = [(a, b, c, d), (a, c, d, b), (a, d, b, c), (b, d, c, a)];
    let mut best: Option<(Vec<SupportPoint>, Vec<Real>, Real)> = None;
    let mut outside_any = false;
    for (p, q, r, opposite) in faces {
        let n = (q.w - p.w).cross(&(r.w - p.w));
        let origin_side = -p.w.dot(&n);
        let opposite_side = (opposite.w - p.w).dot(&n);
        // Degenerate tetrahedra are treated as if the origin were outside every face.
        let outside = if opposite_side.abs() <= ABS_TOLERANCE { true } else { origin_side * opposite_side < 0.0 };
        if !outside {
            continue;
        }
        outside_any = true;
        let (pts, weights) = closest_on_triangle(p, q, r);
        let point = combine(&pts, &weights, |s| s.w);
        let d2 = point.norm_squared();
        if best.as_ref().map_or(true, |(_, _, bd)| d2 < *bd) {
            best = Some((pts, weights, d2));
        }
    }
    if !outside_any {
        return None;
    }
    best.map(|(pts, weights, _)| (pts, weights))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::shape::{Shape, ShapeType};
    use crate::collision::support::{ConvexGeometry, ConvexSupport, PointSupport};
    use crate::foundation::math::translation;
    use approx::assert_relative_eq;

    #[test]
    fn test_separated_boxes() {
        let shape = Shape::new(ShapeType::Box);
        let a = ConvexSupport::new(ConvexGeometry::Shape(&shape), translation(Vec3::zeros()), 0.0);
        let b = ConvexSupport::new(ConvexGeometry::Shape(&shape), translation(Vec3::new(3.0, 0.0, 0.0)), 0.0);
        match distance(&a, &b, &Vec3::x()) {
            GjkResult::Separated { point_a, point_b, distance } => {
                assert_relative_eq!(distance, 2.0, epsilon = 1e-4);
                assert_relative_eq!(point_a.x, 0.5, epsilon = 1e-4);
                assert_relative_eq!(point_b.x, 2.5, epsilon = 1e-4);
            }
            GjkResult::Overlapping(_) => panic!("boxes should be apart"),
        }
    }

    #[test]
    fn test_overlapping_spheres() {
        let shape = Shape::new(ShapeType::Sphere);
        let a = ConvexSupport::new(ConvexGeometry::Shape(&shape), translation(Vec3::zeros()), 0.0);
        let b = ConvexSupport::new(ConvexGeometry::Shape(&shape), translation(Vec3::new(0.7, 0.1, 0.0)), 0.0);
        assert!(matches!(distance(&a, &b, &Vec3::x()), GjkResult::Overlapping(_)));
    }

    #[test]
    fn test_point_to_sphere() {
        let shape = Shape::new(ShapeType::Sphere);
        let a = ConvexSupport::new(ConvexGeometry::Shape(&shape), translation(Vec3::zeros()), 0.0);
        let b = PointSupport(Vec3::new(0.0, 2.0, 0.0));
        match distance(&a, &b, &Vec3::y()) {
            GjkResult::Separated { point_a, distance, .. } => {
                assert_relative_eq!(distance, 1.5, epsilon = 1e-3);
                assert_relative_eq!(point_a, Vec3::new(0.0, 0.5, 0.0), epsilon = 1e-3);
            }
            GjkResult::Overlapping(_) => panic!("point is outside"),
        }
    }
}
