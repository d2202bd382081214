//! Narrow-phase collision solver
//!
//! Based on Game Engine Architecture 3rd Edition, Section 13.3.5 ("the GJK
//! algorithm") with EPA for penetration depth.
//!
//! Contacts are reported as `(point_on_a, point_on_b)` pairs in world space.
//! For penetrating pairs `point_a - point_b` points from B's surface to A's
//! deepest point, so moving A by `point_b - point_a` resolves the contact.
//! Every routine is deterministic: the same inputs produce the same contacts
//! in the same order.

use super::epa::{self, Penetration};
use super::gjk::{self, GjkResult};
use super::shape::{Shape, ShapeData};
use super::support::{ConvexGeometry, ConvexSupport, PointSupport, SupportMap, Swept};
use crate::foundation::math::{
    closest_points_between_segments, plane_space, xform, xform_inv, Real, Transform, Vec3,
    CMP_EPSILON,
};

/// Maximum contacts produced for one convex feature pair
pub const MAX_MANIFOLD_POINTS: usize = 4;

/// Slack when checking an EPA face against the support planes
const EPA_TOLERANCE: Real = 2.0e-3;

/// Receives `(point_on_a, point_on_b)` contact pairs
pub type ContactCallback<'a> = dyn FnMut(Vec3, Vec3) + 'a;

/// Bounded contact pair buffer. Once full, a deeper pair replaces the
/// shallowest one kept.
#[derive(Debug, Clone, Default)]
pub struct ContactBuffer {
    max: usize,
    pairs: Vec<(Vec3, Vec3)>,
}

impl ContactBuffer {
    /// Buffer keeping at most `max` pairs
    pub fn new(max: usize) -> Self {
        Self { max, pairs: Vec::with_capacity(max) }
    }

    /// Record one contact pair
    pub fn push(&mut self, a: Vec3, b: Vec3) {
        if self.max == 0 {
            return;
        }
        if self.pairs.len() < self.max {
            self.pairs.push((a, b));
            return;
        }
        let depth = (a - b).norm_squared();
        let shallowest = self
            .pairs
            .iter()
            .enumerate()
            .map(|(i, (pa, pb))| (i, (pa - pb).norm_squared()))
            .min_by(|x, y| x.1.total_cmp(&y.1));
        if let Some((index, min_depth)) = shallowest {
            if depth >= min_depth {
                self.pairs[index] = (a, b);
            }
        }
    }

    /// Pairs kept so far
    pub fn pairs(&self) -> &[(Vec3, Vec3)] {
        &self.pairs
    }

    /// Whether nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Consume the buffer
    pub fn into_pairs(self) -> Vec<(Vec3, Vec3)> {
        self.pairs
    }
}

/// Test two placed shapes for overlap (within the margins) and report contacts.
///
/// Returns whether the shapes collide. When `callback` is `None` only the
/// boolean is computed.
pub fn solve_static(
    shape_a: &Shape,
    xform_a: &Transform,
    shape_b: &Shape,
    xform_b: &Transform,
    callback: Option<&mut ContactCallback<'_>>,
    margin_a: Real,
    margin_b: Real,
) -> bool {
    let mut sink = |_: Vec3, _: Vec3| {};
    let callback: &mut ContactCallback<'_> = match callback {
        Some(cb) => cb,
        None => &mut sink,
    };

    match (shape_a.data(), shape_b.data()) {
        (ShapeData::SeparationRay { .. }, ShapeData::SeparationRay { .. }) => false,
        (ShapeData::SeparationRay { .. }, _) => solve_separation_ray(shape_a, xform_a, shape_b, xform_b, callback, margin_a),
        (_, ShapeData::SeparationRay { .. }) => {
            let mut swapped = |a: Vec3, b: Vec3| callback(b, a);
            solve_separation_ray(shape_b, xform_b, shape_a, xform_a, &mut swapped, margin_b)
        }
        (
            ShapeData::WorldBoundary(_) | ShapeData::ConcavePolygon { .. },
            ShapeData::WorldBoundary(_) | ShapeData::ConcavePolygon { .. },
        ) => false,
        (ShapeData::WorldBoundary(_) | ShapeData::ConcavePolygon { .. }, _) => {
            let mut swapped = |a: Vec3, b: Vec3| callback(b, a);
            let convex = ConvexSupport::new(ConvexGeometry::Shape(shape_b), *xform_b, margin_b);
            solve_convex_vs_shape(&convex, shape_a, xform_a, &mut swapped, margin_a)
        }
        _ => {
            let convex = ConvexSupport::new(ConvexGeometry::Shape(shape_a), *xform_a, margin_a);
            solve_convex_vs_shape(&convex, shape_b, xform_b, callback, margin_b)
        }
    }
}

/// Test a placed convex geometry (shape, soft body node, triangle...) against
/// any shape. Every convex narrow-phase query funnels through here.
pub fn solve_convex_vs_shape(
    convex: &ConvexSupport<'_>,
    shape_b: &Shape,
    xform_b: &Transform,
    callback: &mut ContactCallback<'_>,
    margin_b: Real,
) -> bool {
    match shape_b.data() {
        ShapeData::SeparationRay { .. } => false,
        ShapeData::WorldBoundary(plane) => {
            let plane = plane.transformed(xform_b);
            let mut hit = false;
            let mut feature = Vec::new();
            convex.supports(&-plane.normal, &mut feature);
            for p in feature {
                let dist = plane.distance_to(&p) - margin_b;
                if dist < 0.0 {
                    callback(p, p - plane.normal * dist);
                    hit = true;
                }
            }
            hit
        }
        ShapeData::ConcavePolygon { .. } => solve_concave(convex, shape_b, xform_b, callback, margin_b),
        _ => {
            let b = ConvexSupport::new(ConvexGeometry::Shape(shape_b), *xform_b, margin_b);
            solve_convex(convex, &b, callback)
        }
    }
}

/// Closest points between shape A swept by `motion_a` and shape B.
///
/// Returns `None` when they overlap anywhere along the motion. Margins are not
/// applied here.
pub fn solve_distance(
    shape_a: &Shape,
    xform_a: &Transform,
    motion_a: &Vec3,
    shape_b: &Shape,
    xform_b: &Transform,
) -> Option<(Vec3, Vec3)> {
    match (shape_a.data(), shape_b.data()) {
        (ShapeData::WorldBoundary(_) | ShapeData::ConcavePolygon { .. }, _) => {
            if matches!(shape_b.data(), ShapeData::WorldBoundary(_) | ShapeData::ConcavePolygon { .. }) {
                return None;
            }
            // Relative motion: sweep B backwards against A.
            solve_distance(shape_b, xform_b, &-motion_a, shape_a, xform_a).map(|(b, a)| (a, b))
        }
        (_, ShapeData::WorldBoundary(plane)) => {
            let plane = plane.transformed(xform_b);
            let a = ConvexSupport::new(ConvexGeometry::Shape(shape_a), *xform_a, 0.0);
            let swept = Swept { inner: &a, motion: *motion_a };
            let p = swept.support(&-plane.normal);
            let dist = plane.distance_to(&p);
            (dist > 0.0).then(|| (p, p - plane.normal * dist))
        }
        (_, ShapeData::ConcavePolygon { .. }) => {
            let mesh = shape_b.mesh()?;
            let a = ConvexSupport::new(ConvexGeometry::Shape(shape_a), *xform_a, 0.0);
            let swept = Swept { inner: &a, motion: *motion_a };
            let world_aabb = a.aabb().swept(motion_a);
            let local_aabb = world_aabb.transformed(&xform_b.inverse());
            let mut best: Option<(Vec3, Vec3, Real)> = None;
            for index in mesh.triangles_in(&local_aabb) {
                let tri = ConvexSupport::new(ConvexGeometry::Triangle(*mesh.triangle(index)), *xform_b, 0.0);
                match gjk::distance(&swept, &tri, &(tri.center() - a.center())) {
                    GjkResult::Overlapping(_) => return None,
                    GjkResult::Separated { point_a, point_b, distance } => {
                        if best.map_or(true, |(_, _, d)| distance < d) {
                            best = Some((point_a, point_b, distance));
                        }
                    }
                }
            }
            // Nothing nearby: report the bounds gap so callers still get a separation.
            Some(best.map_or_else(|| (a.center(), xform(xform_b, &mesh.aabb().center())), |(pa, pb, _)| (pa, pb)))
        }
        _ => {
            let a = ConvexSupport::new(ConvexGeometry::Shape(shape_a), *xform_a, 0.0);
            let b = ConvexSupport::new(ConvexGeometry::Shape(shape_b), *xform_b, 0.0);
            let swept = Swept { inner: &a, motion: *motion_a };
            match gjk::distance(&swept, &b, &(b.center() - a.center())) {
                GjkResult::Separated { point_a, point_b, .. } => Some((point_a, point_b)),
                GjkResult::Overlapping(_) => None,
            }
        }
    }
}

fn solve_separation_ray(
    ray: &Shape,
    xform_ray: &Transform,
    other: &Shape,
    xform_other: &Transform,
    callback: &mut ContactCallback<'_>,
    margin: Real,
) -> bool {
    let ShapeData::SeparationRay { length, slide_on_slope } = *ray.data() else {
        return false;
    };
    let from = xform_ray.translation.vector;
    let dir = xform_ray.rotation * Vec3::z();
    let to = from + dir * (length + margin);
    let support_a = to;

    let local_from = xform_inv(xform_other, &from);
    let local_to = xform_inv(xform_other, &to);
    let Some((p, n)) = other.intersect_segment(&local_from, &local_to) else {
        return false;
    };
    if n.norm_squared() <= CMP_EPSILON || n.dot(&(local_from - local_to)) < CMP_EPSILON {
        return false;
    }
    let mut support_b = xform(xform_other, &p);
    if slide_on_slope {
        let global_n = (xform_other.rotation * n).normalize();
        support_b = support_a + global_n * (support_b - support_a).norm();
    }
    callback(support_a, support_b);
    true
}

fn solve_concave(
    convex: &ConvexSupport<'_>,
    concave: &Shape,
    xform_concave: &Transform,
    callback: &mut ContactCallback<'_>,
    margin_concave: Real,
) -> bool {
    let Some(mesh) = concave.mesh() else {
        return false;
    };
    let local_aabb = convex.aabb().grow(margin_concave).transformed(&xform_concave.inverse());
    let mut collided = false;
    for index in mesh.triangles_in(&local_aabb) {
        let tri = ConvexSupport::new(ConvexGeometry::Triangle(*mesh.triangle(index)), *xform_concave, margin_concave);
        let face_normal = xform_concave.rotation * mesh.normal(index);
        let backface = mesh.backface_collision();
        let mut filtered = |a: Vec3, b: Vec3| {
            // Single sided faces only push towards their front.
            if backface || (b - a).dot(&face_normal) >= 0.0 {
                callback(a, b);
            }
        };
        collided |= solve_convex(convex, &tri, &mut filtered);
    }
    collided
}

/// Convex/convex contact generation
pub fn solve_convex(a: &ConvexSupport<'_>, b: &ConvexSupport<'_>, callback: &mut ContactCallback<'_>) -> bool {
    match (a.geometry.sphere_radius(), b.geometry.sphere_radius()) {
        (Some(ra), Some(rb)) => {
            let ca = a.transform.translation.vector;
            let cb = b.transform.translation.vector;
            let ra = ra + a.margin;
            let rb = rb + b.margin;
            let offset = cb - ca;
            let dist = offset.norm();
            if dist >= ra + rb {
                return false;
            }
            let n = if dist > CMP_EPSILON { offset / dist } else { Vec3::y() };
            callback(ca + n * ra, cb - n * rb);
            return true;
        }
        (Some(ra), None) => return solve_sphere_convex(a, ra + a.margin, b, callback),
        (None, Some(rb)) => {
            let mut swapped = |pa: Vec3, pb: Vec3| callback(pb, pa);
            return solve_sphere_convex(b, rb + b.margin, a, &mut swapped);
        }
        (None, None) => {}
    }

    let guess = b.center() - a.center();
    let simplex = match gjk::distance(a, b, &guess) {
        GjkResult::Separated { .. } => return false,
        GjkResult::Overlapping(simplex) => simplex,
    };
    if let Some(pen) = penetration(a, b, &simplex, &[&a.transform, &b.transform], &guess) {
        generate_manifold(a, b, &pen, callback);
    }
    true
}

/// Sphere against a convex set, from the closest point to the sphere center
fn solve_sphere_convex(
    sphere: &ConvexSupport<'_>,
    radius: Real,
    other: &ConvexSupport<'_>,
    callback: &mut ContactCallback<'_>,
) -> bool {
    let center = sphere.transform.translation.vector;
    let point = PointSupport(center);
    let guess = other.center() - center;
    let simplex = match gjk::distance(&point, other, &guess) {
        GjkResult::Separated { point_b, distance, .. } if distance > CMP_EPSILON => {
            if distance >= radius {
                return false;
            }
            let n = (point_b - center) / distance;
            callback(center + n * radius, point_b);
            return true;
        }
        GjkResult::Separated { .. } => Vec::new(),
        GjkResult::Overlapping(simplex) => simplex,
    };
    // Center inside the other set: leave through its nearest face.
    if let Some(pen) = penetration(&point, other, &simplex, &[&other.transform], &guess) {
        callback(center + pen.normal * radius, center - pen.normal * pen.depth);
    }
    true
}

/// EPA result, checked against the shallowest sampled axis.
///
/// Falls back to that axis when EPA fails or stops on a face that is not a
/// support plane of both sets. `None` means the sets only touch.
fn penetration(
    a: &dyn SupportMap,
    b: &dyn SupportMap,
    simplex: &[gjk::SupportPoint],
    frames: &[&Transform],
    guess: &Vec3,
) -> Option<Penetration> {
    let axis = shallowest_axis(a, b, frames, guess)?;
    match epa::penetration(a, b, simplex) {
        Some(pen) if epa_agrees(a, b, &pen, &axis) => Some(pen),
        _ => Some(axis),
    }
}

/// Penetration along the world axes, the local axes of `frames` and `guess`,
/// keeping the shallowest. Each sampled depth bounds the true depth from above.
fn shallowest_axis(a: &dyn SupportMap, b: &dyn SupportMap, frames: &[&Transform], guess: &Vec3) -> Option<Penetration> {
    let basis = [Vec3::x(), Vec3::y(), Vec3::z()];
    let mut axes: Vec<Vec3> = basis.to_vec();
    for frame in frames {
        axes.extend(basis.iter().map(|v| frame.rotation * *v));
    }
    if let Some(dir) = guess.try_normalize(CMP_EPSILON) {
        axes.push(dir);
    }

    let mut best: Option<Penetration> = None;
    for n in axes.into_iter().flat_map(|axis| [axis, -axis]) {
        let point_a = a.support(&n);
        let point_b = b.support(&-n);
        let depth = (point_a - point_b).dot(&n);
        if best.map_or(true, |p| depth < p.depth) {
            best = Some(Penetration { normal: n, depth, point_a, point_b });
        }
    }
    best.filter(|p| p.depth > 0.0)
}

fn epa_agrees(a: &dyn SupportMap, b: &dyn SupportMap, pen: &Penetration, axis: &Penetration) -> bool {
    let n = pen.normal;
    if !pen.depth.is_finite() || !n.iter().all(|c| c.is_finite()) || pen.depth > axis.depth + EPA_TOLERANCE {
        return false;
    }
    let top_a = a.support(&n).dot(&n);
    let bottom_b = b.support(&-n).dot(&n);
    (top_a - bottom_b - pen.depth).abs() <= EPA_TOLERANCE
        && (top_a - pen.point_a.dot(&n)).abs() <= EPA_TOLERANCE
        && (pen.point_b.dot(&n) - bottom_b).abs() <= EPA_TOLERANCE
}

fn generate_manifold(a: &ConvexSupport<'_>, b: &ConvexSupport<'_>, pen: &Penetration, callback: &mut ContactCallback<'_>) {
    let n = pen.normal;
    let mut feature_a = Vec::new();
    let mut feature_b = Vec::new();
    a.supports(&n, &mut feature_a);
    b.supports(&-n, &mut feature_b);

    if feature_a.len() < 2 || feature_b.len() < 2 {
        callback(pen.point_a, pen.point_b);
        return;
    }
    if feature_a.len() == 2 && feature_b.len() == 2 {
        let (pa, pb) = closest_points_between_segments(&feature_a[0], &feature_a[1], &feature_b[0], &feature_b[1]);
        if (pa - pb).dot(&n) > 0.0 {
            callback(pa, pb);
        } else {
            callback(pen.point_a, pen.point_b);
        }
        return;
    }

    let height_a = feature_a.iter().map(|p| p.dot(&n)).fold(Real::MIN, Real::max);
    let height_b = feature_b.iter().map(|p| p.dot(&n)).fold(Real::MAX, Real::min);
    let (u, v) = plane_space(&n);
    let to_2d = |p: &Vec3| (p.dot(&u), p.dot(&v));

    let (polygon, other) = if feature_a.len() >= 3 { (&feature_a, &feature_b) } else { (&feature_b, &feature_a) };
    let reference = convex_order(polygon.iter().map(to_2d).collect());
    let incident: Vec<(Real, Real)> = other.iter().map(to_2d).collect();

    let clipped = if incident.len() == 2 {
        clip_segment(&reference, incident[0], incident[1])
    } else {
        clip_polygon(&convex_order(incident), &reference)
    };

    let mut contacts: Vec<(Real, Real)> = Vec::with_capacity(clipped.len());
    for q in clipped {
        if !contacts.iter().any(|c| (c.0 - q.0).hypot(c.1 - q.1) <= 1.0e-4) {
            contacts.push(q);
        }
    }
    if height_a - height_b <= 0.0 || contacts.is_empty() {
        callback(pen.point_a, pen.point_b);
        return;
    }
    for (cu, cv) in reduce_contacts(contacts) {
        let base = u * cu + v * cv;
        callback(base + n * height_a, base + n * height_b);
    }
}

fn convex_order(mut points: Vec<(Real, Real)>) -> Vec<(Real, Real)> {
    if points.len() < 3 {
        return points;
    }
    let count = points.len() as Real;
    let cx = points.iter().map(|p| p.0).sum::<Real>() / count;
    let cy = points.iter().map(|p| p.1).sum::<Real>() / count;
    points.sort_by(|a, b| (a.1 - cy).atan2(a.0 - cx).total_cmp(&(b.1 - cy).atan2(b.0 - cx)));
    points
}

fn edge_side(a: (Real, Real), b: (Real, Real), p: (Real, Real)) -> Real {
    (b.0 - a.0) * (p.1 - a.1) - (b.1 - a.1) * (p.0 - a.0)
}

fn clip_polygon(subject: &[(Real, Real)], clip: &[(Real, Real)]) -> Vec<(Real, Real)> {
    let mut output = subject.to_vec();
    for i in 0..clip.len() {
        if output.is_empty() {
            break;
        }
        let a = clip[i];
        let b = clip[(i + 1) % clip.len()];
        let input = std::mem::take(&mut output);
        for j in 0..input.len() {
            let cur = input[j];
            let prev = input[(j + input.len() - 1) % input.len()];
            let cur_in = edge_side(a, b, cur) >= -CMP_EPSILON;
            let prev_in = edge_side(a, b, prev) >= -CMP_EPSILON;
            if cur_in != prev_in {
                output.push(intersect_edge(a, b, prev, cur));
            }
            if cur_in {
                output.push(cur);
            }
        }
    }
    output
}

fn intersect_edge(a: (Real, Real), b: (Real, Real), p: (Real, Real), q: (Real, Real)) -> (Real, Real) {
    let dp = edge_side(a, b, p);
    let dq = edge_side(a, b, q);
    let denom = dp - dq;
    let t = if denom.abs() > CMP_EPSILON { dp / denom } else { 0.0 };
    (p.0 + (q.0 - p.0) * t, p.1 + (q.1 - p.1) * t)
}

fn clip_segment(polygon: &[(Real, Real)], p0: (Real, Real), p1: (Real, Real)) -> Vec<(Real, Real)> {
    let mut t0: Real = 0.0;
    let mut t1: Real = 1.0;
    for i in 0..polygon.len() {
        let a = polygon[i];
        let b = polygon[(i + 1) % polygon.len()];
        let d0 = edge_side(a, b, p0);
        let d1 = edge_side(a, b, p1);
        if d0 < -CMP_EPSILON && d1 < -CMP_EPSILON {
            return Vec::new();
        }
        if d0 < -CMP_EPSILON {
            t0 = t0.max(d0 / (d0 - d1));
        } else if d1 < -CMP_EPSILON {
            t1 = t1.min(d0 / (d0 - d1));
        }
    }
    if t0 > t1 {
        return Vec::new();
    }
    let lerp = |t: Real| (p0.0 + (p1.0 - p0.0) * t, p0.1 + (p1.1 - p0.1) * t);
    vec![lerp(t0), lerp(t1)]
}

fn reduce_contacts(points: Vec<(Real, Real)>) -> Vec<(Real, Real)> {
    if points.len() <= MAX_MANIFOLD_POINTS {
        return points;
    }
    let pick = |key: &dyn Fn(&(Real, Real)) -> Real| -> usize {
        let mut best = 0;
        for (i, p) in points.iter().enumerate() {
            if key(p) > key(&points[best]) {
                best = i;
            }
        }
        best
    };
    let mut chosen: Vec<usize> = Vec::with_capacity(MAX_MANIFOLD_POINTS);
    for key in [
        &(|p: &(Real, Real)| p.0 + p.1) as &dyn Fn(&(Real, Real)) -> Real,
        &|p: &(Real, Real)| p.0 - p.1,
        &|p: &(Real, Real)| -p.0 - p.1,
        &|p: &(Real, Real)| p.1 - p.0,
    ] {
        let i = pick(key);
        if !chosen.contains(&i) {
            chosen.push(i);
        }
    }
    chosen.sort_unstable();
    chosen.into_iter().map(|i| points[i]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::shape::ShapeType;
    use crate::foundation::math::{transform_from, translation, Plane, Quat, Unit};
    use approx::assert_relative_eq;

    fn collect(a: &Shape, ta: &Transform, b: &Shape, tb: &Transform, margin: Real) -> (bool, Vec<(Vec3, Vec3)>) {
        let mut contacts = Vec::new();
        let mut cb = |pa: Vec3, pb: Vec3| contacts.push((pa, pb));
        let hit = solve_static(a, ta, b, tb, Some(&mut cb), margin, margin);
        (hit, contacts)
    }

    #[test]
    fn test_box_resting_on_box_gives_four_contacts() {
        let small = Shape::new(ShapeType::Box);
        let mut ground = Shape::new(ShapeType::Box);
        ground.set_data(ShapeData::Box { half_extents: Vec3::new(5.0, 0.5, 5.0) }).unwrap();
        let (hit, contacts) = collect(
            &small,
            &translation(Vec3::new(0.0, 0.95, 0.0)),
            &ground,
            &translation(Vec3::zeros()),
            0.0,
        );
        assert!(hit);
        assert_eq!(contacts.len(), 4);
        for (a, b) in contacts {
            assert_relative_eq!(a.y, 0.45, epsilon = 1e-3);
            assert_relative_eq!(b.y, 0.5, epsilon = 1e-3);
        }
    }

    fn rotations() -> Vec<Quat> {
        let axes = [Vec3::x_axis(), Vec3::z_axis(), Unit::new_normalize(Vec3::new(1.0, 2.0, -0.5))];
        let mut out = Vec::new();
        for axis in axes {
            for step in 0..24 {
                out.push(Quat::from_axis_angle(&axis, step as Real * 0.27));
            }
        }
        out
    }

    #[test]
    fn test_rotated_sphere_resting_on_box_stays_shallow() {
        let sphere = Shape::new(ShapeType::Sphere);
        let mut ground = Shape::new(ShapeType::Box);
        ground.set_data(ShapeData::Box { half_extents: Vec3::new(5.0, 0.5, 5.0) }).unwrap();
        let ground_at = translation(Vec3::zeros());
        for rotation in rotations() {
            let at = transform_from(Vec3::new(0.3, 0.99, -0.2), rotation);
            for (hit, contacts) in [collect(&sphere, &at, &ground, &ground_at, 0.0), collect(&ground, &ground_at, &sphere, &at, 0.0)] {
                assert!(hit);
                assert_eq!(contacts.len(), 1);
                let (a, b) = contacts[0];
                let depth = (a - b).norm();
                assert!(depth <= 0.011, "depth {depth} for {rotation:?}");
                let on_ground = if a.y > b.y { a } else { b };
                assert_relative_eq!(on_ground.y, 0.5, epsilon = 1e-3);
            }
        }
    }

    #[test]
    fn test_rotated_box_resting_on_box_stays_shallow() {
        let small = Shape::new(ShapeType::Box);
        let mut ground = Shape::new(ShapeType::Box);
        ground.set_data(ShapeData::Box { half_extents: Vec3::new(5.0, 0.5, 5.0) }).unwrap();
        let ground_at = translation(Vec3::zeros());
        for step in 0..24 {
            let yaw = Quat::from_axis_angle(&Vec3::y_axis(), step as Real * 0.27);
            let at = transform_from(Vec3::new(0.3, 0.99, -0.2), yaw);
            let (hit, contacts) = collect(&small, &at, &ground, &ground_at, 0.0);
            assert!(hit);
            assert!(!contacts.is_empty());
            for (a, b) in contacts {
                assert!((b - a).dot(&Vec3::y()) <= 0.011);
                assert!(b.y - a.y >= 0.0);
                assert_relative_eq!(b.y, 0.5, epsilon = 1e-3);
            }
        }
    }

    #[test]
    fn test_epa_face_off_the_support_planes_is_rejected() {
        let sphere = Shape::new(ShapeType::Sphere);
        let mut ground = Shape::new(ShapeType::Box);
        ground.set_data(ShapeData::Box { half_extents: Vec3::new(5.0, 0.5, 5.0) }).unwrap();
        let a = ConvexSupport::new(ConvexGeometry::Shape(&ground), translation(Vec3::zeros()), 0.0);
        let b = ConvexSupport::new(ConvexGeometry::Shape(&sphere), translation(Vec3::new(0.0, 0.99, 0.0)), 0.0);
        let guess = b.center() - a.center();

        let axis = shallowest_axis(&a, &b, &[&a.transform, &b.transform], &guess).unwrap();
        assert_relative_eq!(axis.normal, Vec3::y(), epsilon = 1e-6);
        assert_relative_eq!(axis.depth, 0.01, epsilon = 1e-4);

        // Ground point on the bottom face, sphere point at its center.
        let bogus = Penetration {
            normal: -Vec3::y(),
            depth: 1.5,
            point_a: Vec3::new(0.0, -0.5, 0.0),
            point_b: Vec3::new(0.0, 0.99, 0.0),
        };
        assert!(!epa_agrees(&a, &b, &bogus, &axis));
        assert!(epa_agrees(&a, &b, &axis, &axis));
    }

    #[test]
    fn test_sphere_center_inside_box_leaves_through_nearest_face() {
        let sphere = Shape::new(ShapeType::Sphere);
        let mut ground = Shape::new(ShapeType::Box);
        ground.set_data(ShapeData::Box { half_extents: Vec3::new(5.0, 0.5, 5.0) }).unwrap();
        let (hit, contacts) = collect(&sphere, &translation(Vec3::new(1.0, 0.4, 0.0)), &ground, &translation(Vec3::zeros()), 0.0);
        assert!(hit);
        let (a, b) = contacts[0];
        assert_relative_eq!(a, Vec3::new(1.0, -0.1, 0.0), epsilon = 1e-3);
        assert_relative_eq!(b, Vec3::new(1.0, 0.5, 0.0), epsilon = 1e-3);
    }

    #[test]
    fn test_contacts_are_deterministic() {
        let a = Shape::new(ShapeType::Capsule);
        let b = Shape::new(ShapeType::Box);
        let ta = translation(Vec3::new(0.2, 1.2, 0.1));
        let tb = translation(Vec3::zeros());
        let first = collect(&a, &ta, &b, &tb, 0.0);
        let second = collect(&a, &ta, &b, &tb, 0.0);
        assert!(first.0);
        assert_eq!(first.1, second.1);
    }

    #[test]
    fn test_world_boundary_swaps_sides() {
        let sphere = Shape::new(ShapeType::Sphere);
        let plane = Shape::new(ShapeType::WorldBoundary);
        let at = translation(Vec3::new(0.0, 0.4, 0.0));
        let id = translation(Vec3::zeros());

        let (hit, contacts) = collect(&sphere, &at, &plane, &id, 0.0);
        assert!(hit);
        let (a, b) = contacts[0];
        assert_relative_eq!(a, Vec3::new(0.0, -0.1, 0.0), epsilon = 1e-5);
        assert_relative_eq!(b, Vec3::zeros(), epsilon = 1e-5);

        let (hit, contacts) = collect(&plane, &id, &sphere, &at, 0.0);
        assert!(hit);
        let (a, b) = contacts[0];
        assert_relative_eq!(a, Vec3::zeros(), epsilon = 1e-5);
        assert_relative_eq!(b, Vec3::new(0.0, -0.1, 0.0), epsilon = 1e-5);
    }

    #[test]
    fn test_separation_ray_pushes_back_along_ray() {
        let mut ray = Shape::new(ShapeType::SeparationRay);
        ray.set_data(ShapeData::SeparationRay { length: 2.0, slide_on_slope: false }).unwrap();
        let mut plane = Shape::new(ShapeType::WorldBoundary);
        plane.set_data(ShapeData::WorldBoundary(Plane::new(Vec3::y(), 0.0))).unwrap();
        // Ray pointing down (+Z rotated onto -Y), starting 1.5 above the ground.
        let rot = crate::foundation::math::Quat::from_axis_angle(&Vec3::x_axis(), std::f32::consts::FRAC_PI_2);
        let t = crate::foundation::math::transform_from(Vec3::new(0.0, 1.5, 0.0), rot);
        let (hit, contacts) = collect(&ray, &t, &plane, &translation(Vec3::zeros()), 0.0);
        assert!(hit);
        let (a, b) = contacts[0];
        assert_relative_eq!(a, Vec3::new(0.0, -0.5, 0.0), epsilon = 1e-5);
        assert_relative_eq!(b, Vec3::zeros(), epsilon = 1e-5);
    }

    #[test]
    fn test_distance_and_sweep() {
        let a = Shape::new(ShapeType::Sphere);
        let b = Shape::new(ShapeType::Box);
        let ta = translation(Vec3::new(0.0, 3.0, 0.0));
        let tb = translation(Vec3::zeros());
        let (pa, pb) = solve_distance(&a, &ta, &Vec3::zeros(), &b, &tb).unwrap();
        assert_relative_eq!(pa.y, 2.5, epsilon = 1e-3);
        assert_relative_eq!(pb.y, 0.5, epsilon = 1e-3);
        assert!(solve_distance(&a, &ta, &Vec3::new(0.0, -2.5, 0.0), &b, &tb).is_none());
        assert!(solve_distance(&a, &ta, &Vec3::new(0.0, -1.5, 0.0), &b, &tb).is_some());
    }

    #[test]
    fn test_concave_floor() {
        let mut floor = Shape::new(ShapeType::ConcavePolygon);
        let faces = vec![
            Vec3::new(-5.0, 0.0, -5.0),
            Vec3::new(-5.0, 0.0, 5.0),
            Vec3::new(5.0, 0.0, 5.0),
            Vec3::new(-5.0, 0.0, -5.0),
            Vec3::new(5.0, 0.0, 5.0),
            Vec3::new(5.0, 0.0, -5.0),
        ];
        floor.set_data(ShapeData::ConcavePolygon { faces, backface_collision: false }).unwrap();
        let sphere = Shape::new(ShapeType::Sphere);
        let (hit, contacts) = collect(&sphere, &translation(Vec3::new(0.3, 0.45, 0.2)), &floor, &translation(Vec3::zeros()), 0.0);
        assert!(hit);
        assert!(!contacts.is_empty());
        let (a, b) = contacts[0];
        assert!(b.y - a.y > 0.0);
        assert!(solve_distance(&sphere, &translation(Vec3::new(0.0, 2.0, 0.0)), &Vec3::new(0.0, -1.0, 0.0), &floor, &translation(Vec3::zeros())).is_some());
    }

    #[test]
    fn test_contact_buffer_replaces_shallowest_when_full() {
        let mut buffer = ContactBuffer::new(2);
        buffer.push(Vec3::new(0.0, 0.1, 0.0), Vec3::zeros());
        buffer.push(Vec3::new(0.0, 0.3, 0.0), Vec3::zeros());
        buffer.push(Vec3::new(0.0, 0.05, 0.0), Vec3::zeros());
        buffer.push(Vec3::new(0.0, 0.2, 0.0), Vec3::zeros());
        let depths: Vec<Real> = buffer.pairs().iter().map(|(a, b)| (a - b).norm()).collect();
        assert_eq!(depths.len(), 2);
        assert_relative_eq!(depths[0], 0.2, epsilon = 1e-6);
        assert_relative_eq!(depths[1], 0.3, epsilon = 1e-6);
    }
}
