//! Soft bodies
//!
//! A mass-spring mesh integrated with position-based relaxation. Nodes carry
//! their previous position `q`, current position `x` and velocity `v`; each
//! link pulls its two nodes back toward the rest length once per solver
//! iteration. Nodes and faces live in their own bounding volume trees so that
//! body contacts and ray queries only visit the relevant part of the mesh.

use std::collections::{BTreeSet, HashMap};

use slotmap::SlotMap;

use super::area::AreaOverlaps;
use super::{Area, CollisionObject};
use crate::broadphase::{BvhHandle, DynamicBvh, ProxyId};
use crate::constraint::ConstraintRef;
use crate::ensure;
use crate::error::{PhysicsError, PhysicsResult};
use crate::foundation::math::{segment_intersects_triangle, xform, Aabb, Real, Transform, Vec3, CMP_EPSILON};
use crate::rid::{AreaRid, ObjectRid, SoftBodyRid};

/// Displacement per step beyond which a node is considered to have exploded
const MAX_DISPLACEMENT: Real = 1000.0;

#[derive(Debug, Clone)]
pub(crate) struct Node {
    /// Rest position in mesh space
    pub(crate) s: Vec3,
    pub(crate) x: Vec3,
    pub(crate) q: Vec3,
    pub(crate) v: Vec3,
    pub(crate) bv: Vec3,
    pub(crate) f: Vec3,
    pub(crate) n: Vec3,
    pub(crate) area: Real,
    pub(crate) im: Real,
    leaf: BvhHandle,
}

#[derive(Debug, Clone)]
struct Link {
    n: [usize; 2],
    /// Rest length
    rl: Real,
    c0: Real,
    c1: Real,
}

#[derive(Debug, Clone)]
struct Face {
    n: [usize; 3],
    normal: Vec3,
    centroid: Vec3,
    ra: Real,
    leaf: BvhHandle,
}

/// A deformable mass-spring body
#[derive(Debug)]
pub struct SoftBody {
    base: CollisionObject,
    nodes: Vec<Node>,
    links: Vec<Link>,
    faces: Vec<Face>,
    vertex_to_node: Vec<usize>,
    pinned: BTreeSet<usize>,
    node_tree: DynamicBvh<usize>,
    face_tree: DynamicBvh<usize>,
    bounds: Aabb,

    collision_margin: Real,
    total_mass: Real,
    iteration_count: usize,
    linear_stiffness: Real,
    pressure_coefficient: Real,
    damping_coefficient: Real,
    drag_coefficient: Real,

    pub(crate) areas: AreaOverlaps,
    exceptions: BTreeSet<ObjectRid>,
    pub(crate) constraints: BTreeSet<ConstraintRef>,
    pub(crate) proxy: Option<ProxyId>,
    pub(crate) island_step: u64,
}

impl SoftBody {
    /// A detached soft body without a mesh
    pub fn new(rid: SoftBodyRid) -> Self {
        Self {
            base: CollisionObject::new(ObjectRid::SoftBody(rid)),
            nodes: Vec::new(),
            links: Vec::new(),
            faces: Vec::new(),
            vertex_to_node: Vec::new(),
            pinned: BTreeSet::new(),
            node_tree: DynamicBvh::new(),
            face_tree: DynamicBvh::new(),
            bounds: Aabb::default(),
            collision_margin: 0.05,
            total_mass: 1.0,
            iteration_count: 5,
            linear_stiffness: 0.5,
            pressure_coefficient: 0.0,
            damping_coefficient: 0.01,
            drag_coefficient: 0.0,
            areas: AreaOverlaps::default(),
            exceptions: BTreeSet::new(),
            constraints: BTreeSet::new(),
            proxy: None,
            island_step: 0,
        }
    }

    /// Shared collision object state
    pub const fn base(&self) -> &CollisionObject {
        &self.base
    }

    /// Mutable shared collision object state
    pub fn base_mut(&mut self) -> &mut CollisionObject {
        &mut self.base
    }

    /// Own handle
    pub fn rid(&self) -> SoftBodyRid {
        self.base.rid().as_soft_body().unwrap_or_default()
    }

    /// Build nodes, links and faces from a triangle list. Vertices at the same
    /// position share one node.
    pub(crate) fn set_mesh(&mut self, vertices: &[Vec3], indices: &[usize]) -> PhysicsResult<()> {
        ensure!(indices.len() % 3 == 0, PhysicsError::precondition("soft body index count must be a multiple of 3"));
        ensure!(
            indices.iter().all(|&i| i < vertices.len()),
            PhysicsError::precondition("soft body index out of range")
        );

        self.nodes.clear();
        self.links.clear();
        self.faces.clear();
        self.vertex_to_node.clear();
        self.node_tree.clear();
        self.face_tree.clear();

        let mut unique: HashMap<[u32; 3], usize> = HashMap::new();
        for v in vertices {
            let key = [v.x.to_bits(), v.y.to_bits(), v.z.to_bits()];
            let next = self.nodes.len();
            let index = *unique.entry(key).or_insert(next);
            if index == next {
                let leaf = self.node_tree.insert(Aabb::from_center_extents(*v, Vec3::repeat(self.collision_margin)), index);
                self.nodes.push(Node {
                    s: *v,
                    x: *v,
                    q: *v,
                    v: Vec3::zeros(),
                    bv: Vec3::zeros(),
                    f: Vec3::zeros(),
                    n: Vec3::zeros(),
                    area: 0.0,
                    im: 0.0,
                    leaf,
                });
            }
            self.vertex_to_node.push(index);
        }

        let mut seen = BTreeSet::new();
        for tri in indices.chunks_exact(3) {
            let idx = [self.vertex_to_node[tri[0]], self.vertex_to_node[tri[1]], self.vertex_to_node[tri[2]]];
            for (j, k) in [(0, 1), (1, 2), (2, 0)] {
                let (a, b) = (idx[j].min(idx[k]), idx[j].max(idx[k]));
                if a != b && seen.insert((a, b)) {
                    self.links.push(Link { n: [a, b], rl: 0.0, c0: 0.0, c1: 0.0 });
                }
            }
            let index = self.faces.len();
            let leaf = self.face_tree.insert(Aabb::from_points(idx.iter().map(|&i| &self.nodes[i].s)), index);
            self.faces.push(Face { n: idx, normal: Vec3::zeros(), centroid: Vec3::zeros(), ra: 0.0, leaf });
        }
        self.pinned.retain(|&v| v < vertices.len());

        self.update_node_masses();
        self.reset_link_rest_lengths();
        self.update_link_constants();
        self.update_area();
        self.update_normals_and_centroids();
        self.update_bounds();
        log::debug!("soft body mesh: {} nodes, {} links, {} faces", self.nodes.len(), self.links.len(), self.faces.len());
        Ok(())
    }

    /// Number of simulated nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of links
    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    /// Number of faces
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// Place every node at its rest position under `transform` and stop all motion
    pub(crate) fn set_transform(&mut self, transform: Transform) {
        self.base.set_transform(transform);
        for node in &mut self.nodes {
            node.x = xform(&transform, &node.s);
            node.q = node.x;
            node.v = Vec3::zeros();
            node.bv = Vec3::zeros();
        }
        self.update_node_tree(0.0);
        self.update_face_tree(0.0);
        self.update_bounds();
        self.reset_link_rest_lengths();
        self.update_link_constants();
        self.update_area();
        self.update_normals_and_centroids();
    }

    /// World bounds of every node
    pub const fn bounds(&self) -> Aabb {
        self.bounds
    }

    /// Radius of the sphere each node collides as
    pub const fn collision_margin(&self) -> Real {
        self.collision_margin
    }

    pub(crate) fn set_collision_margin(&mut self, margin: Real) {
        self.collision_margin = margin;
        self.update_node_tree(0.0);
        self.update_bounds();
    }

    /// Total mass spread evenly over the nodes
    pub const fn total_mass(&self) -> Real {
        self.total_mass
    }

    pub(crate) fn set_total_mass(&mut self, mass: Real) -> PhysicsResult<()> {
        ensure!(mass > 0.0, PhysicsError::precondition(format!("soft body mass must be positive, got {mass}")));
        self.total_mass = mass;
        self.update_node_masses();
        self.update_link_constants();
        Ok(())
    }

    /// Link stiffness in `(0, 1]`
    pub const fn linear_stiffness(&self) -> Real {
        self.linear_stiffness
    }

    pub(crate) fn set_linear_stiffness(&mut self, stiffness: Real) -> PhysicsResult<()> {
        ensure!(
            stiffness > 0.0 && stiffness <= 1.0,
            PhysicsError::precondition(format!("linear stiffness must be in (0, 1], got {stiffness}"))
        );
        self.linear_stiffness = stiffness;
        self.update_link_constants();
        Ok(())
    }

    /// Relaxation iterations per step
    pub const fn simulation_precision(&self) -> usize {
        self.iteration_count
    }

    pub(crate) fn set_simulation_precision(&mut self, iterations: usize) -> PhysicsResult<()> {
        ensure!(iterations > 0, PhysicsError::precondition("simulation precision must be at least 1"));
        self.iteration_count = iterations;
        Ok(())
    }

    /// Inflation pressure
    pub const fn pressure_coefficient(&self) -> Real {
        self.pressure_coefficient
    }

    pub(crate) fn set_pressure_coefficient(&mut self, pressure: Real) {
        self.pressure_coefficient = pressure;
    }

    /// Velocity damping per step
    pub const fn damping_coefficient(&self) -> Real {
        self.damping_coefficient
    }

    pub(crate) fn set_damping_coefficient(&mut self, damping: Real) {
        self.damping_coefficient = damping;
    }

    /// Aerodynamic drag; stored for callers, not simulated
    pub const fn drag_coefficient(&self) -> Real {
        self.drag_coefficient
    }

    pub(crate) fn set_drag_coefficient(&mut self, drag: Real) {
        self.drag_coefficient = drag;
    }

    fn node_of(&self, vertex: usize) -> PhysicsResult<usize> {
        self.vertex_to_node.get(vertex).copied().ok_or_else(|| {
            let err = PhysicsError::precondition(format!("soft body point {vertex} out of range 0..{}", self.vertex_to_node.len()));
            log::error!("{}", err);
            err
        })
    }

    /// Pin or release a mesh vertex. Pinned nodes have no inverse mass.
    pub(crate) fn pin_point(&mut self, vertex: usize, pin: bool) -> PhysicsResult<()> {
        self.node_of(vertex)?;
        if pin {
            self.pinned.insert(vertex);
        } else {
            self.pinned.remove(&vertex);
        }
        self.update_node_masses();
        self.update_link_constants();
        Ok(())
    }

    /// Whether a mesh vertex is pinned
    pub fn is_point_pinned(&self, vertex: usize) -> bool {
        self.pinned.contains(&vertex)
    }

    /// Teleport a mesh vertex
    pub(crate) fn move_point(&mut self, vertex: usize, position: Vec3) -> PhysicsResult<()> {
        let index = self.node_of(vertex)?;
        let node = &mut self.nodes[index];
        node.x = position;
        node.q = position;
        let (leaf, aabb) = (node.leaf, Aabb::from_center_extents(position, Vec3::repeat(self.collision_margin)));
        self.node_tree.update(leaf, aabb);
        self.update_bounds();
        Ok(())
    }

    /// World position of a mesh vertex
    pub fn point_global_position(&self, vertex: usize) -> PhysicsResult<Vec3> {
        Ok(self.nodes[self.node_of(vertex)?].x)
    }

    pub(crate) fn node_position(&self, node: usize) -> Vec3 {
        self.nodes.get(node).map_or_else(Vec3::zeros, |n| n.x)
    }

    pub(crate) fn node_velocity(&self, node: usize) -> Vec3 {
        self.nodes.get(node).map_or_else(Vec3::zeros, |n| n.v)
    }

    pub(crate) fn node_biased_velocity(&self, node: usize) -> Vec3 {
        self.nodes.get(node).map_or_else(Vec3::zeros, |n| n.bv)
    }

    pub(crate) fn node_inv_mass(&self, node: usize) -> Real {
        self.nodes.get(node).map_or(0.0, |n| n.im)
    }

    pub(crate) fn apply_node_impulse(&mut self, node: usize, impulse: &Vec3) {
        if let Some(n) = self.nodes.get_mut(node) {
            n.v += impulse * n.im;
        }
    }

    pub(crate) fn apply_node_bias_impulse(&mut self, node: usize, impulse: &Vec3) {
        if let Some(n) = self.nodes.get_mut(node) {
            n.bv += impulse * n.im;
        }
    }

    /// Nodes whose collision spheres overlap `aabb`
    pub(crate) fn nodes_in(&self, aabb: &Aabb) -> Vec<usize> {
        let mut out = Vec::new();
        self.node_tree.query_aabb(aabb, |_, index| {
            out.push(index);
            true
        });
        out.sort_unstable();
        out
    }

    /// First face hit by the segment, as `(point, normal facing the segment start)`
    pub fn intersect_segment(&self, from: &Vec3, to: &Vec3) -> Option<(Vec3, Vec3)> {
        let mut best: Option<(Real, usize)> = None;
        self.face_tree.query_segment(from, to, |_, index| {
            let [a, b, c] = self.faces[index].n.map(|i| self.nodes[i].x);
            if let Some(t) = segment_intersects_triangle(from, to, &a, &b, &c) {
                if best.map_or(true, |(bt, _)| t < bt) {
                    best = Some((t, index));
                }
            }
            true
        });
        let (t, index) = best?;
        let point = from + (to - from) * t;
        let mut normal = self.faces[index].normal;
        if normal.dot(&(to - from)) > 0.0 {
            normal = -normal;
        }
        Some((point, normal))
    }

    pub(crate) fn add_exception(&mut self, other: ObjectRid) {
        self.exceptions.insert(other);
    }

    pub(crate) fn remove_exception(&mut self, other: ObjectRid) {
        self.exceptions.remove(&other);
    }

    /// Whether `other` is excluded from colliding with this soft body
    pub fn has_exception(&self, other: ObjectRid) -> bool {
        self.exceptions.contains(&other)
    }

    /// Collision exceptions in handle order
    pub fn exceptions(&self) -> impl Iterator<Item = ObjectRid> + '_ {
        self.exceptions.iter().copied()
    }

    pub(crate) fn add_area(&mut self, area: AreaRid) {
        self.areas.add(area);
    }

    pub(crate) fn remove_area(&mut self, area: AreaRid) {
        self.areas.remove(area);
    }

    pub(crate) fn add_constraint(&mut self, constraint: ConstraintRef) {
        self.constraints.insert(constraint);
    }

    pub(crate) fn remove_constraint(&mut self, constraint: ConstraintRef) {
        self.constraints.remove(&constraint);
    }

    /// Apply gravity, pressure and wind, then advance the nodes to their
    /// predicted positions for this step
    pub(crate) fn predict_motion(&mut self, step: Real, areas: &SlotMap<AreaRid, Area>, default_area: Option<&Area>) {
        if self.nodes.is_empty() {
            return;
        }
        let center = self.bounds.center();
        let gravity = self.areas.ambient(areas, default_area, &center).gravity;
        for node in &mut self.nodes {
            if node.im > 0.0 {
                node.v += gravity * step;
            }
        }

        if self.pressure_coefficient.abs() > CMP_EPSILON {
            let volume = self.volume();
            if volume.abs() > CMP_EPSILON {
                let ivolumetp = self.pressure_coefficient / volume.abs();
                for node in &mut self.nodes {
                    if node.im > 0.0 {
                        node.f += node.n * (node.area * ivolumetp);
                    }
                }
            }
        }

        let wind: Vec<&Area> = self.areas.sorted(areas).into_iter().filter(|a| a.wind_force_magnitude() > 0.0).collect();
        if !wind.is_empty() {
            for face in &self.faces {
                let force: Vec3 = wind.iter().map(|area| wind_force(area, face)).sum();
                for &i in &face.n {
                    self.nodes[i].f += force;
                }
            }
        }

        for node in &mut self.nodes {
            node.q = node.x;
            node.v += node.f * (node.im * step);
            let mut displacement = node.v * step;
            let len = displacement.norm();
            if len > MAX_DISPLACEMENT {
                displacement *= MAX_DISPLACEMENT / len;
                node.v = displacement / step;
            }
            node.x += displacement;
            node.f = Vec3::zeros();
        }

        self.update_bounds();
        self.update_node_tree(step);
        self.update_face_tree(step);
    }

    /// Relax the links and derive the new velocities from the corrected positions
    pub(crate) fn solve_constraints(&mut self, step: Real) {
        if self.nodes.is_empty() {
            return;
        }
        for node in &mut self.nodes {
            node.x = node.q + node.v * step;
        }
        for _ in 0..self.iteration_count {
            self.solve_links();
        }
        let vc = (1.0 - self.damping_coefficient) / step;
        for node in &mut self.nodes {
            node.x += node.bv * step;
            node.bv = Vec3::zeros();
            node.v = (node.x - node.q) * vc;
            node.q = node.x;
        }
        self.update_normals_and_centroids();
        self.update_bounds();
        self.update_node_tree(0.0);
        self.update_face_tree(0.0);
    }

    fn solve_links(&mut self) {
        for link in &self.links {
            if link.c0 <= 0.0 {
                continue;
            }
            let [ia, ib] = link.n;
            let del = self.nodes[ib].x - self.nodes[ia].x;
            let len = del.norm_squared();
            if link.c1 + len <= CMP_EPSILON {
                continue;
            }
            let k = (link.c1 - len) / (link.c0 * (link.c1 + len));
            let ima = self.nodes[ia].im;
            let imb = self.nodes[ib].im;
            self.nodes[ia].x -= del * (k * ima);
            self.nodes[ib].x += del * (k * imb);
        }
    }

    /// Signed volume enclosed by the faces
    pub fn volume(&self) -> Real {
        let Some(origin) = self.nodes.first().map(|n| n.x) else {
            return 0.0;
        };
        let six_volume: Real = self
            .faces
            .iter()
            .map(|f| {
                let [a, b, c] = f.n.map(|i| self.nodes[i].x - origin);
                a.dot(&b.cross(&c))
            })
            .sum();
        six_volume / 6.0
    }

    fn update_node_masses(&mut self) {
        #[allow(clippy::cast_precision_loss)]
        let im = if self.nodes.is_empty() { 0.0 } else { self.nodes.len() as Real / self.total_mass };
        for node in &mut self.nodes {
            node.im = im;
        }
        for vertex in &self.pinned {
            if let Some(&index) = self.vertex_to_node.get(*vertex) {
                self.nodes[index].im = 0.0;
            }
        }
    }

    fn reset_link_rest_lengths(&mut self) {
        for link in &mut self.links {
            link.rl = (self.nodes[link.n[0]].x - self.nodes[link.n[1]].x).norm();
            link.c1 = link.rl * link.rl;
        }
    }

    fn update_link_constants(&mut self) {
        let inv_stiffness = 1.0 / self.linear_stiffness;
        for link in &mut self.links {
            link.c0 = (self.nodes[link.n[0]].im + self.nodes[link.n[1]].im) * inv_stiffness;
        }
    }

    fn update_area(&mut self) {
        let mut counts = vec![0_u32; self.nodes.len()];
        for node in &mut self.nodes {
            node.area = 0.0;
        }
        for face in &mut self.faces {
            let [a, b, c] = face.n.map(|i| self.nodes[i].x);
            face.ra = (b - a).cross(&(c - a)).norm() * 0.5;
            for &i in &face.n {
                counts[i] += 1;
                self.nodes[i].area += face.ra.abs();
            }
        }
        for (node, count) in self.nodes.iter_mut().zip(counts) {
            if count > 0 {
                node.area /= Real::from(u16::try_from(count).unwrap_or(u16::MAX));
            }
        }
    }

    fn update_normals_and_centroids(&mut self) {
        for node in &mut self.nodes {
            node.n = Vec3::zeros();
        }
        for face in &mut self.faces {
            let [a, b, c] = face.n.map(|i| self.nodes[i].x);
            let n = (b - a).cross(&(c - a));
            let len = n.norm();
            face.normal = if len > CMP_EPSILON { n / len } else { Vec3::zeros() };
            face.centroid = (a + b + c) / 3.0;
            for &i in &face.n {
                self.nodes[i].n += n;
            }
        }
        for node in &mut self.nodes {
            let len = node.n.norm();
            if len > CMP_EPSILON {
                node.n /= len;
            }
        }
    }

    fn update_bounds(&mut self) {
        self.bounds = Aabb::from_points(self.nodes.iter().map(|n| &n.x)).grow(self.collision_margin);
    }

    fn update_node_tree(&mut self, step: Real) {
        for node in &self.nodes {
            let mut aabb = Aabb::new(node.x, node.x);
            aabb.expand_to(&(node.x + node.v * step));
            self.node_tree.update(node.leaf, aabb.grow(self.collision_margin));
        }
    }

    fn update_face_tree(&mut self, step: Real) {
        for face in &self.faces {
            let mut aabb = Aabb::from_points(face.n.iter().map(|&i| &self.nodes[i].x));
            for &i in &face.n {
                let node = &self.nodes[i];
                aabb.expand_to(&(node.x + node.v * step));
            }
            self.face_tree.update(face.leaf, aabb);
        }
    }
}

fn wind_force(area: &Area, face: &Face) -> Vec3 {
    let wd = area.wind_direction();
    let waf = area.wind_attenuation_factor();
    let on_normal = face.normal.dot(&wd);
    let toward_centroid = (face.centroid - area.wind_source()).dot(&wd);
    let attenuation = if waf == 0.0 {
        1.0
    } else if toward_centroid > CMP_EPSILON {
        toward_centroid.powf(-waf)
    } else {
        return Vec3::zeros();
    };
    face.normal * (area.wind_force_magnitude() / 3.0 * face.ra * on_normal * attenuation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::translation;
    use crate::object::AreaParameter;
    use crate::param::ParamValue;
    use approx::assert_relative_eq;

    fn quad() -> (Vec<Vec3>, Vec<usize>) {
        let vertices = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 1.0),
            Vec3::new(0.0, 0.0, 1.0),
            // Duplicate of vertex 0, merged into the same node
            Vec3::new(0.0, 0.0, 0.0),
        ];
        let indices = vec![0, 2, 1, 4, 3, 2];
        (vertices, indices)
    }

    fn soft_body() -> SoftBody {
        let mut keys: SlotMap<SoftBodyRid, ()> = SlotMap::with_key();
        let mut body = SoftBody::new(keys.insert(()));
        let (vertices, indices) = quad();
        body.set_mesh(&vertices, &indices).unwrap();
        body
    }

    #[test]
    fn test_mesh_topology() {
        let body = soft_body();
        assert_eq!(body.node_count(), 4);
        assert_eq!(body.face_count(), 2);
        // Four edges plus the shared diagonal
        assert_eq!(body.link_count(), 5);
        assert_relative_eq!(body.nodes[0].im, 4.0);
    }

    #[test]
    fn test_bad_indices_rejected() {
        let mut keys: SlotMap<SoftBodyRid, ()> = SlotMap::with_key();
        let mut body = SoftBody::new(keys.insert(()));
        assert!(body.set_mesh(&[Vec3::zeros()], &[0, 0]).is_err());
        assert!(body.set_mesh(&[Vec3::zeros()], &[0, 0, 3]).is_err());
    }

    #[test]
    fn test_pinned_point_stays_put() {
        let mut body = soft_body();
        body.pin_point(0, true).unwrap();
        assert!(body.is_point_pinned(0));
        let areas = SlotMap::with_key();
        let mut gravity = Area::new(AreaRid::default());
        gravity.set_param(AreaParameter::Gravity, ParamValue::Real(10.0)).unwrap();
        for _ in 0..10 {
            body.predict_motion(1.0 / 60.0, &areas, Some(&gravity));
            body.solve_constraints(1.0 / 60.0);
        }
        assert_relative_eq!(body.point_global_position(0).unwrap(), Vec3::zeros(), epsilon = 1e-6);
        assert_relative_eq!(body.point_global_position(4).unwrap(), Vec3::zeros(), epsilon = 1e-6);
        assert!(body.point_global_position(2).unwrap().y < -0.01);
    }

    #[test]
    fn test_stretched_link_relaxes() {
        let mut body = soft_body();
        let stretched = Vec3::new(1.5, 0.0, 1.5);
        body.move_point(2, stretched).unwrap();
        let areas = SlotMap::with_key();
        body.predict_motion(1.0 / 60.0, &areas, None);
        body.solve_constraints(1.0 / 60.0);
        let a = body.point_global_position(1).unwrap();
        let b = body.point_global_position(2).unwrap();
        let len = (a - b).norm();
        assert!(len < (stretched - Vec3::x()).norm());
        assert!(len > 0.5);
    }

    #[test]
    fn test_transform_places_nodes() {
        let mut body = soft_body();
        body.set_transform(translation(Vec3::new(0.0, 5.0, 0.0)));
        assert_relative_eq!(body.point_global_position(2).unwrap(), Vec3::new(1.0, 5.0, 1.0));
        assert_relative_eq!(body.bounds().min.y, 5.0 - body.collision_margin(), epsilon = 1e-6);
        assert_eq!(body.nodes_in(&Aabb::from_center_extents(Vec3::new(1.0, 5.0, 1.0), Vec3::repeat(0.1))), vec![2]);
    }

    #[test]
    fn test_ray_hits_face() {
        let body = soft_body();
        let (point, normal) = body.intersect_segment(&Vec3::new(0.25, 1.0, 0.5), &Vec3::new(0.25, -1.0, 0.5)).unwrap();
        assert_relative_eq!(point, Vec3::new(0.25, 0.0, 0.5), epsilon = 1e-5);
        assert_relative_eq!(normal, Vec3::y(), epsilon = 1e-5);
    }

    #[test]
    fn test_invalid_mass_rejected() {
        let mut body = soft_body();
        assert!(body.set_total_mass(0.0).is_err());
        body.set_total_mass(2.0).unwrap();
        assert_relative_eq!(body.nodes[1].im, 2.0);
    }
}
