//! The per-frame simulation step
//!
//! GEA 13.4.4 ("The Simulation Loop"): integrate forces, group everything
//! that touches into islands, solve each island with sequential impulses,
//! integrate velocities, then put islands that stopped moving to sleep.

use std::collections::BTreeSet;

use slotmap::SlotMap;

use super::Space;
use crate::collision::Shape;
use crate::constraint::{ConstraintRef, Joint, Pair, PairId, Solve, SolverContext};
use crate::foundation::math::{Real, Vec3};
use crate::object::{BodyMode, Objects};
use crate::rid::{BodyRid, JointRid, ObjectRid, ShapeRid, SoftBodyRid};

/// Island member still to be expanded
#[derive(Debug, Clone, Copy)]
enum Member {
    Body(BodyRid),
    SoftBody(SoftBodyRid),
}

/// Constraints and dynamic bodies connected through contacts and joints
#[derive(Debug, Default)]
struct Island {
    bodies: Vec<BodyRid>,
    constraints: Vec<ConstraintRef>,
}

fn solver<'c>(pairs: &'c mut SlotMap<PairId, Pair>, joints: &'c mut SlotMap<JointRid, Joint>, constraint: ConstraintRef) -> Option<&'c mut dyn Solve> {
    match constraint {
        ConstraintRef::Pair(id) => pairs.get_mut(id).map(|p| p as &mut dyn Solve),
        ConstraintRef::Joint(id) => joints.get_mut(id).map(|j| j as &mut dyn Solve),
    }
}

impl Space {
    /// Advance the space by `step` seconds
    pub(crate) fn step(&mut self, step: Real, objects: &mut Objects, shapes: &SlotMap<ShapeRid, Shape>, joints: &mut SlotMap<JointRid, Joint>) {
        self.locked = true;
        self.last_step = step;
        self.step_stamp += 1;
        let stamp = self.step_stamp;

        self.setup(objects, shapes);

        let active: Vec<BodyRid> = self.queues.active_bodies.iter().copied().collect();
        for &rid in &active {
            let default_area = self.default_area.and_then(|a| objects.areas.get(a));
            let Some(body) = objects.bodies.get_mut(rid) else {
                continue;
            };
            if let Some(motion) = body.integrate_forces(step, &objects.areas, default_area) {
                self.sync_proxies(ObjectRid::Body(rid), objects, shapes, &motion);
            }
        }

        let active_soft: Vec<SoftBodyRid> = self.queues.active_soft_bodies.iter().copied().collect();
        for &rid in &active_soft {
            let default_area = self.default_area.and_then(|a| objects.areas.get(a));
            if let Some(soft_body) = objects.soft_bodies.get_mut(rid) {
                soft_body.predict_motion(step, &objects.areas, default_area);
            }
            self.sync_proxies(ObjectRid::SoftBody(rid), objects, shapes, &Vec3::zeros());
        }
        self.active_objects = active.len() + active_soft.len();

        let islands = self.build_islands(stamp, &active, &active_soft, objects, joints);
        self.island_count = islands.iter().filter(|i| !i.constraints.is_empty()).count();

        {
            let Self { pairs, queues, params, .. } = &mut *self;
            let mut ctx = SolverContext { objects: &mut *objects, shapes, queues, params, step };

            for constraint in islands.iter().flat_map(|i| i.constraints.iter()) {
                if let Some(c) = solver(pairs, joints, *constraint) {
                    c.setup(&mut ctx);
                }
            }

            let mut solve_lists: Vec<Vec<ConstraintRef>> = Vec::with_capacity(islands.len());
            for island in &islands {
                let mut kept = Vec::with_capacity(island.constraints.len());
                for &constraint in &island.constraints {
                    if solver(pairs, joints, constraint).is_some_and(|c| c.pre_solve(&mut ctx)) {
                        kept.push(constraint);
                    }
                }
                solve_lists.push(kept);
            }

            let iterations = ctx.params.solver_iterations;
            for mut list in solve_lists {
                let mut current_priority = 1;
                while !list.is_empty() {
                    for _ in 0..iterations {
                        for &constraint in &list {
                            if let Some(c) = solver(pairs, joints, constraint) {
                                c.solve(&mut ctx);
                            }
                        }
                    }
                    current_priority += 1;
                    list.retain(|&constraint| solver(pairs, joints, constraint).is_some_and(|c| c.priority() >= current_priority));
                }
            }
        }

        for &rid in &active {
            let refresh = objects.bodies.get_mut(rid).is_some_and(|body| body.integrate_velocities(step, &mut self.queues));
            if refresh {
                self.sync_proxies(ObjectRid::Body(rid), objects, shapes, &Vec3::zeros());
            }
        }

        for island in &islands {
            self.check_suspend(island, step, objects);
        }

        for &rid in &active_soft {
            if let Some(soft_body) = objects.soft_bodies.get_mut(rid) {
                soft_body.solve_constraints(step);
            }
            self.sync_proxies(ObjectRid::SoftBody(rid), objects, shapes, &Vec3::zeros());
        }

        self.update(objects);
        self.locked = false;
    }

    /// Group constraints reachable from active bodies into islands. Moved
    /// areas contribute one island per constraint.
    fn build_islands(
        &mut self,
        stamp: u64,
        active: &[BodyRid],
        active_soft: &[SoftBodyRid],
        objects: &mut Objects,
        joints: &SlotMap<JointRid, Joint>,
    ) -> Vec<Island> {
        let mut visited = BTreeSet::new();
        let mut islands = Vec::new();

        for &rid in active {
            let Some(body) = objects.bodies.get_mut(rid) else {
                continue;
            };
            if body.island_step == stamp {
                continue;
            }
            body.island_step = stamp;
            let mut island = Island::default();
            if body.mode().is_dynamic() {
                island.bodies.push(rid);
            }
            self.populate_island(Member::Body(rid), stamp, objects, joints, &mut visited, &mut island);
            if !island.bodies.is_empty() || !island.constraints.is_empty() {
                islands.push(island);
            }
        }

        for rid in self.queues.moved_areas.take() {
            let Some(area) = objects.areas.get(rid) else {
                continue;
            };
            for constraint in area.constraints() {
                if visited.insert(constraint) {
                    islands.push(Island { bodies: Vec::new(), constraints: vec![constraint] });
                }
            }
        }

        for &rid in active_soft {
            let Some(soft_body) = objects.soft_bodies.get_mut(rid) else {
                continue;
            };
            if soft_body.island_step == stamp {
                continue;
            }
            soft_body.island_step = stamp;
            let mut island = Island::default();
            self.populate_island(Member::SoftBody(rid), stamp, objects, joints, &mut visited, &mut island);
            if !island.bodies.is_empty() || !island.constraints.is_empty() {
                islands.push(island);
            }
        }
        islands
    }

    /// Depth-first walk over constraints. Static bodies end the walk so they
    /// never merge islands.
    fn populate_island(
        &self,
        start: Member,
        stamp: u64,
        objects: &mut Objects,
        joints: &SlotMap<JointRid, Joint>,
        visited: &mut BTreeSet<ConstraintRef>,
        island: &mut Island,
    ) {
        let mut stack = vec![start];
        while let Some(member) = stack.pop() {
            let constraints: Vec<ConstraintRef> = match member {
                Member::Body(rid) => objects.bodies.get(rid).map(|b| b.constraints().map(|(c, _)| c).collect()),
                Member::SoftBody(rid) => objects.soft_bodies.get(rid).map(|s| s.constraints.iter().copied().collect()),
            }
            .unwrap_or_default();

            for constraint in constraints {
                if !visited.insert(constraint) {
                    continue;
                }
                island.constraints.push(constraint);
                let (bodies, soft_body) = match constraint {
                    ConstraintRef::Pair(id) => match self.pairs.get(id) {
                        Some(pair) => (pair.bodies(), pair.soft_body()),
                        None => continue,
                    },
                    ConstraintRef::Joint(id) => match joints.get(id) {
                        Some(joint) => (joint.bodies(), None),
                        None => continue,
                    },
                };
                for rid in bodies {
                    let Some(body) = objects.bodies.get_mut(rid) else {
                        continue;
                    };
                    if body.island_step == stamp || body.mode() == BodyMode::Static {
                        continue;
                    }
                    body.island_step = stamp;
                    if body.mode().is_dynamic() {
                        island.bodies.push(rid);
                    }
                    stack.push(Member::Body(rid));
                }
                let Some(rid) = soft_body else {
                    continue;
                };
                if let Some(soft_body) = objects.soft_bodies.get_mut(rid) {
                    if soft_body.island_step != stamp {
                        soft_body.island_step = stamp;
                        stack.push(Member::SoftBody(rid));
                    }
                }
            }
        }
    }

    /// Put an island to sleep once every body in it has been still long
    /// enough, or wake all of it otherwise
    fn check_suspend(&mut self, island: &Island, step: Real, objects: &mut Objects) {
        let p = &self.params;
        let mut can_sleep = true;
        for &rid in &island.bodies {
            if let Some(body) = objects.bodies.get_mut(rid) {
                if !body.sleep_test(step, p.sleep_threshold_linear, p.sleep_threshold_angular, p.time_to_sleep) {
                    can_sleep = false;
                }
            }
        }
        for &rid in &island.bodies {
            if let Some(body) = objects.bodies.get_mut(rid) {
                if body.is_active() == can_sleep {
                    body.set_active(!can_sleep, Some(&mut self.queues));
                }
            }
        }
    }
}
