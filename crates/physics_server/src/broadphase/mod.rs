//! Broad-phase collision detection
//!
//! Based on Game Engine Architecture 3rd Edition, Section 13.3.2:
//! "Spatial partitioning schemes... allow us to quickly cull out pairs of
//! objects that cannot possibly be colliding."
//!
//! Every enabled shape of every collision object in a space is registered as
//! one proxy. `update()` reports each transition between "AABBs apart" and
//! "AABBs overlapping" exactly once as a [`PairEvent`]; the space turns those
//! events into pair constraints.

pub mod bvh;

use std::collections::BTreeSet;

use slotmap::{new_key_type, SecondaryMap, SlotMap};

pub use bvh::{BvhHandle, DynamicBvh};

use crate::foundation::math::{Aabb, Vec3};
use crate::rid::ObjectRid;

/// Maximum number of results returned by a single cull query
pub const INTERSECTION_QUERY_MAX: usize = 2048;

new_key_type! {
    /// Handle to a broadphase proxy
    pub struct ProxyId;
}

/// Broadphase pairing transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairEvent {
    /// The two proxies started overlapping
    Pair(ProxyId, ProxyId),
    /// The two proxies stopped overlapping (or one was removed)
    Unpair(ProxyId, ProxyId),
}

/// Registered proxy data
#[derive(Debug, Clone, Copy)]
pub struct Proxy {
    /// Owning collision object
    pub owner: ObjectRid,
    /// Shape index inside the owner
    pub subindex: usize,
    /// Current bounds
    pub aabb: Aabb,
    /// Static proxies never pair with other static proxies
    pub is_static: bool,
    leaf: BvhHandle,
}

/// Abstract interface for broad-phase structures
///
/// GEA 13.3.2: "The broad phase quickly identifies pairs of objects that might
/// be colliding using some kind of spatial partitioning scheme."
pub trait BroadPhase: Send + Sync {
    /// Register a proxy
    fn create(&mut self, owner: ObjectRid, subindex: usize, aabb: Aabb, is_static: bool) -> ProxyId;

    /// Change a proxy's bounds
    fn move_proxy(&mut self, id: ProxyId, aabb: Aabb);

    /// Change whether the proxy is static
    fn set_static(&mut self, id: ProxyId, is_static: bool);

    /// Remove a proxy, returning the unpair events for every pair it was part of
    fn remove(&mut self, id: ProxyId) -> Vec<PairEvent>;

    /// Process moved proxies and return pairing transitions in a stable order
    fn update(&mut self) -> Vec<PairEvent>;

    /// Proxy data
    fn proxy(&self, id: ProxyId) -> Option<&Proxy>;

    /// Currently paired proxies of one proxy
    fn pairs_of(&self, id: ProxyId) -> Vec<ProxyId>;

    /// Objects whose shape bounds contain `point`
    fn cull_point(&self, point: &Vec3, max: usize) -> Vec<(ObjectRid, usize)>;

    /// Objects whose shape bounds the segment crosses
    fn cull_segment(&self, from: &Vec3, to: &Vec3, max: usize) -> Vec<(ObjectRid, usize)>;

    /// Objects whose shape bounds overlap `aabb`
    fn cull_aabb(&self, aabb: &Aabb, max: usize) -> Vec<(ObjectRid, usize)>;

    /// Number of registered proxies
    fn proxy_count(&self) -> usize;

    /// Number of overlapping proxy pairs
    fn pair_count(&self) -> usize;
}

/// [`BroadPhase`] backed by a [`DynamicBvh`]
#[derive(Debug, Default)]
pub struct BvhBroadPhase {
    proxies: SlotMap<ProxyId, Proxy>,
    tree: DynamicBvh<ProxyId>,
    moved: BTreeSet<ProxyId>,
    pairs: BTreeSet<(ProxyId, ProxyId)>,
    proxy_pairs: SecondaryMap<ProxyId, BTreeSet<ProxyId>>,
}

fn ordered(a: ProxyId, b: ProxyId) -> (ProxyId, ProxyId) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

impl BvhBroadPhase {
    /// Create an empty broadphase
    pub fn new() -> Self {
        Self::default()
    }

    fn can_pair(&self, a: &Proxy, b: &Proxy) -> bool {
        a.owner != b.owner && !(a.is_static && b.is_static)
    }

    fn link(&mut self, a: ProxyId, b: ProxyId) -> bool {
        if !self.pairs.insert(ordered(a, b)) {
            return false;
        }
        if let Some(set) = self.proxy_pairs.get_mut(a) {
            set.insert(b);
        }
        if let Some(set) = self.proxy_pairs.get_mut(b) {
            set.insert(a);
        }
        true
    }

    fn unlink(&mut self, a: ProxyId, b: ProxyId) -> bool {
        if !self.pairs.remove(&ordered(a, b)) {
            return false;
        }
        if let Some(set) = self.proxy_pairs.get_mut(a) {
            set.remove(&b);
        }
        if let Some(set) = self.proxy_pairs.get_mut(b) {
            set.remove(&a);
        }
        true
    }

    fn cull(&self, mut query: impl FnMut(&mut dyn FnMut(BvhHandle, ProxyId) -> bool), max: usize) -> Vec<(ObjectRid, usize)> {
        let mut out = Vec::new();
        query(&mut |_, id| {
            if out.len() >= max {
                return false;
            }
            if let Some(p) = self.proxies.get(id) {
                out.push((p.owner, p.subindex));
            }
            out.len() < max
        });
        out
    }
}

impl BroadPhase for BvhBroadPhase {
    fn create(&mut self, owner: ObjectRid, subindex: usize, aabb: Aabb, is_static: bool) -> ProxyId {
        let id = self.proxies.insert(Proxy {
            owner,
            subindex,
            aabb,
            is_static,
            leaf: BvhHandle::default(),
        });
        let leaf = self.tree.insert(aabb, id);
        if let Some(p) = self.proxies.get_mut(id) {
            p.leaf = leaf;
        }
        self.proxy_pairs.insert(id, BTreeSet::new());
        self.moved.insert(id);
        id
    }

    fn move_proxy(&mut self, id: ProxyId, aabb: Aabb) {
        let Some(proxy) = self.proxies.get_mut(id) else {
            return;
        };
        if proxy.aabb == aabb {
            return;
        }
        proxy.aabb = aabb;
        let leaf = proxy.leaf;
        self.tree.update(leaf, aabb);
        self.moved.insert(id);
    }

    fn set_static(&mut self, id: ProxyId, is_static: bool) {
        if let Some(proxy) = self.proxies.get_mut(id) {
            if proxy.is_static != is_static {
                proxy.is_static = is_static;
                self.moved.insert(id);
            }
        }
    }

    fn remove(&mut self, id: ProxyId) -> Vec<PairEvent> {
        let Some(proxy) = self.proxies.remove(id) else {
            return Vec::new();
        };
        self.tree.remove(proxy.leaf);
        self.moved.remove(&id);
        let partners = self.proxy_pairs.remove(id).unwrap_or_default();
        let mut events = Vec::with_capacity(partners.len());
        for other in partners {
            self.pairs.remove(&ordered(id, other));
            if let Some(set) = self.proxy_pairs.get_mut(other) {
                set.remove(&id);
            }
            let (a, b) = ordered(id, other);
            events.push(PairEvent::Unpair(a, b));
        }
        events
    }

    fn update(&mut self) -> Vec<PairEvent> {
        let mut events = Vec::new();
        let moved = std::mem::take(&mut self.moved);
        for id in moved {
            let Some(proxy) = self.proxies.get(id).copied() else {
                continue;
            };

            let mut overlapping = BTreeSet::new();
            self.tree.query_aabb(&proxy.aabb, |_, other| {
                if other != id {
                    overlapping.insert(other);
                }
                true
            });
            overlapping.retain(|other| self.proxies.get(*other).is_some_and(|p| self.can_pair(&proxy, p)));

            let current: Vec<ProxyId> = self.proxy_pairs.get(id).map(|s| s.iter().copied().collect()).unwrap_or_default();
            for other in current {
                if !overlapping.contains(&other) && self.unlink(id, other) {
                    let (a, b) = ordered(id, other);
                    events.push(PairEvent::Unpair(a, b));
                }
            }
            for other in overlapping {
                if self.link(id, other) {
                    let (a, b) = ordered(id, other);
                    events.push(PairEvent::Pair(a, b));
                }
            }
        }
        events
    }

    fn proxy(&self, id: ProxyId) -> Option<&Proxy> {
        self.proxies.get(id)
    }

    fn pairs_of(&self, id: ProxyId) -> Vec<ProxyId> {
        self.proxy_pairs.get(id).map(|s| s.iter().copied().collect()).unwrap_or_default()
    }

    fn cull_point(&self, point: &Vec3, max: usize) -> Vec<(ObjectRid, usize)> {
        self.cull(|visit| self.tree.query_point(point, |h, id| visit(h, id)), max)
    }

    fn cull_segment(&self, from: &Vec3, to: &Vec3, max: usize) -> Vec<(ObjectRid, usize)> {
        self.cull(|visit| self.tree.query_segment(from, to, |h, id| visit(h, id)), max)
    }

    fn cull_aabb(&self, aabb: &Aabb, max: usize) -> Vec<(ObjectRid, usize)> {
        self.cull(|visit| self.tree.query_aabb(aabb, |h, id| visit(h, id)), max)
    }

    fn proxy_count(&self) -> usize {
        self.proxies.len()
    }

    fn pair_count(&self) -> usize {
        self.pairs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rid::BodyRid;

    fn bodies(n: usize) -> Vec<ObjectRid> {
        let mut map: SlotMap<BodyRid, ()> = SlotMap::with_key();
        (0..n).map(|_| ObjectRid::Body(map.insert(()))).collect()
    }

    fn box_at(x: f32) -> Aabb {
        Aabb::from_center_extents(Vec3::new(x, 0.0, 0.0), Vec3::repeat(0.5))
    }

    #[test]
    fn test_pair_and_unpair_once() {
        let owners = bodies(2);
        let mut bp = BvhBroadPhase::new();
        let a = bp.create(owners[0], 0, box_at(0.0), false);
        let b = bp.create(owners[1], 0, box_at(5.0), false);
        assert!(bp.update().is_empty());

        bp.move_proxy(a, box_at(4.5));
        let events = bp.update();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], PairEvent::Pair(..)));

        // Moving while still overlapping reports nothing new.
        bp.move_proxy(a, box_at(4.6));
        bp.move_proxy(b, box_at(5.1));
        assert!(bp.update().is_empty());
        assert_eq!(bp.pair_count(), 1);

        bp.move_proxy(a, box_at(-10.0));
        let events = bp.update();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], PairEvent::Unpair(..)));
        assert_eq!(bp.pair_count(), 0);
    }

    #[test]
    fn test_static_pairs_skipped() {
        let owners = bodies(3);
        let mut bp = BvhBroadPhase::new();
        bp.create(owners[0], 0, box_at(0.0), true);
        bp.create(owners[1], 0, box_at(0.2), true);
        bp.create(owners[2], 0, box_at(0.4), false);
        let events = bp.update();
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn test_same_owner_never_pairs() {
        let owners = bodies(1);
        let mut bp = BvhBroadPhase::new();
        bp.create(owners[0], 0, box_at(0.0), false);
        bp.create(owners[0], 1, box_at(0.1), false);
        assert!(bp.update().is_empty());
    }

    #[test]
    fn test_remove_reports_unpair() {
        let owners = bodies(2);
        let mut bp = BvhBroadPhase::new();
        let a = bp.create(owners[0], 0, box_at(0.0), false);
        bp.create(owners[1], 0, box_at(0.3), false);
        assert_eq!(bp.update().len(), 1);
        let events = bp.remove(a);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], PairEvent::Unpair(..)));
        assert_eq!(bp.proxy_count(), 1);
        assert!(bp.update().is_empty());
    }

    #[test]
    fn test_cull_limit() {
        let owners = bodies(10);
        let mut bp = BvhBroadPhase::new();
        for (i, owner) in owners.iter().enumerate() {
            bp.create(*owner, 0, box_at(i as f32 * 0.01), false);
        }
        assert_eq!(bp.cull_aabb(&box_at(0.0), 4).len(), 4);
        assert_eq!(bp.cull_point(&Vec3::new(0.05, 0.0, 0.0), INTERSECTION_QUERY_MAX).len(), 10);
        assert!(bp.cull_segment(&Vec3::new(0.0, 5.0, 0.0), &Vec3::new(1.0, 5.0, 0.0), 16).is_empty());
    }
}
