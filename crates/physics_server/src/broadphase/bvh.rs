//! Dynamic bounding volume hierarchy
//!
//! Binary AABB tree with incremental insert, remove and refit. Leaves keep
//! their node index for their whole lifetime, so a [`BvhHandle`] stays valid
//! until the leaf is removed. The same tree backs the space broadphase, the
//! concave mesh triangle index and the soft body node and face trees.
//!
//! Insertion picks the sibling that minimizes the increase in summed surface
//! area (GEA 13.3.2 "bounding volume hierarchies").

use crate::foundation::math::{Aabb, Vec3};

/// Stable handle to a leaf
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BvhHandle(usize);

#[derive(Debug, Clone)]
enum NodeKind<T> {
    Leaf(T),
    Branch([usize; 2]),
    Free,
}

#[derive(Debug, Clone)]
struct Node<T> {
    aabb: Aabb,
    parent: Option<usize>,
    kind: NodeKind<T>,
}

/// Dynamic AABB tree storing a copyable payload per leaf
#[derive(Debug, Clone)]
pub struct DynamicBvh<T> {
    nodes: Vec<Node<T>>,
    free_list: Vec<usize>,
    root: Option<usize>,
    leaf_count: usize,
}

impl<T: Copy> Default for DynamicBvh<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy> DynamicBvh<T> {
    /// Create an empty tree
    pub const fn new() -> Self {
        Self { nodes: Vec::new(), free_list: Vec::new(), root: None, leaf_count: 0 }
    }

    /// Number of leaves
    pub const fn len(&self) -> usize {
        self.leaf_count
    }

    /// Whether the tree has no leaves
    pub const fn is_empty(&self) -> bool {
        self.leaf_count == 0
    }

    /// Remove every leaf
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.free_list.clear();
        self.root = None;
        self.leaf_count = 0;
    }

    /// Bounds of the whole tree
    pub fn root_aabb(&self) -> Option<Aabb> {
        self.root.map(|r| self.nodes[r].aabb)
    }

    /// Insert a leaf
    pub fn insert(&mut self, aabb: Aabb, item: T) -> BvhHandle {
        let leaf = self.allocate(Node { aabb, parent: None, kind: NodeKind::Leaf(item) });
        self.insert_leaf(leaf);
        self.leaf_count += 1;
        BvhHandle(leaf)
    }

    /// Remove a leaf, returning its payload
    pub fn remove(&mut self, handle: BvhHandle) -> Option<T> {
        let item = self.get(handle)?;
        self.remove_leaf(handle.0);
        self.nodes[handle.0].kind = NodeKind::Free;
        self.free_list.push(handle.0);
        self.leaf_count -= 1;
        Some(item)
    }

    /// Change a leaf's bounds. Returns false when the handle is stale.
    pub fn update(&mut self, handle: BvhHandle, aabb: Aabb) -> bool {
        if self.get(handle).is_none() {
            return false;
        }
        if self.nodes[handle.0].aabb == aabb {
            return true;
        }
        self.remove_leaf(handle.0);
        self.nodes[handle.0].aabb = aabb;
        self.insert_leaf(handle.0);
        true
    }

    /// Payload of a leaf
    pub fn get(&self, handle: BvhHandle) -> Option<T> {
        match self.nodes.get(handle.0).map(|n| &n.kind) {
            Some(NodeKind::Leaf(item)) => Some(*item),
            _ => None,
        }
    }

    /// Bounds of a leaf
    pub fn aabb(&self, handle: BvhHandle) -> Option<Aabb> {
        self.get(handle).map(|_| self.nodes[handle.0].aabb)
    }

    /// Visit every leaf overlapping `aabb` (touching counts). The visitor returns
    /// `false` to stop the traversal.
    pub fn query_aabb(&self, aabb: &Aabb, mut visit: impl FnMut(BvhHandle, T) -> bool) {
        self.traverse(|node_aabb| node_aabb.intersects_inclusive(aabb), &mut visit);
    }

    /// Visit every leaf containing `point`
    pub fn query_point(&self, point: &Vec3, mut visit: impl FnMut(BvhHandle, T) -> bool) {
        self.traverse(|node_aabb| node_aabb.contains_point(point), &mut visit);
    }

    /// Visit every leaf whose bounds the segment crosses
    pub fn query_segment(&self, from: &Vec3, to: &Vec3, mut visit: impl FnMut(BvhHandle, T) -> bool) {
        self.traverse(|node_aabb| node_aabb.intersects_segment(from, to), &mut visit);
    }

    fn traverse(&self, test: impl Fn(&Aabb) -> bool, visit: &mut impl FnMut(BvhHandle, T) -> bool) {
        let Some(root) = self.root else {
            return;
        };
        let mut stack = vec![root];
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index];
            if !test(&node.aabb) {
                continue;
            }
            match node.kind {
                NodeKind::Leaf(item) => {
                    if !visit(BvhHandle(index), item) {
                        return;
                    }
                }
                // Push the right child first so the left subtree is visited first.
                NodeKind::Branch([left, right]) => {
                    stack.push(right);
                    stack.push(left);
                }
                NodeKind::Free => {}
            }
        }
    }

    fn allocate(&mut self, node: Node<T>) -> usize {
        if let Some(index) = self.free_list.pop() {
            self.nodes[index] = node;
            index
        } else {
            self.nodes.push(node);
            self.nodes.len() - 1
        }
    }

    fn release(&mut self, index: usize) {
        self.nodes[index].kind = NodeKind::Free;
        self.nodes[index].parent = None;
        self.free_list.push(index);
    }

    fn children(&self, index: usize) -> Option<[usize; 2]> {
        match self.nodes[index].kind {
            NodeKind::Branch(children) => Some(children),
            _ => None,
        }
    }

    fn insert_leaf(&mut self, leaf: usize) {
        let Some(root) = self.root else {
            self.root = Some(leaf);
            self.nodes[leaf].parent = None;
            return;
        };

        let leaf_aabb = self.nodes[leaf].aabb;
        let mut index = root;
        while let Some([left, right]) = self.children(index) {
            let area = self.nodes[index].aabb.half_perimeter();
            let combined = self.nodes[index].aabb.merge(&leaf_aabb).half_perimeter();
            let cost = 2.0 * combined;
            let inheritance = 2.0 * (combined - area);

            let child_cost = |child: usize| {
                let merged = self.nodes[child].aabb.merge(&leaf_aabb).half_perimeter();
                if self.children(child).is_some() {
                    merged - self.nodes[child].aabb.half_perimeter() + inheritance
                } else {
                    merged + inheritance
                }
            };
            let cost_left = child_cost(left);
            let cost_right = child_cost(right);

            if cost < cost_left && cost < cost_right {
                break;
            }
            index = if cost_left <= cost_right { left } else { right };
        }

        let sibling = index;
        let old_parent = self.nodes[sibling].parent;
        let new_parent = self.allocate(Node {
            aabb: self.nodes[sibling].aabb.merge(&leaf_aabb),
            parent: old_parent,
            kind: NodeKind::Branch([sibling, leaf]),
        });
        self.nodes[sibling].parent = Some(new_parent);
        self.nodes[leaf].parent = Some(new_parent);

        match old_parent {
            Some(parent) => {
                if let NodeKind::Branch(children) = &mut self.nodes[parent].kind {
                    if children[0] == sibling {
                        children[0] = new_parent;
                    } else {
                        children[1] = new_parent;
                    }
                }
            }
            None => self.root = Some(new_parent),
        }

        self.refit(Some(new_parent));
    }

    fn remove_leaf(&mut self, leaf: usize) {
        if self.root == Some(leaf) {
            self.root = None;
            return;
        }
        let Some(parent) = self.nodes[leaf].parent else {
            return;
        };
        let grand_parent = self.nodes[parent].parent;
        let sibling = match self.children(parent) {
            Some([left, right]) => {
                if left == leaf {
                    right
                } else {
                    left
                }
            }
            None => return,
        };

        match grand_parent {
            Some(gp) => {
                if let NodeKind::Branch(children) = &mut self.nodes[gp].kind {
                    if children[0] == parent {
                        children[0] = sibling;
                    } else {
                        children[1] = sibling;
                    }
                }
                self.nodes[sibling].parent = Some(gp);
                self.release(parent);
                self.refit(Some(gp));
            }
            None => {
                self.root = Some(sibling);
                self.nodes[sibling].parent = None;
                self.release(parent);
            }
        }
        self.nodes[leaf].parent = None;
    }

    fn refit(&mut self, mut index: Option<usize>) {
        while let Some(i) = index {
            if let Some([left, right]) = self.children(i) {
                self.nodes[i].aabb = self.nodes[left].aabb.merge(&self.nodes[right].aabb);
            }
            index = self.nodes[i].parent;
        }
    }
}
