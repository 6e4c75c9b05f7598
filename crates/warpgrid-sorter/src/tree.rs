//! The client hierarchy as an arena of nodes.
//!
//! Nodes live in a slot vector and refer to each other by [`NodeId`];
//! parent links are indices, so splitting, collapsing and deleting nodes
//! never leaves a dangling reference. Freed slots are recycled.
//!
//! A path may be both a client and the parent of other clients (`eng`
//! and `eng/ml`). The internal node for `eng` then carries a child
//! labelled [`Label::Coincident`] that is the leaf for client `eng`:
//!
//! ```text
//!            root
//!          /  |  \
//!         a   e   w
//!         |      / \
//!         b   (w)   z        (w) = coincident leaf, client path "w"
//! ```
//!
//! Children are kept partitioned: internal and active leaves first,
//! inactive leaves last. Traversals stop at the first inactive leaf.

use std::collections::{HashMap, HashSet};

use warpgrid_resources::{AgentId, Resources};

use crate::allocation::Allocation;

/// Stable handle to a node in the [`Tree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// What a node is: an internal grouping or a client leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Internal,
    ActiveLeaf,
    InactiveLeaf,
}

impl Kind {
    pub fn is_leaf(self) -> bool {
        !matches!(self, Kind::Internal)
    }
}

/// What a node stands for within its parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Label {
    Root,
    /// A named path segment.
    Segment(String),
    /// The leaf for a client whose path coincides with its parent's.
    Coincident,
}

#[derive(Debug, Clone)]
pub struct Node {
    pub label: Label,
    pub kind: Kind,
    /// Client-facing path; a coincident leaf shares its parent's path.
    pub path: String,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub allocation: Allocation,
    /// Resolved share, filled on first use by the sorter and cleared
    /// when the weight for `path` changes.
    pub weight: Option<f64>,
}

/// Result of inserting a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Insertion {
    /// The new (inactive) leaf for the inserted path.
    pub leaf: NodeId,
    /// Set when an existing client leaf had to become internal; this is
    /// the coincident leaf that now stands for that client.
    pub relocated: Option<NodeId>,
}

#[derive(Debug, Clone)]
pub struct Tree {
    slots: Vec<Option<Node>>,
    free: Vec<usize>,
    root: NodeId,
}

impl Tree {
    /// A tree holding only the root.
    pub fn new() -> Self {
        let root = Node {
            label: Label::Root,
            kind: Kind::Internal,
            path: String::new(),
            parent: None,
            children: Vec::new(),
            allocation: Allocation::default(),
            weight: None,
        };
        Self {
            slots: vec![Some(root)],
            free: Vec::new(),
            root: NodeId(0),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of live nodes, root included.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.node(self.root).children.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        match self.slots.get(id.0) {
            Some(Some(node)) => node,
            _ => panic!("stale node handle {id:?}"),
        }
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        match self.slots.get_mut(id.0) {
            Some(Some(node)) => node,
            _ => panic!("stale node handle {id:?}"),
        }
    }

    /// Walk named segments from the root. Returns the node whose path is
    /// exactly `segments` (an internal node when the path is split).
    pub fn lookup(&self, segments: &[&str]) -> Option<NodeId> {
        segments
            .iter()
            .try_fold(self.root, |current, segment| self.find_child(current, segment))
    }

    /// `id` followed by each of its ancestors up to and including the root.
    pub fn ancestry(&self, id: NodeId) -> Vec<NodeId> {
        let mut chain = vec![id];
        let mut current = id;
        while let Some(parent) = self.node(current).parent {
            chain.push(parent);
            current = parent;
        }
        chain
    }

    /// Length of the active prefix of `id`'s children.
    pub fn active_prefix_len(&self, id: NodeId) -> usize {
        let children = &self.node(id).children;
        children
            .iter()
            .position(|&c| self.node(c).kind == Kind::InactiveLeaf)
            .unwrap_or(children.len())
    }

    // ── Structural operations ──────────────────────────────────────

    /// Insert a client at `segments`, which must not already be a client.
    ///
    /// Phase 1 walks existing nodes until the path runs out at an
    /// internal node, a leaf is reached with segments left over, or no
    /// child matches. Phase 2 creates the remaining segments.
    pub fn insert_client(&mut self, segments: &[&str]) -> Insertion {
        let mut current = self.root;
        let mut rest = segments;
        let mut relocated = None;

        loop {
            let Some((segment, tail)) = rest.split_first() else {
                // The path names an existing internal node.
                assert!(
                    self.coincident_child(current).is_none(),
                    "client already present at {:?}",
                    self.node(current).path
                );
                let leaf = self.attach(current, Label::Coincident, Kind::InactiveLeaf);
                return Insertion { leaf, relocated };
            };

            if self.node(current).kind.is_leaf() {
                relocated = Some(self.split(current));
                break;
            }

            match self.find_child(current, segment) {
                Some(child) => {
                    current = child;
                    rest = tail;
                }
                None => break,
            }
        }

        for (i, segment) in rest.iter().enumerate() {
            let kind = if i + 1 == rest.len() {
                Kind::InactiveLeaf
            } else {
                Kind::Internal
            };
            current = self.attach(current, Label::Segment((*segment).to_string()), kind);
        }

        assert!(self.node(current).children.is_empty());
        assert_eq!(self.node(current).kind, Kind::InactiveLeaf);
        Insertion {
            leaf: current,
            relocated,
        }
    }

    /// Remove the client leaf `leaf`, subtracting its allocation from
    /// every ancestor and pruning nodes left without children.
    ///
    /// Returns the node that collapsed back into a plain leaf, if any;
    /// that node now stands for the client its coincident child held.
    pub fn remove_client(&mut self, leaf: NodeId) -> Option<NodeId> {
        assert!(self.node(leaf).kind.is_leaf(), "removing a non-leaf node");

        let released = self.node(leaf).allocation.resources.clone();
        let mut collapsed = None;
        let mut current = leaf;

        while let Some(parent) = self.node(current).parent {
            self.release_from(parent, &released);

            let (count, only) = {
                let children = &self.node(current).children;
                (children.len(), children.first().copied())
            };

            if count == 0 {
                self.detach(parent, current);
                self.free_slot(current);
            } else if let (1, Some(only)) = (count, only) {
                if self.node(only).label == Label::Coincident {
                    self.collapse(current, only);
                    collapsed = Some(current);
                }
            }

            current = parent;
        }

        collapsed
    }

    /// Flip a leaf between active and inactive, moving it to the front
    /// or back of its siblings. Returns whether anything changed.
    pub fn set_active(&mut self, leaf: NodeId, active: bool) -> bool {
        let target = if active {
            Kind::ActiveLeaf
        } else {
            Kind::InactiveLeaf
        };
        let node = self.node_mut(leaf);
        assert!(node.kind.is_leaf(), "activating a non-leaf node");
        if node.kind == target {
            return false;
        }
        node.kind = target;
        self.reposition(leaf);
        true
    }

    // ── Traversals ─────────────────────────────────────────────────

    /// Pre-order listing of active client paths. Each node's children are
    /// visited in their current order, stopping at the first inactive leaf.
    pub fn active_leaves(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_active(self.root, &mut out);
        out
    }

    fn collect_active(&self, id: NodeId, out: &mut Vec<String>) {
        for &child in &self.node(id).children {
            let node = self.node(child);
            match node.kind {
                Kind::ActiveLeaf => out.push(node.path.clone()),
                Kind::InactiveLeaf => return,
                Kind::Internal => self.collect_active(child, out),
            }
        }
    }

    /// Internal nodes with at least one active leaf below them.
    pub fn active_internal_nodes(&self) -> HashSet<NodeId> {
        let mut result = HashSet::new();
        self.search_active(self.root, &mut result);
        result
    }

    // Post-order; returns whether the subtree holds an active leaf.
    fn search_active(&self, id: NodeId, result: &mut HashSet<NodeId>) -> bool {
        match self.node(id).kind {
            Kind::ActiveLeaf => true,
            Kind::InactiveLeaf => false,
            Kind::Internal => {
                let mut active = false;
                for &child in &self.node(id).children {
                    if self.search_active(child, result) {
                        active = true;
                    }
                }
                if active {
                    result.insert(id);
                }
                active
            }
        }
    }

    // ── Internals ──────────────────────────────────────────────────

    fn find_child(&self, parent: NodeId, segment: &str) -> Option<NodeId> {
        self.node(parent)
            .children
            .iter()
            .copied()
            .find(|&c| matches!(&self.node(c).label, Label::Segment(s) if s == segment))
    }

    pub(crate) fn coincident_child(&self, parent: NodeId) -> Option<NodeId> {
        self.node(parent)
            .children
            .iter()
            .copied()
            .find(|&c| self.node(c).label == Label::Coincident)
    }

    fn attach(&mut self, parent: NodeId, label: Label, kind: Kind) -> NodeId {
        let parent_path = &self.node(parent).path;
        let path = match &label {
            Label::Root => unreachable!("root is never attached"),
            Label::Coincident => parent_path.clone(),
            Label::Segment(segment) if parent_path.is_empty() => segment.clone(),
            Label::Segment(segment) => format!("{parent_path}/{segment}"),
        };

        let node = Node {
            label,
            kind,
            path,
            parent: Some(parent),
            children: Vec::new(),
            allocation: Allocation::default(),
            weight: None,
        };
        let id = match self.free.pop() {
            Some(index) => {
                self.slots[index] = Some(node);
                NodeId(index)
            }
            None => {
                self.slots.push(Some(node));
                NodeId(self.slots.len() - 1)
            }
        };

        self.link(parent, id);
        id
    }

    /// Turn the leaf `id` into an internal node, handing its kind and
    /// allocation to a new coincident child.
    fn split(&mut self, id: NodeId) -> NodeId {
        let node = self.node_mut(id);
        let old_kind = node.kind;
        let allocation = node.allocation.clone();
        node.kind = Kind::Internal;
        self.reposition(id);

        let leaf = self.attach(id, Label::Coincident, old_kind);
        self.node_mut(leaf).allocation = allocation;
        leaf
    }

    /// Fold the coincident leaf `only` back into its parent `id`.
    fn collapse(&mut self, id: NodeId, only: NodeId) {
        let kind = self.node(only).kind;
        assert!(kind.is_leaf(), "coincident node is not a leaf");

        self.detach(id, only);
        self.free_slot(only);
        self.node_mut(id).kind = kind;
        self.reposition(id);
    }

    fn release_from(&mut self, id: NodeId, released: &HashMap<AgentId, Resources>) {
        let allocation = &mut self.node_mut(id).allocation;
        for (agent, resources) in released {
            allocation.subtract(agent, resources);
        }
    }

    // Inactive leaves go to the back, everything else to the front.
    fn link(&mut self, parent: NodeId, child: NodeId) {
        let kind = self.node(child).kind;
        let children = &mut self.node_mut(parent).children;
        if kind == Kind::InactiveLeaf {
            children.push(child);
        } else {
            children.insert(0, child);
        }
    }

    fn detach(&mut self, parent: NodeId, child: NodeId) {
        self.node_mut(parent).children.retain(|&c| c != child);
    }

    fn reposition(&mut self, id: NodeId) {
        if let Some(parent) = self.node(id).parent {
            self.detach(parent, id);
            self.link(parent, id);
        }
    }

    fn free_slot(&mut self, id: NodeId) {
        if self.slots[id.0].take().is_some() {
            self.free.push(id.0);
        }
    }
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(tree: &Tree, id: NodeId) -> Vec<Kind> {
        tree.node(id)
            .children
            .iter()
            .map(|&c| tree.node(c).kind)
            .collect()
    }

    #[test]
    fn insert_creates_intermediate_nodes() {
        let mut tree = Tree::new();
        let ins = tree.insert_client(&["a", "b", "c"]);

        assert_eq!(ins.relocated, None);
        assert_eq!(tree.node(ins.leaf).path, "a/b/c");
        assert_eq!(tree.len(), 4);

        let a = tree.lookup(&["a"]).unwrap();
        assert_eq!(tree.node(a).kind, Kind::Internal);
        assert_eq!(tree.ancestry(ins.leaf).len(), 4);
    }

    #[test]
    fn insert_below_leaf_splits_it() {
        let mut tree = Tree::new();
        let a = tree.insert_client(&["a"]).leaf;
        tree.set_active(a, true);

        let ins = tree.insert_client(&["a", "b"]);
        let coincident = ins.relocated.unwrap();

        assert_eq!(tree.node(a).kind, Kind::Internal);
        assert_eq!(tree.node(coincident).label, Label::Coincident);
        assert_eq!(tree.node(coincident).kind, Kind::ActiveLeaf);
        assert_eq!(tree.node(coincident).path, "a");
        assert_eq!(tree.node(ins.leaf).path, "a/b");
        assert_eq!(kinds(&tree, a), vec![Kind::ActiveLeaf, Kind::InactiveLeaf]);
    }

    #[test]
    fn insert_at_internal_path_adds_coincident_leaf() {
        let mut tree = Tree::new();
        tree.insert_client(&["a", "b"]);

        let ins = tree.insert_client(&["a"]);
        assert_eq!(tree.node(ins.leaf).label, Label::Coincident);
        assert_eq!(tree.node(ins.leaf).path, "a");
    }

    #[test]
    fn remove_collapses_coincident_leaf() {
        let mut tree = Tree::new();
        let a = tree.insert_client(&["a"]).leaf;
        let b = tree.insert_client(&["a", "b"]).leaf;

        let collapsed = tree.remove_client(b);
        assert_eq!(collapsed, Some(a));
        assert_eq!(tree.node(a).kind, Kind::InactiveLeaf);
        assert!(tree.node(a).children.is_empty());
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn remove_prunes_empty_ancestors() {
        let mut tree = Tree::new();
        let leaf = tree.insert_client(&["x", "y", "z"]).leaf;
        tree.insert_client(&["x", "w"]);

        tree.remove_client(leaf);
        assert!(tree.lookup(&["x", "y"]).is_none());
        assert!(tree.lookup(&["x", "w"]).is_some());
        assert_eq!(tree.len(), 3);
    }

    #[test]
    fn slots_are_reused() {
        let mut tree = Tree::new();
        let leaf = tree.insert_client(&["a"]).leaf;
        tree.remove_client(leaf);
        assert!(tree.is_empty());

        let again = tree.insert_client(&["b"]).leaf;
        assert_eq!(again, leaf);
        assert_eq!(tree.node(again).path, "b");
    }

    #[test]
    fn activation_moves_to_front_and_back() {
        let mut tree = Tree::new();
        let a = tree.insert_client(&["a"]).leaf;
        let b = tree.insert_client(&["b"]).leaf;
        let root = tree.root();
        assert_eq!(tree.node(root).children, vec![a, b]);

        assert!(tree.set_active(b, true));
        assert_eq!(tree.node(root).children, vec![b, a]);
        assert!(!tree.set_active(b, true));
        assert_eq!(tree.active_prefix_len(root), 1);

        assert!(tree.set_active(b, false));
        assert_eq!(tree.node(root).children, vec![a, b]);
        assert_eq!(tree.active_prefix_len(root), 0);
    }

    #[test]
    fn active_internal_nodes_post_order() {
        let mut tree = Tree::new();
        let x = tree.insert_client(&["a", "x"]).leaf;
        tree.insert_client(&["b", "y"]);
        tree.set_active(x, true);

        let active = tree.active_internal_nodes();
        let a = tree.lookup(&["a"]).unwrap();
        let b = tree.lookup(&["b"]).unwrap();
        assert!(active.contains(&tree.root()));
        assert!(active.contains(&a));
        assert!(!active.contains(&b));
        assert_eq!(tree.active_leaves(), vec!["a/x".to_string()]);
    }
}
