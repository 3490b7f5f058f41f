use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use super::frame::FrameId;

/// Index of a node inside its [`CallTree`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// One occurrence of a frame within a specific call path.
#[derive(Debug, Clone, PartialEq)]
pub struct CallTreeNode {
    pub frame: FrameId,
    /// `None` for roots.
    pub parent: Option<NodeId>,
    /// Children in call order.
    pub children: Vec<NodeId>,
    pub self_weight: f64,
    /// `self_weight` plus the totals of all children.
    pub total_weight: f64,
    /// Number of occurrences merged into this node. Always 1 in a
    /// chronological tree.
    pub count: u32,
}

/// Arena-allocated call forest.
///
/// A node is always allocated after its parent, so every parent index is
/// smaller than its children's. Totals are recomputed with one reverse pass
/// relying on that ordering.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallTree {
    nodes: Vec<CallTreeNode>,
    roots: Vec<NodeId>,
}

impl CallTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a new node for `frame` under `parent` (or as a new root).
    pub fn push_node(&mut self, frame: FrameId, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(CallTreeNode {
            frame,
            parent,
            children: Vec::new(),
            self_weight: 0.0,
            total_weight: 0.0,
            count: 1,
        });
        match parent {
            Some(p) => self.nodes[p.index()].children.push(id),
            None => self.roots.push(id),
        }
        id
    }

    pub fn add_self_weight(&mut self, node: NodeId, weight: f64) {
        if let Some(n) = self.nodes.get_mut(node.index()) {
            n.self_weight += weight;
        }
    }

    /// Re-derive every `total_weight` from the self weights.
    pub fn recompute_totals(&mut self) {
        for node in &mut self.nodes {
            node.total_weight = node.self_weight;
        }
        for i in (0..self.nodes.len()).rev() {
            if let Some(parent) = self.nodes[i].parent {
                let total = self.nodes[i].total_weight;
                self.nodes[parent.index()].total_weight += total;
            }
        }
    }

    pub fn node(&self, id: NodeId) -> &CallTreeNode {
        &self.nodes[id.index()]
    }

    pub fn get(&self, id: NodeId) -> Option<&CallTreeNode> {
        self.nodes.get(id.index())
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &CallTreeNode)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (NodeId(i as u32), n))
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterate from `node` up to its root, `node` included.
    pub fn ancestors(&self, node: NodeId) -> Ancestors<'_> {
        Ancestors {
            tree: self,
            next: Some(node),
        }
    }

    /// Root-first path ending in `node`.
    pub fn path_to(&self, node: NodeId) -> Vec<NodeId> {
        let mut path: Vec<NodeId> = self.ancestors(node).collect();
        path.reverse();
        path
    }

    /// Depth of `node`, roots being depth 0.
    pub fn depth(&self, node: NodeId) -> usize {
        self.ancestors(node).count() - 1
    }

    /// Number of layers needed to draw the tree.
    pub fn max_depth(&self) -> usize {
        let mut depths = vec![0usize; self.nodes.len()];
        let mut max = 0;
        for (i, node) in self.nodes.iter().enumerate() {
            let depth = node.parent.map_or(1, |p| depths[p.index()] + 1);
            depths[i] = depth;
            max = max.max(depth);
        }
        max
    }

    /// Sum of `total_weight` over the roots.
    pub fn roots_total(&self) -> f64 {
        self.roots
            .iter()
            .map(|r| self.nodes[r.index()].total_weight)
            .sum()
    }

    /// Merge every group of same-frame siblings into one node, recursively.
    ///
    /// Returns the merged tree and, for each node of `self`, the merged node
    /// it was folded into. Sibling order is the order of first occurrence.
    pub fn grouped(&self) -> (CallTree, Vec<NodeId>) {
        let mut out = CallTree::new();
        let mut mapping = Vec::with_capacity(self.nodes.len());
        let mut by_parent: FxHashMap<(Option<NodeId>, FrameId), NodeId> = FxHashMap::default();

        for node in &self.nodes {
            let parent = node.parent.map(|p| mapping[p.index()]);
            let merged = match by_parent.get(&(parent, node.frame)) {
                Some(&id) => {
                    out.nodes[id.index()].count += 1;
                    id
                }
                None => {
                    let id = out.push_node(node.frame, parent);
                    by_parent.insert((parent, node.frame), id);
                    id
                }
            };
            out.nodes[merged.index()].self_weight += node.self_weight;
            mapping.push(merged);
        }
        out.recompute_totals();
        (out, mapping)
    }
}

pub struct Ancestors<'a> {
    tree: &'a CallTree,
    next: Option<NodeId>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.next?;
        self.next = self.tree.get(current).and_then(|n| n.parent);
        Some(current)
    }
}

/// One entry of the chronological timeline: the stack top that was
/// sampled, or `None` for idle time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub node: Option<NodeId>,
    pub weight: f64,
}

/// Receives the open and close events of a call traversal.
pub trait CallVisitor {
    fn open(&mut self, node: NodeId, value: f64);
    fn close(&mut self, node: NodeId, value: f64);
}

/// Records traversal events as `(opened, node, value)`.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct CallLog {
    pub events: Vec<(bool, NodeId, f64)>,
}

#[cfg(test)]
impl CallVisitor for CallLog {
    fn open(&mut self, node: NodeId, value: f64) {
        self.events.push((true, node, value));
    }

    fn close(&mut self, node: NodeId, value: f64) {
        self.events.push((false, node, value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f(i: u32) -> FrameId {
        FrameId(i)
    }

    #[test]
    fn totals_include_descendants() {
        let mut tree = CallTree::new();
        let root = tree.push_node(f(0), None);
        let a = tree.push_node(f(1), Some(root));
        let b = tree.push_node(f(2), Some(a));
        tree.add_self_weight(root, 1.0);
        tree.add_self_weight(a, 2.0);
        tree.add_self_weight(b, 4.0);
        tree.recompute_totals();

        assert_eq!(tree.node(root).total_weight, 7.0);
        assert_eq!(tree.node(a).total_weight, 6.0);
        assert_eq!(tree.node(b).total_weight, 4.0);
        assert_eq!(tree.roots_total(), 7.0);
        assert_eq!(tree.depth(b), 2);
        assert_eq!(tree.max_depth(), 3);
        assert_eq!(tree.path_to(b), vec![root, a, b]);
    }

    #[test]
    fn grouping_merges_same_frame_siblings() {
        let mut tree = CallTree::new();
        let main = tree.push_node(f(0), None);
        let a1 = tree.push_node(f(1), Some(main));
        let b = tree.push_node(f(2), Some(main));
        let a2 = tree.push_node(f(1), Some(main));
        let c = tree.push_node(f(3), Some(a2));
        tree.add_self_weight(a1, 3.0);
        tree.add_self_weight(b, 5.0);
        tree.add_self_weight(a2, 1.0);
        tree.add_self_weight(c, 2.0);
        tree.recompute_totals();

        let (grouped, mapping) = tree.grouped();
        assert_eq!(grouped.len(), 4);
        assert_eq!(mapping[a1.index()], mapping[a2.index()]);
        assert_eq!(mapping[c.index()].index(), 3);

        let merged_a = grouped.node(mapping[a1.index()]);
        assert_eq!(merged_a.count, 2);
        assert_eq!(merged_a.self_weight, 4.0);
        assert_eq!(merged_a.total_weight, 6.0);
        assert_eq!(grouped.roots_total(), tree.roots_total());
    }

    #[test]
    fn empty_tree_has_no_depth() {
        let tree = CallTree::new();
        assert_eq!(tree.max_depth(), 0);
        assert_eq!(tree.roots_total(), 0.0);
    }
}
