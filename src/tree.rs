//! Arena-allocated request tree.
//!
//! The tree mirrors the request document with sibling order first-class:
//! every object-valued key becomes a node, siblings are chained through
//! `first`/`prev`/`next` in request order, and array containers own one
//! row-template child per run. Nodes live in one contiguous vector per
//! request and are addressed by [`NodeId`], so the back- and side-links that
//! would otherwise form reference cycles are plain indices. A tree never
//! outlives its request.

use indexmap::IndexMap;
use serde_json::Value as Json;

use crate::statement::JoinKind;
use crate::value::Row;

/// A container-level join directive, parsed from `op/Table/field`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    pub kind: JoinKind,
    pub table: String,
    pub field: String,
}

/// Index of a node within its [`Tree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// One node of the request tree.
#[derive(Debug, Default)]
pub struct Node {
    /// Raw request key (`"User"`, `"[]"`, `"User-id[]"`).
    pub key: String,
    pub is_array: bool,
    pub is_field_array: bool,
    /// Number of rows materialized at this array node.
    pub size: usize,
    /// Row cap for the first child's query, from the `count` directive.
    pub row_cap: usize,
    /// Container-level joins, keyed by joined table name.
    pub joins: IndexMap<String, Join>,
    /// Row-template children; array containers under an array parent own
    /// one child per parent row.
    pub children: Vec<NodeId>,
    pub parent: Option<NodeId>,
    /// Leftmost sibling in this scope; `None` when this node is leftmost.
    pub first: Option<NodeId>,
    pub next: Option<NodeId>,
    pub prev: Option<NodeId>,
    /// Row slot index under the parent container.
    pub index: usize,
    /// One entry per row slot; `None` marks a suppressed or missing row.
    pub data: Vec<Option<Row>>,
    /// For field arrays: one deduplicated value list per parent row.
    pub field_data: Vec<Vec<Json>>,
}

/// Request-scoped node arena.
#[derive(Debug)]
pub struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    /// The first top-level node. Its key is filled by the first request key.
    pub const ROOT: NodeId = NodeId(0);

    pub fn new() -> Tree {
        Tree {
            nodes: vec![Node::default()],
        }
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    /// Append a sibling after `node`, inheriting its scope links.
    pub fn add_sibling(&mut self, key: &str, node: NodeId) -> NodeId {
        let first = self.node(node).first.or(Some(node));
        let parent = self.node(node).parent;
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            key: key.to_string(),
            first,
            prev: Some(node),
            parent,
            ..Node::default()
        });
        self.node_mut(node).next = Some(id);
        id
    }

    /// Allocate a row-template child under an array container.
    pub fn alloc_child(&mut self, parent: NodeId, index: usize) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            index,
            parent: Some(parent),
            ..Node::default()
        });
        self.node_mut(parent).children.push(id);
        id
    }

    /// Leftmost sibling of `id`; `id` itself when already leftmost.
    pub fn first_of(&self, id: NodeId) -> NodeId {
        self.node(id).first.unwrap_or(id)
    }
}

impl Default for Tree {
    fn default() -> Self {
        Tree::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sibling_chain_preserves_order() {
        let mut tree = Tree::new();
        tree.node_mut(Tree::ROOT).key = "a".to_string();
        let b = tree.add_sibling("b", Tree::ROOT);
        let c = tree.add_sibling("c", b);

        assert_eq!(tree.node(Tree::ROOT).next, Some(b));
        assert_eq!(tree.node(b).next, Some(c));
        assert_eq!(tree.node(c).prev, Some(b));
        assert_eq!(tree.first_of(c), Tree::ROOT);
        assert_eq!(tree.first_of(Tree::ROOT), Tree::ROOT);

        let keys: Vec<&str> = {
            let mut out = Vec::new();
            let mut cur = Some(Tree::ROOT);
            while let Some(id) = cur {
                out.push(tree.node(id).key.as_str());
                cur = tree.node(id).next;
            }
            out
        };
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    #[test]
    fn children_carry_row_indices() {
        let mut tree = Tree::new();
        tree.node_mut(Tree::ROOT).key = "[]".to_string();
        let c0 = tree.alloc_child(Tree::ROOT, 0);
        let c1 = tree.alloc_child(Tree::ROOT, 1);

        assert_eq!(tree.node(Tree::ROOT).children, vec![c0, c1]);
        assert_eq!(tree.node(c0).index, 0);
        assert_eq!(tree.node(c1).index, 1);
        assert_eq!(tree.node(c1).parent, Some(Tree::ROOT));
        assert_eq!(tree.node(c0).first, None);
    }
}
