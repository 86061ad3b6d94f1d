use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::node::{Node, NodeId};
use fable_core::{FableError, FableResult};

/// Flat table of every authored node, keyed by id.
///
/// Groups reference their children by id, so rebuilding a group with new
/// children is a single table update.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<Node>", into = "Vec<Node>")]
pub struct NodeArena {
    nodes: BTreeMap<NodeId, Node>,
}

impl NodeArena {
    pub fn new() -> Self {
        Self {
            nodes: BTreeMap::new(),
        }
    }

    /// Insert a node. Returns its id. An existing node with the same id is replaced.
    pub fn insert(&mut self, node: Node) -> NodeId {
        let id = node.id;
        self.nodes.insert(id, node);
        id
    }

    pub fn get(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn get_mut(&mut self, id: &NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Replace an existing entry with a new value of the same id.
    pub fn replace(&mut self, node: Node) -> FableResult<Node> {
        match self.nodes.get_mut(&node.id) {
            Some(slot) => Ok(std::mem::replace(slot, node)),
            None => Err(FableError::lookup_miss(node.id)),
        }
    }

    /// Rebuild a group with a replacement child sequence, keeping its identity.
    pub fn rebuild_group(&mut self, id: &NodeId, children: Vec<NodeId>) -> FableResult<()> {
        let rebuilt = self
            .nodes
            .get(id)
            .ok_or_else(|| FableError::lookup_miss(id))?
            .with_children(children);
        self.nodes.insert(*id, rebuilt);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Depth-first post-order walk from `roots`: every child precedes its
    /// parent and siblings keep their authored order. Dangling ids are
    /// skipped and a node is visited at most once.
    pub fn post_order(&self, roots: &[NodeId]) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut visited = HashSet::new();
        for root in roots {
            self.visit(*root, &mut visited, &mut order);
        }
        order
    }

    fn visit(&self, id: NodeId, visited: &mut HashSet<NodeId>, order: &mut Vec<NodeId>) {
        if !visited.insert(id) {
            return;
        }
        let Some(node) = self.nodes.get(&id) else {
            return;
        };
        for child in node.children() {
            self.visit(child, visited, order);
        }
        order.push(id);
    }
}

impl From<Vec<Node>> for NodeArena {
    fn from(nodes: Vec<Node>) -> Self {
        let mut arena = NodeArena::new();
        for node in nodes {
            arena.insert(node);
        }
        arena
    }
}

impl From<NodeArena> for Vec<Node> {
    fn from(arena: NodeArena) -> Self {
        arena.nodes.into_values().collect()
    }
}
