//! Process-wide lookup table from id to node.
//!
//! Entries are weak: the tree owns nodes, the registry only finds them.
//! A node is doomed before it is deregistered, and lookups filter doomed
//! nodes, so a destroyed node is never handed out even mid-destruction.

use std::sync::{Arc, Weak};

use dashmap::DashMap;

use super::node::Node;
use super::types::NodeId;

#[derive(Default)]
pub(crate) struct Registry {
    nodes: DashMap<NodeId, Weak<Node>>,
}

impl Registry {
    pub(crate) fn insert(&self, node: &Arc<Node>) {
        self.nodes.insert(node.id(), Arc::downgrade(node));
    }

    pub(crate) fn remove(&self, id: NodeId) -> bool {
        self.nodes.remove(&id).is_some()
    }

    pub(crate) fn get(&self, id: NodeId) -> Option<Arc<Node>> {
        let node = self.nodes.get(&id)?.upgrade()?;
        (!node.is_doomed()).then_some(node)
    }

    pub(crate) fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Live and not-yet-committed nodes currently registered.
    pub(crate) fn snapshot(&self) -> Vec<Arc<Node>> {
        self.nodes
            .iter()
            .filter_map(|entry| entry.value().upgrade())
            .filter(|node| !node.is_doomed())
            .collect()
    }
}
