//! Pure views over a listed node collection.
//!
//! Nothing here touches the ledger; callers apply these to the output of
//! `NodeStore::list`.

use crate::model::node::{NodeKind, NodeRecord, NodeStatus};

/// Collection counters by status and built-in kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeStats {
    pub total: usize,
    pub active: usize,
    pub archived: usize,
    pub concepts: usize,
    pub entities: usize,
    pub relations: usize,
    /// Nodes whose kind is not one of the built-in kinds.
    pub other_kinds: usize,
}

impl NodeStats {
    pub fn from_nodes(nodes: &[NodeRecord]) -> Self {
        let mut stats = Self {
            total: nodes.len(),
            ..Self::default()
        };
        for node in nodes {
            match node.status {
                NodeStatus::Active => stats.active += 1,
                NodeStatus::Archived => stats.archived += 1,
            }
            match node.kind {
                NodeKind::Concept => stats.concepts += 1,
                NodeKind::Entity => stats.entities += 1,
                NodeKind::Relation => stats.relations += 1,
                NodeKind::Other(_) => stats.other_kinds += 1,
            }
        }
        stats
    }
}

/// Kind/status filter. `None` fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeFilter {
    pub kind: Option<NodeKind>,
    pub status: Option<NodeStatus>,
}

impl NodeFilter {
    pub fn matches(&self, node: &NodeRecord) -> bool {
        self.kind.as_ref().map_or(true, |kind| &node.kind == kind)
            && self.status.map_or(true, |status| node.status == status)
    }

    /// Returns matching nodes in their original order.
    pub fn apply<'a>(&self, nodes: &'a [NodeRecord]) -> Vec<&'a NodeRecord> {
        nodes.iter().filter(|node| self.matches(node)).collect()
    }
}
