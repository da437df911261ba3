//! Queries over an in-memory node set
//!
//! Path building and invariant checks used by the orchestrator, the stores
//! and the client session. Nothing here touches storage.

use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::error::{MindMapError, MindMapResult};
use crate::models::Node;

/// Index of a node set by id
pub struct NodeIndex<'a> {
    by_id: HashMap<Uuid, &'a Node>,
}

impl<'a> NodeIndex<'a> {
    pub fn new(nodes: &'a [Node]) -> Self {
        Self {
            by_id: nodes.iter().map(|n| (n.id, n)).collect(),
        }
    }

    pub fn get(&self, id: &Uuid) -> Option<&'a Node> {
        self.by_id.get(id).copied()
    }

    /// Nodes from the root down to `node_id`, both inclusive
    pub fn ancestor_path(&self, node_id: Uuid) -> MindMapResult<Vec<&'a Node>> {
        let mut path = Vec::new();
        let mut seen = HashSet::new();
        let mut current = self
            .get(&node_id)
            .ok_or_else(|| MindMapError::node_not_found(node_id))?;

        loop {
            if !seen.insert(current.id) {
                return Err(MindMapError::InvalidTree(format!(
                    "cycle through node {}",
                    current.id
                )));
            }
            path.push(current);
            match current.parent_id {
                None => break,
                Some(parent_id) => {
                    current = self.get(&parent_id).ok_or_else(|| {
                        MindMapError::InvalidTree(format!(
                            "node {} references missing parent {}",
                            current.id, parent_id
                        ))
                    })?;
                }
            }
        }

        path.reverse();
        Ok(path)
    }
}

/// Content labels from the root down to `node_id`, both inclusive
pub fn path_labels(nodes: &[Node], node_id: Uuid) -> MindMapResult<Vec<String>> {
    let index = NodeIndex::new(nodes);
    Ok(index
        .ancestor_path(node_id)?
        .into_iter()
        .map(|n| n.content.clone())
        .collect())
}

/// Direct children of `parent_id`, in input order
pub fn children_of(nodes: &[Node], parent_id: Uuid) -> Vec<&Node> {
    nodes
        .iter()
        .filter(|n| n.parent_id == Some(parent_id))
        .collect()
}

/// The single root of a map's node set
pub fn find_root(nodes: &[Node]) -> Option<&Node> {
    nodes.iter().find(|n| n.is_root())
}

/// Check the structural invariants of one map's node set:
/// exactly one root, parents in the same map one level up, no cycles.
pub fn validate_tree(mind_map_id: Uuid, nodes: &[Node]) -> MindMapResult<()> {
    let roots: Vec<&Node> = nodes.iter().filter(|n| n.parent_id.is_none()).collect();
    match roots.as_slice() {
        [root] if root.level == 0 => {}
        [root] => {
            return Err(MindMapError::InvalidTree(format!(
                "root {} has level {}",
                root.id, root.level
            )))
        }
        [] => return Err(MindMapError::InvalidTree("map has no root".to_string())),
        many => {
            return Err(MindMapError::InvalidTree(format!(
                "map has {} roots",
                many.len()
            )))
        }
    }

    let index = NodeIndex::new(nodes);
    for node in nodes {
        if node.mind_map_id != mind_map_id {
            return Err(MindMapError::InvalidTree(format!(
                "node {} belongs to map {}",
                node.id, node.mind_map_id
            )));
        }
        if let Some(parent_id) = node.parent_id {
            let parent = index.get(&parent_id).ok_or_else(|| {
                MindMapError::InvalidTree(format!(
                    "node {} references missing parent {}",
                    node.id, parent_id
                ))
            })?;
            if parent.level + 1 != node.level {
                return Err(MindMapError::InvalidTree(format!(
                    "node {} at level {} under parent at level {}",
                    node.id, node.level, parent.level
                )));
            }
        }
        // Walking to the root proves reachability and absence of cycles
        index.ancestor_path(node.id)?;
    }
    Ok(())
}
