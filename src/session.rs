//! Map Session: client-visible state of one open map
//!
//! Holds nodes, edges, positions and per-node metadata, and keeps them in
//! sync as the map is loaded, generated and expanded. Edges and positions
//! are recomputed from the node set after every change.

use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use uuid::Uuid;

use crate::error::{MindMapError, MindMapResult};
use crate::layout::{derive_edges, Edge, LayoutEngine, MapSnapshot, Position};
use crate::models::Node;
use crate::orchestrator::GeneratedMap;
use crate::tree::{find_root, NodeIndex};

/// Per-node display metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeMeta {
    pub node_id: Uuid,
    pub level: i32,
    /// False while an expansion of this node is pending
    pub can_expand: bool,
    /// True once the node has at least one child
    pub is_expanded: bool,
}

/// What an expansion request needs, resolved from the session's nodes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpandTarget {
    pub node: Node,
    /// Labels from the root down to `node`, both inclusive
    pub path: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct MapSession {
    map_id: Uuid,
    main_topic: String,
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    positions: BTreeMap<Uuid, Position>,
    meta: BTreeMap<Uuid, NodeMeta>,
    pending: HashSet<Uuid>,
    layout: LayoutEngine,
}

impl MapSession {
    /// Open a persisted map
    pub fn load(snapshot: MapSnapshot) -> Self {
        let nodes = snapshot.nodes.into_iter().map(|p| p.node).collect();
        Self::from_nodes(snapshot.mind_map_id, nodes)
    }

    /// Open a map straight after it was generated
    pub fn from_generated(generated: &GeneratedMap) -> Self {
        Self::from_nodes(generated.map.id, generated.nodes())
    }

    fn from_nodes(map_id: Uuid, nodes: Vec<Node>) -> Self {
        let main_topic = find_root(&nodes)
            .map(|root| root.content.clone())
            .unwrap_or_default();
        let mut session = Self {
            map_id,
            main_topic,
            nodes,
            edges: Vec::new(),
            positions: BTreeMap::new(),
            meta: BTreeMap::new(),
            pending: HashSet::new(),
            layout: LayoutEngine::new(),
        };
        session.recompute();
        session
    }

    pub fn map_id(&self) -> Uuid {
        self.map_id
    }

    pub fn main_topic(&self) -> &str {
        &self.main_topic
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn position(&self, node_id: &Uuid) -> Option<Position> {
        self.positions.get(node_id).copied()
    }

    pub fn meta(&self, node_id: &Uuid) -> Option<&NodeMeta> {
        self.meta.get(node_id)
    }

    /// Mark `node_id` as pending and resolve its path from the current
    /// node set. Only one expansion per node may be pending.
    pub fn begin_expand(&mut self, node_id: Uuid) -> MindMapResult<ExpandTarget> {
        if self.pending.contains(&node_id) {
            return Err(MindMapError::ExpansionInProgress(node_id));
        }

        let index = NodeIndex::new(&self.nodes);
        let path = index.ancestor_path(node_id)?;
        let target = ExpandTarget {
            node: path
                .last()
                .map(|n| (*n).clone())
                .ok_or_else(|| MindMapError::node_not_found(node_id))?,
            path: path.iter().map(|n| n.content.clone()).collect(),
        };

        self.pending.insert(node_id);
        self.refresh_meta();
        Ok(target)
    }

    /// Merge the children produced for `node_id`. Nodes already present are
    /// replaced by the incoming version.
    pub fn apply_expansion(&mut self, node_id: Uuid, children: Vec<Node>) {
        self.pending.remove(&node_id);
        for child in children {
            match self.nodes.iter_mut().find(|n| n.id == child.id) {
                Some(existing) => *existing = child,
                None => self.nodes.push(child),
            }
        }
        self.recompute();
    }

    /// Clear the pending flag after a failed expansion
    pub fn fail_expand(&mut self, node_id: Uuid) {
        self.pending.remove(&node_id);
        self.refresh_meta();
    }

    fn recompute(&mut self) {
        self.edges = derive_edges(&self.nodes);
        self.positions = self.layout.layout(&self.nodes).positions;
        self.refresh_meta();
    }

    fn refresh_meta(&mut self) {
        let parents: HashSet<Uuid> = self.nodes.iter().filter_map(|n| n.parent_id).collect();
        self.meta = self
            .nodes
            .iter()
            .map(|n| {
                (
                    n.id,
                    NodeMeta {
                        node_id: n.id,
                        level: n.level,
                        can_expand: !self.pending.contains(&n.id),
                        is_expanded: parents.contains(&n.id),
                    },
                )
            })
            .collect();
    }
}
