//! Server-side layout engine for mind maps
//!
//! Computes x, y positions for every node of a map and derives the edge set
//! from parent links. The client receives pre-positioned nodes and just
//! renders them.
//!
//! ```text
//! Level 0: root at the origin
//! Level 1: full circle around the root, first sibling at the top
//! Level 2+: half circle around the parent, opening away from the grandparent
//! ```
//!
//! Everything here is a pure function of its input: the same node set in the
//! same order always yields the same positions and edges.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::f64::consts::{FRAC_PI_2, PI, TAU};
use uuid::Uuid;

use crate::models::Node;

/// 2-D coordinate in canvas space (y grows downwards)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub const ORIGIN: Position = Position { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &Position) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// Angle of the vector from `from` to `self`
    pub fn angle_from(&self, from: &Position) -> f64 {
        (self.y - from.y).atan2(self.x - from.x)
    }
}

/// Visual connection from a parent to one of its children
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    pub source: Uuid,
    pub target: Uuid,
}

impl Edge {
    pub fn between(source: Uuid, target: Uuid) -> Self {
        Self {
            id: format!("e{}-{}", source, target),
            source,
            target,
        }
    }
}

/// Layout configuration constants
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutConfig {
    /// Radius of the circle holding the root's children
    pub level1_radius: f64,
    /// Radius of the arcs holding deeper children; smaller than `level1_radius`
    pub child_radius: f64,
    /// Angle of the first level-1 sibling (-π/2 is the top of the circle)
    pub start_angle: f64,
    /// Angular spread of deeper arcs
    pub arc_spread: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            level1_radius: 300.0,
            child_radius: 200.0,
            start_angle: -FRAC_PI_2,
            arc_spread: PI,
        }
    }
}

/// Position of sibling `index` of `total` on a full circle:
/// `angle(i) = start_angle + 2π·i / total`
pub fn position_on_circle(
    index: usize,
    total: usize,
    center: Position,
    radius: f64,
    start_angle: f64,
) -> Position {
    let total = total.max(1) as f64;
    let angle = start_angle + TAU * index as f64 / total;
    Position::new(center.x + radius * angle.cos(), center.y + radius * angle.sin())
}

/// Position of sibling `index` of `total` on an arc:
/// `angle(i) = start_angle + spread·(i+1) / (total+1)`, never on an endpoint
pub fn position_on_arc(
    index: usize,
    total: usize,
    center: Position,
    radius: f64,
    start_angle: f64,
    spread: f64,
) -> Position {
    let angle = start_angle + spread * (index as f64 + 1.0) / (total as f64 + 1.0);
    Position::new(center.x + radius * angle.cos(), center.y + radius * angle.sin())
}

/// One edge per node that has a parent; the root has no incoming edge.
/// Output order follows the input node order.
pub fn derive_edges(nodes: &[Node]) -> Vec<Edge> {
    nodes
        .iter()
        .filter_map(|node| node.parent_id.map(|parent| Edge::between(parent, node.id)))
        .collect()
}

/// Positions for a node set, plus nodes that could not be reached from a root
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MapLayout {
    pub positions: BTreeMap<Uuid, Position>,
    pub orphans: Vec<Uuid>,
}

impl MapLayout {
    pub fn position_of(&self, node_id: &Uuid) -> Option<Position> {
        self.positions.get(node_id).copied()
    }
}

/// A node with its computed position, as sent to the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionedNode {
    #[serde(flatten)]
    pub node: Node,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

/// Full render state of a map: positioned nodes and derived edges
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapSnapshot {
    pub mind_map_id: Uuid,
    pub nodes: Vec<PositionedNode>,
    pub edges: Vec<Edge>,
}

impl MapSnapshot {
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

/// Layout engine that computes node positions for a whole map
#[derive(Debug, Clone, Default)]
pub struct LayoutEngine {
    config: LayoutConfig,
}

impl LayoutEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: LayoutConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    /// Compute positions for every node reachable from the root.
    ///
    /// Siblings are ordered as they appear in `nodes`, which for persisted
    /// maps is creation order.
    pub fn layout(&self, nodes: &[Node]) -> MapLayout {
        let mut children: HashMap<Uuid, Vec<&Node>> = HashMap::new();
        for node in nodes {
            if let Some(parent_id) = node.parent_id {
                children.entry(parent_id).or_default().push(node);
            }
        }

        let mut layout = MapLayout::default();
        let Some(root) = nodes.iter().find(|n| n.is_root()) else {
            layout.orphans = nodes.iter().map(|n| n.id).collect();
            return layout;
        };

        layout.positions.insert(root.id, Position::ORIGIN);

        // Breadth-first so every parent is placed before its children
        let mut queue: VecDeque<(&Node, Option<Position>)> = VecDeque::new();
        queue.push_back((root, None));

        while let Some((parent, grandparent_pos)) = queue.pop_front() {
            let Some(siblings) = children.get(&parent.id) else {
                continue;
            };
            let parent_pos = layout.positions[&parent.id];
            let total = siblings.len();

            for (index, child) in siblings.iter().enumerate() {
                if layout.positions.contains_key(&child.id) {
                    continue;
                }
                let position = match grandparent_pos {
                    None => position_on_circle(
                        index,
                        total,
                        parent_pos,
                        self.config.level1_radius,
                        self.config.start_angle,
                    ),
                    Some(gp) => {
                        let outward = parent_pos.angle_from(&gp);
                        position_on_arc(
                            index,
                            total,
                            parent_pos,
                            self.config.child_radius,
                            outward - self.config.arc_spread / 2.0,
                            self.config.arc_spread,
                        )
                    }
                };
                layout.positions.insert(child.id, position);
                queue.push_back((child, Some(parent_pos)));
            }
        }

        layout.orphans = nodes
            .iter()
            .filter(|n| !layout.positions.contains_key(&n.id))
            .map(|n| n.id)
            .collect();

        layout
    }

    /// Layout plus edges for a map, in node order
    pub fn snapshot(&self, mind_map_id: Uuid, nodes: &[Node]) -> MapSnapshot {
        let layout = self.layout(nodes);
        MapSnapshot {
            mind_map_id,
            nodes: nodes
                .iter()
                .map(|node| PositionedNode {
                    node: node.clone(),
                    position: layout.position_of(&node.id),
                })
                .collect(),
            edges: derive_edges(nodes),
        }
    }
}
