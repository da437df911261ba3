//! Persisted mind map entities
//!
//! Field names serialize in camelCase to match the JSON API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Explanation stored on every root node
pub const ROOT_EXPLANATION: &str = "This is the main topic";

/// A mind map owned by exactly one user; its title is the main topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "database", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
pub struct MindMap {
    pub id: Uuid,
    pub title: String,
    pub owner_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// A single topic entry in the tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "database", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: Uuid,
    pub content: String,
    pub explanation: String,
    pub level: i32,
    pub parent_id: Option<Uuid>,
    pub mind_map_id: Uuid,
}

impl Node {
    pub fn is_root(&self) -> bool {
        self.level == 0 && self.parent_id.is_none()
    }
}

/// Content of a node that has not been persisted yet.
/// Level and parent are assigned by the store from the batch's target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNode {
    pub content: String,
    pub explanation: String,
}

impl NewNode {
    pub fn new(content: impl Into<String>, explanation: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            explanation: explanation.into(),
        }
    }
}

/// A map with its nodes in creation order, as returned by listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MindMapWithNodes {
    #[serde(flatten)]
    pub map: MindMap,
    pub nodes: Vec<Node>,
}

/// Result of creating a map together with its initial nodes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapTree {
    pub map: MindMap,
    pub root: Node,
    pub children: Vec<Node>,
}

impl MapTree {
    /// Root first, then children in creation order
    pub fn nodes(&self) -> Vec<Node> {
        std::iter::once(self.root.clone())
            .chain(self.children.iter().cloned())
            .collect()
    }
}

/// The account row that carries a user's map quota
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "database", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
pub struct OwnerAccount {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub map_limit: i32,
    pub created_at: DateTime<Utc>,
}

/// Snapshot of how many maps an owner has against their limit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerQuota {
    pub map_count: i64,
    pub map_limit: i32,
}

impl OwnerQuota {
    pub fn has_capacity(&self) -> bool {
        self.map_count < i64::from(self.map_limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_node(level: i32, parent_id: Option<Uuid>) -> Node {
        Node {
            id: Uuid::new_v4(),
            content: "Light reactions".to_string(),
            explanation: "Happen in the thylakoid membrane.".to_string(),
            level,
            parent_id,
            mind_map_id: Uuid::new_v4(),
        }
    }

    #[test]
    fn test_node_serializes_camel_case() {
        let node = sample_node(1, Some(Uuid::nil()));
        let json = serde_json::to_value(&node).unwrap();
        assert!(json.get("parentId").is_some());
        assert!(json.get("mindMapId").is_some());
        assert_eq!(json["level"], 1);
    }

    #[test]
    fn test_is_root() {
        assert!(sample_node(0, None).is_root());
        assert!(!sample_node(1, Some(Uuid::nil())).is_root());
    }

    #[test]
    fn test_quota_capacity() {
        let quota = OwnerQuota {
            map_count: 3,
            map_limit: 3,
        };
        assert!(!quota.has_capacity());

        let quota = OwnerQuota {
            map_count: 2,
            map_limit: 3,
        };
        assert!(quota.has_capacity());
    }

    #[test]
    fn test_map_with_nodes_flattens_map_fields() {
        let map = MindMap {
            id: Uuid::new_v4(),
            title: "Photosynthesis".to_string(),
            owner_id: Uuid::new_v4(),
            created_at: Utc::now(),
        };
        let with_nodes = MindMapWithNodes {
            map,
            nodes: vec![],
        };
        let json = serde_json::to_value(&with_nodes).unwrap();
        assert_eq!(json["title"], "Photosynthesis");
        assert!(json["nodes"].as_array().unwrap().is_empty());
    }
}
