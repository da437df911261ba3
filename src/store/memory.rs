//! In-memory Tree Store for tests and local development

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{TreeStore, DEFAULT_MAP_LIMIT};
use crate::error::{MindMapError, MindMapResult};
use crate::models::{
    MapTree, MindMap, MindMapWithNodes, NewNode, Node, OwnerAccount, OwnerQuota,
};

#[derive(Debug, Default)]
struct State {
    accounts: HashMap<Uuid, OwnerAccount>,
    /// Creation order
    maps: Vec<MindMap>,
    /// Creation order
    nodes: Vec<Node>,
}

impl State {
    fn quota(&self, owner_id: Uuid) -> MindMapResult<OwnerQuota> {
        let account = self
            .accounts
            .get(&owner_id)
            .ok_or(MindMapError::Unauthorized)?;
        let map_count = self.maps.iter().filter(|m| m.owner_id == owner_id).count() as i64;
        Ok(OwnerQuota {
            map_count,
            map_limit: account.map_limit,
        })
    }

    fn check_capacity(&self, owner_id: Uuid) -> MindMapResult<()> {
        let quota = self.quota(owner_id)?;
        if !quota.has_capacity() {
            return Err(MindMapError::QuotaExceeded {
                limit: quota.map_limit,
            });
        }
        Ok(())
    }

    fn map_exists(&self, map_id: Uuid) -> bool {
        self.maps.iter().any(|m| m.id == map_id)
    }

    fn node(&self, node_id: Uuid) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == node_id)
    }

    fn nodes_for(&self, map_id: Uuid) -> Vec<Node> {
        self.nodes
            .iter()
            .filter(|n| n.mind_map_id == map_id)
            .cloned()
            .collect()
    }
}

/// Tree Store held entirely in memory.
///
/// Batch writes are validated and staged in full before anything is
/// committed, so a failure leaves no partial batch behind.
#[derive(Debug)]
pub struct InMemoryTreeStore {
    state: RwLock<State>,
    default_map_limit: i32,
    fail_writes: AtomicBool,
}

impl Default for InMemoryTreeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryTreeStore {
    pub fn new() -> Self {
        Self::with_default_map_limit(DEFAULT_MAP_LIMIT)
    }

    pub fn with_default_map_limit(default_map_limit: i32) -> Self {
        Self {
            state: RwLock::new(State::default()),
            default_map_limit,
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Register an owner account with the default map limit
    pub async fn insert_account(&self, email: &str, name: Option<&str>) -> OwnerAccount {
        let account = OwnerAccount {
            id: Uuid::new_v4(),
            email: email.to_string(),
            name: name.map(String::from),
            map_limit: self.default_map_limit,
            created_at: Utc::now(),
        };
        self.state
            .write()
            .await
            .accounts
            .insert(account.id, account.clone());
        account
    }

    /// Make every subsequent write fail with `PersistenceFailure` until reset
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub async fn node_count(&self) -> usize {
        self.state.read().await.nodes.len()
    }

    pub async fn map_count(&self) -> usize {
        self.state.read().await.maps.len()
    }

    fn check_writable(&self) -> MindMapResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            warn!("Injected write failure");
            return Err(MindMapError::PersistenceFailure(
                "write rejected by store".to_string(),
            ));
        }
        Ok(())
    }
}

fn stage_children(mind_map_id: Uuid, parent: &Node, children: &[NewNode]) -> Vec<Node> {
    children
        .iter()
        .map(|child| Node {
            id: Uuid::new_v4(),
            content: child.content.clone(),
            explanation: child.explanation.clone(),
            level: parent.level + 1,
            parent_id: Some(parent.id),
            mind_map_id,
        })
        .collect()
}

#[async_trait]
impl TreeStore for InMemoryTreeStore {
    async fn create_map(&self, owner_id: Uuid, topic: &str) -> MindMapResult<MindMap> {
        let mut state = self.state.write().await;
        state.check_capacity(owner_id)?;
        self.check_writable()?;

        let map = MindMap {
            id: Uuid::new_v4(),
            title: topic.to_string(),
            owner_id,
            created_at: Utc::now(),
        };
        state.maps.push(map.clone());
        Ok(map)
    }

    async fn create_node(
        &self,
        mind_map_id: Uuid,
        content: &str,
        explanation: &str,
        level: i32,
        parent_id: Option<Uuid>,
    ) -> MindMapResult<Node> {
        let mut state = self.state.write().await;
        if !state.map_exists(mind_map_id) {
            return Err(MindMapError::map_not_found(mind_map_id));
        }

        match parent_id {
            None => {
                if level != 0 {
                    return Err(MindMapError::InvalidTree(format!(
                        "node without a parent must be level 0, got {}",
                        level
                    )));
                }
                if state
                    .nodes
                    .iter()
                    .any(|n| n.mind_map_id == mind_map_id && n.parent_id.is_none())
                {
                    return Err(MindMapError::InvalidTree(format!(
                        "mind map {} already has a root",
                        mind_map_id
                    )));
                }
            }
            Some(parent_id) => {
                let parent = state
                    .node(parent_id)
                    .filter(|p| p.mind_map_id == mind_map_id)
                    .ok_or_else(|| MindMapError::node_not_found(parent_id))?;
                if parent.level + 1 != level {
                    return Err(MindMapError::InvalidTree(format!(
                        "level {} under parent at level {}",
                        level, parent.level
                    )));
                }
            }
        }
        self.check_writable()?;

        let node = Node {
            id: Uuid::new_v4(),
            content: content.to_string(),
            explanation: explanation.to_string(),
            level,
            parent_id,
            mind_map_id,
        };
        state.nodes.push(node.clone());
        Ok(node)
    }

    async fn list_nodes_for_map(&self, mind_map_id: Uuid) -> MindMapResult<Vec<Node>> {
        Ok(self.state.read().await.nodes_for(mind_map_id))
    }

    async fn list_maps_for_owner(&self, owner_id: Uuid) -> MindMapResult<Vec<MindMapWithNodes>> {
        let state = self.state.read().await;
        Ok(state
            .maps
            .iter()
            .rev()
            .filter(|m| m.owner_id == owner_id)
            .map(|map| MindMapWithNodes {
                map: map.clone(),
                nodes: state.nodes_for(map.id),
            })
            .collect())
    }

    async fn owner_quota(&self, owner_id: Uuid) -> MindMapResult<OwnerQuota> {
        self.state.read().await.quota(owner_id)
    }

    async fn get_map(&self, map_id: Uuid) -> MindMapResult<Option<MindMap>> {
        let state = self.state.read().await;
        Ok(state.maps.iter().find(|m| m.id == map_id).cloned())
    }

    async fn get_node(&self, node_id: Uuid) -> MindMapResult<Option<Node>> {
        Ok(self.state.read().await.node(node_id).cloned())
    }

    async fn create_map_tree(
        &self,
        owner_id: Uuid,
        topic: &str,
        root_explanation: &str,
        children: &[NewNode],
    ) -> MindMapResult<MapTree> {
        let mut state = self.state.write().await;
        state.check_capacity(owner_id)?;

        let map = MindMap {
            id: Uuid::new_v4(),
            title: topic.to_string(),
            owner_id,
            created_at: Utc::now(),
        };
        let root = Node {
            id: Uuid::new_v4(),
            content: topic.to_string(),
            explanation: root_explanation.to_string(),
            level: 0,
            parent_id: None,
            mind_map_id: map.id,
        };
        let staged = stage_children(map.id, &root, children);
        self.check_writable()?;

        debug!(
            "Committing map {} with root and {} children",
            map.id,
            staged.len()
        );
        state.maps.push(map.clone());
        state.nodes.push(root.clone());
        state.nodes.extend(staged.iter().cloned());

        Ok(MapTree {
            map,
            root,
            children: staged,
        })
    }

    async fn append_children(
        &self,
        mind_map_id: Uuid,
        parent_id: Uuid,
        children: &[NewNode],
    ) -> MindMapResult<Vec<Node>> {
        let mut state = self.state.write().await;
        if !state.map_exists(mind_map_id) {
            return Err(MindMapError::map_not_found(mind_map_id));
        }
        let parent = state
            .node(parent_id)
            .filter(|p| p.mind_map_id == mind_map_id)
            .ok_or_else(|| MindMapError::node_not_found(parent_id))?;

        let staged = stage_children(mind_map_id, parent, children);
        self.check_writable()?;

        state.nodes.extend(staged.iter().cloned());
        Ok(staged)
    }

    async fn add_map_credits(&self, email: &str, amount: i32) -> MindMapResult<OwnerAccount> {
        let mut state = self.state.write().await;
        self.check_writable()?;
        let account = state
            .accounts
            .values_mut()
            .find(|a| a.email == email)
            .ok_or_else(|| MindMapError::NotFound(format!("user with email {}", email)))?;
        account.map_limit = account.map_limit.checked_add(amount).ok_or_else(|| {
            MindMapError::InvalidRequest(format!(
                "adding {} credits would overflow the map limit",
                amount
            ))
        })?;
        Ok(account.clone())
    }
}
