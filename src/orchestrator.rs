//! Expansion Orchestrator
//!
//! Runs one generate or expand operation end to end: preconditions, one call
//! to the generation collaborator, one atomic store write, then layout.
//!
//! At most one expansion runs per node and one root generation per owner.
//! A second request for the same key is rejected with `ExpansionInProgress`
//! rather than queued. Expansions of different nodes run concurrently.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};
use uuid::Uuid;

use crate::ai::parse::take_batch;
use crate::ai::GenerationService;
use crate::error::{MindMapError, MindMapResult};
use crate::layout::{LayoutEngine, MapSnapshot};
use crate::models::{MindMap, MindMapWithNodes, NewNode, Node, ROOT_EXPLANATION};
use crate::store::TreeStore;
use crate::tree::NodeIndex;

/// How many subtopics each operation asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationPolicy {
    pub initial_subtopics: usize,
    pub expansion_subtopics: usize,
}

impl Default for GenerationPolicy {
    fn default() -> Self {
        Self {
            initial_subtopics: 5,
            expansion_subtopics: 4,
        }
    }
}

/// What the orchestrator is doing for a given owner or node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationState {
    Idle,
    Generating { topic: String },
    Expanding { node_id: Uuid },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum FlightKey {
    Owner(Uuid),
    Node(Uuid),
}

type FlightTable = Mutex<HashMap<FlightKey, OperationState>>;

/// Releases its key when dropped, including when the request future is
/// cancelled mid-generation
struct FlightGuard {
    table: Arc<FlightTable>,
    key: FlightKey,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.table
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.key);
    }
}

/// A freshly created map
#[derive(Debug, Clone)]
pub struct GeneratedMap {
    pub map: MindMap,
    pub root: Node,
    pub children: Vec<Node>,
    pub snapshot: MapSnapshot,
}

impl GeneratedMap {
    /// Root first, then children in creation order
    pub fn nodes(&self) -> Vec<Node> {
        std::iter::once(self.root.clone())
            .chain(self.children.iter().cloned())
            .collect()
    }
}

/// Result of expanding one node
#[derive(Debug, Clone)]
pub struct ExpansionOutcome {
    /// Only the nodes created by this expansion
    pub children: Vec<Node>,
    /// Full map after the expansion
    pub snapshot: MapSnapshot,
}

pub struct ExpansionOrchestrator {
    store: Arc<dyn TreeStore>,
    generator: Arc<dyn GenerationService>,
    layout: LayoutEngine,
    policy: GenerationPolicy,
    in_flight: Arc<FlightTable>,
}

impl ExpansionOrchestrator {
    pub fn new(store: Arc<dyn TreeStore>, generator: Arc<dyn GenerationService>) -> Self {
        Self {
            store,
            generator,
            layout: LayoutEngine::new(),
            policy: GenerationPolicy::default(),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn with_policy(mut self, policy: GenerationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_layout(mut self, layout: LayoutEngine) -> Self {
        self.layout = layout;
        self
    }

    pub fn store(&self) -> &Arc<dyn TreeStore> {
        &self.store
    }

    pub fn policy(&self) -> GenerationPolicy {
        self.policy
    }

    pub fn owner_state(&self, owner_id: Uuid) -> OperationState {
        self.state_of(FlightKey::Owner(owner_id))
    }

    pub fn node_state(&self, node_id: Uuid) -> OperationState {
        self.state_of(FlightKey::Node(node_id))
    }

    fn state_of(&self, key: FlightKey) -> OperationState {
        self.in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&key)
            .cloned()
            .unwrap_or(OperationState::Idle)
    }

    fn acquire(&self, key: FlightKey, state: OperationState) -> MindMapResult<FlightGuard> {
        let mut table = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if table.contains_key(&key) {
            let id = match key {
                FlightKey::Owner(id) | FlightKey::Node(id) => id,
            };
            warn!("Rejected concurrent operation for {}", id);
            return Err(MindMapError::ExpansionInProgress(id));
        }
        table.insert(key, state);
        Ok(FlightGuard {
            table: Arc::clone(&self.in_flight),
            key,
        })
    }

    /// Create a map for `topic` with its first ring of subtopics.
    ///
    /// Nothing is generated or written when the owner is at their quota.
    pub async fn generate_root(&self, owner_id: Uuid, topic: &str) -> MindMapResult<GeneratedMap> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(MindMapError::InvalidRequest(
                "topic must not be empty".to_string(),
            ));
        }

        let _guard = self.acquire(
            FlightKey::Owner(owner_id),
            OperationState::Generating {
                topic: topic.to_string(),
            },
        )?;

        let quota = self.store.owner_quota(owner_id).await?;
        if !quota.has_capacity() {
            info!(
                "Owner {} is at their map limit ({})",
                owner_id, quota.map_limit
            );
            return Err(MindMapError::QuotaExceeded {
                limit: quota.map_limit,
            });
        }

        info!(
            "Generating mind map '{}' for owner {} with {}",
            topic,
            owner_id,
            self.generator.model_name()
        );
        let subtopics = self
            .generator
            .generate_subtopics(topic, self.policy.initial_subtopics)
            .await
            .and_then(|subs| take_batch(subs, self.policy.initial_subtopics))
            .map_err(|e| {
                warn!("Generation failed for '{}': {}", topic, e);
                MindMapError::GenerationFailure(e)
            })?;

        let children: Vec<NewNode> = subtopics
            .into_iter()
            .map(|s| NewNode::new(s.title, s.explanation))
            .collect();

        let tree = self
            .store
            .create_map_tree(owner_id, topic, ROOT_EXPLANATION, &children)
            .await
            .map_err(|e| {
                warn!("Failed to persist mind map '{}': {}", topic, e);
                e
            })?;

        let snapshot = self.layout.snapshot(tree.map.id, &tree.nodes());
        info!(
            "Created mind map {} with {} nodes",
            tree.map.id,
            snapshot.node_count()
        );

        Ok(GeneratedMap {
            map: tree.map,
            root: tree.root,
            children: tree.children,
            snapshot,
        })
    }

    /// Add one batch of subtopics under `node_id`
    pub async fn expand(
        &self,
        owner_id: Uuid,
        map_id: Uuid,
        node_id: Uuid,
    ) -> MindMapResult<ExpansionOutcome> {
        let map = self.owned_map(owner_id, map_id).await?;

        let _guard = self.acquire(
            FlightKey::Node(node_id),
            OperationState::Expanding { node_id },
        )?;

        let nodes = self.store.list_nodes_for_map(map_id).await?;
        let (current, path) = resolve_path(&nodes, node_id)?;

        info!(
            "Expanding node '{}' in map {} (path: {})",
            current.content,
            map_id,
            path.join(" > ")
        );
        let subtopics = self
            .generator
            .expand_topic(
                &map.title,
                &path,
                &current.content,
                self.policy.expansion_subtopics,
            )
            .await
            .and_then(|subs| take_batch(subs, self.policy.expansion_subtopics))
            .map_err(|e| {
                warn!("Expansion of node {} failed: {}", node_id, e);
                MindMapError::GenerationFailure(e)
            })?;

        let batch: Vec<NewNode> = subtopics
            .iter()
            .map(|s| NewNode::new(s.title.clone(), s.stored_explanation()))
            .collect();

        let children = self
            .store
            .append_children(map_id, node_id, &batch)
            .await
            .map_err(|e| {
                warn!("Failed to persist expansion of node {}: {}", node_id, e);
                e
            })?;

        // Re-read so concurrent expansions of sibling nodes are included
        let nodes = self.store.list_nodes_for_map(map_id).await?;
        let snapshot = self.layout.snapshot(map_id, &nodes);
        info!(
            "Expanded node {} with {} children ({} nodes in map)",
            node_id,
            children.len(),
            snapshot.node_count()
        );

        Ok(ExpansionOutcome { children, snapshot })
    }

    /// Prose explanation of a node; nothing is persisted
    pub async fn explain(&self, owner_id: Uuid, map_id: Uuid, node_id: Uuid) -> MindMapResult<String> {
        let map = self.owned_map(owner_id, map_id).await?;
        let nodes = self.store.list_nodes_for_map(map_id).await?;
        let (current, path) = resolve_path(&nodes, node_id)?;

        info!("Explaining node '{}' in map {}", current.content, map_id);
        let explanation = self
            .generator
            .explain_topic(&map.title, &path, &current.content)
            .await
            .map_err(|e| {
                warn!("Explanation of node {} failed: {}", node_id, e);
                MindMapError::GenerationFailure(e)
            })?;
        Ok(explanation)
    }

    /// Positions and edges for a persisted map
    pub async fn load(&self, owner_id: Uuid, map_id: Uuid) -> MindMapResult<MapSnapshot> {
        self.owned_map(owner_id, map_id).await?;
        let nodes = self.store.list_nodes_for_map(map_id).await?;
        let snapshot = self.layout.snapshot(map_id, &nodes);
        let unplaced = snapshot.nodes.iter().filter(|n| n.position.is_none()).count();
        if unplaced > 0 {
            warn!(
                "Map {} has {} nodes unreachable from the root",
                map_id, unplaced
            );
        }
        Ok(snapshot)
    }

    /// Maps of an owner, newest first
    pub async fn list_maps(&self, owner_id: Uuid) -> MindMapResult<Vec<MindMapWithNodes>> {
        // Fails with Unauthorized for an unknown account
        self.store.owner_quota(owner_id).await?;
        self.store.list_maps_for_owner(owner_id).await
    }

    async fn owned_map(&self, owner_id: Uuid, map_id: Uuid) -> MindMapResult<MindMap> {
        self.store
            .get_map(map_id)
            .await?
            .filter(|m| m.owner_id == owner_id)
            .ok_or_else(|| MindMapError::map_not_found(map_id))
    }
}

/// The node plus the labels from the root down to it
fn resolve_path(nodes: &[Node], node_id: Uuid) -> MindMapResult<(Node, Vec<String>)> {
    let index = NodeIndex::new(nodes);
    let path = index.ancestor_path(node_id)?;
    let labels = path.iter().map(|n| n.content.clone()).collect();
    let current = path
        .last()
        .map(|n| (*n).clone())
        .ok_or_else(|| MindMapError::node_not_found(node_id))?;
    Ok((current, labels))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = GenerationPolicy::default();
        assert_eq!(policy.initial_subtopics, 5);
        assert_eq!(policy.expansion_subtopics, 4);
    }

    #[test]
    fn test_resolve_path_for_unknown_node() {
        let err = resolve_path(&[], Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, MindMapError::NotFound(_)));
    }

    #[test]
    fn test_flight_guard_releases_on_drop() {
        let table: Arc<FlightTable> = Arc::new(Mutex::new(HashMap::new()));
        let key = FlightKey::Node(Uuid::new_v4());
        table
            .lock()
            .unwrap()
            .insert(key, OperationState::Expanding { node_id: Uuid::nil() });
        {
            let _guard = FlightGuard {
                table: Arc::clone(&table),
                key,
            };
        }
        assert!(table.lock().unwrap().is_empty());
    }
}
