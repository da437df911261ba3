//! Tree Store
//!
//! Persisted hierarchy of topic nodes per mind map, plus the owner account
//! row holding the map quota. Nodes and maps are append-only: nothing here
//! updates or deletes them.
//!
//! Batch writes (`create_map_tree`, `append_children`) are all or nothing.

pub mod memory;
#[cfg(feature = "database")]
pub mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::MindMapResult;
use crate::models::{MapTree, MindMap, MindMapWithNodes, NewNode, Node, OwnerAccount, OwnerQuota};

pub use memory::InMemoryTreeStore;
#[cfg(feature = "database")]
pub use postgres::PgTreeStore;

/// Map quota given to accounts that have not bought any credits
pub const DEFAULT_MAP_LIMIT: i32 = 3;

#[async_trait]
pub trait TreeStore: Send + Sync {
    /// Create an empty map titled `topic`.
    /// `Unauthorized` for an unknown owner, `QuotaExceeded` when at the limit.
    async fn create_map(&self, owner_id: Uuid, topic: &str) -> MindMapResult<MindMap>;

    /// Create a single node. A root (`parent_id` = None) must be level 0 and
    /// the map must not have one yet; any other node sits one level below
    /// a parent in the same map.
    async fn create_node(
        &self,
        mind_map_id: Uuid,
        content: &str,
        explanation: &str,
        level: i32,
        parent_id: Option<Uuid>,
    ) -> MindMapResult<Node>;

    /// Nodes of a map in creation order
    async fn list_nodes_for_map(&self, mind_map_id: Uuid) -> MindMapResult<Vec<Node>>;

    /// Maps of an owner, newest first, each with its nodes in creation order
    async fn list_maps_for_owner(&self, owner_id: Uuid) -> MindMapResult<Vec<MindMapWithNodes>>;

    /// `Unauthorized` for an unknown owner
    async fn owner_quota(&self, owner_id: Uuid) -> MindMapResult<OwnerQuota>;

    async fn get_map(&self, map_id: Uuid) -> MindMapResult<Option<MindMap>>;

    async fn get_node(&self, node_id: Uuid) -> MindMapResult<Option<Node>>;

    /// Create a map, its root and the root's children in one atomic write.
    /// The quota is re-checked inside the same write.
    async fn create_map_tree(
        &self,
        owner_id: Uuid,
        topic: &str,
        root_explanation: &str,
        children: &[NewNode],
    ) -> MindMapResult<MapTree>;

    /// Append a batch of children under `parent_id` in one atomic write,
    /// preserving batch order
    async fn append_children(
        &self,
        mind_map_id: Uuid,
        parent_id: Uuid,
        children: &[NewNode],
    ) -> MindMapResult<Vec<Node>>;

    /// Raise the map limit of the account registered under `email`
    async fn add_map_credits(&self, email: &str, amount: i32) -> MindMapResult<OwnerAccount>;
}
