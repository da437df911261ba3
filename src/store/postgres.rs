//! PostgreSQL Tree Store
//!
//! Runtime-checked `sqlx` queries. Every batch write runs in one transaction;
//! the owner row is locked with `FOR UPDATE` while the quota is checked so two
//! concurrent creations cannot both take the last slot.

use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool, Postgres, Transaction};
use std::collections::HashMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::TreeStore;
use crate::config::DatabaseConfig;
use crate::error::{MindMapError, MindMapResult};
use crate::models::{
    MapTree, MindMap, MindMapWithNodes, NewNode, Node, OwnerAccount, OwnerQuota,
};

const NODE_COLUMNS: &str = "id, content, explanation, level, parent_id, mind_map_id";

pub struct PgTreeStore {
    pool: PgPool,
}

impl PgTreeStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a connection pool with the given configuration
    pub async fn connect(config: &DatabaseConfig) -> MindMapResult<Self> {
        info!("Connecting to database: {}", config.masked_url());

        let mut pool_options = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connection_timeout);

        if let Some(idle_timeout) = config.idle_timeout {
            pool_options = pool_options.idle_timeout(idle_timeout);
        }

        if let Some(max_lifetime) = config.max_lifetime {
            pool_options = pool_options.max_lifetime(max_lifetime);
        }

        let pool = pool_options
            .connect(&config.database_url)
            .await
            .map_err(|e| {
                warn!("Failed to connect to database: {}", e);
                e
            })?;

        info!("Database connection pool created successfully");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the bundled schema migrations
    pub async fn migrate(&self) -> MindMapResult<()> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Insert or refresh an account row, as the identity provider does on sign-in
    pub async fn upsert_account(
        &self,
        id: Uuid,
        email: &str,
        name: Option<&str>,
    ) -> MindMapResult<OwnerAccount> {
        let account = sqlx::query_as::<_, OwnerAccount>(
            r#"
            INSERT INTO users (id, email, name)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE SET email = EXCLUDED.email, name = EXCLUDED.name
            RETURNING id, email, name, map_limit, created_at
            "#,
        )
        .bind(id)
        .bind(email)
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        Ok(account)
    }

    async fn locked_quota(
        tx: &mut Transaction<'_, Postgres>,
        owner_id: Uuid,
    ) -> MindMapResult<OwnerQuota> {
        let map_limit: Option<i32> =
            sqlx::query_scalar("SELECT map_limit FROM users WHERE id = $1 FOR UPDATE")
                .bind(owner_id)
                .fetch_optional(&mut **tx)
                .await?;
        let map_limit = map_limit.ok_or(MindMapError::Unauthorized)?;

        let map_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM mind_maps WHERE owner_id = $1")
            .bind(owner_id)
            .fetch_one(&mut **tx)
            .await?;

        Ok(OwnerQuota {
            map_count,
            map_limit,
        })
    }

    async fn insert_map(
        tx: &mut Transaction<'_, Postgres>,
        owner_id: Uuid,
        topic: &str,
    ) -> MindMapResult<MindMap> {
        let quota = Self::locked_quota(tx, owner_id).await?;
        if !quota.has_capacity() {
            return Err(MindMapError::QuotaExceeded {
                limit: quota.map_limit,
            });
        }

        let map = sqlx::query_as::<_, MindMap>(
            r#"
            INSERT INTO mind_maps (id, title, owner_id)
            VALUES ($1, $2, $3)
            RETURNING id, title, owner_id, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(topic)
        .bind(owner_id)
        .fetch_one(&mut **tx)
        .await?;
        Ok(map)
    }

    async fn insert_node(
        tx: &mut Transaction<'_, Postgres>,
        mind_map_id: Uuid,
        content: &str,
        explanation: &str,
        level: i32,
        parent_id: Option<Uuid>,
    ) -> MindMapResult<Node> {
        let sql = format!(
            "INSERT INTO nodes (id, content, explanation, level, parent_id, mind_map_id) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {}",
            NODE_COLUMNS
        );
        let node = sqlx::query_as::<_, Node>(&sql)
            .bind(Uuid::new_v4())
            .bind(content)
            .bind(explanation)
            .bind(level)
            .bind(parent_id)
            .bind(mind_map_id)
            .fetch_one(&mut **tx)
            .await?;
        Ok(node)
    }

    async fn parent_in_map(
        tx: &mut Transaction<'_, Postgres>,
        mind_map_id: Uuid,
        parent_id: Uuid,
    ) -> MindMapResult<Node> {
        let sql = format!(
            "SELECT {} FROM nodes WHERE id = $1 AND mind_map_id = $2",
            NODE_COLUMNS
        );
        sqlx::query_as::<_, Node>(&sql)
            .bind(parent_id)
            .bind(mind_map_id)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or_else(|| MindMapError::node_not_found(parent_id))
    }

    async fn ensure_map(tx: &mut Transaction<'_, Postgres>, mind_map_id: Uuid) -> MindMapResult<()> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM mind_maps WHERE id = $1)")
                .bind(mind_map_id)
                .fetch_one(&mut **tx)
                .await?;
        if !exists {
            return Err(MindMapError::map_not_found(mind_map_id));
        }
        Ok(())
    }
}

#[async_trait]
impl TreeStore for PgTreeStore {
    async fn create_map(&self, owner_id: Uuid, topic: &str) -> MindMapResult<MindMap> {
        let mut tx = self.pool.begin().await?;
        let map = Self::insert_map(&mut tx, owner_id, topic).await?;
        tx.commit().await?;
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
        let mut tx = self.pool.begin().await?;
        Self::ensure_map(&mut tx, mind_map_id).await?;

        match parent_id {
            None => {
                if level != 0 {
                    return Err(MindMapError::InvalidTree(format!(
                        "node without a parent must be level 0, got {}",
                        level
                    )));
                }
                let has_root: bool = sqlx::query_scalar(
                    "SELECT EXISTS (SELECT 1 FROM nodes WHERE mind_map_id = $1 AND parent_id IS NULL)",
                )
                .bind(mind_map_id)
                .fetch_one(&mut *tx)
                .await?;
                if has_root {
                    return Err(MindMapError::InvalidTree(format!(
                        "mind map {} already has a root",
                        mind_map_id
                    )));
                }
            }
            Some(parent_id) => {
                let parent = Self::parent_in_map(&mut tx, mind_map_id, parent_id).await?;
                if parent.level + 1 != level {
                    return Err(MindMapError::InvalidTree(format!(
                        "level {} under parent at level {}",
                        level, parent.level
                    )));
                }
            }
        }

        let node =
            Self::insert_node(&mut tx, mind_map_id, content, explanation, level, parent_id).await?;
        tx.commit().await?;
        Ok(node)
    }

    async fn list_nodes_for_map(&self, mind_map_id: Uuid) -> MindMapResult<Vec<Node>> {
        let sql = format!(
            "SELECT {} FROM nodes WHERE mind_map_id = $1 ORDER BY seq",
            NODE_COLUMNS
        );
        let nodes = sqlx::query_as::<_, Node>(&sql)
            .bind(mind_map_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(nodes)
    }

    async fn list_maps_for_owner(&self, owner_id: Uuid) -> MindMapResult<Vec<MindMapWithNodes>> {
        let maps = sqlx::query_as::<_, MindMap>(
            r#"
            SELECT id, title, owner_id, created_at
            FROM mind_maps
            WHERE owner_id = $1
            ORDER BY created_at DESC, id
            "#,
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        let map_ids: Vec<Uuid> = maps.iter().map(|m| m.id).collect();
        let sql = format!(
            "SELECT {} FROM nodes WHERE mind_map_id = ANY($1) ORDER BY seq",
            NODE_COLUMNS
        );
        let nodes = sqlx::query_as::<_, Node>(&sql)
            .bind(&map_ids)
            .fetch_all(&self.pool)
            .await?;

        let mut by_map: HashMap<Uuid, Vec<Node>> = HashMap::new();
        for node in nodes {
            by_map.entry(node.mind_map_id).or_default().push(node);
        }

        debug!("Listed {} maps for owner {}", maps.len(), owner_id);
        Ok(maps
            .into_iter()
            .map(|map| MindMapWithNodes {
                nodes: by_map.remove(&map.id).unwrap_or_default(),
                map,
            })
            .collect())
    }

    async fn owner_quota(&self, owner_id: Uuid) -> MindMapResult<OwnerQuota> {
        let row: Option<(i32, i64)> = sqlx::query_as(
            r#"
            SELECT u.map_limit, COUNT(m.id)
            FROM users u
            LEFT JOIN mind_maps m ON m.owner_id = u.id
            WHERE u.id = $1
            GROUP BY u.map_limit
            "#,
        )
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?;

        let (map_limit, map_count) = row.ok_or(MindMapError::Unauthorized)?;
        Ok(OwnerQuota {
            map_count,
            map_limit,
        })
    }

    async fn get_map(&self, map_id: Uuid) -> MindMapResult<Option<MindMap>> {
        let map = sqlx::query_as::<_, MindMap>(
            "SELECT id, title, owner_id, created_at FROM mind_maps WHERE id = $1",
        )
        .bind(map_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(map)
    }

    async fn get_node(&self, node_id: Uuid) -> MindMapResult<Option<Node>> {
        let sql = format!("SELECT {} FROM nodes WHERE id = $1", NODE_COLUMNS);
        let node = sqlx::query_as::<_, Node>(&sql)
            .bind(node_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(node)
    }

    async fn create_map_tree(
        &self,
        owner_id: Uuid,
        topic: &str,
        root_explanation: &str,
        children: &[NewNode],
    ) -> MindMapResult<MapTree> {
        let mut tx = self.pool.begin().await?;

        let map = Self::insert_map(&mut tx, owner_id, topic).await?;
        let root = Self::insert_node(&mut tx, map.id, topic, root_explanation, 0, None).await?;

        let mut created = Vec::with_capacity(children.len());
        for child in children {
            created.push(
                Self::insert_node(
                    &mut tx,
                    map.id,
                    &child.content,
                    &child.explanation,
                    1,
                    Some(root.id),
                )
                .await?,
            );
        }

        tx.commit().await?;
        info!(
            "Created mind map {} for owner {} with {} children",
            map.id,
            owner_id,
            created.len()
        );

        Ok(MapTree {
            map,
            root,
            children: created,
        })
    }

    async fn append_children(
        &self,
        mind_map_id: Uuid,
        parent_id: Uuid,
        children: &[NewNode],
    ) -> MindMapResult<Vec<Node>> {
        let mut tx = self.pool.begin().await?;
        Self::ensure_map(&mut tx, mind_map_id).await?;
        let parent = Self::parent_in_map(&mut tx, mind_map_id, parent_id).await?;

        let mut created = Vec::with_capacity(children.len());
        for child in children {
            created.push(
                Self::insert_node(
                    &mut tx,
                    mind_map_id,
                    &child.content,
                    &child.explanation,
                    parent.level + 1,
                    Some(parent.id),
                )
                .await?,
            );
        }

        tx.commit().await?;
        debug!("Appended {} children under node {}", created.len(), parent_id);
        Ok(created)
    }

    async fn add_map_credits(&self, email: &str, amount: i32) -> MindMapResult<OwnerAccount> {
        sqlx::query_as::<_, OwnerAccount>(
            r#"
            UPDATE users SET map_limit = map_limit + $1
            WHERE email = $2
            RETURNING id, email, name, map_limit, created_at
            "#,
        )
        .bind(amount)
        .bind(email)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| MindMapError::NotFound(format!("user with email {}", email)))
    }
}
