//! PostgreSQL Tree Store tests
//!
//! Run with a scratch database:
//!   DATABASE_URL=postgresql://localhost/thoughtmap_test cargo test -- --ignored

#![cfg(feature = "database")]

use std::sync::Arc;
use uuid::Uuid;

use thoughtmap::config::DatabaseConfig;
use thoughtmap::models::{NewNode, OwnerAccount};
use thoughtmap::store::{PgTreeStore, TreeStore};
use thoughtmap::tree::validate_tree;
use thoughtmap::MindMapError;

async fn connect() -> PgTreeStore {
    let config = DatabaseConfig::from_env().expect("invalid database settings");
    let store = PgTreeStore::connect(&config)
        .await
        .expect("DATABASE_URL must point at a reachable database");
    store.migrate().await.expect("migrations failed");
    store
}

async fn new_owner(store: &PgTreeStore) -> OwnerAccount {
    let id = Uuid::new_v4();
    store
        .upsert_account(id, &format!("{}@example.com", id), Some("Test"))
        .await
        .unwrap()
}

fn batch(n: usize) -> Vec<NewNode> {
    (0..n)
        .map(|i| NewNode::new(format!("Child {}", i), "explained"))
        .collect()
}

#[tokio::test]
#[ignore = "Requires DATABASE_URL"]
async fn test_map_tree_round_trip_in_creation_order() {
    let store = connect().await;
    let owner = new_owner(&store).await;

    let tree = store
        .create_map_tree(owner.id, "Photosynthesis", "This is the main topic", &batch(5))
        .await
        .unwrap();
    let added = store
        .append_children(tree.map.id, tree.children[0].id, &batch(4))
        .await
        .unwrap();
    assert!(added.iter().all(|n| n.level == 2));

    let nodes = store.list_nodes_for_map(tree.map.id).await.unwrap();
    assert_eq!(nodes.len(), 10);
    assert_eq!(nodes[0].id, tree.root.id);
    let titles: Vec<&str> = nodes[1..6].iter().map(|n| n.content.as_str()).collect();
    assert_eq!(titles, vec!["Child 0", "Child 1", "Child 2", "Child 3", "Child 4"]);
    validate_tree(tree.map.id, &nodes).unwrap();

    let maps = store.list_maps_for_owner(owner.id).await.unwrap();
    assert_eq!(maps.len(), 1);
    assert_eq!(maps[0].nodes.len(), 10);
}

#[tokio::test]
#[ignore = "Requires DATABASE_URL"]
async fn test_quota_rechecked_under_concurrency() {
    let store = Arc::new(connect().await);
    let owner_id = new_owner(&store).await.id;

    let attempts: Vec<_> = (0..6)
        .map(|i| {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                store
                    .create_map_tree(owner_id, &format!("Topic {}", i), "root", &batch(1))
                    .await
            })
        })
        .collect();

    let mut created = 0;
    for attempt in attempts {
        match attempt.await.unwrap() {
            Ok(_) => created += 1,
            Err(MindMapError::QuotaExceeded { limit }) => assert_eq!(limit, 3),
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(created, 3);
    assert_eq!(store.owner_quota(owner_id).await.unwrap().map_count, 3);
}

#[tokio::test]
#[ignore = "Requires DATABASE_URL"]
async fn test_credits_and_foreign_parent() {
    let store = connect().await;
    let owner = new_owner(&store).await;

    let account = store.add_map_credits(&owner.email, 10).await.unwrap();
    assert_eq!(account.map_limit, owner.map_limit + 10);

    let a = store
        .create_map_tree(owner.id, "A", "root", &batch(1))
        .await
        .unwrap();
    let b = store
        .create_map_tree(owner.id, "B", "root", &batch(1))
        .await
        .unwrap();
    let err = store
        .append_children(a.map.id, b.root.id, &batch(4))
        .await
        .unwrap_err();
    assert!(matches!(err, MindMapError::NotFound(_)));
    assert_eq!(store.list_nodes_for_map(a.map.id).await.unwrap().len(), 2);
}
