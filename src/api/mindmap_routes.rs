//! Mind map endpoints
//!
//! All routes here sit behind [`super::jwt::jwt_auth`]. Generation and
//! expansion run on a spawned task, so a client that disconnects does not
//! cancel an operation that is already underway.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use uuid::Uuid;

use super::error::ApiError;
use super::jwt::AuthenticatedUser;
use super::AppState;
use crate::error::MindMapResult;
use crate::layout::{Edge, MapSnapshot, PositionedNode};
use crate::models::{MindMapWithNodes, Node};

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub topic: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub nodes: Vec<PositionedNode>,
    pub edges: Vec<Edge>,
    pub mind_map_id: Uuid,
}

/// Identifies the node to act on. The client also sends `mainTopic` and
/// `nodePath`; both are ignored in favour of the persisted tree.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentNodeRef {
    pub id: Uuid,
    pub mind_map_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRequest {
    pub current_node: CurrentNodeRef,
}

#[derive(Debug, Serialize)]
pub struct ExpandResponse {
    /// Only the children created by this expansion
    pub nodes: Vec<Node>,
    pub snapshot: MapSnapshot,
}

#[derive(Debug, Serialize)]
pub struct ExplainResponse {
    pub explanation: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserMindMapsResponse {
    pub mind_maps: Vec<MindMapWithNodes>,
}

pub fn create_mindmap_router() -> Router<AppState> {
    Router::new()
        .route("/api/mindmap/generate", post(generate))
        .route("/api/mindmap/expand", post(expand))
        .route("/api/mindmap/explain", post(explain))
        .route("/api/mindmap/user-mindmaps", get(user_mindmaps))
        .route("/api/mindmap/:id", get(load_map))
}

/// Run an orchestrator call to completion on its own task
async fn detached<T, F>(operation: F) -> Result<T, ApiError>
where
    F: Future<Output = MindMapResult<T>> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(operation)
        .await
        .map_err(|e| ApiError::Internal(format!("operation task failed: {}", e)))?
        .map_err(ApiError::from)
}

async fn generate(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    body: Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<Json<GenerateResponse>, ApiError> {
    let Json(request) = body?;
    let orchestrator = state.orchestrator.clone();
    let generated =
        detached(async move { orchestrator.generate_root(user.owner_id, &request.topic).await })
            .await?;

    Ok(Json(GenerateResponse {
        nodes: generated.snapshot.nodes,
        edges: generated.snapshot.edges,
        mind_map_id: generated.map.id,
    }))
}

async fn expand(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    body: Result<Json<NodeRequest>, JsonRejection>,
) -> Result<Json<ExpandResponse>, ApiError> {
    let Json(request) = body?;
    let orchestrator = state.orchestrator.clone();
    let CurrentNodeRef { id, mind_map_id } = request.current_node;
    let outcome =
        detached(async move { orchestrator.expand(user.owner_id, mind_map_id, id).await }).await?;

    Ok(Json(ExpandResponse {
        nodes: outcome.children,
        snapshot: outcome.snapshot,
    }))
}

async fn explain(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    body: Result<Json<NodeRequest>, JsonRejection>,
) -> Result<Json<ExplainResponse>, ApiError> {
    let Json(request) = body?;
    let CurrentNodeRef { id, mind_map_id } = request.current_node;
    let explanation = state
        .orchestrator
        .explain(user.owner_id, mind_map_id, id)
        .await?;
    Ok(Json(ExplainResponse { explanation }))
}

async fn user_mindmaps(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<UserMindMapsResponse>, ApiError> {
    let mind_maps = state.orchestrator.list_maps(user.owner_id).await?;
    Ok(Json(UserMindMapsResponse { mind_maps }))
}

async fn load_map(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(map_id): Path<Uuid>,
) -> Result<Json<MapSnapshot>, ApiError> {
    let snapshot = state.orchestrator.load(user.owner_id, map_id).await?;
    Ok(Json(snapshot))
}
