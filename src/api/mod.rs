//! REST API
//!
//! ```text
//! GET  /api/health                   public
//! POST /api/webhook                  public, signature verified
//! POST /api/mindmap/generate         bearer token
//! POST /api/mindmap/expand           bearer token
//! POST /api/mindmap/explain          bearer token
//! GET  /api/mindmap/user-mindmaps    bearer token
//! GET  /api/mindmap/:id              bearer token
//! ```

pub mod error;
pub mod jwt;
pub mod mindmap_routes;
pub mod webhook_routes;

use axum::{middleware as axum_mw, routing::get, Extension, Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::billing::WebhookVerifier;
use crate::orchestrator::ExpansionOrchestrator;

pub use error::{ApiError, ErrorResponse};
pub use jwt::{jwt_auth, AuthenticatedUser, JwtClaims, JwtConfig};

/// Shared state for all handlers
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<ExpansionOrchestrator>,
    /// None when no webhook secret is configured
    pub webhook: Option<WebhookVerifier>,
}

impl AppState {
    pub fn new(orchestrator: Arc<ExpansionOrchestrator>, webhook: Option<WebhookVerifier>) -> Self {
        Self {
            orchestrator,
            webhook,
        }
    }
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Build the full router with all routes and middleware
pub fn create_router(state: AppState, jwt_config: JwtConfig) -> Router {
    // Routes that require a session
    let protected = mindmap_routes::create_mindmap_router()
        .layer(axum_mw::from_fn(jwt_auth))
        .layer(Extension(jwt_config));

    // Public routes (no auth)
    let public = Router::new()
        .route("/api/health", get(health))
        .merge(webhook_routes::create_webhook_router());

    public
        .merge(protected)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                ),
        )
        .with_state(state)
}
