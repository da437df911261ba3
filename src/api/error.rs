//! HTTP error mapping
//!
//! Every failure becomes `{ "error": "<short message>" }` with a status that
//! reflects its kind. Internal details are logged, not returned.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

use crate::billing::WebhookError;
use crate::error::MindMapError;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    MindMap(#[from] MindMapError),

    #[error(transparent)]
    Webhook(#[from] WebhookError),

    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Invalid request body: {0}")]
    InvalidBody(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MindMap(err) => match err {
                MindMapError::Unauthorized => StatusCode::UNAUTHORIZED,
                MindMapError::QuotaExceeded { .. } => StatusCode::FORBIDDEN,
                MindMapError::NotFound(_) => StatusCode::NOT_FOUND,
                MindMapError::ExpansionInProgress(_) => StatusCode::CONFLICT,
                MindMapError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
                MindMapError::GenerationFailure(_)
                | MindMapError::PersistenceFailure(_)
                | MindMapError::InvalidTree(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Webhook(WebhookError::BadPayload(_)) => StatusCode::BAD_REQUEST,
            ApiError::Webhook(WebhookError::InvalidSecret) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Webhook(_) => StatusCode::UNAUTHORIZED,
            ApiError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ApiError::InvalidBody(_) => StatusCode::BAD_REQUEST,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message returned to the client
    pub fn public_message(&self) -> String {
        match self {
            ApiError::MindMap(MindMapError::GenerationFailure(_)) => {
                "Failed to generate content".to_string()
            }
            ApiError::MindMap(MindMapError::PersistenceFailure(_))
            | ApiError::MindMap(MindMapError::InvalidTree(_))
            | ApiError::Internal(_) => "Internal server error".to_string(),
            ApiError::Webhook(WebhookError::InvalidSecret) => "Internal server error".to_string(),
            ApiError::Webhook(WebhookError::BadPayload(_)) => "Invalid webhook payload".to_string(),
            ApiError::Webhook(_) => "Invalid webhook signature".to_string(),
            ApiError::Unauthenticated(_) => "Unauthorized".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::InvalidBody(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        } else {
            warn!("Request rejected ({}): {}", status, self);
        }
        (
            status,
            Json(ErrorResponse {
                error: self.public_message(),
            }),
        )
            .into_response()
    }
}
