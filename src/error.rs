//! Error handling for mind map generation and storage
//!
//! One taxonomy for the core flows. Checks that can fail without side effects
//! (`Unauthorized`, `QuotaExceeded`, `NotFound`) are raised before any write;
//! `GenerationFailure` is raised before any node exists for the batch.

use thiserror::Error;
use uuid::Uuid;

use crate::ai::AiError;

/// Main error type for the mind map core
#[derive(Error, Debug)]
pub enum MindMapError {
    #[error("Unauthorized: a valid session is required")]
    Unauthorized,

    #[error("Mind map limit reached ({limit} maps). Purchase more credits to create new maps")]
    QuotaExceeded { limit: i32 },

    #[error("Generation failed: {0}")]
    GenerationFailure(#[from] AiError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),

    #[error("An expansion is already running for {0}")]
    ExpansionInProgress(Uuid),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Tree invariant violated: {0}")]
    InvalidTree(String),
}

impl MindMapError {
    pub fn map_not_found(map_id: Uuid) -> Self {
        MindMapError::NotFound(format!("mind map {}", map_id))
    }

    pub fn node_not_found(node_id: Uuid) -> Self {
        MindMapError::NotFound(format!("node {}", node_id))
    }
}

#[cfg(feature = "database")]
impl From<sqlx::Error> for MindMapError {
    fn from(err: sqlx::Error) -> Self {
        MindMapError::PersistenceFailure(err.to_string())
    }
}

#[cfg(feature = "database")]
impl From<sqlx::migrate::MigrateError> for MindMapError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        MindMapError::PersistenceFailure(format!("migration failed: {}", err))
    }
}

pub type MindMapResult<T> = Result<T, MindMapError>;
