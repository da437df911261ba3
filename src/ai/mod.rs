//! Generation collaborator
//!
//! The language model turns a topic, and the path leading to it, into
//! structured subtopics. The core only depends on [`GenerationService`];
//! [`openai_client::OpenAiCompatClient`] is the shipped implementation.

pub mod openai_client;
pub mod parse;
pub mod prompts;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use openai_client::OpenAiCompatClient;

/// Default OpenAI-compatible endpoint (Groq)
pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";

/// Default chat model
pub const DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";

/// Errors raised while talking to or parsing the language model
#[derive(Error, Debug)]
pub enum AiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: {0}")]
    Api(String),

    #[error("No content returned from AI")]
    EmptyResponse,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("API key not configured")]
    MissingApiKey,
}

pub type AiResult<T> = Result<T, AiError>;

/// Connection settings for the language model
#[derive(Clone, PartialEq)]
pub struct AiConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Per-request timeout; a request is attempted exactly once
    pub timeout_seconds: u64,
}

impl std::fmt::Debug for AiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AiConfig")
            .field("api_key", &"***")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_seconds", &self.timeout_seconds)
            .finish()
    }
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: Some(0.7),
            max_tokens: None,
            timeout_seconds: 60,
        }
    }
}

/// A subtopic produced for a new map
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subtopic {
    pub title: String,
    pub explanation: String,
}

/// A subtopic produced by expanding an existing node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpandedSubtopic {
    pub title: String,
    pub explanation: String,
    #[serde(default)]
    pub importance: Option<String>,
}

impl ExpandedSubtopic {
    /// Explanation as stored: the importance note is appended after a space
    pub fn stored_explanation(&self) -> String {
        match self.importance.as_deref().map(str::trim) {
            Some(note) if !note.is_empty() => format!("{} {}", self.explanation, note),
            _ => self.explanation.clone(),
        }
    }
}

/// Language model operations used by the orchestrator
#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Subtopics for a brand new map (`count` = 5 in the default policy)
    async fn generate_subtopics(&self, topic: &str, count: usize) -> AiResult<Vec<Subtopic>>;

    /// Subtopics for an existing node (`count` = 4 in the default policy).
    /// `path` holds the labels from the root down to `current_topic`.
    async fn expand_topic(
        &self,
        main_topic: &str,
        path: &[String],
        current_topic: &str,
        count: usize,
    ) -> AiResult<Vec<ExpandedSubtopic>>;

    /// Prose explanation of a node in the context of its map
    async fn explain_topic(
        &self,
        main_topic: &str,
        path: &[String],
        current_topic: &str,
    ) -> AiResult<String>;

    fn model_name(&self) -> &str;
}
