//! OpenAI-compatible chat completions client
//!
//! Works against any endpoint exposing `/chat/completions` with bearer auth.
//! The default configuration points at Groq.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info};

use super::{
    parse, prompts, AiConfig, AiError, AiResult, ExpandedSubtopic, GenerationService, Subtopic,
};

/// Chat completions client
#[derive(Debug, Clone)]
pub struct OpenAiCompatClient {
    config: AiConfig,
    client: Client,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: Option<u32>,
    #[serde(default)]
    completion_tokens: Option<u32>,
}

impl OpenAiCompatClient {
    pub fn new(config: AiConfig) -> AiResult<Self> {
        if config.api_key.is_empty() {
            return Err(AiError::MissingApiKey);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(AiError::Http)?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &AiConfig {
        &self.config
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    /// One chat completion round trip; returns the first choice's content
    async fn chat(&self, system_prompt: &str, user_prompt: &str, json_mode: bool) -> AiResult<String> {
        let body = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt,
                },
            ],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            response_format: json_mode.then_some(ResponseFormat {
                kind: "json_object",
            }),
        };

        debug!(
            "Sending chat request to {} (model {}, json_mode {})",
            self.endpoint(),
            self.config.model,
            json_mode
        );

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            error!("Model API error: {} - {}", status, text);
            return Err(AiError::Api(format!("HTTP {}: {}", status, text)));
        }

        let parsed: ChatResponse = serde_json::from_str(&text).map_err(|e| {
            error!("Failed to parse model response envelope: {}", e);
            AiError::Json(e)
        })?;

        if let Some(usage) = &parsed.usage {
            info!(
                "Model usage - prompt: {:?} tokens, completion: {:?} tokens",
                usage.prompt_tokens, usage.completion_tokens
            );
        }

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(AiError::EmptyResponse)
    }
}

#[async_trait]
impl GenerationService for OpenAiCompatClient {
    async fn generate_subtopics(&self, topic: &str, count: usize) -> AiResult<Vec<Subtopic>> {
        info!("Generating {} subtopics for '{}'", count, topic);
        let prompt = prompts::subtopics_prompt(topic, count);
        let raw = self.chat(prompts::JSON_SYSTEM_PROMPT, &prompt, true).await?;
        parse::parse_subtopics(&raw, count)
    }

    async fn expand_topic(
        &self,
        main_topic: &str,
        path: &[String],
        current_topic: &str,
        count: usize,
    ) -> AiResult<Vec<ExpandedSubtopic>> {
        info!(
            "Expanding '{}' ({} levels deep) with {} subtopics",
            current_topic,
            path.len(),
            count
        );
        let prompt = prompts::expand_prompt(main_topic, path, current_topic, count);
        let raw = self.chat(prompts::JSON_SYSTEM_PROMPT, &prompt, true).await?;
        parse::parse_expanded(&raw, count)
    }

    async fn explain_topic(
        &self,
        main_topic: &str,
        path: &[String],
        current_topic: &str,
    ) -> AiResult<String> {
        info!("Explaining '{}'", current_topic);
        let prompt = prompts::explain_prompt(main_topic, path, current_topic);
        let raw = self.chat(prompts::PROSE_SYSTEM_PROMPT, &prompt, false).await?;
        parse::parse_explanation(&raw)
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}
