//! Answer generation over retrieved context.
//!
//! [`Completion`] is the seam for chat models. [`OpenAiCompletion`] talks to
//! any OpenAI-compatible `/chat/completions` endpoint (OpenAI itself or
//! OpenRouter). [`build_prompt`] turns a question and its hits into the
//! user message.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::error::{RadiateError, Result};
use crate::models::SearchHit;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant using retrieved context.";

const SERVICE: &str = "chat completions";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// A generated answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub text: String,
    pub latency_ms: u64,
    pub token_usage: Option<TokenUsage>,
    /// The user message that was sent.
    pub prompt: String,
}

#[async_trait]
pub trait Completion: Send + Sync {
    fn model_name(&self) -> &str;

    async fn generate_answer(&self, prompt: &str) -> Result<Answer>;
}

/// Number the hits and append the question.
pub fn build_prompt(question: &str, hits: &[SearchHit]) -> String {
    let context = hits
        .iter()
        .enumerate()
        .map(|(i, hit)| format!("Chunk {}: {}", i + 1, hit.text))
        .collect::<Vec<_>>()
        .join("\n\n");
    format!("{}\n\nQuestion: {}", context, question)
}

pub struct OpenAiCompletion {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    system_prompt: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<TokenUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiCompletion {
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            RadiateError::Config("llm.api_key (or LLM_API_KEY) is required".to_string())
        })?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RadiateError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url_or_default(),
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
        })
    }
}

#[async_trait]
impl Completion for OpenAiCompletion {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate_answer(&self, prompt: &str) -> Result<Answer> {
        let started = Instant::now();
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &self.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            max_tokens: self.max_tokens,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| RadiateError::from_transport(SERVICE, e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(RadiateError::from_status(SERVICE, status, &text));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| RadiateError::from_transport(SERVICE, e))?;
        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| RadiateError::Backend(format!("{} returned no choices", SERVICE)))?;

        Ok(Answer {
            text: text.trim().to_string(),
            latency_ms: started.elapsed().as_millis() as u64,
            token_usage: parsed.usage,
            prompt: prompt.to_string(),
        })
    }
}
