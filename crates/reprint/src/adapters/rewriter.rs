// ABOUTME: The Rewriter capability trait and its chat-completions HTTP implementation.
// ABOUTME: Sends one block of plain text per request with a per-mode system prompt.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::PipelineError;

/// Which system prompt a rewrite request uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewriteMode {
    Title,
    Body,
}

/// A black-box text-transform capability.
///
/// Implementations receive one unit of plain text and return a rewritten unit
/// of comparable length and meaning. Callers own the fallback policy: any
/// error degrades to the original text for that unit only.
#[async_trait]
pub trait Rewriter: Send + Sync {
    async fn rewrite(&self, text: &str, mode: RewriteMode) -> Result<String, PipelineError>;
}

const TITLE_SYSTEM_PROMPT: &str = "Rewrite the following title while maintaining its original meaning and style. Make it more engaging and SEO-friendly.";

const BODY_SYSTEM_PROMPT: &str = "Rewrite this text while maintaining the original style, tone, and meaning. Make it more engaging and professional.";

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// Rewriter backed by an OpenAI-style chat-completions endpoint.
pub struct ChatRewriter {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl ChatRewriter {
    pub const DEFAULT_BASE_URL: &'static str = "https://api.openai.com/v1";
    pub const DEFAULT_MODEL: &'static str = "gpt-3.5-turbo";

    /// Create a rewriter against the given endpoint.
    ///
    /// The rewriting service is a trusted endpoint, so this client validates
    /// certificates regardless of the source-site policy.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .expect("failed to build HTTP client");
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    /// Create a rewriter against the default endpoint and model.
    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        Self::new(Self::DEFAULT_BASE_URL, api_key, Self::DEFAULT_MODEL)
    }

    fn request_for(&self, text: &str, mode: RewriteMode) -> ChatRequest {
        let (system, max_tokens) = match mode {
            RewriteMode::Title => (TITLE_SYSTEM_PROMPT, 50),
            // Sized to the input: rewritten prose of comparable length.
            RewriteMode::Body => (
                BODY_SYSTEM_PROMPT,
                (text.split_whitespace().count() as u32 * 2).max(50),
            ),
        };
        ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: text.to_string(),
                },
            ],
            temperature: 0.5,
            max_tokens,
        }
    }
}

#[async_trait]
impl Rewriter for ChatRewriter {
    async fn rewrite(&self, text: &str, mode: RewriteMode) -> Result<String, PipelineError> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = self.request_for(text, mode);

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| PipelineError::rewrite(&url, "Rewrite", Some(anyhow::anyhow!(e))))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::rewrite(
                &url,
                "Rewrite",
                Some(anyhow::anyhow!("HTTP status {}", status.as_u16())),
            ));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::rewrite(&url, "Rewrite", Some(anyhow::anyhow!(e))))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.trim().to_string())
            .unwrap_or_default();

        if content.is_empty() {
            return Err(PipelineError::rewrite(
                &url,
                "Rewrite",
                Some(anyhow::anyhow!("empty completion")),
            ));
        }

        Ok(content)
    }
}
