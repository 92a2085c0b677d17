//! Google Gemini API client
//!
//! Implements [`ReasoningClient`] over the `generateContent` REST endpoint.
//! A primary and a fallback model are configured; transport or API failures
//! on the primary are retried once against the fallback before surfacing.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::{HistoryEntry, ReasoningClient, Role};
use crate::config::AgentConfig;
use crate::error::LlmError;

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const REQUEST_TIMEOUT_SECS: u64 = 120;
const MAX_OUTPUT_TOKENS: u32 = 4096;

/// Gemini API client.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    api_key: String,
    client: Client,
    model: String,
    fallback_model: String,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(rename = "systemInstruction")]
    system_instruction: GeminiSystemInstruction,
    #[serde(rename = "generationConfig")]
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize)]
struct GeminiSystemInstruction {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    role: &'static str,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Debug, Serialize)]
struct GeminiGenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
    #[serde(rename = "responseMimeType")]
    response_mime_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default, rename = "usageMetadata")]
    usage_metadata: Option<GeminiUsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: GeminiResponseContent,
}

#[derive(Debug, Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponsePart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct GeminiUsageMetadata {
    #[serde(default, rename = "promptTokenCount")]
    prompt_token_count: Option<u32>,
    #[serde(default, rename = "candidatesTokenCount")]
    candidates_token_count: Option<u32>,
    #[serde(default, rename = "totalTokenCount")]
    total_token_count: Option<u32>,
}

impl GeminiClient {
    /// Create a client from agent configuration and an explicit key.
    pub fn new(api_key: String, agent: &AgentConfig) -> Result<Self, LlmError> {
        if api_key.is_empty() {
            return Err(LlmError::Authentication);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        info!(
            model = %agent.model,
            fallback = %agent.fallback_model,
            "Gemini client ready"
        );
        Ok(Self {
            api_key,
            client,
            model: agent.model.clone(),
            fallback_model: agent.fallback_model.clone(),
            temperature: agent.temperature,
        })
    }

    /// Create from the `GEMINI_API_KEY` environment variable.
    pub fn from_env(agent: &AgentConfig) -> Result<Self, LlmError> {
        let api_key = std::env::var("GEMINI_API_KEY").map_err(|_| LlmError::Authentication)?;
        Self::new(api_key, agent)
    }

    fn build_contents(history: &[HistoryEntry]) -> Vec<GeminiContent> {
        history
            .iter()
            .map(|entry| match entry.role {
                Role::User => GeminiContent {
                    role: "user",
                    parts: vec![GeminiPart {
                        text: entry.content.clone(),
                    }],
                },
                Role::Assistant => GeminiContent {
                    role: "model",
                    parts: vec![GeminiPart {
                        text: entry.content.clone(),
                    }],
                },
                // Tool results travel back as user-role observations.
                Role::Observation => GeminiContent {
                    role: "user",
                    parts: vec![GeminiPart {
                        text: format!("OBSERVATION:\n{}", entry.content),
                    }],
                },
            })
            .collect()
    }

    async fn send_request(
        &self,
        model: &str,
        system_prompt: &str,
        history: &[HistoryEntry],
    ) -> Result<String, LlmError> {
        let request_body = GeminiRequest {
            contents: Self::build_contents(history),
            system_instruction: GeminiSystemInstruction {
                parts: vec![GeminiPart {
                    text: system_prompt.to_string(),
                }],
            },
            generation_config: GeminiGenerationConfig {
                temperature: self.temperature,
                max_output_tokens: MAX_OUTPUT_TOKENS,
                response_mime_type: "application/json",
            },
        };

        let url = format!("{BASE_URL}/{model}:generateContent?key={}", self.api_key);
        debug!(
            "sending request to {}",
            url.replace(&self.api_key, "***")
        );

        let response = self.client.post(&url).json(&request_body).send().await?;

        let status = response.status();
        let response_text = response.text().await?;
        if !status.is_success() {
            error!("Gemini API error: {} - {}", status, response_text);
            return Err(LlmError::Api(format!("HTTP {status}: {response_text}")));
        }

        let parsed: GeminiResponse = serde_json::from_str(&response_text)?;
        if let Some(usage) = &parsed.usage_metadata {
            debug!(
                prompt_tokens = ?usage.prompt_token_count,
                response_tokens = ?usage.candidates_token_count,
                total_tokens = ?usage.total_token_count,
                "Gemini usage"
            );
        }

        let text = parsed
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.clone())
            .ok_or_else(|| LlmError::InvalidResponse("no candidates in response".to_string()))?;
        if text.is_empty() {
            return Err(LlmError::InvalidResponse("empty candidate text".to_string()));
        }
        Ok(text)
    }
}

#[async_trait]
impl ReasoningClient for GeminiClient {
    async fn plan(
        &self,
        system_prompt: &str,
        history: &[HistoryEntry],
    ) -> Result<String, LlmError> {
        match self.send_request(&self.model, system_prompt, history).await {
            Ok(text) => Ok(text),
            Err(e) if matches!(e, LlmError::Http(_) | LlmError::Api(_)) => {
                warn!(
                    model = %self.model,
                    fallback = %self.fallback_model,
                    error = %e,
                    "primary model failed, trying fallback"
                );
                self.send_request(&self.fallback_model, system_prompt, history)
                    .await
            }
            Err(other) => Err(other),
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
