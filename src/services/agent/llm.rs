//! LLM Client - HTTP client for OpenAI-compatible APIs
//!
//! Model-agnostic text generation, JSON-constrained generation, keyword
//! extraction, and embeddings behind one capability trait so vendor swaps
//! are a drop-in. Callable concurrently; the underlying reqwest client
//! handles its own connection pool.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::models::AgentError;
use super::prompts;
use crate::config::LlmConfig;

/// Base delay for the single transient retry; doubles up to the cap
const RETRY_BASE: Duration = Duration::from_millis(500);
const RETRY_CAP: Duration = Duration::from_secs(2);

/// Capability set the orchestration engine needs from a generative model
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Free-text generation
    async fn generate_text(&self, prompt: &str) -> Result<String, AgentError>;

    /// JSON-constrained generation. Post-validates that the response is a
    /// JSON object; retries once with a repair hint, then fails.
    async fn generate_json(
        &self,
        prompt: &str,
        schema_hint: &str,
    ) -> Result<serde_json::Value, AgentError>;

    /// Compact comma-separated keyword string distilled from a question
    async fn generate_search_keywords(&self, question: &str) -> Result<String, AgentError>;

    /// Embed text into the vendor's vector space
    async fn embed(&self, text: &str) -> Result<Vec<f32>, AgentError>;
}

/// Vendor client for OpenAI-compatible chat/completions and embeddings APIs
pub struct OpenAiCompatClient {
    http_client: Client,
    api_base: String,
    api_key: String,
    model: String,
    embedding_model: String,
    max_tokens: u32,
    temperature: f64,
    timeout: Duration,
}

impl OpenAiCompatClient {
    pub fn new(config: &LlmConfig) -> Result<Self, AgentError> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AgentError::LlmTransient(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            embedding_model: config.embedding_model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    /// Startup reachability check (simple models list request)
    pub async fn probe(&self) -> Result<(), AgentError> {
        let url = format!("{}/models", self.api_base);
        let response = self
            .http_client
            .get(&url)
            .bearer_auth(&self.api_key)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| AgentError::LlmTransient(format!("LLM endpoint unreachable: {}", e)))?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(AgentError::LlmTransient("invalid LLM API key".to_string()));
        }
        Ok(())
    }

    async fn chat(&self, prompt: &str, json_mode: bool) -> Result<String, AgentError> {
        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage { role: "user".to_string(), content: prompt.to_string() }],
            max_tokens: Some(self.max_tokens),
            temperature: Some(self.temperature),
            response_format: json_mode
                .then(|| ResponseFormat { r#type: "json_object".to_string() }),
        };

        // Transient failures are retried once with exponential backoff
        let mut delay = RETRY_BASE;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.chat_once(&request).await {
                Ok(content) => return Ok(content),
                Err(e) if e.is_retryable() && attempt == 1 => {
                    tracing::warn!("transient LLM failure, retrying in {:?}: {}", delay, e);
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(RETRY_CAP);
                },
                Err(e) => return Err(e),
            }
        }
    }

    async fn chat_once(&self, request: &ChatCompletionRequest) -> Result<String, AgentError> {
        let url = format!("{}/chat/completions", self.api_base);

        tracing::debug!("calling LLM API: {} with model {}", url, request.model);

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AgentError::LlmTransient(format!(
                        "timed out after {}s",
                        self.timeout.as_secs()
                    ))
                } else {
                    AgentError::LlmTransient(e.to_string())
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(AgentError::LlmTransient(format!("API error {}", status)));
        }

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(AgentError::LlmParse(format!("API error {}: {}", status, error_text)));
        }

        let chat_response: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| AgentError::LlmParse(e.to_string()))?;

        chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AgentError::LlmParse("empty response from LLM".to_string()))
    }
}

#[async_trait]
impl LanguageModel for OpenAiCompatClient {
    async fn generate_text(&self, prompt: &str) -> Result<String, AgentError> {
        self.chat(prompt, false).await
    }

    async fn generate_json(
        &self,
        prompt: &str,
        schema_hint: &str,
    ) -> Result<serde_json::Value, AgentError> {
        let full_prompt = format!("{}\n\n{}", prompt, schema_hint);
        let content = self.chat(&full_prompt, true).await?;

        match parse_json_object(&content) {
            Ok(value) => Ok(value),
            Err(first_err) => {
                // One repair attempt, then the failure is terminal
                tracing::warn!("malformed LLM JSON, retrying with repair hint: {}", first_err);
                let repair_prompt = format!(
                    "{}\n\n{}\n\nYour previous reply was not valid JSON. \
                     Return valid JSON only, with no surrounding text.",
                    prompt, schema_hint
                );
                let content = self.chat(&repair_prompt, true).await?;
                parse_json_object(&content).map_err(AgentError::LlmParse)
            },
        }
    }

    async fn generate_search_keywords(&self, question: &str) -> Result<String, AgentError> {
        let keywords = self
            .chat(&prompts::build_keyword_prompt(question), false)
            .await?;
        Ok(keywords.trim().trim_matches('"').to_string())
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, AgentError> {
        let url = format!("{}/embeddings", self.api_base);
        let request = EmbeddingRequest {
            model: self.embedding_model.clone(),
            input: text.to_string(),
        };

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| AgentError::LlmTransient(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AgentError::LlmTransient(format!("embeddings API error {}", status)));
        }

        let body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| AgentError::LlmParse(e.to_string()))?;

        body.data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| AgentError::LlmParse("empty embedding response".to_string()))
    }
}

fn parse_json_object(content: &str) -> Result<serde_json::Value, String> {
    let value: serde_json::Value =
        serde_json::from_str(content.trim()).map_err(|e| e.to_string())?;
    if !value.is_object() {
        return Err(format!("expected a JSON object, got: {}", value));
    }
    Ok(value)
}

// ============================================================================
// Vendor API Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    r#type: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest {
    model: String,
    input: String,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_json_object_accepts_objects_only() {
        assert!(parse_json_object(r#"{"a": 1}"#).is_ok());
        assert!(parse_json_object(r#"  {"a": 1}  "#).is_ok());
        assert!(parse_json_object(r#"[1, 2]"#).is_err());
        assert!(parse_json_object("not json").is_err());
    }
}
