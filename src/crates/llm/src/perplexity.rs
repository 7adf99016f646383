//! Perplexity web-search client.
//!
//! Perplexity exposes an OpenAI-compatible chat endpoint whose answers are
//! grounded in live web results. The research agent uses it for technology
//! verification and general lookups, and degrades gracefully when no
//! `PERPLEXITY_API_KEY` is configured.

use crate::config::RemoteLlmConfig;
use crate::error::{LlmError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.perplexity.ai";
const DEFAULT_MODEL: &str = "sonar";

/// Result of one web search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSearchResult {
    /// Synthesized answer text.
    pub answer: String,
    /// Source URLs cited by the provider.
    pub citations: Vec<String>,
}

/// A web-search provider.
#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &str) -> Result<WebSearchResult>;
}

/// Perplexity API client.
#[derive(Clone)]
pub struct PerplexityClient {
    config: RemoteLlmConfig,
    client: Client,
}

impl PerplexityClient {
    /// Create a new Perplexity client with the given configuration.
    pub fn new(config: RemoteLlmConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(LlmError::Http)?;
        Ok(Self { config, client })
    }

    /// Create a client from `PERPLEXITY_API_KEY`, or `None` when the key is
    /// not configured (research then skips web lookups).
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("PERPLEXITY_API_KEY").ok()?;
        Self::new(RemoteLlmConfig::new(api_key, DEFAULT_BASE_URL, DEFAULT_MODEL)).ok()
    }
}

#[async_trait]
impl WebSearch for PerplexityClient {
    async fn search(&self, query: &str) -> Result<WebSearchResult> {
        let url = format!("{}/chat/completions", self.config.base_url);

        let req_body = PerplexityRequest {
            model: self.config.model.clone(),
            messages: vec![PerplexityMessage {
                role: "user".to_string(),
                content: query.to_string(),
            }],
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(&req_body)
            .send()
            .await
            .map_err(LlmError::Http)?;

        if !response.status().is_success() {
            let status = response.status();
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .map(Duration::from_secs);
            let error_text = response.text().await.unwrap_or_default();

            return Err(match status.as_u16() {
                401 => LlmError::Authentication(error_text),
                429 => LlmError::RateLimited {
                    message: error_text,
                    retry_after,
                },
                _ => LlmError::Provider(format!("Perplexity API error {status}: {error_text}")),
            });
        }

        let resp: PerplexityResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let answer = resp
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LlmError::InvalidResponse("response has no choices".to_string()))?;

        Ok(WebSearchResult {
            answer,
            citations: resp.citations.unwrap_or_default(),
        })
    }
}

#[derive(Debug, Serialize)]
struct PerplexityRequest {
    model: String,
    messages: Vec<PerplexityMessage>,
}

#[derive(Debug, Serialize)]
struct PerplexityMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct PerplexityResponse {
    choices: Vec<PerplexityChoice>,
    citations: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct PerplexityChoice {
    message: PerplexityResponseMessage,
}

#[derive(Debug, Deserialize)]
struct PerplexityResponseMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_parsing_with_citations() {
        let raw = serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "FastAPI 0.115 is current"}}],
            "citations": ["https://fastapi.tiangolo.com"]
        });
        let resp: PerplexityResponse = serde_json::from_value(raw).unwrap();
        assert_eq!(resp.citations.unwrap().len(), 1);
        assert!(resp.choices[0]
            .message
            .content
            .as_deref()
            .unwrap()
            .contains("FastAPI"));
    }
}
