//! Gemini API client for stage completions
//!
//! Every stage prompt goes through here. Calls are wrapped by the shared
//! retry combinator; a reply without text at
//! `candidates[0].content.parts[0].text` counts as malformed and is retried.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::AnalystError;
use crate::http::{HttpRequest, HttpResponse};
use crate::retry::RetryableFetcher;
use crate::Result;

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

const HARM_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

/// Trait for text completion (LLM controlled)
#[async_trait]
pub trait CompletionModel: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Reusable Gemini client
pub struct GeminiClient {
    fetcher: RetryableFetcher,
    api_key: String,
    endpoint: String,
    generation_config: GenerationConfig,
}

impl GeminiClient {
    pub fn new(fetcher: RetryableFetcher, api_key: String, base_url: &str, model: &str) -> Self {
        Self {
            fetcher,
            api_key,
            endpoint: format!("{}/{}:generateContent", base_url.trim_end_matches('/'), model),
            generation_config: GenerationConfig::default(),
        }
    }

    fn build_request(&self, prompt: &str) -> GeminiRequest {
        GeminiRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: self.generation_config.clone(),
            safety_settings: HARM_CATEGORIES
                .iter()
                .map(|category| SafetySetting {
                    category: category.to_string(),
                    threshold: "BLOCK_NONE".to_string(),
                })
                .collect(),
        }
    }
}

#[async_trait]
impl CompletionModel for GeminiClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        if self.api_key.is_empty() {
            return Err(AnalystError::ConfigError(
                "GEMINI_API_KEY not configured".to_string(),
            ));
        }

        let url = format!("{}?key={}", self.endpoint, self.api_key);
        let body = serde_json::to_value(self.build_request(prompt))?;
        let request = HttpRequest::post_json(url, body);

        info!(prompt_chars = prompt.len(), "Calling Gemini API");

        let answer = self
            .fetcher
            .fetch("gemini", &request, extract_text)
            .await?;

        info!(answer_chars = answer.len(), "Gemini response received");

        Ok(answer)
    }
}

/// Pull the first candidate's text out of a generateContent reply
fn extract_text(response: &HttpResponse) -> Result<String> {
    let parsed: GeminiResponse = serde_json::from_str(&response.body).map_err(|e| {
        AnalystError::MalformedResponse(format!("Gemini parse error: {}", e))
    })?;

    let text = parsed
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .and_then(|c| c.parts.into_iter().next())
        .map(|p| p.text)
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(AnalystError::MalformedResponse(
            "Invalid response format from Gemini API".to_string(),
        ));
    }

    Ok(text)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
    safety_settings: Vec<SafetySetting>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_k: u32,
    top_p: f32,
    max_output_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            top_k: 20,
            top_p: 0.8,
            max_output_tokens: 2048,
        }
    }
}

#[derive(Debug, Serialize)]
struct SafetySetting {
    category: String,
    threshold: String,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryPolicy;
    use crate::testing::ScriptedTransport;
    use std::sync::Arc;
    use std::time::Duration;

    const REPLY: &str =
        r#"{"candidates":[{"content":{"parts":[{"text":"ANSWER: YES"}]},"finishReason":"STOP"}]}"#;

    fn client(transport: Arc<ScriptedTransport>, key: &str) -> GeminiClient {
        let fetcher = RetryableFetcher::new(transport, RetryPolicy::new(3, Duration::ZERO));
        GeminiClient::new(fetcher, key.to_string(), "http://gemini/models", DEFAULT_MODEL)
    }

    #[test]
    fn test_request_serialization() {
        let transport = Arc::new(ScriptedTransport::new());
        let request = client(transport, "k").build_request("Will BTC rise?");
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["contents"][0]["parts"][0]["text"], "Will BTC rise?");
        assert_eq!(json["generationConfig"]["topK"], 20);
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 2048);
        assert_eq!(json["safetySettings"].as_array().unwrap().len(), 4);
        assert!(json["safetySettings"]
            .as_array()
            .unwrap()
            .iter()
            .all(|s| s["threshold"] == "BLOCK_NONE"));
    }

    #[tokio::test]
    async fn test_complete_returns_first_candidate_text() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.route_always("generateContent", HttpResponse::new(200, REPLY));

        let answer = client(transport.clone(), "secret").complete("prompt").await.unwrap();
        assert_eq!(answer, "ANSWER: YES");

        let sent = transport.requests();
        assert_eq!(
            sent[0].url,
            "http://gemini/models/gemini-2.0-flash:generateContent?key=secret"
        );
    }

    #[tokio::test]
    async fn test_empty_candidates_retried_then_exhausted() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.route_always("generateContent", HttpResponse::new(200, r#"{"candidates":[]}"#));

        let result = client(transport.clone(), "secret").complete("prompt").await;
        assert!(matches!(result, Err(AnalystError::FetchExhausted { .. })));
        assert_eq!(transport.request_count(), 3);
    }

    #[tokio::test]
    async fn test_missing_key_fails_without_calling_out() {
        let transport = Arc::new(ScriptedTransport::new());
        let result = client(transport.clone(), "").complete("prompt").await;

        assert!(matches!(result, Err(AnalystError::ConfigError(_))));
        assert_eq!(transport.request_count(), 0);
    }
}
