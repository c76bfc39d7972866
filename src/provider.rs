//! Remote generative model access.
//!
//! The pipeline only sees the [`Provider`] trait and the classified
//! [`Completion`] it returns. [`GeminiClient`] implements it against the
//! Google Generative Language REST API.

use crate::config::ApiConfig;
use crate::error::ProviderError;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Outcome of a single generation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// The model produced usable text.
    Success(String),
    /// The request went through but no usable text came back
    /// (safety block, empty candidate list).
    Filtered(String),
    /// The service signalled quota or rate exhaustion.
    RateLimited(String),
    /// Anything else; not worth retrying.
    Fatal(String),
}

/// A remote model that turns a prompt into text.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Send one prompt and classify the result.
    async fn generate(&self, prompt: &str) -> Completion;
}

/// Request body for `generateContent`.
#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

/// Response body of `generateContent`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct GenerateResponse {
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CandidateContent {
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct PromptFeedback {
    block_reason: Option<String>,
}

/// Error envelope returned with non-success statuses.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ErrorBody {
    message: String,
    status: String,
}

/// Model listing returned by `GET /models`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ModelList {
    models: Vec<ModelInfo>,
    next_page_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ModelInfo {
    name: String,
    supported_generation_methods: Vec<String>,
}

/// Client for the Generative Language API.
pub struct GeminiClient {
    /// HTTP client for API requests.
    client: Client,
    /// Endpoint root, without trailing slash.
    base_url: String,
    /// API key sent with every request.
    key: String,
    /// Model identifier, without the `models/` prefix.
    model: String,
}

impl GeminiClient {
    /// Create a client bound to one key and model.
    pub fn new(
        api_config: &ApiConfig,
        key: String,
        model: String,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: api_config.base_url.trim_end_matches('/').to_string(),
            key,
            model: model
                .strip_prefix("models/")
                .map(str::to_string)
                .unwrap_or(model),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// List the models that support `generateContent`.
    pub async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        let mut models = Vec::new();
        let mut page_token: Option<String> = None;

        let url = format!("{}/models", self.base_url);

        loop {
            let mut request = self.client.get(&url).header("x-goog-api-key", &self.key);
            if let Some(ref token) = page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let response = request.send().await?;
            if !response.status().is_success() {
                let status = response.status();
                let text = response.text().await.unwrap_or_default();
                return Err(ProviderError::ApiError(format!("HTTP {}: {}", status, text)));
            }

            let page: ModelList = response
                .json()
                .await
                .map_err(|e| ProviderError::ParseError(e.to_string()))?;

            models.extend(
                page.models
                    .into_iter()
                    .filter(|m| {
                        m.supported_generation_methods
                            .iter()
                            .any(|method| method == "generateContent")
                    })
                    .map(|m| m.name.trim_start_matches("models/").to_string()),
            );

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(models)
    }
}

#[async_trait]
impl Provider for GeminiClient {
    async fn generate(&self, prompt: &str) -> Completion {
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
        };

        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        debug!(model = %self.model, prompt_chars = prompt.chars().count(), "Sending generateContent");

        let response = match self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.key)
            .json(&request)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return Completion::Fatal(format!("request failed: {}", e)),
        };

        let status = response.status();
        match response.text().await {
            Ok(body) => classify_response(status, &body),
            Err(e) => Completion::Fatal(format!("failed to read response body: {}", e)),
        }
    }
}

/// Classify an HTTP response from `generateContent`.
pub fn classify_response(status: StatusCode, body: &str) -> Completion {
    if !status.is_success() {
        let error = serde_json::from_str::<ErrorEnvelope>(body)
            .map(|e| e.error)
            .unwrap_or_default();
        let detail = if error.message.is_empty() {
            format!("HTTP {}: {}", status, body.trim())
        } else {
            format!("HTTP {}: {}", status, error.message)
        };

        if status == StatusCode::TOO_MANY_REQUESTS || error.status == "RESOURCE_EXHAUSTED" {
            return Completion::RateLimited(detail);
        }
        return Completion::Fatal(detail);
    }

    let parsed: GenerateResponse = match serde_json::from_str(body) {
        Ok(parsed) => parsed,
        Err(e) => return Completion::Fatal(format!("unparseable response: {}", e)),
    };

    if let Some(reason) = parsed.prompt_feedback.and_then(|f| f.block_reason) {
        return Completion::Filtered(format!("prompt blocked: {}", reason));
    }

    let Some(candidate) = parsed.candidates.into_iter().next() else {
        return Completion::Filtered("no candidates returned".to_string());
    };

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        let reason = candidate.finish_reason.unwrap_or_else(|| "UNKNOWN".to_string());
        return Completion::Filtered(format!("empty candidate (finish reason {})", reason));
    }

    Completion::Success(text)
}
