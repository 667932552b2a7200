//! # sf-ai-gemini
//!
//! `TextGenerator` backed by the Google Gemini `generateContent` REST endpoint.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sf_core::traits::TextGenerator;
use tracing::{debug, instrument};

#[derive(Debug, thiserror::Error)]
pub enum GeminiError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Gemini returned {status}: {message}")]
    Api { status: StatusCode, message: String },

    #[error("prompt blocked by Gemini: {0}")]
    Blocked(String),

    #[error("Gemini response contained no text")]
    EmptyResponse,
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<PromptPart<'a>>,
}

#[derive(Debug, Serialize)]
struct PromptPart<'a> {
    text: &'a str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Joins the text parts of the first candidate.
fn extract_text(response: GenerateContentResponse) -> Result<String, GeminiError> {
    let Some(candidate) = response.candidates.into_iter().next() else {
        let reason = response
            .prompt_feedback
            .and_then(|f| f.block_reason)
            .unwrap_or_else(|| "no candidates".to_string());
        return Err(GeminiError::Blocked(reason));
    };

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        return match candidate.finish_reason.as_deref() {
            Some("SAFETY") | Some("PROHIBITED_CONTENT") | Some("BLOCKLIST") => {
                Err(GeminiError::Blocked(candidate.finish_reason.unwrap_or_default()))
            }
            _ => Err(GeminiError::EmptyResponse),
        };
    }
    Ok(text)
}

/// HTTP client for one Gemini model.
pub struct GeminiTextGenerator {
    client: Client,
    base_url: String,
    model: String,
    api_key: SecretString,
}

impl std::fmt::Debug for GeminiTextGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiTextGenerator")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl GeminiTextGenerator {
    pub fn with_endpoint(api_key: SecretString, base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model)
    }

    #[instrument(skip(self, prompt), fields(model = %self.model, prompt_chars = prompt.len()))]
    async fn generate_content(&self, prompt: &str) -> Result<String, GeminiError> {
        let body = GenerateContentRequest {
            contents: vec![Content { role: "user", parts: vec![PromptPart { text: prompt }] }],
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let raw = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&raw)
                .map(|b| b.error.message)
                .unwrap_or(raw);
            return Err(GeminiError::Api { status, message });
        }

        let parsed: GenerateContentResponse = response.json().await?;
        let text = extract_text(parsed)?;
        debug!(chars = text.len(), "gemini response received");
        Ok(text)
    }
}

#[async_trait]
impl TextGenerator for GeminiTextGenerator {
    async fn generate(&self, prompt: &str) -> anyhow::Result<String> {
        Ok(self.generate_content(prompt).await?)
    }
}
