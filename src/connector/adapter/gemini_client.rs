use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::warn;

use crate::connector::adapter::ChatClient;
use crate::domain::DomainError;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const MAX_OUTPUT_TOKENS: u32 = 512;

#[derive(serde::Serialize)]
struct ApiRequest<'a> {
    system_instruction: ContentBlock<'a>,
    contents: Vec<ContentBlock<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(serde::Serialize)]
struct ContentBlock<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(serde::Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(serde::Serialize)]
struct GenerationConfig {
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Deserialize)]
struct ApiResponse {
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Deserialize)]
struct CandidateContent {
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: String,
}

/// HTTP client for the Gemini `generateContent` API. The key travels as a
/// query parameter per the API contract and never appears in logs.
pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        let base: String = base_url.into();
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            api_key: api_key.into(),
            base_url: base.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ChatClient for GeminiClient {
    async fn complete(
        &self,
        model: &str,
        system: &str,
        user: &str,
    ) -> Result<String, DomainError> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, model, self.api_key
        );

        let request = ApiRequest {
            system_instruction: ContentBlock {
                parts: vec![Part { text: system }],
            },
            contents: vec![ContentBlock {
                parts: vec![Part { text: user }],
            }],
            generation_config: GenerationConfig {
                max_output_tokens: MAX_OUTPUT_TOKENS,
            },
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| DomainError::llm(format!("Gemini request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!("Gemini API returned {status}: {body}");
            return Err(DomainError::llm(format!("Gemini API returned {status}")));
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| DomainError::llm(format!("Failed to parse Gemini response: {e}")))?;

        Ok(api_response
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .unwrap_or_default())
    }

    fn provider_name(&self) -> &'static str {
        "gemini"
    }
}
