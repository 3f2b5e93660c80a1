use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::warn;

use crate::connector::adapter::ChatClient;
use crate::domain::DomainError;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const MAX_TOKENS: u32 = 512;

#[derive(serde::Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<ApiMessage<'a>>,
}

#[derive(serde::Serialize)]
struct ApiMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ApiResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// HTTP client for the OpenAI chat completions API (and compatible
/// endpoints).
pub struct OpenAiClient {
    client: reqwest::Client,
    api_key: String,
    url: String,
}

impl OpenAiClient {
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
            url: format!("{}/chat/completions", base.trim_end_matches('/')),
        }
    }
}

#[async_trait]
impl ChatClient for OpenAiClient {
    async fn complete(
        &self,
        model: &str,
        system: &str,
        user: &str,
    ) -> Result<String, DomainError> {
        let request = ApiRequest {
            model,
            max_tokens: MAX_TOKENS,
            messages: vec![
                ApiMessage {
                    role: "system",
                    content: system,
                },
                ApiMessage {
                    role: "user",
                    content: user,
                },
            ],
        };

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| DomainError::llm(format!("OpenAI request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!("OpenAI API returned {status}: {body}");
            return Err(DomainError::llm(format!("OpenAI API returned {status}")));
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| DomainError::llm(format!("Failed to parse OpenAI response: {e}")))?;

        Ok(api_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }
}
