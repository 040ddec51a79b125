// Gemini LLM client

use crate::llm::{LlmClient, LlmError, PromptTurn};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    model_id: String,
}

#[derive(Serialize)]
struct GeminiRequestBody {
    contents: Vec<GeminiContent>,
}

#[derive(Serialize, Deserialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct GeminiPart {
    text: String,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: GeminiContent,
}

impl GeminiClient {
    const BASE_URL: &'static str = "https://generativelanguage.googleapis.com/v1beta/models";
    const DEFAULT_MODEL: &'static str = "gemini-1.5-flash-latest";

    pub fn new(api_key: impl Into<String>) -> Result<Self, LlmError> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(LlmError::MissingApiKey);
        }
        Ok(Self {
            // the generate call gets a hard 60s deadline regardless of
            // what the caller is doing
            client: Client::builder()
                .timeout(Duration::from_secs(60))
                .build()?,
            api_key,
            model_id: Self::DEFAULT_MODEL.to_string(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model_id
    }
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn generate(&self, turns: &[PromptTurn]) -> Result<String, LlmError> {
        let url = format!(
            "{}/{}:generateContent?key={}",
            Self::BASE_URL,
            self.model_id,
            self.api_key
        );

        let body = GeminiRequestBody {
            contents: turns
                .iter()
                .map(|turn| GeminiContent {
                    role: Some(turn.role.clone()),
                    parts: vec![GeminiPart {
                        text: turn.text.clone(),
                    }],
                })
                .collect(),
        };

        let response = self.client.post(&url).json(&body).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::ApiError { status, body });
        }

        let parsed: GeminiResponse = response.json().await?;
        let text = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .ok_or(LlmError::EmptyResponse)?;

        debug!(chars = text.len(), "Gemini response received");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_requires_api_key() {
        assert!(matches!(
            GeminiClient::new(""),
            Err(LlmError::MissingApiKey)
        ));
        let client = GeminiClient::new("test-key").unwrap();
        assert_eq!(client.model(), "gemini-1.5-flash-latest");
    }
}
