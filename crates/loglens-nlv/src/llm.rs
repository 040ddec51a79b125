// LLM client trait
// The orchestrator builds prompts and parses answers; a client only has
// to turn a list of turns into generated text.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("LLM API error ({status}): {body}")]
    ApiError { status: u16, body: String },

    #[error("LLM returned an empty response")]
    EmptyResponse,

    #[error("Missing API key")]
    MissingApiKey,
}

/// One prompt turn, role "user" or "model".
#[derive(Debug, Clone, PartialEq)]
pub struct PromptTurn {
    pub role: String,
    pub text: String,
}

impl PromptTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: "model".to_string(),
            text: text.into(),
        }
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Generate a completion for the given turns.
    async fn generate(&self, turns: &[PromptTurn]) -> Result<String, LlmError>;
}
