//! Text generation backends.
//!
//! Calls are blocking; async callers move them onto the blocking pool.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::OracleConfig;

/// Produces free text for a prompt.
pub trait TextOracle: Send + Sync {
    fn generate(&self, prompt: &str) -> Result<String, OracleError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OracleError {
    #[error("text generation is not configured (OPENAI_API_KEY is not set)")]
    NotConfigured,
    #[error("text generation request failed: {0}")]
    Transport(String),
    #[error("text generation service answered with HTTP {0}")]
    Status(u16),
    #[error("text generation returned no text")]
    EmptyResponse,
    #[error("text generation response could not be decoded: {0}")]
    Malformed(String),
}

/// OpenAI-compatible chat completions client.
pub struct OpenAiOracle {
    agent: ureq::Agent,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAiOracle {
    pub fn from_config(config: &OracleConfig) -> Self {
        let timeout = (config.timeout_secs > 0).then(|| Duration::from_secs(config.timeout_secs));
        let agent_config = ureq::Agent::config_builder()
            .timeout_global(timeout)
            .http_status_as_error(false)
            .build();

        Self {
            agent: ureq::Agent::new_with_config(agent_config),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn chat_completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: MessageResponse,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    content: Option<String>,
}

impl TextOracle for OpenAiOracle {
    fn generate(&self, prompt: &str) -> Result<String, OracleError> {
        let api_key = self.api_key.as_deref().ok_or(OracleError::NotConfigured)?;

        let request = ChatRequest {
            model: &self.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        tracing::debug!(
            model = %self.model,
            prompt_chars = prompt.chars().count(),
            "requesting completion"
        );

        let mut response = self
            .agent
            .post(&self.chat_completions_url())
            .header("Authorization", &format!("Bearer {api_key}"))
            .send_json(&request)
            .map_err(|err| OracleError::Transport(err.to_string()))?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            tracing::warn!(status, "completion request rejected");
            return Err(OracleError::Status(status));
        }

        let body: ChatResponse = response
            .body_mut()
            .read_json()
            .map_err(|err| OracleError::Malformed(err.to_string()))?;

        extract_text(body)
    }
}

fn extract_text(response: ChatResponse) -> Result<String, OracleError> {
    response
        .choices
        .into_iter()
        .find_map(|choice| {
            choice
                .message
                .content
                .map(|text| text.trim().to_string())
                .filter(|text| !text.is_empty())
        })
        .ok_or(OracleError::EmptyResponse)
}
