//! Downstream text-generation collaborator.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

/// Errors from one generation call.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GenerateError {
    #[error("generator is not configured: {0}")]
    NotConfigured(String),

    #[error("generator request failed: {0}")]
    Http(String),

    #[error("generator returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("generator returned no text")]
    EmptyResponse,
}

impl GenerateError {
    /// Configuration problems will not go away on retry.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, GenerateError::NotConfigured(_))
    }
}

/// `generate(prompt) -> text`, bounded by a maximum input size.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, GenerateError>;

    /// Largest prompt, in characters, the generator accepts.
    fn max_input_chars(&self) -> usize;
}

/// Gemini `generateContent` settings.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_base: String,
    pub model: String,
    pub api_key: Option<String>,
    pub max_input_chars: usize,
    pub max_output_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_base: "https://generativelanguage.googleapis.com".to_string(),
            model: "gemini-2.0-flash".to_string(),
            api_key: None,
            max_input_chars: 400_000,
            max_output_tokens: 256,
            timeout_secs: 60,
        }
    }
}

impl GeminiConfig {
    /// Defaults with `GOOGLE_API_KEY` and `REPOCTX_GEMINI_MODEL` applied.
    pub fn from_env() -> Self {
        let mut config = Self {
            api_key: std::env::var("GOOGLE_API_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty()),
            ..Self::default()
        };
        if let Ok(model) = std::env::var("REPOCTX_GEMINI_MODEL") {
            config.model = model;
        }
        config
    }
}

/// Gemini REST client.
pub struct GeminiGenerator {
    config: GeminiConfig,
    http_client: reqwest::Client,
}

impl GeminiGenerator {
    pub fn new(config: GeminiConfig) -> Result<Self, GenerateError> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("repoctx/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GenerateError::Http(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            config,
            http_client,
        })
    }

    pub fn from_env() -> Result<Self, GenerateError> {
        Self::new(GeminiConfig::from_env())
    }

    fn url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.api_base.trim_end_matches('/'),
            self.config.model
        )
    }
}

#[async_trait]
impl TextGenerator for GeminiGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerateError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| GenerateError::NotConfigured("GOOGLE_API_KEY is not set".into()))?;

        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": { "maxOutputTokens": self.config.max_output_tokens },
        });
        debug!(model = %self.config.model, prompt_chars = prompt.len(), "generateContent");

        let response = self
            .http_client
            .post(self.url())
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerateError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerateError::Status {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }

        let value: Value = response
            .json()
            .await
            .map_err(|e| GenerateError::Http(format!("invalid response body: {e}")))?;
        extract_text(&value).ok_or(GenerateError::EmptyResponse)
    }

    fn max_input_chars(&self) -> usize {
        self.config.max_input_chars
    }
}

/// Concatenated text parts of the first candidate.
fn extract_text(value: &Value) -> Option<String> {
    let parts = value
        .get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .as_array()?;
    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(Value::as_str))
        .collect();
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}
