pub mod chat;

use reqwest::StatusCode;
use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_MODEL: &str = "anthropic/claude-3-haiku";

#[derive(Debug, Error)]
pub enum LlmError {
    /// The provider answered with a non-success status. `body` is the raw response text.
    #[error("{body}")]
    Status {
        status: StatusCode,
        body: String,
    },
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("invalid client configuration: {0}")]
    Config(String),
}

#[derive(Debug, Clone, Default)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub completion_model: Option<String>,
    pub base_url: Option<String>,
    pub referer: Option<String>,
    pub app_title: Option<String>,
}

impl LlmConfig {
    pub fn model(&self) -> &str {
        self.completion_model.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }

    /// A blank key counts as no key.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|k| !k.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_openrouter() {
        let config = LlmConfig::default();
        assert_eq!(config.model(), DEFAULT_MODEL);
        assert_eq!(config.base_url(), DEFAULT_BASE_URL);
        assert!(config.api_key().is_none());
    }

    #[test]
    fn blank_key_is_treated_as_missing() {
        let config = LlmConfig { api_key: Some("   ".into()), ..LlmConfig::default() };
        assert!(config.api_key().is_none());
    }

    #[test]
    fn status_error_displays_body() {
        let err = LlmError::Status {
            status: StatusCode::UNAUTHORIZED,
            body: "{\"error\":\"bad key\"}".into(),
        };
        assert_eq!(err.to_string(), "{\"error\":\"bad key\"}");
    }
}
