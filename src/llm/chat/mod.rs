pub mod openrouter;
pub mod stream;

use async_trait::async_trait;
use futures::Stream;
use serde::{ Deserialize, Serialize };
use std::pin::Pin;
use std::sync::Arc;

use super::{ LlmConfig, LlmError };
use crate::models::chat::{ ChatMessage, Role };
use self::openrouter::OpenRouterChatClient;

pub const MAX_OUTPUT_TOKENS: u32 = 1000;
pub const TEMPERATURE: f32 = 0.7;

/// Raw response body chunks of a streaming completion, already past the status check.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, LlmError>> + Send>>;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct WireMessage {
    pub role: Role,
    pub content: String,
}

impl WireMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self { role, content: content.into() }
    }
}

impl From<&ChatMessage> for WireMessage {
    fn from(msg: &ChatMessage) -> Self {
        Self { role: msg.role, content: msg.content.clone() }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<WireMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<WireMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            max_tokens: MAX_OUTPUT_TOKENS,
            temperature: TEMPERATURE,
            stream: None,
        }
    }

    pub fn streaming(mut self) -> Self {
        self.stream = Some(true);
        self
    }
}

#[async_trait]
pub trait ChatClient: Send + Sync {
    /// One-shot completion returning `choices[0].message.content`.
    async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError>;

    /// Starts a streaming completion. A non-success status is reported here as
    /// [`LlmError::Status`], before any body bytes are handed out.
    async fn open_stream(&self, request: &ChatRequest) -> Result<ByteStream, LlmError>;

    fn model(&self) -> &str;
}

pub fn new_client(config: &LlmConfig) -> Result<Arc<dyn ChatClient>, LlmError> {
    let client = OpenRouterChatClient::from_config(config)?;
    Ok(Arc::new(client))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn streaming_request_serializes_budget_and_flag() {
        let req = ChatRequest::new("m", vec![
            WireMessage::new(Role::System, "sys"),
            WireMessage::new(Role::User, "hi"),
        ]).streaming();
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["model"], json!("m"));
        assert_eq!(
            value["messages"],
            json!([
                {"role": "system", "content": "sys"},
                {"role": "user", "content": "hi"}
            ])
        );
        assert_eq!(value["max_tokens"], json!(1000));
        assert_eq!(value["stream"], json!(true));
        let temperature = value["temperature"].as_f64().unwrap();
        assert!((temperature - 0.7).abs() < 1e-6);
    }

    #[test]
    fn plain_request_omits_stream_flag() {
        let req = ChatRequest::new("m", vec![]);
        let value = serde_json::to_value(&req).unwrap();
        assert!(value.get("stream").is_none());
    }
}
