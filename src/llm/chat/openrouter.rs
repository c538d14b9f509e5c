use async_trait::async_trait;
use futures::StreamExt;
use log::{ debug, info };
use reqwest::{ Client as HttpClient, Response, header::{ HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, AUTHORIZATION } };
use serde::Deserialize;

use super::{ ByteStream, ChatClient, ChatRequest };
use crate::llm::{ LlmConfig, LlmError };

/// Client for OpenRouter and other OpenAI-compatible `/chat/completions` endpoints.
///
/// The underlying `reqwest` client holds the connection pool and is shared by
/// every conversation.
pub struct OpenRouterChatClient {
    http: HttpClient,
    model: String,
    completions_url: String,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: Option<CompletionMessage>,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue, LlmError> {
    HeaderValue::from_str(value).map_err(|e| LlmError::Config(format!("Invalid {} header: {}", name, e)))
}

impl OpenRouterChatClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = config.api_key() {
            headers.insert(AUTHORIZATION, header_value("Authorization", &format!("Bearer {}", key))?);
        }
        if let Some(referer) = config.referer.as_deref().filter(|r| !r.is_empty()) {
            headers.insert(HeaderName::from_static("http-referer"), header_value("HTTP-Referer", referer)?);
        }
        if let Some(title) = config.app_title.as_deref().filter(|t| !t.is_empty()) {
            headers.insert(HeaderName::from_static("x-title"), header_value("X-Title", title)?);
        }

        let http = HttpClient::builder().default_headers(headers).build()?;

        Ok(Self {
            http,
            model: config.model().to_string(),
            completions_url: format!("{}/chat/completions", config.base_url().trim_end_matches('/')),
        })
    }

    async fn post(&self, request: &ChatRequest) -> Result<Response, LlmError> {
        debug!(
            "POST {} (model={}, messages={}, stream={})",
            self.completions_url,
            request.model,
            request.messages.len(),
            request.stream.unwrap_or(false)
        );
        let resp = self.http.post(&self.completions_url).json(request).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            info!("Upstream returned {}: {}", status, body);
            return Err(LlmError::Status { status, body });
        }
        Ok(resp)
    }
}

#[async_trait]
impl ChatClient for OpenRouterChatClient {
    async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError> {
        let resp = self.post(request).await?.json::<CompletionResponse>().await?;

        resp.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
            .ok_or_else(|| LlmError::InvalidResponse("No choices[0].message.content in response".into()))
    }

    async fn open_stream(&self, request: &ChatRequest) -> Result<ByteStream, LlmError> {
        let resp = self.post(request).await?;
        let body = resp.bytes_stream().map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(LlmError::from));
        Ok(Box::pin(body))
    }

    fn model(&self) -> &str {
        &self.model
    }
}
