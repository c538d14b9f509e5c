use std::sync::Arc;

use axum::http::{ header, HeaderMap, StatusCode };
use axum::response::{ IntoResponse, Response };
use axum::routing::post;
use axum::{ Json, Router };
use file_agent_relay::agent::{ ConversationAgent, Fragment };
use file_agent_relay::config::AgentConfig;
use file_agent_relay::history::ConversationStore;
use file_agent_relay::llm::chat::{ new_client, ChatClient, ChatRequest, WireMessage };
use file_agent_relay::llm::{ LlmConfig, LlmError };
use file_agent_relay::models::chat::Role;
use futures::StreamExt;
use serde_json::{ json, Value };

const KEY: &str = "test-key";

const SSE_BODY: &str = concat!(
    ": OPENROUTER PROCESSING\n\n",
    "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
    "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\n",
    "data: not json\n\n",
    "data: {\"choices\":[{\"delta\":{\"content\":\" there\"}}]}\n\n",
    "data: [DONE]\n\n",
    "data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n\n"
);

async fn completions(headers: HeaderMap, Json(body): Json<Value>) -> Response {
    let authorized = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map_or(false, |v| v == format!("Bearer {}", KEY));
    if !authorized {
        return (StatusCode::UNAUTHORIZED, "invalid api key").into_response();
    }
    if headers.get("x-title").is_none() || headers.get("http-referer").is_none() {
        return (StatusCode::BAD_REQUEST, "missing attribution headers").into_response();
    }

    if body["stream"] == true {
        ([(header::CONTENT_TYPE, "text/event-stream")], SSE_BODY).into_response()
    } else {
        Json(json!({ "choices": [{ "message": { "role": "assistant", "content": "Full analysis" } }] })).into_response()
    }
}

async fn spawn_upstream() -> String {
    let app = Router::new().route("/api/v1/chat/completions", post(completions));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}/api/v1", addr)
}

fn llm_config(base_url: &str, api_key: &str) -> LlmConfig {
    LlmConfig {
        api_key: Some(api_key.to_string()),
        completion_model: Some("test/model".into()),
        base_url: Some(base_url.to_string()),
        referer: Some("http://localhost:3000".into()),
        app_title: Some("Agent UI Challenge".into()),
    }
}

fn agent(base_url: &str, api_key: &str) -> ConversationAgent {
    let config = AgentConfig {
        name: "FileProcessorAgent".into(),
        description: "AI agent for processing and analyzing text files".into(),
        model: "test/model".into(),
        base_url: base_url.to_string(),
        api_key: Some(api_key.to_string()),
    };
    let client = new_client(&llm_config(base_url, api_key)).unwrap();
    ConversationAgent::new(config, client, Arc::new(ConversationStore::new()))
}

#[tokio::test]
async fn streams_deltas_from_event_stream_upstream() {
    let base_url = spawn_upstream().await;
    let agent = agent(&base_url, KEY);

    let fragments: Vec<Fragment> = agent.chat_stream("Hello", "c1", None).collect().await;
    assert_eq!(fragments, vec![Fragment::Delta("Hi".into()), Fragment::Delta(" there".into())]);

    let history = agent.history("c1").await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].content, "Hi there");
}

#[tokio::test]
async fn rejected_key_yields_one_error_fragment() {
    let base_url = spawn_upstream().await;
    let agent = agent(&base_url, "wrong-key");

    let fragments: Vec<Fragment> = agent.chat_stream("Hello", "c1", None).collect().await;
    assert_eq!(fragments, vec![Fragment::Error("Error: invalid api key".into())]);
    assert!(agent.history("c1").await.map_or(true, |h| h.is_empty()));
}

#[tokio::test]
async fn one_shot_completion_reads_first_choice() {
    let base_url = spawn_upstream().await;
    let client = new_client(&llm_config(&base_url, KEY)).unwrap();

    let request = ChatRequest::new(client.model(), vec![WireMessage::new(Role::User, "hi")]);
    assert_eq!(client.complete(&request).await.unwrap(), "Full analysis");

    let agent = agent(&base_url, "wrong-key");
    assert_eq!(agent.process_file_content("text", None).await, "Error processing content: invalid api key");
}

#[tokio::test]
async fn unreachable_upstream_is_a_transport_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let base_url = format!("http://{}/api/v1", listener.local_addr().unwrap());
    drop(listener);

    let client = new_client(&llm_config(&base_url, KEY)).unwrap();
    let request = ChatRequest::new(client.model(), vec![WireMessage::new(Role::User, "hi")]).streaming();
    assert!(matches!(client.open_stream(&request).await, Err(LlmError::Http(_))));

    let agent = agent(&base_url, KEY);
    let fragments: Vec<Fragment> = agent.chat_stream("Hello", "c1", None).collect().await;
    assert_eq!(fragments.len(), 1);
    assert!(fragments[0].as_str().starts_with("Error in chat: "));
}
