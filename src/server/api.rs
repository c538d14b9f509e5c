use crate::agent::ConversationAgent;
use crate::config::prompt::excerpt;
use crate::files::{ FileStore, FileStoreError };
use crate::models::chat::{
    AgentStatus,
    ChatStreamRequest,
    ConversationHistoryResponse,
    ExportResponse,
    StartConversationResponse,
};
use crate::models::files::{
    FileStatusResponse,
    FileUploadResponse,
    OutputFileList,
    ProcessFileRequest,
    ProcessFileResponse,
};

use axum::{
    body::Body,
    extract::{ DefaultBodyLimit, Multipart, Path, State },
    http::{ header, HeaderValue, StatusCode },
    response::{ IntoResponse, Response },
    routing::{ delete, get, post },
    Json,
    Router,
};
use chrono::Utc;
use futures::StreamExt;
use log::{ error, info, warn };
use serde::Serialize;
use serde_json::json;
use std::convert::Infallible;
use std::io::ErrorKind;
use std::sync::Arc;
use thiserror::Error;
use tower_http::cors::{ AllowOrigin, Any, CorsLayer };

const SUMMARY_CHARS: usize = 200;
// Room for multipart framing on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub agent: Arc<ConversationAgent>,
    pub files: Arc<FileStore>,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
    status_code: u16,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = match &self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };
        let body = ErrorResponse {
            error: kind,
            message: self.to_string(),
            status_code: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<FileStoreError> for ApiError {
    fn from(err: FileStoreError) -> Self {
        match err {
            e if e.is_validation() => ApiError::BadRequest(e.to_string()),
            FileStoreError::NotFound(_) => ApiError::NotFound("File not found".into()),
            e => {
                error!("File store failure: {}", e);
                ApiError::Internal(e.to_string())
            }
        }
    }
}

type ApiResult<T> = Result<T, ApiError>;

pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.iter().any(|o| o.trim() == "*") {
        return layer.allow_origin(Any);
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o.trim()) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!("Ignoring invalid CORS origin '{}': {}", o, e);
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(allowed))
}

pub fn router(state: AppState, cors_origins: &[String]) -> Router {
    let body_limit = usize::try_from(state.files.max_file_size_bytes())
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);

    let api = Router::new()
        .route("/upload", post(upload_file))
        .route("/upload/status/{file_id}", get(file_status))
        .route("/chat/start", post(start_conversation))
        .route("/chat/stream/{conversation_id}", post(chat_stream))
        .route("/chat/status", get(agent_status))
        .route("/chat/history/{conversation_id}", get(conversation_history))
        .route("/chat/export/{conversation_id}", post(export_conversation))
        .route("/chat/{conversation_id}", delete(clear_conversation))
        .route("/download/process", post(process_file))
        .route("/download/file/{filename}", get(download_file).delete(delete_output_file))
        .route("/download/list", get(list_output_files));

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .nest("/api", api)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors_layer(cors_origins))
        .with_state(state)
}

async fn root(State(state): State<AppState>) -> impl IntoResponse {
    Json(
        json!({
            "message": "File Agent Relay",
            "version": env!("CARGO_PKG_VERSION"),
            "status": "online",
            "agent_configured": state.agent.config().has_api_key(),
        })
    )
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(
        json!({
            "status": "healthy",
            "agent_available": state.agent.config().has_api_key(),
            "upload_dir": state.files.uploads_dir().is_dir(),
            "output_dir": state.files.outputs_dir().is_dir(),
        })
    )
}

async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart
) -> ApiResult<Json<FileUploadResponse>> {
    while
        let Some(field) = multipart
            .next_field().await
            .map_err(|e| ApiError::BadRequest(format!("Invalid multipart body: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = match field.file_name() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => {
                return Err(ApiError::BadRequest("No file provided".into()));
            }
        };
        if !state.files.is_allowed_name(&filename) {
            return Err(ApiError::BadRequest("File extension not allowed".into()));
        }
        let content = field
            .bytes().await
            .map_err(|e| ApiError::BadRequest(format!("Failed to read upload: {}", e)))?;

        let (file_id, _) = state.files.save_file(&filename, &content).await?;
        return Ok(
            Json(FileUploadResponse {
                filename,
                file_id,
                size: content.len(),
                upload_time: Utc::now(),
                status: "uploaded".into(),
            })
        );
    }
    Err(ApiError::BadRequest("No file provided".into()))
}

async fn file_status(
    State(state): State<AppState>,
    Path(file_id): Path<String>
) -> ApiResult<Json<FileStatusResponse>> {
    if !state.files.file_exists(&file_id).await {
        return Err(ApiError::NotFound("File not found".into()));
    }
    Ok(Json(FileStatusResponse { file_id, status: "ready".into(), available: true }))
}

async fn start_conversation() -> Json<StartConversationResponse> {
    let conversation_id = ConversationAgent::new_conversation_id();
    info!("Started conversation {}", conversation_id);
    Json(StartConversationResponse { conversation_id, status: "started".into() })
}

async fn chat_stream(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    Json(req): Json<ChatStreamRequest>
) -> ApiResult<Response> {
    let file_content = match req.file_id.as_deref().filter(|id| !id.is_empty()) {
        Some(file_id) =>
            match state.files.read_file_content(file_id).await? {
                Some(content) if !content.is_empty() => Some(content),
                _ => {
                    return Err(ApiError::NotFound("File not found or could not be read".into()));
                }
            }
        None => None,
    };

    let fragments = state.agent
        .chat_stream(req.message, conversation_id, file_content)
        .map(|fragment| Ok::<_, Infallible>(fragment.into_text()));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(fragments))
        .map_err(|e| ApiError::Internal(format!("Chat error: {}", e)))
}

async fn agent_status(State(state): State<AppState>) -> Json<AgentStatus> {
    Json(state.agent.status())
}

async fn conversation_history(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>
) -> ApiResult<Json<ConversationHistoryResponse>> {
    let messages = state.agent
        .history(&conversation_id).await
        .ok_or_else(|| ApiError::NotFound("Conversation not found".into()))?;
    Ok(Json(ConversationHistoryResponse { conversation_id, messages }))
}

async fn clear_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>
) -> ApiResult<Json<serde_json::Value>> {
    if !state.agent.clear_conversation(&conversation_id).await {
        return Err(ApiError::NotFound("Conversation not found".into()));
    }
    Ok(Json(json!({ "conversation_id": conversation_id, "status": "cleared" })))
}

async fn export_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>
) -> ApiResult<Json<ExportResponse>> {
    let (transcript, message_count) = state.agent
        .export_transcript(&conversation_id).await
        .ok_or_else(|| ApiError::NotFound("Conversation not found".into()))?;
    let output_filename = state.files
        .write_output_file(&format!("conversation_{}", conversation_id), &transcript).await?;
    Ok(Json(ExportResponse { conversation_id, output_filename, message_count }))
}

async fn process_file(
    State(state): State<AppState>,
    Json(req): Json<ProcessFileRequest>
) -> ApiResult<Json<ProcessFileResponse>> {
    if !state.files.file_exists(&req.file_id).await {
        return Err(ApiError::NotFound("File not found".into()));
    }
    let content = match state.files.read_file_content(&req.file_id).await? {
        Some(content) if !content.is_empty() => content,
        _ => {
            return Err(ApiError::BadRequest("Could not read file content".into()));
        }
    };

    let processed = state.agent.process_file_content(
        &content,
        req.processing_instructions.as_deref()
    ).await;
    let output_filename = state.files.write_output_file(&req.file_id, &processed).await?;

    let summary = match excerpt(&processed, SUMMARY_CHARS) {
        (head, true) => format!("{}...", head),
        (all, false) => all.to_string(),
    };

    Ok(
        Json(ProcessFileResponse {
            file_id: req.file_id,
            output_filename,
            processing_status: "completed".into(),
            summary: Some(summary),
            processed_at: Utc::now(),
        })
    )
}

async fn download_file(
    State(state): State<AppState>,
    Path(filename): Path<String>
) -> ApiResult<impl IntoResponse> {
    let path = state.files.output_path(&filename)?;
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(ApiError::NotFound("File not found".into()));
        }
        Err(e) => {
            return Err(ApiError::Internal(format!("Download failed: {}", e)));
        }
    };

    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{}\"", filename)),
        ],
        bytes,
    ))
}

async fn delete_output_file(
    State(state): State<AppState>,
    Path(filename): Path<String>
) -> ApiResult<Json<serde_json::Value>> {
    state.files.delete_output_file(&filename).await?;
    Ok(Json(json!({ "filename": filename, "status": "deleted" })))
}

async fn list_output_files(State(state): State<AppState>) -> ApiResult<Json<OutputFileList>> {
    let files = state.files.list_output_files().await?;
    Ok(Json(OutputFileList { files }))
}
