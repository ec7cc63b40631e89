//! 会话式流对话：先 `POST /api/chat/session` 建会话，再 `GET /api/chat/stream` 拉流

use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    response::IntoResponse,
    Json,
};

use super::chat::build_request;
use super::{ApiError, AppState};
use crate::models::{CreateSessionRequest, CreateSessionResponse, Message, SessionStreamQuery};
use crate::prompts::session_system_prompt;
use crate::relay::RelayError;

pub(super) async fn create_session(
    State(state): State<AppState>,
    request: Result<Json<CreateSessionRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = request?;
    let images: Vec<String> = request
        .images
        .unwrap_or_default()
        .into_iter()
        .filter(|r| !r.trim().is_empty())
        .collect();

    if request.message.trim().is_empty() && images.is_empty() {
        return Err(ApiError::BadRequest("消息和图片不能同时为空".to_string()));
    }

    let session_id = state.sessions.create(request.message.clone(), images);
    tracing::info!("[SESSION] 会话已创建: {}", session_id);

    Ok(Json(CreateSessionResponse {
        session_id,
        message: request.message,
    }))
}

/// 拉流
///
/// 未知会话直接 404；之后先占流名额再认领会话，名额不足时会话保持原样，客户端可以重试。
pub(super) async fn session_stream(
    State(state): State<AppState>,
    query: Result<Query<SessionStreamQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query?;
    state.sessions.get(&query.session_id)?;
    let permit = state.relay.try_acquire()?;
    let (session, lease) = state.sessions.claim(&query.session_id)?;

    let config = Arc::clone(&state.config);
    let images = Arc::clone(&state.images);
    let client = Arc::clone(&state.inference);

    let handle = state.relay.start(permit, Some(lease), move |cancel| async move {
        let mut encoded = Vec::with_capacity(session.images.len());
        for reference in &session.images {
            encoded.push(images.resolve_image(reference).await?);
        }

        let system = session_system_prompt(&config.ollama.system_prompt, encoded.len());
        let user = Message::user(session.message).with_images(encoded);
        let request = build_request(&config.ollama, system, user).streaming(true);
        Ok::<_, RelayError>(client.chat_stream(&request, cancel).await?)
    });

    tracing::info!("[SSE] 开始会话流式对话: {}", query.session_id);
    Ok(state.relay.into_sse(handle))
}
