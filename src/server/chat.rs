//! 直接对话接口：`POST /chat` 与 `GET /chat-stream`

use std::sync::Arc;

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    response::IntoResponse,
    Json,
};

use super::{ApiError, AppState};
use crate::config::OllamaConfig;
use crate::models::{ChatQuery, ChatRequest, ChatStreamQuery, Message};
use crate::relay::RelayError;

pub(super) fn build_request(config: &OllamaConfig, system: String, user: Message) -> ChatRequest {
    ChatRequest::new(config.model.clone(), vec![Message::system(system), user])
        .keep_alive(config.keep_alive.clone())
}

/// 非流式对话，原样返回 Ollama 的响应
pub(super) async fn chat(
    State(state): State<AppState>,
    query: Result<Query<ChatQuery>, QueryRejection>,
    body: String,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query?;
    if body.trim().is_empty() {
        return Err(ApiError::BadRequest("消息内容不能为空".to_string()));
    }

    let system = query
        .system_message
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| state.config.ollama.system_prompt.clone());
    let request = build_request(&state.config.ollama, system, Message::user(body));

    tracing::info!("[OLLAMA] 非流式对话, model={}", request.model);
    let response = state.inference.chat(&request).await?;
    Ok(Json(response))
}

/// 流式对话，不经过会话注册表
pub(super) async fn chat_stream(
    State(state): State<AppState>,
    query: Result<Query<ChatStreamQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query?;
    if query.message.trim().is_empty() {
        return Err(ApiError::BadRequest("消息内容不能为空".to_string()));
    }

    let permit = state.relay.try_acquire()?;
    let request = build_request(
        &state.config.ollama,
        state.config.ollama.system_prompt.clone(),
        Message::user(query.message),
    )
    .streaming(true);

    let client = Arc::clone(&state.inference);
    let handle = state.relay.start(permit, None, move |cancel| async move {
        Ok::<_, RelayError>(client.chat_stream(&request, cancel).await?)
    });

    tracing::info!("[SSE] 开始直接流式对话");
    Ok(state.relay.into_sse(handle))
}
