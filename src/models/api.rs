//! HTTP 接口的请求/响应结构
//!
//! 字段名沿用前端约定的 camelCase。
use serde::{Deserialize, Serialize};

/// `POST /chat` 的查询参数
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatQuery {
    pub system_message: Option<String>,
}

/// `GET /chat-stream` 的查询参数
#[derive(Debug, Deserialize)]
pub struct ChatStreamQuery {
    pub message: String,
}

/// `POST /api/chat/session` 请求体
#[derive(Debug, Clone, Deserialize)]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub message: String,
    /// 图片引用：上传接口返回的 url、文件名或 data URL
    #[serde(default)]
    pub images: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionResponse {
    pub session_id: String,
    pub message: String,
}

/// `GET /api/chat/stream` 的查询参数
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStreamQuery {
    pub session_id: String,
}

/// `POST /api/upload` 响应
#[derive(Debug, Clone, Serialize)]
pub struct UploadResponse {
    pub url: String,
    pub filename: String,
    pub size: String,
}

/// `POST /upload` 响应
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportResponse {
    pub status: String,
    pub session_id: String,
    pub report_url: String,
    pub report_content: String,
}

/// `GET /health` 响应
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub active_sessions: usize,
    pub pending_media: usize,
    pub available_stream_slots: usize,
}
