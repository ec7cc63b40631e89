//! 转发状态、事件与错误

use axum::response::sse::Event;
use thiserror::Error;

use crate::providers::ProviderError;
use crate::uploads::StorageError;

/// SSE 事件名：内容片段
pub const MESSAGE_EVENT: &str = "message";
/// SSE 事件名：正常结束
pub const COMPLETE_EVENT: &str = "complete";

/// 单个流的生命周期
///
/// `Idle -> Streaming -> {Completed, Errored, TimedOut}`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Idle,
    Streaming,
    Completed,
    Errored,
    TimedOut,
}

impl RelayState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Errored | Self::TimedOut)
    }
}

/// 推送给客户端的事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    Message(String),
    Complete,
}

impl RelayEvent {
    pub fn into_event(self) -> Event {
        match self {
            Self::Message(text) => Event::default()
                .event(MESSAGE_EVENT)
                .data(normalize_newlines(&text)),
            Self::Complete => Event::default().event(COMPLETE_EVENT).data(""),
        }
    }
}

/// SSE 帧内不能出现 `\r`
pub fn normalize_newlines(text: &str) -> String {
    if !text.contains('\r') {
        return text.to_string();
    }
    text.replace("\r\n", "\n").replace('\r', "\n")
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error(transparent)]
    Upstream(#[from] ProviderError),
    #[error("推理服务在结束标记前断开")]
    UpstreamClosed,
    #[error("流式输出超时")]
    TimedOut,
    #[error("客户端已断开")]
    ClientGone,
    #[error("图片读取失败: {0}")]
    Image(#[from] StorageError),
    #[error("当前流式请求过多，请稍后重试")]
    Busy,
}
