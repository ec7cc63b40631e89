//! 推理服务适配层
//!
//! 上层只依赖 [`InferenceClient`]，便于替换推理后端或在测试中注入脚本化实现。

pub mod ollama;
#[cfg(test)]
pub(crate) mod scripted;

use crate::models::{ChatRequest, ChatResponse};
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub use ollama::OllamaProvider;

/// 模型输出帧流，保持上游的到达顺序
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<ChatResponse, ProviderError>> + Send>>;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("请求推理服务失败: {0}")]
    Http(#[from] reqwest::Error),
    #[error("推理服务返回 HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("推理服务返回错误: {0}")]
    Upstream(String),
    #[error("解析推理服务响应失败: {0}")]
    Decode(#[from] serde_json::Error),
}

#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// 非流式对话，等待完整回复
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError>;

    /// 流式对话
    ///
    /// `cancel` 触发后返回的流会尽快结束并释放上游连接。
    async fn chat_stream(
        &self,
        request: &ChatRequest,
        cancel: CancellationToken,
    ) -> Result<ChunkStream, ProviderError>;
}
