//! Ollama Provider
//!
//! 对接本地 Ollama 的 `/api/chat` 接口，支持非流式与 NDJSON 流式两种模式。

use super::{ChunkStream, InferenceClient, ProviderError};
use crate::config::OllamaConfig;
use crate::models::{ChatRequest, ChatResponse, ErrorBody};
use async_trait::async_trait;
use bytes::BytesMut;
use futures::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub struct OllamaProvider {
    client: Client,
    base_url: String,
    request_timeout: Duration,
}

impl OllamaProvider {
    pub fn new(config: &OllamaConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            request_timeout: config.request_timeout(),
        })
    }

    fn chat_url(&self) -> String {
        format!("{}/api/chat", self.base_url)
    }

    async fn post_chat(
        &self,
        request: &ChatRequest,
        timeout: Option<Duration>,
    ) -> Result<reqwest::Response, ProviderError> {
        let mut builder = self.client.post(self.chat_url()).json(request);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        tracing::debug!(
            "[OLLAMA] POST {} model={} stream={} messages={}",
            self.chat_url(),
            request.model,
            request.stream,
            request.messages.len()
        );

        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .map(|e| e.error)
            .unwrap_or(body);
        tracing::warn!("[OLLAMA] HTTP {}: {}", status, message);
        Err(ProviderError::Status {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl InferenceClient for OllamaProvider {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let mut request = request.clone();
        request.stream = false;

        let response = self.post_chat(&request, Some(self.request_timeout)).await?;
        let body = response.bytes().await?;
        match serde_json::from_slice::<StreamLine>(&body)? {
            StreamLine::Error(e) => Err(ProviderError::Upstream(e.error)),
            StreamLine::Chunk(chunk) => Ok(chunk),
        }
    }

    async fn chat_stream(
        &self,
        request: &ChatRequest,
        cancel: CancellationToken,
    ) -> Result<ChunkStream, ProviderError> {
        let mut request = request.clone();
        request.stream = true;

        let response = self.post_chat(&request, None).await?;
        let mut bytes = Box::pin(response.bytes_stream());

        let stream = async_stream::stream! {
            let mut decoder = NdjsonDecoder::default();
            loop {
                let next = tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::debug!("[OLLAMA] 流式请求已取消，断开上游连接");
                        break;
                    }
                    next = bytes.next() => next,
                };
                match next {
                    Some(Ok(chunk)) => {
                        for item in decoder.push(&chunk) {
                            yield item;
                        }
                    }
                    Some(Err(e)) => {
                        yield Err(ProviderError::Http(e));
                        break;
                    }
                    None => {
                        if let Some(item) = decoder.finish() {
                            yield item;
                        }
                        break;
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

/// 单行 NDJSON：要么是错误，要么是一帧输出
#[derive(Deserialize)]
#[serde(untagged)]
enum StreamLine {
    Error(ErrorBody),
    Chunk(ChatResponse),
}

fn decode_line(line: &[u8]) -> Option<Result<ChatResponse, ProviderError>> {
    let line = trim_ascii(line);
    if line.is_empty() {
        return None;
    }
    Some(match serde_json::from_slice::<StreamLine>(line) {
        Ok(StreamLine::Chunk(chunk)) => Ok(chunk),
        Ok(StreamLine::Error(e)) => Err(ProviderError::Upstream(e.error)),
        Err(e) => Err(ProviderError::Decode(e)),
    })
}

fn trim_ascii(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map(|i| i + 1)
        .unwrap_or(start);
    &bytes[start..end.max(start)]
}

/// 按行切分字节流；网络分片可能把一行 JSON 切成多段
#[derive(Default)]
struct NdjsonDecoder {
    buf: BytesMut,
}

impl NdjsonDecoder {
    fn push(&mut self, chunk: &[u8]) -> Vec<Result<ChatResponse, ProviderError>> {
        self.buf.extend_from_slice(chunk);
        let mut items = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line = self.buf.split_to(pos + 1);
            if let Some(item) = decode_line(&line) {
                items.push(item);
            }
        }
        items
    }

    fn finish(&mut self) -> Option<Result<ChatResponse, ProviderError>> {
        let rest = std::mem::take(&mut self.buf);
        decode_line(&rest)
    }
}
