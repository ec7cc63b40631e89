//! 脚本化推理客户端，测试中替代 Ollama

use super::{ChunkStream, InferenceClient, ProviderError};
use crate::models::{ChatRequest, ChatResponse};
use async_trait::async_trait;
use futures::stream;
use futures::StreamExt;
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub enum Script {
    /// 依次输出片段，最后给出终止帧
    Complete(Vec<&'static str>),
    /// 输出若干片段后报错
    FailAfter(Vec<&'static str>, &'static str),
    /// 输出若干片段后既不结束也不报错
    Hang(Vec<&'static str>),
    /// 输出若干片段后直接断开，没有终止帧
    Truncated(Vec<&'static str>),
    /// 建立连接即失败
    Refuse(&'static str),
}

pub struct ScriptedClient {
    script: Script,
    pub requests: Mutex<Vec<ChatRequest>>,
    pub tokens: Mutex<Vec<CancellationToken>>,
}

impl ScriptedClient {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            requests: Mutex::new(Vec::new()),
            tokens: Mutex::new(Vec::new()),
        }
    }

    pub fn last_request(&self) -> Option<ChatRequest> {
        self.requests.lock().unwrap().last().cloned()
    }

    pub fn last_token(&self) -> Option<CancellationToken> {
        self.tokens.lock().unwrap().last().cloned()
    }
}

fn deltas(parts: &[&'static str]) -> Vec<Result<ChatResponse, ProviderError>> {
    parts.iter().map(|p| Ok(ChatResponse::delta(*p))).collect()
}

#[async_trait]
impl InferenceClient for ScriptedClient {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        self.requests.lock().unwrap().push(request.clone());
        match &self.script {
            Script::Complete(parts) => {
                let mut response = ChatResponse::delta(parts.concat());
                response.done = true;
                Ok(response)
            }
            Script::Refuse(msg) | Script::FailAfter(_, msg) => {
                Err(ProviderError::Upstream(msg.to_string()))
            }
            Script::Hang(_) | Script::Truncated(_) => {
                futures::future::pending::<()>().await;
                unreachable!()
            }
        }
    }

    async fn chat_stream(
        &self,
        request: &ChatRequest,
        cancel: CancellationToken,
    ) -> Result<ChunkStream, ProviderError> {
        self.requests.lock().unwrap().push(request.clone());
        self.tokens.lock().unwrap().push(cancel);

        let stream: ChunkStream = match &self.script {
            Script::Complete(parts) => {
                let mut items = deltas(parts);
                items.push(Ok(ChatResponse::finished()));
                Box::pin(stream::iter(items))
            }
            Script::FailAfter(parts, msg) => {
                let mut items = deltas(parts);
                items.push(Err(ProviderError::Upstream(msg.to_string())));
                Box::pin(stream::iter(items))
            }
            Script::Hang(parts) => Box::pin(stream::iter(deltas(parts)).chain(stream::pending())),
            Script::Truncated(parts) => Box::pin(stream::iter(deltas(parts))),
            Script::Refuse(msg) => return Err(ProviderError::Upstream(msg.to_string())),
        };
        Ok(stream)
    }
}
